//! Channel state store.
//!
//! Keyed by peer id. The transport wraps it in a single lock, so every
//! read-modify-write on a channel is atomic with respect to signal handlers.
//!
//! ```text
//! ┌──────────────── ChannelStore ────────────────┐
//! │  "parent"   → Channel { send_id, recv_id, …} │
//! │  "gadget-1" → Channel { … }                  │
//! └──────────────────────────────────────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;

use crate::identifiers::PeerId;

use super::channel::Channel;

// ============================================================================
// ChannelStore
// ============================================================================

/// Per-peer channel records.
#[derive(Debug, Default)]
pub struct ChannelStore {
    channels: FxHashMap<PeerId, Channel>,
}

impl ChannelStore {
    /// Creates an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the channel for `peer_id`.
    #[inline]
    #[must_use]
    pub fn get(&self, peer_id: &PeerId) -> Option<&Channel> {
        self.channels.get(peer_id)
    }

    /// Returns the channel for `peer_id` mutably.
    #[inline]
    pub fn get_mut(&mut self, peer_id: &PeerId) -> Option<&mut Channel> {
        self.channels.get_mut(peer_id)
    }

    /// Inserts a channel keyed by its peer id.
    ///
    /// Returns the channel it replaced, if any.
    pub fn insert(&mut self, channel: Channel) -> Option<Channel> {
        self.channels.insert(channel.peer_id().clone(), channel)
    }

    /// Removes and returns the channel for `peer_id`.
    #[inline]
    pub fn remove(&mut self, peer_id: &PeerId) -> Option<Channel> {
        self.channels.remove(peer_id)
    }

    /// Returns `true` if a channel exists for `peer_id`.
    #[inline]
    #[must_use]
    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.channels.contains_key(peer_id)
    }

    /// Returns the number of channels.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns `true` if there are no channels.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Returns the peer ids, sorted.
    #[must_use]
    pub fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.channels.keys().cloned().collect();
        peers.sort();
        peers
    }

    /// Iterates over all channels mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Channel> {
        self.channels.values_mut()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use url::Url;

    use crate::environment::{
        CounterpartFrame, CounterpartLookup, Environment, RelayElement, RelaySpec,
    };
    use crate::error::Result;
    use crate::transport::options::TransportOptions;
    use crate::transport::relay::RelayDocument;
    use crate::transport::role::Role;

    struct NullRelay;

    impl RelayElement for NullRelay {
        fn navigate(&self, _url: &str) -> Result<()> {
            Ok(())
        }

        fn set_width(&self, _px: u32) -> Result<()> {
            Ok(())
        }
    }

    struct NullEnv;

    impl Environment for NullEnv {
        fn create_relay(&self, _spec: &RelaySpec<'_>) -> Result<Box<dyn RelayElement>> {
            Ok(Box::new(NullRelay))
        }

        fn lookup_counterpart(
            &self,
            _lookup: &CounterpartLookup,
        ) -> Option<Arc<dyn CounterpartFrame>> {
            None
        }
    }

    fn channel(id: &str) -> Channel {
        let peer = PeerId::new(id);
        let role = Role::Host { child: peer.clone() };
        let url = Url::parse("https://gadget.example/robots.txt").expect("url");
        let relay = RelayDocument::create(
            &NullEnv,
            role.relay_frame_name(),
            url,
            &TransportOptions::new(),
        )
        .expect("relay");
        Channel::new(peer, role, relay)
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut store = ChannelStore::new();
        assert!(store.is_empty());

        assert!(store.insert(channel("g1")).is_none());
        assert!(store.insert(channel("g2")).is_none());

        assert_eq!(store.len(), 2);
        assert!(store.contains(&PeerId::new("g1")));
        assert_eq!(store.peers(), vec![PeerId::new("g1"), PeerId::new("g2")]);
    }

    #[test]
    fn test_channels_are_independent() {
        let mut store = ChannelStore::new();
        store.insert(channel("g1"));
        store.insert(channel("g2"));

        store
            .get_mut(&PeerId::new("g1"))
            .expect("g1")
            .enqueue(serde_json::json!("only g1"));

        assert_eq!(store.get(&PeerId::new("g1")).expect("g1").pending_count(), 1);
        assert_eq!(store.get(&PeerId::new("g2")).expect("g2").pending_count(), 0);
    }

    #[test]
    fn test_remove() {
        let mut store = ChannelStore::new();
        store.insert(channel("g1"));

        assert!(store.remove(&PeerId::new("g1")).is_some());
        assert!(store.remove(&PeerId::new("g1")).is_none());
        assert!(store.is_empty());
    }
}
