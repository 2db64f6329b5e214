//! Repository of the [`PeerConnection`]s of a call session.

use std::collections::HashMap;

use crate::{signalling::SessionId, utils::Timers};

use super::{PeerConnection, PeerId};

/// Repository of all the [`PeerConnection`]s of a call session, keyed by
/// their [`PeerId`]s.
#[derive(Debug, Default)]
pub struct PeerRepository {
    /// All [`PeerConnection`]s.
    peers: HashMap<PeerId, PeerConnection>,
}

impl PeerRepository {
    /// Creates new empty [`PeerRepository`].
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores [`PeerConnection`] ending the one previously stored under the
    /// same [`PeerId`].
    ///
    /// Returns the replaced [`PeerConnection`].
    pub fn insert<K>(
        &mut self,
        peer: PeerConnection,
        timers: &mut Timers<K>,
    ) -> Option<PeerConnection> {
        let mut replaced = self.peers.insert(peer.id().clone(), peer)?;
        replaced.end(timers);
        Some(replaced)
    }

    /// Returns [`PeerConnection`] with the provided [`PeerId`].
    #[inline]
    pub fn get(&self, id: &PeerId) -> Option<&PeerConnection> {
        self.peers.get(id)
    }

    /// Returns mutable [`PeerConnection`] with the provided [`PeerId`].
    #[inline]
    pub fn get_mut(&mut self, id: &PeerId) -> Option<&mut PeerConnection> {
        self.peers.get_mut(id)
    }

    /// Indicates whether [`PeerConnection`] with the provided [`PeerId`] is
    /// stored.
    #[inline]
    pub fn contains(&self, id: &PeerId) -> bool {
        self.peers.contains_key(id)
    }

    /// Removes and ends [`PeerConnection`] with the provided [`PeerId`].
    pub fn remove<K>(
        &mut self,
        id: &PeerId,
        timers: &mut Timers<K>,
    ) -> Option<PeerConnection> {
        let mut peer = self.peers.remove(id)?;
        peer.end(timers);
        Some(peer)
    }

    /// Removes and ends all [`PeerConnection`]s with the provided session.
    pub fn remove_session<K>(
        &mut self,
        session_id: &SessionId,
        timers: &mut Timers<K>,
    ) -> Vec<PeerConnection> {
        let ids: Vec<_> = self
            .peers
            .keys()
            .filter(|id| &id.session_id == session_id)
            .cloned()
            .collect();
        ids.iter().filter_map(|id| self.remove(id, timers)).collect()
    }

    /// Returns [`PeerId`]s of all the [`PeerConnection`]s with the provided
    /// session.
    pub fn by_session(&self, session_id: &SessionId) -> Vec<PeerId> {
        self.peers
            .keys()
            .filter(|id| &id.session_id == session_id)
            .cloned()
            .collect()
    }

    /// Returns [`PeerId`]s of all the stored [`PeerConnection`]s, sorted.
    pub fn ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<_> = self.peers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Iterates over all the stored [`PeerConnection`]s.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &PeerConnection> {
        self.peers.values()
    }

    /// Returns count of the stored [`PeerConnection`]s.
    #[inline]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Indicates whether no [`PeerConnection`]s are stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Removes and ends all the stored [`PeerConnection`]s.
    pub fn end_all<K>(
        &mut self,
        timers: &mut Timers<K>,
    ) -> Vec<PeerConnection> {
        self.peers
            .drain()
            .map(|(_, mut peer)| {
                peer.end(timers);
                peer
            })
            .collect()
    }
}
