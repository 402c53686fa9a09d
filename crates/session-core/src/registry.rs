//! Session Registry
//!
//! Stores every live [`PeerSession`] keyed by [`PeerId`]. The map sits behind
//! an `RwLock` (insert/remove take it exclusively, lookups share it) and each
//! session behind its own mutex, so two peers negotiate without contending.
//! Sessions never leave the registry by reference; callers pass the peer id
//! and a closure.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::RwLock;

use crate::errors::{Result, SessionError};
use crate::session::PeerSession;
use crate::types::{PeerId, SessionState};

/// Registry counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Sessions currently registered
    pub active: usize,
    /// Sessions in state `Connected`
    pub connected: usize,
    /// Sessions ever registered
    pub total_created: usize,
    /// Sessions ever removed
    pub total_removed: usize,
}

/// Map of live peer sessions
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<PeerId, Mutex<PeerSession>>>,
    total_created: AtomicUsize,
    total_removed: AtomicUsize,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session; fails if the peer already has one
    pub async fn insert(&self, session: PeerSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let peer = session.peer().clone();
        if sessions.contains_key(&peer) {
            return Err(SessionError::DuplicatePeer(peer));
        }
        sessions.insert(peer.clone(), Mutex::new(session));
        self.total_created.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Registered session for {}", peer);
        Ok(())
    }

    /// Remove and return a session
    pub async fn remove(&self, peer: &PeerId) -> Option<PeerSession> {
        let removed = self.sessions.write().await.remove(peer)?;
        self.total_removed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Unregistered session for {}", peer);
        Some(removed.into_inner())
    }

    /// Whether a session exists for the peer
    pub async fn contains(&self, peer: &PeerId) -> bool {
        self.sessions.read().await.contains_key(peer)
    }

    /// Run `f` against the peer's session
    pub async fn with_session<F, R>(&self, peer: &PeerId, f: F) -> Result<R>
    where
        F: FnOnce(&mut PeerSession) -> Result<R>,
    {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(peer)
            .ok_or_else(|| SessionError::unknown_peer(peer))?;
        let mut session = session.lock();
        f(&mut *session)
    }

    /// State of the peer's session
    pub async fn state(&self, peer: &PeerId) -> Option<SessionState> {
        let sessions = self.sessions.read().await;
        sessions.get(peer).map(|s| s.lock().state())
    }

    /// Registered peers
    pub async fn peers(&self) -> Vec<PeerId> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// Number of registered sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Remove every session, returning them for teardown
    pub async fn clear(&self) -> Vec<PeerSession> {
        let drained: Vec<PeerSession> = self
            .sessions
            .write()
            .await
            .drain()
            .map(|(_, session)| session.into_inner())
            .collect();
        self.total_removed.fetch_add(drained.len(), Ordering::Relaxed);
        drained
    }

    /// Current counters
    pub async fn stats(&self) -> RegistryStats {
        let sessions = self.sessions.read().await;
        RegistryStats {
            active: sessions.len(),
            connected: sessions
                .values()
                .filter(|s| s.lock().state() == SessionState::Connected)
                .count(),
            total_created: self.total_created.load(Ordering::Relaxed),
            total_removed: self.total_removed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::loopback::LoopbackNetwork;
    use crate::media::MediaChannel;
    use crate::config::SessionConfig;
    use crate::transport::{TransportFactory, TransportSettings};
    use crate::types::Role;
    use tokio::sync::mpsc;

    fn session(peer: &str) -> PeerSession {
        let network = LoopbackNetwork::new();
        let factory = network.factory("alice");
        let (tx, _rx) = mpsc::unbounded_channel();
        let peer = PeerId::from(peer);
        let settings = TransportSettings {
            role: Role::Offerer,
            ice_servers: Vec::new(),
            payload_type: 111,
            ssrc: 2,
        };
        let transport = factory.create(&peer, &settings, tx).unwrap();
        let media = Arc::new(
            MediaChannel::new(peer.clone(), &SessionConfig::default(), transport.audio_track()).unwrap(),
        );
        PeerSession::new(peer, Role::Offerer, transport, media)
    }

    #[tokio::test]
    async fn test_insert_lookup_remove() {
        let registry = SessionRegistry::new();
        registry.insert(session("bob")).await.unwrap();
        registry.insert(session("carol")).await.unwrap();

        assert!(registry.contains(&PeerId::from("bob")).await);
        assert_eq!(registry.len().await, 2);
        assert_eq!(registry.state(&PeerId::from("bob")).await, Some(SessionState::New));

        let role = registry
            .with_session(&PeerId::from("carol"), |s| Ok(s.role()))
            .await
            .unwrap();
        assert_eq!(role, Role::Offerer);

        assert!(registry.remove(&PeerId::from("bob")).await.is_some());
        assert!(!registry.contains(&PeerId::from("bob")).await);
        assert!(registry.remove(&PeerId::from("bob")).await.is_none());

        let stats = registry.stats().await;
        assert_eq!(stats.active, 1);
        assert_eq!(stats.total_created, 2);
        assert_eq!(stats.total_removed, 1);
    }

    #[tokio::test]
    async fn test_duplicate_and_unknown() {
        let registry = SessionRegistry::new();
        registry.insert(session("bob")).await.unwrap();
        assert!(matches!(
            registry.insert(session("bob")).await,
            Err(SessionError::DuplicatePeer(_))
        ));

        let err = registry
            .with_session(&PeerId::from("nobody"), |_| Ok(()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Negotiation(crate::errors::NegotiationError::UnknownPeer(_))
        ));
    }

    #[tokio::test]
    async fn test_clear_returns_sessions() {
        let registry = SessionRegistry::new();
        registry.insert(session("bob")).await.unwrap();
        registry.insert(session("carol")).await.unwrap();

        let drained = registry.clear().await;
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty().await);
        assert_eq!(registry.stats().await.total_removed, 2);
    }
}
