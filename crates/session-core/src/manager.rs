//! Session Manager
//!
//! Owns the registry and drives every [`PeerSession`]. Commands come from
//! the application (add a peer, offer, apply remote descriptions, close);
//! asynchronous transport reports arrive on one channel and are processed by
//! an event loop task. Whatever a session asks for is carried out here:
//! local descriptions and candidates go to the [`SignalingBridge`], events go
//! to the broadcast channel.
//!
//! The audio side never touches the registry. Outbound frames go to the
//! send-enabled channels found in an `ArcSwap` snapshot, and received
//! packets are queued to a playback worker through a bounded channel that
//! drops on overflow.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use bytes::Bytes;
use parking_lot::Mutex;
use rvoice_audio_core::FrameSink;
use rvoice_codec_core::AudioFrame;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::{ConfigChange, ConfigHandle};
use crate::errors::{Result, SessionError};
use crate::events::SessionEvent;
use crate::media::{MediaChannel, MediaStats};
use crate::registry::{RegistryStats, SessionRegistry};
use crate::session::{PeerSession, SessionOutput};
use crate::signaling::{SignalEnvelope, SignalMessage, SignalingBridge};
use crate::transport::{
    TransportEvent, TransportEventReceiver, TransportFactory, TransportSettings,
};
use crate::types::{IceCandidate, PeerId, Role, SdpType, SessionDescription, SessionState};

/// Default depth of the inbound packet queue
pub const DEFAULT_INBOUND_QUEUE_DEPTH: usize = 64;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Manager tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Packets buffered between the transport and the playback worker
    pub inbound_queue_depth: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            inbound_queue_depth: DEFAULT_INBOUND_QUEUE_DEPTH,
        }
    }
}

struct InboundPacket {
    channel: Arc<MediaChannel>,
    data: Bytes,
}

type ChannelMap = HashMap<PeerId, Arc<MediaChannel>>;

struct ManagerInner {
    registry: SessionRegistry,
    config: ConfigHandle,
    factory: Arc<dyn TransportFactory>,
    signaling: Arc<dyn SignalingBridge>,
    events: broadcast::Sender<SessionEvent>,
    transport_tx: mpsc::UnboundedSender<(PeerId, TransportEvent)>,
    inbound_tx: mpsc::Sender<InboundPacket>,
    channels: ArcSwap<ChannelMap>,
    send_set: ArcSwap<Vec<Arc<MediaChannel>>>,
    // held while a send set is computed and published
    send_set_refresh: Mutex<()>,
    inbound_dropped: AtomicU64,
    shut_down: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Orchestrates peer sessions for one local endpoint
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    /// Create the manager and spawn its worker tasks.
    ///
    /// Must be called from within a Tokio runtime. Decoded inbound frames
    /// are handed to `playback`.
    pub fn new(
        config: ConfigHandle,
        factory: Arc<dyn TransportFactory>,
        signaling: Arc<dyn SignalingBridge>,
        playback: Arc<dyn FrameSink>,
        manager_config: ManagerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(manager_config.inbound_queue_depth.max(1));
        let config_rx = config.subscribe();

        let inner = Arc::new(ManagerInner {
            registry: SessionRegistry::new(),
            config,
            factory,
            signaling,
            events,
            transport_tx,
            inbound_tx,
            channels: ArcSwap::from_pointee(HashMap::new()),
            send_set: ArcSwap::from_pointee(Vec::new()),
            send_set_refresh: Mutex::new(()),
            inbound_dropped: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        });

        let weak = Arc::downgrade(&inner);
        let tasks = vec![
            tokio::spawn(run_event_loop(weak.clone(), transport_rx)),
            tokio::spawn(run_playback(weak.clone(), inbound_rx, playback)),
            tokio::spawn(run_config_watcher(weak, config_rx)),
        ];
        *inner.tasks.lock() = tasks;

        tracing::info!(
            "Session manager started (inbound queue depth {})",
            manager_config.inbound_queue_depth
        );
        Self { inner }
    }

    /// Shared configuration
    pub fn config(&self) -> &ConfigHandle {
        &self.inner.config
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Create a session for `peer` with the configured role
    pub async fn add_peer(&self, peer: impl Into<PeerId>) -> Result<()> {
        let role = self.inner.config.snapshot().role;
        self.add_peer_with_role(peer, role).await
    }

    /// Create a session for `peer` with an explicit role.
    ///
    /// If the transport cannot be created nothing is registered.
    pub async fn add_peer_with_role(&self, peer: impl Into<PeerId>, role: Role) -> Result<()> {
        let peer = peer.into();
        self.ensure_running()?;
        if self.inner.registry.contains(&peer).await {
            return Err(SessionError::DuplicatePeer(peer));
        }

        let config = self.inner.config.snapshot();
        let settings = TransportSettings {
            role,
            ice_servers: config.ice_servers.clone(),
            payload_type: config.payload_type,
            ssrc: config.ssrc,
        };
        let transport = self
            .inner
            .factory
            .create(&peer, &settings, self.inner.transport_tx.clone())
            .map_err(|e| {
                tracing::warn!("Transport for {} could not be created: {}", peer, e);
                e
            })?;

        let media = match MediaChannel::new(peer.clone(), &config, transport.audio_track()) {
            Ok(media) => Arc::new(media),
            Err(e) => {
                transport.close();
                return Err(e);
            }
        };
        let session = PeerSession::new(peer.clone(), role, transport.clone(), media.clone());
        if let Err(e) = self.inner.registry.insert(session).await {
            transport.close();
            return Err(e);
        }
        self.inner.channels.rcu(|channels| {
            let mut channels = ChannelMap::clone(channels);
            channels.insert(peer.clone(), media.clone());
            channels
        });

        tracing::info!("Added {} session for {}", role, peer);
        self.publish(SessionEvent::PeerAdded { peer, role });
        Ok(())
    }

    /// Start an offer to `peer`
    pub async fn create_offer(&self, peer: &PeerId) -> Result<()> {
        self.ensure_running()?;
        let outputs = self
            .inner
            .registry
            .with_session(peer, PeerSession::create_offer)
            .await?;
        self.execute(peer, outputs).await;
        Ok(())
    }

    /// Start an answer to `peer`'s offer
    pub async fn create_answer(&self, peer: &PeerId) -> Result<()> {
        self.ensure_running()?;
        let outputs = self
            .inner
            .registry
            .with_session(peer, PeerSession::create_answer)
            .await?;
        self.execute(peer, outputs).await;
        Ok(())
    }

    /// Apply `peer`'s offer or answer
    pub async fn set_remote_description(
        &self,
        peer: &PeerId,
        description: SessionDescription,
    ) -> Result<()> {
        self.ensure_running()?;
        let outputs = self
            .inner
            .registry
            .with_session(peer, |session| session.set_remote_description(description))
            .await?;
        self.execute(peer, outputs).await;
        Ok(())
    }

    /// Apply one of `peer`'s candidates
    pub async fn add_remote_candidate(&self, peer: &PeerId, candidate: IceCandidate) -> Result<()> {
        self.ensure_running()?;
        let outputs = self
            .inner
            .registry
            .with_session(peer, |session| session.add_remote_candidate(candidate))
            .await?;
        self.execute(peer, outputs).await;
        Ok(())
    }

    /// Handle one message received from `peer` through signaling.
    ///
    /// An offer from a peer without a session creates an answering session
    /// and answers it.
    pub async fn handle_signal(&self, peer: &PeerId, message: SignalMessage) -> Result<()> {
        match message {
            SignalMessage::Description(description) => {
                let is_offer = description.sdp_type == SdpType::Offer;
                let mut created = false;
                if is_offer && !self.inner.registry.contains(peer).await {
                    tracing::info!("Incoming offer from {}", peer);
                    match self.add_peer_with_role(peer.clone(), Role::Answerer).await {
                        Ok(()) => created = true,
                        // added concurrently; answer with that session
                        Err(SessionError::DuplicatePeer(_)) => {}
                        Err(e) => return Err(e),
                    }
                }

                let mut result = self.set_remote_description(peer, description).await;
                if result.is_ok() && is_offer {
                    result = self.create_answer(peer).await;
                }
                if let Err(e) = result {
                    if created {
                        tracing::warn!("Dropping session for {} after rejected offer: {}", peer, e);
                        if let Err(close_err) = self.close_peer(peer).await {
                            tracing::debug!("Session for {} already gone: {}", peer, close_err);
                        }
                    }
                    return Err(e);
                }
                Ok(())
            }
            SignalMessage::Candidate(candidate) => self.add_remote_candidate(peer, candidate).await,
        }
    }

    /// Feed envelopes from a signaling relay into this manager.
    ///
    /// Each envelope is treated as a message from its sender. The task ends
    /// when the relay closes.
    pub fn serve_signaling(
        &self,
        mut envelopes: mpsc::UnboundedReceiver<SignalEnvelope>,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(envelope) = envelopes.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let manager = SessionManager { inner };
                let result = match envelope.message() {
                    Ok(message) => manager.handle_signal(&envelope.from, message).await,
                    Err(e) => Err(e.into()),
                };
                if let Err(e) = result {
                    tracing::warn!("Signal from {} not applied: {}", envelope.from, e);
                }
            }
        })
    }

    /// Close the session with `peer` and forget it
    pub async fn close_peer(&self, peer: &PeerId) -> Result<()> {
        let mut session = self
            .inner
            .registry
            .remove(peer)
            .await
            .ok_or_else(|| SessionError::unknown_peer(peer))?;
        self.inner.channels.rcu(|channels| {
            let mut channels = ChannelMap::clone(channels);
            channels.remove(peer);
            channels
        });
        let outputs = session.close();
        self.refresh_send_set();
        tracing::info!("Closed session for {}", peer);
        self.execute(peer, outputs).await;
        Ok(())
    }

    /// Close every session and stop the worker tasks
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.channels.store(Arc::new(HashMap::new()));
        self.inner.send_set.store(Arc::new(Vec::new()));
        for mut session in self.inner.registry.clear().await {
            let peer = session.peer().clone();
            for output in session.close() {
                if let SessionOutput::Event(event) = output {
                    self.publish(event);
                }
            }
            tracing::debug!("Closed session for {} during shutdown", peer);
        }
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
        tracing::info!("Session manager shut down");
    }

    /// Whether [`SessionManager::shutdown`] ran
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    /// Encode and send one captured frame to every connected peer.
    ///
    /// Lock-free with respect to negotiation; returns the number of peers the
    /// frame was sent to.
    pub fn send_frame(&self, frame: &AudioFrame) -> usize {
        let targets = self.inner.send_set.load();
        targets
            .iter()
            .filter(|channel| channel.send_frame(frame))
            .count()
    }

    /// State of the session with `peer`
    pub async fn peer_state(&self, peer: &PeerId) -> Option<SessionState> {
        self.inner.registry.state(peer).await
    }

    /// Peers with a session
    pub async fn peers(&self) -> Vec<PeerId> {
        self.inner.registry.peers().await
    }

    /// Media counters of the session with `peer`
    pub fn media_stats(&self, peer: &PeerId) -> Option<MediaStats> {
        self.inner.channels.load().get(peer).map(|c| c.stats())
    }

    /// Current encoder bitrate of the session with `peer`
    pub fn bitrate(&self, peer: &PeerId) -> Option<u32> {
        self.inner.channels.load().get(peer).and_then(|c| c.bitrate())
    }

    /// Peers currently receiving outbound audio
    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.inner
            .send_set
            .load()
            .iter()
            .map(|c| c.peer().clone())
            .collect()
    }

    /// Inbound packets dropped because the playback queue was full
    pub fn inbound_dropped(&self) -> u64 {
        self.inner.inbound_dropped.load(Ordering::Relaxed)
    }

    /// Registry counters
    pub async fn registry_stats(&self) -> RegistryStats {
        self.inner.registry.stats().await
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(SessionError::ShutDown);
        }
        Ok(())
    }

    fn publish(&self, event: SessionEvent) {
        // no subscribers is fine
        let _ = self.inner.events.send(event);
    }

    fn refresh_send_set(&self) {
        // the flags are read and the result stored under one lock, so a
        // stale snapshot can never replace a newer one
        let _refresh = self.inner.send_set_refresh.lock();
        let channels = self.inner.channels.load();
        let enabled: Vec<Arc<MediaChannel>> = channels
            .values()
            .filter(|c| c.is_send_enabled())
            .cloned()
            .collect();
        tracing::debug!("{} peer(s) receiving audio", enabled.len());
        self.inner.send_set.store(Arc::new(enabled));
    }

    async fn execute(&self, peer: &PeerId, outputs: Vec<SessionOutput>) {
        for output in outputs {
            match output {
                SessionOutput::Signal(SignalMessage::Description(description)) => {
                    match self.inner.signaling.send_description(peer, &description).await {
                        Ok(()) => self.publish(SessionEvent::LocalDescription {
                            peer: peer.clone(),
                            description,
                        }),
                        Err(e) => self.signaling_failed(peer, e),
                    }
                }
                SessionOutput::Signal(SignalMessage::Candidate(candidate)) => {
                    match self.inner.signaling.send_candidate(peer, &candidate).await {
                        Ok(()) => self.publish(SessionEvent::LocalCandidate {
                            peer: peer.clone(),
                            candidate,
                        }),
                        Err(e) => self.signaling_failed(peer, e),
                    }
                }
                SessionOutput::Event(event) => {
                    if matches!(
                        event,
                        SessionEvent::Connected { .. }
                            | SessionEvent::Disconnected { .. }
                            | SessionEvent::Closed { .. }
                    ) {
                        self.refresh_send_set();
                    }
                    self.publish(event);
                }
            }
        }
    }

    fn signaling_failed(&self, peer: &PeerId, error: crate::errors::SignalingError) {
        tracing::warn!("Signaling to {} failed: {}", peer, error);
        self.publish(SessionEvent::Error {
            peer: peer.clone(),
            message: error.to_string(),
        });
    }

    async fn handle_transport_event(&self, peer: PeerId, event: TransportEvent) {
        if let TransportEvent::TrackMessage(data) = event {
            self.dispatch_inbound(&peer, data);
            return;
        }
        match self
            .inner
            .registry
            .with_session(&peer, |session| Ok(session.handle_transport_event(event)))
            .await
        {
            Ok(outputs) => self.execute(&peer, outputs).await,
            Err(_) => tracing::debug!("Transport event for unknown peer {} ignored", peer),
        }
    }

    fn dispatch_inbound(&self, peer: &PeerId, data: Bytes) {
        let Some(channel) = self.inner.channels.load().get(peer).cloned() else {
            tracing::trace!("Packet from unknown peer {} dropped", peer);
            return;
        };
        if let Err(e) = self.inner.inbound_tx.try_send(InboundPacket { channel, data }) {
            self.inner.inbound_dropped.fetch_add(1, Ordering::Relaxed);
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    tracing::debug!("Playback queue full, packet from {} dropped", peer)
                }
                mpsc::error::TrySendError::Closed(_) => {
                    tracing::debug!("Playback worker gone, packet from {} dropped", peer)
                }
            }
        }
    }

    fn apply_config_change(&self, change: &ConfigChange) {
        let channels = self.inner.channels.load();
        for channel in channels.values() {
            let result = match change {
                ConfigChange::Bitrate(bitrate) => channel.set_bitrate(*bitrate),
                ConfigChange::PayloadType(payload_type) => channel.set_payload_type(*payload_type),
                ConfigChange::Ssrc(ssrc) => {
                    channel.set_ssrc(*ssrc);
                    Ok(())
                }
                ConfigChange::Role(_) | ConfigChange::IceServers(_) => Ok(()),
            };
            if let Err(e) = result {
                tracing::warn!("{}: config change {:?} not applied: {}", channel.peer(), change, e);
            }
        }
    }

    fn apply_full_config(&self) {
        let config = self.inner.config.snapshot();
        for change in [
            ConfigChange::Bitrate(config.bitrate),
            ConfigChange::PayloadType(config.payload_type),
            ConfigChange::Ssrc(config.ssrc),
        ] {
            self.apply_config_change(&change);
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("channels", &self.inner.channels.load().len())
            .field("connected", &self.inner.send_set.load().len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

fn upgrade(weak: &Weak<ManagerInner>) -> Option<SessionManager> {
    weak.upgrade().map(|inner| SessionManager { inner })
}

async fn run_event_loop(weak: Weak<ManagerInner>, mut events: TransportEventReceiver) {
    while let Some((peer, event)) = events.recv().await {
        let Some(manager) = upgrade(&weak) else {
            break;
        };
        manager.handle_transport_event(peer, event).await;
    }
    tracing::debug!("Transport event loop stopped");
}

async fn run_playback(
    weak: Weak<ManagerInner>,
    mut inbound: mpsc::Receiver<InboundPacket>,
    playback: Arc<dyn FrameSink>,
) {
    while let Some(packet) = inbound.recv().await {
        let Some(decoded) = packet.channel.receive_packet(&packet.data) else {
            continue;
        };
        if decoded.first {
            if let Some(manager) = upgrade(&weak) {
                tracing::info!("{}: first audio frame received", packet.channel.peer());
                manager.publish(SessionEvent::AudioReady {
                    peer: packet.channel.peer().clone(),
                });
            }
        }
        playback.on_frame(&decoded.frame);
    }
    tracing::debug!("Playback worker stopped");
}

async fn run_config_watcher(weak: Weak<ManagerInner>, mut changes: broadcast::Receiver<ConfigChange>) {
    loop {
        let change = changes.recv().await;
        let Some(manager) = upgrade(&weak) else {
            break;
        };
        match change {
            Ok(change) => {
                tracing::debug!("Applying config change {:?}", change);
                manager.apply_config_change(&change);
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!("Missed {} config changes, reapplying snapshot", missed);
                manager.apply_full_config();
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
