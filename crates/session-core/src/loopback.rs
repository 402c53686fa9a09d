//! In-process loopback transport
//!
//! [`LoopbackNetwork`] links endpoints by name: the transport endpoint
//! `alice` creates for peer `bob` is wired to the one `bob` creates for peer
//! `alice`. Descriptions are small but well-formed SDP, every endpoint
//! gathers a single host candidate, and connectivity is declared once the
//! local description, the remote description and one remote candidate are
//! all present. Audio track packets are delivered to the counterpart as
//! [`TransportEvent::TrackMessage`]s.
//!
//! Tests can cut and restore links, make a creation fail and inject raw
//! packets.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::errors::TransportError;
use crate::sdp;
use crate::transport::{
    AudioTrack, PeerTransport, TransportEvent, TransportEventSender, TransportFactory,
    TransportSettings, TransportState,
};
use crate::types::{IceCandidate, PeerId, SdpType, SessionDescription};

const FIRST_PORT: u16 = 50000;
const HOST_PRIORITY: u32 = 2_122_260_223;

type LinkKey = (PeerId, PeerId);

#[derive(Default)]
struct NetworkInner {
    endpoints: Mutex<HashMap<LinkKey, Weak<LoopbackTransport>>>,
    severed: Mutex<HashSet<LinkKey>>,
    fail_next: Mutex<HashSet<PeerId>>,
    next_port: AtomicU16,
    packets_delivered: AtomicU64,
}

impl NetworkInner {
    fn endpoint(&self, local: &PeerId, remote: &PeerId) -> Option<Arc<LoopbackTransport>> {
        self.endpoints
            .lock()
            .get(&(local.clone(), remote.clone()))
            .and_then(Weak::upgrade)
    }

    fn is_severed(&self, local: &PeerId, remote: &PeerId) -> bool {
        self.severed
            .lock()
            .contains(&(local.clone(), remote.clone()))
    }

    fn allocate_port(&self) -> u16 {
        FIRST_PORT.wrapping_add(self.next_port.fetch_add(1, Ordering::Relaxed))
    }
}

/// A set of linked in-process endpoints
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    inner: Arc<NetworkInner>,
}

impl LoopbackNetwork {
    /// Create an empty network
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport factory for the endpoint named `local`
    pub fn factory(&self, local: impl Into<PeerId>) -> Arc<LoopbackFactory> {
        Arc::new(LoopbackFactory {
            local: local.into(),
            network: self.inner.clone(),
        })
    }

    /// Cut the link between two endpoints; both sides report `Disconnected`
    pub fn sever(&self, a: impl Into<PeerId>, b: impl Into<PeerId>) {
        let (a, b) = (a.into(), b.into());
        {
            let mut severed = self.inner.severed.lock();
            severed.insert((a.clone(), b.clone()));
            severed.insert((b.clone(), a.clone()));
        }
        tracing::debug!("Loopback link {} <-> {} severed", a, b);
        for (local, remote) in [(&a, &b), (&b, &a)] {
            if let Some(endpoint) = self.inner.endpoint(local, remote) {
                endpoint.set_state_if_connected(TransportState::Disconnected);
            }
        }
    }

    /// Restore a severed link; endpoints that had connected reconnect
    pub fn restore(&self, a: impl Into<PeerId>, b: impl Into<PeerId>) {
        let (a, b) = (a.into(), b.into());
        {
            let mut severed = self.inner.severed.lock();
            severed.remove(&(a.clone(), b.clone()));
            severed.remove(&(b.clone(), a.clone()));
        }
        tracing::debug!("Loopback link {} <-> {} restored", a, b);
        for (local, remote) in [(&a, &b), (&b, &a)] {
            if let Some(endpoint) = self.inner.endpoint(local, remote) {
                endpoint.maybe_connect();
            }
        }
    }

    /// Make the next transport created by endpoint `local` fail
    pub fn fail_next_creation(&self, local: impl Into<PeerId>) {
        self.inner.fail_next.lock().insert(local.into());
    }

    /// Deliver raw bytes to endpoint `to` as if they came from peer `from`.
    ///
    /// Returns false when no such live endpoint exists.
    pub fn inject(&self, to: impl Into<PeerId>, from: impl Into<PeerId>, packet: Bytes) -> bool {
        let (to, from) = (to.into(), from.into());
        match self.inner.endpoint(&to, &from) {
            Some(endpoint) => endpoint.deliver(packet),
            None => false,
        }
    }

    /// Track packets delivered across the network so far
    pub fn packets_delivered(&self) -> u64 {
        self.inner.packets_delivered.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for LoopbackNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackNetwork")
            .field("endpoints", &self.inner.endpoints.lock().len())
            .field("packets_delivered", &self.packets_delivered())
            .finish()
    }
}

/// Creates loopback transports for one named endpoint
#[derive(Clone)]
pub struct LoopbackFactory {
    local: PeerId,
    network: Arc<NetworkInner>,
}

impl LoopbackFactory {
    /// Name of the endpoint
    pub fn local(&self) -> &PeerId {
        &self.local
    }
}

impl TransportFactory for LoopbackFactory {
    fn create(
        &self,
        peer: &PeerId,
        settings: &TransportSettings,
        events: TransportEventSender,
    ) -> Result<Arc<dyn PeerTransport>, TransportError> {
        if self.network.fail_next.lock().remove(&self.local) {
            return Err(TransportError::CreationFailed(format!(
                "loopback endpoint {} refused to create a transport for {}",
                self.local, peer
            )));
        }

        let port = self.network.allocate_port();
        let transport = Arc::new_cyclic(|weak| LoopbackTransport {
            local: self.local.clone(),
            remote: peer.clone(),
            settings: settings.clone(),
            port,
            network: Arc::downgrade(&self.network),
            events,
            track: Arc::new(LoopbackTrack {
                transport: weak.clone(),
            }),
            link: Mutex::new(LinkState::default()),
        });

        self.network.endpoints.lock().insert(
            (self.local.clone(), peer.clone()),
            Arc::downgrade(&transport),
        );
        tracing::debug!(
            "Loopback transport {} -> {} created on port {}",
            self.local,
            peer,
            port
        );
        Ok(transport)
    }
}

#[derive(Debug)]
struct LinkState {
    local_description: Option<SessionDescription>,
    has_remote: bool,
    remote_candidates: usize,
    state: TransportState,
}

impl Default for LinkState {
    fn default() -> Self {
        Self {
            local_description: None,
            has_remote: false,
            remote_candidates: 0,
            state: TransportState::New,
        }
    }
}

/// One end of a loopback link
pub struct LoopbackTransport {
    local: PeerId,
    remote: PeerId,
    settings: TransportSettings,
    port: u16,
    network: Weak<NetworkInner>,
    events: TransportEventSender,
    track: Arc<LoopbackTrack>,
    link: Mutex<LinkState>,
}

impl LoopbackTransport {
    fn emit(&self, event: TransportEvent) {
        // the manager may already be gone
        let _ = self.events.send((self.remote.clone(), event));
    }

    fn host_candidate(&self) -> IceCandidate {
        IceCandidate::new(
            format!(
                "candidate:1 1 UDP {} 127.0.0.1 {} typ host",
                HOST_PRIORITY, self.port
            ),
            "0",
        )
    }

    fn render_sdp(&self, sdp_type: SdpType, candidate: &IceCandidate) -> String {
        let setup = match sdp_type {
            SdpType::Offer => "actpass",
            SdpType::Answer => "active",
        };
        let pt = self.settings.payload_type;
        format!(
            "v=0\r\n\
             o=- {session} 2 IN IP4 127.0.0.1\r\n\
             s=-\r\n\
             t=0 0\r\n\
             a=group:BUNDLE 0\r\n\
             m=audio {port} UDP/TLS/RTP/SAVPF {pt}\r\n\
             c=IN IP4 127.0.0.1\r\n\
             a=mid:0\r\n\
             a=sendrecv\r\n\
             a=setup:{setup}\r\n\
             a=rtpmap:{pt} opus/48000/2\r\n\
             a=ssrc:{ssrc} cname:{cname}\r\n\
             a={candidate}\r\n\
             a=end-of-candidates\r\n",
            session = (u64::from(self.port) << 16) | u64::from(self.settings.ssrc & 0xffff),
            port = self.port,
            pt = pt,
            setup = setup,
            ssrc = self.settings.ssrc,
            cname = self.local,
            candidate = candidate.candidate,
        )
    }

    fn is_closed(&self) -> bool {
        self.link.lock().state == TransportState::Closed
    }

    fn is_connected(&self) -> bool {
        self.link.lock().state == TransportState::Connected
    }

    fn severed(&self) -> bool {
        self.network
            .upgrade()
            .map_or(true, |network| network.is_severed(&self.local, &self.remote))
    }

    fn maybe_connect(&self) {
        if self.severed() {
            return;
        }
        let connected = {
            let mut link = self.link.lock();
            let ready = link.local_description.is_some()
                && link.has_remote
                && link.remote_candidates > 0;
            if ready && !matches!(link.state, TransportState::Connected | TransportState::Closed) {
                link.state = TransportState::Connected;
                true
            } else {
                false
            }
        };
        if connected {
            tracing::debug!("Loopback {} -> {} connected", self.local, self.remote);
            self.emit(TransportEvent::StateChanged(TransportState::Connecting));
            self.emit(TransportEvent::StateChanged(TransportState::Connected));
        }
    }

    fn set_state_if_connected(&self, state: TransportState) {
        let changed = {
            let mut link = self.link.lock();
            if link.state == TransportState::Connected {
                link.state = state;
                true
            } else {
                false
            }
        };
        if changed {
            self.emit(TransportEvent::StateChanged(state));
        }
    }

    fn deliver(&self, packet: Bytes) -> bool {
        if self.is_closed() {
            return false;
        }
        tracing::trace!("Loopback {} <- {}: {} bytes", self.local, self.remote, packet.len());
        self.emit(TransportEvent::TrackMessage(packet));
        true
    }

    fn counterpart(&self) -> Option<Arc<LoopbackTransport>> {
        self.network
            .upgrade()?
            .endpoint(&self.remote, &self.local)
    }
}

impl PeerTransport for LoopbackTransport {
    fn set_local_description(&self, sdp_type: SdpType) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let candidate = self.host_candidate();
        let description = SessionDescription::new(sdp_type, self.render_sdp(sdp_type, &candidate));
        self.link.lock().local_description = Some(description.clone());

        self.emit(TransportEvent::LocalDescription(description));
        self.emit(TransportEvent::LocalCandidate(candidate));
        self.emit(TransportEvent::GatheringComplete);
        self.maybe_connect();
        Ok(())
    }

    fn local_description(&self) -> Option<SessionDescription> {
        self.link.lock().local_description.clone()
    }

    fn set_remote_description(&self, description: &SessionDescription) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if !sdp::looks_like_sdp(&description.sdp) {
            return Err(TransportError::InvalidDescription("missing version line".into()));
        }
        if !description.sdp.contains("m=audio") {
            return Err(TransportError::InvalidDescription("no audio section".into()));
        }
        self.link.lock().has_remote = true;
        self.maybe_connect();
        Ok(())
    }

    fn add_remote_candidate(&self, candidate: &IceCandidate) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if sdp::parse_candidate(candidate).is_none() {
            return Err(TransportError::InvalidCandidate(candidate.candidate.clone()));
        }
        {
            let mut link = self.link.lock();
            if !link.has_remote {
                return Err(TransportError::InvalidCandidate(
                    "remote description not set".into(),
                ));
            }
            link.remote_candidates += 1;
        }
        self.maybe_connect();
        Ok(())
    }

    fn audio_track(&self) -> Arc<dyn AudioTrack> {
        self.track.clone()
    }

    fn close(&self) {
        {
            let mut link = self.link.lock();
            if link.state == TransportState::Closed {
                return;
            }
            link.state = TransportState::Closed;
        }
        tracing::debug!("Loopback {} -> {} closed", self.local, self.remote);
        if let Some(network) = self.network.upgrade() {
            let key = (self.local.clone(), self.remote.clone());
            let mut endpoints = network.endpoints.lock();
            let is_self = endpoints
                .get(&key)
                .map_or(false, |weak| std::ptr::eq(weak.as_ptr(), self));
            if is_self {
                endpoints.remove(&key);
            }
        }
        if let Some(counterpart) = self.counterpart() {
            counterpart.set_state_if_connected(TransportState::Disconnected);
        }
    }
}

impl std::fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("local", &self.local)
            .field("remote", &self.remote)
            .field("port", &self.port)
            .field("link", &*self.link.lock())
            .finish()
    }
}

struct LoopbackTrack {
    transport: Weak<LoopbackTransport>,
}

impl AudioTrack for LoopbackTrack {
    fn send(&self, packet: Bytes) -> Result<(), TransportError> {
        let transport = self.transport.upgrade().ok_or(TransportError::Closed)?;
        if !transport.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let counterpart = transport.counterpart().ok_or(TransportError::NotConnected)?;
        if !counterpart.deliver(packet) {
            return Err(TransportError::NotConnected);
        }
        if let Some(network) = transport.network.upgrade() {
            network.packets_delivered.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.transport
            .upgrade()
            .map_or(false, |transport| transport.is_connected())
    }
}
