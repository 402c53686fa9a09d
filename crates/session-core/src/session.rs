//! Peer session state machine
//!
//! A [`PeerSession`] tracks one offer/answer exchange and the connection it
//! produces. It never talks to signaling or the event bus directly: every
//! operation returns the [`SessionOutput`]s the caller must carry out, which
//! keeps the machine synchronous and testable without a live transport.
//!
//! ```text
//!  New ──create_offer/create_answer──▶ GatheringLocal ──gathering complete──▶ Negotiating
//!   │                                                                            │
//!   └──set_remote_description──▶ Negotiating        transport up + both descs ──▶ Connected
//!                                                                                 │   ▲
//!                                                   transport down/failed ──▶ Disconnected
//!  any ──close──▶ Closed
//! ```

use std::sync::Arc;
use std::time::Instant;

use crate::errors::{NegotiationError, Result, SessionError};
use crate::events::SessionEvent;
use crate::media::MediaChannel;
use crate::sdp;
use crate::signaling::SignalMessage;
use crate::transport::{PeerTransport, TransportEvent, TransportState};
use crate::types::{IceCandidate, PeerId, Role, SdpType, SessionDescription, SessionState};

/// Work a state transition asks the caller to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutput {
    /// Deliver to the remote peer through signaling
    Signal(SignalMessage),
    /// Publish on the event bus
    Event(SessionEvent),
}

/// One negotiated (or negotiating) connection to a remote peer
pub struct PeerSession {
    peer: PeerId,
    role: Role,
    state: SessionState,
    has_local_description: bool,
    has_remote_description: bool,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    pending_candidates: Vec<IceCandidate>,
    pending_local_candidates: Vec<IceCandidate>,
    transport_connected: bool,
    transport: Arc<dyn PeerTransport>,
    media: Arc<MediaChannel>,
    created_at: Instant,
}

impl PeerSession {
    /// Create a session in state `New`
    pub fn new(
        peer: PeerId,
        role: Role,
        transport: Arc<dyn PeerTransport>,
        media: Arc<MediaChannel>,
    ) -> Self {
        tracing::debug!("Created {} session for {}", role, peer);
        Self {
            peer,
            role,
            state: SessionState::New,
            has_local_description: false,
            has_remote_description: false,
            local_description: None,
            remote_description: None,
            pending_candidates: Vec::new(),
            pending_local_candidates: Vec::new(),
            transport_connected: false,
            transport,
            media,
            created_at: Instant::now(),
        }
    }

    /// Remote peer
    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Local role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the final local description was produced
    pub fn has_local_description(&self) -> bool {
        self.has_local_description
    }

    /// Whether the remote description was applied
    pub fn has_remote_description(&self) -> bool {
        self.has_remote_description
    }

    /// Final local description, once gathering completed
    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.local_description
            .as_ref()
            .filter(|_| self.has_local_description)
    }

    /// Applied remote description
    pub fn remote_description(&self) -> Option<&SessionDescription> {
        self.remote_description.as_ref()
    }

    /// Remote candidates waiting for the remote description
    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    /// Media channel of this session
    pub fn media(&self) -> &Arc<MediaChannel> {
        &self.media
    }

    /// Time since creation
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    fn transition(&mut self, new_state: SessionState, out: &mut Vec<SessionOutput>) {
        if self.state == new_state {
            return;
        }
        let old_state = self.state;
        self.state = new_state;
        tracing::debug!("{}: {} -> {}", self.peer, old_state, new_state);
        out.push(SessionOutput::Event(SessionEvent::StateChanged {
            peer: self.peer.clone(),
            old_state,
            new_state,
        }));
    }

    fn invalid_state(&self, operation: &'static str) -> SessionError {
        NegotiationError::InvalidState {
            peer: self.peer.clone(),
            state: self.state,
            operation,
        }
        .into()
    }

    /// The transport dropped before both descriptions were in place, so
    /// negotiation may still continue from `Disconnected`.
    fn negotiation_interrupted(&self) -> bool {
        self.state == SessionState::Disconnected
            && !(self.has_local_description && self.has_remote_description)
    }

    fn try_connect(&mut self, out: &mut Vec<SessionOutput>) {
        let ready = self.transport_connected
            && self.has_local_description
            && self.has_remote_description;
        if !ready || matches!(self.state, SessionState::Connected | SessionState::Closed) {
            return;
        }
        self.transition(SessionState::Connected, out);
        self.media.enable_send();
        tracing::info!("{}: connected, audio flowing", self.peer);
        out.push(SessionOutput::Event(SessionEvent::Connected {
            peer: self.peer.clone(),
        }));
    }

    /// Start an offer (offerer only)
    pub fn create_offer(&mut self) -> Result<Vec<SessionOutput>> {
        if self.role != Role::Offerer {
            return Err(NegotiationError::WrongRole {
                peer: self.peer.clone(),
                role: self.role,
                operation: "create_offer",
            }
            .into());
        }
        if !matches!(self.state, SessionState::New | SessionState::Negotiating)
            && !self.negotiation_interrupted()
        {
            return Err(self.invalid_state("create_offer"));
        }
        self.start_local(SdpType::Offer)
    }

    /// Start an answer to the applied remote offer (answerer only)
    pub fn create_answer(&mut self) -> Result<Vec<SessionOutput>> {
        if self.role != Role::Answerer {
            return Err(NegotiationError::WrongRole {
                peer: self.peer.clone(),
                role: self.role,
                operation: "create_answer",
            }
            .into());
        }
        if !self.has_remote_description {
            return Err(NegotiationError::MissingRemoteOffer(self.peer.clone()).into());
        }
        if !matches!(self.state, SessionState::New | SessionState::Negotiating)
            && !self.negotiation_interrupted()
        {
            return Err(self.invalid_state("create_answer"));
        }
        self.start_local(SdpType::Answer)
    }

    fn start_local(&mut self, sdp_type: SdpType) -> Result<Vec<SessionOutput>> {
        self.transport.set_local_description(sdp_type)?;
        self.has_local_description = false;
        let mut out = Vec::new();
        self.transition(SessionState::GatheringLocal, &mut out);
        Ok(out)
    }

    /// Finalise the local description once gathering is done.
    ///
    /// `has_local_description` is set before the description is emitted, so
    /// anything reacting to the emitted message already sees it.
    pub fn on_gathering_complete(&mut self) -> Vec<SessionOutput> {
        let mut out = Vec::new();
        if self.state.is_closed() {
            return out;
        }
        let Some(description) = self
            .transport
            .local_description()
            .or_else(|| self.local_description.clone())
        else {
            tracing::warn!("{}: gathering completed without a local description", self.peer);
            out.push(SessionOutput::Event(SessionEvent::Error {
                peer: self.peer.clone(),
                message: "gathering completed without a local description".to_string(),
            }));
            return out;
        };

        self.local_description = Some(description.clone());
        self.has_local_description = true;
        out.push(SessionOutput::Signal(SignalMessage::Description(description)));
        out.extend(
            self.pending_local_candidates
                .drain(..)
                .map(|c| SessionOutput::Signal(SignalMessage::Candidate(c))),
        );

        if self.state == SessionState::GatheringLocal {
            self.transition(SessionState::Negotiating, &mut out);
        }
        self.try_connect(&mut out);
        out
    }

    /// Apply the remote offer (answerer) or answer (offerer)
    pub fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<Vec<SessionOutput>> {
        let expected = self.role.expected_remote();
        if description.sdp_type != expected {
            return Err(NegotiationError::UnexpectedDescription {
                peer: self.peer.clone(),
                expected,
                actual: description.sdp_type,
            }
            .into());
        }
        let allowed = match self.role {
            Role::Answerer => {
                matches!(self.state, SessionState::New | SessionState::Negotiating)
                    || self.negotiation_interrupted()
            }
            Role::Offerer => matches!(
                self.state,
                SessionState::GatheringLocal | SessionState::Negotiating
            ) || (self.negotiation_interrupted() && self.has_local_description),
        };
        if !allowed {
            return Err(self.invalid_state("set_remote_description"));
        }
        if !sdp::looks_like_sdp(&description.sdp) {
            return Err(NegotiationError::Rejected {
                peer: self.peer.clone(),
                reason: "body is not SDP".to_string(),
            }
            .into());
        }
        self.transport
            .set_remote_description(&description)
            .map_err(|e| NegotiationError::Rejected {
                peer: self.peer.clone(),
                reason: e.to_string(),
            })?;

        tracing::debug!("{}: remote {} applied", self.peer, description.sdp_type);
        self.remote_description = Some(description);
        self.has_remote_description = true;

        let mut out = Vec::new();
        for candidate in std::mem::take(&mut self.pending_candidates) {
            self.apply_candidate(candidate, &mut out);
        }
        if self.state == SessionState::New {
            self.transition(SessionState::Negotiating, &mut out);
        }
        self.try_connect(&mut out);
        Ok(out)
    }

    /// Add a remote candidate; buffered until the remote description exists.
    ///
    /// A malformed or refused candidate is reported as an event, not an error.
    pub fn add_remote_candidate(&mut self, candidate: IceCandidate) -> Result<Vec<SessionOutput>> {
        if self.state.is_closed() {
            return Err(self.invalid_state("add_remote_candidate"));
        }
        let mut out = Vec::new();
        if self.has_remote_description {
            self.apply_candidate(candidate, &mut out);
        } else {
            tracing::debug!("{}: buffering candidate until remote description", self.peer);
            self.pending_candidates.push(candidate);
        }
        Ok(out)
    }

    fn apply_candidate(&mut self, candidate: IceCandidate, out: &mut Vec<SessionOutput>) {
        let result = match sdp::parse_candidate(&candidate) {
            Some(_) => self
                .transport
                .add_remote_candidate(&candidate)
                .map_err(|e| e.to_string()),
            None => Err("malformed candidate".to_string()),
        };
        if let Err(reason) = result {
            tracing::warn!("{}: candidate rejected: {}", self.peer, reason);
            out.push(SessionOutput::Event(SessionEvent::CandidateRejected {
                peer: self.peer.clone(),
                candidate,
                reason,
            }));
        }
    }

    /// React to a connectivity change
    pub fn on_transport_state_change(&mut self, state: TransportState) -> Vec<SessionOutput> {
        let mut out = Vec::new();
        if self.state.is_closed() {
            return out;
        }
        match state {
            TransportState::Connected => {
                self.transport_connected = true;
                self.try_connect(&mut out);
                if self.state != SessionState::Connected {
                    tracing::warn!(
                        "{}: transport connected before negotiation finished (local={}, remote={})",
                        self.peer,
                        self.has_local_description,
                        self.has_remote_description
                    );
                }
            }
            TransportState::Disconnected | TransportState::Failed | TransportState::Closed => {
                self.transport_connected = false;
                self.media.disable_send();
                if self.state != SessionState::Disconnected {
                    self.transition(SessionState::Disconnected, &mut out);
                    tracing::info!("{}: transport {:?}", self.peer, state);
                    out.push(SessionOutput::Event(SessionEvent::Disconnected {
                        peer: self.peer.clone(),
                    }));
                }
            }
            TransportState::New | TransportState::Connecting => {
                tracing::debug!("{}: transport {:?}", self.peer, state);
            }
        }
        out
    }

    /// Dispatch a transport event into the state machine.
    ///
    /// Track messages bypass the session and are ignored here.
    pub fn handle_transport_event(&mut self, event: TransportEvent) -> Vec<SessionOutput> {
        match event {
            TransportEvent::LocalDescription(description) => {
                if !self.state.is_closed() {
                    self.local_description = Some(description);
                }
                Vec::new()
            }
            TransportEvent::LocalCandidate(candidate) => {
                if self.state.is_closed() {
                    return Vec::new();
                }
                // the remote side only accepts candidates after our description
                if !self.has_local_description {
                    self.pending_local_candidates.push(candidate);
                    return Vec::new();
                }
                vec![SessionOutput::Signal(SignalMessage::Candidate(candidate))]
            }
            TransportEvent::GatheringComplete => self.on_gathering_complete(),
            TransportEvent::StateChanged(state) => self.on_transport_state_change(state),
            TransportEvent::TrackMessage(_) => Vec::new(),
        }
    }

    /// Tear the session down: stop audio, release codec state, close the
    /// transport. Idempotent.
    pub fn close(&mut self) -> Vec<SessionOutput> {
        let mut out = Vec::new();
        if self.state.is_closed() {
            return out;
        }
        self.media.dispose();
        self.transport.close();
        self.pending_candidates.clear();
        self.pending_local_candidates.clear();
        self.transition(SessionState::Closed, &mut out);
        out.push(SessionOutput::Event(SessionEvent::Closed {
            peer: self.peer.clone(),
        }));
        out
    }
}

impl std::fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("peer", &self.peer)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("has_local_description", &self.has_local_description)
            .field("has_remote_description", &self.has_remote_description)
            .field("pending_candidates", &self.pending_candidates.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::errors::TransportError;
    use crate::transport::AudioTrack;
    use bytes::Bytes;
    use parking_lot::Mutex;

    const CANDIDATE: &str = "candidate:1 1 UDP 2122260223 10.0.0.2 40000 typ host";

    #[derive(Default)]
    struct FakeTransport {
        local_type: Mutex<Option<SdpType>>,
        remote: Mutex<Option<SessionDescription>>,
        candidates: Mutex<Vec<IceCandidate>>,
        closed: Mutex<bool>,
        reject_remote: bool,
    }

    struct NullTrack;

    impl AudioTrack for NullTrack {
        fn send(&self, _packet: Bytes) -> std::result::Result<(), TransportError> {
            Ok(())
        }

        fn is_open(&self) -> bool {
            true
        }
    }

    impl PeerTransport for FakeTransport {
        fn set_local_description(&self, sdp_type: SdpType) -> std::result::Result<(), TransportError> {
            *self.local_type.lock() = Some(sdp_type);
            Ok(())
        }

        fn local_description(&self) -> Option<SessionDescription> {
            self.local_type
                .lock()
                .map(|t| SessionDescription::new(t, "v=0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=mid:0\r\n"))
        }

        fn set_remote_description(
            &self,
            description: &SessionDescription,
        ) -> std::result::Result<(), TransportError> {
            if self.reject_remote {
                return Err(TransportError::InvalidDescription("nope".into()));
            }
            *self.remote.lock() = Some(description.clone());
            Ok(())
        }

        fn add_remote_candidate(&self, candidate: &IceCandidate) -> std::result::Result<(), TransportError> {
            self.candidates.lock().push(candidate.clone());
            Ok(())
        }

        fn audio_track(&self) -> Arc<dyn AudioTrack> {
            Arc::new(NullTrack)
        }

        fn close(&self) {
            *self.closed.lock() = true;
        }
    }

    fn session(role: Role) -> (Arc<FakeTransport>, PeerSession) {
        session_with(role, FakeTransport::default())
    }

    fn session_with(role: Role, transport: FakeTransport) -> (Arc<FakeTransport>, PeerSession) {
        let transport = Arc::new(transport);
        let media = Arc::new(
            MediaChannel::new(PeerId::from("bob"), &SessionConfig::default(), Arc::new(NullTrack)).unwrap(),
        );
        let session = PeerSession::new(PeerId::from("bob"), role, transport.clone(), media);
        (transport, session)
    }

    fn has_event(out: &[SessionOutput], f: impl Fn(&SessionEvent) -> bool) -> bool {
        out.iter()
            .any(|o| matches!(o, SessionOutput::Event(e) if f(e)))
    }

    #[test]
    fn test_offerer_full_negotiation() {
        let (transport, mut session) = session(Role::Offerer);

        let out = session.create_offer().unwrap();
        assert_eq!(session.state(), SessionState::GatheringLocal);
        assert_eq!(*transport.local_type.lock(), Some(SdpType::Offer));
        assert!(has_event(&out, |e| matches!(e, SessionEvent::StateChanged { new_state: SessionState::GatheringLocal, .. })));

        let out = session.handle_transport_event(TransportEvent::GatheringComplete);
        assert!(session.has_local_description());
        let emitted = out.iter().find_map(|o| match o {
            SessionOutput::Signal(SignalMessage::Description(d)) => Some(d.clone()),
            _ => None,
        });
        assert_eq!(emitted.unwrap().sdp_type, SdpType::Offer);
        assert_eq!(session.state(), SessionState::Negotiating);

        session
            .set_remote_description(SessionDescription::answer("v=0\r\n"))
            .unwrap();
        assert!(session.has_remote_description());
        assert_eq!(session.state(), SessionState::Negotiating);
        assert!(!session.media().is_send_enabled());

        let out = session.handle_transport_event(TransportEvent::StateChanged(TransportState::Connected));
        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.media().is_send_enabled());
        assert!(has_event(&out, |e| matches!(e, SessionEvent::Connected { .. })));
    }

    #[test]
    fn test_answerer_flow_and_candidate_buffering() {
        let (transport, mut session) = session(Role::Answerer);

        session.add_remote_candidate(IceCandidate::new(CANDIDATE, "0")).unwrap();
        assert_eq!(session.pending_candidates(), 1);
        assert!(transport.candidates.lock().is_empty());

        assert!(matches!(
            session.create_answer(),
            Err(SessionError::Negotiation(NegotiationError::MissingRemoteOffer(_)))
        ));

        session
            .set_remote_description(SessionDescription::offer("v=0\r\n"))
            .unwrap();
        assert_eq!(session.state(), SessionState::Negotiating);
        assert_eq!(session.pending_candidates(), 0);
        assert_eq!(transport.candidates.lock().len(), 1);

        session.create_answer().unwrap();
        assert_eq!(*transport.local_type.lock(), Some(SdpType::Answer));
        session.on_gathering_complete();

        // both descriptions exist, so the transport coming up connects
        session.on_transport_state_change(TransportState::Connected);
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn test_wrong_description_type_leaves_state() {
        let (_, mut session) = session(Role::Answerer);
        let err = session
            .set_remote_description(SessionDescription::answer("v=0"))
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Negotiation(NegotiationError::UnexpectedDescription { .. })
        ));
        assert_eq!(session.state(), SessionState::New);
        assert!(!session.has_remote_description());
    }

    #[test]
    fn test_role_guards() {
        let (_, mut answerer) = session(Role::Answerer);
        assert!(matches!(
            answerer.create_offer(),
            Err(SessionError::Negotiation(NegotiationError::WrongRole { .. }))
        ));

        let (_, mut offerer) = session(Role::Offerer);
        // no offer created yet
        assert!(offerer
            .set_remote_description(SessionDescription::answer("v=0"))
            .is_err());
    }

    #[test]
    fn test_transport_rejection_is_negotiation_error() {
        let transport = FakeTransport {
            reject_remote: true,
            ..Default::default()
        };
        let (_, mut session) = session_with(Role::Answerer, transport);
        let err = session
            .set_remote_description(SessionDescription::offer("v=0"))
            .unwrap_err();
        assert!(matches!(err, SessionError::Negotiation(NegotiationError::Rejected { .. })));
        assert_eq!(session.state(), SessionState::New);
    }

    #[test]
    fn test_malformed_candidate_is_an_event() {
        let (transport, mut session) = session(Role::Answerer);
        session
            .set_remote_description(SessionDescription::offer("v=0"))
            .unwrap();
        let out = session
            .add_remote_candidate(IceCandidate::new("garbage", "0"))
            .unwrap();
        assert!(has_event(&out, |e| matches!(e, SessionEvent::CandidateRejected { .. })));
        assert!(transport.candidates.lock().is_empty());
    }

    #[test]
    fn test_disconnect_and_recover() {
        let (_, mut session) = session(Role::Offerer);
        session.create_offer().unwrap();
        session.on_gathering_complete();
        session
            .set_remote_description(SessionDescription::answer("v=0"))
            .unwrap();
        session.on_transport_state_change(TransportState::Connected);
        assert_eq!(session.state(), SessionState::Connected);

        let out = session.on_transport_state_change(TransportState::Failed);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.media().is_send_enabled());
        assert!(has_event(&out, |e| matches!(e, SessionEvent::Disconnected { .. })));

        session.on_transport_state_change(TransportState::Connected);
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn test_negotiation_continues_after_early_disconnect() {
        let (_, mut session) = session(Role::Offerer);
        session.create_offer().unwrap();
        session.on_transport_state_change(TransportState::Disconnected);
        assert_eq!(session.state(), SessionState::Disconnected);

        // restarting the offer is allowed while negotiation is unfinished
        session.create_offer().unwrap();
        assert_eq!(session.state(), SessionState::GatheringLocal);
        session.on_gathering_complete();
        session.on_transport_state_change(TransportState::Failed);
        assert_eq!(session.state(), SessionState::Disconnected);

        session
            .set_remote_description(SessionDescription::answer("v=0"))
            .unwrap();
        assert!(session.has_remote_description());
        session.on_transport_state_change(TransportState::Connected);
        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.media().is_send_enabled());
    }

    #[test]
    fn test_answerer_accepts_offer_after_early_disconnect() {
        let (_, mut session) = session(Role::Answerer);
        session.on_transport_state_change(TransportState::Disconnected);
        assert_eq!(session.state(), SessionState::Disconnected);

        session
            .set_remote_description(SessionDescription::offer("v=0"))
            .unwrap();
        session.create_answer().unwrap();
        session.on_gathering_complete();
        session.on_transport_state_change(TransportState::Connected);
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn test_negotiated_session_rejects_renegotiation_while_disconnected() {
        let (_, mut session) = session(Role::Offerer);
        session.create_offer().unwrap();
        session.on_gathering_complete();
        session
            .set_remote_description(SessionDescription::answer("v=0"))
            .unwrap();
        session.on_transport_state_change(TransportState::Disconnected);
        assert!(matches!(
            session.create_offer(),
            Err(SessionError::Negotiation(NegotiationError::InvalidState { .. }))
        ));
    }

    #[test]
    fn test_connected_transport_without_descriptions_does_not_connect() {
        let (_, mut session) = session(Role::Offerer);
        session.on_transport_state_change(TransportState::Connected);
        assert_eq!(session.state(), SessionState::New);
        assert!(!session.media().is_send_enabled());
    }

    #[test]
    fn test_close_is_terminal() {
        let (transport, mut session) = session(Role::Offerer);
        let out = session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(*transport.closed.lock());
        assert!(session.media().is_disposed());
        assert!(has_event(&out, |e| matches!(e, SessionEvent::Closed { .. })));

        assert!(session.close().is_empty());
        assert!(session.create_offer().is_err());
        assert!(session.add_remote_candidate(IceCandidate::new(CANDIDATE, "0")).is_err());
        assert!(session
            .handle_transport_event(TransportEvent::LocalCandidate(IceCandidate::new(CANDIDATE, "0")))
            .is_empty());
    }

    #[test]
    fn test_local_candidates_follow_description() {
        let (_, mut session) = session(Role::Offerer);
        let candidate = IceCandidate::new(CANDIDATE, "0");
        session.create_offer().unwrap();

        let out = session.handle_transport_event(TransportEvent::LocalCandidate(candidate.clone()));
        assert!(out.is_empty());

        let out = session.handle_transport_event(TransportEvent::GatheringComplete);
        let signals: Vec<_> = out
            .iter()
            .filter_map(|o| match o {
                SessionOutput::Signal(s) => Some(s.clone()),
                _ => None,
            })
            .collect();
        assert!(matches!(signals[0], SignalMessage::Description(_)));
        assert_eq!(signals[1], SignalMessage::Candidate(candidate.clone()));

        let out = session.handle_transport_event(TransportEvent::LocalCandidate(candidate.clone()));
        assert_eq!(out, vec![SessionOutput::Signal(SignalMessage::Candidate(candidate))]);
    }
}
