//! Client side of a one-to-one call.
//!
//! [`CallSession`] decides what to do with each relayed signal; the media
//! stack (peer connection, SDP, ICE) stays with the caller, which acts on
//! the returned [`CallAction`] and reports back through the `local_*`
//! methods. Each method that talks to the peer returns the [`ClientEvent`]
//! to send on the event socket.
//!
//! When both sides send an offer at once, the side with the greater user
//! id drops its own offer and answers; the other side ignores the
//! incoming offer and waits for that answer.

use parley_shared::protocol::{CallSignal, ClientEvent, SignalKind};
use parley_shared::types::UserId;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    OfferSent,
    OfferReceived,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallAction {
    /// Create a peer connection and an offer, then call
    /// [`CallSession::local_offer`].
    CreateOffer,
    /// Apply the remote offer, create an answer, then call
    /// [`CallSession::local_answer`].
    CreateAnswer { sdp: String },
    SetRemoteAnswer { sdp: String },
    AddIceCandidate {
        candidate: String,
        sdp_mid: Option<String>,
        sdp_m_line_index: Option<u16>,
    },
    /// Close the peer connection and release media.
    TearDown,
    Ignore,
}

#[derive(Debug, Clone)]
pub struct CallSession {
    local: UserId,
    peer: UserId,
    state: CallState,
    peer_connection: bool,
}

impl CallSession {
    pub fn new(local: UserId, peer: UserId) -> Self {
        Self {
            local,
            peer,
            state: CallState::Idle,
            peer_connection: false,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn peer(&self) -> UserId {
        self.peer
    }

    pub fn has_peer_connection(&self) -> bool {
        self.peer_connection
    }

    /// Tell the peer we have local media and can take a call.
    pub fn announce_ready(&self) -> ClientEvent {
        self.signal(SignalKind::Ready)
    }

    pub fn local_offer(&mut self, sdp: impl Into<String>) -> ClientEvent {
        self.peer_connection = true;
        self.state = CallState::OfferSent;
        debug!(peer = %self.peer.short(), "Sending SDP offer");
        ClientEvent::Calling(CallSignal::new(SignalKind::Offer, self.peer).with_sdp(sdp))
    }

    pub fn local_answer(&mut self, sdp: impl Into<String>) -> ClientEvent {
        self.state = CallState::Connected;
        debug!(peer = %self.peer.short(), "Sending SDP answer");
        ClientEvent::Calling(CallSignal::new(SignalKind::Answer, self.peer).with_sdp(sdp))
    }

    pub fn local_candidate(
        &self,
        candidate: impl Into<String>,
        sdp_mid: Option<String>,
        sdp_m_line_index: Option<u16>,
    ) -> ClientEvent {
        ClientEvent::Calling(
            CallSignal::new(SignalKind::Candidate, self.peer).with_candidate(
                candidate,
                sdp_mid,
                sdp_m_line_index,
            ),
        )
    }

    pub fn hang_up(&mut self) -> ClientEvent {
        self.reset();
        self.signal(SignalKind::Bye)
    }

    /// React to a relayed `calling` signal. Signals from anyone but this
    /// session's peer are ignored.
    pub fn handle(&mut self, signal: &CallSignal) -> CallAction {
        if signal.id != self.peer {
            debug!(from = %signal.id.short(), "Signal from another peer");
            return CallAction::Ignore;
        }

        match signal.kind {
            SignalKind::Ready => {
                if self.peer_connection {
                    debug!("Peer ready but a call is already set up");
                    return CallAction::Ignore;
                }
                CallAction::CreateOffer
            }
            SignalKind::Offer => {
                let Some(sdp) = signal.sdp.clone() else {
                    return CallAction::Ignore;
                };
                match self.state {
                    CallState::Idle => self.accept_offer(sdp),
                    CallState::OfferSent if self.local > self.peer => {
                        debug!(peer = %self.peer.short(), "Offer glare, yielding");
                        self.accept_offer(sdp)
                    }
                    CallState::OfferSent => {
                        debug!(peer = %self.peer.short(), "Offer glare, keeping own offer");
                        CallAction::Ignore
                    }
                    CallState::OfferReceived | CallState::Connected => CallAction::Ignore,
                }
            }
            SignalKind::Answer => match (self.state, signal.sdp.clone()) {
                (CallState::OfferSent, Some(sdp)) => {
                    self.state = CallState::Connected;
                    CallAction::SetRemoteAnswer { sdp }
                }
                _ => CallAction::Ignore,
            },
            SignalKind::Candidate => match (&signal.candidate, self.peer_connection) {
                (Some(candidate), true) => CallAction::AddIceCandidate {
                    candidate: candidate.clone(),
                    sdp_mid: signal.sdp_mid.clone(),
                    sdp_m_line_index: signal.sdp_m_line_index,
                },
                _ => CallAction::Ignore,
            },
            SignalKind::Bye => {
                if !self.peer_connection && self.state == CallState::Idle {
                    return CallAction::Ignore;
                }
                self.reset();
                CallAction::TearDown
            }
        }
    }

    fn accept_offer(&mut self, sdp: String) -> CallAction {
        self.peer_connection = true;
        self.state = CallState::OfferReceived;
        CallAction::CreateAnswer { sdp }
    }

    fn reset(&mut self) {
        self.peer_connection = false;
        self.state = CallState::Idle;
    }

    fn signal(&self, kind: SignalKind) -> ClientEvent {
        ClientEvent::Calling(CallSignal::new(kind, self.peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// What the relay hands the other side: `id` becomes the sender.
    fn relayed(event: ClientEvent, from: UserId) -> CallSignal {
        match event {
            ClientEvent::Calling(signal) => CallSignal { id: from, ..signal },
            other => panic!("unexpected event {other:?}"),
        }
    }

    fn pair() -> (CallSession, CallSession) {
        let a = UserId::new();
        let b = UserId::new();
        (CallSession::new(a, b), CallSession::new(b, a))
    }

    #[test]
    fn test_ready_offer_answer_flow() {
        let (mut caller, mut callee) = pair();
        let caller_id = callee.peer();
        let callee_id = caller.peer();

        let ready = relayed(callee.announce_ready(), callee_id);
        assert_eq!(caller.handle(&ready), CallAction::CreateOffer);

        let offer = relayed(caller.local_offer("offer-sdp"), caller_id);
        assert_eq!(
            callee.handle(&offer),
            CallAction::CreateAnswer { sdp: "offer-sdp".into() }
        );

        let answer = relayed(callee.local_answer("answer-sdp"), callee_id);
        assert_eq!(
            caller.handle(&answer),
            CallAction::SetRemoteAnswer { sdp: "answer-sdp".into() }
        );
        assert_eq!(caller.state(), CallState::Connected);
        assert_eq!(callee.state(), CallState::Connected);

        // A second ready does not start another call.
        assert_eq!(caller.handle(&ready), CallAction::Ignore);
    }

    #[test]
    fn test_glare_resolves_to_exactly_one_answerer() {
        let (mut a, mut b) = pair();
        let a_id = b.peer();
        let b_id = a.peer();

        let offer_a = relayed(a.local_offer("sdp-a"), a_id);
        let offer_b = relayed(b.local_offer("sdp-b"), b_id);

        let a_action = a.handle(&offer_b);
        let b_action = b.handle(&offer_a);

        let (yielder, yielded_action, keeper_action) = if a_id > b_id {
            (&a, &a_action, &b_action)
        } else {
            (&b, &b_action, &a_action)
        };
        assert!(matches!(yielded_action, CallAction::CreateAnswer { .. }));
        assert_eq!(keeper_action, &CallAction::Ignore);
        assert_eq!(yielder.state(), CallState::OfferReceived);
    }

    #[test]
    fn test_answer_without_offer_is_ignored() {
        let (mut a, _) = pair();
        let answer = CallSignal::new(SignalKind::Answer, a.peer()).with_sdp("x");
        assert_eq!(a.handle(&answer), CallAction::Ignore);
        assert_eq!(a.state(), CallState::Idle);
    }

    #[test]
    fn test_candidate_needs_peer_connection() {
        let (mut a, _) = pair();
        let candidate =
            CallSignal::new(SignalKind::Candidate, a.peer()).with_candidate("c1", Some("0".into()), Some(0));
        assert_eq!(a.handle(&candidate), CallAction::Ignore);

        a.local_offer("sdp");
        assert_eq!(
            a.handle(&candidate),
            CallAction::AddIceCandidate {
                candidate: "c1".into(),
                sdp_mid: Some("0".into()),
                sdp_m_line_index: Some(0),
            }
        );
    }

    #[test]
    fn test_bye_tears_down_only_active_call() {
        let (mut a, _) = pair();
        let bye = CallSignal::new(SignalKind::Bye, a.peer());
        assert_eq!(a.handle(&bye), CallAction::Ignore);

        a.local_offer("sdp");
        assert_eq!(a.handle(&bye), CallAction::TearDown);
        assert_eq!(a.state(), CallState::Idle);
        assert!(!a.has_peer_connection());
    }

    #[test]
    fn test_signal_from_other_peer_is_ignored() {
        let (mut a, _) = pair();
        let offer = CallSignal::new(SignalKind::Offer, UserId::new()).with_sdp("x");
        assert_eq!(a.handle(&offer), CallAction::Ignore);
    }

    #[test]
    fn test_hang_up_sends_bye_and_resets() {
        let (mut a, _) = pair();
        a.local_offer("sdp");
        let bye = a.hang_up();
        assert!(matches!(bye, ClientEvent::Calling(ref s) if s.kind == SignalKind::Bye));
        assert_eq!(a.state(), CallState::Idle);
    }
}
