//! Call signaling relay.
//!
//! Stateless: a signal names its target in `id`, the relay swaps that for
//! the authenticated originator and forwards it to the target's socket.
//! No call state is kept on the server.

use parley_shared::protocol::{CallSignal, ClientEvent, ServerEvent};
use parley_shared::types::UserId;
use tracing::debug;

use crate::gateway::Gateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Delivered,
    TargetOffline,
    SelfTargeted,
}

#[derive(Clone)]
pub struct SignalingRelay {
    gateway: Gateway,
}

impl SignalingRelay {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub async fn relay(&self, from: UserId, event: ClientEvent) -> RelayOutcome {
        match event {
            ClientEvent::Calling(signal) => self.relay_signal(from, signal).await,
            // `from` in the payload is ignored; the socket's identity is used.
            ClientEvent::CallUser {
                user_to_call,
                signal_data,
                ..
            } => {
                let event = ServerEvent::IncomingCall {
                    signal: signal_data,
                    from,
                };
                self.deliver(from, user_to_call, event).await
            }
        }
    }

    async fn relay_signal(&self, from: UserId, signal: CallSignal) -> RelayOutcome {
        let target = signal.id;
        let forwarded = CallSignal { id: from, ..signal };
        self.deliver(from, target, ServerEvent::Calling(forwarded)).await
    }

    async fn deliver(&self, from: UserId, target: UserId, event: ServerEvent) -> RelayOutcome {
        if from == target {
            debug!(user = %from, event = event.name(), "Dropping self-targeted signal");
            return RelayOutcome::SelfTargeted;
        }

        let name = event.name();
        if self.gateway.send_to_user(target, event).await {
            debug!(from = %from, to = %target, event = name, "Signal relayed");
            RelayOutcome::Delivered
        } else {
            debug!(from = %from, to = %target, event = name, "Signal target unreachable");
            RelayOutcome::TargetOffline
        }
    }
}
