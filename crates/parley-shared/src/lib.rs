//! # parley-shared
//!
//! Types shared by the Parley server and client: identifiers, the wire
//! models returned by the REST API, the real-time event protocol carried
//! over the socket, and the message text cipher.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod types;

pub use protocol::{
    CallSignal, ClientEvent, Message, NotificationPayload, ServerEvent, SignalKind, UserProfile,
};
pub use types::{ConnectionId, MessageId, UserId};
