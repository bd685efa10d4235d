use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::{MessageId, UserId};

/// A stored direct message, as returned by the REST API and pushed over
/// the socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    /// Client-encrypted text (base64). The server never reads it.
    #[serde(default)]
    pub text: Option<String>,
    /// Reference to an uploaded image (`/blob/<uuid>`).
    #[serde(default)]
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Whether `user` is the sender or the receiver.
    pub fn involves(&self, user: &UserId) -> bool {
        self.sender_id == *user || self.receiver_id == *user
    }
}

/// Public view of a user. Credentials are never part of it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub profile_pic: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub sender_id: UserId,
    pub is_read: bool,
    pub date: DateTime<Utc>,
    pub message_id: MessageId,
}

impl NotificationPayload {
    pub fn for_message(message: &Message) -> Self {
        Self {
            sender_id: message.sender_id,
            is_read: false,
            date: Utc::now(),
            message_id: message.id,
        }
    }
}

// ---------------------------------------------------------------------------
// Call signaling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    /// Callee announces it has local media and can take a call.
    Ready,
    /// SDP offer
    Offer,
    /// SDP answer
    Answer,
    /// ICE candidate
    Candidate,
    /// Call ended
    Bye,
}

/// Payload of the `calling` event.
///
/// `id` names the peer: the target on the way to the server, the
/// originator once relayed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CallSignal {
    #[serde(rename = "type")]
    pub kind: SignalKind,
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
}

impl CallSignal {
    pub fn new(kind: SignalKind, id: UserId) -> Self {
        Self {
            kind,
            id,
            sdp: None,
            candidate: None,
            sdp_mid: None,
            sdp_m_line_index: None,
        }
    }

    pub fn with_sdp(mut self, sdp: impl Into<String>) -> Self {
        self.sdp = Some(sdp.into());
        self
    }

    pub fn with_candidate(
        mut self,
        candidate: impl Into<String>,
        sdp_mid: Option<String>,
        sdp_m_line_index: Option<u16>,
    ) -> Self {
        self.candidate = Some(candidate.into());
        self.sdp_mid = sdp_mid;
        self.sdp_m_line_index = sdp_m_line_index;
        self
    }
}

// ---------------------------------------------------------------------------
// Socket frames
// ---------------------------------------------------------------------------

/// Events pushed by the server. On the wire each is a JSON text frame
/// `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Every currently registered user, sorted by id.
    #[serde(rename = "getOnlineUsers")]
    OnlineUsers(Vec<UserId>),

    #[serde(rename = "newMessage")]
    NewMessage(Message),

    #[serde(rename = "getNotification")]
    Notification(NotificationPayload),

    #[serde(rename = "messageDeleted")]
    MessageDeleted(MessageId),

    #[serde(rename = "incomingCall")]
    IncomingCall {
        signal: serde_json::Value,
        from: UserId,
    },

    #[serde(rename = "calling")]
    Calling(CallSignal),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::OnlineUsers(_) => "getOnlineUsers",
            ServerEvent::NewMessage(_) => "newMessage",
            ServerEvent::Notification(_) => "getNotification",
            ServerEvent::MessageDeleted(_) => "messageDeleted",
            ServerEvent::IncomingCall { .. } => "incomingCall",
            ServerEvent::Calling(_) => "calling",
        }
    }

    pub fn to_frame(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_frame(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Events a client may send over its socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "calling")]
    Calling(CallSignal),

    /// Ring a user directly with an opaque signal blob.
    #[serde(rename = "callUser", rename_all = "camelCase")]
    CallUser {
        user_to_call: UserId,
        signal_data: serde_json::Value,
        /// Ignored by the server, which uses the socket's own identity.
        #[serde(default)]
        from: Option<UserId>,
    },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Calling(_) => "calling",
            ClientEvent::CallUser { .. } => "callUser",
        }
    }

    pub fn to_frame(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_frame(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}
