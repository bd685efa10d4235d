//! Client-side chat state.
//!
//! [`ChatStore`] is a reducer: REST results and socket pushes are turned
//! into [`Action`]s and applied in arrival order. Each action replaces one
//! slice of state. Duplicate deliveries (the same message from a fetch and
//! a push) are merged by id, so the store tolerates replays and races
//! between the two paths.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use parley_shared::crypto::MessageCipher;
use parley_shared::protocol::{Message, NotificationPayload, ServerEvent, UserProfile};
use parley_shared::types::{MessageId, UserId};
use tracing::debug;

/// A message as displayed: text already decrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    /// Plaintext, or `""` when the stored text could not be decrypted.
    pub text: String,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    fn decrypted(message: Message, cipher: &MessageCipher) -> Self {
        Self {
            text: cipher.decrypt_text(message.text.as_deref()),
            id: message.id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            image: message.image,
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    UsersLoading,
    UsersLoaded(Vec<UserProfile>),
    /// Open a conversation. Switching peers clears the message list.
    SelectUser(Option<UserId>),
    MessagesLoading,
    /// Result of fetching the conversation with `peer`.
    MessagesLoaded { peer: UserId, messages: Vec<Message> },
    /// Our own message, echoed by the send call.
    MessageSent { message: Message, plaintext: String },
    /// `newMessage` push.
    MessageReceived(Message),
    /// `messageDeleted` push, or a local delete that succeeded.
    MessageDeleted(MessageId),
    /// Everything exchanged with `peer` was cleared locally.
    ConversationCleared(UserId),
    NotificationReceived(NotificationPayload),
    MarkReadFrom(UserId),
    MarkAllRead,
    OnlineUsers(Vec<UserId>),
    RequestFailed(String),
    ClearError,
}

impl Action {
    /// The store's view of a push. Call signaling is not store state.
    pub fn from_server_event(event: ServerEvent) -> Option<Action> {
        match event {
            ServerEvent::OnlineUsers(users) => Some(Action::OnlineUsers(users)),
            ServerEvent::NewMessage(message) => Some(Action::MessageReceived(message)),
            ServerEvent::Notification(n) => Some(Action::NotificationReceived(n)),
            ServerEvent::MessageDeleted(id) => Some(Action::MessageDeleted(id)),
            ServerEvent::IncomingCall { .. } | ServerEvent::Calling(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatStore {
    cipher: MessageCipher,
    users: Vec<UserProfile>,
    selected_user: Option<UserId>,
    messages: Vec<ChatMessage>,
    notifications: Vec<NotificationPayload>,
    online_users: BTreeSet<UserId>,
    users_loading: bool,
    messages_loading: bool,
    last_error: Option<String>,
}

impl ChatStore {
    pub fn new(cipher: MessageCipher) -> Self {
        Self {
            cipher,
            users: Vec::new(),
            selected_user: None,
            messages: Vec::new(),
            notifications: Vec::new(),
            online_users: BTreeSet::new(),
            users_loading: false,
            messages_loading: false,
            last_error: None,
        }
    }

    pub fn apply(&mut self, action: Action) {
        match action {
            Action::UsersLoading => self.users_loading = true,
            Action::UsersLoaded(users) => {
                self.users = users;
                self.users_loading = false;
            }
            Action::SelectUser(user) => {
                if self.selected_user != user {
                    self.messages.clear();
                }
                self.selected_user = user;
            }
            Action::MessagesLoading => self.messages_loading = true,
            Action::MessagesLoaded { peer, messages } => {
                self.messages_loading = false;
                if self.selected_user != Some(peer) {
                    debug!(peer = %peer, "Dropping fetch for a conversation no longer open");
                    return;
                }
                for message in messages {
                    let message = ChatMessage::decrypted(message, &self.cipher);
                    self.push_unique(message);
                }
            }
            Action::MessageSent { message, plaintext } => {
                let mut message = ChatMessage::decrypted(message, &self.cipher);
                message.text = plaintext;
                self.push_unique(message);
            }
            Action::MessageReceived(message) => {
                if self.selected_user != Some(message.sender_id) {
                    debug!(message = %message.id, "Message outside the open conversation");
                    return;
                }
                let message = ChatMessage::decrypted(message, &self.cipher);
                self.push_unique(message);
            }
            Action::MessageDeleted(id) => self.messages.retain(|m| m.id != id),
            Action::ConversationCleared(peer) => self
                .messages
                .retain(|m| m.sender_id != peer && m.receiver_id != peer),
            Action::NotificationReceived(notification) => {
                self.notifications.insert(0, notification);
            }
            Action::MarkReadFrom(sender) => {
                for n in self.notifications.iter_mut().filter(|n| n.sender_id == sender) {
                    n.is_read = true;
                }
            }
            Action::MarkAllRead => {
                for n in &mut self.notifications {
                    n.is_read = true;
                }
            }
            Action::OnlineUsers(users) => self.online_users = users.into_iter().collect(),
            Action::RequestFailed(error) => {
                self.users_loading = false;
                self.messages_loading = false;
                self.last_error = Some(error);
            }
            Action::ClearError => self.last_error = None,
        }
    }

    /// Apply a push; returns `false` for events the store does not track.
    pub fn apply_server_event(&mut self, event: ServerEvent) -> bool {
        match Action::from_server_event(event) {
            Some(action) => {
                self.apply(action);
                true
            }
            None => false,
        }
    }

    fn push_unique(&mut self, message: ChatMessage) {
        if self.messages.iter().any(|m| m.id == message.id) {
            return;
        }
        self.messages.push(message);
    }

    pub fn users(&self) -> &[UserProfile] {
        &self.users
    }

    pub fn selected_user(&self) -> Option<UserId> {
        self.selected_user
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn notifications(&self) -> &[NotificationPayload] {
        &self.notifications
    }

    pub fn unread_count(&self) -> usize {
        self.notifications.iter().filter(|n| !n.is_read).count()
    }

    pub fn unread_from(&self, sender: UserId) -> usize {
        self.notifications
            .iter()
            .filter(|n| !n.is_read && n.sender_id == sender)
            .count()
    }

    pub fn online_users(&self) -> &BTreeSet<UserId> {
        &self.online_users
    }

    pub fn is_online(&self, user: &UserId) -> bool {
        self.online_users.contains(user)
    }

    pub fn users_loading(&self) -> bool {
        self.users_loading
    }

    pub fn messages_loading(&self) -> bool {
        self.messages_loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new(MessageCipher::shared())
    }
}
