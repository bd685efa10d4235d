//! REST calls wired into the store.
//!
//! [`ChatClient`] runs one request, turns the result into an [`Action`]
//! and applies it to the [`ChatStore`] it was handed. Failures land in the
//! store's `last_error` as well as being returned.

use parley_shared::protocol::{CallSignal, ServerEvent};
use parley_shared::types::{MessageId, UserId};
use serde_json::Value;

use crate::api::ApiClient;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::store::{Action, ChatStore};

/// A push the store does not handle.
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    Signal(CallSignal),
    Incoming { signal: Value, from: UserId },
}

pub struct ChatClient {
    api: ApiClient,
    store: ChatStore,
}

impl ChatClient {
    pub fn new(api: ApiClient, store: ChatStore) -> Self {
        Self { api, store }
    }

    /// A client acting as `user_id` whose REST calls and store share the
    /// message key derived from `config`.
    pub fn from_config(config: &ClientConfig, user_id: UserId) -> Self {
        Self::new(
            ApiClient::new(config, user_id),
            ChatStore::new(config.cipher()),
        )
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub async fn load_users(&mut self) -> Result<()> {
        self.store.apply(Action::UsersLoading);
        let result = self.api.list_users().await;
        let users = self.record(result)?;
        self.store.apply(Action::UsersLoaded(users));
        Ok(())
    }

    /// Select `peer` and fetch the conversation.
    pub async fn open_conversation(&mut self, peer: UserId) -> Result<()> {
        self.store.apply(Action::SelectUser(Some(peer)));
        self.store.apply(Action::MessagesLoading);
        let result = self.api.get_messages(peer).await;
        let messages = self.record(result)?;
        self.store.apply(Action::MessagesLoaded { peer, messages });
        Ok(())
    }

    /// Send to the selected user.
    pub async fn send(&mut self, text: Option<&str>, image: Option<&str>) -> Result<()> {
        let Some(peer) = self.store.selected_user() else {
            return Ok(());
        };
        let result = self.api.send_message(peer, text, image).await;
        let message = self.record(result)?;
        self.store.apply(Action::MessageSent {
            message,
            plaintext: text.unwrap_or_default().to_string(),
        });
        Ok(())
    }

    pub async fn delete_message(&mut self, id: MessageId) -> Result<()> {
        let result = self.api.delete_message(id).await;
        self.record(result)?;
        self.store.apply(Action::MessageDeleted(id));
        Ok(())
    }

    /// Clear what we sent to the selected user. Returns how many messages
    /// the server removed.
    pub async fn delete_all_messages(&mut self) -> Result<usize> {
        let Some(peer) = self.store.selected_user() else {
            return Ok(0);
        };
        let result = self.api.delete_all_messages(peer).await;
        let resp = self.record(result)?;
        self.store.apply(Action::ConversationCleared(peer));
        Ok(resp.deleted)
    }

    pub fn mark_read_from(&mut self, sender: UserId) {
        self.store.apply(Action::MarkReadFrom(sender));
    }

    pub fn mark_all_read(&mut self) {
        self.store.apply(Action::MarkAllRead);
    }

    /// Feed a socket push into the store; call events are handed back.
    pub fn handle_event(&mut self, event: ServerEvent) -> Option<CallEvent> {
        match event {
            ServerEvent::Calling(signal) => Some(CallEvent::Signal(signal)),
            ServerEvent::IncomingCall { signal, from } => Some(CallEvent::Incoming { signal, from }),
            other => {
                self.store.apply_server_event(other);
                None
            }
        }
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.store.apply(Action::RequestFailed(e.user_message()));
        }
        result
    }
}
