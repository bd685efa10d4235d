//! Message service: persists through [`Storage`], then pushes through the
//! [`Gateway`]. Pushes are best-effort and never fail a request.

use std::sync::Arc;

use chrono::Utc;
use parley_shared::constants::MAX_MESSAGE_SIZE;
use parley_shared::protocol::{Message, NotificationPayload, ServerEvent, UserProfile};
use parley_shared::types::{MessageId, UserId};
use parley_store::StoreError;
use tracing::{debug, info, warn};

use crate::blob_store::{parse_blob_reference, BlobStore};
use crate::error::ServerError;
use crate::gateway::Gateway;
use crate::storage::Storage;

/// Result of a bulk delete. An empty pair is reported, not treated as an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted(usize),
    NothingToDelete,
}

impl DeleteOutcome {
    pub fn count(&self) -> usize {
        match self {
            DeleteOutcome::Deleted(n) => *n,
            DeleteOutcome::NothingToDelete => 0,
        }
    }
}

#[derive(Clone)]
pub struct MessageService {
    storage: Storage,
    gateway: Gateway,
    blobs: Arc<BlobStore>,
}

impl MessageService {
    pub fn new(storage: Storage, gateway: Gateway, blobs: Arc<BlobStore>) -> Self {
        Self {
            storage,
            gateway,
            blobs,
        }
    }

    pub async fn list_contacts(&self, caller: UserId) -> Result<Vec<UserProfile>, ServerError> {
        let users = self
            .storage
            .run("list_users_except", move |db| db.list_users_except(caller))
            .await?;
        Ok(users.iter().map(|u| u.profile()).collect())
    }

    /// Both directions of the `a`/`b` conversation, oldest first.
    pub async fn list_conversation(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Vec<Message>, ServerError> {
        self.storage
            .run("get_conversation", move |db| db.get_conversation(a, b))
            .await
    }

    /// Store a message and push it to the receiver if they are online.
    ///
    /// Neither `text` nor `image` is required. `image` is an inline data URL
    /// or bare base64 and is replaced by a blob reference before storing.
    pub async fn send(
        &self,
        sender: UserId,
        receiver: UserId,
        text: Option<String>,
        image: Option<String>,
    ) -> Result<Message, ServerError> {
        if let Some(text) = &text {
            if text.len() > MAX_MESSAGE_SIZE {
                return Err(ServerError::BadRequest(format!(
                    "Message text too long: {} bytes (max {MAX_MESSAGE_SIZE})",
                    text.len()
                )));
            }
        }

        let receiver_known = self
            .storage
            .run("user_exists", move |db| db.user_exists(receiver))
            .await?;
        if !receiver_known {
            return Err(ServerError::UserNotFound(receiver));
        }

        let image = match image.as_deref().map(str::trim) {
            Some(inline) if !inline.is_empty() => Some(self.blobs.store_image(inline).await?),
            _ => None,
        };

        let message = Message {
            id: MessageId::new(),
            sender_id: sender,
            receiver_id: receiver,
            text,
            image,
            created_at: Utc::now(),
        };

        self.persist(&message).await?;
        info!(message = %message.id, from = %sender, to = %receiver, "Message stored");

        if self
            .gateway
            .send_to_user(receiver, ServerEvent::NewMessage(message.clone()))
            .await
        {
            let notification = NotificationPayload::for_message(&message);
            self.gateway
                .send_to_user(receiver, ServerEvent::Notification(notification))
                .await;
        } else {
            debug!(message = %message.id, to = %receiver, "Receiver offline, message kept for later fetch");
        }

        Ok(message)
    }

    /// Delete one message the caller sent or received.
    pub async fn delete_one(
        &self,
        caller: UserId,
        message_id: MessageId,
    ) -> Result<Message, ServerError> {
        let found = self
            .storage
            .run("get_message_by_id", move |db| {
                match db.get_message_by_id(message_id) {
                    Ok(message) => Ok(Some(message)),
                    Err(StoreError::NotFound) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await?;
        let message = match found {
            Some(message) if message.involves(&caller) => message,
            _ => return Err(ServerError::MessageNotFound(message_id)),
        };

        let removed = self
            .storage
            .run("delete_message", move |db| db.delete_message(message_id))
            .await?;
        if !removed {
            // Lost a race with another delete.
            return Err(ServerError::MessageNotFound(message_id));
        }

        self.discard_image(&message).await;
        info!(message = %message_id, by = %caller, "Message deleted");

        self.gateway
            .send_to_user(message.receiver_id, ServerEvent::MessageDeleted(message_id))
            .await;

        Ok(message)
    }

    /// Delete every message `sender` sent to `receiver`. The reverse
    /// direction is left alone.
    pub async fn delete_conversation_from(
        &self,
        sender: UserId,
        receiver: UserId,
    ) -> Result<DeleteOutcome, ServerError> {
        let deleted = self
            .storage
            .run("delete_messages_from", move |db| {
                db.delete_messages_from(sender, receiver)
            })
            .await?;

        info!(from = %sender, to = %receiver, deleted, "Conversation cleared");

        Ok(if deleted == 0 {
            DeleteOutcome::NothingToDelete
        } else {
            DeleteOutcome::Deleted(deleted)
        })
    }

    /// Insert `message`. Its image blob is removed only when the insert
    /// definitely failed; a timed-out insert may still commit.
    async fn persist(&self, message: &Message) -> Result<(), ServerError> {
        let stored = message.clone();
        match self
            .storage
            .run("insert_message", move |db| db.insert_message(&stored))
            .await
        {
            Ok(()) => Ok(()),
            Err(ServerError::StorageTimeout) => {
                warn!(message = %message.id, "Insert timed out, keeping image blob");
                Err(ServerError::StorageTimeout)
            }
            Err(e) => {
                self.discard_image(message).await;
                Err(e)
            }
        }
    }

    async fn discard_image(&self, message: &Message) {
        let Some(id) = message.image.as_deref().and_then(parse_blob_reference) else {
            return;
        };
        if let Err(e) = self.blobs.delete_blob(id).await {
            warn!(message = %message.id, blob = %id, error = %e, "Failed to remove image blob");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use parley_store::{Database, NewUser};
    use tempfile::TempDir;

    use crate::presence::PresenceRegistry;

    struct Fixture {
        service: MessageService,
        gateway: Gateway,
        storage: Storage,
        blobs: Arc<BlobStore>,
        _blob_dir: TempDir,
    }

    async fn fixture() -> Fixture {
        fixture_with_timeout(Duration::from_secs(5)).await
    }

    async fn fixture_with_timeout(timeout: Duration) -> Fixture {
        let storage = Storage::new(Database::open_in_memory().unwrap(), timeout);
        let gateway = Gateway::new(PresenceRegistry::new(), 16);
        let dir = TempDir::new().unwrap();
        let blobs = Arc::new(BlobStore::new(dir.path().to_path_buf(), 1024).await.unwrap());
        Fixture {
            service: MessageService::new(storage.clone(), gateway.clone(), blobs.clone()),
            gateway,
            storage,
            blobs,
            _blob_dir: dir,
        }
    }

    async fn message_with_image(f: &Fixture, sender: UserId, receiver: UserId) -> Message {
        let reference = f
            .blobs
            .store_image("data:image/gif;base64,R0lGODlh")
            .await
            .unwrap();
        Message {
            id: MessageId::new(),
            sender_id: sender,
            receiver_id: receiver,
            text: None,
            image: Some(reference),
            created_at: Utc::now(),
        }
    }

    fn blob_id(message: &Message) -> uuid::Uuid {
        parse_blob_reference(message.image.as_deref().unwrap()).unwrap()
    }

    async fn user(storage: &Storage, email: &str) -> UserId {
        let email = email.to_string();
        storage
            .run("insert_user", move |db| {
                db.insert_user(&NewUser {
                    email,
                    full_name: "Test".into(),
                    profile_pic: None,
                    password_hash: "hash".into(),
                })
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_send_pushes_message_then_notification() {
        let f = fixture().await;
        let alice = user(&f.storage, "a@example.com").await;
        let bob = user(&f.storage, "b@example.com").await;
        let mut bob_socket = f.gateway.connect(bob).await;

        let sent = f
            .service
            .send(alice, bob, Some("ciphertext".into()), None)
            .await
            .unwrap();

        assert_eq!(
            bob_socket.events.recv().await.unwrap(),
            ServerEvent::NewMessage(sent.clone())
        );
        match bob_socket.events.recv().await.unwrap() {
            ServerEvent::Notification(n) => {
                assert_eq!(n.sender_id, alice);
                assert_eq!(n.message_id, sent.id);
                assert!(!n.is_read);
            }
            other => panic!("unexpected event {other:?}"),
        }

        let stored = f.service.list_conversation(bob, alice).await.unwrap();
        assert_eq!(stored, vec![sent]);
    }

    #[tokio::test]
    async fn test_send_to_offline_receiver_still_stores() {
        let f = fixture().await;
        let alice = user(&f.storage, "a@example.com").await;
        let bob = user(&f.storage, "b@example.com").await;

        let sent = f.service.send(alice, bob, None, None).await.unwrap();
        assert!(sent.text.is_none() && sent.image.is_none());
        assert_eq!(f.service.list_conversation(alice, bob).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_send_to_unknown_receiver() {
        let f = fixture().await;
        let alice = user(&f.storage, "a@example.com").await;
        let result = f.service.send(alice, UserId::new(), Some("x".into()), None).await;
        assert!(matches!(result, Err(ServerError::UserNotFound(_))));
    }

    #[tokio::test]
    async fn test_send_rejects_oversized_text() {
        let f = fixture().await;
        let alice = user(&f.storage, "a@example.com").await;
        let bob = user(&f.storage, "b@example.com").await;
        let text = "x".repeat(MAX_MESSAGE_SIZE + 1);
        let result = f.service.send(alice, bob, Some(text), None).await;
        assert!(matches!(result, Err(ServerError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_send_stores_image_reference() {
        let f = fixture().await;
        let alice = user(&f.storage, "a@example.com").await;
        let bob = user(&f.storage, "b@example.com").await;

        let sent = f
            .service
            .send(alice, bob, None, Some("data:image/gif;base64,R0lGODlh".into()))
            .await
            .unwrap();
        let reference = sent.image.unwrap();
        assert!(parse_blob_reference(&reference).is_some());
    }

    #[tokio::test]
    async fn test_timed_out_insert_keeps_image() {
        let f = fixture_with_timeout(Duration::from_millis(50)).await;
        let alice = user(&f.storage, "a@example.com").await;
        let bob = user(&f.storage, "b@example.com").await;
        let message = message_with_image(&f, alice, bob).await;

        // Hold the connection so the insert cannot start before the deadline.
        let (held_tx, held_rx) = tokio::sync::oneshot::channel();
        let busy = f.storage.clone();
        tokio::spawn(async move {
            let _ = busy
                .run("hold", move |_| {
                    let _ = held_tx.send(());
                    std::thread::sleep(Duration::from_millis(300));
                    Ok(())
                })
                .await;
        });
        held_rx.await.unwrap();

        let result = f.service.persist(&message).await;
        assert!(matches!(result, Err(ServerError::StorageTimeout)));
        assert!(f.blobs.get_blob(blob_id(&message)).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_insert_discards_image() {
        let f = fixture().await;
        let alice = user(&f.storage, "a@example.com").await;
        // No such receiver row, so the foreign key rejects the insert.
        let message = message_with_image(&f, alice, UserId::new()).await;

        assert!(f.service.persist(&message).await.is_err());
        assert!(f.blobs.get_blob(blob_id(&message)).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_one_twice() {
        let f = fixture().await;
        let alice = user(&f.storage, "a@example.com").await;
        let bob = user(&f.storage, "b@example.com").await;
        let mut bob_socket = f.gateway.connect(bob).await;

        let sent = f.service.send(alice, bob, Some("x".into()), None).await.unwrap();
        // newMessage + getNotification
        bob_socket.events.recv().await.unwrap();
        bob_socket.events.recv().await.unwrap();

        f.service.delete_one(alice, sent.id).await.unwrap();
        assert_eq!(
            bob_socket.events.recv().await.unwrap(),
            ServerEvent::MessageDeleted(sent.id)
        );

        let again = f.service.delete_one(alice, sent.id).await;
        assert!(matches!(again, Err(ServerError::MessageNotFound(id)) if id == sent.id));
    }

    #[tokio::test]
    async fn test_delete_one_by_outsider_is_not_found() {
        let f = fixture().await;
        let alice = user(&f.storage, "a@example.com").await;
        let bob = user(&f.storage, "b@example.com").await;
        let eve = user(&f.storage, "e@example.com").await;

        let sent = f.service.send(alice, bob, Some("x".into()), None).await.unwrap();
        let result = f.service.delete_one(eve, sent.id).await;
        assert!(matches!(result, Err(ServerError::MessageNotFound(_))));
        assert_eq!(f.service.list_conversation(alice, bob).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_conversation_is_directional() {
        let f = fixture().await;
        let alice = user(&f.storage, "a@example.com").await;
        let bob = user(&f.storage, "b@example.com").await;

        f.service.send(alice, bob, Some("1".into()), None).await.unwrap();
        f.service.send(alice, bob, Some("2".into()), None).await.unwrap();
        let reply = f.service.send(bob, alice, Some("3".into()), None).await.unwrap();

        let outcome = f.service.delete_conversation_from(alice, bob).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted(2));
        assert_eq!(
            f.service.list_conversation(alice, bob).await.unwrap(),
            vec![reply]
        );

        let outcome = f.service.delete_conversation_from(alice, bob).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::NothingToDelete);
        assert_eq!(outcome.count(), 0);
    }

    #[tokio::test]
    async fn test_contacts_exclude_caller() {
        let f = fixture().await;
        let alice = user(&f.storage, "a@example.com").await;
        let bob = user(&f.storage, "b@example.com").await;

        let contacts = f.service.list_contacts(alice).await.unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].id, bob);
    }
}
