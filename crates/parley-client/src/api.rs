//! REST client for the message endpoints.

use parley_shared::crypto::MessageCipher;
use parley_shared::protocol::{Message, UserProfile};
use parley_shared::types::{MessageId, UserId};
use reqwest::Response;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    user_id: UserId,
    cipher: MessageCipher,
}

#[derive(Serialize)]
struct SendMessageBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub message: String,
    pub message_id: MessageId,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DeleteAllResponse {
    pub message: String,
    pub deleted: usize,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl ApiClient {
    /// A client acting as `user_id`.
    pub fn new(config: &ClientConfig, user_id: UserId) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_id,
            cipher: config.cipher(),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub async fn list_users(&self) -> Result<Vec<UserProfile>> {
        let resp = self.get("/messages/users").await?;
        Ok(check(resp).await?.json().await?)
    }

    pub async fn get_messages(&self, peer: UserId) -> Result<Vec<Message>> {
        let resp = self.get(&format!("/messages/{peer}")).await?;
        Ok(check(resp).await?.json().await?)
    }

    /// Encrypt `plaintext` and send it with an optional inline image
    /// (data URL). Returns the stored message.
    pub async fn send_message(
        &self,
        receiver: UserId,
        plaintext: Option<&str>,
        image: Option<&str>,
    ) -> Result<Message> {
        let text = plaintext
            .map(|text| self.cipher.encrypt_text(text))
            .transpose()?;
        let body = SendMessageBody { text, image };

        let resp = self
            .http
            .post(self.url(&format!("/messages/send/{receiver}")))
            .bearer_auth(self.user_id)
            .json(&body)
            .send()
            .await?;
        let message: Message = check(resp).await?.json().await?;
        debug!(message = %message.id, to = %receiver, "Message sent");
        Ok(message)
    }

    pub async fn delete_message(&self, id: MessageId) -> Result<DeleteResponse> {
        let resp = self.delete(&format!("/messages/delete/{id}")).await?;
        Ok(check(resp).await?.json().await?)
    }

    /// Delete everything this user sent to `peer`.
    pub async fn delete_all_messages(&self, peer: UserId) -> Result<DeleteAllResponse> {
        let resp = self.delete(&format!("/messages/deleteAll/{peer}")).await?;
        Ok(check(resp).await?.json().await?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> Result<Response> {
        Ok(self
            .http
            .get(self.url(path))
            .bearer_auth(self.user_id)
            .send()
            .await?)
    }

    async fn delete(&self, path: &str) -> Result<Response> {
        Ok(self
            .http
            .delete(self.url(path))
            .bearer_auth(self.user_id)
            .send()
            .await?)
    }
}

/// Turn an error status into [`ClientError::Api`], using the server's
/// `{"error": ...}` body when present.
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let message = match resp.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string(),
    };
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}
