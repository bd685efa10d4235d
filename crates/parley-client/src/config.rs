use parley_shared::constants::{DEFAULT_HTTP_PORT, SHARED_MESSAGE_PASSPHRASE, SOCKET_PATH};
use parley_shared::crypto::MessageCipher;

use crate::error::{ClientError, Result};

/// Where the client finds the server, and how it derives the message key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// REST base URL, without a trailing slash.
    pub base_url: String,
    /// Full URL of the event socket endpoint.
    pub socket_url: String,
    pub message_key_passphrase: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: format!("http://localhost:{DEFAULT_HTTP_PORT}"),
            socket_url: format!("ws://localhost:{DEFAULT_HTTP_PORT}{SOCKET_PATH}"),
            message_key_passphrase: SHARED_MESSAGE_PASSPHRASE.to_string(),
        }
    }
}

impl ClientConfig {
    /// Derive both URLs from an `http(s)://` base.
    pub fn from_base_url(base_url: &str) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let socket_base = if let Some(rest) = base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return Err(ClientError::InvalidUrl(base_url));
        };

        Ok(Self {
            socket_url: format!("{socket_base}{SOCKET_PATH}"),
            base_url,
            ..Self::default()
        })
    }

    pub fn cipher(&self) -> MessageCipher {
        MessageCipher::from_passphrase(&self.message_key_passphrase)
    }
}
