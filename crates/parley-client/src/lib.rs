//! # parley-client
//!
//! Client library for Parley: the REST client, the event socket, the chat
//! state store that reconciles both, and the call signaling policy. UI
//! layers drive a [`ChatClient`] and render from its [`ChatStore`].

pub mod api;
pub mod call;
pub mod chat;
pub mod config;
pub mod error;
pub mod socket;
pub mod store;

pub use api::ApiClient;
pub use call::{CallAction, CallSession, CallState};
pub use chat::{CallEvent, ChatClient};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use socket::EventSocket;
pub use store::{Action, ChatMessage, ChatStore};

use tracing_subscriber::{fmt, EnvFilter};

/// Install the default log subscriber for a client binary. Honors
/// `RUST_LOG`.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("parley_client=debug,warn"));

    // A subscriber may already be installed by the embedding app.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
