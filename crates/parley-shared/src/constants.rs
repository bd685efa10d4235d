/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Maximum encoded message text size in bytes (256 KiB)
pub const MAX_MESSAGE_SIZE: usize = 262_144;

/// Maximum image upload size in bytes (10 MiB)
pub const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 5001;

/// Path of the real-time socket endpoint.
pub const SOCKET_PATH: &str = "/socket";

/// Key derivation context (BLAKE3) for the shared message key
pub const KDF_CONTEXT_MESSAGE_KEY: &str = "parley-message-key-v1";

/// Passphrase every client derives the message key from.
///
/// Shipped to every client, so the cipher only obfuscates text at rest.
pub const SHARED_MESSAGE_PASSPHRASE: &str = "secretkeyforencdec";
