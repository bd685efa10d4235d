use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Invalid ciphertext encoding: {0}")]
    Encoding(#[from] base64::DecodeError),
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed event frame: {0}")]
    Malformed(#[from] serde_json::Error),
}
