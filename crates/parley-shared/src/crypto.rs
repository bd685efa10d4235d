//! Text obfuscation for message bodies.
//!
//! Every client derives the same key from [`SHARED_MESSAGE_PASSPHRASE`], so
//! this keeps text unreadable in the database and in transit logs but gives
//! no confidentiality against anyone holding a client build. Deployments
//! that need real secrecy must switch to per-session or server-held keys.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::constants::{KDF_CONTEXT_MESSAGE_KEY, NONCE_SIZE, SHARED_MESSAGE_PASSPHRASE};
use crate::error::CryptoError;

pub type SymmetricKey = [u8; 32];

pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

// Returns nonce || ciphertext (24 bytes nonce prepended)
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce_bytes = generate_nonce();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

pub fn decrypt(key: &SymmetricKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XNonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

pub fn derive_key_from_passphrase(passphrase: &[u8], context: &str) -> SymmetricKey {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(passphrase);
    let hash = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&hash.as_bytes()[..32]);
    key
}

/// Encrypts message text into a base64 string and back.
#[derive(Clone)]
pub struct MessageCipher {
    key: SymmetricKey,
}

impl MessageCipher {
    pub fn from_passphrase(passphrase: &str) -> Self {
        Self {
            key: derive_key_from_passphrase(passphrase.as_bytes(), KDF_CONTEXT_MESSAGE_KEY),
        }
    }

    /// The key every stock client uses.
    pub fn shared() -> Self {
        Self::from_passphrase(SHARED_MESSAGE_PASSPHRASE)
    }

    pub fn encrypt_text(&self, plaintext: &str) -> Result<String, CryptoError> {
        let sealed = encrypt(&self.key, plaintext.as_bytes())?;
        Ok(BASE64.encode(sealed))
    }

    pub fn try_decrypt_text(&self, encoded: &str) -> Result<String, CryptoError> {
        let sealed = BASE64.decode(encoded.trim())?;
        let plain = decrypt(&self.key, &sealed)?;
        String::from_utf8(plain).map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Lenient decryption for display: anything unreadable becomes `""`.
    pub fn decrypt_text(&self, encoded: Option<&str>) -> String {
        match encoded {
            Some(text) if !text.is_empty() => self.try_decrypt_text(text).unwrap_or_default(),
            _ => String::new(),
        }
    }
}

impl std::fmt::Debug for MessageCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCipher").finish_non_exhaustive()
    }
}
