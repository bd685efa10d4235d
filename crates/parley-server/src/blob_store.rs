//! Image storage for message attachments.
//!
//! Images arrive inline in the send request (a `data:` URL or bare base64),
//! are written to disk under a fresh UUID, and the message keeps only the
//! reference `/blob/<uuid>`.

use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ServerError;

/// URL prefix under which stored blobs are served.
pub const BLOB_ROUTE_PREFIX: &str = "/blob/";

#[derive(Debug, Clone)]
pub struct BlobStore {
    base_path: PathBuf,
    max_size: usize,
}

impl BlobStore {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self, ServerError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ServerError::BlobStorage(format!(
                "Failed to create blob directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Blob store initialized");

        Ok(Self {
            base_path,
            max_size,
        })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub async fn store_blob(&self, data: &[u8]) -> Result<Uuid, ServerError> {
        if data.is_empty() {
            return Err(ServerError::BadRequest("Empty image".to_string()));
        }
        if data.len() > self.max_size {
            return Err(ServerError::BlobTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let id = Uuid::new_v4();
        let path = self.blob_path(&id);

        fs::write(&path, data)
            .await
            .map_err(|e| ServerError::BlobStorage(format!("Failed to write blob {}: {}", id, e)))?;

        debug!(id = %id, size = data.len(), "Stored blob");
        Ok(id)
    }

    /// Decode an inline image and store it. Returns the reference to put on
    /// the message.
    pub async fn store_image(&self, inline: &str) -> Result<String, ServerError> {
        let bytes = decode_inline_image(inline)?;
        let id = self.store_blob(&bytes).await?;
        Ok(blob_reference(id))
    }

    pub async fn get_blob(&self, id: Uuid) -> Result<Vec<u8>, ServerError> {
        let path = self.blob_path(&id);

        if !path.exists() {
            return Err(ServerError::BlobNotFound(id));
        }

        let data = fs::read(&path)
            .await
            .map_err(|e| ServerError::BlobStorage(format!("Failed to read blob {}: {}", id, e)))?;

        debug!(id = %id, size = data.len(), "Retrieved blob");
        Ok(data)
    }

    pub async fn delete_blob(&self, id: Uuid) -> Result<(), ServerError> {
        let path = self.blob_path(&id);

        if !path.exists() {
            return Err(ServerError::BlobNotFound(id));
        }

        fs::remove_file(&path).await.map_err(|e| {
            ServerError::BlobStorage(format!("Failed to delete blob {}: {}", id, e))
        })?;

        debug!(id = %id, "Deleted blob");
        Ok(())
    }

    // UUIDs contain no separators, so the join cannot escape `base_path`.
    fn blob_path(&self, id: &Uuid) -> PathBuf {
        self.base_path.join(id.to_string())
    }
}

pub fn blob_reference(id: Uuid) -> String {
    format!("{BLOB_ROUTE_PREFIX}{id}")
}

/// Parse the id back out of a reference produced by [`blob_reference`].
pub fn parse_blob_reference(reference: &str) -> Option<Uuid> {
    reference
        .strip_prefix(BLOB_ROUTE_PREFIX)
        .and_then(|id| Uuid::parse_str(id).ok())
}

/// Accepts `data:image/<type>;base64,<payload>` or a bare base64 payload.
fn decode_inline_image(inline: &str) -> Result<Vec<u8>, ServerError> {
    let inline = inline.trim();
    let payload = match inline.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest
                .split_once(',')
                .ok_or_else(|| ServerError::BadRequest("Malformed data URL".to_string()))?;
            if !header.starts_with("image/") || !header.ends_with(";base64") {
                return Err(ServerError::BadRequest(
                    "Only base64 image data URLs are accepted".to_string(),
                ));
            }
            payload
        }
        None => inline,
    };

    BASE64
        .decode(payload)
        .map_err(|e| ServerError::BadRequest(format!("Invalid image encoding: {e}")))
}

/// Best-effort content type from the file's magic bytes.
pub fn sniff_content_type(data: &[u8]) -> &'static str {
    if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if data.starts_with(b"GIF8") {
        "image/gif"
    } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "application/octet-stream"
    }
}
