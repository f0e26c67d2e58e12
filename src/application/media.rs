//! Storage seam for post images.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("invalid stored path")]
    InvalidPath,
    #[error("uploaded file is empty")]
    Empty,
    #[error("media storage failed: {0}")]
    Storage(String),
}

/// An image attached to a post form, not yet persisted.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub data: Bytes,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Persist the payload and return its stored relative path.
    async fn store_image(&self, filename: &str, data: Bytes) -> Result<String, MediaError>;

    /// Remove a stored payload; missing files are not an error.
    async fn remove(&self, stored_path: &str) -> Result<(), MediaError>;
}

/// Returns true when the payload header is a recognised raster image format.
pub fn looks_like_image(data: &[u8]) -> bool {
    imagesize::blob_size(data).is_ok()
}
