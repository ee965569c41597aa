//! Object storage trait abstraction.

use async_trait::async_trait;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Streamed object body.
pub type Payload = Pin<Box<dyn AsyncRead + Send>>;

/// Wrap an in-memory buffer as a payload.
pub fn payload_from_bytes(bytes: impl Into<Vec<u8>>) -> Payload {
    Box::pin(std::io::Cursor::new(bytes.into()))
}

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Bucket name rejected
    #[error("Invalid bucket name: '{0}'")]
    InvalidBucket(String),

    /// Object key rejected
    #[error("Invalid object key: '{0}'")]
    InvalidKey(String),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Object storage used by the pre-step and by module providers.
///
/// This trait allows different storage backends to be plugged in.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a streamed payload to `bucket/key`, replacing any previous object.
    async fn upload_stream(&self, bucket: &str, key: &str, payload: Payload) -> Result<()>;

    /// Read an object back, `None` if it does not exist.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>>;
}

/// Reject empty buckets and buckets containing path separators.
pub(crate) fn validate_bucket(bucket: &str) -> Result<()> {
    if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket == "." || bucket == ".." {
        return Err(StorageError::InvalidBucket(bucket.to_string()));
    }
    Ok(())
}

/// Keys are relative, `/`-separated, with no empty, `.` or `..` segments.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && !key.contains('\\')
        && key.split('/').all(|seg| !seg.is_empty() && seg != "." && seg != "..");
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_validation() {
        assert!(validate_key("cloudformation/parameters/tags.json").is_ok());
        assert!(validate_key("a").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/abs/path").is_err());
        assert!(validate_key("a//b").is_err());
        assert!(validate_key("a/../b").is_err());
        assert!(validate_key("trailing/").is_err());
    }

    #[test]
    fn test_bucket_validation() {
        assert!(validate_bucket("deploy-artifacts").is_ok());
        assert!(validate_bucket("").is_err());
        assert!(validate_bucket("a/b").is_err());
        assert!(validate_bucket("..").is_err());
    }
}
