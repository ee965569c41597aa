//! Filesystem object store.
//!
//! Each bucket is a directory under the store root and each key a relative
//! file path inside it. Useful for local runs and for inspecting what a
//! packaging run would upload.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use super::{ObjectStore, Payload, Result};
use super::trait_::{validate_bucket, validate_key};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Directory-backed object store.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Create a store rooted at `root`. The directory is created on demand.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.join(bucket), |path, seg| path.join(seg)))
    }
}

/// `<file name>.partial` next to the target, unique per key.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

async fn stage(staging: &Path, target: &Path, payload: &mut Payload) -> Result<u64> {
    let mut file = fs::File::create(staging).await?;
    let written = tokio::io::copy(payload, &mut file).await?;
    file.flush().await?;
    drop(file);
    fs::rename(staging, target).await?;
    Ok(written)
}

#[async_trait::async_trait]
impl ObjectStore for FsObjectStore {
    async fn upload_stream(&self, bucket: &str, key: &str, mut payload: Payload) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Readers never see a partial object: write beside the target, then rename
        let staging = staging_path(&path);
        let written = match stage(&staging, &path, &mut payload).await {
            Ok(written) => written,
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&staging).await {
                    debug!("No staging file to remove at {}: {}", staging.display(), cleanup);
                }
                return Err(e);
            }
        };

        debug!("Uploaded {} bytes to {}/{}", written, bucket, key);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.object_path(bucket, key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
