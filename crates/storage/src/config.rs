//! Loading run answers and module manifests from JSON files.

use std::path::Path;
use stagehand_core::{Answers, ModuleManifest};
use super::{Result, StorageError};
use tokio::fs;
use tracing::debug;

/// Load the answers file for a run.
pub async fn load_answers(path: impl AsRef<Path>) -> Result<Answers> {
    let path = path.as_ref();
    let answers: Answers = read_json(path).await?;
    debug!("Loaded answers for environment '{}' from {}", answers.environment, path.display());
    Ok(answers)
}

/// Load a module manifest. Relative artifact paths are resolved against the
/// manifest's directory.
pub async fn load_manifest(path: impl AsRef<Path>) -> Result<ModuleManifest> {
    let path = path.as_ref();
    let mut manifest: ModuleManifest = read_json(path).await?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for module in &mut manifest.modules {
        if let Some(artifacts) = module.artifacts.as_mut() {
            for artifact in artifacts.iter_mut() {
                if artifact.is_relative() {
                    *artifact = base.join(&*artifact);
                }
            }
        }
    }

    debug!("Loaded {} module definitions from {}", manifest.modules.len(), path.display());
    Ok(manifest)
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    match fs::read_to_string(path).await {
        Ok(json) => Ok(serde_json::from_str(&json)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(StorageError::NotFound(path.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}
