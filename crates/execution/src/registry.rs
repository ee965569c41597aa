//! Module registry built from a manifest.

use anyhow::Context;
use async_trait::async_trait;
use stagehand_core::{Answers, Module, ModuleManifest, PackageOutcome, PackageProvider, SubTask};
use stagehand_storage::ObjectStore;
use std::path::PathBuf;
use std::sync::Arc;

/// Packages a module by uploading its artifact files, one sub-step per file.
///
/// Each file lands at `<module>/<file name>` in the answers' bucket.
pub struct ArtifactPackager {
    module: String,
    artifacts: Vec<PathBuf>,
    store: Arc<dyn ObjectStore>,
}

impl ArtifactPackager {
    /// Create a packager for a module's artifacts.
    pub fn new(module: impl Into<String>, artifacts: Vec<PathBuf>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            module: module.into(),
            artifacts,
            store,
        }
    }
}

#[async_trait]
impl PackageProvider for ArtifactPackager {
    async fn package(&self, answers: Arc<Answers>) -> anyhow::Result<PackageOutcome> {
        let mut steps = Vec::with_capacity(self.artifacts.len());

        for path in &self.artifacts {
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .with_context(|| format!("artifact path {} has no file name", path.display()))?;
            let metadata = tokio::fs::metadata(path)
                .await
                .with_context(|| format!("artifact {} is not readable", path.display()))?;
            anyhow::ensure!(metadata.is_file(), "artifact {} is not a file", path.display());

            let key = format!("{}/{}", self.module, file_name);
            let bucket = answers.s3.bucket.clone();
            let store = Arc::clone(&self.store);
            let path = path.clone();

            steps.push(SubTask::new(format!("Uploading {file_name}"), async move {
                let file = tokio::fs::File::open(&path)
                    .await
                    .with_context(|| format!("opening {}", path.display()))?;
                store.upload_stream(&bucket, &key, Box::pin(file)).await?;
                Ok(())
            }));
        }

        Ok(PackageOutcome::new(steps).with_summary(format!("{} artifact(s)", self.artifacts.len())))
    }
}

/// Modules of the manifest that exist in `environment`.
///
/// Modules declaring artifacts (even none) become packageable through an
/// [`ArtifactPackager`]; the others are not packageable.
pub fn modules_for_environment(
    manifest: &ModuleManifest,
    environment: &str,
    store: Arc<dyn ObjectStore>,
) -> Vec<Module> {
    manifest
        .for_environment(environment)
        .map(|spec| {
            let module = spec
                .depends_on
                .iter()
                .fold(Module::new(&spec.name, spec.label()), |m, dep| m.depends_on(dep.clone()));
            match &spec.artifacts {
                Some(artifacts) => module.with_provider(ArtifactPackager::new(
                    &spec.name,
                    artifacts.clone(),
                    Arc::clone(&store),
                )),
                None => module,
            }
        })
        .collect()
}
