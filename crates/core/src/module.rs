//! Module model - named deployable units with declared dependencies.

use crate::answers::Answers;
use crate::task::PackageOutcome;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Produces the packaging work of one module.
#[async_trait]
pub trait PackageProvider: Send + Sync {
    /// Package the module for the given answers.
    ///
    /// May perform I/O itself; the returned sub-steps are run afterwards by
    /// the executor.
    async fn package(&self, answers: Arc<Answers>) -> anyhow::Result<PackageOutcome>;
}

/// Adapter turning an async closure into a [`PackageProvider`].
pub struct FnProvider<F>(F);

impl<F> FnProvider<F> {
    /// Wrap a closure.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> PackageProvider for FnProvider<F>
where
    F: Fn(Arc<Answers>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<PackageOutcome>> + Send + 'static,
{
    async fn package(&self, answers: Arc<Answers>) -> anyhow::Result<PackageOutcome> {
        (self.0)(answers).await
    }
}

/// Packaging capability of a module.
#[derive(Clone)]
pub enum Packaging {
    /// The module can be packaged by this provider
    Packageable(Arc<dyn PackageProvider>),
    /// The module declares no packaging functionality
    NotPackageable,
}

impl fmt::Debug for Packaging {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Packageable(_) => f.write_str("Packageable(..)"),
            Self::NotPackageable => f.write_str("NotPackageable"),
        }
    }
}

/// A named deployable unit.
#[derive(Debug, Clone)]
pub struct Module {
    /// Unique name
    pub name: String,

    /// Human-readable label
    pub friendly_name: String,

    /// Names of the modules this one depends on
    pub dependencies: Vec<String>,

    /// Packaging capability
    pub packaging: Packaging,
}

impl Module {
    /// Create a module with no dependencies and no packaging capability.
    pub fn new(name: impl Into<String>, friendly_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            friendly_name: friendly_name.into(),
            dependencies: Vec::new(),
            packaging: Packaging::NotPackageable,
        }
    }

    /// Add a dependency. Repeated names are ignored.
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.dependencies.contains(&name) {
            self.dependencies.push(name);
        }
        self
    }

    /// Attach a packaging provider.
    pub fn with_provider(mut self, provider: impl PackageProvider + 'static) -> Self {
        self.packaging = Packaging::Packageable(Arc::new(provider));
        self
    }

    /// Attach an async closure as packaging provider.
    pub fn with_package_fn<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Arc<Answers>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<PackageOutcome>> + Send + 'static,
    {
        self.with_provider(FnProvider::new(f))
    }

    /// Whether the module can be packaged.
    pub fn is_packageable(&self) -> bool {
        matches!(self.packaging, Packaging::Packageable(_))
    }

    /// The packaging provider, if any.
    pub fn provider(&self) -> Option<&Arc<dyn PackageProvider>> {
        match &self.packaging {
            Packaging::Packageable(provider) => Some(provider),
            Packaging::NotPackageable => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::SubTask;

    #[test]
    fn test_module_builder() {
        let module = Module::new("assetLibrary", "Asset Library")
            .depends_on("apigw")
            .depends_on("deploymentHelper")
            .depends_on("apigw");

        assert_eq!(module.dependencies, vec!["apigw", "deploymentHelper"]);
        assert!(!module.is_packageable());
        assert!(module.provider().is_none());
    }

    #[tokio::test]
    async fn test_closure_provider_receives_answers() {
        let module = Module::new("apigw", "API Gateway").with_package_fn(|answers: Arc<Answers>| async move {
            let bucket = answers.s3.bucket.clone();
            Ok(PackageOutcome::new(vec![SubTask::new(format!("Upload to {bucket}"), async { Ok(()) })]))
        });

        assert!(module.is_packageable());
        let provider = module.provider().unwrap();
        let outcome = provider
            .package(Arc::new(Answers::new("dev", "us-west-2", "artifacts")))
            .await
            .unwrap();
        assert_eq!(outcome.steps.len(), 1);
        assert_eq!(outcome.steps[0].title(), "Upload to artifacts");
    }

    #[test]
    fn test_packaging_debug_hides_provider() {
        let module = Module::new("a", "A").with_package_fn(|_| async { Ok(PackageOutcome::empty()) });
        assert_eq!(format!("{:?}", module.packaging), "Packageable(..)");
    }
}
