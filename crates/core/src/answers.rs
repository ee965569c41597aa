//! Answers - the run-wide, read-only configuration of a deployment.

use serde::{Deserialize, Serialize};

/// The full answer set for one run.
///
/// Loaded once before the run starts and shared read-only with every
/// packaging provider. Fields the orchestrator does not understand are kept
/// in `extra` so module providers can still read them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answers {
    /// Target environment name (selects modules from the registry)
    pub environment: String,

    /// Cloud region
    pub region: String,

    /// Object storage settings
    pub s3: S3Answers,

    /// Module selection sets
    #[serde(default)]
    pub modules: ModuleAnswers,

    /// Free-form tag string, `Key=Value` pairs separated by commas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_tags: Option<String>,

    /// Provider-specific answers
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Object storage answers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Answers {
    /// Destination bucket for packaged artifacts
    pub bucket: String,
}

/// Module selection sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleAnswers {
    /// Modules explicitly requested by the user
    #[serde(default)]
    pub list: Vec<String>,

    /// Mandatory modules, expanded with their dependencies
    #[serde(default)]
    pub expanded_mandatory: Vec<String>,

    /// Every module taking part in the run, optional ones included
    #[serde(default)]
    pub expanded_including_optional: Vec<String>,
}

impl Answers {
    /// Create answers for an environment with a target bucket.
    pub fn new(environment: impl Into<String>, region: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            region: region.into(),
            s3: S3Answers { bucket: bucket.into() },
            ..Default::default()
        }
    }

    /// Set the requested module list.
    pub fn with_requested<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modules.list = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the expanded mandatory module list.
    pub fn with_mandatory<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modules.expanded_mandatory = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the expanded module list (optional modules included).
    pub fn with_expanded<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modules.expanded_including_optional = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the custom tag string.
    pub fn with_custom_tags(mut self, tags: impl Into<String>) -> Self {
        self.custom_tags = Some(tags.into());
        self
    }
}
