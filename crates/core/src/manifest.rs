//! Module manifest - static module definitions for the registry.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All modules known to a deployment, as declared on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleManifest {
    /// Module definitions
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,
}

/// Definition of one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSpec {
    /// Unique module name
    pub name: String,

    /// Human-readable label, defaults to the name
    #[serde(default)]
    pub friendly_name: Option<String>,

    /// Names of the modules this one depends on
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Environments the module exists in; empty means all
    #[serde(default)]
    pub environments: Vec<String>,

    /// Files to upload when packaging; absent means not packageable
    #[serde(default)]
    pub artifacts: Option<Vec<PathBuf>>,
}

impl ModuleSpec {
    /// Label to show for this module.
    pub fn label(&self) -> &str {
        self.friendly_name.as_deref().unwrap_or(&self.name)
    }

    /// Whether the module exists in the given environment.
    pub fn applies_to(&self, environment: &str) -> bool {
        self.environments.is_empty() || self.environments.iter().any(|e| e == environment)
    }
}

impl ModuleManifest {
    /// Modules that exist in the given environment, in declaration order.
    pub fn for_environment<'a>(&'a self, environment: &'a str) -> impl Iterator<Item = &'a ModuleSpec> + 'a {
        self.modules.iter().filter(move |m| m.applies_to(environment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_parse_and_filter() {
        let json = r#"{
            "modules": [
                { "name": "apigw", "friendlyName": "API Gateway", "artifacts": ["apigw.zip"] },
                { "name": "assetLibrary", "dependsOn": ["apigw"], "environments": ["dev"] },
                { "name": "fleetSimulator", "environments": ["prod"], "artifacts": [] }
            ]
        }"#;

        let manifest: ModuleManifest = serde_json::from_str(json).unwrap();
        let dev: Vec<_> = manifest.for_environment("dev").map(|m| m.name.as_str()).collect();
        assert_eq!(dev, vec!["apigw", "assetLibrary"]);

        assert_eq!(manifest.modules[0].label(), "API Gateway");
        assert_eq!(manifest.modules[1].label(), "assetLibrary");
        assert!(manifest.modules[1].artifacts.is_none());
        assert_eq!(manifest.modules[2].artifacts.as_deref(), Some(&[][..]));
    }
}
