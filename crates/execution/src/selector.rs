//! Module selection policy.

use crate::error::{OrchestratorError, Result};
use stagehand_core::{Answers, Module};
use std::collections::BTreeSet;

/// Which modules produce work in a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionPolicy {
    /// Always run (if packageable)
    pub mandatory: BTreeSet<String>,
    /// Explicitly requested by the user
    pub requested: BTreeSet<String>,
    /// Full expanded set, optional modules included; drives layering
    pub expanded: BTreeSet<String>,
}

impl SelectionPolicy {
    /// Build the policy from the run's answers.
    pub fn from_answers(answers: &Answers) -> Self {
        Self {
            mandatory: answers.modules.expanded_mandatory.iter().cloned().collect(),
            requested: answers.modules.list.iter().cloned().collect(),
            expanded: answers.modules.expanded_including_optional.iter().cloned().collect(),
        }
    }

    /// Set the mandatory modules.
    pub fn with_mandatory<I: IntoIterator<Item = S>, S: Into<String>>(mut self, names: I) -> Self {
        self.mandatory = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the requested modules.
    pub fn with_requested<I: IntoIterator<Item = S>, S: Into<String>>(mut self, names: I) -> Self {
        self.requested = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the expanded module set.
    pub fn with_expanded<I: IntoIterator<Item = S>, S: Into<String>>(mut self, names: I) -> Self {
        self.expanded = names.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the name is mandatory or requested.
    pub fn includes(&self, name: &str) -> bool {
        self.mandatory.contains(name) || self.requested.contains(name)
    }
}

/// Decides whether a module's task runs.
pub trait ModuleSelector: Send + Sync {
    /// `Ok(true)` when the module should produce work, `Ok(false)` when it
    /// only keeps its layer slot.
    fn is_selected(&self, module: &Module, policy: &SelectionPolicy) -> Result<bool>;
}

/// Default selector: packageable AND (mandatory OR requested).
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicySelector;

impl ModuleSelector for PolicySelector {
    fn is_selected(&self, module: &Module, policy: &SelectionPolicy) -> Result<bool> {
        is_selected(module, policy)
    }
}

/// Apply the policy to one module.
///
/// A module included by the policy but lacking a packaging capability is a
/// configuration error, not a skip.
pub fn is_selected(module: &Module, policy: &SelectionPolicy) -> Result<bool> {
    if !policy.includes(&module.name) {
        return Ok(false);
    }
    if !module.is_packageable() {
        return Err(OrchestratorError::ModuleNotPackageable(module.name.clone()));
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagehand_core::PackageOutcome;

    fn packageable(name: &str) -> Module {
        Module::new(name, name).with_package_fn(|_| async { Ok(PackageOutcome::empty()) })
    }

    #[test]
    fn test_mandatory_and_requested_are_selected() {
        let policy = SelectionPolicy::default().with_mandatory(["a"]).with_requested(["b"]);
        assert!(is_selected(&packageable("a"), &policy).unwrap());
        assert!(is_selected(&packageable("b"), &policy).unwrap());
        assert!(!is_selected(&packageable("c"), &policy).unwrap());
    }

    #[test]
    fn test_expanded_alone_does_not_select() {
        let policy = SelectionPolicy::default().with_expanded(["opt"]);
        assert!(!is_selected(&packageable("opt"), &policy).unwrap());
    }

    #[test]
    fn test_selected_but_not_packageable_is_an_error() {
        let policy = SelectionPolicy::default().with_requested(["bare"]);
        let err = is_selected(&Module::new("bare", "Bare"), &policy).unwrap_err();
        assert!(matches!(err, OrchestratorError::ModuleNotPackageable(name) if name == "bare"));
    }

    #[test]
    fn test_unselected_non_packageable_is_skipped() {
        let policy = SelectionPolicy::default();
        assert!(!PolicySelector.is_selected(&Module::new("bare", "Bare"), &policy).unwrap());
    }

    #[test]
    fn test_policy_from_answers() {
        let answers = Answers::new("dev", "us-west-2", "b")
            .with_mandatory(["a"])
            .with_requested(["b"])
            .with_expanded(["a", "b", "c"]);
        let policy = SelectionPolicy::from_answers(&answers);
        assert!(policy.includes("a"));
        assert!(policy.includes("b"));
        assert!(!policy.includes("c"));
        assert_eq!(policy.expanded.len(), 3);
    }
}
