//! Orchestration errors.

use thiserror::Error;

/// Errors raised while building, partitioning or running a module set.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A module lists a dependency that is not in the module set
    #[error("Module '{module}' depends on unknown module '{dependency}'")]
    UnknownDependency {
        /// Module declaring the dependency
        module: String,
        /// Missing dependency name
        dependency: String,
    },

    /// Two modules share a name
    #[error("Module '{0}' is defined more than once")]
    DuplicateModule(String),

    /// A module name requested for the run is not in the module set
    #[error("Module {0} not found!")]
    UnknownModule(String),

    /// No topological order exists
    #[error("Cyclic dependency detected: {}", .cycle.join(" -> "))]
    CyclicDependency {
        /// Modules on the cycle, first one repeated at the end
        cycle: Vec<String>,
    },

    /// A selected module cannot be packaged
    #[error("Module '{0}' is selected but is not packageable")]
    ModuleNotPackageable(String),

    /// A module taking part in the run declares no packaging functionality
    #[error("Module {0} has no package functionality defined!")]
    MissingPackageFunctionality(String),

    /// The pre-step failed before any layer started
    #[error("Pre-step '{title}' failed: {source:#}")]
    PreStepFailed {
        /// Pre-step title
        title: String,
        /// Underlying failure
        #[source]
        source: anyhow::Error,
    },

    /// A module task (or its provider) failed
    #[error("Module '{module}' failed in layer {layer}: {source:#}")]
    TaskExecutionFailure {
        /// Failing module
        module: String,
        /// Layer index the module belongs to
        layer: usize,
        /// Underlying failure
        #[source]
        source: anyhow::Error,
    },
}

impl OrchestratorError {
    /// Module the error is attributed to, if any.
    pub fn module(&self) -> Option<&str> {
        match self {
            Self::UnknownDependency { module, .. } => Some(module),
            Self::DuplicateModule(m)
            | Self::UnknownModule(m)
            | Self::ModuleNotPackageable(m)
            | Self::MissingPackageFunctionality(m) => Some(m),
            Self::TaskExecutionFailure { module, .. } => Some(module),
            Self::CyclicDependency { cycle } => cycle.first().map(String::as_str),
            Self::PreStepFailed { .. } => None,
        }
    }

    /// Layer index the error is attributed to, if any.
    pub fn layer(&self) -> Option<usize> {
        match self {
            Self::TaskExecutionFailure { layer, .. } => Some(*layer),
            _ => None,
        }
    }
}

/// Result alias for orchestration operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
