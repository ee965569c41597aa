//! Execution layer - dependency layering, selection, and layer-by-layer packaging.

#![warn(missing_docs)]

pub mod adapter;
pub mod dependency;
pub mod engine;
pub mod error;
pub mod prestep;
pub mod registry;
pub mod reporter;
pub mod selector;

pub use adapter::adapt;
pub use dependency::{partition, DependencyGraph, Layer};
pub use engine::{EngineConfig, ExecutionEngine, LayerReport, Plan, RunError, RunReport, RunState};
pub use error::{OrchestratorError, Result};
pub use prestep::{tags_key, tags_upload_step, TAGS_PRE_STEP_TITLE};
pub use registry::{modules_for_environment, ArtifactPackager};
pub use reporter::{EventLog, ProgressReporter, Reporters, TracingReporter};
pub use selector::{is_selected, ModuleSelector, PolicySelector, SelectionPolicy};
