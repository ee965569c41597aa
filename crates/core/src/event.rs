//! Run events - the task tree as the executor walks it.

use crate::id::{EventId, RunId};
use crate::Time;
use serde::{Deserialize, Serialize};

/// Something that happened during a packaging run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    /// Unique identifier
    pub id: EventId,

    /// Run this event belongs to
    pub run_id: RunId,

    /// When it happened
    pub timestamp: Time,

    /// What happened
    pub kind: RunEventKind,
}

impl RunEvent {
    /// Create an event stamped with the current time.
    pub fn new(run_id: RunId, kind: RunEventKind) -> Self {
        Self {
            id: EventId::new(),
            run_id,
            timestamp: chrono::Utc::now(),
            kind,
        }
    }
}

/// Event payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEventKind {
    /// The run started
    RunStarted {
        /// Number of layers in the plan
        layers: usize,
    },

    /// The pre-step started
    PreStepStarted {
        /// Pre-step title
        title: String,
    },

    /// The pre-step finished successfully
    PreStepCompleted {
        /// Pre-step title
        title: String,
    },

    /// The pre-step failed; the run stops here
    PreStepFailed {
        /// Pre-step title
        title: String,
        /// Failure message with its causes
        error: String,
    },

    /// A layer started
    LayerStarted {
        /// Layer index
        index: usize,
        /// Every module placed in the layer, selected or not
        modules: Vec<String>,
    },

    /// A module in the layer is not selected for this run
    ModuleSkipped {
        /// Layer index
        layer: usize,
        /// Module name
        module: String,
    },

    /// A module was packaged but produced no sub-steps
    ModuleEmpty {
        /// Layer index
        layer: usize,
        /// Module name
        module: String,
    },

    /// A module task was launched: title plus nested sub-task titles
    TaskStarted {
        /// Layer index
        layer: usize,
        /// Module name
        module: String,
        /// Task title (the module's friendly name)
        label: String,
        /// Sub-step titles, in execution order
        steps: Vec<String>,
    },

    /// A sub-step started
    StepStarted {
        /// Module (or pre-step) owning the step
        module: String,
        /// Step title
        step: String,
    },

    /// A sub-step finished
    StepCompleted {
        /// Module (or pre-step) owning the step
        module: String,
        /// Step title
        step: String,
    },

    /// A module task finished
    TaskCompleted {
        /// Layer index
        layer: usize,
        /// Module name
        module: String,
        /// Time from launch to the last step
        elapsed_ms: u64,
    },

    /// A module task failed
    TaskFailed {
        /// Layer index
        layer: usize,
        /// Module name
        module: String,
        /// Failure message with its causes
        error: String,
    },

    /// Every task in the layer finished
    LayerCompleted {
        /// Layer index
        index: usize,
    },

    /// The layer failed because of this module
    LayerFailed {
        /// Layer index
        index: usize,
        /// Module the failure is attributed to
        module: String,
    },

    /// The run finished successfully
    RunCompleted {
        /// Wall-clock time of the run
        elapsed_ms: u64,
    },

    /// The run stopped on an error
    RunFailed {
        /// Wall-clock time until the failure
        elapsed_ms: u64,
        /// Failure message
        error: String,
    },
}

impl RunEventKind {
    /// Short name of the event, used for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::PreStepStarted { .. } => "pre_step_started",
            Self::PreStepCompleted { .. } => "pre_step_completed",
            Self::PreStepFailed { .. } => "pre_step_failed",
            Self::LayerStarted { .. } => "layer_started",
            Self::ModuleSkipped { .. } => "module_skipped",
            Self::ModuleEmpty { .. } => "module_empty",
            Self::TaskStarted { .. } => "task_started",
            Self::StepStarted { .. } => "step_started",
            Self::StepCompleted { .. } => "step_completed",
            Self::TaskCompleted { .. } => "task_completed",
            Self::TaskFailed { .. } => "task_failed",
            Self::LayerCompleted { .. } => "layer_completed",
            Self::LayerFailed { .. } => "layer_failed",
            Self::RunCompleted { .. } => "run_completed",
            Self::RunFailed { .. } => "run_failed",
        }
    }
}
