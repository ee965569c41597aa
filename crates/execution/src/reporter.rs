//! Progress reporting - where run events go.

use stagehand_core::{RunEvent, RunEventKind};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Receives the task tree as the executor walks it.
///
/// Reporting is best-effort: implementations must not fail the run.
pub trait ProgressReporter: Send + Sync {
    /// Handle one event.
    fn report(&self, event: &RunEvent);
}

/// Reporter writing events as log records.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: &RunEvent) {
        match &event.kind {
            RunEventKind::RunStarted { layers } => {
                info!("Starting packaging run {} ({} layers)", event.run_id.short(), layers)
            }
            RunEventKind::PreStepStarted { title } => info!("{}", title),
            RunEventKind::PreStepCompleted { title } => debug!("{} done", title),
            RunEventKind::PreStepFailed { title, error } => error!("{} failed: {}", title, error),
            RunEventKind::LayerStarted { index, modules } => info!("Layer {}: {}", index, modules.join(", ")),
            RunEventKind::ModuleSkipped { layer, module } => debug!("Layer {}: {} not selected", layer, module),
            RunEventKind::ModuleEmpty { layer, module } => debug!("Layer {}: {} has nothing to upload", layer, module),
            RunEventKind::TaskStarted { label, steps, .. } => info!("{} ({} steps)", label, steps.len()),
            RunEventKind::StepStarted { module, step } => debug!("  {} > {}", module, step),
            RunEventKind::StepCompleted { module, step } => debug!("  {} > {} done", module, step),
            RunEventKind::TaskCompleted { module, elapsed_ms, .. } => {
                info!("{} packaged in {}ms", module, elapsed_ms)
            }
            RunEventKind::TaskFailed { layer, module, error } => {
                error!("Layer {}: {} failed: {}", layer, module, error)
            }
            RunEventKind::LayerCompleted { index } => debug!("Layer {} complete", index),
            RunEventKind::LayerFailed { index, module } => warn!("Layer {} failed on {}", index, module),
            RunEventKind::RunCompleted { elapsed_ms } => {
                info!("Packaging complete ({:.2}s)", *elapsed_ms as f64 / 1000.0)
            }
            RunEventKind::RunFailed { elapsed_ms, error } => {
                error!("Packaging failed after {:.2}s: {}", *elapsed_ms as f64 / 1000.0, error)
            }
        }
    }
}

/// Reporter that keeps every event in memory.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<RunEvent>>>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events.
    pub fn events(&self) -> Vec<RunEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Event kinds, in order.
    pub fn kinds(&self) -> Vec<RunEventKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }

    /// Position of the first event matching the predicate.
    pub fn position(&self, pred: impl Fn(&RunEventKind) -> bool) -> Option<usize> {
        self.kinds().iter().position(pred)
    }
}

impl ProgressReporter for EventLog {
    fn report(&self, event: &RunEvent) {
        let mut events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push(event.clone());
    }
}

/// Fan one event out to several reporters.
#[derive(Clone, Default)]
pub struct Reporters {
    inner: Vec<Arc<dyn ProgressReporter>>,
}

impl Reporters {
    /// No reporters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reporter.
    pub fn with(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.inner.push(reporter);
        self
    }
}

impl ProgressReporter for Reporters {
    fn report(&self, event: &RunEvent) {
        for reporter in &self.inner {
            reporter.report(event);
        }
    }
}
