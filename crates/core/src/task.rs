//! Task units - the schedulable packaging work produced for one run.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// A boxed, not-yet-started sub-step.
pub type StepFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// A labelled sub-step of a task unit.
///
/// The wrapped future is lazy: nothing runs until the executor awaits it.
pub struct SubTask {
    title: String,
    action: StepFuture,
}

impl SubTask {
    /// Create a sub-step from a title and a future.
    pub fn new<F>(title: impl Into<String>, action: F) -> Self
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            title: title.into(),
            action: Box::pin(action),
        }
    }

    /// Sub-step title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Drive the sub-step to completion.
    pub async fn run(self) -> anyhow::Result<()> {
        self.action.await
    }
}

impl fmt::Debug for SubTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubTask").field("title", &self.title).finish_non_exhaustive()
    }
}

/// What a packaging provider hands back: a primary result and the sub-steps
/// that finish the work.
#[derive(Debug, Default)]
pub struct PackageOutcome {
    /// Primary result of the provider call, if it has one worth reporting
    pub summary: Option<String>,

    /// Sub-steps, run sequentially
    pub steps: Vec<SubTask>,
}

impl PackageOutcome {
    /// Outcome with the given sub-steps.
    pub fn new(steps: Vec<SubTask>) -> Self {
        Self { summary: None, steps }
    }

    /// Outcome with no sub-steps. The provider call itself was the work.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Attach a primary result.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

/// Runtime wrapper handed to the executor: a label plus sequential sub-steps.
#[derive(Debug)]
pub struct TaskUnit {
    /// Title shown for the task in the task tree
    pub label: String,

    /// Sub-steps
    pub steps: Vec<SubTask>,
}

impl TaskUnit {
    /// Create a task unit.
    pub fn new(label: impl Into<String>, steps: Vec<SubTask>) -> Self {
        Self {
            label: label.into(),
            steps,
        }
    }

    /// Whether the unit has nothing to schedule.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Titles of the sub-steps, in order.
    pub fn step_titles(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.title.clone()).collect()
    }
}
