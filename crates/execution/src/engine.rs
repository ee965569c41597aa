//! The execution engine - runs a partitioned module set layer by layer.

use crate::adapter::adapt;
use crate::dependency::{partition, DependencyGraph, Layer};
use crate::error::OrchestratorError;
use crate::prestep::tags_upload_step;
use crate::reporter::{ProgressReporter, TracingReporter};
use crate::selector::{ModuleSelector, PolicySelector, SelectionPolicy};
use anyhow::Context;
use stagehand_core::{Answers, Module, RunEvent, RunEventKind, RunId, SubTask, TaskUnit};
use stagehand_storage::ObjectStore;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Configuration for the execution engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Key prefix of the tags parameters file
    pub tags_prefix: String,
    /// Lay out every registry module instead of only the expanded set
    pub include_optional: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tags_prefix: "cloudformation".to_string(),
            include_optional: false,
        }
    }
}

/// Where a run stands.
///
/// ```text
/// NotStarted → PreStepRunning → PreStepFailed
///                             → LayerRunning(0) → … → Completed
///                                                   → LayerFailed(i)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Nothing has run yet
    NotStarted,
    /// The pre-step is running
    PreStepRunning,
    /// The pre-step failed (terminal)
    PreStepFailed,
    /// Layer `i` is running
    LayerRunning(usize),
    /// Layer `i` failed (terminal)
    LayerFailed(usize),
    /// Every layer finished (terminal)
    Completed,
}

impl RunState {
    /// Whether the run can no longer advance.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::PreStepFailed | Self::LayerFailed(_) | Self::Completed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => f.write_str("not started"),
            Self::PreStepRunning => f.write_str("pre-step running"),
            Self::PreStepFailed => f.write_str("pre-step failed"),
            Self::LayerRunning(i) => write!(f, "layer {i} running"),
            Self::LayerFailed(i) => write!(f, "layer {i} failed"),
            Self::Completed => f.write_str("completed"),
        }
    }
}

/// Layers to run and the policy deciding who works in them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Validated graph of the whole module set
    pub graph: DependencyGraph,
    /// Ordered layers
    pub layers: Vec<Layer>,
    /// Selection policy of the run
    pub policy: SelectionPolicy,
}

/// What happened in one layer of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerReport {
    /// Layer index
    pub index: usize,
    /// Modules whose task ran
    pub packaged: Vec<String>,
    /// Modules packaged with no sub-steps
    pub empty: Vec<String>,
    /// Modules not selected for this run
    pub skipped: Vec<String>,
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Run identifier
    pub run_id: RunId,
    /// Per-layer outcome
    pub layers: Vec<LayerReport>,
    /// Wall-clock time of the run
    pub elapsed: Duration,
}

impl RunReport {
    /// Terminal state of a successful run.
    pub fn state(&self) -> RunState {
        RunState::Completed
    }

    /// Every module whose task ran, layer by layer.
    pub fn packaged(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().flat_map(|l| l.packaged.iter().map(String::as_str))
    }
}

/// A failed run.
#[derive(Debug, thiserror::Error)]
#[error("{error} (after {:.2}s)", .elapsed.as_secs_f64())]
pub struct RunError {
    /// Run identifier
    pub run_id: RunId,
    /// Terminal state the run stopped in
    pub state: RunState,
    /// Wall-clock time until the failure
    pub elapsed: Duration,
    /// What went wrong
    #[source]
    pub error: OrchestratorError,
}

impl RunError {
    /// Module the failure is attributed to, if any.
    pub fn module(&self) -> Option<&str> {
        self.error.module()
    }

    /// Layer the failure happened in, if any.
    pub fn layer(&self) -> Option<usize> {
        match self.state {
            RunState::LayerFailed(index) => Some(index),
            _ => self.error.layer(),
        }
    }
}

/// Tracks state and timing of one run and stamps its events.
struct RunTracker {
    run_id: RunId,
    started: Instant,
    state: RunState,
    reporter: Arc<dyn ProgressReporter>,
}

impl RunTracker {
    fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            run_id: RunId::new(),
            started: Instant::now(),
            state: RunState::NotStarted,
            reporter,
        }
    }

    fn emit(&self, kind: RunEventKind) {
        self.reporter.report(&RunEvent::new(self.run_id, kind));
    }

    fn transition(&mut self, next: RunState) {
        if self.state != next {
            debug!(run_id = %self.run_id, "{} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn fail(mut self, state: RunState, error: OrchestratorError) -> RunError {
        self.transition(state);
        self.emit(RunEventKind::RunFailed {
            elapsed_ms: self.elapsed_ms(),
            error: error.to_string(),
        });
        RunError {
            run_id: self.run_id,
            state: self.state,
            elapsed: self.started.elapsed(),
            error,
        }
    }
}

/// The main execution engine.
///
/// Runs one packaging invocation:
/// ```text
/// Build graph → Partition → Pre-step → Layer 0 ‖ … → Layer 1 ‖ … → Done
/// ```
pub struct ExecutionEngine {
    selector: Box<dyn ModuleSelector>,
    reporter: Arc<dyn ProgressReporter>,
    config: EngineConfig,
}

impl ExecutionEngine {
    /// Create an engine with the policy selector and log reporting.
    pub fn new() -> Self {
        Self {
            selector: Box::new(PolicySelector),
            reporter: Arc::new(TracingReporter),
            config: EngineConfig::default(),
        }
    }

    /// Set the module selector.
    pub fn with_selector(mut self, selector: Box<dyn ModuleSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Set the progress reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate the module set and lay it out in layers. Runs nothing.
    pub fn plan(&self, modules: &[Module], answers: &Answers) -> Result<Plan, OrchestratorError> {
        let graph = DependencyGraph::build(modules)?;
        let policy = SelectionPolicy::from_answers(answers);
        let layers = partition(&graph, &policy.expanded, self.config.include_optional)?;
        Ok(Plan { graph, layers, policy })
    }

    /// Plan, then run with the tags upload as pre-step.
    pub async fn package(
        &self,
        modules: &[Module],
        answers: Arc<Answers>,
        store: Arc<dyn ObjectStore>,
    ) -> Result<RunReport, RunError> {
        let plan = match self.plan(modules, &answers) {
            Ok(plan) => plan,
            Err(error) => return Err(RunTracker::new(self.reporter.clone()).fail(RunState::NotStarted, error)),
        };
        let pre_step = tags_upload_step(store, &answers, &self.config.tags_prefix);
        self.run(&plan, modules, answers, pre_step).await
    }

    /// Run a plan: the pre-step, then each layer with its tasks in parallel.
    ///
    /// Layer `i + 1` starts only once every task of layer `i` has settled
    /// successfully. A failing task fails its layer after its siblings settle,
    /// and no later layer is touched.
    #[instrument(skip_all, fields(layers = plan.layers.len()))]
    pub async fn run(
        &self,
        plan: &Plan,
        modules: &[Module],
        answers: Arc<Answers>,
        pre_step: TaskUnit,
    ) -> Result<RunReport, RunError> {
        let mut tracker = RunTracker::new(self.reporter.clone());
        let run_id = tracker.run_id;
        tracker.emit(RunEventKind::RunStarted {
            layers: plan.layers.len(),
        });

        // Resolve every layer up front; configuration errors stop the run before anything executes
        let by_name: HashMap<&str, &Module> = modules.iter().map(|m| (m.name.as_str(), m)).collect();
        let mut resolved: Vec<Vec<&Module>> = Vec::with_capacity(plan.layers.len());
        for layer in &plan.layers {
            let mut members = Vec::with_capacity(layer.len());
            for name in layer {
                let Some(&module) = by_name.get(name.as_str()) else {
                    return Err(tracker.fail(RunState::NotStarted, OrchestratorError::UnknownModule(name.clone())));
                };
                if !module.is_packageable() {
                    return Err(tracker.fail(
                        RunState::NotStarted,
                        OrchestratorError::MissingPackageFunctionality(name.clone()),
                    ));
                }
                members.push(module);
            }
            resolved.push(members);
        }

        tracker.transition(RunState::PreStepRunning);
        let title = pre_step.label.clone();
        tracker.emit(RunEventKind::PreStepStarted { title: title.clone() });
        let handle = {
            let reporter = self.reporter.clone();
            let owner = title.clone();
            tokio::spawn(async move { drive_steps(&owner, pre_step.steps, reporter.as_ref(), run_id).await })
        };
        if let Err(source) = settle(handle).await {
            tracker.emit(RunEventKind::PreStepFailed {
                title: title.clone(),
                error: format!("{source:#}"),
            });
            return Err(tracker.fail(RunState::PreStepFailed, OrchestratorError::PreStepFailed { title, source }));
        }
        tracker.emit(RunEventKind::PreStepCompleted { title });

        let mut reports = Vec::with_capacity(resolved.len());
        for (index, members) in resolved.into_iter().enumerate() {
            tracker.transition(RunState::LayerRunning(index));
            tracker.emit(RunEventKind::LayerStarted {
                index,
                modules: members.iter().map(|m| m.name.clone()).collect(),
            });
            let mut report = LayerReport {
                index,
                ..Default::default()
            };

            // Providers are called one after another; the tasks they return run together
            let mut units = Vec::new();
            for module in members {
                let selected = match self.selector.is_selected(module, &plan.policy) {
                    Ok(selected) => selected,
                    Err(error) => {
                        tracker.emit(RunEventKind::LayerFailed {
                            index,
                            module: module.name.clone(),
                        });
                        return Err(tracker.fail(RunState::LayerFailed(index), error));
                    }
                };
                if !selected {
                    tracker.emit(RunEventKind::ModuleSkipped {
                        layer: index,
                        module: module.name.clone(),
                    });
                    report.skipped.push(module.name.clone());
                    continue;
                }

                let unit = match adapt(module, Arc::clone(&answers)).await {
                    Ok(unit) => unit,
                    Err(source) => {
                        tracker.emit(RunEventKind::TaskFailed {
                            layer: index,
                            module: module.name.clone(),
                            error: format!("{source:#}"),
                        });
                        tracker.emit(RunEventKind::LayerFailed {
                            index,
                            module: module.name.clone(),
                        });
                        let error = OrchestratorError::TaskExecutionFailure {
                            module: module.name.clone(),
                            layer: index,
                            source,
                        };
                        return Err(tracker.fail(RunState::LayerFailed(index), error));
                    }
                };

                if unit.is_empty() {
                    tracker.emit(RunEventKind::ModuleEmpty {
                        layer: index,
                        module: module.name.clone(),
                    });
                    report.empty.push(module.name.clone());
                    continue;
                }
                units.push((module.name.clone(), unit));
            }

            let handles: Vec<(String, JoinHandle<anyhow::Result<()>>)> = units
                .into_iter()
                .map(|(name, unit)| {
                    tracker.emit(RunEventKind::TaskStarted {
                        layer: index,
                        module: name.clone(),
                        label: unit.label.clone(),
                        steps: unit.step_titles(),
                    });
                    let handle = spawn_unit(name.clone(), unit, self.reporter.clone(), run_id, index);
                    (name, handle)
                })
                .collect();

            let mut failure: Option<OrchestratorError> = None;
            for (name, handle) in handles {
                match settle(handle).await {
                    Ok(()) => report.packaged.push(name),
                    Err(source) => {
                        tracker.emit(RunEventKind::TaskFailed {
                            layer: index,
                            module: name.clone(),
                            error: format!("{source:#}"),
                        });
                        if failure.is_none() {
                            failure = Some(OrchestratorError::TaskExecutionFailure {
                                module: name,
                                layer: index,
                                source,
                            });
                        } else {
                            warn!("Layer {}: {} also failed: {:#}", index, name, source);
                        }
                    }
                }
            }

            if let Some(error) = failure {
                tracker.emit(RunEventKind::LayerFailed {
                    index,
                    module: error.module().unwrap_or_default().to_string(),
                });
                return Err(tracker.fail(RunState::LayerFailed(index), error));
            }

            tracker.emit(RunEventKind::LayerCompleted { index });
            reports.push(report);
        }

        tracker.transition(RunState::Completed);
        let elapsed = tracker.started.elapsed();
        tracker.emit(RunEventKind::RunCompleted {
            elapsed_ms: tracker.elapsed_ms(),
        });
        info!(run_id = %run_id, "Run completed in {:.2}s", elapsed.as_secs_f64());

        Ok(RunReport {
            run_id,
            layers: reports,
            elapsed,
        })
    }
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Launch a task unit; its sub-steps run in order.
fn spawn_unit(
    module: String,
    unit: TaskUnit,
    reporter: Arc<dyn ProgressReporter>,
    run_id: RunId,
    layer: usize,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move {
        let started = Instant::now();
        drive_steps(&module, unit.steps, reporter.as_ref(), run_id).await?;
        reporter.report(&RunEvent::new(
            run_id,
            RunEventKind::TaskCompleted {
                layer,
                module,
                elapsed_ms: started.elapsed().as_millis() as u64,
            },
        ));
        Ok(())
    })
}

async fn drive_steps(
    owner: &str,
    steps: Vec<SubTask>,
    reporter: &dyn ProgressReporter,
    run_id: RunId,
) -> anyhow::Result<()> {
    for step in steps {
        let title = step.title().to_string();
        reporter.report(&RunEvent::new(
            run_id,
            RunEventKind::StepStarted {
                module: owner.to_string(),
                step: title.clone(),
            },
        ));
        step.run().await.with_context(|| format!("{title} failed"))?;
        reporter.report(&RunEvent::new(
            run_id,
            RunEventKind::StepCompleted {
                module: owner.to_string(),
                step: title,
            },
        ));
    }
    Ok(())
}

/// Wait for a launched task; a panic counts as a failure.
async fn settle(handle: JoinHandle<anyhow::Result<()>>) -> anyhow::Result<()> {
    match handle.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => {
            let payload = e.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
                .unwrap_or("non-string panic payload");
            Err(anyhow::anyhow!("task panicked: {message}"))
        }
        Err(e) => Err(anyhow::anyhow!("task did not complete: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::EventLog;
    use stagehand_core::PackageOutcome;
    use stagehand_storage::MemoryObjectStore;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst};

    #[derive(Default)]
    struct Probe {
        provider_calls: AtomicUsize,
        step_runs: AtomicUsize,
    }

    fn probed(name: &str, deps: &[&str], probe: Arc<Probe>, fail: bool) -> Module {
        let title = format!("Uploading {name}");
        deps.iter()
            .fold(Module::new(name, name.to_uppercase()), |m, d| m.depends_on(*d))
            .with_package_fn(move |_| {
                let probe = probe.clone();
                let title = title.clone();
                async move {
                    probe.provider_calls.fetch_add(1, SeqCst);
                    Ok(PackageOutcome::new(vec![SubTask::new(title, async move {
                        probe.step_runs.fetch_add(1, SeqCst);
                        if fail {
                            anyhow::bail!("upload rejected");
                        }
                        Ok(())
                    })]))
                }
            })
    }

    fn answers(mandatory: &[&str], requested: &[&str], expanded: &[&str]) -> Arc<Answers> {
        Arc::new(
            Answers::new("dev", "us-west-2", "artifacts")
                .with_mandatory(mandatory.iter().copied())
                .with_requested(requested.iter().copied())
                .with_expanded(expanded.iter().copied()),
        )
    }

    fn noop_pre_step() -> TaskUnit {
        TaskUnit::new("Packaging tags parameters", Vec::new())
    }

    fn engine(log: &EventLog) -> ExecutionEngine {
        ExecutionEngine::new().with_reporter(Arc::new(log.clone()))
    }

    #[tokio::test]
    async fn test_only_selected_modules_run() {
        let a = Arc::new(Probe::default());
        let b = Arc::new(Probe::default());
        let modules = vec![probed("a", &[], a.clone(), false), probed("b", &["a"], b.clone(), false)];
        let answers = answers(&["a"], &[], &["a", "b"]);

        let log = EventLog::new();
        let engine = engine(&log);
        let plan = engine.plan(&modules, &answers).unwrap();
        assert_eq!(plan.layers.len(), 2);

        let report = engine.run(&plan, &modules, answers, noop_pre_step()).await.unwrap();

        assert_eq!(a.provider_calls.load(SeqCst), 1);
        assert_eq!(a.step_runs.load(SeqCst), 1);
        assert_eq!(b.provider_calls.load(SeqCst), 0);
        assert_eq!(b.step_runs.load(SeqCst), 0);
        assert_eq!(report.packaged().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(report.layers[1].skipped, vec!["b"]);
        assert_eq!(report.state(), RunState::Completed);
    }

    #[tokio::test]
    async fn test_dependents_wait_and_siblings_overlap() {
        let x_done = Arc::new(AtomicBool::new(false));
        let barrier = Arc::new(tokio::sync::Barrier::new(2));

        let x = {
            let x_done = x_done.clone();
            Module::new("x", "X").with_package_fn(move |_| {
                let x_done = x_done.clone();
                async move {
                    Ok(PackageOutcome::new(vec![SubTask::new("build", async move {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        x_done.store(true, SeqCst);
                        Ok(())
                    })]))
                }
            })
        };
        let sibling = |name: &'static str| {
            let x_done = x_done.clone();
            let barrier = barrier.clone();
            Module::new(name, name).depends_on("x").with_package_fn(move |_| {
                let x_done = x_done.clone();
                let barrier = barrier.clone();
                async move {
                    anyhow::ensure!(x_done.load(SeqCst), "x not finished before {name} started");
                    Ok(PackageOutcome::new(vec![SubTask::new("upload", async move {
                        // Both siblings must be in flight at once to get past the barrier
                        tokio::time::timeout(Duration::from_secs(5), barrier.wait())
                            .await
                            .map_err(|_| anyhow::anyhow!("siblings did not run concurrently"))?;
                        Ok(())
                    })]))
                }
            })
        };

        let modules = vec![x, sibling("y"), sibling("z")];
        let answers = answers(&["x", "y", "z"], &[], &["x", "y", "z"]);
        let log = EventLog::new();
        let engine = engine(&log);
        let plan = engine.plan(&modules, &answers).unwrap();

        let report = engine.run(&plan, &modules, answers, noop_pre_step()).await.unwrap();
        assert_eq!(report.layers.len(), 2);
        assert_eq!(report.layers[1].packaged.len(), 2);

        let x_completed = log
            .position(|k| matches!(k, RunEventKind::TaskCompleted { module, .. } if module == "x"))
            .unwrap();
        for name in ["y", "z"] {
            let started = log
                .position(|k| matches!(k, RunEventKind::TaskStarted { module, .. } if module == name))
                .unwrap();
            assert!(x_completed < started);
        }
    }

    #[tokio::test]
    async fn test_failure_in_middle_layer_stops_the_run() {
        let probes: Vec<Arc<Probe>> = (0..4).map(|_| Arc::new(Probe::default())).collect();
        let modules = vec![
            probed("base", &[], probes[0].clone(), false),
            probed("broken", &["base"], probes[1].clone(), true),
            probed("healthy", &["base"], probes[2].clone(), false),
            probed("top", &["broken"], probes[3].clone(), false),
        ];
        let names = ["base", "broken", "healthy", "top"];
        let answers = answers(&names, &[], &names);

        let log = EventLog::new();
        let engine = engine(&log);
        let plan = engine.plan(&modules, &answers).unwrap();
        assert_eq!(plan.layers.len(), 3);

        let err = engine.run(&plan, &modules, answers, noop_pre_step()).await.unwrap_err();

        assert_eq!(err.state, RunState::LayerFailed(1));
        assert_eq!(err.module(), Some("broken"));
        assert_eq!(err.layer(), Some(1));
        assert!(matches!(err.error, OrchestratorError::TaskExecutionFailure { .. }));
        assert!(err.to_string().contains("upload rejected"));

        // The sibling still settled, the next layer never started
        assert_eq!(probes[2].step_runs.load(SeqCst), 1);
        assert_eq!(probes[3].provider_calls.load(SeqCst), 0);
        assert!(log.position(|k| matches!(k, RunEventKind::LayerStarted { index: 2, .. })).is_none());
        assert!(matches!(log.kinds().last(), Some(RunEventKind::RunFailed { .. })));
    }

    #[tokio::test]
    async fn test_provider_error_fails_layer_before_launch() {
        let later = Arc::new(Probe::default());
        let modules = vec![
            Module::new("a", "A").with_package_fn(|_| async { anyhow::bail!("template missing") }),
            probed("b", &["a"], later.clone(), false),
        ];
        let answers = answers(&["a", "b"], &[], &["a", "b"]);
        let engine = ExecutionEngine::new();
        let plan = engine.plan(&modules, &answers).unwrap();

        let err = engine.run(&plan, &modules, answers, noop_pre_step()).await.unwrap_err();
        assert_eq!(err.state, RunState::LayerFailed(0));
        assert_eq!(err.module(), Some("a"));
        assert_eq!(later.provider_calls.load(SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pre_step_failure_aborts_before_layers() {
        let probe = Arc::new(Probe::default());
        let modules = vec![probed("a", &[], probe.clone(), false)];
        let answers = answers(&["a"], &[], &["a"]);
        let engine = ExecutionEngine::new();
        let plan = engine.plan(&modules, &answers).unwrap();

        let pre_step = TaskUnit::new(
            "Packaging tags parameters",
            vec![SubTask::new("upload tags", async { anyhow::bail!("access denied") })],
        );
        let err = engine.run(&plan, &modules, answers, pre_step).await.unwrap_err();

        assert_eq!(err.state, RunState::PreStepFailed);
        assert!(matches!(err.error, OrchestratorError::PreStepFailed { .. }));
        assert_eq!(probe.provider_calls.load(SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_package_functionality_even_when_unselected() {
        let probe = Arc::new(Probe::default());
        let modules = vec![probed("a", &[], probe.clone(), false), Module::new("bare", "Bare")];
        let answers = answers(&["a"], &[], &["a", "bare"]);
        let engine = ExecutionEngine::new();
        let plan = engine.plan(&modules, &answers).unwrap();

        let pre_step_ran = Arc::new(AtomicBool::new(false));
        let flag = pre_step_ran.clone();
        let pre_step = TaskUnit::new(
            "tags",
            vec![SubTask::new("upload", async move {
                flag.store(true, SeqCst);
                Ok(())
            })],
        );

        let err = engine.run(&plan, &modules, answers, pre_step).await.unwrap_err();
        assert!(matches!(err.error, OrchestratorError::MissingPackageFunctionality(ref m) if m == "bare"));
        assert_eq!(err.state, RunState::NotStarted);
        assert!(!pre_step_ran.load(SeqCst));
        assert_eq!(probe.provider_calls.load(SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_provider_is_awaited_before_next_layer() {
        let side_effects = Arc::new(AtomicUsize::new(0));
        let seen_by_dependent = Arc::new(AtomicUsize::new(usize::MAX));

        let a = {
            let side_effects = side_effects.clone();
            Module::new("a", "A").with_package_fn(move |_| {
                let side_effects = side_effects.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    side_effects.fetch_add(1, SeqCst);
                    Ok(PackageOutcome::empty())
                }
            })
        };
        let b = {
            let side_effects = side_effects.clone();
            let seen = seen_by_dependent.clone();
            Module::new("b", "B").depends_on("a").with_package_fn(move |_| {
                let side_effects = side_effects.clone();
                let seen = seen.clone();
                async move {
                    seen.store(side_effects.load(SeqCst), SeqCst);
                    Ok(PackageOutcome::empty())
                }
            })
        };

        let modules = vec![a, b];
        let answers = answers(&["a", "b"], &[], &["a", "b"]);
        let log = EventLog::new();
        let engine = engine(&log);
        let plan = engine.plan(&modules, &answers).unwrap();

        let report = engine.run(&plan, &modules, answers, noop_pre_step()).await.unwrap();
        assert_eq!(seen_by_dependent.load(SeqCst), 1);
        assert_eq!(report.layers[0].empty, vec!["a"]);
        assert_eq!(report.packaged().count(), 0);
        assert!(log.position(|k| matches!(k, RunEventKind::TaskStarted { .. })).is_none());
    }

    #[tokio::test]
    async fn test_task_tree_events() {
        let probe = Arc::new(Probe::default());
        let modules = vec![probed("a", &[], probe, false)];
        let answers = answers(&[], &["a"], &["a"]);
        let log = EventLog::new();
        let engine = engine(&log);
        let plan = engine.plan(&modules, &answers).unwrap();

        engine.run(&plan, &modules, answers, noop_pre_step()).await.unwrap();

        let kinds = log.kinds();
        assert_eq!(kinds.first(), Some(&RunEventKind::RunStarted { layers: 1 }));
        assert!(kinds.contains(&RunEventKind::TaskStarted {
            layer: 0,
            module: "a".into(),
            label: "A".into(),
            steps: vec!["Uploading a".into()],
        }));
        let pre_done = log
            .position(|k| matches!(k, RunEventKind::PreStepCompleted { .. }))
            .unwrap();
        let layer_started = log
            .position(|k| matches!(k, RunEventKind::LayerStarted { index: 0, .. }))
            .unwrap();
        assert!(pre_done < layer_started);
        assert!(matches!(kinds.last(), Some(RunEventKind::RunCompleted { .. })));
    }

    #[tokio::test]
    async fn test_plan_is_deterministic() {
        let modules: Vec<Module> = ["d", "c", "b", "a"]
            .iter()
            .map(|n| {
                let m = Module::new(*n, *n);
                if *n == "a" { m } else { m.depends_on("a") }
            })
            .collect();
        let answers = answers(&[], &[], &["a", "b", "c", "d"]);
        let engine = ExecutionEngine::new();

        let first = engine.plan(&modules, &answers).unwrap();
        let second = engine.plan(&modules, &answers).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.layers[1].iter().collect::<Vec<_>>(), vec!["b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_plan_rejects_cycles_and_unknown_dependencies() {
        let engine = ExecutionEngine::new();

        let cyclic = vec![Module::new("a", "A").depends_on("b"), Module::new("b", "B").depends_on("a")];
        assert!(matches!(
            engine.plan(&cyclic, &answers(&[], &[], &["a", "b"])),
            Err(OrchestratorError::CyclicDependency { .. })
        ));

        let dangling = vec![Module::new("a", "A").depends_on("ghost")];
        assert!(matches!(
            engine.plan(&dangling, &answers(&[], &[], &["a"])),
            Err(OrchestratorError::UnknownDependency { .. })
        ));
    }

    #[tokio::test]
    async fn test_package_uploads_tags_then_runs_layers() {
        let store = MemoryObjectStore::new();
        let probe = Arc::new(Probe::default());
        let modules = vec![probed("a", &[], probe.clone(), false)];
        let answers = Arc::new(
            Answers::new("dev", "us-west-2", "artifacts")
                .with_mandatory(["a"])
                .with_expanded(["a"])
                .with_custom_tags("team=iot"),
        );

        let report = ExecutionEngine::new()
            .package(&modules, answers, Arc::new(store.clone()))
            .await
            .unwrap();

        assert_eq!(report.packaged().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(store.list_keys("artifacts").await, vec!["cloudformation/parameters/tags.json"]);
    }

    #[tokio::test]
    async fn test_package_with_cycle_uploads_nothing() {
        let store = MemoryObjectStore::new();
        let modules = vec![Module::new("a", "A").depends_on("b"), Module::new("b", "B").depends_on("a")];

        let err = ExecutionEngine::new()
            .package(&modules, answers(&["a"], &[], &["a", "b"]), Arc::new(store.clone()))
            .await
            .unwrap_err();

        assert_eq!(err.state, RunState::NotStarted);
        assert!(err.to_string().contains("Cyclic dependency"));
        assert!(err.to_string().contains("(after "));
        assert!(store.list_keys("artifacts").await.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_step_is_a_task_failure() {
        let modules = vec![Module::new("a", "A").with_package_fn(|_| async {
            Ok(PackageOutcome::new(vec![SubTask::new("explode", async {
                if true {
                    panic!("boom");
                }
                Ok(())
            })]))
        })];
        let answers = answers(&["a"], &[], &["a"]);
        let engine = ExecutionEngine::new();
        let plan = engine.plan(&modules, &answers).unwrap();

        let err = engine.run(&plan, &modules, answers, noop_pre_step()).await.unwrap_err();
        assert_eq!(err.state, RunState::LayerFailed(0));
        assert!(err.to_string().contains("task panicked: boom"));
    }

    /// Selects every module except one, which it rejects.
    struct RejectingSelector(&'static str);

    impl ModuleSelector for RejectingSelector {
        fn is_selected(&self, module: &Module, _policy: &SelectionPolicy) -> crate::error::Result<bool> {
            if module.name == self.0 {
                return Err(OrchestratorError::ModuleNotPackageable(module.name.clone()));
            }
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_selector_error_fails_the_layer() {
        let a = Arc::new(Probe::default());
        let b = Arc::new(Probe::default());
        let modules = vec![probed("a", &[], a.clone(), false), probed("b", &["a"], b.clone(), false)];
        // Nothing mandatory or requested: only the custom selector picks "a"
        let answers = answers(&[], &[], &["a", "b"]);

        let log = EventLog::new();
        let engine = engine(&log).with_selector(Box::new(RejectingSelector("b")));
        let plan = engine.plan(&modules, &answers).unwrap();

        let err = engine.run(&plan, &modules, answers, noop_pre_step()).await.unwrap_err();

        assert_eq!(err.state, RunState::LayerFailed(1));
        assert!(matches!(err.error, OrchestratorError::ModuleNotPackageable(ref m) if m == "b"));
        assert_eq!(a.step_runs.load(SeqCst), 1);
        assert_eq!(b.provider_calls.load(SeqCst), 0);
        assert!(log
            .kinds()
            .contains(&RunEventKind::LayerFailed { index: 1, module: "b".into() }));
        assert!(matches!(log.kinds().last(), Some(RunEventKind::RunFailed { .. })));
    }

    #[tokio::test]
    async fn test_tags_prefix_from_config() {
        let store = MemoryObjectStore::new();
        let engine = ExecutionEngine::new().with_config(EngineConfig {
            tags_prefix: "cfn".into(),
            ..Default::default()
        });
        assert_eq!(engine.config().tags_prefix, "cfn");
        assert!(!engine.config().include_optional);

        engine
            .package(&[], answers(&[], &[], &[]), Arc::new(store.clone()))
            .await
            .unwrap();
        assert_eq!(store.list_keys("artifacts").await, vec!["cfn/parameters/tags.json"]);
    }

    #[test]
    fn test_plan_keeps_the_graph() {
        let modules = vec![Module::new("a", "A"), Module::new("b", "B").depends_on("a")];
        let plan = ExecutionEngine::new()
            .plan(&modules, &answers(&[], &[], &["b"]))
            .unwrap();
        assert_eq!(plan.graph.len(), 2);
        assert_eq!(plan.layers, vec![Layer::from(["b".to_string()])]);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!RunState::NotStarted.is_terminal());
        assert!(!RunState::LayerRunning(3).is_terminal());
        assert!(RunState::PreStepFailed.is_terminal());
        assert!(RunState::LayerFailed(0).is_terminal());
        assert!(RunState::Completed.is_terminal());
        assert_eq!(RunState::LayerFailed(2).to_string(), "layer 2 failed");
    }
}
