//! Task Graph Executor
//!
//! Runs an ordered list of task nodes, each bound to a worker and one of its
//! granted capabilities. Completed outputs are appended to a Run Context that
//! later tasks read as part of their input.
//!
//! A run moves `Planned → Running → Completed | Failed`. Tasks execute
//! strictly in the supplied order. The first failing task stops the run;
//! the outcome carries the partial context and the failing task's error.
//! Nothing is retried here; capabilities own their retry policy.

pub mod plans;

use crate::capability::CapabilityRegistry;
use crate::router::Tier;
use crate::workers::WorkerRegistry;
use sdk::{CapabilityArgs, CapabilityOutput, EngineError, INPUT_KEY};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub use plans::PlanLibrary;

/// Argument carrying the effective tier of the task
pub const TIER_KEY: &str = "tier";
/// Argument carrying the bound worker's system preamble
pub const ROLE_KEY: &str = "role";
/// Argument carrying the text of the most recent output
pub const PREVIOUS_KEY: &str = "previous";
/// Argument carrying the structured data of the most recent output
pub const PREVIOUS_DATA_KEY: &str = "previous_data";

/// Which earlier outputs a task sees
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextRef {
    /// Every completed output so far
    #[default]
    All,
    /// Only the most recent output
    Previous,
    /// Nothing; the description stands alone
    None,
}

/// One step of a run plan
#[derive(Debug, Clone, PartialEq)]
pub struct TaskNode {
    pub name: String,
    pub description: String,
    pub worker: String,
    pub capability: String,
    pub params: CapabilityArgs,
    pub context: ContextRef,
    pub expected_output: String,
    /// Output feeds later tasks but is left out of the reply
    pub quiet: bool,
}

impl TaskNode {
    pub fn new(
        name: impl Into<String>,
        worker: impl Into<String>,
        capability: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            worker: worker.into(),
            capability: capability.into(),
            params: CapabilityArgs::new(),
            context: ContextRef::All,
            expected_output: String::new(),
            quiet: false,
        }
    }

    pub fn expected(mut self, expected_output: impl Into<String>) -> Self {
        self.expected_output = expected_output.into();
        self
    }

    pub fn param(mut self, key: &str, value: Value) -> Self {
        self.params.set(key, value);
        self
    }

    pub fn context(mut self, context: ContextRef) -> Self {
        self.context = context;
        self
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }
}

/// A validated, ordered task list. Consumed by exactly one run.
#[derive(Debug)]
pub struct RunPlan {
    name: String,
    tier: Tier,
    tasks: Vec<TaskNode>,
}

impl RunPlan {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn tasks(&self) -> &[TaskNode] {
        &self.tasks
    }
}

/// Collects task nodes and validates them against the registries.
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    name: String,
    tier: Tier,
    tasks: Vec<TaskNode>,
}

impl PlanBuilder {
    pub fn new(name: impl Into<String>, tier: Tier) -> Self {
        Self {
            name: name.into(),
            tier,
            tasks: Vec::new(),
        }
    }

    pub fn task(mut self, task: TaskNode) -> Self {
        self.tasks.push(task);
        self
    }

    /// Validate every node.
    ///
    /// # Errors
    /// `UnknownWorker`, `UnknownCapability` or `CapabilityNotGranted` for the
    /// first offending node; `Config` for an empty plan. Nothing has been
    /// invoked when these are returned.
    pub fn build(
        self,
        workers: &WorkerRegistry,
        capabilities: &CapabilityRegistry,
    ) -> Result<RunPlan, EngineError> {
        if self.tasks.is_empty() {
            return Err(EngineError::Config(format!(
                "plan '{}' has no tasks",
                self.name
            )));
        }

        for task in &self.tasks {
            let worker = workers.get(&task.worker)?;
            if !capabilities.contains(&task.capability) {
                return Err(EngineError::UnknownCapability(task.capability.clone()));
            }
            if !worker.can_use(&task.capability) {
                return Err(EngineError::CapabilityNotGranted {
                    worker: task.worker.clone(),
                    capability: task.capability.clone(),
                });
            }
        }

        Ok(RunPlan {
            name: self.name,
            tier: self.tier,
            tasks: self.tasks,
        })
    }
}

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Planned,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Planned => "planned",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One completed task's output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextEntry {
    pub task: String,
    pub worker: String,
    pub output: CapabilityOutput,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub quiet: bool,
}

/// Append-only outputs of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunContext {
    entries: Vec<ContextEntry>,
}

impl RunContext {
    fn append(&mut self, entry: ContextEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&ContextEntry> {
        self.entries.last()
    }

    /// Entries meant for the requester.
    pub fn reportable(&self) -> impl Iterator<Item = &ContextEntry> {
        self.entries.iter().filter(|e| !e.quiet)
    }

    /// Text of the outputs a task with `reference` may see.
    pub fn render(&self, reference: ContextRef) -> String {
        let visible: &[ContextEntry] = match reference {
            ContextRef::All => &self.entries,
            ContextRef::Previous => match self.entries.len() {
                0 => &[],
                n => &self.entries[n - 1..],
            },
            ContextRef::None => &[],
        };

        visible
            .iter()
            .map(|e| format!("## {} ({})\n{}", e.task, e.worker, e.output.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// The task that stopped a run
#[derive(Debug)]
pub struct TaskFailure {
    /// Zero-based position in the plan
    pub index: usize,
    pub task: String,
    pub worker: String,
    pub capability: String,
    pub error: EngineError,
}

/// Result of executing a plan
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: String,
    pub plan: String,
    pub tier: Tier,
    pub state: RunState,
    pub context: RunContext,
    pub failure: Option<TaskFailure>,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Text of the final output, if the run completed.
    pub fn final_text(&self) -> Option<&str> {
        match self.state {
            RunState::Completed => self.context.last().map(|e| e.output.text.as_str()),
            _ => None,
        }
    }

    /// JSON summary for the CLI `--json` mode.
    pub fn to_json(&self) -> Value {
        json!({
            "runId": self.run_id,
            "plan": self.plan,
            "tier": self.tier,
            "state": self.state,
            "context": self.context,
            "failure": self.failure.as_ref().map(|f| json!({
                "index": f.index,
                "task": f.task,
                "worker": f.worker,
                "capability": f.capability,
                "error": crate::secrets::scrub(&f.error.to_string()),
            })),
        })
    }
}

/// Executes run plans against the registries.
pub struct Executor {
    capabilities: Arc<CapabilityRegistry>,
    workers: Arc<WorkerRegistry>,
}

impl Executor {
    pub fn new(capabilities: Arc<CapabilityRegistry>, workers: Arc<WorkerRegistry>) -> Self {
        Self {
            capabilities,
            workers,
        }
    }

    /// Execute a plan to completion or first failure.
    pub async fn execute(&self, plan: RunPlan) -> RunOutcome {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("run", run_id = %run_id, plan = %plan.name);
        self.execute_inner(run_id, plan).instrument(span).await
    }

    async fn execute_inner(&self, run_id: String, plan: RunPlan) -> RunOutcome {
        let start = Instant::now();
        let mut context = RunContext::default();
        let mut state = RunState::Planned;
        info!(state = %state, tasks = plan.tasks.len(), tier = %plan.tier, "Run planned");

        state = RunState::Running;
        let RunPlan { name, tier, tasks } = plan;

        for (index, task) in tasks.into_iter().enumerate() {
            info!(state = %state, task = %task.name, worker = %task.worker, "Dispatching task");

            match self.run_task(&task, tier, &context).await {
                Ok(output) => {
                    context.append(ContextEntry {
                        task: task.name,
                        worker: task.worker,
                        output,
                        quiet: task.quiet,
                    });
                }
                Err(error) => {
                    state = RunState::Failed;
                    warn!(
                        state = %state,
                        task = %task.name,
                        error = %crate::secrets::scrub(&error.to_string()),
                        completed = context.len(),
                        "Run failed"
                    );
                    return RunOutcome {
                        run_id,
                        plan: name,
                        tier,
                        state,
                        context,
                        failure: Some(TaskFailure {
                            index,
                            task: task.name,
                            worker: task.worker,
                            capability: task.capability,
                            error,
                        }),
                    };
                }
            }
        }

        state = RunState::Completed;
        info!(
            state = %state,
            outputs = context.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Run completed"
        );

        RunOutcome {
            run_id,
            plan: name,
            tier,
            state,
            context,
            failure: None,
        }
    }

    async fn run_task(
        &self,
        task: &TaskNode,
        tier: Tier,
        context: &RunContext,
    ) -> Result<CapabilityOutput, EngineError> {
        let worker = self.workers.get(&task.worker)?;
        if !worker.can_use(&task.capability) {
            return Err(EngineError::CapabilityNotGranted {
                worker: task.worker.clone(),
                capability: task.capability.clone(),
            });
        }

        let mut args = task.params.clone();
        args.set(INPUT_KEY, Value::String(task_input(task, context)));
        args.set(
            TIER_KEY,
            Value::String(worker.effective_tier(tier).to_string()),
        );
        args.set(ROLE_KEY, Value::String(worker.preamble()));
        if task.context != ContextRef::None {
            if let Some(last) = context.last() {
                args.set(PREVIOUS_KEY, Value::String(last.output.text.clone()));
                if !last.output.data.is_null() {
                    args.set(PREVIOUS_DATA_KEY, last.output.data.clone());
                }
            }
        }

        let invocation = self.capabilities.invoke(&task.capability, &args).await?;
        Ok(invocation.output)
    }
}

/// Description, expected output and visible context, as one input text.
fn task_input(task: &TaskNode, context: &RunContext) -> String {
    let mut input = task.description.clone();

    if !task.expected_output.is_empty() {
        input.push_str("\n\nExpected output: ");
        input.push_str(&task.expected_output);
    }

    let upstream = context.render(task.context);
    if !upstream.is_empty() {
        input.push_str("\n\nContext from previous tasks:\n");
        input.push_str(&upstream);
    }

    input
}
