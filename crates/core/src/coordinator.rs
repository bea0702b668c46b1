//! The Mantle coordinator: plans, delegates, synthesizes. It never executes
//! tasks directly.
//!
//! Per-goal lifecycle: `Received → Decomposed → (per task: Broadcasting →
//! Selecting → Executing) → Synthesized | Aborted`. Tasks inside one goal
//! run strictly in sequence; separate goals may run concurrently against
//! the same registry.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{error, info, warn};

use mantle_shared::{
    Bid, MantleError, MantleId, MantleResult, Notice, NoticeSender, Task, TaskResult,
    ThinkingEngine,
};

use crate::registry::AgentRegistry;
use crate::thinking::parse_step_list;

// ============================================================
// Configuration
// ============================================================

/// What to do with a task nobody bids on. The skip variant is the default:
/// it keeps a plan alive through partial agent-pool outages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoBidPolicy {
    SkipAndContinue,
    AbortPlan,
}

impl FromStr for NoBidPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(NoBidPolicy::SkipAndContinue),
            "abort" => Ok(NoBidPolicy::AbortPlan),
            other => Err(format!("expected 'skip' or 'abort', got '{other}'")),
        }
    }
}

#[derive(Clone)]
pub struct CoordinatorConfig {
    pub no_bid_policy: NoBidPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            no_bid_policy: NoBidPolicy::SkipAndContinue,
        }
    }
}

// ============================================================
// Goal bookkeeping
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalState {
    Received,
    Decomposed,
    Synthesized,
    Aborted,
}

#[derive(Debug)]
pub enum TaskDisposition {
    Completed(TaskResult),
    Failed(TaskResult),
    Skipped { reason: String },
}

#[derive(Debug)]
pub struct TaskRecord {
    pub task: Task,
    pub disposition: TaskDisposition,
}

#[derive(Debug)]
pub struct GoalReport {
    pub goal_id: MantleId,
    pub goal: String,
    pub state: GoalState,
    pub records: Vec<TaskRecord>,
    pub summary: String,
}

// ============================================================
// Selection
// ============================================================

/// Deterministic winner selection: strictly highest confidence, ties broken
/// by lowest estimated cost, remaining ties by registration order (the bid
/// list keeps registration order, and the scan only replaces the champion
/// on a strict improvement, so the first registered wins).
#[must_use]
pub fn select_winner(bids: &[Bid]) -> Option<&Bid> {
    let mut best: Option<&Bid> = None;
    for bid in bids {
        match best {
            None => best = Some(bid),
            Some(current) => {
                if bid.confidence > current.confidence
                    || (bid.confidence == current.confidence
                        && bid.estimated_cost < current.estimated_cost)
                {
                    best = Some(bid);
                }
            }
        }
    }
    best
}

// ============================================================
// Coordinator
// ============================================================

pub struct Coordinator {
    registry: Arc<AgentRegistry>,
    thinker: Arc<dyn ThinkingEngine>,
    notices: NoticeSender,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(
        registry: Arc<AgentRegistry>,
        thinker: Arc<dyn ThinkingEngine>,
        notices: NoticeSender,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            registry,
            thinker,
            notices,
            config,
        }
    }

    /// Process one goal end to end. The only error is a decomposition
    /// failure — once a plan exists, every other outcome (including a full
    /// abort) still produces a synthesized report.
    pub async fn process_goal(&self, goal: &str) -> MantleResult<GoalReport> {
        let goal_id = MantleId::new();
        info!(goal_id = %goal_id, "🎯 goal received: '{goal}'");
        self.phase(goal_id, "received", None);

        let tasks = self.decompose(goal_id, goal).await?;
        info!(goal_id = %goal_id, steps = tasks.len(), "🗺️ plan generated");
        self.phase(goal_id, "decomposed", None);

        Ok(self.run_plan_with_id(goal_id, goal, tasks).await)
    }

    /// Execute an already-decomposed plan. Entry point for callers that
    /// build their own task lists (explicit dependencies included) instead
    /// of going through the thinking collaborator. Never fails: every
    /// outcome is a synthesized report.
    pub async fn run_plan(&self, goal: &str, tasks: Vec<Task>) -> GoalReport {
        self.run_plan_with_id(MantleId::new(), goal, tasks).await
    }

    async fn run_plan_with_id(
        &self,
        goal_id: MantleId,
        goal: &str,
        tasks: Vec<Task>,
    ) -> GoalReport {
        let mut records: Vec<TaskRecord> = Vec::with_capacity(tasks.len());
        let mut completed: BTreeSet<String> = BTreeSet::new();
        let mut state = GoalState::Decomposed;

        let mut queue = tasks.into_iter();
        while let Some(task) = queue.next() {
            // Dependency gate: the hook a DAG-respecting scheduler would use.
            if let Some(missing) = task.dependencies.iter().find(|d| !completed.contains(*d)) {
                let missing = missing.clone();
                warn!(task_id = %task.id, dependency = %missing, "⏭️ dependency unresolved, skipping");
                records.push(skipped(
                    task,
                    format!("dependency '{missing}' was not completed"),
                ));
                continue;
            }

            info!(task_id = %task.id, "🚀 starting step: '{}'", task.description);
            self.phase(goal_id, "broadcasting", Some(&task.id));
            let bids = self.registry.broadcast(&task).await;
            info!(task_id = %task.id, bids = bids.len(), "📩 readiness proposals collected");

            if bids.is_empty() {
                match self.config.no_bid_policy {
                    NoBidPolicy::SkipAndContinue => {
                        warn!(task_id = %task.id, "❌ no agent bid; skipping step");
                        records.push(skipped(task, "no agent bid on this task".to_string()));
                        continue;
                    }
                    NoBidPolicy::AbortPlan => {
                        error!(task_id = %task.id, "❌ no agent bid; aborting plan");
                        let abort_reason =
                            format!("plan aborted: no agent bid on task '{}'", task.id);
                        records.push(skipped(task, "no agent bid on this task".to_string()));
                        for remaining in queue.by_ref() {
                            records.push(skipped(remaining, abort_reason.clone()));
                        }
                        state = GoalState::Aborted;
                        break;
                    }
                }
            }

            self.phase(goal_id, "selecting", Some(&task.id));
            // Broadcast returned at least one bid, so a winner always exists.
            let Some(winner) = select_winner(&bids).cloned() else {
                continue;
            };
            info!(
                task_id = %task.id,
                agent_id = %winner.agent_id,
                confidence = winner.confidence,
                "🏆 agent selected"
            );
            if let Some(plan) = &winner.action_plan {
                info!(agent_id = %winner.agent_id, "   plan: {plan}");
            }

            self.phase(goal_id, "executing", Some(&task.id));
            match self.registry.dispatch(&winner.agent_id, &task).await {
                Ok(result) if result.succeeded => {
                    info!(task_id = %task.id, agent_id = %winner.agent_id, "✅ step completed");
                    completed.insert(task.id.clone());
                    records.push(TaskRecord {
                        task,
                        disposition: TaskDisposition::Completed(result),
                    });
                }
                Ok(result) => {
                    warn!(task_id = %task.id, agent_id = %winner.agent_id, "⚠️ step failed");
                    let failed_id = task.id.clone();
                    records.push(TaskRecord {
                        task,
                        disposition: TaskDisposition::Failed(result),
                    });

                    // A failure only kills the plan when every remaining task
                    // hard-depends on the failed step.
                    let remaining: Vec<Task> = queue.by_ref().collect();
                    if !remaining.is_empty()
                        && remaining.iter().all(|t| t.dependencies.contains(&failed_id))
                    {
                        error!(
                            task_id = %failed_id,
                            "❌ failed step is a hard dependency of the whole remainder; aborting"
                        );
                        for rest in remaining {
                            records.push(skipped(
                                rest,
                                format!("hard dependency '{failed_id}' failed"),
                            ));
                        }
                        state = GoalState::Aborted;
                        break;
                    }
                    queue = remaining.into_iter();
                }
                Err(MantleError::AgentNotFound(id)) => {
                    // Internal bug: a bid was selected for an agent missing
                    // from the registry. Fatal to this task, loudly recorded.
                    error!(task_id = %task.id, agent_id = %id, "🚫 routing failure");
                    self.notices.emit(Notice::new(
                        "routing.failure",
                        serde_json::json!({ "task_id": task.id, "agent_id": id }),
                        "coordinator",
                    ));
                    let diagnostic =
                        format!("routing failure: agent '{id}' vanished from the registry");
                    let result = TaskResult::failure(&task.id, &id, diagnostic);
                    records.push(TaskRecord {
                        task,
                        disposition: TaskDisposition::Failed(result),
                    });
                }
                Err(e) => {
                    error!(task_id = %task.id, error = %e, "🚫 dispatch error");
                    let result = TaskResult::failure(&task.id, &winner.agent_id, e.to_string());
                    records.push(TaskRecord {
                        task,
                        disposition: TaskDisposition::Failed(result),
                    });
                }
            }
        }

        if state != GoalState::Aborted {
            state = GoalState::Synthesized;
        }

        let summary = synthesize(goal, state, &records);
        self.phase(goal_id, "synthesized", None);
        info!(goal_id = %goal_id, state = ?state, "🎉 goal processing finished");

        GoalReport {
            goal_id,
            goal: goal.to_string(),
            state,
            records,
            summary,
        }
    }

    /// Decomposition is delegated to the thinking collaborator; its output
    /// is free text this side must be resilient to.
    async fn decompose(&self, goal_id: MantleId, goal: &str) -> MantleResult<Vec<Task>> {
        let prompt = format!(
            "Decompose the following mission into a numbered list of clear, actionable steps \
             for a multi-agent system. Mission: '{goal}'"
        );
        let raw = self
            .thinker
            .think(&prompt, "an ordered step list, one step per line")
            .await
            .map_err(|e| {
                error!(goal_id = %goal_id, error = %e, "🧠 thinking collaborator failed");
                MantleError::Decomposition(e.to_string())
            })?;

        let tasks = parse_step_list(&raw);
        if tasks.is_empty() {
            return Err(MantleError::Decomposition(
                "thinking collaborator produced no usable steps".to_string(),
            ));
        }
        Ok(tasks)
    }

    fn phase(&self, goal_id: MantleId, phase: &str, task_id: Option<&str>) {
        self.notices.emit(Notice::new(
            "goal.phase",
            serde_json::json!({
                "goal_id": goal_id.to_string(),
                "phase": phase,
                "task_id": task_id,
            }),
            "coordinator",
        ));
    }
}

fn skipped(task: Task, reason: String) -> TaskRecord {
    TaskRecord {
        task,
        disposition: TaskDisposition::Skipped { reason },
    }
}

// ============================================================
// Synthesis
// ============================================================

/// Render the final report. This step never fails: anything a task did not
/// produce is substituted with an explicit marker, so the caller is never
/// left without a report.
#[must_use]
pub fn synthesize(goal: &str, state: GoalState, records: &[TaskRecord]) -> String {
    let mut lines = vec![format!("Final report for goal: {goal}"), String::new()];

    let mut completed = 0usize;
    let mut failed = 0usize;
    let mut skipped_count = 0usize;

    for record in records {
        let id = &record.task.id;
        match &record.disposition {
            TaskDisposition::Completed(result) => {
                completed += 1;
                lines.push(format!(
                    "[done]    {id} ({}): {}",
                    result.agent_id,
                    payload_excerpt(&result.payload)
                ));
            }
            TaskDisposition::Failed(result) => {
                failed += 1;
                let diagnostic = result.payload["error"]
                    .as_str()
                    .unwrap_or("(no diagnostic recorded)");
                lines.push(format!("[failed]  {id} ({}): {diagnostic}", result.agent_id));
            }
            TaskDisposition::Skipped { reason } => {
                skipped_count += 1;
                lines.push(format!("[skipped] {id}: {reason}"));
            }
        }
    }

    if records.is_empty() {
        lines.push("(no result recorded)".to_string());
    }

    lines.push(String::new());
    lines.push(format!(
        "{completed} completed, {failed} failed, {skipped_count} skipped — {}",
        match state {
            GoalState::Aborted => "plan aborted",
            _ => "plan finished",
        }
    ));
    lines.join("\n")
}

fn payload_excerpt(payload: &serde_json::Value) -> String {
    for key in ["report", "summary", "plan"] {
        if let Some(text) = payload.get(key).and_then(|v| v.as_str()) {
            return first_line_excerpt(text);
        }
    }
    let compact = payload.to_string();
    first_line_excerpt(&compact)
}

fn first_line_excerpt(text: &str) -> String {
    let line = text.lines().next().unwrap_or("(no result recorded)");
    if line.chars().count() > 150 {
        let cut: String = line.chars().take(150).collect();
        format!("{cut}...")
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{failing_agent, scripted_agent, BrokenThinker, ScriptedThinker};
    use mantle_shared::NoticeSender;

    fn notices() -> NoticeSender {
        let (tx, _) = tokio::sync::broadcast::channel(64);
        NoticeSender::new(tx)
    }

    fn bid(agent_id: &str, confidence: f64, cost: f64) -> Bid {
        Bid {
            agent_id: agent_id.to_string(),
            capability: "test".to_string(),
            confidence,
            estimated_cost: cost,
            action_plan: None,
        }
    }

    #[test]
    fn selection_prefers_confidence_then_cost_then_registration_order() {
        let bids = vec![bid("A", 0.9, 2.0), bid("B", 0.9, 1.0), bid("C", 0.7, 0.5)];
        assert_eq!(select_winner(&bids).unwrap().agent_id, "B");

        // Full tie: first registered wins.
        let tied = vec![bid("A", 0.9, 1.0), bid("B", 0.9, 1.0)];
        assert_eq!(select_winner(&tied).unwrap().agent_id, "A");

        assert!(select_winner(&[]).is_none());
    }

    #[tokio::test]
    async fn no_bid_task_is_skipped_and_later_tasks_still_run() {
        let mut registry = AgentRegistry::new();
        registry.register(scripted_agent("a", "alpha", 0.9, 1.0)).unwrap();
        let coordinator = Coordinator::new(
            Arc::new(registry),
            Arc::new(ScriptedThinker {
                response: "1. handle the gamma step\n2. handle the alpha step".to_string(),
            }),
            notices(),
            CoordinatorConfig::default(),
        );

        let report = coordinator.process_goal("mixed plan").await.unwrap();
        assert_eq!(report.state, GoalState::Synthesized);
        assert!(matches!(
            report.records[0].disposition,
            TaskDisposition::Skipped { .. }
        ));
        assert!(matches!(
            report.records[1].disposition,
            TaskDisposition::Completed(_)
        ));
        assert!(report.summary.contains("[skipped] T1"));
    }

    #[tokio::test]
    async fn abort_policy_marks_the_remainder_skipped() {
        let mut registry = AgentRegistry::new();
        registry.register(scripted_agent("a", "alpha", 0.9, 1.0)).unwrap();
        let coordinator = Coordinator::new(
            Arc::new(registry),
            Arc::new(ScriptedThinker {
                response: "1. handle the gamma step\n2. handle the alpha step".to_string(),
            }),
            notices(),
            CoordinatorConfig {
                no_bid_policy: NoBidPolicy::AbortPlan,
            },
        );

        let report = coordinator.process_goal("mixed plan").await.unwrap();
        assert_eq!(report.state, GoalState::Aborted);
        assert_eq!(report.records.len(), 2);
        assert!(report
            .records
            .iter()
            .all(|r| matches!(r.disposition, TaskDisposition::Skipped { .. })));
        assert!(report.summary.contains("plan aborted"));
    }

    #[tokio::test]
    async fn ties_on_confidence_fall_to_the_cheaper_bid() {
        let mut registry = AgentRegistry::new();
        registry.register(scripted_agent("pricey", "alpha", 0.9, 2.0)).unwrap();
        registry.register(scripted_agent("cheap", "alpha", 0.9, 1.0)).unwrap();
        registry.register(scripted_agent("meek", "alpha", 0.7, 0.5)).unwrap();
        let coordinator = Coordinator::new(
            Arc::new(registry),
            Arc::new(ScriptedThinker {
                response: "1. handle the alpha step".to_string(),
            }),
            notices(),
            CoordinatorConfig::default(),
        );

        let report = coordinator.process_goal("one step").await.unwrap();
        let TaskDisposition::Completed(result) = &report.records[0].disposition else {
            panic!("expected completion");
        };
        assert_eq!(result.agent_id, "cheap");
    }

    #[tokio::test]
    async fn agent_failure_is_recorded_and_the_plan_continues() {
        let mut registry = AgentRegistry::new();
        registry.register(failing_agent("flaky", "alpha", 0.9, 1.0)).unwrap();
        registry.register(scripted_agent("solid", "beta", 0.8, 1.0)).unwrap();
        let coordinator = Coordinator::new(
            Arc::new(registry),
            Arc::new(ScriptedThinker {
                response: "1. handle the alpha step\n2. handle the beta step".to_string(),
            }),
            notices(),
            CoordinatorConfig::default(),
        );

        let report = coordinator.process_goal("resilient plan").await.unwrap();
        assert_eq!(report.state, GoalState::Synthesized);
        assert!(matches!(
            report.records[0].disposition,
            TaskDisposition::Failed(_)
        ));
        assert!(matches!(
            report.records[1].disposition,
            TaskDisposition::Completed(_)
        ));
        assert!(report.summary.contains("[failed]  T1"));
    }

    #[tokio::test]
    async fn decomposition_failure_aborts_before_any_agent_runs() {
        let mut registry = AgentRegistry::new();
        registry.register(scripted_agent("a", "*", 0.9, 1.0)).unwrap();
        let coordinator = Coordinator::new(
            Arc::new(registry),
            Arc::new(BrokenThinker),
            notices(),
            CoordinatorConfig::default(),
        );

        let err = coordinator.process_goal("anything").await.unwrap_err();
        assert!(matches!(err, MantleError::Decomposition(_)));
    }

    #[tokio::test]
    async fn empty_decomposition_output_is_a_decomposition_error() {
        let coordinator = Coordinator::new(
            Arc::new(AgentRegistry::new()),
            Arc::new(ScriptedThinker {
                response: "\n   \n".to_string(),
            }),
            notices(),
            CoordinatorConfig::default(),
        );

        let err = coordinator.process_goal("anything").await.unwrap_err();
        assert!(matches!(err, MantleError::Decomposition(_)));
    }

    #[test]
    fn synthesis_never_panics_on_odd_payloads() {
        let records = vec![TaskRecord {
            task: Task::new("T1", "odd"),
            disposition: TaskDisposition::Completed(TaskResult::success(
                "T1",
                "a",
                serde_json::json!([1, 2, 3]),
            )),
        }];
        let summary = synthesize("odd goal", GoalState::Synthesized, &records);
        assert!(summary.contains("[done]    T1"));

        let empty = synthesize("empty", GoalState::Synthesized, &[]);
        assert!(empty.contains("(no result recorded)"));
    }
}
