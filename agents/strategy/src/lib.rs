//! Strategy/planning specialist.
//!
//! Plans come from the thinking collaborator and are memoized in the
//! agent's own TTL+LRU cache; the periodic maintenance loop re-runs
//! eviction and reports cache occupancy through the notice sink.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use mantle_shared::cache::TtlLruCache;
use mantle_shared::{
    Agent, AgentContext, AgentDescriptor, AgentStatus, Bid, Notice, StatusCell, Task, TaskResult,
    ThinkingEngine,
};

pub const AGENT_ID: &str = "specialist.strategy";

const KEYWORDS: &[&str] = &["plan", "strategy", "prioritize", "roadmap", "report", "synthesize"];

pub struct StrategyAgent {
    ctx: AgentContext,
    thinker: Arc<dyn ThinkingEngine>,
    plan_cache: TtlLruCache<String>,
    maintenance_interval: Duration,
    status: StatusCell,
}

impl StrategyAgent {
    pub fn new(
        ctx: AgentContext,
        thinker: Arc<dyn ThinkingEngine>,
        cache_max_entries: usize,
        cache_ttl: Duration,
        maintenance_interval: Duration,
    ) -> Self {
        Self {
            ctx,
            thinker,
            plan_cache: TtlLruCache::new(cache_max_entries, cache_ttl),
            maintenance_interval,
            status: StatusCell::new(),
        }
    }

    fn cache_key(description: &str) -> String {
        description.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

#[async_trait]
impl Agent for StrategyAgent {
    fn descriptor(&self) -> AgentDescriptor {
        AgentDescriptor {
            id: AGENT_ID.to_string(),
            capability: "strategy".to_string(),
            description: "Drafts prioritized plan outlines and synthesis notes for a mission."
                .to_string(),
        }
    }

    async fn propose(&self, task: &Task) -> Option<Bid> {
        let description = task.description.to_lowercase();
        if !KEYWORDS.iter().any(|k| description.contains(k)) {
            return None;
        }
        Some(Bid {
            agent_id: AGENT_ID.to_string(),
            capability: "strategy".to_string(),
            confidence: 0.6,
            estimated_cost: 1.5,
            action_plan: Some("outline the mission via the thinking engine, memoize the plan".to_string()),
        })
    }

    async fn execute(&self, task: &Task) -> TaskResult {
        self.status.set(AgentStatus::Busy).await;
        let key = Self::cache_key(&task.description);

        if let Some(plan) = self.plan_cache.get(&key) {
            info!(task_id = %task.id, "💾 plan served from cache");
            self.status.set(AgentStatus::Idle).await;
            return TaskResult::success(
                &task.id,
                AGENT_ID,
                serde_json::json!({ "plan": plan, "cached": true }),
            );
        }

        let shape = "a short prioritized outline, one item per line";
        match self.thinker.think(&task.description, shape).await {
            Ok(raw) => {
                let plan = raw.trim().to_string();
                if plan.is_empty() {
                    self.status.set(AgentStatus::Error).await;
                    return TaskResult::failure(
                        &task.id,
                        AGENT_ID,
                        "thinking engine returned an empty outline",
                    );
                }
                self.plan_cache.set(key.clone(), plan.clone());
                self.ctx.notices.emit(Notice::new(
                    "strategy.plan",
                    serde_json::json!({ "task_id": task.id, "lines": plan.lines().count() }),
                    AGENT_ID,
                ));
                self.status.set(AgentStatus::Idle).await;
                TaskResult::success(
                    &task.id,
                    AGENT_ID,
                    serde_json::json!({ "plan": plan, "cached": false }),
                )
            }
            Err(e) => {
                self.status.set(AgentStatus::Error).await;
                TaskResult::failure(
                    &task.id,
                    AGENT_ID,
                    format!("thinking engine unavailable: {e}"),
                )
            }
        }
    }

    async fn status(&self) -> AgentStatus {
        self.status.get().await
    }

    fn maintenance_interval(&self) -> Option<Duration> {
        Some(self.maintenance_interval)
    }

    /// Re-runs lazy eviction (via `size`) and reports occupancy.
    async fn on_maintenance(&self) -> anyhow::Result<Option<Notice>> {
        let occupancy = self.plan_cache.size();
        Ok(Some(Notice::new(
            "strategy.cache",
            serde_json::json!({ "entries": occupancy }),
            AGENT_ID,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingThinker {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ThinkingEngine for CountingThinker {
        fn name(&self) -> &str {
            "counting"
        }

        async fn think(&self, goal: &str, _shape: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("1. Clarify scope of: {goal}\n2. Draft milestones\n3. Review"))
        }
    }

    fn agent(thinker: Arc<CountingThinker>) -> StrategyAgent {
        let (tx, _) = tokio::sync::broadcast::channel(16);
        StrategyAgent::new(
            AgentContext {
                notices: mantle_shared::NoticeSender::new(tx),
            },
            thinker,
            8,
            Duration::from_secs(60),
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn bids_with_moderate_confidence() {
        let thinker = Arc::new(CountingThinker { calls: AtomicU32::new(0) });
        let bid = agent(thinker)
            .propose(&Task::new("T3", "Generate a synthesis report with pros and cons"))
            .await
            .unwrap();
        assert_eq!(bid.confidence, 0.6);
    }

    #[tokio::test]
    async fn plans_are_memoized_per_mission() {
        let thinker = Arc::new(CountingThinker { calls: AtomicU32::new(0) });
        let agent = agent(thinker.clone());
        let task = Task::new("T1", "Plan the module rollout");

        let first = agent.execute(&task).await;
        assert!(first.succeeded);
        assert_eq!(first.payload["cached"], false);

        let second = agent.execute(&task).await;
        assert_eq!(second.payload["cached"], true);
        assert_eq!(thinker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn maintenance_reports_cache_occupancy() {
        let thinker = Arc::new(CountingThinker { calls: AtomicU32::new(0) });
        let agent = agent(thinker);
        agent.execute(&Task::new("T1", "Plan the rollout")).await;

        let notice = agent.on_maintenance().await.unwrap().unwrap();
        assert_eq!(notice.kind, "strategy.cache");
        assert_eq!(notice.payload["entries"], 1);
        assert!(agent.maintenance_interval().is_some());
    }
}
