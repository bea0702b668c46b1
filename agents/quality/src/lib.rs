//! Quality-review specialist.

use async_trait::async_trait;
use tracing::info;

use mantle_shared::{
    Agent, AgentContext, AgentDescriptor, AgentStatus, Bid, Notice, StatusCell, Task, TaskResult,
};

pub const AGENT_ID: &str = "specialist.quality";

const KEYWORDS: &[&str] = &["quality", "verify", "validate", "audit", "inspect"];

/// Checklist dimensions a review always walks, with the phrases that raise
/// their severity from "pass" to "attention".
const CHECKLIST: &[(&str, &[&str])] = &[
    ("correctness", &["critical", "bug", "failure"]),
    ("completeness", &["partial", "missing", "skipped"]),
    ("consistency", &["conflict", "divergent", "mismatch"]),
    ("operability", &["timeout", "retry", "degraded"]),
];

pub struct QualityReviewAgent {
    ctx: AgentContext,
    status: StatusCell,
}

impl QualityReviewAgent {
    #[must_use]
    pub fn new(ctx: AgentContext) -> Self {
        Self {
            ctx,
            status: StatusCell::new(),
        }
    }

    fn review(description: &str) -> Vec<serde_json::Value> {
        let lowered = description.to_lowercase();
        CHECKLIST
            .iter()
            .map(|(dimension, triggers)| {
                let attention = triggers.iter().any(|t| lowered.contains(t));
                serde_json::json!({
                    "dimension": dimension,
                    "verdict": if attention { "attention" } else { "pass" },
                })
            })
            .collect()
    }
}

#[async_trait]
impl Agent for QualityReviewAgent {
    fn descriptor(&self) -> AgentDescriptor {
        AgentDescriptor {
            id: AGENT_ID.to_string(),
            capability: "quality_review".to_string(),
            description: "Walks a fixed review checklist over a mission and buckets verdicts."
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
            capability: "quality_review".to_string(),
            confidence: 0.8,
            estimated_cost: 2.5,
            action_plan: Some("walk the review checklist, bucket verdicts by dimension".to_string()),
        })
    }

    async fn execute(&self, task: &Task) -> TaskResult {
        self.status.set(AgentStatus::Busy).await;
        info!(task_id = %task.id, "⚡ quality review activated");

        let checklist = Self::review(&task.description);
        let flagged = checklist
            .iter()
            .filter(|c| c["verdict"] == "attention")
            .count();

        self.ctx.notices.emit(Notice::new(
            "quality.review",
            serde_json::json!({ "task_id": task.id, "flagged": flagged }),
            AGENT_ID,
        ));

        self.status.set(AgentStatus::Idle).await;
        TaskResult::success(
            &task.id,
            AGENT_ID,
            serde_json::json!({
                "summary": format!(
                    "Review complete: {flagged} of {} dimension(s) need attention.",
                    checklist.len()
                ),
                "checklist": checklist,
            }),
        )
    }

    async fn status(&self) -> AgentStatus {
        self.status.get().await
    }
}
