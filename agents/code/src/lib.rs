//! Source-code analysis specialist.

use async_trait::async_trait;
use tracing::info;

use mantle_shared::{
    Agent, AgentContext, AgentDescriptor, AgentStatus, Bid, StatusCell, Task, TaskResult,
};

pub const AGENT_ID: &str = "specialist.code";

const KEYWORDS: &[&str] = &["code", "analyze", "implement", "refactor", "diff"];

/// Concern markers the analysis scans a mission description for. Each entry
/// is (marker, finding template).
const CONCERNS: &[(&str, &str)] = &[
    ("async", "concurrency boundaries need a blocking-call audit"),
    ("cache", "cache eviction paths need coverage for the empty-store case"),
    ("error", "error taxonomy should be converted at module boundaries"),
    ("api", "public surface needs semver review before release"),
    ("test", "test fixtures should avoid shared mutable state"),
];

pub struct CodeAnalysisAgent {
    ctx: AgentContext,
    status: StatusCell,
}

impl CodeAnalysisAgent {
    #[must_use]
    pub fn new(ctx: AgentContext) -> Self {
        Self {
            ctx,
            status: StatusCell::new(),
        }
    }

    fn findings_for(description: &str) -> Vec<String> {
        let lowered = description.to_lowercase();
        CONCERNS
            .iter()
            .filter(|(marker, _)| lowered.contains(marker))
            .map(|(marker, finding)| format!("[{marker}] {finding}"))
            .collect()
    }
}

#[async_trait]
impl Agent for CodeAnalysisAgent {
    fn descriptor(&self) -> AgentDescriptor {
        AgentDescriptor {
            id: AGENT_ID.to_string(),
            capability: "code_analysis".to_string(),
            description: "Analyzes source-code missions and reports findings and refactoring opportunities.".to_string(),
        }
    }

    async fn propose(&self, task: &Task) -> Option<Bid> {
        let description = task.description.to_lowercase();
        if !KEYWORDS.iter().any(|k| description.contains(k)) {
            return None;
        }
        Some(Bid {
            agent_id: AGENT_ID.to_string(),
            capability: "code_analysis".to_string(),
            confidence: 0.85,
            estimated_cost: 2.0,
            action_plan: Some("scan the described surface, bucket findings by concern".to_string()),
        })
    }

    async fn execute(&self, task: &Task) -> TaskResult {
        self.status.set(AgentStatus::Busy).await;
        info!(task_id = %task.id, "⚡ code analysis activated");

        let findings = Self::findings_for(&task.description);
        let summary = if findings.is_empty() {
            "Analysis complete: no flagged concerns; surface looks conventional.".to_string()
        } else {
            format!(
                "Analysis complete: {} concern(s) flagged across the described surface.",
                findings.len()
            )
        };

        self.ctx.notices.emit(mantle_shared::Notice::new(
            "code.analysis",
            serde_json::json!({ "task_id": task.id, "findings": findings.len() }),
            AGENT_ID,
        ));

        self.status.set(AgentStatus::Idle).await;
        TaskResult::success(
            &task.id,
            AGENT_ID,
            serde_json::json!({
                "summary": summary,
                "findings": findings,
            }),
        )
    }

    async fn status(&self) -> AgentStatus {
        self.status.get().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> CodeAnalysisAgent {
        let (tx, _) = tokio::sync::broadcast::channel(16);
        CodeAnalysisAgent::new(AgentContext {
            notices: mantle_shared::NoticeSender::new(tx),
        })
    }

    #[tokio::test]
    async fn bids_on_code_missions() {
        let bid = agent()
            .propose(&Task::new("T2", "Analyze the code of the chosen framework"))
            .await
            .unwrap();
        assert_eq!(bid.confidence, 0.85);
        assert_eq!(bid.estimated_cost, 2.0);
    }

    #[tokio::test]
    async fn declines_unrelated_missions() {
        assert!(agent()
            .propose(&Task::new("T1", "Book a flight to Lisbon"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn execution_reports_flagged_concerns() {
        let agent = agent();
        let task = Task::new("T2", "Analyze the async cache code before the API freeze");
        let result = agent.execute(&task).await;
        assert!(result.succeeded);
        let findings = result.payload["findings"].as_array().unwrap();
        assert!(findings.len() >= 3);
        assert_eq!(agent.status().await, AgentStatus::Idle);
    }
}
