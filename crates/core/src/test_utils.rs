//! Scripted agents and collaborators for unit and integration tests.

use std::sync::Arc;

use async_trait::async_trait;

use mantle_shared::{
    Agent, AgentDescriptor, AgentStatus, Bid, StatusCell, Task, TaskResult, ThinkingEngine,
};

/// Agent that bids a fixed confidence/cost whenever the task description
/// contains `keyword` (`"*"` bids on everything) and echoes the task back.
pub struct ScriptedAgent {
    id: String,
    keyword: String,
    confidence: f64,
    cost: f64,
    fail: bool,
    status: StatusCell,
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn descriptor(&self) -> AgentDescriptor {
        AgentDescriptor {
            id: self.id.clone(),
            capability: format!("scripted:{}", self.keyword),
            description: "scripted test agent".to_string(),
        }
    }

    async fn propose(&self, task: &Task) -> Option<Bid> {
        if self.keyword != "*" && !task.description.to_lowercase().contains(&self.keyword) {
            return None;
        }
        Some(Bid {
            agent_id: self.id.clone(),
            capability: format!("scripted:{}", self.keyword),
            confidence: self.confidence,
            estimated_cost: self.cost,
            action_plan: None,
        })
    }

    async fn execute(&self, task: &Task) -> TaskResult {
        self.status.set(AgentStatus::Busy).await;
        let result = if self.fail {
            self.status.set(AgentStatus::Error).await;
            TaskResult::failure(&task.id, &self.id, "scripted failure")
        } else {
            self.status.set(AgentStatus::Idle).await;
            TaskResult::success(
                &task.id,
                &self.id,
                serde_json::json!({ "summary": format!("{} handled '{}'", self.id, task.description) }),
            )
        };
        result
    }

    async fn status(&self) -> AgentStatus {
        self.status.get().await
    }
}

pub fn scripted_agent(id: &str, keyword: &str, confidence: f64, cost: f64) -> Arc<dyn Agent> {
    Arc::new(ScriptedAgent {
        id: id.to_string(),
        keyword: keyword.to_string(),
        confidence,
        cost,
        fail: false,
        status: StatusCell::new(),
    })
}

pub fn failing_agent(id: &str, keyword: &str, confidence: f64, cost: f64) -> Arc<dyn Agent> {
    Arc::new(ScriptedAgent {
        id: id.to_string(),
        keyword: keyword.to_string(),
        confidence,
        cost,
        fail: true,
        status: StatusCell::new(),
    })
}

/// Agent that claims everything with full confidence and then panics —
/// exercises the dispatch containment path.
pub struct PanickingAgent {
    id: String,
    status: StatusCell,
}

#[async_trait]
impl Agent for PanickingAgent {
    fn descriptor(&self) -> AgentDescriptor {
        AgentDescriptor {
            id: self.id.clone(),
            capability: "panic".to_string(),
            description: "panicking test agent".to_string(),
        }
    }

    async fn propose(&self, _task: &Task) -> Option<Bid> {
        Some(Bid {
            agent_id: self.id.clone(),
            capability: "panic".to_string(),
            confidence: 1.0,
            estimated_cost: 0.0,
            action_plan: None,
        })
    }

    async fn execute(&self, _task: &Task) -> TaskResult {
        panic!("scripted panic");
    }

    async fn status(&self) -> AgentStatus {
        self.status.get().await
    }
}

pub fn panicking_agent(id: &str) -> Arc<dyn Agent> {
    Arc::new(PanickingAgent {
        id: id.to_string(),
        status: StatusCell::new(),
    })
}

/// Thinking collaborator that replays a fixed decomposition.
pub struct ScriptedThinker {
    pub response: String,
}

#[async_trait]
impl ThinkingEngine for ScriptedThinker {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn think(&self, _goal: &str, _shape: &str) -> anyhow::Result<String> {
        Ok(self.response.clone())
    }
}

/// Thinking collaborator that always fails — the decomposition-error path.
pub struct BrokenThinker;

#[async_trait]
impl ThinkingEngine for BrokenThinker {
    fn name(&self) -> &str {
        "broken"
    }

    async fn think(&self, _goal: &str, _shape: &str) -> anyhow::Result<String> {
        anyhow::bail!("thinking collaborator offline")
    }
}
