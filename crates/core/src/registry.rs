//! Agent pool: broadcast and dispatch.
//!
//! The registry is built once during startup registration and shared
//! immutably afterwards, so lookups need no locking. Registration order is
//! preserved — it is the final tie-break of the coordinator's selection
//! rule, which makes insertion order part of the routing contract.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use tracing::{debug, error};

use mantle_shared::{Agent, Bid, MantleError, MantleResult, Task, TaskResult};

#[derive(Default)]
pub struct AgentRegistry {
    agents: Vec<Arc<dyn Agent>>,
    index: HashMap<String, usize>,
}

impl AgentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent. Ids must be unique; a duplicate is a wiring bug.
    pub fn register(&mut self, agent: Arc<dyn Agent>) -> anyhow::Result<()> {
        let id = agent.descriptor().id;
        if self.index.contains_key(&id) {
            anyhow::bail!("Agent '{}' is already registered", id);
        }
        self.index.insert(id.clone(), self.agents.len());
        self.agents.push(agent);
        debug!(agent_id = %id, "📦 agent registered");
        Ok(())
    }

    #[must_use]
    pub fn get(&self, agent_id: &str) -> Option<Arc<dyn Agent>> {
        self.index.get(agent_id).map(|&i| self.agents[i].clone())
    }

    #[must_use]
    pub fn agents(&self) -> &[Arc<dyn Agent>] {
        &self.agents
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Ask every registered agent for a bid. Proposals run concurrently, but
    /// the returned list keeps registration order; declining agents are
    /// silently absent.
    pub async fn broadcast(&self, task: &Task) -> Vec<Bid> {
        let proposals = join_all(self.agents.iter().map(|agent| agent.propose(task))).await;
        proposals.into_iter().flatten().collect()
    }

    /// Execute `task` on the agent with `agent_id`.
    ///
    /// An unknown id is the routing-failure signal (`AgentNotFound`) —
    /// distinct from an agent-internal failure, which comes back as an
    /// ordinary `TaskResult` with `succeeded = false`. A panicking agent is
    /// contained the same way instead of tearing down the caller.
    pub async fn dispatch(&self, agent_id: &str, task: &Task) -> MantleResult<TaskResult> {
        let Some(agent) = self.get(agent_id) else {
            error!(agent_id = %agent_id, task_id = %task.id, "🚫 dispatch to unknown agent");
            return Err(MantleError::AgentNotFound(agent_id.to_string()));
        };

        match std::panic::AssertUnwindSafe(agent.execute(task))
            .catch_unwind()
            .await
        {
            Ok(result) => Ok(result),
            Err(_) => {
                error!(agent_id = %agent_id, task_id = %task.id, "🔥 agent panicked during execute");
                Ok(TaskResult::failure(
                    &task.id,
                    agent_id,
                    "agent panicked during execute",
                ))
            }
        }
    }
}
