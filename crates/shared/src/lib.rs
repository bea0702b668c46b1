use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub mod cache;
pub mod retry;

/// SDK version constant for consistent version reporting across all agents.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Unique identifier within the Mantle platform (goals, traces, notices).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MantleId(Uuid);

impl std::fmt::Display for MantleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Default generates a random UUID v4, suitable for trace ids and other
/// ephemeral identifiers. For deterministic ids, use `MantleId::from_name()`.
impl Default for MantleId {
    fn default() -> Self {
        Self::new()
    }
}

impl MantleId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let namespace = Uuid::NAMESPACE_DNS;
        Self(Uuid::new_v5(&namespace, name.as_bytes()))
    }
}

// ============================================================
// Errors
// ============================================================

#[derive(Debug, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail")]
pub enum MantleError {
    #[error("Decomposition failed: {0}")]
    Decomposition(String),
    #[error("Agent not found: {0}")]
    AgentNotFound(String),
    #[error("Timeout occurred: {0}")]
    Timeout(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type MantleResult<T> = std::result::Result<T, MantleError>;

// ============================================================
// Mission data model
// ============================================================

/// One decomposed, orderable step of a goal. Immutable once created;
/// identity is `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    /// Task ids that must be completed before this one is dispatched.
    /// Left empty by the sequential coordinator; the hook for a
    /// DAG-respecting scheduler.
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
}

impl Task {
    #[must_use]
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            dependencies: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = String>) -> Self {
        self.dependencies = deps.into_iter().collect();
        self
    }
}

/// An agent's self-reported readiness for a task. Ephemeral: created per
/// broadcast round and consumed immediately by the coordinator's selection
/// step, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub agent_id: String,
    pub capability: String,
    /// Self-assessed confidence in [0, 1].
    pub confidence: f64,
    pub estimated_cost: f64,
    /// One-line internal plan of action, for the coordinator's logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_plan: Option<String>,
}

/// Outcome of one executed task. Created once, immutable, aggregated by the
/// coordinator into the final synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub agent_id: String,
    pub succeeded: bool,
    pub payload: serde_json::Value,
}

impl TaskResult {
    #[must_use]
    pub fn success(
        task_id: impl Into<String>,
        agent_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            agent_id: agent_id.into(),
            succeeded: true,
            payload,
        }
    }

    /// A failed result. The diagnostic ends up under an `"error"` key so the
    /// synthesis step can render it without guessing at the payload shape.
    #[must_use]
    pub fn failure(
        task_id: impl Into<String>,
        agent_id: impl Into<String>,
        diagnostic: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            agent_id: agent_id.into(),
            succeeded: false,
            payload: serde_json::json!({ "error": diagnostic.into() }),
        }
    }
}

// ============================================================
// Agent contract
// ============================================================

/// Per-instance lifecycle: `Idle → Busy → (Idle | Error) → Idle`.
/// `Error` is recoverable; the agent is eligible again on the next dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    Idle,
    Busy,
    Error,
}

impl Default for AgentStatus {
    fn default() -> Self {
        AgentStatus::Idle
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Busy => write!(f, "busy"),
            AgentStatus::Error => write!(f, "error"),
        }
    }
}

/// Static self-description returned by every agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub id: String,
    pub capability: String,
    pub description: String,
}

/// Shared cell for an agent's status; the agent is the only writer.
#[derive(Clone, Default)]
pub struct StatusCell {
    inner: Arc<tokio::sync::RwLock<AgentStatus>>,
}

impl StatusCell {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, status: AgentStatus) {
        *self.inner.write().await = status;
    }

    pub async fn get(&self) -> AgentStatus {
        *self.inner.read().await
    }
}

/// The capability unit the coordinator dispatches to.
///
/// `propose` is a pure-ish self-assessment: it must not mutate shared state,
/// though it may read the agent's own metrics. `execute` performs the unit of
/// work and must never let an internal failure escape — failures come back as
/// a `TaskResult` with `succeeded = false` and a diagnostic payload.
#[async_trait]
pub trait Agent: Send + Sync {
    fn descriptor(&self) -> AgentDescriptor;

    /// Self-assess the task. `None` means "not my specialty" and is a normal,
    /// silent outcome, not an error.
    async fn propose(&self, task: &Task) -> Option<Bid>;

    /// Execute the task. Must update the agent's own status around the call
    /// and convert every internal fault into `succeeded = false`.
    async fn execute(&self, task: &Task) -> TaskResult;

    async fn status(&self) -> AgentStatus;

    /// Interval for the agent's cooperative background maintenance loop.
    /// `None` (the default) means the kernel spawns no loop for this agent.
    fn maintenance_interval(&self) -> Option<Duration> {
        None
    }

    /// One maintenance tick. Results flow back only through the returned
    /// notice, never by reaching into another component.
    async fn on_maintenance(&self) -> anyhow::Result<Option<Notice>> {
        Ok(None)
    }
}

// ============================================================
// External collaborators
// ============================================================

/// Thinking/decomposition collaborator: takes a free-text goal plus a
/// desired output shape and returns free text the caller must be resilient
/// to. Malformed output degrades to a decomposition error, never a crash.
#[async_trait]
pub trait ThinkingEngine: Send + Sync {
    fn name(&self) -> &str;
    async fn think(&self, goal: &str, shape: &str) -> anyhow::Result<String>;
}

/// One record from the external search collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    pub locale: String,
    pub max_results: usize,
    pub safesearch: String,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            locale: "en-us".to_string(),
            max_results: 3,
            safesearch: "moderate".to_string(),
        }
    }
}

/// External search collaborator. Blocking by contract: callers run it off
/// the async runtime (the search agent routes it through the RetryExecutor,
/// which moves every attempt onto a blocking thread).
pub trait SearchProvider: Send + Sync {
    fn search(&self, query: &str, options: &SearchOptions) -> anyhow::Result<Vec<SearchHit>>;
}

// ============================================================
// Notices (observability sink)
// ============================================================

/// Structured observability record. Delivery is fire-and-forget,
/// at-most-once; a missing subscriber never blocks the emitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub kind: String,
    pub payload: serde_json::Value,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl Notice {
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        payload: serde_json::Value,
        source: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            payload,
            source: source.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Cloneable handle agents use to emit notices.
#[derive(Clone)]
pub struct NoticeSender {
    tx: tokio::sync::broadcast::Sender<Arc<Notice>>,
}

impl NoticeSender {
    #[must_use]
    pub fn new(tx: tokio::sync::broadcast::Sender<Arc<Notice>>) -> Self {
        Self { tx }
    }

    /// Emit a notice. A send error only means nobody is listening right now,
    /// which is a normal condition for a fire-and-forget sink.
    pub fn emit(&self, notice: Notice) {
        let _ = self.tx.send(Arc::new(notice));
    }
}

/// Runtime environment handed to an agent at construction time.
#[derive(Clone)]
pub struct AgentContext {
    pub notices: NoticeSender,
}
