pub mod capabilities;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod maintenance;
pub mod notices;
pub mod registry;
pub mod test_utils;
pub mod thinking;

use std::sync::Arc;

use tokio::sync::Notify;
use tracing::info;

use mantle_shared::retry::RetryExecutor;
use mantle_shared::{
    AgentContext, MantleResult, SearchOptions, SearchProvider, ThinkingEngine,
};

use crate::capabilities::{HttpSearchProvider, StaticSearchProvider};
use crate::config::{AppConfig, ThinkerMode};
use crate::coordinator::{Coordinator, CoordinatorConfig, GoalReport};
use crate::notices::NoticeBus;
use crate::registry::AgentRegistry;
use crate::thinking::{HeuristicThinker, LlmThinker};

/// A fully wired kernel: registry, coordinator, notice bus, and the shutdown
/// handle its background loops listen on.
pub struct MantleSystem {
    pub registry: Arc<AgentRegistry>,
    pub coordinator: Coordinator,
    pub notices: Arc<NoticeBus>,
    pub shutdown: Arc<Notify>,
}

impl MantleSystem {
    pub async fn process_goal(&self, goal: &str) -> MantleResult<GoalReport> {
        self.coordinator.process_goal(goal).await
    }

    /// Stop every background loop. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

/// Build and wire the whole system: collaborators, agents (explicit startup
/// registration — registration order is the selection tie-break), notice
/// plumbing, and background loops. Must run inside a tokio runtime.
pub fn bootstrap(config: &AppConfig) -> anyhow::Result<MantleSystem> {
    info!("+---------------------------------------+");
    info!("|          Mantle System Kernel         |");
    info!(
        "|             Version {:<10}        |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+---------------------------------------+");

    let shutdown = Arc::new(Notify::new());
    let notices = NoticeBus::new(config.notice_history_size);
    notices.spawn_recorder(shutdown.clone());

    let thinker: Arc<dyn ThinkingEngine> = match config.thinker_mode {
        ThinkerMode::Heuristic => Arc::new(HeuristicThinker),
        ThinkerMode::Llm => {
            let api_url = config
                .llm_api_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("MANTLE_LLM_API_URL is required for llm mode"))?;
            let api_key = config
                .llm_api_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("MANTLE_LLM_API_KEY is required for llm mode"))?;
            Arc::new(LlmThinker::new(api_url, api_key, config.llm_model.clone())?)
        }
    };
    info!(thinker = thinker.name(), "🧠 thinking collaborator ready");

    let provider: Arc<dyn SearchProvider> = if config.search_endpoint.is_empty() {
        info!("🔍 search provider: offline static corpus");
        Arc::new(StaticSearchProvider)
    } else {
        info!(endpoint = %config.search_endpoint, "🔍 search provider: http");
        Arc::new(HttpSearchProvider::new(config.search_endpoint.clone(), vec![])?)
    };

    let search_options = SearchOptions {
        locale: config.search_locale.clone(),
        max_results: config.search_max_results,
        safesearch: config.search_safe.clone(),
    };
    let retry = RetryExecutor::new(
        config.search_max_attempts,
        config.search_backoff,
        config.search_attempt_timeout,
    );

    let ctx = AgentContext {
        notices: notices.sender(),
    };

    let mut registry = AgentRegistry::new();
    registry.register(Arc::new(agent_search::WebSearchAgent::new(
        ctx.clone(),
        provider,
        search_options,
        config.cache_max_entries,
        config.cache_ttl,
        retry,
    )))?;
    registry.register(Arc::new(agent_code::CodeAnalysisAgent::new(ctx.clone())))?;
    registry.register(Arc::new(agent_strategy::StrategyAgent::new(
        ctx.clone(),
        thinker.clone(),
        config.cache_max_entries,
        config.cache_ttl,
        config.heartbeat_interval,
    )))?;
    registry.register(Arc::new(agent_quality::QualityReviewAgent::new(ctx)))?;
    info!(agents = registry.len(), "✅ agent pool registered");

    let registry = Arc::new(registry);
    maintenance::spawn_heartbeat_task(
        registry.clone(),
        config.heartbeat_interval,
        notices.sender(),
        shutdown.clone(),
    );
    let loops =
        maintenance::spawn_maintenance_loops(&registry, notices.sender(), shutdown.clone());
    info!(loops = loops, "🔄 maintenance loops spawned");

    let coordinator = Coordinator::new(
        registry.clone(),
        thinker,
        notices.sender(),
        CoordinatorConfig {
            no_bid_policy: config.no_bid_policy,
        },
    );

    Ok(MantleSystem {
        registry,
        coordinator,
        notices,
        shutdown,
    })
}
