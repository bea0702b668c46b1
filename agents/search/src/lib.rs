//! Web-search specialist.
//!
//! The only agent that talks to an external collaborator during `execute`:
//! results are memoized in the agent's own TTL+LRU cache, and provider
//! calls run through the retry executor so a flaky or slow endpoint
//! degrades into an ordinary failed result instead of a stalled plan.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use mantle_shared::cache::TtlLruCache;
use mantle_shared::retry::RetryExecutor;
use mantle_shared::{
    Agent, AgentContext, AgentDescriptor, AgentStatus, Bid, Notice, SearchHit, SearchOptions,
    SearchProvider, StatusCell, Task, TaskResult,
};

pub const AGENT_ID: &str = "specialist.search";

const KEYWORDS: &[&str] = &["research", "search", "find", "look up", "what is", "who was"];
const STRIP_WORDS: &[&str] = &[
    "research",
    "search for",
    "search",
    "find",
    "look up",
    "information about",
    "on the web",
    "about",
];

pub struct WebSearchAgent {
    ctx: AgentContext,
    provider: Arc<dyn SearchProvider>,
    options: SearchOptions,
    cache: TtlLruCache<Vec<SearchHit>>,
    retry: RetryExecutor,
    status: StatusCell,
    searches_served: AtomicU64,
}

impl WebSearchAgent {
    pub fn new(
        ctx: AgentContext,
        provider: Arc<dyn SearchProvider>,
        options: SearchOptions,
        cache_max_entries: usize,
        cache_ttl: Duration,
        retry: RetryExecutor,
    ) -> Self {
        Self {
            ctx,
            provider,
            options,
            cache: TtlLruCache::new(cache_max_entries, cache_ttl),
            retry,
            status: StatusCell::new(),
            searches_served: AtomicU64::new(0),
        }
    }

    /// Extract and clean the search term from the task description.
    fn extract_query(description: &str) -> String {
        let mut query = description.to_lowercase();
        for word in STRIP_WORDS {
            query = query.replace(word, " ");
        }
        query
            .trim_matches(|c: char| c.is_whitespace() || ".,:;!?'\"".contains(c))
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn format_hits(hits: &[SearchHit]) -> String {
        if hits.is_empty() {
            return "Search complete: no results found.".to_string();
        }
        let mut lines = vec![format!("Search complete. {} top result(s):", hits.len())];
        for (i, hit) in hits.iter().enumerate() {
            lines.push(format!("{}. {}", i + 1, hit.title));
            lines.push(format!("   {}", hit.url));
            if !hit.snippet.is_empty() {
                let snippet: String = if hit.snippet.chars().count() > 200 {
                    let cut: String = hit.snippet.chars().take(200).collect();
                    format!("{cut}...")
                } else {
                    hit.snippet.clone()
                };
                lines.push(format!("   {snippet}"));
            }
        }
        lines.join("\n")
    }

    fn success_payload(
        query: &str,
        hits: &[SearchHit],
        cached: bool,
        elapsed_ms: u128,
    ) -> serde_json::Value {
        serde_json::json!({
            "query": query,
            "cached": cached,
            "hit_count": hits.len(),
            "elapsed_ms": elapsed_ms as u64,
            "report": Self::format_hits(hits),
        })
    }
}

#[async_trait]
impl Agent for WebSearchAgent {
    fn descriptor(&self) -> AgentDescriptor {
        AgentDescriptor {
            id: AGENT_ID.to_string(),
            capability: "web_search".to_string(),
            description: "Searches the web for a cleaned query and reports the top hits."
                .to_string(),
        }
    }

    async fn propose(&self, task: &Task) -> Option<Bid> {
        let description = task.description.to_lowercase();
        if !KEYWORDS.iter().any(|k| description.contains(k)) {
            return None;
        }
        let query = Self::extract_query(&task.description);
        if query.is_empty() {
            // A search-flavored mission without a usable term is declined.
            return None;
        }

        Some(Bid {
            agent_id: AGENT_ID.to_string(),
            capability: "web_search".to_string(),
            confidence: 0.9,
            estimated_cost: 1.0,
            action_plan: Some(format!(
                "extract query '{query}', consult cache, search provider, format top {} hits",
                self.options.max_results
            )),
        })
    }

    async fn execute(&self, task: &Task) -> TaskResult {
        self.status.set(AgentStatus::Busy).await;

        let query = Self::extract_query(&task.description);
        if query.is_empty() {
            self.status.set(AgentStatus::Error).await;
            return TaskResult::failure(&task.id, AGENT_ID, "no usable search term in task");
        }

        info!(task_id = %task.id, query = %query, "⚡ search agent activated");

        // 1. Cache first: a fresh hit bypasses the retry executor and the
        //    provider entirely.
        if let Some(hits) = self.cache.get(&query) {
            info!(query = %query, "💾 served from cache");
            self.searches_served.fetch_add(1, Ordering::Relaxed);
            self.ctx.notices.emit(Notice::new(
                "search.cache_hit",
                serde_json::json!({ "query": query }),
                AGENT_ID,
            ));
            self.status.set(AgentStatus::Idle).await;
            return TaskResult::success(
                &task.id,
                AGENT_ID,
                Self::success_payload(&query, &hits, true, 0),
            );
        }

        // 2. External call, bounded and retried off the async runtime.
        let provider = self.provider.clone();
        let options = self.options.clone();
        let call_query = query.clone();
        let outcome = self
            .retry
            .run("web_search", move || {
                provider.search(&call_query, &options)
            })
            .await;

        let Some(ref hits) = outcome.result else {
            self.ctx.notices.emit(Notice::new(
                "search.exhausted",
                serde_json::json!({
                    "query": query,
                    "attempts": outcome.attempts,
                    "elapsed_ms": outcome.elapsed_ms() as u64,
                }),
                AGENT_ID,
            ));
            self.status.set(AgentStatus::Error).await;
            return TaskResult::failure(
                &task.id,
                AGENT_ID,
                format!(
                    "search provider exhausted {} attempt(s) for '{query}'",
                    outcome.attempts
                ),
            );
        };

        info!(
            query = %query,
            hits = hits.len(),
            elapsed_ms = outcome.elapsed_ms() as u64,
            "🌐 web search completed"
        );
        self.cache.set(query.clone(), hits.clone());
        self.searches_served.fetch_add(1, Ordering::Relaxed);

        self.status.set(AgentStatus::Idle).await;
        TaskResult::success(
            &task.id,
            AGENT_ID,
            Self::success_payload(&query, hits, false, outcome.elapsed_ms()),
        )
    }

    async fn status(&self) -> AgentStatus {
        self.status.get().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct MockProvider {
        calls: AtomicU32,
        fail_first: u32,
    }

    impl MockProvider {
        fn new(fail_first: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_first,
            }
        }
    }

    impl SearchProvider for MockProvider {
        fn search(
            &self,
            query: &str,
            _options: &SearchOptions,
        ) -> anyhow::Result<Vec<SearchHit>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_first {
                anyhow::bail!("provider unavailable (call #{call})")
            }
            Ok(vec![SearchHit {
                title: format!("Result for {query}"),
                url: "https://example.org/hit".to_string(),
                snippet: "snippet".to_string(),
            }])
        }
    }

    fn agent_with(provider: Arc<MockProvider>) -> WebSearchAgent {
        let (tx, _) = tokio::sync::broadcast::channel(16);
        WebSearchAgent::new(
            AgentContext {
                notices: mantle_shared::NoticeSender::new(tx),
            },
            provider,
            SearchOptions::default(),
            16,
            Duration::from_secs(60),
            RetryExecutor::new(3, Duration::from_millis(5), Duration::from_secs(1)),
        )
    }

    #[tokio::test]
    async fn proposes_on_search_missions_only() {
        let agent = agent_with(Arc::new(MockProvider::new(0)));
        let relevant = Task::new("T1", "Research open-source autonomy frameworks");
        let bid = agent.propose(&relevant).await.unwrap();
        assert_eq!(bid.confidence, 0.9);
        assert_eq!(bid.agent_id, AGENT_ID);

        let irrelevant = Task::new("T2", "Refactor the billing module");
        assert!(agent.propose(&irrelevant).await.is_none());
    }

    #[test]
    fn query_extraction_strips_verbs_and_noise() {
        let query = WebSearchAgent::extract_query("Search for information about rust async runtimes.");
        assert_eq!(query, "rust async runtimes");
    }

    #[tokio::test]
    async fn second_execution_is_served_from_cache() {
        let provider = Arc::new(MockProvider::new(0));
        let agent = agent_with(provider.clone());
        let task = Task::new("T1", "Search for rust orchestration crates");

        let first = agent.execute(&task).await;
        assert!(first.succeeded);
        assert_eq!(first.payload["cached"], false);

        let second = agent.execute(&task).await;
        assert!(second.succeeded);
        assert_eq!(second.payload["cached"], true);
        // The provider (and therefore the retry executor) ran exactly once.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_provider_failures_are_retried() {
        let provider = Arc::new(MockProvider::new(2));
        let agent = agent_with(provider.clone());
        let task = Task::new("T1", "Search for resilient providers");

        let result = agent.execute(&task).await;
        assert!(result.succeeded);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(agent.status().await, AgentStatus::Idle);
    }

    #[tokio::test]
    async fn exhaustion_becomes_a_failed_result_not_a_fault() {
        let provider = Arc::new(MockProvider::new(99));
        let agent = agent_with(provider.clone());
        let task = Task::new("T1", "Search for a dead endpoint");

        let result = agent.execute(&task).await;
        assert!(!result.succeeded);
        assert!(result.payload["error"]
            .as_str()
            .unwrap()
            .contains("exhausted"));
        assert_eq!(agent.status().await, AgentStatus::Error);

        // Error state is recoverable: the next dispatch runs normally.
        provider.calls.store(0, Ordering::SeqCst);
        let retry = agent.execute(&Task::new("T2", "Search for a dead endpoint")).await;
        assert!(!retry.succeeded);
    }

    #[tokio::test]
    async fn search_mission_without_a_term_is_declined() {
        let agent = agent_with(Arc::new(MockProvider::new(0)));
        let task = Task::new("T1", "search");
        assert!(agent.propose(&task).await.is_none());
    }
}
