use anyhow::Context;
use std::env;
use std::time::Duration;

use crate::coordinator::NoBidPolicy;

/// Which thinking collaborator decomposes goals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkerMode {
    Heuristic,
    Llm,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub no_bid_policy: NoBidPolicy,
    pub cache_max_entries: usize,
    pub cache_ttl: Duration,
    pub search_max_attempts: u32,
    pub search_backoff: Duration,
    pub search_attempt_timeout: Duration,
    /// Empty = use the offline static provider.
    pub search_endpoint: String,
    pub search_locale: String,
    pub search_max_results: usize,
    pub search_safe: String,
    pub thinker_mode: ThinkerMode,
    pub llm_api_url: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub heartbeat_interval: Duration,
    pub notice_history_size: usize,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_ranged<T>(key: &str, default: &str, min: T, max: T) -> anyhow::Result<T>
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display + Copy,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env_or(key, default)
        .parse::<T>()
        .with_context(|| format!("Failed to parse {key}"))?;
    if value < min || value > max {
        anyhow::bail!("{key} must be between {min} and {max} (got {value})");
    }
    Ok(value)
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let no_bid_policy = env_or("MANTLE_NO_BID_POLICY", "skip")
            .parse::<NoBidPolicy>()
            .map_err(|e| anyhow::anyhow!("Invalid MANTLE_NO_BID_POLICY: {e}"))?;

        let cache_max_entries =
            parse_ranged::<usize>("MANTLE_CACHE_MAX_ENTRIES", "100", 1, 100_000)?;
        let cache_ttl_secs = parse_ranged::<u64>("MANTLE_CACHE_TTL_SECS", "3600", 1, 86_400)?;
        let search_max_attempts = parse_ranged::<u32>("MANTLE_SEARCH_MAX_ATTEMPTS", "3", 1, 10)?;
        let search_backoff_ms = parse_ranged::<u64>("MANTLE_SEARCH_BACKOFF_MS", "250", 10, 60_000)?;
        let search_timeout_secs = parse_ranged::<u64>("MANTLE_SEARCH_TIMEOUT_SECS", "10", 1, 300)?;
        let search_max_results = parse_ranged::<usize>("MANTLE_SEARCH_MAX_RESULTS", "3", 1, 25)?;
        let heartbeat_secs = parse_ranged::<u64>("MANTLE_HEARTBEAT_INTERVAL_SECS", "30", 5, 3_600)?;
        let notice_history_size =
            parse_ranged::<usize>("MANTLE_NOTICE_HISTORY_SIZE", "1000", 10, 100_000)?;

        let search_safe = env_or("MANTLE_SEARCH_SAFE", "moderate");
        if !matches!(search_safe.as_str(), "off" | "moderate" | "strict") {
            anyhow::bail!(
                "MANTLE_SEARCH_SAFE must be one of off/moderate/strict (got {search_safe})"
            );
        }

        let thinker_mode = match env_or("MANTLE_THINKER", "heuristic").as_str() {
            "heuristic" => ThinkerMode::Heuristic,
            "llm" => ThinkerMode::Llm,
            other => anyhow::bail!("MANTLE_THINKER must be 'heuristic' or 'llm' (got {other})"),
        };

        let llm_api_url = env::var("MANTLE_LLM_API_URL").ok();
        let llm_api_key = env::var("MANTLE_LLM_API_KEY").ok();
        if thinker_mode == ThinkerMode::Llm && (llm_api_url.is_none() || llm_api_key.is_none()) {
            anyhow::bail!(
                "MANTLE_THINKER=llm requires MANTLE_LLM_API_URL and MANTLE_LLM_API_KEY to be set"
            );
        }

        Ok(Self {
            no_bid_policy,
            cache_max_entries,
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            search_max_attempts,
            search_backoff: Duration::from_millis(search_backoff_ms),
            search_attempt_timeout: Duration::from_secs(search_timeout_secs),
            search_endpoint: env_or("MANTLE_SEARCH_ENDPOINT", ""),
            search_locale: env_or("MANTLE_SEARCH_LOCALE", "en-us"),
            search_max_results,
            search_safe,
            thinker_mode,
            llm_api_url,
            llm_api_key,
            llm_model: env_or("MANTLE_LLM_MODEL", "deepseek-chat"),
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
            notice_history_size,
        })
    }
}
