//! External search collaborator implementations.
//!
//! Both implement the blocking `SearchProvider` contract: the search agent
//! runs them through the retry executor, which moves every call onto a
//! blocking thread, so neither may assume an async context.

use std::collections::HashSet;
use std::sync::OnceLock;

use tracing::warn;

use mantle_shared::{SearchHit, SearchOptions, SearchProvider};

// ── HTTP provider ───────────────────────────────────────────────────────────

/// Queries a SearxNG-compatible JSON endpoint
/// (`GET <endpoint>?q=...&format=json&language=...&safesearch=0|1|2`).
pub struct HttpSearchProvider {
    endpoint: String,
    /// Hosts the provider may talk to, pre-lowercased for O(1) lookup.
    allowed_hosts: HashSet<String>,
    timeout: std::time::Duration,
    client: OnceLock<reqwest::blocking::Client>,
}

impl HttpSearchProvider {
    pub fn new(endpoint: String, extra_hosts: Vec<String>) -> anyhow::Result<Self> {
        let url = reqwest::Url::parse(&endpoint)?;
        let endpoint_host = url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid search endpoint: no host found"))?
            .to_lowercase();

        let mut allowed_hosts: HashSet<String> = extra_hosts
            .into_iter()
            .map(|h| h.to_lowercase())
            .collect();
        allowed_hosts.insert(endpoint_host);

        Ok(Self {
            endpoint,
            allowed_hosts,
            timeout: std::time::Duration::from_secs(20),
            client: OnceLock::new(),
        })
    }

    fn is_allowed_host(&self, host: &str) -> bool {
        self.allowed_hosts.contains(&host.to_lowercase())
    }

    /// The blocking client is built lazily on the first call, which by
    /// contract already runs on a blocking thread.
    fn client(&self) -> anyhow::Result<&reqwest::blocking::Client> {
        if self.client.get().is_none() {
            let built = reqwest::blocking::Client::builder()
                .timeout(self.timeout)
                .build()?;
            let _ = self.client.set(built);
        }
        self.client
            .get()
            .ok_or_else(|| anyhow::anyhow!("search client initialization raced"))
    }

    fn safesearch_level(options: &SearchOptions) -> &'static str {
        match options.safesearch.as_str() {
            "off" => "0",
            "strict" => "2",
            _ => "1",
        }
    }
}

impl SearchProvider for HttpSearchProvider {
    fn search(&self, query: &str, options: &SearchOptions) -> anyhow::Result<Vec<SearchHit>> {
        let url = reqwest::Url::parse(&self.endpoint)?;
        let host = url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid search endpoint: no host found"))?;
        if !self.is_allowed_host(host) {
            warn!("🚫 search host '{}' is not in the allowlist", host);
            anyhow::bail!("Access to search host '{host}' is denied by policy");
        }

        let response = self
            .client()?
            .get(url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("language", options.locale.as_str()),
                ("safesearch", Self::safesearch_level(options)),
            ])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("search endpoint returned {status}");
        }

        let json: serde_json::Value = response.json()?;
        let results = json
            .get("results")
            .and_then(|r| r.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid search response: missing results array"))?;

        Ok(results
            .iter()
            .take(options.max_results)
            .map(|r| SearchHit {
                title: text_field(r, "title", "Untitled"),
                url: text_field(r, "url", "#"),
                snippet: text_field(r, "content", ""),
            })
            .collect())
    }
}

fn text_field(value: &serde_json::Value, key: &str, default: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or(default)
        .to_string()
}

// ── Static provider ─────────────────────────────────────────────────────────

/// Deterministic offline corpus for demo runs and tests: fabricates a small,
/// stable hit list for any query.
pub struct StaticSearchProvider;

impl SearchProvider for StaticSearchProvider {
    fn search(&self, query: &str, options: &SearchOptions) -> anyhow::Result<Vec<SearchHit>> {
        let slug: String = query
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect::<String>()
            .to_lowercase();

        let corpus = [
            (
                format!("Overview: {query}"),
                format!("https://knowledge.invalid/overview/{slug}"),
                format!("A broad overview of {query}, with pointers to primary sources."),
            ),
            (
                format!("{query} — comparison of current approaches"),
                format!("https://knowledge.invalid/compare/{slug}"),
                format!("Side-by-side comparison of the main approaches to {query}."),
            ),
            (
                format!("Field notes on {query}"),
                format!("https://knowledge.invalid/notes/{slug}"),
                format!("Practical notes and caveats collected while working on {query}."),
            ),
        ];

        Ok(corpus
            .into_iter()
            .take(options.max_results)
            .map(|(title, url, snippet)| SearchHit {
                title,
                url,
                snippet,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_provider_is_deterministic_and_bounded() {
        let provider = StaticSearchProvider;
        let options = SearchOptions {
            max_results: 2,
            ..SearchOptions::default()
        };
        let first = provider.search("agent frameworks", &options).unwrap();
        let second = provider.search("agent frameworks", &options).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].title, second[0].title);
        assert!(first[0].url.contains("agent-frameworks"));
    }

    #[test]
    fn http_provider_rejects_endpoints_without_a_host() {
        assert!(HttpSearchProvider::new("not a url".to_string(), vec![]).is_err());
    }

    #[test]
    fn endpoint_host_is_allowed_by_construction() {
        let provider =
            HttpSearchProvider::new("https://searx.example.org/search".to_string(), vec![])
                .unwrap();
        assert!(provider.is_allowed_host("searx.example.org"));
        assert!(provider.is_allowed_host("SEARX.EXAMPLE.ORG"));
        assert!(!provider.is_allowed_host("evil.example.org"));
    }

    #[test]
    fn safesearch_levels_map_to_endpoint_values() {
        let mut options = SearchOptions::default();
        assert_eq!(HttpSearchProvider::safesearch_level(&options), "1");
        options.safesearch = "off".to_string();
        assert_eq!(HttpSearchProvider::safesearch_level(&options), "0");
        options.safesearch = "strict".to_string();
        assert_eq!(HttpSearchProvider::safesearch_level(&options), "2");
    }
}
