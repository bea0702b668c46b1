//! Thinking/decomposition collaborators.
//!
//! The coordinator treats decomposition as an opaque external capability:
//! it hands over a goal and a desired output shape and gets free text back.
//! Everything here is about being resilient to that text, not about
//! reasoning quality.

use async_trait::async_trait;
use tracing::warn;

use mantle_shared::{Task, ThinkingEngine};

/// Turn collaborator output into an ordered task list. Tolerates numbered
/// lists, bullet prefixes, and blank-line noise; drops anything that ends up
/// empty after cleaning. An empty return is the caller's decomposition-error
/// signal.
#[must_use]
pub fn parse_step_list(raw: &str) -> Vec<Task> {
    raw.lines()
        .map(strip_step_prefix)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(i, line)| Task::new(format!("T{}", i + 1), line))
        .collect()
}

fn strip_step_prefix(line: &str) -> &str {
    let trimmed = line.trim();
    let without_marker = trimmed
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .trim_start_matches(['.', ')', ':', '-', '*']);
    without_marker.trim()
}

// ============================================================
// Heuristic thinker (default, offline, deterministic)
// ============================================================

/// Deterministic decomposition used by default and under test: splits the
/// goal on explicit step separators, and falls back to a canonical
/// research → analyze → report plan for a monolithic goal.
pub struct HeuristicThinker;

#[async_trait]
impl ThinkingEngine for HeuristicThinker {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn think(&self, goal: &str, _shape: &str) -> anyhow::Result<String> {
        let mission = extract_mission(goal);
        let steps: Vec<&str> = mission
            .split(';')
            .flat_map(|chunk| chunk.split(" then "))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        let lines: Vec<String> = if steps.len() > 1 {
            steps
                .iter()
                .enumerate()
                .map(|(i, s)| format!("{}. {}", i + 1, s))
                .collect()
        } else {
            vec![
                format!("1. Research background information on: {mission}"),
                format!("2. Analyze the code and constraints involved in: {mission}"),
                format!("3. Synthesize a report with conclusions for: {mission}"),
            ]
        };

        Ok(lines.join("\n"))
    }
}

/// The coordinator wraps the goal in a decomposition prompt; recover the
/// original mission text so the splitter works on what the caller said.
fn extract_mission(prompt: &str) -> &str {
    prompt
        .rsplit_once("Mission: '")
        .map(|(_, rest)| rest.trim_end_matches('\''))
        .unwrap_or(prompt)
        .trim()
}

// ============================================================
// LLM thinker (OpenAI-compatible chat completions)
// ============================================================

pub struct LlmThinker {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl LlmThinker {
    pub fn new(api_url: String, api_key: String, model: String) -> anyhow::Result<Self> {
        if api_key.is_empty() {
            warn!("⚠️  LLM thinker: empty API key; decomposition calls will be rejected upstream");
        }
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()?,
            api_url,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl ThinkingEngine for LlmThinker {
    fn name(&self) -> &str {
        "llm"
    }

    async fn think(&self, goal: &str, shape: &str) -> anyhow::Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You decompose missions for a multi-agent orchestration system. \
                                Respond with the requested shape only, no commentary."
                },
                { "role": "user", "content": format!("{goal}\nRespond as: {shape}.") }
            ],
            "stream": false
        });

        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("LLM endpoint returned {status}");
        }

        let json: serde_json::Value = resp.json().await?;
        // Safe JSON path access with a descriptive error; the collaborator's
        // output shape is not trusted.
        let content = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                anyhow::anyhow!("Invalid LLM response: missing choices[0].message.content")
            })?
            .to_string();

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numbered_and_bulleted_lists() {
        let raw = "1. Research the landscape\n\n- Analyze the code\n  3) Write the report\n";
        let tasks = parse_step_list(raw);
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].id, "T1");
        assert_eq!(tasks[0].description, "Research the landscape");
        assert_eq!(tasks[1].description, "Analyze the code");
        assert_eq!(tasks[2].description, "Write the report");
    }

    #[test]
    fn blank_and_marker_only_lines_are_dropped() {
        assert!(parse_step_list("\n \n---\n2.\n").is_empty());
    }

    #[tokio::test]
    async fn splits_goals_on_step_separators() {
        let thinker = HeuristicThinker;
        let raw = thinker
            .think(
                "Decompose the following mission into a numbered list of clear, actionable steps \
                 for a multi-agent system. Mission: 'Research X; analyze the code; write the report'",
                "an ordered step list",
            )
            .await
            .unwrap();
        let tasks = parse_step_list(&raw);
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].description, "Research X");
        assert_eq!(tasks[2].description, "write the report");
    }

    #[tokio::test]
    async fn monolithic_goals_get_the_canonical_plan() {
        let thinker = HeuristicThinker;
        let raw = thinker
            .think("Ship a high-performance cache module", "an ordered step list")
            .await
            .unwrap();
        let tasks = parse_step_list(&raw);
        assert_eq!(tasks.len(), 3);
        assert!(tasks[0].description.starts_with("Research"));
        assert!(tasks[1].description.starts_with("Analyze"));
    }
}
