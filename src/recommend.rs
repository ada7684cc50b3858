//! Free-text recommendations attached to each plan.
//!
//! The text is opaque to the planner: it is fetched from a
//! [`RecommendationSource`] and stored verbatim. Two sources exist:
//!
//! - [`OllamaRecommender`] asks an Ollama-compatible `/api/generate` endpoint
//! - [`RuleBasedRecommender`] derives a few sentences from the plan itself
//!
//! A failing source never fails a rebuild; [`recommend_or_fallback`] swaps in
//! a fixed notice instead.

use std::time::Duration;

use crate::config::AiConfig;
use crate::error::UpstreamError;
use crate::plan::DailyPlan;

pub const EMPTY_DAY: &str = "No tasks scheduled for today. Enjoy your free day!";
pub const UNAVAILABLE: &str =
    "AI recommendations are temporarily unavailable, but your plan is ready.";

/// Supplier of recommendation text for a plan.
pub trait RecommendationSource: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    fn recommend(&self, plan: &DailyPlan) -> Result<String, UpstreamError>;
}

/// Ask `source`, falling back to [`UNAVAILABLE`] on failure.
pub fn recommend_or_fallback(source: &dyn RecommendationSource, plan: &DailyPlan) -> String {
    if plan.is_empty() {
        return EMPTY_DAY.to_string();
    }
    match source.recommend(plan) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(source = source.name(), error = %e, "recommendation source failed");
            UNAVAILABLE.to_string()
        }
    }
}

/// Build the configured source.
pub fn from_config(config: &AiConfig) -> Box<dyn RecommendationSource> {
    if config.enabled {
        Box::new(OllamaRecommender::new(config))
    } else {
        Box::new(RuleBasedRecommender)
    }
}

// ---------------------------------------------------------------------------
// Rule-based
// ---------------------------------------------------------------------------

/// Deterministic text from the plan's shape.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedRecommender;

impl RecommendationSource for RuleBasedRecommender {
    fn name(&self) -> &str {
        "rules"
    }

    fn recommend(&self, plan: &DailyPlan) -> Result<String, UpstreamError> {
        let Some(first) = plan.tasks.first() else {
            return Ok(EMPTY_DAY.to_string());
        };
        let mut lines = vec![format!(
            "Start with '{}' while your energy is highest.",
            first.title
        )];
        if let Some(partial) = plan.tasks.iter().find(|e| e.partial) {
            lines.push(format!(
                "'{}' only partly fits today; decide on a stopping point before you begin.",
                partial.title
            ));
        }
        match &plan.overload_info {
            Some(info) if info.is_overloaded => lines.push(
                "The day is full: move anything that is not due soon to tomorrow.".to_string(),
            ),
            _ if plan.tasks.len() > 1 => lines.push(
                "Batch the shorter tasks together to keep context switches low.".to_string(),
            ),
            _ => {}
        }
        Ok(lines.join(" "))
    }
}

// ---------------------------------------------------------------------------
// Ollama
// ---------------------------------------------------------------------------

/// Client for an Ollama-compatible text generation endpoint.
pub struct OllamaRecommender {
    base_url: String,
    model: String,
    agent: ureq::Agent,
}

impl OllamaRecommender {
    pub fn new(config: &AiConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            agent,
        }
    }

    fn prompt(plan: &DailyPlan) -> String {
        let summary: Vec<String> = plan
            .tasks
            .iter()
            .take(10)
            .map(|e| {
                format!(
                    "- {} (Priority: {}, Duration: {} min)",
                    e.title, e.priority, e.scheduled_duration
                )
            })
            .collect();
        format!(
            "Based on these scheduled tasks for today, provide 2-3 brief recommendations:\n\n\
             {}\n\nProvide practical, actionable recommendations. Keep it under 100 words.",
            summary.join("\n")
        )
    }

    fn unavailable(&self, message: impl Into<String>) -> UpstreamError {
        UpstreamError::Unavailable {
            service: format!("ollama ({})", self.base_url),
            message: message.into(),
        }
    }
}

impl RecommendationSource for OllamaRecommender {
    fn name(&self) -> &str {
        "ollama"
    }

    fn recommend(&self, plan: &DailyPlan) -> Result<String, UpstreamError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": Self::prompt(plan),
            "stream": false,
        });

        let resp = self
            .agent
            .post(&url)
            .send_json(body)
            .map_err(|e| self.unavailable(e.to_string()))?;
        let json: serde_json::Value = resp.into_json().map_err(|e| UpstreamError::BadResponse {
            service: "ollama".into(),
            message: e.to_string(),
        })?;

        match json["response"].as_str().map(str::trim) {
            Some(text) if !text.is_empty() => Ok(text.to_string()),
            _ => Err(UpstreamError::BadResponse {
                service: "ollama".into(),
                message: "missing or empty 'response' field".into(),
            }),
        }
    }
}

impl std::fmt::Debug for OllamaRecommender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaRecommender")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}
