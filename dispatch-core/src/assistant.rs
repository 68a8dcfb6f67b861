use crate::error::{DispatchError, Result};
use crate::listing::DashboardSummary;
use futures::executor::block_on;
use rig::client::completion::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;
use serde::{Deserialize, Serialize};
use std::future::IntoFuture;

pub const APOLOGY: &str =
    "An error occurred while generating a response. Please try again later.";

const PREAMBLE: &str = "You are the help assistant of an ambulance dispatch console. \
Answer operator questions about dispatching ambulances, emergency request statuses \
(pending, dispatched, completed, cancelled) and using the console. Be brief and practical.";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssistantConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub temperature: f64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            temperature: 0.3,
        }
    }
}

/// The prompt sent for one operator question. A dashboard summary, when
/// given, is included so answers can refer to the current workload.
pub fn build_prompt(question: &str, summary: Option<&DashboardSummary>) -> Result<String> {
    let question = question.trim();
    if question.is_empty() {
        return Err(DispatchError::Validation("question is empty".into()));
    }

    let mut prompt = String::new();
    if let Some(summary) = summary {
        prompt.push_str(&format!(
            "Current workload: {} pending, {} dispatched, {} completed requests; \
             {} of {} ambulances available ({:.0}%).\n",
            summary.pending,
            summary.dispatched,
            summary.completed,
            summary.ambulances_available,
            summary.ambulances_total,
            summary.availability_percent(),
        ));
    }
    prompt.push_str("Question: ");
    prompt.push_str(question);
    Ok(prompt)
}

pub fn ask(
    config: &AssistantConfig,
    question: &str,
    summary: Option<&DashboardSummary>,
) -> Result<String> {
    let prompt = build_prompt(question, summary)?;
    let answer = run_prompt(config, PREAMBLE, &prompt)?;
    let answer = answer.trim();
    if answer.is_empty() {
        return Err(DispatchError::Assistant("empty completion".into()));
    }
    Ok(answer.to_string())
}

/// Like [`ask`], but any failure becomes the fixed apology text.
pub fn ask_or_apology(
    config: &AssistantConfig,
    question: &str,
    summary: Option<&DashboardSummary>,
) -> String {
    ask(config, question, summary).unwrap_or_else(|err| {
        tracing::error!(error = %err, "assistant request failed");
        APOLOGY.to_string()
    })
}

impl AssistantConfig {
    /// An OpenAI client keyed from `api_key_env`. Any other provider is a
    /// configuration error.
    pub fn client(&self) -> Result<openai::Client> {
        if !self.provider.eq_ignore_ascii_case("openai") {
            return Err(DispatchError::Config(format!(
                "unsupported assistant provider '{}'",
                self.provider
            )));
        }
        let api_key = std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| DispatchError::Config(format!("{} is not set", self.api_key_env)))?;
        openai::Client::new(&api_key)
            .map_err(|e| DispatchError::Assistant(format!("openai client error: {e}")))
    }
}

fn run_prompt(config: &AssistantConfig, preamble: &str, prompt: &str) -> Result<String> {
    let agent = config
        .client()?
        .agent(&config.model)
        .preamble(preamble)
        .temperature(config.temperature)
        .build();

    block_on(agent.prompt(prompt).into_future())
        .map_err(|e| DispatchError::Assistant(format!("prompt failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_includes_workload_when_given() {
        let summary = DashboardSummary {
            pending: 2,
            dispatched: 1,
            completed: 7,
            ambulances_available: 3,
            ambulances_total: 4,
            active: Vec::new(),
        };
        let prompt = build_prompt("  who is free? ", Some(&summary)).expect("prompt");
        assert!(prompt.starts_with("Current workload: 2 pending, 1 dispatched"));
        assert!(prompt.contains("3 of 4 ambulances available (75%)"));
        assert!(prompt.ends_with("Question: who is free?"));
    }

    #[test]
    fn empty_question_is_rejected() {
        assert!(matches!(
            build_prompt("   ", None),
            Err(DispatchError::Validation(_))
        ));
    }

    #[test]
    fn unsupported_provider_falls_back_to_apology() {
        let config = AssistantConfig {
            provider: "carrier-pigeon".into(),
            ..AssistantConfig::default()
        };
        assert!(matches!(
            ask(&config, "hello", None),
            Err(DispatchError::Config(_))
        ));
        assert_eq!(ask_or_apology(&config, "hello", None), APOLOGY);
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let config = AssistantConfig {
            api_key_env: "DISPATCH_TEST_UNSET_ASSISTANT_KEY".into(),
            ..AssistantConfig::default()
        };
        assert!(matches!(config.client(), Err(DispatchError::Config(_))));
        assert_eq!(ask_or_apology(&config, "hello", None), APOLOGY);
    }
}
