use crate::assistant::AssistantConfig;
use crate::error::{DispatchError, Result};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub struct DispatchConfig {
    pub db_path: PathBuf,
    pub session_path: PathBuf,
    pub listen_addr: String,
    pub poll_interval: Duration,
    /// Number of change-feed rows kept once readers have consumed them.
    pub change_retention: i64,
    /// `None` when the assistant's API key variable is not set.
    pub assistant: Option<AssistantConfig>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("dispatch.db"),
            session_path: PathBuf::from("session.json"),
            listen_addr: "0.0.0.0:8080".into(),
            poll_interval: Duration::from_millis(750),
            change_retention: 1000,
            assistant: None,
        }
    }
}

impl DispatchConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let poll_interval = match lookup("DISPATCH_POLL_INTERVAL_MS") {
            Some(raw) => {
                let ms = raw.trim().parse::<u64>().map_err(|_| {
                    DispatchError::Config(format!("DISPATCH_POLL_INTERVAL_MS is not a number: '{raw}'"))
                })?;
                if ms == 0 {
                    return Err(DispatchError::Config(
                        "DISPATCH_POLL_INTERVAL_MS must be positive".into(),
                    ));
                }
                Duration::from_millis(ms)
            }
            None => defaults.poll_interval,
        };

        let change_retention = match lookup("DISPATCH_CHANGE_RETENTION") {
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(keep) if keep > 0 => keep,
                _ => {
                    return Err(DispatchError::Config(format!(
                        "DISPATCH_CHANGE_RETENTION must be a positive number: '{raw}'"
                    )))
                }
            },
            None => defaults.change_retention,
        };

        Ok(Self {
            db_path: lookup("DISPATCH_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            session_path: lookup("DISPATCH_SESSION_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.session_path),
            listen_addr: lookup("DISPATCH_LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            poll_interval,
            change_retention,
            assistant: assistant_from_lookup(&lookup),
        })
    }
}

fn assistant_from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Option<AssistantConfig> {
    let api_key_env =
        lookup("ASSISTANT_API_KEY_ENV").unwrap_or_else(|| "OPENAI_API_KEY".into());
    lookup(&api_key_env)?;

    let defaults = AssistantConfig::default();
    Some(AssistantConfig {
        provider: lookup("ASSISTANT_PROVIDER").unwrap_or(defaults.provider),
        model: lookup("ASSISTANT_MODEL").unwrap_or(defaults.model),
        api_key_env,
        temperature: lookup("ASSISTANT_TEMPERATURE")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(defaults.temperature),
    })
}
