use anyhow::{Context, Result};
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-09-2025";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_SESSION_IDLE_MINUTES: i64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_url: String,
    pub request_timeout: Option<Duration>,
    pub bind_addr: String,
    pub max_upload_bytes: usize,
    pub session_idle: chrono::Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars().collect())
    }

    fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        let var = |name: &str| {
            vars.get(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_key = var("GEMINI_API_KEY");
        if api_key.is_none() {
            log::warn!("⚠️ GEMINI_API_KEY not set, requests will be sent without a key");
        }

        let model = var("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_url = var("GEMINI_API_URL").unwrap_or_else(|| {
            format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
                model
            )
        });

        let request_timeout = var("GEMINI_TIMEOUT_SECS")
            .map(|secs| {
                secs.parse::<u64>()
                    .with_context(|| format!("GEMINI_TIMEOUT_SECS must be a number of seconds, got '{}'", secs))
            })
            .transpose()?
            .map(Duration::from_secs);

        let max_upload_bytes = match var("MAX_UPLOAD_BYTES") {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("MAX_UPLOAD_BYTES must be a byte count, got '{}'", raw))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let idle_minutes = match var("SESSION_IDLE_MINUTES") {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|minutes| *minutes > 0)
                .with_context(|| format!("SESSION_IDLE_MINUTES must be a positive number, got '{}'", raw))?,
            None => DEFAULT_SESSION_IDLE_MINUTES,
        };

        Ok(Self {
            api_key,
            api_url,
            request_timeout,
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            max_upload_bytes,
            session_idle: chrono::Duration::minutes(idle_minutes),
        })
    }
}
