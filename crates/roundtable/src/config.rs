//! Runtime configuration for the roundtable CLI.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Command-line flags (applied by [`crate::cli::Cli::apply`])
//! 2. Environment variables (after `.env` is loaded)
//! 3. The TOML file passed with `--config`
//! 4. Built-in defaults (Gemini's OpenAI-compatible endpoint, 3 rounds)

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use coordination::{HistoryPolicy, RetryPolicy, Temperatures};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_MAX_TOKENS: u32 = 2048;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_ROUNDS: u32 = 3;
const DEFAULT_STORE_DIR: &str = ".roundtable/sessions";
pub const DEFAULT_SESSION: &str = "main_session";

pub const ENV_API_KEY: &str = "ROUNDTABLE_API_KEY";
/// Accepted when `ROUNDTABLE_API_KEY` is unset.
pub const ENV_GOOGLE_API_KEY: &str = "GOOGLE_API_KEY";
pub const ENV_BASE_URL: &str = "ROUNDTABLE_BASE_URL";
pub const ENV_MODEL: &str = "ROUNDTABLE_MODEL";
pub const ENV_MAX_ROUNDS: &str = "MAX_DEBATE_ROUNDS";
pub const ENV_STORE_DIR: &str = "ROUNDTABLE_STORE_DIR";
pub const ENV_SESSION: &str = "ROUNDTABLE_SESSION";
pub const ENV_HISTORY_QUESTIONS: &str = "ROUNDTABLE_HISTORY_QUESTIONS";
pub const ENV_QUESTION_TIMEOUT_SECS: &str = "ROUNDTABLE_QUESTION_TIMEOUT_SECS";
pub const ENV_WORKSPACE: &str = "ROUNDTABLE_WORKSPACE";

/// OpenAI-compatible chat completions endpoint.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

// Hand-written so the key never lands in logs.
impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl ProviderSettings {
    /// The API key, if set and non-blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebateSettings {
    /// Round budget: proposer/critic/moderator cycles per question.
    pub max_rounds: u32,
    /// Keep only the turns of the last N questions. Unset keeps everything.
    pub history_questions: Option<usize>,
    /// Wall-clock ceiling per question.
    pub question_timeout_secs: Option<u64>,
    pub temperatures: Temperatures,
}

impl Default for DebateSettings {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            history_questions: None,
            question_timeout_secs: None,
            temperatures: Temperatures::default(),
        }
    }
}

impl DebateSettings {
    pub fn history_policy(&self) -> HistoryPolicy {
        match self.history_questions {
            Some(n) => HistoryPolicy::last(n),
            None => HistoryPolicy::unbounded(),
        }
    }

    pub fn question_timeout(&self) -> Option<Duration> {
        self.question_timeout_secs.map(Duration::from_secs)
    }
}

/// Backoff parameters for transient provider failures.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub min_wait_secs: f64,
    pub max_wait_secs: f64,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            min_wait_secs: policy.min_wait.as_secs_f64(),
            max_wait_secs: policy.max_wait.as_secs_f64(),
            multiplier: policy.multiplier,
            jitter: policy.jitter,
        }
    }
}

impl RetrySettings {
    fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be > 0".to_string());
        }
        if !self.min_wait_secs.is_finite() || !self.max_wait_secs.is_finite() {
            return Err(format!(
                "retry waits must be finite, got {} and {}",
                self.min_wait_secs, self.max_wait_secs
            ));
        }
        if self.min_wait_secs < 0.0 || self.min_wait_secs > self.max_wait_secs {
            return Err(format!(
                "retry waits must satisfy 0 <= min_wait_secs <= max_wait_secs, got {} and {}",
                self.min_wait_secs, self.max_wait_secs
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(format!("retry.multiplier must be >= 1, got {}", self.multiplier));
        }
        Ok(())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoundtableConfig {
    pub provider: ProviderSettings,
    pub debate: DebateSettings,
    pub retry: RetrySettings,
    /// Directory holding one `<session>.json` record per session.
    pub store_dir: PathBuf,
    pub session: String,
    /// JSON workspace file. Unset uses the built-in demo workspace.
    pub workspace: Option<PathBuf>,
}

impl Default for RoundtableConfig {
    fn default() -> Self {
        Self {
            provider: ProviderSettings::default(),
            debate: DebateSettings::default(),
            retry: RetrySettings::default(),
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
            session: DEFAULT_SESSION.to_string(),
            workspace: None,
        }
    }
}

impl RoundtableConfig {
    /// Defaults, overlaid by `path` (if any), overlaid by the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config
            .apply_env(|name| std::env::var(name).ok())
            .map_err(|e| anyhow::anyhow!("invalid environment: {e}"))?;
        Ok(config)
    }

    /// Parse a TOML file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).context(format!("Failed to parse {}", path.display()))
    }

    /// Overlay values from `lookup` (normally `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = get(ENV_API_KEY).or_else(|| get(ENV_GOOGLE_API_KEY)) {
            self.provider.api_key = Some(key);
        }
        if let Some(url) = get(ENV_BASE_URL) {
            self.provider.base_url = url;
        }
        if let Some(model) = get(ENV_MODEL) {
            self.provider.model = model;
        }
        if let Some(rounds) = get(ENV_MAX_ROUNDS) {
            self.debate.max_rounds = parse_number(ENV_MAX_ROUNDS, &rounds)?;
        }
        if let Some(dir) = get(ENV_STORE_DIR) {
            self.store_dir = PathBuf::from(dir);
        }
        if let Some(session) = get(ENV_SESSION) {
            self.session = session;
        }
        if let Some(n) = get(ENV_HISTORY_QUESTIONS) {
            self.debate.history_questions = Some(parse_number(ENV_HISTORY_QUESTIONS, &n)?);
        }
        if let Some(secs) = get(ENV_QUESTION_TIMEOUT_SECS) {
            self.debate.question_timeout_secs = Some(parse_number(ENV_QUESTION_TIMEOUT_SECS, &secs)?);
        }
        if let Some(path) = get(ENV_WORKSPACE) {
            self.workspace = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.debate.max_rounds == 0 {
            return Err("debate.max_rounds must be > 0".to_string());
        }
        for (role, t) in self.debate.temperatures.all() {
            if !(0.0..=1.0).contains(&t) {
                return Err(format!("{role} temperature must be in [0, 1], got {t}"));
            }
        }
        if self.debate.history_questions == Some(0) {
            return Err("debate.history_questions must be > 0 when set".to_string());
        }
        if self.debate.question_timeout_secs == Some(0) {
            return Err("debate.question_timeout_secs must be > 0 when set".to_string());
        }
        if self.provider.max_tokens == 0 {
            return Err("provider.max_tokens must be > 0".to_string());
        }
        if self.provider.base_url.trim().is_empty() {
            return Err("provider.base_url must not be empty".to_string());
        }
        if self.session.trim().is_empty() {
            return Err("session must not be empty".to_string());
        }
        self.retry.validate()
    }

    /// Retry policy without sink or cancellation; the caller attaches those.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(self.retry.max_attempts)
            .with_min_wait(Duration::from_secs_f64(self.retry.min_wait_secs))
            .with_max_wait(Duration::from_secs_f64(self.retry.max_wait_secs))
            .with_multiplier(self.retry.multiplier)
            .with_jitter(self.retry.jitter)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("{name} must be a non-negative integer, got {value:?}"))
}
