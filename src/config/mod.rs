use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Completion endpoint.
    pub completion: CompletionConfig,
    /// SQLite settings.
    pub database: DatabaseConfig,
    /// Log level and format.
    pub logging: LoggingConfig,
    /// Timeouts and retries.
    pub request: RequestConfig,
    /// Per-stage model parameters.
    pub models: ModelConfig,
}

/// Completion API configuration
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Bearer token (`COMPLETION_API_KEY`).
    pub api_key: String,
    /// Base URL without the `/v1/completions` path.
    pub base_url: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database file.
    pub path: PathBuf,
    /// Pool size.
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive.
    pub level: String,
    /// Output layer.
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    /// Human-readable lines.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Connect and send timeout.
    pub timeout_ms: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base backoff delay, doubled per retry.
    pub retry_delay_ms: u64,
    /// Longest gap allowed between two stream chunks before the stage fails.
    pub stream_idle_timeout_ms: u64,
}

/// Model parameters for a single prompt stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageParams {
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Completion token cap.
    pub max_tokens: u32,
}

/// Per-stage model parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Answer stage.
    pub answer: StageParams,
    /// Pseudocode stage.
    pub pseudocode: StageParams,
    /// Suggestions stage.
    pub suggestions: StageParams,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let completion = CompletionConfig {
            api_key: env::var("COMPLETION_API_KEY").map_err(|_| AppError::Config {
                message: "COMPLETION_API_KEY is required".to_string(),
            })?,
            base_url: env::var("COMPLETION_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/tutor.db".to_string()),
            ),
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let defaults = RequestConfig::default();
        let request = RequestConfig {
            timeout_ms: parse_var("REQUEST_TIMEOUT_MS", defaults.timeout_ms),
            max_retries: parse_var("MAX_RETRIES", defaults.max_retries),
            retry_delay_ms: parse_var("RETRY_DELAY_MS", defaults.retry_delay_ms),
            stream_idle_timeout_ms: parse_var(
                "STREAM_IDLE_TIMEOUT_MS",
                defaults.stream_idle_timeout_ms,
            ),
        };

        let model_defaults = ModelConfig::default();
        let models = ModelConfig {
            answer: StageParams::from_env("ANSWER", model_defaults.answer),
            pseudocode: StageParams::from_env("PSEUDOCODE", model_defaults.pseudocode),
            suggestions: StageParams::from_env("SUGGESTIONS", model_defaults.suggestions),
        };

        Ok(Config {
            completion,
            database,
            logging,
            request,
            models,
        })
    }
}

impl StageParams {
    /// Apply `{PREFIX}_MODEL`, `{PREFIX}_TEMPERATURE` and `{PREFIX}_MAX_TOKENS` overrides.
    fn from_env(prefix: &str, defaults: StageParams) -> Self {
        Self {
            model: env::var(format!("{}_MODEL", prefix)).unwrap_or(defaults.model),
            temperature: parse_var(&format!("{}_TEMPERATURE", prefix), defaults.temperature),
            max_tokens: parse_var(&format!("{}_MAX_TOKENS", prefix), defaults.max_tokens),
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
            stream_idle_timeout_ms: 20000,
        }
    }
}

impl RequestConfig {
    /// Idle timeout between stream chunks.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_idle_timeout_ms)
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            answer: StageParams {
                model: "gpt-3.5-turbo-instruct".to_string(),
                temperature: 0.1,
                max_tokens: 1000,
            },
            pseudocode: StageParams {
                model: "gpt-3.5-turbo-instruct".to_string(),
                temperature: 0.05,
                max_tokens: 1200,
            },
            suggestions: StageParams {
                model: "gpt-3.5-turbo-instruct".to_string(),
                temperature: 0.7,
                max_tokens: 150,
            },
        }
    }
}
