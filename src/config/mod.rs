use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub tracking: TrackingConfig,
    pub analysis: AnalysisConfig,
    pub generation: GenerationConfig,
    pub request: RequestConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Event tracking configuration
#[derive(Debug, Clone)]
pub struct TrackingConfig {
    /// Capacity of the beacon post-processing queue.
    pub beacon_queue_capacity: usize,
    /// Session cookie lifetime in days.
    pub session_cookie_max_age_days: i64,
}

/// Significance-evaluation thresholds.
///
/// Defaults match the source system's fixed constants: a variant difference
/// counts as significant only once both variants have at least
/// `min_conversions` conversions and the absolute improvement exceeds
/// `min_improvement_pct`.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub min_conversions: u64,
    pub min_improvement_pct: f64,
}

/// Variant-drafting API configuration.
///
/// Generation is optional; with no API key the endpoint reports the service
/// as unavailable.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

/// Outbound HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let server = ServerConfig {
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
                .parse()
                .map_err(|e| AppError::Config {
                    message: format!("Invalid BIND_ADDR: {}", e),
                })?,
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/experiments.db".to_string()),
            ),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
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

        let tracking = TrackingConfig {
            beacon_queue_capacity: env::var("BEACON_QUEUE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024),
            session_cookie_max_age_days: env::var("SESSION_COOKIE_MAX_AGE_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        };

        let analysis = AnalysisConfig {
            min_conversions: env::var("ANALYSIS_MIN_CONVERSIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            min_improvement_pct: env::var("ANALYSIS_MIN_IMPROVEMENT_PCT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10.0),
        };

        let generation = GenerationConfig {
            api_key: env::var("GENERATION_API_KEY").ok().filter(|k| !k.is_empty()),
            base_url: env::var("GENERATION_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
            model: env::var("GENERATION_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
        };

        let request = RequestConfig {
            timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30000),
            max_retries: env::var("MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            retry_delay_ms: env::var("RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
        };

        Ok(Config {
            server,
            database,
            logging,
            tracking,
            analysis,
            generation,
            request,
        })
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_conversions: 10,
            min_improvement_pct: 10.0,
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            beacon_queue_capacity: 1024,
            session_cookie_max_age_days: 30,
        }
    }
}
