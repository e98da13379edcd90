//! Process configuration: CLI overrides layered over environment variables,
//! with the canonical defaults baked in so a bare `coordinatord` binary
//! with only `KV_URL` set is enough to run.

use clap::Parser;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "coordinatord", about = "LLM inference job broker coordinator")]
pub struct Cli {
    /// TCP port the HTTP server listens on.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Redis connection URL for the KV/queue backend. Omit to run against
    /// an in-memory store (single-process only, for local development).
    #[arg(long, env = "KV_URL")]
    pub kv_url: Option<String>,

    /// `pretty` for human-readable logs, `json` for structured output.
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub port: u16,
    pub kv_url: Option<String>,
    pub log_format: LogFormat,

    pub default_model: String,
    pub default_max_tokens: i64,
    pub default_temperature: f64,
    pub default_priority: i64,

    pub lock_ttl: Duration,
    pub heartbeat_stale_after: Duration,
    pub sweep_interval: Duration,
    pub registry_cleanup_interval: Duration,
    pub node_inactivity_horizon: Duration,
    pub cleanup_max_age_default: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl CoordinatorConfig {
    pub fn from_cli(cli: Cli) -> Self {
        let log_format = match cli.log_format.as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Self {
            port: cli.port,
            kv_url: cli.kv_url,
            log_format,

            default_model: "llama3.2:3b".to_string(),
            default_max_tokens: 1000,
            default_temperature: 0.7,
            default_priority: 0,

            lock_ttl: Duration::from_secs(300),
            heartbeat_stale_after: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
            registry_cleanup_interval: Duration::from_secs(60 * 60),
            node_inactivity_horizon: Duration::from_secs(7 * 24 * 60 * 60),
            cleanup_max_age_default: Duration::from_secs(24 * 60 * 60),
        }
    }

    /// A config with canonical defaults and no external KV backend, for
    /// unit tests and the `tests/` integration suite alike.
    pub fn for_tests() -> Self {
        Self::from_cli(Cli {
            port: 0,
            kv_url: None,
            log_format: "pretty".to_string(),
        })
    }
}
