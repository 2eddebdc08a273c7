use crate::{Error, Result};

/// Where observed errors are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlertSink {
    /// Straight to the tracing log.
    #[default]
    Log,
    /// Through an in-process channel to a forwarder task.
    Channel,
}

impl std::str::FromStr for AlertSink {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "log" => Ok(AlertSink::Log),
            "channel" => Ok(AlertSink::Channel),
            other => Err(Error::Config(format!(
                "ALERT_SINK must be 'log' or 'channel', got: '{other}'"
            ))),
        }
    }
}

/// Process configuration loaded from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the TOML file describing the strategies to run.
    pub strategy_config_path: String,

    /// Entity codes the paper connector refuses to register.
    pub paper_reject_codes: Vec<String>,

    /// Notification sink for strategy and connector errors.
    pub alert_sink: AlertSink,
}

impl Config {
    /// Load configuration from environment variables.
    /// Loads `.env` if present. Every variable is optional; an invalid
    /// `ALERT_SINK` panics with a clear message.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        Config {
            strategy_config_path: optional_env("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategies.toml".to_string()),
            paper_reject_codes: optional_env("PAPER_REJECT_CODES")
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
            alert_sink: optional_env("ALERT_SINK")
                .map(|v| v.parse().unwrap_or_else(|e| panic!("ERROR: {e}")))
                .unwrap_or_default(),
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
