use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use common::{Connector, Error, Portfolio, Result, Security};

use crate::lifecycle::StrategyLifecycle;

pub const DEFAULT_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_MAX_ERROR_COUNT: u32 = 10;

/// Top-level strategy config file (TOML).
///
/// Example `config/strategies.toml`:
/// ```toml
/// [[strategy]]
/// name = "Si spread"
/// security = "SiZ6"
/// portfolio = "FORTS-main"
/// timeout_ms = 2000
///
/// [strategy.register]
/// securities = ["SiZ6", "SiH7"]
/// market_depths = ["SiZ6"]
/// portfolios = ["FORTS-main"]
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyFileConfig {
    #[serde(rename = "strategy", default)]
    pub strategies: Vec<StrategyConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    /// Human-readable name shown in logs and notifications.
    pub name: String,
    /// Primary instrument the strategy trades.
    pub security: Security,
    /// Account the strategy trades on.
    pub portfolio: Portfolio,
    #[serde(flatten)]
    pub settings: StrategySettings,
    /// Entities registered with the connector before start.
    #[serde(default)]
    pub register: RegistrationConfig,
}

/// Tunables shared by every strategy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StrategySettings {
    /// Order/response timeout used by trading logic, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Observed errors after which a warning is logged. Errors never stop
    /// the strategy.
    #[serde(default = "default_max_error_count")]
    pub max_error_count: u32,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_error_count: DEFAULT_MAX_ERROR_COUNT,
        }
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_max_error_count() -> u32 {
    DEFAULT_MAX_ERROR_COUNT
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RegistrationConfig {
    #[serde(default)]
    pub securities: Vec<Security>,
    #[serde(default)]
    pub market_depths: Vec<Security>,
    #[serde(default)]
    pub portfolios: Vec<Portfolio>,
}

impl StrategyFileConfig {
    /// Load from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate. Strategy names must be non-blank and unique.
    pub fn parse(content: &str) -> Result<Self> {
        let file: Self = toml::from_str(content)?;
        let mut seen = HashSet::new();
        for cfg in &file.strategies {
            let name = cfg.name.trim();
            if name.is_empty() {
                return Err(Error::Config("strategy name must not be blank".to_string()));
            }
            if !seen.insert(name) {
                return Err(Error::Config(format!("duplicate strategy name '{name}'")));
            }
        }
        Ok(file)
    }
}

impl StrategyConfig {
    /// Run both setup phases on `lifecycle` against `connector`.
    pub fn apply(
        &self,
        lifecycle: &mut StrategyLifecycle,
        connector: Arc<dyn Connector>,
    ) -> Result<()> {
        lifecycle.bind_entities(
            Some(connector),
            Some(self.security.clone()),
            Some(self.portfolio.clone()),
        )?;
        lifecycle.register_entities(
            &self.register.securities,
            &self.register.market_depths,
            &self.register.portfolios,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_strategy_entry() {
        let file = StrategyFileConfig::parse(
            r#"
            [[strategy]]
            name = "Si spread"
            security = "SiZ6"
            portfolio = "FORTS-main"
            timeout_ms = 500

            [strategy.register]
            securities = ["SiZ6", "SiH7"]
            market_depths = ["SiZ6"]
            "#,
        )
        .unwrap();

        let cfg = &file.strategies[0];
        assert_eq!(cfg.security, Security::new("SiZ6"));
        assert_eq!(cfg.portfolio, Portfolio::new("FORTS-main"));
        assert_eq!(cfg.settings.timeout_ms, 500);
        assert_eq!(cfg.settings.max_error_count, DEFAULT_MAX_ERROR_COUNT);
        assert_eq!(cfg.register.securities.len(), 2);
        assert!(cfg.register.portfolios.is_empty());
    }

    #[test]
    fn missing_register_section_means_nothing_to_register() {
        let file = StrategyFileConfig::parse(
            r#"
            [[strategy]]
            name = "bare"
            security = "SBER"
            portfolio = "main"
            "#,
        )
        .unwrap();

        let cfg = &file.strategies[0];
        assert_eq!(cfg.settings, StrategySettings::default());
        assert!(cfg.register.securities.is_empty());
        assert!(cfg.register.market_depths.is_empty());
    }

    #[test]
    fn duplicate_names_are_a_config_error() {
        let err = StrategyFileConfig::parse(
            r#"
            [[strategy]]
            name = "twin"
            security = "SBER"
            portfolio = "main"

            [[strategy]]
            name = "twin"
            security = "GAZP"
            portfolio = "main"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("twin")));
    }

    #[test]
    fn blank_name_is_a_config_error() {
        let err = StrategyFileConfig::parse(
            r#"
            [[strategy]]
            name = "  "
            security = "SBER"
            portfolio = "main"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn malformed_file_is_a_toml_error() {
        let err = StrategyFileConfig::parse("[[strategy]]\nname = 1").unwrap_err();
        assert!(matches!(err, common::Error::Toml(_)));
    }
}
