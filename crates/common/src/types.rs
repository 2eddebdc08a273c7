use serde::{Deserialize, Serialize};

/// A tradable instrument, identified by its exchange code (e.g. "SiZ6@FORTS").
///
/// Market depth subscriptions are also keyed by `Security`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Security {
    pub code: String,
}

impl Security {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

impl std::fmt::Display for Security {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code)
    }
}

/// An account holding positions and money.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Portfolio {
    pub name: String,
}

impl Portfolio {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl std::fmt::Display for Portfolio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Which setup phase is still missing when a strategy is asked to trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unready {
    BindingIncomplete,
    RegistrationIncomplete,
}

impl std::fmt::Display for Unready {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unready::BindingIncomplete => write!(f, "binding incomplete"),
            Unready::RegistrationIncomplete => write!(f, "registration incomplete"),
        }
    }
}

/// Externally visible state of a strategy instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StrategyState {
    #[default]
    Created,
    Bound,
    Registered,
    Started,
    Stopped,
}

impl std::fmt::Display for StrategyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyState::Created => write!(f, "created"),
            StrategyState::Bound => write!(f, "bound"),
            StrategyState::Registered => write!(f, "registered"),
            StrategyState::Started => write!(f, "started"),
            StrategyState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Where an asynchronously observed error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSource {
    /// The strategy's own error stream.
    Strategy,
    /// Generic connector error.
    Connector,
    /// Connection lost or refused.
    Connection,
    /// The connector failed to register an order.
    OrderRegistration,
}

/// An error surfaced by the connector or the engine. Never returned as a
/// `Result`; only routed to a `Notifier`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedError {
    pub source: ErrorSource,
    pub message: String,
}

impl ObservedError {
    pub fn new(source: ErrorSource, message: impl Into<String>) -> Self {
        Self {
            source,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ObservedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.source, self.message)
    }
}

/// Commands sent to a strategy runner via its command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    Start,
    Stop,
}
