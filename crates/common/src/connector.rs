use crate::{ErrorStream, Portfolio, Result, Security};

/// The three event streams a connector exposes to strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorStream {
    Error,
    ConnectionError,
    OrderRegisterFailed,
}

impl ConnectorStream {
    pub const ALL: [ConnectorStream; 3] = [
        ConnectorStream::Error,
        ConnectorStream::ConnectionError,
        ConnectorStream::OrderRegisterFailed,
    ];
}

/// Abstraction over the trading venue connection.
///
/// `PaperConnector` implements this for simulation. Strategies share a
/// connector through `Arc<dyn Connector>` and never own it.
///
/// Every successful `register_*` call must be paired with exactly one
/// `unregister_*` call for the same entity.
pub trait Connector: Send + Sync {
    /// Subscribe to security info updates.
    fn register_security(&self, security: &Security) -> Result<()>;

    fn unregister_security(&self, security: &Security) -> Result<()>;

    /// Subscribe to the order book of a security.
    fn register_market_depth(&self, security: &Security) -> Result<()>;

    fn unregister_market_depth(&self, security: &Security) -> Result<()>;

    /// Subscribe to portfolio and position updates.
    fn register_portfolio(&self, portfolio: &Portfolio) -> Result<()>;

    fn unregister_portfolio(&self, portfolio: &Portfolio) -> Result<()>;

    /// The requested error stream. Observers attached here may be invoked
    /// from the connector's own threads.
    fn stream(&self, stream: ConnectorStream) -> &ErrorStream;
}
