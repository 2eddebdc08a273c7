use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use common::{
    Connector, ConnectorStream, Error, ErrorSource, ErrorStream, ObservedError, Portfolio, Result,
    Security,
};

/// One call received by the paper connector, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorCall {
    RegisterSecurity(Security),
    UnregisterSecurity(Security),
    RegisterMarketDepth(Security),
    UnregisterMarketDepth(Security),
    RegisterPortfolio(Portfolio),
    UnregisterPortfolio(Portfolio),
}

impl ConnectorCall {
    pub fn is_register(&self) -> bool {
        matches!(
            self,
            ConnectorCall::RegisterSecurity(_)
                | ConnectorCall::RegisterMarketDepth(_)
                | ConnectorCall::RegisterPortfolio(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Feed {
    Security,
    MarketDepth,
    Portfolio,
}

#[derive(Default)]
struct Ledger {
    /// Live subscription count per (feed, code).
    subscriptions: HashMap<(Feed, String), usize>,
    journal: Vec<ConnectorCall>,
    rejected: HashSet<String>,
}

/// Simulated connector for paper trading.
///
/// Subscriptions are reference-counted per entity, so two strategies may
/// register the same security. No real venue is ever contacted.
pub struct PaperConnector {
    ledger: Mutex<Ledger>,
    errors: ErrorStream,
    connection_errors: ErrorStream,
    order_register_failures: ErrorStream,
}

impl PaperConnector {
    pub fn new() -> Self {
        info!("PaperConnector initialized");
        Self {
            ledger: Mutex::new(Ledger::default()),
            errors: ErrorStream::new(),
            connection_errors: ErrorStream::new(),
            order_register_failures: ErrorStream::new(),
        }
    }

    /// Make every later registration of `code` fail.
    pub fn reject(&self, code: impl Into<String>) {
        self.ledger.lock().rejected.insert(code.into());
    }

    /// Publish an error on one of the connector's streams.
    pub fn emit(&self, stream: ConnectorStream, message: impl Into<String>) {
        let source = match stream {
            ConnectorStream::Error => ErrorSource::Connector,
            ConnectorStream::ConnectionError => ErrorSource::Connection,
            ConnectorStream::OrderRegisterFailed => ErrorSource::OrderRegistration,
        };
        self.stream(stream).emit(&ObservedError::new(source, message));
    }

    /// Every call received so far, oldest first.
    pub fn journal(&self) -> Vec<ConnectorCall> {
        self.ledger.lock().journal.clone()
    }

    pub fn is_security_registered(&self, security: &Security) -> bool {
        self.count(Feed::Security, &security.code) > 0
    }

    pub fn is_market_depth_registered(&self, security: &Security) -> bool {
        self.count(Feed::MarketDepth, &security.code) > 0
    }

    pub fn is_portfolio_registered(&self, portfolio: &Portfolio) -> bool {
        self.count(Feed::Portfolio, &portfolio.name) > 0
    }

    /// Number of live subscriptions across all feeds.
    pub fn active_subscriptions(&self) -> usize {
        self.ledger.lock().subscriptions.values().sum()
    }

    fn count(&self, feed: Feed, code: &str) -> usize {
        self.ledger
            .lock()
            .subscriptions
            .get(&(feed, code.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn register(&self, feed: Feed, code: &str, call: ConnectorCall) -> Result<()> {
        let mut ledger = self.ledger.lock();
        ledger.journal.push(call);
        if ledger.rejected.contains(code) {
            warn!(feed = ?feed, code = %code, "Paper registration rejected");
            return Err(Error::Connector(format!(
                "PaperConnector refused to register {feed:?} '{code}'"
            )));
        }
        *ledger
            .subscriptions
            .entry((feed, code.to_string()))
            .or_default() += 1;
        debug!(feed = ?feed, code = %code, "Paper subscription added");
        Ok(())
    }

    fn unregister(&self, feed: Feed, code: &str, call: ConnectorCall) -> Result<()> {
        let mut ledger = self.ledger.lock();
        ledger.journal.push(call);
        let key = (feed, code.to_string());
        let remaining = match ledger.subscriptions.get_mut(&key) {
            Some(count) => {
                *count -= 1;
                *count
            }
            None => {
                return Err(Error::Connector(format!(
                    "{feed:?} '{code}' is not registered"
                )))
            }
        };
        if remaining == 0 {
            ledger.subscriptions.remove(&key);
        }
        debug!(feed = ?feed, code = %code, "Paper subscription released");
        Ok(())
    }
}

impl Default for PaperConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for PaperConnector {
    fn register_security(&self, security: &Security) -> Result<()> {
        self.register(
            Feed::Security,
            &security.code,
            ConnectorCall::RegisterSecurity(security.clone()),
        )
    }

    fn unregister_security(&self, security: &Security) -> Result<()> {
        self.unregister(
            Feed::Security,
            &security.code,
            ConnectorCall::UnregisterSecurity(security.clone()),
        )
    }

    fn register_market_depth(&self, security: &Security) -> Result<()> {
        self.register(
            Feed::MarketDepth,
            &security.code,
            ConnectorCall::RegisterMarketDepth(security.clone()),
        )
    }

    fn unregister_market_depth(&self, security: &Security) -> Result<()> {
        self.unregister(
            Feed::MarketDepth,
            &security.code,
            ConnectorCall::UnregisterMarketDepth(security.clone()),
        )
    }

    fn register_portfolio(&self, portfolio: &Portfolio) -> Result<()> {
        self.register(
            Feed::Portfolio,
            &portfolio.name,
            ConnectorCall::RegisterPortfolio(portfolio.clone()),
        )
    }

    fn unregister_portfolio(&self, portfolio: &Portfolio) -> Result<()> {
        self.unregister(
            Feed::Portfolio,
            &portfolio.name,
            ConnectorCall::UnregisterPortfolio(portfolio.clone()),
        )
    }

    fn stream(&self, stream: ConnectorStream) -> &ErrorStream {
        match stream {
            ConnectorStream::Error => &self.errors,
            ConnectorStream::ConnectionError => &self.connection_errors,
            ConnectorStream::OrderRegisterFailed => &self.order_register_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn paper_subscription_is_reference_counted() {
        let connector = PaperConnector::new();
        let sec = Security::new("SBER");

        connector.register_security(&sec).unwrap();
        connector.register_security(&sec).unwrap();
        connector.unregister_security(&sec).unwrap();
        assert!(connector.is_security_registered(&sec));

        connector.unregister_security(&sec).unwrap();
        assert!(!connector.is_security_registered(&sec));
        assert_eq!(connector.active_subscriptions(), 0);
    }

    #[test]
    fn paper_unregister_without_register_fails() {
        let connector = PaperConnector::new();
        let pf = Portfolio::new("demo");

        let err = connector.unregister_portfolio(&pf).unwrap_err();
        assert!(matches!(err, Error::Connector(_)));
    }

    #[test]
    fn paper_feeds_are_independent() {
        let connector = PaperConnector::new();
        let sec = Security::new("GAZP");

        connector.register_market_depth(&sec).unwrap();
        assert!(connector.is_market_depth_registered(&sec));
        assert!(!connector.is_security_registered(&sec));
        assert!(connector.unregister_security(&sec).is_err());
    }

    #[test]
    fn paper_rejected_code_fails_but_is_journaled() {
        let connector = PaperConnector::new();
        connector.reject("BAD");
        let bad = Security::new("BAD");

        assert!(connector.register_security(&bad).is_err());
        assert!(!connector.is_security_registered(&bad));
        assert_eq!(connector.journal(), vec![ConnectorCall::RegisterSecurity(bad)]);
    }

    #[test]
    fn paper_emit_reaches_matching_stream_only() {
        let connector = PaperConnector::new();
        let seen: Arc<Mutex<Vec<ObservedError>>> = Arc::default();
        {
            let seen = seen.clone();
            connector
                .stream(ConnectorStream::ConnectionError)
                .subscribe(Arc::new(move |e: &ObservedError| seen.lock().push(e.clone())));
        }

        connector.emit(ConnectorStream::Error, "ignored");
        connector.emit(ConnectorStream::ConnectionError, "socket closed");

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].source, ErrorSource::Connection);
        assert_eq!(seen[0].message, "socket closed");
    }
}
