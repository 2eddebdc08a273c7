use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use common::{
    Connector, ConnectorStream, Error, ErrorSource, ErrorStream, Notifier, ObservedError,
    ObserverId, Portfolio, Result, Security, StrategyState, Unready,
};

use crate::config::StrategySettings;

const STRATEGY_ERROR: (&str, &str) = ("Strategy error: ", "Strategy error");

fn connector_labels(stream: ConnectorStream) -> (&'static str, &'static str) {
    match stream {
        ConnectorStream::Error => ("Connector error: ", "Connection error"),
        ConnectorStream::ConnectionError => ("Connector connection error: ", "Connection lost"),
        ConnectorStream::OrderRegisterFailed => {
            ("Connector order registration failed: ", "Order registration failed")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Created,
    Bound,
    Registered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    Idle,
    Started,
    Stopped,
}

#[derive(Debug, Clone, Default)]
struct Registered {
    securities: Vec<Security>,
    market_depths: Vec<Security>,
    portfolios: Vec<Portfolio>,
}

impl Registered {
    fn len(&self) -> usize {
        self.securities.len() + self.market_depths.len() + self.portfolios.len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An observer attached for the duration of one run.
enum Attachment {
    Internal(ObserverId),
    Connector(Arc<dyn Connector>, ConnectorStream, ObserverId),
}

/// Setup, readiness and teardown shared by every strategy.
///
/// A strategy is bound to a connector, security and portfolio, registers the
/// entities it needs, and releases them again when stopped. A parent strategy
/// may mark a child as managed, which hands the child's release duty to the
/// parent and exempts the child from readiness checks.
///
/// Errors observed while running are only reported through the `Notifier`;
/// they never stop the strategy.
pub struct StrategyLifecycle {
    id: String,
    name: String,
    settings: StrategySettings,
    connector: Option<Arc<dyn Connector>>,
    security: Option<Security>,
    portfolio: Option<Portfolio>,
    readiness: Readiness,
    phase: RunPhase,
    managed_child: AtomicBool,
    registered: Registered,
    notifier: Arc<dyn Notifier>,
    errors: ErrorStream,
    error_count: AtomicU32,
    budget_warned: AtomicBool,
    attached: Vec<Attachment>,
}

impl StrategyLifecycle {
    pub fn new(
        name: impl Into<String>,
        settings: StrategySettings,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            settings,
            connector: None,
            security: None,
            portfolio: None,
            readiness: Readiness::Created,
            phase: RunPhase::Idle,
            managed_child: AtomicBool::new(false),
            registered: Registered::default(),
            notifier,
            errors: ErrorStream::new(),
            error_count: AtomicU32::new(0),
            budget_warned: AtomicBool::new(false),
            attached: Vec::new(),
        }
    }

    // ─── Setup ────────────────────────────────────────────────────────────────

    /// Assign the connector, primary security and portfolio.
    ///
    /// All three are required. On failure nothing is assigned.
    pub fn bind_entities(
        &mut self,
        connector: Option<Arc<dyn Connector>>,
        security: Option<Security>,
        portfolio: Option<Portfolio>,
    ) -> Result<()> {
        if self.readiness == Readiness::Registered {
            return Err(Error::InvalidState(format!(
                "strategy '{}' already registered its entities; rebinding would orphan them",
                self.name
            )));
        }
        if !self.registered.is_empty() {
            return Err(Error::InvalidState(format!(
                "strategy '{}' still holds {} entities on its current connector",
                self.name,
                self.registered.len()
            )));
        }

        let security = security.filter(|s| !s.code.trim().is_empty());
        let portfolio = portfolio.filter(|p| !p.name.trim().is_empty());

        let (connector, security, portfolio) = match (connector, security, portfolio) {
            (Some(c), Some(s), Some(p)) => (c, s, p),
            (c, s, p) => {
                let missing: Vec<&str> = [
                    (c.is_none(), "connector"),
                    (s.is_none(), "security"),
                    (p.is_none(), "portfolio"),
                ]
                .into_iter()
                .filter_map(|(absent, field)| absent.then_some(field))
                .collect();
                return Err(Error::InvalidState(format!(
                    "strategy '{}' is missing required entities: {}",
                    self.name,
                    missing.join(", ")
                )));
            }
        };

        info!(
            strategy = %self.name,
            security = %security,
            portfolio = %portfolio,
            "Strategy entities bound"
        );
        self.connector = Some(connector);
        self.security = Some(security);
        self.portfolio = Some(portfolio);
        self.readiness = Readiness::Bound;
        Ok(())
    }

    /// Register every entity the strategy depends on with the bound connector.
    ///
    /// Empty slices are valid and mean the strategy needs nothing. Connector
    /// failures propagate after the entities accepted by this call are
    /// unregistered again, so a retry starts from a clean slate.
    pub fn register_entities(
        &mut self,
        securities: &[Security],
        market_depths: &[Security],
        portfolios: &[Portfolio],
    ) -> Result<()> {
        let connector = match (self.readiness, &self.connector) {
            (Readiness::Bound, Some(connector)) => connector.clone(),
            (Readiness::Registered, _) => {
                return Err(Error::InvalidState(format!(
                    "strategy '{}' already registered its entities",
                    self.name
                )))
            }
            _ => {
                return Err(Error::InvalidState(format!(
                    "strategy '{}' must bind connector, security and portfolio before registering",
                    self.name
                )))
            }
        };

        if let Err(e) =
            self.register_all(connector.as_ref(), securities, market_depths, portfolios)
        {
            warn!(strategy = %self.name, error = %e, "Registration failed; rolling back");
            self.roll_back(connector.as_ref());
            return Err(e);
        }

        info!(
            strategy = %self.name,
            securities = securities.len(),
            market_depths = market_depths.len(),
            portfolios = portfolios.len(),
            "Strategy entities registered"
        );
        self.readiness = Readiness::Registered;
        Ok(())
    }

    fn register_all(
        &mut self,
        connector: &dyn Connector,
        securities: &[Security],
        market_depths: &[Security],
        portfolios: &[Portfolio],
    ) -> Result<()> {
        for security in securities {
            connector.register_security(security)?;
            self.registered.securities.push(security.clone());
        }
        for security in market_depths {
            connector.register_market_depth(security)?;
            self.registered.market_depths.push(security.clone());
        }
        for portfolio in portfolios {
            connector.register_portfolio(portfolio)?;
            self.registered.portfolios.push(portfolio.clone());
        }
        Ok(())
    }

    /// Unregister everything accepted so far. Entities the connector refuses
    /// to release stay recorded and are retried on stop.
    fn roll_back(&mut self, connector: &dyn Connector) {
        let accepted = std::mem::take(&mut self.registered);
        let mut ignored = None;
        for security in accepted.securities {
            if !self.note_release(connector.unregister_security(&security), &mut ignored) {
                self.registered.securities.push(security);
            }
        }
        for security in accepted.market_depths {
            if !self.note_release(connector.unregister_market_depth(&security), &mut ignored) {
                self.registered.market_depths.push(security);
            }
        }
        for portfolio in accepted.portfolios {
            if !self.note_release(connector.unregister_portfolio(&portfolio), &mut ignored) {
                self.registered.portfolios.push(portfolio);
            }
        }
    }

    /// Hand `child`'s release duty to this strategy. The child skips
    /// unregistration on stop and passes readiness checks unconditionally.
    pub fn mark_as_managed_child(&self, child: &StrategyLifecycle) -> Result<()> {
        if std::ptr::eq(self, child) {
            return Err(Error::InvalidState(format!(
                "strategy '{}' cannot manage itself",
                self.name
            )));
        }
        child.managed_child.store(true, Ordering::Release);
        info!(parent = %self.name, child = %child.name, "Strategy marked as managed child");
        Ok(())
    }

    // ─── Run hooks ────────────────────────────────────────────────────────────

    /// Attach error observers for this run. Returns `false` if the strategy
    /// was already started, in which case nothing is attached.
    pub fn on_start(&mut self) -> bool {
        if self.phase == RunPhase::Started {
            warn!(strategy = %self.name, "Strategy already started; observers left as is");
            return false;
        }

        let notifier = self.notifier.clone();
        let (label, title) = STRATEGY_ERROR;
        let id = self.errors.subscribe(Arc::new(move |e: &ObservedError| {
            notifier.notify(label, &e.message, title)
        }));
        self.attached.push(Attachment::Internal(id));

        match &self.connector {
            Some(connector) => {
                for stream in ConnectorStream::ALL {
                    let notifier = self.notifier.clone();
                    let (label, title) = connector_labels(stream);
                    let id = connector.stream(stream).subscribe(Arc::new(
                        move |e: &ObservedError| notifier.notify(label, &e.message, title),
                    ));
                    self.attached
                        .push(Attachment::Connector(connector.clone(), stream, id));
                }
            }
            None => debug!(
                strategy = %self.name,
                "No connector bound; observing strategy errors only"
            ),
        }

        self.phase = RunPhase::Started;
        info!(strategy = %self.name, id = %self.id, "Strategy started");
        true
    }

    /// Detach this run's observers and release registered entities.
    ///
    /// Managed children release nothing. An unregister failure does not
    /// stop the remaining releases; the first failure is returned.
    pub fn on_stop(&mut self) -> Result<()> {
        self.detach_observers();
        self.phase = RunPhase::Stopped;

        if self.is_managed_child() {
            let orphaned = self.registered.len();
            if orphaned > 0 {
                // Registered before being marked; the parent does not know about them.
                warn!(
                    strategy = %self.name,
                    orphaned,
                    "Managed child holds entities it registered itself; they are not released"
                );
            }
            debug!(strategy = %self.name, "Managed child stopped; parent owns cleanup");
            return Ok(());
        }

        let connector = self.connector.clone().ok_or_else(|| {
            Error::InvalidState(format!(
                "cannot unregister entities of strategy '{}': connector is not bound",
                self.name
            ))
        })?;

        let registered = std::mem::take(&mut self.registered);
        let released = registered.len();
        let mut first_failure = None;

        for security in &registered.securities {
            self.note_release(connector.unregister_security(security), &mut first_failure);
        }
        for security in &registered.market_depths {
            self.note_release(connector.unregister_market_depth(security), &mut first_failure);
        }
        for portfolio in &registered.portfolios {
            self.note_release(connector.unregister_portfolio(portfolio), &mut first_failure);
        }

        info!(strategy = %self.name, released, "Strategy stopped");
        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Guard for trading logic: fails until both setup phases are done,
    /// unless this strategy is a managed child.
    pub fn check_ready_to_work(&self) -> Result<()> {
        if self.is_managed_child() {
            return Ok(());
        }
        match self.readiness {
            Readiness::Created => Err(Error::PreconditionFailed(Unready::BindingIncomplete)),
            Readiness::Bound => Err(Error::PreconditionFailed(Unready::RegistrationIncomplete)),
            Readiness::Registered => Ok(()),
        }
    }

    /// Report an error on the strategy's own stream. Delivered to the
    /// notifier while started; counted against `max_error_count` always.
    pub fn report_error(&self, message: impl Into<String>) {
        let count = self.error_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count >= self.settings.max_error_count
            && !self.budget_warned.swap(true, Ordering::Relaxed)
        {
            warn!(
                strategy = %self.name,
                count,
                "Strategy reached its error budget; it keeps running"
            );
        }
        self.errors
            .emit(&ObservedError::new(ErrorSource::Strategy, message));
    }

    fn detach_observers(&mut self) {
        for attachment in self.attached.drain(..) {
            match attachment {
                Attachment::Internal(id) => {
                    self.errors.unsubscribe(id);
                }
                Attachment::Connector(connector, stream, id) => {
                    connector.stream(stream).unsubscribe(id);
                }
            }
        }
    }

    /// Returns `true` if the entity was released.
    fn note_release(&self, result: Result<()>, first_failure: &mut Option<Error>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(strategy = %self.name, error = %e, "Failed to unregister strategy entity");
                first_failure.get_or_insert(e);
                false
            }
        }
    }

    // ─── Accessors ────────────────────────────────────────────────────────────

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &StrategySettings {
        &self.settings
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.settings.timeout_ms)
    }

    pub fn connector(&self) -> Option<&Arc<dyn Connector>> {
        self.connector.as_ref()
    }

    pub fn security(&self) -> Option<&Security> {
        self.security.as_ref()
    }

    pub fn portfolio(&self) -> Option<&Portfolio> {
        self.portfolio.as_ref()
    }

    pub fn is_managed_child(&self) -> bool {
        self.managed_child.load(Ordering::Acquire)
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Whether reported errors have reached `max_error_count`.
    pub fn error_budget_exhausted(&self) -> bool {
        self.budget_warned.load(Ordering::Relaxed)
    }

    /// Entities this strategy will release on stop, in registration order.
    pub fn registered_securities(&self) -> &[Security] {
        &self.registered.securities
    }

    pub fn registered_market_depths(&self) -> &[Security] {
        &self.registered.market_depths
    }

    pub fn registered_portfolios(&self) -> &[Portfolio] {
        &self.registered.portfolios
    }

    pub fn state(&self) -> StrategyState {
        match (self.phase, self.readiness) {
            (RunPhase::Started, _) => StrategyState::Started,
            (RunPhase::Stopped, _) => StrategyState::Stopped,
            (RunPhase::Idle, Readiness::Created) => StrategyState::Created,
            (RunPhase::Idle, Readiness::Bound) => StrategyState::Bound,
            (RunPhase::Idle, Readiness::Registered) => StrategyState::Registered,
        }
    }
}

impl std::fmt::Debug for StrategyLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyLifecycle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("managed_child", &self.is_managed_child())
            .field("registered", &self.registered)
            .finish()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
