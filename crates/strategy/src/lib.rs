pub mod config;
pub mod lifecycle;

pub use config::{RegistrationConfig, StrategyConfig, StrategyFileConfig, StrategySettings};
pub use lifecycle::StrategyLifecycle;

use common::Result;

/// All strategy implementations must satisfy this trait.
///
/// Implementors embed a `StrategyLifecycle` and override the engine hooks.
/// The engine only ever calls `start` and `stop`, which run the lifecycle
/// bookkeeping before handing over to `on_started` / `on_stopped`.
pub trait Strategy: Send + Sync {
    fn lifecycle(&self) -> &StrategyLifecycle;

    fn lifecycle_mut(&mut self) -> &mut StrategyLifecycle;

    /// Human-readable name of this strategy instance.
    fn name(&self) -> &str {
        self.lifecycle().name()
    }

    /// Engine start hook. Error observers are already attached.
    fn on_started(&mut self) {}

    /// Engine stop hook. Runs after entity release, whatever its outcome.
    fn on_stopped(&mut self) {}

    fn start(&mut self) {
        if self.lifecycle_mut().on_start() {
            self.on_started();
        }
    }

    fn stop(&mut self) -> Result<()> {
        let released = self.lifecycle_mut().on_stop();
        self.on_stopped();
        released
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use common::{NoopNotifier, Portfolio, Security, StrategyState};
    use paper::{ConnectorCall, PaperConnector};

    /// Parent that composes one child and tracks engine hook calls.
    struct Spread {
        lifecycle: StrategyLifecycle,
        leg: Leg,
        started: usize,
        stopped: usize,
    }

    struct Leg {
        lifecycle: StrategyLifecycle,
        stopped: usize,
    }

    impl Strategy for Leg {
        fn lifecycle(&self) -> &StrategyLifecycle {
            &self.lifecycle
        }

        fn lifecycle_mut(&mut self) -> &mut StrategyLifecycle {
            &mut self.lifecycle
        }

        fn on_stopped(&mut self) {
            self.stopped += 1;
        }
    }

    impl Spread {
        fn new() -> Self {
            let settings = StrategySettings::default();
            let lifecycle =
                StrategyLifecycle::new("spread", settings.clone(), Arc::new(NoopNotifier));
            let leg = Leg {
                lifecycle: StrategyLifecycle::new("leg", settings, Arc::new(NoopNotifier)),
                stopped: 0,
            };
            lifecycle.mark_as_managed_child(&leg.lifecycle).unwrap();
            Self {
                lifecycle,
                leg,
                started: 0,
                stopped: 0,
            }
        }
    }

    impl Strategy for Spread {
        fn lifecycle(&self) -> &StrategyLifecycle {
            &self.lifecycle
        }

        fn lifecycle_mut(&mut self) -> &mut StrategyLifecycle {
            &mut self.lifecycle
        }

        fn on_started(&mut self) {
            self.started += 1;
            self.leg.start();
        }

        fn on_stopped(&mut self) {
            self.stopped += 1;
            let _ = self.leg.stop();
        }
    }

    #[test]
    fn bind_register_start_stop_scenario() {
        let connector = Arc::new(PaperConnector::new());
        let mut strategy = Spread::new();
        let sec_b = Security::new("SecB");
        let pf_b = Portfolio::new("PfB");

        strategy
            .lifecycle_mut()
            .bind_entities(
                Some(connector.clone()),
                Some(Security::new("SecA")),
                Some(Portfolio::new("PfA")),
            )
            .unwrap();
        strategy
            .lifecycle_mut()
            .register_entities(&[sec_b.clone()], &[], &[pf_b.clone()])
            .unwrap();
        assert_eq!(
            connector.journal(),
            vec![
                ConnectorCall::RegisterSecurity(sec_b.clone()),
                ConnectorCall::RegisterPortfolio(pf_b.clone()),
            ]
        );

        strategy.start();
        assert!(strategy.lifecycle().check_ready_to_work().is_ok());
        assert_eq!(strategy.lifecycle().state(), StrategyState::Started);

        strategy.stop().unwrap();
        assert_eq!(
            connector.journal()[2..],
            [
                ConnectorCall::UnregisterSecurity(sec_b),
                ConnectorCall::UnregisterPortfolio(pf_b),
            ]
        );
        assert_eq!((strategy.started, strategy.stopped), (1, 1));
    }

    #[test]
    fn managed_child_stop_still_runs_engine_hook() {
        let mut strategy = Spread::new();

        strategy.leg.stop().unwrap();

        assert_eq!(strategy.leg.stopped, 1);
        assert_eq!(strategy.leg.lifecycle().state(), StrategyState::Stopped);
    }

    #[test]
    fn engine_hook_runs_even_when_release_fails() {
        let mut leg = Leg {
            lifecycle: StrategyLifecycle::new(
                "lonely",
                StrategySettings::default(),
                Arc::new(NoopNotifier),
            ),
            stopped: 0,
        };

        assert!(leg.stop().is_err());
        assert_eq!(leg.stopped, 1);
    }

    #[test]
    fn double_start_runs_engine_hook_once() {
        let mut strategy = Spread::new();
        strategy.start();
        strategy.start();
        assert_eq!(strategy.started, 1);
    }
}
