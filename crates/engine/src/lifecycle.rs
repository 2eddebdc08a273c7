use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};

use common::{EngineCommand, StrategyState};
use strategy::Strategy;

/// Cloneable handle passed to whoever controls the strategy (binary, operator UI).
#[derive(Clone)]
pub struct RunnerHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    state: Arc<RwLock<StrategyState>>,
}

impl RunnerHandle {
    pub async fn send(&self, cmd: EngineCommand) {
        let _ = self.command_tx.send(cmd).await;
    }

    pub async fn state(&self) -> StrategyState {
        *self.state.read().await
    }
}

/// Drives one strategy's start/stop transitions from a command channel.
///
/// The runner takes ownership of a strategy whose setup is already complete,
/// so binding and registration always happen before the first start.
pub struct StrategyRunner {
    strategy: Box<dyn Strategy>,
    state: Arc<RwLock<StrategyState>>,
    command_rx: mpsc::Receiver<EngineCommand>,
}

impl StrategyRunner {
    pub fn new(strategy: Box<dyn Strategy>) -> (Self, RunnerHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let state = Arc::new(RwLock::new(strategy.lifecycle().state()));

        let handle = RunnerHandle {
            command_tx,
            state: state.clone(),
        };

        let runner = StrategyRunner {
            strategy,
            state,
            command_rx,
        };

        (runner, handle)
    }

    /// Run the command loop. Call from `tokio::spawn`. Returns the strategy
    /// once every handle is dropped, stopping it first if it is running.
    pub async fn run(mut self) -> Box<dyn Strategy> {
        info!(strategy = %self.strategy.name(), "StrategyRunner waiting for Start command");

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                EngineCommand::Start => {
                    if *self.state.read().await == StrategyState::Started {
                        info!(strategy = %self.strategy.name(), "Strategy already running");
                        continue;
                    }
                    if let Err(e) = self.strategy.lifecycle().check_ready_to_work() {
                        // Starting anyway; trading logic guards itself with the same check.
                        warn!(
                            strategy = %self.strategy.name(),
                            error = %e,
                            "Starting strategy that is not ready"
                        );
                    }
                    self.strategy.start();
                }
                EngineCommand::Stop => {
                    if *self.state.read().await != StrategyState::Started {
                        warn!(
                            strategy = %self.strategy.name(),
                            "Stop received but strategy is not running"
                        );
                        continue;
                    }
                    self.stop_strategy();
                }
            }
            self.publish_state().await;
        }

        if *self.state.read().await == StrategyState::Started {
            warn!(
                strategy = %self.strategy.name(),
                "Runner command channel closed; stopping strategy"
            );
            self.stop_strategy();
            self.publish_state().await;
        }
        self.strategy
    }

    fn stop_strategy(&mut self) {
        if let Err(e) = self.strategy.stop() {
            error!(strategy = %self.strategy.name(), error = %e, "Strategy stopped with errors");
        }
    }

    async fn publish_state(&self) {
        *self.state.write().await = self.strategy.lifecycle().state();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{NoopNotifier, Portfolio, Security};
    use paper::PaperConnector;
    use strategy::{StrategyLifecycle, StrategySettings};

    struct Idle {
        lifecycle: StrategyLifecycle,
    }

    impl Strategy for Idle {
        fn lifecycle(&self) -> &StrategyLifecycle {
            &self.lifecycle
        }

        fn lifecycle_mut(&mut self) -> &mut StrategyLifecycle {
            &mut self.lifecycle
        }
    }

    fn ready_strategy(connector: Arc<PaperConnector>) -> Box<dyn Strategy> {
        let mut lifecycle =
            StrategyLifecycle::new("idle", StrategySettings::default(), Arc::new(NoopNotifier));
        lifecycle
            .bind_entities(
                Some(connector),
                Some(Security::new("SecA")),
                Some(Portfolio::new("PfA")),
            )
            .unwrap();
        lifecycle
            .register_entities(&[Security::new("SecB")], &[Security::new("SecA")], &[])
            .unwrap();
        Box::new(Idle { lifecycle })
    }

    async fn wait_for(handle: &RunnerHandle, want: StrategyState) {
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while handle.state().await != want {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timeout waiting for state");
    }

    #[tokio::test]
    async fn runner_starts_and_stops_strategy() {
        let connector = Arc::new(PaperConnector::new());
        let (runner, handle) = StrategyRunner::new(ready_strategy(connector.clone()));
        assert_eq!(handle.state().await, StrategyState::Registered);

        tokio::spawn(runner.run());

        handle.send(EngineCommand::Start).await;
        wait_for(&handle, StrategyState::Started).await;
        assert_eq!(connector.active_subscriptions(), 2);

        handle.send(EngineCommand::Stop).await;
        wait_for(&handle, StrategyState::Stopped).await;
        assert_eq!(connector.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn closing_channel_stops_running_strategy() {
        let connector = Arc::new(PaperConnector::new());
        let (runner, handle) = StrategyRunner::new(ready_strategy(connector.clone()));
        let task = tokio::spawn(runner.run());

        handle.send(EngineCommand::Start).await;
        wait_for(&handle, StrategyState::Started).await;
        drop(handle);

        let strategy = task.await.unwrap();
        assert_eq!(strategy.lifecycle().state(), StrategyState::Stopped);
        assert_eq!(connector.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn stop_before_start_is_ignored() {
        let connector = Arc::new(PaperConnector::new());
        let (runner, handle) = StrategyRunner::new(ready_strategy(connector.clone()));
        let task = tokio::spawn(runner.run());

        handle.send(EngineCommand::Stop).await;
        drop(handle);

        let strategy = task.await.unwrap();
        assert_eq!(strategy.lifecycle().state(), StrategyState::Registered);
        assert_eq!(connector.active_subscriptions(), 2);
    }
}
