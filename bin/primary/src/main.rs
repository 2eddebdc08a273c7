use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::{
    AlertSink, ChannelNotifier, Config, Connector, EngineCommand, Notifier, TracingNotifier,
};
use engine::StrategyRunner;
use paper::PaperConnector;
use strategy::{Strategy, StrategyConfig, StrategyFileConfig, StrategyLifecycle};

/// Strategy with no trading logic: verifies readiness on start and reports
/// the outcome. Useful for checking a strategy file against a connector.
struct MonitorStrategy {
    lifecycle: StrategyLifecycle,
}

impl Strategy for MonitorStrategy {
    fn lifecycle(&self) -> &StrategyLifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut StrategyLifecycle {
        &mut self.lifecycle
    }

    fn on_started(&mut self) {
        match self.lifecycle.check_ready_to_work() {
            Ok(()) => info!(
                strategy = %self.lifecycle.name(),
                security = ?self.lifecycle.security(),
                timeout_ms = self.lifecycle.settings().timeout_ms,
                "Strategy ready to work"
            ),
            Err(e) => self.lifecycle.report_error(e.to_string()),
        }
    }
}

fn build(
    cfg: &StrategyConfig,
    connector: Arc<dyn Connector>,
    notifier: Arc<dyn Notifier>,
) -> common::Result<MonitorStrategy> {
    let mut lifecycle = StrategyLifecycle::new(cfg.name.clone(), cfg.settings.clone(), notifier);
    cfg.apply(&mut lifecycle, connector)?;
    Ok(MonitorStrategy { lifecycle })
}

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    let strategy_file = StrategyFileConfig::load(&cfg.strategy_config_path).unwrap_or_else(|e| {
        panic!("Failed to load strategy config at '{}': {e}", cfg.strategy_config_path)
    });
    info!(strategies = strategy_file.strategies.len(), "Primary strategy host starting");

    // ── Connector ─────────────────────────────────────────────────────────────
    let paper = Arc::new(PaperConnector::new());
    for code in &cfg.paper_reject_codes {
        paper.reject(code.clone());
    }
    let connector: Arc<dyn Connector> = paper.clone();

    // ── Notifications ─────────────────────────────────────────────────────────
    let notifier: Arc<dyn Notifier> = match cfg.alert_sink {
        AlertSink::Log => Arc::new(TracingNotifier),
        AlertSink::Channel => {
            let (notifier, mut alert_rx) = ChannelNotifier::new();
            tokio::spawn(async move {
                while let Some(alert) = alert_rx.recv().await {
                    warn!(title = %alert.title, at = %alert.at, "{}{}", alert.label, alert.error);
                }
            });
            Arc::new(notifier)
        }
    };

    // ── Strategies ────────────────────────────────────────────────────────────
    let mut handles = Vec::new();
    let mut tasks = Vec::new();
    for strategy_cfg in &strategy_file.strategies {
        let strategy = match build(strategy_cfg, connector.clone(), notifier.clone()) {
            Ok(s) => s,
            Err(e) => {
                error!(
                    strategy = %strategy_cfg.name,
                    error = %e,
                    "Strategy setup failed; skipping"
                );
                continue;
            }
        };
        let (runner, handle) = StrategyRunner::new(Box::new(strategy));
        tasks.push(tokio::spawn(runner.run()));
        handle.send(EngineCommand::Start).await;
        handles.push(handle);
    }

    info!(running = handles.len(), "All strategies started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c().await.unwrap();
    info!("Shutdown signal received. Stopping strategies.");

    for handle in &handles {
        handle.send(EngineCommand::Stop).await;
    }
    drop(handles);
    for task in tasks {
        if let Ok(strategy) = task.await {
            info!(
                strategy = %strategy.name(),
                state = %strategy.lifecycle().state(),
                "Runner finished"
            );
        }
    }
    info!(
        live_subscriptions = paper.active_subscriptions(),
        "Exiting."
    );
}
