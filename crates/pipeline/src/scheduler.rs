//! Periodic background tasks.

use std::sync::Arc;
use std::time::Duration;
use telemetry::health;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::ingestor::Ingestor;

/// Scheduler configuration.
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    /// Idle-session sweep interval (None = disabled)
    pub sweep_interval: Option<Duration>,
    /// Sink reachability probe interval (None = disabled)
    pub sink_probe_interval: Option<Duration>,
}

/// Runs idle-session sweeps and sink health probes.
pub struct FlushScheduler {
    config: SchedulerConfig,
    ingestor: Arc<Ingestor>,
}

impl FlushScheduler {
    pub fn new(config: SchedulerConfig, ingestor: Arc<Ingestor>) -> Self {
        Self { config, ingestor }
    }

    /// Starts the enabled tasks. Abort the handles to stop them.
    pub fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        if let Some(period) = self.config.sweep_interval {
            let scheduler = self.clone();
            handles.push(tokio::spawn(async move {
                scheduler.run_sweeper(period).await;
            }));
            info!(interval_secs = period.as_secs(), "Idle-session sweeper started");
        }

        if let Some(period) = self.config.sink_probe_interval {
            let scheduler = self.clone();
            handles.push(tokio::spawn(async move {
                scheduler.run_sink_probe(period).await;
            }));
            info!(interval_secs = period.as_secs(), "Sink probe started");
        }

        handles
    }

    async fn run_sweeper(&self, period: Duration) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let flushed = self.ingestor.sweep().await;
            if flushed > 0 {
                debug!(records = flushed, "Sweep flushed idle sessions");
            }
        }
    }

    async fn run_sink_probe(&self, period: Duration) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let sink = self.ingestor.coordinator().sink().clone();

        loop {
            ticker.tick().await;
            if sink.ping().await {
                health().sink.set_healthy();
            } else {
                warn!(sink = sink.name(), "Sink probe failed");
                health()
                    .sink
                    .set_unhealthy(format!("{} did not answer the probe", sink.name()));
            }
        }
    }
}
