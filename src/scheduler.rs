// Scheduler module - drives periodic collection cycles
//
// Every (device, collector) pair runs in its own Tokio task on the configured
// interval, with its own collection context and sample batch.
//
// # Architecture
// - Uses Tokio's interval timer for periodic execution
// - Tasks run concurrently and independently
// - A failed cycle affects only its own pair, and only until the next tick

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::exposition::{CycleOutcome, MetricStore};
use crate::metrics::sample::SampleBatch;
use crate::metrics::{CollectorContext, Device, RouterCollector};
use crate::routeros::RouterClient;

/// A polled device and its connection
#[derive(Clone)]
pub struct DeviceTarget {
    pub device: Device,
    pub client: Arc<dyn RouterClient>,
}

/// Collection scheduler that manages the periodic tasks
pub struct MetricScheduler {
    targets: Vec<DeviceTarget>,

    /// Exposition store every cycle publishes into
    store: Arc<MetricStore>,

    /// Time between two cycles of the same pair
    poll_interval: Duration,
}

impl MetricScheduler {
    /// Creates a new MetricScheduler instance
    ///
    /// # Arguments
    /// * `targets` - Devices to poll, each with its client
    /// * `store` - Exposition store the results are published to
    /// * `poll_interval` - Time between two cycles of the same pair
    pub fn new(targets: Vec<DeviceTarget>, store: Arc<MetricStore>, poll_interval: Duration) -> Self {
        MetricScheduler {
            targets,
            store,
            poll_interval,
        }
    }

    /// Starts one task per (device, collector) pair and waits for them
    ///
    /// Tasks run until the program is terminated; collection errors are
    /// logged and never stop a task.
    pub async fn start(self, collectors: Vec<Arc<dyn RouterCollector>>) {
        let mut handles = Vec::new();

        for target in &self.targets {
            for collector in &collectors {
                info!(
                    "Scheduling collector '{}' for device '{}' every {}s",
                    collector.name(),
                    target.device.name,
                    self.poll_interval.as_secs()
                );

                let target = target.clone();
                let collector = Arc::clone(collector);
                let store = Arc::clone(&self.store);
                let poll_interval = self.poll_interval;

                handles.push(tokio::spawn(async move {
                    Self::run_collector_task(target, collector, store, poll_interval).await;
                }));
            }
        }

        info!("Started {} collection task(s)", handles.len());

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Collection task panicked: {}", e);
            }
        }

        error!("All collection tasks have stopped");
    }

    /// Runs the collection loop of one pair forever
    async fn run_collector_task(
        target: DeviceTarget,
        collector: Arc<dyn RouterCollector>,
        store: Arc<MetricStore>,
        poll_interval: Duration,
    ) {
        // A device slower than the interval must not trigger a burst of catch-up cycles
        let mut timer = interval(poll_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            timer.tick().await;
            Self::run_cycle(&target, collector.as_ref(), &store).await;
        }
    }

    /// Runs a single cycle of `collector` against `target` and publishes the result
    ///
    /// # Returns
    /// `true` if the device fetch succeeded
    pub async fn run_cycle(
        target: &DeviceTarget,
        collector: &dyn RouterCollector,
        store: &MetricStore,
    ) -> bool {
        let batch = SampleBatch::new();
        let started = Instant::now();

        let ctx = CollectorContext {
            device: &target.device,
            client: target.client.as_ref(),
            sink: &batch,
        };
        let result = collector.collect(&ctx).await;
        let elapsed = started.elapsed();

        let outcome = match result {
            Ok(report) => {
                if !report.diagnostics.is_empty() {
                    warn!(
                        "Collector '{}' skipped {} malformed field(s) on device '{}'",
                        collector.name(),
                        report.diagnostics.len(),
                        target.device.name
                    );
                }
                debug!(
                    "Collector '{}' on '{}' took {:?}",
                    collector.name(),
                    target.device.name,
                    elapsed
                );
                CycleOutcome::succeeded(batch.into_samples(), &report, elapsed)
            }
            // The collector has already logged the fetch error
            Err(_) => CycleOutcome::failed(elapsed),
        };

        let success = outcome.success;
        store
            .publish(&target.device.name, collector.name(), outcome)
            .await;
        success
    }

    /// Performs one cycle of every pair without scheduling
    ///
    /// # Returns
    /// Number of cycles whose fetch succeeded
    pub async fn collect_once(&self, collectors: &[Arc<dyn RouterCollector>]) -> usize {
        info!("Running one-time collection");

        let mut success_count = 0;
        let mut total_count = 0;

        for target in &self.targets {
            for collector in collectors {
                total_count += 1;
                if Self::run_cycle(target, collector.as_ref(), &self.store).await {
                    success_count += 1;
                }
            }
        }

        info!(
            "One-time collection complete: {}/{} cycles succeeded",
            success_count, total_count
        );

        success_count
    }
}
