// Exposition module - keeps the latest cycle of every collector and renders it
//
// This module is responsible for:
// 1. Registering the descriptors of every collector before polling starts
// 2. Replacing the samples of a (device, collector) pair after each cycle
// 3. Rendering the Prometheus text format for the /metrics endpoint
//
// Only samples whose descriptor was registered are exposed, and a descriptor
// plus label set appears at most once per scrape.

use chrono::{DateTime, Utc};
use prometheus::proto::{self, LabelPair, Metric, MetricFamily, MetricType};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::metrics::descriptor::Descriptor;
use crate::metrics::sample::{MetricKind, Sample};
use crate::metrics::schema::NAMESPACE;
use crate::metrics::{CollectReport, RouterCollector};

/// Errors raised while registering or rendering metrics
#[derive(Error, Debug)]
pub enum ExpositionError {
    #[error("Descriptor registered twice: {0}")]
    DuplicateDescriptor(String),

    #[error("Failed to encode metrics: {0}")]
    EncodeError(#[from] prometheus::Error),

    #[error("Encoded metrics are not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Result of one collection cycle of one collector against one device
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub samples: Vec<Sample>,
    pub success: bool,
    pub records: usize,
    pub field_errors: usize,
    pub duration: Duration,
    pub collected_at: DateTime<Utc>,
}

impl CycleOutcome {
    pub fn succeeded(samples: Vec<Sample>, report: &CollectReport, duration: Duration) -> Self {
        CycleOutcome {
            samples,
            success: true,
            records: report.records,
            field_errors: report.diagnostics.len(),
            duration,
            collected_at: Utc::now(),
        }
    }

    /// A failed fetch exposes nothing for the pair until the next good cycle
    pub fn failed(duration: Duration) -> Self {
        CycleOutcome {
            samples: Vec::new(),
            success: false,
            records: 0,
            field_errors: 0,
            duration,
            collected_at: Utc::now(),
        }
    }
}

/// Last cycle of a (device, collector) pair, as shown on /status
#[derive(Debug, Clone, Serialize)]
pub struct CycleStatus {
    pub device: String,
    pub collector: String,
    pub success: bool,
    pub records: usize,
    pub samples: usize,
    pub field_errors: usize,
    pub duration_seconds: f64,
    pub collected_at: DateTime<Utc>,
}

/// Latest samples of every (device, collector) pair
pub struct MetricStore {
    descriptors: RwLock<Vec<Arc<Descriptor>>>,
    cycles: RwLock<BTreeMap<(String, String), CycleOutcome>>,
    scrape_success: Arc<Descriptor>,
    scrape_duration: Arc<Descriptor>,
}

impl MetricStore {
    /// Creates a store with the scrape health descriptors registered
    pub fn new() -> Self {
        let scrape_success = Arc::new(Descriptor::new(
            format!("{}_scrape_collector_success", NAMESPACE),
            "Whether the last collection cycle of a collector succeeded",
            &["device", "collector"],
        ));
        let scrape_duration = Arc::new(Descriptor::new(
            format!("{}_scrape_collector_duration_seconds", NAMESPACE),
            "Duration of the last collection cycle of a collector",
            &["device", "collector"],
        ));

        MetricStore {
            descriptors: RwLock::new(vec![
                Arc::clone(&scrape_success),
                Arc::clone(&scrape_duration),
            ]),
            cycles: RwLock::new(BTreeMap::new()),
            scrape_success,
            scrape_duration,
        }
    }

    /// Registers every descriptor a collector declares.
    ///
    /// # Returns
    /// * `Ok(count)` - number of descriptors registered
    /// * `Err(ExpositionError::DuplicateDescriptor)` - a metric name is already taken
    pub async fn register(&self, collector: &dyn RouterCollector) -> Result<usize, ExpositionError> {
        let mut declared = Vec::new();
        collector.describe(&mut declared);

        let mut descriptors = self.descriptors.write().await;
        for desc in &declared {
            let taken = descriptors.iter().any(|d| d.name() == desc.name())
                || declared.iter().filter(|d| d.name() == desc.name()).count() > 1;
            if taken {
                return Err(ExpositionError::DuplicateDescriptor(desc.name().to_string()));
            }
        }

        debug!(
            "Registered {} descriptor(s) for collector '{}'",
            declared.len(),
            collector.name()
        );
        let count = declared.len();
        descriptors.extend(declared);
        Ok(count)
    }

    /// Replaces the last cycle of a (device, collector) pair
    pub async fn publish(&self, device: &str, collector: &str, outcome: CycleOutcome) {
        self.cycles
            .write()
            .await
            .insert((device.to_string(), collector.to_string()), outcome);
    }

    /// Builds the metric families of the current snapshot.
    ///
    /// Families are returned in registration order; families without samples
    /// are left out.
    pub async fn gather(&self) -> Vec<MetricFamily> {
        let descriptors = self.descriptors.read().await;
        let cycles = self.cycles.read().await;

        let mut families: Vec<MetricFamily> = descriptors
            .iter()
            .map(|desc| {
                let mut family = MetricFamily::default();
                family.set_name(desc.name().to_string());
                family.set_help(desc.help().to_string());
                family
            })
            .collect();
        let index: HashMap<&str, usize> = descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name(), i))
            .collect();

        let mut seen: HashSet<(&str, &[String])> = HashSet::new();

        for ((device, collector), outcome) in cycles.iter() {
            let health = [device.clone(), collector.clone()];
            let success = if outcome.success { 1.0 } else { 0.0 };
            push_sample(
                &mut families[index[self.scrape_success.name()]],
                &self.scrape_success,
                MetricKind::Gauge,
                success,
                &health,
            );
            push_sample(
                &mut families[index[self.scrape_duration.name()]],
                &self.scrape_duration,
                MetricKind::Gauge,
                outcome.duration.as_secs_f64(),
                &health,
            );

            for sample in &outcome.samples {
                let name = sample.descriptor.name();
                let Some(&i) = index.get(name) else {
                    warn!("Dropping sample for unregistered metric {}", name);
                    continue;
                };
                if *descriptors[i] != *sample.descriptor
                    || sample.label_values.len() != sample.descriptor.label_names().len()
                {
                    warn!(
                        "Dropping sample for {} from {}: label schema mismatch",
                        sample.descriptor, device
                    );
                    continue;
                }
                if !seen.insert((name, sample.label_values.as_slice())) {
                    warn!(
                        "Dropping duplicate sample for {}{:?} from {}",
                        name, sample.label_values, device
                    );
                    continue;
                }

                push_sample(
                    &mut families[i],
                    &sample.descriptor,
                    sample.kind,
                    sample.value,
                    &sample.label_values,
                );
            }
        }

        families
            .into_iter()
            .filter(|family| !family.get_metric().is_empty())
            .collect()
    }

    /// Renders the current snapshot in the Prometheus text format
    pub async fn render(&self) -> Result<String, ExpositionError> {
        let families = self.gather().await;
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Last cycle of every (device, collector) pair
    pub async fn status(&self) -> Vec<CycleStatus> {
        self.cycles
            .read()
            .await
            .iter()
            .map(|((device, collector), outcome)| CycleStatus {
                device: device.clone(),
                collector: collector.clone(),
                success: outcome.success,
                records: outcome.records,
                samples: outcome.samples.len(),
                field_errors: outcome.field_errors,
                duration_seconds: outcome.duration.as_secs_f64(),
                collected_at: outcome.collected_at,
            })
            .collect()
    }
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new()
    }
}

fn push_sample(
    family: &mut MetricFamily,
    descriptor: &Descriptor,
    kind: MetricKind,
    value: f64,
    label_values: &[String],
) {
    let labels: Vec<LabelPair> = descriptor
        .label_names()
        .iter()
        .zip(label_values)
        .map(|(name, value)| {
            let mut pair = LabelPair::default();
            pair.set_name(name.clone());
            pair.set_value(value.clone());
            pair
        })
        .collect();

    let mut metric = Metric::default();
    metric.set_label(labels.into());
    match kind {
        MetricKind::Gauge => {
            let mut gauge = proto::Gauge::default();
            gauge.set_value(value);
            metric.set_gauge(gauge);
            family.set_field_type(MetricType::GAUGE);
        }
        MetricKind::Counter => {
            let mut counter = proto::Counter::default();
            counter.set_value(value);
            metric.set_counter(counter);
            family.set_field_type(MetricType::COUNTER);
        }
    }
    family.mut_metric().push(metric);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::collector::SchemaCollector;
    use crate::metrics::schema::{CAPSMAN, CAPSMAN_LEGACY};

    async fn store_with_capsman() -> (MetricStore, Vec<Arc<Descriptor>>) {
        let store = MetricStore::new();
        let collector = SchemaCollector::new(&CAPSMAN);
        store.register(&collector).await.unwrap();

        let mut descriptors = Vec::new();
        collector.describe(&mut descriptors);
        (store, descriptors)
    }

    fn sample(desc: &Arc<Descriptor>, kind: MetricKind, value: f64, mac: &str) -> Sample {
        Sample {
            descriptor: Arc::clone(desc),
            kind,
            value,
            label_values: ["ap-1", "10.0.0.1", "wlan1", mac, "net1"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    fn outcome(samples: Vec<Sample>) -> CycleOutcome {
        CycleOutcome::succeeded(samples, &CollectReport::default(), Duration::from_millis(250))
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let store = MetricStore::new();
        let current = SchemaCollector::new(&CAPSMAN);
        let legacy = SchemaCollector::new(&CAPSMAN_LEGACY);

        assert_eq!(store.register(&current).await.unwrap(), 8);
        assert_eq!(store.register(&legacy).await.unwrap(), 5);
        assert!(matches!(
            store.register(&current).await,
            Err(ExpositionError::DuplicateDescriptor(_))
        ));
    }

    #[tokio::test]
    async fn test_render_text_format() {
        let (store, descriptors) = store_with_capsman().await;
        let tx_signal = &descriptors[1];
        let tx_bytes = &descriptors[6];

        store
            .publish(
                "ap-1",
                "capsman",
                outcome(vec![
                    sample(tx_signal, MetricKind::Gauge, -40.0, "AA:BB"),
                    sample(tx_bytes, MetricKind::Counter, 1000.0, "AA:BB"),
                ]),
            )
            .await;

        let text = store.render().await.unwrap();
        assert!(text.contains("# TYPE mikrotik_capsman_tx_signal gauge"));
        assert!(text.contains(
            r#"mikrotik_capsman_tx_signal{name="ap-1",address="10.0.0.1",interface="wlan1",mac_address="AA:BB",ssid="net1"} -40"#
        ));
        assert!(text.contains("# TYPE mikrotik_capsman_tx_bytes counter"));
        assert!(text.contains(r#"mikrotik_scrape_collector_success{device="ap-1",collector="capsman"} 1"#));
        assert!(!text.contains("mikrotik_capsman_rx_bytes"));
    }

    #[tokio::test]
    async fn test_failed_cycle_replaces_samples() {
        let (store, descriptors) = store_with_capsman().await;
        store
            .publish(
                "ap-1",
                "capsman",
                outcome(vec![sample(&descriptors[0], MetricKind::Gauge, 54.0, "AA")]),
            )
            .await;
        store
            .publish("ap-1", "capsman", CycleOutcome::failed(Duration::from_secs(1)))
            .await;

        let families = store.gather().await;
        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        assert_eq!(
            names,
            vec![
                "mikrotik_scrape_collector_success",
                "mikrotik_scrape_collector_duration_seconds"
            ]
        );
        assert_eq!(families[0].get_metric()[0].get_gauge().get_value(), 0.0);
    }

    #[tokio::test]
    async fn test_unregistered_and_duplicate_samples_are_dropped() {
        let (store, descriptors) = store_with_capsman().await;
        let stranger = Arc::new(Descriptor::new("other_metric", "not registered", &["name"]));

        store
            .publish(
                "ap-1",
                "capsman",
                outcome(vec![
                    sample(&descriptors[0], MetricKind::Gauge, 1.0, "AA"),
                    sample(&descriptors[0], MetricKind::Gauge, 2.0, "AA"),
                    sample(&descriptors[0], MetricKind::Gauge, 3.0, "BB"),
                    Sample {
                        descriptor: stranger,
                        kind: MetricKind::Gauge,
                        value: 4.0,
                        label_values: vec!["ap-1".to_string()],
                    },
                ]),
            )
            .await;

        let families = store.gather().await;
        let tx_rate = families
            .iter()
            .find(|f| f.get_name() == "mikrotik_capsman_tx_rate")
            .unwrap();
        let values: Vec<f64> = tx_rate
            .get_metric()
            .iter()
            .map(|m| m.get_gauge().get_value())
            .collect();
        assert_eq!(values, vec![1.0, 3.0]);
        assert!(families.iter().all(|f| f.get_name() != "other_metric"));
    }

    #[tokio::test]
    async fn test_status() {
        let (store, descriptors) = store_with_capsman().await;
        store
            .publish(
                "ap-1",
                "capsman",
                outcome(vec![sample(&descriptors[0], MetricKind::Gauge, 1.0, "AA")]),
            )
            .await;

        let status = store.status().await;
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].device, "ap-1");
        assert!(status[0].success);
        assert_eq!(status[0].samples, 1);
        assert_eq!(status[0].duration_seconds, 0.25);
    }
}
