// Record translation
//
// Applies a collector's binding table to one registration table record. Each
// binding knows its property, how to decode it and which descriptor(s) to emit
// through, so the per-record path never looks anything up by name.

use std::sync::Arc;
use tracing::warn;

use super::codec::{parse_duration, parse_scalar, parse_split_counters, ParseError};
use super::descriptor::Descriptor;
use super::sample::{MetricKind, MetricSink, Sample};
use super::Device;
use crate::routeros::Record;

/// Where the decoded value(s) of a property go
#[derive(Debug, Clone, PartialEq)]
pub enum BoundMetric {
    Gauge(Arc<Descriptor>),
    Duration(Arc<Descriptor>),
    SplitCounter {
        tx: Arc<Descriptor>,
        rx: Arc<Descriptor>,
    },
}

/// A monitored property together with its descriptor(s)
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyBinding {
    pub property: &'static str,
    pub metric: BoundMetric,
}

impl PropertyBinding {
    /// Every descriptor this binding can emit through
    pub fn descriptors(&self) -> Vec<&Arc<Descriptor>> {
        match &self.metric {
            BoundMetric::Gauge(d) | BoundMetric::Duration(d) => vec![d],
            BoundMetric::SplitCounter { tx, rx } => vec![tx, rx],
        }
    }
}

/// A field that could not be translated
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDiagnostic {
    pub property: &'static str,
    pub value: String,
    pub error: ParseError,
}

/// Outcome of translating one record
#[derive(Debug, Default, PartialEq)]
pub struct Translation {
    pub emitted: usize,
    pub diagnostics: Vec<FieldDiagnostic>,
}

/// Emits the metrics of one record.
///
/// A field that fails to parse is logged, reported in the returned
/// diagnostics and skipped; the remaining properties are still translated.
/// Empty and missing fields produce nothing.
pub fn translate(
    record: &Record,
    bindings: &[PropertyBinding],
    label_values: &[String],
    device: &Device,
    sink: &dyn MetricSink,
) -> Translation {
    let mut translation = Translation::default();

    let emit = |descriptor: &Arc<Descriptor>, kind: MetricKind, value: f64| {
        sink.accept(Sample {
            descriptor: Arc::clone(descriptor),
            kind,
            value,
            label_values: label_values.to_vec(),
        });
    };

    for binding in bindings {
        let raw = record.value(binding.property);

        let result = match &binding.metric {
            BoundMetric::Gauge(desc) => parse_scalar(raw).map(|value| match value {
                Some(v) => {
                    emit(desc, MetricKind::Gauge, v);
                    1
                }
                None => 0,
            }),
            BoundMetric::Duration(desc) => parse_duration(raw).map(|seconds| match seconds {
                Some(v) => {
                    emit(desc, MetricKind::Gauge, v);
                    1
                }
                None => 0,
            }),
            BoundMetric::SplitCounter { .. } if raw.is_empty() => Ok(0),
            BoundMetric::SplitCounter { tx, rx } => parse_split_counters(raw).map(|(t, r)| {
                emit(tx, MetricKind::Counter, t);
                emit(rx, MetricKind::Counter, r);
                2
            }),
        };

        match result {
            Ok(count) => translation.emitted += count,
            Err(error) => {
                warn!(
                    device = %device.name,
                    property = binding.property,
                    value = raw,
                    error = %error,
                    "error parsing registration table value"
                );
                translation.diagnostics.push(FieldDiagnostic {
                    property: binding.property,
                    value: raw.to_string(),
                    error,
                });
            }
        }
    }

    translation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::sample::SampleBatch;

    fn labels() -> Vec<String> {
        ["ap-1", "10.0.0.1", "wlan1", "AA:BB", "net1"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn bindings() -> Vec<PropertyBinding> {
        let names = vec!["name".to_string(), "address".to_string()];
        let (tx, rx) = Descriptor::for_split_counter("t", "bytes", &names);
        vec![
            PropertyBinding {
                property: "tx-signal",
                metric: BoundMetric::Gauge(Arc::new(Descriptor::for_property(
                    "t", "tx-signal", &names,
                ))),
            },
            PropertyBinding {
                property: "uptime",
                metric: BoundMetric::Duration(Arc::new(Descriptor::for_property(
                    "t", "uptime", &names,
                ))),
            },
            PropertyBinding {
                property: "bytes",
                metric: BoundMetric::SplitCounter {
                    tx: Arc::new(tx),
                    rx: Arc::new(rx),
                },
            },
        ]
    }

    fn device() -> Device {
        Device {
            name: "ap-1".to_string(),
            address: "10.0.0.1".to_string(),
        }
    }

    fn run(record: &Record) -> (Translation, Vec<Sample>) {
        let batch = SampleBatch::new();
        let translation = translate(record, &bindings(), &labels(), &device(), &batch);
        (translation, batch.into_samples())
    }

    #[test]
    fn test_all_kinds_emitted() {
        let record: Record = [("tx-signal", "-40"), ("uptime", "1m5s"), ("bytes", "1000,2000")]
            .into_iter()
            .collect();
        let (translation, samples) = run(&record);

        assert_eq!(translation.emitted, 4);
        assert!(translation.diagnostics.is_empty());

        let summary: Vec<(&str, MetricKind, f64)> = samples
            .iter()
            .map(|s| (s.descriptor.name(), s.kind, s.value))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("t_tx_signal", MetricKind::Gauge, -40.0),
                ("t_uptime", MetricKind::Gauge, 65.0),
                ("t_tx_bytes", MetricKind::Counter, 1000.0),
                ("t_rx_bytes", MetricKind::Counter, 2000.0),
            ]
        );
        assert!(samples.iter().all(|s| s.label_values == labels()));
    }

    #[test]
    fn test_missing_and_empty_fields_are_skipped() {
        let empty: Record = [("tx-signal", ""), ("uptime", ""), ("bytes", "")]
            .into_iter()
            .collect();
        let missing = Record::default();

        for record in [empty, missing] {
            let (translation, samples) = run(&record);
            assert_eq!(translation, Translation::default());
            assert!(samples.is_empty());
        }
    }

    #[test]
    fn test_bad_field_does_not_abort_record() {
        let record: Record = [("tx-signal", "-40"), ("uptime", "soon"), ("bytes", "1000")]
            .into_iter()
            .collect();
        let (translation, samples) = run(&record);

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].descriptor.name(), "t_tx_signal");
        assert_eq!(translation.emitted, 1);

        let failed: Vec<(&str, &str)> = translation
            .diagnostics
            .iter()
            .map(|d| (d.property, d.value.as_str()))
            .collect();
        assert_eq!(failed, vec![("uptime", "soon"), ("bytes", "1000")]);
        assert!(matches!(
            translation.diagnostics[1].error,
            ParseError::FieldCount { fields: 1, .. }
        ));
    }
}
