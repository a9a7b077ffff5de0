// Metric samples and the sinks that receive them

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use super::descriptor::Descriptor;

/// How a sample value should be exposed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
}

/// One labeled value produced during a collection cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub descriptor: Arc<Descriptor>,
    pub kind: MetricKind,
    pub value: f64,
    /// Bound positionally to `descriptor.label_names()`
    pub label_values: Vec<String>,
}

/// Receives samples emitted by collectors.
///
/// Several collectors may write to the same sink concurrently, so
/// implementations must be safe to share between tasks.
pub trait MetricSink: Send + Sync {
    fn accept(&self, sample: Sample);
}

/// Collects the samples of one collection cycle in memory
#[derive(Debug, Default)]
pub struct SampleBatch {
    samples: Mutex<Vec<Sample>>,
}

impl SampleBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the batch and returns the samples in emission order
    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MetricSink for SampleBatch {
    fn accept(&self, sample: Sample) {
        self.samples
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(sample);
    }
}

impl MetricSink for UnboundedSender<Sample> {
    fn accept(&self, sample: Sample) {
        if let Err(e) = self.send(sample) {
            debug!("Dropping sample {}: receiver closed", e.0.descriptor.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(value: f64) -> Sample {
        Sample {
            descriptor: Arc::new(Descriptor::new("test_metric", "test", &["device"])),
            kind: MetricKind::Gauge,
            value,
            label_values: vec!["ap-1".to_string()],
        }
    }

    #[test]
    fn test_batch_keeps_emission_order() {
        let batch = SampleBatch::new();
        batch.accept(sample(1.0));
        batch.accept(sample(2.0));

        let values: Vec<f64> = batch.into_samples().iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn test_channel_sink() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.accept(sample(3.0));
        drop(tx);

        let received = rx.recv().await.expect("sample");
        assert_eq!(received.value, 3.0);
        assert!(rx.recv().await.is_none());
    }
}
