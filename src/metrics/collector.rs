// Registration table collector
//
// One collector type serves every schema. The schema decides what is fetched
// and how it is labeled; the collector owns the descriptors built from it and
// drives the translator over each reply entry.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error};

use super::descriptor::Descriptor;
use super::schema::{PropertySchema, ValueKind};
use super::translate::{translate, BoundMetric, PropertyBinding};
use super::{CollectReport, CollectorContext, RouterCollector};
use crate::routeros::{FetchError, Record};

/// Collector for one registration table schema
#[derive(Debug)]
pub struct SchemaCollector {
    schema: &'static PropertySchema,
    proplist: String,
    bindings: Vec<PropertyBinding>,
}

impl SchemaCollector {
    /// Creates a collector with its descriptors already built
    pub fn new(schema: &'static PropertySchema) -> Self {
        let mut collector = SchemaCollector {
            schema,
            proplist: String::new(),
            bindings: Vec::new(),
        };
        collector.init();
        collector
    }

    /// (Re)builds the property list and binding table from the schema.
    ///
    /// Rebuilding always yields the same descriptors.
    pub fn init(&mut self) {
        let namespace = self.schema.namespace();
        let label_names = self.schema.label_names();

        self.proplist = self.schema.proplist();
        self.bindings = self
            .schema
            .monitored
            .iter()
            .map(|property| {
                let single =
                    || Arc::new(Descriptor::for_property(&namespace, property.name, &label_names));
                let metric = match property.kind {
                    ValueKind::Gauge => BoundMetric::Gauge(single()),
                    ValueKind::Duration => BoundMetric::Duration(single()),
                    ValueKind::SplitCounter => {
                        let (tx, rx) =
                            Descriptor::for_split_counter(&namespace, property.name, &label_names);
                        BoundMetric::SplitCounter {
                            tx: Arc::new(tx),
                            rx: Arc::new(rx),
                        }
                    }
                };
                PropertyBinding {
                    property: property.name,
                    metric,
                }
            })
            .collect();
    }

    pub fn bindings(&self) -> &[PropertyBinding] {
        &self.bindings
    }

    /// Label values for one record, in the order of `schema.label_names()`
    fn label_values(&self, ctx: &CollectorContext<'_>, record: &Record) -> Vec<String> {
        [ctx.device.name.as_str(), ctx.device.address.as_str()]
            .into_iter()
            .chain(
                self.schema
                    .label_properties
                    .iter()
                    .map(|p| record.value(p)),
            )
            .map(str::to_string)
            .collect()
    }
}

#[async_trait]
impl RouterCollector for SchemaCollector {
    fn name(&self) -> &str {
        self.schema.name
    }

    fn describe(&self, out: &mut Vec<Arc<Descriptor>>) {
        for binding in self.bindings() {
            out.extend(binding.descriptors().into_iter().cloned());
        }
    }

    async fn collect(&self, ctx: &CollectorContext<'_>) -> Result<CollectReport, FetchError> {
        let records = match ctx.client.fetch(self.schema.command, &self.proplist).await {
            Ok(records) => records,
            Err(e) => {
                error!(
                    device = %ctx.device.name,
                    collector = self.schema.name,
                    error = %e,
                    "error fetching registration table"
                );
                return Err(e);
            }
        };

        let mut report = CollectReport {
            records: records.len(),
            ..Default::default()
        };

        for record in &records {
            let labels = self.label_values(ctx, record);
            let translation = translate(record, &self.bindings, &labels, ctx.device, ctx.sink);
            report.samples += translation.emitted;
            report.diagnostics.extend(translation.diagnostics);
        }

        debug!(
            "{}: {} record(s), {} sample(s), {} field error(s) from {}",
            self.schema.name,
            report.records,
            report.samples,
            report.diagnostics.len(),
            ctx.device.name
        );

        Ok(report)
    }
}
