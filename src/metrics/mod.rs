// Metrics module - turns RouterOS registration tables into Prometheus metrics
//
// This module provides the trait every collector implements, the context a
// collector runs against, and the factory the scheduler uses to build the
// enabled collectors.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::CollectorSettings;
use crate::routeros::{FetchError, RouterClient};

pub mod codec;
pub mod collector;
pub mod descriptor;
pub mod sample;
pub mod schema;
pub mod translate;

use collector::SchemaCollector;
use descriptor::Descriptor;
use sample::MetricSink;
use translate::FieldDiagnostic;

/// Identity of the device being polled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub name: String,
    pub address: String,
}

/// Everything a collector needs for one collection cycle
pub struct CollectorContext<'a> {
    pub device: &'a Device,
    pub client: &'a dyn RouterClient,
    pub sink: &'a dyn MetricSink,
}

/// Summary of one successful collection cycle
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CollectReport {
    /// Registration table entries returned by the device
    pub records: usize,
    /// Samples written to the sink
    pub samples: usize,
    /// Fields that were present but could not be parsed
    pub diagnostics: Vec<FieldDiagnostic>,
}

/// Core trait that all device collectors must implement.
///
/// A collector declares its metric identities up front through `describe`
/// and emits samples through exactly those identities in `collect`.
///
/// # Design Philosophy
/// - **Async-first**: the device request is the only await point
/// - **Partial results**: a malformed field is reported, not fatal
/// - **Decoupled exposition**: samples go to a sink, rendering is separate
#[async_trait]
pub trait RouterCollector: Send + Sync {
    /// Returns the collector name used in configuration and logs.
    fn name(&self) -> &str;

    /// Appends every descriptor this collector can emit through.
    fn describe(&self, out: &mut Vec<Arc<Descriptor>>);

    /// Runs one collection cycle against `ctx`.
    ///
    /// # Returns
    /// * `Ok(CollectReport)` - the fetch succeeded, whatever happened to individual fields
    /// * `Err(FetchError)` - the device request failed and nothing was emitted
    async fn collect(&self, ctx: &CollectorContext<'_>) -> Result<CollectReport, FetchError>;
}

/// Creates the collectors enabled in the configuration.
///
/// # Adding New Collectors
/// 1. Describe the table as a `PropertySchema` in `schema.rs`
/// 2. Add a switch for it to `CollectorSettings`
/// 3. Instantiate it here with `SchemaCollector::new(&schema::NEW_SCHEMA)`
pub fn create_enabled_collectors(settings: &CollectorSettings) -> Vec<Arc<dyn RouterCollector>> {
    let mut collectors: Vec<Arc<dyn RouterCollector>> = Vec::new();

    if settings.capsman {
        collectors.push(Arc::new(SchemaCollector::new(&schema::CAPSMAN)));
    }

    if settings.capsman_legacy {
        collectors.push(Arc::new(SchemaCollector::new(&schema::CAPSMAN_LEGACY)));
    }

    collectors
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory device used by collector and scheduler tests

    use super::*;
    use crate::routeros::Record;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies with scripted results, one per fetch, and records every request.
    /// Once the script runs out every fetch returns no records.
    pub struct ScriptedClient {
        replies: Mutex<VecDeque<Result<Vec<Record>, FetchError>>>,
        requests: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedClient {
        pub fn new(replies: Vec<Result<Vec<Record>, FetchError>>) -> Self {
            ScriptedClient {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn requests(&self) -> Vec<(String, String)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RouterClient for ScriptedClient {
        async fn fetch(&self, command: &str, proplist: &str) -> Result<Vec<Record>, FetchError> {
            self.requests
                .lock()
                .unwrap()
                .push((command.to_string(), proplist.to_string()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }
}
