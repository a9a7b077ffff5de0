// Registration table schemas
//
// A schema is plain data: which properties to request from the device, which of
// them become labels, and how each monitored property is interpreted. The two
// CAPsMAN schemas below reflect two RouterOS generations of the same table.

use super::descriptor::sanitize;

/// How a monitored property's raw value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Plain number, exposed as a gauge
    Gauge,
    /// RouterOS duration string, exposed as a gauge in seconds
    Duration,
    /// `"tx,rx"` pair, exposed as two counters
    SplitCounter,
}

/// A property whose value becomes one or more metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitoredProperty {
    pub name: &'static str,
    pub kind: ValueKind,
}

impl MonitoredProperty {
    const fn gauge(name: &'static str) -> Self {
        MonitoredProperty {
            name,
            kind: ValueKind::Gauge,
        }
    }

    const fn duration(name: &'static str) -> Self {
        MonitoredProperty {
            name,
            kind: ValueKind::Duration,
        }
    }

    const fn split_counter(name: &'static str) -> Self {
        MonitoredProperty {
            name,
            kind: ValueKind::SplitCounter,
        }
    }
}

/// Prefix shared by every metric this exporter exposes
pub const NAMESPACE: &str = "mikrotik";

/// Labels taken from the device identity rather than from the record
pub const DEVICE_LABELS: [&str; 2] = ["name", "address"];

/// Declarative description of one registration table collector
#[derive(Debug, PartialEq, Eq)]
pub struct PropertySchema {
    /// Collector name used in logs, configuration and scrape health metrics
    pub name: &'static str,
    /// Metric name segment after the namespace
    pub subsystem: &'static str,
    /// RouterOS command path
    pub command: &'static str,
    /// Record properties bound as labels, in label order
    pub label_properties: &'static [&'static str],
    /// Record properties turned into metrics, in processing order
    pub monitored: &'static [MonitoredProperty],
}

impl PropertySchema {
    /// Metric name prefix for this schema, e.g. `mikrotik_capsman`
    pub fn namespace(&self) -> String {
        format!("{}_{}", NAMESPACE, self.subsystem)
    }

    /// Full label schema: device labels followed by the record labels
    pub fn label_names(&self) -> Vec<String> {
        DEVICE_LABELS
            .iter()
            .map(|l| l.to_string())
            .chain(self.label_properties.iter().map(|p| sanitize(p)))
            .collect()
    }

    /// Comma-joined list of every property the collector needs from the device
    pub fn proplist(&self) -> String {
        self.label_properties
            .iter()
            .copied()
            .chain(self.monitored.iter().map(|p| p.name))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Current CAPsMAN registration table, labeled by SSID
pub static CAPSMAN: PropertySchema = PropertySchema {
    name: "capsman",
    subsystem: "capsman",
    command: "/caps-man/registration-table/print",
    label_properties: &["interface", "mac-address", "ssid"],
    monitored: &[
        MonitoredProperty::gauge("tx-rate"),
        MonitoredProperty::gauge("tx-signal"),
        MonitoredProperty::gauge("rx-rate"),
        MonitoredProperty::gauge("rx-signal"),
        MonitoredProperty::split_counter("packets"),
        MonitoredProperty::split_counter("bytes"),
    ],
};

/// Legacy CAPsMAN registration table field set, without SSID labels
pub static CAPSMAN_LEGACY: PropertySchema = PropertySchema {
    name: "capsman_legacy",
    subsystem: "caps_man",
    command: "/caps-man/registration-table/print",
    label_properties: &["interface", "mac-address"],
    monitored: &[
        MonitoredProperty::duration("uptime"),
        MonitoredProperty::gauge("rx-rate"),
        MonitoredProperty::gauge("rx-signal"),
        MonitoredProperty::gauge("tx-rate"),
        MonitoredProperty::gauge("tx-signal"),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_schema_labels() {
        assert_eq!(
            CAPSMAN.label_names(),
            vec!["name", "address", "interface", "mac_address", "ssid"]
        );
        assert_eq!(CAPSMAN.namespace(), "mikrotik_capsman");
    }

    #[test]
    fn test_legacy_schema_has_no_ssid() {
        assert_eq!(
            CAPSMAN_LEGACY.label_names(),
            vec!["name", "address", "interface", "mac_address"]
        );
        assert!(!CAPSMAN_LEGACY.proplist().contains("ssid"));
    }

    #[test]
    fn test_proplist_contains_only_needed_properties() {
        assert_eq!(
            CAPSMAN.proplist(),
            "interface,mac-address,ssid,tx-rate,tx-signal,rx-rate,rx-signal,packets,bytes"
        );
        assert_eq!(
            CAPSMAN_LEGACY.proplist(),
            "interface,mac-address,uptime,rx-rate,rx-signal,tx-rate,tx-signal"
        );
    }

    #[test]
    fn test_schemas_do_not_share_metric_names() {
        assert_ne!(CAPSMAN.namespace(), CAPSMAN_LEGACY.namespace());
    }
}
