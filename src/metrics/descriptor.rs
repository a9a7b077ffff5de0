// Metric descriptors
//
// A descriptor is the identity of a metric (name, help text, label schema)
// independent of any sample value. Descriptors are built once when a collector
// is constructed and shared by every sample emitted through them.

use std::fmt;

/// Identity of an exposed metric.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Descriptor {
    name: String,
    help: String,
    label_names: Vec<String>,
}

impl Descriptor {
    /// Builds the descriptor for a device property.
    ///
    /// The metric name is `<namespace>_<property>` with every character that
    /// is not valid in a Prometheus metric name replaced by `_`, so
    /// `tx-signal` under `mikrotik_capsman` becomes `mikrotik_capsman_tx_signal`.
    ///
    /// # Example
    /// ```
    /// let desc = Descriptor::for_property("mikrotik_capsman", "rx-rate", &labels);
    /// assert_eq!(desc.name(), "mikrotik_capsman_rx_rate");
    /// ```
    pub fn for_property(namespace: &str, property: &str, label_names: &[String]) -> Self {
        Descriptor {
            name: format!("{}_{}", namespace, sanitize(property)),
            help: property.to_string(),
            label_names: label_names.to_vec(),
        }
    }

    /// Builds the transmit and receive descriptors for a split counter property.
    pub fn for_split_counter(
        namespace: &str,
        property: &str,
        label_names: &[String],
    ) -> (Self, Self) {
        (
            Self::for_property(namespace, &format!("tx_{}", property), label_names),
            Self::for_property(namespace, &format!("rx_{}", property), label_names),
        )
    }

    /// Builds a descriptor with an explicit name and help text.
    pub fn new(name: impl Into<String>, help: impl Into<String>, label_names: &[&str]) -> Self {
        Descriptor {
            name: name.into(),
            help: help.into(),
            label_names: label_names.iter().map(|l| l.to_string()).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{{}}}", self.name, self.label_names.join(","))
    }
}

/// Maps a RouterOS property or label name onto the metric name alphabet.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        ["name", "address", "interface"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_property_naming() {
        let desc = Descriptor::for_property("mikrotik_capsman", "tx-signal", &labels());
        assert_eq!(desc.name(), "mikrotik_capsman_tx_signal");
        assert_eq!(desc.help(), "tx-signal");
        assert_eq!(desc.label_names(), labels().as_slice());
    }

    #[test]
    fn test_split_counter_expansion() {
        let (tx, rx) = Descriptor::for_split_counter("mikrotik_capsman", "bytes", &labels());
        assert_eq!(tx.name(), "mikrotik_capsman_tx_bytes");
        assert_eq!(rx.name(), "mikrotik_capsman_rx_bytes");
        assert_eq!(tx.label_names(), rx.label_names());
    }

    #[test]
    fn test_building_is_deterministic() {
        let a = Descriptor::for_property("ns", "rx-rate", &labels());
        let b = Descriptor::for_property("ns", "rx-rate", &labels());
        assert_eq!(a, b);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("mac-address"), "mac_address");
        assert_eq!(sanitize("a.b/c d"), "a_b_c_d");
        assert_eq!(sanitize("already_ok1"), "already_ok1");
    }
}
