// RouterOS device access
//
// Collectors only see the `RouterClient` trait: one request, one decoded reply.
// `RestClient` implements it on top of the RouterOS REST API (RouterOS 7.1+),
// which returns registration table entries as JSON objects of strings.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::DeviceSettings;

/// Errors returned when a command cannot be run on a device
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("command {command} failed: {message}")]
    Command { command: String, message: String },
}

/// One reply entry: property name to raw value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: HashMap<String, String>,
}

impl Record {
    /// Raw value of `property`, or the empty string when the device omitted it
    pub fn value(&self, property: &str) -> &str {
        self.fields.get(property).map(String::as_str).unwrap_or("")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Record {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl From<HashMap<String, Value>> for Record {
    /// RouterOS sends strings, but booleans and numbers are stringified just in case
    fn from(object: HashMap<String, Value>) -> Self {
        object
            .into_iter()
            .map(|(key, value)| {
                let raw = match value {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                (key, raw)
            })
            .collect()
    }
}

/// Connection to a single device
#[async_trait]
pub trait RouterClient: Send + Sync {
    /// Runs `command` and returns every reply entry.
    ///
    /// # Arguments
    /// * `command` - RouterOS command path, e.g. `/caps-man/registration-table/print`
    /// * `proplist` - comma-joined property names to restrict the reply to
    async fn fetch(&self, command: &str, proplist: &str) -> Result<Vec<Record>, FetchError>;
}

/// Error body returned by the REST API
#[derive(Debug, Deserialize)]
struct RestError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    detail: String,
}

/// RouterOS REST API client
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    user: String,
    password: String,
}

impl RestClient {
    /// Creates a client for one device
    ///
    /// # Arguments
    /// * `device` - Device address and credentials
    /// * `timeout` - Upper bound for a whole request, including connect
    pub fn new(device: &DeviceSettings, timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(device.insecure_tls)
            .build()?;

        Ok(RestClient {
            http,
            base_url: device.base_url(),
            user: device.user.clone(),
            password: device.password.clone(),
        })
    }

    /// Maps an API command path onto its REST resource URL
    fn endpoint(&self, command: &str) -> String {
        let path = command.trim_end_matches("/print").trim_start_matches('/');
        format!("{}/rest/{}", self.base_url, path)
    }
}

#[async_trait]
impl RouterClient for RestClient {
    async fn fetch(&self, command: &str, proplist: &str) -> Result<Vec<Record>, FetchError> {
        let url = self.endpoint(command);
        debug!("GET {} (.proplist={})", url, proplist);

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.user, Some(&self.password))
            .query(&[(".proplist", proplist)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: Option<RestError> = response.json().await.ok();
            let message = match body {
                Some(e) if !e.detail.is_empty() => format!("{} ({})", e.message, e.detail),
                Some(e) if !e.message.is_empty() => e.message,
                _ => status.to_string(),
            };
            return Err(FetchError::Command {
                command: command.to_string(),
                message,
            });
        }

        let entries: Vec<HashMap<String, Value>> = response.json().await?;
        Ok(entries.into_iter().map(Record::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> DeviceSettings {
        serde_json::from_value(serde_json::json!({
            "name": "ap-1",
            "address": "10.0.0.1",
            "user": "prometheus",
            "password": "secret"
        }))
        .unwrap()
    }

    #[test]
    fn test_missing_property_reads_as_empty() {
        let record: Record = [("interface", "wlan1")].into_iter().collect();
        assert_eq!(record.value("interface"), "wlan1");
        assert_eq!(record.value("ssid"), "");
    }

    #[test]
    fn test_record_from_json_object() {
        let object: HashMap<String, Value> = serde_json::from_str(
            r#"{"bytes": "10,20", "tx-signal": -40, "authorized": true, "comment": null}"#,
        )
        .unwrap();
        let record = Record::from(object);

        assert_eq!(record.value("bytes"), "10,20");
        assert_eq!(record.value("tx-signal"), "-40");
        assert_eq!(record.value("authorized"), "true");
        assert_eq!(record.value("comment"), "");
    }

    #[test]
    fn test_endpoint_mapping() {
        let client = RestClient::new(&device(), Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.endpoint("/caps-man/registration-table/print"),
            "https://10.0.0.1/rest/caps-man/registration-table"
        );
    }
}
