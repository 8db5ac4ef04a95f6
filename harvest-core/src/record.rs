//! The enriched unit carried from enrichment through validation to export

use serde::{Deserialize, Serialize};

use crate::{Protocol, UNKNOWN_COUNTRY};

/// Security hint used until a decoder supplies one
pub const UNKNOWN_SECURITY: &str = "unknown";

/// A candidate connection descriptor with derived metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// The connection string exactly as extracted
    #[serde(rename = "config")]
    raw_config: String,
    /// Dialect derived from the scheme prefix
    pub protocol: Protocol,
    /// Endpoint host, when one could be derived
    pub host: Option<String>,
    /// Endpoint port, when one could be derived
    pub port: Option<u16>,
    /// Transport security hint (`tls`, `none`, `unknown`, ...)
    pub security: String,
    /// ISO country code, or `NA`
    pub country: String,
    /// Policy score
    pub score: i64,
    /// Measured TCP connect latency; `-1` marks an unprobeable record
    #[serde(rename = "latency")]
    pub latency_ms: Option<f64>,
}

impl CandidateRecord {
    pub fn new(raw_config: impl Into<String>) -> Self {
        let raw_config = raw_config.into();
        Self {
            protocol: Protocol::from_scheme(&raw_config),
            raw_config,
            host: None,
            port: None,
            security: UNKNOWN_SECURITY.to_string(),
            country: UNKNOWN_COUNTRY.to_string(),
            score: 0,
            latency_ms: None,
        }
    }

    pub fn with_endpoint(mut self, host: &str, port: u16) -> Self {
        self.host = Some(host.to_string());
        self.port = Some(port);
        self
    }

    pub fn with_score(mut self, score: i64) -> Self {
        self.score = score;
        self
    }

    pub fn with_country(mut self, country: &str) -> Self {
        self.country = country.to_string();
        self
    }

    /// The original connection string
    pub fn raw_config(&self) -> &str {
        &self.raw_config
    }

    /// Host and port, when both are known
    pub fn endpoint(&self) -> Option<(&str, u16)> {
        match (&self.host, self.port) {
            (Some(host), Some(port)) => Some((host.as_str(), port)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_defaults() {
        let record = CandidateRecord::new("trojan://pw@1.2.3.4:443");
        assert_eq!(record.protocol, Protocol::Trojan);
        assert_eq!(record.country, "NA");
        assert_eq!(record.security, "unknown");
        assert!(record.endpoint().is_none());
        assert!(record.latency_ms.is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let record = CandidateRecord::new("ss://abc@1.2.3.4:8388").with_endpoint("1.2.3.4", 8388);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["config"], "ss://abc@1.2.3.4:8388");
        assert_eq!(value["protocol"], "shadowsocks");
        assert_eq!(value["port"], 8388);
        assert!(value["latency"].is_null());
    }
}
