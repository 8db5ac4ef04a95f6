//! Pipeline settings
//!
//! A nested settings structure loaded from TOML, JSON or YAML. Every section and
//! every field has a default, so partial files are fine; unrecognized keys
//! are ignored.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::Protocol;

/// Errors from loading or saving settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to access settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML settings: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to render TOML settings: {0}")]
    TomlRender(#[from] toml::ser::Error),

    #[error("Invalid JSON settings: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid YAML settings: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unsupported settings format: {0}")]
    UnsupportedFormat(String),
}

/// Top-level settings consumed by every pipeline stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub fetcher: FetcherSettings,
    pub parser: ParserSettings,
    pub processor: ProcessorSettings,
    pub validator: ValidatorSettings,
    pub output: OutputSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherSettings {
    /// Per-attempt timeout in seconds
    pub timeout: u64,
    pub max_retries: u32,
    /// Maximum requests in flight
    pub max_workers: usize,
    /// Fixed user agent; a rotating browser agent is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Optional upstream proxy (`socks5h://127.0.0.1:9050`, `http://...`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    /// Pause between failed attempts
    pub retry_backoff_ms: u64,
    pub sources: SourceFiles,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            timeout: 20,
            max_retries: 3,
            max_workers: 20,
            user_agent: None,
            proxy: None,
            retry_backoff_ms: 1000,
            sources: SourceFiles::default(),
        }
    }
}

/// Where the source lists live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceFiles {
    /// One URL per line
    pub http_file: String,
    /// JSON array of channel names or URLs
    pub telegram_file: String,
}

impl Default for SourceFiles {
    fn default() -> Self {
        Self {
            http_file: "data/sources/http_sources.txt".to_string(),
            telegram_file: "data/sources/telegram_channels.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserSettings {
    /// Enabled dialect names
    pub protocols: Vec<String>,
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            protocols: [
                "vmess",
                "vless",
                "trojan",
                "shadowsocks",
                "tuic",
                "hysteria",
                "hysteria2",
                "juicity",
                "ssh",
                "wireguard",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl ParserSettings {
    /// Enabled dialects; unknown names are skipped
    pub fn enabled_protocols(&self) -> HashSet<Protocol> {
        parse_protocols(&self.protocols)
    }

    /// Names that do not map to a known dialect
    pub fn unknown_protocols(&self) -> Vec<&str> {
        self.protocols
            .iter()
            .filter(|name| name.parse::<Protocol>().is_err())
            .map(String::as_str)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorSettings {
    /// Path to a MaxMind country database
    pub geoip_db: String,
    pub deduplicate: bool,
    pub filters: FilterSettings,
    pub scoring: ScoringSettings,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            geoip_db: "data/geoip/GeoLite2-Country.mmdb".to_string(),
            deduplicate: true,
            filters: FilterSettings::default(),
            scoring: ScoringSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Empty means every country is allowed
    pub allowed_countries: Vec<String>,
    pub blocked_countries: Vec<String>,
    /// Empty means every protocol is allowed
    pub allowed_protocols: Vec<String>,
    pub min_score: i64,
    pub exclude_ports: Vec<u16>,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            allowed_countries: Vec::new(),
            blocked_countries: vec!["IR".to_string(), "CN".to_string(), "RU".to_string()],
            allowed_protocols: Vec::new(),
            min_score: 0,
            exclude_ports: Vec::new(),
        }
    }
}

impl FilterSettings {
    pub fn allowed_protocol_set(&self) -> HashSet<Protocol> {
        parse_protocols(&self.allowed_protocols)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    pub weights: ScoreWeights,
}

/// Score added per present feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    /// TLS indicator
    pub security: i64,
    pub sni: i64,
    pub alpn: i64,
    pub flow: i64,
    #[serde(rename = "headerType")]
    pub header_type: i64,
    pub path: i64,
    pub obfs: i64,
    pub mport: i64,
    /// `fp` query parameter
    pub fingerprint: i64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            security: 2,
            sni: 2,
            alpn: 2,
            flow: 2,
            header_type: 1,
            path: 1,
            obfs: 1,
            mport: 1,
            fingerprint: 1,
        }
    }
}

impl ScoreWeights {
    /// Query parameter names paired with their weight
    pub fn query_weights(&self) -> [(&'static str, i64); 8] {
        [
            ("sni", self.sni),
            ("alpn", self.alpn),
            ("flow", self.flow),
            ("headerType", self.header_type),
            ("path", self.path),
            ("obfs", self.obfs),
            ("mport", self.mport),
            ("fp", self.fingerprint),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorSettings {
    pub enabled: bool,
    /// TCP connect timeout in seconds
    pub timeout: f64,
    /// Maximum probes in flight
    pub max_workers: usize,
    /// Maximum accepted latency in milliseconds
    pub max_latency: f64,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: 2.0,
            max_workers: 50,
            max_latency: 2000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub directory: String,
    /// Any of `json`, `yaml` and `txt`
    pub formats: Vec<String>,
    /// Size of the best-of list
    pub best_of_limit: usize,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            directory: "output".to_string(),
            formats: vec!["json".to_string(), "txt".to_string(), "yaml".to_string()],
            best_of_limit: 100,
        }
    }
}

impl Settings {
    /// Load settings from a `.toml`, `.json`, `.yaml` or `.yml` file.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        match extension(path).as_str() {
            "toml" => Ok(toml::from_str(&content)?),
            "json" => Ok(serde_json::from_str(&content)?),
            "yaml" | "yml" => Ok(serde_yaml::from_str(&content)?),
            other => Err(SettingsError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Write settings in the format named by the file extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        let rendered = match extension(path).as_str() {
            "toml" => toml::to_string_pretty(self)?,
            "json" => serde_json::to_string_pretty(self)?,
            "yaml" | "yml" => serde_yaml::to_string(self)?,
            other => return Err(SettingsError::UnsupportedFormat(other.to_string())),
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, rendered)?;
        Ok(())
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn parse_protocols(names: &[String]) -> HashSet<Protocol> {
    names.iter().filter_map(|name| name.parse().ok()).collect()
}
