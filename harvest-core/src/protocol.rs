//! Supported connection URI dialects
//!
//! Every stage switches over [`Protocol`] instead of re-testing string
//! prefixes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Marker that turns a `vless://` link into its reality sub-variant
pub const REALITY_MARKER: &str = "security=reality";

/// A connection descriptor dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Base64-encoded JSON payload
    Vmess,
    /// URI with query parameters
    Vless,
    /// `vless://` carrying `security=reality`
    Reality,
    Shadowsocks,
    Trojan,
    Tuic,
    Hysteria,
    Hysteria2,
    Juicity,
    Wireguard,
    Ssh,
    /// Anything without a recognized scheme prefix
    Unknown,
}

impl Protocol {
    /// Every dialect the extractor knows how to scan for
    pub const EXTRACTABLE: [Protocol; 11] = [
        Protocol::Vmess,
        Protocol::Vless,
        Protocol::Reality,
        Protocol::Shadowsocks,
        Protocol::Trojan,
        Protocol::Tuic,
        Protocol::Hysteria,
        Protocol::Hysteria2,
        Protocol::Juicity,
        Protocol::Wireguard,
        Protocol::Ssh,
    ];

    /// Canonical lowercase name, as used in settings and output files
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Vmess => "vmess",
            Protocol::Vless => "vless",
            Protocol::Reality => "reality",
            Protocol::Shadowsocks => "shadowsocks",
            Protocol::Trojan => "trojan",
            Protocol::Tuic => "tuic",
            Protocol::Hysteria => "hysteria",
            Protocol::Hysteria2 => "hysteria2",
            Protocol::Juicity => "juicity",
            Protocol::Wireguard => "wireguard",
            Protocol::Ssh => "ssh",
            Protocol::Unknown => "unknown",
        }
    }

    /// Literal scheme prefixes, lowercase. Reality shares the vless prefix.
    pub fn prefixes(&self) -> &'static [&'static str] {
        match self {
            Protocol::Vmess => &["vmess://"],
            Protocol::Vless | Protocol::Reality => &["vless://"],
            Protocol::Shadowsocks => &["ss://"],
            Protocol::Trojan => &["trojan://"],
            Protocol::Tuic => &["tuic://"],
            Protocol::Hysteria => &["hysteria://"],
            Protocol::Hysteria2 => &["hy2://", "hysteria2://"],
            Protocol::Juicity => &["juicity://"],
            Protocol::Wireguard => &["wireguard://"],
            Protocol::Ssh => &["ssh://"],
            Protocol::Unknown => &[],
        }
    }

    /// Derive the protocol from a candidate's scheme prefix.
    ///
    /// Matching is case-insensitive. `vless://` always maps to [`Protocol::Vless`];
    /// reality is only an extraction-time attribution.
    pub fn from_scheme(raw: &str) -> Protocol {
        let scheme = match raw.find("://") {
            Some(idx) => raw[..idx].to_ascii_lowercase(),
            None => return Protocol::Unknown,
        };

        match scheme.as_str() {
            "vmess" => Protocol::Vmess,
            "vless" => Protocol::Vless,
            "ss" => Protocol::Shadowsocks,
            "trojan" => Protocol::Trojan,
            "tuic" => Protocol::Tuic,
            "hysteria" => Protocol::Hysteria,
            "hy2" | "hysteria2" => Protocol::Hysteria2,
            "juicity" => Protocol::Juicity,
            "wireguard" => Protocol::Wireguard,
            "ssh" => Protocol::Ssh,
            _ => Protocol::Unknown,
        }
    }

    /// Whether a match of this dialect is discarded when the source display
    /// cut it off mid-URI
    pub fn rejects_truncated(&self) -> bool {
        matches!(self, Protocol::Shadowsocks)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for protocol names that are not recognized
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown protocol name: {0}")]
pub struct UnknownProtocol(pub String);

impl FromStr for Protocol {
    type Err = UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vmess" => Ok(Protocol::Vmess),
            "vless" => Ok(Protocol::Vless),
            "reality" => Ok(Protocol::Reality),
            "shadowsocks" | "ss" => Ok(Protocol::Shadowsocks),
            "trojan" => Ok(Protocol::Trojan),
            "tuic" => Ok(Protocol::Tuic),
            "hysteria" => Ok(Protocol::Hysteria),
            "hysteria2" | "hy2" => Ok(Protocol::Hysteria2),
            "juicity" => Ok(Protocol::Juicity),
            "wireguard" => Ok(Protocol::Wireguard),
            "ssh" => Ok(Protocol::Ssh),
            "unknown" => Ok(Protocol::Unknown),
            other => Err(UnknownProtocol(other.to_string())),
        }
    }
}
