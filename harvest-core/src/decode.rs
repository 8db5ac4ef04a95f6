//! Best-effort field decoding for candidate strings
//!
//! Decoders never fail: they return [`Decoded::Defaulted`] with the reason
//! instead, so callers keep their default values and tests can assert the
//! fallback path.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Why a decoder fell back to defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Nothing to decode (wrong dialect, no query component, no address)
    Absent,
    /// Payload is not valid base64 in any supported alphabet
    Base64,
    /// Payload decoded but is not a JSON object
    Json,
    /// Query component contains invalid percent-encoding
    Query,
}

/// Outcome of a best-effort decode
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    Populated(T),
    Defaulted(Fallback),
}

impl<T> Decoded<T> {
    pub fn is_populated(&self) -> bool {
        matches!(self, Decoded::Populated(_))
    }

    pub fn fallback(&self) -> Option<Fallback> {
        match self {
            Decoded::Populated(_) => None,
            Decoded::Defaulted(reason) => Some(*reason),
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Decoded::Populated(value) => Some(value),
            Decoded::Defaulted(_) => None,
        }
    }

    pub fn unwrap_or(self, default: T) -> T {
        self.into_option().unwrap_or(default)
    }
}

/// Endpoint fields carried inside a vmess payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmessEndpoint {
    /// `add` field
    pub host: Option<String>,
    /// `port` field, given as a string or a number
    pub port: Option<u16>,
    /// `tls` field, `none` when absent
    pub security: String,
}

static IPV4_ENDPOINT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b((?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?))\b(?::(\d{1,5})\b)?").unwrap()
});

/// First dotted-quad IPv4 address in the string, plus the port when the
/// address is immediately followed by `:<digits>`
pub fn ipv4_endpoint(raw: &str) -> Decoded<(String, Option<u16>)> {
    match IPV4_ENDPOINT_REGEX.captures(raw) {
        Some(caps) => {
            let host = caps[1].to_string();
            let port = caps.get(2).and_then(|m| m.as_str().parse::<u16>().ok());
            Decoded::Populated((host, port))
        }
        None => Decoded::Defaulted(Fallback::Absent),
    }
}

/// Decode a `vmess://` base64 JSON payload
pub fn decode_vmess(raw: &str) -> Decoded<VmessEndpoint> {
    let payload = match strip_scheme(raw, "vmess://") {
        Some(p) => p.trim(),
        None => return Decoded::Defaulted(Fallback::Absent),
    };

    let bytes = match decode_base64(payload) {
        Some(b) => b,
        None => return Decoded::Defaulted(Fallback::Base64),
    };
    let text = String::from_utf8_lossy(&bytes);

    let object = match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => map,
        _ => return Decoded::Defaulted(Fallback::Json),
    };

    let host = object.get("add").and_then(json_to_string);
    let port = object.get("port").and_then(json_to_port);
    let security = object
        .get("tls")
        .and_then(json_to_string)
        .unwrap_or_else(|| "none".to_string());

    Decoded::Populated(VmessEndpoint { host, port, security })
}

/// Parse the query component (text after the first `?`, up to the next `?`
/// or `#`) into key/value lists. Keys with empty values are left out.
pub fn query_params(raw: &str) -> Decoded<HashMap<String, Vec<String>>> {
    let query = match raw.split_once('?') {
        Some((_, rest)) => rest.split(['?', '#']).next().unwrap_or_default(),
        None => return Decoded::Defaulted(Fallback::Absent),
    };

    let mut params: HashMap<String, Vec<String>> = HashMap::new();
    for pair in query.split(['&', ';']) {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if value.is_empty() {
            continue;
        }

        let key = match decode_component(key) {
            Some(k) => k,
            None => return Decoded::Defaulted(Fallback::Query),
        };
        let value = match decode_component(value) {
            Some(v) => v,
            None => return Decoded::Defaulted(Fallback::Query),
        };
        params.entry(key).or_default().push(value);
    }

    Decoded::Populated(params)
}

fn decode_component(s: &str) -> Option<String> {
    let spaced = s.replace('+', " ");
    urlencoding::decode(&spaced).ok().map(|c| c.into_owned())
}

fn strip_scheme<'a>(raw: &'a str, prefix: &str) -> Option<&'a str> {
    raw.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        .then(|| &raw[prefix.len()..])
}

fn decode_base64(payload: &str) -> Option<Vec<u8>> {
    [&STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD]
        .into_iter()
        .find_map(|engine| engine.decode(payload).ok())
}

fn json_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_to_port(value: &Value) -> Option<u16> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vmess(json: &str) -> String {
        format!("vmess://{}", STANDARD.encode(json))
    }

    #[test]
    fn test_vmess_payload_fields() {
        let raw = vmess(r#"{"add":"127.0.0.1","port":"443","tls":"tls"}"#);
        let decoded = decode_vmess(&raw).into_option().unwrap();
        assert_eq!(decoded.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(decoded.port, Some(443));
        assert_eq!(decoded.security, "tls");
    }

    #[test]
    fn test_vmess_numeric_port_and_missing_tls() {
        let raw = vmess(r#"{"add":"example.com","port":8443}"#);
        let decoded = decode_vmess(&raw).into_option().unwrap();
        assert_eq!(decoded.host.as_deref(), Some("example.com"));
        assert_eq!(decoded.port, Some(8443));
        assert_eq!(decoded.security, "none");
    }

    #[test]
    fn test_vmess_unpadded_url_safe() {
        let raw = format!("vmess://{}", URL_SAFE_NO_PAD.encode(r#"{"add":"1.2.3.4","port":"80"}"#));
        assert!(decode_vmess(&raw).is_populated());
    }

    #[test]
    fn test_vmess_fallbacks() {
        assert_eq!(decode_vmess("trojan://x").fallback(), Some(Fallback::Absent));
        assert_eq!(decode_vmess("vmess://!!not base64!!").fallback(), Some(Fallback::Base64));
        assert_eq!(decode_vmess(&vmess("[1,2,3]")).fallback(), Some(Fallback::Json));
        assert_eq!(decode_vmess(&vmess("not json")).fallback(), Some(Fallback::Json));
    }

    #[test]
    fn test_multibyte_prefix_is_absent() {
        assert_eq!(decode_vmess("a€€€").fallback(), Some(Fallback::Absent));
        assert_eq!(decode_vmess("€").fallback(), Some(Fallback::Absent));
    }

    #[test]
    fn test_ipv4_endpoint() {
        let found = ipv4_endpoint("vless://id@10.0.0.7:8443?security=tls").into_option();
        assert_eq!(found, Some(("10.0.0.7".to_string(), Some(8443))));

        let found = ipv4_endpoint("ss://abc@1.2.3.4/plugin").into_option();
        assert_eq!(found, Some(("1.2.3.4".to_string(), None)));

        assert_eq!(
            ipv4_endpoint("trojan://pw@example.com:443").fallback(),
            Some(Fallback::Absent)
        );
    }

    #[test]
    fn test_query_params() {
        let params = query_params("vless://id@1.2.3.4:443?security=tls&sni=a.com&alpn=h2%2Chttp%2F1.1&fp=#name")
            .into_option()
            .unwrap();
        assert_eq!(params["sni"], vec!["a.com"]);
        assert_eq!(params["alpn"], vec!["h2,http/1.1"]);
        assert!(!params.contains_key("fp"));
    }

    #[test]
    fn test_query_fallbacks() {
        assert_eq!(query_params("trojan://pw@1.2.3.4:443").fallback(), Some(Fallback::Absent));
        assert_eq!(
            query_params("vless://id@1.2.3.4:443?sni=%FF%FE").fallback(),
            Some(Fallback::Query)
        );
    }
}
