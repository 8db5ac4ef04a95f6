//! Candidate extraction from unstructured text
//!
//! Scans fetched fragments for connection URIs of every enabled dialect:
//! - HTML entities are decoded first so escaped `&amp;` query separators survive
//! - Each dialect has its own case-insensitive pattern
//! - `vless://` matches carrying `security=reality` are attributed to reality
//! - Results are deduplicated into an unordered set

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use crate::{Protocol, REALITY_MARKER};

/// Text the channel preview substitutes when it cuts a message short
const TRUNCATION_MARKERS: &[&str] = &["\u{2026}", "\u{e2}\u{20ac}\u{a6}"];

/// One pattern per scanned dialect. Reality has no pattern of its own: it is
/// carved out of the vless matches.
static PATTERNS: LazyLock<Vec<(Protocol, Regex)>> = LazyLock::new(|| {
    Protocol::EXTRACTABLE
        .iter()
        .filter(|p| **p != Protocol::Reality)
        .map(|p| (*p, dialect_regex(p.prefixes())))
        .collect()
});

fn dialect_regex(prefixes: &[&str]) -> Regex {
    let alternatives = prefixes
        .iter()
        .map(|prefix| regex::escape(prefix))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)(?:{})[^\s<>#]+", alternatives)).unwrap()
}

/// Extracts candidate connection strings for a set of enabled dialects
#[derive(Debug, Clone, Default)]
pub struct CandidateExtractor {
    /// Enabled dialects; empty means all of them
    enabled: HashSet<Protocol>,
}

impl CandidateExtractor {
    pub fn new(enabled: impl IntoIterator<Item = Protocol>) -> Self {
        Self {
            enabled: enabled.into_iter().collect(),
        }
    }

    /// Extractor with every dialect enabled
    pub fn all() -> Self {
        Self::default()
    }

    fn is_enabled(&self, protocol: Protocol) -> bool {
        self.enabled.is_empty() || self.enabled.contains(&protocol)
    }

    /// Extract the deduplicated set of candidates from all fragments
    pub fn extract<S: AsRef<str>>(&self, fragments: &[S]) -> HashSet<String> {
        self.extract_tagged(fragments).into_keys().collect()
    }

    /// Extract candidates together with the dialect each was attributed to
    pub fn extract_tagged<S: AsRef<str>>(&self, fragments: &[S]) -> HashMap<String, Protocol> {
        let mut found = HashMap::new();

        for fragment in fragments {
            let fragment = fragment.as_ref();
            if fragment.is_empty() {
                continue;
            }
            let text = html_escape::decode_html_entities(fragment);
            self.scan(&text, &mut found);
        }

        found
    }

    fn scan(&self, text: &str, found: &mut HashMap<String, Protocol>) {
        for (protocol, pattern) in PATTERNS.iter() {
            let protocol = *protocol;
            let wanted = match protocol {
                Protocol::Vless => {
                    self.is_enabled(Protocol::Vless) || self.is_enabled(Protocol::Reality)
                }
                other => self.is_enabled(other),
            };
            if !wanted {
                continue;
            }

            let mut at = 0;
            while let Some(m) = pattern.find_at(text, at) {
                if !at_token_start(text, m.start()) {
                    // A glued scheme may still hide a real one later in the same run
                    at = next_char(text, m.start());
                    continue;
                }
                at = m.end();

                let attributed = attribute(protocol, m.as_str());
                // Reality is produced whenever either reality or vless is on.
                if attributed == Protocol::Vless && !self.is_enabled(Protocol::Vless) {
                    continue;
                }

                if let Some(candidate) = cleanup(m.as_str(), attributed) {
                    found.insert(candidate, attributed);
                }
            }
        }
    }
}

/// Extract candidates from fragments for the given enabled dialects
pub fn extract_candidates<S: AsRef<str>>(
    fragments: &[S],
    enabled: &HashSet<Protocol>,
) -> HashSet<String> {
    CandidateExtractor::new(enabled.iter().copied()).extract(fragments)
}

/// A scheme must not be glued to a preceding word (`ss://` inside `vless://`)
fn at_token_start(text: &str, start: usize) -> bool {
    match text[..start].chars().next_back() {
        Some(c) => !(c.is_alphanumeric() || c == '_' || c == '-'),
        None => true,
    }
}

fn next_char(text: &str, index: usize) -> usize {
    index + text[index..].chars().next().map_or(1, char::len_utf8)
}

fn attribute(protocol: Protocol, matched: &str) -> Protocol {
    if protocol == Protocol::Vless && matched.to_ascii_lowercase().contains(REALITY_MARKER) {
        Protocol::Reality
    } else {
        protocol
    }
}

fn cleanup(matched: &str, protocol: Protocol) -> Option<String> {
    let matched = matched.trim();
    if matched.is_empty() {
        return None;
    }

    if protocol.rejects_truncated() && TRUNCATION_MARKERS.iter().any(|m| matched.contains(m)) {
        return None;
    }

    Some(matched.to_string())
}
