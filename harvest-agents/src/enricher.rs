//! Enrichment Scorer - decode, attribute, score and filter candidates
//!
//! Turns extracted candidate strings into ranked [`CandidateRecord`]s:
//! - Endpoint from the first IPv4 address, or from the vmess JSON payload
//! - Country from the shared GeoIP handle (`NA` when unavailable)
//! - Score from TLS and query parameter weights
//! - Country, protocol, port and score filters
//!
//! Malformed candidates never abort a batch; they keep default fields.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

use harvest_core::{
    decode_vmess, ipv4_endpoint, query_params, CandidateRecord, Decoded, Fallback,
    ProcessorSettings, Protocol, ScoreWeights,
};

use crate::CountryResolver;

/// Scoring and filtering policy
#[derive(Debug, Clone)]
pub struct EnrichmentPolicy {
    /// Drop repeated candidates before enrichment
    pub deduplicate: bool,
    pub weights: ScoreWeights,
    /// Empty means every country is allowed
    pub allowed_countries: HashSet<String>,
    pub blocked_countries: HashSet<String>,
    /// Empty means every protocol is allowed
    pub allowed_protocols: HashSet<Protocol>,
    pub exclude_ports: HashSet<u16>,
    pub min_score: i64,
}

impl Default for EnrichmentPolicy {
    fn default() -> Self {
        Self {
            deduplicate: true,
            weights: ScoreWeights::default(),
            allowed_countries: HashSet::new(),
            blocked_countries: HashSet::new(),
            allowed_protocols: HashSet::new(),
            exclude_ports: HashSet::new(),
            min_score: 0,
        }
    }
}

impl From<&ProcessorSettings> for EnrichmentPolicy {
    fn from(settings: &ProcessorSettings) -> Self {
        let filters = &settings.filters;
        Self {
            deduplicate: settings.deduplicate,
            weights: settings.scoring.weights.clone(),
            allowed_countries: filters.allowed_countries.iter().cloned().collect(),
            blocked_countries: filters.blocked_countries.iter().cloned().collect(),
            allowed_protocols: filters.allowed_protocol_set(),
            exclude_ports: filters.exclude_ports.iter().copied().collect(),
            min_score: filters.min_score,
        }
    }
}

impl EnrichmentPolicy {
    pub fn with_min_score(mut self, min_score: i64) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_blocked_countries(mut self, countries: &[&str]) -> Self {
        self.blocked_countries = countries.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_allowed_countries(mut self, countries: &[&str]) -> Self {
        self.allowed_countries = countries.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_allowed_protocols(mut self, protocols: &[Protocol]) -> Self {
        self.allowed_protocols = protocols.iter().copied().collect();
        self
    }

    pub fn with_excluded_ports(mut self, ports: &[u16]) -> Self {
        self.exclude_ports = ports.iter().copied().collect();
        self
    }

    pub fn without_dedup(mut self) -> Self {
        self.deduplicate = false;
        self
    }
}

/// Why a record was filtered out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    CountryNotAllowed,
    CountryBlocked,
    ProtocolNotAllowed,
    PortExcluded,
    ScoreTooLow,
}

/// Enriches, scores and filters candidate strings
pub struct EnrichmentScorer {
    policy: EnrichmentPolicy,
    geo: Option<Arc<dyn CountryResolver>>,
}

impl EnrichmentScorer {
    pub fn new(policy: EnrichmentPolicy, geo: Option<Arc<dyn CountryResolver>>) -> Self {
        Self { policy, geo }
    }

    pub fn policy(&self) -> &EnrichmentPolicy {
        &self.policy
    }

    /// Enrich, score and filter a batch.
    ///
    /// Output is sorted by score descending; ties are ordered by the raw
    /// config string ascending.
    pub fn process<I, S>(&self, candidates: I) -> Vec<CandidateRecord>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut records = Vec::new();
        let mut input = 0usize;
        let mut rejected = 0usize;

        for raw in candidates {
            let raw: String = raw.into();
            input += 1;

            if self.policy.deduplicate && !seen.insert(raw.clone()) {
                continue;
            }

            let record = self.enrich(&raw);
            if let Some(reason) = self.rejection(&record) {
                debug!("Filtered {:?}: {}", reason, raw.chars().take(60).collect::<String>());
                rejected += 1;
                continue;
            }
            records.push(record);
        }

        records.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.raw_config().cmp(b.raw_config()))
        });

        info!(
            "Processed {} candidates: {} kept, {} filtered",
            input,
            records.len(),
            rejected
        );
        records
    }

    /// Derive every field of a record from its raw string
    pub fn enrich(&self, raw: &str) -> CandidateRecord {
        let mut record = CandidateRecord::new(raw);

        if let Decoded::Populated((host, port)) = ipv4_endpoint(raw) {
            record.host = Some(host);
            record.port = port;
        }

        if record.protocol == Protocol::Vmess {
            match decode_vmess(raw) {
                Decoded::Populated(payload) => {
                    record.host = payload.host;
                    record.port = payload.port;
                    record.security = payload.security;
                }
                Decoded::Defaulted(reason) => {
                    debug!("vmess payload fell back ({:?})", reason);
                }
            }
        }

        if let Some(country) = self.country_of(record.host.as_deref()) {
            record.country = country;
        }

        record.score = self.score(raw, &record.security).unwrap_or(0);
        record
    }

    /// Score a candidate; a malformed query component yields
    /// `Defaulted(Fallback::Query)`, which callers turn into a score of 0
    pub fn score(&self, raw: &str, security: &str) -> Decoded<i64> {
        let weights = &self.policy.weights;
        let mut score = 1;

        if raw.contains("tls") || security == "tls" {
            score += weights.security;
        }

        match query_params(raw) {
            Decoded::Populated(params) => {
                for (key, weight) in weights.query_weights() {
                    if params.contains_key(key) {
                        score += weight;
                    }
                }
            }
            Decoded::Defaulted(Fallback::Absent) => {}
            Decoded::Defaulted(reason) => return Decoded::Defaulted(reason),
        }

        Decoded::Populated(score)
    }

    /// First filter a record fails, in policy order
    pub fn rejection(&self, record: &CandidateRecord) -> Option<Rejection> {
        let policy = &self.policy;

        if !policy.allowed_countries.is_empty() && !policy.allowed_countries.contains(&record.country) {
            return Some(Rejection::CountryNotAllowed);
        }
        if policy.blocked_countries.contains(&record.country) {
            return Some(Rejection::CountryBlocked);
        }
        if !policy.allowed_protocols.is_empty() && !policy.allowed_protocols.contains(&record.protocol) {
            return Some(Rejection::ProtocolNotAllowed);
        }
        if record.port.is_some_and(|port| policy.exclude_ports.contains(&port)) {
            return Some(Rejection::PortExcluded);
        }
        if record.score < policy.min_score {
            return Some(Rejection::ScoreTooLow);
        }

        None
    }

    fn country_of(&self, host: Option<&str>) -> Option<String> {
        let geo = self.geo.as_ref()?;
        let ip: IpAddr = host?.parse().ok()?;
        geo.country(ip)
    }

    /// Release the GeoIP handle; later records report `NA`
    pub fn close(&mut self) {
        self.geo = None;
    }
}
