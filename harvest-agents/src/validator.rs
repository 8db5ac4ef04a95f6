//! Liveness Validator - TCP reachability and latency budget
//!
//! Every record with a usable endpoint is probed through a bounded pool.
//! Only records that connect within the latency budget are kept, each with
//! its measured latency rounded to two decimals.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use harvest_core::{CandidateRecord, ProgressSink, ValidatorSettings};
use harvest_net::{Prober, TcpProber};

/// Latency recorded on records that have no probeable endpoint
pub const UNPROBEABLE_LATENCY: f64 = -1.0;

/// Connect timeout used when the configured one is not a usable duration
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    pub enabled: bool,
    /// TCP connect timeout
    pub timeout: Duration,
    pub max_concurrent: usize,
    /// Maximum accepted latency in milliseconds
    pub max_latency_ms: f64,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self::from(&ValidatorSettings::default())
    }
}

impl From<&ValidatorSettings> for ValidationPolicy {
    fn from(settings: &ValidatorSettings) -> Self {
        Self {
            enabled: settings.enabled,
            timeout: Duration::try_from_secs_f64(settings.timeout).unwrap_or(DEFAULT_TIMEOUT),
            max_concurrent: settings.max_workers.max(1),
            max_latency_ms: settings.max_latency,
        }
    }
}

impl ValidationPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_max_latency(mut self, max_latency_ms: f64) -> Self {
        self.max_latency_ms = max_latency_ms;
        self
    }

    pub fn with_concurrency(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }
}

/// Full result of a validation pass
#[derive(Debug, Default)]
pub struct ValidationOutcome {
    /// Reachable within budget, in completion order
    pub live: Vec<CandidateRecord>,
    /// No endpoint could be derived; latency set to `-1`
    pub unprobeable: Vec<CandidateRecord>,
    /// Unreachable or over budget
    pub dropped: usize,
}

pub struct LivenessValidator {
    policy: ValidationPolicy,
    prober: Arc<dyn Prober>,
}

impl LivenessValidator {
    /// Validator backed by a plain TCP prober
    pub fn new(policy: ValidationPolicy) -> Self {
        let prober = Arc::new(TcpProber::new(policy.timeout));
        Self { policy, prober }
    }

    /// Replace the probe implementation
    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = prober;
        self
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Records that are reachable within the latency budget.
    ///
    /// When validation is disabled the input is returned unchanged.
    pub async fn validate(
        &self,
        records: Vec<CandidateRecord>,
        progress: &dyn ProgressSink,
    ) -> Vec<CandidateRecord> {
        if !self.policy.enabled {
            return records;
        }
        self.validate_detailed(records, progress).await.live
    }

    pub async fn validate_detailed(
        &self,
        records: Vec<CandidateRecord>,
        progress: &dyn ProgressSink,
    ) -> ValidationOutcome {
        if !self.policy.enabled {
            return ValidationOutcome {
                live: records,
                ..Default::default()
            };
        }

        let total = records.len();
        let mut completed = 0;
        let mut outcome = ValidationOutcome::default();
        let mut targets = Vec::new();

        for mut record in records {
            resolve_endpoint(&mut record);
            let endpoint = record
                .endpoint()
                .map(|(host, port)| (host.to_string(), port));

            match endpoint {
                Some((host, port)) => targets.push((record, host, port)),
                None => {
                    record.latency_ms = Some(UNPROBEABLE_LATENCY);
                    completed += 1;
                    progress.advance(completed, total);
                    outcome.unprobeable.push(record);
                }
            }
        }

        info!(
            "Probing {} endpoints with {} workers ({} without endpoint)",
            targets.len(),
            self.policy.max_concurrent,
            outcome.unprobeable.len()
        );

        let prober = &self.prober;
        let mut pending = stream::iter(targets)
            .map(|(record, host, port)| async move {
                let latency = prober.probe(&host, port).await;
                (record, latency)
            })
            .buffer_unordered(self.policy.max_concurrent.max(1));

        while let Some((mut record, latency)) = pending.next().await {
            completed += 1;
            progress.advance(completed, total);

            match latency {
                Some(ms) if ms <= self.policy.max_latency_ms => {
                    record.latency_ms = Some(round_latency(ms));
                    outcome.live.push(record);
                }
                Some(ms) => {
                    debug!("{:.2}ms exceeds latency budget", ms);
                    outcome.dropped += 1;
                }
                None => outcome.dropped += 1,
            }
        }

        info!(
            "Validation kept {}/{} records",
            outcome.live.len(),
            total
        );
        outcome
    }
}

/// Fill in a missing port from `<host>:<digits>` inside the raw config
pub fn resolve_endpoint(record: &mut CandidateRecord) {
    if record.port.is_some() {
        return;
    }
    if let Some(host) = record.host.as_deref() {
        record.port = port_after_host(record.raw_config(), host);
    }
}

fn port_after_host(raw: &str, host: &str) -> Option<u16> {
    let needle = format!("{}:", host);
    raw.match_indices(&needle).find_map(|(at, _)| {
        let rest = &raw[at + needle.len()..];
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        rest[..digits].parse().ok()
    })
}

fn round_latency(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}
