//! Pipeline Coordinator
//!
//! Runs the harvest stages in sequence:
//! - Fetch raw text from channels and HTTP sources
//! - Extract candidate connection strings
//! - Enrich, score and filter candidates
//! - Probe survivors for liveness (optional)
//!
//! A run never fails on bad sources or bad candidates; it always produces a
//! report, possibly with no records. Callers can stop a run between stages
//! through a [`StopHandle`].

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use harvest_agents::{
    CountryResolver, EnrichmentPolicy, EnrichmentScorer, GeoLookup, LivenessValidator,
    ValidationPolicy,
};
use harvest_core::{CandidateExtractor, CandidateRecord, Settings};
use harvest_net::{FetchConfig, Prober, SourceFetcher};

use crate::sources::{load_channels, load_http_sources};

/// Pipeline stage, as reported to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Fetch,
    Extract,
    Process,
    Validate,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Extract => "extract",
            Stage::Process => "process",
            Stage::Validate => "validate",
        }
    }
}

/// Receives stage transitions and per-stage progress
pub trait PipelineObserver: Send + Sync {
    fn stage_started(&self, _stage: Stage) {}

    /// Only the concurrent stages (fetch, validate) report progress
    fn progress(&self, _stage: Stage, _completed: usize, _total: usize) {}

    /// `count` is the number of items the stage produced
    fn stage_finished(&self, _stage: Stage, _count: usize) {}
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentObserver;

impl PipelineObserver for SilentObserver {}

/// Cooperative stop flag, checked between stages
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub sources_total: usize,
    /// Sources that produced any content
    pub sources_fetched: usize,
    /// Distinct candidates extracted
    pub candidates: usize,
    /// Records that passed enrichment filters
    pub processed: usize,
    /// Records kept by liveness validation; `None` when it did not run
    pub validated: Option<usize>,
    /// Set when the run was stopped before the last stage
    pub stopped: bool,
    pub elapsed: Duration,
    pub records: Vec<CandidateRecord>,
}

/// The harvest pipeline
pub struct Pipeline {
    settings: Settings,
    fetcher: SourceFetcher,
    geo: Option<Arc<dyn CountryResolver>>,
    prober: Option<Arc<dyn Prober>>,
    observer: Arc<dyn PipelineObserver>,
    stop: StopHandle,
    validate: bool,
}

impl Pipeline {
    /// Build a pipeline; opens the GeoIP database once for every run
    pub fn new(settings: Settings) -> Result<Self, anyhow::Error> {
        let fetcher = SourceFetcher::new(FetchConfig::from(&settings.fetcher))?;

        let geo = GeoLookup::open(&settings.processor.geoip_db)
            .map(|lookup| Arc::new(lookup) as Arc<dyn CountryResolver>);

        let unknown = settings.parser.unknown_protocols();
        if !unknown.is_empty() {
            warn!("Ignoring unknown protocols: {}", unknown.join(", "));
        }

        Ok(Self {
            fetcher,
            geo,
            prober: None,
            observer: Arc::new(SilentObserver),
            stop: StopHandle::default(),
            validate: settings.validator.enabled,
            settings,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Replace the country resolver (the GeoIP database by default)
    pub fn with_geo(mut self, geo: Arc<dyn CountryResolver>) -> Self {
        self.geo = Some(geo);
        self
    }

    /// Replace the liveness probe (plain TCP by default)
    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = Some(prober);
        self
    }

    /// Skip liveness validation regardless of settings
    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Handle that stops the run at the next stage boundary
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Extractor configured with the enabled protocols
    pub fn extractor(&self) -> CandidateExtractor {
        CandidateExtractor::new(self.settings.parser.enabled_protocols())
    }

    /// Run with the source lists named in the settings
    pub async fn run_configured(&self) -> Result<PipelineReport, anyhow::Error> {
        let files = &self.settings.fetcher.sources;
        let channels = load_channels(&files.telegram_file)?;
        let http_sources = load_http_sources(&files.http_file)?;
        Ok(self.run(&channels, &http_sources).await)
    }

    /// Run every stage over the given sources
    pub async fn run(&self, channels: &[String], http_sources: &[String]) -> PipelineReport {
        let start = Instant::now();
        let mut report = PipelineReport {
            sources_total: channels.len() + http_sources.len(),
            ..Default::default()
        };

        info!(
            "Pipeline starting: {} channels, {} http sources",
            channels.len(),
            http_sources.len()
        );

        // Fetch
        self.observer.stage_started(Stage::Fetch);
        let observer = &self.observer;
        let fetch_progress = |completed: usize, total: usize| {
            observer.progress(Stage::Fetch, completed, total)
        };
        let blobs = self
            .fetcher
            .fetch_all(channels, http_sources, &fetch_progress)
            .await;
        report.sources_fetched = blobs.len();
        self.observer.stage_finished(Stage::Fetch, blobs.len());

        if self.should_stop(&mut report, start) {
            return report;
        }

        // Extract
        self.observer.stage_started(Stage::Extract);
        let extractor = self.extractor();
        let mut candidates: HashSet<String> = HashSet::new();
        for blob in &blobs {
            candidates.extend(extractor.extract(&blob.fragments));
        }
        report.candidates = candidates.len();
        info!("Extracted {} distinct candidates", candidates.len());
        self.observer.stage_finished(Stage::Extract, candidates.len());

        if self.should_stop(&mut report, start) {
            return report;
        }

        // Process
        self.observer.stage_started(Stage::Process);
        let scorer = EnrichmentScorer::new(
            EnrichmentPolicy::from(&self.settings.processor),
            self.geo.clone(),
        );
        let mut sorted: Vec<String> = candidates.into_iter().collect();
        sorted.sort();
        let records = scorer.process(sorted);
        report.processed = records.len();
        self.observer.stage_finished(Stage::Process, records.len());

        if !self.validate {
            info!("Liveness validation disabled");
            report.records = records;
            report.elapsed = start.elapsed();
            return report;
        }

        if self.should_stop(&mut report, start) {
            report.records = records;
            return report;
        }

        // Validate
        self.observer.stage_started(Stage::Validate);
        let validator = self.validator();
        let validate_progress = |completed: usize, total: usize| {
            observer.progress(Stage::Validate, completed, total)
        };
        let live = validator.validate(records, &validate_progress).await;
        report.validated = Some(live.len());
        self.observer.stage_finished(Stage::Validate, live.len());

        report.records = live;
        report.elapsed = start.elapsed();
        info!(
            "Pipeline finished in {:.1}s with {} records",
            report.elapsed.as_secs_f64(),
            report.records.len()
        );
        report
    }

    fn validator(&self) -> LivenessValidator {
        let validator = LivenessValidator::new(ValidationPolicy::from(&self.settings.validator));
        match &self.prober {
            Some(prober) => validator.with_prober(prober.clone()),
            None => validator,
        }
    }

    fn should_stop(&self, report: &mut PipelineReport, start: Instant) -> bool {
        if self.stop.is_stopped() {
            warn!("Pipeline stopped by request");
            report.stopped = true;
            report.elapsed = start.elapsed();
            return true;
        }
        false
    }

    /// Release the shared GeoIP handle
    pub fn close(&mut self) {
        self.geo = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use harvest_agents::StaticCountries;
    use std::sync::Mutex;

    struct InstantProber;

    #[async_trait]
    impl Prober for InstantProber {
        async fn probe(&self, host: &str, _port: u16) -> Option<f64> {
            (host != "9.9.9.9").then_some(12.344)
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl PipelineObserver for RecordingObserver {
        fn stage_started(&self, stage: Stage) {
            self.events.lock().unwrap().push(format!("start:{}", stage.name()));
        }

        fn stage_finished(&self, stage: Stage, count: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("finish:{}:{}", stage.name(), count));
        }
    }

    fn offline_settings() -> Settings {
        let mut settings = Settings::default();
        settings.processor.geoip_db = "/nonexistent/GeoLite2-Country.mmdb".to_string();
        settings.fetcher.max_retries = 1;
        settings.fetcher.retry_backoff_ms = 0;
        settings
    }

    fn text_server_body() -> &'static str {
        "vless://id@1.1.1.1:443?security=tls&sni=a.com\n\
         trojan://pw@9.9.9.9:443\n\
         trojan://pw@3.3.3.3:443\n\
         noise ss://trunc… more"
    }

    async fn serve(body: &'static str) -> (wiremock::MockServer, String) {
        use wiremock::matchers::method;
        use wiremock::{Mock, ResponseTemplate};

        let server = wiremock::MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
        let url = format!("{}/list.txt", server.uri());
        (server, url)
    }

    #[tokio::test]
    async fn test_full_run() {
        let (_server, url) = serve(text_server_body()).await;
        let geo = StaticCountries::new()
            .with("1.1.1.1".parse().unwrap(), "US")
            .with("3.3.3.3".parse().unwrap(), "IR");

        let pipeline = Pipeline::new(offline_settings())
            .unwrap()
            .with_geo(Arc::new(geo))
            .with_prober(Arc::new(InstantProber));
        let report = pipeline.run(&[], &[url]).await;

        assert_eq!(report.sources_total, 1);
        assert_eq!(report.sources_fetched, 1);
        assert_eq!(report.candidates, 3);
        // 3.3.3.3 is in a blocked country
        assert_eq!(report.processed, 2);
        // 9.9.9.9 does not answer
        assert_eq!(report.validated, Some(1));
        assert_eq!(report.records[0].country, "US");
        assert_eq!(report.records[0].latency_ms, Some(12.34));
        assert!(!report.stopped);
    }

    #[tokio::test]
    async fn test_run_without_validation() {
        let (_server, url) = serve(text_server_body()).await;
        let pipeline = Pipeline::new(offline_settings())
            .unwrap()
            .with_prober(Arc::new(InstantProber))
            .without_validation();
        let report = pipeline.run(&[], &[url]).await;

        assert_eq!(report.validated, None);
        assert_eq!(report.records.len(), 3);
        assert!(report.records.iter().all(|r| r.latency_ms.is_none()));
        assert_eq!(report.records[0].protocol, harvest_core::Protocol::Vless);
    }

    #[tokio::test]
    async fn test_stop_between_stages() {
        let (_server, url) = serve(text_server_body()).await;
        let pipeline = Pipeline::new(offline_settings()).unwrap();
        pipeline.stop_handle().stop();

        let report = pipeline.run(&[], &[url]).await;
        assert!(report.stopped);
        assert_eq!(report.sources_fetched, 1);
        assert_eq!(report.candidates, 0);
        assert!(report.records.is_empty());
    }

    #[tokio::test]
    async fn test_observer_sees_every_stage() {
        let (_server, url) = serve(text_server_body()).await;
        let observer = Arc::new(RecordingObserver::default());
        let pipeline = Pipeline::new(offline_settings())
            .unwrap()
            .with_prober(Arc::new(InstantProber))
            .with_observer(observer.clone());
        pipeline.run(&[], &[url]).await;

        let events = observer.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "start:fetch",
                "finish:fetch:1",
                "start:extract",
                "finish:extract:3",
                "start:process",
                "finish:process:3",
                "start:validate",
                "finish:validate:2",
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_run() {
        let pipeline = Pipeline::new(offline_settings()).unwrap();
        let report = pipeline.run(&[], &[]).await;
        assert_eq!(report.sources_total, 0);
        assert!(report.records.is_empty());
    }

    #[test]
    fn test_close_releases_geo() {
        let mut pipeline = Pipeline::new(offline_settings())
            .unwrap()
            .with_geo(Arc::new(StaticCountries::new()));
        assert!(pipeline.geo.is_some());
        pipeline.close();
        assert!(pipeline.geo.is_none());
    }
}
