//! Result export
//!
//! Writes a run's records into the output directory:
//! - `all_configs.json` / `all_configs.yaml`: timestamped snapshot of every record
//! - `protocols/<protocol>.txt` and `countries/<country>.txt`: raw configs
//! - `best_proxies.txt`: the top records by score

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use harvest_core::{CandidateRecord, OutputSettings};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode records: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to encode records as YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Serialize)]
struct Snapshot<'a> {
    generated_at: String,
    total_count: usize,
    items: &'a [CandidateRecord],
}

impl<'a> Snapshot<'a> {
    fn of(records: &'a [CandidateRecord]) -> Self {
        Self {
            generated_at: Utc::now().to_rfc3339(),
            total_count: records.len(),
            items: records,
        }
    }
}

pub struct Exporter {
    directory: PathBuf,
    formats: Vec<String>,
    best_of_limit: usize,
}

impl Exporter {
    pub fn new(settings: &OutputSettings) -> Self {
        Self {
            directory: PathBuf::from(&settings.directory),
            formats: settings.formats.iter().map(|f| f.to_ascii_lowercase()).collect(),
            best_of_limit: settings.best_of_limit,
        }
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Write every configured format; returns the files written
    pub fn save(&self, records: &[CandidateRecord]) -> Result<Vec<PathBuf>, ExportError> {
        std::fs::create_dir_all(&self.directory)?;
        let mut written = Vec::new();

        for format in &self.formats {
            match format.as_str() {
                "json" => written.push(self.save_json(records)?),
                "yaml" | "yml" => written.push(self.save_yaml(records)?),
                "txt" => written.extend(self.save_text(records)?),
                other => warn!("Skipping unknown output format: {}", other),
            }
        }

        info!(
            "Exported {} records to {} files in {}",
            records.len(),
            written.len(),
            self.directory.display()
        );
        Ok(written)
    }

    fn save_json(&self, records: &[CandidateRecord]) -> Result<PathBuf, ExportError> {
        let path = self.directory.join("all_configs.json");
        std::fs::write(&path, serde_json::to_string_pretty(&Snapshot::of(records))?)?;
        Ok(path)
    }

    fn save_yaml(&self, records: &[CandidateRecord]) -> Result<PathBuf, ExportError> {
        let path = self.directory.join("all_configs.yaml");
        std::fs::write(&path, serde_yaml::to_string(&Snapshot::of(records))?)?;
        Ok(path)
    }

    fn save_text(&self, records: &[CandidateRecord]) -> Result<Vec<PathBuf>, ExportError> {
        let mut by_protocol: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        let mut by_country: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for record in records {
            by_protocol
                .entry(record.protocol.name())
                .or_default()
                .push(record.raw_config());
            by_country
                .entry(record.country.as_str())
                .or_default()
                .push(record.raw_config());
        }

        let mut written = Vec::new();
        written.extend(write_groups(&self.directory.join("protocols"), &by_protocol)?);
        written.extend(write_groups(&self.directory.join("countries"), &by_country)?);

        let mut ranked: Vec<&CandidateRecord> = records.iter().collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        let best: Vec<&str> = ranked
            .into_iter()
            .take(self.best_of_limit)
            .map(|r| r.raw_config())
            .collect();

        let path = self.directory.join("best_proxies.txt");
        std::fs::write(&path, lines(&best))?;
        written.push(path);

        Ok(written)
    }
}

fn write_groups(dir: &Path, groups: &BTreeMap<&str, Vec<&str>>) -> Result<Vec<PathBuf>, ExportError> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    for (name, configs) in groups {
        let path = dir.join(format!("{}.txt", name));
        std::fs::write(&path, lines(configs))?;
        written.push(path);
    }

    Ok(written)
}

fn lines(configs: &[&str]) -> String {
    let mut text = configs.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    text
}
