//! Source list files
//!
//! HTTP sources are listed one URL per line; blank lines and `#` comments are
//! skipped. Channels are a JSON array of names or URLs. A missing list is
//! treated as empty.

use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SourceListError {
    #[error("Failed to read source list {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid channel list {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

pub fn load_http_sources(path: impl AsRef<Path>) -> Result<Vec<String>, SourceListError> {
    let Some(content) = read_list(path.as_ref())? else {
        return Ok(Vec::new());
    };

    let sources: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();

    info!("Loaded {} http sources", sources.len());
    Ok(sources)
}

pub fn load_channels(path: impl AsRef<Path>) -> Result<Vec<String>, SourceListError> {
    let path = path.as_ref();
    let Some(content) = read_list(path)? else {
        return Ok(Vec::new());
    };

    let channels: Vec<String> =
        serde_json::from_str(&content).map_err(|source| SourceListError::Json {
            path: path.display().to_string(),
            source,
        })?;

    info!("Loaded {} channels", channels.len());
    Ok(channels)
}

fn read_list(path: &Path) -> Result<Option<String>, SourceListError> {
    if !path.exists() {
        warn!("Source list {} not found", path.display());
        return Ok(None);
    }

    std::fs::read_to_string(path)
        .map(Some)
        .map_err(|source| SourceListError::Io {
            path: path.display().to_string(),
            source,
        })
}
