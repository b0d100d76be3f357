//! Persistence layer.
//!
//! Best-effort JSON audit files under the data directory:
//! - `provider_dump.json`: the latest raw alert batch from the feed
//! - `correlated_matches.json`: the latest (alert, venue event) pair
//!
//! Nothing here is needed for correctness; callers log and move on when a
//! write fails.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::types::{AlertNotification, MatchCandidate, MatchDetails};

/// Default data directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = "data";

const PROVIDER_DUMP_FILE: &str = "provider_dump.json";
const CORRELATED_MATCHES_FILE: &str = "correlated_matches.json";

/// Last successful correlation, for auditing the resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelatedMatch {
    pub account: String,
    pub alert: AlertNotification,
    pub candidate: MatchCandidate,
    pub details: MatchDetails,
    pub recorded_at: DateTime<Utc>,
}

/// Writes audit files into one directory.
#[derive(Debug, Clone)]
pub struct DataStore {
    dir: PathBuf,
}

impl DataStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Overwrite the provider dump with the latest raw batch.
    pub fn dump_notifications(&self, raw: &[serde_json::Value]) -> Result<()> {
        let path = self.dir.join(PROVIDER_DUMP_FILE);
        write_json(&path, &raw)?;
        debug!(path = %path.display(), count = raw.len(), "Provider batch dumped");
        Ok(())
    }

    pub fn save_correlated_match(&self, record: &CorrelatedMatch) -> Result<()> {
        let path = self.dir.join(CORRELATED_MATCHES_FILE);
        write_json(&path, record)?;
        debug!(path = %path.display(), event_id = %record.candidate.event_id, "Correlated match saved");
        Ok(())
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_DIR)
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value).context("Failed to serialise audit record")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
