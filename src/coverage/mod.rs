//! Accumulated coverage state.
//!
//! `InstrumentationData` maps every probe site the instrumentation engine
//! assigned to a counter record. Sites are seeded with zero hits when files
//! are instrumented; afterwards only [`CoverageMerger`] changes the counts,
//! and it never adds sites.

mod merger;

pub use merger::{CoverageMerger, DEFAULT_SENTINEL, LineOutcome, MergeStats};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Opaque identifier of a probe location, as assigned by the instrumenter.
pub type SiteId = String;

/// Counter record for a single site.
///
/// `metadata` is whatever the instrumentation engine attached to the site;
/// it is carried through to the report untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteCounter {
    pub hits: u64,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// Site id -> counter mapping for one orchestration run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentationData {
    sites: BTreeMap<SiteId, SiteCounter>,
}

impl InstrumentationData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a site with zero hits.
    ///
    /// Re-registering an existing site replaces its metadata and resets the
    /// count. A `hits` key inside `metadata` is dropped; the counter owns it.
    pub fn register(&mut self, site: impl Into<SiteId>, metadata: Value) {
        let mut metadata = match metadata {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        metadata.remove("hits");
        self.sites
            .insert(site.into(), SiteCounter { hits: 0, metadata });
    }

    /// Add `hits` to a known site. Returns `false` (and changes nothing) for
    /// unknown sites.
    pub fn add_hits(&mut self, site: &str, hits: u64) -> bool {
        match self.sites.get_mut(site) {
            Some(counter) => {
                counter.hits = counter.hits.saturating_add(hits);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, site: &str) -> Option<&SiteCounter> {
        self.sites.get(site)
    }

    pub fn contains(&self, site: &str) -> bool {
        self.sites.contains_key(site)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SiteId, &SiteCounter)> {
        self.sites.iter()
    }

    pub fn summary(&self) -> CoverageSummary {
        CoverageSummary {
            total_sites: self.sites.len(),
            hit_sites: self.sites.values().filter(|c| c.hits > 0).count(),
            total_hits: self
                .sites
                .values()
                .fold(0u64, |acc, c| acc.saturating_add(c.hits)),
        }
    }
}

/// Aggregate counts over the whole data set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageSummary {
    pub total_sites: usize,
    pub hit_sites: usize,
    pub total_hits: u64,
}

/// On-disk hand-off format consumed by report renderers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageReport {
    pub generated_at: DateTime<Utc>,
    pub sites: InstrumentationData,
}

impl CoverageReport {
    pub fn new(sites: InstrumentationData) -> Self {
        Self {
            generated_at: Utc::now(),
            sites,
        }
    }

    /// Write the report as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create report directory: {}", parent.display())
            })?;
        }
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize coverage data")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write coverage data: {}", path.display()))?;
        Ok(())
    }
}
