//! Extraction of coverage payloads from test output.
//!
//! Tests running in coverage mode print their hit counters as
//! `[ETHIER_COVERAGE]{"<site>":{"hits":N}}[ETHIER_COVERAGE]` somewhere on a
//! line of otherwise free-form output. Each such payload is merged into the
//! run's [`InstrumentationData`] by adding hits to known sites.

use super::InstrumentationData;
use crate::errors::PayloadParseError;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;

/// Sentinel token the test tooling wraps payloads in.
pub const DEFAULT_SENTINEL: &str = "[ETHIER_COVERAGE]";

#[derive(Debug, Deserialize)]
struct PayloadCounter {
    hits: u64,
}

/// What happened to a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    /// No payload on the line.
    Plain,
    /// A payload was merged. `ignored` counts sites the run doesn't know.
    Merged { matched: usize, ignored: usize },
}

/// Running totals over every line seen by a merger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub lines: usize,
    pub payload_lines: usize,
    pub malformed_lines: usize,
    pub ignored_sites: usize,
}

/// Stateful line consumer that owns the run's coverage data.
#[derive(Debug)]
pub struct CoverageMerger {
    data: InstrumentationData,
    pattern: Regex,
    stats: MergeStats,
}

impl CoverageMerger {
    pub fn new(data: InstrumentationData, sentinel: &str) -> Self {
        let escaped = regex::escape(sentinel);
        let pattern = Regex::new(&format!("{escaped}(.+?){escaped}"))
            .expect("escaped sentinel is a valid regex");
        Self {
            data,
            pattern,
            stats: MergeStats::default(),
        }
    }

    /// Parse one line and merge its payload, if any.
    ///
    /// Only the first sentinel pair on a line is considered. A line whose
    /// enclosed text is not a valid payload leaves the data unchanged.
    pub fn process_line(&mut self, line: &str) -> Result<LineOutcome, PayloadParseError> {
        let Some(payload) = self
            .pattern
            .captures(line)
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str())
        else {
            return Ok(LineOutcome::Plain);
        };

        let counters: HashMap<String, PayloadCounter> =
            serde_json::from_str(payload).map_err(|source| PayloadParseError { source })?;

        let mut matched = 0;
        let mut ignored = 0;
        for (site, counter) in counters {
            if self.data.add_hits(&site, counter.hits) {
                matched += 1;
            } else {
                ignored += 1;
            }
        }
        Ok(LineOutcome::Merged { matched, ignored })
    }

    /// Feed a line from a running stage. Malformed payloads are logged and
    /// skipped so one bad line never costs the rest of the run's data.
    pub fn ingest(&mut self, line: &str) {
        self.stats.lines += 1;
        tracing::trace!(target: "solcover::output", "{}", line);

        match self.process_line(line) {
            Ok(LineOutcome::Plain) => {}
            Ok(LineOutcome::Merged { matched, ignored }) => {
                self.stats.payload_lines += 1;
                self.stats.ignored_sites += ignored;
                tracing::debug!(matched, ignored, "Merged coverage payload");
            }
            Err(e) => {
                self.stats.malformed_lines += 1;
                tracing::warn!(error = %e, "Skipping coverage payload line");
            }
        }
    }

    pub fn stats(&self) -> MergeStats {
        self.stats
    }

    pub fn data(&self) -> &InstrumentationData {
        &self.data
    }

    pub fn into_data(self) -> InstrumentationData {
        self.data
    }
}
