//! Instrumentation engine boundary and shadow file output.
//!
//! The engine that decides where probes go is external to this crate; it is
//! reached through the [`Instrumenter`] trait. The only shipped
//! implementation, [`ExternalInstrumenter`], talks JSON to a configured
//! command. Whatever the engine returns is written next to the originals by
//! [`write_shadow_files`].

mod external;
mod writer;

pub use external::ExternalInstrumenter;
pub use writer::{find_shadow_files, is_shadow_file, remove_shadow_files, shadow_path, write_shadow_files};

use crate::coverage::{InstrumentationData, SiteId};
use crate::errors::InstrumentError;
use crate::select::SourceFile;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

/// A source file together with its probed rewrite.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentedFile {
    pub file: SourceFile,
    pub instrumented: String,
    /// Sites the engine placed in this file, with engine-owned metadata.
    pub sites: BTreeMap<SiteId, Value>,
}

/// Everything the engine produced for one run.
#[derive(Debug, Clone, Default)]
pub struct Instrumentation {
    pub files: Vec<InstrumentedFile>,
    pub data: InstrumentationData,
}

impl Instrumentation {
    /// Build the run's coverage data from the sites of each file, every one
    /// starting at zero hits.
    pub fn from_files(files: Vec<InstrumentedFile>) -> Self {
        let mut data = InstrumentationData::new();
        for file in &files {
            for (site, metadata) in &file.sites {
                data.register(site.clone(), metadata.clone());
            }
        }
        Self { files, data }
    }
}

/// The probe-injection engine.
#[async_trait]
pub trait Instrumenter: Send + Sync {
    /// Instrument every target. Implementations must return exactly one
    /// `InstrumentedFile` per input, in input order.
    async fn instrument(&self, targets: &[SourceFile]) -> Result<Instrumentation, InstrumentError>;
}
