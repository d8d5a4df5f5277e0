//! Module metadata: executable lines and labelled constructs.
//!
//! Metadata is gathered once per source text by a read-only walk of the
//! module tree and can be cached across runs. The rewriter consumes it and
//! checks every label it allocates against it.

mod cache;
mod gatherer;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::GatherConfig;
use crate::construct::{Construct, Label};
use crate::pragma::{PragmaFinder, PragmaMap};
use crate::result::{InstrumentalError, InstrumentalResult};
use crate::syntax;

pub use cache::{FileBackedMetadataCache, MetadataCache, NullMetadataCache, CACHE_DIR};
pub use gatherer::MetadataGatherer;

/// Hex SHA-256 of a source text
#[must_use]
pub fn source_digest(source: &str) -> String {
    format!("{:x}", Sha256::digest(source.as_bytes()))
}

/// Everything known about one module before it runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    /// Module name
    pub modulename: String,
    /// Digest of the source the metadata was gathered from
    pub source_digest: String,
    /// Executable line numbers
    pub lines: BTreeSet<u32>,
    /// Constructs by label
    pub constructs: BTreeMap<Label, Construct>,
    /// Propagated pragmas
    pub pragmas: PragmaMap,
    /// Switches the metadata was gathered with
    #[serde(default)]
    pub config: GatherConfig,
}

impl ModuleMetadata {
    /// Create empty metadata for a source text
    #[must_use]
    pub fn new(
        modulename: impl Into<String>,
        source: &str,
        pragmas: PragmaMap,
        config: GatherConfig,
    ) -> Self {
        Self {
            modulename: modulename.into(),
            source_digest: source_digest(source),
            lines: BTreeSet::new(),
            constructs: BTreeMap::new(),
            pragmas,
            config,
        }
    }

    /// Construct with the given label
    #[must_use]
    pub fn construct(&self, label: Label) -> Option<&Construct> {
        self.constructs.get(&label)
    }

    /// Whether this metadata was gathered from exactly this source text
    #[must_use]
    pub fn matches_source(&self, source: &str) -> bool {
        self.source_digest == source_digest(source)
    }
}

/// Allocates labels: the first index not yet used on a line.
///
/// The gatherer and the rewriter each own one and walk the tree in the same
/// order, so both arrive at the same label for the same construct.
#[derive(Debug, Clone, Default)]
pub struct LabelAllocator {
    used: BTreeSet<Label>,
}

impl LabelAllocator {
    /// Create an allocator with no labels used
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next label on a line
    pub fn next_label(&mut self, line: u32) -> Label {
        let mut index = 1;
        while self.used.contains(&Label::new(line, index)) {
            index += 1;
        }
        let label = Label::new(line, index);
        self.used.insert(label);
        label
    }
}

/// Gather metadata for one source file, consulting a cache first
pub fn gather_file(
    config: GatherConfig,
    path: &Path,
    modulename: &str,
    cache: &dyn MetadataCache,
) -> InstrumentalResult<ModuleMetadata> {
    match cache.fetch(path) {
        Ok(Some(metadata)) if metadata.modulename == modulename && metadata.config == config => {
            tracing::debug!(module = modulename, path = %path.display(), "metadata cache hit");
            return Ok(metadata);
        }
        Ok(_) => {}
        Err(err) => {
            tracing::warn!(module = modulename, error = %err, "unreadable metadata cache record");
        }
    }

    let source = std::fs::read_to_string(path).map_err(|e| InstrumentalError::io(path, e))?;
    let metadata = gather_source(config, modulename, &source)?;
    if let Err(err) = cache.store(path, &metadata) {
        tracing::warn!(module = modulename, error = %err, "failed to write metadata cache record");
    }
    Ok(metadata)
}

/// Find pragmas and gather metadata for a source text
pub fn gather_source(
    config: GatherConfig,
    modulename: &str,
    source: &str,
) -> InstrumentalResult<ModuleMetadata> {
    let module = syntax::parse(source).map_err(|source| InstrumentalError::Parse {
        modulename: modulename.to_string(),
        source,
    })?;
    let pragmas = PragmaFinder::new()?.find_in(source, &module);
    Ok(MetadataGatherer::analyze_module(
        config, modulename, source, &module, pragmas,
    ))
}
