//! Session configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::result::{InstrumentalError, InstrumentalResult};
use crate::storage::DEFAULT_STORE_FILE;

/// Switches that change which constructs the gatherer creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatherConfig {
    /// Track `assert` conditions as decisions
    pub instrument_assertions: bool,
    /// Track comparisons as decisions
    pub instrument_comparisons: bool,
}

impl Default for GatherConfig {
    fn default() -> Self {
        Self {
            instrument_assertions: true,
            instrument_comparisons: false,
        }
    }
}

/// Configuration of a coverage session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentalConfig {
    /// Track `assert` conditions as decisions
    pub instrument_assertions: bool,
    /// Track comparisons as decisions
    pub instrument_comparisons: bool,
    /// Reuse gathered metadata across runs
    pub use_metadata_cache: bool,
    /// Suffix the store file with the process label
    pub label_store: bool,
    /// Store file name
    pub file: String,
    /// Module names to instrument
    pub targets: Vec<String>,
}

impl Default for InstrumentalConfig {
    fn default() -> Self {
        Self {
            instrument_assertions: true,
            instrument_comparisons: false,
            use_metadata_cache: false,
            label_store: false,
            file: DEFAULT_STORE_FILE.to_string(),
            targets: Vec::new(),
        }
    }
}

impl InstrumentalConfig {
    /// Create a builder
    #[must_use]
    pub fn builder() -> InstrumentalConfigBuilder {
        InstrumentalConfigBuilder::default()
    }

    /// Gatherer switches
    #[must_use]
    pub const fn gather(&self) -> GatherConfig {
        GatherConfig {
            instrument_assertions: self.instrument_assertions,
            instrument_comparisons: self.instrument_comparisons,
        }
    }

    /// Whether `modulename` should be instrumented.
    ///
    /// An empty target list selects every module; a target also selects
    /// its submodules (`pkg` selects `pkg.util`).
    #[must_use]
    pub fn is_target(&self, modulename: &str) -> bool {
        self.targets.is_empty()
            || self.targets.iter().any(|target| {
                modulename == target
                    || modulename
                        .strip_prefix(target.as_str())
                        .is_some_and(|rest| rest.starts_with('.'))
            })
    }

    /// Parse configuration from YAML text
    pub fn from_yaml_str(text: &str) -> InstrumentalResult<Self> {
        let config: Self = serde_yaml_ng::from_str(text)
            .map_err(|e| InstrumentalError::config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> InstrumentalResult<Self> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(|e| InstrumentalError::io(path, e))?;
        Self::from_yaml_str(&text)
    }

    /// Check invariants the type cannot express
    pub fn validate(&self) -> InstrumentalResult<()> {
        if self.file.trim().is_empty() {
            return Err(InstrumentalError::config("store file name is empty"));
        }
        if self.file.contains('/') || self.file.contains('\\') {
            return Err(InstrumentalError::config(format!(
                "store file name '{}' must not contain a path separator",
                self.file
            )));
        }
        Ok(())
    }
}

/// Builder for [`InstrumentalConfig`]
#[derive(Debug, Default)]
pub struct InstrumentalConfigBuilder {
    config: InstrumentalConfig,
}

impl InstrumentalConfigBuilder {
    /// Track `assert` conditions
    #[must_use]
    pub fn instrument_assertions(mut self, enabled: bool) -> Self {
        self.config.instrument_assertions = enabled;
        self
    }

    /// Track comparisons
    #[must_use]
    pub fn instrument_comparisons(mut self, enabled: bool) -> Self {
        self.config.instrument_comparisons = enabled;
        self
    }

    /// Reuse gathered metadata
    #[must_use]
    pub fn use_metadata_cache(mut self, enabled: bool) -> Self {
        self.config.use_metadata_cache = enabled;
        self
    }

    /// Suffix the store file with the process label
    #[must_use]
    pub fn label_store(mut self, enabled: bool) -> Self {
        self.config.label_store = enabled;
        self
    }

    /// Set the store file name
    #[must_use]
    pub fn file(mut self, file: impl Into<String>) -> Self {
        self.config.file = file.into();
        self
    }

    /// Add a target module
    #[must_use]
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.config.targets.push(target.into());
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> InstrumentalConfig {
        let mut config = self.config;
        if config.file.trim().is_empty() {
            config.file = DEFAULT_STORE_FILE.to_string();
        }
        config
    }
}
