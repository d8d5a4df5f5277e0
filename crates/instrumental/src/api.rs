//! Coverage sessions.
//!
//! [`Coverage`] ties the pipeline together: pragmas, metadata (optionally
//! cached), registration with the recorder, rewriting and persistence.

use std::path::{Path, PathBuf};

use crate::config::InstrumentalConfig;
use crate::instrument::CoverageAnnotator;
use crate::metadata::{
    gather_file, FileBackedMetadataCache, MetadataCache, MetadataGatherer, ModuleMetadata,
    NullMetadataCache,
};
use crate::pragma::PragmaFinder;
use crate::recorder::ExecutionRecorder;
use crate::result::{InstrumentalError, InstrumentalResult};
use crate::runtime::{Interpreter, RuntimeResult};
use crate::storage::{process_label, ResultStore};
use crate::syntax::{self, Module};

/// Turns source text into an instrumented, executable tree.
///
/// The seam a module loader calls when it wants instrumented code.
pub trait InstrumentationService {
    /// Instrument one module's source
    fn rewrite(&mut self, modulename: &str, source: &str) -> InstrumentalResult<Module>;
}

/// A module whose metadata could not be gathered
#[derive(Debug)]
pub struct GatherFailure {
    /// Module name
    pub modulename: String,
    /// Why gathering failed
    pub error: InstrumentalError,
}

/// One coverage session
pub struct Coverage {
    config: InstrumentalConfig,
    base_dir: PathBuf,
    recorder: Option<ExecutionRecorder>,
    cache: Box<dyn MetadataCache>,
}

impl std::fmt::Debug for Coverage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coverage")
            .field("config", &self.config)
            .field("base_dir", &self.base_dir)
            .field("recorder", &self.recorder.is_some())
            .finish_non_exhaustive()
    }
}

impl Coverage {
    /// Create a session rooted at `base_dir`
    pub fn new(config: InstrumentalConfig, base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let cache: Box<dyn MetadataCache> = if config.use_metadata_cache {
            Box::new(FileBackedMetadataCache::new(&base_dir))
        } else {
            Box::new(NullMetadataCache)
        };
        Self {
            config,
            base_dir,
            recorder: None,
            cache,
        }
    }

    /// Session configuration
    #[must_use]
    pub const fn config(&self) -> &InstrumentalConfig {
        &self.config
    }

    /// Directory stores and caches live under
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// The session's recorder, created on first use
    pub fn recorder(&mut self) -> &mut ExecutionRecorder {
        self.recorder.get_or_insert_with(ExecutionRecorder::new)
    }

    /// Whether the recorder is recording
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.recorder.as_ref().is_some_and(ExecutionRecorder::is_recording)
    }

    /// Start recording
    pub fn start(&mut self) {
        self.recorder().start();
    }

    /// Stop recording
    pub fn stop(&mut self) {
        self.recorder().stop();
    }

    /// Tag subsequent records
    pub fn start_context(&mut self, tag: impl Into<String>) {
        self.recorder().start_context(tag);
    }

    /// Leave the innermost tag context
    pub fn stop_context(&mut self) -> Option<String> {
        self.recorder().stop_context()
    }

    fn parse(modulename: &str, source: &str) -> InstrumentalResult<Module> {
        syntax::parse(source).map_err(|source| InstrumentalError::Parse {
            modulename: modulename.to_string(),
            source,
        })
    }

    fn finish(
        &mut self,
        modulename: &str,
        module: &Module,
        metadata: &ModuleMetadata,
    ) -> InstrumentalResult<Module> {
        self.recorder().add_metadata(metadata);
        CoverageAnnotator::instrument(modulename, module, metadata, &metadata.pragmas)
    }

    /// Gather, register and rewrite a module given as text
    pub fn instrument_source(&mut self, modulename: &str, source: &str) -> InstrumentalResult<Module> {
        let module = Self::parse(modulename, source)?;
        let pragmas = PragmaFinder::new()?.find_in(source, &module);
        let metadata = MetadataGatherer::analyze_module(
            self.config.gather(),
            modulename,
            source,
            &module,
            pragmas,
        );
        self.finish(modulename, &module, &metadata)
    }

    /// Gather (through the cache), register and rewrite a module file
    pub fn instrument_file(&mut self, path: &Path, modulename: &str) -> InstrumentalResult<Module> {
        let source = std::fs::read_to_string(path).map_err(|e| InstrumentalError::io(path, e))?;
        let module = Self::parse(modulename, &source)?;
        let mut metadata = gather_file(self.config.gather(), path, modulename, self.cache.as_ref())?;
        if !metadata.matches_source(&source) {
            tracing::debug!(module = modulename, "cached metadata is stale, regathering");
            let pragmas = PragmaFinder::new()?.find_in(&source, &module);
            metadata = MetadataGatherer::analyze_module(
                self.config.gather(),
                modulename,
                &source,
                &module,
                pragmas,
            );
        }
        self.finish(modulename, &module, &metadata)
    }

    /// Gather and register metadata for several modules.
    ///
    /// A module that fails is logged and reported back; the rest still get
    /// registered.
    pub fn gather(&mut self, modules: &[(String, PathBuf)]) -> Vec<GatherFailure> {
        let gather = self.config.gather();
        let mut failures = Vec::new();
        for (modulename, path) in modules {
            match gather_file(gather, path, modulename, self.cache.as_ref()) {
                Ok(metadata) => self.recorder().add_metadata(&metadata),
                Err(error) => {
                    tracing::warn!(module = %modulename, error = %error, "failed to gather metadata");
                    failures.push(GatherFailure {
                        modulename: modulename.clone(),
                        error,
                    });
                }
            }
        }
        failures
    }

    /// Instrument a module given as text and execute it, returning what it
    /// printed
    pub fn run_source(&mut self, modulename: &str, source: &str) -> RuntimeResult<Vec<String>> {
        let module = self.instrument_source(modulename, source)?;
        let mut interpreter = Interpreter::new(self.recorder());
        interpreter.run(&module)?;
        Ok(interpreter.take_output())
    }

    /// Store this session saves to
    #[must_use]
    pub fn store(&self) -> ResultStore {
        let store = ResultStore::new(&self.base_dir, self.config.file.clone());
        if self.config.label_store {
            store.with_label(process_label())
        } else {
            store
        }
    }

    /// Persist the recorder
    pub fn save(&mut self) -> InstrumentalResult<PathBuf> {
        let store = self.store();
        store.save(self.recorder())
    }

    /// Read the recorder this session's store holds
    pub fn load(&self) -> InstrumentalResult<ExecutionRecorder> {
        self.store().load()
    }
}

impl InstrumentationService for Coverage {
    fn rewrite(&mut self, modulename: &str, source: &str) -> InstrumentalResult<Module> {
        self.instrument_source(modulename, source)
    }
}
