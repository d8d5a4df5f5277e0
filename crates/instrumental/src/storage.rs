//! Persisted recorder snapshots.

use std::path::{Path, PathBuf};

use crate::recorder::ExecutionRecorder;
use crate::result::{InstrumentalError, InstrumentalResult};

/// Store file name used when none is configured
pub const DEFAULT_STORE_FILE: &str = ".instrumental.cov";

/// Label distinguishing this process's store from its siblings
#[must_use]
pub fn process_label() -> String {
    format!("p{}", std::process::id())
}

/// Location of one persisted recorder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultStore {
    base_dir: PathBuf,
    label: Option<String>,
    filename: String,
}

impl ResultStore {
    /// Store named `filename` under `base_dir`
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            label: None,
            filename: filename.into(),
        }
    }

    /// Default store under `base_dir`
    #[must_use]
    pub fn in_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self::new(base_dir, DEFAULT_STORE_FILE)
    }

    /// Suffix the file name with `label`
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Disambiguating label, if any
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// `<base_dir>/<filename>[.<label>]`
    #[must_use]
    pub fn path(&self) -> PathBuf {
        match &self.label {
            Some(label) => self.base_dir.join(format!("{}.{label}", self.filename)),
            None => self.base_dir.join(&self.filename),
        }
    }

    /// Write a recorder snapshot
    pub fn save(&self, recorder: &ExecutionRecorder) -> InstrumentalResult<PathBuf> {
        let path = self.path();
        write_recorder(&path, recorder)?;
        Ok(path)
    }

    /// Read the snapshot back
    pub fn load(&self) -> InstrumentalResult<ExecutionRecorder> {
        read_recorder(self.path())
    }
}

/// Write a recorder snapshot as JSON
pub fn write_recorder(path: impl AsRef<Path>, recorder: &ExecutionRecorder) -> InstrumentalResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| InstrumentalError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(recorder)?;
    std::fs::write(path, json).map_err(|e| InstrumentalError::io(path, e))?;
    tracing::debug!(path = %path.display(), modules = recorder.modules().len(), "saved recorder");
    Ok(())
}

/// Read a recorder snapshot
pub fn read_recorder(path: impl AsRef<Path>) -> InstrumentalResult<ExecutionRecorder> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|e| InstrumentalError::io(path, e))?;
    Ok(serde_json::from_str(&json)?)
}

/// Merge every input store into one and write it to `output`
pub fn combine(
    output: impl AsRef<Path>,
    inputs: &[impl AsRef<Path>],
) -> InstrumentalResult<ExecutionRecorder> {
    let mut combined = ExecutionRecorder::new();
    for input in inputs {
        let input = input.as_ref();
        let recorder = read_recorder(input)?;
        combined.merge(&recorder)?;
        tracing::debug!(input = %input.display(), "combined store");
    }
    write_recorder(output, &combined)?;
    Ok(combined)
}
