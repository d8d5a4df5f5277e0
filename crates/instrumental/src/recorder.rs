//! Execution recorder.
//!
//! An owned aggregator of outcome records for every instrumented module of a
//! run. Taps call into it inline with normal execution, so it is mutated in
//! place without locking. Recorders from separate processes are folded
//! together with [`ExecutionRecorder::merge`], which is commutative and
//! associative.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::construct::{Construct, Label};
use crate::metadata::ModuleMetadata;
use crate::result::{InstrumentalError, InstrumentalResult};

/// Tag used when no context is active
pub const UNTAGGED: &str = "<untagged>";

/// Values that can flow through a tap
pub trait Truthiness {
    /// Truth value the host language assigns to the value
    fn is_truthy(&self) -> bool;
}

impl Truthiness for bool {
    fn is_truthy(&self) -> bool {
        *self
    }
}

impl<T: Truthiness + ?Sized> Truthiness for &T {
    fn is_truthy(&self) -> bool {
        (**self).is_truthy()
    }
}

/// Recorded state of one module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    /// Digest of the source the module was instrumented from
    pub source_digest: String,
    /// Constructs by label
    pub constructs: BTreeMap<Label, Construct>,
    /// Executable lines and whether each was hit
    pub statements: BTreeMap<u32, bool>,
}

impl ModuleRecord {
    fn from_metadata(metadata: &ModuleMetadata) -> Self {
        Self {
            source_digest: metadata.source_digest.clone(),
            constructs: metadata.constructs.clone(),
            statements: metadata.lines.iter().map(|&line| (line, false)).collect(),
        }
    }

    /// Lines never hit
    pub fn missing_lines(&self) -> impl Iterator<Item = u32> + '_ {
        self.statements
            .iter()
            .filter(|(_, hit)| !**hit)
            .map(|(line, _)| *line)
    }

    fn check_merge(&self, modulename: &str, other: &Self) -> InstrumentalResult<()> {
        if self.source_digest != other.source_digest {
            return Err(InstrumentalError::SourceDrift {
                modulename: modulename.to_string(),
                left: self.source_digest.clone(),
                right: other.source_digest.clone(),
            });
        }
        for (label, theirs) in &other.constructs {
            if let Some(ours) = self.constructs.get(label) {
                if !ours.same_shape(theirs) {
                    return Err(InstrumentalError::construct_mismatch(
                        modulename,
                        *label,
                        format!("{} cannot merge with {}", ours.kind_name(), theirs.kind_name()),
                    ));
                }
            }
        }
        Ok(())
    }

    fn merge(&mut self, other: &Self) -> InstrumentalResult<()> {
        for (label, theirs) in &other.constructs {
            match self.constructs.get_mut(label) {
                Some(ours) => ours.merge_outcomes(theirs)?,
                None => {
                    self.constructs.insert(*label, theirs.clone());
                }
            }
        }
        for (line, hit) in &other.statements {
            *self.statements.entry(*line).or_insert(false) |= *hit;
        }
        Ok(())
    }
}

/// Aggregates outcomes of every instrumented module in a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionRecorder {
    modules: BTreeMap<String, ModuleRecord>,
    #[serde(skip)]
    recording: bool,
    #[serde(skip)]
    contexts: Vec<String>,
}

impl PartialEq for ExecutionRecorder {
    fn eq(&self, other: &Self) -> bool {
        self.modules == other.modules
    }
}

impl Eq for ExecutionRecorder {}

impl ExecutionRecorder {
    /// Create an empty recorder that is not yet recording
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ---- switches ----

    /// Begin recording outcomes
    pub fn start(&mut self) {
        self.recording = true;
    }

    /// Stop recording; taps keep passing values through
    pub fn stop(&mut self) {
        self.recording = false;
    }

    /// Whether outcomes are being recorded
    #[must_use]
    pub const fn is_recording(&self) -> bool {
        self.recording
    }

    /// Tag subsequent records with `tag`
    pub fn start_context(&mut self, tag: impl Into<String>) {
        self.contexts.push(tag.into());
    }

    /// Leave the innermost context
    pub fn stop_context(&mut self) -> Option<String> {
        self.contexts.pop()
    }

    /// Tag applied to new records
    #[must_use]
    pub fn current_tag(&self) -> &str {
        self.contexts.last().map_or(UNTAGGED, String::as_str)
    }

    // ---- metadata ----

    /// Register a module's constructs and executable lines.
    ///
    /// Registering the same source twice keeps the outcomes already recorded.
    /// A module re-registered with different source starts over.
    pub fn add_metadata(&mut self, metadata: &ModuleMetadata) {
        let name = metadata.modulename.as_str();
        match self.modules.get_mut(name) {
            Some(existing) if existing.source_digest == metadata.source_digest => {
                for (label, construct) in &metadata.constructs {
                    existing
                        .constructs
                        .entry(*label)
                        .or_insert_with(|| construct.clone());
                }
                for line in &metadata.lines {
                    existing.statements.entry(*line).or_insert(false);
                }
            }
            Some(_) => {
                tracing::warn!(module = name, "module source changed, discarding recorded outcomes");
                self.modules
                    .insert(name.to_string(), ModuleRecord::from_metadata(metadata));
            }
            None => {
                tracing::debug!(
                    module = name,
                    constructs = metadata.constructs.len(),
                    lines = metadata.lines.len(),
                    "registered module"
                );
                self.modules
                    .insert(name.to_string(), ModuleRecord::from_metadata(metadata));
            }
        }
    }

    // ---- taps ----

    fn construct_mut(&mut self, modulename: &str, label: Label) -> InstrumentalResult<&mut Construct> {
        self.modules
            .get_mut(modulename)
            .and_then(|module| module.constructs.get_mut(&label))
            .ok_or_else(|| InstrumentalError::UnknownConstruct {
                modulename: modulename.to_string(),
                label,
            })
    }

    /// Pin tap: record one operand of a chain and hand the value back
    pub fn record_pin<T: Truthiness>(
        &mut self,
        value: T,
        modulename: &str,
        label: Label,
        pin: usize,
    ) -> InstrumentalResult<T> {
        if self.recording {
            let truth = value.is_truthy();
            let tag = self.current_tag().to_string();
            tracing::trace!(module = modulename, %label, pin, value = truth, "pin");
            self.construct_mut(modulename, label)?
                .record_pin(truth, pin, &tag)?;
        }
        Ok(value)
    }

    /// Decision tap: record a test value and hand it back
    pub fn record_decision<T: Truthiness>(
        &mut self,
        value: T,
        modulename: &str,
        label: Label,
    ) -> InstrumentalResult<T> {
        if self.recording {
            let truth = value.is_truthy();
            let tag = self.current_tag().to_string();
            tracing::trace!(module = modulename, %label, value = truth, "decision");
            self.construct_mut(modulename, label)?
                .record_decision(truth, &tag)?;
        }
        Ok(value)
    }

    /// Statement marker: mark a line as executed
    pub fn record_statement(&mut self, modulename: &str, line: u32) {
        if !self.recording {
            return;
        }
        if let Some(module) = self.modules.get_mut(modulename) {
            module.statements.insert(line, true);
        }
    }

    // ---- queries ----

    /// Every registered module by name
    #[must_use]
    pub const fn modules(&self) -> &BTreeMap<String, ModuleRecord> {
        &self.modules
    }

    /// One module's record
    #[must_use]
    pub fn module(&self, modulename: &str) -> Option<&ModuleRecord> {
        self.modules.get(modulename)
    }

    /// A construct by module and label
    #[must_use]
    pub fn construct(&self, modulename: &str, label: Label) -> Option<&Construct> {
        self.module(modulename)?.constructs.get(&label)
    }

    /// Every construct, ordered by module then label
    pub fn constructs(&self) -> impl Iterator<Item = &Construct> + '_ {
        self.modules
            .values()
            .flat_map(|module| module.constructs.values())
    }

    /// Line hits of a module
    #[must_use]
    pub fn statements(&self, modulename: &str) -> Option<&BTreeMap<u32, bool>> {
        self.module(modulename).map(|module| &module.statements)
    }

    // ---- lifecycle ----

    /// Fold another recorder's outcomes into this one.
    ///
    /// Nothing is changed when any module fails the drift or shape checks.
    pub fn merge(&mut self, other: &Self) -> InstrumentalResult<()> {
        for (name, theirs) in &other.modules {
            if let Some(ours) = self.modules.get(name) {
                ours.check_merge(name, theirs)?;
            }
        }
        for (name, theirs) in &other.modules {
            match self.modules.get_mut(name) {
                Some(ours) => ours.merge(theirs)?,
                None => {
                    self.modules.insert(name.clone(), theirs.clone());
                }
            }
        }
        tracing::debug!(modules = other.modules.len(), "merged recorder");
        Ok(())
    }

    /// Clear all state
    pub fn reset(&mut self) {
        self.modules.clear();
        self.contexts.clear();
        self.recording = false;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::GatherConfig;
    use crate::metadata::gather_source;
    use proptest::prelude::*;

    const SOURCE: &str = "\
if p and q and r:
    x = 1
while a or b:
    pass
";

    fn recorder() -> ExecutionRecorder {
        let mut recorder = ExecutionRecorder::new();
        recorder.add_metadata(&gather_source(GatherConfig::default(), "m", SOURCE).unwrap());
        recorder.start();
        recorder
    }

    fn and_label() -> Label {
        Label::new(1, 1)
    }

    #[test]
    fn test_taps_pass_values_through() {
        let mut recorder = recorder();
        assert!(recorder.record_pin(true, "m", and_label(), 0).unwrap());
        assert!(!recorder.record_pin(false, "m", and_label(), 1).unwrap());
    }

    #[test]
    fn test_short_circuit_records_first_false() {
        let mut recorder = recorder();
        recorder.start_context("run1");
        recorder.record_pin(true, "m", and_label(), 0).unwrap();
        recorder.record_pin(false, "m", and_label(), 1).unwrap();

        let construct = recorder.construct("m", and_label()).unwrap();
        let outcomes = construct.outcomes();
        for (bucket, (_, tags)) in outcomes.iter().enumerate() {
            if bucket == 2 {
                assert!(tags.contains("run1"));
            } else {
                assert!(tags.is_empty(), "bucket {bucket}");
            }
        }
    }

    #[test]
    fn test_stopped_recorder_records_nothing() {
        let mut recorder = recorder();
        recorder.stop();
        assert!(!recorder.is_recording());
        recorder.record_pin(false, "m", and_label(), 0).unwrap();
        recorder.record_statement("m", 1);
        assert_eq!(recorder.construct("m", and_label()).unwrap().number_of_conditions_hit(), 0);
        assert_eq!(recorder.statements("m").unwrap().get(&1), Some(&false));
    }

    #[test]
    fn test_unknown_construct_is_error() {
        let mut recorder = recorder();
        let err = recorder.record_decision(true, "m", Label::new(40, 1)).unwrap_err();
        assert!(matches!(err, InstrumentalError::UnknownConstruct { .. }));
        let err = recorder.record_decision(true, "other", and_label()).unwrap_err();
        assert!(err.is_internal_consistency());
    }

    #[test]
    fn test_out_of_range_pin_is_error() {
        let mut recorder = recorder();
        let err = recorder.record_pin(true, "m", and_label(), 7).unwrap_err();
        assert!(matches!(err, InstrumentalError::EvaluationOrder { .. }));
    }

    #[test]
    fn test_contexts_nest() {
        let mut recorder = recorder();
        assert_eq!(recorder.current_tag(), UNTAGGED);
        recorder.start_context("outer");
        recorder.start_context("inner");
        assert_eq!(recorder.current_tag(), "inner");
        assert_eq!(recorder.stop_context().as_deref(), Some("inner"));
        assert_eq!(recorder.current_tag(), "outer");
    }

    #[test]
    fn test_statement_hits() {
        let mut recorder = recorder();
        recorder.record_statement("m", 2);
        let statements = recorder.statements("m").unwrap();
        assert_eq!(statements.get(&2), Some(&true));
        assert_eq!(statements.get(&1), Some(&false));
        let missing: Vec<u32> = recorder.module("m").unwrap().missing_lines().collect();
        assert_eq!(missing, vec![1, 3, 4]);
    }

    #[test]
    fn test_statement_of_unknown_module_is_ignored() {
        let mut stray = ExecutionRecorder::new();
        stray.start();
        stray.record_statement("ghost", 3);
        assert!(stray.modules().is_empty());

        let mut registered = ExecutionRecorder::new();
        registered.add_metadata(&gather_source(GatherConfig::default(), "ghost", "x = 1\n").unwrap());
        registered.start();
        registered.record_statement("ghost", 1);
        assert!(registered.merge(&stray).is_ok());
        assert_eq!(registered.statements("ghost").unwrap().get(&1), Some(&true));
    }

    #[test]
    fn test_readding_metadata_keeps_outcomes() {
        let mut recorder = recorder();
        recorder.record_pin(false, "m", and_label(), 0).unwrap();
        recorder.add_metadata(&gather_source(GatherConfig::default(), "m", SOURCE).unwrap());
        assert_eq!(recorder.construct("m", and_label()).unwrap().number_of_conditions_hit(), 1);
    }

    #[test]
    fn test_merge_rejects_source_drift() {
        let mut left = recorder();
        let mut right = ExecutionRecorder::new();
        right.add_metadata(&gather_source(GatherConfig::default(), "m", "x = a or b\n").unwrap());
        let err = left.merge(&right).unwrap_err();
        assert!(matches!(err, InstrumentalError::SourceDrift { .. }));
    }

    #[test]
    fn test_merge_copies_missing_modules() {
        let mut left = ExecutionRecorder::new();
        let right = recorder();
        left.merge(&right).unwrap();
        assert_eq!(left, right);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut recorder = recorder();
        recorder.start_context("t");
        recorder.reset();
        assert!(recorder.modules().is_empty());
        assert!(!recorder.is_recording());
        assert_eq!(recorder.current_tag(), UNTAGGED);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut recorder = recorder();
        recorder.start_context("t1");
        recorder.record_pin(true, "m", Label::new(3, 1), 0).unwrap();
        recorder.record_statement("m", 3);
        let json = serde_json::to_string(&recorder).unwrap();
        let restored: ExecutionRecorder = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, recorder);
        assert!(!restored.is_recording());
    }

    /// One simulated run: a tag plus the operand values fed to each chain
    fn run(tag: &str, and_values: &[bool], or_values: &[bool], lines: &[u32]) -> ExecutionRecorder {
        let mut recorder = recorder();
        recorder.start_context(tag);
        for (pin, value) in and_values.iter().enumerate() {
            recorder.record_pin(*value, "m", and_label(), pin).unwrap();
            if !*value {
                break;
            }
        }
        for (pin, value) in or_values.iter().enumerate() {
            recorder.record_pin(*value, "m", Label::new(3, 1), pin).unwrap();
            if *value {
                break;
            }
        }
        for line in lines {
            recorder.record_statement("m", *line);
        }
        recorder
    }

    fn arb_run() -> impl Strategy<Value = ExecutionRecorder> {
        (
            "[a-c]",
            proptest::collection::vec(any::<bool>(), 3),
            proptest::collection::vec(any::<bool>(), 2),
            proptest::collection::vec(1u32..=4, 0..4),
        )
            .prop_map(|(tag, and_values, or_values, lines)| run(&tag, &and_values, &or_values, &lines))
    }

    fn merged(a: &ExecutionRecorder, b: &ExecutionRecorder) -> ExecutionRecorder {
        let mut out = a.clone();
        out.merge(b).unwrap();
        out
    }

    proptest! {
        #[test]
        fn prop_merge_is_commutative(a in arb_run(), b in arb_run()) {
            prop_assert_eq!(merged(&a, &b), merged(&b, &a));
        }

        #[test]
        fn prop_merge_is_associative(a in arb_run(), b in arb_run(), c in arb_run()) {
            prop_assert_eq!(merged(&merged(&a, &b), &c), merged(&a, &merged(&b, &c)));
        }

        #[test]
        fn prop_decision_tap_passes_through(value in any::<bool>()) {
            let mut recorder = recorder();
            recorder.add_metadata(&gather_source(GatherConfig::default(), "d", "if a:\n    pass\n").unwrap());
            prop_assert_eq!(recorder.record_decision(value, "d", Label::new(1, 1)).unwrap(), value);
            prop_assert_eq!(recorder.record_pin(value, "m", Label::new(3, 1), 1).unwrap(), value);
        }
    }
}
