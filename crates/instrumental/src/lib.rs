//! Instrumental: condition/decision coverage for host syntax trees
//!
//! Line coverage says whether a statement ran. Instrumental also says which
//! short-circuit outcome every `and`/`or` chain and every branch condition
//! produced, and under which tags (usually test names).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  INSTRUMENTAL PIPELINE                                            │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  source ─► PragmaFinder ─► MetadataGatherer ─► CoverageAnnotator  │
//! │                 │               │                    │            │
//! │            PragmaMap     ModuleMetadata       instrumented tree   │
//! │                                 │                    │            │
//! │                                 ▼                    ▼            │
//! │                        ExecutionRecorder ◄──── taps (runtime)     │
//! │                                 │                                 │
//! │                    ResultStore / combine / ExecutionReport        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use instrumental::{Coverage, ExecutionReport, InstrumentalConfig};
//!
//! let dir = std::env::temp_dir();
//! let mut coverage = Coverage::new(InstrumentalConfig::default(), dir);
//! coverage.start();
//! coverage.start_context("example");
//! coverage
//!     .run_source("demo", "p = True\nq = False\nx = p and q\n")
//!     .expect("runs");
//! let summary = ExecutionReport::new(coverage.recorder()).summary();
//! assert_eq!(summary, "demo: 1/3 hit (33%)");
//! ```

#![warn(missing_docs)]

pub mod api;
pub mod config;
pub mod construct;
pub mod instrument;
pub mod metadata;
pub mod pragma;
pub mod recorder;
pub mod report;
pub mod result;
pub mod runtime;
pub mod storage;
pub mod syntax;

pub use api::{Coverage, GatherFailure, InstrumentationService};
pub use config::{GatherConfig, InstrumentalConfig, InstrumentalConfigBuilder};
pub use construct::{
    BooleanDecision, Construct, DecisionKind, Label, LogicalAnd, LogicalOr, Origin, TagSet,
};
pub use instrument::{CoverageAnnotator, RECORDER_BINDING};
pub use metadata::{
    gather_file, gather_source, FileBackedMetadataCache, LabelAllocator, MetadataCache,
    MetadataGatherer, ModuleMetadata, NullMetadataCache,
};
pub use pragma::{Pragma, PragmaFinder, PragmaMap};
pub use recorder::{ExecutionRecorder, ModuleRecord, Truthiness, UNTAGGED};
pub use report::{ExecutionReport, ModuleSummary};
pub use result::{InstrumentalError, InstrumentalResult};
pub use runtime::{Interpreter, RuntimeError, RuntimeResult, Value};
pub use storage::{combine, process_label, ResultStore, DEFAULT_STORE_FILE};

#[cfg(test)]
mod tests;
