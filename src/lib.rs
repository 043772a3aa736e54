#![forbid(unsafe_code)]

//! # annotrail
//!
//! Reliability analysis and provenance trails for LLM-assisted qualitative
//! coding.
//!
//! A coding run (LLM or human) yields a [`CodedResult`]: per-unit coded
//! fields plus run metadata. From there:
//! - [`compare`] measures inter-rater reliability across runs, choosing the
//!   statistic battery by measurement level and rater count;
//! - [`validate`] scores one run against a gold standard;
//! - [`build_trail`] reconstructs the provenance chain linking any set of
//!   results through their parent references, flagging missing links;
//! - the [`export`] module persists a trail as a binary archive, portable
//!   JSON metadata, or a Quarto/R Markdown report.
//!
//! The LLM invocation layer itself is out of scope: this crate consumes
//! already-produced results.

pub mod export;
pub mod record;
pub mod reliability;
pub mod trail;

pub use export::{
    archive_objects, export_json, export_report, read_archive, write_archive, ExportError,
    PortableTrail, ReportDialect, ReportOptions, RobustnessStat, RobustnessSummary, TrailArchive,
};
pub use record::{
    AverageMethod, ClassMetrics, Codebook, CodedResult, CodedUnit, ComparisonMetrics,
    ComparisonResult, FieldValue, KappaType, MeasurementLevel, RecordError, RunArgs, RunMetadata,
    RunStamp, ValidationMetrics, ValidationResult,
};
pub use reliability::{compare, validate, GoldStandard, ReliabilityError};
pub use trail::{build_trail, RunKind, Trail, TrailError, TrailNode, TrailSource};
