//! Trail exporters: archival snapshot, portable JSON metadata, and
//! human-readable reports. Pure output formatting over a built [`Trail`];
//! no new analysis happens here.
//!
//! [`Trail`]: crate::trail::Trail

mod archive;
mod portable;
mod report;

pub use archive::{archive_objects, read_archive, write_archive, SchemaVersion, TrailArchive};
pub use portable::{export_json, portable_metadata, PortableRun, PortableTrail};
pub use report::{
    export_report, render_report, ReportDialect, ReportOptions, RobustnessStat, RobustnessSummary,
};

use crate::trail::TrailError;

/// Errors during export.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Destination unwritable or unreadable.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failure.
    #[error("serialization error: {0}")]
    Serialize(String),

    /// Archive content hash does not match its trail.
    #[error("archive at '{path}' is corrupt: content hash mismatch")]
    Corrupt { path: String },

    /// Report destination has an unsupported extension.
    #[error("unsupported report extension for '{path}': expected .qmd or .Rmd")]
    UnsupportedExtension { path: String },

    /// Robustness input does not have the expected shape.
    #[error("malformed robustness summary: {0}")]
    MalformedRobustness(String),

    /// Building a trail inside a convenience function failed.
    #[error(transparent)]
    Trail(#[from] TrailError),
}

impl ExportError {
    /// Short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "io_error",
            Self::Serialize(_) => "serialize_error",
            Self::Corrupt { .. } => "corrupt_archive",
            Self::UnsupportedExtension { .. } => "unsupported_extension",
            Self::MalformedRobustness(_) => "malformed_robustness",
            Self::Trail(_) => "trail_error",
        }
    }
}
