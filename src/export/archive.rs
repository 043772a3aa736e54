//! Archival snapshot: a reloadable binary serialization of a trail.
//!
//! The format is opaque to other tools and round-trippable only by this
//! crate; the portable JSON export is the interchange format.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::ExportError;
use crate::trail::{build_trail, Trail, TrailSource};

/// Semantic version of the archive payload schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SchemaVersion {
    pub const CURRENT: Self = Self {
        major: 1,
        minor: 0,
        patch: 0,
    };
}

/// On-disk archive payload: the trail plus an integrity stamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailArchive {
    pub schema_version: SchemaVersion,
    pub created_at: DateTime<Utc>,
    /// blake3 hex digest of the canonical (JSON) form of `trail`.
    pub content_hash: String,
    pub trail: Trail,
}

/// Serialize `trail` to a binary archive at `path`. Overwrites an existing
/// file; returns the path on success.
pub fn write_archive(trail: &Trail, path: impl AsRef<Path>) -> Result<PathBuf, ExportError> {
    let path = path.as_ref();
    let archive = TrailArchive {
        schema_version: SchemaVersion::CURRENT,
        created_at: Utc::now(),
        content_hash: hash_trail(trail)?,
        trail: trail.clone(),
    };

    let file = File::create(path)?;
    bincode::serialize_into(BufWriter::new(file), &archive)
        .map_err(|e| ExportError::Serialize(e.to_string()))?;
    Ok(path.to_path_buf())
}

/// Reload an archive written by [`write_archive`], verifying the content
/// hash against the embedded trail.
pub fn read_archive(path: impl AsRef<Path>) -> Result<TrailArchive, ExportError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let archive: TrailArchive = bincode::deserialize_from(BufReader::new(file))
        .map_err(|e| ExportError::Serialize(e.to_string()))?;

    if hash_trail(&archive.trail)? != archive.content_hash {
        return Err(ExportError::Corrupt {
            path: path.display().to_string(),
        });
    }
    Ok(archive)
}

/// Convenience: archive a set of result objects, building the trail on the
/// fly. When a pre-built trail is supplied it wins and the raw objects are
/// ignored (with a warning), so callers can pass either shape.
pub fn archive_objects(
    objects: &[&dyn TrailSource],
    prebuilt: Option<&Trail>,
    path: impl AsRef<Path>,
) -> Result<PathBuf, ExportError> {
    match prebuilt {
        Some(trail) => {
            if !objects.is_empty() {
                warn!(
                    ignored = objects.len(),
                    "pre-built trail supplied; ignoring raw objects"
                );
            }
            write_archive(trail, path)
        }
        None => {
            let trail = build_trail(objects)?;
            write_archive(&trail, path)
        }
    }
}

fn hash_trail(trail: &Trail) -> Result<String, ExportError> {
    let bytes = serde_json::to_vec(trail).map_err(|e| ExportError::Serialize(e.to_string()))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}
