//! Portable metadata export: a small JSON document describing a trail
//! without any per-unit coded data.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ExportError;
use crate::trail::{RunKind, Trail, TrailNode};

/// Top-level portable document: `{complete, n_runs, runs: [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortableTrail {
    pub complete: bool,
    pub n_runs: usize,
    pub runs: Vec<PortableRun>,
}

/// One run in the portable document. `parent` mirrors the reference
/// cardinality: null for origins, a string for one parent, an array for
/// several.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortableRun {
    pub name: String,
    pub parent: serde_json::Value,
    pub kind: RunKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codebook_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub n_units: usize,
}

impl PortableRun {
    fn from_node(node: &TrailNode) -> Self {
        Self {
            name: node.name.clone(),
            parent: parent_value(&node.parents),
            kind: node.kind,
            model: node.model.clone(),
            temperature: node.temperature,
            codebook_name: node.codebook_name.clone(),
            timestamp: node.timestamp,
            n_units: node.n_units,
        }
    }
}

fn parent_value(parents: &[String]) -> serde_json::Value {
    match parents {
        [] => serde_json::Value::Null,
        [single] => serde_json::Value::String(single.clone()),
        many => serde_json::Value::Array(
            many.iter()
                .map(|p| serde_json::Value::String(p.clone()))
                .collect(),
        ),
    }
}

/// Project a trail to its portable form.
pub fn portable_metadata(trail: &Trail) -> PortableTrail {
    PortableTrail {
        complete: trail.complete,
        n_runs: trail.len(),
        runs: trail.runs.iter().map(PortableRun::from_node).collect(),
    }
}

/// Write the portable JSON document to `path`; returns the path on success.
pub fn export_json(trail: &Trail, path: impl AsRef<Path>) -> Result<PathBuf, ExportError> {
    let path = path.as_ref();
    let document = portable_metadata(trail);
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), &document)
        .map_err(|e| ExportError::Serialize(e.to_string()))?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_cardinality_is_mirrored() {
        assert_eq!(parent_value(&[]), serde_json::Value::Null);
        assert_eq!(
            parent_value(&["run1".to_string()]),
            serde_json::Value::String("run1".into())
        );
        let many = parent_value(&["run1".to_string(), "run2".to_string()]);
        assert_eq!(
            many,
            serde_json::json!(["run1", "run2"])
        );
    }
}
