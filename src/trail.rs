//! Provenance trail reconstruction over coded, comparison, and validation
//! results.
//!
//! A trail is rebuilt fresh from whatever set of result objects the caller
//! supplies: each object contributes a run descriptor (name, parents,
//! summaries), descriptors are linked by parent references, and the whole
//! set is ordered so every run appears after its parents. A parent that is
//! referenced but not supplied does not fail the build; it marks the trail
//! incomplete so partial trails stay inspectable.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::record::{CodedResult, ComparisonResult, MeasurementLevel, RunMetadata, ValidationResult};

/// What kind of run a trail node describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Coded,
    Comparison,
    Validation,
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Coded => "coded run",
            Self::Comparison => "comparison",
            Self::Validation => "validation",
        })
    }
}

/// Capability required of trail inputs: a run-metadata block plus enough
/// summary information for descriptors. Implemented by [`CodedResult`],
/// [`ComparisonResult`], and [`ValidationResult`].
pub trait TrailSource {
    fn run_metadata(&self) -> &RunMetadata;
    fn kind(&self) -> RunKind;

    /// Measurement level, for derived records.
    fn level(&self) -> Option<MeasurementLevel> {
        None
    }

    /// Flat summary of computed metrics, so exporters can render tables
    /// without touching per-unit payloads. Empty for coded runs.
    fn summary_metrics(&self) -> BTreeMap<String, f64> {
        BTreeMap::new()
    }
}

impl TrailSource for CodedResult {
    fn run_metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    fn kind(&self) -> RunKind {
        RunKind::Coded
    }
}

impl TrailSource for ComparisonResult {
    fn run_metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    fn kind(&self) -> RunKind {
        RunKind::Comparison
    }

    fn level(&self) -> Option<MeasurementLevel> {
        Some(self.level)
    }

    fn summary_metrics(&self) -> BTreeMap<String, f64> {
        let m = &self.metrics;
        let mut out = BTreeMap::new();
        out.insert("krippendorff_alpha".to_string(), m.krippendorff_alpha);
        out.insert("percent_agreement".to_string(), m.percent_agreement);
        if let Some(kappa) = m.kappa {
            out.insert("kappa".to_string(), kappa);
        }
        if let Some(w) = m.kendall_w {
            out.insert("kendall_w".to_string(), w);
        }
        if let Some(rho) = m.spearman_rho {
            out.insert("spearman_rho".to_string(), rho);
        }
        if let Some(icc) = m.icc {
            out.insert("icc".to_string(), icc);
        }
        if let Some(r) = m.pearson_r {
            out.insert("pearson_r".to_string(), r);
        }
        out
    }
}

impl TrailSource for ValidationResult {
    fn run_metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    fn kind(&self) -> RunKind {
        RunKind::Validation
    }

    fn level(&self) -> Option<MeasurementLevel> {
        Some(self.level)
    }

    fn summary_metrics(&self) -> BTreeMap<String, f64> {
        let m = &self.metrics;
        let mut out = BTreeMap::new();
        let mut put = |key: &str, value: Option<f64>| {
            if let Some(v) = value {
                out.insert(key.to_string(), v);
            }
        };
        put("accuracy", m.accuracy);
        put("precision", m.precision);
        put("recall", m.recall);
        put("f1", m.f1);
        put("kappa", m.kappa);
        put("spearman_rho", m.spearman_rho);
        put("kendall_tau", m.kendall_tau);
        put("pearson_r", m.pearson_r);
        put("icc", m.icc);
        put("mae", m.mae);
        put("rmse", m.rmse);
        out
    }
}

/// Run descriptor held by a trail: metadata summary, never payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailNode {
    /// Run name (trail key).
    pub name: String,
    /// Run kind.
    pub kind: RunKind,
    /// Parent run names (empty = origin).
    pub parents: Vec<String>,
    /// When the run finished.
    pub timestamp: DateTime<Utc>,
    /// Units coded / subjects analysed.
    pub n_units: usize,
    /// Codebook name, when a codebook is attached.
    #[serde(default)]
    pub codebook_name: Option<String>,
    /// Model identifier, when execution args are attached.
    #[serde(default)]
    pub model: Option<String>,
    /// Sampling temperature, when present in execution args.
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Measurement level of a derived record.
    #[serde(default)]
    pub level: Option<MeasurementLevel>,
    /// Metric summary of a derived record.
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl TrailNode {
    fn from_source(source: &dyn TrailSource) -> Self {
        let meta = source.run_metadata();
        Self {
            name: meta.name.clone(),
            kind: source.kind(),
            parents: meta.parents.clone(),
            timestamp: meta.stamp.timestamp,
            n_units: meta.stamp.n_units,
            codebook_name: meta.codebook_name().map(str::to_string),
            model: meta.model().map(str::to_string),
            temperature: meta.temperature(),
            level: source.level(),
            metrics: source.summary_metrics(),
        }
    }

    /// Whether this node references no parents.
    pub fn is_origin(&self) -> bool {
        self.parents.is_empty()
    }
}

/// Errors building a trail.
#[derive(Debug, thiserror::Error)]
pub enum TrailError {
    /// No objects supplied.
    #[error("cannot build a trail from an empty set of objects")]
    Empty,
    /// Two inputs share a run name but describe different runs.
    #[error("run name '{name}' supplied twice with differing content")]
    DuplicateRunName { name: String },
    /// Parent references form a cycle involving `name`.
    #[error("cyclic provenance involving run '{name}'")]
    CyclicProvenance { name: String },
}

impl TrailError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Empty => "empty_input",
            Self::DuplicateRunName { .. } => "duplicate_run_name",
            Self::CyclicProvenance { .. } => "cyclic_provenance",
        }
    }
}

/// A reconstructed provenance trail: run descriptors in topological order
/// plus a completeness flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trail {
    /// Run descriptors; every run appears after all its supplied parents.
    pub runs: Vec<TrailNode>,
    /// True iff every referenced parent is present in `runs`.
    pub complete: bool,
    /// Parent names referenced but not supplied, sorted.
    #[serde(default)]
    pub missing_parents: Vec<String>,
}

impl Trail {
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Run names in trail order.
    pub fn names(&self) -> Vec<&str> {
        self.runs.iter().map(|r| r.name.as_str()).collect()
    }

    /// Look up a run descriptor by name.
    pub fn get(&self, name: &str) -> Option<&TrailNode> {
        self.runs.iter().find(|r| r.name == name)
    }
}

/// Reconstruct a provenance trail from a set of result objects.
///
/// Each object contributes one run descriptor, indexed by run name.
/// Supplying the same object twice is idempotent; two objects that share a
/// name but differ fail with [`TrailError::DuplicateRunName`]. Runs are
/// ordered parents-first, ties broken by ascending timestamp then input
/// order. Referenced-but-absent parents mark the trail incomplete rather
/// than failing; cycles (including self-references) fail with
/// [`TrailError::CyclicProvenance`].
pub fn build_trail(objects: &[&dyn TrailSource]) -> Result<Trail, TrailError> {
    if objects.is_empty() {
        return Err(TrailError::Empty);
    }

    let mut nodes: Vec<TrailNode> = Vec::new();
    let mut index: BTreeMap<String, usize> = BTreeMap::new();
    for object in objects {
        let node = TrailNode::from_source(*object);
        match index.get(&node.name) {
            Some(&i) => {
                if nodes[i] != node {
                    return Err(TrailError::DuplicateRunName { name: node.name });
                }
            }
            None => {
                index.insert(node.name.clone(), nodes.len());
                nodes.push(node);
            }
        }
    }

    let missing: BTreeSet<String> = nodes
        .iter()
        .flat_map(|n| n.parents.iter())
        .filter(|p| !index.contains_key(*p))
        .cloned()
        .collect();

    // Parents-first ordering: repeatedly place the ready node with the
    // earliest (timestamp, input position). Absent parents count as placed.
    let mut placed = vec![false; nodes.len()];
    let mut order: Vec<usize> = Vec::with_capacity(nodes.len());
    while order.len() < nodes.len() {
        let mut best: Option<usize> = None;
        for (i, node) in nodes.iter().enumerate() {
            if placed[i] {
                continue;
            }
            let ready = node.parents.iter().all(|p| match index.get(p) {
                Some(&j) => placed[j],
                None => true,
            });
            if !ready {
                continue;
            }
            best = match best {
                None => Some(i),
                Some(b) if (node.timestamp, i) < (nodes[b].timestamp, b) => Some(i),
                keep => keep,
            };
        }
        match best {
            Some(i) => {
                placed[i] = true;
                order.push(i);
            }
            None => {
                // Nothing is ready: the remainder is cyclic. Name a
                // deterministic member.
                let name = nodes
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !placed[*i])
                    .map(|(_, n)| n.name.clone())
                    .min()
                    .unwrap_or_default();
                return Err(TrailError::CyclicProvenance { name });
            }
        }
    }

    let runs: Vec<TrailNode> = order.into_iter().map(|i| nodes[i].clone()).collect();
    debug!(
        n_runs = runs.len(),
        complete = missing.is_empty(),
        "built provenance trail"
    );

    Ok(Trail {
        runs,
        complete: missing.is_empty(),
        missing_parents: missing.into_iter().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CodedUnit, RunArgs, RunStamp};
    use chrono::TimeZone;

    fn coded(name: &str, parent: Option<&str>, minute: u32) -> CodedResult {
        let units = vec![CodedUnit::new("1").with_field("score", 1.0)];
        let mut result = CodedResult::from_table(name, units).unwrap();
        result.metadata.parents = parent.map(|p| vec![p.to_string()]).unwrap_or_default();
        result.metadata.args = Some(RunArgs::new("model-a").with_temperature(0.2));
        result.metadata.stamp = RunStamp {
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, minute, 0).unwrap(),
            n_units: 1,
            library_version: "test".into(),
        };
        result
    }

    #[test]
    fn empty_input_is_an_error() {
        let err = build_trail(&[]).unwrap_err();
        assert!(matches!(err, TrailError::Empty));
        assert_eq!(err.code(), "empty_input");
    }

    #[test]
    fn every_input_name_becomes_a_key() {
        let a = coded("run1", None, 0);
        let b = coded("run2", Some("run1"), 1);
        let c = coded("run3", Some("run1"), 2);
        let trail = build_trail(&[&c, &a, &b]).unwrap();
        assert_eq!(trail.len(), 3);
        for name in ["run1", "run2", "run3"] {
            assert!(trail.get(name).is_some());
        }
        assert!(trail.complete);
    }

    #[test]
    fn parents_precede_children() {
        let a = coded("run1", None, 5);
        let b = coded("run2", Some("run1"), 1); // earlier timestamp than parent
        let trail = build_trail(&[&b, &a]).unwrap();
        assert_eq!(trail.names(), vec!["run1", "run2"]);
    }

    #[test]
    fn origin_ties_break_by_timestamp_then_input_order() {
        let a = coded("a", None, 3);
        let b = coded("b", None, 1);
        let c = coded("c", None, 1);
        let trail = build_trail(&[&a, &b, &c]).unwrap();
        assert_eq!(trail.names(), vec!["b", "c", "a"]);
    }

    #[test]
    fn missing_parent_marks_incomplete_and_adding_it_completes() {
        let parent = coded("run1", None, 0);
        let child = coded("run2", Some("run1"), 1);

        let partial = build_trail(&[&child]).unwrap();
        assert!(!partial.complete);
        assert_eq!(partial.missing_parents, vec!["run1"]);
        assert_eq!(partial.len(), 1);

        let full = build_trail(&[&child, &parent]).unwrap();
        assert!(full.complete);
        assert!(full.missing_parents.is_empty());
    }

    #[test]
    fn same_object_twice_is_idempotent() {
        let a = coded("run1", None, 0);
        let trail = build_trail(&[&a, &a]).unwrap();
        assert_eq!(trail.len(), 1);
    }

    #[test]
    fn conflicting_duplicate_names_are_rejected() {
        let a = coded("run1", None, 0);
        let b = coded("run1", None, 1); // same name, different timestamp
        let err = build_trail(&[&a, &b]).unwrap_err();
        assert!(matches!(err, TrailError::DuplicateRunName { ref name } if name == "run1"));
    }

    #[test]
    fn self_parent_is_cyclic() {
        let a = coded("run1", Some("run1"), 0);
        let err = build_trail(&[&a]).unwrap_err();
        assert!(matches!(err, TrailError::CyclicProvenance { ref name } if name == "run1"));
    }

    #[test]
    fn two_node_cycle_is_detected_deterministically() {
        let a = coded("runA", Some("runB"), 0);
        let b = coded("runB", Some("runA"), 1);
        let err = build_trail(&[&b, &a]).unwrap_err();
        assert!(matches!(err, TrailError::CyclicProvenance { ref name } if name == "runA"));
    }

    #[test]
    fn node_carries_model_and_codebook_summary() {
        let a = coded("run1", None, 0);
        let trail = build_trail(&[&a]).unwrap();
        let node = trail.get("run1").unwrap();
        assert_eq!(node.model.as_deref(), Some("model-a"));
        assert_eq!(node.temperature, Some(0.2));
        assert_eq!(node.kind, RunKind::Coded);
        assert!(node.metrics.is_empty());
        assert!(node.is_origin());
    }
}
