//! Core record types for coding runs and their derived results.
//!
//! A coding run produces a [`CodedResult`]: per-unit coded fields plus a
//! [`RunMetadata`] block identifying the run, its codebook, its execution
//! arguments, and (optionally) the run it replicates. Comparison and
//! validation analyses produce [`ComparisonResult`] / [`ValidationResult`]
//! records that carry the same metadata shape, with the input run names as
//! parents. Everything here is immutable once constructed.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Measurement level of a coded field. Determines which reliability and
/// validation statistics are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementLevel {
    /// Unordered categories.
    Nominal,
    /// Ordered categories / ranks.
    Ordinal,
    /// Continuous values.
    Interval,
}

impl MeasurementLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nominal => "nominal",
            Self::Ordinal => "ordinal",
            Self::Interval => "interval",
        }
    }
}

impl fmt::Display for MeasurementLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One coded value as produced by a rater (model or human).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Categorical / free-text value.
    Text(String),
    /// Numeric value.
    Number(f64),
    /// Missing / NA.
    Missing,
}

impl FieldValue {
    /// Categorical view: text as-is, numbers formatted, missing is `None`.
    pub fn as_category(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.clone()),
            Self::Number(n) => Some(format_number(*n)),
            Self::Missing => None,
        }
    }

    /// Numeric view: finite numbers as-is, text parsed if it is a finite
    /// number; missing, non-numeric text, and NaN/infinite values are
    /// `None` so they cannot leak into rank computations.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n).filter(|f| f.is_finite()),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            Self::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// One unit of analysis (document, image, segment) with its coded fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodedUnit {
    /// Unique unit identifier within one result.
    pub id: String,
    /// Coded fields by name.
    pub fields: BTreeMap<String, FieldValue>,
}

impl CodedUnit {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }
}

/// One field in a codebook's output schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Codebook / task identity: what the raters were asked to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Codebook {
    /// Codebook name.
    pub name: String,
    /// Coding instructions given to the rater.
    pub instructions: String,
    /// Output schema: the fields each unit is coded with.
    pub fields: Vec<FieldSpec>,
}

impl Codebook {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            description: description.into(),
        });
        self
    }
}

/// Execution arguments of a coding run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunArgs {
    /// Model identifier (e.g. `openai/gpt-5-mini`), or `"human"` for
    /// wrapped human-coded data.
    pub model: String,
    /// Sampling temperature, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Additional routing/chat parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub chat: BTreeMap<String, serde_json::Value>,
    /// Execution/batch parameters (batch size, parallelism, retries).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub batch: BTreeMap<String, serde_json::Value>,
}

impl RunArgs {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            chat: BTreeMap::new(),
            batch: BTreeMap::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Execution stamp: when a run happened and at what scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStamp {
    /// When the run finished.
    pub timestamp: DateTime<Utc>,
    /// Number of units coded.
    pub n_units: usize,
    /// Library version that produced the record.
    pub library_version: String,
}

impl RunStamp {
    pub fn now(n_units: usize) -> Self {
        Self {
            timestamp: Utc::now(),
            n_units,
            library_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Run metadata block shared by coded, comparison, and validation records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Run name, unique within any set of runs analysed together.
    pub name: String,
    /// Names of the runs this one derives from. Empty for an origin run;
    /// one entry for a replication; two or more for comparison/validation
    /// records.
    #[serde(default)]
    pub parents: Vec<String>,
    /// Codebook identity. Absent on derived (comparison/validation) records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codebook: Option<Codebook>,
    /// Execution arguments. Absent on derived records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<RunArgs>,
    /// Execution stamp.
    pub stamp: RunStamp,
}

impl RunMetadata {
    /// Metadata for an origin coding run.
    pub fn new(name: impl Into<String>, codebook: Codebook, args: RunArgs, n_units: usize) -> Self {
        Self {
            name: name.into(),
            parents: Vec::new(),
            codebook: Some(codebook),
            args: Some(args),
            stamp: RunStamp::now(n_units),
        }
    }

    /// Mark this run as a replication/derivation of `parent`.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parents = vec![parent.into()];
        self
    }

    /// Model identifier, if execution arguments are present.
    pub fn model(&self) -> Option<&str> {
        self.args.as_ref().map(|a| a.model.as_str())
    }

    /// Temperature, if present in execution arguments.
    pub fn temperature(&self) -> Option<f64> {
        self.args.as_ref().and_then(|a| a.temperature)
    }

    /// Codebook name, if a codebook is attached.
    pub fn codebook_name(&self) -> Option<&str> {
        self.codebook.as_ref().map(|c| c.name.as_str())
    }
}

/// Error constructing a record.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// A unit identifier appears more than once in one result.
    #[error("duplicate unit id '{id}' in run '{run}'")]
    DuplicateUnitId { id: String, run: String },
    /// A result was constructed with no units.
    #[error("run '{run}' has no units")]
    Empty { run: String },
}

/// The atomic record of one coding run: per-unit results plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodedResult {
    /// Per-unit coded records, in coding order.
    pub units: Vec<CodedUnit>,
    /// Run metadata.
    pub metadata: RunMetadata,
}

impl CodedResult {
    /// Build a coded result, enforcing unique unit identifiers and stamping
    /// the unit count into the metadata.
    pub fn new(units: Vec<CodedUnit>, mut metadata: RunMetadata) -> Result<Self, RecordError> {
        if units.is_empty() {
            return Err(RecordError::Empty {
                run: metadata.name.clone(),
            });
        }
        let mut seen = std::collections::BTreeSet::new();
        for unit in &units {
            if !seen.insert(unit.id.as_str()) {
                return Err(RecordError::DuplicateUnitId {
                    id: unit.id.clone(),
                    run: metadata.name.clone(),
                });
            }
        }
        metadata.stamp.n_units = units.len();
        Ok(Self { units, metadata })
    }

    /// Wrap an externally supplied table (typically human-coded data) as a
    /// coded result with minimal metadata. The model is recorded as
    /// `"human"` and no codebook is attached.
    pub fn from_table(name: impl Into<String>, units: Vec<CodedUnit>) -> Result<Self, RecordError> {
        let name = name.into();
        let n = units.len();
        let metadata = RunMetadata {
            name,
            parents: Vec::new(),
            codebook: None,
            args: Some(RunArgs::new("human")),
            stamp: RunStamp::now(n),
        };
        Self::new(units, metadata)
    }

    /// Run name.
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Field names present in any unit, sorted.
    pub fn field_names(&self) -> Vec<String> {
        let mut names = std::collections::BTreeSet::new();
        for unit in &self.units {
            for key in unit.fields.keys() {
                names.insert(key.clone());
            }
        }
        names.into_iter().collect()
    }

    /// Whether every unit carries `field` (present, possibly missing-valued).
    pub fn has_field(&self, field: &str) -> bool {
        self.units.iter().any(|u| u.fields.contains_key(field))
    }

    /// Unit identifiers in coding order.
    pub fn unit_ids(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.id.as_str()).collect()
    }

    /// Look up a unit by id.
    pub fn unit(&self, id: &str) -> Option<&CodedUnit> {
        self.units.iter().find(|u| u.id == id)
    }
}

// =============================================================================
// Derived records
// =============================================================================

/// Which kappa variant a comparison reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KappaType {
    /// Cohen's kappa (exactly 2 raters, nominal).
    Cohen,
    /// Fleiss' kappa (3+ raters, nominal).
    Fleiss,
    /// Quadratic-weighted kappa (exactly 2 raters, ordinal).
    Weighted,
}

impl fmt::Display for KappaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cohen => "Cohen's",
            Self::Fleiss => "Fleiss'",
            Self::Weighted => "weighted",
        })
    }
}

/// Inter-rater reliability metrics. Which fields are populated depends on
/// the measurement level; see [`crate::reliability::compare`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonMetrics {
    /// Krippendorff's alpha with level-appropriate weighting.
    pub krippendorff_alpha: f64,
    /// Share of subjects on which all raters agree (within tolerance for
    /// ordinal/interval).
    pub percent_agreement: f64,
    /// Kappa value, when a variant applies at this level/rater count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kappa: Option<f64>,
    /// Which kappa variant `kappa` is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kappa_type: Option<KappaType>,
    /// Kendall's W (ordinal only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kendall_w: Option<f64>,
    /// Spearman's rho, mean over rater pairs (ordinal only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spearman_rho: Option<f64>,
    /// ICC(2,1) (interval only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icc: Option<f64>,
    /// Pearson's r, mean over rater pairs (interval only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pearson_r: Option<f64>,
}

/// Result of comparing two or more coding runs on one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Measurement level the metrics were computed at.
    pub level: MeasurementLevel,
    /// Field that was compared.
    pub field: String,
    /// Computed reliability metrics.
    pub metrics: ComparisonMetrics,
    /// Subjects present in every input after alignment.
    pub n_subjects: usize,
    /// Number of raters (= number of inputs).
    pub n_raters: usize,
    /// Tolerance used for percent agreement (0 = exact match).
    pub tolerance: f64,
    /// Metadata; `parents` holds the input run names.
    pub metadata: RunMetadata,
}

impl ComparisonResult {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

/// How nominal precision/recall/F1 are aggregated across classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AverageMethod {
    /// Unweighted mean of per-class values.
    Macro,
    /// Global counts pooled before computing.
    Micro,
    /// Mean of per-class values weighted by gold-class support.
    Weighted,
    /// No aggregation: report the per-class breakdown instead.
    None,
}

impl fmt::Display for AverageMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Macro => "macro",
            Self::Micro => "micro",
            Self::Weighted => "weighted",
            Self::None => "none",
        })
    }
}

/// Per-class classification metrics (nominal validation, `average = none`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    /// Class label.
    pub class: String,
    /// Gold-standard support for this class.
    pub n: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Validation metrics. Which fields are populated depends on the level;
/// see [`crate::reliability::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recall: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kappa: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spearman_rho: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kendall_tau: Option<f64>,
    /// Pearson's r; computed on ranks at the ordinal level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pearson_r: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icc: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mae: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rmse: Option<f64>,
}

impl ValidationMetrics {
    pub(crate) fn empty() -> Self {
        Self {
            accuracy: None,
            precision: None,
            recall: None,
            f1: None,
            kappa: None,
            spearman_rho: None,
            kendall_tau: None,
            pearson_r: None,
            icc: None,
            mae: None,
            rmse: None,
        }
    }
}

/// Result of validating one coding run against a gold standard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Measurement level the metrics were computed at.
    pub level: MeasurementLevel,
    /// Field that was validated.
    pub field: String,
    /// Computed metrics.
    pub metrics: ValidationMetrics,
    /// Matched units with complete (non-missing) pairs.
    pub n_matched: usize,
    /// Distinct classes/levels among matched pairs (nominal/ordinal only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_classes: Option<usize>,
    /// Averaging method actually used (nominal only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<AverageMethod>,
    /// Per-class breakdown (nominal with `average = none` only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_class: Option<Vec<ClassMetrics>>,
    /// Metadata; `parents` is `[prediction run, gold run]`.
    pub metadata: RunMetadata,
}

impl ValidationResult {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}
