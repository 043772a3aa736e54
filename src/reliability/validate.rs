//! Validation of a coding run against a gold standard.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::align::require_field;
use super::compare::derived_metadata;
use super::metrics;
use super::ReliabilityError;
use crate::record::{
    AverageMethod, ClassMetrics, CodedResult, CodedUnit, MeasurementLevel, ValidationMetrics,
    ValidationResult,
};

/// Gold-standard input: a plain table of units or another coded result.
/// Both are treated identically once the identifier/field contract holds;
/// this is the explicit adapter for what used to be a dual-shape object.
#[derive(Debug, Clone)]
pub enum GoldStandard {
    /// Externally supplied (typically human-coded) units.
    Table(Vec<CodedUnit>),
    /// A previous coding run used as reference.
    Run(Box<CodedResult>),
}

impl GoldStandard {
    pub fn units(&self) -> &[CodedUnit] {
        match self {
            Self::Table(units) => units,
            Self::Run(result) => &result.units,
        }
    }

    /// Name recorded as the gold parent in the validation metadata.
    pub fn name(&self) -> &str {
        match self {
            Self::Table(_) => "gold",
            Self::Run(result) => result.name(),
        }
    }
}

impl From<Vec<CodedUnit>> for GoldStandard {
    fn from(units: Vec<CodedUnit>) -> Self {
        Self::Table(units)
    }
}

impl From<CodedResult> for GoldStandard {
    fn from(result: CodedResult) -> Self {
        Self::Run(Box::new(result))
    }
}

/// Validate a coding run against a gold standard on one field.
///
/// Metrics by level:
/// - nominal: accuracy, precision/recall/F1 (aggregated per `average`, or
///   returned as a per-class table when `average` is `None`), Cohen's kappa.
/// - ordinal: Spearman's rho, Kendall's tau, Pearson's r on ranks, MAE.
/// - interval: Pearson's r, ICC(2,1), MAE, RMSE.
///
/// Matched units are the id intersection in prediction order. Pairs with a
/// missing value on either side are excluded with a warning; if nothing
/// remains the call fails with `no complete cases`. `average` is only
/// meaningful at the nominal level and is ignored otherwise.
pub fn validate(
    prediction: &CodedResult,
    gold: &GoldStandard,
    by: &str,
    level: MeasurementLevel,
    average: AverageMethod,
) -> Result<ValidationResult, ReliabilityError> {
    let gold_units = gold.units();
    check_gold_ids(gold_units)?;
    require_field(&[prediction], by)?;
    require_gold_field(gold_units, by, gold.name())?;

    // Matched units: intersection of identifiers, prediction order.
    let gold_ids: BTreeSet<&str> = gold_units.iter().map(|u| u.id.as_str()).collect();
    let matched: Vec<&CodedUnit> = prediction
        .units
        .iter()
        .filter(|u| gold_ids.contains(u.id.as_str()))
        .collect();
    if matched.is_empty() {
        return Err(ReliabilityError::NoCommonUnits);
    }

    let gold_by_id = |id: &str| gold_units.iter().find(|u| u.id == id).unwrap();

    debug!(
        prediction = prediction.name(),
        gold = gold.name(),
        n_matched = matched.len(),
        by,
        level = %level,
        "validating against gold standard"
    );

    let parents = vec![prediction.name().to_string(), gold.name().to_string()];

    match level {
        MeasurementLevel::Nominal => {
            let mut pred_labels = Vec::new();
            let mut gold_labels = Vec::new();
            let mut dropped = 0usize;
            for unit in &matched {
                let p = unit.get(by).and_then(|v| v.as_category());
                let g = gold_by_id(&unit.id).get(by).and_then(|v| v.as_category());
                match (p, g) {
                    (Some(p), Some(g)) => {
                        pred_labels.push(p);
                        gold_labels.push(g);
                    }
                    _ => dropped += 1,
                }
            }
            warn_dropped(dropped, by);
            if pred_labels.is_empty() {
                return Err(ReliabilityError::NoCompleteCases {
                    field: by.to_string(),
                });
            }

            let (pred, gold_enc, labels) = encode_pair(&pred_labels, &gold_labels);
            let counts = metrics::class_counts(&pred, &gold_enc, labels.len());
            let (precision, recall, f1) = metrics::aggregate_prf(&counts, average);

            let per_class = if average == AverageMethod::None {
                Some(
                    labels
                        .iter()
                        .zip(&counts)
                        .map(|(class, c)| ClassMetrics {
                            class: class.clone(),
                            n: c.support,
                            precision: metrics::class_precision(c),
                            recall: metrics::class_recall(c),
                            f1: metrics::class_f1(c),
                        })
                        .collect(),
                )
            } else {
                None
            };

            let mut m = ValidationMetrics::empty();
            m.accuracy = Some(metrics::accuracy(&pred, &gold_enc));
            m.kappa = Some(metrics::cohen_kappa(&pred, &gold_enc, labels.len()));
            if average != AverageMethod::None {
                m.precision = Some(precision);
                m.recall = Some(recall);
                m.f1 = Some(f1);
            }

            let n_matched = pred.len();
            Ok(ValidationResult {
                level,
                field: by.to_string(),
                metrics: m,
                n_matched,
                n_classes: Some(labels.len()),
                average: Some(average),
                per_class,
                metadata: derived_metadata("validation", parents, n_matched),
            })
        }
        MeasurementLevel::Ordinal | MeasurementLevel::Interval => {
            let mut pred_vals = Vec::new();
            let mut gold_vals = Vec::new();
            let mut dropped = 0usize;
            for unit in &matched {
                let p = unit.get(by).and_then(|v| v.as_number());
                let g = gold_by_id(&unit.id).get(by).and_then(|v| v.as_number());
                match (p, g) {
                    (Some(p), Some(g)) => {
                        pred_vals.push(p);
                        gold_vals.push(g);
                    }
                    _ => dropped += 1,
                }
            }
            warn_dropped(dropped, by);
            if pred_vals.is_empty() {
                return Err(ReliabilityError::NoCompleteCases {
                    field: by.to_string(),
                });
            }

            let mut m = ValidationMetrics::empty();
            let n_classes = match level {
                MeasurementLevel::Ordinal => {
                    m.spearman_rho = Some(metrics::spearman_rho(&pred_vals, &gold_vals));
                    m.kendall_tau = Some(metrics::kendall_tau_b(&pred_vals, &gold_vals));
                    m.pearson_r = Some(metrics::pearson_r(
                        &metrics::ranks_with_ties(&pred_vals),
                        &metrics::ranks_with_ties(&gold_vals),
                    ));
                    m.mae = Some(metrics::mae(&pred_vals, &gold_vals));
                    Some(distinct_count(&pred_vals, &gold_vals))
                }
                MeasurementLevel::Interval => {
                    m.pearson_r = Some(metrics::pearson_r(&pred_vals, &gold_vals));
                    let rows: Vec<Vec<f64>> = pred_vals
                        .iter()
                        .zip(&gold_vals)
                        .map(|(p, g)| vec![*p, *g])
                        .collect();
                    m.icc = Some(metrics::icc(&rows));
                    m.mae = Some(metrics::mae(&pred_vals, &gold_vals));
                    m.rmse = Some(metrics::rmse(&pred_vals, &gold_vals));
                    None
                }
                MeasurementLevel::Nominal => unreachable!(),
            };

            let n_matched = pred_vals.len();
            Ok(ValidationResult {
                level,
                field: by.to_string(),
                metrics: m,
                n_matched,
                n_classes,
                average: None,
                per_class: None,
                metadata: derived_metadata("validation", parents, n_matched),
            })
        }
    }
}

fn check_gold_ids(units: &[CodedUnit]) -> Result<(), ReliabilityError> {
    let mut seen = BTreeSet::new();
    for unit in units {
        if !seen.insert(unit.id.as_str()) {
            return Err(ReliabilityError::DuplicateGoldUnit {
                id: unit.id.clone(),
            });
        }
    }
    Ok(())
}

fn require_gold_field(
    units: &[CodedUnit],
    field: &str,
    gold_name: &str,
) -> Result<(), ReliabilityError> {
    if units.iter().any(|u| u.fields.contains_key(field)) {
        return Ok(());
    }
    let available: BTreeSet<String> = units
        .iter()
        .flat_map(|u| u.fields.keys().cloned())
        .collect();
    Err(ReliabilityError::MissingField {
        field: field.to_string(),
        runs: vec![gold_name.to_string()],
        available: available.into_iter().collect(),
    })
}

fn warn_dropped(dropped: usize, field: &str) {
    if dropped > 0 {
        warn!(
            field,
            dropped, "matched units with missing values excluded from validation"
        );
    }
}

/// Encode prediction and gold labels over their joint class set.
fn encode_pair(pred: &[String], gold: &[String]) -> (Vec<usize>, Vec<usize>, Vec<String>) {
    let labels: Vec<String> = pred
        .iter()
        .chain(gold)
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let encode = |values: &[String]| {
        values
            .iter()
            .map(|v| labels.binary_search(v).unwrap())
            .collect::<Vec<_>>()
    };
    (encode(pred), encode(gold), labels)
}

fn distinct_count(pred: &[f64], gold: &[f64]) -> usize {
    pred.iter()
        .chain(gold)
        // -0.0 and 0.0 are the same level.
        .map(|v| if *v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() })
        .collect::<BTreeSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldValue;

    fn units_with_labels(ids: &[&str], labels: &[&str]) -> Vec<CodedUnit> {
        ids.iter()
            .zip(labels)
            .map(|(id, l)| CodedUnit::new(*id).with_field("label", *l))
            .collect()
    }

    fn units_with_scores(ids: &[&str], scores: &[f64]) -> Vec<CodedUnit> {
        ids.iter()
            .zip(scores)
            .map(|(id, s)| CodedUnit::new(*id).with_field("score", *s))
            .collect()
    }

    fn ids(range: std::ops::RangeInclusive<usize>) -> Vec<String> {
        range.map(|i| i.to_string()).collect()
    }

    #[test]
    fn identical_prediction_and_gold_is_perfect() {
        let ids = ["1", "2", "3", "4"];
        let pred = CodedResult::from_table(
            "pred",
            units_with_labels(&ids, &["a", "b", "a", "b"]),
        )
        .unwrap();
        let gold = GoldStandard::Table(units_with_labels(&ids, &["a", "b", "a", "b"]));

        let result = validate(&pred, &gold, "label", MeasurementLevel::Nominal, AverageMethod::Macro)
            .unwrap();
        assert!((result.metrics.accuracy.unwrap() - 1.0).abs() < 1e-9);
        assert!((result.metrics.kappa.unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(result.n_classes, Some(2));
        assert_eq!(result.average, Some(AverageMethod::Macro));
    }

    #[test]
    fn identical_numeric_prediction_has_zero_mae() {
        let ids = ["1", "2", "3"];
        let pred =
            CodedResult::from_table("pred", units_with_scores(&ids, &[1.0, 2.0, 3.0])).unwrap();
        let gold = GoldStandard::Table(units_with_scores(&ids, &[1.0, 2.0, 3.0]));

        for level in [MeasurementLevel::Ordinal, MeasurementLevel::Interval] {
            let result = validate(&pred, &gold, "score", level, AverageMethod::Macro).unwrap();
            assert!((result.metrics.mae.unwrap()).abs() < 1e-9);
            assert!(result.average.is_none());
            assert!(result.metrics.accuracy.is_none());
        }
    }

    #[test]
    fn skewed_prediction_accuracy_between_half_and_one() {
        // Prediction 7xA + 3xB vs gold alternating 5xA + 5xB.
        let unit_ids: Vec<String> = ids(1..=10);
        let id_refs: Vec<&str> = unit_ids.iter().map(String::as_str).collect();
        let pred_labels = ["A", "A", "A", "A", "A", "A", "A", "B", "B", "B"];
        let gold_labels = ["A", "B", "A", "B", "A", "B", "A", "B", "A", "B"];
        let pred =
            CodedResult::from_table("pred", units_with_labels(&id_refs, &pred_labels)).unwrap();
        let gold = GoldStandard::Table(units_with_labels(&id_refs, &gold_labels));

        let result = validate(&pred, &gold, "label", MeasurementLevel::Nominal, AverageMethod::Macro)
            .unwrap();
        let accuracy = result.metrics.accuracy.unwrap();
        assert!(accuracy > 0.5 && accuracy < 1.0, "accuracy = {accuracy}");
    }

    #[test]
    fn partial_overlap_matches_six_units() {
        // Prediction ids 1..10, gold ids 5..15 -> matched = 6 (ids 5..10).
        let pred_ids = ids(1..=10);
        let gold_ids = ids(5..=15);
        let pred = CodedResult::from_table(
            "pred",
            units_with_scores(
                &pred_ids.iter().map(String::as_str).collect::<Vec<_>>(),
                &vec![1.0; 10],
            ),
        )
        .unwrap();
        let gold = GoldStandard::Table(units_with_scores(
            &gold_ids.iter().map(String::as_str).collect::<Vec<_>>(),
            &vec![1.0; 11],
        ));

        let result = validate(&pred, &gold, "score", MeasurementLevel::Interval, AverageMethod::Macro)
            .unwrap();
        assert_eq!(result.n_matched, 6);
    }

    #[test]
    fn average_none_returns_per_class_table() {
        let unit_ids = ["1", "2", "3", "4"];
        let pred = CodedResult::from_table(
            "pred",
            units_with_labels(&unit_ids, &["a", "a", "b", "b"]),
        )
        .unwrap();
        let gold = GoldStandard::Table(units_with_labels(&unit_ids, &["a", "b", "b", "b"]));

        let result = validate(&pred, &gold, "label", MeasurementLevel::Nominal, AverageMethod::None)
            .unwrap();
        let per_class = result.per_class.unwrap();
        assert_eq!(per_class.len(), 2);
        assert_eq!(per_class[0].class, "a");
        assert_eq!(per_class[1].n, 3);
        assert!(result.metrics.precision.is_none());
        assert!(result.metrics.f1.is_none());
        // Accuracy and kappa are still reported.
        assert!(result.metrics.accuracy.is_some());
    }

    #[test]
    fn missing_values_are_excluded_not_fatal() {
        let unit_ids = ["1", "2", "3"];
        let mut pred_units = units_with_scores(&unit_ids, &[1.0, 2.0, 3.0]);
        pred_units[1]
            .fields
            .insert("score".into(), FieldValue::Missing);
        let pred = CodedResult::from_table("pred", pred_units).unwrap();
        let gold = GoldStandard::Table(units_with_scores(&unit_ids, &[1.0, 2.0, 3.0]));

        let result = validate(&pred, &gold, "score", MeasurementLevel::Interval, AverageMethod::Macro)
            .unwrap();
        assert_eq!(result.n_matched, 2);
    }

    #[test]
    fn all_missing_is_no_complete_cases() {
        let unit_ids = ["1", "2"];
        let mut pred_units = units_with_scores(&unit_ids, &[1.0, 2.0]);
        for unit in &mut pred_units {
            unit.fields.insert("score".into(), FieldValue::Missing);
        }
        let pred = CodedResult::from_table("pred", pred_units).unwrap();
        let gold = GoldStandard::Table(units_with_scores(&unit_ids, &[1.0, 2.0]));

        let err = validate(&pred, &gold, "score", MeasurementLevel::Interval, AverageMethod::Macro)
            .unwrap_err();
        assert!(matches!(err, ReliabilityError::NoCompleteCases { .. }));
    }

    #[test]
    fn no_overlap_is_an_error() {
        let pred =
            CodedResult::from_table("pred", units_with_scores(&["1", "2"], &[1.0, 2.0])).unwrap();
        let gold = GoldStandard::Table(units_with_scores(&["8", "9"], &[1.0, 2.0]));
        let err = validate(&pred, &gold, "score", MeasurementLevel::Nominal, AverageMethod::Macro)
            .unwrap_err();
        assert!(matches!(err, ReliabilityError::NoCommonUnits));
    }

    #[test]
    fn gold_field_error_names_gold_side() {
        let pred =
            CodedResult::from_table("pred", units_with_scores(&["1"], &[1.0])).unwrap();
        let gold = GoldStandard::Table(units_with_labels(&["1"], &["a"]));
        let err = validate(&pred, &gold, "score", MeasurementLevel::Nominal, AverageMethod::Macro)
            .unwrap_err();
        match err {
            ReliabilityError::MissingField { runs, available, .. } => {
                assert_eq!(runs, vec!["gold"]);
                assert_eq!(available, vec!["label"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_gold_ids_rejected() {
        let pred =
            CodedResult::from_table("pred", units_with_scores(&["1"], &[1.0])).unwrap();
        let gold = GoldStandard::Table(units_with_scores(&["1", "1"], &[1.0, 2.0]));
        let err = validate(&pred, &gold, "score", MeasurementLevel::Nominal, AverageMethod::Macro)
            .unwrap_err();
        assert!(matches!(err, ReliabilityError::DuplicateGoldUnit { .. }));
    }

    #[test]
    fn gold_run_field_error_names_the_run() {
        let pred =
            CodedResult::from_table("pred", units_with_scores(&["1"], &[1.0])).unwrap();
        let gold_run =
            CodedResult::from_table("human-gold", units_with_labels(&["1"], &["a"])).unwrap();
        let err = validate(
            &pred,
            &GoldStandard::from(gold_run),
            "score",
            MeasurementLevel::Nominal,
            AverageMethod::Macro,
        )
        .unwrap_err();
        match err {
            ReliabilityError::MissingField { runs, .. } => {
                assert_eq!(runs, vec!["human-gold"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn negative_zero_is_not_a_separate_class() {
        assert_eq!(distinct_count(&[0.0, 1.0], &[-0.0, 1.0]), 2);

        let unit_ids = ["1", "2", "3"];
        let pred =
            CodedResult::from_table("pred", units_with_scores(&unit_ids, &[0.0, 1.0, 2.0]))
                .unwrap();
        let gold = GoldStandard::Table(units_with_scores(&unit_ids, &[-0.0, 1.0, 2.0]));
        let result = validate(&pred, &gold, "score", MeasurementLevel::Ordinal, AverageMethod::Macro)
            .unwrap();
        assert_eq!(result.n_classes, Some(3));
    }

    #[test]
    fn gold_run_parent_uses_run_name() {
        let pred =
            CodedResult::from_table("pred", units_with_scores(&["1", "2"], &[1.0, 2.0])).unwrap();
        let gold_run =
            CodedResult::from_table("human-gold", units_with_scores(&["1", "2"], &[1.0, 2.0]))
                .unwrap();
        let result = validate(
            &pred,
            &GoldStandard::from(gold_run),
            "score",
            MeasurementLevel::Interval,
            AverageMethod::Macro,
        )
        .unwrap();
        assert_eq!(result.metadata.parents, vec!["pred", "human-gold"]);
        assert!(result.metadata.name.starts_with("validation-"));
    }
}
