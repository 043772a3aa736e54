//! Unit alignment and field extraction shared by compare and validate.

use std::collections::BTreeSet;

use tracing::warn;

use super::ReliabilityError;
use crate::record::CodedResult;

/// Unit ids present in every input, in the first input's coding order.
pub(crate) fn common_ids(results: &[&CodedResult]) -> Vec<String> {
    let Some((first, rest)) = results.split_first() else {
        return Vec::new();
    };
    let rest_sets: Vec<BTreeSet<&str>> = rest
        .iter()
        .map(|r| r.units.iter().map(|u| u.id.as_str()).collect())
        .collect();
    first
        .units
        .iter()
        .filter(|u| rest_sets.iter().all(|s| s.contains(u.id.as_str())))
        .map(|u| u.id.clone())
        .collect()
}

/// Fail with a naming-aware error if any input lacks `field`.
pub(crate) fn require_field(
    results: &[&CodedResult],
    field: &str,
) -> Result<(), ReliabilityError> {
    let lacking: Vec<&&CodedResult> = results.iter().filter(|r| !r.has_field(field)).collect();
    if lacking.is_empty() {
        return Ok(());
    }
    let mut available = BTreeSet::new();
    for r in &lacking {
        for name in r.field_names() {
            available.insert(name);
        }
    }
    Err(ReliabilityError::MissingField {
        field: field.to_string(),
        runs: lacking.iter().map(|r| r.name().to_string()).collect(),
        available: available.into_iter().collect(),
    })
}

/// Categorical values as a units x raters matrix over `ids`. Missing values
/// stay `None` so chance-corrected measures can use partial units.
pub(crate) fn categorical_matrix(
    results: &[&CodedResult],
    ids: &[String],
    field: &str,
) -> Vec<Vec<Option<String>>> {
    ids.iter()
        .map(|id| {
            results
                .iter()
                .map(|r| {
                    r.unit(id)
                        .and_then(|u| u.get(field))
                        .and_then(|v| v.as_category())
                })
                .collect()
        })
        .collect()
}

/// Numeric values as a units x raters matrix over `ids`. Non-numeric text
/// is treated as missing, with one warning per offending input.
pub(crate) fn numeric_matrix(
    results: &[&CodedResult],
    ids: &[String],
    field: &str,
) -> Vec<Vec<Option<f64>>> {
    let mut non_numeric = vec![0usize; results.len()];
    let matrix: Vec<Vec<Option<f64>>> = ids
        .iter()
        .map(|id| {
            results
                .iter()
                .enumerate()
                .map(|(idx, r)| {
                    let value = r.unit(id).and_then(|u| u.get(field));
                    match value {
                        None => None,
                        Some(v) => {
                            let num = v.as_number();
                            if num.is_none() && !v.is_missing() {
                                non_numeric[idx] += 1;
                            }
                            num
                        }
                    }
                })
                .collect()
        })
        .collect();

    for (idx, count) in non_numeric.iter().enumerate() {
        if *count > 0 {
            warn!(
                run = results[idx].name(),
                field,
                count,
                "non-numeric values treated as missing"
            );
        }
    }

    matrix
}

/// Rows where every rater has a value. Logs how many rows were dropped.
pub(crate) fn complete_rows<T: Clone>(matrix: &[Vec<Option<T>>], field: &str) -> Vec<Vec<T>> {
    let complete: Vec<Vec<T>> = matrix
        .iter()
        .filter(|row| row.iter().all(|v| v.is_some()))
        .map(|row| row.iter().map(|v| v.clone().unwrap()).collect())
        .collect();
    let dropped = matrix.len() - complete.len();
    if dropped > 0 {
        warn!(
            field,
            dropped, "units with missing values excluded from metric computation"
        );
    }
    complete
}

/// Map categorical rows to class indices. Labels are sorted so encodings
/// are stable across calls; the label vector doubles as the class list.
pub(crate) fn encode_categories(rows: &[Vec<String>]) -> (Vec<Vec<usize>>, Vec<String>) {
    let labels: Vec<String> = rows
        .iter()
        .flatten()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let encoded = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|v| labels.binary_search(v).unwrap())
                .collect()
        })
        .collect();
    (encoded, labels)
}

/// Encode a full (possibly missing) categorical matrix as numeric class
/// indices for Krippendorff's alpha.
pub(crate) fn encode_categorical_for_alpha(
    matrix: &[Vec<Option<String>>],
) -> Vec<Vec<Option<f64>>> {
    let labels: Vec<&String> = matrix
        .iter()
        .flatten()
        .flatten()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    matrix
        .iter()
        .map(|row| {
            row.iter()
                .map(|v| {
                    v.as_ref()
                        .map(|s| labels.binary_search(&s).unwrap() as f64)
                })
                .collect()
        })
        .collect()
}
