//! Inter-rater reliability comparison across coding runs.

use chrono::Utc;
use tracing::debug;

use super::align::{
    categorical_matrix, common_ids, complete_rows, encode_categories,
    encode_categorical_for_alpha, numeric_matrix, require_field,
};
use super::metrics;
use super::ReliabilityError;
use crate::record::{
    CodedResult, ComparisonMetrics, ComparisonResult, KappaType, MeasurementLevel, RunMetadata,
    RunStamp,
};

/// Compare two or more coding runs on one field, computing the full metric
/// battery for the declared measurement level (the battery is fixed per
/// level, not user-selectable):
///
/// - nominal: Krippendorff's alpha (nominal), exact percent agreement,
///   Cohen's kappa (2 raters) or Fleiss' kappa (3+).
/// - ordinal: Krippendorff's alpha (ordinal), Kendall's W, Spearman's rho
///   (mean over rater pairs), tolerance-relaxed percent agreement, and
///   quadratic-weighted kappa for exactly 2 raters.
/// - interval: Krippendorff's alpha (interval), ICC(2,1), Pearson's r
///   (mean over rater pairs), tolerance-relaxed percent agreement.
///
/// Krippendorff's alpha uses all aligned units including partially missing
/// ones; the remaining measures use complete cases only.
pub fn compare(
    results: &[&CodedResult],
    by: &str,
    level: MeasurementLevel,
    tolerance: f64,
) -> Result<ComparisonResult, ReliabilityError> {
    if results.len() < 2 {
        return Err(ReliabilityError::NotEnoughRaters { n: results.len() });
    }
    if tolerance < 0.0 {
        return Err(ReliabilityError::NegativeTolerance { tolerance });
    }
    require_field(results, by)?;

    let ids = common_ids(results);
    if ids.is_empty() {
        return Err(ReliabilityError::NoCommonUnits);
    }

    let n_raters = results.len();
    let n_subjects = ids.len();
    debug!(n_raters, n_subjects, by, level = %level, "comparing coded results");

    let metrics = match level {
        MeasurementLevel::Nominal => nominal_metrics(results, &ids, by)?,
        MeasurementLevel::Ordinal => ordinal_metrics(results, &ids, by, tolerance)?,
        MeasurementLevel::Interval => interval_metrics(results, &ids, by, tolerance)?,
    };

    let parents: Vec<String> = results.iter().map(|r| r.name().to_string()).collect();
    Ok(ComparisonResult {
        level,
        field: by.to_string(),
        metrics,
        n_subjects,
        n_raters,
        tolerance,
        metadata: derived_metadata("comparison", parents, n_subjects),
    })
}

fn nominal_metrics(
    results: &[&CodedResult],
    ids: &[String],
    by: &str,
) -> Result<ComparisonMetrics, ReliabilityError> {
    let matrix = categorical_matrix(results, ids, by);
    let alpha = metrics::krippendorff_alpha(
        &encode_categorical_for_alpha(&matrix),
        MeasurementLevel::Nominal,
    );

    let rows = complete_rows(&matrix, by);
    if rows.is_empty() {
        return Err(ReliabilityError::NoCompleteCases {
            field: by.to_string(),
        });
    }
    let (encoded, labels) = encode_categories(&rows);

    let (kappa, kappa_type) = if results.len() == 2 {
        let a: Vec<usize> = encoded.iter().map(|r| r[0]).collect();
        let b: Vec<usize> = encoded.iter().map(|r| r[1]).collect();
        (
            Some(metrics::cohen_kappa(&a, &b, labels.len())),
            Some(KappaType::Cohen),
        )
    } else {
        let counts: Vec<Vec<usize>> = encoded
            .iter()
            .map(|row| {
                let mut c = vec![0usize; labels.len()];
                for &class in row {
                    c[class] += 1;
                }
                c
            })
            .collect();
        (Some(metrics::fleiss_kappa(&counts)), Some(KappaType::Fleiss))
    };

    Ok(ComparisonMetrics {
        krippendorff_alpha: alpha,
        percent_agreement: metrics::percent_agreement_nominal(&encoded),
        kappa,
        kappa_type,
        kendall_w: None,
        spearman_rho: None,
        icc: None,
        pearson_r: None,
    })
}

fn ordinal_metrics(
    results: &[&CodedResult],
    ids: &[String],
    by: &str,
    tolerance: f64,
) -> Result<ComparisonMetrics, ReliabilityError> {
    let matrix = numeric_matrix(results, ids, by);
    let alpha = metrics::krippendorff_alpha(&matrix, MeasurementLevel::Ordinal);

    let rows = complete_rows(&matrix, by);
    if rows.is_empty() {
        return Err(ReliabilityError::NoCompleteCases {
            field: by.to_string(),
        });
    }

    let columns = transpose(&rows);
    let (kappa, kappa_type) = if results.len() == 2 {
        let (encoded, n_classes) = encode_ordered(&rows);
        let a: Vec<usize> = encoded.iter().map(|r| r[0]).collect();
        let b: Vec<usize> = encoded.iter().map(|r| r[1]).collect();
        (
            Some(metrics::weighted_kappa(&a, &b, n_classes)),
            Some(KappaType::Weighted),
        )
    } else {
        (None, None)
    };

    Ok(ComparisonMetrics {
        krippendorff_alpha: alpha,
        percent_agreement: metrics::percent_agreement(&rows, tolerance),
        kappa,
        kappa_type,
        kendall_w: Some(metrics::kendall_w(&columns)),
        spearman_rho: Some(mean_pairwise(&columns, metrics::spearman_rho)),
        icc: None,
        pearson_r: None,
    })
}

fn interval_metrics(
    results: &[&CodedResult],
    ids: &[String],
    by: &str,
    tolerance: f64,
) -> Result<ComparisonMetrics, ReliabilityError> {
    let matrix = numeric_matrix(results, ids, by);
    let alpha = metrics::krippendorff_alpha(&matrix, MeasurementLevel::Interval);

    let rows = complete_rows(&matrix, by);
    if rows.is_empty() {
        return Err(ReliabilityError::NoCompleteCases {
            field: by.to_string(),
        });
    }
    let columns = transpose(&rows);

    Ok(ComparisonMetrics {
        krippendorff_alpha: alpha,
        percent_agreement: metrics::percent_agreement(&rows, tolerance),
        kappa: None,
        kappa_type: None,
        kendall_w: None,
        spearman_rho: None,
        icc: Some(metrics::icc(&rows)),
        pearson_r: Some(mean_pairwise(&columns, metrics::pearson_r)),
    })
}

/// Metadata block for a derived (comparison/validation) record. The run
/// name is prefix + a short hash of parents and timestamp, keeping names
/// unique without caller input.
pub(crate) fn derived_metadata(
    prefix: &str,
    parents: Vec<String>,
    n_units: usize,
) -> RunMetadata {
    let stamp = RunStamp::now(n_units);
    let digest = blake3::hash(
        format!("{}|{}", parents.join("+"), Utc::now().timestamp_nanos_opt().unwrap_or_default())
            .as_bytes(),
    );
    let name = format!("{prefix}-{}", &digest.to_hex().as_str()[..8]);
    RunMetadata {
        name,
        parents,
        codebook: None,
        args: None,
        stamp,
    }
}

fn transpose(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    if rows.is_empty() {
        return Vec::new();
    }
    let n_cols = rows[0].len();
    (0..n_cols)
        .map(|c| rows.iter().map(|r| r[c]).collect())
        .collect()
}

/// Map ordinal numeric values to ordered class indices over the sorted
/// distinct values present.
fn encode_ordered(rows: &[Vec<f64>]) -> (Vec<Vec<usize>>, usize) {
    let mut distinct: Vec<f64> = rows.iter().flatten().copied().collect();
    distinct.sort_by(|a, b| a.partial_cmp(b).unwrap());
    distinct.dedup();
    let encoded = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|v| distinct.iter().position(|d| d == v).unwrap())
                .collect()
        })
        .collect();
    (encoded, distinct.len())
}

/// Mean of `f` over all rater-column pairs.
fn mean_pairwise(columns: &[Vec<f64>], f: fn(&[f64], &[f64]) -> f64) -> f64 {
    let m = columns.len();
    if m < 2 {
        return 0.0;
    }
    let mut sum = 0.0;
    let mut pairs = 0.0;
    for i in 0..m {
        for j in (i + 1)..m {
            sum += f(&columns[i], &columns[j]);
            pairs += 1.0;
        }
    }
    sum / pairs
}
