//! Statistic primitives for reliability and validation analysis.
//!
//! Free functions over plain slices with documented numeric contracts.
//! Degenerate inputs (fewer than two observations, zero variance) return
//! the stated fallback instead of NaN so callers can render results
//! without special-casing.

use std::collections::BTreeMap;

use crate::record::MeasurementLevel;

// =============================================================================
// Rank helpers
// =============================================================================

/// Fractional ranks (1-based), ties receive the average of their positions.
pub fn ranks_with_ties(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap());

    let mut ranks = vec![0.0; n];
    let mut i = 0usize;
    while i < n {
        let value = values[indices[i]];
        let mut j = i + 1;
        while j < n && values[indices[j]] == value {
            j += 1;
        }
        let avg_rank = (i + j + 1) as f64 / 2.0;
        for k in i..j {
            ranks[indices[k]] = avg_rank;
        }
        i = j;
    }

    ranks
}

// =============================================================================
// Correlation
// =============================================================================

/// Pearson product-moment correlation. Returns 0.0 for fewer than two
/// observations or zero variance in either vector.
pub fn pearson_r(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len();
    if n != y.len() || n < 2 {
        return 0.0;
    }
    let mean_x = x.iter().sum::<f64>() / n as f64;
    let mean_y = y.iter().sum::<f64>() / n as f64;

    let mut num = 0.0;
    let mut den_x = 0.0;
    let mut den_y = 0.0;
    for i in 0..n {
        let dx = x[i] - mean_x;
        let dy = y[i] - mean_y;
        num += dx * dy;
        den_x += dx * dx;
        den_y += dy * dy;
    }

    if den_x == 0.0 || den_y == 0.0 {
        0.0
    } else {
        num / (den_x.sqrt() * den_y.sqrt())
    }
}

/// Spearman's rho: Pearson correlation of fractional ranks.
pub fn spearman_rho(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.len() < 2 {
        return 0.0;
    }
    pearson_r(&ranks_with_ties(x), &ranks_with_ties(y))
}

/// Kendall's tau-b with tie correction. Returns 0.0 when every pair is
/// tied in either vector.
pub fn kendall_tau_b(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len();
    if n != y.len() || n < 2 {
        return 0.0;
    }

    let mut concordant = 0f64;
    let mut discordant = 0f64;
    let mut ties_x = 0f64;
    let mut ties_y = 0f64;

    for i in 0..n {
        for j in (i + 1)..n {
            let dx = x[i] - x[j];
            let dy = y[i] - y[j];

            if dx == 0.0 && dy == 0.0 {
                continue;
            } else if dx == 0.0 {
                ties_x += 1.0;
            } else if dy == 0.0 {
                ties_y += 1.0;
            } else if (dx > 0.0 && dy > 0.0) || (dx < 0.0 && dy < 0.0) {
                concordant += 1.0;
            } else {
                discordant += 1.0;
            }
        }
    }

    let denom = ((concordant + discordant + ties_x) * (concordant + discordant + ties_y)).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        (concordant - discordant) / denom
    }
}

// =============================================================================
// Agreement
// =============================================================================

/// Share of subjects on which all raters agree within `tolerance`.
///
/// `rows` is subjects x raters. A subject agrees when the spread
/// (max - min) across raters is <= tolerance; exact match at tolerance 0.
pub fn percent_agreement(rows: &[Vec<f64>], tolerance: f64) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    let agreeing = rows
        .iter()
        .filter(|row| {
            let max = row.iter().fold(f64::NEG_INFINITY, |a, v| a.max(*v));
            let min = row.iter().fold(f64::INFINITY, |a, v| a.min(*v));
            max - min <= tolerance
        })
        .count();
    agreeing as f64 / rows.len() as f64
}

/// Share of subjects on which all raters assigned the same class index.
pub fn percent_agreement_nominal(rows: &[Vec<usize>]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    let agreeing = rows
        .iter()
        .filter(|row| row.windows(2).all(|w| w[0] == w[1]))
        .count();
    agreeing as f64 / rows.len() as f64
}

/// Cohen's kappa for two raters over class indices `0..n_classes`.
///
/// Returns 1.0 when chance agreement is 1 and observed agreement is also 1
/// (single-class degenerate case), 0.0 when chance agreement is 1 otherwise.
pub fn cohen_kappa(a: &[usize], b: &[usize], n_classes: usize) -> f64 {
    let n = a.len();
    if n == 0 || n != b.len() || n_classes == 0 {
        return 0.0;
    }

    let mut marg_a = vec![0.0; n_classes];
    let mut marg_b = vec![0.0; n_classes];
    let mut observed = 0.0;
    for i in 0..n {
        marg_a[a[i]] += 1.0;
        marg_b[b[i]] += 1.0;
        if a[i] == b[i] {
            observed += 1.0;
        }
    }

    let po = observed / n as f64;
    let pe = marg_a
        .iter()
        .zip(&marg_b)
        .map(|(x, y)| (x / n as f64) * (y / n as f64))
        .sum::<f64>();

    if (1.0 - pe).abs() < f64::EPSILON {
        if (1.0 - po).abs() < f64::EPSILON {
            1.0
        } else {
            0.0
        }
    } else {
        (po - pe) / (1.0 - pe)
    }
}

/// Fleiss' kappa over a subjects x classes count matrix. Every subject must
/// have the same number of ratings (= rater count). Degenerate chance
/// agreement follows the same convention as [`cohen_kappa`].
pub fn fleiss_kappa(counts: &[Vec<usize>]) -> f64 {
    let n = counts.len();
    if n == 0 {
        return 0.0;
    }
    let k = counts[0].len();
    let m: usize = counts[0].iter().sum();
    if k == 0 || m < 2 {
        return 0.0;
    }

    let mut p_j = vec![0.0; k];
    let mut p_bar = 0.0;
    for row in counts {
        let mut agree = 0.0;
        for (j, &c) in row.iter().enumerate() {
            p_j[j] += c as f64;
            agree += (c * c) as f64;
        }
        p_bar += (agree - m as f64) / (m as f64 * (m as f64 - 1.0));
    }
    p_bar /= n as f64;

    let total = (n * m) as f64;
    let pe: f64 = p_j.iter().map(|&c| (c / total) * (c / total)).sum();

    if (1.0 - pe).abs() < f64::EPSILON {
        if (1.0 - p_bar).abs() < f64::EPSILON {
            1.0
        } else {
            0.0
        }
    } else {
        (p_bar - pe) / (1.0 - pe)
    }
}

/// Quadratic-weighted kappa for two raters over ordered class indices
/// `0..n_classes`. Weights: `1 - (i - j)^2 / (n_classes - 1)^2`.
pub fn weighted_kappa(a: &[usize], b: &[usize], n_classes: usize) -> f64 {
    let n = a.len();
    if n == 0 || n != b.len() || n_classes < 2 {
        // A single class means no disagreement is expressible.
        return if n > 0 && n_classes == 1 { 1.0 } else { 0.0 };
    }

    let k = n_classes;
    let denom = ((k - 1) * (k - 1)) as f64;
    let weight = |i: usize, j: usize| {
        let d = i as f64 - j as f64;
        1.0 - (d * d) / denom
    };

    let mut marg_a = vec![0.0; k];
    let mut marg_b = vec![0.0; k];
    let mut po_w = 0.0;
    for i in 0..n {
        marg_a[a[i]] += 1.0;
        marg_b[b[i]] += 1.0;
        po_w += weight(a[i], b[i]);
    }
    po_w /= n as f64;

    let mut pe_w = 0.0;
    for i in 0..k {
        for j in 0..k {
            pe_w += (marg_a[i] / n as f64) * (marg_b[j] / n as f64) * weight(i, j);
        }
    }

    if (1.0 - pe_w).abs() < f64::EPSILON {
        if (1.0 - po_w).abs() < f64::EPSILON {
            1.0
        } else {
            0.0
        }
    } else {
        (po_w - pe_w) / (1.0 - pe_w)
    }
}

/// Kendall's coefficient of concordance W with tie correction.
///
/// `ratings` is raters x subjects. Returns 0.0 with fewer than two raters
/// or subjects, or when all subjects are tied for every rater.
pub fn kendall_w(ratings: &[Vec<f64>]) -> f64 {
    let m = ratings.len();
    if m < 2 {
        return 0.0;
    }
    let n = ratings[0].len();
    if n < 2 || ratings.iter().any(|r| r.len() != n) {
        return 0.0;
    }

    let mut rank_sums = vec![0.0; n];
    let mut tie_term = 0.0;
    for rater in ratings {
        let ranks = ranks_with_ties(rater);
        for (i, r) in ranks.iter().enumerate() {
            rank_sums[i] += r;
        }
        // Sum of (t^3 - t) over tie groups for this rater.
        let mut groups: BTreeMap<u64, usize> = BTreeMap::new();
        for v in rater {
            *groups.entry(v.to_bits()).or_insert(0) += 1;
        }
        for (_, t) in groups {
            let t = t as f64;
            tie_term += t * t * t - t;
        }
    }

    let mean_rank = rank_sums.iter().sum::<f64>() / n as f64;
    let s: f64 = rank_sums.iter().map(|r| (r - mean_rank).powi(2)).sum();

    let m = m as f64;
    let n = n as f64;
    let denom = m * m * (n * n * n - n) - m * tie_term;
    if denom <= 0.0 {
        0.0
    } else {
        12.0 * s / denom
    }
}

// =============================================================================
// Krippendorff's alpha
// =============================================================================

/// Krippendorff's alpha over a units x raters matrix with possible missing
/// values, using the level-appropriate difference function (nominal 0/1,
/// ordinal cumulative-frequency ranks, interval squared difference).
///
/// Nominal categories must be pre-encoded as numeric class indices.
/// Units with fewer than two non-missing values contribute nothing.
/// Returns 1.0 when no disagreement is expressible (all observed values
/// identical), and 0.0 when fewer than two pairable values exist.
pub fn krippendorff_alpha(units: &[Vec<Option<f64>>], level: MeasurementLevel) -> f64 {
    // Distinct observed values become the coincidence-matrix categories.
    let mut distinct: Vec<f64> = units
        .iter()
        .flatten()
        .filter_map(|v| *v)
        .collect();
    distinct.sort_by(|a, b| a.partial_cmp(b).unwrap());
    distinct.dedup();

    let k = distinct.len();
    if k == 0 {
        return 0.0;
    }
    let index_of = |v: f64| distinct.iter().position(|d| *d == v).unwrap();

    let mut coincidence = vec![vec![0.0; k]; k];
    let mut n_pairable = 0.0;
    for unit in units {
        let present: Vec<usize> = unit.iter().filter_map(|v| v.map(&index_of)).collect();
        let m = present.len();
        if m < 2 {
            continue;
        }
        n_pairable += m as f64;
        let weight = 1.0 / (m as f64 - 1.0);
        for i in 0..m {
            for j in 0..m {
                if i != j {
                    coincidence[present[i]][present[j]] += weight;
                }
            }
        }
    }

    if n_pairable < 2.0 {
        return 0.0;
    }

    let n_c: Vec<f64> = coincidence.iter().map(|row| row.iter().sum()).collect();
    let n_total: f64 = n_c.iter().sum();

    let delta_sq = |c: usize, d: usize| -> f64 {
        if c == d {
            return 0.0;
        }
        match level {
            MeasurementLevel::Nominal => 1.0,
            MeasurementLevel::Interval => {
                let diff = distinct[c] - distinct[d];
                diff * diff
            }
            MeasurementLevel::Ordinal => {
                let (lo, hi) = if c < d { (c, d) } else { (d, c) };
                let between: f64 = (lo..=hi).map(|g| n_c[g]).sum();
                let diff = between - (n_c[lo] + n_c[hi]) / 2.0;
                diff * diff
            }
        }
    };

    let mut observed = 0.0;
    let mut expected = 0.0;
    for c in 0..k {
        for d in 0..k {
            if c == d {
                continue;
            }
            let dsq = delta_sq(c, d);
            observed += coincidence[c][d] * dsq;
            expected += n_c[c] * n_c[d] * dsq;
        }
    }
    expected /= n_total - 1.0;

    if expected <= 0.0 {
        // All observed values identical: no disagreement was possible,
        // and none occurred.
        return if observed <= 0.0 { 1.0 } else { 0.0 };
    }

    1.0 - observed / expected
}

// =============================================================================
// ICC and error measures
// =============================================================================

/// ICC(2,1): two-way random effects, absolute agreement, single measures.
///
/// `rows` is subjects x raters, complete (no missing values). Returns 0.0
/// for fewer than two subjects or raters.
pub fn icc(rows: &[Vec<f64>]) -> f64 {
    let n = rows.len();
    if n < 2 {
        return 0.0;
    }
    let k = rows[0].len();
    if k < 2 || rows.iter().any(|r| r.len() != k) {
        return 0.0;
    }

    let nf = n as f64;
    let kf = k as f64;
    let grand = rows.iter().flatten().sum::<f64>() / (nf * kf);

    let row_means: Vec<f64> = rows.iter().map(|r| r.iter().sum::<f64>() / kf).collect();
    let col_means: Vec<f64> = (0..k)
        .map(|j| rows.iter().map(|r| r[j]).sum::<f64>() / nf)
        .collect();

    let ss_rows: f64 = row_means.iter().map(|m| kf * (m - grand).powi(2)).sum();
    let ss_cols: f64 = col_means.iter().map(|m| nf * (m - grand).powi(2)).sum();
    let ss_total: f64 = rows
        .iter()
        .flatten()
        .map(|v| (v - grand).powi(2))
        .sum();
    let ss_error = (ss_total - ss_rows - ss_cols).max(0.0);

    let msr = ss_rows / (nf - 1.0);
    let msc = ss_cols / (kf - 1.0);
    let mse = ss_error / ((nf - 1.0) * (kf - 1.0));

    let denom = msr + (kf - 1.0) * mse + kf * (msc - mse) / nf;
    if denom.abs() < f64::EPSILON {
        // Zero variance everywhere: perfect agreement.
        return if (msr - mse).abs() < f64::EPSILON { 1.0 } else { 0.0 };
    }
    (msr - mse) / denom
}

/// Mean absolute error. Returns 0.0 for empty input.
pub fn mae(pred: &[f64], gold: &[f64]) -> f64 {
    let n = pred.len().min(gold.len());
    if n == 0 {
        return 0.0;
    }
    pred.iter()
        .zip(gold)
        .map(|(p, g)| (p - g).abs())
        .sum::<f64>()
        / n as f64
}

/// Root-mean-squared error. Returns 0.0 for empty input.
pub fn rmse(pred: &[f64], gold: &[f64]) -> f64 {
    let n = pred.len().min(gold.len());
    if n == 0 {
        return 0.0;
    }
    (pred
        .iter()
        .zip(gold)
        .map(|(p, g)| (p - g) * (p - g))
        .sum::<f64>()
        / n as f64)
        .sqrt()
}

// =============================================================================
// Classification metrics
// =============================================================================

/// Raw per-class counts for classification metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassCounts {
    pub tp: usize,
    pub fp: usize,
    pub fn_: usize,
    /// Gold-standard support.
    pub support: usize,
}

/// Per-class true/false positive/negative counts over class indices
/// `0..n_classes`.
pub fn class_counts(pred: &[usize], gold: &[usize], n_classes: usize) -> Vec<ClassCounts> {
    let mut counts = vec![ClassCounts::default(); n_classes];
    for (&p, &g) in pred.iter().zip(gold) {
        counts[g].support += 1;
        if p == g {
            counts[p].tp += 1;
        } else {
            counts[p].fp += 1;
            counts[g].fn_ += 1;
        }
    }
    counts
}

/// Exact-match accuracy.
pub fn accuracy(pred: &[usize], gold: &[usize]) -> f64 {
    let n = pred.len().min(gold.len());
    if n == 0 {
        return 0.0;
    }
    pred.iter().zip(gold).filter(|(p, g)| p == g).count() as f64 / n as f64
}

/// Precision for one class: tp / (tp + fp), 0.0 when undefined.
pub fn class_precision(c: &ClassCounts) -> f64 {
    let denom = c.tp + c.fp;
    if denom == 0 {
        0.0
    } else {
        c.tp as f64 / denom as f64
    }
}

/// Recall for one class: tp / (tp + fn), 0.0 when undefined.
pub fn class_recall(c: &ClassCounts) -> f64 {
    let denom = c.tp + c.fn_;
    if denom == 0 {
        0.0
    } else {
        c.tp as f64 / denom as f64
    }
}

/// F1 for one class, 0.0 when precision + recall is zero.
pub fn class_f1(c: &ClassCounts) -> f64 {
    let p = class_precision(c);
    let r = class_recall(c);
    if p + r == 0.0 {
        0.0
    } else {
        2.0 * p * r / (p + r)
    }
}

/// Aggregated (precision, recall, f1) over classes.
///
/// - macro: unweighted mean of per-class values
/// - weighted: mean weighted by gold support
/// - micro: pooled counts (equals accuracy in single-label classification)
pub fn aggregate_prf(counts: &[ClassCounts], method: crate::record::AverageMethod) -> (f64, f64, f64) {
    use crate::record::AverageMethod;

    if counts.is_empty() {
        return (0.0, 0.0, 0.0);
    }

    match method {
        AverageMethod::Micro => {
            let tp: usize = counts.iter().map(|c| c.tp).sum();
            let fp: usize = counts.iter().map(|c| c.fp).sum();
            let fn_: usize = counts.iter().map(|c| c.fn_).sum();
            let pooled = ClassCounts {
                tp,
                fp,
                fn_,
                support: 0,
            };
            (
                class_precision(&pooled),
                class_recall(&pooled),
                class_f1(&pooled),
            )
        }
        AverageMethod::Macro | AverageMethod::None => {
            let k = counts.len() as f64;
            let p = counts.iter().map(class_precision).sum::<f64>() / k;
            let r = counts.iter().map(class_recall).sum::<f64>() / k;
            let f = counts.iter().map(class_f1).sum::<f64>() / k;
            (p, r, f)
        }
        AverageMethod::Weighted => {
            let total: usize = counts.iter().map(|c| c.support).sum();
            if total == 0 {
                return (0.0, 0.0, 0.0);
            }
            let mut p = 0.0;
            let mut r = 0.0;
            let mut f = 0.0;
            for c in counts {
                let w = c.support as f64 / total as f64;
                p += w * class_precision(c);
                r += w * class_recall(c);
                f += w * class_f1(c);
            }
            (p, r, f)
        }
    }
}
