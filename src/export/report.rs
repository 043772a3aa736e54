//! Human-readable trail reports in Quarto or R Markdown.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::ExportError;
use crate::trail::{RunKind, Trail, TrailNode};

/// Report markup dialect, selected by destination extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportDialect {
    /// `.qmd`: Quarto, `format: html` front matter.
    Quarto,
    /// `.Rmd` / `.rmd`: R Markdown, `output: html_document` front matter.
    RMarkdown,
}

impl ReportDialect {
    /// Dialect for a destination path, by extension.
    pub fn from_path(path: &Path) -> Result<Self, ExportError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("qmd") => Ok(Self::Quarto),
            Some("Rmd") | Some("rmd") => Ok(Self::RMarkdown),
            _ => Err(ExportError::UnsupportedExtension {
                path: path.display().to_string(),
            }),
        }
    }

    fn front_matter(&self, title: &str) -> String {
        match self {
            Self::Quarto => format!("---\ntitle: \"{title}\"\nformat: html\n---\n\n"),
            Self::RMarkdown => {
                format!("---\ntitle: \"{title}\"\noutput: html_document\n---\n\n")
            }
        }
    }
}

/// Per-statistic robustness input: a designated reference value and the
/// value each downstream run produced for the same statistic.
#[derive(Debug, Clone)]
pub struct RobustnessStat {
    pub statistic: String,
    pub reference_value: f64,
    pub run_values: BTreeMap<String, f64>,
}

/// Downstream-analysis robustness across runs, relative to a reference run.
#[derive(Debug, Clone)]
pub struct RobustnessSummary {
    pub reference_run: String,
    pub statistics: Vec<RobustnessStat>,
}

impl RobustnessSummary {
    fn check(&self) -> Result<(), ExportError> {
        if self.reference_run.is_empty() {
            return Err(ExportError::MalformedRobustness(
                "reference run name is empty".into(),
            ));
        }
        if self.statistics.is_empty() {
            return Err(ExportError::MalformedRobustness(
                "no statistics supplied".into(),
            ));
        }
        for stat in &self.statistics {
            if stat.statistic.is_empty() {
                return Err(ExportError::MalformedRobustness(
                    "statistic with empty name".into(),
                ));
            }
            if stat.run_values.is_empty() {
                return Err(ExportError::MalformedRobustness(format!(
                    "statistic '{}' has no run values",
                    stat.statistic
                )));
            }
        }
        Ok(())
    }
}

/// Report content switches.
#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    /// Render metric tables for comparison runs in the trail.
    pub include_comparisons: bool,
    /// Render metric tables for validation runs in the trail.
    pub include_validations: bool,
    /// Render a downstream-robustness section.
    pub robustness: Option<RobustnessSummary>,
}

impl ReportOptions {
    /// Everything on except robustness.
    pub fn full() -> Self {
        Self {
            include_comparisons: true,
            include_validations: true,
            robustness: None,
        }
    }
}

/// Render and write a trail report; dialect is chosen by the destination
/// extension. Returns the path on success.
pub fn export_report(
    trail: &Trail,
    path: impl AsRef<Path>,
    options: &ReportOptions,
) -> Result<PathBuf, ExportError> {
    let path = path.as_ref();
    let dialect = ReportDialect::from_path(path)?;
    let content = render_report(trail, dialect, options)?;
    std::fs::write(path, content)?;
    Ok(path.to_path_buf())
}

/// Render a trail report to a string.
pub fn render_report(
    trail: &Trail,
    dialect: ReportDialect,
    options: &ReportOptions,
) -> Result<String, ExportError> {
    if let Some(robustness) = &options.robustness {
        robustness.check()?;
    }

    let mut out = dialect.front_matter("Provenance Trail Report");

    out.push_str("## Trail Summary\n\n");
    out.push_str(&format!("- Runs: {}\n", trail.len()));
    if trail.complete {
        out.push_str("- Status: complete\n");
    } else {
        out.push_str(&format!(
            "- Status: **incomplete** — missing parent runs: {}\n",
            trail.missing_parents.join(", ")
        ));
    }

    out.push_str("\n## Timeline\n\n");
    for (i, node) in trail.runs.iter().enumerate() {
        out.push_str(&format!(
            "{}. `{}` ({}, {})",
            i + 1,
            node.name,
            node.kind,
            node.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        if let Some(model) = &node.model {
            out.push_str(&format!(", model `{model}`"));
        }
        if let Some(codebook) = &node.codebook_name {
            out.push_str(&format!(", codebook `{codebook}`"));
        }
        if !node.parents.is_empty() {
            out.push_str(&format!(" — derived from {}", format_parents(node)));
        }
        out.push('\n');
    }

    if options.include_comparisons {
        render_metric_sections(
            &mut out,
            trail,
            RunKind::Comparison,
            "## Comparison Metrics",
        );
    }
    if options.include_validations {
        render_metric_sections(
            &mut out,
            trail,
            RunKind::Validation,
            "## Validation Metrics",
        );
    }

    if let Some(robustness) = &options.robustness {
        render_robustness(&mut out, robustness);
    }

    Ok(out)
}

fn format_parents(node: &TrailNode) -> String {
    node.parents
        .iter()
        .map(|p| format!("`{p}`"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_metric_sections(out: &mut String, trail: &Trail, kind: RunKind, header: &str) {
    let nodes: Vec<&TrailNode> = trail.runs.iter().filter(|n| n.kind == kind).collect();
    if nodes.is_empty() {
        return;
    }

    out.push_str(&format!("\n{header}\n"));
    for node in nodes {
        out.push_str(&format!("\n### `{}`", node.name));
        if let Some(level) = node.level {
            out.push_str(&format!(" ({level})"));
        }
        out.push_str("\n\n");
        out.push_str("| Metric | Value |\n|---|---|\n");
        for (name, value) in &node.metrics {
            out.push_str(&format!("| {name} | {value:.4} |\n"));
        }
    }
}

fn render_robustness(out: &mut String, robustness: &RobustnessSummary) {
    out.push_str("\n## Downstream Robustness\n\n");
    out.push_str(&format!(
        "Deviation from reference run `{}`.\n\n",
        robustness.reference_run
    ));
    out.push_str("| Statistic | Run | Value | Abs. deviation | Deviation (%) |\n");
    out.push_str("|---|---|---|---|---|\n");
    for stat in &robustness.statistics {
        for (run, value) in &stat.run_values {
            let abs_dev = value - stat.reference_value;
            let pct = if stat.reference_value == 0.0 {
                "—".to_string()
            } else {
                format!("{:+.2}", abs_dev / stat.reference_value * 100.0)
            };
            out.push_str(&format!(
                "| {} | {} | {:.4} | {:+.4} | {} |\n",
                stat.statistic, run, value, abs_dev, pct
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CodedResult, CodedUnit, MeasurementLevel};
    use crate::reliability::compare;
    use crate::trail::build_trail;

    fn sample_trail() -> Trail {
        let a = CodedResult::from_table(
            "run1",
            vec![
                CodedUnit::new("1").with_field("score", 1.0),
                CodedUnit::new("2").with_field("score", 2.0),
            ],
        )
        .unwrap();
        let b = CodedResult::from_table(
            "run2",
            vec![
                CodedUnit::new("1").with_field("score", 1.0),
                CodedUnit::new("2").with_field("score", 2.0),
            ],
        )
        .unwrap();
        let cmp = compare(&[&a, &b], "score", MeasurementLevel::Nominal, 0.0).unwrap();
        build_trail(&[&a, &b, &cmp]).unwrap()
    }

    #[test]
    fn dialect_from_extension() {
        assert_eq!(
            ReportDialect::from_path(Path::new("out/report.qmd")).unwrap(),
            ReportDialect::Quarto
        );
        assert_eq!(
            ReportDialect::from_path(Path::new("report.Rmd")).unwrap(),
            ReportDialect::RMarkdown
        );
        assert_eq!(
            ReportDialect::from_path(Path::new("report.rmd")).unwrap(),
            ReportDialect::RMarkdown
        );
        let err = ReportDialect::from_path(Path::new("report.docx")).unwrap_err();
        assert!(matches!(err, ExportError::UnsupportedExtension { .. }));
    }

    #[test]
    fn front_matter_differs_by_dialect() {
        let trail = sample_trail();
        let qmd = render_report(&trail, ReportDialect::Quarto, &ReportOptions::full()).unwrap();
        let rmd = render_report(&trail, ReportDialect::RMarkdown, &ReportOptions::full()).unwrap();
        assert!(qmd.starts_with("---\n"));
        assert!(qmd.contains("format: html"));
        assert!(rmd.contains("output: html_document"));
        assert!(!rmd.contains("format: html"));
    }

    #[test]
    fn report_contains_timeline_and_comparison_table() {
        let trail = sample_trail();
        let report = render_report(&trail, ReportDialect::Quarto, &ReportOptions::full()).unwrap();
        assert!(report.contains("## Timeline"));
        assert!(report.contains("`run1`"));
        assert!(report.contains("derived from `run1`, `run2`"));
        assert!(report.contains("## Comparison Metrics"));
        assert!(report.contains("krippendorff_alpha"));
    }

    #[test]
    fn comparison_section_is_optional() {
        let trail = sample_trail();
        let options = ReportOptions {
            include_comparisons: false,
            include_validations: false,
            robustness: None,
        };
        let report = render_report(&trail, ReportDialect::Quarto, &options).unwrap();
        assert!(!report.contains("## Comparison Metrics"));
    }

    #[test]
    fn incomplete_trail_is_flagged_visibly() {
        let mut trail = sample_trail();
        trail.complete = false;
        trail.missing_parents = vec!["run0".to_string()];
        let report = render_report(&trail, ReportDialect::Quarto, &ReportOptions::full()).unwrap();
        assert!(report.contains("**incomplete**"));
        assert!(report.contains("run0"));
    }

    #[test]
    fn robustness_section_renders_deviations() {
        let trail = sample_trail();
        let mut run_values = BTreeMap::new();
        run_values.insert("run2".to_string(), 0.45);
        let options = ReportOptions {
            include_comparisons: false,
            include_validations: false,
            robustness: Some(RobustnessSummary {
                reference_run: "run1".to_string(),
                statistics: vec![RobustnessStat {
                    statistic: "mean_score".to_string(),
                    reference_value: 0.5,
                    run_values,
                }],
            }),
        };
        let report = render_report(&trail, ReportDialect::Quarto, &options).unwrap();
        assert!(report.contains("## Downstream Robustness"));
        assert!(report.contains("mean_score"));
        assert!(report.contains("-10.00"));
    }

    #[test]
    fn malformed_robustness_is_rejected() {
        let trail = sample_trail();
        let options = ReportOptions {
            include_comparisons: false,
            include_validations: false,
            robustness: Some(RobustnessSummary {
                reference_run: "run1".to_string(),
                statistics: vec![],
            }),
        };
        let err = render_report(&trail, ReportDialect::Quarto, &options).unwrap_err();
        assert!(matches!(err, ExportError::MalformedRobustness(_)));
    }
}
