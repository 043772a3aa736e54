//! End-to-end flow: coded results -> comparison/validation -> trail ->
//! exports.

use annotrail::{
    archive_objects, build_trail, compare, export_json, export_report, read_archive, validate,
    write_archive, AverageMethod, CodedResult, CodedUnit, ExportError, GoldStandard,
    MeasurementLevel, ReportOptions, RunKind, TrailSource,
};
use tempfile::tempdir;

fn run(name: &str, scores: &[f64]) -> CodedResult {
    let units = scores
        .iter()
        .enumerate()
        .map(|(i, s)| CodedUnit::new((i + 1).to_string()).with_field("score", *s))
        .collect();
    CodedResult::from_table(name, units).unwrap()
}

#[test]
fn comparison_parents_are_preserved_in_a_complete_trail() {
    let run1 = run("run1", &[1.0, 2.0, 3.0, 1.0, 2.0]);
    let run2 = run("run2", &[1.0, 2.0, 2.0, 1.0, 2.0]);
    let cmp = compare(&[&run1, &run2], "score", MeasurementLevel::Nominal, 0.0).unwrap();

    let trail = build_trail(&[&cmp, &run1, &run2]).unwrap();
    assert_eq!(trail.len(), 3);
    assert!(trail.complete);

    let node = trail.get(cmp.name()).unwrap();
    assert_eq!(node.parents, vec!["run1", "run2"]);
    assert_eq!(node.kind, RunKind::Comparison);

    // Parents come before the comparison in trail order.
    let names = trail.names();
    let cmp_pos = names.iter().position(|n| *n == cmp.name()).unwrap();
    for parent in ["run1", "run2"] {
        assert!(names.iter().position(|n| *n == parent).unwrap() < cmp_pos);
    }
}

#[test]
fn completeness_is_monotone_in_the_input_set() {
    let run1 = run("run1", &[1.0, 2.0]);
    let run2 = run("run2", &[1.0, 2.0]);
    let cmp = compare(&[&run1, &run2], "score", MeasurementLevel::Nominal, 0.0).unwrap();

    let partial = build_trail(&[&cmp, &run1]).unwrap();
    assert!(!partial.complete);
    assert_eq!(partial.missing_parents, vec!["run2"]);

    let full = build_trail(&[&cmp, &run1, &run2]).unwrap();
    assert!(full.complete);
}

#[test]
fn json_export_reparses_with_one_entry_per_run() {
    let run1 = run("run1", &[1.0, 2.0, 3.0]);
    let run2 = run("run2", &[1.0, 2.0, 3.0]);
    let trail = build_trail(&[&run1, &run2]).unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("trail.json");
    export_json(&trail, &path).unwrap();

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(parsed["complete"], serde_json::json!(true));
    assert_eq!(parsed["n_runs"], serde_json::json!(2));
    let runs = parsed["runs"].as_array().unwrap();
    assert_eq!(runs.len(), 2);
    let names: Vec<&str> = runs.iter().map(|r| r["name"].as_str().unwrap()).collect();
    assert!(names.contains(&"run1"));
    assert!(names.contains(&"run2"));
    // Origin runs have a null parent and no per-unit payloads.
    assert!(runs[0]["parent"].is_null());
    assert!(runs[0].get("units").is_none());
}

#[test]
fn json_export_encodes_multi_parent_as_array() {
    let run1 = run("run1", &[1.0, 2.0]);
    let run2 = run("run2", &[1.0, 2.0]);
    let cmp = compare(&[&run1, &run2], "score", MeasurementLevel::Nominal, 0.0).unwrap();
    let trail = build_trail(&[&run1, &run2, &cmp]).unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("trail.json");
    export_json(&trail, &path).unwrap();

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let cmp_run = parsed["runs"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"].as_str().unwrap().starts_with("comparison-"))
        .unwrap();
    assert_eq!(cmp_run["parent"], serde_json::json!(["run1", "run2"]));
}

#[test]
fn archive_round_trip_preserves_the_trail() {
    let run1 = run("run1", &[1.0, 2.0, 3.0]);
    let run2 = run("run2", &[1.0, 2.0, 4.0]);
    let cmp = compare(&[&run1, &run2], "score", MeasurementLevel::Interval, 0.5).unwrap();
    let trail = build_trail(&[&run1, &run2, &cmp]).unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("trail.bin");
    let written = write_archive(&trail, &path).unwrap();
    assert_eq!(written, path);

    let archive = read_archive(&path).unwrap();
    assert_eq!(archive.trail, trail);
    assert_eq!(archive.trail.len(), 3);
}

#[test]
fn archive_convenience_builds_from_objects() {
    let run1 = run("run1", &[1.0, 2.0]);
    let run2 = run("run2", &[1.0, 2.0]);
    let objects: Vec<&dyn TrailSource> = vec![&run1, &run2];

    let dir = tempdir().unwrap();
    let path = dir.path().join("trail.bin");
    archive_objects(&objects, None, &path).unwrap();

    let archive = read_archive(&path).unwrap();
    assert_eq!(archive.trail.len(), 2);
}

#[test]
fn archive_to_unwritable_path_is_an_io_error() {
    let run1 = run("run1", &[1.0]);
    let trail = build_trail(&[&run1]).unwrap();
    let err = write_archive(&trail, "/nonexistent-dir/trail.bin").unwrap_err();
    assert!(matches!(err, ExportError::Io(_)));
    assert_eq!(err.code(), "io_error");
}

#[test]
fn report_export_writes_selected_dialect() {
    let run1 = run("run1", &[1.0, 2.0, 3.0]);
    let run2 = run("run2", &[1.0, 2.0, 3.0]);
    let gold = GoldStandard::from(run("human", &[1.0, 2.0, 3.0]));
    let cmp = compare(&[&run1, &run2], "score", MeasurementLevel::Nominal, 0.0).unwrap();
    let val = validate(
        &run1,
        &gold,
        "score",
        MeasurementLevel::Nominal,
        AverageMethod::Macro,
    )
    .unwrap();
    // The gold run is not in the trail; the validation references it.
    let trail = build_trail(&[&run1, &run2, &cmp, &val]).unwrap();
    assert!(!trail.complete);

    let dir = tempdir().unwrap();
    let path = dir.path().join("report.qmd");
    export_report(&trail, &path, &ReportOptions::full()).unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("format: html"));
    assert!(content.contains("## Validation Metrics"));
    assert!(content.contains("accuracy"));
    assert!(content.contains("**incomplete**"));

    let err = export_report(&trail, dir.path().join("report.html"), &ReportOptions::full())
        .unwrap_err();
    assert!(matches!(err, ExportError::UnsupportedExtension { .. }));
}
