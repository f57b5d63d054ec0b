//! Integration tests for the yaps CLI
//!
//! These tests run the actual binary against settings files in a temp dir.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get the binary to test
fn yaps_cmd() -> Command {
    Command::cargo_bin("yaps").unwrap()
}

/// Settings plus input table for a small postvqsr38 run, paths relative
fn postvqsr38_settings(dir: &TempDir, chroms: &[&str]) -> std::path::PathBuf {
    let table: String = chroms
        .iter()
        .map(|c| format!("{}\t/data/c{}.vcf.gz\n", c, c))
        .collect();
    fs::write(dir.path().join("vcfs.tsv"), table).unwrap();

    let settings = dir.path().join("settings.yaml");
    fs::write(
        &settings,
        r#"
pipeline: postvqsr38
project_name: cli-test
workspace: ws
input_vcfs: vcfs.tsv
email: qc@example.org
"#,
    )
    .unwrap();
    settings
}

#[test]
fn test_help_flag() {
    yaps_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("validate"));
}

#[test]
fn test_validate_reports_stages() {
    let temp_dir = TempDir::new().unwrap();
    let settings = postvqsr38_settings(&temp_dir, &["1", "2", "X"]);

    yaps_cmd()
        .arg("validate")
        .arg(&settings)
        .assert()
        .success()
        .stdout(predicate::str::contains("Pipeline 'postvqsr38' is valid"))
        .stdout(predicate::str::contains("2-count-sample-missingness: 2 tasks"))
        .stdout(predicate::str::contains("Tasks: 29"));

    assert!(!temp_dir.path().join("ws").exists());
}

#[test]
fn test_plan_writes_plan_and_directories() {
    let temp_dir = TempDir::new().unwrap();
    let settings = postvqsr38_settings(&temp_dir, &["1", "2"]);

    yaps_cmd()
        .arg("plan")
        .arg(&settings)
        .assert()
        .success()
        .stdout(predicate::str::contains("Recorded"))
        .stdout(predicate::str::contains("plan.json"));

    let ws = temp_dir.path().join("ws");
    assert!(ws.join("1-select-variants-ac-0-removal/1").is_dir());
    assert!(ws.join("9.1-gatk-variant-eval-summary").is_dir());

    let plan = fs::read_to_string(ws.join("plan.json")).unwrap();
    let plan: serde_json::Value = serde_json::from_str(&plan).unwrap();
    assert_eq!(plan["workflow"], "cli-test");
    assert_eq!(plan["restart"], false);
    assert_eq!(plan["tasks"][0]["drm_params"]["u"], "qc@example.org");
    assert!(plan["state_db"].as_str().unwrap().ends_with(".job_queue.db"));
    assert!(plan["primary_log"].as_str().unwrap().ends_with("cli-test.log"));
}

#[test]
fn test_plan_passes_restart_flag() {
    let temp_dir = TempDir::new().unwrap();
    let settings = postvqsr38_settings(&temp_dir, &["1"]);

    yaps_cmd()
        .args(["plan", "--restart", "--skip-confirm"])
        .arg(&settings)
        .assert()
        .success();

    let plan = fs::read_to_string(temp_dir.path().join("ws/plan.json")).unwrap();
    let plan: serde_json::Value = serde_json::from_str(&plan).unwrap();
    assert_eq!(plan["restart"], true);
    assert_eq!(plan["skip_confirm"], true);
}

#[test]
fn test_validate_b38_sample_listing() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("samples.json"),
        r#"{"S1": {"bams": ["/g/s1.bam"]}, "S2": {"bams": ["/g/s2.bam"]}}"#,
    )
    .unwrap();
    let settings = temp_dir.path().join("b38.yaml");
    fs::write(
        &settings,
        "pipeline: b38\nworkspace: ws\nsample_bams: samples.json\n",
    )
    .unwrap();

    yaps_cmd()
        .arg("validate")
        .arg(&settings)
        .assert()
        .success()
        .stdout(predicate::str::contains("Pipeline 'b38' is valid"))
        .stdout(predicate::str::contains("1-exec-speedseq-realign: 2 tasks"));
}

#[test]
fn test_validate_postvqsr() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("vcfs.tsv"), "1\t/data/c1.vcf.gz\n").unwrap();
    let settings = temp_dir.path().join("b37.yaml");
    fs::write(&settings, "pipeline: postvqsr\nworkspace: ws\ninput_vcfs: vcfs.tsv\n").unwrap();

    yaps_cmd()
        .arg("validate")
        .arg(&settings)
        .assert()
        .success()
        .stdout(predicate::str::contains("4-annotate-w-1000G: 1 tasks"))
        .stdout(predicate::str::contains("Tasks: 4"));
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_missing_settings_file() {
    yaps_cmd()
        .args(["validate", "does-not-exist.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("does-not-exist.yaml"))
        .stderr(predicate::str::contains("Fix:"));
}

#[test]
fn test_space_delimited_table_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let settings = postvqsr38_settings(&temp_dir, &["1"]);
    fs::write(temp_dir.path().join("vcfs.tsv"), "1 /data/c1.vcf.gz\n").unwrap();

    yaps_cmd()
        .arg("validate")
        .arg(&settings)
        .assert()
        .failure()
        .stderr(predicate::str::contains("YAPS-021"))
        .stderr(predicate::str::contains("tab-delimited"));
}

#[test]
fn test_pca_rejects_sex_chromosomes() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("vcfs.tsv"),
        "1\t/data/c1.vcf.gz\nX\t/data/cX.vcf.gz\n",
    )
    .unwrap();
    let settings = temp_dir.path().join("pca.yaml");
    fs::write(
        &settings,
        "pipeline: pca\nworkspace: ws\ninput_vcfs: vcfs.tsv\nvqslod_threshold: 1.5\n",
    )
    .unwrap();

    yaps_cmd()
        .arg("validate")
        .arg(&settings)
        .assert()
        .failure()
        .stderr(predicate::str::contains("YAPS-020"))
        .stderr(predicate::str::contains("'X'"));
}

#[test]
fn test_unknown_pipeline_kind() {
    let temp_dir = TempDir::new().unwrap();
    let settings = temp_dir.path().join("bad.yaml");
    fs::write(
        &settings,
        "pipeline: b37\nworkspace: ws\ninput_vcfs: vcfs.tsv\n",
    )
    .unwrap();

    yaps_cmd()
        .arg("validate")
        .arg(&settings)
        .assert()
        .failure()
        .stderr(predicate::str::contains("YAML parse error"));
}
