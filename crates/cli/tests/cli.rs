#![allow(deprecated)] // assert_cmd::Command::cargo_bin

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Writes a synthetic cohort of 120 stays and returns its path.
fn write_cohort(dir: &TempDir) -> String {
    let mut csv = String::from("icustay_id,angus,sirs,qsofa,sofa,mlods,sepsis3,age,is_male\n");
    for i in 0..120 {
        let angus = i % 3 == 0;
        let bump = u32::from(angus);
        let sirs = (i % 4) + bump;
        let qsofa = (i % 3 + bump).min(3);
        let sofa = (i % 6) + 2 * bump;
        let mlods = (i % 5) + bump;
        let sepsis3 = if sofa >= 2 && i % 2 == 0 { "t" } else { "f" };
        let age = 40 + (i * 7) % 45;
        let is_male = if (i / 2) % 2 == 0 { "t" } else { "f" };
        csv.push_str(&format!(
            "{},{},{sirs},{qsofa},{sofa},{mlods},{sepsis3},{age},{is_male}\n",
            200_000 + i,
            u8::from(angus)
        ));
    }
    let path = dir.path().join("cohort.csv");
    fs::write(&path, csv).unwrap();
    path.to_string_lossy().into_owned()
}

fn sepsis3() -> Command {
    let mut cmd = Command::cargo_bin("sepsis3").unwrap();
    cmd.env("RUST_LOG", "warn");
    cmd
}

#[test]
fn cli_help_smoke() {
    sepsis3().arg("--help").assert().success();
}

#[test]
fn operating_points_text_lists_default_predictors() {
    let dir = TempDir::new().unwrap();
    let cohort = write_cohort(&dir);

    sepsis3()
        .args(["operating-points", "--cohort", &cohort, "--seed", "42"])
        .args(["--resamples", "200"])
        .assert()
        .success()
        .stdout(predicate::str::contains("OPERATING POINT REPORT"))
        .stdout(predicate::str::contains("SIRS"))
        .stdout(predicate::str::contains("Sepsis-3"));
}

#[test]
fn operating_points_csv_to_file() {
    let dir = TempDir::new().unwrap();
    let cohort = write_cohort(&dir);
    let output = dir.path().join("report.csv");

    sepsis3()
        .args(["operating-points", "--cohort", &cohort])
        .args(["--predictor", "SOFA=sofa>=2", "--predictor", "qSOFA=qsofa>=2"])
        .args(["--interval", "wilson", "--format", "csv"])
        .arg("--output")
        .arg(&output)
        .assert()
        .success();

    let written = fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("SOFA,"));
    assert!(lines[2].starts_with("qSOFA,"));
}

#[test]
fn auroc_text_shows_comparison_matrix() {
    let dir = TempDir::new().unwrap();
    let cohort = write_cohort(&dir);

    sepsis3()
        .args(["auroc", "--cohort", &cohort])
        .args(["--score", "SIRS=sirs", "--score", "SOFA=sofa"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PAIRWISE COMPARISON"))
        .stdout(predicate::str::contains("SOFA"));
}

#[test]
fn adjusted_auroc_json() {
    let dir = TempDir::new().unwrap();
    let cohort = write_cohort(&dir);

    sepsis3()
        .args(["auroc", "--cohort", &cohort, "--format", "json"])
        .args(["--adjustment", "baseline-regression"])
        .args(["--covariate", "age", "--covariate", "is_male"])
        .args(["--comparison", "paired-bootstrap", "--seed", "1", "--resamples", "100"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"adjustment\": \"baseline-regression\""));
}

#[test]
fn unknown_outcome_column_fails() {
    let dir = TempDir::new().unwrap();
    let cohort = write_cohort(&dir);

    sepsis3()
        .args(["operating-points", "--cohort", &cohort, "--outcome", "martin"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("martin"));
}

#[test]
fn invalid_format_is_rejected_by_parser() {
    sepsis3()
        .args(["operating-points", "--format", "xml"])
        .assert()
        .failure();
}

#[test]
fn show_config_prints_defaults() {
    sepsis3()
        .arg("show-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"outcome\": \"angus\""))
        .stdout(predicate::str::contains("\"n_resamples\": 1000"));
}
