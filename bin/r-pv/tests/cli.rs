//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "tests"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Command line integration tests."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use serde_json::Value;
use tempfile::{tempdir, TempDir};

fn offline_config(dir: &Path) -> PathBuf {
    let path = dir.join("r-pv.toml");
    let logs = dir.join("logs");
    fs::write(
        &path,
        format!(
            r#"
            [logging]
            directory = "{}"

            [weather]
            provider = "synthetic"
            seed = 5

            [geocoding]
            enabled = false

            [design_conditions]
            enabled = false
            "#,
            logs.display()
        ),
    )
    .expect("write config");
    path
}

fn r_pv(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("r-pv").expect("binary built");
    cmd.env_remove("R_PV_CONFIG")
        .arg("--config")
        .arg(offline_config(dir.path()));
    cmd
}

fn stdout_json(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("command runs");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn calculate_writes_reports() {
    let dir = tempdir().unwrap();
    let request = dir.path().join("request.yaml");
    fs::write(
        &request,
        "latitude: 39.74\nlongitude: -104.99\nsystem_size: 5\nelectricity_rate: 0.13\n",
    )
    .unwrap();
    let reports = dir.path().join("reports");

    let response = stdout_json(
        r_pv(&dir)
            .arg("calculate")
            .arg("--request")
            .arg(&request)
            .arg("--output-dir")
            .arg(&reports),
    );
    assert_eq!(response["success"], true);
    assert!(response["system_analysis"]["annual_energy"].as_f64().unwrap() > 0.0);
    for name in ["system_analysis.json", "financial_metrics.json", "weather_data.json"] {
        assert!(reports.join(name).exists(), "{name} missing");
    }
}

#[test]
fn failed_calculation_prints_error_document() {
    let dir = tempdir().unwrap();
    let request = dir.path().join("request.json");
    fs::write(&request, r#"{"latitude": 10, "longitude": 10}"#).unwrap();

    let output = r_pv(&dir)
        .arg("calculate")
        .arg("--request")
        .arg(&request)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let response: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(response["success"], false);
    assert_eq!(response["error_kind"], "invalid_input");
}

#[test]
fn malformed_request_prints_error_document() {
    let dir = tempdir().unwrap();
    let request = dir.path().join("request.json");
    fs::write(&request, r#"{"latitude": 39.74, "longitude": "#).unwrap();

    let output = r_pv(&dir)
        .arg("calculate")
        .arg("--request")
        .arg(&request)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let response: Value = serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    assert_eq!(response["success"], false);
    assert_eq!(response["error_kind"], "invalid_input");
    assert!(response["error"].as_str().unwrap().contains("malformed request"));
}

#[test]
fn catalog_listing_and_lookup() {
    let dir = tempdir().unwrap();
    let modules = stdout_json(r_pv(&dir).arg("modules"));
    let names = modules["names"].as_array().unwrap();
    assert!(!names.is_empty());

    let first = names[0].as_str().unwrap().to_owned();
    let details = stdout_json(r_pv(&dir).arg("module").arg(&first));
    assert_eq!(details["name"], first.as_str());

    r_pv(&dir).arg("inverter").arg("No Such Inverter").assert().failure();
}

#[test]
fn check_sizing_reports_inverter_count() {
    let dir = tempdir().unwrap();
    let check = stdout_json(
        r_pv(&dir)
            .arg("check-sizing")
            .arg("--system-size")
            .arg("12")
            .arg("--inverter")
            .arg("Generic String 5.0kW"),
    );
    assert_eq!(check["number_of_inverters"], 3);
    assert_eq!(check["status"], "undersized");
}

#[test]
fn area_from_points() {
    let dir = tempdir().unwrap();
    let area = stdout_json(r_pv(&dir).args([
        "area", "--point", "0,0", "--point", "0,0.001", "--point", "0.001,0.001", "--point",
        "0.001,0",
    ]));
    assert_eq!(area["vertices"], 4);
    assert!(area["area_m2"].as_f64().unwrap() > 12_000.0);
}

#[test]
fn mount_types_for_one_model() {
    let dir = tempdir().unwrap();
    let listing = stdout_json(r_pv(&dir).args(["mount-types", "--model", "pvsyst"]));
    assert_eq!(listing["pvsyst"], serde_json::json!(["freestanding", "insulated"]));
    assert!(listing.get("sapm").is_none());
}
