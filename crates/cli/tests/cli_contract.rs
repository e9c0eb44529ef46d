use assert_cmd::cargo::cargo_bin_cmd;
use pdf_engine::fixtures::{build_pdf, letter_page, malformed_page, two_page_letter, FixturePage};
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

const ANALYSIS: &str = r#"{
    "status": "ANOMALIES",
    "anomalies": [
        {
            "code": "E2",
            "title": "Net pay does not add up",
            "severity": "HIGH",
            "explanation": "gross minus contributions differs from net",
            "references": [
                {"page": 1, "text_snippet": "NET A PAYER", "bbox": [100.0, 100.0, 200.0, 150.0]},
                {"page": 5, "text_snippet": "beyond the document", "bbox": [0.0, 0.0, 10.0, 10.0]}
            ]
        },
        {
            "code": "E1",
            "title": "Missing period",
            "severity": "MEDIUM",
            "explanation": "no pay period found",
            "references": [
                {"page": 1, "text_snippet": "Periode", "bbox": [10.0, 20.0, 30.0, 40.0]}
            ]
        }
    ],
    "extracted_data": {
        "net_a_payer": {"value": 1850.0, "raw_text": "1 850,00", "confidence": 0.9},
        "periode": {"raw_text": "Mars 2024", "confidence": 0.5}
    }
}"#;

fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).expect("fixture should be written");
    path
}

fn stdout_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("stdout should contain valid json")
}

#[test]
fn info_emits_page_geometry() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write(temp.path(), "two.pdf", &two_page_letter());

    let output = cargo_bin_cmd!("slipview")
        .arg("info")
        .arg(&pdf)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = stdout_json(&output);
    assert_eq!(value["page_count"], 2);
    assert_eq!(value["pages"][0]["page"], 1);
    assert_eq!(value["pages"][0]["width_pt"], 612.0);
    assert_eq!(value["pages"][1]["height_pt"], 792.0);
    assert_eq!(value["pages"][1]["rotation"], 0);
}

#[test]
fn info_reports_rotation() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let rotated = FixturePage { rotate: Some(90), ..letter_page() };
    let pdf = write(temp.path(), "rotated.pdf", &build_pdf(&[rotated], false));

    let output =
        cargo_bin_cmd!("slipview").arg("info").arg(&pdf).assert().success().get_output().stdout.clone();

    assert_eq!(stdout_json(&output)["pages"][0]["rotation"], 90);
}

#[test]
fn inspect_places_highlights_on_rotated_page() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let rotated = FixturePage { rotate: Some(90), ..letter_page() };
    let pdf = write(temp.path(), "rotated.pdf", &build_pdf(&[rotated], false));
    let analysis = write(temp.path(), "analysis.json", ANALYSIS.as_bytes());

    let output = cargo_bin_cmd!("slipview")
        .arg("inspect")
        .arg(&pdf)
        .arg("--analysis")
        .arg(&analysis)
        .arg("--scale")
        .arg("1")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = stdout_json(&output);
    assert_eq!(value["scale"], 1.0);
    assert_eq!(value["dropped_annotations"], 1);

    let extracted = value["extracted"].as_array().expect("extracted fields should be listed");
    assert_eq!(extracted.len(), 2);
    assert_eq!(extracted[0]["field"], "net_a_payer");
    assert_eq!(extracted[0]["value"], 1850.0);
    assert_eq!(extracted[1]["field"], "periode");
    assert_eq!(extracted[1]["raw_text"], "Mars 2024");
    assert!(extracted[1]["value"].is_null());

    let page = &value["pages"][0];
    assert_eq!(page["status"], "ready");
    assert_eq!(page["width_px"], 792);
    assert_eq!(page["height_px"], 612);

    let highlights = page["highlights"].as_array().expect("highlights should be an array");
    assert_eq!(highlights.len(), 1);
    assert_eq!(highlights[0]["left"], 642.0);
    assert_eq!(highlights[0]["top"], 100.0);
    assert_eq!(highlights[0]["width"], 50.0);
    assert_eq!(highlights[0]["height"], 100.0);
    assert_eq!(highlights[0]["label"], "Net pay does not add up");
}

#[test]
fn inspect_selects_requested_anomaly() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write(temp.path(), "one.pdf", &build_pdf(&[letter_page()], false));
    let analysis = write(temp.path(), "analysis.json", ANALYSIS.as_bytes());

    let output = cargo_bin_cmd!("slipview")
        .arg("inspect")
        .arg(&pdf)
        .arg("--analysis")
        .arg(&analysis)
        .arg("--anomaly")
        .arg("2")
        .arg("--scale")
        .arg("2")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = stdout_json(&output);
    assert_eq!(value["dropped_annotations"], 0);
    let highlight = &value["pages"][0]["highlights"][0];
    assert_eq!(highlight["label"], "Missing period");
    assert_eq!(highlight["left"], 20.0);
    assert_eq!(highlight["top"], 40.0);
}

#[test]
fn inspect_reports_page_local_failures() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write(temp.path(), "mixed.pdf", &build_pdf(&[letter_page(), malformed_page()], false));

    let output = cargo_bin_cmd!("slipview")
        .arg("inspect")
        .arg(&pdf)
        .arg("--scale")
        .arg("0.25")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = stdout_json(&output);
    assert!(value.get("extracted").is_none());
    assert_eq!(value["pages"][0]["status"], "ready");
    assert_eq!(value["pages"][1]["status"], "failed");
    assert!(value["pages"][1]["error"].as_str().is_some_and(|error| error.contains("page 2")));
}

#[test]
fn render_writes_highlighted_png() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write(temp.path(), "one.pdf", &build_pdf(&[letter_page()], false));
    let analysis = write(temp.path(), "analysis.json", ANALYSIS.as_bytes());
    let png = temp.path().join("page1.png");

    let output = cargo_bin_cmd!("slipview")
        .arg("render")
        .arg(&pdf)
        .arg("--output")
        .arg(&png)
        .arg("--analysis")
        .arg(&analysis)
        .arg("--scale")
        .arg("1")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = stdout_json(&output);
    assert_eq!(value["page"], 1);
    assert_eq!(value["highlights"], 1);

    let image = image::open(&png).expect("png should decode").to_rgba8();
    assert_eq!(image.dimensions(), (612, 792));
    assert_ne!(image.get_pixel(150, 125).0, [255, 255, 255, 255]);
    assert_eq!(image.get_pixel(300, 300).0, [255, 255, 255, 255]);
}

#[test]
fn render_reports_failed_page() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write(temp.path(), "mixed.pdf", &build_pdf(&[letter_page(), malformed_page()], false));
    let png = temp.path().join("page2.png");

    cargo_bin_cmd!("slipview")
        .arg("render")
        .arg(&pdf)
        .arg("--page")
        .arg("2")
        .arg("--output")
        .arg(&png)
        .assert()
        .failure()
        .stderr(predicate::str::contains("page 2 failed to render"));

    assert!(!png.exists());
}

#[test]
fn inspect_rejects_invalid_scale() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write(temp.path(), "two.pdf", &two_page_letter());

    cargo_bin_cmd!("slipview")
        .arg("inspect")
        .arg(&pdf)
        .arg("--scale")
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid scale"));
}

#[test]
fn inspect_rejects_invalid_config() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write(temp.path(), "two.pdf", &two_page_letter());
    let config = write(temp.path(), "viewer.toml", b"max_concurrent_renders = 0\n");

    cargo_bin_cmd!("slipview")
        .arg("inspect")
        .arg(&pdf)
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value for max_concurrent_renders"));
}

#[test]
fn info_fails_for_missing_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");

    cargo_bin_cmd!("slipview")
        .arg("info")
        .arg(temp.path().join("missing.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn info_fails_for_invalid_pdf() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write(temp.path(), "invalid.pdf", b"this is not a pdf");

    cargo_bin_cmd!("slipview")
        .arg("info")
        .arg(&pdf)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open PDF"));
}

#[test]
fn info_fails_for_encrypted_pdf() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write(temp.path(), "encrypted.pdf", &build_pdf(&[letter_page()], true));

    cargo_bin_cmd!("slipview")
        .arg("info")
        .arg(&pdf)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported document"));
}

#[test]
fn version_prints_package_version() {
    cargo_bin_cmd!("slipview")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
