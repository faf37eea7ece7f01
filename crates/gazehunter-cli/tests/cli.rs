use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn write(path: &Path, bytes: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, bytes).unwrap();
}

fn fixture(dir: &Path) {
    write(&dir.join("apps/VrGame/lib/arm64-v8a/libovr.so"), b"\x00\x01GazeProvider\x00\x00EyeTracked\x00\x7f");
    write(&dir.join("apps/plainApp/lib/arm64-v8a/libplain.so"), b"\x00\x00isEyeTracked\x00");
    write(&dir.join("terms.txt"), b"# eye tracking\nGazeProvider\nEyeTracked\n\n");
}

fn gazehunter() -> Command {
    Command::cargo_bin("gazehunter").unwrap()
}

#[test]
fn run_writes_all_reports() {
    let dir = tempfile::tempdir().unwrap();
    fixture(dir.path());
    let out = dir.path().join("out");

    gazehunter()
        .arg("run")
        .arg("--input")
        .arg(dir.path().join("apps"))
        .arg("--output")
        .arg(&out)
        .arg("--terms")
        .arg(dir.path().join("terms.txt"))
        .args(["--threads", "2", "--no-timestamp"])
        .assert()
        .success();

    let master = std::fs::read_to_string(out.join("master-results.txt")).unwrap();
    assert!(master.contains("===== APP: plainApp ====="));
    assert!(master.contains("===== APP: VrGame ====="));
    assert!(master.find("plainApp").unwrap() < master.find("VrGame").unwrap());
    assert!(master.contains("    TERM: GazeProvider (confidence=high)\n"));

    let enablement = std::fs::read_to_string(out.join("enablement_only_apps.txt")).unwrap();
    assert_eq!(enablement, "plainApp\n");

    for rel in [
        "scan_summary.csv",
        "exports/app_functionality_long.csv",
        "exports/app_functionality.csv",
        "exports/app_functionality.txt",
        "VrGame/matches.json",
        "VrGame/scan_matches.json",
        "VrGame/normalize_meta.json",
        "VrGame/normalized/ascii/lib__arm64-v8a__libovr.so.txt",
    ] {
        assert!(out.join(rel).is_file(), "missing {rel}");
    }

    let meta = std::fs::read_to_string(out.join("VrGame/scan_matches.json")).unwrap();
    assert!(!meta.contains("timestamp_utc"));
}

#[test]
fn stages_can_run_separately() {
    let dir = tempfile::tempdir().unwrap();
    fixture(dir.path());
    let out = dir.path().join("out");
    let apps = dir.path().join("apps");
    let terms = dir.path().join("terms.txt");

    gazehunter().arg("normalize").arg("--input").arg(&apps).arg("--output").arg(&out).assert().success();
    assert!(out.join("plainApp/normalized/ascii/lib__arm64-v8a__libplain.so.txt").is_file());
    assert!(!out.join("master-results.txt").exists());

    gazehunter()
        .arg("search")
        .arg("--input")
        .arg(&apps)
        .arg("--output")
        .arg(&out)
        .arg("--terms")
        .arg(&terms)
        .assert()
        .success();
    let raw = std::fs::read_to_string(out.join("VrGame/matches.json")).unwrap();
    assert!(raw.contains("\"offset_hex\""));

    gazehunter()
        .arg("categorize")
        .arg("--output")
        .arg(&out)
        .arg("--terms")
        .arg(&terms)
        .assert()
        .success();
    let csv = std::fs::read_to_string(out.join("scan_summary.csv")).unwrap();
    assert!(csv.starts_with("app,artifact,category,category_confidence,term,example_count\n"));
    assert!(csv.contains("VrGame,lib__arm64-v8a__libovr.so.txt,Raw Data Collection,high,GazeProvider,1"));
}

#[test]
fn custom_rules_file_is_used() {
    let dir = tempfile::tempdir().unwrap();
    fixture(dir.path());
    write(
        &dir.path().join("rules.toml"),
        b"baseline = \"Enablement\"\n\n[[rules]]\ncategory = \"Provider APIs\"\ncontains = [\"provider\"]\n",
    );
    let out = dir.path().join("out");

    gazehunter()
        .arg("run")
        .arg("--input")
        .arg(dir.path().join("apps"))
        .arg("--output")
        .arg(&out)
        .arg("--terms")
        .arg(dir.path().join("terms.txt"))
        .arg("--rules")
        .arg(dir.path().join("rules.toml"))
        .assert()
        .success();

    let master = std::fs::read_to_string(out.join("master-results.txt")).unwrap();
    assert!(master.contains("  [CATEGORY] Provider APIs\n"));
    assert!(master.contains("  [CATEGORY] Unclassified\n"));
}

#[test]
fn missing_input_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");

    gazehunter()
        .arg("run")
        .arg("--input")
        .arg(dir.path().join("nope"))
        .arg("--output")
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope"));
    assert!(!out.exists());
}

#[test]
fn missing_terms_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    fixture(dir.path());
    let out = dir.path().join("out");

    gazehunter()
        .arg("run")
        .arg("--input")
        .arg(dir.path().join("apps"))
        .arg("--output")
        .arg(&out)
        .arg("--terms")
        .arg(dir.path().join("missing_terms.txt"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing_terms.txt"));
    assert!(!out.exists());
}
