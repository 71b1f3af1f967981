//! Integration tests for the replay binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn script(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const PARENT_CHILD: &str = r#"
{"event":"transition","task":1,"prev":1,"new":2,"token":0,"thread":100}
{"event":"transition","task":2,"prev":0,"new":1,"token":7,"thread":100}
{"event":"transition","task":2,"prev":1,"new":2,"token":7,"thread":101}
{"event":"begin","key":10,"thread":100,"fields":{"http.method":"GET"}}
{"event":"begin","key":20,"thread":101}
{"event":"end","key":20}
{"event":"end","key":10}
"#;

#[test]
fn test_text_output_shows_lineage_and_spans() {
    let file = script(PARENT_CHILD);
    Command::cargo_bin("linaje")
        .unwrap()
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("edge      child=2 parent=1"))
        .stdout(predicate::str::contains("binding   thread=101 task=2"))
        .stdout(predicate::str::contains("completed key=20"))
        .stdout(predicate::str::contains("completed key=10"));
}

#[test]
fn test_json_output_is_parseable_lines() {
    let file = script(PARENT_CHILD);
    let output = Command::cargo_bin("linaje")
        .unwrap()
        .arg(file.path())
        .args(["--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let values: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert!(!values.is_empty());

    // Both completed spans appear, child before parent, sharing a trace.
    let spans: Vec<_> = values
        .iter()
        .filter(|v| v.get("instance_key").is_some())
        .collect();
    assert_eq!(spans.len(), 2);
    assert_eq!(spans[0]["instance_key"], 20);
    assert_eq!(spans[1]["instance_key"], 10);
    assert_eq!(
        spans[0]["context"]["trace_id"],
        spans[1]["context"]["trace_id"]
    );
    assert_eq!(spans[1]["is_root"], true);
    assert_eq!(spans[1]["fields"]["http.method"], "GET");
}

#[test]
fn test_stats_flag_reports_counters() {
    let file = script(PARENT_CHILD);
    Command::cargo_bin("linaje")
        .unwrap()
        .arg(file.path())
        .arg("--stats")
        .assert()
        .success()
        .stderr(predicate::str::contains("events: 7"))
        .stderr(predicate::str::contains("spans: 2"));
}

#[test]
fn test_malformed_script_fails_with_line_number() {
    let file = script("{\"event\":\"transition\"}\n");
    Command::cargo_bin("linaje")
        .unwrap()
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 1"));
}

#[test]
fn test_missing_script_file_fails() {
    Command::cargo_bin("linaje")
        .unwrap()
        .arg("/nonexistent/trace.jsonl")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open script"));
}
