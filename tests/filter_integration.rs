use std::io::Write;
use std::process::Command;

const FIXTURE: &str = r#"
sets:
  _:
    nodes:
      - { id: 1, index: 7, tags: [[amenity, cafe], [name, Corner]] }
      - { id: 2, index: 7 }
      - { id: 3, index: 8, tags: [[amenity, "12"]] }
    attic_ways:
      - { id: 10, index: 3, timestamp: 1500000000, tags: [[highway, path], [lanes, "1"]] }
    deriveds:
      - { id: 1, index: 0, type: count, tags: [[total, "3"]] }
  roads:
    ways:
      - { id: 20, index: 1, tags: [[highway, primary], [lanes, "4"]] }
      - { id: 21, index: 1, tags: [[highway, residential], [lanes, "2"]] }
      - { id: 22, index: 2, tags: [[highway, track]] }
"#;

fn write_fixture(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::with_suffix(".yaml").unwrap();
    file.write_all(contents.as_bytes()).expect("write fixture yaml");
    file
}

fn run_tagsieve(args: &[&str]) -> Vec<serde_json::Value> {
    let fixture = write_fixture(FIXTURE);
    let exe = env!("CARGO_BIN_EXE_tagsieve");

    let output = Command::new(exe)
        .arg("--input")
        .arg(fixture.path())
        .args(args)
        .output()
        .expect("run tagsieve");

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!("tagsieve failed: {}", stderr);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("valid json line"))
        .collect()
}

fn run_tagsieve_expect_failure(args: &[&str]) -> String {
    let fixture = write_fixture(FIXTURE);
    let exe = env!("CARGO_BIN_EXE_tagsieve");

    let output = Command::new(exe)
        .arg("--input")
        .arg(fixture.path())
        .args(args)
        .output()
        .expect("run tagsieve");

    assert!(!output.status.success(), "expected failure");
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn ids(rows: &[serde_json::Value]) -> Vec<(String, u64)> {
    rows.iter()
        .map(|row| {
            (
                row["type"].as_str().unwrap().to_string(),
                row["id"].as_u64().unwrap(),
            )
        })
        .collect()
}

#[test]
fn non_numeric_tag_test_drops_everything() {
    let rows = run_tagsieve(&["--filter", r#"is_number(t["amenity"]) && t["amenity"] == "cafe""#]);
    assert!(rows.is_empty());
}

#[test]
fn negated_numeric_test_keeps_untagged_elements() {
    let rows = run_tagsieve(&["--filter", r#"!is_number(t["amenity"])"#]);
    assert_eq!(
        ids(&rows),
        vec![
            ("node".to_string(), 1),
            ("node".to_string(), 2),
            ("way".to_string(), 10),
            ("count".to_string(), 1),
        ]
    );
}

#[test]
fn rows_carry_tags_index_and_timestamp() {
    let rows = run_tagsieve(&["--filter", r#"t["highway"] == "path""#]);
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row["type"], "way");
    assert_eq!(row["index"], 3);
    assert_eq!(row["timestamp"], "2017-07-14T02:40:00Z");
    assert_eq!(
        row["tags"],
        serde_json::json!([["highway", "path"], ["lanes", "1"]])
    );
}

#[test]
fn statement_form_reads_and_writes_named_sets() {
    let rows = run_tagsieve(&["--filter", r#".roads(if: t["lanes"] >= 2)->.wide"#]);
    assert_eq!(
        ids(&rows),
        vec![("way".to_string(), 20), ("way".to_string(), 21)]
    );
}

#[test]
fn referenced_set_aggregates_feed_the_filter() {
    let rows = run_tagsieve(&[
        "--filter",
        r#"type() == "node" && roads.count(ways) == 3 && roads.max(t["lanes"]) == 4"#,
    ]);
    assert_eq!(ids(&rows).len(), 3);
}

#[test]
fn command_line_sets_override_statement() {
    let rows = run_tagsieve(&[
        "--filter",
        r#"is_tag("lanes")"#,
        "--from",
        "roads",
        "--all-tags",
        "--output",
        "-",
    ]);
    assert_eq!(rows.len(), 2);
}

#[test]
fn surplus_argument_runs_with_first_argument() {
    let rows = run_tagsieve(&["--filter", r#"is_number(t["lanes"], 1)"#, "--from", "roads"]);
    assert_eq!(
        ids(&rows),
        vec![("way".to_string(), 20), ("way".to_string(), 21)]
    );
}

#[test]
fn strict_mode_rejects_surplus_argument() {
    let stderr = run_tagsieve_expect_failure(&[
        "--filter",
        r#"number(t["a"], 2)"#,
        "--strict",
    ]);
    assert!(stderr.contains("Filter has static errors"));
    assert!(stderr.contains("eval-number must have exactly 1 evaluator"));
}

#[test]
fn unquoted_numeric_tag_value_is_rejected() {
    let fixture = write_fixture("sets:\n  _:\n    nodes:\n      - { id: 1, tags: [[ref, 007]] }\n");
    let output = Command::new(env!("CARGO_BIN_EXE_tagsieve"))
        .arg("--input")
        .arg(fixture.path())
        .arg("--filter")
        .arg("1")
        .output()
        .expect("run tagsieve");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Config: Invalid fixture"));
}

#[test]
fn writes_to_output_file() {
    let output_file = tempfile::NamedTempFile::with_suffix(".jsonl").unwrap();
    let output_path = output_file.path().to_str().unwrap();

    let rows = run_tagsieve(&["--filter", "id() == 1", "--output", output_path, "--verbose"]);
    assert!(rows.is_empty());

    let content = std::fs::read_to_string(output_path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
}

#[test]
fn invalid_filter_fails() {
    let stderr = run_tagsieve_expect_failure(&["--filter", "t[amenity]"]);
    assert!(stderr.contains("Failed to parse filter"));
}

#[test]
fn missing_fixture_fails() {
    let output = Command::new(env!("CARGO_BIN_EXE_tagsieve"))
        .arg("--input")
        .arg("does/not/exist.yaml")
        .arg("--filter")
        .arg("1")
        .output()
        .expect("run tagsieve");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Config: Failed to read fixture"));
}
