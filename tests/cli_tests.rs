//! Integration tests for the rpcwatch binary
#![allow(deprecated)] // suppress assert_cmd::Command::cargo_bin deprecation in tests

use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const BASE_MS: u64 = 1_592_841_600_000;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    /// a → b → c over three minutes; a → b is slow throughout
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut log = String::new();
        for minute in 0..3u64 {
            let ts = BASE_MS + minute * 60_000;
            log.push_str(&format!("a,10.0.0.1,b,10.0.0.2,true,150,{}\n", ts));
            log.push_str(&format!("b,10.0.0.2,c,10.0.0.3,{},20,{}\n", minute != 1, ts + 1));
        }
        fs::write(dir.path().join("calls.log"), log).unwrap();
        fs::write(dir.path().join("rules.txt"), "1,a,b,P99,2>,100ms\n").unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("rpcwatch");
        cmd.arg("--input")
            .arg(self.path("calls.log"))
            .arg("--rules")
            .arg(self.path("rules.txt"));
        cmd
    }
}

#[test]
fn test_text_output_alerts_then_queries() {
    let fixture = Fixture::new();
    fixture
        .cmd()
        .arg("--query")
        .arg("a,b,2020-06-23 00:01,P99")
        .arg("-q")
        .arg("a,b,2020-06-23 00:01,SR")
        .assert()
        .success()
        .stdout(predicate::eq(
            "1,2020-06-23 00:01,a,10.0.0.1,b,10.0.0.2,150ms\n\
             1,2020-06-23 00:02,a,10.0.0.1,b,10.0.0.2,150ms\n\
             # a,b,2020-06-23 00:01,P99\n\
             a->b->c|150ms,20ms\n\
             # a,b,2020-06-23 00:01,SR\n\
             a->b->c|100.00%,0.00%\n",
        ));
}

#[test]
fn test_unknown_query_prints_header_only() {
    let fixture = Fixture::new();
    fixture
        .cmd()
        .arg("-q")
        .arg("a,b,2031-01-01 00:00,P99")
        .assert()
        .success()
        .stdout(predicate::str::ends_with("# a,b,2031-01-01 00:00,P99\n"));
}

#[test]
fn test_json_output() {
    let fixture = Fixture::new();
    let output = fixture
        .cmd()
        .arg("--format")
        .arg("json")
        .arg("-q")
        .arg("a,b,2020-06-23 00:02,P99")
        .output()
        .unwrap();
    assert!(output.status.success());

    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed["alerts"].as_array().unwrap().len(), 2);
    let query = &parsed["queries"][0];
    assert_eq!(query["caller"], "a");
    assert_eq!(query["metric"], "P99");
    assert_eq!(query["paths"][0], "a->b->c|150ms,20ms");
}

#[test]
fn test_queries_file() {
    let fixture = Fixture::new();
    fs::write(
        fixture.path("queries.txt"),
        "a,b,2020-06-23 00:00,SR\n\nb,c,2020-06-23 00:00,P99\n",
    )
    .unwrap();
    fixture
        .cmd()
        .arg("--all-edges")
        .arg("--queries")
        .arg(fixture.path("queries.txt"))
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "# a,b,2020-06-23 00:00,SR\na->b->c|100.00%,100.00%\n",
        ))
        .stdout(predicate::str::contains(
            "# b,c,2020-06-23 00:00,P99\na->b->c|150ms,20ms\n",
        ));
}

#[test]
fn test_malformed_queries_file_line() {
    let fixture = Fixture::new();
    fs::write(fixture.path("queries.txt"), "a,b,P99\n").unwrap();
    fixture
        .cmd()
        .arg("--queries")
        .arg(fixture.path("queries.txt"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("queries.txt:1"));
}

#[test]
fn test_config_file_and_override() {
    let fixture = Fixture::new();
    fs::write(
        fixture.path("rpcwatch.toml"),
        "block_size = 64\nutc_offset_minutes = 0\n",
    )
    .unwrap();
    fixture
        .cmd()
        .arg("--config")
        .arg(fixture.path("rpcwatch.toml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("1,2020-06-22 16:01,a,"));

    fixture
        .cmd()
        .arg("--config")
        .arg(fixture.path("rpcwatch.toml"))
        .arg("--utc-offset")
        .arg("60")
        .assert()
        .success()
        .stdout(predicate::str::contains("1,2020-06-22 17:01,a,"));
}

#[test]
fn test_bad_rule_fails() {
    let fixture = Fixture::new();
    fs::write(fixture.path("rules.txt"), "1,a,b,P99,2>,100ms\n2,a,b,P50,1>,1ms\n").unwrap();
    fixture
        .cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 2"));
}

#[test]
fn test_missing_input_fails() {
    let fixture = Fixture::new();
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("rpcwatch");
    cmd.arg("--input")
        .arg(fixture.path("missing.log"))
        .arg("--rules")
        .arg(fixture.path("rules.txt"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to analyze"));
}

#[test]
fn test_invalid_block_size_fails() {
    let fixture = Fixture::new();
    fixture
        .cmd()
        .arg("--block-size")
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"));
}

#[test]
fn test_help_lists_options() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("rpcwatch");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--input"))
        .stdout(predicate::str::contains("--query"))
        .stdout(predicate::str::contains("--format"));
}
