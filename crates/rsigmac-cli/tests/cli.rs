//! Integration tests for the `rsigmac` binary.
//!
//! Each test launches the binary via `assert_cmd`, writes any required
//! fixture files to a temp directory, and asserts on exit code + output.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[allow(deprecated)]
fn rsigmac() -> Command {
    Command::cargo_bin("rsigmac").expect("binary not found")
}

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const MEDIUM_RULE: &str = r#"
title: Whoami Execution
status: stable
logsource:
    category: process_creation
    product: windows
detection:
    selection:
        Image|endswith: '\whoami.exe'
    condition: selection
level: medium
"#;

const HIGH_RULE: &str = r#"
title: Mimikatz Keywords
status: experimental
logsource:
    product: windows
detection:
    keywords:
        - sekurlsa
    condition: keywords
level: high
"#;

const NOT_A_RULE: &str = "title: Missing Everything\n";

const AGGREGATION_RULE: &str = r#"
title: Many Failures
logsource:
    product: windows
detection:
    selection:
        EventID: 4625
    condition: selection | count() by User > 5
level: low
"#;

// ---------------------------------------------------------------------------
// Basic conversion
// ---------------------------------------------------------------------------

#[test]
fn single_rule_converts_to_one_line() {
    let dir = TempDir::new().unwrap();
    let rule = write(dir.path(), "whoami.yml", MEDIUM_RULE);
    rsigmac()
        .arg(&rule)
        .assert()
        .success()
        .stdout(r"Image:*\\whoami.exe".to_string() + "\n");
}

#[test]
fn no_inputs_prints_usage() {
    rsigmac()
        .assert()
        .success()
        .stdout("")
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn target_list_bypasses_everything() {
    rsigmac()
        .args(["--target-list", "-f", "bogus", "-t", "nope", "missing.yml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("es-qs : Elasticsearch query string"))
        .stdout(predicate::str::contains("splunk"))
        .stdout(predicate::str::contains("fieldlist"));
}

#[test]
fn output_file_receives_results() {
    let dir = TempDir::new().unwrap();
    let rule = write(dir.path(), "r.yml", HIGH_RULE);
    let out = dir.path().join("out.txt");
    rsigmac()
        .arg("-o")
        .arg(&out)
        .args(["-t", "splunk"])
        .arg(&rule)
        .assert()
        .success()
        .stdout("");
    assert_eq!(fs::read_to_string(&out).unwrap(), "\"sekurlsa\"\n");
}

#[test]
fn output_open_failure_exits_1() {
    let dir = TempDir::new().unwrap();
    let rule = write(dir.path(), "r.yml", HIGH_RULE);
    rsigmac()
        .arg("-o")
        .arg(dir.path().join("no/such/dir/out.txt"))
        .arg(&rule)
        .assert()
        .code(1);
}

// ---------------------------------------------------------------------------
// Filters and targets
// ---------------------------------------------------------------------------

#[test]
fn level_filter_rejects_medium_rule() {
    let dir = TempDir::new().unwrap();
    let rule = write(dir.path(), "whoami.yml", MEDIUM_RULE);
    rsigmac()
        .args(["-f", "level>=high"])
        .arg(&rule)
        .assert()
        .success()
        .stdout("");
}

#[test]
fn status_and_logsource_filters() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.yml", MEDIUM_RULE);
    write(dir.path(), "b.yml", HIGH_RULE);
    rsigmac()
        .args(["-r", "-f", "status=stable, logsource=process_creation"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(r"Image:*\\whoami.exe".to_string() + "\n");
}

#[test]
fn logsource_filter_matches_part_of_a_value() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.yml", MEDIUM_RULE);
    write(dir.path(), "b.yml", HIGH_RULE);
    rsigmac()
        .args(["-r", "-f", "logsource=process"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(r"Image:*\\whoami.exe".to_string() + "\n");
}

#[test]
fn invalid_filter_exits_9_before_reading_inputs() {
    rsigmac()
        .args(["-f", "level>=urgent", "does-not-exist.yml"])
        .assert()
        .code(9)
        .stderr(predicate::str::contains("filter"));
}

#[test]
fn unknown_target_exits_10() {
    rsigmac()
        .args(["-t", "qradar", "does-not-exist.yml"])
        .assert()
        .code(10)
        .stderr(predicate::str::contains("qradar"));
}

#[test]
fn es_dsl_prints_array_at_the_end() {
    let dir = TempDir::new().unwrap();
    let a = write(dir.path(), "a.yml", MEDIUM_RULE);
    let b = write(dir.path(), "b.yml", HIGH_RULE);
    let output = rsigmac()
        .args(["-t", "es-dsl"])
        .arg(&a)
        .arg(&b)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.lines().count(), 1);
    assert!(stdout.starts_with('[') && stdout.trim_end().ends_with(']'));
    assert!(stdout.contains("Whoami Execution"));
    assert!(stdout.contains("Mimikatz Keywords"));
}

#[test]
fn fieldlist_collects_fields() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.yml", MEDIUM_RULE);
    write(dir.path(), "b.yml", AGGREGATION_RULE);
    rsigmac()
        .args(["-r", "-t", "fieldlist"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout("EventID\nImage\nUser\n");
}

// ---------------------------------------------------------------------------
// Configuration and backend options
// ---------------------------------------------------------------------------

#[test]
fn chained_configs_map_fields() {
    let dir = TempDir::new().unwrap();
    let rule = write(dir.path(), "r.yml", MEDIUM_RULE);
    let base = write(dir.path(), "base.yml", "fieldmappings:\n  Image: process.executable\n");
    let ecs = write(
        dir.path(),
        "ecs.yml",
        "logsources:\n  windows:\n    product: windows\n    index: winlogbeat-*\n",
    );
    rsigmac()
        .args(["-t", "splunk", "-c"])
        .arg(&base)
        .arg("-c")
        .arg(&ecs)
        .arg(&rule)
        .assert()
        .success()
        .stdout("index=\"winlogbeat-*\" process.executable=\"*\\\\whoami.exe\"\n");
}

#[test]
fn config_errors_map_to_exit_codes() {
    let dir = TempDir::new().unwrap();
    let rule = write(dir.path(), "r.yml", MEDIUM_RULE);
    let broken = write(dir.path(), "broken.yml", "fieldmappings: [unclosed\n");
    let invalid = write(dir.path(), "invalid.yml", "order: soon\n");
    let wrong_target = write(dir.path(), "splunk-only.yml", "backends: [splunk]\n");

    rsigmac()
        .arg("-c")
        .arg(dir.path().join("missing.yml"))
        .arg(&rule)
        .assert()
        .code(5);
    rsigmac().arg("-c").arg(&broken).arg(&rule).assert().code(6);
    rsigmac().arg("-c").arg(&invalid).arg(&rule).assert().code(7);
    rsigmac()
        .arg("-c")
        .arg(&wrong_target)
        .arg(&rule)
        .assert()
        .code(7)
        .stdout("");
}

#[test]
fn backend_options_override_backend_config() {
    let dir = TempDir::new().unwrap();
    let rule = write(dir.path(), "r.yml", MEDIUM_RULE);
    let opts = write(dir.path(), "opts.yml", "table: from_file\n");
    rsigmac()
        .args(["-t", "sql", "--backend-config"])
        .arg(&opts)
        .arg(&rule)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("SELECT * FROM from_file WHERE"));
    rsigmac()
        .args(["-t", "sql", "-O", "table=events", "--backend-config"])
        .arg(&opts)
        .arg(&rule)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("SELECT * FROM events WHERE"));
}

#[test]
fn backend_construction_failure_exits_8() {
    let dir = TempDir::new().unwrap();
    let rule = write(dir.path(), "r.yml", MEDIUM_RULE);
    rsigmac()
        .args(["-t", "sql", "-O", "table="])
        .arg(&rule)
        .assert()
        .code(8);
}

// ---------------------------------------------------------------------------
// Failure policy
// ---------------------------------------------------------------------------

#[test]
fn parse_error_stops_the_run() {
    let dir = TempDir::new().unwrap();
    let bad = write(dir.path(), "a_bad.yml", NOT_A_RULE);
    let good = write(dir.path(), "b_good.yml", MEDIUM_RULE);
    rsigmac()
        .arg(&bad)
        .arg(&good)
        .assert()
        .code(4)
        .stdout("")
        .stderr(predicate::str::contains("a_bad.yml"));
}

#[test]
fn defer_abort_continues_and_keeps_last_code() {
    let dir = TempDir::new().unwrap();
    let bad_yaml = write(dir.path(), "a.yml", "title: [unclosed\n");
    let good = write(dir.path(), "b.yml", MEDIUM_RULE);
    let bad_rule = write(dir.path(), "c.yml", NOT_A_RULE);
    rsigmac()
        .arg("-d")
        .arg(&bad_yaml)
        .arg(&good)
        .arg(&bad_rule)
        .assert()
        .code(4)
        .stdout(r"Image:*\\whoami.exe".to_string() + "\n");
}

#[test]
fn missing_input_exits_5() {
    rsigmac()
        .arg("definitely-missing.yml")
        .assert()
        .code(5)
        .stderr(predicate::str::contains("definitely-missing.yml"));
}

#[test]
fn backend_errors_escalate_or_are_ignored() {
    let dir = TempDir::new().unwrap();
    let agg = write(dir.path(), "a.yml", AGGREGATION_RULE);
    let good = write(dir.path(), "b.yml", MEDIUM_RULE);

    rsigmac().arg(&agg).arg(&good).assert().code(42).stdout("");

    rsigmac()
        .arg("-I")
        .arg(&agg)
        .arg(&good)
        .assert()
        .success()
        .stdout(r"Image:*\\whoami.exe".to_string() + "\n");
}

#[test]
fn sql_full_text_limits() {
    let dir = TempDir::new().unwrap();
    let two_keywords = write(
        dir.path(),
        "r.yml",
        "title: Two\nlogsource: {product: windows}\ndetection:\n  keywords: [a, b]\n  condition: keywords\n",
    );
    rsigmac()
        .args(["-t", "sql"])
        .arg(&two_keywords)
        .assert()
        .code(90);
}

#[test]
fn empty_encoded_value_exits_8_without_output() {
    let dir = TempDir::new().unwrap();
    let rule = write(
        dir.path(),
        "r.yml",
        "title: Empty\nlogsource: {product: windows}\ndetection:\n  sel:\n    CommandLine|base64offset|contains: ''\n  condition: sel\n",
    );
    for target in ["es-qs", "splunk", "sql", "grep"] {
        rsigmac()
            .args(["-t", target])
            .arg(&rule)
            .assert()
            .code(8)
            .stdout("");
    }
}

// ---------------------------------------------------------------------------
// Input discovery
// ---------------------------------------------------------------------------

#[test]
fn recursion_skips_hidden_entries() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "rules/whoami.yml", MEDIUM_RULE);
    write(dir.path(), "rules/.draft.yml", NOT_A_RULE);
    write(dir.path(), "rules/.git/broken.yml", NOT_A_RULE);
    rsigmac()
        .arg("--recurse")
        .arg(dir.path().join("rules"))
        .assert()
        .success()
        .stdout(r"Image:*\\whoami.exe".to_string() + "\n");
}

#[test]
fn directory_without_recursion_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "rules/whoami.yml", MEDIUM_RULE);
    rsigmac().arg(dir.path().join("rules")).assert().code(5);
}

#[test]
fn empty_directory_still_finalizes() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("empty")).unwrap();
    rsigmac()
        .args(["-r", "-t", "es-dsl"])
        .arg(dir.path().join("empty"))
        .assert()
        .success()
        .stdout("");
}

// ---------------------------------------------------------------------------
// Misc
// ---------------------------------------------------------------------------

#[test]
fn version_flag() {
    rsigmac()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rsigmac"));
}

#[test]
fn verbose_logs_progress() {
    let dir = TempDir::new().unwrap();
    let rule = write(dir.path(), "r.yml", MEDIUM_RULE);
    rsigmac()
        .arg("-v")
        .arg(&rule)
        .env_remove("RUST_LOG")
        .assert()
        .success()
        .stderr(predicate::str::contains("Processing"));
}
