//! Tests for the suspect log and scanners

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use tempfile::TempDir;

use crate::error::FleetError;
use crate::services::suspect_log::{MockSuspectScanner, PatternScanner, SuspectLog, SuspectScanner};

fn append(path: &Path, text: &str) {
    let mut file = OpenOptions::new().create(true).append(true).open(path).unwrap();
    file.write_all(text.as_bytes()).unwrap();
}

#[test]
fn test_pattern_scanner_flags_errors_and_panics() {
    let scanner = PatternScanner::new();
    let content = "\
2026-01-01T00:00:00Z  INFO vm0: started
2026-01-01T00:00:01Z ERROR vm1: lost connection
thread 'main' panicked at src/lib.rs:10:5
2026-01-01T00:00:02Z  WARN vm2: slow ping
";

    let suspects = scanner.scan(content);
    assert_eq!(suspects.len(), 2);
    assert!(suspects[0].contains("lost connection"));
    assert!(suspects[1].contains("panicked at"));
}

#[test]
fn test_pattern_scanner_ignore_and_extra_patterns() {
    let scanner = PatternScanner::new()
        .ignore("expected failure")
        .unwrap()
        .suspect("Stale data")
        .unwrap();
    let content = "ERROR expected failure in test\nStale data detected\nERROR real problem\n";

    assert_eq!(scanner.scan(content), vec!["Stale data detected", "ERROR real problem"]);
}

#[test]
fn test_pattern_scanner_rejects_bad_regex() {
    let result = PatternScanner::new().ignore("(unclosed");
    assert!(matches!(result, Err(FleetError::ConfigurationError { .. })));
}

#[test]
fn test_read_new_advances_cursor() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("suspect.log");
    let mut log = SuspectLog::new(&path);

    append(&path, "first\n");
    assert_eq!(log.read_new().unwrap(), "first\n");
    assert_eq!(log.cursor(), 6);

    append(&path, "second\n");
    assert_eq!(log.read_new().unwrap(), "second\n");
    assert_eq!(log.read_new().unwrap(), "");
}

#[test]
fn test_missing_file_reads_as_empty() {
    let dir = TempDir::new().unwrap();
    let mut log = SuspectLog::new(dir.path().join("never-written.log"));

    assert_eq!(log.read_new().unwrap(), "");
    assert!(log.close_and_check_for_suspects(&PatternScanner::new()).is_ok());
}

#[test]
fn test_check_reports_and_truncates() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("suspect.log");
    let mut log = SuspectLog::new(&path);

    append(&path, "INFO fine\nERROR broken\n");
    let result = log.close_and_check_for_suspects(&PatternScanner::new());
    match result {
        Err(FleetError::SuspectStrings { report }) => assert_eq!(report, "ERROR broken"),
        other => panic!("expected suspect strings, got {other:?}"),
    }

    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    assert_eq!(log.cursor(), 0);

    // The next run starts from a clean file
    append(&path, "INFO fine again\n");
    assert!(log.close_and_check_for_suspects(&PatternScanner::new()).is_ok());
}

#[test]
fn test_shrunk_file_resets_cursor() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("suspect.log");
    let mut log = SuspectLog::new(&path);

    append(&path, "a fairly long first line\n");
    log.read_new().unwrap();

    std::fs::write(&path, "short\n").unwrap();
    assert_eq!(log.read_new().unwrap(), "short\n");
}

#[test]
fn test_check_uses_given_scanner() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("suspect.log");
    let mut log = SuspectLog::new(&path);
    append(&path, "anything\n");

    let mut scanner = MockSuspectScanner::new();
    scanner
        .expect_scan()
        .withf(|content| content.starts_with("anything"))
        .times(1)
        .returning(|_| vec!["anything".to_string()]);

    let result = log.close_and_check_for_suspects(&scanner);
    assert!(matches!(result, Err(FleetError::SuspectStrings { .. })));
}
