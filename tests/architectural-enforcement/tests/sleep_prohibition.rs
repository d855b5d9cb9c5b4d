//! Integration Test: Sleep Prohibition
//!
//! **Policy**: No code in the workspace sleeps, tests included. Run polling
//! waits on `tokio::time::interval`; tests drive time with
//! `#[tokio::test(start_paused = true)]` or wait on the event they expect.

use architectural_enforcement::{
    assert_no_violations, code_part, rust_files, Violation, PRODUCTION_DIRS, TEST_DIRS,
};

fn is_sleep_call(code: &str) -> bool {
    code.contains("::sleep(") || code.contains(".sleep(") || code.contains("sleep_until(")
}

fn find_sleep_violations(dirs: &[&str]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for dir in dirs {
        for file in rust_files(dir) {
            for (idx, line) in file.lines().iter().enumerate() {
                if is_sleep_call(code_part(line)) {
                    violations.push(Violation {
                        path: file.path.clone(),
                        line: idx + 1,
                        reason: "Sleep call",
                        text: (*line).to_string(),
                    });
                }
            }
        }
    }
    violations
}

#[test]
fn test_no_sleep_in_workspace() {
    let dirs: Vec<&str> = PRODUCTION_DIRS.iter().chain(TEST_DIRS).copied().collect();
    let violations = find_sleep_violations(&dirs);

    assert_no_violations(
        "Sleep calls found",
        &violations,
        &[
            "✅ Periodic waits: tokio::time::interval + tick()",
            "✅ Bounded waits: tokio::time::timeout around the awaited future",
            "✅ Tests: #[tokio::test(start_paused = true)] or await the expected event",
            "❌ Sleep in polling loops or as synchronization",
        ],
    );
}

#[test]
fn test_scanner_sees_the_sources() {
    for dir in PRODUCTION_DIRS {
        assert!(
            !rust_files(dir).is_empty(),
            "no Rust files found under {dir}; the scan would be vacuous"
        );
    }
}

#[test]
fn test_sleep_detection() {
    assert!(is_sleep_call("    tokio::time::sleep(Duration::from_millis(10)).await;"));
    assert!(is_sleep_call("std::thread::sleep(d);"));
    assert!(is_sleep_call("time::sleep_until(deadline).await;"));
    assert!(!is_sleep_call("interval.tick().await;"));
}
