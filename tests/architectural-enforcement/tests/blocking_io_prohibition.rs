//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async production code MUST NOT use blocking I/O.
//! **Required**: `tokio::fs`, `tokio::net`, `tokio::io`, async `reqwest`.
//!
//! Blocking calls in plain `fn`s are fine (config loading runs before any
//! turn does), and test code is not checked.

use architectural_enforcement::{
    assert_no_violations, code_part, enclosing_fn, is_test_code, rust_files, FnKind, Violation,
    PRODUCTION_DIRS,
};

/// Blocking pattern and its reason
const BLOCKING: &[(&str, &str)] = &[
    ("std::fs::", "Blocking file I/O"),
    ("use std::fs", "Blocking file I/O"),
    ("std::net::TcpStream", "Blocking network I/O"),
    ("std::net::TcpListener", "Blocking network I/O"),
    ("std::net::UdpSocket", "Blocking network I/O"),
    ("std::process::Command", "Blocking process I/O"),
    ("reqwest::blocking", "Blocking HTTP client"),
    ("std::io::stdin()", "Blocking stdin"),
    ("std::io::stdout()", "Blocking stdout"),
    ("std::io::stderr()", "Blocking stderr"),
];

fn blocking_reason(lines: &[&str], idx: usize) -> Option<&'static str> {
    let code = code_part(lines[idx]);
    let (_, reason) = BLOCKING.iter().find(|(pattern, _)| code.contains(pattern))?;

    if is_test_code(lines, idx) {
        return None;
    }
    match enclosing_fn(lines, idx) {
        Some((_, FnKind::Sync)) => None,
        _ => Some(reason),
    }
}

#[test]
fn test_no_blocking_io_in_production_code() {
    let mut violations = Vec::new();
    for dir in PRODUCTION_DIRS {
        for file in rust_files(dir) {
            let lines = file.lines();
            for idx in 0..lines.len() {
                if let Some(reason) = blocking_reason(&lines, idx) {
                    violations.push(Violation {
                        path: file.path.clone(),
                        line: idx + 1,
                        reason,
                        text: lines[idx].to_string(),
                    });
                }
            }
        }
    }

    assert_no_violations(
        "Blocking I/O found in async production code",
        &violations,
        &[
            "✅ tokio::fs, tokio::net, tokio::io::{stdin, stdout}, async reqwest",
            "✅ Blocking calls inside plain fns that run before the turn loop",
            "❌ std::fs / std::net sockets / std::process / reqwest::blocking in async code",
        ],
    );
}

#[test]
fn test_blocking_in_async_fn_is_flagged() {
    let code = vec![
        "async fn bad_function() {",
        "    let contents = std::fs::read_to_string(\"file.txt\")?;",
        "}",
    ];
    assert_eq!(blocking_reason(&code, 1), Some("Blocking file I/O"));
}

#[test]
fn test_blocking_in_sync_fn_is_allowed() {
    let code = vec![
        "pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) {",
        "    let contents = std::fs::read_to_string(path)?;",
        "}",
    ];
    assert_eq!(blocking_reason(&code, 1), None);
}

#[test]
fn test_socket_address_type_is_allowed() {
    let code = vec!["use std::net::SocketAddr;"];
    assert_eq!(blocking_reason(&code, 0), None);
}

#[test]
fn test_module_level_fs_import_is_flagged() {
    let code = vec!["use std::fs;", "", "async fn read() {}"];
    assert_eq!(blocking_reason(&code, 0), Some("Blocking file I/O"));
}
