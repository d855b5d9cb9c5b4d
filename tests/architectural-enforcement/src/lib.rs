//! Architectural Enforcement
//!
//! Line-oriented source scanners shared by the enforcement tests in `tests/`.
//! They are deliberately simple: each rule looks at one line of code at a
//! time, with just enough context (enclosing function, test module) to tell
//! production code from test code and sync from async.
//!
//! # Rules
//!
//! | Rule | Scope | Test |
//! |------|-------|------|
//! | No sleep, wait on I/O or `interval` | all crate sources and tests | `sleep_prohibition` |
//! | No blocking I/O in async code | production sources | `blocking_io_prohibition` |

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Production source trees, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["conductor/core/src", "conductor/daemon/src", "chat/src"];

/// Integration test trees, relative to the workspace root
pub const TEST_DIRS: &[&str] = &["conductor/core/tests", "conductor/daemon/tests"];

/// Workspace root (two levels above this crate)
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

/// One Rust source file
#[derive(Debug)]
pub struct SourceFile {
    /// Path relative to the workspace root
    pub path: PathBuf,
    /// File contents
    pub content: String,
}

impl SourceFile {
    /// Lines of the file
    #[must_use]
    pub fn lines(&self) -> Vec<&str> {
        self.content.lines().collect()
    }
}

/// All `.rs` files under `dir` (relative to the workspace root)
///
/// A missing directory yields no files.
#[must_use]
pub fn rust_files(dir: &str) -> Vec<SourceFile> {
    let root = workspace_root();
    let base = root.join(dir);
    if !base.exists() {
        return Vec::new();
    }

    walkdir::WalkDir::new(&base)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .filter_map(|e| {
            let content = fs::read_to_string(e.path()).ok()?;
            let path = e
                .path()
                .strip_prefix(&root)
                .map_or_else(|_| e.path().to_path_buf(), Path::to_path_buf);
            Some(SourceFile { path, content })
        })
        .collect()
}

/// The part of a line before any `//` comment
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Kind of function a line belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FnKind {
    /// Plain `fn`
    Sync,
    /// `async fn`
    Async,
}

/// Classify a line as a function header
#[must_use]
pub fn fn_header(line: &str) -> Option<FnKind> {
    let mut rest = line.trim();
    for prefix in ["pub(crate) ", "pub(super) ", "pub ", "const ", "unsafe "] {
        rest = rest.strip_prefix(prefix).unwrap_or(rest);
    }
    if rest.starts_with("async fn ") {
        Some(FnKind::Async)
    } else if rest.starts_with("fn ") {
        Some(FnKind::Sync)
    } else {
        None
    }
}

/// Nearest function header at or above `idx`, stopping at `mod`/`impl` lines
#[must_use]
pub fn enclosing_fn(lines: &[&str], idx: usize) -> Option<(usize, FnKind)> {
    for i in (0..=idx.min(lines.len().saturating_sub(1))).rev() {
        if let Some(kind) = fn_header(lines[i]) {
            return Some((i, kind));
        }
        let line = lines[i].trim();
        if line.starts_with("mod ") || (line.starts_with("impl") && line.ends_with('{')) {
            return None;
        }
    }
    None
}

/// Whether `idx` sits in test code
///
/// Either inside a `#[cfg(test)] mod` or in a function carrying a test
/// attribute.
#[must_use]
pub fn is_test_code(lines: &[&str], idx: usize) -> bool {
    in_test_module(lines, idx) || in_test_function(lines, idx)
}

fn in_test_module(lines: &[&str], idx: usize) -> bool {
    (0..idx).rev().any(|i| {
        lines[i].trim() == "#[cfg(test)]"
            && lines
                .get(i + 1)
                .is_some_and(|next| next.trim_start().starts_with("mod "))
    })
}

fn in_test_function(lines: &[&str], idx: usize) -> bool {
    let Some((fn_idx, _)) = enclosing_fn(lines, idx) else {
        return false;
    };
    for i in (0..fn_idx).rev() {
        let line = lines[i].trim();
        if line.starts_with("#[test]") || line.starts_with("#[tokio::test") {
            return true;
        }
        if !line.starts_with("#[") && !line.starts_with("///") {
            return false;
        }
    }
    false
}

/// A rule violation
#[derive(Debug)]
pub struct Violation {
    /// File, relative to the workspace root
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// What was found
    pub reason: &'static str,
    /// The offending line
    pub text: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.reason,
            self.text.trim()
        )
    }
}

/// Print violations with guidance and fail the test
///
/// # Panics
///
/// Panics when `violations` is not empty.
pub fn assert_no_violations(rule: &str, violations: &[Violation], guidance: &[&str]) {
    if violations.is_empty() {
        return;
    }

    eprintln!("\n❌ {rule}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    eprintln!();
    for line in guidance {
        eprintln!("  {line}");
    }

    panic!(
        "\nFound {} violation(s) of: {rule}\nFix these before merging!",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_header_detection() {
        assert_eq!(fn_header("    pub async fn submit_turn("), Some(FnKind::Async));
        assert_eq!(fn_header("pub(crate) fn new("), Some(FnKind::Sync));
        assert_eq!(fn_header("fn main() {"), Some(FnKind::Sync));
        assert_eq!(fn_header("let f = async move {"), None);
    }

    #[test]
    fn test_enclosing_fn_stops_at_impl() {
        let code = vec![
            "fn before() {}",
            "impl Thing {",
            "    const X: u32 = 1;",
        ];
        assert_eq!(enclosing_fn(&code, 2), None);

        let code = vec!["pub async fn run() {", "    work().await;", "}"];
        assert_eq!(enclosing_fn(&code, 1), Some((0, FnKind::Async)));
    }

    #[test]
    fn test_test_code_detection() {
        let code = vec![
            "#[tokio::test(start_paused = true)]",
            "async fn test_polls() {",
            "    run().await;",
            "}",
        ];
        assert!(is_test_code(&code, 2));

        let code = vec![
            "fn production() {}",
            "#[cfg(test)]",
            "mod tests {",
            "    fn helper() {",
            "        do_it();",
        ];
        assert!(!is_test_code(&code, 0));
        assert!(is_test_code(&code, 4));
    }

    #[test]
    fn test_code_part_strips_comments() {
        assert_eq!(code_part("let x = 1; // sleep(1)"), "let x = 1; ");
    }
}
