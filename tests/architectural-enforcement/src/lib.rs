//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - No sleep() calls in production code outside retry backoff
//! - No unwrap() / expect() / panic!() in production code
//!
//! Production code is every `.rs` file under the crate `src/` directories,
//! up to the first `#[cfg(test)]` line, with `//` comments stripped.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Source directories scanned, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["switchyard/core/src", "switchyard/cli/src"];

/// A forbidden pattern found in production code
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// File containing the match
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// Trimmed source line
    pub text: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.line, self.text)
    }
}

/// Workspace root, two levels above this crate
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

/// Every `.rs` file below `dir`
#[must_use]
pub fn rust_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        return Vec::new();
    }
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|entry| entry.into_path())
        .collect()
}

/// Production lines of a source file as `(index, code)` pairs
///
/// Stops at the first `#[cfg(test)]`; the code part excludes `//` comments.
#[must_use]
pub fn production_lines(content: &str) -> Vec<(usize, &str)> {
    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| !line.trim_start().starts_with("#[cfg(test)]"))
        .map(|(idx, line)| (idx, line.split("//").next().unwrap_or(line)))
        .collect()
}

/// Scan every production directory, reporting lines where `is_violation`
/// holds
///
/// `is_violation` receives the code part of the line, all raw lines of the
/// file and the line index.
pub fn scan<F>(is_violation: F) -> Vec<Violation>
where
    F: Fn(&str, &[&str], usize) -> bool,
{
    let root = workspace_root();
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        for path in rust_files(&root.join(dir)) {
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            let raw: Vec<&str> = content.lines().collect();
            for (idx, code) in production_lines(&content) {
                if is_violation(code, &raw, idx) {
                    violations.push(Violation {
                        path: path.clone(),
                        line: idx + 1,
                        text: raw[idx].trim().to_string(),
                    });
                }
            }
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let source = "fn a() {}\n// x.unwrap()\n#[cfg(test)]\nmod tests {}\n";
        let lines = production_lines(source);

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].1, "");
    }

    #[test]
    fn test_production_dirs_exist() {
        let root = workspace_root();
        for dir in PRODUCTION_DIRS {
            assert!(root.join(dir).exists(), "missing {dir}");
            assert!(!rust_files(&root.join(dir)).is_empty());
        }
    }
}
