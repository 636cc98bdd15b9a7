//! Integration Test: Panic Prohibition
//!
//! **Policy**: Production code MUST propagate errors instead of panicking.
//! `unwrap()`, `expect()`, `panic!`, `unreachable!`, `todo!` and
//! `unimplemented!` are allowed only in test code.

use architectural_enforcement::scan;

const FORBIDDEN: &[&str] = &[
    ".unwrap()",
    ".expect(",
    "panic!(",
    "unreachable!(",
    "todo!(",
    "unimplemented!(",
];

/// Test that production code never panics on recoverable errors
#[test]
fn test_no_panics_in_production_code() {
    let violations = scan(|code, _, _| contains_forbidden(code));

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Panicking calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ Use instead:");
        eprintln!("  - `?` with a thiserror variant in the library");
        eprintln!("  - anyhow::Context in the binary");
        eprintln!("  - unwrap_or / unwrap_or_else / unwrap_or_default for real defaults");

        panic!(
            "\nFound {} panic violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

fn contains_forbidden(code: &str) -> bool {
    FORBIDDEN.iter().any(|pattern| code.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_unwrap_and_expect() {
        assert!(contains_forbidden("let x = y.unwrap();"));
        assert!(contains_forbidden("let x = y.expect(\"present\");"));
        assert!(contains_forbidden("unreachable!(\"never\")"));
    }

    #[test]
    fn test_allows_fallible_defaults() {
        assert!(!contains_forbidden("let x = y.unwrap_or(0);"));
        assert!(!contains_forbidden("let x = y.unwrap_or_default();"));
        assert!(!contains_forbidden("let x = y.unwrap_or_else(|| 1);"));
    }
}
