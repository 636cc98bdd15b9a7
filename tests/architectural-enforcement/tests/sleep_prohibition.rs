//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT call sleep methods. Waiting happens on
//! backend I/O or cancellation, never on the clock.
//! **Exceptions**: the backoff delay between in-place retries, test code

use architectural_enforcement::scan;

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan(|code, lines, idx| is_sleep_call(code) && !is_backoff_context(lines, idx));

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ ACCEPTABLE sleep uses:");
        eprintln!("  - Backoff between in-place retries");
        eprintln!("  - Test code (#[cfg(test)] modules and tests/ directories)");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep in polling loops");
        eprintln!("  - Sleep as poor man's synchronization");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

fn is_sleep_call(code: &str) -> bool {
    code.contains("::sleep(") || code.contains(".sleep(") || code.contains("thread::sleep")
}

/// Sleep is acceptable inside a backoff helper
fn is_backoff_context(lines: &[&str], current_idx: usize) -> bool {
    let context_range = current_idx.saturating_sub(15)..=current_idx;

    let mut has_backoff = false;
    let mut has_cancellation = false;

    for line in &lines[context_range] {
        let line = line.to_lowercase();
        if line.contains("backoff") {
            has_backoff = true;
        }
        if line.contains("cancel") {
            has_cancellation = true;
        }
    }

    has_backoff && has_cancellation
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_violation_detection() {
        let test_code = vec![
            "fn poll_until_ready() {",
            "    tokio::time::sleep(Duration::from_millis(10)).await;",
            "}",
        ];

        assert!(is_sleep_call(test_code[1]));
        assert!(!is_backoff_context(&test_code, 1));
    }

    #[test]
    fn test_backoff_detection() {
        let test_code = vec![
            "/// Backoff delay between in-place attempts; returns early on cancellation",
            "async fn backoff_sleep(delay: Duration, cancel: &CancellationToken) {",
            "    tokio::select! {",
            "        () = cancel.cancelled() => {}",
            "        () = tokio::time::sleep(delay) => {}",
            "    }",
            "}",
        ];

        assert!(is_backoff_context(&test_code, 4));
    }

    #[test]
    fn test_backoff_without_cancellation_rejected() {
        let test_code = vec![
            "fn backoff() {",
            "    std::thread::sleep(delay);",
            "}",
        ];

        assert!(!is_backoff_context(&test_code, 1));
    }
}
