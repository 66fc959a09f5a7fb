#![allow(dead_code)]

use overpass_ql_check::{CheckResult, Checker};

pub fn check(query: &str) -> CheckResult {
    Checker::new().check_syntax(query)
}

pub fn assert_valid(query: &str) -> CheckResult {
    let result = check(query);
    assert!(
        result.valid,
        "expected valid, got errors: {:?}\n--- query ---\n{query}",
        result.errors
    );
    result
}

pub fn assert_invalid(query: &str) -> CheckResult {
    let result = check(query);
    assert!(!result.valid, "expected invalid\n--- query ---\n{query}");
    result
}

pub fn assert_error_count(query: &str, expected: usize) -> CheckResult {
    let result = check(query);
    assert_eq!(
        result.errors.len(),
        expected,
        "errors: {:?}\n--- query ---\n{query}",
        result.errors
    );
    result
}
