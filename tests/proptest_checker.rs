//! Property-based tests with proptest.
//!
//! The checker must be total: any input, printable or not, yields a
//! result whose token stream ends in exactly one EOF, whose validity
//! mirrors its error list, and which is reproducible run to run.

use overpass_ql_check::{check_syntax, Diagnostics, TokenKind, tokenize};
use proptest::prelude::*;

proptest! {
    #[test]
    fn lexer_total_on_arbitrary_input(input in ".*") {
        let mut diagnostics = Diagnostics::new();
        let tokens = tokenize(&input, &mut diagnostics);
        let eof_count = tokens.iter().filter(|t| t.kind == TokenKind::Eof).count();
        prop_assert_eq!(eof_count, 1);
        prop_assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
    }

    #[test]
    fn token_positions_are_monotonic(input in ".*") {
        let mut diagnostics = Diagnostics::new();
        let tokens = tokenize(&input, &mut diagnostics);
        for pair in tokens.windows(2) {
            let (a, b) = (&pair[0].span, &pair[1].span);
            prop_assert!(
                a.line < b.line || (a.line == b.line && a.column <= b.column),
                "span went backwards: {:?} then {:?}", a, b
            );
        }
    }

    #[test]
    fn check_never_panics_and_valid_matches_errors(input in ".*") {
        let result = check_syntax(&input);
        prop_assert_eq!(result.valid, result.errors.is_empty());
    }

    #[test]
    fn check_is_idempotent(input in ".*") {
        let first = check_syntax(&input);
        let second = check_syntax(&input);
        prop_assert!(first == second);
    }

    #[test]
    fn query_shaped_inputs_are_handled(
        key in "[a-z][a-z_]{0,8}",
        value in "[a-zA-Z0-9 ]{0,12}",
        trailing in 0usize..5,
    ) {
        let query = format!("node[{key}=\"{value}\"];out;{}", ";".repeat(trailing));
        let result = check_syntax(&query);
        prop_assert!(result.valid, "errors: {:?}", result.errors);
    }

    #[test]
    fn appended_semicolons_never_invalidate(n in 0usize..16) {
        let query = format!("way[building];out geom;{}", ";\n".repeat(n));
        let result = check_syntax(&query);
        prop_assert!(result.valid);
        prop_assert!(result.errors.is_empty());
    }
}
