use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::lexer::tokenize;
use crate::parser::parse;
use crate::token::Token;

/// Aggregated result of checking one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    /// True iff `errors` is empty; warnings never affect validity.
    pub valid: bool,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub tokens: Vec<Token>,
}

/// Syntax checker façade wiring the lexer and parser together.
///
/// A checker holds no per-call state; one instance can be reused
/// freely across calls and shared between threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct Checker;

impl Checker {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Lex and parse `query`, returning the aggregated result.
    #[must_use]
    pub fn check_syntax(&self, query: &str) -> CheckResult {
        let mut diagnostics = Diagnostics::new();
        let tokens = tokenize(query, &mut diagnostics);
        parse(&tokens, &mut diagnostics);
        let (errors, warnings) = diagnostics.into_parts();
        CheckResult {
            valid: errors.is_empty(),
            errors,
            warnings,
            tokens,
        }
    }

    /// Check `query` and return its validity; with `verbose`, print
    /// the diagnostics and the token stream to stdout.
    pub fn validate_query(&self, query: &str, verbose: bool) -> bool {
        let result = self.check_syntax(query);
        if verbose {
            for error in &result.errors {
                println!("{error}");
            }
            for warning in &result.warnings {
                println!("{warning}");
            }
            println!("Tokens ({}):", result.tokens.len());
            for token in &result.tokens {
                println!("  {token}");
            }
        }
        result.valid
    }
}

/// Check a query string in one step.
#[must_use]
pub fn check_syntax(query: &str) -> CheckResult {
    Checker::new().check_syntax(query)
}
