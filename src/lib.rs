//! OverpassQL lexer, parser, and static syntax checker.
//!
//! Validates queries in the Overpass Query Language (the language of
//! the Overpass API for OpenStreetMap data) without executing them.
//! Checking a query yields a validity flag, error and warning
//! diagnostics with 1-based line/column positions, and the token
//! stream produced by lexing.
//!
//! # Quick start
//!
//! ## Check a query
//!
//! ```
//! use overpass_ql_check::check_syntax;
//!
//! let result = check_syntax("node[amenity=restaurant];out;");
//! assert!(result.valid);
//! assert!(result.errors.is_empty());
//! ```
//!
//! ## Inspect diagnostics
//!
//! ```
//! use overpass_ql_check::check_syntax;
//!
//! let result = check_syntax("node[amenity=restaurant]out;");
//! assert!(!result.valid);
//! let message = result.errors[0].to_string();
//! assert!(message.starts_with("Syntax Error at line 1"));
//! ```
//!
//! ## Reuse a checker
//!
//! ```
//! use overpass_ql_check::Checker;
//!
//! let checker = Checker::new();
//! assert!(checker.validate_query("node(50.7,7.1,50.8,7.2);out;", false));
//! assert!(!checker.validate_query("node[;", false));
//! ```

// Allow noisy pedantic lints that don't add value for
// a library crate.
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod checker;
pub mod diagnostics;
pub mod lexer;
pub mod parser;
pub mod token;

pub use checker::{check_syntax, CheckResult, Checker};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use lexer::tokenize;
pub use parser::{parse, MAX_NESTING_DEPTH};
pub use token::{Keyword, Span, Token, TokenKind};
