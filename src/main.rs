//! CLI tool to validate OverpassQL query syntax.

use std::fs;
use std::process::ExitCode;

use overpass_ql_check::Checker;

fn print_usage() {
    eprintln!("Usage: overpass-ql-check [options] \"<query>\"");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -f, --file <path>  Read the query from a file");
    eprintln!("  -v, --verbose      Also print tokens and full diagnostics");
    eprintln!("  --test             Run a built-in smoke test");
    eprintln!("  --version          Print the version");
    eprintln!("  -h, --help         Show this help");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  overpass-ql-check \"node[amenity=restaurant];out;\"");
    eprintln!("  overpass-ql-check -f my_query.overpass");
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut verbose = false;
    let mut run_smoke = false;
    let mut file: Option<String> = None;
    let mut query_arg: Option<String> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                return ExitCode::SUCCESS;
            }
            "--version" => {
                println!("overpass-ql-check {}", env!("CARGO_PKG_VERSION"));
                return ExitCode::SUCCESS;
            }
            "-v" | "--verbose" => verbose = true,
            "--test" => run_smoke = true,
            "-f" | "--file" => {
                i += 1;
                match args.get(i) {
                    Some(path) => file = Some(path.clone()),
                    None => {
                        eprintln!("Error: '-f' requires a file path");
                        return ExitCode::from(2);
                    }
                }
            }
            flag if flag.starts_with('-') => {
                eprintln!("Unknown flag: {flag}");
                print_usage();
                return ExitCode::from(2);
            }
            other => {
                if query_arg.is_some() {
                    eprintln!("Error: more than one query argument given");
                    return ExitCode::from(2);
                }
                query_arg = Some(other.to_string());
            }
        }
        i += 1;
    }

    if run_smoke {
        return smoke_test(verbose);
    }

    let query = if let Some(path) = file {
        match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("Error reading '{path}': {e}");
                return ExitCode::from(2);
            }
        }
    } else if let Some(query) = query_arg {
        query
    } else {
        eprintln!("Error: please provide a query string or a file.");
        eprintln!();
        print_usage();
        return ExitCode::from(2);
    };

    let result = Checker::new().check_syntax(&query);

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

    if result.valid {
        println!("Valid");
        ExitCode::SUCCESS
    } else {
        println!(
            "Invalid ({} errors, {} warnings)",
            result.errors.len(),
            result.warnings.len()
        );
        ExitCode::FAILURE
    }
}

/// Canned queries with their expected validity, exercising the main
/// grammar paths end to end.
fn smoke_test(verbose: bool) -> ExitCode {
    const CASES: &[(&str, bool)] = &[
        ("node[amenity=restaurant];out;", true),
        (
            "[out:json][timeout:25];area[name=\"Berlin\"]->.searchArea;\
             node(area.searchArea)[amenity=restaurant];out center;",
            true,
        ),
        (
            "(node[amenity=cafe](around:500,52.52,13.41);way[building];);out geom;",
            true,
        ),
        ("{{geocodeArea:\"Hamburg\"}}->.searchArea;node(area.searchArea);out;", true),
        (">;out skel qt;", true),
        ("node[amenity=restaurant]out;", false),
        ("node[amenity~\"[unterminated\"];out;", false),
        ("/* unterminated comment", false),
    ];

    let checker = Checker::new();
    let mut failures = 0usize;
    for (query, expected) in CASES {
        let valid = checker.validate_query(query, verbose);
        if valid == *expected {
            println!("ok: {query}");
        } else {
            failures += 1;
            println!("FAILED (expected valid={expected}): {query}");
        }
    }

    if failures == 0 {
        println!("Smoke test passed ({} queries)", CASES.len());
        ExitCode::SUCCESS
    } else {
        println!("Smoke test failed ({failures} of {} queries)", CASES.len());
        ExitCode::FAILURE
    }
}
