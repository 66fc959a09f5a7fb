//! Grammar coverage: statements, filters, settings, and recovery.

mod common;

use common::{assert_error_count, assert_invalid, assert_valid};

// -----------------------------------------------------------
// Query statements.
// -----------------------------------------------------------

#[test]
fn parse_every_query_type() {
    for query_type in ["node", "way", "rel", "relation", "nwr", "nw", "nr", "wr", "area"] {
        assert_valid(&format!("{query_type}[amenity=cafe];out;"));
    }
}

#[test]
fn parse_is_in() {
    assert_valid("is_in;out;");
    assert_valid("is_in(50.7,7.1)->.a;.a out;");
}

#[test]
fn parse_query_with_input_set() {
    assert_valid("node.results[amenity=cafe];out;");
}

#[test]
fn parse_chained_filters() {
    assert_valid(
        "node[amenity=cafe][\"opening_hours\"](around:500,52.52,13.41)(user:\"alice\");out;",
    );
}

#[test]
fn parse_quoted_tag_values_with_spaces() {
    assert_valid("node[name=\"Caffè dell'Opera\"];out;");
}

#[test]
fn parse_numeric_tag_value() {
    assert_valid("way[lanes=2];out;");
}

#[test]
fn parse_not_equal_and_not_tilde() {
    assert_valid("node[amenity!=cafe];out;");
    assert_valid("node[\"area\"!~\".*\"];out;");
}

// -----------------------------------------------------------
// Settings.
// -----------------------------------------------------------

#[test]
fn parse_settings_groups() {
    assert_valid("[out:json][timeout:25][maxsize:1073741824];node;out;");
}

#[test]
fn parse_every_known_output_format() {
    for format in ["json", "xml", "custom", "popup"] {
        let result = assert_valid(&format!("[out:{format}];node;out;"));
        assert!(result.warnings.is_empty(), "format: {format}");
    }
}

#[test]
fn unknown_output_format_is_a_warning_not_an_error() {
    let result = assert_valid("[out:unknownfmt];node;out;");
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].message.contains("Unknown output format"));
}

#[test]
fn unknown_setting_key_is_a_warning() {
    let result = assert_valid("[voltage:230];node;out;");
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].message.contains("Unknown setting: voltage"));
}

#[test]
fn unknown_setting_group_is_still_consumed() {
    // recovery must reach the statements after the odd group
    let result = assert_valid("[voltage:two hundred thirty];node;out;");
    assert_eq!(result.warnings.len(), 1);
}

#[test]
fn settings_missing_semicolon() {
    assert_invalid("[out:json]node;out;");
}

#[test]
fn settings_value_errors() {
    assert_invalid("[timeout:];node;out;");
    assert_invalid("[timeout:-1];node;out;");
    assert_invalid("[timeout:2.5];node;out;");
    assert_invalid("[bbox:52.5,13.3,52.6];node;out;");
    assert_invalid("[date:\"not-a-date\"];node;out;");
}

#[test]
fn settings_not_at_start_are_rejected() {
    assert_invalid("node;[out:json];out;");
}

#[test]
fn csv_with_header_and_separator() {
    assert_valid("[out:csv(::id, name, \"addr:street\"; true; \"\\t\")];node;out;");
}

#[test]
fn csv_with_bad_header_flag() {
    let result = assert_invalid("[out:csv(name; maybe)];node;out;");
    assert!(result.errors[0].message.contains("true or false"));
}

// -----------------------------------------------------------
// Filters.
// -----------------------------------------------------------

#[test]
fn regex_filter_validation_messages() {
    let result = assert_invalid("node[amenity~\"(unclosed\"];out;");
    assert!(result.errors[0].message.contains("Invalid regex pattern"));
}

#[test]
fn double_regex_filter() {
    assert_valid("node[~\"^name(:.*)?$\"~\"^Berlin$\"];out;");
    let result = assert_invalid("node[~\"[bad\"~\"fine\"];out;");
    assert_eq!(result.errors.len(), 1);
}

#[test]
fn parser_continues_past_invalid_regex() {
    // the error must not swallow the following statements
    let result = assert_invalid("node[amenity~\"[a\"];way[building];out;");
    assert_eq!(result.errors.len(), 1);
}

#[test]
fn around_filter_with_linestring() {
    assert_valid("way(around:200,50.7,7.1,50.8,7.2,50.9,7.3);out;");
}

#[test]
fn around_radius_range() {
    let result = assert_invalid("node(around:-5,50.7,7.1);out;");
    assert!(result.errors[0].message.contains("Radius"));
}

#[test]
fn around_coordinate_range() {
    let result = assert_invalid("node(around:100,95.0,7.1);out;");
    assert!(result.errors[0].message.contains("Latitude"));
}

#[test]
fn bbox_filter_bounds() {
    assert_valid("node(-25.38,130.99,-25.34,131.08);out;");
    let result = assert_invalid("node(50.7,190.0,50.8,7.2);out;");
    assert!(result.errors[0].message.contains("West longitude"));
}

#[test]
fn id_list_filter() {
    assert_valid("node(id:1,2,3);out;");
    let result = assert_invalid("node(id:1,,2);out;");
    assert!(result.errors[0].message.contains("Expected ID"));
}

#[test]
fn single_id_filter() {
    assert_valid("node(240109189);out;");
}

#[test]
fn newer_filter_date() {
    assert_valid("node(newer:\"2020-01-01T00:00:00Z\");out;");
    assert_invalid("node(newer:\"last tuesday\");out;");
}

#[test]
fn changed_filter_both_positions() {
    assert_valid("node[changed:\"2020-07-23T00:00:00Z\"];out;");
    assert_valid(
        "node(changed:\"2020-07-23T00:00:00Z\",\"2020-07-24T00:00:00Z\")(user:\"HK2002\");out;",
    );
}

#[test]
fn member_filters() {
    for member in ["w", "r", "bn", "bw", "br"] {
        assert_valid(&format!("node({member});out;"));
        assert_valid(&format!("node({member}.someSet);out;"));
    }
    assert_valid("rel(bn:\"stop\");out;");
}

#[test]
fn template_as_filter_and_value() {
    assert_valid("node({{bbox}});out;");
    assert_valid("node[name={{name}}];out;");
}

#[test]
fn missing_closing_bracket() {
    let result = assert_invalid("node[amenity=cafe;out;");
    assert!(result.errors[0].message.contains("']'"));
}

#[test]
fn missing_closing_paren() {
    assert_invalid("node(around:100,50.7,7.1;out;");
}

// -----------------------------------------------------------
// out statements.
// -----------------------------------------------------------

#[test]
fn out_modifier_order_does_not_matter() {
    assert_valid("out body geom qt;");
    assert_valid("out qt geom body;");
}

#[test]
fn out_with_limit_and_bbox() {
    assert_valid("out 17;");
    assert_valid("out body (50.7,7.1,50.8,7.2);");
}

#[test]
fn out_with_input_set() {
    assert_valid(".result out count;");
}

#[test]
fn out_unknown_modifier_passes() {
    assert_valid("out futuristic;");
}

#[test]
fn out_count_terminates_the_parameter_list() {
    assert_valid("out count;");
    assert_valid(".result out count;");
    let result = assert_invalid("out count skel;");
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].message.contains("Expected ';'"));
}

// -----------------------------------------------------------
// Compound statements.
// -----------------------------------------------------------

#[test]
fn union_difference_shorthand() {
    assert_valid("(node[a];way[b];rel[c];);out;");
    assert_valid("(.b; - .a;)->.diff;.diff out;");
}

#[test]
fn one_difference_operand_is_the_limit() {
    let result = assert_invalid("(node[a]; - node[b]; - node[c];);out;");
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].message.contains("difference operators"));
}

#[test]
fn nested_union_shorthand() {
    assert_valid("((node[a];way[a];);(node[b];););out;");
}

#[test]
fn block_statement_forms() {
    assert_valid("union { node[a]; way[b]; }");
    assert_valid("difference { node[a]; node[b]; }");
    assert_valid("if (count(nodes) > 1) { out; } else { out skel; }");
    assert_valid("foreach { out; }");
    assert_valid("foreach.a { .a out; }");
    assert_valid("for (user()) { make stat user=_.val, num=count(nwr); out; }");
    assert_valid("complete { way(around:20)[highway]; }");
    assert_valid("retro (date(\"2017-10-01T00:00:00Z\")) { node(1); out; }");
    assert_valid("compare (delta: version()) { out meta; }");
}

#[test]
fn blocks_nest() {
    assert_valid("foreach { if (count(nodes) > 0) { out; } }");
}

#[test]
fn block_needs_braces() {
    let result = assert_invalid("if (1 < 2) out;");
    assert!(result.errors[0].message.contains("block body"));
}

#[test]
fn only_conditional_blocks_take_paren_parameters() {
    // `if`/`for`/`retro`/`compare` carry an evaluator; the rest go
    // straight to their body
    assert_valid("for (user()) { out; }");
    for query in [
        "union(garbage){ out; }",
        "difference(garbage){ out; }",
        "foreach(whatever){ out; }",
        "complete(30){ out; }",
    ] {
        let result = assert_invalid(query);
        assert!(
            result.errors.iter().any(|e| e.message.contains("block body")),
            "errors for {query:?}: {:?}",
            result.errors
        );
    }
}

#[test]
fn unbalanced_evaluator_at_eof() {
    let result = assert_invalid("if (count(nodes)");
    assert!(
        result
            .errors
            .iter()
            .any(|e| e.message.contains("Unbalanced expression"))
    );
}

#[test]
fn else_requires_if() {
    let result = assert_invalid("node;else { out; }");
    assert!(result.errors[0].message.contains("'else'"));
}

#[test]
fn recursion_and_set_statements() {
    assert_valid(">;>>;<;<<;");
    assert_valid(".a;.a out;.a->.b;");
    assert_valid("node[highway=bus_stop]->.stops;.stops out;>->.children;");
}

#[test]
fn make_and_convert() {
    assert_valid("make counter nodes=count(nodes), ways=count(ways);out;");
    assert_valid("convert row ::id = id(), name = t[\"name\"];out;");
}

#[test]
fn template_statement_with_assignment() {
    assert_valid("{{geocodeArea:\"Kyiv\"}}->.searchArea;node(area.searchArea);out;");
}

// -----------------------------------------------------------
// Recovery behaviour.
// -----------------------------------------------------------

#[test]
fn one_error_per_malformed_statement() {
    assert_error_count("node[amenity=cafe]out;", 1);
    assert_error_count("way[highway out;node;out;", 1);
}

#[test]
fn recovery_resumes_at_next_statement() {
    let result = assert_invalid("node[amenity=cafe]out;way[building];out;");
    assert_eq!(result.errors.len(), 1);
}

#[test]
fn recovery_inside_union_stays_inside() {
    let result = assert_invalid("(node[a]out;way[b];);out;");
    assert_eq!(result.errors.len(), 1);
}

#[test]
fn missing_semicolon_points_at_next_token() {
    let result = assert_invalid("node[amenity=restaurant]out;");
    let error = &result.errors[0];
    assert_eq!(error.span.line, 1);
    // the `out` right after the closing bracket
    assert_eq!(error.span.column, 25);
    assert!(error.message.contains("Expected ';'"));
}

#[test]
fn garbage_statement_keeps_going() {
    let result = assert_invalid("??;node;out;");
    assert!(result.errors.len() >= 1);
    // trailing statements were still parsed without fresh errors
    let unexpected: Vec<_> = result
        .errors
        .iter()
        .filter(|e| e.message.contains("'node'") || e.message.contains("'out'"))
        .collect();
    assert!(unexpected.is_empty());
}
