use regex::Regex;

use crate::diagnostics::Diagnostics;
use crate::token::{Keyword, Span, Token, TokenKind};

/// Block statements and union groups may nest this deep before the
/// parser stops to protect its own call stack.
pub const MAX_NESTING_DEPTH: usize = 256;

const OUTPUT_FORMATS: &[&str] = &["json", "xml", "csv", "custom", "popup"];
const OUT_MODES: &[&str] = &["ids", "skel", "body", "tags", "meta"];
const MEMBER_FILTERS: &[&str] = &["w", "r", "bn", "bw", "br"];

/// Validate a token stream against the OverpassQL grammar.
///
/// Diagnostics accumulate in `diagnostics`; nothing is returned. The
/// parser recovers per statement, so one malformed statement does not
/// hide errors further down unless recovery is impossible.
pub fn parse(tokens: &[Token], diagnostics: &mut Diagnostics) {
    if tokens.is_empty() {
        return;
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        fatal: false,
        diagnostics,
    };
    parser.run();
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
    fatal: bool,
    diagnostics: &'a mut Diagnostics,
}

impl<'a> Parser<'a> {
    fn run(&mut self) {
        if self.at(TokenKind::LBracket) {
            self.parse_settings();
        }
        while !self.fatal && !self.at(TokenKind::Eof) {
            self.parse_statement();
        }
    }

    // -------------------------------------------------------
    // Token access.
    // -------------------------------------------------------

    fn current(&self) -> &'a Token {
        // the token list always ends with Eof; clamp to it
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> TokenKind {
        self.current().kind
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    fn keyword(&self) -> Option<Keyword> {
        if self.at(TokenKind::Identifier) {
            Keyword::from_lexeme(&self.current().lexeme)
        } else {
            None
        }
    }

    fn advance(&mut self) -> &'a Token {
        let token = self.current();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn describe_current(&self) -> String {
        let token = self.current();
        if token.kind == TokenKind::Eof {
            "end of input".to_string()
        } else {
            format!("'{}'", token.lexeme)
        }
    }

    fn error_here(&mut self, message: impl Into<String>) {
        let span = self.current().span;
        self.diagnostics.error(span, message);
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            let found = self.describe_current();
            self.error_here(format!("Expected {what}, got {found}"));
            false
        }
    }

    // -------------------------------------------------------
    // Error recovery.
    // -------------------------------------------------------

    /// Skip tokens until a statement boundary: a ';' at the current
    /// nesting level (consumed), a '}' or ')' at the current level
    /// (left for the caller), or end of input.
    fn synchronize(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.kind() {
                TokenKind::Eof => return,
                TokenKind::Semicolon if depth == 0 => {
                    self.advance();
                    return;
                }
                TokenKind::LParen | TokenKind::LBrace | TokenKind::LBracket => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::RParen | TokenKind::RBrace | TokenKind::RBracket => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn recover_bracket_group(&mut self) {
        loop {
            match self.kind() {
                TokenKind::RBracket => {
                    self.advance();
                    return;
                }
                TokenKind::Semicolon
                | TokenKind::RParen
                | TokenKind::RBrace
                | TokenKind::Eof => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn recover_paren_group(&mut self) {
        loop {
            match self.kind() {
                TokenKind::RParen => {
                    self.advance();
                    return;
                }
                TokenKind::Semicolon
                | TokenKind::RBracket
                | TokenKind::RBrace
                | TokenKind::Eof => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Consume the statement terminator, or report it missing and scan
    /// to the next boundary.
    fn expect_statement_end(&mut self) {
        if self.at(TokenKind::Semicolon) {
            self.advance();
        } else {
            let found = self.describe_current();
            self.error_here(format!("Expected ';', got {found}"));
            self.synchronize();
        }
    }

    // -------------------------------------------------------
    // Settings header.
    // -------------------------------------------------------

    fn parse_settings(&mut self) {
        while self.at(TokenKind::LBracket) {
            self.advance();
            self.parse_setting_item();
            if !self.expect(TokenKind::RBracket, "']' after setting") {
                self.recover_setting_group();
            }
        }
        self.expect_statement_end();
    }

    fn recover_setting_group(&mut self) {
        // resume after the broken group's ']' so later groups still parse
        loop {
            match self.kind() {
                TokenKind::RBracket => {
                    self.advance();
                    return;
                }
                TokenKind::Semicolon | TokenKind::Eof => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn parse_setting_item(&mut self) {
        if !self.at(TokenKind::Identifier) {
            self.error_here("Expected setting name in settings block");
            return;
        }
        let token = self.advance();
        // the lexer fuses `out:json` into one identifier; split the key
        // from an inline value here
        let (key, inline) = match token.lexeme.split_once(':') {
            Some((key, value)) => (key.to_string(), Some(value.to_string())),
            None => (token.lexeme.clone(), None),
        };
        match key.as_str() {
            "timeout" | "maxsize" => self.parse_integer_setting(&key, token.span, inline),
            "bbox" => self.parse_bbox_setting(token.span, inline),
            "date" | "diff" | "adiff" => self.parse_date_setting(&key, token.span, inline),
            "out" => self.parse_output_setting(token.span, inline),
            _ => {
                self.diagnostics
                    .warning(token.span, format!("Unknown setting: {key}"));
                self.skip_setting_value(inline.is_some());
            }
        }
    }

    fn parse_integer_setting(&mut self, key: &str, span: Span, inline: Option<String>) {
        if let Some(value) = inline {
            // fused values are identifiers, never numbers
            self.diagnostics
                .error(span, format!("Invalid number for {key}: {value}"));
            return;
        }
        if !self.expect(TokenKind::Colon, &format!("':' after '{key}'")) {
            return;
        }
        let negative = self.at(TokenKind::Minus);
        if negative || self.at(TokenKind::Plus) {
            self.advance();
        }
        if !self.at(TokenKind::Number) {
            self.error_here(format!("Expected number after '{key}:'"));
            return;
        }
        let number = self.advance();
        if negative {
            self.diagnostics
                .error(number.span, format!("{key} must be non-negative"));
        } else if number.lexeme.parse::<u64>().is_err() {
            self.diagnostics.error(
                number.span,
                format!("Invalid number for {key}: {}", number.lexeme),
            );
        }
    }

    fn parse_bbox_setting(&mut self, span: Span, inline: Option<String>) {
        if inline.is_some() {
            self.diagnostics
                .error(span, "Expected coordinates after 'bbox:'");
            return;
        }
        if !self.expect(TokenKind::Colon, "':' after 'bbox'") {
            return;
        }
        if self.at(TokenKind::Template) {
            // {{bbox}} substituted by the frontend
            self.advance();
            return;
        }
        for index in 0..4 {
            if index > 0 && !self.expect(TokenKind::Comma, "',' between bbox coordinates") {
                return;
            }
            let Some((value, value_span)) = self.signed_number("coordinate in bbox") else {
                return;
            };
            self.check_coordinate_range(index, value, value_span);
        }
    }

    /// Even positions are latitudes, odd are longitudes.
    fn check_coordinate_range(&mut self, index: usize, value: f64, span: Span) {
        if index % 2 == 0 {
            if !(-90.0..=90.0).contains(&value) {
                self.diagnostics.error(
                    span,
                    format!("Latitude must be between -90 and 90: {value}"),
                );
            }
        } else if !(-180.0..=180.0).contains(&value) {
            self.diagnostics.error(
                span,
                format!("Longitude must be between -180 and 180: {value}"),
            );
        }
    }

    fn parse_date_setting(&mut self, key: &str, span: Span, inline: Option<String>) {
        if inline.is_some() {
            self.diagnostics
                .error(span, format!("Expected date string after '{key}:'"));
            return;
        }
        if !self.expect(TokenKind::Colon, &format!("':' after '{key}'")) {
            return;
        }
        self.expect_date_string(&format!("date string after '{key}:'"));
        if (key == "diff" || key == "adiff") && self.at(TokenKind::Comma) {
            self.advance();
            self.expect_date_string("second date string");
        }
    }

    fn expect_date_string(&mut self, what: &str) {
        if !self.at(TokenKind::String) {
            self.error_here(format!("Expected {what}"));
            return;
        }
        let token = self.advance();
        if !is_iso_datetime(&token.lexeme) {
            self.diagnostics.error(
                token.span,
                "Invalid date format. Expected YYYY-MM-DDTHH:MM:SSZ",
            );
        }
    }

    fn parse_output_setting(&mut self, span: Span, inline: Option<String>) {
        let format = if let Some(value) = inline {
            Some((value, span))
        } else {
            if !self.expect(TokenKind::Colon, "':' after 'out'") {
                return;
            }
            match self.kind() {
                TokenKind::Identifier => {
                    let token = self.advance();
                    Some((token.lexeme.clone(), token.span))
                }
                TokenKind::String => {
                    self.advance();
                    None
                }
                _ => {
                    self.error_here("Expected output format after 'out:'");
                    None
                }
            }
        };
        let Some((format, format_span)) = format else {
            return;
        };
        if format == "csv" {
            if self.at(TokenKind::LParen) {
                self.parse_csv_columns();
            }
        } else if !OUTPUT_FORMATS.contains(&format.as_str()) {
            self.diagnostics
                .warning(format_span, format!("Unknown output format: {format}"));
        }
    }

    /// `csv( field (, field)* ( ; header ( ; separator )? )? )`
    fn parse_csv_columns(&mut self) {
        self.advance(); // '('
        loop {
            self.parse_csv_field();
            if self.at(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        if self.at(TokenKind::Semicolon) {
            self.advance();
            if self.at(TokenKind::Identifier) {
                let flag = self.advance();
                if flag.lexeme != "true" && flag.lexeme != "false" {
                    self.diagnostics.error(
                        flag.span,
                        format!("Expected true or false for csv header, got '{}'", flag.lexeme),
                    );
                }
            } else {
                self.error_here("Expected true or false for csv header");
            }
        }
        if self.at(TokenKind::Semicolon) {
            self.advance();
            if self.at(TokenKind::String) {
                self.advance();
            } else {
                self.error_here("Expected separator string in csv format");
            }
        }
        if !self.expect(TokenKind::RParen, "')' after csv columns") {
            self.recover_paren_group();
        }
    }

    fn parse_csv_field(&mut self) {
        match self.kind() {
            // ::id, ::type and friends
            TokenKind::Colon => {
                self.advance();
                if !self.expect(TokenKind::Colon, "'::' for csv special column") {
                    return;
                }
                if self.at(TokenKind::Identifier) {
                    self.advance();
                } else {
                    self.error_here("Expected column name after '::'");
                }
            }
            TokenKind::Identifier | TokenKind::String => {
                self.advance();
            }
            _ => self.error_here("Expected csv column name"),
        }
    }

    fn skip_setting_value(&mut self, value_was_inline: bool) {
        if value_was_inline {
            return;
        }
        if self.at(TokenKind::Colon) {
            self.advance();
            while !matches!(
                self.kind(),
                TokenKind::RBracket | TokenKind::Semicolon | TokenKind::Eof
            ) {
                self.advance();
            }
        }
    }

    // -------------------------------------------------------
    // Statements.
    // -------------------------------------------------------

    fn parse_statement(&mut self) {
        match self.kind() {
            // empty statement
            TokenKind::Semicolon => {
                self.advance();
            }
            TokenKind::Eof => {}
            // already reported by the lexer
            TokenKind::Error => {
                self.advance();
            }
            TokenKind::Template => self.parse_template_statement(),
            TokenKind::Dot => self.parse_set_statement(),
            // bare `-> .name;` assigns the default set
            TokenKind::Arrow => {
                self.parse_assignment_suffix();
                self.expect_statement_end();
            }
            TokenKind::LParen => self.parse_union_shorthand(),
            TokenKind::RecurseUp
            | TokenKind::RecurseUpRel
            | TokenKind::RecurseDown
            | TokenKind::RecurseDownRel => self.parse_recursion_statement(),
            TokenKind::Identifier => self.parse_keyword_statement(),
            _ => {
                let found = self.describe_current();
                self.error_here(format!("Unexpected token: {found}"));
                self.advance();
            }
        }
    }

    fn parse_keyword_statement(&mut self) {
        match self.keyword() {
            Some(keyword) if keyword.is_query_type() => self.parse_query_statement(),
            Some(Keyword::Out) => self.parse_out_statement(),
            Some(Keyword::Make | Keyword::Convert) => self.parse_make_statement(),
            Some(Keyword::If) => self.parse_if_statement(),
            Some(Keyword::Else) => {
                self.error_here("'else' without preceding 'if'");
                self.advance();
                self.synchronize();
            }
            Some(
                Keyword::Foreach | Keyword::Complete | Keyword::Union | Keyword::Difference,
            ) => self.parse_simple_block_statement(),
            Some(Keyword::For | Keyword::Retro | Keyword::Compare) => {
                self.parse_conditional_block_statement();
            }
            _ => {
                let found = self.describe_current();
                self.error_here(format!("Unexpected token: {found}"));
                self.advance();
            }
        }
    }

    fn parse_query_statement(&mut self) {
        self.advance(); // query type
        if self.at(TokenKind::Dot) {
            self.parse_set_name();
        }
        self.parse_filters();
        self.parse_assignment_suffix();
        self.expect_statement_end();
    }

    /// `.name`, with the dot still current.
    fn parse_set_name(&mut self) {
        self.advance(); // '.'
        if !self.at(TokenKind::Identifier) {
            self.error_here("Expected set name after '.'");
            return;
        }
        let name = self.advance();
        if name.lexeme.contains(':') {
            self.diagnostics
                .error(name.span, format!("Invalid set name: {}", name.lexeme));
        }
    }

    fn parse_filters(&mut self) {
        loop {
            match self.kind() {
                TokenKind::LBracket => self.parse_tag_filter(),
                TokenKind::LParen => self.parse_paren_filter(),
                TokenKind::Template => {
                    self.advance();
                }
                _ => return,
            }
        }
    }

    /// `-> .name`; permitted after queries, unions, recursions, and
    /// templates. Returns whether a suffix was present.
    fn parse_assignment_suffix(&mut self) -> bool {
        if !self.at(TokenKind::Arrow) {
            return false;
        }
        self.advance();
        if !self.expect(TokenKind::Dot, "'.' after '->'") {
            return true;
        }
        if !self.at(TokenKind::Identifier) {
            self.error_here("Expected set name after '.'");
            return true;
        }
        let name = self.advance();
        if name.lexeme.contains(':') {
            self.diagnostics
                .error(name.span, format!("Invalid set name: {}", name.lexeme));
        }
        true
    }

    // -------------------------------------------------------
    // Tag filters: [key], [!key], [key=value], [~"k"~"v"], ...
    // -------------------------------------------------------

    fn parse_tag_filter(&mut self) {
        self.advance(); // '['
        match self.kind() {
            TokenKind::Bang => {
                self.advance();
                if matches!(self.kind(), TokenKind::Identifier | TokenKind::String) {
                    self.advance();
                } else {
                    self.error_here("Expected key after '!' in tag filter");
                }
            }
            TokenKind::Tilde => {
                self.advance();
                self.expect_regex_string("key pattern after '~'");
                if self.expect(TokenKind::Tilde, "'~' before value pattern") {
                    self.expect_regex_string("value pattern after '~'");
                    self.parse_regex_flag();
                }
            }
            TokenKind::Identifier | TokenKind::String => {
                let key = self.advance();
                let temporal = key.kind == TokenKind::Identifier
                    && (key.lexeme == "changed" || key.lexeme == "newer");
                if temporal && self.at(TokenKind::Colon) {
                    self.parse_temporal_operand(&key.lexeme);
                } else {
                    self.parse_tag_comparison();
                }
            }
            _ => {
                let found = self.describe_current();
                self.error_here(format!("Expected key name in tag filter, got {found}"));
            }
        }
        if !self.expect(TokenKind::RBracket, "']' to close tag filter") {
            self.recover_bracket_group();
        }
    }

    fn parse_tag_comparison(&mut self) {
        let op_kind = self.kind();
        if !matches!(
            op_kind,
            TokenKind::Assign | TokenKind::NotEqual | TokenKind::Tilde | TokenKind::NotTilde
        ) {
            // bare existence filter [key]
            return;
        }
        self.advance();
        let is_regex = matches!(op_kind, TokenKind::Tilde | TokenKind::NotTilde);
        match self.kind() {
            TokenKind::String | TokenKind::Identifier | TokenKind::Number => {
                let value = self.advance();
                if is_regex {
                    self.validate_regex(value);
                }
            }
            TokenKind::Template => {
                self.advance();
            }
            _ => {
                self.error_here("Expected value after operator in tag filter");
                return;
            }
        }
        if is_regex {
            self.parse_regex_flag();
        }
    }

    /// `,i` after a regex value requests case-insensitive matching.
    fn parse_regex_flag(&mut self) {
        if !self.at(TokenKind::Comma) {
            return;
        }
        self.advance();
        if self.at(TokenKind::Identifier) {
            let flag = self.advance();
            if flag.lexeme != "i" {
                self.diagnostics
                    .error(flag.span, format!("Invalid regex flag: {}", flag.lexeme));
            }
        } else {
            self.error_here("Expected regex flag after ','");
        }
    }

    fn expect_regex_string(&mut self, what: &str) {
        if !self.at(TokenKind::String) {
            self.error_here(format!("Expected {what}"));
            return;
        }
        let token = self.advance();
        self.validate_regex(token);
    }

    fn validate_regex(&mut self, token: &Token) {
        if let Err(error) = Regex::new(&token.lexeme) {
            let detail = regex_error_summary(&error);
            self.diagnostics
                .error(token.span, format!("Invalid regex pattern: {detail}"));
        }
    }

    /// `changed:"date"` or `changed:"start","end"`, in either bracket
    /// or parenthesis position; the ':' is still current.
    fn parse_temporal_operand(&mut self, key: &str) {
        self.advance(); // ':'
        self.expect_date_string(&format!("date string after '{key}:'"));
        if self.at(TokenKind::Comma) {
            self.advance();
            self.expect_date_string("second date string");
        }
    }

    // -------------------------------------------------------
    // Parenthesized filters: (bbox), (around:...), (id:...), ...
    // -------------------------------------------------------

    fn parse_paren_filter(&mut self) {
        self.advance(); // '('
        let mut closed = false;
        match self.kind() {
            TokenKind::Template => {
                self.advance();
            }
            TokenKind::Number | TokenKind::Minus | TokenKind::Plus => {
                self.parse_coordinate_list();
            }
            TokenKind::Identifier => closed = self.parse_named_paren_filter(),
            // `()` is tolerated
            TokenKind::RParen => {}
            _ => {
                let found = self.describe_current();
                self.error_here(format!("Expected filter in parentheses, got {found}"));
            }
        }
        if !closed && !self.expect(TokenKind::RParen, "')' to close filter") {
            self.recover_paren_group();
        }
    }

    /// Dispatch on the leading filter name. Returns true when the
    /// closing ')' has already been consumed.
    fn parse_named_paren_filter(&mut self) -> bool {
        let name = self.advance();
        match name.lexeme.as_str() {
            "around" => self.parse_around_filter(),
            "poly" => self.parse_poly_filter(),
            "area" | "pivot" => self.parse_area_filter(&name.lexeme),
            "id" => self.parse_id_filter(),
            "changed" | "newer" => {
                if self.at(TokenKind::Colon) {
                    self.parse_temporal_operand(&name.lexeme);
                } else {
                    self.error_here(format!("Expected ':' after '{}'", name.lexeme));
                }
            }
            "user" | "uid" => self.parse_user_filter(&name.lexeme),
            "if" => {
                if self.expect(TokenKind::Colon, "':' after 'if'") {
                    self.scan_balanced_to_rparen(name.span);
                    return true;
                }
            }
            member if MEMBER_FILTERS.contains(&member) => self.parse_member_filter(),
            _ => {
                // other filters carry a single ':'-separated operand
                if self.at(TokenKind::Colon) {
                    self.advance();
                    if matches!(
                        self.kind(),
                        TokenKind::String
                            | TokenKind::Number
                            | TokenKind::Identifier
                            | TokenKind::Template
                    ) {
                        self.advance();
                    }
                }
            }
        }
        false
    }

    /// `around:radius`, `around.set:radius`, or
    /// `around:radius,lat,lon(,lat,lon)*`.
    fn parse_around_filter(&mut self) {
        if self.at(TokenKind::Dot) {
            self.parse_set_name();
        }
        if !self.expect(TokenKind::Colon, "':' after 'around'") {
            return;
        }
        let radius_span = self.current().span;
        let Some((radius, _)) = self.signed_number("radius after 'around:'") else {
            return;
        };
        if radius < 0.0 {
            self.diagnostics
                .error(radius_span, "Radius must be non-negative");
        }
        let mut index = 0usize;
        while self.at(TokenKind::Comma) {
            self.advance();
            let what = if index % 2 == 0 { "latitude" } else { "longitude" };
            let Some((value, value_span)) = self.signed_number(what) else {
                return;
            };
            self.check_coordinate_range(index, value, value_span);
            index += 1;
        }
    }

    fn parse_poly_filter(&mut self) {
        if !self.expect(TokenKind::Colon, "':' after 'poly'") {
            return;
        }
        if !self.at(TokenKind::String) {
            self.error_here("Expected polygon coordinate string after 'poly:'");
            return;
        }
        let poly = self.advance();
        let coords = poly.lexeme.split_whitespace().count();
        if coords < 6 || coords % 2 != 0 {
            self.diagnostics
                .error(poly.span, "Polygon must have at least 3 coordinate pairs");
        }
    }

    /// `area`, `area.set`, or `area:id` (also `pivot`).
    fn parse_area_filter(&mut self, name: &str) {
        if self.at(TokenKind::Dot) {
            self.parse_set_name();
        } else if self.at(TokenKind::Colon) {
            self.advance();
            if self.at(TokenKind::Number) {
                self.advance();
            } else {
                self.error_here(format!("Expected area ID after '{name}:'"));
            }
        }
    }

    fn parse_id_filter(&mut self) {
        if !self.expect(TokenKind::Colon, "':' after 'id'") {
            return;
        }
        if !self.at(TokenKind::Number) {
            self.error_here("Expected ID after 'id:'");
            return;
        }
        self.advance();
        while self.at(TokenKind::Comma) {
            self.advance();
            if self.at(TokenKind::Number) {
                self.advance();
            } else {
                self.error_here("Expected ID in ID list");
                return;
            }
        }
    }

    fn parse_user_filter(&mut self, name: &str) {
        if !self.expect(TokenKind::Colon, &format!("':' after '{name}'")) {
            return;
        }
        loop {
            if matches!(
                self.kind(),
                TokenKind::String | TokenKind::Number | TokenKind::Identifier
            ) {
                self.advance();
            } else {
                self.error_here(format!("Expected value after '{name}:'"));
                return;
            }
            if self.at(TokenKind::Comma) {
                self.advance();
            } else {
                return;
            }
        }
    }

    /// `w`, `r`, `bn`, `bw`, `br` with optional `.set` and `:"role"`.
    fn parse_member_filter(&mut self) {
        if self.at(TokenKind::Dot) {
            self.parse_set_name();
        }
        if self.at(TokenKind::Colon) {
            self.advance();
            if self.at(TokenKind::String) {
                self.advance();
            }
        }
    }

    /// Bare numbers in parentheses: an ID, an ID list, or a bounding
    /// box when exactly four values are present.
    fn parse_coordinate_list(&mut self) {
        let mut values = Vec::new();
        let Some(first) = self.signed_number("number") else {
            return;
        };
        values.push(first);
        while self.at(TokenKind::Comma) {
            self.advance();
            let Some(value) = self.signed_number("number") else {
                return;
            };
            values.push(value);
        }
        if values.len() == 4 {
            const NAMES: [&str; 4] = [
                "South latitude",
                "West longitude",
                "North latitude",
                "East longitude",
            ];
            for (index, (value, span)) in values.iter().enumerate() {
                let (low, high) = if index % 2 == 0 {
                    (-90.0, 90.0)
                } else {
                    (-180.0, 180.0)
                };
                if !(low..=high).contains(value) {
                    self.diagnostics.error(
                        *span,
                        format!("{} must be between {low} and {high}: {value}", NAMES[index]),
                    );
                }
            }
        }
    }

    fn signed_number(&mut self, what: &str) -> Option<(f64, Span)> {
        let span = self.current().span;
        let negative = self.at(TokenKind::Minus);
        if negative || self.at(TokenKind::Plus) {
            self.advance();
        }
        if !self.at(TokenKind::Number) {
            self.error_here(format!("Expected {what}"));
            return None;
        }
        let token = self.advance();
        match token.lexeme.parse::<f64>() {
            Ok(value) => Some((if negative { -value } else { value }, span)),
            Err(_) => {
                self.diagnostics
                    .error(token.span, format!("Invalid coordinate: {}", token.lexeme));
                None
            }
        }
    }

    // -------------------------------------------------------
    // out statements.
    // -------------------------------------------------------

    fn parse_out_statement(&mut self) {
        self.advance(); // 'out'
        let mut mode_seen = false;
        loop {
            match self.kind() {
                TokenKind::Identifier => {
                    let param = self.advance();
                    if OUT_MODES.contains(&param.lexeme.as_str()) {
                        if mode_seen {
                            self.diagnostics
                                .error(param.span, "Multiple output modes specified");
                        }
                        mode_seen = true;
                    } else if param.lexeme == "count" {
                        // count is terminal; the ';' must follow
                        break;
                    }
                    // modifiers and forward-compatible extensions
                    // pass through
                }
                TokenKind::Number => {
                    let limit = self.advance();
                    if limit.lexeme.parse::<u64>().is_err() {
                        self.diagnostics
                            .error(limit.span, format!("Invalid output limit: {}", limit.lexeme));
                    }
                }
                TokenKind::Minus => {
                    let minus_span = self.current().span;
                    self.advance();
                    if self.at(TokenKind::Number) {
                        self.advance();
                        self.diagnostics
                            .error(minus_span, "Output limit must be non-negative");
                    } else {
                        self.diagnostics
                            .error(minus_span, "Unexpected token: '-'");
                    }
                }
                TokenKind::LParen => self.parse_paren_filter(),
                _ => break,
            }
        }
        self.expect_statement_end();
    }

    // -------------------------------------------------------
    // make / convert statements.
    // -------------------------------------------------------

    fn parse_make_statement(&mut self) {
        let head = self.advance(); // 'make' or 'convert'
        if self.at(TokenKind::Identifier) {
            self.advance();
            // `\1`-style back-references may extend the name
            while self.at(TokenKind::Backslash) {
                self.advance();
                if self.at(TokenKind::Number) {
                    self.advance();
                } else {
                    self.error_here("Expected digits after '\\' back-reference");
                }
            }
        } else {
            self.error_here(format!("Expected type name after '{}'", head.lexeme));
        }
        if matches!(
            self.kind(),
            TokenKind::Identifier | TokenKind::String | TokenKind::Colon
        ) {
            self.parse_tag_spec();
        }
        while self.at(TokenKind::Comma) {
            self.advance();
            self.parse_tag_spec();
        }
        self.parse_assignment_suffix();
        self.expect_statement_end();
    }

    /// `key = evaluator`, where the value is accepted by delimiter
    /// balance alone.
    fn parse_tag_spec(&mut self) {
        match self.kind() {
            TokenKind::Identifier | TokenKind::String => {
                self.advance();
            }
            // ::id special keys
            TokenKind::Colon => {
                self.advance();
                if !self.expect(TokenKind::Colon, "'::' for special key") {
                    return;
                }
                if self.at(TokenKind::Identifier) {
                    self.advance();
                } else {
                    self.error_here("Expected key after '::'");
                }
            }
            _ => {
                self.error_here("Expected key in tag assignment");
                return;
            }
        }
        if !self.expect(TokenKind::Assign, "'=' in tag assignment") {
            return;
        }
        self.scan_value_expression();
    }

    /// Consume an evaluator value up to a ',' or ';' at the current
    /// nesting level. Content is only checked for delimiter balance.
    fn scan_value_expression(&mut self) {
        let start = self.current().span;
        let mut depth = 0usize;
        let mut consumed = false;
        loop {
            match self.kind() {
                TokenKind::Eof => {
                    if depth > 0 {
                        self.diagnostics
                            .error(start, "Unbalanced expression in tag assignment");
                    } else if !consumed {
                        self.error_here("Expected value after '=' in tag assignment");
                    }
                    return;
                }
                TokenKind::Comma | TokenKind::Semicolon if depth == 0 => {
                    if !consumed {
                        self.error_here("Expected value after '=' in tag assignment");
                    }
                    return;
                }
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                    depth += 1;
                    consumed = true;
                    self.advance();
                }
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    if depth == 0 {
                        // closing an enclosing group ends the value
                        if !consumed {
                            self.error_here("Expected value after '=' in tag assignment");
                        }
                        return;
                    }
                    depth -= 1;
                    self.advance();
                }
                _ => {
                    consumed = true;
                    self.advance();
                }
            }
        }
    }

    // -------------------------------------------------------
    // Block statements.
    // -------------------------------------------------------

    fn parse_if_statement(&mut self) {
        self.advance(); // 'if'
        self.parse_block_sets();
        if self.at(TokenKind::LParen) {
            let open = self.advance().span;
            self.scan_balanced_to_rparen(open);
        } else {
            self.error_here("Expected '(' after 'if'");
        }
        self.parse_block_body();
        if self.keyword() == Some(Keyword::Else) {
            self.advance();
            self.parse_block_body();
        }
        if self.at(TokenKind::Semicolon) {
            self.advance();
        }
    }

    /// `for`, `retro`, `compare`: a parenthesized evaluator is
    /// required before the body.
    fn parse_conditional_block_statement(&mut self) {
        let head = self.advance();
        self.parse_block_sets();
        if self.at(TokenKind::LParen) {
            let open = self.advance().span;
            self.scan_balanced_to_rparen(open);
        } else {
            self.error_here(format!("Expected '(' after '{}'", head.lexeme));
        }
        self.parse_block_body();
        if self.at(TokenKind::Semicolon) {
            self.advance();
        }
    }

    /// `foreach`, `complete`, `union`, `difference`: an optional input
    /// set is the only thing permitted before the body.
    fn parse_simple_block_statement(&mut self) {
        self.advance();
        self.parse_block_sets();
        self.parse_block_body();
        if self.at(TokenKind::Semicolon) {
            self.advance();
        }
    }

    /// Optional `.input` and `-> .output` between a block keyword and
    /// its parameters.
    fn parse_block_sets(&mut self) {
        if self.at(TokenKind::Dot) {
            self.parse_set_name();
        }
        self.parse_assignment_suffix();
    }

    fn parse_block_body(&mut self) {
        if !self.at(TokenKind::LBrace) {
            let found = self.describe_current();
            self.error_here(format!("Expected '{{' to open block body, got {found}"));
            self.synchronize();
            return;
        }
        if self.depth >= MAX_NESTING_DEPTH {
            self.error_here("Nesting too deep");
            self.fatal = true;
            return;
        }
        self.advance(); // '{'
        self.depth += 1;
        while !self.fatal && !matches!(self.kind(), TokenKind::RBrace | TokenKind::Eof) {
            self.parse_statement();
        }
        self.depth -= 1;
        if self.fatal {
            return;
        }
        self.expect(TokenKind::RBrace, "'}' to close block");
    }

    // -------------------------------------------------------
    // Union / difference shorthand: ( stmt; stmt; ... );
    // -------------------------------------------------------

    fn parse_union_shorthand(&mut self) {
        let open = self.current().span;
        if self.depth >= MAX_NESTING_DEPTH {
            self.error_here("Nesting too deep");
            self.fatal = true;
            return;
        }
        self.advance(); // '('
        self.depth += 1;
        let mut minus_count = 0usize;
        while !self.fatal && !matches!(self.kind(), TokenKind::RParen | TokenKind::Eof) {
            if self.at(TokenKind::Minus) {
                let minus = self.advance();
                minus_count += 1;
                if minus_count == 2 {
                    self.diagnostics
                        .error(minus.span, "Multiple difference operators in union block");
                }
                continue;
            }
            self.parse_statement();
        }
        self.depth -= 1;
        if self.fatal {
            return;
        }
        if self.at(TokenKind::Eof) {
            self.diagnostics
                .error(open, "Expected ')' to close union block");
            return;
        }
        self.advance(); // ')'
        self.parse_assignment_suffix();
        self.expect_statement_end();
    }

    // -------------------------------------------------------
    // Remaining statement forms.
    // -------------------------------------------------------

    /// `<`, `<<`, `>`, `>>` with optional `.input` and `-> .output`.
    fn parse_recursion_statement(&mut self) {
        self.advance();
        if self.at(TokenKind::Dot) {
            self.parse_set_name();
        }
        if matches!(self.kind(), TokenKind::LBracket | TokenKind::LParen) {
            self.error_here("Recursion operators may not carry filters");
            self.synchronize();
            return;
        }
        self.parse_assignment_suffix();
        self.expect_statement_end();
    }

    /// Statements led by a set reference: `.a;`, `.a out;`,
    /// `.a -> .b;`, or `.a` as a query source with filters.
    fn parse_set_statement(&mut self) {
        self.parse_set_name();
        match self.kind() {
            TokenKind::Semicolon => {
                self.advance();
            }
            TokenKind::Arrow => {
                self.parse_assignment_suffix();
                self.expect_statement_end();
            }
            TokenKind::LBracket | TokenKind::LParen | TokenKind::Template => {
                self.parse_filters();
                self.parse_assignment_suffix();
                self.expect_statement_end();
            }
            TokenKind::Identifier if self.keyword() == Some(Keyword::Out) => {
                self.parse_out_statement();
            }
            TokenKind::Identifier if self.keyword().is_some_and(Keyword::is_query_type) => {
                self.parse_query_statement();
            }
            _ => {
                let found = self.describe_current();
                self.error_here(format!("Expected ';' after set reference, got {found}"));
                self.synchronize();
            }
        }
    }

    /// A `{{...}}` placeholder standing alone. Turbo macro lines carry
    /// no ';', so the terminator is optional for the bare form.
    fn parse_template_statement(&mut self) {
        self.advance();
        if self.parse_assignment_suffix() {
            self.expect_statement_end();
        } else if self.at(TokenKind::Semicolon) {
            self.advance();
        }
    }

    // -------------------------------------------------------
    // Evaluator expressions.
    // -------------------------------------------------------

    /// Consume an evaluator expression by delimiter balance, ending
    /// just past the ')' matching the already-consumed opener.
    fn scan_balanced_to_rparen(&mut self, open: Span) {
        let mut depth = 1usize;
        loop {
            match self.kind() {
                TokenKind::Eof => {
                    self.diagnostics
                        .error(open, "Unbalanced expression: expected ')'");
                    return;
                }
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::RParen => {
                    depth -= 1;
                    self.advance();
                    if depth == 0 {
                        return;
                    }
                }
                TokenKind::RBracket | TokenKind::RBrace => {
                    if depth > 1 {
                        depth -= 1;
                    }
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }
    }
}

/// `YYYY-MM-DDTHH:MM:SSZ`, the only timestamp shape Overpass accepts.
fn is_iso_datetime(s: &str) -> bool {
    const PATTERN: &[u8] = b"dddd-dd-ddTdd:dd:ddZ";
    let bytes = s.as_bytes();
    bytes.len() == PATTERN.len()
        && bytes.iter().zip(PATTERN).all(|(&b, &p)| match p {
            b'd' => b.is_ascii_digit(),
            _ => b == p,
        })
}

/// The regex crate renders errors over several lines with a caret into
/// the pattern; keep the final summary line for a one-line diagnostic.
fn regex_error_summary(error: &regex::Error) -> String {
    error
        .to_string()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .next_back()
        .unwrap_or("invalid pattern")
        .trim()
        .trim_start_matches("error: ")
        .to_string()
}
