use crate::diagnostics::Diagnostics;
use crate::token::{Span, Token, TokenKind};

/// Tokenize an OverpassQL source string.
///
/// The lexer is total: every input produces a token list ending in
/// exactly one `Eof`. Lex-level failures (unterminated strings,
/// comments, or template placeholders, unknown characters) are reported
/// through `diagnostics` and scanning continues.
pub fn tokenize(input: &str, diagnostics: &mut Diagnostics) -> Vec<Token> {
    Lexer::new(input).tokenize(diagnostics)
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn tokenize(mut self, diagnostics: &mut Diagnostics) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia(diagnostics);
            let Some(ch) = self.peek() else {
                tokens.push(Token::new(TokenKind::Eof, "", self.span()));
                return tokens;
            };
            let token = if ch == '"' || ch == '\'' {
                self.read_string(ch, diagnostics)
            } else if ch.is_ascii_digit() {
                self.read_number()
            } else if ch.is_ascii_alphabetic() || ch == '_' {
                self.read_identifier()
            } else if ch == '{' && self.peek_at(1) == Some('{') {
                self.read_template(diagnostics)
            } else {
                self.read_operator(ch, diagnostics)
            };
            tokens.push(token);
        }
    }

    const fn span(&self) -> Span {
        Span {
            line: self.line,
            column: self.col,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    /// Skip whitespace and both comment forms, updating position.
    fn skip_trivia(&mut self, diagnostics: &mut Diagnostics) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let start = self.span();
                    self.advance();
                    self.advance();
                    let mut closed = false;
                    while self.peek().is_some() {
                        if self.peek() == Some('*') && self.peek_at(1) == Some('/') {
                            self.advance();
                            self.advance();
                            closed = true;
                            break;
                        }
                        self.advance();
                    }
                    if !closed {
                        diagnostics.error(start, "Unterminated block comment");
                    }
                }
                _ => return,
            }
        }
    }

    /// Read a string literal delimited by `"` or `'`.
    ///
    /// Newlines are permitted inside the literal. At end of input the
    /// content collected so far still becomes a `String` token so the
    /// parser can keep going.
    fn read_string(&mut self, quote: char, diagnostics: &mut Diagnostics) -> Token {
        let start = self.span();
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                None => {
                    diagnostics.error(start, "Unterminated string literal");
                    break;
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    self.read_escape(&mut value, diagnostics);
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
        Token::new(TokenKind::String, value, start)
    }

    fn read_escape(&mut self, value: &mut String, diagnostics: &mut Diagnostics) {
        match self.peek() {
            None => value.push('\\'),
            Some('n') => {
                value.push('\n');
                self.advance();
            }
            Some('t') => {
                value.push('\t');
                self.advance();
            }
            Some('r') => {
                value.push('\r');
                self.advance();
            }
            Some('\\') => {
                value.push('\\');
                self.advance();
            }
            Some('"') => {
                value.push('"');
                self.advance();
            }
            Some('\'') => {
                value.push('\'');
                self.advance();
            }
            Some('u') => {
                let escape_span = self.span();
                self.advance();
                let mut digits = String::new();
                while digits.len() < 4 {
                    match self.peek() {
                        Some(c) if c.is_ascii_hexdigit() => {
                            digits.push(c);
                            self.advance();
                        }
                        _ => break,
                    }
                }
                if digits.len() == 4 {
                    // four hex digits always fit in a u32
                    let code = u32::from_str_radix(&digits, 16).unwrap_or(0);
                    match char::from_u32(code) {
                        Some(c) => value.push(c),
                        None => {
                            // surrogate halves stay verbatim
                            value.push_str("\\u");
                            value.push_str(&digits);
                        }
                    }
                } else {
                    diagnostics.error(escape_span, "Invalid unicode escape sequence");
                    value.push_str("\\u");
                    value.push_str(&digits);
                }
            }
            Some(c) => {
                // unknown escapes are preserved verbatim
                value.push('\\');
                value.push(c);
                self.advance();
            }
        }
    }

    /// `[0-9]+ ( '.' [0-9]+ )? ( [eE] [+-]? [0-9]+ )?`. A leading sign
    /// is not part of the number; the parser treats it as an operator.
    fn read_number(&mut self) -> Token {
        let start = self.span();
        let mut value = String::new();
        self.read_digits(&mut value);
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            value.push('.');
            self.advance();
            self.read_digits(&mut value);
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let exponent_follows = match self.peek_at(1) {
                Some(c) if c.is_ascii_digit() => true,
                Some('+' | '-') => self.peek_at(2).is_some_and(|c| c.is_ascii_digit()),
                _ => false,
            };
            if exponent_follows {
                if let Some(e) = self.advance() {
                    value.push(e);
                }
                if matches!(self.peek(), Some('+' | '-')) {
                    if let Some(sign) = self.advance() {
                        value.push(sign);
                    }
                }
                self.read_digits(&mut value);
            }
        }
        Token::new(TokenKind::Number, value, start)
    }

    fn read_digits(&mut self, value: &mut String) {
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                return;
            }
            value.push(c);
            self.advance();
        }
    }

    /// `[A-Za-z_][A-Za-z0-9_:]*`. A ':' joins the identifier only when
    /// it glues two name parts together, as in tag keys like
    /// `addr:city`; `timeout:25` and `changed:"..."` split at the colon.
    fn read_identifier(&mut self) -> Token {
        let start = self.span();
        let mut value = String::new();
        if let Some(first) = self.advance() {
            value.push(first);
        }
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_alphanumeric() || c == '_' => {
                    value.push(c);
                    self.advance();
                }
                Some(':')
                    if self
                        .peek_at(1)
                        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_') =>
                {
                    value.push(':');
                    self.advance();
                }
                _ => break,
            }
        }
        Token::new(TokenKind::Identifier, value, start)
    }

    /// `{{...}}` with nesting: inner `{{` raises the depth, `}}` lowers
    /// it. The whole span including the delimiters becomes one token.
    fn read_template(&mut self, diagnostics: &mut Diagnostics) -> Token {
        let start = self.span();
        let mut value = String::from("{{");
        self.advance();
        self.advance();
        let mut depth = 1usize;
        loop {
            match self.peek() {
                None => {
                    diagnostics.error(start, "Unterminated template placeholder");
                    break;
                }
                Some('{') if self.peek_at(1) == Some('{') => {
                    depth += 1;
                    value.push_str("{{");
                    self.advance();
                    self.advance();
                }
                Some('}') if self.peek_at(1) == Some('}') => {
                    depth -= 1;
                    value.push_str("}}");
                    self.advance();
                    self.advance();
                    if depth == 0 {
                        break;
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
        Token::new(TokenKind::Template, value, start)
    }

    /// Greedy two-character operators first, then single characters.
    fn read_operator(&mut self, ch: char, diagnostics: &mut Diagnostics) -> Token {
        let span = self.span();
        let (kind, len) = match (ch, self.peek_at(1)) {
            ('-', Some('>')) => (TokenKind::Arrow, 2),
            ('<', Some('<')) => (TokenKind::RecurseUpRel, 2),
            ('<', Some('=')) => (TokenKind::LessEqual, 2),
            ('>', Some('>')) => (TokenKind::RecurseDownRel, 2),
            ('>', Some('=')) => (TokenKind::GreaterEqual, 2),
            ('=', Some('=')) => (TokenKind::Equal, 2),
            ('!', Some('=')) => (TokenKind::NotEqual, 2),
            ('!', Some('~')) => (TokenKind::NotTilde, 2),
            ('[', _) => (TokenKind::LBracket, 1),
            (']', _) => (TokenKind::RBracket, 1),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            ('{', _) => (TokenKind::LBrace, 1),
            ('}', _) => (TokenKind::RBrace, 1),
            (';', _) => (TokenKind::Semicolon, 1),
            (',', _) => (TokenKind::Comma, 1),
            (':', _) => (TokenKind::Colon, 1),
            ('.', _) => (TokenKind::Dot, 1),
            ('=', _) => (TokenKind::Assign, 1),
            ('~', _) => (TokenKind::Tilde, 1),
            ('!', _) => (TokenKind::Bang, 1),
            ('<', _) => (TokenKind::RecurseUp, 1),
            ('>', _) => (TokenKind::RecurseDown, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('+', _) => (TokenKind::Plus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('/', _) => (TokenKind::Slash, 1),
            ('\\', _) => (TokenKind::Backslash, 1),
            _ => {
                diagnostics.error(span, format!("Unexpected character: '{ch}'"));
                self.advance();
                return Token::new(TokenKind::Error, ch.to_string(), span);
            }
        };
        let mut lexeme = String::new();
        for _ in 0..len {
            if let Some(c) = self.advance() {
                lexeme.push(c);
            }
        }
        Token::new(kind, lexeme, span)
    }
}
