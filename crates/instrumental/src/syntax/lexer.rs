//! Tokenizer for the host language.
//!
//! Produces a flat token stream in which block structure is explicit:
//! `Newline` ends a logical line, `Indent`/`Dedent` open and close suites.
//! Lines inside brackets and lines ending in a backslash are joined with the
//! next physical line. Comments are dropped here; pragma scanning works on the
//! raw text instead.

use super::ParseError;

/// Operators and delimiters, longest first so that prefix matches lose.
const OPERATORS: &[&str] = &[
    "**=", "//=", "**", "//", "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=", "%=", "->", "+",
    "-", "*", "/", "%", "<", ">", "=", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";",
];

const TAB_WIDTH: usize = 8;

/// Token kinds
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier or keyword
    Name(String),
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal, escapes resolved
    Str(String),
    /// Operator or delimiter
    Op(&'static str),
    /// End of a logical line
    Newline,
    /// Start of an indented suite
    Indent,
    /// End of an indented suite
    Dedent,
    /// End of input
    EndOfFile,
}

/// A token with the physical line it starts on
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Token kind
    pub kind: TokenKind,
    /// 1-based line
    pub line: u32,
}

impl Token {
    /// Whether the token is the given keyword
    #[must_use]
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.kind, TokenKind::Name(name) if name == keyword)
    }

    /// Whether the token is the given operator
    #[must_use]
    pub fn is_op(&self, op: &str) -> bool {
        matches!(self.kind, TokenKind::Op(o) if o == op)
    }
}

/// Tokenizer over a whole source text
#[derive(Debug)]
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    paren_depth: usize,
    indents: Vec<usize>,
    at_line_start: bool,
    tokens: Vec<Token>,
}

impl Lexer {
    /// Create a lexer for the given source
    #[must_use]
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            paren_depth: 0,
            indents: vec![0],
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        while self.pos < self.chars.len() {
            if self.at_line_start && self.paren_depth == 0 {
                if self.handle_line_start()? {
                    continue;
                }
            }
            self.lex_one()?;
        }

        if self
            .tokens
            .last()
            .is_some_and(|t| t.kind != TokenKind::Newline)
        {
            self.push(TokenKind::Newline);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent);
        }
        self.push(TokenKind::EndOfFile);
        Ok(self.tokens)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, kind: TokenKind) {
        self.tokens.push(Token {
            kind,
            line: self.line,
        });
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.line, message)
    }

    /// Measure indentation of a fresh logical line.
    ///
    /// Returns `true` when the line was blank (or comment-only) and has been
    /// consumed entirely.
    fn handle_line_start(&mut self) -> Result<bool, ParseError> {
        let mut width = 0;
        while let Some(ch) = self.peek() {
            match ch {
                ' ' => width += 1,
                '\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
                '\x0c' => width = 0,
                _ => break,
            }
            self.pos += 1;
        }

        match self.peek() {
            None => return Ok(true),
            Some('#') => {
                self.skip_comment();
                self.consume_newline();
                return Ok(true);
            }
            Some('\n' | '\r') => {
                self.consume_newline();
                return Ok(true);
            }
            Some(_) => {}
        }

        self.at_line_start = false;
        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.push(TokenKind::Indent);
        } else if width < current {
            while self.indents.last().is_some_and(|&w| w > width) {
                self.indents.pop();
                self.push(TokenKind::Dedent);
            }
            if self.indents.last().copied() != Some(width) {
                return Err(self.error("unindent does not match any outer indentation level"));
            }
        }
        Ok(false)
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn consume_newline(&mut self) {
        if self.peek() == Some('\r') {
            self.pos += 1;
        }
        if self.peek() == Some('\n') {
            self.pos += 1;
            self.line += 1;
        }
    }

    fn lex_one(&mut self) -> Result<(), ParseError> {
        let Some(ch) = self.peek() else {
            return Ok(());
        };

        match ch {
            ' ' | '\t' | '\x0c' | '\r' => self.pos += 1,
            '#' => self.skip_comment(),
            '\\' if matches!(self.peek_at(1), Some('\n')) => {
                self.pos += 2;
                self.line += 1;
            }
            '\\' if matches!((self.peek_at(1), self.peek_at(2)), (Some('\r'), Some('\n'))) => {
                self.pos += 3;
                self.line += 1;
            }
            '\n' => {
                if self.paren_depth == 0 {
                    if self
                        .tokens
                        .last()
                        .is_some_and(|t| t.kind != TokenKind::Newline)
                    {
                        self.push(TokenKind::Newline);
                    }
                    self.at_line_start = true;
                }
                self.pos += 1;
                self.line += 1;
            }
            '0'..='9' => self.lex_number()?,
            '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.lex_number()?,
            '\'' | '"' => self.lex_string(false)?,
            c if c.is_alphabetic() || c == '_' => self.lex_name()?,
            _ => self.lex_operator()?,
        }
        Ok(())
    }

    fn lex_name(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();

        let is_prefix = matches!(
            name.to_ascii_lowercase().as_str(),
            "r" | "u" | "b" | "rb" | "br"
        );
        if is_prefix && matches!(self.peek(), Some('\'' | '"')) {
            let raw = name.to_ascii_lowercase().contains('r');
            return self.lex_string(raw);
        }

        self.push(TokenKind::Name(name));
        Ok(())
    }

    fn lex_number(&mut self) -> Result<(), ParseError> {
        let start = self.pos;

        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while self
                .peek()
                .is_some_and(|c| c.is_ascii_hexdigit() || c == '_')
            {
                self.pos += 1;
            }
            let digits: String = self.chars[digits_start..self.pos]
                .iter()
                .filter(|c| **c != '_')
                .collect();
            let value = i64::from_str_radix(&digits, 16)
                .map_err(|e| self.error(format!("invalid hex literal: {e}")))?;
            self.push(TokenKind::Int(value));
            return Ok(());
        }

        let mut is_float = false;
        while let Some(ch) = self.peek() {
            match ch {
                '0'..='9' | '_' => self.pos += 1,
                '.' if !is_float => {
                    is_float = true;
                    self.pos += 1;
                }
                'e' | 'E' => {
                    is_float = true;
                    self.pos += 1;
                    if matches!(self.peek(), Some('+' | '-')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }

        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        if is_float {
            let value = text
                .parse::<f64>()
                .map_err(|e| self.error(format!("invalid float literal '{text}': {e}")))?;
            self.push(TokenKind::Float(value));
        } else {
            let value = text
                .parse::<i64>()
                .map_err(|e| self.error(format!("invalid integer literal '{text}': {e}")))?;
            self.push(TokenKind::Int(value));
        }
        Ok(())
    }

    fn lex_string(&mut self, raw: bool) -> Result<(), ParseError> {
        let start_line = self.line;
        let Some(quote) = self.peek() else {
            return Err(self.error("expected string"));
        };
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut value = String::new();
        loop {
            let Some(ch) = self.peek() else {
                return Err(ParseError::new(start_line, "unterminated string literal"));
            };

            if ch == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
            }

            match ch {
                '\n' if !triple => {
                    return Err(ParseError::new(start_line, "unterminated string literal"));
                }
                '\n' => {
                    value.push('\n');
                    self.pos += 1;
                    self.line += 1;
                }
                '\\' => {
                    self.pos += 1;
                    let Some(escaped) = self.peek() else {
                        return Err(ParseError::new(start_line, "unterminated string literal"));
                    };
                    self.pos += 1;
                    if escaped == '\n' {
                        self.line += 1;
                        if raw {
                            value.push('\\');
                            value.push('\n');
                        }
                        continue;
                    }
                    if raw {
                        value.push('\\');
                        value.push(escaped);
                        continue;
                    }
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '0' => value.push('\0'),
                        '\\' => value.push('\\'),
                        '\'' => value.push('\''),
                        '"' => value.push('"'),
                        other => {
                            value.push('\\');
                            value.push(other);
                        }
                    }
                }
                _ => {
                    value.push(ch);
                    self.pos += 1;
                }
            }
        }

        self.tokens.push(Token {
            kind: TokenKind::Str(value),
            line: start_line,
        });
        Ok(())
    }

    fn lex_operator(&mut self) -> Result<(), ParseError> {
        for op in OPERATORS {
            let len = op.chars().count();
            let matches = op
                .chars()
                .enumerate()
                .all(|(i, c)| self.peek_at(i) == Some(c));
            if matches {
                match *op {
                    "(" | "[" | "{" => self.paren_depth += 1,
                    ")" | "]" | "}" => self.paren_depth = self.paren_depth.saturating_sub(1),
                    _ => {}
                }
                self.push(TokenKind::Op(op));
                self.pos += len;
                return Ok(());
            }
        }
        let ch = self.peek().unwrap_or(' ');
        Err(self.error(format!("unexpected character '{ch}'")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_indent_and_dedent() {
        let tokens = kinds("if a:\n    b\nc\n");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Name("if".into()),
                TokenKind::Name("a".into()),
                TokenKind::Op(":"),
                TokenKind::Newline,
                TokenKind::Indent,
                TokenKind::Name("b".into()),
                TokenKind::Newline,
                TokenKind::Dedent,
                TokenKind::Name("c".into()),
                TokenKind::Newline,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn test_blank_and_comment_lines_are_skipped() {
        let tokens = kinds("a = 1\n\n   # comment\nb = 2  # pragma: no cover\n");
        let newlines = tokens
            .iter()
            .filter(|t| **t == TokenKind::Newline)
            .count();
        assert_eq!(newlines, 2);
        assert!(!tokens.contains(&TokenKind::Indent));
    }

    #[test]
    fn test_implicit_line_joining_keeps_lines() {
        let tokens = Lexer::new("x = f(a,\n      b)\ny\n").tokenize().unwrap();
        let b = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Name("b".into()))
            .unwrap();
        assert_eq!(b.line, 2);
        let y = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Name("y".into()))
            .unwrap();
        assert_eq!(y.line, 3);
        assert!(!tokens.iter().any(|t| t.kind == TokenKind::Indent));
    }

    #[test]
    fn test_backslash_continuation() {
        let tokens = kinds("x = a and \\\n    b\n");
        assert!(!tokens.contains(&TokenKind::Indent));
        assert_eq!(
            tokens
                .iter()
                .filter(|t| **t == TokenKind::Newline)
                .count(),
            1
        );
    }

    #[test]
    fn test_triple_quoted_string_spans_lines() {
        let tokens = Lexer::new("'''a\nb'''\nc\n").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Str("a\nb".into()));
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[2].line, 3);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("12")[0], TokenKind::Int(12));
        assert_eq!(kinds("1_000")[0], TokenKind::Int(1000));
        assert_eq!(kinds("0x1f")[0], TokenKind::Int(31));
        assert_eq!(kinds("2.5")[0], TokenKind::Float(2.5));
        assert_eq!(kinds("1e3")[0], TokenKind::Float(1000.0));
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(kinds(r"'a\nb'")[0], TokenKind::Str("a\nb".into()));
        assert_eq!(kinds(r"r'a\nb'")[0], TokenKind::Str("a\\nb".into()));
    }

    #[test]
    fn test_longest_operator_wins() {
        assert_eq!(kinds("a //= 2")[1], TokenKind::Op("//="));
        assert_eq!(kinds("a ** 2")[1], TokenKind::Op("**"));
    }

    #[test]
    fn test_inconsistent_dedent_is_error() {
        let err = Lexer::new("if a:\n    b\n  c\n").tokenize().unwrap_err();
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_unterminated_string_is_error() {
        assert!(Lexer::new("'abc\n").tokenize().is_err());
    }
}
