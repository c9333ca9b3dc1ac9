//! Part 21 (STEP physical file format) lexer.
//!
//! Tokenizes STEP files according to ISO 10303-21:
//! - Keywords (`CARTESIAN_POINT`, `DATA`, `ENDSEC`)
//! - Entity references (`#123`)
//! - Strings (`'it''s'` with doubled-quote escape)
//! - Reals, including Fortran `D`-exponent forms (`1.25D-3`)
//! - Integers
//! - Enumerations (`.TRUE.`)
//! - Punctuation (parentheses, comma, semicolon, equals, asterisk, dollar)
//!
//! Input is untrusted: the lexer is strictly linear in input length and
//! offers byte-level recovery (`skip_past_semicolon`) so the graph builder
//! can drop a malformed record and keep going.

use crate::error::StepError;

/// A token in a STEP file.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Keyword or identifier (e.g. `CARTESIAN_POINT`, `DATA`).
    Keyword(String),
    /// Entity reference (`#123` becomes `EntityRef(123)`).
    EntityRef(u64),
    /// String literal (contents without quotes, escapes resolved).
    String(String),
    /// Real number.
    Real(f64),
    /// Integer number.
    Integer(i64),
    /// Enumeration (`.TRUE.` becomes `Enum("TRUE")`).
    Enum(String),
    /// Left parenthesis `(`.
    LParen,
    /// Right parenthesis `)`.
    RParen,
    /// Comma `,`.
    Comma,
    /// Semicolon `;`.
    Semicolon,
    /// Equals `=`.
    Equals,
    /// Asterisk `*` (derived value marker).
    Asterisk,
    /// Dollar `$` (null/unset value marker).
    Dollar,
}

/// Position in the source file.
#[derive(Debug, Clone, Copy, Default)]
pub struct Position {
    /// Line number (1-indexed).
    pub line: usize,
    /// Column number (1-indexed).
    pub col: usize,
}

/// A token with its position and byte offset in the source.
#[derive(Debug, Clone)]
pub struct SpannedToken {
    /// The token.
    pub token: Token,
    /// Position where the token starts.
    pub pos: Position,
    /// Byte offset where the token starts.
    pub offset: usize,
}

/// Streaming lexer for Part 21 STEP files.
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given input.
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    /// Current byte offset into the input.
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Current line number.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Skip raw bytes until just past the next `;` outside any quoted
    /// string. Recovery entry point after a malformed record.
    pub fn skip_past_semicolon(&mut self) {
        let mut in_string = false;
        while let Some(ch) = self.peek_char() {
            self.advance();
            match ch {
                b'\'' => in_string = !in_string,
                b';' if !in_string => return,
                _ => {}
            }
        }
    }

    /// Get the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Result<Option<SpannedToken>, StepError> {
        self.skip_whitespace_and_comments();

        if self.pos >= self.input.len() {
            return Ok(None);
        }

        let start_pos = Position {
            line: self.line,
            col: self.col,
        };
        let start_offset = self.pos;

        let ch = self.input[self.pos];

        let token = match ch {
            b'(' => {
                self.advance();
                Token::LParen
            }
            b')' => {
                self.advance();
                Token::RParen
            }
            b',' => {
                self.advance();
                Token::Comma
            }
            b';' => {
                self.advance();
                Token::Semicolon
            }
            b'=' => {
                self.advance();
                Token::Equals
            }
            b'*' => {
                self.advance();
                Token::Asterisk
            }
            b'$' => {
                self.advance();
                Token::Dollar
            }
            b'#' => self.read_entity_ref()?,
            b'\'' => self.read_string()?,
            b'.' => self.read_enum()?,
            b'-' | b'+' => {
                if self.pos + 1 < self.input.len() && self.input[self.pos + 1].is_ascii_digit() {
                    self.read_number()?
                } else {
                    return Err(StepError::lexer(
                        self.line,
                        self.col,
                        format!("unexpected character: '{}'", ch as char),
                    ));
                }
            }
            b'0'..=b'9' => self.read_number()?,
            b'A'..=b'Z' | b'a'..=b'z' | b'_' => self.read_keyword()?,
            _ => {
                return Err(StepError::lexer(
                    self.line,
                    self.col,
                    format!("unexpected character: '{}'", ch as char),
                ));
            }
        };

        Ok(Some(SpannedToken {
            token,
            pos: start_pos,
            offset: start_offset,
        }))
    }

    fn peek_char(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.input.get(self.pos).copied()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while let Some(ch) = self.peek_char() {
                if ch.is_ascii_whitespace() {
                    self.advance();
                } else {
                    break;
                }
            }

            // Comment: /* ... */
            if self.pos + 1 < self.input.len()
                && self.input[self.pos] == b'/'
                && self.input[self.pos + 1] == b'*'
            {
                self.advance();
                self.advance();
                while self.pos + 1 < self.input.len() {
                    if self.input[self.pos] == b'*' && self.input[self.pos + 1] == b'/' {
                        self.advance();
                        self.advance();
                        break;
                    }
                    self.advance();
                }
                continue;
            }

            break;
        }
    }

    fn read_entity_ref(&mut self) -> Result<Token, StepError> {
        let start_line = self.line;
        let start_col = self.col;
        self.advance(); // skip '#'

        let mut digits = Vec::new();
        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if digits.is_empty() {
            return Err(StepError::lexer(
                start_line,
                start_col,
                "expected digits after '#'",
            ));
        }

        let s = String::from_utf8_lossy(&digits).into_owned();
        let id: u64 = s.parse().map_err(|_| {
            StepError::lexer(start_line, start_col, format!("invalid entity ID: {s}"))
        })?;

        Ok(Token::EntityRef(id))
    }

    fn read_string(&mut self) -> Result<Token, StepError> {
        let start_line = self.line;
        let start_col = self.col;
        self.advance(); // skip opening quote

        let mut content = Vec::new();
        loop {
            match self.peek_char() {
                None => {
                    return Err(StepError::lexer(
                        start_line,
                        start_col,
                        "unterminated string",
                    ));
                }
                Some(b'\'') => {
                    self.advance();
                    // Doubled quote is an escaped quote
                    if self.peek_char() == Some(b'\'') {
                        content.push(b'\'');
                        self.advance();
                    } else {
                        break;
                    }
                }
                Some(b'\\') => {
                    self.advance();
                    // \\ collapses to a single backslash
                    if self.peek_char() == Some(b'\\') {
                        self.advance();
                    }
                    content.push(b'\\');
                }
                Some(ch) => {
                    content.push(ch);
                    self.advance();
                }
            }
        }

        Ok(Token::String(String::from_utf8_lossy(&content).into_owned()))
    }

    fn read_enum(&mut self) -> Result<Token, StepError> {
        let start_line = self.line;
        let start_col = self.col;
        self.advance(); // skip opening '.'

        let mut name = Vec::new();
        loop {
            match self.peek_char() {
                Some(b'.') => {
                    self.advance();
                    break;
                }
                Some(ch) if ch.is_ascii_alphanumeric() || ch == b'_' => {
                    name.push(ch);
                    self.advance();
                }
                _ => {
                    return Err(StepError::lexer(
                        start_line,
                        start_col,
                        "unterminated enumeration",
                    ));
                }
            }
        }

        if name.is_empty() {
            return Err(StepError::lexer(start_line, start_col, "empty enumeration"));
        }

        Ok(Token::Enum(String::from_utf8_lossy(&name).into_owned()))
    }

    fn read_number(&mut self) -> Result<Token, StepError> {
        let start_line = self.line;
        let start_col = self.col;

        let mut num_str = Vec::new();
        let mut is_real = false;

        if let Some(ch @ (b'-' | b'+')) = self.peek_char() {
            num_str.push(ch);
            self.advance();
        }

        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_digit() {
                num_str.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        // Decimal part; a bare trailing '.' (as in "0.") is legal
        if self.peek_char() == Some(b'.') {
            let next = self.input.get(self.pos + 1).copied();
            let digit_follows = next.map(|c| c.is_ascii_digit()).unwrap_or(false);
            let enum_follows = next
                .map(|c| c.is_ascii_alphabetic() && !matches!(c, b'D' | b'd' | b'E' | b'e'))
                .unwrap_or(false);
            if !enum_follows {
                is_real = true;
                num_str.push(b'.');
                self.advance();
                if digit_follows {
                    while let Some(ch) = self.peek_char() {
                        if ch.is_ascii_digit() {
                            num_str.push(ch);
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
            }
        }

        // Exponent: E or Fortran D, normalized to E before conversion
        if let Some(b'E' | b'e' | b'D' | b'd') = self.peek_char() {
            let exp_digit_follows = {
                let mut i = self.pos + 1;
                if matches!(self.input.get(i), Some(b'-' | b'+')) {
                    i += 1;
                }
                self.input.get(i).map(|c| c.is_ascii_digit()).unwrap_or(false)
            };
            if exp_digit_follows {
                is_real = true;
                num_str.push(b'E');
                self.advance();
                if let Some(ch @ (b'-' | b'+')) = self.peek_char() {
                    num_str.push(ch);
                    self.advance();
                }
                while let Some(ch) = self.peek_char() {
                    if ch.is_ascii_digit() {
                        num_str.push(ch);
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
        }

        let mut s = String::from_utf8_lossy(&num_str).into_owned();

        if is_real {
            // "1.E5" and "1." parse after padding the bare fraction
            if s.ends_with('.') {
                s.push('0');
            }
            if let Some(dot) = s.find('.') {
                if s.as_bytes().get(dot + 1).map(|c| !c.is_ascii_digit()).unwrap_or(false) {
                    s.insert(dot + 1, '0');
                }
            }
            let val: f64 = s.parse().map_err(|_| {
                StepError::lexer(start_line, start_col, format!("invalid real number: {s}"))
            })?;
            Ok(Token::Real(val))
        } else {
            let val: i64 = s.parse().map_err(|_| {
                StepError::lexer(start_line, start_col, format!("invalid integer: {s}"))
            })?;
            Ok(Token::Integer(val))
        }
    }

    fn read_keyword(&mut self) -> Result<Token, StepError> {
        let mut name = Vec::new();
        while let Some(ch) = self.peek_char() {
            // Hyphens appear in identifiers like ISO-10303-21
            if ch.is_ascii_alphanumeric() || ch == b'_' || ch == b'-' {
                name.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        let s = String::from_utf8_lossy(&name).to_uppercase();
        Ok(Token::Keyword(s))
    }
}
