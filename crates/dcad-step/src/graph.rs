//! Part 21 entity graph: raw records keyed by id, built token by token.
//!
//! The graph holds every record without interpreting its semantics; the
//! reader realizes geometry from it in a second phase, so forward
//! references cost nothing. Building is per-record recoverable: a record
//! that fails to lex or parse is skipped up to its terminating semicolon,
//! a warning is recorded, and ingestion continues with the next record.

use crate::error::StepError;
use crate::lexer::{Lexer, SpannedToken, Token};
use dcad_model::{CancelToken, Warnings};
use std::collections::HashMap;

/// Longest logical record accepted, in bytes.
pub const MAX_RECORD_BYTES: usize = 1024 * 1024;

/// A single argument value in a STEP record.
#[derive(Debug, Clone, PartialEq)]
pub enum StepValue {
    /// Entity reference (`#123`).
    EntityRef(u64),
    /// String literal.
    String(String),
    /// Real number.
    Real(f64),
    /// Integer number.
    Integer(i64),
    /// Enumeration (`.TRUE.`).
    Enum(String),
    /// List of values (nested in parentheses).
    List(Vec<StepValue>),
    /// Derived/computed value (`*`).
    Derived,
    /// Null/unset value (`$`).
    Null,
    /// Typed value: `TYPE_NAME(args)`, a part of a complex record.
    Typed {
        /// The part's type name.
        type_name: String,
        /// The part's arguments.
        args: Vec<StepValue>,
    },
}

impl StepValue {
    /// Try to get as an entity reference.
    pub fn as_entity_ref(&self) -> Option<u64> {
        match self {
            StepValue::EntityRef(id) => Some(*id),
            _ => None,
        }
    }

    /// Try to get as a real number (also accepts integer).
    pub fn as_real(&self) -> Option<f64> {
        match self {
            StepValue::Real(v) => Some(*v),
            StepValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Try to get as an integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            StepValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as a string.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            StepValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as an enum.
    pub fn as_enum(&self) -> Option<&str> {
        match self {
            StepValue::Enum(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as a list.
    pub fn as_list(&self) -> Option<&[StepValue]> {
        match self {
            StepValue::List(v) => Some(v),
            _ => None,
        }
    }

    /// Check if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, StepValue::Null)
    }
}

/// A raw STEP record from the DATA section.
#[derive(Debug, Clone)]
pub struct RawEntity {
    /// Entity ID (from `#123`).
    pub id: u64,
    /// Entity type name; `COMPLEX` for multi-type records.
    pub type_name: String,
    /// Arguments; for `COMPLEX` records every argument is a
    /// [`StepValue::Typed`] part.
    pub args: Vec<StepValue>,
}

impl RawEntity {
    /// For complex records, find the part with the given type name.
    pub fn complex_part(&self, type_name: &str) -> Option<&[StepValue]> {
        self.args.iter().find_map(|a| match a {
            StepValue::Typed { type_name: t, args } if t == type_name => Some(args.as_slice()),
            _ => None,
        })
    }

    /// True when this record is (or contains a part of) the given type.
    pub fn has_type(&self, type_name: &str) -> bool {
        self.type_name == type_name || self.complex_part(type_name).is_some()
    }
}

/// The parsed content of a STEP file: header records plus the DATA graph.
#[derive(Debug, Clone, Default)]
pub struct EntityGraph {
    /// Header section records (FILE_DESCRIPTION, FILE_NAME, FILE_SCHEMA).
    pub header: Vec<RawEntity>,
    /// Data section records, keyed by id.
    entities: HashMap<u64, RawEntity>,
    /// Ids in file order, for deterministic traversal.
    order: Vec<u64>,
}

impl EntityGraph {
    /// Get an entity by ID.
    pub fn get(&self, id: u64) -> Option<&RawEntity> {
        self.entities.get(&id)
    }

    /// Get an entity by ID, returning an error if not found.
    pub fn require(&self, id: u64) -> Result<&RawEntity, StepError> {
        self.entities.get(&id).ok_or(StepError::MissingEntity(id))
    }

    /// Number of DATA records.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when no DATA records were ingested.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// All entities in file order.
    pub fn iter_ordered(&self) -> impl Iterator<Item = &RawEntity> {
        self.order.iter().filter_map(|id| self.entities.get(id))
    }

    /// All entities of (or containing a complex part of) a type, in file order.
    pub fn of_type<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a RawEntity> {
        self.iter_ordered().filter(move |e| e.has_type(type_name))
    }

    /// The FILE_SCHEMA name from the header, if present.
    pub fn schema(&self) -> Option<&str> {
        self.header
            .iter()
            .find(|e| e.type_name == "FILE_SCHEMA")?
            .args
            .first()?
            .as_list()?
            .first()?
            .as_string()
    }

    /// Parse a whole buffer into a graph.
    ///
    /// Structural problems inside a single record are recoverable: the
    /// record is skipped and a warning recorded. Only I/O-level issues and
    /// cancellation abort the build.
    pub fn parse(
        input: &[u8],
        warnings: &mut Warnings,
        cancel: &CancelToken,
    ) -> Result<Self, StepError> {
        let mut builder = GraphBuilder {
            lexer: Lexer::new(input),
            lookahead: None,
            graph: EntityGraph::default(),
        };
        builder.parse_file(warnings, cancel)?;
        Ok(builder.graph)
    }
}

struct GraphBuilder<'a> {
    lexer: Lexer<'a>,
    lookahead: Option<SpannedToken>,
    graph: EntityGraph,
}

impl<'a> GraphBuilder<'a> {
    fn peek(&mut self) -> Result<Option<&SpannedToken>, StepError> {
        if self.lookahead.is_none() {
            self.lookahead = self.lexer.next_token()?;
        }
        Ok(self.lookahead.as_ref())
    }

    fn next(&mut self) -> Result<Option<SpannedToken>, StepError> {
        if let Some(t) = self.lookahead.take() {
            return Ok(Some(t));
        }
        self.lexer.next_token()
    }

    /// Consume the expected token, leaving an unexpected one in the
    /// lookahead so recovery sees it.
    fn expect(&mut self, expected: &Token) -> Result<(), StepError> {
        match self.peek()? {
            Some(t) if &t.token == expected => {
                self.next()?;
                Ok(())
            }
            other => {
                let got = other.map(|t| t.token.clone());
                Err(StepError::parser(
                    None,
                    format!("expected {expected:?}, got {got:?}"),
                ))
            }
        }
    }

    /// Resynchronize on the next record boundary. A semicolon still sitting
    /// in the lookahead already terminates the bad record; otherwise the
    /// raw byte stream is skipped past the next one.
    fn recover(&mut self) {
        if matches!(self.lookahead.as_ref().map(|t| &t.token), Some(Token::Semicolon)) {
            self.lookahead = None;
            return;
        }
        self.lookahead = None;
        self.lexer.skip_past_semicolon();
    }

    fn parse_file(
        &mut self,
        warnings: &mut Warnings,
        cancel: &CancelToken,
    ) -> Result<(), StepError> {
        self.expect_keyword("ISO-10303-21")?;
        self.expect(&Token::Semicolon)?;

        loop {
            if cancel.is_cancelled() {
                return Err(StepError::Cancelled);
            }
            let Some(tok) = self.peek()? else { break };
            match &tok.token {
                Token::Keyword(k) if k == "HEADER" => {
                    self.next()?;
                    self.expect(&Token::Semicolon)?;
                    self.parse_header_section(warnings)?;
                }
                Token::Keyword(k) if k == "DATA" => {
                    self.next()?;
                    self.expect(&Token::Semicolon)?;
                    self.parse_data_section(warnings, cancel)?;
                }
                Token::Keyword(k) if k == "END-ISO-10303-21" => {
                    self.next()?;
                    // Trailing semicolon is optional at end of input
                    let _ = self.next()?;
                    break;
                }
                other => {
                    warnings.push(format!("skipping unexpected token {other:?}"));
                    self.recover();
                }
            }
        }
        Ok(())
    }

    fn expect_keyword(&mut self, name: &str) -> Result<(), StepError> {
        match self.next()? {
            Some(SpannedToken {
                token: Token::Keyword(k),
                ..
            }) if k == name => Ok(()),
            other => Err(StepError::parser(
                None,
                format!("expected keyword '{name}', got {:?}", other.map(|t| t.token)),
            )),
        }
    }

    fn parse_header_section(&mut self, warnings: &mut Warnings) -> Result<(), StepError> {
        loop {
            let Some(tok) = self.peek()? else { break };
            match tok.token.clone() {
                Token::Keyword(k) if k == "ENDSEC" => {
                    self.next()?;
                    self.expect(&Token::Semicolon)?;
                    break;
                }
                Token::Keyword(type_name) => {
                    self.next()?;
                    match self.parse_args() {
                        Ok(args) => {
                            if let Err(e) = self.expect(&Token::Semicolon) {
                                warnings.push(format!("malformed header record: {e}"));
                                self.recover();
                                continue;
                            }
                            self.graph.header.push(RawEntity {
                                id: 0,
                                type_name,
                                args,
                            });
                        }
                        Err(e) => {
                            warnings.push(format!("malformed header record: {e}"));
                            self.recover();
                        }
                    }
                }
                other => {
                    warnings.push(format!("unexpected token in header: {other:?}"));
                    self.recover();
                }
            }
        }
        Ok(())
    }

    fn parse_data_section(
        &mut self,
        warnings: &mut Warnings,
        cancel: &CancelToken,
    ) -> Result<(), StepError> {
        loop {
            if cancel.is_cancelled() {
                return Err(StepError::Cancelled);
            }
            let Some(tok) = self.peek()? else { break };
            match tok.token.clone() {
                Token::Keyword(k) if k == "ENDSEC" => {
                    self.next()?;
                    self.expect(&Token::Semicolon)?;
                    break;
                }
                Token::EntityRef(id) => {
                    let start_offset = tok.offset;
                    let start_line = tok.pos.line;
                    match self.parse_record(id) {
                        Ok(entity) => {
                            let span = self.lexer.offset() - start_offset;
                            if span > MAX_RECORD_BYTES {
                                warnings.push(
                                    StepError::RecordTooLong {
                                        line: start_line,
                                        max_bytes: MAX_RECORD_BYTES,
                                    }
                                    .to_string(),
                                );
                                continue;
                            }
                            if self.graph.entities.insert(id, entity).is_none() {
                                self.graph.order.push(id);
                            } else {
                                warnings.push(format!("duplicate entity id #{id}"));
                            }
                        }
                        Err(e) => {
                            warnings.push(format!("skipping record #{id}: {e}"));
                            self.recover();
                        }
                    }
                }
                other => {
                    warnings.push(format!("unexpected token in data section: {other:?}"));
                    self.recover();
                }
            }
        }
        Ok(())
    }

    /// Parse `#id = TYPE(args);` or the complex form `#id = (T1(..) T2(..));`.
    fn parse_record(&mut self, id: u64) -> Result<RawEntity, StepError> {
        self.next()?; // consume the entity ref
        self.expect(&Token::Equals)?;

        match self.peek()?.map(|t| t.token.clone()) {
            Some(Token::Keyword(type_name)) => {
                self.next()?;
                let args = self.parse_args()?;
                self.expect(&Token::Semicolon)?;
                Ok(RawEntity {
                    id,
                    type_name,
                    args,
                })
            }
            Some(Token::LParen) => {
                self.next()?;
                // Complex record: whitespace-separated typed parts
                let mut parts = Vec::new();
                loop {
                    match self.peek()?.map(|t| t.token.clone()) {
                        Some(Token::RParen) => {
                            self.next()?;
                            break;
                        }
                        Some(Token::Keyword(part_name)) => {
                            self.next()?;
                            let args = self.parse_args()?;
                            parts.push(StepValue::Typed {
                                type_name: part_name,
                                args,
                            });
                        }
                        other => {
                            return Err(StepError::parser(
                                Some(id),
                                format!("unexpected token in complex record: {other:?}"),
                            ));
                        }
                    }
                }
                self.expect(&Token::Semicolon)?;
                Ok(RawEntity {
                    id,
                    type_name: "COMPLEX".into(),
                    args: parts,
                })
            }
            other => Err(StepError::parser(
                Some(id),
                format!("expected type name, got {other:?}"),
            )),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<StepValue>, StepError> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if matches!(self.peek()?.map(|t| &t.token), Some(Token::RParen)) {
            self.next()?;
            return Ok(args);
        }
        loop {
            args.push(self.parse_value()?);
            match self.peek()?.map(|t| t.token.clone()) {
                Some(Token::Comma) => {
                    self.next()?;
                }
                Some(Token::RParen) => {
                    self.next()?;
                    break;
                }
                other => {
                    return Err(StepError::parser(
                        None,
                        format!("expected ',' or ')', got {other:?}"),
                    ));
                }
            }
        }
        Ok(args)
    }

    fn parse_value(&mut self) -> Result<StepValue, StepError> {
        let token = match self.peek()? {
            Some(t) => t.token.clone(),
            None => return Err(StepError::parser(None, "unexpected end of input")),
        };
        match token {
            Token::EntityRef(id) => {
                self.next()?;
                Ok(StepValue::EntityRef(id))
            }
            Token::String(s) => {
                self.next()?;
                Ok(StepValue::String(s))
            }
            Token::Real(v) => {
                self.next()?;
                Ok(StepValue::Real(v))
            }
            Token::Integer(v) => {
                self.next()?;
                Ok(StepValue::Integer(v))
            }
            Token::Enum(s) => {
                self.next()?;
                Ok(StepValue::Enum(s))
            }
            Token::Asterisk => {
                self.next()?;
                Ok(StepValue::Derived)
            }
            Token::Dollar => {
                self.next()?;
                Ok(StepValue::Null)
            }
            Token::LParen => {
                self.next()?;
                let mut list = Vec::new();
                if matches!(self.peek()?.map(|t| &t.token), Some(Token::RParen)) {
                    self.next()?;
                    return Ok(StepValue::List(list));
                }
                loop {
                    list.push(self.parse_value()?);
                    match self.peek()?.map(|t| t.token.clone()) {
                        Some(Token::Comma) => {
                            self.next()?;
                        }
                        Some(Token::RParen) => {
                            self.next()?;
                            break;
                        }
                        other => {
                            return Err(StepError::parser(
                                None,
                                format!("expected ',' or ')' in list, got {other:?}"),
                            ));
                        }
                    }
                }
                Ok(StepValue::List(list))
            }
            Token::Keyword(type_name) => {
                // Inline typed value: TYPE_NAME(args)
                self.next()?;
                let args = self.parse_args()?;
                Ok(StepValue::Typed { type_name, args })
            }
            other => Err(StepError::parser(
                None,
                format!("unexpected value token: {other:?}"),
            )),
        }
    }
}
