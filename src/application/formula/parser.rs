//! Recursive-descent parser for `@name(arg, ...)` calls embedded in text.
//!
//! Arguments are one of:
//! - a bare run of characters, trimmed, which may contain nested calls and
//!   balanced parentheses;
//! - a `'...'` literal, taken verbatim;
//! - a `#...#` literal, taken verbatim.
//!
//! `@word` not followed by `(` is plain text.

use std::ops::Range;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("call `@{name}` opened at byte {offset} is never closed")]
    UnclosedCall { name: String, offset: usize },
    #[error("literal opened with `{delimiter}` at byte {offset} is never closed")]
    UnterminatedLiteral { delimiter: char, offset: usize },
    #[error("unexpected `{found}` after literal at byte {offset}")]
    TrailingAfterLiteral { found: char, offset: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Literal(String),
    Call(Call),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Name as written; lookups are case-insensitive.
    pub name: String,
    pub args: Vec<Arg>,
    /// Byte range of the whole call in its source.
    pub span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Quoted(String),
    Bare(Vec<Node>),
}

/// Whether `nodes` contain at least one call.
pub fn has_calls(nodes: &[Node]) -> bool {
    nodes.iter().any(|node| matches!(node, Node::Call(_)))
}

pub fn parse(source: &str) -> Result<Vec<Node>, ParseError> {
    let mut parser = Parser {
        source,
        bytes: source.as_bytes(),
        pos: 0,
    };
    parser.text(Context::Top)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Top,
    Argument,
}

struct Parser<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    /// Parse text until end of input or, inside an argument, an unnested
    /// `,` or `)`.
    fn text(&mut self, context: Context) -> Result<Vec<Node>, ParseError> {
        let mut nodes = Vec::new();
        let mut literal_start = self.pos;
        let mut depth = 0usize;

        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'@' => {
                    if let Some(name_end) = self.call_head() {
                        push_literal(&mut nodes, &self.source[literal_start..self.pos]);
                        let call = self.call(name_end)?;
                        nodes.push(Node::Call(call));
                        literal_start = self.pos;
                        continue;
                    }
                }
                b'(' if context == Context::Argument => depth += 1,
                b')' if context == Context::Argument => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                b',' if context == Context::Argument && depth == 0 => break,
                _ => {}
            }
            self.pos += 1;
        }

        push_literal(&mut nodes, &self.source[literal_start..self.pos]);
        Ok(nodes)
    }

    /// If `pos` starts `@word(`, return the end of `word`.
    fn call_head(&self) -> Option<usize> {
        let start = self.pos + 1;
        let mut end = start;
        while end < self.bytes.len() && is_name_byte(self.bytes[end]) {
            end += 1;
        }
        (end > start && self.bytes.get(end) == Some(&b'(')).then_some(end)
    }

    fn call(&mut self, name_end: usize) -> Result<Call, ParseError> {
        let start = self.pos;
        let name = self.source[start + 1..name_end].to_string();
        self.pos = name_end + 1;

        let mut args = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(b')') {
            self.pos += 1;
            return Ok(Call {
                name,
                args,
                span: start..self.pos,
            });
        }

        loop {
            args.push(self.argument()?);
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b')') => {
                    self.pos += 1;
                    return Ok(Call {
                        name,
                        args,
                        span: start..self.pos,
                    });
                }
                _ => {
                    return Err(ParseError::UnclosedCall {
                        name,
                        offset: start,
                    });
                }
            }
        }
    }

    fn argument(&mut self) -> Result<Arg, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(delimiter @ (b'\'' | b'#')) => {
                let open = self.pos;
                let body_start = open + 1;
                let Some(len) = self.bytes[body_start..]
                    .iter()
                    .position(|&byte| byte == delimiter)
                else {
                    return Err(ParseError::UnterminatedLiteral {
                        delimiter: char::from(delimiter),
                        offset: open,
                    });
                };
                let body = self.source[body_start..body_start + len].to_string();
                self.pos = body_start + len + 1;
                self.skip_whitespace();
                match self.peek() {
                    None | Some(b',') | Some(b')') => Ok(Arg::Quoted(body)),
                    Some(_) => Err(ParseError::TrailingAfterLiteral {
                        found: self.source[self.pos..].chars().next().unwrap_or_default(),
                        offset: self.pos,
                    }),
                }
            }
            _ => {
                let mut nodes = self.text(Context::Argument)?;
                trim_nodes(&mut nodes);
                Ok(Arg::Bare(nodes))
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|byte| byte.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }
}

fn is_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

fn push_literal(nodes: &mut Vec<Node>, text: &str) {
    if !text.is_empty() {
        nodes.push(Node::Literal(text.to_string()));
    }
}

/// Trim surrounding whitespace of a bare argument.
fn trim_nodes(nodes: &mut Vec<Node>) {
    if let Some(Node::Literal(first)) = nodes.first_mut() {
        *first = first.trim_start().to_string();
    }
    if let Some(Node::Literal(last)) = nodes.last_mut() {
        *last = last.trim_end().to_string();
    }
    nodes.retain(|node| !matches!(node, Node::Literal(text) if text.is_empty()));
}
