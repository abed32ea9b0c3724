//! Source text to AST nodes.
//!
//! ```text
//! (f a b)        call
//! [1 2.5 "s"]    vec
//! {"k" v}        map (alternating keys and values)
//! ; comment      to end of line
//! ```
//!
//! Commas count as whitespace. A token that is not an integer or a float is an
//! identifier, so operator names such as `+`, `>=` or `empty?` need no special
//! treatment.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace1, not_line_ending},
    combinator::{recognize, value},
    error::ErrorKind,
    multi::many0,
    sequence::pair,
};
use std::rc::Rc;

use crate::ast::{Location, Node, NodeKind};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Why a read failed, before it is turned into a [`ParseError`].
#[derive(Debug, Clone, Copy, PartialEq)]
enum ReadErrorKind {
    Nom(ErrorKind),
    /// A collection was not closed by the expected delimiter
    Unclosed(char),
    TooDeep,
    EmptyCall,
    OddMap,
    BadEscape,
    UnterminatedString,
    IntegerOutOfRange,
}

#[derive(Debug, Clone, PartialEq)]
struct ReadError<'s> {
    input: &'s str,
    kind: ReadErrorKind,
}

impl<'s> nom::error::ParseError<&'s str> for ReadError<'s> {
    fn from_error_kind(input: &'s str, kind: ErrorKind) -> Self {
        ReadError {
            input,
            kind: ReadErrorKind::Nom(kind),
        }
    }

    fn append(_input: &'s str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

type ReadResult<'s, O> = IResult<&'s str, O, ReadError<'s>>;

fn failure(input: &str, kind: ReadErrorKind) -> nom::Err<ReadError<'_>> {
    nom::Err::Failure(ReadError { input, kind })
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, ',' | '(' | ')' | '[' | ']' | '{' | '}' | '"' | ';')
}

/// Whitespace, commas and comments
fn skip_trivia(input: &str) -> ReadResult<'_, ()> {
    value(
        (),
        many0(alt((
            multispace1,
            tag(","),
            recognize(pair(char(';'), not_line_ending)),
        ))),
    )
    .parse(input)
}

/// Classify an atom token. Numeric-looking tokens that are not valid numbers
/// fall back to identifiers.
fn classify_atom(token: &str) -> Result<NodeKind, ReadErrorKind> {
    let unsigned = token.strip_prefix(['-', '+']).unwrap_or(token);
    let starts_with_digit = |s: &str| s.starts_with(|c: char| c.is_ascii_digit());
    let numeric = starts_with_digit(unsigned)
        || unsigned
            .strip_prefix('.')
            .is_some_and(|rest| starts_with_digit(rest));

    if !numeric {
        return Ok(NodeKind::Identifier(token.to_owned()));
    }
    if unsigned.bytes().all(|b| b.is_ascii_digit()) {
        return token
            .parse::<i64>()
            .map(NodeKind::Int)
            .map_err(|_| ReadErrorKind::IntegerOutOfRange);
    }
    Ok(token.parse::<f64>().map_or_else(
        |_| NodeKind::Identifier(token.to_owned()),
        NodeKind::Float,
    ))
}

struct Reader<'s> {
    source: &'s str,
    /// Byte offset of the first character of every line
    line_starts: Vec<usize>,
}

impl<'s> Reader<'s> {
    fn new(source: &'s str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Reader {
            source,
            line_starts,
        }
    }

    /// Location of `rest`, a suffix of the source.
    fn location(&self, rest: &str) -> Location {
        let offset = self.source.len().saturating_sub(rest.len());
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let line_start = self
            .line_starts
            .get(line.saturating_sub(1))
            .copied()
            .unwrap_or(0);
        let column = self
            .source
            .get(line_start..offset)
            .map_or(0, |text| text.chars().count());
        Location::new(line.max(1), column)
    }

    fn form(&self, input: &'s str, depth: usize) -> ReadResult<'s, Node> {
        if depth >= MAX_PARSE_DEPTH {
            return Err(failure(input, ReadErrorKind::TooDeep));
        }
        alt((
            |i: &'s str| self.call(i, depth),
            |i: &'s str| self.vector(i, depth),
            |i: &'s str| self.map(i, depth),
            |i: &'s str| self.string(i),
            |i: &'s str| self.atom(i),
        ))
        .parse(input)
    }

    /// Forms between `open` and `close`.
    fn delimited(
        &self,
        input: &'s str,
        open: char,
        close: char,
        depth: usize,
    ) -> ReadResult<'s, Vec<Rc<Node>>> {
        let (input, _) = char(open).parse(input)?;
        let (input, children) = many0(|i: &'s str| {
            let (i, ()) = skip_trivia(i)?;
            self.form(i, depth + 1)
        })
        .parse(input)?;
        let (input, ()) = skip_trivia(input)?;
        let (input, _) = char(close)
            .parse(input)
            .map_err(|_: nom::Err<ReadError<'s>>| failure(input, ReadErrorKind::Unclosed(close)))?;
        Ok((input, children.into_iter().map(Rc::new).collect()))
    }

    fn call(&self, input: &'s str, depth: usize) -> ReadResult<'s, Node> {
        let location = self.location(input);
        let (rest, mut children) = self.delimited(input, '(', ')', depth)?;
        if children.is_empty() {
            return Err(failure(input, ReadErrorKind::EmptyCall));
        }
        let callee = children.remove(0);
        let kind = NodeKind::Call {
            callee,
            args: children,
        };
        Ok((rest, Node::new(kind, location)))
    }

    fn vector(&self, input: &'s str, depth: usize) -> ReadResult<'s, Node> {
        let location = self.location(input);
        let (rest, children) = self.delimited(input, '[', ']', depth)?;
        Ok((rest, Node::new(NodeKind::Vec(children), location)))
    }

    fn map(&self, input: &'s str, depth: usize) -> ReadResult<'s, Node> {
        let location = self.location(input);
        let (rest, children) = self.delimited(input, '{', '}', depth)?;
        if children.len() % 2 != 0 {
            return Err(failure(input, ReadErrorKind::OddMap));
        }
        Ok((rest, Node::new(NodeKind::Map(children), location)))
    }

    fn string(&self, input: &'s str) -> ReadResult<'s, Node> {
        let location = self.location(input);
        let (mut remaining, _) = char('"').parse(input)?;
        let mut text = String::new();

        loop {
            let mut chars = remaining.chars();
            match chars.next() {
                Some('"') => {
                    return Ok((chars.as_str(), Node::new(NodeKind::String(text), location)));
                }
                Some('\\') => {
                    match chars.next() {
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some('r') => text.push('\r'),
                        Some('\\') => text.push('\\'),
                        Some('"') => text.push('"'),
                        Some(_) => return Err(failure(remaining, ReadErrorKind::BadEscape)),
                        None => return Err(failure(input, ReadErrorKind::UnterminatedString)),
                    }
                    remaining = chars.as_str();
                }
                Some(ch) => {
                    text.push(ch);
                    remaining = chars.as_str();
                }
                None => return Err(failure(input, ReadErrorKind::UnterminatedString)),
            }
        }
    }

    fn atom(&self, input: &'s str) -> ReadResult<'s, Node> {
        let location = self.location(input);
        let (rest, token) = take_while1(|c: char| !is_delimiter(c)).parse(input)?;
        let kind = classify_atom(token).map_err(|kind| failure(input, kind))?;
        Ok((rest, Node::new(kind, location)))
    }

    fn to_error(&self, err: nom::Err<ReadError<'_>>) -> Error {
        let (input, read_kind) = match err {
            nom::Err::Error(e) | nom::Err::Failure(e) => (e.input, e.kind),
            nom::Err::Incomplete(_) => ("", ReadErrorKind::Nom(ErrorKind::Eof)),
        };
        let location = self.location(input);
        let found = input.chars().next();

        use ParseErrorKind::{Incomplete, InvalidSyntax};
        let (kind, message) = match (read_kind, found) {
            (ReadErrorKind::TooDeep, _) => (
                ParseErrorKind::TooDeeplyNested,
                format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
            ),
            (ReadErrorKind::IntegerOutOfRange, _) => (
                ParseErrorKind::ImplementationLimit,
                "Integer literal out of range".to_owned(),
            ),
            (ReadErrorKind::EmptyCall, _) => (InvalidSyntax, "Empty call ()".to_owned()),
            (ReadErrorKind::OddMap, _) => (
                InvalidSyntax,
                "Map literal needs key/value pairs".to_owned(),
            ),
            (ReadErrorKind::BadEscape, _) => (
                InvalidSyntax,
                "Unknown escape sequence in string".to_owned(),
            ),
            (ReadErrorKind::UnterminatedString, _) => {
                (Incomplete, "Unterminated string".to_owned())
            }
            (ReadErrorKind::Unclosed(close), None) => (
                Incomplete,
                format!("Unexpected end of input, expected '{close}'"),
            ),
            (ReadErrorKind::Unclosed(close), Some(c)) => {
                (InvalidSyntax, format!("Expected '{close}', found '{c}'"))
            }
            (ReadErrorKind::Nom(_), None) => (Incomplete, "Unexpected end of input".to_owned()),
            (ReadErrorKind::Nom(_), Some(c @ (')' | ']' | '}'))) => {
                (InvalidSyntax, format!("Unexpected '{c}'"))
            }
            (ReadErrorKind::Nom(_), Some(_)) => {
                let near: String = input.chars().take(10).collect();
                (InvalidSyntax, format!("Invalid syntax near '{near}'"))
            }
        };
        ParseError::new(kind, message, location, found).into()
    }
}

/// Read every top-level form in `source`.
pub fn read(source: &str) -> Result<Vec<Node>, Error> {
    let reader = Reader::new(source);
    let mut forms = Vec::new();
    let mut input = source;
    loop {
        let (rest, ()) = skip_trivia(input).map_err(|e| reader.to_error(e))?;
        if rest.is_empty() {
            return Ok(forms);
        }
        let (rest, node) = reader.form(rest, 0).map_err(|e| reader.to_error(e))?;
        forms.push(node);
        input = rest;
    }
}
