//! # Placeholder scanner
//!
//! Splits prompt text into literal runs and `{name}` placeholders. A name is
//! any non-empty run without braces, so `{first name}` and `{user:id}` are
//! placeholders too. Any brace that does not open one is kept as literal
//! text, so scanning never fails on real input.
//!
//! Whether a placeholder looks like a declared variable is a separate question,
//! answered by [`is_identifier`].

use nom::branch::alt;
use nom::bytes::complete::{tag, take_till1};
use nom::character::complete::char;
use nom::combinator::{all_consuming, map};
use nom::multi::many0;
use nom::sequence::delimited;
use nom::IResult;
use nom::Parser;

#[derive(Debug, Clone, PartialEq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

pub fn parse_segments(input: &str) -> IResult<&str, Vec<Segment<'_>>> {
    all_consuming(many0(parse_segment)).parse(input)
}

pub fn parse_segment(input: &str) -> IResult<&str, Segment<'_>> {
    alt((
        map(parse_placeholder, Segment::Placeholder),
        map(parse_literal_text, Segment::Literal),
        map(tag("{"), Segment::Literal),
    ))
    .parse(input)
}

pub fn parse_literal_text(input: &str) -> IResult<&str, &str> {
    take_till1(|c: char| c == '{').parse(input)
}

pub fn parse_placeholder(input: &str) -> IResult<&str, &str> {
    delimited(char('{'), placeholder_name, char('}')).parse(input)
}

fn placeholder_name(input: &str) -> IResult<&str, &str> {
    take_till1(|c: char| c == '{' || c == '}').parse(input)
}

/// Whether `name` is a variable-style name: letters, digits, `_`, `-` and `.`
/// (for namespaced names like `user.name`).
///
/// JSON fragments such as `{"label": "x"}` scan as placeholders but are not
/// identifiers, so the validator and missing-value warnings ignore them.
pub fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
}

/// Scans `input` into segments.
///
/// Falls back to a single literal segment if the grammar ever rejects the
/// input, so callers can always reassemble the original text.
pub fn scan(input: &str) -> Vec<Segment<'_>> {
    match parse_segments(input) {
        Ok((_, segments)) => segments,
        Err(_) => vec![Segment::Literal(input)],
    }
}
