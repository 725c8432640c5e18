//! Parser for plain-text task documents of the form
//!
//! ```text
//! initialization
//! routine: NonProbabilisticFit
//! solver: BDF
//! rtol: 1e-6 atol: 1e-9
//! ```
//!
//! A document is a sequence of sections; a section is a title followed by one or
//! more `key: value, value, ...` pairs. Lines starting with `//`, `#`, `%` or `;`
//! are comments.
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{alpha1, alphanumeric1, multispace0, space0},
    combinator::{map, recognize},
    multi::{many0, many1, separated_list1},
    sequence::{delimited, pair, separated_pair, terminated},
};
use std::collections::HashMap;
use std::fmt::Display;

pub type SectionMap = HashMap<String, Vec<Value>>;
pub type DocumentMap = HashMap<String, SectionMap>;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Float(f64),
    Integer(i64),
    Boolean(bool),
}

impl Value {
    pub fn as_string(&self) -> Option<&str> {
        if let Value::String(s) = self { Some(s) } else { None }
    }

    /// Integers are widened, so `rtol: 1` reads as `1.0`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        if let Value::Integer(i) = self { Some(*i) } else { None }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        if let Value::Boolean(b) = self { Some(*b) } else { None }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            Value::Float(val) => write!(f, "{}", val),
            Value::Integer(val) => write!(f, "{}", val),
            Value::Boolean(val) => write!(f, "{}", val),
        }
    }
}

/// Identifier: letter or underscore, then letters, digits, underscores.
fn parse_identifier(input: &str) -> IResult<&str, String> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0(alt((alphanumeric1, tag("_")))),
        )),
        String::from,
    )
    .parse(input)
}

fn parse_value(input: &str) -> IResult<&str, Value> {
    map(
        take_while1(|c: char| !matches!(c, ',' | ' ' | '\t' | '\n' | '\r' | ';')),
        |s: &str| {
            if let Ok(val) = s.parse::<i64>() {
                Value::Integer(val)
            } else if let Ok(val) = s.parse::<f64>() {
                Value::Float(val)
            } else if let Ok(val) = s.parse::<bool>() {
                Value::Boolean(val)
            } else {
                Value::String(s.to_string())
            }
        },
    )
    .parse(input)
}

fn parse_value_list(input: &str) -> IResult<&str, Vec<Value>> {
    separated_list1(delimited(space0, tag(","), space0), parse_value).parse(input)
}

fn parse_key_value_pair(input: &str) -> IResult<&str, (String, Vec<Value>)> {
    separated_pair(
        parse_identifier,
        delimited(space0, tag(":"), space0),
        parse_value_list,
    )
    .parse(input)
}

fn parse_section(input: &str) -> IResult<&str, (String, Vec<(String, Vec<Value>)>)> {
    let (input, title) = terminated(parse_identifier, multispace0).parse(input)?;
    let (input, pairs) = many1(terminated(parse_key_value_pair, multispace0)).parse(input)?;
    Ok((input, (title, pairs)))
}

fn strip_comments(input: &str) -> String {
    input
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !(trimmed.starts_with("//")
                || trimmed.starts_with('#')
                || trimmed.starts_with('%')
                || trimmed.starts_with(';'))
        })
        .collect::<Vec<&str>>()
        .join("\n")
}

/// Parses the whole document; a repeated key keeps its last occurrence.
pub fn parse_document(input: &str) -> Result<DocumentMap, String> {
    let text = strip_comments(input);
    let (remaining, sections) = many1(delimited(multispace0, parse_section, multispace0))
        .parse(text.as_str())
        .map_err(|e| format!("parsing error: {:?}", e))?;
    if !remaining.trim().is_empty() {
        return Err(format!("failed to parse entire document, remaining: '{}'", remaining));
    }
    let mut document = DocumentMap::new();
    for (title, pairs) in sections {
        let section = document.entry(title).or_insert_with(SectionMap::new);
        for (key, values) in pairs {
            section.insert(key, values);
        }
    }
    Ok(document)
}

/// Parses the document and returns the section named `title`.
pub fn parse_section_as(input: &str, title: &str) -> Result<SectionMap, String> {
    let mut document = parse_document(input)?;
    document
        .remove(title)
        .ok_or_else(|| format!("section '{}' not found", title))
}
