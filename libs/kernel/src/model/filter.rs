use std::{fmt::Display, str::FromStr};
use thiserror::Error;

use super::Entry;

/// The subset of RFC 4515 search filters the directory evaluates. Substring,
/// ordering and extensible matches are not supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equality(String, String),
    Present(String),
}

impl Filter {
    pub fn present(name: &str) -> Self {
        Self::Present(name.to_owned())
    }

    pub fn equality(name: &str, value: &str) -> Self {
        Self::Equality(name.to_owned(), value.to_owned())
    }

    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Filter::And(filters) => filters.iter().all(|f| f.matches(entry)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(entry)),
            Filter::Not(filter) => !filter.matches(entry),
            Filter::Equality(name, value) => entry
                .values(name)
                .iter()
                .any(|v| v.eq_ignore_ascii_case(value)),
            Filter::Present(name) => !entry.values(name).is_empty(),
        }
    }
}

impl Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Filter::And(filters) => {
                write!(f, "(&")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                write!(f, ")")
            }
            Filter::Or(filters) => {
                write!(f, "(|")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                write!(f, ")")
            }
            Filter::Not(filter) => write!(f, "(!{})", filter),
            Filter::Equality(name, value) => write!(f, "({}={})", name, escape(value)),
            Filter::Present(name) => write!(f, "({}=*)", name),
        }
    }
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterParseError {
    #[error("Invalid filter '{0}'")]
    Invalid(String),
}

impl FromStr for Filter {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse::filter(s.trim()).map_err(|_| FilterParseError::Invalid(s.to_owned()))
    }
}

mod parse {
    use nom::{
        branch::alt,
        bytes::complete::{tag, take_while, take_while1},
        character::complete::char,
        combinator::{all_consuming, map, map_res, peek},
        multi::many1,
        sequence::{delimited, preceded, separated_pair, terminated},
        IResult,
    };

    use super::Filter;

    pub fn filter(i: &str) -> Result<Filter, nom::Err<nom::error::Error<&str>>> {
        let (_, filter) = all_consuming(parenthesized)(i)?;
        Ok(filter)
    }

    fn parenthesized(i: &str) -> IResult<&str, Filter> {
        delimited(char('('), alt((and, or, not, present, equality)), char(')'))(i)
    }

    fn and(i: &str) -> IResult<&str, Filter> {
        map(preceded(char('&'), many1(parenthesized)), Filter::And)(i)
    }

    fn or(i: &str) -> IResult<&str, Filter> {
        map(preceded(char('|'), many1(parenthesized)), Filter::Or)(i)
    }

    fn not(i: &str) -> IResult<&str, Filter> {
        map(preceded(char('!'), parenthesized), |f| Filter::Not(Box::new(f)))(i)
    }

    fn present(i: &str) -> IResult<&str, Filter> {
        map(terminated(attribute, terminated(tag("=*"), peek(char(')')))), |name| {
            Filter::Present(name.to_owned())
        })(i)
    }

    fn equality(i: &str) -> IResult<&str, Filter> {
        map(
            separated_pair(attribute, char('='), assertion_value),
            |(name, value)| Filter::Equality(name.to_owned(), value),
        )(i)
    }

    fn attribute(i: &str) -> IResult<&str, &str> {
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == ';')(i)
    }

    fn assertion_value(i: &str) -> IResult<&str, String> {
        map_res(take_while(|c: char| c != '(' && c != ')'), unescape)(i)
    }

    fn unescape(value: &str) -> Result<String, ()> {
        let mut bytes = Vec::with_capacity(value.len());
        let mut chars = value.chars();
        while let Some(c) = chars.next() {
            match c {
                '*' => return Err(()),
                '\\' => {
                    let hex: String = chars.by_ref().take(2).collect();
                    if hex.len() != 2 {
                        return Err(());
                    }
                    bytes.push(u8::from_str_radix(&hex, 16).map_err(|_| ())?);
                }
                c => {
                    let mut buffer = [0u8; 4];
                    bytes.extend_from_slice(c.encode_utf8(&mut buffer).as_bytes());
                }
            }
        }
        String::from_utf8(bytes).map_err(|_| ())
    }
}
