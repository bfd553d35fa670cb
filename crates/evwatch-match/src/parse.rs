//! Text syntax for templates: JSON plus combinator calls.
//!
//! ```text
//! {"msg_type": "AcceptBlock", "block_num": ref(block), "trxs": missing({"id": ref(trx_id)})}
//! ```
//!
//! - `capture(name)` / `ref(name)`: store / compare a named value
//! - `exactly(value)`: deep equality, `value` must not contain combinators
//! - `unordered(t, ...)`, `all_ordered(t, ...)`, `missing(t, ...)`
//!
//! Object keys may be bare identifiers.

use crate::template::Template;
use serde_json::Number;
use std::str::FromStr;
use thiserror::Error;
use winnow::ascii::{digit1, multispace0};
use winnow::combinator::{alt, delimited, opt, preceded, repeat, separated, separated_pair};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{none_of, one_of, take_while};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateParseError {
    #[error("template is empty")]
    Empty,
    #[error("invalid template at offset {offset}, near {near:?}")]
    Syntax { offset: usize, near: String },
    #[error("unexpected trailing input at offset {offset}: {near:?}")]
    Trailing { offset: usize, near: String },
}

fn snippet(s: &str) -> String {
    s.chars().take(24).collect()
}

pub fn parse_template(input: &str) -> Result<Template, TemplateParseError> {
    if input.trim().is_empty() {
        return Err(TemplateParseError::Empty);
    }

    let mut rest = input;
    match template.parse_next(&mut rest) {
        Ok(t) => {
            let remaining = rest.trim_start();
            if remaining.is_empty() {
                Ok(t)
            } else {
                Err(TemplateParseError::Trailing {
                    offset: input.len() - remaining.len(),
                    near: snippet(remaining),
                })
            }
        }
        Err(_) => Err(TemplateParseError::Syntax {
            offset: input.len() - rest.len(),
            near: snippet(rest),
        }),
    }
}

impl FromStr for Template {
    type Err = TemplateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_template(s)
    }
}

// ============ Winnow Parsers ============

fn template(input: &mut &str) -> ModalResult<Template> {
    delimited(
        multispace0,
        alt((
            array,
            object,
            string.map(Template::String),
            number,
            word,
        )),
        multispace0,
    )
    .parse_next(input)
}

fn template_list(input: &mut &str) -> ModalResult<Vec<Template>> {
    delimited(multispace0, separated(0.., template, ','), multispace0).parse_next(input)
}

fn array(input: &mut &str) -> ModalResult<Template> {
    delimited('[', template_list, ']')
        .map(Template::Array)
        .parse_next(input)
}

fn object(input: &mut &str) -> ModalResult<Template> {
    delimited('{', entry_list, '}')
        .map(Template::Object)
        .parse_next(input)
}

fn entry_list(input: &mut &str) -> ModalResult<Vec<(String, Template)>> {
    delimited(multispace0, separated(0.., entry, ','), multispace0).parse_next(input)
}

fn entry(input: &mut &str) -> ModalResult<(String, Template)> {
    separated_pair(delimited(multispace0, key, multispace0), ':', template).parse_next(input)
}

fn key(input: &mut &str) -> ModalResult<String> {
    alt((string, ident.map(|s: &str| s.to_string()))).parse_next(input)
}

fn ident<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

fn string(input: &mut &str) -> ModalResult<String> {
    delimited(
        '"',
        repeat(0.., string_char).fold(String::new, |mut s, c| {
            s.push(c);
            s
        }),
        '"',
    )
    .parse_next(input)
}

fn string_char(input: &mut &str) -> ModalResult<char> {
    alt((preceded('\\', escape), none_of(['"', '\\']))).parse_next(input)
}

fn escape(input: &mut &str) -> ModalResult<char> {
    alt((
        'n'.value('\n'),
        't'.value('\t'),
        'r'.value('\r'),
        'b'.value('\u{8}'),
        'f'.value('\u{c}'),
        '"'.value('"'),
        '\\'.value('\\'),
        '/'.value('/'),
        unicode_escape,
    ))
    .parse_next(input)
}

/// `\uXXXX`, with a high surrogate followed by `\uXXXX` low surrogate
/// decoding to one supplementary-plane char.
fn unicode_escape(input: &mut &str) -> ModalResult<char> {
    let high = preceded('u', hex4).parse_next(input)?;
    let code = if (0xD800..=0xDBFF).contains(&high) {
        let low = preceded("\\u", hex4)
            .verify(|low: &u32| (0xDC00..=0xDFFF).contains(low))
            .parse_next(input)?;
        0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
    } else {
        high
    };
    char::from_u32(code).ok_or_else(|| ErrMode::Backtrack(ContextError::new()))
}

fn hex4(input: &mut &str) -> ModalResult<u32> {
    take_while(4, |c: char| c.is_ascii_hexdigit())
        .verify_map(|hex: &str| u32::from_str_radix(hex, 16).ok())
        .parse_next(input)
}

fn number(input: &mut &str) -> ModalResult<Template> {
    (
        opt('-'),
        digit1,
        opt(('.', digit1)),
        opt((one_of(['e', 'E']), opt(one_of(['+', '-'])), digit1)),
    )
        .take()
        .verify_map(|text: &str| text.parse::<Number>().ok())
        .map(Template::Number)
        .parse_next(input)
}

/// Keywords and combinator calls.
fn word(input: &mut &str) -> ModalResult<Template> {
    let name = ident.parse_next(input)?;
    match name {
        "null" => Ok(Template::Null),
        "true" => Ok(Template::Bool(true)),
        "false" => Ok(Template::Bool(false)),
        "capture" => name_arg.map(Template::Capture).parse_next(input),
        "ref" => name_arg.map(Template::Reference).parse_next(input),
        "exactly" => exactly_arg.parse_next(input),
        "unordered" => call_args.map(Template::Unordered).parse_next(input),
        "all_ordered" => call_args.map(Template::AllOrdered).parse_next(input),
        "missing" => call_args.map(Template::Missing).parse_next(input),
        _ => Err(ErrMode::Backtrack(ContextError::new())),
    }
}

fn name_arg(input: &mut &str) -> ModalResult<String> {
    delimited(
        ('(', multispace0),
        alt((string, ident.map(|s: &str| s.to_string()))),
        (multispace0, ')'),
    )
    .parse_next(input)
}

fn call_args(input: &mut &str) -> ModalResult<Vec<Template>> {
    delimited('(', template_list, ')').parse_next(input)
}

fn exactly_arg(input: &mut &str) -> ModalResult<Template> {
    delimited('(', template, ')')
        .verify_map(|t: Template| t.to_value())
        .map(Template::Exactly)
        .parse_next(input)
}
