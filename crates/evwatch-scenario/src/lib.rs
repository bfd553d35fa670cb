//! Scenario file parser.
//!
//! Parses `.txt` scenario files into test cases using winnow. Each case is an
//! ordered list of steps; a step pairs a selector template (which event it is
//! about) with an optional predicate template (what that event must contain).
//!
//! # File Format
//!
//! ```text
//! ===
//! failed transaction is not in block
//! ===
//! deadline: +5
//! ---
//! {"msg_type": "AcceptTrx", "accepted": false}
//! ~~~
//! {"id": capture(trx_id)}
//! ---
//! {"msg_type": "ApplyTrx", "id": ref(trx_id)}
//! ~~~
//! {"block_num": capture(block_num)}
//! ---
//! # the block that would have included it
//! {"msg_type": "AcceptBlock", "block_num": ref(block_num)}
//! ~~~
//! {"trxs": missing({"id": ref(trx_id)})}
//! ```
//!
//! Template text is kept as written; parsing it is up to the caller.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use winnow::combinator::{alt, eof, opt, repeat, terminated};
use winnow::prelude::*;
use winnow::token::{take_till, take_while};

// ============ Data Types ============

/// When a watch gives up, in terms of the stream's progress counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// Fail once a marker at or past this progress value is seen.
    At(u64),
    /// Relative to the first marker seen: `first + n`.
    After(u64),
}

impl FromStr for Deadline {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ParseError::InvalidDeadline(s.to_string());
        match s.strip_prefix('+') {
            Some(rest) => rest.trim().parse().map(Deadline::After).map_err(|_| invalid()),
            None => s.parse().map(Deadline::At).map_err(|_| invalid()),
        }
    }
}

impl fmt::Display for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deadline::At(n) => write!(f, "{}", n),
            Deadline::After(n) => write!(f, "+{}", n),
        }
    }
}

/// One selector/predicate pair, as template source text.
#[derive(Debug, Clone, PartialEq)]
pub struct StepText {
    pub selector: String,
    pub predicate: Option<String>,
    pub line: usize,
}

/// A single test case parsed from a scenario file.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioCase {
    pub name: String,
    pub deadline: Option<Deadline>,
    pub steps: Vec<StepText>,
    pub file_path: PathBuf,
    pub start_line: usize,
    pub end_line: usize,
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("invalid deadline '{0}' (expected a number or +number)")]
    InvalidDeadline(String),
    #[error("unknown header at line {line}: '{text}'")]
    UnknownHeader { line: usize, text: String },
    #[error("test '{name}' at line {line} has no steps")]
    NoSteps { name: String, line: usize },
    #[error("step at line {line} has an empty {part}")]
    EmptyTemplate { line: usize, part: &'static str },
}

// ============ Public API ============

pub fn parse_file(path: &Path) -> Result<Vec<ScenarioCase>, ParseError> {
    let content = std::fs::read_to_string(path)?;
    parse_content(&content, path)
}

pub fn parse_content(content: &str, path: &Path) -> Result<Vec<ScenarioCase>, ParseError> {
    let mut input = content;
    let mut cases = Vec::new();

    loop {
        skip_filler.parse_next(&mut input).map_err(|_| ParseError::Parse {
            line: line_of(content, input),
            message: "unreadable line".to_string(),
        })?;
        if input.is_empty() {
            break;
        }

        let start_line = line_of(content, input);
        let raw = scenario_case
            .parse_next(&mut input)
            .map_err(|_| ParseError::Parse {
                line: start_line,
                message: "expected '===' test header".to_string(),
            })?;

        let consumed = &content[..content.len() - input.len()];
        let end_line = consumed.trim_end_matches(['\n', '\r']).matches('\n').count() + 1;
        cases.push(build_case(content, raw, path, start_line, end_line)?);
    }

    Ok(cases)
}

// ============ Assembly ============

struct RawStep<'a> {
    fence: &'a str,
    selector: Vec<&'a str>,
    predicate: Option<(&'a str, Vec<&'a str>)>,
}

struct RawCase<'a> {
    name: &'a str,
    headers: Vec<&'a str>,
    steps: Vec<RawStep<'a>>,
}

/// 1-based line number of the start of `slice`, which must point into `content`.
fn line_of(content: &str, slice: &str) -> usize {
    let offset = (slice.as_ptr() as usize).saturating_sub(content.as_ptr() as usize);
    let offset = offset.min(content.len());
    content[..offset].matches('\n').count() + 1
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

fn join_block(lines: &[&str]) -> String {
    lines
        .iter()
        .filter(|l| !is_comment(l))
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn build_case(
    content: &str,
    raw: RawCase<'_>,
    path: &Path,
    start_line: usize,
    end_line: usize,
) -> Result<ScenarioCase, ParseError> {
    let name = raw.name.trim().to_string();

    let mut deadline = None;
    for header in &raw.headers {
        let text = header.trim();
        if text.is_empty() || is_comment(text) {
            continue;
        }
        match text.split_once(':') {
            Some((key, value)) if key.trim() == "deadline" => {
                deadline = Some(value.parse::<Deadline>()?);
            }
            _ => {
                return Err(ParseError::UnknownHeader {
                    line: line_of(content, header),
                    text: text.to_string(),
                })
            }
        }
    }

    if raw.steps.is_empty() {
        return Err(ParseError::NoSteps {
            name,
            line: start_line,
        });
    }

    let mut steps = Vec::with_capacity(raw.steps.len());
    for step in raw.steps {
        let line = line_of(content, step.fence) + 1;
        let selector = join_block(&step.selector);
        if selector.is_empty() {
            return Err(ParseError::EmptyTemplate {
                line,
                part: "selector",
            });
        }
        let predicate = match step.predicate {
            Some((fence, lines)) => {
                let text = join_block(&lines);
                if text.is_empty() {
                    return Err(ParseError::EmptyTemplate {
                        line: line_of(content, fence) + 1,
                        part: "predicate",
                    });
                }
                Some(text)
            }
            None => None,
        };
        steps.push(StepText {
            selector,
            predicate,
            line,
        });
    }

    Ok(ScenarioCase {
        name,
        deadline,
        steps,
        file_path: path.to_path_buf(),
        start_line,
        end_line,
    })
}

// ============ Winnow Parsers ============

fn newline(input: &mut &str) -> ModalResult<()> {
    alt(("\r\n".void(), "\n".void(), "\r".void())).parse_next(input)
}

fn line_end(input: &mut &str) -> ModalResult<()> {
    alt((newline, eof.void())).parse_next(input)
}

fn header_sep<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    (take_while(3.., '='), take_while(0.., [' ', '\t']), line_end)
        .take()
        .parse_next(input)
}

fn step_sep<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    (take_while(3.., '-'), take_while(0.., [' ', '\t']), line_end)
        .take()
        .parse_next(input)
}

fn predicate_sep<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    (take_while(3.., '~'), take_while(0.., [' ', '\t']), line_end)
        .take()
        .parse_next(input)
}

fn text_line<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    terminated(take_till(0.., |c: char| c == '\n' || c == '\r'), line_end).parse_next(input)
}

fn is_separator_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= 3
        && ['=', '-', '~']
            .iter()
            .any(|&sep| trimmed.chars().all(|c| c == sep))
}

/// Lines up to the next separator line or end of input.
fn block<'a>(input: &mut &'a str) -> ModalResult<Vec<&'a str>> {
    let mut lines = Vec::new();
    while !input.is_empty() {
        let peek_line = input.lines().next().unwrap_or("");
        if is_separator_line(peek_line) {
            break;
        }
        lines.push(text_line.parse_next(input)?);
    }
    Ok(lines)
}

/// Blank and comment lines between test cases.
fn skip_filler(input: &mut &str) -> ModalResult<()> {
    while !input.is_empty() {
        let peek_line = input.lines().next().unwrap_or("");
        if !(peek_line.trim().is_empty() || is_comment(peek_line)) {
            break;
        }
        text_line.parse_next(input)?;
    }
    Ok(())
}

fn step<'a>(input: &mut &'a str) -> ModalResult<RawStep<'a>> {
    let fence = step_sep.parse_next(input)?;
    let selector = block.parse_next(input)?;
    let predicate = opt((predicate_sep, block)).parse_next(input)?;
    Ok(RawStep {
        fence,
        selector,
        predicate,
    })
}

fn scenario_case<'a>(input: &mut &'a str) -> ModalResult<RawCase<'a>> {
    header_sep.parse_next(input)?;
    let name = text_line.parse_next(input)?;
    header_sep.parse_next(input)?;
    let headers = block.parse_next(input)?;
    let steps: Vec<RawStep<'a>> = repeat(0.., step).parse_next(input)?;
    Ok(RawCase {
        name,
        headers,
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<Vec<ScenarioCase>, ParseError> {
        parse_content(content, Path::new("test.txt"))
    }

    #[test]
    fn test_parse_simple_case() {
        let content = r#"===
user sends transaction
===
deadline: 7417
---
{"msg_type": "AcceptTrx", "id": "8aa6"}
~~~
{"accepted": true, "implicit": false}
---
{"msg_type": "AcceptBlock", "block_num": 7417}
"#;
        let cases = parse(content).unwrap();
        assert_eq!(cases.len(), 1);
        let case = &cases[0];
        assert_eq!(case.name, "user sends transaction");
        assert_eq!(case.deadline, Some(Deadline::At(7417)));
        assert_eq!(case.start_line, 1);
        assert_eq!(case.end_line, 10);
        assert_eq!(case.steps.len(), 2);
        assert_eq!(case.steps[0].selector, r#"{"msg_type": "AcceptTrx", "id": "8aa6"}"#);
        assert_eq!(
            case.steps[0].predicate.as_deref(),
            Some(r#"{"accepted": true, "implicit": false}"#)
        );
        assert_eq!(case.steps[0].line, 6);
        assert_eq!(case.steps[1].predicate, None);
        assert_eq!(case.steps[1].line, 10);
        assert_eq!(case.file_path, PathBuf::from("test.txt"));
    }

    #[test]
    fn test_parse_multiple_cases() {
        let content = r#"# leading comment

===
first
===
---
{"msg_type": "A"}

===
second
===
deadline: +5
---
{"msg_type": "B"}
"#;
        let cases = parse(content).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].name, "first");
        assert_eq!(cases[0].deadline, None);
        assert_eq!(cases[0].start_line, 3);
        assert_eq!(cases[1].name, "second");
        assert_eq!(cases[1].deadline, Some(Deadline::After(5)));
        assert_eq!(cases[1].start_line, 9);
    }

    #[test]
    fn test_parse_multiline_templates_and_comments() {
        let content = "===\nmultiline\n===\n---\n# about the block\n{\n  \"msg_type\": \"AcceptBlock\",\n  \"trxs\": unordered({\"id\": ref(trx_id)})\n}\n~~~~\n{\"block_num\": capture(b)}\n";
        let cases = parse(content).unwrap();
        assert_eq!(
            cases[0].steps[0].selector,
            "{\n  \"msg_type\": \"AcceptBlock\",\n  \"trxs\": unordered({\"id\": ref(trx_id)})\n}"
        );
        assert_eq!(
            cases[0].steps[0].predicate.as_deref(),
            Some("{\"block_num\": capture(b)}")
        );
    }

    #[test]
    fn test_parse_crlf() {
        let content = "===\r\ncrlf\r\n===\r\n---\r\n{\"a\": 1}\r\n";
        let cases = parse(content).unwrap();
        assert_eq!(cases[0].name, "crlf");
        assert_eq!(cases[0].steps[0].selector, "{\"a\": 1}");
    }

    #[test]
    fn test_no_steps() {
        let content = "===\nempty\n===\ndeadline: 3\n";
        assert!(matches!(
            parse(content),
            Err(ParseError::NoSteps { line: 1, .. })
        ));
    }

    #[test]
    fn test_empty_selector() {
        let content = "===\nx\n===\n---\n# only a comment\n~~~\n{}\n";
        assert!(matches!(
            parse(content),
            Err(ParseError::EmptyTemplate {
                line: 5,
                part: "selector"
            })
        ));
    }

    #[test]
    fn test_unknown_header() {
        let content = "===\nx\n===\ntimeout: 3\n---\n{}\n";
        assert!(matches!(
            parse(content),
            Err(ParseError::UnknownHeader { line: 4, .. })
        ));
    }

    #[test]
    fn test_missing_header() {
        let content = "{\"msg_type\": \"A\"}\n";
        assert!(matches!(parse(content), Err(ParseError::Parse { line: 1, .. })));
    }

    #[test]
    fn test_deadline_from_str() {
        assert_eq!("12".parse::<Deadline>().unwrap(), Deadline::At(12));
        assert_eq!(" + 3 ".parse::<Deadline>().unwrap(), Deadline::After(3));
        assert!("soon".parse::<Deadline>().is_err());
        assert_eq!(Deadline::After(3).to_string(), "+3");
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("watch.txt");
        std::fs::write(&path, "===\nfrom file\n===\n---\n{}\n").unwrap();
        let cases = parse_file(&path).unwrap();
        assert_eq!(cases[0].file_path, path);
    }
}
