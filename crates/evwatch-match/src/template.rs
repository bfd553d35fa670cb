//! Template model: JSON-like literals plus the matching combinators.

use crate::value::Value;
use serde_json::Number;
use std::fmt;

/// A pattern matched against a [`Value`].
///
/// Literal arrays and objects contain templates themselves, so combinators
/// can appear at any depth. Object entries keep the order they were written
/// in, which is also the order captures and references are evaluated in.
#[derive(Debug, Clone, PartialEq)]
pub enum Template {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    /// Ordered containment with gaps.
    Array(Vec<Template>),
    /// Partial containment: extra candidate keys are ignored.
    Object(Vec<(String, Template)>),
    /// Deep equality, no containment anywhere below.
    Exactly(Value),
    /// Store the candidate under a name. Always matches.
    Capture(String),
    /// Compare against a previously captured value as `Exactly`.
    Reference(String),
    /// Every item matches a distinct element, in any order.
    Unordered(Vec<Template>),
    /// Like `Unordered`, and the candidate has exactly as many elements.
    AllOrdered(Vec<Template>),
    /// No item matches any element.
    Missing(Vec<Template>),
}

impl Template {
    pub fn object<K, T, I>(entries: I) -> Self
    where
        K: Into<String>,
        T: Into<Template>,
        I: IntoIterator<Item = (K, T)>,
    {
        Template::Object(
            entries
                .into_iter()
                .map(|(k, t)| (k.into(), t.into()))
                .collect(),
        )
    }

    pub fn array<T, I>(items: I) -> Self
    where
        T: Into<Template>,
        I: IntoIterator<Item = T>,
    {
        Template::Array(items.into_iter().map(Into::into).collect())
    }

    pub fn exactly(value: impl Into<Value>) -> Self {
        Template::Exactly(value.into())
    }

    pub fn capture(name: impl Into<String>) -> Self {
        Template::Capture(name.into())
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Template::Reference(name.into())
    }

    pub fn unordered<T: Into<Template>, I: IntoIterator<Item = T>>(items: I) -> Self {
        Template::Unordered(items.into_iter().map(Into::into).collect())
    }

    pub fn all_ordered<T: Into<Template>, I: IntoIterator<Item = T>>(items: I) -> Self {
        Template::AllOrdered(items.into_iter().map(Into::into).collect())
    }

    pub fn missing<T: Into<Template>, I: IntoIterator<Item = T>>(items: I) -> Self {
        Template::Missing(items.into_iter().map(Into::into).collect())
    }

    /// The plain value this template denotes, if it contains no combinators.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Template::Null => Some(Value::Null),
            Template::Bool(b) => Some(Value::Bool(*b)),
            Template::Number(n) => Some(Value::Number(n.clone())),
            Template::String(s) => Some(Value::String(s.clone())),
            Template::Array(items) => items
                .iter()
                .map(Template::to_value)
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            Template::Object(entries) => entries
                .iter()
                .map(|(k, t)| t.to_value().map(|v| (k.clone(), v)))
                .collect::<Option<_>>()
                .map(Value::Object),
            Template::Exactly(v) => Some(v.clone()),
            Template::Capture(_)
            | Template::Reference(_)
            | Template::Unordered(_)
            | Template::AllOrdered(_)
            | Template::Missing(_) => None,
        }
    }

    /// Names captured anywhere inside this template, in evaluation order.
    pub fn captures(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_names(&mut names, true);
        names
    }

    /// Names referenced anywhere inside this template, in evaluation order.
    pub fn references(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_names(&mut names, false);
        names
    }

    /// Multi-line rendering, indented like pretty-printed JSON so it lines up
    /// with [`Value::to_pretty`] in diffs.
    pub fn to_pretty(&self) -> String {
        let mut out = String::new();
        write_pretty(&mut out, self, 0);
        out
    }

    fn collect_names<'a>(&'a self, names: &mut Vec<&'a str>, captures: bool) {
        match self {
            Template::Capture(name) if captures => names.push(name),
            Template::Reference(name) if !captures => names.push(name),
            Template::Array(items)
            | Template::Unordered(items)
            | Template::AllOrdered(items)
            | Template::Missing(items) => {
                for item in items {
                    item.collect_names(names, captures);
                }
            }
            Template::Object(entries) => {
                for (_, t) in entries {
                    t.collect_names(names, captures);
                }
            }
            _ => {}
        }
    }
}

impl From<Value> for Template {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Template::Null,
            Value::Bool(b) => Template::Bool(b),
            Value::Number(n) => Template::Number(n),
            Value::String(s) => Template::String(s),
            Value::Array(items) => Template::Array(items.into_iter().map(Template::from).collect()),
            Value::Object(map) => {
                Template::Object(map.into_iter().map(|(k, v)| (k, Template::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Template {
    fn from(b: bool) -> Self {
        Template::Bool(b)
    }
}

impl From<i64> for Template {
    fn from(n: i64) -> Self {
        Template::Number(n.into())
    }
}

impl From<u64> for Template {
    fn from(n: u64) -> Self {
        Template::Number(n.into())
    }
}

impl From<&str> for Template {
    fn from(s: &str) -> Self {
        Template::String(s.to_string())
    }
}

impl From<String> for Template {
    fn from(s: String) -> Self {
        Template::String(s)
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Template]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

fn write_pretty(out: &mut String, template: &Template, depth: usize) {
    let (open, close, items): (&str, &str, Vec<(Option<&str>, &Template)>) = match template {
        Template::Array(items) if !items.is_empty() => {
            ("[", "]", items.iter().map(|t| (None, t)).collect())
        }
        Template::Object(entries) if !entries.is_empty() => (
            "{",
            "}",
            entries.iter().map(|(k, t)| (Some(k.as_str()), t)).collect(),
        ),
        Template::Unordered(items) if !items.is_empty() => {
            ("unordered(", ")", items.iter().map(|t| (None, t)).collect())
        }
        Template::AllOrdered(items) if !items.is_empty() => {
            ("all_ordered(", ")", items.iter().map(|t| (None, t)).collect())
        }
        Template::Missing(items) if !items.is_empty() => {
            ("missing(", ")", items.iter().map(|t| (None, t)).collect())
        }
        other => {
            out.push_str(&other.to_string());
            return;
        }
    };

    let indent = "  ".repeat(depth + 1);
    out.push_str(open);
    out.push('\n');
    let last = items.len() - 1;
    for (i, (key, item)) in items.into_iter().enumerate() {
        out.push_str(&indent);
        if let Some(key) = key {
            out.push_str(&serde_json::Value::String(key.to_string()).to_string());
            out.push_str(": ");
        }
        write_pretty(out, item, depth + 1);
        if i < last {
            out.push(',');
        }
        out.push('\n');
    }
    out.push_str(&"  ".repeat(depth));
    out.push_str(close);
}

/// Renders in the same syntax [`crate::parse_template`] accepts.
impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Template::Null => write!(f, "null"),
            Template::Bool(b) => write!(f, "{}", b),
            Template::Number(n) => write!(f, "{}", n),
            Template::String(s) => write!(f, "{}", serde_json::Value::String(s.clone())),
            Template::Array(items) => {
                write!(f, "[")?;
                write_list(f, items)?;
                write!(f, "]")
            }
            Template::Object(entries) => {
                write!(f, "{{")?;
                for (i, (k, t)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", serde_json::Value::String(k.clone()), t)?;
                }
                write!(f, "}}")
            }
            Template::Exactly(v) => write!(f, "exactly({})", v),
            Template::Capture(name) => write!(f, "capture({})", name),
            Template::Reference(name) => write!(f, "ref({})", name),
            Template::Unordered(items) => {
                write!(f, "unordered(")?;
                write_list(f, items)?;
                write!(f, ")")
            }
            Template::AllOrdered(items) => {
                write!(f, "all_ordered(")?;
                write_list(f, items)?;
                write!(f, ")")
            }
            Template::Missing(items) => {
                write!(f, "missing(")?;
                write_list(f, items)?;
                write!(f, ")")
            }
        }
    }
}
