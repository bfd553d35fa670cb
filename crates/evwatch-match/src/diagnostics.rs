//! Path-annotated match failures.

use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MismatchKind {
    #[error("expected {expected}, got {actual_type} {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual_type: &'static str,
        actual: String,
    },
    #[error("expected {expected}, got {actual}")]
    ScalarMismatch { expected: String, actual: String },
    #[error("expected {expected} items, got {actual}")]
    CardinalityMismatch { expected: usize, actual: usize },
    #[error("missing key \"{key}\"")]
    MissingKey { key: String },
    #[error("unexpected key \"{key}\"")]
    UnexpectedKey { key: String },
    #[error("reference to unbound capture '{name}'")]
    UnboundCapture { name: String },
    #[error("{candidate} doesn't contain {item}")]
    NoAssignmentFound {
        item: String,
        candidate: String,
        /// Every candidate index tried for `item`, with the reason it failed.
        attempts: Vec<(usize, Diagnostics)>,
    },
    #[error("{item} unexpectedly matched element {index}: {element}")]
    UnexpectedMatch {
        item: String,
        index: usize,
        element: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub path: String,
    pub kind: MismatchKind,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "<root>: {}", self.kind)
        } else {
            write!(f, "{}: {}", self.path, self.kind)
        }
    }
}

/// Why one match attempt failed, with the attempts behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostics {
    entries: Vec<Mismatch>,
}

impl Diagnostics {
    pub fn single(path: impl Into<String>, kind: MismatchKind) -> Self {
        Self {
            entries: vec![Mismatch {
                path: path.into(),
                kind,
            }],
        }
    }

    /// The outermost mismatch.
    pub fn first(&self) -> Option<&Mismatch> {
        self.entries.first()
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}{}", pad, entry)?;
            if let MismatchKind::NoAssignmentFound { attempts, .. } = &entry.kind {
                if attempts.is_empty() {
                    write!(f, "\n{}  no candidates left to check", pad)?;
                } else {
                    write!(f, "\n{}  checked items:", pad)?;
                    for (index, diag) in attempts {
                        write!(f, "\n{}    [{}]\n", pad, index)?;
                        diag.render(f, indent + 3)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}

impl std::error::Error for Diagnostics {}

/// `path["key"]`
pub fn key_path(path: &str, key: &str) -> String {
    format!("{}[\"{}\"]", path, key)
}

/// `path[index]`
pub fn index_path(path: &str, index: usize) -> String {
    format!("{}[{}]", path, index)
}
