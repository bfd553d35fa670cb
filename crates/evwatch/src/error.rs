use crate::source::SourceError;
use evwatch_match::TemplateParseError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read scenario file '{path}'")]
    ReadScenario {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse scenario file '{path}': {source}")]
    ParseScenario {
        path: PathBuf,
        source: evwatch_scenario::ParseError,
    },

    #[error("Invalid {part} template at line {line}: {source}")]
    Template {
        line: usize,
        part: &'static str,
        source: TemplateParseError,
    },

    #[error("Event source error: {0}")]
    Source(#[from] SourceError),

    #[error("Walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
