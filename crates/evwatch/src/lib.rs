//! Watch an append-only stream of JSON events for expected sequences.
//!
//! Scenario files describe ordered steps; each step selects an event with a
//! template and then checks it against a stricter one. Captures made while
//! matching one step can be referenced by later steps. See
//! [`watch::Watcher::wait_for_sequence`] for the scanning rules.

pub mod cli;
pub mod config;
pub mod discover;
pub mod error;
pub mod output;
pub mod runner;
pub mod source;
pub mod template;
pub mod watch;

pub use config::{RunConfig, SourceConfig, StartPosition, WatchConfig};
pub use error::{Error, Result};
pub use evwatch_match::{parse_template, BindingContext, Diagnostics, Template, Value};
pub use evwatch_scenario::{parse_content, parse_file, Deadline, ScenarioCase, StepText};
pub use source::{FileTail, LineSource, MemorySource, SourceError};
pub use watch::{Step, WatchFailure, WatchReport, Watcher};
