use crate::template::TemplateVars;
use evwatch_scenario::Deadline;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TYPE_FIELD: &str = "msg_type";
pub const DEFAULT_MARKER_TYPE: &str = "AcceptBlock";
pub const DEFAULT_PROGRESS_FIELD: &str = "block_num";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Which events carry the progress counter, and where.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchConfig {
    pub type_field: String,
    pub marker_type: String,
    pub progress_field: String,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            type_field: DEFAULT_TYPE_FIELD.to_string(),
            marker_type: DEFAULT_MARKER_TYPE.to_string(),
            progress_field: DEFAULT_PROGRESS_FIELD.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// Only events appended after the source is opened.
    End,
    /// Replay the whole file.
    Beginning,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub events_path: PathBuf,
    pub start: StartPosition,
    /// Keep polling for appended lines at end of file instead of stopping.
    pub follow: bool,
    pub poll_interval: Duration,
    /// Give up after this long without a new line. `None` waits forever.
    pub idle_timeout: Option<Duration>,
}

impl SourceConfig {
    pub fn new(events_path: impl Into<PathBuf>) -> Self {
        Self {
            events_path: events_path.into(),
            start: StartPosition::End,
            follow: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
            idle_timeout: None,
        }
    }
}

/// Everything a scenario run needs besides the scenario files themselves.
#[derive(Debug)]
pub struct RunConfig {
    pub watch: WatchConfig,
    pub source: SourceConfig,
    /// Overrides the deadline declared by each case.
    pub deadline: Option<Deadline>,
    pub pattern: Option<String>,
    pub vars: TemplateVars,
}

impl RunConfig {
    pub fn new(source: SourceConfig) -> Self {
        Self {
            watch: WatchConfig::default(),
            source,
            deadline: None,
            pattern: None,
            vars: TemplateVars::new(),
        }
    }
}
