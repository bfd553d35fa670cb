use crate::config::{
    RunConfig, SourceConfig, StartPosition, WatchConfig, DEFAULT_MARKER_TYPE,
    DEFAULT_PROGRESS_FIELD, DEFAULT_TYPE_FIELD,
};
use clap::Parser;
use evwatch_scenario::Deadline;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "evwatch",
    about = "Watch an append-only JSON event stream for expected event sequences",
    version
)]
pub struct Cli {
    /// Scenario file, or directory searched for *.txt scenario files
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Event stream to watch, one JSON event per line
    #[arg(short, long, env = "EVWATCH_EVENTS")]
    pub events: Option<PathBuf>,

    /// Deadline for every case: a progress value, or +N relative to the first marker seen
    #[arg(short, long, value_parser = parse_deadline)]
    pub deadline: Option<Deadline>,

    /// Event type whose progress field bounds the watch
    #[arg(long, default_value = DEFAULT_MARKER_TYPE)]
    pub marker: String,

    /// Field of the marker event holding the progress value
    #[arg(long, default_value = DEFAULT_PROGRESS_FIELD)]
    pub progress_field: String,

    /// Field holding an event's type
    #[arg(long, default_value = DEFAULT_TYPE_FIELD)]
    pub type_field: String,

    /// Poll interval in milliseconds while waiting for new events
    #[arg(long, default_value_t = 1000)]
    pub poll_ms: u64,

    /// Fail a case after this many seconds without a new event
    #[arg(long, value_name = "SECS", value_parser = parse_idle_timeout)]
    pub idle_timeout: Option<Duration>,

    /// Read the event stream from the beginning instead of only new events
    #[arg(long)]
    pub from_start: bool,

    /// Stop at end of file instead of waiting for more events
    #[arg(long)]
    pub no_follow: bool,

    /// Template variable substituted for {{ KEY }} in scenario files
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,

    /// Filter cases by file or case name
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// List cases without running them
    #[arg(short, long)]
    pub list: bool,

    /// Show each case as it completes (-vv also logs skipped events)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl Cli {
    pub fn run_config(&self, events: PathBuf) -> RunConfig {
        let source = SourceConfig {
            events_path: events,
            start: if self.from_start {
                StartPosition::Beginning
            } else {
                StartPosition::End
            },
            follow: !self.no_follow,
            poll_interval: Duration::from_millis(self.poll_ms.max(1)),
            idle_timeout: self.idle_timeout,
        };

        let mut config = RunConfig::new(source);
        config.watch = WatchConfig {
            type_field: self.type_field.clone(),
            marker_type: self.marker.clone(),
            progress_field: self.progress_field.clone(),
        };
        config.deadline = self.deadline;
        config.pattern = self.pattern.clone();
        for (key, value) in &self.vars {
            config.vars.set(key.clone(), value.clone());
        }
        config
    }

    /// Log filter used when `RUST_LOG` is unset.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

fn parse_deadline(s: &str) -> Result<Deadline, String> {
    s.parse().map_err(|e: evwatch_scenario::ParseError| e.to_string())
}

fn parse_idle_timeout(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .parse()
        .map_err(|_| format!("expected seconds, got '{}'", s))?;
    if secs <= 0.0 {
        return Err(format!("idle timeout must be positive, got '{}'", s));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid idle timeout '{}': {}", s, e))
}

fn parse_var(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}
