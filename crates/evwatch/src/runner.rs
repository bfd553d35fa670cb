use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::source::FileTail;
use crate::watch::{unbound_references, Step, WatchFailure, WatchReport, Watcher};
use evwatch_match::{parse_template, BindingContext, Template};
use evwatch_scenario::{parse_content, ScenarioCase};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct CaseResult {
    pub case: ScenarioCase,
    pub passed: bool,
    pub error: Option<String>,
    pub details: Option<String>,
    /// Expected predicate and actual event, both pretty-printed.
    pub diff: Option<(String, String)>,
    /// Index of the step being waited on when the case failed.
    pub failed_step: Option<usize>,
    pub step_count: usize,
    /// Path of the outermost predicate mismatch, e.g. `events[0]["accepted"]`.
    pub mismatch_path: Option<String>,
    /// Line numbers matched before the case passed or failed.
    pub matched_lines: Vec<usize>,
    pub lines_read: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct FileResult {
    pub file_path: PathBuf,
    pub results: Vec<CaseResult>,
    pub parse_error: Option<String>,
    pub elapsed: Duration,
}

impl FileResult {
    pub fn passed(&self) -> bool {
        self.parse_error.is_none() && self.results.iter().all(|r| r.passed)
    }

    pub fn passed_cases(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    CaseStart { file: String, name: String },
    CaseComplete(Box<CaseResult>),
}

pub struct Runner {
    config: RunConfig,
    watcher: Watcher,
    cancel: Option<Arc<AtomicBool>>,
}

impl Runner {
    pub fn new(config: RunConfig) -> Self {
        let watcher = Watcher::new(config.watch.clone());
        Self {
            config,
            watcher,
            cancel: None,
        }
    }

    /// Abort waiting cases when `flag` is set.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Reads a scenario file, substituting `{{ VARS }}` before parsing.
    pub fn load_file(&self, path: &Path) -> Result<Vec<ScenarioCase>> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ReadScenario {
            path: path.to_path_buf(),
            source,
        })?;
        let content = self.config.vars.apply(&content);
        parse_content(&content, path).map_err(|source| Error::ParseScenario {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Cases of a file that pass the `--pattern` filter: either the file
    /// stem or the case name contains it.
    pub fn select_cases(&self, path: &Path, cases: Vec<ScenarioCase>) -> Vec<ScenarioCase> {
        let Some(pat) = self.config.pattern.as_deref() else {
            return cases;
        };
        let file_matches = path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|name| name.contains(pat));
        cases
            .into_iter()
            .filter(|case| file_matches || case.name.contains(pat))
            .collect()
    }

    pub fn build_steps(case: &ScenarioCase) -> Result<Vec<Step>> {
        case.steps
            .iter()
            .map(|text| {
                let selector = parse_step_template(&text.selector, text.line, "selector")?;
                match &text.predicate {
                    Some(p) => Ok(Step::new(
                        selector,
                        parse_step_template(p, text.line, "predicate")?,
                    )),
                    None => Ok(Step::select(selector)),
                }
            })
            .collect()
    }

    /// Problems found without reading any events: templates that don't
    /// parse and references no earlier step captures.
    pub fn lint_case(case: &ScenarioCase) -> Vec<String> {
        match Self::build_steps(case) {
            Ok(steps) => unbound_references(&steps)
                .into_iter()
                .map(|(step, name)| {
                    format!("step [{}] references '{}' before any step captures it", step, name)
                })
                .collect(),
            Err(e) => vec![e.to_string()],
        }
    }

    pub fn run_file(&self, path: &Path, progress_tx: Option<&Sender<ProgressEvent>>) -> FileResult {
        let start = Instant::now();
        let cases = match self.load_file(path) {
            Ok(cases) => cases,
            Err(e) => {
                return FileResult {
                    file_path: path.to_path_buf(),
                    results: vec![],
                    parse_error: Some(e.to_string()),
                    elapsed: start.elapsed(),
                };
            }
        };

        let file_stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string();

        let mut results = Vec::new();
        for case in self.select_cases(path, cases) {
            if let Some(tx) = progress_tx {
                let _ = tx.send(ProgressEvent::CaseStart {
                    file: file_stem.clone(),
                    name: case.name.clone(),
                });
            }

            let result = self.run_case(&case);
            if let Some(tx) = progress_tx {
                let _ = tx.send(ProgressEvent::CaseComplete(Box::new(result.clone())));
            }
            results.push(result);
        }

        FileResult {
            file_path: path.to_path_buf(),
            results,
            parse_error: None,
            elapsed: start.elapsed(),
        }
    }

    /// Runs one case against a freshly opened event source with an empty
    /// binding context.
    pub fn run_case(&self, case: &ScenarioCase) -> CaseResult {
        let start = Instant::now();
        let mut result = CaseResult {
            case: case.clone(),
            passed: false,
            error: None,
            details: None,
            diff: None,
            failed_step: None,
            step_count: case.steps.len(),
            mismatch_path: None,
            matched_lines: Vec::new(),
            lines_read: 0,
            elapsed: Duration::ZERO,
        };

        let steps = match Self::build_steps(case) {
            Ok(steps) => steps,
            Err(e) => {
                result.error = Some(e.to_string());
                result.elapsed = start.elapsed();
                return result;
            }
        };
        for (step, name) in unbound_references(&steps) {
            warn!(case = %case.name, step, name = %name, "reference to a name no earlier step captures");
        }

        let mut source = match FileTail::open(&self.config.source) {
            Ok(source) => source,
            Err(e) => {
                result.error = Some(Error::from(e).to_string());
                result.elapsed = start.elapsed();
                return result;
            }
        };
        if let Some(flag) = &self.cancel {
            source = source.with_cancel(Arc::clone(flag));
        }

        let deadline = self.config.deadline.or(case.deadline);
        debug!(
            case = %case.name,
            events = %source.path().display(),
            steps = steps.len(),
            deadline = ?deadline,
            "running case"
        );

        let mut ctx = BindingContext::new();
        let mut report = WatchReport::default();
        match self
            .watcher
            .scan(&steps, deadline, &mut source, &mut ctx, &mut report)
        {
            Ok(()) => {
                info!(case = %case.name, lines = report.lines_read, "case passed");
                result.passed = true;
            }
            Err(failure) => {
                if let WatchFailure::PredicateFailure {
                    expected,
                    actual,
                    diagnostics,
                    ..
                } = &failure
                {
                    result.diff = Some((expected.to_pretty(), actual.to_pretty()));
                    result.mismatch_path = diagnostics.first().map(|m| m.path.clone());
                }
                let details = failure.details();
                result.failed_step = Some(report.matched_lines.len());
                result.error = Some(failure.to_string());
                result.details = (!details.is_empty()).then_some(details);
            }
        }
        result.matched_lines = report.matched_lines;
        result.lines_read = report.lines_read;
        result.elapsed = start.elapsed();
        result
    }

    pub fn run(&self, files: &[PathBuf], progress_tx: Option<&Sender<ProgressEvent>>) -> Vec<FileResult> {
        files
            .iter()
            .map(|path| self.run_file(path, progress_tx))
            .collect()
    }
}

fn parse_step_template(text: &str, line: usize, part: &'static str) -> Result<Template> {
    parse_template(text).map_err(|source| Error::Template { line, part, source })
}
