use crate::discover::display_path;
use crate::runner::{CaseResult, FileResult, ProgressEvent};
use evwatch_scenario::ScenarioCase;
use similar::{ChangeTag, TextDiff};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

pub struct Output {
    stdout: StandardStream,
    dot_count: usize,
}

impl Output {
    pub fn new(color: bool) -> Self {
        let color_choice = if color {
            ColorChoice::Auto
        } else {
            ColorChoice::Never
        };
        Self {
            stdout: StandardStream::stdout(color_choice),
            dot_count: 0,
        }
    }

    fn set_color(&mut self, color: Color) {
        let _ = self.stdout.set_color(ColorSpec::new().set_fg(Some(color)));
    }

    fn set_bold(&mut self) {
        let _ = self.stdout.set_color(ColorSpec::new().set_bold(true));
    }

    fn set_dim(&mut self) {
        let _ = self.stdout.set_color(ColorSpec::new().set_dimmed(true));
    }

    fn reset(&mut self) {
        let _ = self.stdout.reset();
    }

    pub fn print_progress(&mut self, event: &ProgressEvent, verbose_level: u8) {
        match event {
            ProgressEvent::CaseStart { file, name } => {
                if verbose_level >= 1 {
                    self.set_dim();
                    writeln!(self.stdout, "watching {}: {}", file, name).unwrap();
                    self.reset();
                    let _ = self.stdout.flush();
                }
            }
            ProgressEvent::CaseComplete(result) => {
                if verbose_level >= 1 {
                    self.print_verbose_result(result);
                } else {
                    self.print_dot(result);
                }
            }
        }
    }

    fn print_dot(&mut self, result: &CaseResult) {
        if result.passed {
            self.set_color(Color::Green);
            write!(self.stdout, ".").unwrap();
        } else {
            self.set_color(Color::Red);
            write!(self.stdout, "F").unwrap();
        }
        self.reset();
        let _ = self.stdout.flush();

        self.dot_count += 1;
        if self.dot_count >= 80 {
            writeln!(self.stdout).unwrap();
            self.dot_count = 0;
        }
    }

    fn print_verbose_result(&mut self, result: &CaseResult) {
        if result.passed {
            self.set_color(Color::Green);
            write!(self.stdout, "PASS").unwrap();
        } else {
            self.set_color(Color::Red);
            write!(self.stdout, "FAIL").unwrap();
        }
        self.reset();

        write!(
            self.stdout,
            " {}: {}",
            file_stem(&result.case.file_path),
            result.case.name
        )
        .unwrap();

        self.set_dim();
        writeln!(
            self.stdout,
            " [{}] {:.2}s",
            progress_summary(result),
            result.elapsed.as_secs_f64()
        )
        .unwrap();
        self.reset();
    }

    pub fn finish_progress(&mut self) {
        if self.dot_count > 0 {
            writeln!(self.stdout).unwrap();
        }
        writeln!(self.stdout).unwrap();
    }

    pub fn print_results(&mut self, results: &[FileResult], elapsed: Duration) {
        let mut total_passed = 0;
        let mut total_failed = 0;

        for file_result in results {
            let passed = file_result.passed_cases();
            let failed = file_result.results.len() - passed;
            total_passed += passed;
            total_failed += failed;
            if file_result.parse_error.is_some() {
                total_failed += 1;
            }
            self.print_file_line(file_result, passed, failed);
        }

        let unparsed: Vec<&FileResult> = results
            .iter()
            .filter(|r| r.parse_error.is_some())
            .collect();
        if !unparsed.is_empty() {
            self.print_heading("Parse Errors:");
            for file_result in &unparsed {
                let error = file_result.parse_error.as_deref().unwrap_or_default();
                writeln!(self.stdout).unwrap();
                self.print_error(&file_result.file_path, error);
            }
        }

        if total_failed > unparsed.len() {
            self.print_heading("Failures:");
            for file_result in results {
                for result in file_result.results.iter().filter(|r| !r.passed) {
                    self.print_failure(result);
                }
            }
        }

        writeln!(self.stdout).unwrap();
        let elapsed_str = format!(" in {:.2}s", elapsed.as_secs_f64());

        if total_failed == 0 {
            self.set_color(Color::Green);
            self.set_bold();
            write!(self.stdout, "All {} cases passed", total_passed).unwrap();
            self.reset();
            writeln!(self.stdout, "{}", elapsed_str).unwrap();
        } else {
            self.set_bold();
            write!(self.stdout, "Summary:").unwrap();
            self.reset();
            writeln!(
                self.stdout,
                " {} passed, {} failed{}",
                total_passed, total_failed, elapsed_str
            )
            .unwrap();
        }
    }

    fn print_file_line(&mut self, file_result: &FileResult, passed: usize, failed: usize) {
        let name = display_path(&file_result.file_path);
        let color = if file_result.passed() {
            Color::Green
        } else {
            Color::Red
        };
        self.set_color(color);
        write!(self.stdout, "{}", name.display()).unwrap();
        self.reset();
        if file_result.parse_error.is_some() {
            writeln!(self.stdout, ": not parsed").unwrap();
            return;
        }
        write!(self.stdout, ": {} passed", passed).unwrap();
        if failed > 0 {
            write!(self.stdout, ", {} failed", failed).unwrap();
        }
        self.set_dim();
        writeln!(self.stdout, " ({:.2}s)", file_result.elapsed.as_secs_f64()).unwrap();
        self.reset();
    }

    fn print_heading(&mut self, title: &str) {
        writeln!(self.stdout).unwrap();
        self.set_color(Color::Red);
        self.set_bold();
        writeln!(self.stdout, "{}", title).unwrap();
        self.reset();
    }

    /// A failed case: where it is defined, which step it stopped at, the
    /// lines matched before that, then the watcher's own explanation.
    fn print_failure(&mut self, result: &CaseResult) {
        let case = &result.case;
        writeln!(self.stdout).unwrap();
        self.set_color(Color::Red);
        write!(self.stdout, "✗").unwrap();
        self.reset();
        write!(self.stdout, " {}", case.name).unwrap();
        self.set_dim();
        writeln!(
            self.stdout,
            " ({}:{}-{})",
            display_path(&case.file_path).display(),
            case.start_line,
            case.end_line
        )
        .unwrap();
        self.reset();

        if let Some(step) = result.failed_step {
            writeln!(
                self.stdout,
                "  stopped at step [{}] of {}, {} line(s) read",
                step, result.step_count, result.lines_read
            )
            .unwrap();
            if !result.matched_lines.is_empty() {
                let matched: Vec<String> = result
                    .matched_lines
                    .iter()
                    .enumerate()
                    .map(|(i, line)| format!("[{}] line {}", i, line))
                    .collect();
                writeln!(self.stdout, "  matched: {}", matched.join(", ")).unwrap();
            }
        }
        if let Some(path) = &result.mismatch_path {
            writeln!(self.stdout, "  first mismatch at {}", path).unwrap();
        }
        if let Some(error) = &result.error {
            writeln!(self.stdout, "  Error: {}", error).unwrap();
        }
        if let Some(details) = &result.details {
            for line in details.lines() {
                writeln!(self.stdout, "    {}", line).unwrap();
            }
        }
        if let Some((expected, actual)) = &result.diff {
            writeln!(self.stdout).unwrap();
            self.print_diff(expected, actual);
        }
    }

    pub fn print_diff(&mut self, expected: &str, actual: &str) {
        let diff = TextDiff::from_lines(expected, actual);

        for (idx, group) in diff.grouped_ops(3).iter().enumerate() {
            if idx > 0 {
                writeln!(self.stdout, "...").unwrap();
            }

            for op in group {
                for change in diff.iter_changes(op) {
                    let (sign, color) = match change.tag() {
                        ChangeTag::Delete => ("-", Color::Red),
                        ChangeTag::Insert => ("+", Color::Green),
                        ChangeTag::Equal => (" ", Color::White),
                    };

                    self.set_color(color);
                    write!(self.stdout, "{}{}", sign, change.value()).unwrap();
                    self.reset();
                    if change.missing_newline() {
                        writeln!(self.stdout).unwrap();
                    }
                }
            }
        }
    }

    /// Cases per file with their step count, deadline and line range, plus
    /// any problems found without running them.
    pub fn print_list(&mut self, files: &[(&Path, Vec<(ScenarioCase, Vec<String>)>)]) {
        for (path, cases) in files {
            self.set_bold();
            writeln!(self.stdout, "{}", display_path(path).display()).unwrap();
            self.reset();

            for (case, problems) in cases {
                write!(self.stdout, "  {}", case.name).unwrap();
                self.set_dim();
                write!(self.stdout, " ({} steps", case.steps.len()).unwrap();
                if let Some(deadline) = case.deadline {
                    write!(self.stdout, ", deadline {}", deadline).unwrap();
                }
                writeln!(self.stdout, ", lines {}-{})", case.start_line, case.end_line).unwrap();
                self.reset();

                for problem in problems {
                    self.set_color(Color::Yellow);
                    write!(self.stdout, "    warning:").unwrap();
                    self.reset();
                    writeln!(self.stdout, " {}", problem).unwrap();
                }
            }
        }
    }

    pub fn print_error(&mut self, path: &Path, error: &str) {
        self.set_color(Color::Red);
        write!(self.stdout, "✗").unwrap();
        self.reset();
        writeln!(self.stdout, " {}: {}", display_path(path).display(), error).unwrap();
    }
}

/// `lines 1, 2, 3 of 3 read` for a pass, `step [1] of 3` for a failure.
fn progress_summary(result: &CaseResult) -> String {
    match result.failed_step {
        Some(step) => format!("step [{}] of {}", step, result.step_count),
        None if result.passed => {
            let lines: Vec<String> = result.matched_lines.iter().map(|l| l.to_string()).collect();
            format!("lines {} of {} read", lines.join(", "), result.lines_read)
        }
        None => "not started".to_string(),
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
