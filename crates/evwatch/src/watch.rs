//! Scanning an event stream for an ordered sequence of steps.
//!
//! Each line is one JSON event. The watcher probes the current step's
//! selector against every new event; the first event it accepts must also
//! satisfy the step's predicate, otherwise the watch fails on the spot.
//! Events of the marker type carry a progress counter (a block number) that
//! bounds how far the watcher scans before giving up.

use crate::config::WatchConfig;
use crate::source::{LineSource, SourceError};
use evwatch_match::{BindingContext, Diagnostics, Template, Value};
use evwatch_scenario::Deadline;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// One expected event: `selector` picks it out of the stream, `predicate`
/// must then hold for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub selector: Template,
    pub predicate: Template,
}

impl Step {
    pub fn new(selector: Template, predicate: Template) -> Self {
        Self {
            selector,
            predicate,
        }
    }

    /// A step whose predicate accepts anything the selector picked.
    pub fn select(selector: Template) -> Self {
        Self::new(selector, Template::Object(Vec::new()))
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.predicate {
            Template::Object(entries) if entries.is_empty() => write!(f, "{}", self.selector),
            predicate => write!(f, "{} ~ {}", self.selector, predicate),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchReport {
    /// 1-based line number (counted from where the source started) at which
    /// each step matched.
    pub matched_lines: Vec<usize>,
    pub lines_read: usize,
    /// The bound that was in force, once known.
    pub deadline: Option<u64>,
}

#[derive(Error, Debug)]
pub enum WatchFailure {
    #[error("line {line_no} is not a valid event: {message}")]
    ParseFailure {
        line_no: usize,
        line: String,
        message: String,
    },

    #[error("missed events at progress {progress} (deadline {deadline}): {} step(s) not seen", .remaining.len())]
    DeadlineExceeded {
        deadline: u64,
        progress: u64,
        step: usize,
        remaining: Vec<String>,
        lines: Vec<String>,
    },

    #[error("event at line {line_no} matched step {step} but not its predicate")]
    PredicateFailure {
        step: usize,
        line_no: usize,
        line: String,
        expected: Template,
        actual: Value,
        diagnostics: Diagnostics,
    },

    #[error("event stream ended with {} step(s) not seen", .remaining.len())]
    SourceExhausted {
        step: usize,
        remaining: Vec<String>,
        lines: Vec<String>,
    },

    #[error(transparent)]
    Source(#[from] SourceError),
}

impl WatchFailure {
    /// Multi-line explanation to print under the one-line message.
    pub fn details(&self) -> String {
        let mut out = String::new();
        match self {
            WatchFailure::ParseFailure { line, .. } => {
                out.push_str(&format!("line: {}\n", line));
            }
            WatchFailure::DeadlineExceeded {
                step,
                remaining,
                lines,
                ..
            }
            | WatchFailure::SourceExhausted {
                step,
                remaining,
                lines,
            } => {
                out.push_str("remaining steps:\n");
                for (offset, text) in remaining.iter().enumerate() {
                    out.push_str(&format!("  [{}] {}\n", step + offset, text));
                }
                out.push_str(&format!("lines read since last match ({}):\n", lines.len()));
                for line in lines {
                    out.push_str(&format!("  {}\n", line));
                }
            }
            WatchFailure::PredicateFailure {
                expected,
                actual,
                diagnostics,
                ..
            } => {
                out.push_str(&format!("expected: {}\n", expected));
                out.push_str(&format!("actual: {}\n", actual));
                out.push_str(&diagnostics.to_string());
                if !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            WatchFailure::Source(_) => {}
        }
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct Watcher {
    config: WatchConfig,
}

impl Watcher {
    pub fn new(config: WatchConfig) -> Self {
        Self { config }
    }

    /// Reads `source` until every step has matched in order.
    ///
    /// A line is first tried against the current step; only when it does not
    /// match is it checked as a deadline marker, and the watch fails once the
    /// marker's progress reaches the bound. Without a deadline the watch runs
    /// until the source is exhausted.
    ///
    /// Blank lines are skipped but still counted in line numbers. Every other
    /// line must hold a JSON object.
    pub fn wait_for_sequence<S: LineSource + ?Sized>(
        &self,
        steps: &[Step],
        deadline: Option<Deadline>,
        source: &mut S,
        ctx: &mut BindingContext,
    ) -> Result<WatchReport, WatchFailure> {
        let mut report = WatchReport::default();
        self.scan(steps, deadline, source, ctx, &mut report)?;
        Ok(report)
    }

    /// [`wait_for_sequence`](Self::wait_for_sequence) writing into `report`,
    /// so the lines matched before a failure stay available.
    pub fn scan<S: LineSource + ?Sized>(
        &self,
        steps: &[Step],
        deadline: Option<Deadline>,
        source: &mut S,
        ctx: &mut BindingContext,
        report: &mut WatchReport,
    ) -> Result<(), WatchFailure> {
        let (mut bound, mut relative) = match deadline {
            Some(Deadline::At(n)) => (Some(n), None),
            Some(Deadline::After(n)) => (None, Some(n)),
            None => (None, None),
        };
        report.deadline = bound;
        let mut lines: Vec<String> = Vec::new();
        let mut step = 0;

        while step < steps.len() {
            let Some(line) = source.next_line()? else {
                warn!(step, "event stream ended before all steps matched");
                return Err(WatchFailure::SourceExhausted {
                    step,
                    remaining: render_steps(&steps[step..]),
                    lines,
                });
            };
            report.lines_read += 1;
            let line_no = report.lines_read;
            if line.trim().is_empty() {
                continue;
            }

            let event = match Value::parse_line(&line) {
                Ok(event) => event,
                Err(e) => {
                    warn!(line_no, "malformed event line");
                    return Err(WatchFailure::ParseFailure {
                        line_no,
                        line,
                        message: e.to_string(),
                    });
                }
            };
            if event.as_object().is_none() {
                warn!(line_no, "event is not a JSON object");
                return Err(WatchFailure::ParseFailure {
                    line_no,
                    line,
                    message: format!("expected a JSON object, got {}", event.type_name()),
                });
            }

            let progress = self.marker_progress(&event);
            if let (Some(progress), Some(n)) = (progress, relative) {
                let resolved = progress.saturating_add(n);
                debug!(progress, deadline = resolved, "resolved relative deadline");
                bound = Some(resolved);
                relative = None;
                report.deadline = bound;
            }

            let current = &steps[step];
            if current.selector.probe(&event, ctx) {
                let path = format!("events[{}]", step);
                if let Err(diagnostics) = current.predicate.matches_at(&path, &event, ctx) {
                    warn!(step, line_no, "event matched selector but not predicate");
                    return Err(WatchFailure::PredicateFailure {
                        step,
                        line_no,
                        line,
                        expected: current.predicate.clone(),
                        actual: event,
                        diagnostics,
                    });
                }
                info!(step, line_no, "found event for step {}", step);
                report.matched_lines.push(line_no);
                lines.clear();
                step += 1;
                continue;
            }

            lines.push(line);
            if let (Some(progress), Some(limit)) = (progress, bound) {
                if progress >= limit {
                    warn!(progress, deadline = limit, step, "deadline reached");
                    return Err(WatchFailure::DeadlineExceeded {
                        deadline: limit,
                        progress,
                        step,
                        remaining: render_steps(&steps[step..]),
                        lines,
                    });
                }
            }
            debug!(line_no, step, "skipped event");
        }

        Ok(())
    }

    /// Progress carried by a marker event, if `event` is one.
    fn marker_progress(&self, event: &Value) -> Option<u64> {
        let kind = event.get(&self.config.type_field)?.as_str()?;
        if kind != self.config.marker_type {
            return None;
        }
        let progress = event.get(&self.config.progress_field)?.as_u64();
        if progress.is_none() {
            debug!(
                field = %self.config.progress_field,
                "marker event without a numeric progress field"
            );
        }
        progress
    }
}

/// References no earlier template captures, as `(step index, name)`.
///
/// Selectors are evaluated before predicates, and a capture earlier in the
/// same template counts as bound. Such a reference can never match unless it
/// sits under `missing(...)`.
pub fn unbound_references(steps: &[Step]) -> Vec<(usize, String)> {
    let mut bound: HashSet<&str> = HashSet::new();
    let mut unbound = Vec::new();
    for (i, step) in steps.iter().enumerate() {
        for template in [&step.selector, &step.predicate] {
            let captures = template.captures();
            for name in template.references() {
                if bound.contains(name) || captures.contains(&name) {
                    continue;
                }
                let entry = (i, name.to_string());
                if !unbound.contains(&entry) {
                    unbound.push(entry);
                }
            }
            bound.extend(captures);
        }
    }
    unbound
}

fn render_steps(steps: &[Step]) -> Vec<String> {
    steps.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use evwatch_match::parse_template;

    fn step(selector: &str, predicate: &str) -> Step {
        Step::new(
            parse_template(selector).unwrap(),
            parse_template(predicate).unwrap(),
        )
    }

    fn trx_steps() -> Vec<Step> {
        vec![
            step(
                r#"{"msg_type": "AcceptTrx"}"#,
                r#"{"accepted": true, "id": capture(trx_id)}"#,
            ),
            step(
                r#"{"msg_type": "ApplyTrx", "id": ref(trx_id)}"#,
                r#"{"block_num": capture(block)}"#,
            ),
            step(
                r#"{"msg_type": "AcceptBlock", "block_num": ref(block)}"#,
                r#"{"trxs": unordered({"id": ref(trx_id)})}"#,
            ),
        ]
    }

    fn watch(lines: &[&str], deadline: Option<Deadline>) -> Result<WatchReport, WatchFailure> {
        let mut source = MemorySource::new(lines.iter().copied());
        let mut ctx = BindingContext::new();
        Watcher::default().wait_for_sequence(&trx_steps(), deadline, &mut source, &mut ctx)
    }

    const ACCEPT: &str = r#"{"msg_type": "AcceptTrx", "accepted": true, "id": "8aa6"}"#;
    const APPLY: &str = r#"{"msg_type": "ApplyTrx", "id": "8aa6", "block_num": 11}"#;
    const BLOCK: &str =
        r#"{"msg_type": "AcceptBlock", "block_num": 11, "trxs": [{"id": "0001"}, {"id": "8aa6"}]}"#;

    #[test]
    fn test_sequence_succeeds() {
        let report = watch(&[ACCEPT, APPLY, BLOCK], Some(Deadline::At(15))).unwrap();
        assert_eq!(report.matched_lines, vec![1, 2, 3]);
        assert_eq!(report.lines_read, 3);
        assert_eq!(report.deadline, Some(15));
    }

    #[test]
    fn test_unrelated_events_skipped() {
        let other = r#"{"msg_type": "AcceptTrx", "accepted": true, "id": "ffff"}"#;
        let report = watch(
            &[
                r#"{"msg_type": "AcceptBlock", "block_num": 10, "trxs": []}"#,
                ACCEPT,
                other,
                APPLY,
                BLOCK,
            ],
            Some(Deadline::At(15)),
        )
        .unwrap();
        assert_eq!(report.matched_lines, vec![2, 4, 5]);
    }

    #[test]
    fn test_deadline_exceeded_lists_block_step() {
        let early_block = r#"{"msg_type": "AcceptBlock", "block_num": 12, "trxs": []}"#;
        let err = watch(&[ACCEPT, APPLY, early_block, BLOCK], Some(Deadline::At(12))).unwrap_err();
        match &err {
            WatchFailure::DeadlineExceeded {
                deadline,
                progress,
                step,
                remaining,
                lines,
            } => {
                assert_eq!(*deadline, 12);
                assert_eq!(*progress, 12);
                assert_eq!(*step, 2);
                assert_eq!(remaining.len(), 1);
                assert!(remaining[0].contains("AcceptBlock"));
                assert_eq!(lines, &vec![early_block.to_string()]);
            }
            other => panic!("expected DeadlineExceeded, got {:?}", other),
        }
        assert!(err.to_string().starts_with("missed events"));
        assert!(err.details().contains("[2] {\"msg_type\": \"AcceptBlock\""));
    }

    #[test]
    fn test_marker_that_matches_is_not_a_deadline() {
        // The matching block itself sits at the bound.
        let report = watch(&[ACCEPT, APPLY, BLOCK], Some(Deadline::At(11))).unwrap();
        assert_eq!(report.matched_lines, vec![1, 2, 3]);
    }

    #[test]
    fn test_below_bound_keeps_scanning() {
        let block10 = r#"{"msg_type": "AcceptBlock", "block_num": 10}"#;
        let report = watch(&[ACCEPT, block10, APPLY, BLOCK], Some(Deadline::At(11))).unwrap();
        assert_eq!(report.matched_lines, vec![1, 3, 4]);
    }

    #[test]
    fn test_relative_deadline() {
        let block = |n: u64| format!(r#"{{"msg_type": "AcceptBlock", "block_num": {}}}"#, n);
        let (b5, b6, b7) = (block(5), block(6), block(7));
        let err = watch(
            &[b5.as_str(), ACCEPT, b6.as_str(), b7.as_str()],
            Some(Deadline::After(2)),
        )
        .unwrap_err();
        match err {
            WatchFailure::DeadlineExceeded {
                deadline, progress, ..
            } => {
                assert_eq!(deadline, 7);
                assert_eq!(progress, 7);
            }
            other => panic!("expected DeadlineExceeded, got {:?}", other),
        }
    }

    #[test]
    fn test_no_deadline_runs_to_exhaustion() {
        let err = watch(&[ACCEPT, r#"{"msg_type": "AcceptBlock", "block_num": 999}"#], None)
            .unwrap_err();
        match err {
            WatchFailure::SourceExhausted {
                step,
                remaining,
                lines,
            } => {
                assert_eq!(step, 1);
                assert_eq!(remaining.len(), 2);
                assert_eq!(lines.len(), 1);
            }
            other => panic!("expected SourceExhausted, got {:?}", other),
        }
    }

    #[test]
    fn test_predicate_failure_is_fatal() {
        let rejected = r#"{"msg_type": "AcceptTrx", "accepted": false, "id": "8aa6"}"#;
        let err = watch(&[rejected, ACCEPT, APPLY, BLOCK], None).unwrap_err();
        match &err {
            WatchFailure::PredicateFailure {
                step,
                line_no,
                diagnostics,
                ..
            } => {
                assert_eq!(*step, 0);
                assert_eq!(*line_no, 1);
                let first = diagnostics.first().unwrap();
                assert_eq!(first.path, r#"events[0]["accepted"]"#);
            }
            other => panic!("expected PredicateFailure, got {:?}", other),
        }
        let details = err.details();
        assert!(details.contains("expected: {\"accepted\": true"));
        assert!(details.contains("actual: "));
    }

    #[test]
    fn test_parse_failure() {
        let err = watch(&[ACCEPT, "not json"], None).unwrap_err();
        match err {
            WatchFailure::ParseFailure { line_no, line, .. } => {
                assert_eq!(line_no, 2);
                assert_eq!(line, "not json");
            }
            other => panic!("expected ParseFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_non_object_event_is_a_parse_failure() {
        for bad in ["42", "[1]", r#""AcceptTrx""#] {
            let err = watch(&[ACCEPT, bad], None).unwrap_err();
            match err {
                WatchFailure::ParseFailure { line_no, message, .. } => {
                    assert_eq!(line_no, 2);
                    assert!(message.starts_with("expected a JSON object"), "{}", message);
                }
                other => panic!("expected ParseFailure, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_blank_lines_skipped_but_counted() {
        let report = watch(&[ACCEPT, "", "  \t", APPLY, BLOCK], None).unwrap();
        assert_eq!(report.matched_lines, vec![1, 4, 5]);
        assert_eq!(report.lines_read, 5);
    }

    #[test]
    fn test_scan_keeps_progress_on_failure() {
        let mut source = MemorySource::new([ACCEPT, APPLY]);
        let mut ctx = BindingContext::new();
        let mut report = WatchReport::default();
        let err = Watcher::default()
            .scan(&trx_steps(), Some(Deadline::At(30)), &mut source, &mut ctx, &mut report)
            .unwrap_err();
        assert!(matches!(err, WatchFailure::SourceExhausted { step: 2, .. }));
        assert_eq!(report.matched_lines, vec![1, 2]);
        assert_eq!(report.lines_read, 2);
        assert_eq!(report.deadline, Some(30));
    }

    #[test]
    fn test_unbound_references() {
        assert!(unbound_references(&trx_steps()).is_empty());

        let steps = vec![
            step(r#"{"id": ref(trx_id)}"#, r#"{"block_num": capture(block)}"#),
            step(
                r#"{"block_num": ref(block), "n": capture(n)}"#,
                r#"{"prev": ref(n), "trxs": missing({"id": ref(trx_id)}), "x": ref(late)}"#,
            ),
            step(r#"{"late": capture(late)}"#, "{}"),
        ];
        assert_eq!(
            unbound_references(&steps),
            vec![
                (0, "trx_id".to_string()),
                (1, "trx_id".to_string()),
                (1, "late".to_string()),
            ]
        );
    }

    #[test]
    fn test_captures_survive_across_steps() {
        let mut source = MemorySource::new([ACCEPT, APPLY, BLOCK]);
        let mut ctx = BindingContext::new();
        Watcher::default()
            .wait_for_sequence(&trx_steps(), None, &mut source, &mut ctx)
            .unwrap();
        assert_eq!(ctx.get("trx_id"), Some(&Value::from("8aa6")));
        assert_eq!(ctx.get("block"), Some(&Value::from(11u64)));
    }

    #[test]
    fn test_failed_selector_probe_leaves_no_binding() {
        // The first ApplyTrx event is for another transaction; the probe fails
        // and must not leave `block` bound to 3.
        let other_apply = r#"{"msg_type": "ApplyTrx", "id": "ffff", "block_num": 3}"#;
        let steps = vec![
            step(r#"{"msg_type": "AcceptTrx", "id": capture(trx_id)}"#, "{}"),
            step(
                r#"{"msg_type": "ApplyTrx", "block_num": capture(block), "id": ref(trx_id)}"#,
                "{}",
            ),
        ];
        let mut source = MemorySource::new([ACCEPT, other_apply, APPLY]);
        let mut ctx = BindingContext::new();
        Watcher::default()
            .wait_for_sequence(&steps, None, &mut source, &mut ctx)
            .unwrap();
        assert_eq!(ctx.get("block"), Some(&Value::from(11u64)));
    }

    #[test]
    fn test_custom_marker() {
        let config = WatchConfig {
            type_field: "kind".to_string(),
            marker_type: "Tick".to_string(),
            progress_field: "height".to_string(),
        };
        let steps = vec![Step::select(parse_template(r#"{"kind": "Done"}"#).unwrap())];
        let mut source = MemorySource::new([r#"{"kind": "Tick", "height": 4}"#]);
        let mut ctx = BindingContext::new();
        let err = Watcher::new(config)
            .wait_for_sequence(&steps, Some(Deadline::At(4)), &mut source, &mut ctx)
            .unwrap_err();
        assert!(matches!(err, WatchFailure::DeadlineExceeded { progress: 4, .. }));
    }

    #[test]
    fn test_step_display() {
        let s = step(r#"{"msg_type": "AcceptTrx"}"#, "{}");
        assert_eq!(s.to_string(), r#"{"msg_type": "AcceptTrx"}"#);
        let s = step(r#"{"msg_type": "AcceptTrx"}"#, r#"{"accepted": true}"#);
        assert_eq!(s.to_string(), r#"{"msg_type": "AcceptTrx"} ~ {"accepted": true}"#);
    }
}
