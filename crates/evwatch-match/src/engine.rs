//! Structural containment check of a [`Template`] against a [`Value`].

use crate::context::BindingContext;
use crate::diagnostics::{index_path, key_path, Diagnostics, MismatchKind};
use crate::template::Template;
use crate::value::{numbers_equal, Value};

impl Template {
    /// Check that `candidate` contains this template.
    ///
    /// Captures are written into `ctx` as they are reached. On failure the
    /// returned diagnostics name the path of the first mismatch.
    pub fn matches(&self, candidate: &Value, ctx: &mut BindingContext) -> Result<(), Diagnostics> {
        self.matches_at("", candidate, ctx)
    }

    /// Like [`Template::matches`], with every reported path prefixed by `path`.
    pub fn matches_at(
        &self,
        path: &str,
        candidate: &Value,
        ctx: &mut BindingContext,
    ) -> Result<(), Diagnostics> {
        check(path, self, candidate, ctx)
    }

    /// Whether `candidate` contains this template. Bindings made by a failed
    /// probe are discarded; bindings made by a successful one are kept.
    pub fn probe(&self, candidate: &Value, ctx: &mut BindingContext) -> bool {
        ctx.transaction(|ctx| check("", self, candidate, ctx)).is_ok()
    }
}

fn type_mismatch(path: &str, expected: &'static str, actual: &Value) -> Diagnostics {
    Diagnostics::single(
        path,
        MismatchKind::TypeMismatch {
            expected,
            actual_type: actual.type_name(),
            actual: actual.to_string(),
        },
    )
}

fn scalar_mismatch(path: &str, expected: impl ToString, actual: &Value) -> Diagnostics {
    Diagnostics::single(
        path,
        MismatchKind::ScalarMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        },
    )
}

fn check(
    path: &str,
    template: &Template,
    candidate: &Value,
    ctx: &mut BindingContext,
) -> Result<(), Diagnostics> {
    match template {
        Template::Null => match candidate {
            Value::Null => Ok(()),
            _ => Err(type_mismatch(path, "null", candidate)),
        },
        Template::Bool(expected) => match candidate {
            Value::Bool(actual) if actual == expected => Ok(()),
            Value::Bool(_) => Err(scalar_mismatch(path, template, candidate)),
            _ => Err(type_mismatch(path, "bool", candidate)),
        },
        Template::Number(expected) => match candidate {
            Value::Number(actual) if numbers_equal(expected, actual) => Ok(()),
            Value::Number(_) => Err(scalar_mismatch(path, template, candidate)),
            _ => Err(type_mismatch(path, "number", candidate)),
        },
        Template::String(expected) => match candidate {
            Value::String(actual) if actual == expected => Ok(()),
            Value::String(_) => Err(scalar_mismatch(path, template, candidate)),
            _ => Err(type_mismatch(path, "string", candidate)),
        },
        Template::Exactly(expected) => check_exact(path, expected, candidate),
        Template::Capture(name) => {
            ctx.bind(name.clone(), candidate.clone());
            Ok(())
        }
        Template::Reference(name) => match ctx.get(name) {
            Some(expected) => check_exact(path, expected, candidate),
            None => Err(Diagnostics::single(
                path,
                MismatchKind::UnboundCapture { name: name.clone() },
            )),
        },
        Template::Object(entries) => check_object(path, entries, candidate, ctx),
        Template::Array(items) => check_array(path, items, candidate, ctx),
        Template::Unordered(items) => check_unordered(path, items, candidate, ctx, false),
        Template::AllOrdered(items) => check_unordered(path, items, candidate, ctx, true),
        Template::Missing(items) => check_missing(path, items, candidate, ctx),
    }
}

/// Deep equality with a path to the first difference.
fn check_exact(path: &str, expected: &Value, actual: &Value) -> Result<(), Diagnostics> {
    match (expected, actual) {
        (Value::Null, Value::Null) => Ok(()),
        (Value::Bool(_), Value::Bool(_))
        | (Value::Number(_), Value::Number(_))
        | (Value::String(_), Value::String(_)) => {
            if expected == actual {
                Ok(())
            } else {
                Err(scalar_mismatch(path, expected, actual))
            }
        }
        (Value::Array(want), Value::Array(got)) => {
            if want.len() != got.len() {
                return Err(Diagnostics::single(
                    path,
                    MismatchKind::CardinalityMismatch {
                        expected: want.len(),
                        actual: got.len(),
                    },
                ));
            }
            for (i, (w, g)) in want.iter().zip(got).enumerate() {
                check_exact(&index_path(path, i), w, g)?;
            }
            Ok(())
        }
        (Value::Object(want), Value::Object(got)) => {
            for (key, w) in want {
                let Some(g) = got.get(key) else {
                    return Err(Diagnostics::single(
                        key_path(path, key),
                        MismatchKind::MissingKey { key: key.clone() },
                    ));
                };
                check_exact(&key_path(path, key), w, g)?;
            }
            if let Some(extra) = got.keys().find(|k| !want.contains_key(*k)) {
                return Err(Diagnostics::single(
                    key_path(path, extra),
                    MismatchKind::UnexpectedKey { key: extra.clone() },
                ));
            }
            Ok(())
        }
        _ => Err(type_mismatch(path, expected.type_name(), actual)),
    }
}

fn check_object(
    path: &str,
    entries: &[(String, Template)],
    candidate: &Value,
    ctx: &mut BindingContext,
) -> Result<(), Diagnostics> {
    let Some(map) = candidate.as_object() else {
        return Err(type_mismatch(path, "object", candidate));
    };

    for (key, template) in entries {
        let entry_path = key_path(path, key);
        let Some(value) = map.get(key) else {
            return Err(Diagnostics::single(
                entry_path,
                MismatchKind::MissingKey { key: key.clone() },
            ));
        };
        check(&entry_path, template, value, ctx)?;
    }
    Ok(())
}

fn no_assignment(
    path: &str,
    item: &Template,
    candidate: &Value,
    attempts: Vec<(usize, Diagnostics)>,
) -> Diagnostics {
    Diagnostics::single(
        path,
        MismatchKind::NoAssignmentFound {
            item: item.to_string(),
            candidate: candidate.to_string(),
            attempts,
        },
    )
}

/// Ordered containment with gaps: one forward scan over the candidate, each
/// template item taking the first compatible element after the previous one.
fn check_array(
    path: &str,
    items: &[Template],
    candidate: &Value,
    ctx: &mut BindingContext,
) -> Result<(), Diagnostics> {
    let Some(values) = candidate.as_array() else {
        return Err(type_mismatch(path, "array", candidate));
    };

    let mut cursor = 0;
    for (i, item) in items.iter().enumerate() {
        let item_path = index_path(path, i);
        let mut attempts = Vec::new();
        loop {
            let Some(value) = values.get(cursor) else {
                return Err(no_assignment(path, item, candidate, attempts));
            };
            let result = ctx.transaction(|ctx| check(&item_path, item, value, ctx));
            cursor += 1;
            match result {
                Ok(()) => break,
                Err(diag) => attempts.push((cursor - 1, diag)),
            }
        }
    }
    Ok(())
}

/// Greedy assignment: each item claims the first unclaimed element it
/// matches, in index order, and never gives it back.
fn check_unordered(
    path: &str,
    items: &[Template],
    candidate: &Value,
    ctx: &mut BindingContext,
    exact_len: bool,
) -> Result<(), Diagnostics> {
    let Some(values) = candidate.as_array() else {
        return Err(type_mismatch(path, "array", candidate));
    };

    if exact_len && items.len() != values.len() {
        return Err(Diagnostics::single(
            path,
            MismatchKind::CardinalityMismatch {
                expected: items.len(),
                actual: values.len(),
            },
        ));
    }

    let mut claimed = vec![false; values.len()];
    for (i, item) in items.iter().enumerate() {
        let item_path = index_path(path, i);
        let mut attempts = Vec::new();
        let mut found = None;
        for (j, value) in values.iter().enumerate() {
            if claimed[j] {
                continue;
            }
            match ctx.transaction(|ctx| check(&item_path, item, value, ctx)) {
                Ok(()) => {
                    found = Some(j);
                    break;
                }
                Err(diag) => attempts.push((j, diag)),
            }
        }
        match found {
            Some(j) => claimed[j] = true,
            None => return Err(no_assignment(path, item, candidate, attempts)),
        }
    }
    Ok(())
}

fn check_missing(
    path: &str,
    items: &[Template],
    candidate: &Value,
    ctx: &mut BindingContext,
) -> Result<(), Diagnostics> {
    let Some(values) = candidate.as_array() else {
        return Err(type_mismatch(path, "array", candidate));
    };

    for (i, item) in items.iter().enumerate() {
        let item_path = index_path(path, i);
        for (j, value) in values.iter().enumerate() {
            // A negated item never leaves bindings behind, hit or miss.
            let snapshot = ctx.snapshot();
            let hit = check(&item_path, item, value, ctx).is_ok();
            ctx.restore(snapshot);
            if hit {
                return Err(Diagnostics::single(
                    item_path,
                    MismatchKind::UnexpectedMatch {
                        item: item.to_string(),
                        index: j,
                        element: value.to_string(),
                    },
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_template;

    fn json(s: &str) -> Value {
        Value::parse_line(s).unwrap()
    }

    fn contains(template: &str, value: &str) -> Result<(), Diagnostics> {
        let template = parse_template(template).unwrap();
        template.matches(&json(value), &mut BindingContext::new())
    }

    fn assert_contains(template: &str, value: &str) {
        if let Err(diag) = contains(template, value) {
            panic!("{} should contain {}:\n{}", value, template, diag);
        }
    }

    fn assert_not_contains(template: &str, value: &str) {
        assert!(
            contains(template, value).is_err(),
            "{} should not contain {}",
            value,
            template
        );
    }

    const OBJ: &str = r#"{"field": 1234, "another": "field", "array": [1, 2, 3, 4], "sub": {"f": 10, "g": false}}"#;

    #[test]
    fn test_null() {
        assert_contains("null", "null");
        assert_not_contains("null", "10");
        assert_not_contains("null", "{}");
    }

    #[test]
    fn test_exactly() {
        assert_contains("exactly([1, 2, 3])", "[1, 2, 3]");
        assert_not_contains("exactly([1, 2, 3])", "[1, 2]");
        assert_not_contains("exactly([1, 2])", "[2, 1]");
        assert_not_contains(r#"exactly({"a": 1})"#, r#"{"a": 1, "b": 2}"#);
        assert_contains(r#"exactly({"a": 1, "b": [true]})"#, r#"{"b": [true], "a": 1}"#);
    }

    #[test]
    fn test_exactly_inside_container() {
        assert_contains(r#"{"events": exactly([])}"#, r#"{"events": [], "id": 1}"#);
        assert_not_contains(r#"{"events": exactly([])}"#, r#"{"events": [1]}"#);
    }

    #[test]
    fn test_exactly_reflexive() {
        for v in ["null", "true", "1.5", r#""s""#, "[[], {}]", OBJ] {
            let value = json(v);
            Template::Exactly(value.clone())
                .matches(&value, &mut BindingContext::new())
                .unwrap();
        }
    }

    #[test]
    fn test_object_partial() {
        assert_contains(r#"{"field": 1234}"#, OBJ);
        assert_not_contains(r#"{"field": 123}"#, OBJ);
        assert_not_contains(r#"{"fiel": 1234}"#, OBJ);
        assert_contains(r#"{"sub": {}}"#, OBJ);
        assert_contains(r#"{"sub": {"g": false}}"#, OBJ);
        assert_not_contains(r#"{"sub": {"g": true}}"#, OBJ);
        assert_contains(r#"{"field": 1234}"#, r#"{"field": 1234, "other": "x"}"#);
    }

    #[test]
    fn test_object_type_mismatch() {
        let diag = contains(r#"{"a": 1}"#, "[1]").unwrap_err();
        assert!(matches!(
            diag.first().unwrap().kind,
            MismatchKind::TypeMismatch { expected: "object", .. }
        ));
    }

    #[test]
    fn test_array_gapful_ordered() {
        assert_contains(r#"{"array": [2, 4]}"#, OBJ);
        assert_not_contains(r#"{"array": [4, 2]}"#, OBJ);
        assert_not_contains(r#"{"array": [0]}"#, OBJ);
        assert_not_contains(r#"{"array": [5]}"#, OBJ);
        assert_contains("[2, 4]", "[1, 2, 3, 4]");
        assert_not_contains("[4, 2]", "[1, 2, 3, 4]");
    }

    #[test]
    fn test_array_consumes_positions() {
        assert_not_contains("[2, 2]", "[1, 2, 3]");
        assert_contains("[2, 2]", "[2, 1, 2]");
    }

    #[test]
    fn test_unordered() {
        assert_contains(r#"{"array": unordered(2, 4)}"#, OBJ);
        assert_contains(r#"{"array": unordered(4, 2)}"#, OBJ);
        assert_not_contains(r#"{"array": unordered(2, 4, 5)}"#, OBJ);
        assert_not_contains(r#"{"array": unordered(2, 2)}"#, OBJ);
        assert_contains("unordered(1, 2)", "[2, 1]");
    }

    #[test]
    fn test_unordered_greedy_commits_first_match() {
        // Item 0 claims element 0, leaving nothing for item 1.
        let template = r#"unordered({"a": 1}, {"a": 1, "b": 2})"#;
        assert_not_contains(template, r#"[{"a": 1, "b": 2}, {"a": 1}]"#);
        assert_contains(template, r#"[{"a": 1}, {"a": 1, "b": 2}]"#);
    }

    #[test]
    fn test_all_ordered() {
        assert_contains("all_ordered(1, 2)", "[2, 1]");
        assert_not_contains("all_ordered(1, 2)", "[2, 1, 3]");
        let diag = contains("all_ordered(1, 2)", "[2, 1, 3]").unwrap_err();
        assert_eq!(
            diag.first().unwrap().kind,
            MismatchKind::CardinalityMismatch {
                expected: 2,
                actual: 3
            }
        );
    }

    #[test]
    fn test_missing() {
        assert_contains(r#"{"array": missing(5)}"#, OBJ);
        assert_not_contains(r#"{"array": missing(5, 4)}"#, OBJ);
        assert_contains(r#"{"a": missing({"f": 5})}"#, r#"{"a": [null, 10, "Self", {"f": 4}]}"#);
        assert_not_contains(
            r#"{"a": missing({"f": 5})}"#,
            r#"{"a": [null, 10, "Self", {"f": 4}, {"f": 5}]}"#,
        );
        assert_contains("missing(1)", "[2, 3]");
        assert_not_contains("missing(1)", "[1, 2]");
    }

    #[test]
    fn test_missing_reports_element() {
        let diag = contains("missing(3, 4)", "[1, 4]").unwrap_err();
        let entry = diag.first().unwrap();
        assert_eq!(entry.path, "[1]");
        assert!(matches!(entry.kind, MismatchKind::UnexpectedMatch { index: 1, .. }));
    }

    #[test]
    fn test_combinators_require_array() {
        for t in ["unordered(1)", "all_ordered(1)", "missing(1)", "[1]"] {
            let diag = contains(t, r#"{"a": 1}"#).unwrap_err();
            assert!(matches!(
                diag.first().unwrap().kind,
                MismatchKind::TypeMismatch { expected: "array", .. }
            ));
        }
    }

    #[test]
    fn test_scalars() {
        assert_contains("true", "true");
        assert_not_contains("true", "false");
        assert_not_contains("1", r#""1""#);
        assert_contains("1", "1.0");
        assert_contains(r#""x""#, r#""x""#);
        let diag = contains(r#""x""#, r#""y""#).unwrap_err();
        assert!(matches!(diag.first().unwrap().kind, MismatchKind::ScalarMismatch { .. }));
    }

    #[test]
    fn test_accept_block_with_unordered_trxs() {
        assert_contains(
            r#"{"block_num": 7417, "trxs": unordered({"id": "8aa6e455", "status": "executed"}), "msg_type": "AcceptBlock"}"#,
            r#"{"validated": true, "events": [], "block_time": "2019-06-28T02:02:33.000", "trxs": [{"storage_kbytes": 0, "cpu_usage_us": 403, "id": "8aa6e455", "net_usage_words": 13, "status": "executed"}], "block_num": 7417, "msg_type": "AcceptBlock"}"#,
        );
    }

    #[test]
    fn test_capture_then_reference() {
        let mut ctx = BindingContext::new();
        let event = json(r#"{"id": "c31ef3cb", "msg_type": "ApplyTrx", "block_num": 780}"#);
        parse_template(r#"{"id": capture(trx_id), "msg_type": "ApplyTrx"}"#)
            .unwrap()
            .matches(&event, &mut ctx)
            .unwrap();
        assert_eq!(ctx.get("trx_id"), Some(&Value::from("c31ef3cb")));

        let block = json(r#"{"msg_type": "AcceptBlock", "trxs": [{"id": "c31ef3cb"}]}"#);
        parse_template(r#"{"trxs": unordered({"id": ref(trx_id)})}"#)
            .unwrap()
            .matches(&block, &mut ctx)
            .unwrap();
        assert!(parse_template(r#"{"trxs": missing({"id": ref(trx_id)})}"#)
            .unwrap()
            .matches(&block, &mut ctx)
            .is_err());
    }

    #[test]
    fn test_capture_round_trip_any_value() {
        for v in ["null", "false", "42", r#""s""#, "[1, [2]]", OBJ] {
            let value = json(v);
            let mut ctx = BindingContext::new();
            Template::capture("x").matches(&value, &mut ctx).unwrap();
            Template::reference("x").matches(&value, &mut ctx).unwrap();
        }
    }

    #[test]
    fn test_reference_is_exact() {
        let mut ctx = BindingContext::new();
        ctx.bind("v", json(r#"{"a": 1}"#));
        assert!(Template::reference("v")
            .matches(&json(r#"{"a": 1, "b": 2}"#), &mut ctx)
            .is_err());
    }

    #[test]
    fn test_reference_within_same_template() {
        let mut ctx = BindingContext::new();
        let t = parse_template(r#"{"a": capture(x), "b": ref(x)}"#).unwrap();
        t.matches(&json(r#"{"a": 5, "b": 5}"#), &mut ctx).unwrap();
        assert!(t.matches(&json(r#"{"a": 5, "b": 6}"#), &mut ctx).is_err());
    }

    #[test]
    fn test_unbound_reference() {
        let diag = contains(r#"{"id": ref(nope)}"#, r#"{"id": 1}"#).unwrap_err();
        let entry = diag.first().unwrap();
        assert_eq!(entry.path, r#"["id"]"#);
        assert_eq!(
            entry.kind,
            MismatchKind::UnboundCapture {
                name: "nope".to_string()
            }
        );
    }

    #[test]
    fn test_probe_rolls_back_failed_captures() {
        let mut ctx = BindingContext::new();
        let t = parse_template(r#"{"id": capture(id), "kind": "wanted"}"#).unwrap();
        assert!(!t.probe(&json(r#"{"id": 1, "kind": "other"}"#), &mut ctx));
        assert!(!ctx.contains("id"));
        assert!(t.probe(&json(r#"{"id": 2, "kind": "wanted"}"#), &mut ctx));
        assert_eq!(ctx.get("id"), Some(&Value::from(2i64)));
    }

    #[test]
    fn test_probe_no_stale_binding_between_candidates() {
        let mut ctx = BindingContext::new();
        let t = parse_template(r#"{"a": capture(x), "b": ref(x)}"#).unwrap();
        assert!(!t.probe(&json(r#"{"a": 1, "b": 2}"#), &mut ctx));
        assert!(!ctx.contains("x"));
        assert!(t.probe(&json(r#"{"a": 3, "b": 3}"#), &mut ctx));
    }

    #[test]
    fn test_failed_attempts_do_not_leak_bindings() {
        let mut ctx = BindingContext::new();
        let t = parse_template(r#"unordered({"tag": capture(t), "ok": true})"#).unwrap();
        t.matches(&json(r#"[{"tag": "a", "ok": false}, {"tag": "b", "ok": true}]"#), &mut ctx)
            .unwrap();
        assert_eq!(ctx.get("t"), Some(&Value::from("b")));

        let mut ctx = BindingContext::new();
        let t = parse_template(r#"missing({"tag": capture(t)})"#).unwrap();
        assert!(t.matches(&json("[1, 2]"), &mut ctx).is_ok());
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_nested_path_in_diagnostics() {
        let template = r#"{"events": [{"args": {"sender_id": 5}}]}"#;
        let diag = contains(template, r#"{"events": [{"args": {"sender_id": 6}}]}"#).unwrap_err();
        let text = diag.to_string();
        assert!(text.contains(r#"["events"]"#), "{}", text);
        assert!(text.contains(r#"["events"][0]["args"]["sender_id"]: expected 5, got 6"#), "{}", text);
    }

    #[test]
    fn test_unordered_reports_all_attempts() {
        let diag = contains("unordered(5)", "[1, 2]").unwrap_err();
        match &diag.first().unwrap().kind {
            MismatchKind::NoAssignmentFound { attempts, .. } => {
                let indices: Vec<_> = attempts.iter().map(|(i, _)| *i).collect();
                assert_eq!(indices, vec![0, 1]);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_matches_at_prefixes_path() {
        let t = parse_template(r#"{"a": 1}"#).unwrap();
        let diag = t
            .matches_at("events[2]", &json(r#"{"a": 2}"#), &mut BindingContext::new())
            .unwrap_err();
        assert_eq!(diag.first().unwrap().path, r#"events[2]["a"]"#);
    }
}
