use crate::value::Value;
use std::collections::HashMap;

/// Values captured during one matching session.
///
/// A session is one top-level match or one watched sequence of steps. A later
/// capture of the same name overwrites the earlier one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingContext {
    bindings: HashMap<String, Value>,
}

/// Saved state of a [`BindingContext`], restored when a tentative match fails.
#[derive(Debug, Clone)]
pub struct Snapshot(HashMap<String, Value>);

impl BindingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bindings sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        let mut entries: Vec<_> = self.bindings.iter().map(|(k, v)| (k.as_str(), v)).collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.bindings.clone())
    }

    pub fn restore(&mut self, snapshot: Snapshot) {
        self.bindings = snapshot.0;
    }

    /// Run `f`, undoing every binding it made if it returns `Err`.
    pub fn transaction<T, E>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, E>) -> Result<T, E> {
        let snapshot = self.snapshot();
        let result = f(self);
        if result.is_err() {
            self.restore(snapshot);
        }
        result
    }
}
