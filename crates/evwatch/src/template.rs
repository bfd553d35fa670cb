//! `{{ NAME }}` substitution applied to scenario files before parsing.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").expect("valid regex"));

#[derive(Debug, Default, Clone)]
pub struct TemplateVars {
    vars: HashMap<String, String>,
}

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Explicit variables win over the environment; unknown names are left as written.
    pub fn apply(&self, text: &str) -> String {
        VAR_RE
            .replace_all(text, |caps: &regex::Captures| {
                let var_name = &caps[1];
                if let Some(value) = self.vars.get(var_name) {
                    value.clone()
                } else if let Ok(value) = std::env::var(var_name) {
                    value
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned()
    }
}
