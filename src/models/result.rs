use serde::{Deserialize, Serialize};

/// Outcome of a single rule
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckState {
    Pass,
    Fail,
}

/// Result of evaluating one rule against a facts snapshot.
///
/// `state` is derived from `errors`: recording an error flips the result to
/// `Fail`, and there is no way to fail without one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckResult {
    name: String,
    state: CheckState,
    errors: Vec<String>,
    suggestions: Vec<String>,
}

impl CheckResult {
    /// Start a passing result for the named rule
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: CheckState::Pass,
            errors: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Record a failure. The result becomes `Fail`.
    pub fn error(&mut self, message: impl Into<String>) -> &mut Self {
        self.errors.push(message.into());
        self.state = CheckState::Fail;
        self
    }

    pub fn suggest(&mut self, hint: impl Into<String>) -> &mut Self {
        self.suggestions.push(hint.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CheckState {
        self.state
    }

    pub fn passed(&self) -> bool {
        self.state == CheckState::Pass
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }
}

/// Report envelope written to stdout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TestStatus {
    pub results: Vec<CheckResult>,
}

impl TestStatus {
    pub fn new(results: Vec<CheckResult>) -> Self {
        Self { results }
    }
}
