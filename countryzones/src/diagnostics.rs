//! Scoped collection of validation problems.
//!
//! Validation keeps going after the first problem so the operator sees every
//! broken country in one run; everything is collected here and rendered in
//! one go at the end, each line prefixed with the scopes (country, zone)
//! that were open when it was recorded.

use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// One recorded problem, with the scope trail that was open at the time.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Entry {
    pub severity: Severity,
    pub scopes: Vec<String>,
    pub message: String,
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.severity)?;
        for scope in &self.scopes {
            write!(f, "{scope}: ")?;
        }
        f.write_str(&self.message)
    }
}

#[derive(Default, Debug)]
pub struct Diagnostics {
    scopes: Vec<String>,
    entries: Vec<Entry>,
    halt: bool,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    pub fn push_scope(&mut self, label: impl Into<String>) {
        self.scopes.push(label.into());
    }

    pub fn pop_scope(&mut self) {
        let popped = self.scopes.pop();
        debug_assert!(popped.is_some(), "pop_scope without matching push_scope");
    }

    pub fn warn(&mut self, message: impl fmt::Display) {
        self.record(Severity::Warning, message);
    }

    pub fn error(&mut self, message: impl fmt::Display) {
        self.record(Severity::Error, message);
    }

    /// Records an error and requests that processing stop as soon as the
    /// caller can manage.
    pub fn fatal(&mut self, message: impl fmt::Display) {
        self.record(Severity::Error, message);
        self.halt = true;
    }

    fn record(&mut self, severity: Severity, message: impl fmt::Display) {
        self.entries.push(Entry {
            severity,
            scopes: self.scopes.clone(),
            message: message.to_string(),
        });
    }

    pub fn halt_requested(&self) -> bool {
        self.halt
    }

    pub fn has_error(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// One line per entry, in the order they were recorded.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.to_string());
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
