//! Begin/complete logging around a unit of work

use std::time::Instant;

use super::logger::Logger;

/// Logs `{name}_BEGIN` on creation and exactly one closing line
///
/// The closing line is `{name}_COMPLETE` (with elapsed milliseconds),
/// `{name}_FAILED`, or `{name}_INCOMPLETE` when the scope is dropped
/// without either, e.g. because the surrounding future was cancelled.
pub struct ObservationScope {
    name: &'static str,
    fields: Vec<(&'static str, String)>,
    started: Instant,
    closed: bool,
}

impl ObservationScope {
    pub fn new(name: &'static str) -> Self {
        Self::with_fields(name, Vec::new())
    }

    /// Scope whose fields are repeated on every line it logs
    pub fn with_fields(name: &'static str, fields: Vec<(&'static str, String)>) -> Self {
        let scope = Self {
            name,
            fields,
            started: Instant::now(),
            closed: false,
        };
        scope.emit(&format!("{}_BEGIN", name), &[], false);
        scope
    }

    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    pub fn complete_with_fields(mut self, extra: &[(&str, &str)]) {
        self.closed = true;
        let elapsed = self.elapsed_ms().to_string();
        let mut fields: Vec<(&str, &str)> = extra.to_vec();
        fields.push(("elapsed_ms", &elapsed));
        self.emit(&format!("{}_COMPLETE", self.name), &fields, false);
    }

    pub fn fail(mut self, reason: &str) {
        self.closed = true;
        self.emit(&format!("{}_FAILED", self.name), &[("reason", reason)], true);
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }

    fn emit(&self, event: &str, extra: &[(&str, &str)], error: bool) {
        let mut fields: Vec<(&str, &str)> = self
            .fields
            .iter()
            .map(|(k, v)| (*k, v.as_str()))
            .collect();
        fields.extend_from_slice(extra);
        if error {
            Logger::error(event, &fields);
        } else {
            Logger::info(event, &fields);
        }
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.closed {
            let event = format!("{}_INCOMPLETE", self.name);
            Logger::warn(&event, &[("reason", "scope dropped without completion")]);
        }
    }
}
