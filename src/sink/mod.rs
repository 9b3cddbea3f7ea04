//! Result sink & severity model (spec.md §4.E, §6 "Result sink interface").
//!
//! The sink receives findings synchronously from parsers. It filters by
//! minimum severity, suppresses ignored stable tags, folds counters into
//! the active test's accumulator, and at the end produces a deterministic
//! summary: severity descending, then first-appearance order.

pub mod json;
pub mod text;

pub use json::JsonSink;
pub use text::TextSink;

use std::collections::HashSet;

use crate::model::{Accumulator, Finding, FindingKind, GlobalTotals, Severity};

/// The sink interface every output format implements. The core defines the
/// `Finding` ADT; sinks define the rendering.
pub trait ResultSink {
    fn begin_test(&mut self, name: &str);
    fn end_test(&mut self);
    fn emit(&mut self, finding: Finding);
    fn set_min_severity(&mut self, severity: Severity);
    fn add_ignored_tag(&mut self, tag: &str);
    fn render_summary(&mut self, out: &mut dyn std::io::Write) -> std::io::Result<()>;
    fn global_totals(&self) -> &GlobalTotals;

    /// True if any non-suppressed finding reached at least `High` severity.
    /// Drives the CLI's process exit code (spec.md §6).
    fn has_critical_or_high_failure(&self) -> bool;
}

/// Shared bookkeeping every concrete sink delegates to: severity filtering,
/// tag suppression, accumulator folding, and the ordered findings log that
/// backs `render_summary`.
pub struct SinkState {
    min_severity: Severity,
    ignored_tags: HashSet<String>,
    current_test: Option<String>,
    current_acc: Accumulator,
    totals: GlobalTotals,
    log: Vec<Finding>,
    saw_critical_or_high: bool,
}

impl Default for SinkState {
    fn default() -> Self {
        Self {
            min_severity: Severity::None,
            ignored_tags: HashSet::new(),
            current_test: None,
            current_acc: Accumulator::new(),
            totals: GlobalTotals::new(),
            log: Vec::new(),
            saw_critical_or_high: false,
        }
    }
}

impl SinkState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_test(&mut self, name: &str) {
        self.current_test = Some(name.to_string());
        self.current_acc = Accumulator::new();
    }

    pub fn end_test(&mut self) {
        if let Some(name) = self.current_test.take() {
            self.totals.fold_in(&name, self.current_acc);
        }
        self.current_acc = Accumulator::new();
    }

    /// Returns `Some(finding)` if it survives severity/tag filtering and
    /// should be rendered by the concrete sink; folds it into counters
    /// either way (counters reflect what the test produced, not what the
    /// configured filters chose to display, except ignored tags which are
    /// fully suppressed per spec.md §4.E step 2).
    pub fn process(&mut self, finding: Finding) -> Option<Finding> {
        if self.ignored_tags.contains(&finding.stable_tag) {
            return None;
        }
        self.current_acc.record(finding.kind);
        if finding.kind == FindingKind::Fail
            && matches!(finding.severity, Severity::Critical | Severity::High)
        {
            self.saw_critical_or_high = true;
        }
        self.log.push(finding.clone());
        if finding.kind == FindingKind::Fail && finding.severity > self.min_severity {
            // Below the configured threshold: counted, but not surfaced.
            return None;
        }
        Some(finding)
    }

    pub fn set_min_severity(&mut self, severity: Severity) {
        self.min_severity = severity;
    }

    pub fn add_ignored_tag(&mut self, tag: &str) {
        self.ignored_tags.insert(tag.to_string());
    }

    pub fn global_totals(&self) -> &GlobalTotals {
        &self.totals
    }

    pub fn has_critical_or_high_failure(&self) -> bool {
        self.saw_critical_or_high
    }

    /// Failures grouped by severity descending, then by first-appearance
    /// order, matching spec.md §4.E's deterministic ordering rule.
    pub fn failure_summary(&self) -> Vec<&Finding> {
        let mut failures: Vec<&Finding> = self
            .log
            .iter()
            .filter(|f| f.kind == FindingKind::Fail)
            .collect();
        failures.sort_by(|a, b| a.severity.cmp(&b.severity));
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FindingKind;

    #[test]
    fn ignored_tag_is_fully_suppressed_and_uncounted() {
        let mut state = SinkState::new();
        state.add_ignored_tag("ReservedNonZero");
        state.begin_test("t");
        let f = Finding::new("t", "ReservedNonZero", Severity::Medium, FindingKind::Fail, "x");
        assert!(state.process(f).is_none());
        state.end_test();
        assert_eq!(state.global_totals().totals.total(), 0);
    }

    #[test]
    fn min_severity_filters_display_but_still_counts() {
        let mut state = SinkState::new();
        state.set_min_severity(Severity::High);
        state.begin_test("t");
        let f = Finding::new("t", "Tag", Severity::Medium, FindingKind::Fail, "x");
        assert!(state.process(f).is_none());
        state.end_test();
        assert_eq!(state.global_totals().totals.failed, 1);
    }

    #[test]
    fn failure_summary_sorts_severity_descending_then_first_seen() {
        let mut state = SinkState::new();
        state.begin_test("t");
        state.process(Finding::new("t", "A", Severity::Low, FindingKind::Fail, "a"));
        state.process(Finding::new("t", "B", Severity::Critical, FindingKind::Fail, "b"));
        state.process(Finding::new("t", "C", Severity::High, FindingKind::Fail, "c"));
        state.end_test();
        let summary = state.failure_summary();
        let tags: Vec<_> = summary.iter().map(|f| f.stable_tag.as_str()).collect();
        assert_eq!(tags, vec!["B", "C", "A"]);
    }
}
