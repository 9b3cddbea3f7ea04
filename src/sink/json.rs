//! JSON result sink, built on `serde_json`.
//!
//! spec.md §1 lists JSON as one of the external "result serialisation
//! formats" the core doesn't mandate, but a working sink is still ambient
//! infrastructure a CLI in this space ships (see SPEC_FULL.md §3). This one
//! buffers findings in memory and serializes the whole run on
//! `render_summary`, rather than streaming, since downstream tooling
//! consuming a single JSON document is the common case.

use std::io::{self, Write};

use serde::Serialize;

use crate::model::{Finding, GlobalTotals, Severity};

use super::{ResultSink, SinkState};

#[derive(Serialize)]
struct JsonReport<'a> {
    totals: &'a GlobalTotals,
    findings: &'a [Finding],
}

pub struct JsonSink {
    state: SinkState,
    findings: Vec<Finding>,
}

impl JsonSink {
    pub fn new() -> Self {
        Self {
            state: SinkState::new(),
            findings: Vec::new(),
        }
    }
}

impl Default for JsonSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultSink for JsonSink {
    fn begin_test(&mut self, name: &str) {
        self.state.begin_test(name);
    }

    fn end_test(&mut self) {
        self.state.end_test();
    }

    fn emit(&mut self, finding: Finding) {
        if let Some(f) = self.state.process(finding) {
            self.findings.push(f);
        }
    }

    fn set_min_severity(&mut self, severity: Severity) {
        self.state.set_min_severity(severity);
    }

    fn add_ignored_tag(&mut self, tag: &str) {
        self.state.add_ignored_tag(tag);
    }

    fn render_summary(&mut self, out: &mut dyn Write) -> io::Result<()> {
        let report = JsonReport {
            totals: self.state.global_totals(),
            findings: &self.findings,
        };
        let text = serde_json::to_string_pretty(&report)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(out, "{text}")
    }

    fn global_totals(&self) -> &GlobalTotals {
        self.state.global_totals()
    }

    fn has_critical_or_high_failure(&self) -> bool {
        self.state.has_critical_or_high_failure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FindingKind;

    #[test]
    fn renders_valid_json() {
        let mut sink = JsonSink::new();
        sink.begin_test("madt");
        sink.emit(Finding::new(
            "madt",
            "UnknownSubtype",
            Severity::High,
            FindingKind::Fail,
            "unknown subtype 99",
        ));
        sink.end_test();
        let mut buf = Vec::new();
        sink.render_summary(&mut buf).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed["findings"][0]["stable_tag"], "UnknownSubtype");
    }
}
