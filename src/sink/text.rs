//! Plain-text result sink.
//!
//! Bracketed `[fwts]` tags narrated line by line as the run progresses,
//! rendered through a `Write` so a caller (and tests) can capture output
//! instead of going straight to stderr.

use std::io::{self, Write};

use crate::model::{Finding, FindingKind, GlobalTotals, Severity};

use super::{ResultSink, SinkState};

pub struct TextSink {
    state: SinkState,
    out: Box<dyn Write>,
}

impl TextSink {
    pub fn new(out: Box<dyn Write>) -> Self {
        Self {
            state: SinkState::new(),
            out,
        }
    }

    pub fn stderr() -> Self {
        Self::new(Box::new(io::stderr()))
    }

    fn tag_for(kind: FindingKind) -> &'static str {
        match kind {
            FindingKind::Pass => "PASSED",
            FindingKind::Fail => "FAILED",
            FindingKind::Skip => "SKIPPED",
            FindingKind::Advice => "ADVICE",
            FindingKind::Info => "INFO",
        }
    }
}

impl ResultSink for TextSink {
    fn begin_test(&mut self, name: &str) {
        self.state.begin_test(name);
        let _ = writeln!(self.out, "[fwts] test: {name}");
    }

    fn end_test(&mut self) {
        self.state.end_test();
    }

    fn emit(&mut self, finding: Finding) {
        if let Some(f) = self.state.process(finding) {
            let loc = match (&f.table_ctx, f.offset) {
                (Some(t), Some(o)) => format!(" [{t}+{o:#x}]"),
                (Some(t), None) => format!(" [{t}]"),
                _ => String::new(),
            };
            let _ = writeln!(
                self.out,
                "[fwts]   {:<7} {:<24} {} severity={}{}",
                Self::tag_for(f.kind),
                f.stable_tag,
                f.text,
                f.severity,
                loc
            );
        }
    }

    fn set_min_severity(&mut self, severity: Severity) {
        self.state.set_min_severity(severity);
    }

    fn add_ignored_tag(&mut self, tag: &str) {
        self.state.add_ignored_tag(tag);
    }

    fn render_summary(&mut self, out: &mut dyn Write) -> io::Result<()> {
        let totals: &GlobalTotals = self.state.global_totals();
        writeln!(out, "[fwts] === summary ===")?;
        for (name, acc) in &totals.per_test {
            writeln!(
                out,
                "[fwts] {name:<24} passed={} failed={} aborted={} warning={} skipped={} info={}",
                acc.passed, acc.failed, acc.aborted, acc.warning, acc.skipped, acc.infoonly
            )?;
        }
        writeln!(
            out,
            "[fwts] TOTAL passed={} failed={} aborted={} warning={} skipped={} info={}",
            totals.totals.passed,
            totals.totals.failed,
            totals.totals.aborted,
            totals.totals.warning,
            totals.totals.skipped,
            totals.totals.infoonly
        )?;
        writeln!(out, "[fwts] failure summary:")?;
        for f in self.state.failure_summary() {
            writeln!(out, "[fwts]   {} {} - {}", f.severity, f.stable_tag, f.text)?;
        }
        Ok(())
    }

    fn global_totals(&self) -> &GlobalTotals {
        self.state.global_totals()
    }

    fn has_critical_or_high_failure(&self) -> bool {
        self.state.has_critical_or_high_failure()
    }
}
