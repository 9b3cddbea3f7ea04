//! Per-test counters and the global run totals they roll up into.

use serde::Serialize;

use super::finding::FindingKind;

/// Counters for a single test's run. Created at test start, sealed at test
/// end, then folded into [`GlobalTotals`].
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct Accumulator {
    pub passed: u32,
    pub failed: u32,
    pub aborted: u32,
    pub warning: u32,
    pub skipped: u32,
    pub infoonly: u32,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one finding into the relevant counter.
    ///
    /// `Advice` findings never increment a counter: spec.md §4.E says a
    /// `fail` may be followed by one `advice` finding which is associated
    /// with the failure for reporting but does not count on its own.
    pub fn record(&mut self, kind: FindingKind) {
        match kind {
            FindingKind::Pass => self.passed += 1,
            FindingKind::Fail => self.failed += 1,
            FindingKind::Skip => self.skipped += 1,
            FindingKind::Info => self.infoonly += 1,
            FindingKind::Advice => {}
        }
    }

    pub fn record_abort(&mut self) {
        self.aborted += 1;
    }

    pub fn record_warning(&mut self) {
        self.warning += 1;
    }

    pub fn total(&self) -> u32 {
        self.passed + self.failed + self.aborted + self.warning + self.skipped + self.infoonly
    }

    fn add(&mut self, other: &Accumulator) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.aborted += other.aborted;
        self.warning += other.warning;
        self.skipped += other.skipped;
        self.infoonly += other.infoonly;
    }
}

/// Global aggregate over every test that ran in this session.
#[derive(Debug, Default, Clone, Serialize)]
pub struct GlobalTotals {
    pub totals: Accumulator,
    pub per_test: Vec<(String, Accumulator)>,
}

impl GlobalTotals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fold_in(&mut self, test_name: &str, acc: Accumulator) {
        self.totals.add(&acc);
        self.per_test.push((test_name.to_string(), acc));
    }
}
