//! Test harness (spec.md §4.F): static registration, ordering, per-test
//! init/deinit, minor-test sequencing, skip/abort semantics, progress
//! reporting, and cooperative cancellation.

pub mod manifest;

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use bitflags::bitflags;

use crate::model::{Finding, FindingKind, Severity};
use crate::registry::TableRegistry;
use crate::sink::ResultSink;

pub use manifest::MinorTestFn;

bitflags! {
    /// Per-test capability/applicability flags, named directly after
    /// spec.md §4.F's `{Batch, Interactive, RootPriv, Acpi, Uefi, Sbbr,
    /// Ebbr, ...}` set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u16 {
        /// Runs unattended with no terminal interaction.
        const BATCH       = 0b0000_0001;
        /// Needs a terminal / user present.
        const INTERACTIVE = 0b0000_0010;
        /// Needs elevated privilege to acquire its tables (e.g. `/dev/mem`).
        const ROOT_PRIV   = 0b0000_0100;
        /// Applies to ACPI firmware.
        const ACPI        = 0b0000_1000;
        /// Applies to UEFI firmware.
        const UEFI        = 0b0001_0000;
        /// Server Base Boot Requirements profile.
        const SBBR        = 0b0010_0000;
        /// Embedded Base Boot Requirements profile.
        const EBBR        = 0b0100_0000;
    }
}

/// The bucket a test's `ordering` field places it in. Tests run sorted by
/// bucket, then by registration order within the bucket (spec.md §4.F step
/// 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Ordering {
    First,
    Early,
    Anytime,
    Last,
}

/// What a minor test returns (spec.md §4.F step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinorTestResult {
    Ok,
    Error,
    Skip,
    Abort,
}

/// What a test's `init` hook returns (spec.md §4.F step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitResult {
    Continue,
    Skip,
    Error,
}

pub type InitFn = fn(&TableRegistry) -> InitResult;
pub type DeinitFn = fn(&TableRegistry);

/// One registered table parser, as described in spec.md §4.F's
/// `{name, description, minor_tests, ordering, flags, init, deinit}`.
pub struct TestDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub ordering: Ordering,
    pub flags: Flags,
    pub minor_tests: Vec<(&'static str, MinorTestFn)>,
    pub init: Option<InitFn>,
    pub deinit: Option<DeinitFn>,
}

/// A run-wide cooperative cancellation flag (spec.md §4.F "Cancellation"),
/// checked between minor tests and at progress callback points. Cheaply
/// cloneable so a caller can hold one end while the harness holds the
/// other.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::Relaxed)
    }
}

/// A percent-of-current-test progress callback, invoked at parser-chosen
/// points (spec.md §4.F "Progress reporting"). The boxed closure keeps this
/// optional without forcing every caller to thread a generic through.
pub type ProgressCallback<'a> = Box<dyn FnMut(&str, u8) + 'a>;

/// Runs every descriptor in `tests`, in ordering-bucket then registration
/// order, against `registry`, emitting findings to `sink`. Only tests whose
/// name contains `name_filter` (when given) run; the rest are recorded as
/// skipped so totals stay honest.
pub fn run_all(
    tests: &[TestDescriptor],
    registry: &TableRegistry,
    sink: &mut dyn ResultSink,
    name_filter: Option<&str>,
    cancellation: &CancellationToken,
    mut progress: Option<ProgressCallback<'_>>,
) {
    let mut ordered: Vec<&TestDescriptor> = tests.iter().collect();
    ordered.sort_by_key(|t| t.ordering);

    let total = ordered.len().max(1);
    for (i, test) in ordered.into_iter().enumerate() {
        sink.begin_test(test.name);

        if cancellation.is_cancelled() {
            skip_all(sink);
            sink.end_test();
            continue;
        }

        if let Some(filter) = name_filter {
            if !test.name.contains(filter) {
                skip_all(sink);
                sink.end_test();
                continue;
            }
        }

        if let Some(progress) = progress.as_deref_mut() {
            progress(test.name, (i * 100 / total) as u8);
        }

        if let Some(init) = test.init {
            match init(registry) {
                InitResult::Skip => {
                    skip_all(sink);
                    sink.end_test();
                    continue;
                }
                InitResult::Error => {
                    sink.emit(Finding::new(
                        test.name,
                        "TestInitFailed",
                        Severity::High,
                        FindingKind::Fail,
                        "test init hook returned Error",
                    ));
                    if let Some(deinit) = test.deinit {
                        deinit(registry);
                    }
                    sink.end_test();
                    continue;
                }
                InitResult::Continue => {}
            }
        }

        let mut out = Vec::new();
        for (minor_name, minor_fn) in &test.minor_tests {
            if cancellation.is_cancelled() {
                sink.emit(Finding::new(
                    test.name,
                    "Cancelled",
                    Severity::None,
                    FindingKind::Skip,
                    format!("{minor_name} skipped: run cancelled"),
                ));
                continue;
            }
            match minor_fn(registry, &mut out) {
                MinorTestResult::Ok | MinorTestResult::Error => {}
                MinorTestResult::Skip => {
                    sink.emit(Finding::new(
                        test.name,
                        "MinorTestSkipped",
                        Severity::None,
                        FindingKind::Skip,
                        format!("{minor_name} skipped"),
                    ));
                }
                MinorTestResult::Abort => {
                    // Already-emitted findings for this minor test (pushed
                    // into `out` before the abort) still get emitted below;
                    // only the remaining minor tests of this descriptor are
                    // dropped.
                    for f in out.drain(..) {
                        sink.emit(f);
                    }
                    break;
                }
            }
        }
        for f in out {
            sink.emit(f);
        }

        if let Some(deinit) = test.deinit {
            deinit(registry);
        }
        sink.end_test();
    }
}

fn skip_all(sink: &mut dyn ResultSink) {
    sink.emit(Finding::new(
        "harness",
        "TestSkipped",
        Severity::None,
        FindingKind::Skip,
        "test skipped",
    ));
}
