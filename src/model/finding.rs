//! The `Finding` type and severity lattice.
//!
//! A `Finding` is the single unit of diagnostic output: every validator in
//! `checks` and every table parser in `tables` produces these and nothing
//! else. Findings are moved into a [`crate::sink::ResultSink`] by value and
//! never mutated afterwards.

use serde::Serialize;
use std::fmt;

/// Severity lattice: `Critical > High > Medium > Low > None`.
///
/// Ord is derived in rank order (`Critical` first) so that sorting a
/// `Vec<Finding>` by `severity` descending is just `sort_by_key` with the
/// natural order reversed, or `sort_by(|a, b| a.severity.cmp(&b.severity))`
/// since the variants are already declared highest-to-lowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    None,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::None => "none",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Severity {
    type Err = crate::error::CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            "none" => Ok(Severity::None),
            other => Err(crate::error::CliError::UnknownSeverity(other.to_string())),
        }
    }
}

/// The graded outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingKind {
    Pass,
    Fail,
    Skip,
    Advice,
    Info,
}

/// A single structured diagnostic emitted by a validator or parser.
///
/// `table_ctx`, `offset`, and `field` form the locating triple from spec.md
/// §7: "Every finding carries the stable tag, human text, severity, and the
/// locating triple (table, field, offset) when applicable, so that
/// downstream tooling can triage without parsing prose."
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub test_name: String,
    pub stable_tag: String,
    pub severity: Severity,
    pub kind: FindingKind,
    pub text: String,
    pub table_ctx: Option<String>,
    pub offset: Option<u32>,
    pub field: Option<String>,
}

impl Finding {
    pub fn new(
        test_name: impl Into<String>,
        stable_tag: impl Into<String>,
        severity: Severity,
        kind: FindingKind,
        text: impl Into<String>,
    ) -> Self {
        Self {
            test_name: test_name.into(),
            stable_tag: stable_tag.into(),
            severity,
            kind,
            text: text.into(),
            table_ctx: None,
            offset: None,
            field: None,
        }
    }

    pub fn pass(test_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(test_name, "Pass", Severity::None, FindingKind::Pass, text)
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table_ctx = Some(table.into());
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}
