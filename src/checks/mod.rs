//! Field-check vocabulary (spec.md §4.B).
//!
//! Each check inspects one observed value and pushes at most one [`Finding`]
//! into the caller's sink. They are ordinary functions, not a macro-expanded
//! table of validators — spec.md §9's design note explicitly replaces the
//! C source's `FIELD_UINT`/`FIELD_STR`/`FIELD_GAS` code generation with a
//! small vocabulary of plain functions.
//!
//! All checks return `bool` (did it pass?) in addition to emitting the
//! finding, so parsers can branch on the outcome (e.g. abort a sub-structure
//! walk when `structure_length_nonzero` fails).

use crate::model::{Finding, FindingKind, Severity};

/// Context threaded through every check: which test and which table the
/// check is running inside of, so every emitted [`Finding`] carries the
/// locating triple from spec.md §7.
#[derive(Debug, Clone, Copy)]
pub struct CheckCtx<'a> {
    pub test_name: &'a str,
    pub table: &'a str,
}

impl<'a> CheckCtx<'a> {
    pub fn new(test_name: &'a str, table: &'a str) -> Self {
        Self { test_name, table }
    }

    fn finding(
        &self,
        tag: &str,
        severity: Severity,
        kind: FindingKind,
        text: String,
    ) -> Finding {
        Finding::new(self.test_name, tag, severity, kind, text).with_table(self.table)
    }
}

fn push(out: &mut Vec<Finding>, finding: Finding) {
    out.push(finding);
}

/// `reserved_zero(v)`: a reserved field must be exactly zero.
pub fn reserved_zero(ctx: &CheckCtx, out: &mut Vec<Finding>, field: &str, offset: u32, v: u64) -> bool {
    if v != 0 {
        push(
            out,
            ctx.finding(
                "ReservedNonZero",
                Severity::Medium,
                FindingKind::Fail,
                format!("{field} is reserved and must be zero, got {v:#x}"),
            )
            .with_field(field)
            .with_offset(offset),
        );
        false
    } else {
        push(
            out,
            ctx.finding(
                "ReservedNonZero",
                Severity::None,
                FindingKind::Pass,
                format!("{field} reserved bits are zero"),
            )
            .with_field(field)
            .with_offset(offset),
        );
        true
    }
}

/// `reserved_bits(v, lo..=hi)`: no bit in the inclusive range may be set.
pub fn reserved_bits(
    ctx: &CheckCtx,
    out: &mut Vec<Finding>,
    field: &str,
    offset: u32,
    v: u64,
    range: std::ops::RangeInclusive<u32>,
) -> bool {
    let mask: u64 = range.clone().fold(0u64, |acc, bit| acc | (1 << bit));
    if v & mask != 0 {
        push(
            out,
            ctx.finding(
                "ReservedBitUsed",
                Severity::Medium,
                FindingKind::Fail,
                format!(
                    "{field} has reserved bit(s) set in range {}..={}: value {:#x}",
                    range.start(),
                    range.end(),
                    v
                ),
            )
            .with_field(field)
            .with_offset(offset),
        );
        false
    } else {
        push(
            out,
            ctx.finding(
                "ReservedBitUsed",
                Severity::None,
                FindingKind::Pass,
                format!("{field} reserved bits {}..={} are clear", range.start(), range.end()),
            )
            .with_field(field)
            .with_offset(offset),
        );
        true
    }
}

/// `min_max(v, min, max)`: value must fall within an inclusive range.
pub fn min_max(
    ctx: &CheckCtx,
    out: &mut Vec<Finding>,
    field: &str,
    offset: u32,
    v: i64,
    min: i64,
    max: i64,
) -> bool {
    if v < min || v > max {
        push(
            out,
            ctx.finding(
                "ValueOutOfRange",
                Severity::High,
                FindingKind::Fail,
                format!("{field} = {v} is outside the valid range [{min}, {max}]"),
            )
            .with_field(field)
            .with_offset(offset),
        );
        false
    } else {
        push(
            out,
            ctx.finding(
                "ValueOutOfRange",
                Severity::None,
                FindingKind::Pass,
                format!("{field} = {v} is within range"),
            )
            .with_field(field)
            .with_offset(offset),
        );
        true
    }
}

/// `ranges(v, [(min, max), ...])`: value must land in at least one of the
/// given inclusive ranges.
pub fn ranges(
    ctx: &CheckCtx,
    out: &mut Vec<Finding>,
    field: &str,
    offset: u32,
    v: i64,
    allowed: &[(i64, i64)],
) -> bool {
    if allowed.iter().any(|&(min, max)| v >= min && v <= max) {
        push(
            out,
            ctx.finding(
                "ValueOutOfRange",
                Severity::None,
                FindingKind::Pass,
                format!("{field} = {v} matches an allowed range"),
            )
            .with_field(field)
            .with_offset(offset),
        );
        true
    } else {
        push(
            out,
            ctx.finding(
                "ValueOutOfRange",
                Severity::High,
                FindingKind::Fail,
                format!("{field} = {v} does not match any allowed range {allowed:?}"),
            )
            .with_field(field)
            .with_offset(offset),
        );
        false
    }
}

/// `fixed_value(v, expected)`: severity is caller-supplied since some fixed
/// fields are merely conventional while others are load-bearing.
pub fn fixed_value(
    ctx: &CheckCtx,
    out: &mut Vec<Finding>,
    field: &str,
    offset: u32,
    v: u64,
    expected: u64,
    severity: Severity,
) -> bool {
    if v != expected {
        push(
            out,
            ctx.finding(
                "FixedValueMismatch",
                severity,
                FindingKind::Fail,
                format!("{field} = {v:#x}, expected fixed value {expected:#x}"),
            )
            .with_field(field)
            .with_offset(offset),
        );
        false
    } else {
        push(
            out,
            ctx.finding(
                "FixedValueMismatch",
                Severity::None,
                FindingKind::Pass,
                format!("{field} matches expected fixed value {expected:#x}"),
            )
            .with_field(field)
            .with_offset(offset),
        );
        true
    }
}

/// `structure_length(declared, expected)`: an exact length match is
/// required (used for fixed-size sub-structures).
pub fn structure_length(
    ctx: &CheckCtx,
    out: &mut Vec<Finding>,
    offset: u32,
    declared: u32,
    expected: u32,
) -> bool {
    if declared != expected {
        push(
            out,
            ctx.finding(
                "BadStructureLength",
                Severity::High,
                FindingKind::Fail,
                format!("structure length {declared} at offset {offset:#x}, expected {expected}"),
            )
            .with_field("length")
            .with_offset(offset),
        );
        false
    } else {
        push(
            out,
            ctx.finding(
                "BadStructureLength",
                Severity::None,
                FindingKind::Pass,
                format!("structure length {declared} matches expected {expected}"),
            )
            .with_field("length")
            .with_offset(offset),
        );
        true
    }
}

/// `structure_length_nonzero(declared, offset)`: a declared-nonzero length
/// field that reads zero means a naive parser would loop forever. Always a
/// walk-abort condition at the call site.
pub fn structure_length_nonzero(
    ctx: &CheckCtx,
    out: &mut Vec<Finding>,
    offset: u32,
    declared: u32,
) -> bool {
    if declared == 0 {
        push(
            out,
            ctx.finding(
                "ZeroStructureLength",
                Severity::High,
                FindingKind::Fail,
                format!("sub-structure at offset {offset:#x} declares zero length"),
            )
            .with_field("length")
            .with_offset(offset),
        );
        false
    } else {
        true
    }
}

/// `range_in_table(offset, table_len)`: a sub-structure's end must not
/// cross the table's declared end.
pub fn range_in_table(
    ctx: &CheckCtx,
    out: &mut Vec<Finding>,
    offset: u32,
    end: u32,
    table_len: u32,
) -> bool {
    if end > table_len {
        push(
            out,
            ctx.finding(
                "OffsetOutOfRange",
                Severity::High,
                FindingKind::Fail,
                format!(
                    "sub-structure at offset {offset:#x} extends to {end:#x}, past table end {table_len:#x}"
                ),
            )
            .with_offset(offset),
        );
        false
    } else {
        true
    }
}

/// `space_id(v, allowed_set)`: a GAS address-space ID must be one of the
/// documented values.
pub fn space_id(ctx: &CheckCtx, out: &mut Vec<Finding>, field: &str, offset: u32, v: u8, allowed: &[u8]) -> bool {
    if allowed.contains(&v) {
        push(
            out,
            ctx.finding(
                "InvalidSpaceId",
                Severity::None,
                FindingKind::Pass,
                format!("{field} address space id {v} is valid"),
            )
            .with_field(field)
            .with_offset(offset),
        );
        true
    } else {
        push(
            out,
            ctx.finding(
                "InvalidSpaceId",
                Severity::High,
                FindingKind::Fail,
                format!("{field} address space id {v} is not one of {allowed:?}"),
            )
            .with_field(field)
            .with_offset(offset),
        );
        false
    }
}

/// `string_index(i, string_count)`: index 0 means "not set" and is always
/// accepted; any index past the available string table is an error. The
/// spec table lists this check as High/Low depending on context — callers
/// choose the severity for the out-of-range case via `severity`.
pub fn string_index(
    ctx: &CheckCtx,
    out: &mut Vec<Finding>,
    field: &str,
    offset: u32,
    index: u8,
    string_count: u8,
    severity: Severity,
) -> bool {
    if index == 0 || index <= string_count {
        push(
            out,
            ctx.finding(
                "StringIndexOutOfRange",
                Severity::None,
                FindingKind::Pass,
                format!("{field} string index {index} is in range (0..={string_count})"),
            )
            .with_field(field)
            .with_offset(offset),
        );
        true
    } else {
        push(
            out,
            ctx.finding(
                "StringIndexOutOfRange",
                severity,
                FindingKind::Fail,
                format!("{field} string index {index} exceeds string table count {string_count}"),
            )
            .with_field(field)
            .with_offset(offset),
        );
        false
    }
}

/// `printable_ascii(s)`: every byte must be in `[0x20, 0x7E]`.
pub fn printable_ascii(ctx: &CheckCtx, out: &mut Vec<Finding>, field: &str, offset: u32, s: &[u8]) -> bool {
    if s.iter().all(|&b| (0x20..=0x7E).contains(&b)) {
        push(
            out,
            ctx.finding(
                "NonPrintable",
                Severity::None,
                FindingKind::Pass,
                format!("{field} contains only printable characters"),
            )
            .with_field(field)
            .with_offset(offset),
        );
        true
    } else {
        push(
            out,
            ctx.finding(
                "NonPrintable",
                Severity::Low,
                FindingKind::Fail,
                format!("{field} contains non-printable characters"),
            )
            .with_field(field)
            .with_offset(offset),
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> CheckCtx<'static> {
        CheckCtx::new("unit", "TEST")
    }

    #[test]
    fn reserved_zero_flags_nonzero() {
        let mut out = Vec::new();
        assert!(!reserved_zero(&ctx(), &mut out, "f", 0, 1));
        assert_eq!(out[0].severity, Severity::Medium);
        assert_eq!(out[0].stable_tag, "ReservedNonZero");
    }

    #[test]
    fn reserved_bits_checks_only_named_range() {
        let mut out = Vec::new();
        // bit 0 set, range 1..=3 checked -> should pass
        assert!(reserved_bits(&ctx(), &mut out, "flags", 0, 0b1, 1..=3));
        // bit 2 set, range 1..=3 checked -> should fail
        let mut out2 = Vec::new();
        assert!(!reserved_bits(&ctx(), &mut out2, "flags", 0, 0b100, 1..=3));
    }

    #[test]
    fn string_index_zero_always_accepted() {
        let mut out = Vec::new();
        assert!(string_index(&ctx(), &mut out, "vendor", 0, 0, 0, Severity::High));
    }

    #[test]
    fn string_index_out_of_range_uses_caller_severity() {
        let mut out = Vec::new();
        assert!(!string_index(&ctx(), &mut out, "vendor", 0, 5, 2, Severity::Low));
        assert_eq!(out[0].severity, Severity::Low);
    }

    #[test]
    fn structure_length_nonzero_fails_on_zero() {
        let mut out = Vec::new();
        assert!(!structure_length_nonzero(&ctx(), &mut out, 0x10, 0));
        assert_eq!(out[0].stable_tag, "ZeroStructureLength");
    }

    #[test]
    fn range_in_table_flags_crossing_boundary() {
        let mut out = Vec::new();
        assert!(!range_in_table(&ctx(), &mut out, 0x10, 0x30, 0x20));
    }
}
