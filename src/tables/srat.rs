//! SRAT (System Resource Affinity Table) parser.
//!
//! Grounded in `original_source/src/acpi/srat/srat.c`: a fixed 48-byte header
//! (common 36-byte header + u32 table revision fixed at 1 + an 8-byte
//! reserved field) followed by a walk of six affinity sub-structure types,
//! each self-describing its own `{type, length}` pair.

use crate::checks::{self, CheckCtx};
use crate::harness::MinorTestResult;
use crate::model::{Blob, Finding, FindingKind, Severity};
use crate::registry::TableRegistry;

use super::validate_common_header;

const TEST_NAME: &str = "srat";
const TABLE: &str = "SRAT";
const FIXED_HEADER_LEN: u32 = 48;

pub fn run(registry: &TableRegistry, out: &mut Vec<Finding>) -> MinorTestResult {
    let Some(blob) = registry.find_by_signature("SRAT", 0) else {
        return MinorTestResult::Skip;
    };
    let ctx = CheckCtx::new(TEST_NAME, TABLE);

    let header = match validate_common_header(&ctx, out, blob) {
        Ok(h) => h,
        Err(_) => return MinorTestResult::Abort,
    };
    let _ = header;

    let cur = blob.cursor();
    let Ok(table_revision) = cur.peek_u32(36) else {
        out.push(
            Finding::new(TEST_NAME, "BadStructureLength", Severity::High, FindingKind::Fail, "SRAT too short for its fixed header")
                .with_table(TABLE),
        );
        return MinorTestResult::Abort;
    };
    checks::fixed_value(&ctx, out, "Revision1", 36, table_revision as u64, 1, Severity::Medium);

    walk_affinities(&ctx, out, blob)
}

fn walk_affinities(ctx: &CheckCtx, out: &mut Vec<Finding>, blob: &Blob) -> MinorTestResult {
    let cur = blob.cursor();
    let table_len = blob.declared_len() as u32;
    let mut offset = FIXED_HEADER_LEN;

    while offset < table_len {
        let Ok(sub_type) = cur.peek_u8(offset as usize) else { break };
        let Ok(sub_length) = cur.peek_u8(offset as usize + 1) else { break };

        if !checks::structure_length_nonzero(ctx, out, offset, sub_length as u32) {
            return MinorTestResult::Abort;
        }
        if !checks::range_in_table(ctx, out, offset, offset + sub_length as u32, table_len) {
            return MinorTestResult::Abort;
        }

        let expected = match sub_type {
            0 => 16,
            1 => 40,
            2 => 24,
            3 => 18,
            4 => 12,
            5 => 32,
            other => {
                out.push(
                    Finding::new(
                        ctx.test_name,
                        "SRATInvalidType",
                        Severity::High,
                        FindingKind::Fail,
                        format!("SRAT Affinity Structure Type {other:#04x} is an invalid type, expecting 0x00..0x05"),
                    )
                    .with_table(ctx.table)
                    .with_offset(offset),
                );
                return MinorTestResult::Error;
            }
        };
        if !checks::structure_length(ctx, out, offset, sub_length as u32, expected) {
            offset += sub_length as u32;
            continue;
        }

        match sub_type {
            0 => check_local_apic_sapic(ctx, out, &cur, offset),
            1 => check_memory(ctx, out, &cur, offset),
            2 => check_local_x2apic(ctx, out, &cur, offset),
            3 => check_gicc(ctx, out, &cur, offset),
            4 => check_its(ctx, out, &cur, offset),
            5 => check_generic_initiator(ctx, out, &cur, offset),
            _ => unreachable!(),
        }

        offset += sub_length as u32;
    }

    if offset != table_len {
        out.push(
            Finding::new(ctx.test_name, "TrailingBytes", Severity::Medium, FindingKind::Fail, format!("SRAT walk ended at offset {offset:#x}, table declares length {table_len:#x}"))
                .with_table(ctx.table),
        );
    } else {
        out.push(Finding::pass(ctx.test_name, "SRAT affinity walk consumed exactly the declared length").with_table(ctx.table));
    }

    MinorTestResult::Ok
}

fn check_local_apic_sapic(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32) {
    let base = offset as usize;
    if let Ok(flags) = cur.peek_u32(base + 4) {
        checks::reserved_bits(ctx, out, "LocalApicSapicAffinityFlags", offset + 4, flags as u64, 1..=31);
    }
}

fn check_memory(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32) {
    let base = offset as usize;
    if let Ok(flags) = cur.peek_u32(base + 28) {
        checks::reserved_bits(ctx, out, "MemoryAffinityFlags", offset + 28, flags as u64, 3..=31);
    }
}

fn check_local_x2apic(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32) {
    let base = offset as usize;
    if let Ok(reserved1) = cur.peek_u16(base + 2) {
        checks::reserved_zero(ctx, out, "Localx2apicReserved1", offset + 2, reserved1 as u64);
    }
    if let Ok(flags) = cur.peek_u32(base + 12) {
        checks::reserved_bits(ctx, out, "Localx2apicAffinityFlags", offset + 12, flags as u64, 1..=31);
    }
}

fn check_gicc(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32) {
    let base = offset as usize;
    if let Ok(flags) = cur.peek_u32(base + 10) {
        checks::reserved_bits(ctx, out, "GICCAffinityFlags", offset + 10, flags as u64, 1..=31);
    }
}

fn check_its(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32) {
    let base = offset as usize;
    if let Ok(reserved) = cur.peek_u16(base + 2) {
        checks::reserved_zero(ctx, out, "ITSAffinityReserved", offset + 2, reserved as u64);
    }
}

fn check_generic_initiator(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32) {
    let base = offset as usize;
    if let Ok(reserved1) = cur.peek_u8(base + 2) {
        checks::reserved_zero(ctx, out, "InitiatorAffinityReserved1", offset + 2, reserved1 as u64);
    }
    if let Ok(device_handle_type) = cur.peek_u8(base + 3) {
        checks::reserved_bits(ctx, out, "InitiatorAffinityDeviceHandleType", offset + 3, device_handle_type as u64, 1..=7);

        let mut h_reserved = 0u64;
        if device_handle_type == 0 {
            if let Ok(b) = cur.peek_u8(base + 8 + 12) {
                h_reserved = b as u64;
            }
        } else if device_handle_type == 1 {
            for i in 4..16 {
                if let Ok(b) = cur.peek_u8(base + 8 + i) {
                    h_reserved += b as u64;
                }
            }
        }
        checks::reserved_zero(ctx, out, "InitiatorAffinityDeviceHandleReserve", offset + 8, h_reserved);
    }
    if let Ok(flags) = cur.peek_u32(base + 24) {
        checks::reserved_bits(ctx, out, "InitiatorAffinityFlags", offset + 24, flags as u64, 2..=31);
    }
    if let Ok(reserved2) = cur.peek_u32(base + 28) {
        checks::reserved_zero(ctx, out, "InitiatorAffinityReserved2", offset + 28, reserved2 as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Provenance;
    use crate::util::checksum::compute_checksum_byte;

    fn header(total_len: u32) -> Vec<u8> {
        let mut data = vec![0u8; 48];
        data[0..4].copy_from_slice(b"SRAT");
        data[4..8].copy_from_slice(&total_len.to_le_bytes());
        data[8] = 3;
        data[10..16].copy_from_slice(b"ACME01");
        data[16..24].copy_from_slice(b"SRATTBL ");
        data[36..40].copy_from_slice(&1u32.to_le_bytes());
        data
    }

    fn finalize(mut data: Vec<u8>) -> Vec<u8> {
        data[9] = 0;
        let sum = crate::util::checksum::checksum(&data);
        data[9] = compute_checksum_byte(&[sum]);
        data
    }

    #[test]
    fn local_apic_sapic_entry_walks_cleanly() {
        let mut data = header(64);
        data.extend_from_slice(&[0, 16, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]); // type 0, len 16, flags=enabled
        let data = finalize(data);

        let mut registry = TableRegistry::new();
        registry.insert(Blob::new("SRAT", data, Provenance::FromFile));
        let mut out = Vec::new();
        assert_eq!(run(&registry, &mut out), MinorTestResult::Ok);
        assert!(!out.iter().any(|f| f.kind == FindingKind::Fail));
    }

    #[test]
    fn memory_affinity_reserved_bits_are_flagged() {
        let mut data = header(88);
        let mut entry = vec![0u8; 40];
        entry[0] = 1;
        entry[1] = 40;
        entry[28..32].copy_from_slice(&0xFFFF_FFF9u32.to_le_bytes()); // bits 3..31 set
        data.extend_from_slice(&entry);
        let data = finalize(data);

        let mut registry = TableRegistry::new();
        registry.insert(Blob::new("SRAT", data, Provenance::FromFile));
        let mut out = Vec::new();
        run(&registry, &mut out);
        assert!(out.iter().any(|f| f.stable_tag == "ReservedBitUsed" && f.field.as_deref() == Some("MemoryAffinityFlags")));
    }

    #[test]
    fn unknown_affinity_type_is_flagged_high() {
        let mut data = header(50);
        data.extend_from_slice(&[0xAA, 6, 0, 0, 0, 0]);
        let data = finalize(data);

        let mut registry = TableRegistry::new();
        registry.insert(Blob::new("SRAT", data, Provenance::FromFile));
        let mut out = Vec::new();
        run(&registry, &mut out);
        assert!(out.iter().any(|f| f.stable_tag == "SRATInvalidType" && f.severity == Severity::High));
    }
}
