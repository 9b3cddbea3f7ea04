//! SMBIOS/DMI entry point and structure table.
//!
//! Grounded in `original_source/src/dmi/dmicheck/dmicheck.c`: an entry point
//! anchor (the 31-byte SMBIOS 2.x `_SM_`/`_DMI_` form, or the 24-byte
//! SMBIOS 3.x `_SM3_` form) names a separately addressed structure table, a
//! back-to-back sequence of `{type, length, handle}`-headed structures each
//! followed by its own string table, terminated by a double NUL byte pair.
//! A type-127 structure marks the end of the table.
//!
//! Mirrors the BERT/MP-table "follow a pointer out of the table" pattern:
//! the entry point is registered under the synthetic signature `"SMBIOS"`,
//! the structure table it points at under `"SMBIOSTABLE"` (resolved via
//! [`TableRegistry::find_by_address`], falling back to the fixed signature
//! when no base address is recorded — e.g. when both blobs came from the
//! same dump file).

mod types;

use crate::checks::{self, CheckCtx};
use crate::cursor::Cursor;
use crate::harness::MinorTestResult;
use crate::model::{Blob, Finding, FindingKind, Severity};
use crate::registry::TableRegistry;
use crate::util::checksum::checksum;

const TEST_NAME: &str = "smbios";
const ENTRY_POINT_TABLE: &str = "SMBIOS";
const STRUCT_TABLE: &str = "SMBIOSTABLE";
const END_OF_TABLE_TYPE: u8 = 127;

pub fn run(registry: &TableRegistry, out: &mut Vec<Finding>) -> MinorTestResult {
    let Some(entry_blob) = registry.find_by_signature(ENTRY_POINT_TABLE, 0) else {
        return MinorTestResult::Skip;
    };
    let ctx = CheckCtx::new(TEST_NAME, ENTRY_POINT_TABLE);
    let cur = entry_blob.cursor();

    let anchor = match cur.peek_bytes(0, 5) {
        Ok(b) if &b[..4] == b"_SM_" => EntryAnchor::V2,
        Ok(b) if b == b"_SM3_" => EntryAnchor::V3,
        _ => {
            out.push(Finding::new(TEST_NAME, "SMBIOSEntryAnchor", Severity::Critical, FindingKind::Fail, "entry point does not start with a recognised SMBIOS anchor string").with_table(ENTRY_POINT_TABLE));
            return MinorTestResult::Abort;
        }
    };

    let (result, version, struct_table_addr, declared_count) = match anchor {
        EntryAnchor::V2 => check_entry_point_v2(&ctx, out, entry_blob, &cur),
        EntryAnchor::V3 => check_entry_point_v3(&ctx, out, entry_blob, &cur),
    };

    let Some(struct_table_addr) = struct_table_addr else {
        return result;
    };

    let table = registry.find_by_address(struct_table_addr).or_else(|| registry.find_by_signature(STRUCT_TABLE, 0));
    let Some(table) = table else {
        out.push(
            Finding::new(TEST_NAME, "SMBIOSTableNotMapped", Severity::Medium, FindingKind::Skip, format!("cannot resolve the SMBIOS structure table at {struct_table_addr:#x}"))
                .with_table(ENTRY_POINT_TABLE),
        );
        return result;
    };

    match walk_structures(out, table, version, declared_count) {
        MinorTestResult::Ok => result,
        other => other,
    }
}

enum EntryAnchor {
    V2,
    V3,
}

/// Returns `(result, bcd_version, structure_table_address, declared_structure_count)`.
/// `declared_structure_count` is `None` for the v3 entry point, which has no
/// such field and instead relies on the type-127 terminator.
fn check_entry_point_v2(ctx: &CheckCtx, out: &mut Vec<Finding>, blob: &Blob, cur: &Cursor<'_>) -> (MinorTestResult, u16, Option<u64>, Option<u16>) {
    const LEN: u32 = 0x1F;
    if blob.declared_len() < LEN as usize {
        out.push(Finding::new(TEST_NAME, "BadStructureLength", Severity::High, FindingKind::Fail, "SMBIOS 2.x entry point is shorter than 31 bytes").with_table(ENTRY_POINT_TABLE));
        return (MinorTestResult::Abort, 0, None, None);
    }

    let Ok(entry_length) = cur.peek_u8(5) else { return (MinorTestResult::Abort, 0, None, None) };
    let Ok(major) = cur.peek_u8(6) else { return (MinorTestResult::Abort, 0, None, None) };
    let Ok(minor) = cur.peek_u8(7) else { return (MinorTestResult::Abort, 0, None, None) };
    let Ok(intermediate_anchor) = cur.peek_bytes(16, 5) else { return (MinorTestResult::Abort, 0, None, None) };
    let Ok(struct_table_length) = cur.peek_u16(22) else { return (MinorTestResult::Abort, 0, None, None) };
    let Ok(struct_table_address) = cur.peek_u32(24) else { return (MinorTestResult::Abort, 0, None, None) };
    let Ok(number_of_structures) = cur.peek_u16(28) else { return (MinorTestResult::Abort, 0, None, None) };
    let _ = struct_table_length;

    let mut result = MinorTestResult::Ok;

    if !checks::fixed_value(ctx, out, "Entry Point Length", 5, entry_length as u64, LEN as u64, Severity::Medium) {
        result = MinorTestResult::Error;
    }
    if intermediate_anchor != b"_DMI_" {
        out.push(
            Finding::new(ctx.test_name, "SMBIOSIntermediateAnchor", Severity::Critical, FindingKind::Fail, format!("intermediate anchor is {:?}, expected \"_DMI_\"", String::from_utf8_lossy(intermediate_anchor)))
                .with_table(ENTRY_POINT_TABLE)
                .with_offset(16),
        );
        result = MinorTestResult::Error;
    }

    let full = &blob.data[..(entry_length as usize).min(blob.data.len())];
    if checksum(full) != 0 {
        out.push(Finding::new(ctx.test_name, "SMBIOSChecksum", Severity::High, FindingKind::Fail, "SMBIOS entry point checksum byte does not sum to zero").with_table(ENTRY_POINT_TABLE).with_offset(4));
        result = MinorTestResult::Error;
    }
    let intermediate = &blob.data[16..(entry_length as usize).min(blob.data.len())];
    if checksum(intermediate) != 0 {
        out.push(
            Finding::new(ctx.test_name, "SMBIOSIntermediateChecksum", Severity::High, FindingKind::Fail, "SMBIOS intermediate entry point checksum byte does not sum to zero")
                .with_table(ENTRY_POINT_TABLE)
                .with_offset(21),
        );
        result = MinorTestResult::Error;
    }

    if result == MinorTestResult::Ok {
        out.push(Finding::pass(ctx.test_name, "SMBIOS 2.x entry point is well formed").with_table(ENTRY_POINT_TABLE));
    }

    let version = ((major as u16) << 8) | minor as u16;
    (result, version, Some(struct_table_address as u64), Some(number_of_structures))
}

fn check_entry_point_v3(ctx: &CheckCtx, out: &mut Vec<Finding>, blob: &Blob, cur: &Cursor<'_>) -> (MinorTestResult, u16, Option<u64>, Option<u16>) {
    const LEN: u32 = 0x18;
    if blob.declared_len() < LEN as usize {
        out.push(Finding::new(TEST_NAME, "BadStructureLength", Severity::High, FindingKind::Fail, "SMBIOS 3.x entry point is shorter than 24 bytes").with_table(ENTRY_POINT_TABLE));
        return (MinorTestResult::Abort, 0, None, None);
    }

    let Ok(entry_length) = cur.peek_u8(6) else { return (MinorTestResult::Abort, 0, None, None) };
    let Ok(major) = cur.peek_u8(7) else { return (MinorTestResult::Abort, 0, None, None) };
    let Ok(minor) = cur.peek_u8(8) else { return (MinorTestResult::Abort, 0, None, None) };
    let Ok(struct_table_address) = cur.peek_u64(16) else { return (MinorTestResult::Abort, 0, None, None) };

    let mut result = MinorTestResult::Ok;

    if !checks::fixed_value(ctx, out, "Entry Point Length", 6, entry_length as u64, LEN as u64, Severity::Medium) {
        result = MinorTestResult::Error;
    }

    let full = &blob.data[..(entry_length as usize).min(blob.data.len())];
    if checksum(full) != 0 {
        out.push(Finding::new(ctx.test_name, "SMBIOSChecksum", Severity::High, FindingKind::Fail, "SMBIOS 3.x entry point checksum byte does not sum to zero").with_table(ENTRY_POINT_TABLE).with_offset(5));
        result = MinorTestResult::Error;
    }

    if result == MinorTestResult::Ok {
        out.push(Finding::pass(ctx.test_name, "SMBIOS 3.x entry point is well formed").with_table(ENTRY_POINT_TABLE));
    }

    let version = ((major as u16) << 8) | minor as u16;
    (result, version, Some(struct_table_address), None)
}

/// Walks the structure table: a back-to-back sequence of `{type, length,
/// handle}`-headed structures, each followed by a NUL-terminated string
/// table ended by an extra NUL (an empty final string). `declared_count` is
/// used only to cross-check the v2 entry point's own structure count; the
/// walk itself always terminates on the type-127 end marker or exhaustion
/// of the blob.
fn walk_structures(out: &mut Vec<Finding>, blob: &Blob, version: u16, declared_count: Option<u16>) -> MinorTestResult {
    let ctx = CheckCtx::new(TEST_NAME, STRUCT_TABLE);
    let cur = blob.cursor();
    let table_len = blob.declared_len();
    let mut offset = 0usize;
    let mut seen = 0u16;
    let mut result = MinorTestResult::Ok;
    let mut saw_end_marker = false;

    while offset + 4 <= table_len {
        let Ok(smbios_type) = cur.peek_u8(offset) else { break };
        let Ok(length) = cur.peek_u8(offset + 1) else { break };

        if (length as usize) < 4 {
            out.push(
                Finding::new(ctx.test_name, "BadStructureLength", Severity::High, FindingKind::Fail, format!("structure at offset {offset:#x} declares length {length}, minimum is 4"))
                    .with_table(ctx.table)
                    .with_offset(offset as u32),
            );
            result = MinorTestResult::Error;
            break;
        }
        if offset + length as usize > table_len {
            out.push(
                Finding::new(ctx.test_name, "BadStructureLength", Severity::High, FindingKind::Fail, format!("structure at offset {offset:#x} of type {smbios_type} runs past the end of the structure table"))
                    .with_table(ctx.table)
                    .with_offset(offset as u32),
            );
            result = MinorTestResult::Error;
            break;
        }

        let Ok(data) = cur.peek_bytes(offset, length as usize) else { break };
        let (string_count, strings_end) = match walk_string_table(&cur, offset + length as usize, table_len) {
            Some(v) => v,
            None => {
                out.push(
                    Finding::new(ctx.test_name, "SMBIOSUnterminatedStrings", Severity::High, FindingKind::Fail, format!("structure at offset {offset:#x} has no double-NUL string table terminator before the table end"))
                        .with_table(ctx.table)
                        .with_offset(offset as u32),
                );
                result = MinorTestResult::Error;
                break;
            }
        };

        if smbios_type == END_OF_TABLE_TYPE {
            saw_end_marker = true;
            seen += 1;
            offset = strings_end;
            break;
        }

        types::check_type_length(&ctx, out, smbios_type, version, length, data);
        if !types::check_structure(&ctx, out, smbios_type, data, string_count) {
            result = MinorTestResult::Error;
        }

        seen += 1;
        offset = strings_end;
    }

    if !saw_end_marker {
        out.push(
            Finding::new(ctx.test_name, "SMBIOSMissingEndMarker", Severity::Medium, FindingKind::Fail, "structure table ended without a type-127 end-of-table marker")
                .with_table(ctx.table),
        );
        result = MinorTestResult::Error;
    }

    if let Some(declared) = declared_count {
        if !checks::structure_length(&ctx, out, 28, seen as u32, declared as u32) {
            result = MinorTestResult::Error;
        }
    }

    if result == MinorTestResult::Ok {
        out.push(Finding::pass(ctx.test_name, format!("SMBIOS structure table walk completed, {seen} structures")).with_table(ctx.table));
    }
    result
}

/// Scans a sequence of NUL-terminated strings starting at `offset`, stopping
/// at the first empty string (the double-NUL terminator). Returns
/// `(string_count, offset_after_terminator)`, or `None` if the table ends
/// before a terminator is found.
fn walk_string_table(cur: &Cursor<'_>, mut offset: usize, table_len: usize) -> Option<(u8, usize)> {
    // A structure with no strings at all still carries the double-NUL: the
    // formatted area is immediately followed by 0x00 0x00.
    let mut count = 0u8;
    loop {
        if offset >= table_len {
            return None;
        }
        let s = cur.peek_ascii_cstr(offset, table_len - offset).ok()?;
        offset += s.len() + 1;
        if s.is_empty() {
            return Some((count, offset));
        }
        count = count.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Provenance;
    use crate::util::checksum::compute_checksum_byte;

    fn entry_point_v2(struct_table_address: u32, number_of_structures: u16) -> Vec<u8> {
        let mut data = vec![0u8; 0x1F];
        data[0..4].copy_from_slice(b"_SM_");
        data[5] = 0x1F;
        data[6] = 2;
        data[7] = 8;
        data[8..10].copy_from_slice(&0xFFFFu16.to_le_bytes());
        data[16..21].copy_from_slice(b"_DMI_");
        data[22..24].copy_from_slice(&0u16.to_le_bytes());
        data[24..28].copy_from_slice(&struct_table_address.to_le_bytes());
        data[28..30].copy_from_slice(&number_of_structures.to_le_bytes());

        data[21] = 0;
        let intermediate_sum = compute_checksum_byte(&data[16..0x1F]);
        data[21] = intermediate_sum;

        data[4] = 0;
        let full_sum = compute_checksum_byte(&data[..0x1F]);
        data[4] = full_sum;
        data
    }

    fn bios_information_structure() -> Vec<u8> {
        let mut data = vec![0u8; 0x12];
        data[0] = 0; // type 0
        data[1] = 0x12; // length
        data[2..4].copy_from_slice(&0u16.to_le_bytes()); // handle
        data[4] = 1; // Vendor string index
        data.extend_from_slice(b"Acme BIOS Vendor\0");
        data.extend_from_slice(&[0u8]); // double-NUL terminator
        data
    }

    fn end_of_table_structure() -> Vec<u8> {
        vec![127, 4, 0, 0, 0, 0]
    }

    #[test]
    fn clean_v2_entry_point_and_table_passes() {
        let mut registry = TableRegistry::new();
        registry.insert(Blob::new(ENTRY_POINT_TABLE, entry_point_v2(0x2000, 2), Provenance::FromFirmware));

        let mut table = bios_information_structure();
        table.extend_from_slice(&end_of_table_structure());
        registry.insert(Blob::new(STRUCT_TABLE, table, Provenance::FromFirmware).with_base_address(0x2000));

        let mut out = Vec::new();
        assert_eq!(run(&registry, &mut out), MinorTestResult::Ok);
        assert!(!out.iter().any(|f| f.kind == FindingKind::Fail), "{out:#?}");
    }

    #[test]
    fn bad_intermediate_anchor_is_flagged() {
        let mut ep = entry_point_v2(0x2000, 1);
        ep[16..21].copy_from_slice(b"XXXXX");
        let mut registry = TableRegistry::new();
        registry.insert(Blob::new(ENTRY_POINT_TABLE, ep, Provenance::FromFirmware));
        let mut out = Vec::new();
        run(&registry, &mut out);
        assert!(out.iter().any(|f| f.stable_tag == "SMBIOSIntermediateAnchor"));
    }

    #[test]
    fn missing_end_marker_is_flagged() {
        let mut registry = TableRegistry::new();
        registry.insert(Blob::new(ENTRY_POINT_TABLE, entry_point_v2(0x2000, 1), Provenance::FromFirmware));
        registry.insert(Blob::new(STRUCT_TABLE, bios_information_structure(), Provenance::FromFirmware).with_base_address(0x2000));
        let mut out = Vec::new();
        run(&registry, &mut out);
        assert!(out.iter().any(|f| f.stable_tag == "SMBIOSMissingEndMarker"));
    }

    #[test]
    fn entry_point_v3_is_recognised() {
        let mut data = vec![0u8; 0x18];
        data[0..5].copy_from_slice(b"_SM3_");
        data[6] = 0x18;
        data[7] = 3;
        data[8] = 2;
        data[16..24].copy_from_slice(&0x3000u64.to_le_bytes());
        data[5] = 0;
        data[5] = compute_checksum_byte(&data);

        let mut registry = TableRegistry::new();
        registry.insert(Blob::new(ENTRY_POINT_TABLE, data, Provenance::FromFirmware));
        let mut table = bios_information_structure();
        table.extend_from_slice(&end_of_table_structure());
        registry.insert(Blob::new(STRUCT_TABLE, table, Provenance::FromFirmware).with_base_address(0x3000));

        let mut out = Vec::new();
        assert_eq!(run(&registry, &mut out), MinorTestResult::Ok);
        assert!(!out.iter().any(|f| f.kind == FindingKind::Fail), "{out:#?}");
    }
}
