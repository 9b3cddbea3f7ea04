//! Intel MultiProcessor Specification 1.4 tables: the BIOS-era precursor to
//! MADT, still present on some x86 firmware alongside or instead of ACPI.
//!
//! Reads a 16-byte MP Floating Pointer Structure (`_MP_`) naming the
//! physical address of a variable-length MP Configuration Table (`PCMP`),
//! itself a 44-byte header followed by processor/bus/I-O-APIC/interrupt
//! entries. The floating pointer's `feature1` byte can also select one of
//! the MP spec's canned "default configurations" instead of pointing at a
//! real table; this parser validates the pointer either way and only walks
//! entries when a configuration table is actually present.

use crate::checks::{self, CheckCtx};
use crate::harness::MinorTestResult;
use crate::model::{Blob, Finding, FindingKind, Severity};
use crate::registry::TableRegistry;
use crate::util::checksum::checksum;

const TEST_NAME: &str = "mptable";
const FP_TABLE: &str = "_MP_";
const CFG_TABLE: &str = "MPTABLE_";
const FP_LEN: u32 = 16;
const CFG_HEADER_LEN: u32 = 44;

const MP_PROCESSOR: u8 = 0;
const MP_BUS: u8 = 1;
const MP_IOAPIC: u8 = 2;
const MP_INTSRC: u8 = 3;
const MP_LINTSRC: u8 = 4;

pub fn run(registry: &TableRegistry, out: &mut Vec<Finding>) -> MinorTestResult {
    let Some(fp_blob) = registry.find_by_signature(FP_TABLE, 0) else {
        return MinorTestResult::Skip;
    };
    let ctx = CheckCtx::new(TEST_NAME, FP_TABLE);

    if fp_blob.declared_len() < FP_LEN as usize {
        out.push(Finding::new(TEST_NAME, "BadStructureLength", Severity::High, FindingKind::Fail, "MP Floating Pointer Structure is shorter than 16 bytes").with_table(FP_TABLE));
        return MinorTestResult::Abort;
    }

    let cur = fp_blob.cursor();
    let Ok(signature) = cur.peek_bytes(0, 4) else { return MinorTestResult::Abort };
    let Ok(physptr) = cur.peek_u32(4) else { return MinorTestResult::Abort };
    let Ok(length) = cur.peek_u8(8) else { return MinorTestResult::Abort };
    let Ok(spec_rev) = cur.peek_u8(9) else { return MinorTestResult::Abort };
    let Ok(feature1) = cur.peek_u8(12) else { return MinorTestResult::Abort };

    if signature != FP_TABLE.as_bytes() {
        out.push(
            Finding::new(TEST_NAME, "MPFloatingPointerSignature", Severity::High, FindingKind::Fail, format!("MP Floating Pointer Structure signature is {:?}, expected \"_MP_\"", String::from_utf8_lossy(signature)))
                .with_table(FP_TABLE),
        );
        return MinorTestResult::Error;
    }

    let mut result = MinorTestResult::Ok;

    if length != 1 {
        out.push(
            Finding::new(TEST_NAME, "MPFloatingPointerLength", Severity::Medium, FindingKind::Fail, format!("MP Floating Pointer Structure length field is {length} (16-byte units), expected 1"))
                .with_table(FP_TABLE)
                .with_offset(8),
        );
        result = MinorTestResult::Error;
    }

    if !checks::ranges(&ctx, out, "SpecRev", 9, spec_rev as i64, &[(1, 1), (4, 4)]) {
        result = MinorTestResult::Error;
    }

    let fp_bytes = (length as usize).saturating_mul(16).min(fp_blob.declared_len());
    if checksum(&fp_blob.data[..fp_bytes]) != 0 {
        out.push(
            Finding::new(TEST_NAME, "MPFloatingPointerChecksum", Severity::High, FindingKind::Fail, "MP Floating Pointer Structure checksum byte does not sum to zero")
                .with_table(FP_TABLE)
                .with_offset(10),
        );
        result = MinorTestResult::Error;
    }

    if feature1 != 0 {
        out.push(
            Finding::new(
                TEST_NAME,
                "MPDefaultConfiguration",
                Severity::None,
                FindingKind::Info,
                format!("MP Floating Pointer Structure selects default configuration {feature1}, no MP Configuration Table to walk"),
            )
            .with_table(FP_TABLE),
        );
        return result;
    }

    let config = registry.find_by_address(physptr as u64).or_else(|| registry.find_by_signature(CFG_TABLE, 0));
    let Some(config) = config else {
        out.push(
            Finding::new(TEST_NAME, "MPConfigTableNotMapped", Severity::Medium, FindingKind::Skip, format!("cannot resolve the MP Configuration Table at {physptr:#010x}"))
                .with_table(FP_TABLE),
        );
        return result;
    };

    match check_config_table(&ctx, out, config) {
        MinorTestResult::Ok => result,
        other => other,
    }
}

fn check_config_table(ctx: &CheckCtx, out: &mut Vec<Finding>, blob: &Blob) -> MinorTestResult {
    let ctx = CheckCtx::new(ctx.test_name, CFG_TABLE);
    if blob.declared_len() < CFG_HEADER_LEN as usize {
        out.push(Finding::new(ctx.test_name, "BadStructureLength", Severity::High, FindingKind::Fail, "MP Configuration Table is shorter than its 44-byte header").with_table(ctx.table));
        return MinorTestResult::Abort;
    }

    let cur = blob.cursor();
    let Ok(signature) = cur.peek_bytes(0, 4) else { return MinorTestResult::Abort };
    let Ok(length) = cur.peek_u16(4) else { return MinorTestResult::Abort };
    let Ok(oem_id) = cur.peek_bytes(8, 8) else { return MinorTestResult::Abort };
    let Ok(product_id) = cur.peek_bytes(16, 12) else { return MinorTestResult::Abort };
    let Ok(entry_count) = cur.peek_u16(34) else { return MinorTestResult::Abort };

    let mut result = MinorTestResult::Ok;

    if signature != b"PCMP" {
        out.push(
            Finding::new(ctx.test_name, "MPConfigSignature", Severity::High, FindingKind::Fail, format!("MP Configuration Table signature is {:?}, expected \"PCMP\"", String::from_utf8_lossy(signature)))
                .with_table(ctx.table),
        );
        result = MinorTestResult::Error;
    }
    if !checks::structure_length_nonzero(&ctx, out, 4, length as u32) || (length as usize) > blob.declared_len() {
        out.push(
            Finding::new(ctx.test_name, "BadStructureLength", Severity::High, FindingKind::Fail, format!("MP Configuration Table declares length {length}, blob has {} bytes", blob.declared_len()))
                .with_table(ctx.table)
                .with_offset(4),
        );
        return MinorTestResult::Abort;
    }
    if checksum(&blob.data[..length as usize]) != 0 {
        out.push(Finding::new(ctx.test_name, "MPConfigChecksum", Severity::High, FindingKind::Fail, "MP Configuration Table checksum byte does not sum to zero").with_table(ctx.table).with_offset(7));
        result = MinorTestResult::Error;
    }
    checks::printable_ascii(&ctx, out, "OemId", 8, oem_id);
    checks::printable_ascii(&ctx, out, "ProductId", 16, product_id);

    match walk_entries(&ctx, out, &cur, CFG_HEADER_LEN, length as u32, entry_count) {
        true => result,
        false => MinorTestResult::Error,
    }
}

fn walk_entries(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, mut offset: u32, table_len: u32, entry_count: u16) -> bool {
    let mut ok = true;
    for _ in 0..entry_count {
        let base = offset as usize;
        let Ok(entry_type) = cur.peek_u8(base) else {
            out.push(Finding::new(ctx.test_name, "BadStructureLength", Severity::High, FindingKind::Fail, "entry array ends before the declared entry count").with_table(ctx.table).with_offset(offset));
            return false;
        };
        let entry_len: u32 = match entry_type {
            MP_PROCESSOR => 20,
            MP_BUS | MP_IOAPIC | MP_INTSRC | MP_LINTSRC => 8,
            other => {
                out.push(
                    Finding::new(ctx.test_name, "MPUnknownEntryType", Severity::Medium, FindingKind::Fail, format!("entry at offset {offset:#x} has unknown type {other}"))
                        .with_table(ctx.table)
                        .with_offset(offset),
                );
                return false;
            }
        };

        if !checks::range_in_table(ctx, out, offset, offset + entry_len, table_len) {
            return false;
        }

        match entry_type {
            MP_PROCESSOR => check_processor_entry(ctx, out, cur, offset),
            MP_BUS => check_bus_entry(ctx, out, cur, offset),
            MP_IOAPIC => check_ioapic_entry(ctx, out, cur, offset),
            MP_INTSRC | MP_LINTSRC => check_interrupt_entry(ctx, out, cur, offset),
            _ => unreachable!(),
        }
        .then_some(())
        .unwrap_or_else(|| ok = false);

        offset += entry_len;
    }
    if ok {
        out.push(Finding::pass(ctx.test_name, "MP configuration table entry walk completed").with_table(ctx.table));
    }
    ok
}

fn check_processor_entry(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32) -> bool {
    let base = offset as usize;
    let Ok(cpu_flags) = cur.peek_u8(base + 3) else { return false };
    checks::reserved_bits(ctx, out, "CpuFlags", offset + 3, cpu_flags as u64, 2..=7)
}

fn check_bus_entry(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32) -> bool {
    let base = offset as usize;
    let Ok(bus_type) = cur.peek_bytes(base + 2, 6) else { return false };
    checks::printable_ascii(ctx, out, "BusType", offset + 2, bus_type)
}

fn check_ioapic_entry(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32) -> bool {
    let base = offset as usize;
    let Ok(flags) = cur.peek_u8(base + 3) else { return false };
    checks::reserved_bits(ctx, out, "Flags", offset + 3, flags as u64, 1..=7)
}

fn check_interrupt_entry(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32) -> bool {
    let base = offset as usize;
    let Ok(int_type) = cur.peek_u8(base + 1) else { return false };
    let Ok(int_flag) = cur.peek_u16(base + 2) else { return false };
    let mut ok = checks::ranges(ctx, out, "InterruptType", offset + 1, int_type as i64, &[(0, 3)]);
    if !checks::reserved_bits(ctx, out, "InterruptFlag", offset + 2, int_flag as u64, 4..=15) {
        ok = false;
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Provenance;
    use crate::util::checksum::compute_checksum_byte;

    fn floating_pointer(physptr: u32) -> Vec<u8> {
        let mut data = vec![0u8; 16];
        data[0..4].copy_from_slice(b"_MP_");
        data[4..8].copy_from_slice(&physptr.to_le_bytes());
        data[8] = 1;
        data[9] = 4;
        data[10] = 0; // checksum placeholder
        data[12] = 0; // feature1 = uses config table
        data[10] = compute_checksum_byte(&[&data[0..10], &data[11..16]].concat());
        data
    }

    fn config_table(entries: &[Vec<u8>]) -> Vec<u8> {
        let mut data = vec![0u8; 44];
        data[0..4].copy_from_slice(b"PCMP");
        data[6] = 4; // spec_rev
        data[8..16].copy_from_slice(b"ACME    ");
        data[16..28].copy_from_slice(b"MICROVM     ");
        for entry in entries {
            data.extend_from_slice(entry);
        }
        let total = data.len() as u16;
        data[4..6].copy_from_slice(&total.to_le_bytes());
        data[34..36].copy_from_slice(&(entries.len() as u16).to_le_bytes());
        data[7] = 0;
        data[7] = compute_checksum_byte(&data);
        data
    }

    fn processor_entry(cpu_flags: u8) -> Vec<u8> {
        let mut v = vec![0u8; 20];
        v[0] = MP_PROCESSOR;
        v[3] = cpu_flags;
        v
    }

    #[test]
    fn default_configuration_skips_entry_walk() {
        let mut registry = TableRegistry::new();
        let mut fp = floating_pointer(0);
        fp[12] = 1; // default configuration 1
        fp[10] = 0;
        fp[10] = compute_checksum_byte(&[&fp[0..10], &fp[11..16]].concat());
        registry.insert(Blob::new(FP_TABLE, fp, Provenance::FromFirmware));
        let mut out = Vec::new();
        assert_eq!(run(&registry, &mut out), MinorTestResult::Ok);
        assert!(out.iter().any(|f| f.stable_tag == "MPDefaultConfiguration"));
    }

    #[test]
    fn clean_config_table_with_one_cpu_passes() {
        let mut registry = TableRegistry::new();
        registry.insert(Blob::new(FP_TABLE, floating_pointer(0x1000), Provenance::FromFirmware));
        registry.insert(Blob::new(CFG_TABLE, config_table(&[processor_entry(0x03)]), Provenance::FromFirmware).with_base_address(0x1000));
        let mut out = Vec::new();
        assert_eq!(run(&registry, &mut out), MinorTestResult::Ok);
        assert!(!out.iter().any(|f| f.kind == FindingKind::Fail));
    }

    #[test]
    fn reserved_cpu_flag_bits_are_flagged() {
        let mut registry = TableRegistry::new();
        registry.insert(Blob::new(FP_TABLE, floating_pointer(0x1000), Provenance::FromFirmware));
        registry.insert(Blob::new(CFG_TABLE, config_table(&[processor_entry(0xF3)]), Provenance::FromFirmware).with_base_address(0x1000));
        let mut out = Vec::new();
        run(&registry, &mut out);
        assert!(out.iter().any(|f| f.stable_tag == "ReservedBitUsed" && f.kind == FindingKind::Fail));
    }

    #[test]
    fn bad_floating_pointer_signature_is_flagged() {
        let mut registry = TableRegistry::new();
        let mut fp = floating_pointer(0);
        fp[0..4].copy_from_slice(b"xxxx");
        registry.insert(Blob::new(FP_TABLE, fp, Provenance::FromFirmware));
        let mut out = Vec::new();
        run(&registry, &mut out);
        assert!(out.iter().any(|f| f.stable_tag == "MPFloatingPointerSignature"));
    }
}
