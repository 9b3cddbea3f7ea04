//! Per-structure-type field checks and the type/version/length policy
//! table, grounded in `dmicheck_entry`/`dmicheck_type_length`
//! (`original_source/src/dmi/dmicheck/dmicheck.c`).
//!
//! Only the structure types the original gives bespoke field checks to
//! (BIOS Information, System Information, Base Board Information, Chassis
//! Information, Processor Information) get one here; every other declared
//! type still gets the shared header/string-table/type-length-policy
//! validation every structure receives, plus an `Info` finding noting it
//! has no bespoke walker yet.

use crate::checks::{self, CheckCtx};
use crate::model::{Finding, FindingKind, Severity};
use crate::util::guid;

/// `type_info[]`: (type, min_version, max_version, required length). A
/// `max_version` of `u16::MAX` means "applies through the newest spec
/// revision this policy has an entry for."
struct TypeLength {
    smbios_type: u8,
    min_version: u16,
    max_version: u16,
    length: u8,
}

const TYPE_LENGTH_POLICY: &[TypeLength] = &[
    TypeLength { smbios_type: 15, min_version: 0x200, max_version: 0x201, length: 0x14 },
    TypeLength { smbios_type: 16, min_version: 0x201, max_version: 0x207, length: 0x0f },
    TypeLength { smbios_type: 16, min_version: 0x207, max_version: u16::MAX, length: 0x17 },
    TypeLength { smbios_type: 17, min_version: 0x201, max_version: 0x203, length: 0x15 },
    TypeLength { smbios_type: 17, min_version: 0x203, max_version: 0x206, length: 0x1b },
    TypeLength { smbios_type: 17, min_version: 0x206, max_version: 0x207, length: 0x1c },
    TypeLength { smbios_type: 17, min_version: 0x207, max_version: 0x208, length: 0x22 },
    TypeLength { smbios_type: 17, min_version: 0x208, max_version: 0x302, length: 0x28 },
    TypeLength { smbios_type: 17, min_version: 0x302, max_version: 0x303, length: 0x54 },
    TypeLength { smbios_type: 17, min_version: 0x303, max_version: u16::MAX, length: 0x5c },
    TypeLength { smbios_type: 19, min_version: 0x201, max_version: 0x207, length: 0x0f },
    TypeLength { smbios_type: 19, min_version: 0x207, max_version: u16::MAX, length: 0x1f },
    TypeLength { smbios_type: 20, min_version: 0x201, max_version: 0x207, length: 0x13 },
    TypeLength { smbios_type: 20, min_version: 0x207, max_version: u16::MAX, length: 0x23 },
];

/// Checks `length` against the policy table for `smbios_type`, if one
/// exists. Types 17 (Memory Device, spec >= 3.2) and 15 (System Event Log,
/// its length is itself a function of two trailing fields) get the
/// original's special-cased "at least this long" treatment instead of an
/// exact match.
pub fn check_type_length(ctx: &CheckCtx, out: &mut Vec<Finding>, smbios_type: u8, version: u16, length: u8, data: &[u8]) {
    if smbios_type == 15 && version >= 0x201 && length as usize >= 0x17 && data.len() > 0x16 {
        let expected = 0x17u16 + data[0x15] as u16 * data[0x16] as u16;
        if expected == length as u16 {
            return;
        }
    }
    let Some(entry) = TYPE_LENGTH_POLICY.iter().find(|e| e.smbios_type == smbios_type && version >= e.min_version && version < e.max_version) else {
        return;
    };
    if length != entry.length {
        out.push(
            Finding::new(
                ctx.test_name,
                "DMIBadTableLength",
                Severity::High,
                FindingKind::Fail,
                format!("type {smbios_type} expects length {:#04x} for SMBIOS version {version:#06x}, has length {length:#04x}", entry.length),
            )
            .with_table(ctx.table)
            .with_field("Length"),
        );
    } else {
        out.push(Finding::pass(ctx.test_name, format!("type {smbios_type} structure length matches policy")).with_table(ctx.table));
    }
}

fn str_check(ctx: &CheckCtx, out: &mut Vec<Finding>, field: &str, offset: u8, data: &[u8], string_count: u8, severity: Severity) {
    if (offset as usize) >= data.len() {
        return;
    }
    checks::string_index(ctx, out, field, offset as u32, data[offset as usize], string_count, severity);
}

fn uuid_check(ctx: &CheckCtx, out: &mut Vec<Finding>, field: &str, offset: u8, data: &[u8]) {
    if data.len() < offset as usize + 16 {
        return;
    }
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&data[offset as usize..offset as usize + 16]);
    let s = guid::format_guid(&bytes);
    if guid::is_placeholder_string(&s) || bytes == [0xffu8; 16] {
        out.push(
            Finding::new(ctx.test_name, "DMIBadUUID", Severity::Low, FindingKind::Fail, format!("{field} has a default/placeholder value '{s}' and probably has not been updated by the BIOS vendor"))
                .with_table(ctx.table)
                .with_offset(offset as u32)
                .with_field(field),
        );
    }
}

/// Dispatches on structure type. `data` is the structure's formatted area
/// only (header included, string table excluded). Returns `true` if no
/// failing finding was pushed.
pub fn check_structure(ctx: &CheckCtx, out: &mut Vec<Finding>, smbios_type: u8, data: &[u8], string_count: u8) -> bool {
    let before = out.len();
    match smbios_type {
        0 if data.len() >= 0x12 => check_bios_information(ctx, out, data, string_count),
        1 if data.len() >= 0x08 => check_system_information(ctx, out, data, string_count),
        2 if data.len() >= 0x08 => check_base_board_information(ctx, out, data, string_count),
        3 if data.len() >= 0x09 => check_chassis_information(ctx, out, data, string_count),
        4 if data.len() >= 0x1a => check_processor_information(ctx, out, data, string_count),
        _ => out.push(
            Finding::new(ctx.test_name, "Info", Severity::None, FindingKind::Info, format!("structure type {smbios_type} is not yet given bespoke field checks"))
                .with_table(ctx.table),
        ),
    }
    !out[before..].iter().any(|f| f.kind == FindingKind::Fail)
}

fn check_bios_information(ctx: &CheckCtx, out: &mut Vec<Finding>, data: &[u8], string_count: u8) {
    str_check(ctx, out, "Vendor", 0x4, data, string_count, Severity::Low);
    str_check(ctx, out, "BIOS Version", 0x5, data, string_count, Severity::Low);
    str_check(ctx, out, "Release Date", 0x8, data, string_count, Severity::Low);
    if data.len() < 0x18 {
        return;
    }
    checks::reserved_bits(ctx, out, "BIOS Characteristics Extension Byte 2", 0x13, data[0x13] as u64, 5..=7);
    if data.len() < 0x1a {
        return;
    }
    let extended_rom_size = u16::from_le_bytes([data[0x18], data[0x19]]);
    checks::reserved_bits(ctx, out, "Extended BIOS ROM Size", 0x18, extended_rom_size as u64, 15..=15);
}

fn check_system_information(ctx: &CheckCtx, out: &mut Vec<Finding>, data: &[u8], string_count: u8) {
    str_check(ctx, out, "Manufacturer", 0x4, data, string_count, Severity::Low);
    str_check(ctx, out, "Product Name", 0x5, data, string_count, Severity::Low);
    str_check(ctx, out, "Version", 0x6, data, string_count, Severity::Low);
    str_check(ctx, out, "Serial Number", 0x7, data, string_count, Severity::Low);
    if data.len() < 0x19 {
        return;
    }
    uuid_check(ctx, out, "UUID", 0x8, data);
    checks::min_max(ctx, out, "Wakeup Type", 0x18, data[0x18] as i64, 0x0, 0x08);
    if data.len() < 0x1b {
        return;
    }
    str_check(ctx, out, "SKU Number", 0x19, data, string_count, Severity::Low);
    str_check(ctx, out, "Family", 0x1a, data, string_count, Severity::Low);
}

fn check_base_board_information(ctx: &CheckCtx, out: &mut Vec<Finding>, data: &[u8], string_count: u8) {
    str_check(ctx, out, "Manufacturer", 0x4, data, string_count, Severity::Low);
    str_check(ctx, out, "Product", 0x5, data, string_count, Severity::Low);
    str_check(ctx, out, "Version", 0x6, data, string_count, Severity::Low);
    str_check(ctx, out, "Serial Number", 0x7, data, string_count, Severity::Low);
    if data.len() < 0x09 {
        return;
    }
    str_check(ctx, out, "Asset Tag", 0x8, data, string_count, Severity::Low);
    if data.len() < 0x0f {
        return;
    }
    checks::reserved_bits(ctx, out, "Feature Flags", 0x9, data[0x9] as u64, 5..=7);
    str_check(ctx, out, "Location In Chassis", 0xa, data, string_count, Severity::Low);
    checks::min_max(ctx, out, "Type", 0xd, data[0xd] as i64, 0x1, 0xd);
}

const CHASSIS_TYPE_MAX: i64 = 0x24;

fn check_chassis_information(ctx: &CheckCtx, out: &mut Vec<Finding>, data: &[u8], string_count: u8) {
    str_check(ctx, out, "Manufacturer", 0x4, data, string_count, Severity::Low);
    checks::min_max(ctx, out, "Chassis Type", 0x5, (data[0x5] & 0x7f) as i64, 0x1, CHASSIS_TYPE_MAX - 1);
    checks::min_max(ctx, out, "Boot-up State", 0x9, data[0x9] as i64, 0x1, 0x6);
    checks::min_max(ctx, out, "Power Supply State", 0xa, data[0xa] as i64, 0x1, 0x6);
    checks::min_max(ctx, out, "Thermal State", 0xb, data[0xb] as i64, 0x1, 0x6);
    checks::min_max(ctx, out, "Security Status", 0xc, data[0xc] as i64, 0x1, 0x5);
    str_check(ctx, out, "Version", 0x6, data, string_count, Severity::Low);
    str_check(ctx, out, "Serial Number", 0x7, data, string_count, Severity::Low);
    str_check(ctx, out, "Asset Tag", 0x8, data, string_count, Severity::Low);
}

fn check_processor_information(ctx: &CheckCtx, out: &mut Vec<Finding>, data: &[u8], string_count: u8) {
    str_check(ctx, out, "Socket Designation", 0x4, data, string_count, Severity::Low);
    checks::min_max(ctx, out, "Processor Type", 0x5, data[0x5] as i64, 0x1, 0x6);
    checks::min_max(ctx, out, "Processor Family", 0x6, data[0x6] as i64, 0x1, 0xfe);
    str_check(ctx, out, "Processor Manufacturer", 0x7, data, string_count, Severity::Low);
    str_check(ctx, out, "Processor Version", 0x10, data, string_count, Severity::Low);

    if data.len() > 0x18 {
        let status = data[0x18];
        if matches!(status & 0x07, 0x5 | 0x6) {
            out.push(
                Finding::new(ctx.test_name, "DMIValueOutOfRange", Severity::High, FindingKind::Fail, format!("Status bits 0..2 set to illegal value {:#x}", status & 0x07))
                    .with_table(ctx.table)
                    .with_offset(0x18)
                    .with_field("Status"),
            );
        }
        checks::reserved_bits(ctx, out, "Status", 0x18, status as u64, 3..=5);
        checks::reserved_bits(ctx, out, "Status", 0x18, status as u64, 7..=7);
        checks::min_max(ctx, out, "Processor Upgrade", 0x19, data[0x19] as i64, 0x1, 0x50);
    }
    if data.len() < 0x23 {
        return;
    }
    str_check(ctx, out, "Serial Number", 0x20, data, string_count, Severity::Low);
    str_check(ctx, out, "Asset Tag", 0x21, data, string_count, Severity::Low);
    str_check(ctx, out, "Part Number", 0x22, data, string_count, Severity::Low);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> CheckCtx<'static> {
        CheckCtx::new("smbios", "SMBIOSTABLE")
    }

    #[test]
    fn type15_length_derived_from_trailing_fields_is_accepted() {
        let mut out = Vec::new();
        let mut data = vec![0u8; 0x17];
        data[0x15] = 2;
        data[0x16] = 4;
        // with two log-type descriptors of 4 bytes each the true structure
        // length is 0x17 + 2*4 = 0x1f
        check_type_length(&ctx(), &mut out, 15, 0x201, 0x1f, &data);
        assert!(!out.iter().any(|f| f.stable_tag == "DMIBadTableLength"));
    }

    #[test]
    fn type16_wrong_length_for_version_is_flagged() {
        let mut out = Vec::new();
        check_type_length(&ctx(), &mut out, 16, 0x300, 0x0f, &[]);
        assert!(out.iter().any(|f| f.stable_tag == "DMIBadTableLength"));
    }

    #[test]
    fn chassis_type_out_of_range_is_flagged() {
        let mut out = Vec::new();
        let mut data = vec![0u8; 0x0d];
        data[0x5] = 0x7f; // masked to 0x7f, out of the 0x01..0x23 range
        check_chassis_information(&ctx(), &mut out, &data, 0);
        assert!(out.iter().any(|f| f.stable_tag == "ValueOutOfRange" && f.kind == FindingKind::Fail));
    }

    #[test]
    fn placeholder_uuid_is_flagged_low() {
        let mut out = Vec::new();
        let data = vec![0u8; 0x19];
        uuid_check(&ctx(), &mut out, "UUID", 0x8, &data);
        assert!(out.iter().any(|f| f.stable_tag == "DMIBadUUID" && f.severity == Severity::Low));
    }
}
