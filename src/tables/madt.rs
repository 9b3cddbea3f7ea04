//! MADT (Multiple APIC Description Table) parser.
//!
//! Heterogeneous sub-structure walk: each entry starts with `{type: u8,
//! length: u8}`, dispatched by type. Grounded in spec.md §4.D's MADT
//! contract and the general walk shape of §4.D step 4.

use crate::checks::{self, CheckCtx};
use crate::harness::MinorTestResult;
use crate::model::{Blob, Finding, FindingKind, Severity};
use crate::registry::TableRegistry;

use super::validate_common_header;

const TEST_NAME: &str = "madt";
const TABLE: &str = "APIC";

pub fn run(registry: &TableRegistry, out: &mut Vec<Finding>) -> MinorTestResult {
    let Some(blob) = registry.find_by_signature("APIC", 0) else {
        return MinorTestResult::Skip;
    };
    let ctx = CheckCtx::new(TEST_NAME, TABLE);

    let header = match validate_common_header(&ctx, out, blob) {
        Ok(h) => h,
        Err(_) => return MinorTestResult::Abort,
    };
    let _ = header;

    let cur = blob.cursor();
    if cur.peek_u32(36).is_err() || cur.peek_u32(40).is_err() {
        out.push(Finding::new(TEST_NAME, "BadStructureLength", Severity::High, FindingKind::Fail, "MADT too short for its fixed header").with_table(TABLE));
        return MinorTestResult::Abort;
    }

    walk_substructures(&ctx, out, blob)
}

fn walk_substructures(ctx: &CheckCtx, out: &mut Vec<Finding>, blob: &Blob) -> MinorTestResult {
    let cur = blob.cursor();
    let table_len = blob.declared_len() as u32;
    let mut offset = 44u32;

    while offset < table_len {
        let Ok(sub_type) = cur.peek_u8(offset as usize) else { break };
        let Ok(sub_length) = cur.peek_u8(offset as usize + 1) else { break };

        if !checks::structure_length_nonzero(ctx, out, offset, sub_length as u32) {
            return MinorTestResult::Abort;
        }
        if !checks::range_in_table(ctx, out, offset, offset + sub_length as u32, table_len) {
            return MinorTestResult::Abort;
        }
        if sub_length < 6 {
            out.push(
                Finding::new(
                    ctx.test_name,
                    "BadStructureLength",
                    Severity::High,
                    FindingKind::Fail,
                    format!("MADT sub-structure type {sub_type} has length {sub_length}, minimum is 6"),
                )
                .with_table(ctx.table)
                .with_offset(offset),
            );
            return MinorTestResult::Abort;
        }

        match sub_type {
            0 => check_local_apic(ctx, out, &cur, offset),
            1 => check_io_apic(ctx, out, &cur, offset),
            2 => check_interrupt_source_override(ctx, out, &cur, offset),
            3 => check_nmi_source(ctx, out, &cur, offset),
            4 => check_nmi(ctx, out, &cur, offset),
            5 => check_local_apic_address_override(ctx, out, &cur, offset),
            6 => check_io_sapic(ctx, out, &cur, offset),
            7 => check_local_sapic(ctx, out, &cur, offset),
            8 => check_platform_interrupt_source(ctx, out, &cur, offset),
            9 => check_x2apic(ctx, out, &cur, offset),
            10 => check_local_x2apic_nmi(ctx, out, &cur, offset),
            11 => check_gicc(ctx, out, &cur, offset),
            12 => check_gicd(ctx, out, &cur, offset),
            13 => check_gic_msi_frame(ctx, out, &cur, offset),
            other => out.push(
                Finding::new(
                    ctx.test_name,
                    "UnknownSubtype",
                    Severity::High,
                    FindingKind::Fail,
                    format!("MADT sub-structure type {other} is not a documented value"),
                )
                .with_table(ctx.table)
                .with_offset(offset),
            ),
        }

        offset += sub_length as u32;
    }

    if offset != table_len {
        out.push(
            Finding::new(
                ctx.test_name,
                "TrailingBytes",
                Severity::Medium,
                FindingKind::Fail,
                format!("MADT walk ended at offset {offset:#x}, table declares length {table_len:#x}"),
            )
            .with_table(ctx.table),
        );
    } else {
        out.push(Finding::pass(ctx.test_name, "MADT sub-structure walk consumed exactly the declared length").with_table(ctx.table));
    }

    MinorTestResult::Ok
}

fn check_local_apic(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32) {
    let base = offset as usize;
    if let Ok(flags) = cur.peek_u32(base + 4) {
        checks::reserved_bits(ctx, out, "LocalApicFlags", offset + 4, flags as u64, 2..=31);
    }
}

fn check_io_apic(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32) {
    let base = offset as usize;
    if let Ok(reserved) = cur.peek_u8(base + 3) {
        checks::reserved_zero(ctx, out, "IoApicReserved", offset + 3, reserved as u64);
    }
}

fn check_interrupt_source_override(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32) {
    let base = offset as usize;
    if let Ok(flags) = cur.peek_u16(base + 8) {
        checks::reserved_bits(ctx, out, "MpsIntiFlags", offset + 8, flags as u64, 4..=15);
    }
}

fn check_nmi(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32) {
    let base = offset as usize;
    if let Ok(flags) = cur.peek_u16(base + 3) {
        checks::reserved_bits(ctx, out, "LocalApicNmiFlags", offset + 3, flags as u64, 4..=15);
    }
}

fn check_x2apic(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32) {
    let base = offset as usize;
    if let Ok(reserved) = cur.peek_u16(base + 2) {
        checks::reserved_zero(ctx, out, "X2ApicReserved", offset + 2, reserved as u64);
    }
    if let Ok(flags) = cur.peek_u32(base + 8) {
        checks::reserved_bits(ctx, out, "X2ApicFlags", offset + 8, flags as u64, 2..=31);
    }
}

fn check_nmi_source(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32) {
    let base = offset as usize;
    if let Ok(flags) = cur.peek_u16(base + 2) {
        checks::reserved_bits(ctx, out, "NmiSourceFlags", offset + 2, flags as u64, 4..=15);
    }
}

fn check_local_apic_address_override(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32) {
    let base = offset as usize;
    if let Ok(reserved) = cur.peek_u16(base + 2) {
        checks::reserved_zero(ctx, out, "LocalApicAddressOverrideReserved", offset + 2, reserved as u64);
    }
}

fn check_io_sapic(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32) {
    let base = offset as usize;
    if let Ok(reserved) = cur.peek_u8(base + 3) {
        checks::reserved_zero(ctx, out, "IoSapicReserved", offset + 3, reserved as u64);
    }
}

fn check_local_sapic(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32) {
    let base = offset as usize;
    let mut reserved = 0u64;
    for i in 0..3 {
        if let Ok(b) = cur.peek_u8(base + 5 + i) {
            reserved |= (b as u64) << (i * 8);
        }
    }
    checks::reserved_zero(ctx, out, "LocalSapicReserved", offset + 5, reserved);
    if let Ok(flags) = cur.peek_u32(base + 8) {
        checks::reserved_bits(ctx, out, "LocalSapicFlags", offset + 8, flags as u64, 1..=31);
    }
}

fn check_platform_interrupt_source(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32) {
    let base = offset as usize;
    if let Ok(flags) = cur.peek_u16(base + 2) {
        checks::reserved_bits(ctx, out, "PlatformInterruptSourceFlags", offset + 2, flags as u64, 3..=15);
    }
    if let Ok(interrupt_type) = cur.peek_u8(base + 4) {
        checks::ranges(ctx, out, "InterruptType", offset + 4, interrupt_type as i64, &[(1, 3)]);
    }
    if let Ok(source_flags) = cur.peek_u32(base + 12) {
        checks::reserved_bits(ctx, out, "PlatformInterruptSourceFlags2", offset + 12, source_flags as u64, 2..=31);
    }
}

fn check_local_x2apic_nmi(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32) {
    let base = offset as usize;
    if let Ok(flags) = cur.peek_u16(base + 2) {
        checks::reserved_bits(ctx, out, "Localx2apicNmiFlags", offset + 2, flags as u64, 4..=15);
    }
    let mut reserved = 0u64;
    for i in 0..3 {
        if let Ok(b) = cur.peek_u8(base + 9 + i) {
            reserved |= (b as u64) << (i * 8);
        }
    }
    checks::reserved_zero(ctx, out, "Localx2apicNmiReserved", offset + 9, reserved);
}

fn check_gicc(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32) {
    let base = offset as usize;
    if let Ok(reserved) = cur.peek_u16(base + 2) {
        checks::reserved_zero(ctx, out, "GiccReserved", offset + 2, reserved as u64);
    }
    if let Ok(flags) = cur.peek_u32(base + 12) {
        checks::reserved_bits(ctx, out, "GiccFlags", offset + 12, flags as u64, 2..=31);
    }
    if let Ok(reserved2) = cur.peek_u8(base + 77) {
        checks::reserved_zero(ctx, out, "GiccReserved2", offset + 77, reserved2 as u64);
    }
}

fn check_gicd(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32) {
    let base = offset as usize;
    if let Ok(reserved) = cur.peek_u16(base + 2) {
        checks::reserved_zero(ctx, out, "GicdReserved", offset + 2, reserved as u64);
    }
    let mut reserved2 = 0u64;
    for i in 0..3 {
        if let Ok(b) = cur.peek_u8(base + 21 + i) {
            reserved2 |= (b as u64) << (i * 8);
        }
    }
    checks::reserved_zero(ctx, out, "GicdReserved2", offset + 21, reserved2);
}

fn check_gic_msi_frame(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32) {
    let base = offset as usize;
    if let Ok(reserved) = cur.peek_u16(base + 2) {
        checks::reserved_zero(ctx, out, "GicMsiFrameReserved", offset + 2, reserved as u64);
    }
    if let Ok(flags) = cur.peek_u32(base + 16) {
        checks::reserved_bits(ctx, out, "GicMsiFrameFlags", offset + 16, flags as u64, 1..=31);
    }
}
