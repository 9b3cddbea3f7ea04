//! FADT/FACP parser.
//!
//! Field offsets are the ACPI 6.x 276-byte layout, grounded in the GAS-based
//! FADT struct shape shown by the `aurae-runtime-aurae` vendor ACPI crate in
//! `other_examples/` (`c3c2dbb3_...－fadt.rs.rs`) — that struct's packed
//! field order is simply read back here instead of being reused.

use crate::checks::{self, CheckCtx};
use crate::harness::MinorTestResult;
use crate::model::{Finding, FindingKind, Severity};
use crate::registry::TableRegistry;

use super::{check_gas, peek_gas, validate_common_header};

const TEST_NAME: &str = "fadt";
const TABLE: &str = "FACP";

const MIN_LENGTH: u32 = 116;

pub fn run(registry: &TableRegistry, out: &mut Vec<Finding>) -> MinorTestResult {
    let Some(blob) = registry.find_by_signature("FACP", 0) else {
        return MinorTestResult::Skip;
    };
    let ctx = CheckCtx::new(TEST_NAME, TABLE);

    let header = match validate_common_header(&ctx, out, blob) {
        Ok(h) => h,
        Err(_) => return MinorTestResult::Abort,
    };
    if header.length < MIN_LENGTH {
        out.push(
            Finding::new(
                TEST_NAME,
                "BadStructureLength",
                Severity::High,
                FindingKind::Fail,
                format!("FADT length {} is below the minimum {MIN_LENGTH}", header.length),
            )
            .with_table(TABLE),
        );
        return MinorTestResult::Abort;
    }

    let cur = blob.cursor();

    let preferred_pm_profile = cur.peek_u8(45).unwrap_or(0);
    checks::ranges(&ctx, out, "PreferredPmProfile", 45, preferred_pm_profile as i64, &[(0, 8)]);

    if let Ok(iapc_boot_arch) = cur.peek_u16(109) {
        checks::reserved_bits(&ctx, out, "IaPcBootArch", 109, iapc_boot_arch as u64, 10..=15);
    }

    if let Ok(flags) = cur.peek_u32(112) {
        checks::reserved_bits(&ctx, out, "Flags", 112, flags as u64, 22..=31);
    }

    if header.revision >= 5 {
        if let Ok(arm_boot_arch) = cur.peek_u16(129) {
            checks::reserved_bits(&ctx, out, "ArmBootArch", 129, arm_boot_arch as u64, 1..=15);
        }
    }

    if blob.declared_len() >= 128 + 12 {
        if let Ok(gas) = peek_gas(&cur, 116) {
            check_gas(&ctx, out, "ResetReg", 116, &gas);
        }
    }

    // 64-bit extended register block, present from ACPI 2.0 (FADT revision >= 3).
    if header.revision >= 3 && blob.declared_len() >= 268 {
        for (field, offset) in [
            ("XPm1aEvtBlk", 148),
            ("XPm1bEvtBlk", 160),
            ("XPm1aCntBlk", 172),
            ("XPm1bCntBlk", 184),
            ("XPm2CntBlk", 196),
            ("XPmTmrBlk", 208),
            ("XGpe0Blk", 220),
            ("XGpe1Blk", 232),
        ] {
            if let Ok(gas) = peek_gas(&cur, offset) {
                // A GAS with space_id 0 and zero width is "unused", common
                // and not itself a defect; only check space_id when the
                // register block is actually populated.
                if gas.bit_width != 0 || gas.address != 0 {
                    check_gas(&ctx, out, field, offset as u32, &gas);
                }
            }
        }
    }

    if header.length >= 276 && blob.declared_len() >= 268 {
        if let Ok(gas) = peek_gas(&cur, 244) {
            if gas.bit_width != 0 || gas.address != 0 {
                check_gas(&ctx, out, "SleepControlReg", 244, &gas);
            }
        }
        if let Ok(gas) = peek_gas(&cur, 256) {
            if gas.bit_width != 0 || gas.address != 0 {
                check_gas(&ctx, out, "SleepStatusReg", 256, &gas);
            }
        }
    }

    MinorTestResult::Ok
}
