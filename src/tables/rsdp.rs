//! RSDP (Root System Description Pointer) parser.
//!
//! Grounded in `original_source/src/acpi/rsdp/rsdp.c`: the RSDP is the one
//! ACPI structure that doesn't use the common 36-byte header, so this
//! parser reads its own fixed layout rather than going through
//! [`super::validate_common_header`].

use crate::checks::{self, CheckCtx};
use crate::harness::MinorTestResult;
use crate::model::{Finding, FindingKind, Severity};
use crate::registry::TableRegistry;
use crate::util::checksum::checksum;

const TEST_NAME: &str = "rsdp";
const TABLE: &str = "RSDP";

pub fn run(registry: &TableRegistry, out: &mut Vec<Finding>) -> MinorTestResult {
    let Some(blob) = registry.find_by_signature("RSDP", 0) else {
        return MinorTestResult::Skip;
    };
    let ctx = CheckCtx::new(TEST_NAME, TABLE);
    let mut cur = blob.cursor();

    let signature = match cur.read_bytes(8) {
        Ok(b) => b.to_vec(),
        Err(e) => {
            out.push(
                Finding::new(TEST_NAME, "BadStructureLength", Severity::High, FindingKind::Fail, e.to_string())
                    .with_table(TABLE),
            );
            return MinorTestResult::Abort;
        }
    };
    if signature != b"RSD PTR " {
        out.push(
            Finding::new(
                TEST_NAME,
                "FixedValueMismatch",
                Severity::Critical,
                FindingKind::Fail,
                "RSDP signature is not \"RSD PTR \"",
            )
            .with_table(TABLE)
            .with_offset(0)
            .with_field("Signature"),
        );
        return MinorTestResult::Abort;
    }

    let checksum_offset = 8u32;
    let declared_checksum = match cur.read_u8() {
        Ok(v) => v,
        Err(_) => return MinorTestResult::Abort,
    };
    let oem_id = match cur.read_bytes(6) {
        Ok(b) => b.to_vec(),
        Err(_) => return MinorTestResult::Abort,
    };
    let revision = match cur.read_u8() {
        Ok(v) => v,
        Err(_) => return MinorTestResult::Abort,
    };
    let rsdt_address = match cur.read_u32() {
        Ok(v) => v,
        Err(_) => return MinorTestResult::Abort,
    };

    let first20 = blob.data.get(0..20).unwrap_or(&blob.data);
    let sum20 = checksum(first20);
    if sum20 != 0 {
        out.push(
            Finding::new(
                TEST_NAME,
                "BadChecksum",
                Severity::High,
                FindingKind::Fail,
                format!("RSDP checksum is {sum20:#04x}, expected the first 20 bytes to sum to zero"),
            )
            .with_table(TABLE)
            .with_offset(checksum_offset)
            .with_field("Checksum"),
        );
    } else {
        out.push(Finding::pass(TEST_NAME, "RSDP checksum is valid").with_table(TABLE));
    }
    let _ = declared_checksum;

    checks::printable_ascii(&ctx, out, "OemId", 9, &oem_id);
    checks::ranges(&ctx, out, "Revision", 15, revision as i64, &[(0, 0), (2, 2)]);

    if revision == 0 {
        if rsdt_address == 0 {
            out.push(
                Finding::new(
                    TEST_NAME,
                    "ValueOutOfRange",
                    Severity::Critical,
                    FindingKind::Fail,
                    "ACPI 1.0 RSDP has a null RsdtAddress",
                )
                .with_table(TABLE)
                .with_offset(16)
                .with_field("RsdtAddress"),
            );
        } else {
            out.push(Finding::pass(TEST_NAME, "RsdtAddress is non-null").with_table(TABLE));
        }

        if cfg!(target_arch = "aarch64") {
            out.push(
                Finding::new(
                    TEST_NAME,
                    "XsdtRequired",
                    Severity::High,
                    FindingKind::Fail,
                    "this architecture requires an XSDT but the RSDP is ACPI 1.0 (RSDT only)",
                )
                .with_table(TABLE),
            );
        }
        return MinorTestResult::Ok;
    }

    // Revision >= 2: extended fields follow.
    let length = match cur.read_u32() {
        Ok(v) => v,
        Err(_) => return MinorTestResult::Abort,
    };
    let xsdt_address = match cur.read_u64() {
        Ok(v) => v,
        Err(_) => return MinorTestResult::Abort,
    };
    let extended_checksum_offset = 32u32;
    let _extended_checksum = match cur.read_u8() {
        Ok(v) => v,
        Err(_) => return MinorTestResult::Abort,
    };
    let reserved = match cur.read_bytes(3) {
        Ok(b) => b.to_vec(),
        Err(_) => return MinorTestResult::Abort,
    };

    checks::structure_length(&ctx, out, 20, length, 36);

    let full = blob.data.get(0..36.min(blob.data.len())).unwrap_or(&blob.data);
    let sum36 = checksum(full);
    if sum36 != 0 {
        out.push(
            Finding::new(
                TEST_NAME,
                "BadChecksum",
                Severity::High,
                FindingKind::Fail,
                format!("RSDP extended checksum is {sum36:#04x}, expected all 36 bytes to sum to zero"),
            )
            .with_table(TABLE)
            .with_offset(extended_checksum_offset)
            .with_field("ExtendedChecksum"),
        );
    } else {
        out.push(Finding::pass(TEST_NAME, "RSDP extended checksum is valid").with_table(TABLE));
    }

    let reserved_value = u32::from_le_bytes([reserved[0], reserved[1], reserved[2], 0]);
    checks::reserved_zero(&ctx, out, "Reserved", 27, reserved_value as u64);

    if xsdt_address == 0 && cfg!(target_arch = "aarch64") {
        out.push(
            Finding::new(
                TEST_NAME,
                "XsdtRequired",
                Severity::High,
                FindingKind::Fail,
                "this architecture requires an XSDT but XsdtAddress is null",
            )
            .with_table(TABLE)
            .with_offset(24)
            .with_field("XsdtAddress"),
        );
    } else {
        out.push(Finding::pass(TEST_NAME, "an XSDT or RSDT address is present").with_table(TABLE));
    }

    MinorTestResult::Ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Blob, Provenance};
    use crate::util::checksum::compute_checksum_byte;

    fn acpi2_rsdp(corrupt_checksum: bool) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"RSD PTR ");
        data.push(0); // checksum placeholder
        data.extend_from_slice(b"ACME01");
        data.push(2); // revision
        data.extend_from_slice(&0u32.to_le_bytes()); // rsdt_address
        data.extend_from_slice(&36u32.to_le_bytes()); // length
        data.extend_from_slice(&0x1000u64.to_le_bytes()); // xsdt_address
        data.push(0); // extended checksum placeholder
        data.extend_from_slice(&[0, 0, 0]); // reserved

        data[8] = 0;
        let sum20 = checksum(&data[0..20]);
        data[8] = compute_checksum_byte(&[sum20]);

        data[32] = 0;
        let sum_rest = checksum(&data[0..32]).wrapping_add(checksum(&data[33..36]));
        data[32] = compute_checksum_byte(&[sum_rest]);

        if corrupt_checksum {
            data[32] ^= 0xFF;
        }
        data
    }

    #[test]
    fn valid_acpi2_rsdp_passes_both_checksums() {
        let mut registry = TableRegistry::new();
        registry.insert(Blob::new("RSDP", acpi2_rsdp(false), Provenance::FromFile));
        let mut out = Vec::new();
        let result = run(&registry, &mut out);
        assert_eq!(result, MinorTestResult::Ok);
        assert!(!out.iter().any(|f| f.stable_tag == "BadChecksum" && f.kind == FindingKind::Fail));
    }

    #[test]
    fn corrupted_extended_checksum_fails() {
        let mut registry = TableRegistry::new();
        registry.insert(Blob::new("RSDP", acpi2_rsdp(true), Provenance::FromFile));
        let mut out = Vec::new();
        run(&registry, &mut out);
        assert!(out.iter().any(|f| f.stable_tag == "BadChecksum" && f.kind == FindingKind::Fail));
    }

    #[test]
    fn missing_rsdp_is_skipped_not_failed() {
        let registry = TableRegistry::new();
        let mut out = Vec::new();
        assert_eq!(run(&registry, &mut out), MinorTestResult::Skip);
        assert!(out.is_empty());
    }
}
