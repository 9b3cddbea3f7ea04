//! BERT (Boot Error Record Table) parser.
//!
//! Grounded in `original_source/src/acpi/bert/bert.c`. BERT itself is tiny —
//! a common header plus a region length and a physical pointer — but it is
//! this crate's one case of *following* a pointer out of the table into a
//! separately addressed memory region (the ACPI Boot Error Region, a UEFI
//! Generic Error Status Block). That follow only happens for
//! `Provenance::FromFirmware` blobs: a BERT loaded from a dump file names a
//! physical address this process has no right to read, so the original
//! skips the region sanity checks entirely for that case and so does this
//! parser. The follow-pointer itself is resolved once, at load time, by
//! [`crate::registry::TableRegistry::load_from`] (it asks the source to map
//! the physical address and stores the result as a `"BOOTERRREGION"` blob
//! keyed by that address); this module only ever reads the result back out
//! via `find_by_address`.

use crate::checks::{self, CheckCtx};
use crate::harness::MinorTestResult;
use crate::model::{Finding, FindingKind, Provenance, Severity};
use crate::registry::TableRegistry;

use super::validate_common_header;

const TEST_NAME: &str = "bert";
const TABLE: &str = "BERT";
const FIXED_HEADER_LEN: u32 = 48;
/// block_status(4) + raw_data_offset(4) + raw_data_length(4) +
/// data_length(4) + error_severity(4).
const REGION_HEADER_LEN: u32 = 20;

pub fn run(registry: &TableRegistry, out: &mut Vec<Finding>) -> MinorTestResult {
    let Some(blob) = registry.find_by_signature("BERT", 0) else {
        return MinorTestResult::Skip;
    };
    let ctx = CheckCtx::new(TEST_NAME, TABLE);

    let header = match validate_common_header(&ctx, out, blob) {
        Ok(h) => h,
        Err(_) => return MinorTestResult::Abort,
    };
    let _ = header;

    let cur = blob.cursor();
    let Ok(boot_error_region_length) = cur.peek_u32(36) else {
        out.push(Finding::new(TEST_NAME, "BadStructureLength", Severity::High, FindingKind::Fail, "BERT too short for its fixed header").with_table(TABLE));
        return MinorTestResult::Abort;
    };
    let Ok(boot_error_region) = cur.peek_u64(40) else {
        out.push(Finding::new(TEST_NAME, "BadStructureLength", Severity::High, FindingKind::Fail, "BERT too short for its fixed header").with_table(TABLE));
        return MinorTestResult::Abort;
    };

    if boot_error_region_length < REGION_HEADER_LEN {
        out.push(
            Finding::new(
                TEST_NAME,
                "BERTBootErrorRegionDataLength",
                Severity::High,
                FindingKind::Fail,
                format!("BERT Boot Error Region Length {boot_error_region_length} is smaller than the minimum allowed size of {REGION_HEADER_LEN} bytes"),
            )
            .with_table(TABLE)
            .with_offset(36),
        );
        return MinorTestResult::Error;
    }

    if blob.provenance != Provenance::FromFirmware {
        out.push(
            Finding::new(
                TEST_NAME,
                "BERTRegionNotMapped",
                Severity::None,
                FindingKind::Skip,
                format!("BERT table was not loaded from firmware, skipping the boot error region at {boot_error_region:#x}"),
            )
            .with_table(TABLE),
        );
        return MinorTestResult::Ok;
    }

    let Some(region) = registry.find_by_address(boot_error_region) else {
        out.push(
            Finding::new(
                TEST_NAME,
                "BERTRegionNotMapped",
                Severity::Medium,
                FindingKind::Skip,
                format!("cannot resolve the BERT boot error region at {boot_error_region:#x}, skipping its sanity checks"),
            )
            .with_table(TABLE),
        );
        return MinorTestResult::Ok;
    };

    check_region(&ctx, out, region.data.as_slice(), boot_error_region_length)
}

fn check_region(ctx: &CheckCtx, out: &mut Vec<Finding>, region: &[u8], boot_error_region_length: u32) -> MinorTestResult {
    if (region.len() as u32) < REGION_HEADER_LEN {
        out.push(
            Finding::new(ctx.test_name, "BERTBootErrorRegionDataLength", Severity::High, FindingKind::Fail, "mapped BERT boot error region is too short for its own header")
                .with_table(ctx.table),
        );
        return MinorTestResult::Error;
    }

    let raw_data_offset = u32::from_le_bytes(region[4..8].try_into().unwrap());
    let raw_data_length = u32::from_le_bytes(region[8..12].try_into().unwrap());
    let data_length = u32::from_le_bytes(region[12..16].try_into().unwrap());
    let error_severity = u32::from_le_bytes(region[16..20].try_into().unwrap());

    let mut result = MinorTestResult::Ok;

    if raw_data_offset > boot_error_region_length {
        out.push(
            Finding::new(
                ctx.test_name,
                "BERTBootErrorRegionRawDataOffset",
                Severity::High,
                FindingKind::Fail,
                format!("BERT Boot Error Region Raw Data Offset {raw_data_offset:#x} is larger than the region size of {boot_error_region_length} bytes"),
            )
            .with_table(ctx.table)
            .with_offset(4),
        );
        result = MinorTestResult::Error;
    }
    if raw_data_offset < REGION_HEADER_LEN + data_length && raw_data_length != 0 {
        out.push(
            Finding::new(
                ctx.test_name,
                "BERTBootErrorRegionRawDataOffset",
                Severity::High,
                FindingKind::Fail,
                format!(
                    "BERT Boot Error Region Raw Data Offset {raw_data_offset} is smaller than the end of the data region and Raw Data Length {raw_data_length} is non-zero"
                ),
            )
            .with_table(ctx.table)
            .with_offset(4),
        );
        result = MinorTestResult::Error;
    }
    if raw_data_length.saturating_add(raw_data_offset) > boot_error_region_length {
        out.push(
            Finding::new(
                ctx.test_name,
                "BERTBootErrorRegionRawDatalength",
                Severity::High,
                FindingKind::Fail,
                format!(
                    "BERT Boot Error Region Raw Data Length {raw_data_length} is larger than the region size less the raw data offset of {} bytes",
                    boot_error_region_length.saturating_sub(raw_data_offset)
                ),
            )
            .with_table(ctx.table)
            .with_offset(8),
        );
        result = MinorTestResult::Error;
    }
    if data_length.saturating_add(REGION_HEADER_LEN) > boot_error_region_length {
        out.push(
            Finding::new(
                ctx.test_name,
                "BERTBootErrorRegionDatalength",
                Severity::High,
                FindingKind::Fail,
                format!(
                    "BERT Boot Error Region Data Length {data_length} is larger than the region size less the boot error region header of {} bytes",
                    boot_error_region_length.saturating_sub(REGION_HEADER_LEN)
                ),
            )
            .with_table(ctx.table)
            .with_offset(12),
        );
        result = MinorTestResult::Error;
    }
    if !checks::ranges(ctx, out, "ErrorSeverity", 16, error_severity as i64, &[(0, 3)]) {
        result = MinorTestResult::Error;
    }

    if result == MinorTestResult::Ok {
        out.push(Finding::pass(ctx.test_name, "no issues found in BERT boot error region").with_table(ctx.table));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Blob;
    use crate::util::checksum::compute_checksum_byte;

    fn header(boot_error_region_length: u32, boot_error_region: u64) -> Vec<u8> {
        let mut data = vec![0u8; 48];
        data[0..4].copy_from_slice(b"BERT");
        data[4..8].copy_from_slice(&48u32.to_le_bytes());
        data[8] = 1;
        data[10..16].copy_from_slice(b"ACME01");
        data[16..24].copy_from_slice(b"BERTTBL ");
        data[36..40].copy_from_slice(&boot_error_region_length.to_le_bytes());
        data[40..48].copy_from_slice(&boot_error_region.to_le_bytes());
        data[9] = 0;
        let sum = crate::util::checksum::checksum(&data);
        data[9] = compute_checksum_byte(&[sum]);
        data
    }

    #[test]
    fn file_provenance_skips_region_checks() {
        let mut registry = TableRegistry::new();
        registry.insert(Blob::new("BERT", header(20, 0xDEAD_0000), Provenance::FromFile));
        let mut out = Vec::new();
        assert_eq!(run(&registry, &mut out), MinorTestResult::Ok);
        assert!(out.iter().any(|f| f.stable_tag == "BERTRegionNotMapped" && f.kind == FindingKind::Skip));
    }

    #[test]
    fn firmware_provenance_checks_mapped_region() {
        let mut registry = TableRegistry::new();
        registry.insert(Blob::new("BERT", header(20, 0x1000), Provenance::FromFirmware));
        let mut region = vec![0u8; 20];
        region[4..8].copy_from_slice(&100u32.to_le_bytes()); // raw_data_offset > region length 20
        registry.insert(Blob::new("BOOTERRREGION", region, Provenance::FromFirmware).with_base_address(0x1000));
        let mut out = Vec::new();
        run(&registry, &mut out);
        assert!(out.iter().any(|f| f.stable_tag == "BERTBootErrorRegionRawDataOffset"));
    }

    #[test]
    fn region_length_below_minimum_is_flagged() {
        let mut registry = TableRegistry::new();
        registry.insert(Blob::new("BERT", header(4, 0x1000), Provenance::FromFile));
        let mut out = Vec::new();
        run(&registry, &mut out);
        assert!(out.iter().any(|f| f.stable_tag == "BERTBootErrorRegionDataLength"));
    }
}
