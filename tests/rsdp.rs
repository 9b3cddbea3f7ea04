//! End-to-end RSDP scenario: a well-formed ACPI 2.0+ RSDP should pass both
//! checksums and its revision/address checks with zero failures.

#[path = "fixtures.rs"]
mod fixtures;

use fwts::harness::MinorTestResult;
use fwts::model::{Blob, FindingKind, Provenance};
use fwts::registry::TableRegistry;
use fwts::tables::rsdp;
use fwts::util::checksum::{checksum, compute_checksum_byte};

/// Builds a 36-byte ACPI 2.0 RSDP: `"RSD PTR "` + checksum-adjusted +
/// `"ACME01"` + revision 2 + `rsdt_address=0` + `length=36` +
/// `xsdt_address=0x7FFF_0000` + extended-checksum-adjusted + reserved.
fn acpi2_rsdp() -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(b"RSD PTR ");
    data.push(0); // checksum placeholder
    data.extend_from_slice(b"ACME01");
    data.push(2); // revision
    data.extend_from_slice(&0u32.to_le_bytes()); // rsdt_address
    data.extend_from_slice(&36u32.to_le_bytes()); // length
    data.extend_from_slice(&0x7FFF_0000u64.to_le_bytes()); // xsdt_address
    data.push(0); // extended checksum placeholder
    data.extend_from_slice(&[0, 0, 0]); // reserved

    let sum20 = checksum(&data[0..20]);
    data[8] = compute_checksum_byte(&[sum20]);

    let sum_rest = checksum(&data[0..32]).wrapping_add(checksum(&data[33..36]));
    data[32] = compute_checksum_byte(&[sum_rest]);
    data
}

#[test]
fn rsdp_v2_happy_path_passes_both_checksums_and_revision() {
    let mut registry = TableRegistry::new();
    registry.insert(Blob::new("RSDP", acpi2_rsdp(), Provenance::FromFile));

    let mut findings = Vec::new();
    let result = rsdp::run(&registry, &mut findings);

    assert_eq!(result, MinorTestResult::Ok);
    assert!(
        !findings.iter().any(|f| f.kind == FindingKind::Fail),
        "expected zero failures, got {findings:#?}"
    );
    assert!(findings.iter().any(|f| f.kind == FindingKind::Pass && f.text.contains("checksum")));
    assert!(findings.iter().any(|f| f.kind == FindingKind::Pass && f.text.contains("extended checksum")));
    assert!(findings.iter().any(|f| f.kind == FindingKind::Pass && f.text.contains("XSDT or RSDT")));
}
