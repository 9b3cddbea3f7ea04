//! End-to-end SMBIOS scenario: a v3 entry point pointing at a structure
//! table whose only structure is truncated before the double-NUL string
//! table terminator.

#[path = "fixtures.rs"]
mod fixtures;

use fixtures::{bios_information_structure, smbios_entry_point_v3};
use fwts::model::{Blob, FindingKind, Provenance, Severity};
use fwts::registry::TableRegistry;
use fwts::tables::smbios;

#[test]
fn smbios_v3_with_truncated_end_of_table_is_flagged() {
    let mut registry = TableRegistry::new();
    registry.insert(Blob::new("SMBIOS", smbios_entry_point_v3(0x3000), Provenance::FromFirmware));

    // a type-0 record whose string table is truncated to a single NUL
    // instead of the double-NUL terminator the walk requires.
    let mut table = bios_information_structure();
    table.pop(); // drop the terminating NUL, leaving only the one after "Vendor\0"
    registry.insert(Blob::new("SMBIOSTABLE", table, Provenance::FromFirmware).with_base_address(0x3000));

    let mut findings = Vec::new();
    smbios::run(&registry, &mut findings);

    let finding = findings
        .iter()
        .find(|f| f.stable_tag == "SMBIOSUnterminatedStrings")
        .expect("expected an unterminated string table finding");
    assert_eq!(finding.kind, FindingKind::Fail);
    assert_eq!(finding.severity, Severity::High);
}
