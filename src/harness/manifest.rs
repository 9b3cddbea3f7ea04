//! Static test registration (spec.md §4.F "Registration is static: the set
//! of tests is fixed at build time").
//!
//! Each entry wires one table-parser module into the harness without the
//! harness itself needing to know anything about ACPI, SMBIOS, or TPM.

use crate::model::{Blob, Finding};
use crate::registry::TableRegistry;

use super::{Flags, MinorTestResult, Ordering, TestDescriptor};

/// A table parser's minor test: reads whatever blobs it needs straight out
/// of the registry (rather than being handed one up front), since several
/// tests (MADT vs. FACP, or the SMBIOS entry point vs. its string table)
/// need more than one blob or need to decide for themselves which instance
/// to use.
pub type MinorTestFn = fn(&TableRegistry, &mut Vec<Finding>) -> MinorTestResult;

/// Builds the fixed list of registered tests, in registration order. The
/// harness re-sorts this by `ordering` bucket before running it.
pub fn manifest() -> Vec<TestDescriptor> {
    vec![
        TestDescriptor {
            name: "rsdp",
            description: "RSDP checksum, revision and XSDT/RSDT presence",
            ordering: Ordering::First,
            flags: Flags::BATCH | Flags::ACPI,
            minor_tests: vec![("rsdp_checksums_and_revision", crate::tables::rsdp::run as MinorTestFn)],
            init: None,
            deinit: None,
        },
        TestDescriptor {
            name: "fadt",
            description: "FADT/FACP fixed-feature flags and GAS fields",
            ordering: Ordering::Early,
            flags: Flags::BATCH | Flags::ACPI,
            minor_tests: vec![("fadt_fields", crate::tables::fadt::run as MinorTestFn)],
            init: None,
            deinit: None,
        },
        TestDescriptor {
            name: "madt",
            description: "MADT interrupt controller structure walk",
            ordering: Ordering::Anytime,
            flags: Flags::BATCH | Flags::ACPI,
            minor_tests: vec![("madt_substructures", crate::tables::madt::run as MinorTestFn)],
            init: None,
            deinit: None,
        },
        TestDescriptor {
            name: "srat",
            description: "SRAT affinity structure walk",
            ordering: Ordering::Anytime,
            flags: Flags::BATCH | Flags::ACPI,
            minor_tests: vec![("srat_affinities", crate::tables::srat::run as MinorTestFn)],
            init: None,
            deinit: None,
        },
        TestDescriptor {
            name: "hmat",
            description: "HMAT locality/cache subtable arithmetic",
            ordering: Ordering::Anytime,
            flags: Flags::BATCH | Flags::ACPI,
            minor_tests: vec![("hmat_subtables", crate::tables::hmat::run as MinorTestFn)],
            init: None,
            deinit: None,
        },
        TestDescriptor {
            name: "iort",
            description: "IORT node array and ID-mapping bounds",
            ordering: Ordering::Anytime,
            flags: Flags::BATCH | Flags::ACPI,
            minor_tests: vec![("iort_nodes", crate::tables::iort::run as MinorTestFn)],
            init: None,
            deinit: None,
        },
        TestDescriptor {
            name: "bert",
            description: "BERT boot error region follow-pointer",
            ordering: Ordering::Anytime,
            flags: Flags::BATCH | Flags::ACPI,
            minor_tests: vec![("bert_region", crate::tables::bert::run as MinorTestFn)],
            init: None,
            deinit: None,
        },
        TestDescriptor {
            name: "dmar",
            description: "DMAR remapping structure walk",
            ordering: Ordering::Anytime,
            flags: Flags::BATCH | Flags::ACPI,
            minor_tests: vec![("dmar_remapping_structures", crate::tables::dmar::run as MinorTestFn)],
            init: None,
            deinit: None,
        },
        TestDescriptor {
            name: "mptable",
            description: "MP floating pointer and configuration table",
            ordering: Ordering::Anytime,
            flags: Flags::BATCH,
            minor_tests: vec![("mptable_records", crate::tables::mptable::run as MinorTestFn)],
            init: None,
            deinit: None,
        },
        TestDescriptor {
            name: "smbios",
            description: "SMBIOS/DMI entry point and structure table",
            ordering: Ordering::Anytime,
            flags: Flags::BATCH,
            minor_tests: vec![("smbios_structures", crate::tables::smbios::run as MinorTestFn)],
            init: None,
            deinit: None,
        },
        TestDescriptor {
            name: "tpmevlog",
            description: "TPM 1.2/2.0 event log walk",
            ordering: Ordering::Anytime,
            flags: Flags::BATCH,
            minor_tests: vec![("tpm_event_log", crate::tables::tpm::run as MinorTestFn)],
            init: None,
            deinit: None,
        },
        TestDescriptor {
            name: "aest",
            description: "AEST error-source node walk, interface group_format dispatch",
            ordering: Ordering::Anytime,
            flags: Flags::BATCH | Flags::ACPI,
            minor_tests: vec![("aest_nodes", crate::tables::aest::run as MinorTestFn)],
            init: None,
            deinit: None,
        },
        TestDescriptor {
            name: "erst",
            description: "ERST serialization instruction entry action/instruction ranges",
            ordering: Ordering::Anytime,
            flags: Flags::BATCH | Flags::ACPI,
            minor_tests: vec![("erst_instruction_entries", crate::tables::erst_einj::run_erst as MinorTestFn)],
            init: None,
            deinit: None,
        },
        TestDescriptor {
            name: "einj",
            description: "EINJ injection instruction entry action/instruction ranges",
            ordering: Ordering::Anytime,
            flags: Flags::BATCH | Flags::ACPI,
            minor_tests: vec![("einj_instruction_entries", crate::tables::erst_einj::run_einj as MinorTestFn)],
            init: None,
            deinit: None,
        },
        TestDescriptor {
            name: "generictable",
            description: "header/checksum/length validation for every other \
                registered ACPI signature (MPAM, CSRT, GTDT, PCCT, \
                ASF!, SPCR, FACS, HPET, RASF, ECDT, SBST, UEFI, \
                BGRT, TPM2, SVKL, NHLT, CPEP, BOOT, SLIC, FPDT, MCHI, TCPA \
                — not yet implemented beyond this; header checked only)",
            ordering: Ordering::Last,
            flags: Flags::BATCH | Flags::ACPI,
            minor_tests: vec![("generic_header_and_checksum", crate::tables::generic_table_check as MinorTestFn)],
            init: None,
            deinit: None,
        },
    ]
}

pub(crate) fn blobs_for<'a>(registry: &'a TableRegistry, signature: &str) -> Vec<&'a Blob> {
    registry.find_all_by_signature(signature)
}
