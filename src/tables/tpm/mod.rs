//! TPM event log parser.
//!
//! Grounded in `original_source/src/tpm/tpmevlog/tpmevlog.c` and
//! `src/lib/include/fwts_tpm.h`. Not an ACPI table: the blob carries no
//! common header, just a raw `binary_bios_measurements` dump loaded into the
//! registry under the synthetic signature `TPMEVLOG`. Format is detected by
//! probing for the `Spec ID Event03` signature at the offset where a TPM2.0
//! log's `EfiSpecIdEvent` would sit, immediately after the first
//! `PCClientPCREvent` header.

mod hashextend;
mod v1;
mod v2;

pub use hashextend::extend_pcr;

use crate::checks::CheckCtx;
use crate::harness::MinorTestResult;
use crate::model::Finding;
use crate::registry::TableRegistry;

const TEST_NAME: &str = "tpmevlog";
const TABLE: &str = "TPMEVLOG";

/// `PCClientPCREvent`: pcr_index(4) + event_type(4) + digest(20) +
/// event_data_size(4).
pub(crate) const PC_CLIENT_PCR_EVENT_LEN: usize = 32;
const V2_SIGNATURE: &[u8] = b"Spec ID Event03";

pub fn run(registry: &TableRegistry, out: &mut Vec<Finding>) -> MinorTestResult {
    let Some(blob) = registry.find_by_signature(TABLE, 0) else {
        return MinorTestResult::Skip;
    };
    let ctx = CheckCtx::new(TEST_NAME, TABLE);
    let data = &blob.data[..blob.declared_len()];

    if data.len() < PC_CLIENT_PCR_EVENT_LEN {
        out.push(crate::model::Finding::new(
            TEST_NAME,
            "EventLength",
            crate::model::Severity::Medium,
            crate::model::FindingKind::Fail,
            format!("TPM event log is {} bytes, smaller than one PCClientPCREvent ({PC_CLIENT_PCR_EVENT_LEN} bytes)", data.len()),
        ));
        return MinorTestResult::Error;
    }

    let is_v2 = data[PC_CLIENT_PCR_EVENT_LEN..]
        .windows(V2_SIGNATURE.len())
        .any(|w| w == V2_SIGNATURE);

    if is_v2 {
        v2::check(&ctx, out, data)
    } else {
        v1::check(&ctx, out, data)
    }
}

/// PCRs 0..=16 are defined, 23 is reserved for application support (TCG PC
/// Client Platform Firmware Profile Specification, 2.3.4 PCR Usage).
fn pcr_index_is_valid(pcr: u32) -> bool {
    pcr <= 16 || pcr == 23
}

/// The subset of `fwts_tpmlog_event_type` this validator accepts; several
/// values the real enum documents (`EV_COMPACT_HASH`,
/// `EV_EFI_PLATFORM_FIRMWARE_BLOB2`, `EV_EFI_HANDOFF_TABLES2`,
/// `EV_EFI_VARIABLE_BOOT2`, the SPDM family) are deliberately rejected here
/// because `tpmevlog_eventtype_check`'s switch statement does not accept
/// them either.
fn event_type_is_valid(event_type: u32) -> bool {
    matches!(
        event_type,
        0x0000_0000..=0x0000_0012
            | 0x8000_0000..=0x8000_0009
            | 0x8000_0010
            | 0x8000_00e0
    )
}

/// `fwts_tpm_get_hash_size`: 0 means "unsupported algorithm".
fn hash_size(alg_id: u16) -> u8 {
    match alg_id {
        0x0004 => 20, // TPM2_ALG_SHA1 (aliased with TPM2_ALG_SHA)
        0x000B => 32, // TPM2_ALG_SHA256
        0x000C => 48, // TPM2_ALG_SHA384
        0x000D => 64, // TPM2_ALG_SHA512
        _ => 0,
    }
}

/// `tpmevlog_algid_check`'s 35-value switch.
fn alg_id_is_valid(alg_id: u16) -> bool {
    matches!(
        alg_id,
        0x0001
            | 0x0003
            | 0x0004
            | 0x0005
            | 0x0006
            | 0x0007
            | 0x0008
            | 0x000A
            | 0x000B
            | 0x000C
            | 0x000D
            | 0x0010
            | 0x0012
            | 0x0013
            | 0x0014
            | 0x0015
            | 0x0016
            | 0x0017
            | 0x0018
            | 0x0019
            | 0x001A
            | 0x001B
            | 0x001C
            | 0x001D
            | 0x0020
            | 0x0021
            | 0x0022
            | 0x0023
            | 0x0025
            | 0x0026
            | 0x0027
            | 0x0028
            | 0x0029
            | 0x003F
            | 0x0040
            | 0x0041
            | 0x0042
            | 0x0043
            | 0x0044
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcr_index_rejects_undefined_values() {
        assert!(pcr_index_is_valid(16));
        assert!(pcr_index_is_valid(23));
        assert!(!pcr_index_is_valid(17));
        assert!(!pcr_index_is_valid(24));
    }

    #[test]
    fn hash_size_is_zero_for_unsupported_algorithm() {
        assert_eq!(hash_size(0x000B), 32);
        assert_eq!(hash_size(0x0001), 0);
    }
}
