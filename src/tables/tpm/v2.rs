//! TPM 2.0 "Crypto agile log format" walk (`tpmevlog_v2_check`): a leading
//! `PCClientPCREvent` header whose event data is an `EfiSpecIdEvent` plus a
//! variable digest-size array, followed by a run of `TCG_PCR_EVENT2`
//! entries whose digest count and per-algorithm hash sizes are themselves
//! data-driven.

use crate::checks::CheckCtx;
use crate::harness::MinorTestResult;
use crate::model::{Finding, FindingKind, Severity};

use super::{alg_id_is_valid, event_type_is_valid, hash_size, pcr_index_is_valid, PC_CLIENT_PCR_EVENT_LEN};

/// `fwts_efi_spec_id_event`'s fixed prefix: signature[16] + platform_class(4)
/// + spec_version_minor(1) + spec_version_major(1) + spec_errata(1) +
/// uintn_size(1) + number_of_alg(4).
const SPEC_ID_EVENT_LEN: usize = 28;
/// `fwts_spec_id_event_alg_sz`: algorithm_id(2) + digest_size(2).
const ALG_SZ_LEN: usize = 4;
/// `fwts_tcg_pcr_event2`'s fixed prefix: pcr_index(4) + event_type(4) +
/// digests_count(4).
const PCR_EVENT2_LEN: usize = 12;

pub(super) fn check(ctx: &CheckCtx, out: &mut Vec<Finding>, data: &[u8]) -> MinorTestResult {
    macro_rules! fail {
        ($tag:expr, $sev:expr, $offset:expr, $($arg:tt)*) => {{
            out.push(
                Finding::new(ctx.test_name, $tag, $sev, FindingKind::Fail, format!($($arg)*))
                    .with_table(ctx.table)
                    .with_offset($offset as u32),
            );
            return MinorTestResult::Error;
        }};
    }

    let mut offset = 0usize;
    let len = data.len();

    if len < PC_CLIENT_PCR_EVENT_LEN {
        fail!("SpecidEventLength", Severity::Medium, offset, "the SpecId event is {len} bytes, smaller than PCClientPCREvent ({PC_CLIENT_PCR_EVENT_LEN} bytes)");
    }

    let pcr_index = u32::from_le_bytes(data[0..4].try_into().unwrap());
    let event_type = u32::from_le_bytes(data[4..8].try_into().unwrap());
    let digest = &data[8..28];

    if !pcr_index_is_valid(pcr_index) {
        fail!("PCRIndexValue", Severity::High, offset, "the PCR Index value is undefined, {pcr_index:#010x}");
    }
    if !event_type_is_valid(event_type) {
        fail!("PCREventType", Severity::High, offset + 4, "the Event Type is undefined, {event_type:#010x}");
    }
    if digest.iter().any(|&b| b != 0) {
        out.push(
            Finding::new(ctx.test_name, "SpecIdEvDigest", Severity::High, FindingKind::Fail, "the digest field of the SpecId event should be all zero")
                .with_table(ctx.table)
                .with_offset(8),
        );
    }

    offset += PC_CLIENT_PCR_EVENT_LEN;

    if len - offset < SPEC_ID_EVENT_LEN {
        fail!("SpecidEventLength", Severity::Medium, offset, "the SpecId event is {} bytes, smaller than the fixed EfiSpecIdEvent prefix ({SPEC_ID_EVENT_LEN} bytes)", len - offset);
    }

    let signature = &data[offset..offset + 15];
    if signature != b"Spec ID Event03" {
        fail!("SpecIdEvSignature", Severity::High, offset, "the signature of the SpecId event is not \"Spec ID Event03\", got {:?}", String::from_utf8_lossy(signature));
    }
    let platform_class = u32::from_le_bytes(data[offset + 16..offset + 20].try_into().unwrap());
    let uintn_size = data[offset + 23];
    let number_of_alg = u32::from_le_bytes(data[offset + 24..offset + 28].try_into().unwrap());

    if platform_class > 1 {
        fail!("SpecIdEvPlatformClass", Severity::High, offset + 16, "the PlatformClass value is unexpected (0 = client, 1 = server), got {platform_class:#010x}");
    }
    if uintn_size < 1 || uintn_size > 2 {
        fail!("SpecIdEvUINTNFields", Severity::High, offset + 23, "the size of the UINTN fields is unexpected (0x01 = UINT32, 0x02 = UINT64), got {uintn_size:#04x}");
    }
    if number_of_alg < 1 {
        fail!("SpecIdEvAlgNumber", Severity::High, offset + 24, "the number of hash algorithms must be 0x01 or greater, got {number_of_alg:#010x}");
    }

    offset += SPEC_ID_EVENT_LEN;

    for _ in 0..number_of_alg {
        if len - offset < ALG_SZ_LEN {
            fail!("SpecidEventLength", Severity::Medium, offset, "the SpecId event is {} bytes, smaller than one AlgorithmSize entry ({ALG_SZ_LEN} bytes)", len - offset);
        }
        let algorithm_id = u16::from_le_bytes(data[offset..offset + 2].try_into().unwrap());
        if !alg_id_is_valid(algorithm_id) {
            fail!("AlgorithmID", Severity::High, offset, "the AlgorithmID is undefined, {algorithm_id:#06x}");
        }
        offset += ALG_SZ_LEN;
    }

    if len - offset < 1 {
        fail!("SpecidEventLength", Severity::Medium, offset, "the SpecId event ends before its vendor_info_size byte");
    }
    let vendor_info_size = data[offset] as usize;
    offset += 1;
    if vendor_info_size > 0 {
        if len - offset < vendor_info_size {
            fail!("SpecidEventLength", Severity::Medium, offset, "the remaining SpecId event is too small ({} bytes) for the declared vendor info size {vendor_info_size}", len - offset);
        }
        offset += vendor_info_size;
    }

    while offset < len {
        if len - offset < PCR_EVENT2_LEN {
            fail!("EventV2Length", Severity::Medium, offset, "the remaining event2 log is {} bytes, smaller than TCG_PCR_EVENT2's fixed prefix ({PCR_EVENT2_LEN} bytes)", len - offset);
        }
        let pcr_index = u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap());
        let event_type = u32::from_le_bytes(data[offset + 4..offset + 8].try_into().unwrap());
        let digests_count = u32::from_le_bytes(data[offset + 8..offset + 12].try_into().unwrap());

        if !pcr_index_is_valid(pcr_index) {
            fail!("PCRIndexValue", Severity::High, offset, "the PCR Index value is undefined, {pcr_index:#010x}");
        }
        if !event_type_is_valid(event_type) {
            fail!("PCREventType", Severity::High, offset + 4, "the Event Type is undefined, {event_type:#010x}");
        }
        offset += PCR_EVENT2_LEN;

        for _ in 0..digests_count {
            if len - offset < 2 {
                fail!("EventV2Length", Severity::Medium, offset, "the remaining event2 log ends before a digest algorithm id");
            }
            let alg_id = u16::from_le_bytes(data[offset..offset + 2].try_into().unwrap());
            if !alg_id_is_valid(alg_id) {
                fail!("AlgorithmID", Severity::High, offset, "the AlgorithmID is undefined, {alg_id:#06x}");
            }
            offset += 2;

            let size = hash_size(alg_id);
            if size == 0 {
                fail!("EventV2HashSize", Severity::Medium, offset, "the hash size for algorithm {alg_id:#06x} is unknown, cannot size its digest");
            }
            if len - offset < size as usize {
                fail!("EventV2Length", Severity::Medium, offset, "the remaining event2 log is {} bytes, smaller than the digest it must hold ({size} bytes)", len - offset);
            }
            offset += size as usize;
        }

        if len - offset < 4 {
            fail!("EventV2Length", Severity::Medium, offset, "the remaining event2 log ends before its event_size field");
        }
        let event_size = u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap()) as usize;
        offset += 4;
        if len - offset < event_size {
            fail!("EventV2Length", Severity::Medium, offset, "the remaining event2 log is {} bytes, smaller than the declared event size {event_size}", len - offset);
        }
        offset += event_size;
    }

    out.push(Finding::pass(ctx.test_name, "TPM crypto agile event log walk completed").with_table(ctx.table));
    MinorTestResult::Ok
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pc_client_header(event_data_size: u32) -> Vec<u8> {
        let mut v = vec![0u8; 28];
        v.extend_from_slice(&event_data_size.to_le_bytes());
        v
    }

    fn spec_id_event(number_of_alg: u32, algs: &[(u16, u16)]) -> Vec<u8> {
        let mut v = vec![0u8; SPEC_ID_EVENT_LEN];
        v[0..15].copy_from_slice(b"Spec ID Event03");
        v[23] = 2; // uintn_size = UINT64
        v[24..28].copy_from_slice(&number_of_alg.to_le_bytes());
        for (alg, size) in algs {
            v.extend_from_slice(&alg.to_le_bytes());
            v.extend_from_slice(&size.to_le_bytes());
        }
        v.push(0); // vendor_info_size = 0
        v
    }

    #[test]
    fn clean_header_with_no_trailing_events_passes() {
        let ctx = CheckCtx::new("tpmevlog", "TPMEVLOG");
        let mut data = pc_client_header(0);
        data.extend_from_slice(&spec_id_event(1, &[(0x000B, 32)]));
        let mut out = Vec::new();
        assert_eq!(check(&ctx, &mut out, &data), MinorTestResult::Ok);
        assert!(!out.iter().any(|f| f.kind == FindingKind::Fail));
    }

    #[test]
    fn nonzero_digest_in_spec_id_header_is_flagged() {
        let ctx = CheckCtx::new("tpmevlog", "TPMEVLOG");
        let mut data = pc_client_header(0);
        data[8] = 0xAA; // digest should be all zero
        data.extend_from_slice(&spec_id_event(1, &[(0x000B, 32)]));
        let mut out = Vec::new();
        check(&ctx, &mut out, &data);
        assert!(out.iter().any(|f| f.stable_tag == "SpecIdEvDigest"));
    }

    #[test]
    fn bad_signature_is_flagged_high() {
        let ctx = CheckCtx::new("tpmevlog", "TPMEVLOG");
        let mut data = pc_client_header(0);
        let mut spec = spec_id_event(1, &[(0x000B, 32)]);
        spec[0..15].copy_from_slice(b"Not The Sig!!!0");
        data.extend_from_slice(&spec);
        let mut out = Vec::new();
        check(&ctx, &mut out, &data);
        assert!(out.iter().any(|f| f.stable_tag == "SpecIdEvSignature" && f.severity == Severity::High));
    }

    #[test]
    fn event2_with_unknown_hash_size_is_flagged_medium() {
        let ctx = CheckCtx::new("tpmevlog", "TPMEVLOG");
        let mut data = pc_client_header(0);
        data.extend_from_slice(&spec_id_event(1, &[(0x000B, 32)]));
        // one TCG_PCR_EVENT2: pcr=0, type=EV_NO_ACTION, digests_count=1
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0x03u32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&0x0001u16.to_le_bytes()); // TPM2_ALG_RSA: valid alg id, zero hash size
        let mut out = Vec::new();
        check(&ctx, &mut out, &data);
        assert!(out.iter().any(|f| f.stable_tag == "EventV2HashSize"));
    }
}
