//! TPM 1.2 "SHA1 log format" walk (`tpmevlog_check` in
//! `original_source/src/tpm/tpmevlog/tpmevlog.c`): a flat array of
//! `PCClientPCREvent` entries, each trailed by `event_data_size` bytes of
//! opaque event data.

use crate::checks::CheckCtx;
use crate::harness::MinorTestResult;
use crate::model::{Finding, FindingKind, Severity};

use super::{event_type_is_valid, pcr_index_is_valid, PC_CLIENT_PCR_EVENT_LEN};

pub(super) fn check(ctx: &CheckCtx, out: &mut Vec<Finding>, data: &[u8]) -> MinorTestResult {
    let mut offset = 0usize;
    let len = data.len();

    while offset < len {
        if len - offset < PC_CLIENT_PCR_EVENT_LEN {
            out.push(
                Finding::new(
                    ctx.test_name,
                    "EventLength",
                    Severity::Medium,
                    FindingKind::Fail,
                    format!("the remaining event log is {} bytes, smaller than a PCClientPCREvent ({PC_CLIENT_PCR_EVENT_LEN} bytes)", len - offset),
                )
                .with_table(ctx.table)
                .with_offset(offset as u32),
            );
            return MinorTestResult::Error;
        }

        let pcr_index = u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap());
        let event_type = u32::from_le_bytes(data[offset + 4..offset + 8].try_into().unwrap());
        let event_data_size = u32::from_le_bytes(data[offset + 28..offset + 32].try_into().unwrap());

        if !pcr_index_is_valid(pcr_index) {
            out.push(
                Finding::new(ctx.test_name, "PCRIndexValue", Severity::High, FindingKind::Fail, format!("the PCR Index value is undefined, {pcr_index:#010x}"))
                    .with_table(ctx.table)
                    .with_offset(offset as u32),
            );
            return MinorTestResult::Error;
        }
        if !event_type_is_valid(event_type) {
            out.push(
                Finding::new(ctx.test_name, "PCREventType", Severity::High, FindingKind::Fail, format!("the Event Type is undefined, {event_type:#010x}"))
                    .with_table(ctx.table)
                    .with_offset(offset as u32 + 4),
            );
            return MinorTestResult::Error;
        }

        let remaining_after_header = (len - offset - PC_CLIENT_PCR_EVENT_LEN) as u32;
        if remaining_after_header < event_data_size {
            out.push(
                Finding::new(
                    ctx.test_name,
                    "EventLength",
                    Severity::Medium,
                    FindingKind::Fail,
                    format!("the remaining log is {remaining_after_header} bytes, smaller than the declared event length {event_data_size}"),
                )
                .with_table(ctx.table)
                .with_offset(offset as u32 + 28),
            );
            return MinorTestResult::Error;
        }

        offset += PC_CLIENT_PCR_EVENT_LEN + event_data_size as usize;
    }

    out.push(Finding::pass(ctx.test_name, "TPM event SHA1 log walk completed").with_table(ctx.table));
    MinorTestResult::Ok
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pcr: u32, event_type: u32, data: &[u8]) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&pcr.to_le_bytes());
        v.extend_from_slice(&event_type.to_le_bytes());
        v.extend_from_slice(&[0u8; 20]);
        v.extend_from_slice(&(data.len() as u32).to_le_bytes());
        v.extend_from_slice(data);
        v
    }

    #[test]
    fn clean_log_walks_without_findings() {
        let ctx = CheckCtx::new("tpmevlog", "TPMEVLOG");
        let data = entry(0, 0x03, b"abcd"); // EV_NO_ACTION
        let mut out = Vec::new();
        assert_eq!(check(&ctx, &mut out, &data), MinorTestResult::Ok);
        assert!(!out.iter().any(|f| f.kind == FindingKind::Fail));
    }

    #[test]
    fn undefined_pcr_index_is_flagged_high() {
        let ctx = CheckCtx::new("tpmevlog", "TPMEVLOG");
        let data = entry(17, 0x03, &[]);
        let mut out = Vec::new();
        check(&ctx, &mut out, &data);
        assert!(out.iter().any(|f| f.stable_tag == "PCRIndexValue" && f.severity == Severity::High));
    }

    #[test]
    fn truncated_event_data_is_flagged() {
        let ctx = CheckCtx::new("tpmevlog", "TPMEVLOG");
        let mut data = entry(0, 0x03, b"abcd");
        data.truncate(data.len() - 2); // lie about event_data_size
        let mut out = Vec::new();
        check(&ctx, &mut out, &data);
        assert!(out.iter().any(|f| f.stable_tag == "EventLength"));
    }
}
