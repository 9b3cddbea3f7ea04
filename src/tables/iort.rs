//! IORT (IO Remapping Table) parser.
//!
//! Grounded in `original_source/src/acpi/iort/iort.c`: a fixed 52-byte table
//! header (common 36-byte header + node count + node array offset +
//! reserved) followed by a node array. Each node carries a 16-byte common
//! header (`{type, length, revision, identifier, id_mappings_count,
//! id_array_offset}`), a node-type-specific body, and trails its own ID
//! mapping array (20 bytes per entry) at `id_array_offset`.

use crate::checks::{self, CheckCtx};
use crate::harness::MinorTestResult;
use crate::model::{Blob, Finding, FindingKind, Severity};
use crate::registry::TableRegistry;

use super::validate_common_header;

const TEST_NAME: &str = "iort";
const TABLE: &str = "IORT";
const FIXED_HEADER_LEN: u32 = 52;
const NODE_HEADER_LEN: u32 = 16;
const ID_MAPPING_LEN: u32 = 20;

pub fn run(registry: &TableRegistry, out: &mut Vec<Finding>) -> MinorTestResult {
    let Some(blob) = registry.find_by_signature("IORT", 0) else {
        return MinorTestResult::Skip;
    };
    let ctx = CheckCtx::new(TEST_NAME, TABLE);

    let header = match validate_common_header(&ctx, out, blob) {
        Ok(h) => h,
        Err(_) => return MinorTestResult::Abort,
    };
    let _ = header;

    if blob.declared_len() < FIXED_HEADER_LEN as usize {
        out.push(
            Finding::new(TEST_NAME, "IORTTooShort", Severity::High, FindingKind::Fail, "IORT table too short for its fixed header")
                .with_table(TABLE),
        );
        return MinorTestResult::Abort;
    }

    let cur = blob.cursor();
    let Ok(node_count) = cur.peek_u32(36) else { return MinorTestResult::Abort };
    let Ok(node_array_offset) = cur.peek_u32(40) else { return MinorTestResult::Abort };
    let Ok(reserved) = cur.peek_u64(44) else { return MinorTestResult::Abort };
    checks::reserved_zero(&ctx, out, "Reserved", 44, reserved);

    walk_nodes(&ctx, out, blob, node_count, node_array_offset)
}

fn walk_nodes(ctx: &CheckCtx, out: &mut Vec<Finding>, blob: &Blob, node_count: u32, node_array_offset: u32) -> MinorTestResult {
    let cur = blob.cursor();
    let table_len = blob.declared_len() as u32;
    let mut offset = node_array_offset;

    for i in 0..node_count {
        if offset + NODE_HEADER_LEN > table_len {
            out.push(
                Finding::new(
                    ctx.test_name,
                    "IORTTooShort",
                    Severity::High,
                    FindingKind::Fail,
                    format!("IORT node {i} header falls outside the IORT table"),
                )
                .with_table(ctx.table)
                .with_offset(offset),
            );
            return MinorTestResult::Abort;
        }
        let base = offset as usize;
        let Ok(node_type) = cur.peek_u8(base) else { break };
        let Ok(node_length) = cur.peek_u16(base + 1) else { break };
        let Ok(revision) = cur.peek_u8(base + 3) else { break };
        let Ok(id_mappings_count) = cur.peek_u32(base + 8) else { break };
        let Ok(id_array_offset) = cur.peek_u32(base + 12) else { break };

        if !checks::structure_length_nonzero(ctx, out, offset, node_length as u32) {
            return MinorTestResult::Abort;
        }
        if offset + node_length as u32 > table_len {
            out.push(
                Finding::new(
                    ctx.test_name,
                    "IORTTooShort",
                    Severity::High,
                    FindingKind::Fail,
                    format!("IORT node {i} end falls outside the IORT table"),
                )
                .with_table(ctx.table)
                .with_offset(offset),
            );
            return MinorTestResult::Abort;
        }

        let revision_ceiling = match node_type {
            1 | 2 | 4 => 4,
            3 | 6 => 3,
            5 => 2,
            _ => 1,
        };
        if revision > revision_ceiling {
            out.push(
                Finding::new(
                    ctx.test_name,
                    "IORTNodeRevisionInvalid",
                    Severity::Low,
                    FindingKind::Fail,
                    format!("IORT Node Revision field is {revision:#04x} and should be at most {revision_ceiling}"),
                )
                .with_table(ctx.table)
                .with_offset(offset + 3)
                .with_field("Revision"),
            );
        }

        let no_id_mappings = node_type == 0;
        if no_id_mappings && id_mappings_count != 0 {
            out.push(
                Finding::new(
                    ctx.test_name,
                    "IORTNodeMappingsCountNonZero",
                    Severity::Low,
                    FindingKind::Fail,
                    format!("IORT Node Number of ID Mappings field is {id_mappings_count:#010x} and should be zero for this node type"),
                )
                .with_table(ctx.table)
                .with_offset(offset + 8),
            );
        }
        if no_id_mappings && id_array_offset != 0 {
            out.push(
                Finding::new(
                    ctx.test_name,
                    "IORTNodeRefToIdArrayNonZero",
                    Severity::Low,
                    FindingKind::Fail,
                    format!("IORT Node Referenced to ID Array field is {id_array_offset:#010x} and should be zero for this node type"),
                )
                .with_table(ctx.table)
                .with_offset(offset + 12),
            );
        }

        match node_type {
            0 => check_its_group(ctx, out, &cur, offset, node_length as u32),
            1 => check_named_component(ctx, out, &cur, offset, node_length as u32),
            2 => check_pci_root_complex(ctx, out, &cur, offset),
            3 | 4 | 5 => out.push(
                Finding::new(
                    ctx.test_name,
                    "Info",
                    Severity::None,
                    FindingKind::Info,
                    format!("IORT node type {node_type} is documented but not yet given a bespoke walker beyond its header and ID mappings"),
                )
                .with_table(ctx.table)
                .with_offset(offset),
            ),
            other => {
                out.push(
                    Finding::new(
                        ctx.test_name,
                        "IORTInvalidType",
                        Severity::High,
                        FindingKind::Fail,
                        format!("IORT Type {other:#04x} is invalid, aborting check"),
                    )
                    .with_table(ctx.table)
                    .with_offset(offset),
                );
                return MinorTestResult::Error;
            }
        }

        if !no_id_mappings && id_mappings_count > 0 {
            check_id_mappings(ctx, out, &cur, offset, offset + node_length as u32, id_array_offset, id_mappings_count);
        }

        offset += node_length as u32;
    }

    out.push(Finding::pass(ctx.test_name, "IORT node array walk completed without exceeding the table bounds").with_table(ctx.table));
    MinorTestResult::Ok
}

fn check_id_mappings(
    ctx: &CheckCtx,
    out: &mut Vec<Finding>,
    cur: &crate::cursor::Cursor<'_>,
    node_offset: u32,
    node_end: u32,
    id_array_offset: u32,
    count: u32,
) {
    let array_start = node_offset + id_array_offset;
    for i in 0..count {
        let entry_offset = array_start + i * ID_MAPPING_LEN;
        if entry_offset + ID_MAPPING_LEN > node_end {
            out.push(
                Finding::new(
                    ctx.test_name,
                    "IORTIdMappingOutsideTable",
                    Severity::High,
                    FindingKind::Fail,
                    format!(
                        "IORT ID Mapping {i} is outside the IORT ACPI table. Either the offset is incorrect or the IORT table size or the node is too small"
                    ),
                )
                .with_table(ctx.table)
                .with_offset(entry_offset),
            );
            return;
        }
        if let Ok(flags) = cur.peek_u32(entry_offset as usize + 16) {
            checks::reserved_bits(ctx, out, "IdMappingFlags", entry_offset + 16, flags as u64, 1..=31);
        }
    }
}

fn check_its_group(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32, node_length: u32) {
    let base = offset as usize;
    let Ok(its_count) = cur.peek_u32(base + 16) else { return };
    let array_end = 20u32 + its_count * 4;
    if array_end > node_length {
        out.push(
            Finding::new(
                ctx.test_name,
                "IORTItsIdArrayOutsideTable",
                Severity::High,
                FindingKind::Fail,
                "IORT ITS Identifier Array end is outside the IORT ACPI table. Either the Number of ID mappings is too large or the IORT table size or ITS Group Node is too small",
            )
            .with_table(ctx.table)
            .with_offset(offset),
        );
    }
}

fn check_memory_access_properties(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32, name: &str) {
    let base = offset as usize;
    let Ok(cache_coherent) = cur.peek_u8(base) else { return };
    let Ok(allocation_hints) = cur.peek_u8(base + 1) else { return };
    let Ok(reserved) = cur.peek_u8(base + 2) else { return };
    let Ok(memory_access_flags) = cur.peek_u8(base + 3) else { return };

    checks::ranges(ctx, out, &format!("{name} CacheCoherent"), offset, cache_coherent as i64, &[(0, 1)]);
    checks::reserved_bits(ctx, out, &format!("{name} AllocationHints"), offset + 1, allocation_hints as u64, 4..=7);
    checks::reserved_zero(ctx, out, &format!("{name} Reserved"), offset + 2, reserved as u64);
    checks::reserved_bits(ctx, out, &format!("{name} MemoryAccessFlags"), offset + 3, memory_access_flags as u64, 2..=7);

    let cca = cache_coherent & 1;
    let cpm = memory_access_flags & 1;
    let dacs = (memory_access_flags >> 1) & 1;
    if cca == 1 && cpm == 0 {
        out.push(
            Finding::new(ctx.test_name, "IORTMemAttrInvalid", Severity::High, FindingKind::Fail, format!("IORT {name} Memory Attributes are illegal, CCA cannot be 1 if CPM is 0"))
                .with_table(ctx.table)
                .with_offset(offset),
        );
    }
    if cca == 0 && cpm == 1 && dacs == 1 {
        out.push(
            Finding::new(
                ctx.test_name,
                "IORTMemAttrInvalid",
                Severity::High,
                FindingKind::Fail,
                format!("IORT {name} Memory Attributes are illegal, CCA cannot be 0 if CPM and DACS are 1"),
            )
            .with_table(ctx.table)
            .with_offset(offset),
        );
    }
}

fn check_named_component(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32, node_length: u32) {
    let base = offset as usize;
    if let Ok(flags) = cur.peek_u32(base + 16) {
        if flags != 0 {
            out.push(
                Finding::new(
                    ctx.test_name,
                    "IORTNamedComponentNodeFlagsNonZero",
                    Severity::High,
                    FindingKind::Fail,
                    format!("IORT Named Component Node Flags is {flags:#010x} and is reserved and should be zero"),
                )
                .with_table(ctx.table)
                .with_offset(offset + 16),
            );
        }
    }
    check_memory_access_properties(ctx, out, cur, offset + 20, "Named Component Node");

    let name_start = base + 25;
    let mut terminated = false;
    let mut p = name_start;
    while (p as u32) < offset + node_length {
        match cur.peek_u8(p) {
            Ok(0) => {
                terminated = true;
                break;
            }
            Ok(_) => p += 1,
            Err(_) => break,
        }
    }
    if !terminated {
        out.push(
            Finding::new(
                ctx.test_name,
                "IORTBadNamedComponentDeviceObjectName",
                Severity::High,
                FindingKind::Fail,
                "IORT Named Component Device Object Name string does not contain a null byte string terminator inside the IORT ACPI table",
            )
            .with_table(ctx.table)
            .with_offset(name_start as u32),
        );
    }
}

fn check_pci_root_complex(ctx: &CheckCtx, out: &mut Vec<Finding>, cur: &crate::cursor::Cursor<'_>, offset: u32) {
    let base = offset as usize;
    check_memory_access_properties(ctx, out, cur, offset + 16, "PCI Root Complex Node");

    if let Ok(ats_attribute) = cur.peek_u32(base + 20) {
        checks::reserved_bits(ctx, out, "ATS Attribute", offset + 20, ats_attribute as u64, 3..=31);
    }
    if let Ok(pasid_cap) = cur.peek_u16(base + 29) {
        checks::reserved_bits(ctx, out, "PASID capabilities", offset + 29, pasid_cap as u64, 5..=15);
    }
    if let Ok(reserved) = cur.peek_u8(base + 31) {
        checks::reserved_zero(ctx, out, "Reserved", offset + 31, reserved as u64);
    }
    if let Ok(flags) = cur.peek_u32(base + 32) {
        if flags > 1 {
            out.push(
                Finding::new(
                    ctx.test_name,
                    "IORTPCIRootComplexNodeFlagsInvalid",
                    Severity::High,
                    FindingKind::Fail,
                    format!("IORT PCI Root Complex Node flag is {flags:#010x} and should be either 0 (not support PASID) or 1 (supports PASID)"),
                )
                .with_table(ctx.table)
                .with_offset(offset + 32),
            );
        }
    }
}
