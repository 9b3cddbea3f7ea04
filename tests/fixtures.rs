//! Synthetic blob builders shared by the integration tests in this
//! directory. Each builder produces a byte-correct, checksum-correct blob
//! by default; callers corrupt specific bytes afterward to drive a
//! particular finding.

#![allow(dead_code)]

use fwts::util::checksum::{checksum, compute_checksum_byte};

/// A common 36-byte ACPI header with a given signature and total table
/// length, checksum left at zero (callers append their own body, then call
/// [`finalize_checksum`]).
pub fn acpi_header(signature: &[u8; 4], total_len: u32) -> Vec<u8> {
    let mut data = vec![0u8; 36];
    data[0..4].copy_from_slice(signature);
    data[4..8].copy_from_slice(&total_len.to_le_bytes());
    data[8] = 2; // revision
    data[10..16].copy_from_slice(b"ACME01");
    data[16..24].copy_from_slice(b"FIXTURE ");
    data
}

/// Recomputes byte 9 (the ACPI checksum byte) so the whole blob sums to
/// zero. Must be called after the body is fully appended.
pub fn finalize_checksum(mut data: Vec<u8>) -> Vec<u8> {
    data[9] = 0;
    let sum = checksum(&data);
    data[9] = compute_checksum_byte(&[sum]);
    data
}

/// A well-formed 31-byte SMBIOS v2 (`_SM_`/`_DMI_`) entry point pointing at
/// `struct_table_address`, declaring `number_of_structures`.
pub fn smbios_entry_point_v2(struct_table_address: u32, number_of_structures: u16) -> Vec<u8> {
    let mut data = vec![0u8; 0x1F];
    data[0..4].copy_from_slice(b"_SM_");
    data[5] = 0x1F;
    data[6] = 2;
    data[7] = 8;
    data[8..10].copy_from_slice(&0xFFFFu16.to_le_bytes());
    data[16..21].copy_from_slice(b"_DMI_");
    data[24..28].copy_from_slice(&struct_table_address.to_le_bytes());
    data[28..30].copy_from_slice(&number_of_structures.to_le_bytes());

    let intermediate_sum = compute_checksum_byte(&data[16..0x1F]);
    data[21] = intermediate_sum;

    let full_sum = compute_checksum_byte(&data[..0x1F]);
    data[4] = full_sum;
    data
}

/// A well-formed 24-byte SMBIOS v3 (`_SM3_`) entry point pointing at
/// `struct_table_address`.
pub fn smbios_entry_point_v3(struct_table_address: u64) -> Vec<u8> {
    let mut data = vec![0u8; 0x18];
    data[0..5].copy_from_slice(b"_SM3_");
    data[6] = 0x18;
    data[7] = 3;
    data[8] = 2;
    data[16..24].copy_from_slice(&struct_table_address.to_le_bytes());
    let sum = compute_checksum_byte(&data);
    data[5] = sum;
    data
}

/// A minimal SMBIOS type-0 (BIOS Information) structure: header + one
/// Vendor string + the double-NUL string-table terminator.
pub fn bios_information_structure() -> Vec<u8> {
    let mut data = vec![0u8; 0x12];
    data[0] = 0; // type 0
    data[1] = 0x12; // length
    data[4] = 1; // Vendor string index
    data.extend_from_slice(b"Acme BIOS Vendor\0");
    data.push(0); // double-NUL terminator
    data
}

/// A type-127 end-of-table marker, the minimum legal structure shape
/// (4-byte header, no strings).
pub fn smbios_end_of_table() -> Vec<u8> {
    vec![127, 4, 0, 0, 0, 0]
}

/// A `PCClientPCREvent` header with `event_data_size` trailing bytes
/// declared (the bytes themselves are not appended; TPM parsers in this
/// crate only look at the leading fixed fields).
pub fn tpm_pc_client_header(event_data_size: u32) -> Vec<u8> {
    let mut v = vec![0u8; 28];
    v.extend_from_slice(&event_data_size.to_le_bytes());
    v
}

/// A TPM 2.0 `EfiSpecIdEvent` body: signature, UINTN size fixed at UINT64,
/// `number_of_alg` entries of `(algorithm_id, digest_size)`, zero vendor
/// info.
pub fn tpm_spec_id_event(number_of_alg: u32, algs: &[(u16, u16)]) -> Vec<u8> {
    let mut v = vec![0u8; 28];
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
