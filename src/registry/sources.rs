//! Concrete [`super::TableSource`] implementations.
//!
//! Only [`DumpFileSource`] and [`SyntheticSource`] are portable; they are
//! what this crate's own tests and examples exercise. The sysfs and
//! `/dev/mem` acquisition paths named in spec.md §4.C are real external
//! collaborators (per spec.md §1's explicit scope boundary) and are kept
//! thin, Linux-only, and untested against real firmware here — see
//! SPEC_FULL.md §9 Non-goals.

use std::fs;
use std::path::PathBuf;

use crate::error::LoaderError;
use crate::model::Provenance;

use super::{TableHandle, TableSource};

/// Reads a concatenated acpidump-style file: a back-to-back sequence of
/// ACPI tables, each self-describing its own length in the standard 36-byte
/// header (signature at offset 0, little-endian u32 length at offset 4).
/// This is the on-disk format `acpidump -b` produces.
pub struct DumpFileSource {
    records: Vec<(String, Vec<u8>)>,
}

impl DumpFileSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, LoaderError> {
        let bytes = fs::read(path.into())?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LoaderError> {
        let mut records = Vec::new();
        let mut offset = 0usize;
        while offset + 8 <= bytes.len() {
            let signature = String::from_utf8_lossy(&bytes[offset..offset + 4]).to_string();
            let length = u32::from_le_bytes([
                bytes[offset + 4],
                bytes[offset + 5],
                bytes[offset + 6],
                bytes[offset + 7],
            ]) as usize;
            if length < 8 || offset + length > bytes.len() {
                return Err(LoaderError::MalformedDump(format!(
                    "record {signature:?} at offset {offset:#x} declares length {length}, which doesn't fit in the remaining {} bytes",
                    bytes.len() - offset
                )));
            }
            records.push((signature, bytes[offset..offset + length].to_vec()));
            offset += length;
        }
        Ok(Self { records })
    }
}

impl TableSource for DumpFileSource {
    fn list_available_tables(&self) -> Result<Vec<TableHandle>, LoaderError> {
        let mut counts = std::collections::HashMap::<String, u32>::new();
        Ok(self
            .records
            .iter()
            .enumerate()
            .map(|(i, (sig, _))| {
                let instance = *counts
                    .entry(sig.clone())
                    .and_modify(|c| *c += 1)
                    .or_insert(0);
                TableHandle {
                    signature: sig.clone(),
                    instance,
                    opaque: i.to_string(),
                }
            })
            .collect())
    }

    fn read_bytes(&self, handle: &TableHandle) -> Result<Vec<u8>, LoaderError> {
        let idx: usize = handle.opaque.parse().map_err(|_| {
            LoaderError::MalformedDump(format!("bad handle {:?}", handle.opaque))
        })?;
        self.records
            .get(idx)
            .map(|(_, data)| data.clone())
            .ok_or_else(|| LoaderError::MissingEntryPoint {
                signature: handle.signature.clone(),
            })
    }

    fn resolve_physical(&self, _phys: u64, _len: usize) -> Option<Vec<u8>> {
        // A plain dump file has no physical-address side channel; BERT's
        // boot-error-region follow-pointer is unavailable in this source.
        None
    }

    fn provenance(&self) -> Provenance {
        Provenance::FromFile
    }
}

/// A fixed set of placeholder tables, for when a required table is absent
/// from firmware but a test still wants something to walk (spec.md §4.C's
/// "synthesised placeholder for missing-but-required tables").
pub struct SyntheticSource {
    tables: Vec<(String, Vec<u8>)>,
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self { tables: Vec::new() }
    }

    pub fn with_table(mut self, signature: impl Into<String>, data: Vec<u8>) -> Self {
        self.tables.push((signature.into(), data));
        self
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TableSource for SyntheticSource {
    fn list_available_tables(&self) -> Result<Vec<TableHandle>, LoaderError> {
        Ok(self
            .tables
            .iter()
            .enumerate()
            .map(|(i, (sig, _))| TableHandle {
                signature: sig.clone(),
                instance: 0,
                opaque: i.to_string(),
            })
            .collect())
    }

    fn read_bytes(&self, handle: &TableHandle) -> Result<Vec<u8>, LoaderError> {
        let idx: usize = handle.opaque.parse().unwrap_or(usize::MAX);
        self.tables
            .get(idx)
            .map(|(_, data)| data.clone())
            .ok_or_else(|| LoaderError::MissingEntryPoint {
                signature: handle.signature.clone(),
            })
    }

    fn resolve_physical(&self, _phys: u64, _len: usize) -> Option<Vec<u8>> {
        None
    }

    fn provenance(&self) -> Provenance {
        Provenance::FromFixup
    }
}

/// Firmware-backed sources (`/sys/firmware/acpi/tables`,
/// `/sys/firmware/dmi/tables`, `/dev/mem`). Real acquisition is an external
/// collaborator per spec.md §1; this module only provides the sysfs
/// directory reader, since that's the common, permission-safe path, and
/// wires it to the same [`TableSource`] trait the portable sources use.
#[cfg(target_os = "linux")]
pub mod linux {
    use super::*;
    use std::path::Path;

    /// Reads tables from `/sys/firmware/acpi/tables/{NAME}` and its
    /// `dynamic/{NAME}N` siblings for repeated tables such as SSDT.
    ///
    /// BERT's boot error region lives outside any sysfs table node, at a
    /// physical address named inside the BERT table itself, so this source
    /// also holds a path to a `/dev/mem`-shaped device for
    /// [`TableSource::resolve_physical`] — real acquisition of that region
    /// is still an external collaborator (spec.md §1), but the seek-and-read
    /// itself is ordinary and this source performs it directly rather than
    /// leaving the call unimplemented.
    pub struct SysfsAcpiSource {
        root: PathBuf,
        mem_path: PathBuf,
    }

    impl SysfsAcpiSource {
        pub fn new() -> Self {
            Self {
                root: PathBuf::from("/sys/firmware/acpi/tables"),
                mem_path: PathBuf::from(DEV_MEM),
            }
        }

        pub fn with_root(root: impl Into<PathBuf>) -> Self {
            Self {
                root: root.into(),
                mem_path: PathBuf::from(DEV_MEM),
            }
        }

        /// Overrides the physical-memory device path, for tests that stand
        /// in a plain file in place of `/dev/mem`.
        pub fn with_mem_path(mut self, mem_path: impl Into<PathBuf>) -> Self {
            self.mem_path = mem_path.into();
            self
        }

        fn entries(&self) -> Vec<(String, PathBuf)> {
            let mut out = Vec::new();
            if let Ok(read_dir) = fs::read_dir(&self.root) {
                for entry in read_dir.flatten() {
                    let path = entry.path();
                    if path.is_file() {
                        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                            out.push((name.to_string(), path));
                        }
                    }
                }
            }
            let dynamic = self.root.join("dynamic");
            if let Ok(read_dir) = fs::read_dir(&dynamic) {
                for entry in read_dir.flatten() {
                    let path = entry.path();
                    if path.is_file() {
                        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                            out.push((name.to_string(), path));
                        }
                    }
                }
            }
            out
        }
    }

    impl Default for SysfsAcpiSource {
        fn default() -> Self {
            Self::new()
        }
    }

    /// Where `/dev/mem` is mounted. A real field install always has this at
    /// the fixed path; tests override it with [`SysfsAcpiSource::with_root`]
    /// plus a stand-in file so they never touch actual physical memory.
    const DEV_MEM: &str = "/dev/mem";

    impl TableSource for SysfsAcpiSource {
        fn list_available_tables(&self) -> Result<Vec<TableHandle>, LoaderError> {
            let mut counts = std::collections::HashMap::<String, u32>::new();
            Ok(self
                .entries()
                .into_iter()
                .map(|(name, path)| {
                    // Dynamic entries are named e.g. "SSDT1"; strip trailing
                    // digits to recover the 4-character signature.
                    let sig: String = name.chars().take_while(|c| !c.is_ascii_digit()).collect();
                    let sig = if sig.len() >= 4 { sig[..4].to_string() } else { sig };
                    let instance = *counts.entry(sig.clone()).and_modify(|c| *c += 1).or_insert(0);
                    TableHandle {
                        signature: sig,
                        instance,
                        opaque: path.to_string_lossy().to_string(),
                    }
                })
                .collect())
        }

        fn read_bytes(&self, handle: &TableHandle) -> Result<Vec<u8>, LoaderError> {
            Ok(fs::read(Path::new(&handle.opaque))?)
        }

        fn resolve_physical(&self, phys: u64, len: usize) -> Option<Vec<u8>> {
            use std::io::{Read, Seek, SeekFrom};
            let mut file = fs::File::open(&self.mem_path).ok()?;
            file.seek(SeekFrom::Start(phys)).ok()?;
            let mut buf = vec![0u8; len];
            file.read_exact(&mut buf).ok()?;
            Some(buf)
        }

        fn provenance(&self) -> Provenance {
            Provenance::FromFirmware
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::checksum::compute_checksum_byte;

    fn fake_table(sig: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(sig);
        let len = 8 + payload.len();
        data.extend_from_slice(&(len as u32).to_le_bytes());
        data.extend_from_slice(payload);
        let fixup = compute_checksum_byte(&data);
        // fixup unused directly by the source reader; included to mirror a
        // realistic dump, not required for the parsing logic under test.
        let _ = fixup;
        data
    }

    #[test]
    fn dump_file_splits_concatenated_tables_by_declared_length() {
        let mut bytes = Vec::new();
        bytes.extend(fake_table(b"FACP", &[0u8; 4]));
        bytes.extend(fake_table(b"APIC", &[1u8; 2]));

        let source = DumpFileSource::from_bytes(&bytes).unwrap();
        let handles = source.list_available_tables().unwrap();
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0].signature, "FACP");
        assert_eq!(handles[1].signature, "APIC");

        let facp = source.read_bytes(&handles[0]).unwrap();
        assert_eq!(facp.len(), 12);
    }

    #[test]
    fn dump_file_rejects_truncated_record() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"FACP");
        bytes.extend_from_slice(&100u32.to_le_bytes()); // claims 100 bytes, has none
        assert!(DumpFileSource::from_bytes(&bytes).is_err());
    }

    #[test]
    fn synthetic_source_tags_fixup_provenance() {
        let source = SyntheticSource::new().with_table("FACP", vec![0u8; 8]);
        assert_eq!(source.provenance(), Provenance::FromFixup);
        let handles = source.list_available_tables().unwrap();
        assert_eq!(source.read_bytes(&handles[0]).unwrap().len(), 8);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn sysfs_source_resolves_physical_from_its_mem_path() {
        use super::linux::SysfsAcpiSource;
        use std::io::Write;

        let mut mem_path = std::env::temp_dir();
        mem_path.push(format!("fwts-sysfs-source-test-{}", std::process::id()));
        let mut backing = vec![0xAAu8; 0x1000];
        backing[0x100..0x104].copy_from_slice(&[1, 2, 3, 4]);
        fs::File::create(&mem_path).unwrap().write_all(&backing).unwrap();

        let source = SysfsAcpiSource::with_root("/nonexistent").with_mem_path(&mem_path);
        let region = source.resolve_physical(0x100, 4).unwrap();
        assert_eq!(region, vec![1, 2, 3, 4]);
        assert!(source.resolve_physical(0x2000, 4).is_none());

        let _ = fs::remove_file(&mem_path);
    }
}
