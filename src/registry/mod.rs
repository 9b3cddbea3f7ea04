//! Table registry & loader (spec.md §4.C, §6 "loader source interface").
//!
//! The registry maps a table signature (plus instance, for repeated tables
//! like SSDT) to a loaded [`Blob`]. Loading itself is delegated to a
//! [`TableSource`] implementation; the registry only owns the resulting
//! bytes and indexes them.

pub mod sources;

pub use sources::{DumpFileSource, SyntheticSource};

use std::collections::HashMap;

use crate::error::LoaderError;
use crate::model::{Blob, Provenance};

/// One table a source can produce: its signature, instance index (0 for
/// tables that only ever appear once), and an opaque handle the source
/// itself understands how to turn into bytes.
#[derive(Debug, Clone)]
pub struct TableHandle {
    pub signature: String,
    pub instance: u32,
    pub opaque: String,
}

/// The loader source interface of spec.md §6: the core depends on exactly
/// these three pluggable operations and requires nothing else of a host.
pub trait TableSource {
    fn list_available_tables(&self) -> Result<Vec<TableHandle>, LoaderError>;
    fn read_bytes(&self, handle: &TableHandle) -> Result<Vec<u8>, LoaderError>;
    fn resolve_physical(&self, phys: u64, len: usize) -> Option<Vec<u8>>;
    fn provenance(&self) -> Provenance;
}

/// Owns every blob loaded for this run.
#[derive(Debug, Default)]
pub struct TableRegistry {
    blobs: Vec<Blob>,
    by_signature: HashMap<String, Vec<usize>>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every table a source can produce into the registry.
    ///
    /// BERT is the one table whose parser needs to follow a pointer out of
    /// the table into a separately addressed memory region (the ACPI Boot
    /// Error Region — spec.md §6). Rather than have every parser reach back
    /// into the source, the loader resolves that single follow-pointer here,
    /// right after loading, and stores the result as an ordinary blob keyed
    /// by `base_address` so `find_by_address` can hand it back later.
    pub fn load_from(&mut self, source: &dyn TableSource) -> Result<(), LoaderError> {
        for handle in source.list_available_tables()? {
            let bytes = source.read_bytes(&handle)?;
            let blob = Blob::new(handle.signature.clone(), bytes, source.provenance())
                .with_instance(handle.instance);
            self.insert(blob);
        }
        self.resolve_bert_region(source);
        Ok(())
    }

    /// BERT's boot error region follow-pointer (offset 36: region length,
    /// offset 40: physical address). Only attempted for
    /// `Provenance::FromFirmware` blobs, matching bert.rs's own provenance
    /// gate — a BERT loaded from a dump file names a physical address this
    /// process has no right to read.
    fn resolve_bert_region(&mut self, source: &dyn TableSource) {
        let Some(bert) = self.find_by_signature("BERT", 0) else {
            return;
        };
        if bert.provenance != Provenance::FromFirmware {
            return;
        }
        let cur = bert.cursor();
        let (Ok(region_length), Ok(region_address)) = (cur.peek_u32(36), cur.peek_u64(40)) else {
            return;
        };
        let Some(region) = source.resolve_physical(region_address, region_length as usize) else {
            return;
        };
        self.insert(Blob::new("BOOTERRREGION", region, source.provenance()).with_base_address(region_address));
    }

    pub fn insert(&mut self, blob: Blob) {
        let idx = self.blobs.len();
        self.by_signature
            .entry(blob.signature.clone())
            .or_default()
            .push(idx);
        self.blobs.push(blob);
    }

    pub fn find_by_signature(&self, name: &str, instance: u32) -> Option<&Blob> {
        self.by_signature.get(name)?.iter().find_map(|&idx| {
            let blob = &self.blobs[idx];
            (blob.instance_index == instance).then_some(blob)
        })
    }

    /// All instances of a given signature (e.g. every SSDT).
    pub fn find_all_by_signature(&self, name: &str) -> Vec<&Blob> {
        self.by_signature
            .get(name)
            .map(|indices| indices.iter().map(|&i| &self.blobs[i]).collect())
            .unwrap_or_default()
    }

    pub fn iter_all(&self) -> impl Iterator<Item = &Blob> {
        self.blobs.iter()
    }

    pub fn find_by_address(&self, phys: u64) -> Option<&Blob> {
        self.blobs.iter().find(|b| b.base_address == phys)
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_specific_instance_among_repeated_tables() {
        let mut reg = TableRegistry::new();
        reg.insert(Blob::new("SSDT", vec![1, 2, 3], Provenance::FromFile).with_instance(0));
        reg.insert(Blob::new("SSDT", vec![4, 5, 6], Provenance::FromFile).with_instance(1));

        let first = reg.find_by_signature("SSDT", 0).unwrap();
        let second = reg.find_by_signature("SSDT", 1).unwrap();
        assert_eq!(first.data, vec![1, 2, 3]);
        assert_eq!(second.data, vec![4, 5, 6]);
        assert_eq!(reg.find_all_by_signature("SSDT").len(), 2);
    }

    #[test]
    fn missing_table_returns_none_not_error() {
        let reg = TableRegistry::new();
        assert!(reg.find_by_signature("FACP", 0).is_none());
    }

    /// A fixed BERT blob plus a single physical region, for exercising
    /// `load_from`'s boot-error-region resolution without going through a
    /// real `TableSource` implementation.
    struct FakeFirmwareSource {
        bert: Vec<u8>,
        region: Vec<u8>,
        region_address: u64,
    }

    impl TableSource for FakeFirmwareSource {
        fn list_available_tables(&self) -> Result<Vec<TableHandle>, LoaderError> {
            Ok(vec![TableHandle {
                signature: "BERT".to_string(),
                instance: 0,
                opaque: "0".to_string(),
            }])
        }

        fn read_bytes(&self, _handle: &TableHandle) -> Result<Vec<u8>, LoaderError> {
            Ok(self.bert.clone())
        }

        fn resolve_physical(&self, phys: u64, len: usize) -> Option<Vec<u8>> {
            (phys == self.region_address && len == self.region.len()).then(|| self.region.clone())
        }

        fn provenance(&self) -> Provenance {
            Provenance::FromFirmware
        }
    }

    fn bert_header(region_length: u32, region_address: u64) -> Vec<u8> {
        let mut data = vec![0u8; 48];
        data[0..4].copy_from_slice(b"BERT");
        data[4..8].copy_from_slice(&48u32.to_le_bytes());
        data[36..40].copy_from_slice(&region_length.to_le_bytes());
        data[40..48].copy_from_slice(&region_address.to_le_bytes());
        data
    }

    #[test]
    fn load_from_resolves_bert_boot_error_region_by_address() {
        let source = FakeFirmwareSource {
            bert: bert_header(20, 0x7000),
            region: vec![0u8; 20],
            region_address: 0x7000,
        };
        let mut reg = TableRegistry::new();
        reg.load_from(&source).unwrap();

        assert!(reg.find_by_signature("BERT", 0).is_some());
        let region = reg.find_by_address(0x7000).expect("resolved region blob");
        assert_eq!(region.signature, "BOOTERRREGION");
        assert_eq!(region.provenance, Provenance::FromFirmware);
    }

    #[test]
    fn load_from_leaves_region_unresolved_when_source_cannot_map_it() {
        let source = FakeFirmwareSource {
            bert: bert_header(20, 0x7000),
            region: vec![0u8; 20],
            region_address: 0x9000, // source only resolves 0x7000
        };
        let mut reg = TableRegistry::new();
        reg.load_from(&source).unwrap();

        assert!(reg.find_by_address(0x7000).is_none());
    }
}
