//! Cross-cutting leaf helpers (spec.md §4.G): checksum, GUID formatting,
//! hex dump, and enumerated-string lookup.

pub mod checksum;
pub mod guid;
pub mod hexdump;
pub mod stringset;
