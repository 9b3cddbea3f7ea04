//! Crate-wide error types.
//!
//! Each subsystem gets its own `thiserror` enum so call sites can match on
//! the failure instead of parsing strings. Only `main` collapses everything
//! into `Box<dyn std::error::Error>`.

use thiserror::Error;

/// Errors raised while walking a blob with a [`crate::cursor::Cursor`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    #[error("cursor overrun at offset {offset}: needed {needed} bytes, {available} available")]
    Overrun {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("string at offset {offset} has no terminator within {max} bytes")]
    UnterminatedString { offset: usize, max: usize },
}

/// Errors raised while a table source produces or locates firmware blobs.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("I/O error reading table source: {0}")]
    Io(#[from] std::io::Error),

    #[error("table {signature} has no entry point in this source")]
    MissingEntryPoint { signature: String },

    #[error("dump file is truncated or malformed: {0}")]
    MalformedDump(String),

    #[error("no RSDP found in the BIOS search area")]
    NoRsdp,

    #[error("no SMBIOS entry point anchor found")]
    NoSmbiosEntryPoint,
}

/// Walk-control signal a parser can raise mid-walk.
///
/// This is distinct from [`CursorError`]: a `ParseAbort` is a decision by a
/// parser to stop walking a sub-structure array (e.g. a declared-zero
/// length), not necessarily an out-of-bounds read. The harness converts any
/// `ParseAbort` into an `Abort` result for the current minor test, per the
/// propagation policy: validators emit findings and only walk-control
/// conditions short-circuit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseAbort {
    #[error("cursor overrun in {table}: {source}")]
    Overrun {
        table: String,
        #[source]
        source: CursorError,
    },

    #[error("zero-length sub-structure at offset {offset} in {table}")]
    ZeroLength { table: String, offset: usize },
}

impl From<CursorError> for ParseAbort {
    fn from(source: CursorError) -> Self {
        // Table name is filled in by the caller via `ParseAbort::overrun_in`;
        // this conversion is only used where the table name isn't available
        // at the `?` site (tested helpers), so it's best-effort.
        ParseAbort::Overrun {
            table: String::new(),
            source,
        }
    }
}

impl ParseAbort {
    pub fn overrun_in(table: &str, source: CursorError) -> Self {
        ParseAbort::Overrun {
            table: table.to_string(),
            source,
        }
    }
}

/// Errors surfaced by the CLI layer itself (argument validation).
#[derive(Error, Debug)]
pub enum CliError {
    #[error("unknown severity level {0:?}, expected one of critical, high, medium, low, none")]
    UnknownSeverity(String),

    #[error("unknown output format {0:?}, expected one of plain, json")]
    UnknownFormat(String),
}
