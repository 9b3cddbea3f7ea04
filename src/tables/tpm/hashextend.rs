//! PCR extend helper, grounded in `fwts_tpm_extend_pcr`
//! (`original_source/src/lib/src/fwts_tpm.c`): `new_pcr = Hash(old_pcr ||
//! data)`. The original only implements this for SHA256/384/512 (SHA1 falls
//! through its `switch` to the `default: return false` arm), so this port
//! preserves that same restriction rather than adding SHA1 support.
//!
//! Not wired into any validation path in this crate — `tpmevlog` only
//! checks structure and field validity, it never replays the measured boot
//! chain. Kept as a documented, independently testable building block for a
//! future PCR-replay test.

use sha2::{Digest, Sha256, Sha384, Sha512};

use super::hash_size;

/// TPM2_ALG_SHA256/384/512, the three algorithms `fwts_tpm_extend_pcr`
/// supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendAlg {
    Sha256,
    Sha384,
    Sha512,
}

impl ExtendAlg {
    fn alg_id(self) -> u16 {
        match self {
            ExtendAlg::Sha256 => 0x000B,
            ExtendAlg::Sha384 => 0x000C,
            ExtendAlg::Sha512 => 0x000D,
        }
    }
}

/// Extends `pcr` in place with `data`. Returns `false` (leaving `pcr`
/// untouched) if `pcr` is shorter than the algorithm's hash size, mirroring
/// the original's `hash_len > pcr_len` bounds check.
pub fn extend_pcr(pcr: &mut [u8], alg: ExtendAlg, data: &[u8]) -> bool {
    let len = hash_size(alg.alg_id()) as usize;
    if len > pcr.len() {
        return false;
    }

    let digest: Vec<u8> = match alg {
        ExtendAlg::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(&pcr[..len]);
            hasher.update(data);
            hasher.finalize().to_vec()
        }
        ExtendAlg::Sha384 => {
            let mut hasher = Sha384::new();
            hasher.update(&pcr[..len]);
            hasher.update(data);
            hasher.finalize().to_vec()
        }
        ExtendAlg::Sha512 => {
            let mut hasher = Sha512::new();
            hasher.update(&pcr[..len]);
            hasher.update(data);
            hasher.finalize().to_vec()
        }
    };

    pcr[..len].copy_from_slice(&digest[..len]);
    true
}
