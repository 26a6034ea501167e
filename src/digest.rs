//! Partition integrity digests.
//!
//! A partition digest is a 64-bit Davies–Meyer construction over the same
//! block permutation used for scrambling: the data region is absorbed in
//! 128-bit chunks used as round keys (`state' = E_k(state) ^ state`), then a
//! per-set digest constant is folded in as the finalization key.
//!
//! Two modes, selected by the fixed catalog configuration:
//! - **Standard**: the initial state is the digest set's fixed IV.
//! - **Chained**: members of `layout::DIGEST_CHAIN` use the previous member's
//!   digest as the initial state, so tampering with an earlier partition
//!   invalidates every later member's digest even if its own bytes are
//!   untouched. The first chain member uses the fixed IV.
//!
//! Digest computation is a pure function of its inputs. Resolving the chained
//! IV (recomputing predecessors from their current bytes) is the access
//! layer's job; this module never touches storage.

use crate::core::speck64::{Speck64, KEY_LEN};
use crate::layout::{DigestSet, PartitionId};

/// Per-set digest constants, folded in as the finalization key.
/// Indexed by `DigestSet` in declaration order.
pub const DIGEST_CONSTANTS: [[u8; KEY_LEN]; 3] = [
    [
        0x3f, 0xb8, 0x62, 0x0d, 0xc4, 0x91, 0x7a, 0xe5,
        0x58, 0x26, 0xff, 0x03, 0xb1, 0x6c, 0xd8, 0x97,
    ],
    [
        0x84, 0x5e, 0x13, 0xc9, 0x06, 0xeb, 0x72, 0x3d,
        0xaf, 0x61, 0x98, 0x24, 0xdd, 0x0b, 0x56, 0xe0,
    ],
    [
        0x2b, 0xcf, 0x44, 0x9a, 0x71, 0x08, 0xe6, 0x5d,
        0x33, 0xf2, 0x8e, 0x17, 0x65, 0xa9, 0x0c, 0xbb,
    ],
];

/// Per-set digest IVs (initial chaining values).
/// Indexed by `DigestSet` in declaration order.
pub const DIGEST_IVS: [u64; 3] = [
    0x84ee_1f0a_92c4_d35b,
    0x1d9f_62b8_07a5_4ce3,
    0xc6a2_503e_b917_f48d,
];

#[inline(always)]
fn set_index(set: DigestSet) -> usize {
    match set {
        DigestSet::SwCfg => 0,
        DigestSet::HwCfg => 1,
        DigestSet::Secret => 2,
    }
}

/// Fixed IV of a digest set.
#[inline(always)]
pub fn iv_for(set: DigestSet) -> u64 {
    DIGEST_IVS[set_index(set)]
}

#[inline(always)]
fn absorb(state: u64, key: &[u8; KEY_LEN]) -> u64 {
    Speck64::new(key).encrypt_block(state) ^ state
}

/// Digest `data` under `set`, starting from `iv`.
///
/// `data` is zero-padded to a 16-byte boundary; partition data regions have
/// fixed lengths, so padding is unambiguous. Pure and deterministic.
pub fn partition_digest(set: DigestSet, iv: u64, data: &[u8]) -> u64 {
    let mut state = iv;
    let mut chunks = data.chunks_exact(KEY_LEN);
    for chunk in chunks.by_ref() {
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(chunk);
        state = absorb(state, &key);
    }
    let rem = chunks.remainder();
    if !rem.is_empty() {
        let mut key = [0u8; KEY_LEN];
        key[..rem.len()].copy_from_slice(rem);
        state = absorb(state, &key);
    }
    absorb(state, &DIGEST_CONSTANTS[set_index(set)])
}

/// Digest the data region of `id`.
///
/// `chain_iv` carries the predecessor's digest for non-initial members of the
/// digest chain; `None` selects the set's fixed IV. Calling this for a
/// partition with no digest configuration is a caller bug, not a runtime
/// condition.
pub fn compute(id: PartitionId, data: &[u8], chain_iv: Option<u64>) -> u64 {
    let set = id
        .descriptor()
        .digest_set
        .unwrap_or_else(|| panic!("partition {:?} has no digest configuration", id));
    let iv = chain_iv.unwrap_or_else(|| iv_for(set));
    partition_digest(set, iv, data)
}

/// Constant-time digest comparison.
#[inline(always)]
pub fn ct_eq_digest(a: u64, b: u64) -> bool {
    let mut diff = 0u8;
    let (ab, bb) = (a.to_le_bytes(), b.to_le_bytes());
    for i in 0..8 {
        diff |= ab[i] ^ bb[i];
    }
    diff == 0
}
