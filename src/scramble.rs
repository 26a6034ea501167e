//! Scrambling of secret partitions.
//!
//! Secret partitions are stored ciphertext-at-rest, one 64-bit fuse word at a
//! time, under a key selected by the partition descriptor. The engine is
//! deterministic and stateless: the same `(key, word)` pair always produces
//! the same result, so words can be programmed and read back independently.
//! Non-secret partitions never pass through this module.
//!
//! # Security
//! - Keys live in expanded schedules that are zeroized on drop.
//! - The cipher is ARX-only; see `core::speck64`.

use crate::core::speck64::{Speck64, BLOCK_LEN, KEY_LEN};
use crate::layout::KeySel;

/// Built-in scrambling keys, one per `KeySel`, in selector order.
///
/// Stand-ins for the per-device netlist constants; production integrations
/// construct the engine with the real values via `ScramblingEngine::new`.
pub const BUILTIN_KEYS: [[u8; KEY_LEN]; 3] = [
    [
        0x9d, 0x3b, 0x81, 0x6f, 0x52, 0xc7, 0x0e, 0xa4,
        0x1b, 0xe8, 0x47, 0x30, 0xd6, 0x29, 0xfa, 0x15,
    ],
    [
        0x4c, 0xa0, 0xf5, 0x2e, 0x8b, 0x17, 0xd9, 0x63,
        0x70, 0x0c, 0xbe, 0x55, 0x21, 0x9e, 0x48, 0xd2,
    ],
    [
        0xe1, 0x76, 0x08, 0xcd, 0x3a, 0x94, 0x6b, 0xf0,
        0x5f, 0xb3, 0x2c, 0x87, 0x19, 0xe4, 0x40, 0xaa,
    ],
];

/// Per-key-selector block scrambler.
pub struct ScramblingEngine {
    ciphers: [Speck64; 3],
}

impl ScramblingEngine {
    /// Build an engine from explicit 128-bit keys, in `KeySel` order.
    pub fn new(keys: &[[u8; KEY_LEN]; 3]) -> Self {
        ScramblingEngine {
            ciphers: [
                Speck64::new(&keys[0]),
                Speck64::new(&keys[1]),
                Speck64::new(&keys[2]),
            ],
        }
    }

    #[inline(always)]
    fn cipher(&self, key_sel: KeySel) -> &Speck64 {
        match key_sel {
            KeySel::Secret0Key => &self.ciphers[0],
            KeySel::Secret1Key => &self.ciphers[1],
            KeySel::Secret2Key => &self.ciphers[2],
        }
    }

    /// Scramble one 64-bit word.
    #[inline(always)]
    pub fn encrypt_block(&self, key_sel: KeySel, word: u64) -> u64 {
        self.cipher(key_sel).encrypt_block(word)
    }

    /// Descramble one 64-bit word.
    #[inline(always)]
    pub fn decrypt_block(&self, key_sel: KeySel, word: u64) -> u64 {
        self.cipher(key_sel).decrypt_block(word)
    }

    /// Scramble a word-aligned buffer in place, little-endian words.
    /// `data.len()` must be a multiple of the block width; the access layer
    /// enforces this before calling.
    pub fn encrypt_in_place(&self, key_sel: KeySel, data: &mut [u8]) {
        assert_eq!(data.len() % BLOCK_LEN, 0, "unaligned scramble buffer");
        let cipher = self.cipher(key_sel);
        for chunk in data.chunks_exact_mut(BLOCK_LEN) {
            let mut w = [0u8; BLOCK_LEN];
            w.copy_from_slice(chunk);
            let ct = cipher.encrypt_block(u64::from_le_bytes(w));
            chunk.copy_from_slice(&ct.to_le_bytes());
        }
    }

    /// Descramble a word-aligned buffer in place, little-endian words.
    pub fn decrypt_in_place(&self, key_sel: KeySel, data: &mut [u8]) {
        assert_eq!(data.len() % BLOCK_LEN, 0, "unaligned descramble buffer");
        let cipher = self.cipher(key_sel);
        for chunk in data.chunks_exact_mut(BLOCK_LEN) {
            let mut w = [0u8; BLOCK_LEN];
            w.copy_from_slice(chunk);
            let pt = cipher.decrypt_block(u64::from_le_bytes(w));
            chunk.copy_from_slice(&pt.to_le_bytes());
        }
    }
}

impl Default for ScramblingEngine {
    fn default() -> Self {
        Self::new(&BUILTIN_KEYS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_roundtrip_all_keys() {
        let engine = ScramblingEngine::default();
        for sel in [KeySel::Secret0Key, KeySel::Secret1Key, KeySel::Secret2Key] {
            let pt = 0x1122_3344_5566_7788u64;
            let ct = engine.encrypt_block(sel, pt);
            assert_ne!(ct, pt);
            assert_eq!(engine.decrypt_block(sel, ct), pt);
        }
    }

    #[test]
    fn test_key_selectors_differ() {
        let engine = ScramblingEngine::default();
        let word = 0xa5a5_a5a5_a5a5_a5a5u64;
        let c0 = engine.encrypt_block(KeySel::Secret0Key, word);
        let c1 = engine.encrypt_block(KeySel::Secret1Key, word);
        let c2 = engine.encrypt_block(KeySel::Secret2Key, word);
        assert_ne!(c0, c1);
        assert_ne!(c1, c2);
        assert_ne!(c0, c2);
    }

    #[test]
    fn test_in_place_roundtrip() {
        let engine = ScramblingEngine::default();
        let original: [u8; 32] = core::array::from_fn(|i| i as u8);
        let mut buf = original;
        engine.encrypt_in_place(KeySel::Secret1Key, &mut buf);
        assert_ne!(buf, original);
        engine.decrypt_in_place(KeySel::Secret1Key, &mut buf);
        assert_eq!(buf, original);
    }

    #[test]
    #[should_panic(expected = "unaligned")]
    fn test_unaligned_buffer_rejected() {
        let engine = ScramblingEngine::default();
        let mut buf = [0u8; 7];
        engine.encrypt_in_place(KeySel::Secret0Key, &mut buf);
    }
}
