#![forbid(unsafe_code)]
// SPECK-64/128 block permutation for fuse-word scrambling and digesting.
// - ARX only (add, rotate, xor): fixed iteration count, no data-dependent
//   branches, no table lookups, avoiding cache-based side channels.
// - 64-bit block matching the fuse macro word granularity; 128-bit key.
// - No unsafe; round keys are zeroized when a schedule is dropped.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Block width in bytes (the storage medium's natural word granularity).
pub const BLOCK_LEN: usize = 8;
/// Key width in bytes.
pub const KEY_LEN: usize = 16;

const ROUNDS: usize = 27;

#[inline(always)]
fn round_enc(x: &mut u32, y: &mut u32, k: u32) {
    *x = x.rotate_right(8).wrapping_add(*y) ^ k;
    *y = y.rotate_left(3) ^ *x;
}

#[inline(always)]
fn round_dec(x: &mut u32, y: &mut u32, k: u32) {
    *y = (*y ^ *x).rotate_right(3);
    *x = (*x ^ k).wrapping_sub(*y).rotate_left(8);
}

/// An expanded SPECK-64/128 key schedule.
///
/// The schedule is immutable once expanded; encryption and decryption are
/// pure functions of `(schedule, block)`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Speck64 {
    rk: [u32; ROUNDS],
}

impl Speck64 {
    /// Expand a 128-bit key given as four little-endian 32-bit words.
    pub fn from_words(key: [u32; 4]) -> Self {
        let mut k = key[0];
        let mut l = [key[1], key[2], key[3]];
        let mut rk = [0u32; ROUNDS];
        for i in 0..ROUNDS {
            rk[i] = k;
            let li = l[i % 3];
            let nl = k.wrapping_add(li.rotate_right(8)) ^ (i as u32);
            k = k.rotate_left(3) ^ nl;
            l[i % 3] = nl;
        }
        Speck64 { rk }
    }

    /// Expand a 128-bit key given as 16 little-endian bytes.
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        let mut words = [0u32; 4];
        for (i, w) in words.iter_mut().enumerate() {
            let mut b = [0u8; 4];
            b.copy_from_slice(&key[i * 4..i * 4 + 4]);
            *w = u32::from_le_bytes(b);
        }
        Self::from_words(words)
    }

    /// Encrypt one 64-bit block. High word is `x`, low word is `y`.
    #[inline(always)]
    pub fn encrypt_block(&self, block: u64) -> u64 {
        let mut x = (block >> 32) as u32;
        let mut y = block as u32;
        for &k in self.rk.iter() {
            round_enc(&mut x, &mut y, k);
        }
        ((x as u64) << 32) | (y as u64)
    }

    /// Decrypt one 64-bit block; exact inverse of `encrypt_block`.
    #[inline(always)]
    pub fn decrypt_block(&self, block: u64) -> u64 {
        let mut x = (block >> 32) as u32;
        let mut y = block as u32;
        for &k in self.rk.iter().rev() {
            round_dec(&mut x, &mut y, k);
        }
        ((x as u64) << 32) | (y as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let key = [0x03020100u32, 0x0b0a0908, 0x13121110, 0x1b1a1918];
        let cipher = Speck64::from_words(key);
        for block in [0u64, 1, 0xdead_beef_cafe_f00d, u64::MAX] {
            let ct = cipher.encrypt_block(block);
            assert_ne!(ct, block);
            assert_eq!(cipher.decrypt_block(ct), block);
        }
    }

    #[test]
    fn test_deterministic() {
        let cipher = Speck64::new(&[0x5a; KEY_LEN]);
        let a = cipher.encrypt_block(0x0123_4567_89ab_cdef);
        let b = cipher.encrypt_block(0x0123_4567_89ab_cdef);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_separation() {
        let c1 = Speck64::new(&[0x11; KEY_LEN]);
        let c2 = Speck64::new(&[0x22; KEY_LEN]);
        let block = 0x0f0f_0f0f_0f0f_0f0f;
        assert_ne!(c1.encrypt_block(block), c2.encrypt_block(block));
    }

    #[test]
    fn test_single_bit_diffusion() {
        let cipher = Speck64::new(&[0x77; KEY_LEN]);
        let a = cipher.encrypt_block(0);
        let b = cipher.encrypt_block(1);
        // A one-bit plaintext change must flip a substantial number of
        // ciphertext bits.
        assert!((a ^ b).count_ones() >= 16);
    }
}
