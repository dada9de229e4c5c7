//! Authenticated encryption: stream cipher + universal-hash MAC, combined
//! per §4.4.
//!
//! Grounded on the teacher's `aead.rs` (same `encrypt`/`decrypt` shape, one
//! primitive wrapped per function) but using the ChaCha20 + SipHash-2-4
//! primitives from [`crate::primitives`] instead of XChaCha20-Poly1305, and
//! a 64-bit detached tag instead of an appended AEAD tag — the wire format
//! here carries the tag separately (§6).

use crate::keys::Key48;
use crate::primitives::{chacha_apply_keystream, siphash_tag, tags_equal};

/// Encrypt `plaintext` into `out` (same length) using `key`/`iv`, returning
/// the 64-bit authentication tag.
pub fn encrypt(key: &Key48, iv: u64, plaintext: &[u8], out: &mut [u8]) -> u64 {
    debug_assert_eq!(plaintext.len(), out.len());
    out.copy_from_slice(plaintext);
    chacha_apply_keystream(key.cipher_key(), iv, out);
    siphash_tag(key.mac_key(), out, iv)
}

/// Verify `provided_tag` against `ciphertext` in constant time and, only on
/// success, decrypt `ciphertext` in place. Returns `false` (ciphertext left
/// untouched) on tag mismatch.
pub fn decrypt(key: &Key48, iv: u64, ciphertext: &mut [u8], provided_tag: u64) -> bool {
    let expected = siphash_tag(key.mac_key(), ciphertext, iv);
    if !tags_equal(expected, provided_tag) {
        return false;
    }
    chacha_apply_keystream(key.cipher_key(), iv, ciphertext);
    true
}
