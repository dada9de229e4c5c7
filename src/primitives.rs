//! The raw cryptographic primitives this tunnel is built from.
//!
//! Nothing here implements a protocol; it only wraps three specified-but-
//! external primitives so the rest of the crate can call them the same way
//! regardless of which crate backs each one:
//!
//! - **Stream cipher** — ChaCha20 (the "legacy" 64-bit-nonce / 64-bit-counter
//!   construction from `chacha20`, matching the tunnel's 64-bit IV directly;
//!   no separate counter field is needed).
//! - **Keyed MAC** — SipHash-2-4 (`siphasher`), keyed by a 16-byte MAC key,
//!   with the IV folded in as extra data rather than a true "finalization
//!   parameter" (SipHash has none) — see [`siphash_tag`].
//! - **Key-derivation hash** — BLAKE2b (`blake2`), used both keyed (session
//!   binding) and unkeyed (ratchet steps), with outputs up to 64 bytes.

use blake2::Blake2bVar;
use blake2::digest::{consts::U64, FixedOutput, Mac, Update, VariableOutput};
use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20Legacy;

use crate::error::CalicoError;

/// XOR `buf` in place with `len(buf)` bytes of ChaCha20 keystream for
/// `key`/`iv`. Used both to encrypt/decrypt messages and, with an all-zero
/// IV, to expand the session key into keying material.
pub fn chacha_apply_keystream(key: &[u8; 32], iv: u64, buf: &mut [u8]) {
    let mut cipher = ChaCha20Legacy::new(key.into(), &iv.to_le_bytes().into());
    cipher.apply_keystream(buf);
}

/// Produce `out.len()` bytes of ChaCha20 keystream for `key` with an
/// all-zero IV (the key-schedule "expand" step, §4.1).
pub fn chacha_expand(key: &[u8; 32], out: &mut [u8]) {
    out.fill(0);
    chacha_apply_keystream(key, 0, out);
}

/// SipHash-2-4 MAC over `data`, keyed by `mac_key`, with `iv` mixed in as
/// additional finalization input (written last, after the message bytes).
pub fn siphash_tag(mac_key: &[u8; 16], data: &[u8], iv: u64) -> u64 {
    use siphasher::sip::SipHasher24;
    use std::hash::Hasher;

    let k0 = u64::from_le_bytes(mac_key[0..8].try_into().expect("8 bytes"));
    let k1 = u64::from_le_bytes(mac_key[8..16].try_into().expect("8 bytes"));
    let mut hasher = SipHasher24::new_with_keys(k0, k1);
    hasher.write(data);
    hasher.write(&iv.to_le_bytes());
    hasher.finish()
}

/// `BLAKE2b(message, key = key, outlen = 64)`. `key` longer than BLAKE2b's
/// 64-byte key limit is pre-folded with an unkeyed BLAKE2b-512 hash first —
/// the specification allows a session name of "any length" but BLAKE2b
/// itself does not, so this crate defines that edge case rather than
/// leaving it to panic.
pub fn blake2b_keyed_64(key: &[u8], message: &[u8]) -> Result<[u8; 64], CalicoError> {
    type Blake2bMac512 = blake2::Blake2bMac<U64>;

    let folded;
    let key = if key.len() > 64 {
        folded = blake2b_unkeyed(key, 64)?;
        folded.as_slice()
    } else {
        key
    };

    let mut mac = Blake2bMac512::new_from_slice(key)
        .map_err(|e| CalicoError::Internal(format!("blake2b keyed init: {e}")))?;
    mac.update(message);
    let out = mac.finalize_fixed();
    Ok(out.into())
}

/// Unkeyed `BLAKE2b(message, outlen)`, `outlen` up to 64.
pub fn blake2b_unkeyed(message: &[u8], outlen: usize) -> Result<Vec<u8>, CalicoError> {
    let mut hasher = Blake2bVar::new(outlen)
        .map_err(|e| CalicoError::Internal(format!("blake2b init: {e}")))?;
    hasher.update(message);
    let mut out = vec![0u8; outlen];
    hasher
        .finalize_variable(&mut out)
        .map_err(|e| CalicoError::Internal(format!("blake2b finalize: {e}")))?;
    Ok(out)
}

/// Constant-time comparison of two 64-bit MAC tags. Computes the XOR delta
/// and folds it to a single nonzero witness; branches only on the witness,
/// never on individual bytes.
pub fn tags_equal(expected: u64, provided: u64) -> bool {
    let delta = expected ^ provided;
    let witness = ((delta >> 32) as u32) | (delta as u32);
    witness == 0
}
