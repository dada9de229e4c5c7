//! Key schedule: derivation, role-split, and the per-direction ratchet.
//!
//! Grounded on the teacher's `kdf.rs` (HKDF root/chain derivation shape) and
//! `ratchet.rs` (key material zeroized on drop, ratchet steps that overwrite
//! state in place) — but the derivation itself follows §4.1 of the
//! specification: a single BLAKE2b call keyed by the session name, expanded
//! with a block of ChaCha20 keystream, not HKDF.

use tracing::trace;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CalicoError;
use crate::primitives::{blake2b_keyed_64, blake2b_unkeyed, chacha_expand};

/// One 48-byte encryption+MAC key: 32 bytes cipher key ∥ 16 bytes MAC key.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Key48([u8; 48]);

impl Key48 {
    pub fn from_bytes(bytes: [u8; 48]) -> Self {
        Self(bytes)
    }

    pub fn cipher_key(&self) -> &[u8; 32] {
        self.0[0..32].try_into().expect("32 bytes")
    }

    pub fn mac_key(&self) -> &[u8; 16] {
        self.0[32..48].try_into().expect("16 bytes")
    }

    /// Ratchet this key forward in place: `K ← BLAKE2b(K, outlen=48)`. The
    /// old bytes are overwritten, not just logically replaced — there is no
    /// point in time where both old and new key are simultaneously held in
    /// two different buffers.
    pub fn ratchet_in_place(&mut self) -> Result<(), CalicoError> {
        let next = Zeroizing::new(blake2b_unkeyed(&self.0, 48)?);
        self.0.copy_from_slice(&next);
        Ok(())
    }

    /// `BLAKE2b(self, outlen=48)` without mutating `self` — used to derive
    /// the initial "next inbound key" from the initial inbound key.
    pub fn derive_next(&self) -> Result<Self, CalicoError> {
        let next = Zeroizing::new(blake2b_unkeyed(&self.0, 48)?);
        let mut out = [0u8; 48];
        out.copy_from_slice(&next);
        Ok(Self(out))
    }
}

/// One logical channel's worth of keying state (stream or datagram).
///
/// Invariant: at any instant `in_keys[active_in]` is the current inbound
/// key and `in_keys[active_in ^ 1]` is its already-derived successor; the
/// ratchet finalize step replaces the *older* slot in place.
pub struct KeyPair {
    pub out: Key48,
    pub in_keys: [Key48; 2],
    pub active_in: u8,
    pub active_out: u8,
    /// Set when a peer ratchet signal was first observed; cleared on
    /// finalize. `None` means no ratchet is in flight.
    pub in_ratchet_time: Option<u64>,
    pub out_ratchet_time: u64,
}

impl KeyPair {
    fn new(out: Key48, in0: Key48, now_ms: u64) -> Result<Self, CalicoError> {
        let in1 = in0.derive_next()?;
        Ok(Self {
            out,
            in_keys: [in0, in1],
            active_in: 0,
            active_out: 0,
            in_ratchet_time: None,
            out_ratchet_time: now_ms,
        })
    }

    pub fn active_in_key(&self) -> &Key48 {
        &self.in_keys[self.active_in as usize]
    }

    pub fn in_key(&self, bit: u8) -> &Key48 {
        &self.in_keys[(bit & 1) as usize]
    }

    /// §4.1 "Ratchet outbound": replace `out` with `H(out)`, flip the
    /// expected-active bit the peer will see, and stamp the ratchet clock.
    pub fn ratchet_out(&mut self, now_ms: u64) -> Result<(), CalicoError> {
        self.out.ratchet_in_place()?;
        self.active_out ^= 1;
        self.out_ratchet_time = now_ms;
        trace!(active_out = self.active_out, "ratcheted outbound key");
        Ok(())
    }

    /// §4.1 "Finalize inbound ratchet": replace the *inactive* slot with
    /// `H(inactive)`, then swap which slot is active. The oldest live key
    /// is what gets overwritten, so it is gone the instant this returns.
    pub fn finalize_in_ratchet(&mut self) -> Result<(), CalicoError> {
        let inactive = (self.active_in ^ 1) as usize;
        let active = self.active_in as usize;
        let next = self.in_keys[inactive].derive_next()?;
        self.in_keys[active] = next;
        self.active_in ^= 1;
        self.in_ratchet_time = None;
        trace!(active_in = self.active_in, "finalized inbound ratchet");
        Ok(())
    }
}

/// Output of §4.1's "Expand" + "Split by role" steps: the four (or two, in
/// stream-only mode) 48-byte keys laid out for one specific role.
pub struct SplitKeys {
    pub stream_out: Key48,
    pub stream_in0: Key48,
    pub dgram_out: Option<Key48>,
    pub dgram_in0: Option<Key48>,
}

/// §4.1 full key schedule: derive from session, expand, split by role.
///
/// `datagram` selects whether 192 bytes (stream + datagram) or 96 bytes
/// (stream only) of keying material are produced.
pub fn derive_and_split(
    secret: &[u8; 32],
    session_name: &[u8],
    initiator: bool,
    datagram: bool,
) -> Result<SplitKeys, CalicoError> {
    // Kd = BLAKE2b(K, key=S, outlen=64); K is the message, S is the key.
    let mut kd = blake2b_keyed_64(session_name, secret)?;

    // Expand Kd[0..32] with one block of ChaCha20 keystream (zero IV).
    let total = if datagram { 192 } else { 96 };
    let mut expanded = vec![0u8; total];
    let mut seed: [u8; 32] = kd[0..32].try_into().expect("32 bytes");
    chacha_expand(&seed, &mut expanded);
    kd.zeroize();
    seed.zeroize();

    // Layout: left half ∥ right half, each half holding (stream, [datagram]).
    let half = total / 2;
    let (left, right) = expanded.split_at(half);

    let (local, remote) = if initiator { (left, right) } else { (right, left) };

    let mut local_stream = [0u8; 48];
    local_stream.copy_from_slice(&local[0..48]);
    let mut remote_stream = [0u8; 48];
    remote_stream.copy_from_slice(&remote[0..48]);

    let (dgram_out, dgram_in0) = if datagram {
        let mut local_dgram = [0u8; 48];
        local_dgram.copy_from_slice(&local[48..96]);
        let mut remote_dgram = [0u8; 48];
        remote_dgram.copy_from_slice(&remote[48..96]);
        (
            Some(Key48::from_bytes(local_dgram)),
            Some(Key48::from_bytes(remote_dgram)),
        )
    } else {
        (None, None)
    };

    expanded.zeroize();

    Ok(SplitKeys {
        stream_out: Key48::from_bytes(local_stream),
        stream_in0: Key48::from_bytes(remote_stream),
        dgram_out,
        dgram_in0,
    })
}

/// Build a fresh [`KeyPair`] from an outbound key and the initial inbound
/// key, immediately deriving the inbound successor (§4.1 "Next inbound
/// key").
pub fn new_keypair(out: Key48, in0: Key48, now_ms: u64) -> Result<KeyPair, CalicoError> {
    KeyPair::new(out, in0, now_ms)
}
