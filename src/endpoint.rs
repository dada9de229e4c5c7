//! The per-endpoint state machine (§4.5): construction, and the four
//! encrypt/decrypt paths (datagram, stream).
//!
//! Grounded on the teacher's `session.rs` (role-driven construction, a
//! single struct holding all per-direction state) and `ratchet.rs`
//! (encrypt/decrypt as the two public entry points, everything else
//! private). The ratchet coordination and wire framing follow §4.5 and the
//! confirmed byte layout in `original_source/src/Calico.cpp`.

use tracing::{debug, trace};

use crate::clock::{Clock, SystemClock};
use crate::counter::reconstruct;
use crate::error::CalicoError;
use crate::keys::{derive_and_split, new_keypair, KeyPair};
use crate::replay::ReplayWindow;
use crate::{aead, counter};

/// Bytes of overhead added to each datagram message: 3-byte obfuscated IV
/// field ∥ 8-byte MAC tag.
pub const DATAGRAM_OVERHEAD: usize = 11;

/// Bytes of overhead added to each stream message: 1-byte ratchet bit ∥
/// 8-byte MAC tag.
pub const STREAM_OVERHEAD: usize = 9;

/// Minimum time between a spontaneous outbound-key ratchet.
pub const RATCHET_PERIOD_MS: u64 = 120_000;

/// How long after observing a peer ratchet signal before the old inbound
/// key is erased.
pub const RATCHET_REMOTE_TIMEOUT_MS: u64 = 60_000;

/// Width, in bits, of the truncated IV carried on datagram wire frames.
pub const IV_TRUNC_BITS: u32 = counter::TRUNC_BITS;

/// Obfuscation constant applied to the 24-bit `(truncated IV, ratchet bit)`
/// field on datagram frames (confirmed against the reference
/// implementation — not stated numerically in the distilled design).
const AD_FUZZ: u32 = 0x00C8_6AD7;
const TRUNC24_MASK: u32 = 0x00FF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    StreamOnly,
    Datagram,
}

struct StreamState {
    keys: KeyPair,
    out_iv: u64,
    in_iv: u64,
}

struct DatagramState {
    keys: KeyPair,
    out_iv: u64,
    window: ReplayWindow,
}

/// One side of the tunnel. Holds all per-session state; immutable after
/// construction except through `encrypt_*`/`decrypt_*`.
///
/// Not `Sync`/shareable across threads without external synchronization —
/// see the specification's concurrency model: exactly one caller mutates
/// an endpoint at a time.
pub struct Endpoint {
    role: Role,
    clock: Box<dyn Clock>,
    stream: StreamState,
    dgram: Option<DatagramState>,
}

impl Endpoint {
    /// Construct and key an endpoint using the system clock.
    pub fn new(
        role: Role,
        secret: &[u8; 32],
        session_name: &[u8],
        mode: Mode,
    ) -> Result<Self, CalicoError> {
        Self::with_clock(role, secret, session_name, mode, Box::new(SystemClock::new()))
    }

    /// Construct and key an endpoint with an injected clock — used by
    /// tests that need to simulate `RATCHET_PERIOD`/`RATCHET_REMOTE_TIMEOUT`
    /// elapsing without real delays.
    pub fn with_clock(
        role: Role,
        secret: &[u8; 32],
        session_name: &[u8],
        mode: Mode,
        clock: Box<dyn Clock>,
    ) -> Result<Self, CalicoError> {
        if session_name.is_empty() {
            return Err(CalicoError::BadInput(
                "session_name must not be empty".into(),
            ));
        }

        let initiator = role == Role::Initiator;
        let datagram = mode == Mode::Datagram;
        let mut split = derive_and_split(secret, session_name, initiator, datagram)?;
        let now = clock.now_ms();

        let stream_keys = new_keypair(split.stream_out, split.stream_in0, now)?;
        let stream = StreamState {
            keys: stream_keys,
            out_iv: 0,
            in_iv: 0,
        };

        let dgram = if datagram {
            let dgram_out = split.dgram_out.take().expect("datagram keys present");
            let dgram_in0 = split.dgram_in0.take().expect("datagram keys present");
            let dgram_keys = new_keypair(dgram_out, dgram_in0, now)?;
            Some(DatagramState {
                keys: dgram_keys,
                out_iv: 0,
                window: ReplayWindow::new(),
            })
        } else {
            None
        };

        debug!(?role, ?mode, "endpoint keyed");
        Ok(Self {
            role,
            clock,
            stream,
            dgram,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Secrets are zeroized by `Drop`; this is a documented no-op entry
    /// point matching the specification's `destroy(endpoint)` operation.
    pub fn destroy(self) {
        drop(self);
    }

    // ── Datagram path ────────────────────────────────────────────────

    pub fn encrypt_datagram(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CalicoError> {
        let now_ms = self.clock.now_ms();
        let role = self.role;
        let dgram = self.dgram.as_mut().ok_or(CalicoError::BadState)?;

        let iv = dgram.out_iv;
        if iv == u64::MAX {
            return Err(CalicoError::CounterExhausted);
        }

        if role == Role::Initiator {
            maybe_local_ratchet(&mut dgram.keys, now_ms)?;
        }
        dgram.out_iv = iv + 1;

        let mut ciphertext = vec![0u8; plaintext.len()];
        let tag = aead::encrypt(&dgram.keys.out, iv, plaintext, &mut ciphertext);

        let trunc24 = (((iv as u32) << 1) | (dgram.keys.active_out as u32)) & TRUNC24_MASK;
        let obf = (trunc24.wrapping_sub(tag as u32)) ^ AD_FUZZ;

        let mut out = Vec::with_capacity(ciphertext.len() + DATAGRAM_OVERHEAD);
        out.extend_from_slice(&ciphertext);
        out.push(obf as u8);
        out.push((obf >> 16) as u8);
        out.push((obf >> 8) as u8);
        out.extend_from_slice(&tag.to_le_bytes());
        Ok(out)
    }

    pub fn decrypt_datagram(&mut self, input: &[u8]) -> Result<Vec<u8>, CalicoError> {
        let now_ms = self.clock.now_ms();
        let role = self.role;
        let dgram = self.dgram.as_mut().ok_or(CalicoError::BadState)?;

        if input.len() < DATAGRAM_OVERHEAD {
            return Err(CalicoError::TooSmall(format!(
                "input {} bytes shorter than {DATAGRAM_OVERHEAD}-byte overhead",
                input.len()
            )));
        }
        let ct_len = input.len() - DATAGRAM_OVERHEAD;
        let (ct_part, overhead) = input.split_at(ct_len);

        // Finalize a pending inbound ratchet before key selection (§4.5 step 2).
        if let Some(started) = dgram.keys.in_ratchet_time {
            if now_ms.saturating_sub(started) > RATCHET_REMOTE_TIMEOUT_MS {
                dgram.keys.finalize_in_ratchet()?;
            }
        }

        let tag = u64::from_le_bytes(overhead[3..11].try_into().expect("8 bytes"));

        let packed = (overhead[0] as u32) | ((overhead[1] as u32) << 16) | ((overhead[2] as u32) << 8);
        let trunc24 = ((packed ^ AD_FUZZ).wrapping_add(tag as u32)) & TRUNC24_MASK;
        let ratchet_bit = (trunc24 & 1) as u8;
        let trunc23 = trunc24 >> 1;

        handle_ratchet_signal(&mut dgram.keys, role, ratchet_bit, now_ms)?;

        let iv = reconstruct(dgram.window.highest(), trunc23);

        if !dgram.window.check(iv) {
            trace!(iv, "datagram dropped: replay/out-of-window");
            return Err(CalicoError::IvDrop);
        }

        let mut plaintext = ct_part.to_vec();
        let key = dgram.keys.in_key(ratchet_bit);
        if !aead::decrypt(key, iv, &mut plaintext, tag) {
            trace!(iv, "datagram dropped: MAC failure");
            return Err(CalicoError::MacDrop);
        }

        dgram.window.accept(iv);
        Ok(plaintext)
    }

    // ── Stream path ──────────────────────────────────────────────────

    pub fn encrypt_stream(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CalicoError> {
        let now_ms = self.clock.now_ms();
        let role = self.role;

        let iv = self.stream.out_iv;
        if iv == u64::MAX {
            return Err(CalicoError::CounterExhausted);
        }

        if role == Role::Initiator {
            maybe_local_ratchet(&mut self.stream.keys, now_ms)?;
        }
        self.stream.out_iv = iv + 1;

        let mut ciphertext = vec![0u8; plaintext.len()];
        let tag = aead::encrypt(&self.stream.keys.out, iv, plaintext, &mut ciphertext);

        let mut out = Vec::with_capacity(ciphertext.len() + STREAM_OVERHEAD);
        out.extend_from_slice(&ciphertext);
        out.push(self.stream.keys.active_out);
        out.extend_from_slice(&tag.to_le_bytes());
        Ok(out)
    }

    pub fn decrypt_stream(&mut self, input: &[u8]) -> Result<Vec<u8>, CalicoError> {
        let now_ms = self.clock.now_ms();
        let role = self.role;

        if input.len() < STREAM_OVERHEAD {
            return Err(CalicoError::TooSmall(format!(
                "input {} bytes shorter than {STREAM_OVERHEAD}-byte overhead",
                input.len()
            )));
        }
        let ct_len = input.len() - STREAM_OVERHEAD;
        let (ct_part, overhead) = input.split_at(ct_len);

        if let Some(started) = self.stream.keys.in_ratchet_time {
            if now_ms.saturating_sub(started) > RATCHET_REMOTE_TIMEOUT_MS {
                self.stream.keys.finalize_in_ratchet()?;
            }
        }

        let ratchet_bit = overhead[0] & 1;
        let tag = u64::from_le_bytes(overhead[1..9].try_into().expect("8 bytes"));

        handle_ratchet_signal(&mut self.stream.keys, role, ratchet_bit, now_ms)?;

        let iv = self.stream.in_iv;
        let mut plaintext = ct_part.to_vec();
        let key = self.stream.keys.in_key(ratchet_bit);
        if !aead::decrypt(key, iv, &mut plaintext, tag) {
            trace!(iv, "stream message dropped: MAC failure");
            return Err(CalicoError::MacDrop);
        }

        self.stream.in_iv = iv + 1;
        Ok(plaintext)
    }
}

/// §4.5 "Local ratchet check (initiator only)": if our outbound key is
/// still the one the peer is expected to be using for inbound, and the
/// ratchet period has elapsed, ratchet forward.
fn maybe_local_ratchet(keys: &mut KeyPair, now_ms: u64) -> Result<(), CalicoError> {
    if keys.active_out == keys.active_in
        && now_ms.saturating_sub(keys.out_ratchet_time) > RATCHET_PERIOD_MS
    {
        keys.ratchet_out(now_ms)?;
    }
    Ok(())
}

/// §4.5 step 4 (datagram) / the equivalent stream step: react to a ratchet
/// bit that disagrees with our currently active inbound key. Only the
/// first packet carrying a novel signal stamps the timer and (for the
/// responder) triggers the responding outbound ratchet — later packets
/// with the same bit are no-ops here.
fn handle_ratchet_signal(
    keys: &mut KeyPair,
    role: Role,
    ratchet_bit: u8,
    now_ms: u64,
) -> Result<(), CalicoError> {
    if ratchet_bit != keys.active_in && keys.in_ratchet_time.is_none() {
        keys.in_ratchet_time = Some(now_ms);
        if role == Role::Responder {
            maybe_local_ratchet(keys, now_ms)?;
        }
    }
    Ok(())
}
