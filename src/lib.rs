//! calico_tunnel — an authenticated-encryption tunnel with per-direction
//! forward-secret ratcheting.
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - All public APIs return opaque newtypes to prevent accidental misuse.
//!
//! # Module layout
//! - `endpoint`    — the per-endpoint state machine: construction, encrypt/decrypt
//! - `keys`        — key schedule, role-split, per-direction ratchet
//! - `aead`        — ChaCha20 + SipHash-2-4 encrypt/decrypt
//! - `replay`      — sliding replay window for datagram IVs
//! - `counter`      — truncated-IV reconstruction
//! - `primitives`  — raw crypto primitive wrappers
//! - `clock`       — injected monotonic time source
//! - `error`       — unified error type

pub mod aead;
pub mod clock;
pub mod counter;
pub mod endpoint;
pub mod error;
pub mod keys;
pub mod primitives;
pub mod replay;

pub use endpoint::{Endpoint, Mode, Role, DATAGRAM_OVERHEAD, STREAM_OVERHEAD};
pub use error::CalicoError;
