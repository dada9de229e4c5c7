use thiserror::Error;

/// Result codes surfaced across the public API.
///
/// Every variant corresponds to one of the error kinds in the endpoint's
/// error-handling design: every failure is returned to the caller and
/// nothing is retried internally.
#[derive(Debug, Error)]
pub enum CalicoError {
    /// Operation invoked on an endpoint that has not completed `key()`.
    #[error("endpoint is not keyed")]
    BadState,

    /// Null/empty buffer, wrong key length, invalid role, or malformed
    /// session name.
    #[error("invalid input: {0}")]
    BadInput(String),

    /// Output buffer smaller than `len(pt) + overhead`, or input shorter
    /// than the overhead field.
    #[error("buffer too small: {0}")]
    TooSmall(String),

    /// Datagram IV was outside the replay window, or already accepted.
    #[error("IV dropped: replayed or too old")]
    IvDrop,

    /// MAC verification failed — ciphertext, overhead, or key mismatch.
    #[error("MAC verification failed")]
    MacDrop,

    /// A cryptographic primitive failed in a way its contract says it
    /// cannot; unrecoverable, indicates a programming error.
    #[error("internal error: {0}")]
    Internal(String),

    /// The outbound 64-bit counter has been fully used; this endpoint can
    /// never encrypt again.
    #[error("outbound counter exhausted")]
    CounterExhausted,
}
