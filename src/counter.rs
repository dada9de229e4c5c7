//! Reconstruct a full 64-bit IV from the last accepted counter and a
//! truncated low-bit sample (§4.3).

/// Width, in bits, of the truncated counter carried on the wire.
pub const TRUNC_BITS: u32 = 23;

/// Reconstruct `f` such that `f mod 2^TRUNC_BITS == truncated` and `f` is
/// the closest such value to `last_accepted`, preferring forward over
/// backward on ties. Clamped at zero — counters never go negative.
pub fn reconstruct(last_accepted: u64, truncated: u32) -> u64 {
    let width = TRUNC_BITS;
    let span = 1u64 << width;
    let mask = span - 1;
    debug_assert!((truncated as u64) <= mask);

    let base = (last_accepted & !mask) as i128;
    let t = truncated as i128;
    let span = span as i128;
    let last = last_accepted as i128;

    let candidates = [base + t, base + t + span, base + t - span];

    let mut best = candidates[0].max(0);
    let mut best_dist = (best - last).abs();
    for &cand in &candidates[1..] {
        if cand < 0 {
            continue;
        }
        let dist = (cand - last).abs();
        // Prefer forward (cand >= last_accepted) over backward on ties.
        if dist < best_dist || (dist == best_dist && cand >= last && best < last) {
            best = cand;
            best_dist = dist;
        }
    }
    best as u64
}
