use log::warn;

/// Slot value meaning "no event" in every channel class.
pub const EMPTY: i32 = 0;

/// Sentinel for untouched filler slots in long-note workaround mode.
///
/// When a channel is stretched, filler slots must be distinguishable from an
/// authored `0` so that a run of repeated values does not break (or falsely
/// continue) a section-fill long note. `REPEAT_PREVIOUS` marks a slot the
/// stretch created; it reads as "same state as the previous slot".
pub const REPEAT_PREVIOUS: i32 = -1;

/// Greatest common divisor.
fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 { a } else { gcd(b, a % b) }
}

/// Least common multiple, bounded by `max`.
///
/// Overflow (or exceeding `max`) is downgraded to `max` with a warning:
/// resolution precision is sacrificed for robustness, never an error.
pub fn lcm_bounded(a: u64, b: u64, max: u64) -> u64 {
    if a == 0 || b == 0 {
        return a.max(b).max(1);
    }
    let g = gcd(a, b);
    match (a / g).checked_mul(b) {
        Some(l) if l <= max => l,
        _ => {
            warn!(
                "resolution lcm({a}, {b}) exceeds {max}, clamping; timing will be quantized"
            );
            max
        }
    }
}

/// Stretch `values` onto `new_len` evenly spaced slots, filling gaps with
/// `filler`. `new_len` is expected to be a multiple of `values.len()`; when
/// the clamp above broke divisibility the nearest slot is used.
pub fn stretch(values: &[i32], new_len: usize, filler: i32) -> Vec<i32> {
    if values.is_empty() || new_len == 0 {
        return vec![filler; new_len];
    }
    if values.len() == new_len {
        return values.to_vec();
    }
    let mut out = vec![filler; new_len];
    for (i, &v) in values.iter().enumerate() {
        let slot = i * new_len / values.len();
        out[slot] = v;
    }
    out
}

/// Merge two declarations of the same channel within one measure.
///
/// Both sequences are stretched to their LCM length; non-empty slots of `b`
/// overlay `a`. `workaround` selects the long-note filler sentinel so the
/// merge cannot invent or destroy run continuity.
pub fn merge(a: &[i32], b: &[i32], max: u64, workaround: bool) -> Vec<i32> {
    let filler = if workaround { REPEAT_PREVIOUS } else { EMPTY };
    let len = lcm_bounded(a.len() as u64, b.len() as u64, max) as usize;
    let mut out = stretch(a, len, filler);
    let overlay = stretch(b, len, filler);
    for (slot, v) in out.iter_mut().zip(overlay) {
        if v != filler {
            *slot = v;
        }
    }
    out
}
