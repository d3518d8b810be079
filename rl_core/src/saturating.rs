//! Clamping arithmetic over the signed nanosecond/permit domain
//!
//! Callers may hand us far-future or adversarial timestamps and permit counts, so every
//! combination of time and quantity in the limiters goes through these helpers. Results
//! clamp to `i64::MIN`/`i64::MAX` instead of wrapping.

use crate::limiter::Nanos;

/// `a + b`, clamped to the i64 range
#[inline(always)]
pub const fn add(a: i64, b: i64) -> i64 {
    a.saturating_add(b)
}

/// `a - b`, clamped to the i64 range
#[inline(always)]
pub const fn sub(a: i64, b: i64) -> i64 {
    a.saturating_sub(b)
}

/// `a * b`, clamped to the i64 range
#[inline(always)]
pub const fn mul(a: i64, b: i64) -> i64 {
    a.saturating_mul(b)
}

/// Ceiling division for a non-negative numerator and a positive divisor
#[inline(always)]
pub const fn div_ceil(numerator: i64, divisor: i64) -> i64 {
    let quotient = numerator / divisor;
    if numerator % divisor == 0 { quotient } else { quotient + 1 }
}

/// Start of the window of `size` nanoseconds containing `now`
///
/// Windows are aligned to absolute time, so this is `floor(now / size) * size`, including
/// for negative `now`. Near `i64::MIN` the aligned start may not be representable and the
/// result clamps to `i64::MIN`.
#[inline(always)]
pub const fn window_start(now: Nanos, size: Nanos) -> Nanos {
    sub(now, now.rem_euclid(size))
}

/// Never less than zero
#[inline(always)]
pub const fn non_negative(value: i64) -> i64 {
    if value < 0 { 0 } else { value }
}
