//! Integer multiply-divide helpers.
//!
//! All reward arithmetic is floor division on unsigned integers. The helpers
//! split the dividend into quotient and remainder before multiplying so the
//! result never overflows when `numerator <= denominator`.

use crate::types::Amount;

/// `floor(value * numerator / denominator)` for `numerator <= denominator`.
///
/// With `value = q * denominator + r`:
/// `floor(value * n / d) = q * n + floor(r * n / d)`, and `r * n < d * d`
/// fits in a `u128` for any `u64` denominator.
///
/// Returns 0 when `denominator` is 0.
///
/// # Examples
///
/// ```
/// use tranche_core::math::mul_div_floor;
///
/// assert_eq!(mul_div_floor(1_000_000, 20, 100), 200_000);
/// assert_eq!(mul_div_floor(100_000, 1, 2), 50_000);
/// assert_eq!(mul_div_floor(u128::MAX, 50, 100), u128::MAX / 2);
/// ```
pub fn mul_div_floor(value: Amount, numerator: u64, denominator: u64) -> Amount {
    if denominator == 0 {
        return 0;
    }
    debug_assert!(numerator <= denominator, "ratio above one: {numerator}/{denominator}");
    let n = numerator as u128;
    let d = denominator as u128;
    let q = value / d;
    let r = value % d;
    q * n + (r * n) / d
}

/// `floor(a / b)`, or 0 when `b` is 0.
pub fn div_floor_or_zero(a: Amount, b: u64) -> Amount {
    if b == 0 { 0 } else { a / b as u128 }
}
