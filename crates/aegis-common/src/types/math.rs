//! Fixed-point helpers over `Decimal`
//!
//! Amounts are whole base units of the underlying asset. Products are taken
//! with checked multiplication. When `a * b` does not fit in 96 bits and the
//! operands are whole numbers, both factors are split into quotient and
//! remainder by `c`, so `a * b / c` becomes
//! `qa * b + ra * qb + ra * rb / c` with `ra, rb < c`. Only the last term can
//! still overflow; it then goes through a 28-digit division, and the rounded
//! result can be off by one unit.

use crate::error::MathError;
use rust_decimal::Decimal;

/// `floor(a * b / c)`
pub fn mul_div_floor(a: Decimal, b: Decimal, c: Decimal) -> Result<Decimal, MathError> {
    Ok(mul_div(a, b, c)?.floor())
}

/// `ceil(a * b / c)`
pub fn mul_div_ceil(a: Decimal, b: Decimal, c: Decimal) -> Result<Decimal, MathError> {
    Ok(mul_div(a, b, c)?.ceil())
}

fn mul_div(a: Decimal, b: Decimal, c: Decimal) -> Result<Decimal, MathError> {
    if c.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    if let Some(product) = a.checked_mul(b) {
        return product.checked_div(c).ok_or(MathError::Overflow);
    }
    if !(a.fract().is_zero() && b.fract().is_zero() && c.fract().is_zero()) {
        return a
            .checked_div(c)
            .and_then(|q| q.checked_mul(b))
            .ok_or(MathError::Overflow);
    }

    let (qa, ra) = div_rem(a, c)?;
    let (qb, rb) = div_rem(b, c)?;
    let tail = match ra.checked_mul(rb) {
        Some(product) => product.checked_div(c),
        None => ra.checked_div(c).and_then(|f| f.checked_mul(rb)),
    };
    qa.checked_mul(b)
        .zip(ra.checked_mul(qb))
        .and_then(|(x, y)| x.checked_add(y))
        .zip(tail)
        .and_then(|(x, y)| x.checked_add(y))
        .ok_or(MathError::Overflow)
}

/// Truncated quotient and remainder of whole numbers; `r` has the sign of `a`
fn div_rem(a: Decimal, c: Decimal) -> Result<(Decimal, Decimal), MathError> {
    let mut q = a.checked_div(c).ok_or(MathError::Overflow)?.trunc();
    let mut r = q
        .checked_mul(c)
        .and_then(|qc| a.checked_sub(qc))
        .ok_or(MathError::Overflow)?;
    // The 28-digit quotient can round across an integer boundary
    if r.abs() >= c.abs() || (!r.is_zero() && r.is_sign_negative() != a.is_sign_negative()) {
        let step = if r.is_sign_negative() == c.is_sign_negative() {
            Decimal::ONE
        } else {
            Decimal::NEGATIVE_ONE
        };
        q += step;
        r -= step * c;
    }
    Ok((q, r))
}

/// Validate that `amount` is a positive whole number of base units
pub fn ensure_amount(amount: Decimal) -> bool {
    amount > Decimal::ZERO && amount.fract().is_zero()
}

/// Split `total` across `weights`, rounding every share down and giving the
/// rounding remainder to the last entry with a non-zero weight.
///
/// Returns one share per weight, in order. Zero weights receive zero.
pub fn split_by_weights(total: Decimal, weights: &[u64]) -> Result<Vec<Decimal>, MathError> {
    let weight_sum: u64 = weights
        .iter()
        .try_fold(0u64, |acc, w| acc.checked_add(*w))
        .ok_or(MathError::Overflow)?;
    if weight_sum == 0 {
        return Err(MathError::DivisionByZero);
    }

    let last = weights
        .iter()
        .rposition(|w| *w > 0)
        .ok_or(MathError::DivisionByZero)?;
    let sum = Decimal::from(weight_sum);

    let mut shares = Vec::with_capacity(weights.len());
    let mut assigned = Decimal::ZERO;
    for (i, weight) in weights.iter().enumerate() {
        let share = if *weight == 0 {
            Decimal::ZERO
        } else if i == last {
            total - assigned
        } else {
            mul_div_floor(total, Decimal::from(*weight), sum)?
        };
        assigned += share;
        shares.push(share);
    }

    Ok(shares)
}

/// Split `total` pro-rata to `weights` (e.g. credit balances), rounding every
/// share down and giving the remainder to the last non-zero weight.
pub fn split_pro_rata(total: Decimal, weights: &[Decimal]) -> Result<Vec<Decimal>, MathError> {
    let weight_sum: Decimal = weights.iter().copied().sum();
    if weight_sum <= Decimal::ZERO {
        return Err(MathError::DivisionByZero);
    }
    let last = weights
        .iter()
        .rposition(|w| *w > Decimal::ZERO)
        .ok_or(MathError::DivisionByZero)?;

    let mut shares = Vec::with_capacity(weights.len());
    let mut assigned = Decimal::ZERO;
    for (i, weight) in weights.iter().enumerate() {
        let share = if *weight <= Decimal::ZERO {
            Decimal::ZERO
        } else if i == last {
            total - assigned
        } else {
            mul_div_floor(total, *weight, weight_sum)?
        };
        assigned += share;
        shares.push(share);
    }
    Ok(shares)
}
