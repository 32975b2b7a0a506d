//! Fixed-point arithmetic at a single canonical scale
//!
//! Every quantity is a [`Decimal`] truncated to `decimals` fractional digits.
//! Division results are floored (truncated toward zero; all ledger quantities
//! are non-negative), so rounding always works against the payer of the output.

use crate::{Error, Result};
use primitive_types::U512;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Largest scale a `Decimal` can represent
pub const MAX_DECIMALS: u32 = 28;

/// Basis point denominator
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Width of a `Decimal` mantissa
const MANTISSA_BITS: usize = 96;

/// Canonical fixed-point scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precision {
    /// Fractional digits kept after every operation
    pub decimals: u32,
}

impl Default for Precision {
    fn default() -> Self {
        Self { decimals: 18 }
    }
}

impl Precision {
    /// Create a precision, rejecting scales `Decimal` cannot hold
    pub fn new(decimals: u32) -> Result<Self> {
        if decimals > MAX_DECIMALS {
            return Err(Error::Config(format!(
                "precision {} exceeds maximum of {} decimals",
                decimals, MAX_DECIMALS
            )));
        }
        Ok(Self { decimals })
    }

    /// Truncate to the canonical scale
    pub fn floor(&self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(self.decimals, RoundingStrategy::ToZero)
    }

    /// `floor(a * b)`
    pub fn mul_floor(&self, a: Decimal, b: Decimal) -> Result<Decimal> {
        self.scaled_mul_div(a, b, Decimal::ONE)
    }

    /// `floor(a / b)`
    pub fn div_floor(&self, a: Decimal, b: Decimal) -> Result<Decimal> {
        self.scaled_mul_div(a, Decimal::ONE, b)
    }

    /// `floor(a * b / c)` with a single truncation
    pub fn mul_div_floor(&self, a: Decimal, b: Decimal, c: Decimal) -> Result<Decimal> {
        self.scaled_mul_div(a, b, c)
    }

    /// Exact `a * b / c` on integer mantissas, truncated once at `decimals`
    ///
    /// `Decimal` multiplication rounds to nearest once a product needs more
    /// than 28 digits, so the product is never formed as a `Decimal`.
    fn scaled_mul_div(&self, a: Decimal, b: Decimal, c: Decimal) -> Result<Decimal> {
        if c.is_zero() {
            return Err(Error::Arithmetic(format!("{} * {} / 0", a, b)));
        }
        let negative = a.is_sign_negative() ^ b.is_sign_negative() ^ c.is_sign_negative();

        // (ma / 10^sa)(mb / 10^sb) / (mc / 10^sc) at scale d
        //   = ma * mb * 10^(sc + d) / (mc * 10^(sa + sb))
        let up = c.scale() + self.decimals;
        let down = a.scale() + b.scale();
        let mut numerator = mantissa(a) * mantissa(b);
        let mut denominator = mantissa(c);
        if up >= down {
            numerator = numerator * U512::exp10((up - down) as usize);
        } else {
            denominator = denominator * U512::exp10((down - up) as usize);
        }

        let mut quotient = numerator / denominator;
        let mut scale = self.decimals;
        while quotient.bits() > MANTISSA_BITS {
            if scale == 0 {
                return Err(Error::Arithmetic(format!(
                    "{} * {} / {} overflows",
                    a, b, c
                )));
            }
            quotient = quotient / U512::from(10u8);
            scale -= 1;
        }

        let magnitude = i128::try_from(quotient.low_u128())
            .map_err(|e| Error::Arithmetic(format!("mantissa out of range: {}", e)))?;
        let signed = if negative { -magnitude } else { magnitude };
        let value = Decimal::try_from_i128_with_scale(signed, scale)
            .map_err(|e| Error::Arithmetic(format!("{} * {} / {}: {}", a, b, c, e)))?;

        Ok(value.normalize())
    }

    /// `value - floor(value * bps / 10000)`
    pub fn less_bps(&self, value: Decimal, bps: u32) -> Result<Decimal> {
        let delta = self.mul_div_floor(value, Decimal::from(bps), Decimal::from(BPS_DENOMINATOR))?;
        Ok(value - delta)
    }
}

fn mantissa(value: Decimal) -> U512 {
    U512::from(value.mantissa().unsigned_abs())
}
