use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// A USD amount represented as an integer number of hundredths of a cent
/// (i.e. a fixed-point value scaled by 100_000) so that quote/ledger math never
/// drifts the way repeated `f64` addition would across many small debits.
///
/// `Usd::floor_cent()` and the `Display` impl round back to the cent for
/// anything user-visible (receipts, transaction descriptions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Usd(i64);

const SCALE: i64 = 100_000;

impl Usd {
    pub const ZERO: Usd = Usd(0);

    /// One cent, the floor applied to every minted quote.
    pub const MIN_CHARGE: Usd = Usd(SCALE / 100);

    pub fn from_f64(value: f64) -> Self {
        Usd((value * SCALE as f64).round() as i64)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / SCALE as f64
    }

    pub fn cents(self) -> i64 {
        // round-half-up at the cent boundary
        let per_cent = SCALE / 100;
        (self.0 + per_cent / 2).div_euclid(per_cent)
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn floor_at_min_charge(self) -> Self {
        if self < Self::MIN_CHARGE {
            Self::MIN_CHARGE
        } else {
            self
        }
    }

    pub fn checked_sub(self, other: Usd) -> Option<Usd> {
        self.0.checked_sub(other.0).map(Usd)
    }

    pub fn negate(self) -> Self {
        Usd(-self.0)
    }

    pub fn abs(self) -> Self {
        Usd(self.0.abs())
    }

    /// Adds a signed delta (as produced by [`Usd::negate`]), returning `None` if the
    /// result would go negative. Used by the ledger, where a negative balance is
    /// never a valid outcome of any transaction.
    pub fn checked_add_signed(self, delta: Usd) -> Option<Self> {
        let sum = self.0.checked_add(delta.0)?;
        if sum < 0 {
            None
        } else {
            Some(Usd(sum))
        }
    }
}

impl Add for Usd {
    type Output = Usd;
    fn add(self, rhs: Usd) -> Usd {
        Usd(self.0 + rhs.0)
    }
}

impl Sub for Usd {
    type Output = Usd;
    fn sub(self, rhs: Usd) -> Usd {
        Usd(self.0 - rhs.0)
    }
}

impl fmt::Display for Usd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.to_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floors_sub_cent_quotes() {
        let tiny = Usd::from_f64(0.0004);
        assert_eq!(tiny.floor_at_min_charge(), Usd::MIN_CHARGE);
    }

    #[test]
    fn add_and_sub_round_trip() {
        let a = Usd::from_f64(12.34);
        let b = Usd::from_f64(1.01);
        assert_eq!((a + b) - b, a);
    }

    #[test]
    fn display_formats_two_decimals() {
        assert_eq!(Usd::from_f64(0.01).to_string(), "$0.01");
        assert_eq!(Usd::from_f64(3.5).to_string(), "$3.50");
    }
}
