//! Saturating rational arithmetic.
//!
//! Fractions are never reduced. After every multiplication the pair is
//! rescaled so that `numerator + denominator <= FRACTION_LIMIT`, which keeps
//! repeated squaring inside `u128` at the cost of precision once the limit
//! is reached. Rescaling truncates, so the order of multiplications is part
//! of the result: [`Fraction::pow`] always squares, and every accrual figure
//! depends on that exact sequence.

use crate::constants::FRACTION_LIMIT;
use crate::error::ArithmeticError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fraction {
    pub numerator: u128,
    pub denominator: u128,
}

impl Fraction {
    pub const ONE: Self = Self {
        numerator: 1,
        denominator: 1,
    };

    pub fn new(numerator: u128, denominator: u128) -> Result<Self, ArithmeticError> {
        if denominator == 0 {
            return Err(ArithmeticError::DivisionByZero);
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// `a * b`, rescaled by `LIMIT / (num + den)` when the sum exceeds the limit.
    ///
    /// # Examples
    ///
    /// ```
    /// use teiki_core::fraction::Fraction;
    /// let a = Fraction::new(2, 3).unwrap();
    /// let b = Fraction::new(5, 7).unwrap();
    /// assert_eq!(a.multiply(&b).unwrap(), Fraction::new(10, 21).unwrap());
    /// ```
    pub fn multiply(&self, other: &Fraction) -> Result<Fraction, ArithmeticError> {
        if !self.is_bounded() || !other.is_bounded() {
            return Err(ArithmeticError::Overflow);
        }
        // Both operands are bounded by LIMIT, so products stay below LIMIT^2.
        let numerator = self.numerator * other.numerator;
        let denominator = self.denominator * other.denominator;
        let sum = numerator + denominator;
        if sum <= FRACTION_LIMIT {
            return Ok(Fraction {
                numerator,
                denominator,
            });
        }
        Ok(Fraction {
            numerator: numerator * FRACTION_LIMIT / sum,
            denominator: denominator * FRACTION_LIMIT / sum,
        })
    }

    fn is_bounded(&self) -> bool {
        self.numerator
            .checked_add(self.denominator)
            .is_some_and(|sum| sum <= FRACTION_LIMIT)
    }

    /// `self^exp` by recursive squaring through [`multiply`](Self::multiply).
    pub fn pow(&self, exp: u64) -> Result<Fraction, ArithmeticError> {
        match exp {
            0 => Ok(Fraction::ONE),
            1 => Ok(*self),
            _ => {
                let half = self.pow(exp / 2)?;
                let squared = half.multiply(&half)?;
                if exp % 2 == 0 {
                    Ok(squared)
                } else {
                    self.multiply(&squared)
                }
            }
        }
    }
}
