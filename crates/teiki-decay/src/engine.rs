//! Decay engine implementing the [`DecayCalculator`] trait.
//!
//! The per-epoch ratio `burn_rate_inv / RATIO_MULTIPLIER` is compounded over
//! the elapsed epochs with [`Fraction::pow`], then applied to the available
//! balance with a single truncating division. u128 intermediates throughout.

use teiki_core::constants::RATIO_MULTIPLIER;
use teiki_core::error::ArithmeticError;
use teiki_core::fraction::Fraction;
use teiki_core::traits::DecayCalculator;
use tracing::trace;

/// The production decay calculator.
#[derive(Debug, Clone, Default)]
pub struct TeikiDecayEngine;

impl TeikiDecayEngine {
    pub fn new() -> Self {
        Self
    }
}

impl DecayCalculator for TeikiDecayEngine {
    fn remaining(
        &self,
        available: u64,
        burn_rate_inv: u64,
        epochs: u64,
    ) -> Result<u64, ArithmeticError> {
        if burn_rate_inv > RATIO_MULTIPLIER {
            return Err(ArithmeticError::RateOutOfRange(burn_rate_inv));
        }

        let ratio = Fraction::new(u128::from(burn_rate_inv), u128::from(RATIO_MULTIPLIER))?;
        let compounded = ratio.pow(epochs)?;
        if compounded.denominator == 0 {
            return Err(ArithmeticError::DivisionByZero);
        }

        // numerator <= denominator since burn_rate_inv <= RATIO_MULTIPLIER.
        let complement = compounded.denominator - compounded.numerator;
        // available < 2^64 and complement <= LIMIT < 2^40, product fits u128.
        let remaining = u128::from(available) * complement / compounded.denominator;

        trace!(available, burn_rate_inv, epochs, remaining = %remaining, "decay step");
        u64::try_from(remaining).map_err(|_| ArithmeticError::Overflow)
    }
}
