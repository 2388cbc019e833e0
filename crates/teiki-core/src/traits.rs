//! Trait interfaces for the Teiki protocol.
//!
//! - [`DecayCalculator`]: project teiki decay math (teiki-decay implements)

use crate::error::ArithmeticError;

/// Pure computation of the geometric decay of a project teiki balance.
///
/// All math is integer-only over saturating fractions, so every validator
/// derives the same figures from the same inputs.
pub trait DecayCalculator: Send + Sync {
    /// Balance left after `epochs` decay steps.
    ///
    /// `burn_rate_inv` is the retained share per epoch in ppm
    /// (`RATIO_MULTIPLIER - burn_rate`). Callers must branch on
    /// `epochs == 0` themselves: the formula is not a no-op there.
    fn remaining(
        &self,
        available: u64,
        burn_rate_inv: u64,
        epochs: u64,
    ) -> Result<u64, ArithmeticError>;

    /// Amount burnt over `epochs` decay steps; zero when no epoch elapsed.
    fn burn_amount(
        &self,
        available: u64,
        burn_rate_inv: u64,
        epochs: u64,
    ) -> Result<u64, ArithmeticError> {
        if epochs == 0 {
            return Ok(0);
        }
        let remaining = self.remaining(available, burn_rate_inv, epochs)?;
        available
            .checked_sub(remaining)
            .ok_or(ArithmeticError::Overflow)
    }
}
