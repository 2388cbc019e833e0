//! Protocol parameter snapshot.
//!
//! Resolved once per transition by the surrounding layer and passed by
//! reference into every component; nothing in the engine looks it up.

use serde::{Deserialize, Serialize};

use crate::codec::{Datum, FromDatum, ToDatum};
use crate::constants::{
    DEFAULT_DISCOUNT_CENT_PRICE, DEFAULT_EPOCH_LENGTH_MS, DEFAULT_GOVERNOR_SHARE_RATIO,
    DEFAULT_PROJECT_TEIKI_BURN_RATE, DEFAULT_TEIKI_COEFFICIENT, RATIO_MULTIPLIER,
};
use crate::error::{ArithmeticError, ParamsError, StructuralError};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ProtocolParams {
    /// Epoch length in milliseconds.
    pub epoch_length: u64,
    /// Divisor turning `amount * epochs` into teiki.
    pub teiki_coefficient: u64,
    /// Share of the project balance burnt per epoch (ppm).
    pub project_teiki_burn_rate: u64,
    /// Share of every reward credited to the governor (ppm).
    pub governor_share_ratio: u64,
    /// Funding thresholds of the project milestones, strictly increasing.
    pub project_milestones: Vec<u64>,
    /// Flat amount a third-party cleaner may keep per cleaned position.
    pub discount_cent_price: u64,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            epoch_length: DEFAULT_EPOCH_LENGTH_MS,
            teiki_coefficient: DEFAULT_TEIKI_COEFFICIENT,
            project_teiki_burn_rate: DEFAULT_PROJECT_TEIKI_BURN_RATE,
            governor_share_ratio: DEFAULT_GOVERNOR_SHARE_RATIO,
            project_milestones: vec![100_000_000_000, 1_000_000_000_000, 10_000_000_000_000],
            discount_cent_price: DEFAULT_DISCOUNT_CENT_PRICE,
        }
    }
}

impl ProtocolParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.epoch_length == 0 {
            return Err(ParamsError::ZeroEpochLength);
        }
        if self.teiki_coefficient == 0 {
            return Err(ParamsError::ZeroCoefficient);
        }
        for (name, value) in [
            ("project_teiki_burn_rate", self.project_teiki_burn_rate),
            ("governor_share_ratio", self.governor_share_ratio),
        ] {
            if value > RATIO_MULTIPLIER {
                return Err(ParamsError::RatioOutOfRange { name, value });
            }
        }
        if self.project_milestones.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ParamsError::MilestonesNotIncreasing);
        }
        Ok(())
    }

    /// Share of the project balance retained per epoch, the complement of
    /// the burn rate.
    pub fn burn_rate_inv(&self) -> Result<u64, ArithmeticError> {
        RATIO_MULTIPLIER
            .checked_sub(self.project_teiki_burn_rate)
            .ok_or(ArithmeticError::RateOutOfRange(self.project_teiki_burn_rate))
    }

    /// Governor credit for a reward: `reward * governor_share_ratio / MULTIPLIER`.
    pub fn governor_share(&self, reward: u64) -> Result<u64, ArithmeticError> {
        let share = u128::from(reward) * u128::from(self.governor_share_ratio)
            / u128::from(RATIO_MULTIPLIER);
        u64::try_from(share).map_err(|_| ArithmeticError::Overflow)
    }

    /// Whole epochs contained in `duration` milliseconds.
    pub fn epochs_in(&self, duration: u64) -> u64 {
        duration / self.epoch_length
    }
}

impl ToDatum for ProtocolParams {
    fn to_datum(&self) -> Datum {
        Datum::record(vec![
            self.epoch_length.to_datum(),
            self.teiki_coefficient.to_datum(),
            self.project_teiki_burn_rate.to_datum(),
            self.governor_share_ratio.to_datum(),
            self.project_milestones.to_datum(),
            self.discount_cent_price.to_datum(),
        ])
    }
}

impl FromDatum for ProtocolParams {
    fn from_datum(datum: &Datum) -> Result<Self, StructuralError> {
        let f = datum.fields(6)?;
        Ok(Self {
            epoch_length: u64::from_datum(&f[0])?,
            teiki_coefficient: u64::from_datum(&f[1])?,
            project_teiki_burn_rate: u64::from_datum(&f[2])?,
            governor_share_ratio: u64::from_datum(&f[3])?,
            project_milestones: Vec::<u64>::from_datum(&f[4])?,
            discount_cent_price: u64::from_datum(&f[5])?,
        })
    }
}
