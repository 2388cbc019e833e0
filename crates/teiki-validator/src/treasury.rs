//! Project treasury settlement.
//!
//! Each accrual replaces the project's [`TreasuryRecord`] with a successor
//! that credits the governor share, applies the burn policy to the decaying
//! project balance and points back at its predecessor by identity.

use serde::{Deserialize, Serialize};
use tracing::debug;

use teiki_core::error::{ArithmeticError, InvariantViolation, TerminalStateError, ValidationError};
use teiki_core::params::ProtocolParams;
use teiki_core::traits::DecayCalculator;
use teiki_core::types::{ProjectSnapshot, ProjectTeikiState, TreasuryRecord};

use crate::proof_of_backing::{AccrualClaim, BurnAction};

/// Treasury delta proposed by a transition.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TreasuryUpdate {
    pub current: TreasuryRecord,
    pub successor: TreasuryRecord,
    pub burn_amount: u64,
    /// Net teiki minted (negative when burnt).
    pub teiki_mint: i128,
}

/// The settlement derived from the current record and an accrual.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub burn_amount: u64,
    pub teiki_mint: i128,
    pub epochs: u64,
    pub successor: TreasuryRecord,
}

pub struct TreasuryReconciler<'a> {
    params: &'a ProtocolParams,
    decay: &'a dyn DecayCalculator,
}

impl<'a> TreasuryReconciler<'a> {
    pub fn new(params: &'a ProtocolParams, decay: &'a dyn DecayCalculator) -> Self {
        Self { params, decay }
    }

    /// Derive the successor of `current` after settling `claim` at `now`.
    pub fn reconcile(
        &self,
        current: &TreasuryRecord,
        claim: &AccrualClaim,
        now: u64,
    ) -> Result<Settlement, ValidationError> {
        let reward = claim.total_reward;
        let (project_teiki, burn_amount, epochs) = match (current.project_teiki, claim.burn_action) {
            (ProjectTeikiState::BurntEntirely, _) => {
                return Err(TerminalStateError::BurntEntirely(current.project_id).into());
            }
            (ProjectTeikiState::Empty, BurnAction::Flush) => {
                return Err(InvariantViolation::FlushNotAllowed.into());
            }
            (ProjectTeikiState::Empty, BurnAction::Periodic) => (
                ProjectTeikiState::BurntPeriodically {
                    available: reward,
                    last_burn_at: now,
                },
                0,
                0,
            ),
            (ProjectTeikiState::BurntPeriodically { last_burn_at, .. }, _) if last_burn_at > now => {
                return Err(InvariantViolation::StaleBurnTimestamp { last_burn_at, now }.into());
            }
            (ProjectTeikiState::BurntPeriodically { available, .. }, BurnAction::Flush) => {
                (ProjectTeikiState::BurntEntirely, available, 0)
            }
            (
                ProjectTeikiState::BurntPeriodically {
                    available,
                    last_burn_at,
                },
                BurnAction::Periodic,
            ) => self.decay_step(available, last_burn_at, now, reward)?,
        };

        if burn_amount == 0 && reward == 0 {
            return Err(InvariantViolation::NothingToSettle.into());
        }

        let governor_teiki = current
            .governor_teiki
            .checked_add(self.params.governor_share(reward)?)
            .ok_or(ArithmeticError::Overflow)?;

        let successor = TreasuryRecord {
            project_id: current.project_id,
            governor_teiki,
            project_teiki,
            continuation_tag: current.identity(),
        };
        let teiki_mint = claim.required_mint(burn_amount);

        debug!(
            project = %current.project_id,
            reward,
            burn_amount,
            epochs,
            teiki_mint,
            "treasury settled"
        );
        Ok(Settlement {
            burn_amount,
            teiki_mint,
            epochs,
            successor,
        })
    }

    /// Check a proposed update against the derived settlement.
    pub fn verify(
        &self,
        update: &TreasuryUpdate,
        claim: &AccrualClaim,
        now: u64,
        project: &ProjectSnapshot,
    ) -> Result<Settlement, ValidationError> {
        if update.current.project_id != project.project_id {
            return Err(InvariantViolation::ProjectMismatch {
                expected: project.project_id,
                got: update.current.project_id,
            }
            .into());
        }
        let expected_tag = update.current.identity();
        if update.successor.continuation_tag != expected_tag {
            return Err(InvariantViolation::ContinuationMismatch {
                expected: expected_tag,
                got: update.successor.continuation_tag,
            }
            .into());
        }

        let settlement = self.reconcile(&update.current, claim, now)?;
        if update.burn_amount != settlement.burn_amount {
            return Err(InvariantViolation::BurnMismatch {
                proposed: update.burn_amount,
                required: settlement.burn_amount,
            }
            .into());
        }
        if update.successor != settlement.successor {
            return Err(InvariantViolation::SuccessorMismatch.into());
        }
        if update.teiki_mint != settlement.teiki_mint {
            return Err(InvariantViolation::MintMismatch {
                proposed: update.teiki_mint,
                required: settlement.teiki_mint,
            }
            .into());
        }
        Ok(settlement)
    }

    fn decay_step(
        &self,
        available: u64,
        last_burn_at: u64,
        now: u64,
        reward: u64,
    ) -> Result<(ProjectTeikiState, u64, u64), ArithmeticError> {
        let epochs = self.params.epochs_in(now - last_burn_at);
        let (retained, burn, last_burn_at) = if epochs == 0 {
            (available, 0, last_burn_at)
        } else {
            let inv = self.params.burn_rate_inv()?;
            let remaining = self.decay.remaining(available, inv, epochs)?;
            let advanced = epochs
                .checked_mul(self.params.epoch_length)
                .and_then(|d| last_burn_at.checked_add(d))
                .ok_or(ArithmeticError::Overflow)?;
            let burn = available
                .checked_sub(remaining)
                .ok_or(ArithmeticError::Overflow)?;
            (remaining, burn, advanced)
        };
        let available = retained.checked_add(reward).ok_or(ArithmeticError::Overflow)?;
        Ok((
            ProjectTeikiState::BurntPeriodically {
                available,
                last_burn_at,
            },
            burn,
            epochs,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use teiki_core::types::{Hash256, ProjectStatus};
    use teiki_decay::TeikiDecayEngine;

    const EPOCH: u64 = 10_000;

    fn params() -> ProtocolParams {
        ProtocolParams {
            epoch_length: EPOCH,
            project_teiki_burn_rate: 600_000,
            governor_share_ratio: 400_000,
            ..ProtocolParams::default()
        }
    }

    fn periodic(reward: u64) -> AccrualClaim {
        AccrualClaim {
            total_reward: reward,
            burn_action: BurnAction::Periodic,
        }
    }

    fn flush(reward: u64) -> AccrualClaim {
        AccrualClaim {
            total_reward: reward,
            burn_action: BurnAction::Flush,
        }
    }

    fn record(state: ProjectTeikiState) -> TreasuryRecord {
        TreasuryRecord {
            project_teiki: state,
            governor_teiki: 7,
            ..TreasuryRecord::genesis(Hash256([1; 32]))
        }
    }

    fn burning(available: u64, last_burn_at: u64) -> TreasuryRecord {
        record(ProjectTeikiState::BurntPeriodically {
            available,
            last_burn_at,
        })
    }

    fn with<R>(f: impl FnOnce(&TreasuryReconciler<'_>) -> R) -> R {
        let p = params();
        let engine = TeikiDecayEngine::new();
        f(&TreasuryReconciler::new(&p, &engine))
    }

    #[test]
    fn first_accrual_opens_periodic_balance() {
        let s = with(|r| r.reconcile(&record(ProjectTeikiState::Empty), &periodic(1_000), 42)).unwrap();
        assert_eq!(
            s.successor.project_teiki,
            ProjectTeikiState::BurntPeriodically {
                available: 1_000,
                last_burn_at: 42
            }
        );
        assert_eq!(s.burn_amount, 0);
        assert_eq!(s.teiki_mint, 3_000);
        assert_eq!(s.successor.governor_teiki, 7 + 400);
    }

    #[test]
    fn one_epoch_decay_step() {
        let s = with(|r| r.reconcile(&burning(1_000_000, 0), &periodic(100), 15_000)).unwrap();
        assert_eq!(s.epochs, 1);
        assert_eq!(s.burn_amount, 400_000);
        assert_eq!(
            s.successor.project_teiki,
            ProjectTeikiState::BurntPeriodically {
                available: 600_100,
                last_burn_at: EPOCH
            }
        );
        assert_eq!(s.teiki_mint, 300 - 400_000);
        assert_eq!(s.successor.governor_teiki, 7 + 40);
    }

    #[test]
    fn partial_epoch_only_accumulates() {
        let s = with(|r| r.reconcile(&burning(1_000_000, 0), &periodic(100), EPOCH - 1)).unwrap();
        assert_eq!(s.burn_amount, 0);
        assert_eq!(
            s.successor.project_teiki,
            ProjectTeikiState::BurntPeriodically {
                available: 1_000_100,
                last_burn_at: 0
            }
        );
    }

    #[test]
    fn successor_points_at_predecessor() {
        let current = burning(1_000, 0);
        let s = with(|r| r.reconcile(&current, &periodic(1), 0)).unwrap();
        assert_eq!(s.successor.continuation_tag, current.identity());
    }

    #[test]
    fn flush_burns_everything_and_terminates() {
        let s = with(|r| r.reconcile(&burning(500, 0), &flush(10), 3)).unwrap();
        assert_eq!(s.burn_amount, 500);
        assert_eq!(s.successor.project_teiki, ProjectTeikiState::BurntEntirely);
        assert_eq!(s.teiki_mint, 20 - 500);
    }

    #[test]
    fn flush_from_empty_rejected() {
        let err = with(|r| r.reconcile(&record(ProjectTeikiState::Empty), &flush(10), 0)).unwrap_err();
        assert_eq!(err, InvariantViolation::FlushNotAllowed.into());
    }

    #[test]
    fn stale_burn_timestamp_rejected() {
        let err = with(|r| r.reconcile(&burning(500, 20_000), &periodic(10), 10_000)).unwrap_err();
        assert_eq!(
            err,
            InvariantViolation::StaleBurnTimestamp {
                last_burn_at: 20_000,
                now: 10_000
            }
            .into()
        );
    }

    #[test]
    fn nothing_to_settle_rejected() {
        let err = with(|r| r.reconcile(&burning(500, 0), &periodic(0), 1)).unwrap_err();
        assert_eq!(err, InvariantViolation::NothingToSettle.into());
        let err = with(|r| r.reconcile(&record(ProjectTeikiState::Empty), &periodic(0), 1)).unwrap_err();
        assert_eq!(err, InvariantViolation::NothingToSettle.into());
    }

    #[test]
    fn decay_alone_justifies_settlement() {
        let s = with(|r| r.reconcile(&burning(1_000_000, 0), &periodic(0), EPOCH)).unwrap();
        assert_eq!(s.burn_amount, 400_000);
    }

    fn project() -> ProjectSnapshot {
        ProjectSnapshot {
            project_id: Hash256([1; 32]),
            status: ProjectStatus::Active,
            milestone_reached: 0,
        }
    }

    fn honest_update(current: TreasuryRecord, claim: &AccrualClaim, now: u64) -> TreasuryUpdate {
        let s = with(|r| r.reconcile(&current, claim, now)).unwrap();
        TreasuryUpdate {
            current,
            successor: s.successor,
            burn_amount: s.burn_amount,
            teiki_mint: s.teiki_mint,
        }
    }

    #[test]
    fn verify_accepts_derived_update() {
        let update = honest_update(burning(1_000_000, 0), &periodic(100), EPOCH);
        assert!(with(|r| r.verify(&update, &periodic(100), EPOCH, &project())).is_ok());
    }

    #[test]
    fn verify_rejects_forked_chain() {
        let mut update = honest_update(burning(1_000_000, 0), &periodic(100), EPOCH);
        update.successor.continuation_tag = Hash256::ZERO;
        let err = with(|r| r.verify(&update, &periodic(100), EPOCH, &project())).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::Invariant(InvariantViolation::ContinuationMismatch { .. })
        ));
    }

    #[test]
    fn verify_rejects_underburn() {
        let mut update = honest_update(burning(1_000_000, 0), &periodic(100), EPOCH);
        update.burn_amount -= 1;
        let err = with(|r| r.verify(&update, &periodic(100), EPOCH, &project())).unwrap_err();
        assert_eq!(
            err,
            InvariantViolation::BurnMismatch {
                proposed: 399_999,
                required: 400_000
            }
            .into()
        );
    }

    #[test]
    fn verify_rejects_inflated_governor_share() {
        let mut update = honest_update(burning(1_000_000, 0), &periodic(100), EPOCH);
        update.successor.governor_teiki += 1;
        let err = with(|r| r.verify(&update, &periodic(100), EPOCH, &project())).unwrap_err();
        assert_eq!(err, InvariantViolation::SuccessorMismatch.into());
    }

    #[test]
    fn verify_rejects_wrong_mint() {
        let mut update = honest_update(burning(1_000_000, 0), &periodic(100), EPOCH);
        update.teiki_mint += 1;
        let err = with(|r| r.verify(&update, &periodic(100), EPOCH, &project())).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::Invariant(InvariantViolation::MintMismatch { .. })
        ));
    }

    #[test]
    fn verify_rejects_foreign_treasury() {
        let mut update = honest_update(burning(1_000_000, 0), &periodic(100), EPOCH);
        update.current.project_id = Hash256([9; 32]);
        let err = with(|r| r.verify(&update, &periodic(100), EPOCH, &project())).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::Invariant(InvariantViolation::ProjectMismatch { .. })
        ));
    }

    proptest! {
        #[test]
        fn burnt_entirely_is_terminal(
            reward in any::<u64>(),
            now in any::<u64>(),
            flushing in any::<bool>(),
        ) {
            let claim = if flushing { flush(reward) } else { periodic(reward) };
            let current = record(ProjectTeikiState::BurntEntirely);
            let err = with(|r| r.reconcile(&current, &claim, now)).unwrap_err();
            prop_assert_eq!(err, TerminalStateError::BurntEntirely(Hash256([1; 32])).into());
        }

        #[test]
        fn settlement_conserves_balance(
            available in 0u64..1_000_000_000_000,
            reward in 1u64..1_000_000_000,
            elapsed in 0u64..(40 * EPOCH),
        ) {
            let s = with(|r| r.reconcile(&burning(available, 0), &periodic(reward), elapsed)).unwrap();
            match s.successor.project_teiki {
                ProjectTeikiState::BurntPeriodically { available: next, last_burn_at } => {
                    prop_assert_eq!(next + s.burn_amount, available + reward);
                    prop_assert!(last_burn_at <= elapsed);
                    prop_assert!(elapsed - last_burn_at < EPOCH);
                }
                other => prop_assert!(false, "unexpected state {:?}", other),
            }
        }
    }
}
