//! Backing position lifecycle.
//!
//! A position is open from the moment it is recorded until a transition
//! consumes it. Closing classifies it exactly once:
//!
//! - **Withered**: held for less than one epoch; no plant and no reward, only
//!   a withered marker.
//! - **Skipped**: held long enough but the backed milestone has not been
//!   passed yet; a flower is planted and the reward waits for a claim.
//! - **Rewardable**: matured; a fruit is planted and the reward is paid now.
//!
//! Extending a stake is a close followed by a fresh open whose `staked_at`
//! is the end of the transition's validity window.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use teiki_core::error::{ArithmeticError, InvariantViolation, StructuralError, ValidationError};
use teiki_core::params::ProtocolParams;
use teiki_core::types::{
    BackerAddress, BackingPosition, OutputRef, Plant, ProjectSnapshot, ProjectStatus, TimeWindow,
};

/// A recorded position together with the output it lives in.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ConsumedBacking {
    pub output_id: OutputRef,
    pub position: BackingPosition,
}

/// How a closed position settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionOutcome {
    Withered,
    Skipped { plant: Plant },
    Rewardable { plant: Plant, reward: u64 },
}

impl PositionOutcome {
    pub fn plant(&self) -> Option<&Plant> {
        match self {
            PositionOutcome::Withered => None,
            PositionOutcome::Skipped { plant } | PositionOutcome::Rewardable { plant, .. } => {
                Some(plant)
            }
        }
    }

    pub fn reward(&self) -> u64 {
        match self {
            PositionOutcome::Rewardable { reward, .. } => *reward,
            _ => 0,
        }
    }
}

/// Reward for `amount` held for `elapsed` milliseconds.
///
/// `amount * elapsed / epoch_length / teiki_coefficient`, two truncating
/// divisions in that order.
///
/// # Examples
///
/// ```
/// use teiki_core::params::ProtocolParams;
/// use teiki_validator::backing::compute_reward;
///
/// let params = ProtocolParams {
///     epoch_length: 10_000,
///     teiki_coefficient: 500,
///     ..ProtocolParams::default()
/// };
/// assert_eq!(compute_reward(100_000_000, 25_000, &params).unwrap(), 500_000);
/// ```
pub fn compute_reward(
    amount: u64,
    elapsed: u64,
    params: &ProtocolParams,
) -> Result<u64, ArithmeticError> {
    if params.epoch_length == 0 || params.teiki_coefficient == 0 {
        return Err(ArithmeticError::DivisionByZero);
    }
    let reward = u128::from(amount) * u128::from(elapsed)
        / u128::from(params.epoch_length)
        / u128::from(params.teiki_coefficient);
    u64::try_from(reward).map_err(|_| ArithmeticError::Overflow)
}

/// A position backing `milestone_backed` matures once the project has moved
/// past that milestone and is not on its way to being delisted.
pub fn is_matured(milestone_backed: u16, project: &ProjectSnapshot) -> bool {
    milestone_backed < project.milestone_reached && project.status != ProjectStatus::PreDelisted
}

/// Classify one consumed position closed at `unstaked_at`.
pub fn classify(
    consumed: &ConsumedBacking,
    unstaked_at: u64,
    project: &ProjectSnapshot,
    params: &ProtocolParams,
) -> Result<PositionOutcome, ValidationError> {
    let position = &consumed.position;
    let elapsed = unstaked_at
        .checked_sub(position.staked_at)
        .ok_or(InvariantViolation::StakedInFuture {
            staked_at: position.staked_at,
            unstaked_at,
        })?;

    if elapsed < params.epoch_length {
        debug!(output = %consumed.output_id, elapsed, "position withered");
        return Ok(PositionOutcome::Withered);
    }

    let matured = is_matured(position.milestone_backed, project);
    let plant = Plant {
        is_matured: matured,
        backing_output_id: consumed.output_id.clone(),
        backing_amount: position.amount,
        unstaked_at,
        project_id: position.project_id,
        backer_address: position.backer_address.clone(),
        staked_at: position.staked_at,
        milestone_backed: position.milestone_backed,
    };

    if !matured {
        debug!(output = %consumed.output_id, elapsed, "position closed immature");
        return Ok(PositionOutcome::Skipped { plant });
    }

    let reward = compute_reward(position.amount, elapsed, params)?;
    debug!(output = %consumed.output_id, elapsed, reward, "position matured");
    Ok(PositionOutcome::Rewardable { plant, reward })
}

/// Result of folding classified outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Harvest {
    pub total_reward: u64,
    pub plants: Vec<Plant>,
    pub withered: usize,
}

impl Harvest {
    pub fn gather<I>(outcomes: I) -> Result<Self, ArithmeticError>
    where
        I: IntoIterator<Item = PositionOutcome>,
    {
        outcomes.into_iter().try_fold(Harvest::default(), |mut acc, outcome| {
            acc.total_reward = acc
                .total_reward
                .checked_add(outcome.reward())
                .ok_or(ArithmeticError::Overflow)?;
            match outcome {
                PositionOutcome::Withered => acc.withered += 1,
                PositionOutcome::Skipped { plant } | PositionOutcome::Rewardable { plant, .. } => {
                    acc.plants.push(plant)
                }
            }
            Ok(acc)
        })
    }
}

/// Open a fresh position at the end of `window`.
pub fn open_position(
    project: &ProjectSnapshot,
    backer_address: BackerAddress,
    amount: u64,
    window: TimeWindow,
) -> BackingPosition {
    BackingPosition {
        project_id: project.project_id,
        backer_address,
        staked_at: window.end,
        milestone_backed: project.milestone_reached,
        amount,
    }
}

/// Successor of `old` in a re-stake, held by the same backer from `window.end`.
pub fn reopen(
    old: &ConsumedBacking,
    project: &ProjectSnapshot,
    amount: u64,
    window: TimeWindow,
) -> BackingPosition {
    open_position(project, old.position.backer_address.clone(), amount, window)
}

/// Structural rules of a batch of closed and opened positions.
///
/// Returns the single backer of the batch when there is one.
pub fn validate_batch<'a>(
    consumed: &'a [ConsumedBacking],
    produced: &'a [BackingPosition],
    project: &ProjectSnapshot,
    window: TimeWindow,
    params: &ProtocolParams,
    cleanup: bool,
) -> Result<Option<&'a BackerAddress>, ValidationError> {
    if consumed.is_empty() && produced.is_empty() {
        return Err(StructuralError::EmptyBatch.into());
    }

    let positions = consumed.iter().map(|c| &c.position).chain(produced.iter());
    for position in positions.clone() {
        if position.project_id != project.project_id {
            return Err(InvariantViolation::ProjectMismatch {
                expected: project.project_id,
                got: position.project_id,
            }
            .into());
        }
    }

    if cleanup {
        if !project.status.allows_cleanup() {
            return Err(InvariantViolation::CleanupNotAllowed(project.status).into());
        }
        if !produced.is_empty() {
            return Err(InvariantViolation::PartialCleanup.into());
        }
        return Ok(None);
    }

    // Outside cleanup every position in the batch belongs to one backer.
    let mut backers = positions.map(|p| &p.backer_address);
    let backer = backers.next();
    if let Some(first) = backer {
        if backers.any(|b| b != first) {
            return Err(InvariantViolation::MixedBackers.into());
        }
    }

    if !produced.is_empty() && project.status != ProjectStatus::Active {
        return Err(InvariantViolation::ProjectNotActive(project.status).into());
    }
    for position in produced {
        validate_new_position(position, project, window, params)?;
    }

    Ok(backer)
}

fn validate_new_position(
    position: &BackingPosition,
    project: &ProjectSnapshot,
    window: TimeWindow,
    params: &ProtocolParams,
) -> Result<(), InvariantViolation> {
    if position.amount == 0 {
        return Err(InvariantViolation::ZeroAmount);
    }
    if position.staked_at != window.end {
        return Err(InvariantViolation::StakedAtMismatch {
            expected: window.end,
            got: position.staked_at,
        });
    }
    if position.milestone_backed != project.milestone_reached {
        return Err(InvariantViolation::MilestoneMismatch {
            expected: project.milestone_reached,
            got: position.milestone_backed,
        });
    }
    if usize::from(position.milestone_backed) > params.project_milestones.len() {
        return Err(InvariantViolation::UnknownMilestone {
            milestone: position.milestone_backed,
            count: params.project_milestones.len(),
        });
    }
    Ok(())
}

/// Minimum each backer must be paid when a third party closes their positions.
pub fn cleanup_refunds(
    consumed: &[ConsumedBacking],
    params: &ProtocolParams,
) -> Result<BTreeMap<BackerAddress, u64>, ArithmeticError> {
    let mut owed: BTreeMap<BackerAddress, u64> = BTreeMap::new();
    for c in consumed {
        let refund = c.position.amount.saturating_sub(params.discount_cent_price);
        let entry = owed.entry(c.position.backer_address.clone()).or_default();
        *entry = entry.checked_add(refund).ok_or(ArithmeticError::Overflow)?;
    }
    Ok(owed)
}
