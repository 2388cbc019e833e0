//! Proof-of-backing issuance.
//!
//! Recomputes, from the positions and plants a transition touches, which
//! certificates must be minted or burnt and how much teiki has accrued, then
//! checks the proposal against it. Three operations:
//!
//! - [`Action::Plant`]: close and/or open positions of one project. Every
//!   closed position that was held for a full epoch gets a plant certificate;
//!   one closed sooner gets a withered marker instead.
//! - [`Action::ClaimRewards`]: turn matured flowers into fruits and pay their
//!   reward.
//! - [`Action::Migrate`]: move positions off a superseded component version
//!   with no economic effect.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use teiki_core::constants::{FLUSH_MINT_FACTOR, PERIODIC_MINT_FACTOR};
use teiki_core::error::{
    ArithmeticError, AuthorizationError, InvariantViolation, StructuralError, ValidationError,
    VersionError,
};
use teiki_core::params::ProtocolParams;
use teiki_core::types::{Credential, Hash256, Plant, ProjectSnapshot};

use crate::backing::{self, Harvest};
use crate::registry::Admission;
use crate::transition::{Action, Transition};

/// How the project treasury burns while this accrual settles.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BurnAction {
    /// Geometric decay over elapsed epochs.
    Periodic,
    /// Burn the whole project balance once; the project is delisted.
    Flush,
}

impl BurnAction {
    pub fn for_project(project: &ProjectSnapshot) -> Self {
        if project.status.is_delisted() {
            BurnAction::Flush
        } else {
            BurnAction::Periodic
        }
    }

    /// Teiki minted per unit of reward.
    pub fn mint_factor(&self) -> u64 {
        match self {
            BurnAction::Periodic => PERIODIC_MINT_FACTOR,
            BurnAction::Flush => FLUSH_MINT_FACTOR,
        }
    }
}

/// Aggregate reward handed to the treasury reconciler.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccrualClaim {
    pub total_reward: u64,
    pub burn_action: BurnAction,
}

impl AccrualClaim {
    /// Net teiki mint once `burn_amount` is known:
    /// `factor * total_reward - burn_amount`, negative when the burn dominates.
    pub fn required_mint(&self, burn_amount: u64) -> i128 {
        i128::from(self.burn_action.mint_factor()) * i128::from(self.total_reward)
            - i128::from(burn_amount)
    }
}

/// What a valid issuance produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issuance {
    /// Plants certified by this transition (flowers and fruits).
    pub planted: Vec<Plant>,
    /// Fruits produced by claiming flowers.
    pub harvested: Vec<Plant>,
    pub withered: usize,
    pub claim: AccrualClaim,
}

impl Issuance {
    pub fn total_reward(&self) -> u64 {
        self.claim.total_reward
    }
}

pub struct ProofOfBackingIssuer<'a> {
    params: &'a ProtocolParams,
}

impl<'a> ProofOfBackingIssuer<'a> {
    pub fn new(params: &'a ProtocolParams) -> Self {
        Self { params }
    }

    /// Check the issuance side of `tx`, already admitted by the registry
    /// gate as `admission`.
    pub fn evaluate(
        &self,
        tx: &Transition,
        admission: &Admission,
    ) -> Result<Issuance, ValidationError> {
        match &tx.action {
            Action::Plant { cleanup } => self.plant(tx, *cleanup),
            Action::ClaimRewards { flowers } => self.claim_rewards(tx, flowers),
            Action::Migrate => self.migrate(tx, admission),
        }
    }

    fn plant(&self, tx: &Transition, cleanup: bool) -> Result<Issuance, ValidationError> {
        let backer = backing::validate_batch(
            &tx.consumed,
            &tx.produced,
            &tx.project,
            tx.window,
            self.params,
            cleanup,
        )?;

        if cleanup {
            check_cleanup_payouts(tx, self.params)?;
        } else if let Some(backer) = backer {
            authorize(&backer.payment, tx)?;
        }

        let unstaked_at = tx.window.start;
        let outcomes = tx
            .consumed
            .iter()
            .map(|c| backing::classify(c, unstaked_at, &tx.project, self.params))
            .collect::<Result<Vec<_>, _>>()?;
        let harvest = Harvest::gather(outcomes)?;

        let mut expected = BTreeMap::new();
        for plant in &harvest.plants {
            *expected.entry(plant.identity()).or_insert(0) += 1;
        }
        verify_certificates(&expected, &tx.certificates)?;

        let expected_seeds = tx.produced.len() as i64 - tx.consumed.len() as i64;
        if tx.seeds != expected_seeds {
            return Err(InvariantViolation::SeedMismatch {
                expected: expected_seeds,
                got: tx.seeds,
            }
            .into());
        }
        check_withered_markers(tx.withered_markers, harvest.withered)?;

        check_claimed_reward(tx.claimed_reward, harvest.total_reward)?;
        debug!(
            plants = harvest.plants.len(),
            withered = harvest.withered,
            total_reward = harvest.total_reward,
            cleanup,
            "plant issuance verified"
        );

        Ok(Issuance {
            claim: AccrualClaim {
                total_reward: harvest.total_reward,
                burn_action: BurnAction::for_project(&tx.project),
            },
            planted: harvest.plants,
            harvested: Vec::new(),
            withered: harvest.withered,
        })
    }

    fn claim_rewards(&self, tx: &Transition, flowers: &[Plant]) -> Result<Issuance, ValidationError> {
        if flowers.is_empty() {
            return Err(InvariantViolation::EmptyClaim.into());
        }
        if !tx.consumed.is_empty() || !tx.produced.is_empty() {
            return Err(InvariantViolation::UnexpectedPositions.into());
        }

        let identities = check_flower_order(flowers)?;

        let mut expected = BTreeMap::new();
        let mut total_reward: u64 = 0;
        let mut fruits = Vec::with_capacity(flowers.len());
        for (flower, identity) in flowers.iter().zip(identities) {
            let reward = self.flower_reward(flower, &identity, &tx.project)?;
            total_reward = total_reward
                .checked_add(reward)
                .ok_or(ArithmeticError::Overflow)?;

            let fruit = flower.clone().into_fruit();
            *expected.entry(identity).or_insert(0) -= 1;
            *expected.entry(fruit.identity()).or_insert(0) += 1;
            fruits.push(fruit);
        }
        verify_certificates(&expected, &tx.certificates)?;

        if tx.seeds != 0 {
            return Err(InvariantViolation::SeedMismatch {
                expected: 0,
                got: tx.seeds,
            }
            .into());
        }
        check_withered_markers(tx.withered_markers, 0)?;

        check_claimed_reward(tx.claimed_reward, total_reward)?;
        debug!(flowers = flowers.len(), total_reward, "reward claim verified");

        Ok(Issuance {
            planted: Vec::new(),
            harvested: fruits,
            withered: 0,
            claim: AccrualClaim {
                total_reward,
                burn_action: BurnAction::for_project(&tx.project),
            },
        })
    }

    fn flower_reward(
        &self,
        flower: &Plant,
        identity: &Hash256,
        project: &ProjectSnapshot,
    ) -> Result<u64, ValidationError> {
        if flower.project_id != project.project_id {
            return Err(InvariantViolation::ProjectMismatch {
                expected: project.project_id,
                got: flower.project_id,
            }
            .into());
        }
        if flower.is_matured {
            return Err(InvariantViolation::AlreadyMatured(*identity).into());
        }
        let elapsed = flower
            .elapsed()
            .filter(|e| *e >= self.params.epoch_length)
            .ok_or(InvariantViolation::FlowerWithered(*identity))?;
        if !backing::is_matured(flower.milestone_backed, project) {
            return Err(InvariantViolation::FlowerNotMature(*identity).into());
        }
        Ok(backing::compute_reward(flower.backing_amount, elapsed, self.params)?)
    }

    fn migrate(&self, tx: &Transition, admission: &Admission) -> Result<Issuance, ValidationError> {
        if tx.consumed.is_empty() {
            return Err(StructuralError::EmptyBatch.into());
        }
        if !admission.migrates() {
            return Err(VersionError::NothingToMigrate.into());
        }
        let moves_certificates = tx.certificates.values().any(|q| *q != 0);
        let same_positions = tx.consumed.len() == tx.produced.len()
            && tx
                .consumed
                .iter()
                .zip(&tx.produced)
                .all(|(c, p)| c.position == *p);
        if moves_certificates
            || tx.seeds != 0
            || tx.withered_markers != 0
            || tx.claimed_reward != 0
            || tx.treasury.is_some()
            || !same_positions
        {
            return Err(InvariantViolation::MigrationHasEffect.into());
        }
        debug!(positions = tx.consumed.len(), "migration verified");
        Ok(Issuance {
            planted: Vec::new(),
            harvested: Vec::new(),
            withered: 0,
            claim: AccrualClaim {
                total_reward: 0,
                burn_action: BurnAction::for_project(&tx.project),
            },
        })
    }
}

/// Identities of `flowers`, which must be strictly descending.
pub fn check_flower_order(flowers: &[Plant]) -> Result<Vec<Hash256>, InvariantViolation> {
    let identities: Vec<Hash256> = flowers.iter().map(Plant::identity).collect();
    for (index, pair) in identities.windows(2).enumerate() {
        if pair[1] >= pair[0] {
            return Err(InvariantViolation::FlowerOrder { index: index + 1 });
        }
    }
    Ok(identities)
}

/// Sort flowers into the order [`check_flower_order`] accepts.
pub fn sort_flowers(flowers: &mut [Plant]) {
    flowers.sort_by_cached_key(|f| std::cmp::Reverse(f.identity()));
}

/// The proposed certificate mint must match `expected` exactly; zero
/// entries on either side are ignored.
pub fn verify_certificates(
    expected: &BTreeMap<Hash256, i64>,
    proposed: &BTreeMap<Hash256, i64>,
) -> Result<(), InvariantViolation> {
    let keys = expected.keys().chain(proposed.keys());
    for identity in keys {
        let want = expected.get(identity).copied().unwrap_or(0);
        let got = proposed.get(identity).copied().unwrap_or(0);
        if want != got {
            return Err(InvariantViolation::CertificateMismatch {
                identity: *identity,
                expected: want,
                got,
            });
        }
    }
    Ok(())
}

fn check_withered_markers(minted: i64, withered: usize) -> Result<(), ValidationError> {
    let expected = i64::try_from(withered).map_err(|_| ArithmeticError::Overflow)?;
    if minted != expected {
        return Err(InvariantViolation::WitheredMarkerMismatch {
            expected,
            got: minted,
        }
        .into());
    }
    Ok(())
}

fn check_claimed_reward(claimed: u64, computed: u64) -> Result<(), InvariantViolation> {
    if claimed != computed {
        return Err(InvariantViolation::RewardMismatch { claimed, computed });
    }
    Ok(())
}

fn authorize(credential: &Credential, tx: &Transition) -> Result<(), AuthorizationError> {
    match credential {
        Credential::PubKey(key) if !tx.signatories.contains(key) => {
            Err(AuthorizationError::MissingSignature(*key))
        }
        Credential::Script(script) if !tx.script_witnesses.contains(script) => {
            Err(AuthorizationError::MissingScriptWitness(*script))
        }
        _ => Ok(()),
    }
}

fn check_cleanup_payouts(tx: &Transition, params: &ProtocolParams) -> Result<(), ValidationError> {
    let owed = backing::cleanup_refunds(&tx.consumed, params)?;
    for (address, required) in owed {
        let paid = tx
            .payouts
            .iter()
            .filter(|p| p.address == address)
            .try_fold(0u64, |acc, p| acc.checked_add(p.amount))
            .ok_or(ArithmeticError::Overflow)?;
        if paid < required {
            return Err(InvariantViolation::PayoutShortfall { required, paid }.into());
        }
    }
    Ok(())
}
