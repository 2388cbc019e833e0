//! Single entry point: accept or reject one proposed transition.
//!
//! Evaluation order is window, registry gate, issuance, treasury. The first
//! failed predicate rejects the whole transition; nothing is applied
//! partially.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use teiki_core::error::{InvariantViolation, ValidationError};
use teiki_core::params::ProtocolParams;
use teiki_core::traits::DecayCalculator;
use teiki_core::types::{
    BackerAddress, BackingPosition, Hash256, Plant, ProjectSnapshot, TimeWindow, TreasuryRecord,
};

use crate::backing::ConsumedBacking;
use crate::proof_of_backing::{Issuance, ProofOfBackingIssuer};
use crate::registry::{AssetMovement, ComponentKind, ComponentRegistry, ComponentSpend};
use crate::treasury::{Settlement, TreasuryReconciler, TreasuryUpdate};

/// Proof-of-backing operation a transition performs.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Plant {
        #[serde(default)]
        cleanup: bool,
    },
    /// Flowers must be listed strictly descending by identity.
    ClaimRewards { flowers: Vec<Plant> },
    Migrate,
}

/// Value paid to an address by the transition.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Payout {
    pub address: BackerAddress,
    pub amount: u64,
}

/// A fully formed proposal.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub window: TimeWindow,
    pub project: ProjectSnapshot,
    pub action: Action,
    #[serde(default)]
    pub consumed: Vec<ConsumedBacking>,
    #[serde(default)]
    pub produced: Vec<BackingPosition>,
    /// Plant certificates minted (positive) or burnt (negative), by identity.
    #[serde(default)]
    pub certificates: BTreeMap<Hash256, i64>,
    /// Net seed markers minted.
    #[serde(default)]
    pub seeds: i64,
    /// Withered markers minted, one per position closed before a full epoch.
    #[serde(default)]
    pub withered_markers: i64,
    #[serde(default)]
    pub claimed_reward: u64,
    #[serde(default)]
    pub treasury: Option<TreasuryUpdate>,
    #[serde(default)]
    pub signatories: BTreeSet<Hash256>,
    #[serde(default)]
    pub script_witnesses: BTreeSet<Hash256>,
    #[serde(default)]
    pub payouts: Vec<Payout>,
    #[serde(default)]
    pub components: Vec<ComponentSpend>,
    #[serde(default)]
    pub asset_movements: Vec<AssetMovement>,
}

impl Transition {
    /// Components this transition goes through, whatever it declares.
    pub fn required_components(&self) -> BTreeSet<ComponentKind> {
        let mut kinds = BTreeSet::new();
        if !self.consumed.is_empty() || !self.produced.is_empty() {
            kinds.insert(ComponentKind::Backing);
        }
        let mints = self.certificates.values().any(|q| *q != 0)
            || self.seeds != 0
            || self.withered_markers != 0
            || matches!(self.action, Action::ClaimRewards { .. });
        if mints {
            kinds.insert(ComponentKind::ProofOfBacking);
        }
        if self.treasury.is_some() {
            kinds.insert(ComponentKind::Treasury);
        }
        kinds
    }
}

/// Outcome of an accepted transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub issuance: Issuance,
    pub settlement: Option<Settlement>,
}

impl Verdict {
    pub fn total_reward(&self) -> u64 {
        self.issuance.total_reward()
    }

    pub fn successor(&self) -> Option<&TreasuryRecord> {
        self.settlement.as_ref().map(|s| &s.successor)
    }

    /// Identities of every certificate this transition leaves behind.
    pub fn certificate_identities(&self) -> Vec<Hash256> {
        self.issuance
            .planted
            .iter()
            .chain(&self.issuance.harvested)
            .map(Plant::identity)
            .collect()
    }
}

pub struct TransitionValidator {
    params: ProtocolParams,
    registry: ComponentRegistry,
    decay: Arc<dyn DecayCalculator>,
}

impl fmt::Debug for TransitionValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionValidator")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl TransitionValidator {
    /// Build a validator over a checked parameter snapshot and registry.
    pub fn new(
        params: ProtocolParams,
        registry: ComponentRegistry,
        decay: Arc<dyn DecayCalculator>,
    ) -> Result<Self, ValidationError> {
        params.validate()?;
        registry.validate()?;
        Ok(Self {
            params,
            registry,
            decay,
        })
    }

    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn validate(&self, tx: &Transition) -> Result<Verdict, ValidationError> {
        match self.evaluate(tx) {
            Ok(verdict) => {
                info!(
                    project = %tx.project.project_id,
                    reward = verdict.total_reward(),
                    certificates = verdict.certificate_identities().len(),
                    "transition accepted"
                );
                Ok(verdict)
            }
            Err(e) => {
                warn!(project = %tx.project.project_id, error = %e, "transition rejected");
                Err(e)
            }
        }
    }

    fn evaluate(&self, tx: &Transition) -> Result<Verdict, ValidationError> {
        tx.window.validate()?;
        let admission = self.registry.authorize_all(
            &tx.components,
            &tx.required_components(),
            &tx.asset_movements,
        )?;

        let issuance = ProofOfBackingIssuer::new(&self.params).evaluate(tx, &admission)?;

        let settlement = match &tx.treasury {
            Some(update) => {
                let reconciler = TreasuryReconciler::new(&self.params, self.decay.as_ref());
                Some(reconciler.verify(update, &issuance.claim, tx.window.start, &tx.project)?)
            }
            None if issuance.total_reward() > 0 => {
                return Err(InvariantViolation::MissingTreasuryUpdate(issuance.total_reward()).into());
            }
            None => None,
        };

        Ok(Verdict {
            issuance,
            settlement,
        })
    }
}
