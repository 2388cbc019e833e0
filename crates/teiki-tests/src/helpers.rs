//! Shared fixtures for lifecycle and adversarial tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use teiki_core::params::ProtocolParams;
use teiki_core::types::*;
use teiki_decay::TeikiDecayEngine;
use teiki_validator::backing::{self, ConsumedBacking, Harvest};
use teiki_validator::proof_of_backing::{AccrualClaim, BurnAction};
use teiki_validator::registry::{
    AssetMovement, ComponentKind, ComponentRegistry, ComponentSpend, MigratableRecord,
};
use teiki_validator::transition::Payout;
use teiki_validator::{Action, Transition, TransitionValidator, TreasuryReconciler, TreasuryUpdate};

/// Epoch length used throughout the suite (ms).
pub const EPOCH: u64 = 10_000;

/// Backing component version in force.
pub const BACKING_LATEST: Hash256 = Hash256([0xb0; 32]);
/// Superseded backing component version.
pub const BACKING_V1: Hash256 = Hash256([0xa0; 32]);
pub const POB_LATEST: Hash256 = Hash256([0xb1; 32]);
pub const TREASURY_LATEST: Hash256 = Hash256([0xb2; 32]);

/// Simple key hash from a seed byte.
pub fn pkh(seed: u8) -> Hash256 {
    Hash256([seed; 32])
}

pub fn backer(seed: u8) -> BackerAddress {
    BackerAddress::from_key(pkh(seed))
}

pub fn params() -> ProtocolParams {
    ProtocolParams {
        epoch_length: EPOCH,
        teiki_coefficient: 500,
        project_teiki_burn_rate: 600_000,
        governor_share_ratio: 400_000,
        project_milestones: vec![1_000, 10_000, 100_000],
        discount_cent_price: 1_000,
    }
}

/// Migration token of [`BACKING_V1`].
pub fn backing_v1_token() -> AssetId {
    AssetId {
        policy_id: pkh(0xcc),
        asset_name: b"migrate-backing-v1".to_vec(),
    }
}

pub fn registry() -> ComponentRegistry {
    let mut backing = MigratableRecord::new(BACKING_LATEST);
    backing.migrations.insert(BACKING_V1, backing_v1_token());
    ComponentRegistry {
        backing,
        proof_of_backing: MigratableRecord::new(POB_LATEST),
        treasury: MigratableRecord::new(TREASURY_LATEST),
    }
}

pub fn validator() -> TransitionValidator {
    TransitionValidator::new(params(), registry(), Arc::new(TeikiDecayEngine::new()))
        .unwrap()
}

pub fn project(status: ProjectStatus, milestone_reached: u16) -> ProjectSnapshot {
    ProjectSnapshot {
        project_id: pkh(0x01),
        status,
        milestone_reached,
    }
}

pub fn window(start: u64, end: u64) -> TimeWindow {
    TimeWindow::new(start, end).unwrap()
}

/// A recorded position living in output `index` of a staking transaction.
pub fn position(
    project: &ProjectSnapshot,
    owner: u8,
    staked_at: u64,
    milestone_backed: u16,
    amount: u64,
    index: u64,
) -> ConsumedBacking {
    ConsumedBacking {
        output_id: OutputRef {
            tx_id: pkh(0x70 ^ owner),
            index,
        },
        position: BackingPosition {
            project_id: project.project_id,
            backer_address: backer(owner),
            staked_at,
            milestone_backed,
            amount,
        },
    }
}

/// An empty transition spending under the latest backing and
/// proof-of-backing components.
pub fn transition(project: &ProjectSnapshot, window: TimeWindow, action: Action) -> Transition {
    Transition {
        window,
        project: project.clone(),
        action,
        consumed: Vec::new(),
        produced: Vec::new(),
        certificates: BTreeMap::new(),
        seeds: 0,
        withered_markers: 0,
        claimed_reward: 0,
        treasury: None,
        signatories: BTreeSet::new(),
        script_witnesses: BTreeSet::new(),
        payouts: Vec::new(),
        components: vec![
            ComponentSpend { kind: ComponentKind::Backing, hash: BACKING_LATEST },
            ComponentSpend { kind: ComponentKind::ProofOfBacking, hash: POB_LATEST },
        ],
        asset_movements: Vec::new(),
    }
}

/// Fill in the figures an honest proposer would derive: certificates,
/// seeds, withered markers, reward and, when `treasury` is given, the
/// treasury update together with its component declaration.
pub fn seal(tx: &mut Transition, treasury: Option<&TreasuryRecord>) {
    let params = params();
    let mut certificates = BTreeMap::new();
    let reward = match &tx.action {
        Action::Plant { .. } => {
            let outcomes = tx
                .consumed
                .iter()
                .map(|c| backing::classify(c, tx.window.start, &tx.project, &params).unwrap());
            let harvest = Harvest::gather(outcomes).unwrap();
            for plant in &harvest.plants {
                *certificates.entry(plant.identity()).or_insert(0) += 1;
            }
            tx.seeds = tx.produced.len() as i64 - tx.consumed.len() as i64;
            tx.withered_markers = harvest.withered as i64;
            harvest.total_reward
        }
        Action::ClaimRewards { flowers } => {
            let mut total = 0;
            for flower in flowers {
                total += backing::compute_reward(
                    flower.backing_amount,
                    flower.elapsed().unwrap(),
                    &params,
                )
                .unwrap();
                *certificates.entry(flower.identity()).or_insert(0) -= 1;
                *certificates.entry(flower.clone().into_fruit().identity()).or_insert(0) += 1;
            }
            tx.seeds = 0;
            tx.withered_markers = 0;
            total
        }
        Action::Migrate => 0,
    };
    tx.certificates = certificates;
    tx.claimed_reward = reward;

    tx.treasury = treasury.map(|current| {
        let claim = AccrualClaim {
            total_reward: reward,
            burn_action: BurnAction::for_project(&tx.project),
        };
        let engine = TeikiDecayEngine::new();
        let settlement = TreasuryReconciler::new(&params, &engine)
            .reconcile(current, &claim, tx.window.start)
            .unwrap();
        TreasuryUpdate {
            current: current.clone(),
            successor: settlement.successor,
            burn_amount: settlement.burn_amount,
            teiki_mint: settlement.teiki_mint,
        }
    });
    let declared = tx.components.iter().any(|c| c.kind == ComponentKind::Treasury);
    if tx.treasury.is_some() && !declared {
        tx.components.push(ComponentSpend {
            kind: ComponentKind::Treasury,
            hash: TREASURY_LATEST,
        });
    }
}

/// Sign with the payment keys of every backer the transition touches.
pub fn sign_all(tx: &mut Transition) {
    let keys: Vec<Hash256> = tx
        .consumed
        .iter()
        .map(|c| &c.position.backer_address)
        .chain(tx.produced.iter().map(|p| &p.backer_address))
        .map(|a| *a.payment.hash())
        .collect();
    tx.signatories.extend(keys);
}

/// Pay every cleaned backer exactly what they are owed.
pub fn pay_refunds(tx: &mut Transition) {
    let owed = backing::cleanup_refunds(&tx.consumed, &params()).unwrap();
    tx.payouts = owed
        .into_iter()
        .map(|(address, amount)| Payout { address, amount })
        .collect();
}

/// Move the migration token of [`BACKING_V1`] and spend under it.
pub fn spend_under_v1(tx: &mut Transition, with_witness: bool) {
    for spend in &mut tx.components {
        if spend.kind == ComponentKind::Backing {
            spend.hash = BACKING_V1;
        }
    }
    if with_witness {
        tx.asset_movements.push(AssetMovement {
            asset: backing_v1_token(),
            quantity: 1,
        });
    }
}

/// The flower an earlier unstake of `c` at `unstaked_at` left behind.
pub fn flower_of(c: &ConsumedBacking, unstaked_at: u64) -> Plant {
    Plant {
        is_matured: false,
        backing_output_id: c.output_id.clone(),
        backing_amount: c.position.amount,
        unstaked_at,
        project_id: c.position.project_id,
        backer_address: c.position.backer_address.clone(),
        staked_at: c.position.staked_at,
        milestone_backed: c.position.milestone_backed,
    }
}
