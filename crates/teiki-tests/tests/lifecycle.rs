//! Lifecycle scenarios driven through the full validator.
//!
//! Each test plays an honest proposer: it builds a transition, lets
//! [`seal`] derive the certificates, reward and treasury update, and expects
//! the validator to accept exactly those figures.

use teiki_core::error::{TerminalStateError, ValidationError, VersionError};
use teiki_core::types::*;
use teiki_tests::helpers::*;
use teiki_validator::backing::{open_position, reopen};
use teiki_validator::registry::{ComponentKind, ComponentSpend};
use teiki_validator::{Action, Transition, TreasuryUpdate};

fn plant(project: &ProjectSnapshot, w: TimeWindow) -> Transition {
    transition(project, w, Action::Plant { cleanup: false })
}

#[test]
fn stake_then_unstake_after_milestone_pays_reward() {
    let proj = project(ProjectStatus::Active, 0);
    let w = window(0, 0);

    let mut stake = plant(&proj, w);
    stake.produced.push(open_position(&proj, backer(2), 100_000_000, w));
    sign_all(&mut stake);
    seal(&mut stake, None);
    let verdict = validator().validate(&stake).unwrap();
    assert_eq!(verdict.total_reward(), 0);
    assert_eq!(stake.seeds, 1);

    // The project passes its first milestone while the stake is held.
    let proj = project(ProjectStatus::Active, 1);
    let held = position(&proj, 2, 0, 0, 100_000_000, 0);
    let genesis = TreasuryRecord::genesis(proj.project_id);

    let mut unstake = plant(&proj, window(25_000, 26_000));
    unstake.consumed.push(held);
    sign_all(&mut unstake);
    seal(&mut unstake, Some(&genesis));

    let verdict = validator().validate(&unstake).unwrap();
    assert_eq!(verdict.total_reward(), 500_000);
    assert_eq!(unstake.seeds, -1);
    assert_eq!(verdict.issuance.planted.len(), 1);
    assert!(verdict.issuance.planted[0].is_matured);

    let settlement = verdict.settlement.unwrap();
    assert_eq!(settlement.burn_amount, 0);
    assert_eq!(settlement.teiki_mint, 1_500_000);
    assert_eq!(settlement.successor.governor_teiki, 200_000);
    assert_eq!(
        settlement.successor.project_teiki,
        ProjectTeikiState::BurntPeriodically {
            available: 500_000,
            last_burn_at: 25_000
        }
    );
    assert_eq!(settlement.successor.continuation_tag, genesis.identity());
}

#[test]
fn immature_unstake_plants_flower_then_claim_yields_fruit() {
    let proj = project(ProjectStatus::Active, 0);
    let held = position(&proj, 4, 0, 0, 10_000_000, 3);

    let mut unstake = plant(&proj, window(30_000, 31_000));
    unstake.consumed.push(held.clone());
    sign_all(&mut unstake);
    seal(&mut unstake, None);

    let verdict = validator().validate(&unstake).unwrap();
    assert_eq!(verdict.total_reward(), 0);
    let planted = &verdict.issuance.planted[0];
    assert!(planted.is_flower());

    let flower = flower_of(&held, 30_000);
    assert_eq!(flower.identity(), planted.identity());

    // Milestone reached: the flower can now be claimed by anyone.
    let proj = project(ProjectStatus::Active, 1);
    let current = TreasuryRecord {
        project_id: proj.project_id,
        governor_teiki: 0,
        project_teiki: ProjectTeikiState::BurntPeriodically {
            available: 1_000_000,
            last_burn_at: 20_000,
        },
        continuation_tag: pkh(0x99),
    };
    let mut claim = transition(
        &proj,
        window(50_000, 51_000),
        Action::ClaimRewards {
            flowers: vec![flower.clone()],
        },
    );
    seal(&mut claim, Some(&current));

    let verdict = validator().validate(&claim).unwrap();
    assert_eq!(verdict.total_reward(), 60_000);
    assert_eq!(verdict.issuance.harvested, vec![flower.clone().into_fruit()]);
    assert_eq!(claim.certificates[&flower.identity()], -1);
    assert_eq!(claim.certificates[&flower.into_fruit().identity()], 1);

    let settlement = verdict.settlement.unwrap();
    assert_eq!(settlement.epochs, 3);
    assert_eq!(settlement.burn_amount, 64_000);
    assert_eq!(settlement.teiki_mint, 180_000 - 64_000);
    assert_eq!(settlement.successor.governor_teiki, 24_000);
    assert_eq!(
        settlement.successor.project_teiki,
        ProjectTeikiState::BurntPeriodically {
            available: 996_000,
            last_burn_at: 50_000
        }
    );
}

#[test]
fn rollover_restarts_the_clock() {
    let proj = project(ProjectStatus::Active, 1);
    let w = window(10_000, 12_000);
    let held = position(&proj, 2, 0, 0, 1_000, 0);

    let mut tx = plant(&proj, w);
    tx.produced.push(reopen(&held, &proj, 2_000, w));
    tx.consumed.push(held);
    sign_all(&mut tx);
    seal(&mut tx, Some(&TreasuryRecord::genesis(proj.project_id)));

    let verdict = validator().validate(&tx).unwrap();
    assert_eq!(verdict.total_reward(), 2);
    assert_eq!(tx.seeds, 0);
    assert_eq!(tx.produced[0].staked_at, 12_000);
    assert_eq!(tx.produced[0].milestone_backed, 1);
}

#[test]
fn short_hold_withers_into_a_marker() {
    let proj = project(ProjectStatus::Active, 1);
    let mut tx = plant(&proj, window(EPOCH - 1, EPOCH));
    tx.consumed.push(position(&proj, 2, 0, 0, 1_000_000, 0));
    sign_all(&mut tx);
    seal(&mut tx, None);

    assert_eq!(tx.withered_markers, 1);
    assert_eq!(tx.seeds, -1);
    assert!(tx.certificates.is_empty());

    let verdict = validator().validate(&tx).unwrap();
    assert_eq!(verdict.issuance.withered, 1);
    assert_eq!(verdict.total_reward(), 0);
    assert!(verdict.certificate_identities().is_empty());
}

#[test]
fn mixed_batch_marks_only_the_withered_positions() {
    let proj = project(ProjectStatus::Active, 1);
    let mut tx = plant(&proj, window(3 * EPOCH, 3 * EPOCH + 1));
    tx.consumed.push(position(&proj, 2, 0, 0, 1_000_000, 0));
    tx.consumed.push(position(&proj, 2, 3 * EPOCH - 1, 1, 1_000_000, 1));
    tx.consumed.push(position(&proj, 2, 2 * EPOCH + 5, 1, 1_000_000, 2));
    sign_all(&mut tx);
    seal(&mut tx, Some(&TreasuryRecord::genesis(proj.project_id)));

    let verdict = validator().validate(&tx).unwrap();
    assert_eq!(tx.withered_markers, 2);
    assert_eq!(verdict.issuance.withered, 2);
    assert_eq!(verdict.issuance.planted.len(), 1);
    assert_eq!(verdict.total_reward(), 6_000);
}

#[test]
fn delisted_cleanup_flushes_treasury_for_good() {
    let proj = project(ProjectStatus::Delisted, 1);
    let current = TreasuryRecord {
        project_id: proj.project_id,
        governor_teiki: 10,
        project_teiki: ProjectTeikiState::BurntPeriodically {
            available: 9_000,
            last_burn_at: 0,
        },
        continuation_tag: Hash256::ZERO,
    };

    let mut tx = transition(&proj, window(20_000, 21_000), Action::Plant { cleanup: true });
    tx.consumed.push(position(&proj, 2, 0, 0, 100_000, 0));
    tx.consumed.push(position(&proj, 3, 0, 0, 50_000, 1));
    pay_refunds(&mut tx);
    seal(&mut tx, Some(&current));

    assert!(tx.signatories.is_empty());
    assert_eq!(tx.payouts.iter().map(|p| p.amount).sum::<u64>(), 99_000 + 49_000);

    let verdict = validator().validate(&tx).unwrap();
    assert_eq!(verdict.total_reward(), 600);
    let settlement = verdict.settlement.unwrap();
    assert_eq!(settlement.burn_amount, 9_000);
    assert_eq!(settlement.teiki_mint, 1_200 - 9_000);
    assert_eq!(settlement.successor.project_teiki, ProjectTeikiState::BurntEntirely);
    assert_eq!(settlement.successor.governor_teiki, 10 + 240);

    // Any later accrual against the flushed treasury is refused.
    let terminal = settlement.successor;
    let mut later = transition(&proj, window(40_000, 41_000), Action::Plant { cleanup: true });
    later.consumed.push(position(&proj, 5, 0, 0, 100_000, 7));
    pay_refunds(&mut later);
    seal(&mut later, None);
    later.components.push(ComponentSpend {
        kind: ComponentKind::Treasury,
        hash: TREASURY_LATEST,
    });
    later.treasury = Some(TreasuryUpdate {
        successor: TreasuryRecord {
            continuation_tag: terminal.identity(),
            ..terminal.clone()
        },
        current: terminal,
        burn_amount: 0,
        teiki_mint: 2 * i128::from(later.claimed_reward),
    });
    assert_eq!(
        validator().validate(&later),
        Err(TerminalStateError::BurntEntirely(proj.project_id).into())
    );
}

#[test]
fn migration_needs_its_token() {
    let proj = project(ProjectStatus::Active, 0);
    let held = position(&proj, 2, 0, 0, 5_000, 0);

    let mut tx = transition(&proj, window(1_000, 2_000), Action::Migrate);
    tx.produced.push(held.position.clone());
    tx.consumed.push(held);
    spend_under_v1(&mut tx, false);
    assert_eq!(
        validator().validate(&tx),
        Err(VersionError::MissingMigrationWitness(BACKING_V1).into())
    );

    spend_under_v1(&mut tx, true);
    let verdict = validator().validate(&tx).unwrap();
    assert_eq!(verdict.total_reward(), 0);
    assert!(verdict.settlement.is_none());
}

#[test]
fn migration_under_latest_versions_rejected() {
    let proj = project(ProjectStatus::Active, 0);
    let held = position(&proj, 2, 0, 0, 5_000, 0);

    let mut tx = transition(&proj, window(1_000, 2_000), Action::Migrate);
    tx.produced.push(held.position.clone());
    tx.consumed.push(held);
    assert_eq!(
        validator().validate(&tx),
        Err(VersionError::NothingToMigrate.into())
    );

    tx.components.clear();
    assert_eq!(
        validator().validate(&tx),
        Err(VersionError::UndeclaredComponent(ComponentKind::Backing).into())
    );
}

#[test]
fn treasury_chain_links_each_record_to_its_predecessor() {
    let proj = project(ProjectStatus::Active, 1);
    let mut current = TreasuryRecord::genesis(proj.project_id);

    for k in 1..=3u8 {
        let start = u64::from(k) * 2 * EPOCH;
        let mut tx = plant(&proj, window(start, start + 1));
        tx.consumed.push(position(&proj, k, 0, 0, 1_000_000, u64::from(k)));
        sign_all(&mut tx);
        seal(&mut tx, Some(&current));
    
        let verdict = validator().validate(&tx).unwrap();
        assert_eq!(verdict.total_reward(), 4_000 * u64::from(k));
        let next = verdict.successor().unwrap().clone();
        assert_eq!(next.continuation_tag, current.identity());
        current = next;
    }
    assert_eq!(current.governor_teiki, 1_600 + 3_200 + 4_800);
}

#[test]
fn transition_survives_json_transport() {
    let proj = project(ProjectStatus::Active, 1);
    let mut tx = plant(&proj, window(25_000, 26_000));
    tx.consumed.push(position(&proj, 2, 0, 0, 100_000_000, 0));
    sign_all(&mut tx);
    seal(&mut tx, Some(&TreasuryRecord::genesis(proj.project_id)));

    let json = serde_json::to_string_pretty(&tx).unwrap();
    let parsed: Transition = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, tx);
    assert!(validator().validate(&parsed).is_ok());
}

#[test]
fn unknown_component_version_rejected() {
    let proj = project(ProjectStatus::Active, 0);
    let w = window(0, 0);
    let mut tx = plant(&proj, w);
    tx.produced.push(open_position(&proj, backer(2), 10, w));
    sign_all(&mut tx);
    seal(&mut tx, None);
    tx.components[1].hash = pkh(0x42);
    assert!(matches!(
        validator().validate(&tx),
        Err(ValidationError::Version(VersionError::UnknownComponent(_)))
    ));
}
