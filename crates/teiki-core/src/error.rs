//! Error types for the Teiki protocol.
//!
//! One enum per failure category. Every check in the engine is a predicate;
//! the first one that fails rejects the whole transition and surfaces here.
use thiserror::Error;

use crate::types::{ComponentKind, Hash256, ProjectStatus};

/// Missing or malformed record encoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("unexpected end of input")] UnexpectedEof,
    #[error("unknown datum tag: {0:#04x}")] UnknownTag(u8),
    #[error("{0} trailing bytes after datum")] TrailingBytes(usize),
    #[error("integer of {0} bytes exceeds 128 bits")] IntegerTooWide(usize),
    #[error("integer encoding is not minimal")] NonMinimalInteger,
    #[error("datum nested deeper than {0}")] NestingTooDeep(usize),
    #[error("length prefix overflow")] LengthOverflow,
    #[error("expected {expected}")] UnexpectedShape { expected: &'static str },
    #[error("expected {expected} fields, got {got}")] WrongFieldCount { expected: usize, got: usize },
    #[error("hash must be 32 bytes, got {0}")] InvalidHashLength(usize),
    #[error("integer out of range for {0}")] IntegerOutOfRange(&'static str),
    #[error("unknown {type_name} variant {index}")] UnknownVariant { type_name: &'static str, index: u64 },
    #[error("transition consumes and produces nothing")] EmptyBatch,
    #[error("invalid validity window: start {start} > end {end}")] InvalidWindow { start: u64, end: u64 },
}

/// A computed value disagrees with the proposed one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("claimed reward {claimed}, computed {computed}")] RewardMismatch { claimed: u64, computed: u64 },
    #[error("proposed burn {proposed}, required {required}")] BurnMismatch { proposed: u64, required: u64 },
    #[error("proposed teiki mint {proposed}, required {required}")] MintMismatch { proposed: i128, required: i128 },
    #[error("certificate {identity}: minted {got}, expected {expected}")] CertificateMismatch { identity: Hash256, expected: i64, got: i64 },
    #[error("seed markers: minted {got}, expected {expected}")] SeedMismatch { expected: i64, got: i64 },
    #[error("withered markers: minted {got}, expected {expected}")] WitheredMarkerMismatch { expected: i64, got: i64 },
    #[error("record belongs to project {got}, expected {expected}")] ProjectMismatch { expected: Hash256, got: Hash256 },
    #[error("batch mixes positions of different backers")] MixedBackers,
    #[error("new position staked at {got}, expected {expected}")] StakedAtMismatch { expected: u64, got: u64 },
    #[error("new position backs milestone {got}, expected {expected}")] MilestoneMismatch { expected: u16, got: u16 },
    #[error("milestone {milestone} outside the {count} configured milestones")] UnknownMilestone { milestone: u16, count: usize },
    #[error("position amount must be positive")] ZeroAmount,
    #[error("project is {0:?}, new positions require Active")] ProjectNotActive(ProjectStatus),
    #[error("cleanup not allowed while project is {0:?}")] CleanupNotAllowed(ProjectStatus),
    #[error("cleanup batch still produces live positions")] PartialCleanup,
    #[error("backer payout {paid} below required {required}")] PayoutShortfall { required: u64, paid: u64 },
    #[error("position staked at {staked_at} after unstake time {unstaked_at}")] StakedInFuture { staked_at: u64, unstaked_at: u64 },
    #[error("flower {index} is not strictly below its predecessor")] FlowerOrder { index: usize },
    #[error("flower {0} is already a fruit")] AlreadyMatured(Hash256),
    #[error("flower {0} has not matured")] FlowerNotMature(Hash256),
    #[error("flower {0} was held for less than one epoch")] FlowerWithered(Hash256),
    #[error("claim batch is empty")] EmptyClaim,
    #[error("reward claim must not touch backing positions")] UnexpectedPositions,
    #[error("migration must not mint or burn certificates")] MigrationHasEffect,
    #[error("successor treasury record differs from the derived one")] SuccessorMismatch,
    #[error("continuation tag {got}, expected {expected}")] ContinuationMismatch { expected: Hash256, got: Hash256 },
    #[error("last burn at {last_burn_at} is after {now}")] StaleBurnTimestamp { last_burn_at: u64, now: u64 },
    #[error("neither reward nor burn: nothing to settle")] NothingToSettle,
    #[error("flush requires a periodically burnt treasury")] FlushNotAllowed,
    #[error("reward {0} accrued without a treasury update")] MissingTreasuryUpdate(u64),
}

/// Missing signature or credential for the branch taken.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("missing signature from {0}")] MissingSignature(Hash256),
    #[error("missing script witness {0}")] MissingScriptWitness(Hash256),
}

/// Spend against a component version the registry does not endorse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("unknown component hash {0}")] UnknownComponent(Hash256),
    #[error("superseded component {0} spent without migration witness")] MissingMigrationWitness(Hash256),
    #[error("latest hash also listed as a migration")] LatestHasMigration,
    #[error("migration asset shared by two hashes")] DuplicateMigrationAsset,
    #[error("{0} component used without declaring its version")] UndeclaredComponent(ComponentKind),
    #[error("{0} component version declared more than once")] DuplicateComponent(ComponentKind),
    #[error("migration spends nothing under a superseded component")] NothingToMigrate,
}

/// Attempt to move a project treasury out of its terminal state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TerminalStateError {
    #[error("project {0} teiki already burnt entirely")] BurntEntirely(Hash256),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArithmeticError {
    #[error("arithmetic overflow")] Overflow,
    #[error("division by zero")] DivisionByZero,
    #[error("ratio {0} exceeds the multiplier")] RateOutOfRange(u64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamsError {
    #[error("epoch length must be positive")] ZeroEpochLength,
    #[error("teiki coefficient must be positive")] ZeroCoefficient,
    #[error("{name} = {value} exceeds the ratio multiplier")] RatioOutOfRange { name: &'static str, value: u64 },
    #[error("milestones must be strictly increasing")] MilestonesNotIncreasing,
}

/// Rejection reason for a proposed transition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error(transparent)] Structural(#[from] StructuralError),
    #[error(transparent)] Invariant(#[from] InvariantViolation),
    #[error(transparent)] Authorization(#[from] AuthorizationError),
    #[error(transparent)] Version(#[from] VersionError),
    #[error(transparent)] TerminalState(#[from] TerminalStateError),
    #[error(transparent)] Arithmetic(#[from] ArithmeticError),
    #[error(transparent)] Params(#[from] ParamsError),
}
