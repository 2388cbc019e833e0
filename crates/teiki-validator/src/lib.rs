//! # teiki-validator: Transition rules of the Teiki protocol.
//!
//! Every function here is a pure predicate or derivation over the records a
//! transition consumes and produces. [`TransitionValidator`] is the entry
//! point; the modules below are usable on their own:
//!
//! - [`backing`]: position classification and batch rules
//! - [`proof_of_backing`]: certificate and reward accounting
//! - [`treasury`]: decay, flush and governor share of the project treasury
//! - [`registry`]: component versioning and migration gate

pub mod backing;
pub mod proof_of_backing;
pub mod registry;
pub mod transition;
pub mod treasury;

pub use proof_of_backing::{AccrualClaim, BurnAction, Issuance, ProofOfBackingIssuer};
pub use registry::{ComponentRegistry, MigratableRecord};
pub use transition::{Action, Transition, TransitionValidator, Verdict};
pub use treasury::{Settlement, TreasuryReconciler, TreasuryUpdate};
