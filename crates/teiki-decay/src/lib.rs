//! # teiki-decay: Project teiki decay engine.
//!
//! All calculations use integer arithmetic only for determinism.
//!
//! A project's accumulated teiki decays geometrically: after `n` whole epochs
//! the engine raises the per-epoch retention ratio to the `n`-th power with
//! saturating fractions (see [`teiki_core::fraction`]) and splits the balance
//! into what remains and what is burnt.

pub mod engine;

pub use engine::TeikiDecayEngine;
