//! Cross-crate test suite for Teiki.
//!
//! Drives whole transitions through [`teiki_validator::TransitionValidator`]
//! the way an external submission layer would, then tampers with them from
//! an attacker's side. Every accounting invariant must hold for both.

pub mod helpers;
