//! # teiki-core
//! Foundation types, datum codec and traits for the Teiki protocol.

pub mod codec;
pub mod constants;
pub mod error;
pub mod fraction;
pub mod params;
pub mod traits;
pub mod types;
