//! Protocol constants. All teiki amounts are in the smallest unit; all ratios
//! are parts-per-million of [`RATIO_MULTIPLIER`].

/// Denominator for every ppm ratio (burn rate, governor share).
///
/// # Examples
///
/// ```
/// use teiki_core::constants::RATIO_MULTIPLIER;
/// // 60% expressed in ppm
/// assert_eq!(600_000 * 100 / RATIO_MULTIPLIER, 60);
/// ```
pub const RATIO_MULTIPLIER: u64 = 1_000_000;

/// Upper bound on `numerator + denominator` of every [`Fraction`](crate::fraction::Fraction)
/// produced by multiplication.
///
/// Chosen so that `LIMIT^3` fits in a `u128`: a product of two bounded
/// fractions (`<= LIMIT^2`) can be rescaled by `LIMIT` without overflow.
pub const FRACTION_LIMIT: u128 = 1_000_000_000_000;

/// Teiki minted per unit of reward while the project treasury decays periodically.
pub const PERIODIC_MINT_FACTOR: u64 = 3;

/// Teiki minted per unit of reward when the project treasury is flushed.
pub const FLUSH_MINT_FACTOR: u64 = 2;

/// Maximum nesting depth accepted by the datum decoder.
pub const MAX_DATUM_DEPTH: usize = 64;

/// Maximum byte length of an encoded integer (sign included).
///
/// Wider integers are valid on the wire but do not fit the `i128` the engine
/// computes with.
pub const MAX_INT_BYTES: usize = 16;

/// Continuation tag of the first treasury record of a project.
pub const GENESIS_CONTINUATION: [u8; 32] = [0u8; 32];

/// Default epoch length: 5 days in milliseconds.
pub const DEFAULT_EPOCH_LENGTH_MS: u64 = 5 * 24 * 60 * 60 * 1000;

/// Default teiki coefficient.
pub const DEFAULT_TEIKI_COEFFICIENT: u64 = 500;

/// Default project teiki burn rate (ppm per epoch).
pub const DEFAULT_PROJECT_TEIKI_BURN_RATE: u64 = 600_000;

/// Default governor share of every reward (ppm).
pub const DEFAULT_GOVERNOR_SHARE_RATIO: u64 = 400_000;

/// Default flat deduction per position taken by a third-party cleaner.
pub const DEFAULT_DISCOUNT_CENT_PRICE: u64 = 10_000;
