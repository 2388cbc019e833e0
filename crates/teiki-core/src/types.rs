//! Protocol records: backing positions, plants, project and treasury state.
//!
//! Every record is a value type. Transitions consume records whole and
//! produce new ones; nothing here is ever mutated in place once recorded.
//! All amounts are in the smallest teiki/lovelace unit, all times are POSIX
//! milliseconds.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::{self, Datum, FromDatum, ToDatum};
use crate::constants::GENESIS_CONTINUATION;
use crate::error::StructuralError;

/// A 32-byte hash value.
///
/// Used for project ids, credential hashes, component (validator) hashes
/// and content identities (BLAKE3 over the canonical encoding).
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
#[serde(try_from = "String", into = "String")]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash (32 zero bytes).
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, StructuralError> {
        let bytes = hex::decode(s).map_err(|_| StructuralError::UnexpectedShape {
            expected: "hex-encoded hash",
        })?;
        Self::try_from(bytes.as_slice())
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Hash256 {
    type Error = StructuralError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| StructuralError::InvalidHashLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl TryFrom<String> for Hash256 {
    type Error = StructuralError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<Hash256> for String {
    fn from(h: Hash256) -> Self {
        h.to_string()
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl ToDatum for Hash256 {
    fn to_datum(&self) -> Datum {
        Datum::Bytes(self.0.to_vec())
    }
}

impl FromDatum for Hash256 {
    fn from_datum(datum: &Datum) -> Result<Self, StructuralError> {
        Self::try_from(datum.as_bytes()?)
    }
}

/// Identifier of an output in the external record store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputRef {
    /// Transaction that created the output.
    pub tx_id: Hash256,
    /// Index of the output within that transaction.
    pub index: u64,
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_id, self.index)
    }
}

impl ToDatum for OutputRef {
    fn to_datum(&self) -> Datum {
        Datum::record(vec![self.tx_id.to_datum(), self.index.to_datum()])
    }
}

impl FromDatum for OutputRef {
    fn from_datum(datum: &Datum) -> Result<Self, StructuralError> {
        let f = datum.fields(2)?;
        Ok(Self {
            tx_id: Hash256::from_datum(&f[0])?,
            index: u64::from_datum(&f[1])?,
        })
    }
}

/// Who may authorize spending: a key hash or a script hash.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Credential {
    PubKey(Hash256),
    Script(Hash256),
}

impl Credential {
    pub fn hash(&self) -> &Hash256 {
        match self {
            Credential::PubKey(h) | Credential::Script(h) => h,
        }
    }
}

impl ToDatum for Credential {
    fn to_datum(&self) -> Datum {
        match self {
            Credential::PubKey(h) => Datum::variant(0, vec![h.to_datum()]),
            Credential::Script(h) => Datum::variant(1, vec![h.to_datum()]),
        }
    }
}

impl FromDatum for Credential {
    fn from_datum(datum: &Datum) -> Result<Self, StructuralError> {
        match datum.as_constr()? {
            (0, [h]) => Ok(Credential::PubKey(Hash256::from_datum(h)?)),
            (1, [h]) => Ok(Credential::Script(Hash256::from_datum(h)?)),
            (index, _) => Err(StructuralError::UnknownVariant { type_name: "Credential", index }),
        }
    }
}

/// Address a backer stakes from and is paid back to.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackerAddress {
    pub payment: Credential,
    pub staking: Option<Credential>,
}

impl BackerAddress {
    pub fn from_key(key_hash: Hash256) -> Self {
        Self {
            payment: Credential::PubKey(key_hash),
            staking: None,
        }
    }
}

impl ToDatum for BackerAddress {
    fn to_datum(&self) -> Datum {
        Datum::record(vec![self.payment.to_datum(), self.staking.to_datum()])
    }
}

impl FromDatum for BackerAddress {
    fn from_datum(datum: &Datum) -> Result<Self, StructuralError> {
        let f = datum.fields(2)?;
        Ok(Self {
            payment: Credential::from_datum(&f[0])?,
            staking: Option::<Credential>::from_datum(&f[1])?,
        })
    }
}

/// Funds locked by a backer against a project.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BackingPosition {
    pub project_id: Hash256,
    pub backer_address: BackerAddress,
    /// When the funds were locked (end of the staking transaction's window).
    pub staked_at: u64,
    /// Project milestone reached at staking time.
    pub milestone_backed: u16,
    pub amount: u64,
}

impl ToDatum for BackingPosition {
    fn to_datum(&self) -> Datum {
        Datum::record(vec![
            self.project_id.to_datum(),
            self.backer_address.to_datum(),
            self.staked_at.to_datum(),
            self.milestone_backed.to_datum(),
            self.amount.to_datum(),
        ])
    }
}

impl FromDatum for BackingPosition {
    fn from_datum(datum: &Datum) -> Result<Self, StructuralError> {
        let f = datum.fields(5)?;
        Ok(Self {
            project_id: Hash256::from_datum(&f[0])?,
            backer_address: BackerAddress::from_datum(&f[1])?,
            staked_at: u64::from_datum(&f[2])?,
            milestone_backed: u16::from_datum(&f[3])?,
            amount: u64::from_datum(&f[4])?,
        })
    }
}

/// Certificate of a closed backing position.
///
/// An immature plant is a *flower*; once its reward is claimed it becomes a
/// *fruit*, the same plant with `is_matured` set.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Plant {
    pub is_matured: bool,
    pub backing_output_id: OutputRef,
    pub backing_amount: u64,
    pub unstaked_at: u64,
    pub project_id: Hash256,
    pub backer_address: BackerAddress,
    pub staked_at: u64,
    pub milestone_backed: u16,
}

impl Plant {
    /// Content identity, used as certificate token name and claim ordering key.
    pub fn identity(&self) -> Hash256 {
        codec::identity(self)
    }

    pub fn is_flower(&self) -> bool {
        !self.is_matured
    }

    /// The fruit this plant turns into once claimed.
    pub fn into_fruit(self) -> Plant {
        Plant {
            is_matured: true,
            ..self
        }
    }

    /// Time the underlying position was held.
    pub fn elapsed(&self) -> Option<u64> {
        self.unstaked_at.checked_sub(self.staked_at)
    }
}

impl ToDatum for Plant {
    fn to_datum(&self) -> Datum {
        Datum::record(vec![
            self.is_matured.to_datum(),
            self.backing_output_id.to_datum(),
            self.backing_amount.to_datum(),
            self.unstaked_at.to_datum(),
            self.project_id.to_datum(),
            self.backer_address.to_datum(),
            self.staked_at.to_datum(),
            self.milestone_backed.to_datum(),
        ])
    }
}

impl FromDatum for Plant {
    fn from_datum(datum: &Datum) -> Result<Self, StructuralError> {
        let f = datum.fields(8)?;
        Ok(Self {
            is_matured: bool::from_datum(&f[0])?,
            backing_output_id: OutputRef::from_datum(&f[1])?,
            backing_amount: u64::from_datum(&f[2])?,
            unstaked_at: u64::from_datum(&f[3])?,
            project_id: Hash256::from_datum(&f[4])?,
            backer_address: BackerAddress::from_datum(&f[5])?,
            staked_at: u64::from_datum(&f[6])?,
            milestone_backed: u16::from_datum(&f[7])?,
        })
    }
}

/// Lifecycle status of a project.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProjectStatus {
    Active,
    PreClosed,
    PreDelisted,
    Closed,
    Delisted,
}

impl ProjectStatus {
    const ALL: [ProjectStatus; 5] = [
        ProjectStatus::Active,
        ProjectStatus::PreClosed,
        ProjectStatus::PreDelisted,
        ProjectStatus::Closed,
        ProjectStatus::Delisted,
    ];

    /// Statuses in which anyone may close the remaining positions.
    pub fn allows_cleanup(&self) -> bool {
        matches!(
            self,
            ProjectStatus::PreClosed | ProjectStatus::Closed | ProjectStatus::Delisted
        )
    }

    /// Terminal delisting: the project treasury is flushed instead of decayed.
    pub fn is_delisted(&self) -> bool {
        matches!(self, ProjectStatus::Delisted)
    }
}

impl ToDatum for ProjectStatus {
    fn to_datum(&self) -> Datum {
        let index = match self {
            ProjectStatus::Active => 0,
            ProjectStatus::PreClosed => 1,
            ProjectStatus::PreDelisted => 2,
            ProjectStatus::Closed => 3,
            ProjectStatus::Delisted => 4,
        };
        Datum::variant(index, Vec::new())
    }
}

impl FromDatum for ProjectStatus {
    fn from_datum(datum: &Datum) -> Result<Self, StructuralError> {
        match datum.as_constr()? {
            (index, []) if (index as usize) < Self::ALL.len() => Ok(Self::ALL[index as usize]),
            (index, _) => Err(StructuralError::UnknownVariant { type_name: "ProjectStatus", index }),
        }
    }
}

/// Read-only view of a project, supplied as a reference input.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ProjectSnapshot {
    pub project_id: Hash256,
    pub status: ProjectStatus,
    pub milestone_reached: u16,
}

impl ToDatum for ProjectSnapshot {
    fn to_datum(&self) -> Datum {
        Datum::record(vec![
            self.project_id.to_datum(),
            self.status.to_datum(),
            self.milestone_reached.to_datum(),
        ])
    }
}

impl FromDatum for ProjectSnapshot {
    fn from_datum(datum: &Datum) -> Result<Self, StructuralError> {
        let f = datum.fields(3)?;
        Ok(Self {
            project_id: Hash256::from_datum(&f[0])?,
            status: ProjectStatus::from_datum(&f[1])?,
            milestone_reached: u16::from_datum(&f[2])?,
        })
    }
}

/// Project-side decaying teiki balance.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectTeikiState {
    Empty,
    BurntPeriodically { available: u64, last_burn_at: u64 },
    /// Terminal: the balance was flushed after delisting.
    BurntEntirely,
}

impl ToDatum for ProjectTeikiState {
    fn to_datum(&self) -> Datum {
        match self {
            ProjectTeikiState::Empty => Datum::variant(0, Vec::new()),
            ProjectTeikiState::BurntPeriodically {
                available,
                last_burn_at,
            } => Datum::variant(1, vec![available.to_datum(), last_burn_at.to_datum()]),
            ProjectTeikiState::BurntEntirely => Datum::variant(2, Vec::new()),
        }
    }
}

impl FromDatum for ProjectTeikiState {
    fn from_datum(datum: &Datum) -> Result<Self, StructuralError> {
        match datum.as_constr()? {
            (0, []) => Ok(ProjectTeikiState::Empty),
            (1, [available, last_burn_at]) => Ok(ProjectTeikiState::BurntPeriodically {
                available: u64::from_datum(available)?,
                last_burn_at: u64::from_datum(last_burn_at)?,
            }),
            (2, []) => Ok(ProjectTeikiState::BurntEntirely),
            (index, _) => Err(StructuralError::UnknownVariant {
                type_name: "ProjectTeikiState",
                index,
            }),
        }
    }
}

/// Per-project treasury: governor share plus the decaying project balance.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TreasuryRecord {
    pub project_id: Hash256,
    pub governor_teiki: u64,
    pub project_teiki: ProjectTeikiState,
    /// Identity of the record this one replaced.
    pub continuation_tag: Hash256,
}

impl TreasuryRecord {
    /// The first treasury record of a project.
    pub fn genesis(project_id: Hash256) -> Self {
        Self {
            project_id,
            governor_teiki: 0,
            project_teiki: ProjectTeikiState::Empty,
            continuation_tag: Hash256(GENESIS_CONTINUATION),
        }
    }

    pub fn identity(&self) -> Hash256 {
        codec::identity(self)
    }
}

impl ToDatum for TreasuryRecord {
    fn to_datum(&self) -> Datum {
        Datum::record(vec![
            self.project_id.to_datum(),
            self.governor_teiki.to_datum(),
            self.project_teiki.to_datum(),
            self.continuation_tag.to_datum(),
        ])
    }
}

impl FromDatum for TreasuryRecord {
    fn from_datum(datum: &Datum) -> Result<Self, StructuralError> {
        let f = datum.fields(4)?;
        Ok(Self {
            project_id: Hash256::from_datum(&f[0])?,
            governor_teiki: u64::from_datum(&f[1])?,
            project_teiki: ProjectTeikiState::from_datum(&f[2])?,
            continuation_tag: Hash256::from_datum(&f[3])?,
        })
    }
}

/// Which validator component a spend or mint goes through.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentKind {
    Backing,
    ProofOfBacking,
    Treasury,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentKind::Backing => "backing",
            ComponentKind::ProofOfBacking => "proof-of-backing",
            ComponentKind::Treasury => "treasury",
        };
        f.write_str(name)
    }
}

/// A native asset: minting policy plus token name.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId {
    pub policy_id: Hash256,
    #[serde(with = "hex_bytes")]
    pub asset_name: Vec<u8>,
}

impl ToDatum for AssetId {
    fn to_datum(&self) -> Datum {
        Datum::record(vec![
            self.policy_id.to_datum(),
            Datum::Bytes(self.asset_name.clone()),
        ])
    }
}

impl FromDatum for AssetId {
    fn from_datum(datum: &Datum) -> Result<Self, StructuralError> {
        let f = datum.fields(2)?;
        Ok(Self {
            policy_id: Hash256::from_datum(&f[0])?,
            asset_name: f[1].as_bytes()?.to_vec(),
        })
    }
}

/// Validity interval of a proposed transition, in POSIX milliseconds.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: u64,
    pub end: u64,
}

impl TimeWindow {
    pub fn new(start: u64, end: u64) -> Result<Self, StructuralError> {
        let window = Self { start, end };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<(), StructuralError> {
        if self.start > self.end {
            return Err(StructuralError::InvalidWindow {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
