//! Versioned component registry.
//!
//! Each validator component is addressed through a [`MigratableRecord`]:
//! the hash of the version currently in force plus, for every superseded
//! version, the migration token that must move alongside any spend still
//! locked under it. Updating `latest` is a governance action and never
//! happens here.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use teiki_core::codec::{Datum, FromDatum, ToDatum};
use teiki_core::error::{StructuralError, VersionError};
use teiki_core::types::{AssetId, Hash256};

pub use teiki_core::types::ComponentKind;

/// A quantity of a native asset minted (positive) or burnt (negative).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AssetMovement {
    pub asset: AssetId,
    pub quantity: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MigratableRecord {
    pub latest: Hash256,
    #[serde(default)]
    pub migrations: BTreeMap<Hash256, AssetId>,
}

/// How the registry sees a component hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Current,
    Superseded(AssetId),
}

impl MigratableRecord {
    /// A record with a single version and no history.
    pub fn new(latest: Hash256) -> Self {
        Self {
            latest,
            migrations: BTreeMap::new(),
        }
    }

    /// Exactly one latest hash; every historical hash has its own token.
    pub fn validate(&self) -> Result<(), VersionError> {
        if self.migrations.contains_key(&self.latest) {
            return Err(VersionError::LatestHasMigration);
        }
        let mut seen = BTreeSet::new();
        for asset in self.migrations.values() {
            if !seen.insert(asset) {
                return Err(VersionError::DuplicateMigrationAsset);
            }
        }
        Ok(())
    }

    pub fn resolve(&self, hash: &Hash256) -> Result<Resolution, VersionError> {
        if *hash == self.latest {
            return Ok(Resolution::Current);
        }
        self.migrations
            .get(hash)
            .map(|asset| Resolution::Superseded(asset.clone()))
            .ok_or(VersionError::UnknownComponent(*hash))
    }

    /// Accept a spend under `hash` given the assets the transition moves.
    ///
    /// A superseded hash is only accepted when its migration token is minted
    /// or burnt in the same transition.
    pub fn authorize(
        &self,
        hash: &Hash256,
        movements: &[AssetMovement],
    ) -> Result<Resolution, VersionError> {
        let resolution = self.resolve(hash)?;
        if let Resolution::Superseded(asset) = &resolution {
            let witnessed = movements
                .iter()
                .any(|m| &m.asset == asset && m.quantity != 0);
            if !witnessed {
                return Err(VersionError::MissingMigrationWitness(*hash));
            }
        }
        Ok(resolution)
    }
}

impl ToDatum for MigratableRecord {
    fn to_datum(&self) -> Datum {
        Datum::record(vec![self.latest.to_datum(), self.migrations.to_datum()])
    }
}

impl FromDatum for MigratableRecord {
    fn from_datum(datum: &Datum) -> Result<Self, StructuralError> {
        let f = datum.fields(2)?;
        Ok(Self {
            latest: Hash256::from_datum(&f[0])?,
            migrations: BTreeMap::<Hash256, AssetId>::from_datum(&f[1])?,
        })
    }
}

/// Component hash a transition spends or mints under.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentSpend {
    pub kind: ComponentKind,
    pub hash: Hash256,
}

/// Component versions a transition was admitted under.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Admission {
    resolutions: BTreeMap<ComponentKind, Resolution>,
}

impl Admission {
    pub fn resolution(&self, kind: ComponentKind) -> Option<&Resolution> {
        self.resolutions.get(&kind)
    }

    /// Whether any declared component is a superseded version.
    pub fn migrates(&self) -> bool {
        self.resolutions
            .values()
            .any(|r| matches!(r, Resolution::Superseded(_)))
    }
}

/// Registry records of every component, read by reference.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ComponentRegistry {
    pub backing: MigratableRecord,
    pub proof_of_backing: MigratableRecord,
    pub treasury: MigratableRecord,
}

impl ComponentRegistry {
    pub fn record(&self, kind: ComponentKind) -> &MigratableRecord {
        match kind {
            ComponentKind::Backing => &self.backing,
            ComponentKind::ProofOfBacking => &self.proof_of_backing,
            ComponentKind::Treasury => &self.treasury,
        }
    }

    pub fn validate(&self) -> Result<(), VersionError> {
        self.backing.validate()?;
        self.proof_of_backing.validate()?;
        self.treasury.validate()
    }

    /// Gate every component spend of a transition.
    ///
    /// Each declared kind appears once and its hash must pass
    /// [`MigratableRecord::authorize`]. Every kind in `required` must be
    /// declared: the transition cannot skip the gate by leaving a component
    /// it goes through unlisted.
    pub fn authorize_all(
        &self,
        spends: &[ComponentSpend],
        required: &BTreeSet<ComponentKind>,
        movements: &[AssetMovement],
    ) -> Result<Admission, VersionError> {
        let mut resolutions = BTreeMap::new();
        for spend in spends {
            let resolution = self.record(spend.kind).authorize(&spend.hash, movements)?;
            if resolutions.insert(spend.kind, resolution).is_some() {
                return Err(VersionError::DuplicateComponent(spend.kind));
            }
        }
        if let Some(kind) = required.iter().find(|k| !resolutions.contains_key(*k)) {
            return Err(VersionError::UndeclaredComponent(*kind));
        }
        Ok(Admission { resolutions })
    }
}

impl ToDatum for ComponentRegistry {
    fn to_datum(&self) -> Datum {
        Datum::record(vec![
            self.backing.to_datum(),
            self.proof_of_backing.to_datum(),
            self.treasury.to_datum(),
        ])
    }
}

impl FromDatum for ComponentRegistry {
    fn from_datum(datum: &Datum) -> Result<Self, StructuralError> {
        let f = datum.fields(3)?;
        Ok(Self {
            backing: MigratableRecord::from_datum(&f[0])?,
            proof_of_backing: MigratableRecord::from_datum(&f[1])?,
            treasury: MigratableRecord::from_datum(&f[2])?,
        })
    }
}
