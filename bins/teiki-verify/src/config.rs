//! Reference inputs for the verifier: protocol parameters and the component
//! registry.
//!
//! Loaded from an optional TOML file, then overridden by `TEIKI_`-prefixed
//! environment variables, nested keys separated by `__`
//! (e.g. `TEIKI_PARAMS__EPOCH_LENGTH=432000000`).

use std::path::Path;

use anyhow::{Context, Result};
use ::config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use teiki_core::params::ProtocolParams;
use teiki_validator::ComponentRegistry;

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyConfig {
    #[serde(default)]
    pub params: ProtocolParams,
    pub registry: ComponentRegistry,
}

impl VerifyConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix("TEIKI")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("reading verifier configuration")?;

        let config: VerifyConfig = settings
            .try_deserialize()
            .context("parsing verifier configuration")?;
        config.params.validate().context("invalid protocol parameters")?;
        config.registry.validate().context("invalid component registry")?;
        Ok(config)
    }
}
