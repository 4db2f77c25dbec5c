//! Engine configuration.
//!
//! Layered lowest precedence first: built-in defaults, an optional file
//! (YAML, TOML or JSON, picked by extension), then `POLICY_ENGINE__*`
//! environment variables with `__` separating nested keys, e.g.
//! `POLICY_ENGINE__LOGGING__LEVEL=debug`.

use crate::{
    effect::EffectPolicy,
    error::{PolicyError, Result},
    logging::LoggingConfig,
    role::DEFAULT_MAX_DEPTH,
    schema::{Schema, SchemaDefinition},
};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "POLICY_ENGINE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum membership hops followed when resolving roles
    pub max_role_depth: usize,
    /// Cache enforce decisions until the next mutation
    pub enable_cache: bool,
    /// Forward each mutation to the adapter
    pub auto_save: bool,
    /// Keep role graphs in step with role sections on every grouping mutation
    pub auto_build_role_links: bool,
    /// When false, every enforce call allows
    pub enabled: bool,
    pub effect: EffectPolicy,
    pub logging: LoggingConfig,
    /// Section layout; the classic RBAC layout when absent
    pub schema: Option<SchemaDefinition>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_role_depth: DEFAULT_MAX_DEPTH,
            enable_cache: false,
            auto_save: true,
            auto_build_role_links: true,
            enabled: true,
            effect: EffectPolicy::default(),
            logging: LoggingConfig::default(),
            schema: None,
        }
    }
}

impl EngineConfig {
    /// Defaults, then the file at `path` if given, then the environment
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }
        let config: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with the environment only
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Defaults overlaid with YAML text; the environment is not consulted
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::from_str(text, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_role_depth == 0 {
            return Err(PolicyError::Config(
                "max_role_depth must be at least 1".to_string(),
            ));
        }
        if let Some(schema) = &self.schema {
            schema.clone().build()?;
        }
        Ok(())
    }

    /// Resolve the configured section layout
    pub fn schema(&self) -> Result<Schema> {
        match &self.schema {
            Some(definition) => definition.clone().build(),
            None => Ok(Schema::rbac()),
        }
    }
}
