//! Server configuration, loaded from TOML.
//!
//! ```toml
//! bind = "0.0.0.0:8080"
//! base = "/atom"
//! log  = "info,abdera=debug"
//! max_body = 1048576
//!
//! [provider]
//! page_size = 20
//! max_age   = 60
//!
//! [provider.properties]
//! author = "ada"
//!
//! [[workspace]]
//! title = "Blog"
//!
//! [[workspace.collection]]
//! href    = "posts"
//! title   = "Posts"
//! accepts = ["application/atom+xml;type=entry"]
//!
//! [[workspace.collection]]
//! href  = "images"
//! title = "Images"
//! media = true
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::adapters::MemoryCollection;
use crate::middleware::{MethodOverride, Trace};
use crate::provider::Provider;
use crate::workspace::WorkspaceInfo;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind: String,
    /// Path the provider is mounted on.
    pub base: String,
    /// Default `tracing` filter directive; `RUST_LOG` takes precedence.
    pub log: String,
    /// Largest request body accepted, in bytes.
    pub max_body: usize,
    pub provider: ProviderConfig,
    #[serde(rename = "workspace")]
    pub workspaces: Vec<WorkspaceConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_owned(),
            base: "/".to_owned(),
            log: "info".to_owned(),
            max_body: crate::server::DEFAULT_MAX_BODY,
            provider: ProviderConfig::default(),
            workspaces: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Entries per feed page when the client does not ask for a count.
    pub page_size: usize,
    /// `max-age` of entry responses in seconds; 0 means `no-cache`.
    pub max_age: u64,
    pub properties: HashMap<String, String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self { page_size: 20, max_age: 0, properties: HashMap::new() }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub title: String,
    #[serde(rename = "collection")]
    pub collections: Vec<CollectionConfig>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    pub href: String,
    pub title: String,
    /// `app:accept` media ranges. Empty means Atom entries, plus `*/*` for
    /// media collections.
    pub accepts: Vec<String>,
    /// Accept media resources alongside entries.
    pub media: bool,
}

impl ServerConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base.starts_with('/') {
            return Err(ConfigError::Invalid(format!("base `{}` must start with `/`", self.base)));
        }
        if self.workspaces.is_empty() {
            return Err(ConfigError::Invalid("at least one [[workspace]] is required".to_owned()));
        }
        if self.max_body == 0 {
            return Err(ConfigError::Invalid("max_body must be positive".to_owned()));
        }
        if self.provider.page_size == 0 {
            return Err(ConfigError::Invalid("provider.page_size must be positive".to_owned()));
        }
        let mut seen = HashSet::new();
        for collection in self.workspaces.iter().flat_map(|w| &w.collections) {
            let href = collection.href.trim_matches('/');
            if href.is_empty() {
                return Err(ConfigError::Invalid(format!("collection `{}` has an empty href", collection.title)));
            }
            if !seen.insert(href) {
                return Err(ConfigError::Invalid(format!("duplicate collection href `{href}`")));
            }
        }
        Ok(())
    }

    /// A provider serving one [`MemoryCollection`] per configured
    /// collection, with request tracing and method overrides enabled.
    pub fn build_provider(&self) -> crate::Result<Provider> {
        let builder = self.workspaces.iter().fold(Provider::builder("/"), |builder, workspace| {
            let info = workspace.collections.iter().fold(WorkspaceInfo::new(workspace.title.as_str()), |info, c| {
                info.with_collection(Arc::new(MemoryCollection::from_config(c, &self.provider)))
            });
            builder.workspace(info)
        });
        builder
            .properties(self.provider.properties.clone())
            .filter(Trace)
            .filter(MethodOverride::default())
            .build()
    }
}

/// Reads, parses and validates the config file at `path`.
pub fn load(path: impl AsRef<Path>) -> Result<ServerConfig, ConfigError> {
    let source = fs::read_to_string(path)?;
    ServerConfig::from_toml(&source)
}
