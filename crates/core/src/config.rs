//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Externally visible base URL used when building retrieve URLs
    /// (e.g., "https://pacs.example.com"). Falls back to the `Host` header.
    #[serde(default)]
    pub public_base_url: Option<String>,
    /// Maximum accepted request body size in bytes.
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// SECURITY: When enabled, ensure this endpoint is network-restricted
    /// to authorized Prometheus scraper IPs only at the infrastructure level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_request_size() -> usize {
    2 * 1024 * 1024 * 1024 // 2 GiB
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_base_url: None,
            max_request_size: default_max_request_size(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_request_size == 0 {
            return Err("server.max_request_size must be greater than zero".to_string());
        }
        if let Some(base) = &self.public_base_url
            && !(base.starts_with("http://") || base.starts_with("https://"))
        {
            return Err(format!(
                "server.public_base_url must be an http(s) URL, got {base:?}"
            ));
        }
        Ok(())
    }
}

/// Instance storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for stored instances.
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/archive"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::Filesystem { path } if path.as_os_str().is_empty() => {
                Err("filesystem storage requires a non-empty path".to_string())
            }
            StorageConfig::Filesystem { .. } => Ok(()),
        }
    }
}

/// STOW-RS ingest configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StowConfig {
    /// Root below which each request creates its private bulk data spool directory.
    #[serde(default = "default_spool_directory")]
    pub spool_directory: PathBuf,
}

fn default_spool_directory() -> PathBuf {
    std::env::temp_dir().join("stow-spool")
}

impl Default for StowConfig {
    fn default() -> Self {
        Self {
            spool_directory: default_spool_directory(),
        }
    }
}

/// A network application entity that accepts STOW-RS requests.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityConfig {
    /// Application entity title, as used in `/aets/{aet}/rs/...`.
    pub aet: String,
    /// Whether the entity currently accepts requests (default: true).
    #[serde(default = "default_installed")]
    pub installed: bool,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

fn default_installed() -> bool {
    true
}

impl EntityConfig {
    /// Create an installed entity with the given title.
    pub fn new(aet: impl Into<String>) -> Self {
        Self {
            aet: aet.into(),
            installed: true,
            description: None,
        }
    }

    /// Validate an application entity title.
    ///
    /// Titles are 1-16 characters of printable ASCII without backslash,
    /// and are used verbatim as path segments.
    pub fn validate(&self) -> Result<(), String> {
        let aet = self.aet.as_str();
        if aet.is_empty() || aet.len() > 16 {
            return Err(format!("AE title {aet:?} must be 1-16 characters"));
        }
        if aet.trim() != aet {
            return Err(format!("AE title {aet:?} has leading or trailing spaces"));
        }
        if aet
            .chars()
            .any(|c| !c.is_ascii_graphic() && c != ' ' || c == '\\' || c == '/')
        {
            return Err(format!("AE title {aet:?} contains invalid characters"));
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Ingest configuration.
    #[serde(default)]
    pub stow: StowConfig,
    /// Configured application entities.
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
}

impl AppConfig {
    /// Validate the whole configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.storage.validate()?;

        let mut seen = HashSet::new();
        for entity in &self.entities {
            entity.validate()?;
            if !seen.insert(entity.aet.as_str()) {
                return Err(format!("duplicate entity {:?}", entity.aet));
            }
        }
        Ok(())
    }

    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Registers one installed entity `DCM4CHEE`
    /// and one uninstalled entity `OFFLINE`.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig {
                public_base_url: Some("http://localhost:8080".to_string()),
                ..ServerConfig::default()
            },
            storage: StorageConfig::default(),
            stow: StowConfig::default(),
            entities: vec![
                EntityConfig::new("DCM4CHEE"),
                EntityConfig {
                    aet: "OFFLINE".to_string(),
                    installed: false,
                    description: Some("Uninstalled test entity".to_string()),
                },
            ],
        }
    }
}
