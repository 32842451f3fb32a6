//! Gate configuration
//!
//! Parses the YAML config file into [`GateConfig`] with serde. The active
//! configuration lives in a [`SharedConfig`], which swaps the whole value
//! on reload so a decision always sees one consistent snapshot.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Placeholder replaced by the capacity in the kick message.
pub const MAX_PLACEHOLDER: &str = "{max}";

/// IP limit configuration
///
/// Keys are kebab-case in the YAML file (`max-players-per-ip`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GateConfig {
    /// Sessions allowed online from one address at once
    #[serde(default = "default_max_players_per_ip")]
    pub max_players_per_ip: u32,

    /// Permission that lets a session ignore the limit
    #[serde(default = "default_bypass_permission")]
    pub bypass_permission: String,

    /// Message sent to rejected clients; `{max}` becomes the capacity
    #[serde(default = "default_kick_message")]
    pub kick_message: String,

    /// Log every admission decision at info level
    #[serde(default)]
    pub debug: bool,

    /// Check capacity and register atomically at login instead of
    /// reading occupancy and registering in two steps
    #[serde(default)]
    pub strict_capacity: bool,

    /// Identity → granted permission names, for hosts without their
    /// own permission backend
    #[serde(default)]
    pub permissions: HashMap<String, Vec<String>>,
}

fn default_max_players_per_ip() -> u32 {
    3
}

fn default_bypass_permission() -> String {
    "bypass".to_string()
}

fn default_kick_message() -> String {
    "Only {max} players may be online from the same IP address at once!".to_string()
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_players_per_ip: default_max_players_per_ip(),
            bypass_permission: default_bypass_permission(),
            kick_message: default_kick_message(),
            debug: false,
            strict_capacity: false,
            permissions: HashMap::new(),
        }
    }
}

impl GateConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_str(&contents)
            .with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Parse configuration from a YAML string
    pub fn from_str(contents: &str) -> Result<Self> {
        // An empty file deserializes as unit, not a map.
        let config: GateConfig = if contents.trim().is_empty() {
            GateConfig::default()
        } else {
            serde_yaml::from_str(contents).context("Failed to parse YAML")?
        };

        config.validate()?;

        Ok(config)
    }

    /// Load `path`, writing the default configuration there first if the
    /// file does not exist yet.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create config dir: {}", dir.display()))?;
            }
            GateConfig::default().save(path)?;
            tracing::info!("[iplimit] [config] wrote default config to {}", path.display());
        }
        Self::from_file(path)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.max_players_per_ip > 0,
            "max-players-per-ip must be positive, got {}",
            self.max_players_per_ip
        );
        anyhow::ensure!(
            !self.kick_message.is_empty(),
            "kick-message cannot be empty"
        );
        anyhow::ensure!(
            !self.bypass_permission.is_empty(),
            "bypass-permission cannot be empty"
        );
        Ok(())
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(&self)
            .context("Failed to serialize config to YAML")?;

        fs::write(path.as_ref(), yaml)
            .with_context(|| format!("Failed to write config to {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Kick message with `{max}` replaced by `max`.
    pub fn kick_message_for(&self, max: u32) -> String {
        self.kick_message.replace(MAX_PLACEHOLDER, &max.to_string())
    }

    /// Whether `identity` was granted `permission` in the `permissions` table.
    pub fn grants(&self, identity: &str, permission: &str) -> bool {
        self.permissions
            .get(identity)
            .is_some_and(|perms| perms.iter().any(|p| p == permission))
    }
}

/// The active configuration, replaced as a whole on reload.
#[derive(Debug)]
pub struct SharedConfig {
    path: Option<PathBuf>,
    current: RwLock<Arc<GateConfig>>,
}

impl SharedConfig {
    /// Wrap a configuration that has no backing file.
    pub fn new(config: GateConfig) -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Load (or create) `path` and remember it for [`SharedConfig::reload`].
    pub fn load<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let config = GateConfig::load_or_create(&path)?;
        Ok(Self {
            path: Some(path),
            current: RwLock::new(Arc::new(config)),
        })
    }

    /// Snapshot of the active configuration.
    pub fn current(&self) -> Arc<GateConfig> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Install `config` for all subsequent decisions.
    pub fn replace(&self, config: GateConfig) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
    }

    /// Re-read the backing file. On failure the active config is kept.
    pub fn reload(&self) -> Result<Arc<GateConfig>> {
        let path = self
            .path
            .as_ref()
            .context("configuration has no backing file to reload")?;
        let config = GateConfig::load_or_create(path)?;
        self.replace(config);
        tracing::info!("[iplimit] [config] reloaded from {}", path.display());
        Ok(self.current())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
