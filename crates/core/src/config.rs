//! Config file parsing for `~/.config/folio/config.toml`.
//!
//! Use `read_options_from_config`, `render_options_from_config` and
//! `acquire_options_from_config` to build options from the loaded config so
//! security limits and attempt bounds apply everywhere.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::acquire::{AcquireOptions, DEFAULT_MAX_ATTEMPTS, DEFAULT_USER_AGENT};
use crate::readers::ReadOptions;
use crate::security::SecurityLimits;
use crate::writers::RenderOptions;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub acquire: AcquireConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquireConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    pub cache_dir: Option<String>,
    pub user_agent: Option<String>,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            cache_dir: None,
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub suppress_images: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub max_entry_size_mb: Option<u64>,
    pub max_compression_ratio: Option<u64>,
    pub max_entries: Option<u64>,
    pub max_nesting_depth: Option<u32>,
}

/// Load config from the default path. A missing or unparsable file yields
/// the defaults.
pub fn load_config() -> AppConfig {
    let Some(path) = config_path() else {
        return AppConfig::default();
    };

    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(_) => return AppConfig::default(),
    };

    match toml::from_str::<AppConfig>(&content) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!("ignoring invalid config {}: {e}", path.display());
            AppConfig::default()
        }
    }
}

/// Return the default config file path (for init and show).
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut p| {
        p.push("folio");
        p.push("config.toml");
        p
    })
}

/// Build security limits from config. Uses defaults for any unset values.
pub fn security_limits_from_config(c: &SecurityConfig) -> SecurityLimits {
    let mut limits = SecurityLimits::default();
    if let Some(mb) = c.max_entry_size_mb {
        limits.max_entry_size_bytes = mb.saturating_mul(1024).saturating_mul(1024);
    }
    if let Some(r) = c.max_compression_ratio {
        limits.max_compression_ratio = r;
    }
    if let Some(n) = c.max_entries {
        limits.max_entry_count = n;
    }
    if let Some(d) = c.max_nesting_depth {
        limits.max_nesting_depth = d;
    }
    limits
}

pub fn read_options_from_config(cfg: &AppConfig) -> ReadOptions {
    ReadOptions {
        security: security_limits_from_config(&cfg.security),
    }
}

pub fn render_options_from_config(cfg: &AppConfig) -> RenderOptions {
    RenderOptions {
        suppress_images: cfg.render.suppress_images,
    }
}

/// Build acquisition options. An attempt bound of zero is raised to one.
pub fn acquire_options_from_config(cfg: &AppConfig) -> AcquireOptions {
    AcquireOptions {
        max_attempts: cfg.acquire.max_attempts.max(1),
        cache_dir: cfg.acquire.cache_dir.as_ref().map(PathBuf::from),
        user_agent: cfg
            .acquire
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        security: security_limits_from_config(&cfg.security),
    }
}
