//! Config file discovery and loading.
//!
//! Resolution order (first match wins):
//! 1. Explicit path (`--config`)
//! 2. `BFFGATE_CONFIG` environment variable
//! 3. `./bffgate.toml`
//!
//! With no file the built-in defaults are used. Environment overrides
//! (`BFFGATE_CLIENT_SECRET`, ...) are applied on top in every case.

use std::path::{Path, PathBuf};

use crate::{ConfigError, GatewayConfig, Result};

/// Default config filename in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "bffgate.toml";

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "BFFGATE_CONFIG";

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The loaded configuration, with environment overrides applied.
    pub config: GatewayConfig,
    /// File the config was read from, if any.
    pub source: Option<PathBuf>,
    /// Environment variables that overrode file values.
    pub env_overrides: Vec<&'static str>,
    /// Non-fatal findings (e.g. plaintext secrets in the file).
    pub warnings: Vec<String>,
}

/// Discover, load and apply environment overrides.
///
/// Does not validate; call [`GatewayConfig::validate`] on the result.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with(explicit, |name| std::env::var(name).ok(), Path::new("."))
}

/// Load configuration with an explicit environment and working directory.
pub fn load_config_with<F>(explicit: Option<&Path>, env: F, cwd: &Path) -> Result<LoadedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let path = resolve_config_path(explicit, &env, cwd);

    let (mut config, source) = match path {
        Some(path) => (load_config_file(&path)?, Some(path)),
        None => (GatewayConfig::new(), None),
    };

    let mut warnings = Vec::new();
    check_plaintext_secrets(&config, &mut warnings);

    let env_overrides = config.apply_overrides_from(&env);

    Ok(LoadedConfig {
        config,
        source,
        env_overrides,
        warnings,
    })
}

/// Pick the config file to load.
///
/// Explicit and environment paths are returned even if the file is missing,
/// so loading reports the error; the working-directory default is optional.
pub fn resolve_config_path<F>(explicit: Option<&Path>, env: &F, cwd: &Path) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Some(path) = env(CONFIG_PATH_ENV)
        && !path.is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let local = cwd.join(DEFAULT_CONFIG_FILE);
    local.is_file().then_some(local)
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<GatewayConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    tracing::debug!(path = %path.display(), "Loaded config file");
    GatewayConfig::from_toml(&contents)
}

fn check_plaintext_secrets(config: &GatewayConfig, warnings: &mut Vec<String>) {
    if config.idp.client_secret.is_some() {
        warnings.push(format!(
            "[idp] contains a plaintext client_secret. \
             Consider setting {} instead.",
            crate::types::ENV_CLIENT_SECRET
        ));
    }
    if config.cookies.secret.is_some() {
        warnings.push(format!(
            "[cookies] contains a plaintext secret. \
             Consider setting {} instead.",
            crate::types::ENV_COOKIE_SECRET
        ));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
