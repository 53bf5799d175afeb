//! Configuration system for the bffgate authentication gateway.
//!
//! Provides TOML-based configuration with:
//! - One typed section per concern (`[server]`, `[idp]`, `[session]`, `[store]`,
//!   `[csrf]`, `[upstream]`, `[cookies]`), every field defaulted
//! - File discovery (`--config`, `BFFGATE_CONFIG`, `./bffgate.toml`)
//! - Environment overrides for secrets and deploy-specific values
//! - Startup validation

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    CONFIG_PATH_ENV, DEFAULT_CONFIG_FILE, LoadedConfig, load_config, load_config_file,
    load_config_with, resolve_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
