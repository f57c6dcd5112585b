//! Configuration management for targetmux
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. `.env` file in the working directory (read with dotenvy)
//! 4. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use targetmux::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! let router = config.router().expect("Invalid route table");
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `TARGETMUX__<section>__<key>`
//!
//! Examples:
//! - `TARGETMUX__LOG__FILTER=targetmux=debug`
//! - `TARGETMUX__LOG__ANSI=false`
//! - `TARGETMUX__SPEC__PATH=/src/hello.yml`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/targetmux.toml`.
//! This can be overridden using the `TARGETMUX_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

// Re-export public types
pub use models::{
    BuiltinConfig, Config, GroupConfig, LogConfig, RoutesConfig, SpecConfig, TargetConfig,
};
pub use sources::config_path;
pub use validation::ValidationError;

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::handlers::{EchoHandler, RegistryError, Target};
use crate::router::{Router, path};
use crate::spec::SpecFile;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Failed to register routes: {0}")]
    RegistryError(#[from] RegistryError),
}

impl Config {
    /// Load configuration from all sources (file + .env + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`TARGETMUX__*`)
    /// 2. `.env` file (same `TARGETMUX__*` keys)
    /// 3. TOML file (default: `config/targetmux.toml`)
    /// 4. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Build a router serving the configured route table.
    ///
    /// Every target is served by an [`EchoHandler`] named after its full path,
    /// so the router can be exercised without a build backend.
    pub fn router(&self) -> Result<Router, ConfigError> {
        let mut router = Router::new();
        if let Some(spec) = &self.spec.path {
            router = router.with_spec_source(Arc::new(SpecFile::new(spec)));
        }

        for (group, cfg) in &self.routes.groups {
            for t in &cfg.targets {
                let mut target = Target::new(&t.name).description(&t.description);
                if t.default {
                    target = target.default_target();
                }
                router.add(group, target, EchoHandler::new(path::join(group, &t.name)))?;
            }
            if let Some(default) = &cfg.default {
                router.set_default(group, default)?;
            }
        }

        for b in &self.routes.builtins {
            router.add_builtin(
                &b.group,
                Target::new(&b.name).description(&b.description),
                EchoHandler::new(path::join(&b.group, &b.name)),
            )?;
        }

        Ok(router)
    }
}
