use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub routes: RoutesConfig,
    #[serde(default)]
    pub spec: SpecConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directives, overridden by `RUST_LOG`
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default = "default_ansi")]
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            ansi: default_ansi(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_ansi() -> bool {
    true
}

/// Route table served by the binary
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RoutesConfig {
    /// Target groups keyed by group path (`""` is the root)
    #[serde(default)]
    pub groups: BTreeMap<String, GroupConfig>,
    #[serde(default)]
    pub builtins: Vec<BuiltinConfig>,
}

/// One target group
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GroupConfig {
    /// Target promoted to default after registration
    pub default: Option<String>,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default: bool,
}

/// A target that spec-declared targets cannot override
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BuiltinConfig {
    #[serde(default)]
    pub group: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Spec used to annotate errors
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SpecConfig {
    pub path: Option<PathBuf>,
}
