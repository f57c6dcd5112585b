use super::models::Config;
use config::{ConfigError, Environment, File, FileFormat, Map};
use std::env;
use std::path::{Path, PathBuf};

const CONFIG_ENV_VAR: &str = "TARGETMUX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/targetmux.toml";
const DOTENV_PATH: &str = ".env";
const ENV_PREFIX: &str = "TARGETMUX";
const ENV_SEPARATOR: &str = "__";

/// Path of the configuration file: `TARGETMUX_CONFIG` or the default location
pub fn config_path() -> PathBuf {
    config_path_with(&dotenv_vars(Path::new(DOTENV_PATH)))
}

fn config_path_with(dotenv: &Map<String, String>) -> PathBuf {
    env::var(CONFIG_ENV_VAR)
        .ok()
        .or_else(|| dotenv.get(CONFIG_ENV_VAR).cloned())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Variables from a `.env` file, without touching the process environment.
/// A missing or unreadable file yields nothing.
fn dotenv_vars(path: &Path) -> Map<String, String> {
    dotenvy::from_path_iter(path)
        .into_iter()
        .flatten()
        .filter_map(Result::ok)
        .collect()
}

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    let dotenv = dotenv_vars(Path::new(DOTENV_PATH));
    load_layers(config_path_with(&dotenv), dotenv)
}

/// Load configuration from a specific path, the `.env` file and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    load_layers(config_path, dotenv_vars(Path::new(DOTENV_PATH)))
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}

fn load_layers(config_path: PathBuf, dotenv: Map<String, String>) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).format(FileFormat::Toml));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // TARGETMUX__LOG__FILTER -> log.filter
    let config = builder
        .add_source(env_source().source(Some(dotenv)))
        .add_source(env_source())
        .build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.log.filter, "info");
        assert!(config.log.ansi);
        assert!(config.routes.groups.is_empty());
        assert!(config.spec.path.is_none());
    }

    #[test]
    fn test_load_routes() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[log]
filter = "targetmux=debug"
ansi = false

[routes.groups.jammy]
default = "deb"

[[routes.groups.jammy.targets]]
name = "deb"
description = "Debian packages for Ubuntu 22.04"

[[routes.groups.jammy.targets]]
name = "testing/container"

[[routes.builtins]]
group = "debug"
name = "resolve"
description = "Print the resolved spec"

[spec]
path = "hello.yml"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.log.filter, "targetmux=debug");
        assert!(!config.log.ansi);

        let jammy = &config.routes.groups["jammy"];
        assert_eq!(jammy.default.as_deref(), Some("deb"));
        assert_eq!(jammy.targets.len(), 2);
        assert_eq!(jammy.targets[1].name, "testing/container");
        assert!(jammy.targets[1].description.is_empty());

        assert_eq!(config.routes.builtins[0].group, "debug");
        assert_eq!(
            config.spec.path.as_deref(),
            Some(std::path::Path::new("hello.yml"))
        );
    }

    #[test]
    fn test_dotenv_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");
        let dotenv_path = temp_dir.path().join(".env");

        fs::write(
            &config_path,
            "[log]\nfilter = \"targetmux=debug\"\nansi = false\n",
        )
        .unwrap();
        fs::write(
            &dotenv_path,
            "TARGETMUX__LOG__FILTER=targetmux=trace\nTARGETMUX_CONFIG=other.toml\n",
        )
        .unwrap();

        let dotenv = dotenv_vars(&dotenv_path);
        assert_eq!(dotenv["TARGETMUX_CONFIG"], "other.toml");

        let config = load_layers(config_path, dotenv).unwrap();
        assert_eq!(config.log.filter, "targetmux=trace");
        assert!(!config.log.ansi);
    }

    #[test]
    fn test_missing_dotenv_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        assert!(dotenv_vars(&temp_dir.path().join(".env")).is_empty());
    }
}
