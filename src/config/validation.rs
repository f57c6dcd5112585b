use super::models::{Config, GroupConfig};
use crate::router::path;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid target name '{name}' in group '{group}'")]
    InvalidTargetName { group: String, name: String },

    #[error("Invalid group name '{group}'")]
    InvalidGroupName { group: String },

    #[error("Target '{name}' declared more than once in group '{group}'")]
    DuplicateTarget { group: String, name: String },

    #[error("Group '{group}' marks more than one target as default")]
    MultipleDefaults { group: String },

    #[error("Group '{group}' default '{name}' is not one of its targets")]
    UnknownDefault { group: String, name: String },

    #[error("Builtin target '{name}' collides with a registered target")]
    BuiltinCollision { name: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    for (group, cfg) in &config.routes.groups {
        validate_group(group, cfg)?;
    }
    validate_builtins(config)?;
    Ok(())
}

/// Names must be non-empty and must not start or end with a separator
fn valid_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('/') && !name.ends_with('/')
}

fn validate_group(group: &str, cfg: &GroupConfig) -> Result<(), ValidationError> {
    if !group.is_empty() && !valid_name(group) {
        return Err(ValidationError::InvalidGroupName {
            group: group.to_string(),
        });
    }

    let mut seen = BTreeSet::new();
    for target in &cfg.targets {
        if !valid_name(&target.name) {
            return Err(ValidationError::InvalidTargetName {
                group: group.to_string(),
                name: target.name.clone(),
            });
        }
        if !seen.insert(target.name.as_str()) {
            return Err(ValidationError::DuplicateTarget {
                group: group.to_string(),
                name: target.name.clone(),
            });
        }
    }

    if cfg.targets.iter().filter(|t| t.default).count() > 1 {
        return Err(ValidationError::MultipleDefaults {
            group: group.to_string(),
        });
    }

    if let Some(default) = &cfg.default {
        if !seen.contains(default.as_str()) {
            return Err(ValidationError::UnknownDefault {
                group: group.to_string(),
                name: default.clone(),
            });
        }
    }

    Ok(())
}

/// Builtins may not shadow group targets, group aliases or each other
fn validate_builtins(config: &Config) -> Result<(), ValidationError> {
    let mut taken: BTreeSet<String> = BTreeSet::new();
    for (group, cfg) in &config.routes.groups {
        for target in &cfg.targets {
            taken.insert(path::join(group, &target.name));
        }
        let has_default = cfg.default.is_some() || cfg.targets.iter().any(|t| t.default);
        if !group.is_empty() && has_default {
            taken.insert(group.clone());
        }
    }

    for builtin in &config.routes.builtins {
        if !valid_name(&builtin.name) {
            return Err(ValidationError::InvalidTargetName {
                group: builtin.group.clone(),
                name: builtin.name.clone(),
            });
        }
        let name = path::join(&builtin.group, &builtin.name);
        if !taken.insert(name.clone()) {
            return Err(ValidationError::BuiltinCollision { name });
        }
    }

    Ok(())
}
