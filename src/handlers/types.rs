use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::traits::HandlerError;

/// Option map carried by every build request.
pub type BuildOpts = BTreeMap<String, String>;

/// Metadata key holding the JSON body of a structured response
pub const RESULT_JSON: &str = "result.json";
/// Metadata key holding the human readable body of a structured response
pub const RESULT_TXT: &str = "result.txt";
/// Metadata key holding the response schema version
pub const RESULT_VERSION: &str = "version";

/// Version of the target list schema
pub const TARGETS_VERSION: &str = "1.0.0";

/// Metadata for one selectable build target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,
}

impl Target {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn default_target(mut self) -> Self {
        self.default = true;
        self
    }
}

/// Response payload of the list-targets subrequest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetList {
    #[serde(default)]
    pub targets: Vec<Target>,
}

impl TargetList {
    /// Decode a target list from the `result.json` entry of a result
    pub fn from_result(res: &BuildResult) -> Result<Self, HandlerError> {
        let dt = res.metadata.get(RESULT_JSON).ok_or_else(|| {
            HandlerError::InvalidResult(format!("no {RESULT_JSON} metadata in response"))
        })?;
        Ok(serde_json::from_slice(dt)?)
    }

    /// Write this list into `res`, replacing the list keys and keeping everything else
    pub fn write_to(&self, res: &mut BuildResult) -> Result<(), HandlerError> {
        let dt = serde_json::to_vec(self)?;
        res.add_meta(RESULT_JSON, dt);
        res.add_meta(RESULT_TXT, self.to_text());
        res.add_meta(RESULT_VERSION, TARGETS_VERSION);
        Ok(())
    }

    pub fn to_result(&self) -> Result<BuildResult, HandlerError> {
        let mut res = BuildResult::new();
        self.write_to(&mut res)?;
        Ok(res)
    }

    fn to_text(&self) -> String {
        let width = self
            .targets
            .iter()
            .map(|t| t.name.len() + if t.default { " (default)".len() } else { 0 })
            .max()
            .unwrap_or(0)
            .max("TARGET".len());

        let mut out = String::new();
        let _ = writeln!(out, "{:<width$}  DESCRIPTION", "TARGET");
        for t in &self.targets {
            let name = if t.default {
                format!("{} (default)", t.name)
            } else {
                t.name.clone()
            };
            let _ = writeln!(out, "{name:<width$}  {}", t.description);
        }
        out
    }
}

/// Opaque bag of named byte blobs returned by handlers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildResult {
    pub metadata: BTreeMap<String, Bytes>,
}

impl BuildResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_meta(&mut self, key: impl Into<String>, value: impl Into<Bytes>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn meta(&self, key: &str) -> Option<&Bytes> {
        self.metadata.get(key)
    }
}

/// Request to evaluate a nested build through the client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolveRequest {
    pub frontend: String,
    pub frontend_opts: BuildOpts,
    pub frontend_inputs: BTreeMap<String, Bytes>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_list_result_keys() {
        let ls = TargetList {
            targets: vec![
                Target::new("jammy/deb")
                    .description("Builds a deb package")
                    .default_target(),
                Target::new("jammy/dsc"),
            ],
        };

        let res = ls.to_result().unwrap();
        assert_eq!(res.meta(RESULT_VERSION).unwrap(), "1.0.0");

        let txt = String::from_utf8(res.meta(RESULT_TXT).unwrap().to_vec()).unwrap();
        assert!(txt.starts_with("TARGET"));
        assert!(txt.contains("jammy/deb (default)  Builds a deb package"));

        let decoded = TargetList::from_result(&res).unwrap();
        assert_eq!(decoded, ls);
    }

    #[test]
    fn test_target_json_shape() {
        let json = serde_json::to_value(Target::new("deb").default_target()).unwrap();
        assert_eq!(json, serde_json::json!({ "name": "deb", "default": true }));

        let t: Target = serde_json::from_str(r#"{"name":"rpm"}"#).unwrap();
        assert_eq!(t, Target::new("rpm"));
    }

    #[test]
    fn test_write_to_keeps_other_metadata() {
        let mut res = BuildResult::new();
        res.add_meta("image.config", "{}");

        TargetList::default().write_to(&mut res).unwrap();
        assert!(res.meta("image.config").is_some());
        assert!(res.meta(RESULT_JSON).is_some());
    }

    #[test]
    fn test_missing_result_json() {
        let err = TargetList::from_result(&BuildResult::new()).unwrap_err();
        assert!(matches!(err, HandlerError::InvalidResult(_)));
    }
}
