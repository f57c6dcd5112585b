//! Package spec as seen by the router
//!
//! Only the parts the router needs are modelled: the spec name (used to
//! annotate errors) and the per-target frontend overrides (used to forward
//! builds to custom frontends).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::handlers::HandlerError;
use crate::router::Request;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spec {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub targets: BTreeMap<String, SpecTarget>,
}

impl Spec {
    /// Spec targets that route to a custom frontend
    pub fn frontends(&self) -> impl Iterator<Item = (&str, &FrontendRef)> {
        self.targets
            .iter()
            .filter_map(|(key, t)| t.frontend.as_ref().map(|f| (key.as_str(), f)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend: Option<FrontendRef>,
}

/// A custom frontend image that builds a spec target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontendRef {
    pub image: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cmdline: String,
}

/// Where the router gets the spec for a request from
#[async_trait]
pub trait SpecSource: Send + Sync {
    async fn load_spec(&self, req: &Request) -> Result<Spec, HandlerError>;
}

/// An in-memory spec
#[derive(Debug, Clone)]
pub struct StaticSpec {
    spec: Spec,
}

impl StaticSpec {
    pub fn new(spec: Spec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl SpecSource for StaticSpec {
    async fn load_spec(&self, _req: &Request) -> Result<Spec, HandlerError> {
        Ok(self.spec.clone())
    }
}

/// A spec read from disk. The format follows the file extension: YAML for
/// `.yml`/`.yaml`, JSON for `.json`, TOML for anything else.
#[derive(Debug, Clone)]
pub struct SpecFile {
    path: PathBuf,
}

impl SpecFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, message: impl ToString) -> HandlerError {
        HandlerError::Spec {
            path: self.path.clone(),
            message: message.to_string(),
        }
    }

    fn parse(&self, raw: &str) -> Result<Spec, HandlerError> {
        let ext = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext {
            "yml" | "yaml" => serde_yaml::from_str(raw).map_err(|e| self.error(e)),
            "json" => serde_json::from_str(raw).map_err(|e| self.error(e)),
            _ => toml::from_str(raw).map_err(|e| self.error(e)),
        }
    }
}

#[async_trait]
impl SpecSource for SpecFile {
    async fn load_spec(&self, _req: &Request) -> Result<Spec, HandlerError> {
        debug!(path = %self.path.display(), "Loading spec");
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.error(e))?;
        self.parse(&raw)
    }
}
