//! Meta-requests answered by the router itself

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{Request, Router, dispatch};
use crate::handlers::{
    BuildResult, HandlerError, RESULT_JSON, RESULT_TXT, RESULT_VERSION, TargetList,
};

/// Request id of the list-targets subrequest
pub const REQUEST_TARGETS: &str = "frontend.targets";
/// Request id of the describe-subrequests subrequest
pub const REQUEST_DESCRIBE: &str = "frontend.subrequests.describe";
/// Request id marking a build forwarded to a custom frontend
pub const REQUEST_FORWARD_BUILD: &str = "targetmux.forward.build";

const SUBREQUESTS_VERSION: &str = "1.0.0";

/// Named option or metadata key of a subrequest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Named {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Definition of one supported subrequest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubrequestDefinition {
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub opts: Vec<Named>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<Named>,
}

impl SubrequestDefinition {
    fn rpc(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            version: SUBREQUESTS_VERSION.to_string(),
            kind: "rpc".to_string(),
            description: description.to_string(),
            opts: Vec::new(),
            metadata: [RESULT_JSON, RESULT_TXT]
                .into_iter()
                .map(|name| Named {
                    name: name.to_string(),
                    description: String::new(),
                })
                .collect(),
        }
    }

    /// The subrequests every router answers
    pub fn supported() -> Vec<Self> {
        vec![
            Self::rpc(REQUEST_TARGETS, "List all targets current build supports"),
            Self::rpc(REQUEST_DESCRIBE, "List available subrequest types"),
        ]
    }
}

/// Static description of the supported subrequests
pub fn describe() -> Result<BuildResult, HandlerError> {
    let subs = SubrequestDefinition::supported();

    let mut txt = String::new();
    let _ = writeln!(txt, "{:<32}{:<10}DESCRIPTION", "NAME", "VERSION");
    for s in &subs {
        let _ = writeln!(txt, "{:<32}{:<10}{}", s.name, s.version, s.description);
    }

    let mut res = BuildResult::new();
    res.add_meta(RESULT_JSON, serde_json::to_vec(&subs)?);
    res.add_meta(RESULT_TXT, txt);
    res.add_meta(RESULT_VERSION, SUBREQUESTS_VERSION);
    Ok(res)
}

impl Router {
    /// Answer a list-targets request.
    ///
    /// With an empty target every registered route is listed; otherwise the
    /// target is a filter and only the route it resolves to is listed. Routes
    /// carrying metadata answer directly, the rest are asked in parallel.
    /// Any nested listing that fails, or answers without a target list,
    /// fails the whole request.
    pub(crate) async fn list(&self, req: Request) -> Result<BuildResult, HandlerError> {
        let filter = req.target();
        let check = if filter.is_empty() {
            self.registry.names()
        } else {
            vec![filter.to_string()]
        };

        debug!(checks = ?check, "Checking targets");

        let mut ls = TargetList::default();
        let mut pending = JoinSet::new();

        for t in check {
            let found = match self.registry.lookup(&t) {
                Ok(found) => found,
                Err(err) => {
                    warn!(check = %t, error = %err, "Error looking up target, skipping");
                    continue;
                }
            };

            if let Some(target) = found.entry.target() {
                ls.targets.push(target.clone());
                continue;
            }

            info!(check = %t, matched = %found.matched, "No target info, calling handler");
            pending.spawn(dispatch(
                found.matched,
                found.entry,
                req.clone(),
                Arc::clone(&self.metrics),
            ));
        }

        while let Some(joined) = pending.join_next().await {
            let res = joined.map_err(|err| HandlerError::Other(Box::new(err)))??;
            ls.targets.extend(TargetList::from_result(&res)?.targets);
        }

        ls.targets.sort_by(|a, b| a.name.cmp(&b.name));
        ls.to_result()
    }
}
