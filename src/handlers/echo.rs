use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::traits::{Handler, HandlerError};
use super::types::BuildResult;
use crate::router::Request;

/// Metadata key under which [`EchoHandler`] reports what it received
pub const ROUTE_JSON: &str = "route.json";

/// What a leaf handler saw when the router invoked it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteReport {
    pub handler: String,
    pub target: String,
    pub top_level_target: Option<String>,
}

/// Leaf handler that performs no build and reports the request it was routed.
///
/// Used by the binary's dry-run routing and in tests.
#[derive(Debug, Clone)]
pub struct EchoHandler {
    name: String,
}

impl EchoHandler {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Handler for EchoHandler {
    async fn handle(&self, req: Request) -> Result<BuildResult, HandlerError> {
        let report = RouteReport {
            handler: self.name.clone(),
            target: req.target().to_string(),
            top_level_target: req.top_level_target().map(str::to_string),
        };

        let mut res = BuildResult::new();
        res.add_meta(ROUTE_JSON, serde_json::to_vec(&report)?);
        res.add_meta(
            super::types::RESULT_TXT,
            format!(
                "handler={} target={:?} top_level_target={}\n",
                report.handler,
                report.target,
                report.top_level_target.as_deref().unwrap_or("-")
            ),
        );
        Ok(res)
    }
}

impl RouteReport {
    pub fn from_result(res: &BuildResult) -> Result<Self, HandlerError> {
        let dt = res.meta(ROUTE_JSON).ok_or_else(|| {
            HandlerError::InvalidResult(format!("no {ROUTE_JSON} metadata in response"))
        })?;
        Ok(serde_json::from_slice(dt)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{KEY_TARGET, KEY_TOP_LEVEL_TARGET};

    #[tokio::test]
    async fn test_echo_reports_request() {
        let handler = EchoHandler::new("jammy/deb");
        let req = Request::from_opts([(KEY_TARGET, "sub"), (KEY_TOP_LEVEL_TARGET, "jammy")]);

        let res = handler.handle(req).await.unwrap();
        let report = RouteReport::from_result(&res).unwrap();

        assert_eq!(report.handler, "jammy/deb");
        assert_eq!(report.target, "sub");
        assert_eq!(report.top_level_target.as_deref(), Some("jammy"));
    }

    #[tokio::test]
    async fn test_echo_without_marker() {
        let res = EchoHandler::new("deb")
            .handle(Request::from_opts([(KEY_TARGET, "")]))
            .await
            .unwrap();

        let report = RouteReport::from_result(&res).unwrap();
        assert_eq!(report.target, "");
        assert!(report.top_level_target.is_none());
    }
}
