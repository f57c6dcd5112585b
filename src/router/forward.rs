//! Spec-driven registration
//!
//! Some routes can only be known once the spec is available: targets whose
//! spec entry names a custom frontend are forwarded to that frontend, and
//! builtin targets are only exposed when the spec allows them. A
//! [`RouterHook`] runs against the router before each request is dispatched
//! and may register such routes.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::subrequest::{REQUEST_FORWARD_BUILD, REQUEST_TARGETS};
use super::{KEY_REQUEST_ID, KEY_TARGET, KEY_TOP_LEVEL_TARGET, Request, Router};
use crate::handlers::{BuildResult, Handler, HandlerError, SolveRequest, TargetList};
use crate::spec::{FrontendRef, Spec};

const GATEWAY_FRONTEND: &str = "gateway.v0";
const OPT_SOURCE: &str = "source";
const OPT_CMDLINE: &str = "cmdline";
const OPT_CAPS: &str = "frontend.caps";
const CAP_SUBREQUESTS: &str = "moby.buildkit.frontend.subrequests";
const INPUT_SPEC: &str = "dockerfile";

/// Per-request setup step run before the router dispatches
#[async_trait]
pub trait RouterHook: Send + Sync {
    async fn setup(&self, router: &Router, req: &Request) -> Result<(), HandlerError>;
}

/// A router together with the hooks that prepare it for each request
pub struct HookedRouter {
    router: Arc<Router>,
    hooks: Vec<Arc<dyn RouterHook>>,
}

impl Router {
    pub fn with_hooks(self, hooks: Vec<Arc<dyn RouterHook>>) -> HookedRouter {
        HookedRouter {
            router: Arc::new(self),
            hooks,
        }
    }
}

impl HookedRouter {
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }
}

#[async_trait]
impl Handler for HookedRouter {
    async fn handle(&self, req: Request) -> Result<BuildResult, HandlerError> {
        for hook in &self.hooks {
            hook.setup(&self.router, &req).await?;
        }
        self.router.handle(req).await
    }
}

/// Hands a build to a custom frontend through the client.
///
/// The spec travels along as the frontend's `dockerfile` input. Without a
/// fixed target the residual target of the request is forwarded.
#[derive(Debug, Clone)]
pub struct FrontendForwarder {
    frontend: FrontendRef,
    spec: Arc<Spec>,
    target: Option<String>,
}

impl FrontendForwarder {
    pub fn new(frontend: FrontendRef, spec: Arc<Spec>) -> Self {
        Self {
            frontend,
            spec,
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    fn solve_request(&self, req: &Request) -> Result<SolveRequest, HandlerError> {
        let mut opts = req.opts().clone();
        opts.insert(OPT_SOURCE.to_string(), self.frontend.image.clone());
        opts.insert(OPT_CMDLINE.to_string(), self.frontend.cmdline.clone());

        let target = self.target.as_deref().unwrap_or(req.target());
        opts.insert(KEY_TARGET.to_string(), target.to_string());
        if req.request_id().is_empty() {
            opts.insert(KEY_REQUEST_ID.to_string(), REQUEST_FORWARD_BUILD.to_string());
        }

        let dt = serde_json::to_vec(self.spec.as_ref())?;
        Ok(SolveRequest {
            frontend: GATEWAY_FRONTEND.to_string(),
            frontend_opts: opts,
            frontend_inputs: BTreeMap::from([(INPUT_SPEC.to_string(), Bytes::from(dt))]),
        })
    }
}

#[async_trait]
impl Handler for FrontendForwarder {
    async fn handle(&self, req: Request) -> Result<BuildResult, HandlerError> {
        info!(
            frontend = %self.frontend.image,
            forwarded = req.target(),
            "Forwarding to custom frontend"
        );

        let solve = self.solve_request(&req)?;
        req.solve(solve).await.map_err(|e| {
            e.context(format!(
                "error forwarding build to frontend {:?}",
                self.frontend.image
            ))
        })
    }
}

/// Mount a [`FrontendForwarder`] for every spec target with a custom frontend
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetForwarding;

#[async_trait]
impl RouterHook for TargetForwarding {
    async fn setup(&self, router: &Router, req: &Request) -> Result<(), HandlerError> {
        if let Some(key) = req.top_level_target() {
            return Err(HandlerError::build(format!(
                "target forwarding requested but target is already forwarded: {key:?}"
            )));
        }

        let spec = router.load_spec(req).await?;
        for (key, frontend) in spec.frontends() {
            router.mount(
                key,
                FrontendForwarder::new(frontend.clone(), Arc::clone(&spec)),
            )?;
            debug!(key, frontend = %frontend.image, "Added custom frontend to router");
        }
        Ok(())
    }
}

/// Mount `handler` at `key` unless the spec rules the target out.
///
/// A spec without targets allows everything; otherwise `key` must be one of
/// its targets and must not be claimed by a custom frontend.
pub struct SpecGatedHandler {
    key: String,
    handler: Arc<dyn Handler>,
}

impl SpecGatedHandler {
    pub fn new(key: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        Self {
            key: key.into(),
            handler,
        }
    }
}

#[async_trait]
impl RouterHook for SpecGatedHandler {
    async fn setup(&self, router: &Router, req: &Request) -> Result<(), HandlerError> {
        let spec = router.load_spec(req).await?;

        if !spec.targets.is_empty() {
            match spec.targets.get(&self.key) {
                None => {
                    debug!(key = %self.key, "Target not in the spec, skipping");
                    return Ok(());
                }
                Some(t) if t.frontend.is_some() => {
                    debug!(key = %self.key, "Target has custom frontend, skipping");
                    return Ok(());
                }
                Some(_) => {}
            }
        }

        router.mount(&self.key, Arc::clone(&self.handler))?;
        Ok(())
    }
}

/// Register the targets custom frontends report for themselves.
///
/// Each frontend is asked for its target list and every target it returns is
/// registered under the spec target's key with a forwarder. Only one level of
/// forwarding is supported: requests that were already forwarded are left
/// alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardedTargets;

impl ForwardedTargets {
    async fn register(
        &self,
        router: &Router,
        req: &Request,
        spec: &Arc<Spec>,
        group: &str,
    ) -> Result<(), HandlerError> {
        let Some(frontend) = spec.targets.get(group).and_then(|t| t.frontend.as_ref()) else {
            debug!(group, "No custom frontend for target");
            return Ok(());
        };
        if frontend.image.is_empty() {
            return Ok(());
        }

        let mut opts = req.opts().clone();
        opts.insert(OPT_SOURCE.to_string(), frontend.image.clone());
        opts.insert(OPT_CMDLINE.to_string(), frontend.cmdline.clone());
        opts.insert(KEY_TARGET.to_string(), String::new());
        opts.insert(KEY_TOP_LEVEL_TARGET.to_string(), group.to_string());
        opts.insert(KEY_REQUEST_ID.to_string(), REQUEST_TARGETS.to_string());

        let caps = opts
            .get(OPT_CAPS)
            .map(|caps| caps.split(',').filter(|c| !c.is_empty()).collect::<Vec<_>>())
            .unwrap_or_default();
        let caps = caps
            .into_iter()
            .chain([CAP_SUBREQUESTS])
            .collect::<Vec<_>>()
            .join(",");
        opts.insert(OPT_CAPS.to_string(), caps);

        let dt = serde_json::to_vec(spec.as_ref())?;
        let solve = SolveRequest {
            frontend: GATEWAY_FRONTEND.to_string(),
            frontend_opts: opts,
            frontend_inputs: BTreeMap::from([(INPUT_SPEC.to_string(), Bytes::from(dt))]),
        };

        debug!(group, frontend = %frontend.image, "Requesting target list");
        let wrap = |e: HandlerError| {
            e.context(format!(
                "error getting targets from frontend {:?}",
                frontend.image
            ))
        };
        let res = req.solve(solve).await.map_err(wrap)?;
        let ls = TargetList::from_result(&res).map_err(wrap)?;

        if ls.targets.is_empty() {
            debug!(group, "No targets found in forwarded build");
        }
        for t in ls.targets {
            let forwarder =
                FrontendForwarder::new(frontend.clone(), Arc::clone(spec)).with_target(&t.name);
            debug!(group, name = %t.name, "Registering forwarded target");
            router.add(group, t, forwarder)?;
        }
        Ok(())
    }
}

#[async_trait]
impl RouterHook for ForwardedTargets {
    async fn setup(&self, router: &Router, req: &Request) -> Result<(), HandlerError> {
        let listing = match req.request_id() {
            REQUEST_TARGETS if req.opts().contains_key(KEY_TOP_LEVEL_TARGET) => return Ok(()),
            REQUEST_FORWARD_BUILD => return Ok(()),
            id => id == REQUEST_TARGETS,
        };

        let spec = router.load_spec(req).await?;

        let groups: Vec<String> = match req.target() {
            t if !listing && !t.is_empty() => {
                vec![t.split('/').next().unwrap_or(t).to_string()]
            }
            _ => spec.frontends().map(|(key, _)| key.to_string()).collect(),
        };

        for group in groups {
            self.register(router, req, &spec, &group).await?;
        }
        Ok(())
    }
}
