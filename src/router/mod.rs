//! Target router
//!
//! [`Router`] maps a slash-delimited build target onto a registered handler.
//! It is itself a [`Handler`], so a router can be mounted inside another one
//! (much like a sub-router in an HTTP mux).
//!
//! Resolution order for a requested target:
//! 1. An exact match on a registered route
//! 2. For an empty target, the registry default (or the last registered route)
//! 3. The longest registered route that is a `/`-delimited prefix of the target
//!
//! Before calling the handler the router strips the matched prefix from the
//! `target` option, so a request for `jammy/testing/container` reaching a
//! router mounted at `jammy` is seen by that router as `testing/container`.
//! The first match also records the top-level target under
//! [`KEY_TOP_LEVEL_TARGET`]; nested routers never overwrite it.

mod forward;
pub mod path;
mod request;
mod subrequest;

pub use forward::{
    ForwardedTargets, FrontendForwarder, HookedRouter, RouterHook, SpecGatedHandler,
    TargetForwarding,
};
pub use request::{DetachedClient, KEY_REQUEST_ID, KEY_TARGET, KEY_TOP_LEVEL_TARGET, Request};
pub use subrequest::{
    REQUEST_DESCRIBE, REQUEST_FORWARD_BUILD, REQUEST_TARGETS, SubrequestDefinition, describe,
};

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{Instrument, debug, info, info_span};

use crate::handlers::{
    BuildResult, Handler, HandlerEntry, HandlerError, HandlerNotFound, Lookup, Registry,
    RegistryError, Target, TargetList,
};
use crate::observability::Metrics;
use crate::spec::{Spec, SpecSource};

/// Hierarchical build-target dispatcher
pub struct Router {
    registry: Registry,
    spec_source: Option<Arc<dyn SpecSource>>,
    // loaded at most once per router
    spec: OnceCell<Arc<Spec>>,
    claimed: BTreeSet<String>,
    metrics: Arc<Metrics>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            spec_source: None,
            spec: OnceCell::new(),
            claimed: BTreeSet::from([REQUEST_FORWARD_BUILD.to_string()]),
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Source used to annotate errors and to drive spec-based registration
    pub fn with_spec_source(mut self, source: Arc<dyn SpecSource>) -> Self {
        self.spec_source = Some(source);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Accept a request id that handlers deal with themselves.
    ///
    /// Unclaimed, unknown request ids are rejected as unsupported subrequests.
    pub fn claim_subrequest(mut self, request_id: impl Into<String>) -> Self {
        self.claimed.insert(request_id.into());
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Register a self-describing target under `group`
    pub fn add<H>(&self, group: &str, target: Target, handler: H) -> Result<(), RegistryError>
    where
        H: Handler + 'static,
    {
        self.registry
            .add(group, HandlerEntry::new(target, Arc::new(handler)))
    }

    /// Register a handler without target metadata at `path`.
    ///
    /// This is how nested routers are attached; list requests are forwarded
    /// to such handlers instead of being answered from metadata.
    pub fn mount<H>(&self, path: &str, handler: H) -> Result<(), RegistryError>
    where
        H: Handler + 'static,
    {
        debug!(path, "Added handler to router");
        self.registry
            .add("", HandlerEntry::route(path, Arc::new(handler)))
    }

    /// Register a target that spec-declared targets cannot override
    pub fn add_builtin<H>(&self, group: &str, target: Target, handler: H) -> Result<(), RegistryError>
    where
        H: Handler + 'static,
    {
        self.registry
            .add_builtin(group, HandlerEntry::new(target, Arc::new(handler)))
    }

    pub fn set_default(&self, group: &str, name: &str) -> Result<(), RegistryError> {
        self.registry.set_default(group, name)
    }

    pub fn lookup(&self, target: &str) -> Result<Lookup, HandlerNotFound> {
        self.registry.lookup(target)
    }

    /// Load the spec through the configured source, caching the first success
    pub async fn load_spec(&self, req: &Request) -> Result<Arc<Spec>, HandlerError> {
        let source = self.spec_source.as_ref().ok_or(HandlerError::NoSpecSource)?;
        self.spec
            .get_or_try_init(|| async { source.load_spec(req).await.map(Arc::new) })
            .await
            .cloned()
    }

    async fn route(&self, req: Request) -> Result<BuildResult, HandlerError> {
        info!(handlers = ?self.registry.names(), "Handling request");

        match req.request_id() {
            "" => {}
            REQUEST_DESCRIBE => {
                self.metrics.subrequest_answered();
                return describe();
            }
            REQUEST_TARGETS => {
                self.metrics.subrequest_answered();
                return self.list(req).await;
            }
            id if self.claimed.contains(id) => {}
            id => return Err(HandlerError::UnsupportedSubrequest(id.to_string())),
        }

        let Lookup { matched, entry } = self.registry.lookup(req.target()).inspect_err(|_| {
            self.metrics.target_not_found();
        })?;

        self.metrics.request_routed();
        dispatch(matched, entry, req, Arc::clone(&self.metrics)).await
    }

    /// Add the requested target and, when loadable, the spec name to an error
    async fn annotate(&self, err: HandlerError, req: &Request) -> HandlerError {
        let mut err = err.context(format!(
            "error handling requested build target {:?}",
            req.target()
        ));

        if let Ok(spec) = self.load_spec(req).await {
            if !spec.name.is_empty() {
                err = err.context(format!("spec: {}", spec.name));
            }
        }
        err
    }
}

#[async_trait]
impl Handler for Router {
    async fn handle(&self, req: Request) -> Result<BuildResult, HandlerError> {
        let outermost = !req.opts().contains_key(KEY_TOP_LEVEL_TARGET);
        let span = info_span!(
            "route",
            requested = %req.target(),
            request_id = %req.request_id(),
            top_level = req.top_level_target().unwrap_or_default(),
        );

        match self.route(req.clone()).instrument(span).await {
            Ok(res) => Ok(res),
            Err(err) if outermost => Err(self.annotate(err, &req).await),
            Err(err) => Err(err),
        }
    }
}

/// Invoke `entry` with the matched prefix stripped from the request and
/// restore full paths on whatever comes back.
pub(crate) async fn dispatch(
    matched: String,
    entry: Arc<HandlerEntry>,
    req: Request,
    metrics: Arc<Metrics>,
) -> Result<BuildResult, HandlerError> {
    let list_request = req.request_id() == REQUEST_TARGETS;
    let req = req.trim_target(&matched).mark_top_level_target(&matched);

    debug!(
        %matched,
        handler = entry.name(),
        residual = req.target(),
        "Dispatching to handler"
    );

    let res = match entry.handler().handle(req).await {
        Ok(res) => res,
        Err(err) => {
            metrics.handler_failed();
            return Err(err.qualify_not_found(&matched));
        }
    };

    if list_request {
        return fixup_list_result(&matched, res);
    }
    Ok(res)
}

/// Prefix every listed target with `matched`.
///
/// The handler saw the request with `matched` already removed, so the names
/// it reports are relative to it.
fn fixup_list_result(matched: &str, mut res: BuildResult) -> Result<BuildResult, HandlerError> {
    let mut ls = TargetList::from_result(&res)?;
    for t in &mut ls.targets {
        t.name = path::join(matched, &t.name);
    }
    ls.write_to(&mut res)?;
    Ok(res)
}
