use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use super::path;
use crate::handlers::{BuildOpts, BuildResult, Client, HandlerError, SolveRequest};

/// Option holding the requested build target
pub const KEY_TARGET: &str = "target";
/// Option naming the subrequest kind, empty for a plain build
pub const KEY_REQUEST_ID: &str = "requestid";
/// Option recording the outermost matched target group
pub const KEY_TOP_LEVEL_TARGET: &str = "targetmux.target";

/// The request view handed to handlers.
///
/// The client's option map is read once and cached here; routing mutates
/// this copy (trimming the target, setting the top-level marker) and never
/// the client's own options.
#[derive(Clone)]
pub struct Request {
    client: Arc<dyn Client>,
    opts: BuildOpts,
}

impl Request {
    pub fn new(client: Arc<dyn Client>) -> Self {
        let opts = client.build_opts();
        Self { client, opts }
    }

    /// Request backed by [`DetachedClient`], for routing without a build backend
    pub fn from_opts<K, V>(opts: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let opts = opts
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::new(Arc::new(DetachedClient::new(opts)))
    }

    pub fn opts(&self) -> &BuildOpts {
        &self.opts
    }

    pub fn opt(&self, key: &str) -> Option<&str> {
        self.opts.get(key).map(String::as_str)
    }

    pub fn target(&self) -> &str {
        self.opt(KEY_TARGET).unwrap_or_default()
    }

    pub fn request_id(&self) -> &str {
        self.opt(KEY_REQUEST_ID).unwrap_or_default()
    }

    /// The outermost matched target group, once any router has set it
    pub fn top_level_target(&self) -> Option<&str> {
        self.opt(KEY_TOP_LEVEL_TARGET).filter(|v| !v.is_empty())
    }

    pub fn client(&self) -> &Arc<dyn Client> {
        &self.client
    }

    /// Copy of this view with one option overridden
    pub fn with_opt(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut req = self.clone();
        req.opts.insert(key.into(), value.into());
        req
    }

    /// Strip `matched` (and a following `/`) from the target
    pub(crate) fn trim_target(mut self, matched: &str) -> Self {
        let residual = path::trim_prefix(self.target(), matched).to_string();
        self.opts.insert(KEY_TARGET.to_string(), residual);
        self
    }

    /// Record `matched` as the top-level target unless an outer router already did
    pub(crate) fn mark_top_level_target(mut self, matched: &str) -> Self {
        if self.top_level_target().is_none() {
            self.opts
                .insert(KEY_TOP_LEVEL_TARGET.to_string(), matched.to_string());
        }
        self
    }

    pub async fn solve(&self, req: SolveRequest) -> Result<BuildResult, HandlerError> {
        self.client.solve(req).await
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("opts", &self.opts)
            .finish_non_exhaustive()
    }
}

/// Client with a fixed option map and no build backend
#[derive(Debug, Clone, Default)]
pub struct DetachedClient {
    opts: BuildOpts,
}

impl DetachedClient {
    pub fn new(opts: BuildOpts) -> Self {
        Self { opts }
    }
}

#[async_trait]
impl Client for DetachedClient {
    fn build_opts(&self) -> BuildOpts {
        self.opts.clone()
    }

    async fn solve(&self, req: SolveRequest) -> Result<BuildResult, HandlerError> {
        Err(HandlerError::NoBackend(req.frontend))
    }
}
