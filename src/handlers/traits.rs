use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use super::registry::RegistryError;
use super::types::{BuildOpts, BuildResult, SolveRequest};
use crate::router::Request;
use crate::router::path;

/// Raised when no registered route matches a requested target
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no such handler for target {target:?}: available targets: {}", available.join(", "))]
pub struct HandlerNotFound {
    pub target: String,
    pub available: Vec<String>,
}

impl HandlerNotFound {
    /// Prefix the target and every available name with `matched`
    pub fn qualify(&mut self, matched: &str) {
        self.target = path::join(matched, &self.target);
        for name in &mut self.available {
            *name = path::join(matched, name);
        }
    }
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    NotFound(#[from] HandlerNotFound),

    #[error("unsupported subrequest {0:?}")]
    UnsupportedSubrequest(String),

    #[error("invalid result: {0}")]
    InvalidResult(String),

    #[error("error encoding result: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to load spec {}: {message}", path.display())]
    Spec { path: PathBuf, message: String },

    #[error("no spec source configured")]
    NoSpecSource,

    #[error("no build backend attached: cannot solve {0:?}")]
    NoBackend(String),

    #[error("{0}")]
    Build(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<HandlerError>,
    },

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    pub fn build(message: impl fmt::Display) -> Self {
        HandlerError::Build(message.to_string())
    }

    /// Wrap this error with a context message
    pub fn context(self, context: impl Into<String>) -> Self {
        HandlerError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Find a not-found error anywhere in the context chain
    pub fn not_found(&self) -> Option<&HandlerNotFound> {
        match self {
            HandlerError::NotFound(e) => Some(e),
            HandlerError::Context { source, .. } => source.not_found(),
            _ => None,
        }
    }

    fn not_found_mut(&mut self) -> Option<&mut HandlerNotFound> {
        match self {
            HandlerError::NotFound(e) => Some(e),
            HandlerError::Context { source, .. } => source.not_found_mut(),
            _ => None,
        }
    }

    /// Restore `matched` onto an embedded not-found error so the outermost
    /// caller sees full target paths.
    pub fn qualify_not_found(mut self, matched: &str) -> Self {
        if let Some(e) = self.not_found_mut() {
            e.qualify(matched);
        }
        self
    }
}

/// A build function: performs or routes one build request.
///
/// A [`Router`](crate::router::Router) is itself a `Handler`, so routers nest.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, req: Request) -> Result<BuildResult, HandlerError>;
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn handle(&self, req: Request) -> Result<BuildResult, HandlerError> {
        (**self).handle(req).await
    }
}

/// The build backend a request is evaluated against.
///
/// The router only reads the option map; `solve` is for handlers that
/// forward or evaluate nested builds.
#[async_trait]
pub trait Client: Send + Sync {
    fn build_opts(&self) -> BuildOpts;

    async fn solve(&self, req: SolveRequest) -> Result<BuildResult, HandlerError>;
}

/// Handler backed by an async closure, see [`handler_fn`]
#[derive(Clone)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F> fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerFn").finish_non_exhaustive()
    }
}

/// Turn an async closure into a [`Handler`]
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<BuildResult, HandlerError>> + Send,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<BuildResult, HandlerError>> + Send,
{
    async fn handle(&self, req: Request) -> Result<BuildResult, HandlerError> {
        (self.f)(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_found() -> HandlerNotFound {
        HandlerNotFound {
            target: "nope".to_string(),
            available: vec!["deb".to_string(), "dsc".to_string()],
        }
    }

    #[test]
    fn test_not_found_message() {
        let err = HandlerError::from(not_found());
        assert_eq!(
            err.to_string(),
            r#"no such handler for target "nope": available targets: deb, dsc"#
        );
    }

    #[test]
    fn test_qualify_through_context() {
        let err = HandlerError::from(not_found())
            .context("inner")
            .qualify_not_found("jammy");

        let nf = err.not_found().unwrap();
        assert_eq!(nf.target, "jammy/nope");
        assert_eq!(nf.available, vec!["jammy/deb", "jammy/dsc"]);
        assert!(err.to_string().starts_with("inner: "));
    }

    #[test]
    fn test_qualify_ignores_other_errors() {
        let err = HandlerError::build("boom").qualify_not_found("jammy");
        assert!(err.not_found().is_none());
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_handler_fn() {
        let h = handler_fn(|req: Request| async move {
            let mut res = BuildResult::new();
            res.add_meta("target", req.target().to_string());
            Ok::<_, HandlerError>(res)
        });

        let req = Request::from_opts([("target", "deb")]);
        let res = h.handle(req).await.unwrap();
        assert_eq!(res.meta("target").unwrap(), "deb");
    }
}
