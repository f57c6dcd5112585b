//! Handler system for targetmux
//!
//! This module provides the handler trait, the structured result types and
//! the registry that maps target paths onto handlers.
//!
//! ## Key Components
//!
//! - [`Handler`] - A build function; routers implement it too, so they nest
//! - [`Client`] - The build backend a request is evaluated against
//! - [`Registry`] - Mutex-guarded table of routes, defaults and builtins
//! - [`Target`] / [`TargetList`] - Metadata returned by the list-targets subrequest
//! - [`BuildResult`] - Opaque bag of named blobs returned by handlers
//!
//! ## Example
//!
//! ```rust,ignore
//! use targetmux::handlers::{Registry, HandlerEntry, Target, EchoHandler};
//!
//! let registry = Registry::new();
//! registry.add("jammy", HandlerEntry::new(
//!     Target::new("deb").default_target(),
//!     Arc::new(EchoHandler::new("jammy/deb")),
//! ))?;
//! let found = registry.lookup("jammy")?;
//! ```

mod echo;
mod registry;
mod traits;
pub(crate) mod types;

pub use echo::{EchoHandler, ROUTE_JSON, RouteReport};
pub use registry::{HandlerEntry, Lookup, Registry, RegistryError};
pub use traits::{Client, Handler, HandlerError, HandlerFn, HandlerNotFound, handler_fn};
pub use types::{
    BuildOpts, BuildResult, RESULT_JSON, RESULT_TXT, RESULT_VERSION, SolveRequest,
    TARGETS_VERSION, Target, TargetList,
};
