use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use targetmux::handlers::{
    BuildResult, EchoHandler, Handler, HandlerError, RegistryError, RouteReport, Target,
    TargetList, handler_fn,
};
use targetmux::observability::Metrics;
use targetmux::router::{KEY_REQUEST_ID, KEY_TARGET, REQUEST_TARGETS, Request, Router};

async fn route(router: &Router, target: &str) -> Result<RouteReport, HandlerError> {
    let res = router
        .handle(Request::from_opts([(KEY_TARGET, target)]))
        .await?;
    RouteReport::from_result(&res)
}

async fn list(router: &Router, filter: &str) -> Vec<String> {
    let req = Request::from_opts([(KEY_TARGET, filter), (KEY_REQUEST_ID, REQUEST_TARGETS)]);
    let res = router.handle(req).await.unwrap();
    TargetList::from_result(&res)
        .unwrap()
        .targets
        .into_iter()
        .map(|t| t.name)
        .collect()
}

fn counting(counter: &Arc<AtomicUsize>) -> impl Handler + 'static {
    let counter = Arc::clone(counter);
    handler_fn(move |_req: Request| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, HandlerError>(BuildResult::new())
        }
    })
}

/// Inner router for the `jammy` distro: deb (default), container and dsc
fn jammy() -> Router {
    let router = Router::new();
    router
        .add("", Target::new("deb").default_target(), EchoHandler::new("deb"))
        .unwrap();
    router
        .add("", Target::new("container"), EchoHandler::new("container"))
        .unwrap();
    router
        .add("", Target::new("dsc"), EchoHandler::new("dsc"))
        .unwrap();
    router
}

fn distros() -> Router {
    let router = Router::new();
    router.mount("jammy", jammy()).unwrap();
    router
}

#[tokio::test]
async fn test_exact_beats_prefix() {
    let router = Router::new();
    router.mount("a", EchoHandler::new("prefix")).unwrap();
    router.mount("a/b", EchoHandler::new("exact")).unwrap();

    let report = route(&router, "a/b").await.unwrap();
    assert_eq!(report.handler, "exact");
    assert_eq!(report.target, "");

    let report = route(&router, "a/c").await.unwrap();
    assert_eq!(report.handler, "prefix");
    assert_eq!(report.target, "c");
}

#[tokio::test]
async fn test_residual_stripping() {
    let router = Router::new();
    router.mount("g", EchoHandler::new("g")).unwrap();

    let report = route(&router, "g/sub/x").await.unwrap();
    assert_eq!(report.target, "sub/x");
    assert_eq!(report.top_level_target.as_deref(), Some("g"));
}

#[tokio::test]
async fn test_default_on_empty_target() {
    let router = Router::new();
    router
        .add("", Target::new("first"), EchoHandler::new("first"))
        .unwrap();
    router
        .add("", Target::new("last"), EchoHandler::new("last"))
        .unwrap();
    assert_eq!(route(&router, "").await.unwrap().handler, "last");

    router
        .add("", Target::new("chosen").default_target(), EchoHandler::new("chosen"))
        .unwrap();
    router
        .add("", Target::new("later"), EchoHandler::new("later"))
        .unwrap();
    assert_eq!(route(&router, "").await.unwrap().handler, "chosen");
}

#[tokio::test]
async fn test_group_alias() {
    let router = Router::new();
    router
        .add("jammy", Target::new("deb").default_target(), EchoHandler::new("jammy/deb"))
        .unwrap();

    let found = router.lookup("jammy").unwrap();
    assert_eq!(found.matched, "jammy");
    assert_eq!(
        found.entry.target().unwrap().description,
        "Alias for target jammy/deb"
    );
    assert_eq!(route(&router, "jammy").await.unwrap().handler, "jammy/deb");
}

#[test]
fn test_builtin_isolation_both_orders() {
    let router = Router::new();
    router
        .add_builtin("x", Target::new("y"), EchoHandler::new("builtin"))
        .unwrap();
    assert_eq!(
        router
            .add("x", Target::new("y"), EchoHandler::new("spec"))
            .unwrap_err(),
        RegistryError::BuiltinExists("x/y".to_string())
    );

    let router = Router::new();
    router
        .add("x", Target::new("y"), EchoHandler::new("spec"))
        .unwrap();
    assert_eq!(
        router
            .add_builtin("x", Target::new("y"), EchoHandler::new("builtin"))
            .unwrap_err(),
        RegistryError::TargetExists("x/y".to_string())
    );
}

#[tokio::test]
async fn test_each_request_invokes_one_handler() {
    let real = Arc::new(AtomicUsize::new(0));
    let nested = Arc::new(AtomicUsize::new(0));

    let subroute = Router::new();
    subroute
        .add("", Target::new("a"), counting(&nested))
        .unwrap();

    let router = Router::new();
    router
        .add("", Target::new("real").default_target(), counting(&real))
        .unwrap();
    router.mount("real/subroute", subroute).unwrap();

    router
        .handle(Request::from_opts([(KEY_TARGET, "real")]))
        .await
        .unwrap();
    assert_eq!(real.load(Ordering::SeqCst), 1);
    assert_eq!(nested.load(Ordering::SeqCst), 0);

    router
        .handle(Request::from_opts([(KEY_TARGET, "real/subroute/a")]))
        .await
        .unwrap();
    assert_eq!(real.load(Ordering::SeqCst), 1);
    assert_eq!(nested.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_nested_list_is_qualified() {
    let inner = Router::new();
    inner
        .add("", Target::new("inner"), EchoHandler::new("inner"))
        .unwrap();

    let router = Router::new();
    router.mount("g", inner).unwrap();

    assert_eq!(list(&router, "").await, vec!["g/inner"]);
}

#[tokio::test]
async fn test_not_found_deep_in_nesting() {
    let leaf = Router::new();
    leaf.add("", Target::new("x"), EchoHandler::new("x")).unwrap();

    let middle = Router::new();
    middle.mount("b", leaf).unwrap();

    let router = Router::new();
    router.mount("a", middle).unwrap();

    let err = route(&router, "a/b/zzz").await.unwrap_err();
    let not_found = err.not_found().unwrap();
    assert_eq!(not_found.target, "a/b/zzz");
    assert_eq!(not_found.available, vec!["a/b/x"]);

    let err = route(&router, "zzz").await.unwrap_err();
    let not_found = err.not_found().unwrap();
    assert_eq!(not_found.target, "zzz");
    assert_eq!(not_found.available, vec!["a"]);
}

#[tokio::test]
async fn test_distro_scenario() {
    let router = distros();

    // the bare group selects the inner default
    let report = route(&router, "jammy").await.unwrap();
    assert_eq!(report.handler, "deb");
    assert_eq!(report.target, "");
    assert_eq!(report.top_level_target.as_deref(), Some("jammy"));

    let report = route(&router, "jammy/container").await.unwrap();
    assert_eq!(report.handler, "container");
    assert_eq!(report.target, "");

    let err = route(&router, "jammy/nope").await.unwrap_err();
    let not_found = err.not_found().unwrap();
    assert_eq!(not_found.target, "jammy/nope");
    assert_eq!(
        not_found.available,
        vec!["jammy/container", "jammy/deb", "jammy/dsc"]
    );
    assert_eq!(
        err.to_string(),
        r#"error handling requested build target "jammy/nope": no such handler for target "jammy/nope": available targets: jammy/container, jammy/deb, jammy/dsc"#
    );

    assert_eq!(
        list(&router, "").await,
        vec!["jammy/container", "jammy/deb", "jammy/dsc"]
    );
    assert_eq!(list(&router, "jammy/dsc").await, vec!["jammy/dsc"]);
}

#[tokio::test]
async fn test_shared_metrics_across_nesting() {
    let metrics = Arc::new(Metrics::new());

    let inner = Router::new().with_metrics(Arc::clone(&metrics));
    inner
        .add("", Target::new("deb"), EchoHandler::new("deb"))
        .unwrap();

    let router = Router::new().with_metrics(Arc::clone(&metrics));
    router.mount("jammy", inner).unwrap();

    route(&router, "jammy/deb").await.unwrap();
    let _ = route(&router, "jammy/rpm").await;

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.requests_routed, 3);
    assert_eq!(snapshot.targets_not_found, 1);
    assert_eq!(snapshot.handler_failures, 1);
}
