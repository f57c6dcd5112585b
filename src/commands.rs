use std::io::{self, Write};

use targetmux::handlers::{
    BuildResult, Handler, HandlerError, RESULT_JSON, RESULT_TXT, RouteReport, TargetList,
};
use targetmux::router::{KEY_REQUEST_ID, KEY_TARGET, REQUEST_DESCRIBE, REQUEST_TARGETS, Request, Router};

use crate::cli::{ListArgs, RouteArgs};

pub type AnyError = Box<dyn std::error::Error + Send + Sync>;

fn write_meta(res: &BuildResult, key: &str) -> Result<(), AnyError> {
    let dt = res
        .meta(key)
        .ok_or_else(|| HandlerError::InvalidResult(format!("no {key} metadata in response")))?;
    io::stdout().write_all(dt)?;
    Ok(())
}

pub async fn describe(router: &Router) -> Result<(), AnyError> {
    let req = Request::from_opts([(KEY_REQUEST_ID, REQUEST_DESCRIBE)]);
    let res = router.handle(req).await?;
    write_meta(&res, RESULT_TXT)
}

pub async fn list(router: &Router, args: ListArgs) -> Result<(), AnyError> {
    let req = Request::from_opts([
        (KEY_TARGET, args.filter.unwrap_or_default()),
        (KEY_REQUEST_ID, REQUEST_TARGETS.to_string()),
    ]);
    let res = router.handle(req).await?;

    if args.json {
        let ls = TargetList::from_result(&res)?;
        println!("{}", serde_json::to_string_pretty(&ls)?);
        return Ok(());
    }
    write_meta(&res, RESULT_TXT)
}

pub fn targets(router: &Router) -> Result<(), AnyError> {
    let mut out = io::stdout().lock();
    for entry in router.registry().all() {
        let description = entry.target().map(|t| t.description.as_str()).unwrap_or("");
        let marker = if entry.is_default() { " (default)" } else { "" };
        writeln!(out, "{:<40}{}{}", entry.name(), description, marker)?;
    }
    Ok(())
}

pub async fn route(router: &Router, args: RouteArgs) -> Result<(), AnyError> {
    let opts = args
        .opts
        .into_iter()
        .chain([(KEY_TARGET.to_string(), args.target)]);
    let res = router.handle(Request::from_opts(opts)).await?;

    match RouteReport::from_result(&res) {
        Ok(report) => println!("{}", serde_json::to_string_pretty(&report)?),
        Err(_) => write_meta(&res, RESULT_JSON)?,
    }
    Ok(())
}
