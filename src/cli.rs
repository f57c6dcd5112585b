use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "targetmux")]
#[command(about = "Build target router", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $TARGETMUX_CONFIG or config/targetmux.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Describe the supported subrequests
    Describe,
    /// List the targets a build can select
    List(ListArgs),
    /// Print every registered target, builtins included
    Targets,
    /// Resolve a target and show which handler receives it
    Route(RouteArgs),
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Only list targets under this path
    pub filter: Option<String>,

    /// Print the JSON payload instead of the table
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug)]
pub struct RouteArgs {
    /// Requested build target, empty for the default
    #[arg(default_value = "")]
    pub target: String,

    /// Extra build option passed with the request
    #[arg(long = "opt", value_name = "KEY=VALUE", value_parser = parse_opt)]
    pub opts: Vec<(String, String)>,
}

fn parse_opt(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))
}
