use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the Tessera binary.
#[derive(Debug, Parser)]
#[command(name = "tessera", version, about = "Tessera block rendering pipeline")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "TESSERA_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Build a page and print the rendered result as JSON.
    Render(RenderArgs),
    /// Evaluate a formula expression against a request.
    Eval(EvalArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the content fixture file.
    #[arg(
        long = "fixture",
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        global = true
    )]
    pub fixture: Option<PathBuf>,

    /// Override the named template directory.
    #[arg(
        long = "templates",
        value_name = "DIR",
        value_hint = ValueHint::DirPath,
        global = true
    )]
    pub templates: Option<PathBuf>,

    /// Disable the block cache.
    #[arg(long = "no-cache", action = clap::ArgAction::SetTrue, global = true)]
    pub no_cache: bool,
}

#[derive(Debug, Args, Clone)]
pub struct RequestArgs {
    /// Request path the page is rendered for.
    #[arg(long, default_value = "/")]
    pub path: String,

    /// Raw query string, with or without the leading `?`.
    #[arg(long, default_value = "")]
    pub query: String,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    /// Id or uid of the page to render.
    #[arg(value_name = "PAGE_ID")]
    pub page_id: String,

    #[command(flatten)]
    pub request: RequestArgs,

    /// Build blocks one after another instead of concurrently.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub sequential: bool,

    /// Override the page build deadline.
    #[arg(long = "deadline-ms", value_name = "MILLIS")]
    pub deadline_ms: Option<u64>,

    /// Number of consecutive renders; later ones are served from the block cache.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=16))]
    pub repeat: u32,
}

#[derive(Debug, Args, Clone)]
pub struct EvalArgs {
    /// Expression containing `@name(args)` calls.
    #[arg(value_name = "EXPR")]
    pub expr: String,

    #[command(flatten)]
    pub request: RequestArgs,
}
