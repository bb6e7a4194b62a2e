use std::io::{self, Write};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use gypsum::{initial_variables, render_order, render_targets};
use gypsum_resolve::{load, GeneratorInputInfoBuilder, Resolution, ResolverConfig};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Resolve build files into ordered, fully expanded targets
#[derive(Parser)]
#[command(name = "gypsum", version, about, long_about = None)]
struct Cli {
    /// Raise the log level (-v info, -vv debug, -vvv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print qualified target names, every target after its dependencies
    Order(ResolveArgs),
    /// Print the resolved targets as a literal map
    Dump(ResolveArgs),
}

#[derive(Args)]
struct ResolveArgs {
    /// Build files to resolve
    #[arg(required = true)]
    files: Vec<String>,

    /// Set a variable: NAME=VALUE, or NAME alone for 1
    #[arg(short = 'D', value_name = "NAME[=VALUE]")]
    defines: Vec<String>,

    /// Include this file in every target build file
    #[arg(short = 'I', long = "include")]
    includes: Vec<String>,

    /// Directory DEPTH is computed against
    #[arg(long)]
    depth: Option<String>,

    /// Only keep these targets and what they depend on
    #[arg(short = 'R', long = "root-target")]
    root_targets: Vec<String>,

    /// Allow dependency cycles between build files
    #[arg(long)]
    no_circular_check: bool,

    /// Honor `toolsets` lists instead of building everything for `target`
    #[arg(long)]
    multiple_toolsets: bool,

    /// Variables to seed before any -D, shell-split
    #[arg(long, env = "GYP_DEFINES", hide_env_values = true)]
    gyp_defines: Option<String>,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("gypsum={level},gypsum_resolve={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn resolve(args: &ResolveArgs) -> Result<Resolution> {
    let variables = initial_variables(args.gyp_defines.as_deref(), &args.defines)?;
    debug!(?variables, "Initial variables");

    let config = ResolverConfig::builder()
        .generator(
            GeneratorInputInfoBuilder::default()
                .supports_multiple_toolsets(args.multiple_toolsets)
                .build()?,
        )
        .root_targets(args.root_targets.clone())
        .circular_check(!args.no_circular_check)
        .build()?;

    load(
        &args.files,
        &variables,
        &args.includes,
        args.depth.as_deref(),
        &config,
    )
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = match &cli.command {
        Command::Order(args) => render_order(&resolve(args)?),
        Command::Dump(args) => render_targets(&resolve(args)?),
    };

    io::stdout().lock().write_all(output.as_bytes())?;
    Ok(())
}
