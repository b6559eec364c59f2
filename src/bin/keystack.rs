// Keystack CLI
// Compile a declaration file into host engine JSON

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use keystack_core::{coverage, Config};

/// Layer and sequence compiler for flag-driven key remapping rules
#[derive(Parser, Debug)]
#[command(name = "keystack")]
#[command(version)]
#[command(about = "Compile keystack declarations into host engine rules", long_about = None)]
struct Args {
    /// TOML declaration file (default: ~/.config/keystack/keystack.toml)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Write the rendered JSON here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Compile and report, without writing JSON
    #[arg(long)]
    check: bool,

    /// Print the static coverage report
    #[arg(long)]
    report: bool,

    /// Fail if any rule can never fire
    #[arg(long)]
    strict: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("keystack").join("keystack.toml"))
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn run(args: &Args) -> Result<()> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_path().context("could not determine the config directory; pass --config")?,
    };

    let config = Config::from_toml_path(&path).with_context(|| format!("failed to load {}", path.display()))?;
    let document = config
        .compile()
        .with_context(|| format!("failed to compile {}", path.display()))?;
    log::info!(
        "{}: {} profiles, {} rules, {} flags",
        path.display(),
        document.profiles().len(),
        document.rule_count(),
        document.flags().len()
    );

    let report = coverage(&document);
    if args.report {
        eprint!("{}", report);
    }
    if args.strict && report.has_unreachable() {
        bail!("{} unreachable rules", report.unreachable.len());
    }

    if args.check {
        println!(
            "Declarations are valid: {} profiles, {} rules",
            document.profiles().len(),
            document.rule_count()
        );
        return Ok(());
    }

    let json = document.to_json().context("failed to render JSON")?;
    match &args.output {
        Some(output) => {
            fs::write(output, json + "\n").with_context(|| format!("failed to write {}", output.display()))?;
            log::info!("wrote {}", output.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    run(&args)
}
