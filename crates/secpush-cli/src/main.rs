//! secpush-cli — the thin CLI wrapper: parse flags, init tracing, load
//! config, call `secpush::run`, map the result to spec.md §6's exit codes.
//!
//! Grounded on `kvx-cli/src/main.rs` (tracing_subscriber init, cause-chain
//! error printing) and `other_examples/jacobtread-secret-sync` for the
//! `clap::Parser` derive shape (repeatable `-f`, `ValueEnum` for
//! `--print-format`).

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::error;
use tracing_subscriber::EnvFilter;

use secpush::reporter::PrintFormat;

#[derive(Parser)]
#[command(name = "secpush", version, about = "Push secrets from sources to AWS sinks")]
struct Args {
    /// Config document to load; repeat to layer documents, later wins.
    #[arg(short = 'f', long = "file", required = true)]
    file: Vec<PathBuf>,

    /// Suppress AWS writes; print the preview instead.
    #[arg(long)]
    dry_run: bool,

    /// Include value snapshots in output.
    #[arg(long)]
    print_values: bool,

    /// Preview format used with --dry-run.
    #[arg(long, value_enum, default_value_t = PrintFormatArg::List)]
    print_format: PrintFormatArg,

    /// Print a line per dispatched item during sync.
    #[arg(long)]
    print_sync_details: bool,
}

#[derive(ValueEnum, Clone, Copy)]
enum PrintFormatArg {
    List,
    Table,
    Json,
}

impl From<PrintFormatArg> for PrintFormat {
    fn from(value: PrintFormatArg) -> Self {
        match value {
            PrintFormatArg::List => PrintFormat::List,
            PrintFormatArg::Table => PrintFormat::Table,
            PrintFormatArg::Json => PrintFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();

    let config = match secpush::app_config::load(&args.file) {
        Ok(config) => config,
        Err(err) => {
            error!("configuration error: {err}");
            for cause in err.chain().skip(1) {
                error!("  cause: {cause}");
            }
            std::process::exit(2);
        }
    };

    let options = secpush::RunOptions {
        dry_run: args.dry_run,
        print_values: args.print_values,
        print_format: args.print_format.into(),
        print_sync_details: args.print_sync_details,
    };

    let outcome = secpush::run(config, options).await.context("run failed")?;
    std::process::exit(outcome.exit_code());
}
