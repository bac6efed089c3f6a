//! Command-line entry point: argument parsing and dispatch, the one piece
//! of the pipeline the core deliberately leaves as an external collaborator.

use std::process::ExitCode;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand, ValueEnum};
use mediacat_config::Config;
use mediacat_store::MediaKind;
use mediacat_utils::logging::{init_logging, LogFormat};

use crate::wiring;

#[derive(Parser)]
#[command(name = "mediacat")]
#[command(about = "Batch cataloging pipeline for scanned CD/LP images")]
#[command(version)]
struct Cli {
    /// Path to an explicit config.toml (overrides discovery)
    #[arg(long, global = true)]
    config: Option<Utf8PathBuf>,

    /// Emit logs as JSON instead of plain text
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum MediaKindArg {
    Cd,
    Lp,
}

impl From<MediaKindArg> for MediaKind {
    fn from(value: MediaKindArg) -> Self {
        match value {
            MediaKindArg::Cd => MediaKind::Cd,
            MediaKindArg::Lp => MediaKind::Lp,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline end to end over a directory of scanned images
    Run {
        /// Directory of scanned images, named `<barcode><a|b|c>.<png|jpg>`
        input_dir: Utf8PathBuf,

        /// Directory under which `results-<timestamp>/` (or `--run-id`) is written
        #[arg(long, default_value = ".")]
        output_dir: Utf8PathBuf,

        /// Media kind for every item in `input_dir` (the filename convention
        /// does not encode it; run CDs and LPs as separate invocations)
        #[arg(long, value_enum, default_value = "cd")]
        media_kind: MediaKindArg,

        /// Resume an existing run directory name instead of starting a fresh one
        #[arg(long)]
        run_id: Option<String>,
    },

    /// Report the status of an existing run directory
    Status {
        /// Path to a `results-*` run directory
        run_dir: Utf8PathBuf,
    },
}

/// Parses arguments and dispatches to a command, returning the process exit
/// code. All output, including error reporting, happens here.
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging(if cli.log_json { LogFormat::Json } else { LogFormat::Plain }, "info");

    let config = match Config::discover(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Run {
            input_dir,
            output_dir,
            media_kind,
            run_id,
        } => run_pipeline(&config, &input_dir, &output_dir, run_id, media_kind.into()),
        Commands::Status { run_dir } => report_status(&run_dir),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run_pipeline(
    config: &Config,
    input_dir: &Utf8Path,
    output_dir: &Utf8Path,
    run_id: Option<String>,
    media_kind: MediaKind,
) -> anyhow::Result<()> {
    let run_id = run_id.unwrap_or_else(mediacat_utils::paths::new_run_dir_name);
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let handles = wiring::build_run(config, input_dir, output_dir, &run_id, media_kind)?;
        let report = handles.controller.run(None).await;
        mediacat_engine::write_run_outputs(&handles.store, &handles.ledger)?;

        println!(
            "run {} complete: {} item(s), {} finished, {} failed",
            handles.handle.run_id,
            report.total_items,
            report.completed,
            report.failed.len()
        );
        for (barcode, reason) in &report.failed {
            println!("  failed {barcode}: {reason}");
        }
        println!("total cost: ${:.4}", handles.ledger.total_cost_usd());
        println!("output: {}", handles.handle.run_dir);
        anyhow::Ok(())
    })
}

fn report_status(run_dir: &Utf8Path) -> anyhow::Result<()> {
    let (store, handle) = mediacat_store::WorkflowStore::create_or_load_run(run_dir, run_dir.file_name().unwrap_or("run"), &[])?;
    let items = store.all_items();
    println!("run {} ({} item(s)):", handle.run_id, items.len());

    let mut by_status: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for item in &items {
        *by_status.entry(format!("{:?}", item.status)).or_default() += 1;
    }
    for (status, count) in by_status {
        println!("  {status}: {count}");
    }
    Ok(())
}
