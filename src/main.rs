use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

mod assembler;
mod config;
mod connectivity;
mod database;
mod datatypes;
mod error;
mod extract;
mod fields;
mod filter;
mod inp;
mod observer;
mod post_processor;
mod rebuild;

use crate::{
    assembler::Dataset, database::JsonDatabaseOpener, datatypes::ResultSet, error::ZoiError,
    observer::LogObserver,
};

/// Zone-of-interest extraction and field transfer for relaxation models
#[derive(Parser)]
#[command(name = "zoimap")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Extracts a zone of interest from simulation results and maps it onto a 2D relaxation model", long_about = None)]
struct Cli {
    /// Log file. `extract` starts it afresh, the other commands append to it
    #[arg(long, default_value = "log/zoimap_log.txt")]
    log: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the zone of interest of every configured result database
    Extract(ExtractArgs),
    /// Write initial stress and hardening conditions into an input deck
    PatchInp(PatchInpArgs),
    /// Export element centroids with S11 and PEEQ as csv
    ExportCsv(ExportCsvArgs),
}

#[derive(Args)]
struct ExtractArgs {
    /// Extraction configuration, one entry per result database
    #[arg(long)]
    config: PathBuf,
    /// Output data document
    #[arg(long, default_value = "config/data.json")]
    output: PathBuf,
    /// Show a progress bar while field records are walked
    #[arg(long)]
    progress: bool,
}

#[derive(Args)]
struct PatchInpArgs {
    /// Data document written by `extract`
    #[arg(long)]
    data: PathBuf,
    /// Source whose fields seed the initial conditions
    #[arg(long)]
    source: String,
    /// Input deck to patch
    #[arg(long)]
    inp: PathBuf,
    /// Patched deck
    #[arg(long)]
    out: PathBuf,
    /// Instance name of the rebuilt part in the deck
    #[arg(long, default_value = "ZOI-1")]
    instance: String,
}

#[derive(Args)]
struct ExportCsvArgs {
    /// Data document written by `extract`
    #[arg(long)]
    data: PathBuf,
    /// Source to export
    #[arg(long)]
    source: String,
    /// Output csv
    #[arg(long)]
    out: PathBuf,
}

/// Opens the log file, truncating it or appending to it
fn open_log(path: &Path, truncate: bool) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut options = OpenOptions::new();
    if truncate {
        options.write(true).truncate(true);
    } else {
        options.append(true);
    }
    options.create(true).open(path)
}

fn source<'a>(dataset: &'a Dataset, name: &str) -> Result<&'a ResultSet, ZoiError> {
    match dataset.get(name) {
        Some(s) => Ok(s),
        None => Err(ZoiError::Config(format!(
            "Source '{name}' not found in data document, available: {}",
            dataset.source_names().join(", ")
        ))),
    }
}

fn run_extract(args: &ExtractArgs) -> Result<(), ZoiError> {
    let config_path = args.config.to_string_lossy();
    let extraction_config = config::load_config(&config_path)?;
    info!(
        config = %config_path,
        sources = extraction_config.sources.len(),
        "loaded extraction config"
    );

    let mut observer = LogObserver::new(args.progress);
    let dataset = extract::run(&extraction_config, &JsonDatabaseOpener, &mut observer)?;
    dataset.save(&args.output, &mut observer)
}

fn run_patch_inp(args: &PatchInpArgs) -> Result<(), ZoiError> {
    let dataset = Dataset::load(&args.data)?;
    let result = source(&dataset, &args.source)?;

    inp::patch_file(&args.inp, &args.out, result, &args.instance)?;
    info!(
        source = %args.source,
        elements = result.elements().len(),
        output = %args.out.display(),
        "wrote initial conditions"
    );
    Ok(())
}

fn run_export_csv(args: &ExportCsvArgs) -> Result<(), ZoiError> {
    let dataset = Dataset::load(&args.data)?;
    let mesh = rebuild::planar_mesh(source(&dataset, &args.source)?)?;

    let rows = post_processor::csv_output(&mesh, &args.out)?;
    info!(rows, output = %args.out.display(), "wrote element csv");
    Ok(())
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Extract(_) => "extract",
        Commands::PatchInp(_) => "patch-inp",
        Commands::ExportCsv(_) => "export-csv",
    }
}

fn main() {
    let cli = Cli::parse();

    let truncate = matches!(cli.command, Commands::Extract(_));
    let log_file = match open_log(&cli.log, truncate) {
        Ok(f) => f,
        Err(err) => {
            eprintln!("error: unable to open log file {}: {err}", cli.log.display());
            std::process::exit(1)
        }
    };
    let subscriber = tracing_subscriber::fmt()
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .with_target(false)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("error: unable to install logger: {err}");
        std::process::exit(1)
    }

    info!(command = command_name(&cli.command), "starting");
    let outcome = match &cli.command {
        Commands::Extract(args) => run_extract(args),
        Commands::PatchInp(args) => run_patch_inp(args),
        Commands::ExportCsv(args) => run_export_csv(args),
    };

    match outcome {
        Ok(()) => info!("End."),
        Err(err) => {
            error!(
                "\n====================================================\n\
                 [COMMAND ERROR] An error occurred during execution:\n{err}\n\
                 ===================================================="
            );
            std::process::exit(1)
        }
    }
}
