//! `irs990` command line front end

use clap::{Parser, Subcommand};
use irs990_etl::{CliSchemaGenerator, Config, NoOpSchemaGenerator, Pipeline, SchemaGenerator};
use serde::Serialize;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, warn};

#[derive(Parser)]
#[command(
    name = "irs990",
    about = "Acquire, extract and flatten IRS Form 990 e-file archives",
    version
)]
struct Cli {
    /// JSON configuration file (defaults are used when omitted)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "irs990_etl=info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download filing archives not present locally
    Sync,
    /// Refresh the newest schema per year and category, then generate code
    Schemas,
    /// Extract every downloaded filing archive
    Extract {
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Flatten extracted filings into the output CSV
    Flatten,
}

const CONFIRM_TRIES: usize = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path),
        None => Ok(Config::default()),
    };
    let pipeline = match config.and_then(Pipeline::new) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    tokio::spawn(irs990_etl::cancel_on_signal(pipeline.cancellation_token()));

    let result = match cli.command {
        Commands::Sync => pipeline.sync_filings().await.and_then(|r| print_report(&r)),
        Commands::Schemas => {
            let generator = schema_generator(pipeline.config());
            pipeline
                .sync_schemas(generator.as_ref())
                .await
                .and_then(|r| print_report(&r))
        }
        Commands::Extract { yes } => {
            let prompt = format!(
                "This extracts every archive in {} next to itself, overwriting earlier output.",
                pipeline.config().storage.filings_dir.display()
            );
            if !yes && !confirm(&prompt, CONFIRM_TRIES) {
                eprintln!("Aborting");
                return ExitCode::SUCCESS;
            }
            pipeline.extract().await.and_then(|r| print_report(&r))
        }
        Commands::Flatten => pipeline.flatten().await.and_then(|r| print_report(&r)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, code = e.error_code(), "command failed");
            ExitCode::FAILURE
        }
    }
}

fn schema_generator(config: &Config) -> Box<dyn SchemaGenerator> {
    match CliSchemaGenerator::from_config(&config.schema_gen) {
        Some(generator) => Box::new(generator),
        None => {
            warn!(
                tool = %config.schema_gen.tool_name,
                "schema generator not found, schemas will be downloaded and extracted only"
            );
            Box::new(NoOpSchemaGenerator)
        }
    }
}

fn print_report<T: Serialize>(report: &T) -> irs990_etl::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    println!("{}", json);
    Ok(())
}

/// Ask on stdin; an empty answer re-asks, anything starting with `y` accepts
fn confirm(message: &str, tries: usize) -> bool {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();

    for _ in 0..tries {
        print!("{} Proceed? [y/n]: ", message);
        let _ = std::io::stdout().flush();

        let mut answer = String::new();
        match input.read_line(&mut answer) {
            Ok(0) | Err(_) => return false,
            Ok(_) => {}
        }
        let answer = answer.trim().to_lowercase();
        if answer.is_empty() {
            continue;
        }
        return answer.starts_with('y');
    }
    false
}
