use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use dialoguer::{Input, theme::ColorfulTheme};
use std::io::IsTerminal;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod charset;
mod classifier;
mod config;
mod dedupe;
mod domain;
mod error;
mod extractor;
mod fetcher;
mod models;
mod patterns;
mod pipeline;
mod processor;
mod report;
mod search;
mod structured;
mod translate;

use config::{SettingsArgs, build_config, resolve_credentials};
use models::RunMetadata;
use pipeline::Pipeline;

const DEFAULT_MAX_RESULTS: usize = 10;

#[derive(Parser)]
#[command(author, version, about = "Finds company websites for a keyword and location and extracts their contact details", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a search and write a report
    Search {
        /// What to search for, e.g. "law firm"
        #[arg(short, long)]
        keyword: Option<String>,

        /// Where to search, e.g. "Springfield, IL"
        #[arg(short, long)]
        location: Option<String>,

        /// Maximum number of unique company sites in the report
        #[arg(short = 'n', long)]
        max_results: Option<usize>,

        #[command(flatten)]
        settings: SettingsArgs,
    },
    /// Start the API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 8080)]
        port: u16,

        #[command(flatten)]
        settings: SettingsArgs,
    },
}

fn prompt_text(prompt: &str, allow_empty: bool) -> Result<String> {
    let value: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .allow_empty(allow_empty)
        .interact_text()?;
    Ok(value.trim().to_string())
}

/// Takes the flag value, else asks on a terminal.
fn value_or_prompt(value: Option<String>, prompt: &str, allow_empty: bool) -> Result<String> {
    match value {
        Some(v) => Ok(v.trim().to_string()),
        None if std::io::stdin().is_terminal() => prompt_text(prompt, allow_empty),
        None => Ok(String::new()),
    }
}

fn max_results_or_prompt(value: Option<usize>) -> Result<usize> {
    if let Some(n) = value {
        return Ok(n);
    }
    if !std::io::stdin().is_terminal() {
        return Ok(DEFAULT_MAX_RESULTS);
    }
    let n: usize = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Maximum number of results")
        .default(DEFAULT_MAX_RESULTS)
        .interact_text()?;
    Ok(n)
}

async fn run_search(
    keyword: Option<String>,
    location: Option<String>,
    max_results: Option<usize>,
    settings: SettingsArgs,
) -> Result<()> {
    let config = build_config(&settings)?;
    let credentials = resolve_credentials(&config, true)?;

    let keyword = value_or_prompt(keyword, "Enter search keywords", false)?;
    if keyword.is_empty() {
        bail!(error::AppError::ConfigurationMissing(
            "search keyword (use --keyword)".to_string()
        ));
    }
    let location = value_or_prompt(location, "Enter location (optional)", true)?;
    let max_results = max_results_or_prompt(max_results)?;

    let mode = config.mode;
    let output_dir = config.output_dir.clone();
    let format = config.report_format;
    let pipeline = Pipeline::new(config, credentials)?;

    let progress_bar = indicatif::ProgressBar::new(0);
    progress_bar.set_style(
        indicatif::ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("##-"),
    );
    progress_bar.set_message("candidates");

    let meta = RunMetadata::new(&keyword, &location, mode);
    let report = pipeline
        .run_with_progress(&keyword, &location, max_results, mode, &progress_bar)
        .await;
    progress_bar.finish_with_message("Processing complete");

    if report.is_empty() {
        info!("No company sites found for '{} {}'", keyword, location);
    }
    let path = report::write_report(&output_dir, format, &report, &meta)?;
    println!("Found {} results. Report saved to {}", report.len(), path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Search {
            keyword,
            location,
            max_results,
            settings,
        } => {
            if let Err(e) = run_search(keyword, location, max_results, settings).await {
                tracing::error!("{:#}", e);
                return Err(e);
            }
        }
        Commands::Serve { port, settings } => {
            let config = build_config(&settings)?;
            let credentials = resolve_credentials(&config, false)?;
            let pipeline = Pipeline::new(config, credentials)?;
            info!("Starting API server on port {}", port);
            api::start_api_server(pipeline, port).await;
        }
    }

    Ok(())
}
