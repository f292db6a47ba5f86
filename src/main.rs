//! Resume Analyzer CLI
//!
//! Renders resume previews and shows stored analysis results.

use anyhow::Context;
use clap::{Parser, Subcommand};
use resume_analyzer::pdf::{PdfPageRasterizer, PdfiumLoader, SourceDocument};
use resume_analyzer::{resolve_input, AppConfig, AppState, FileStore, ResumePage};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Resume Analyzer - preview resumes and review their analysis
#[derive(Parser, Debug)]
#[command(name = "resume-analyzer")]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Analysis store file, overrides the configuration
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the first page of each PDF into a PNG preview
    Convert {
        /// Input PDF(s): paths, file:// URLs or percent-encoded paths
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Directory for the previews (default: next to each input)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Store an analysis record under resume:<ID>
    Import {
        id: String,

        /// JSON file holding the record
        record: PathBuf,
    },

    /// Show the analysis stored under resume:<ID>
    Show {
        id: String,

        /// Print the page as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resume_analyzer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(store) = args.store {
        config.store_path = store;
    }
    tracing::debug!(?config, "configuration loaded");

    let rasterizer = PdfPageRasterizer::new(PdfiumLoader::new(config.pdfium_library_path.clone()));
    let store = FileStore::new(config.store_path.clone());

    match args.command {
        Command::Convert {
            inputs,
            out_dir,
            json,
        } => {
            let state =
                AppState::new(rasterizer, store).with_output_dir(out_dir.or(config.output_dir));
            let ok = convert(&state, &inputs, json).await?;
            if !ok {
                std::process::exit(1);
            }
        }
        Command::Import { id, record } => {
            let raw = tokio::fs::read_to_string(&record)
                .await
                .with_context(|| format!("failed to read {}", record.display()))?;
            let state = AppState::new(rasterizer, store);
            let key = state.import_resume(&id, &raw).await?;
            println!("Stored analysis as {}", key);
        }
        Command::Show { id, json } => {
            let state = AppState::new(rasterizer, store);
            let page = state.get_resume(Some(&id)).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&page)?);
            } else {
                print!("{}", page);
            }
            if matches!(page, ResumePage::Failed(_)) {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn convert(
    state: &AppState<PdfiumLoader, FileStore>,
    inputs: &[String],
    json: bool,
) -> anyhow::Result<bool> {
    let mut documents = Vec::new();
    let mut missing = Vec::new();
    for input in inputs {
        match resolve_input(input) {
            Some(path) => documents.push(SourceDocument::from_path(path)),
            None => missing.push(input.clone()),
        }
    }

    for input in &missing {
        eprintln!("Error: File not found: {}", input);
    }

    let outcomes = state.convert_documents(documents).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    } else {
        for outcome in &outcomes {
            match (&outcome.written_to, outcome.result.error(), &outcome.write_error) {
                (Some(path), None, _) => println!("✓ {} -> {}", outcome.source, path.display()),
                (_, Some(error), _) => eprintln!("✗ {}: {}", outcome.source, error),
                (_, None, Some(error)) => eprintln!("✗ {}: {}", outcome.source, error),
                (None, None, None) => eprintln!("✗ {}: no output", outcome.source),
            }
        }

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        println!();
        println!("Converted: {}", succeeded);
        println!("Failed: {}", outcomes.len() - succeeded + missing.len());
    }

    Ok(missing.is_empty() && outcomes.iter().all(|o| o.is_success()))
}
