//! Subscriber Enrichment CLI
//!
//! Reads a CSV of email addresses, looks each one up against the subscriber
//! API and writes the enriched table, checkpointing after every batch.
//!
//! Usage:
//!   subscriber-enrich --input customers.csv --output out/enriched.csv --resume
//!
//! Any path not given on the command line is prompted for. The API token
//! is read from `MANYCHAT_API_TOKEN` (a `.env` file is honoured).

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use colored::Colorize;

use subscriber_enrich::{
    logging, BatchRunner, EnrichError, EnricherConfig, HttpSubscriberLookup, ProgressReporter,
    RunStats,
};

#[derive(Parser, Debug)]
#[command(name = "subscriber-enrich")]
#[command(about = "Enrich a CSV of email addresses with subscriber data")]
struct Args {
    /// Input CSV containing an `email` column
    #[arg(long, short = 'i')]
    input: Option<PathBuf>,

    /// Output CSV (also the checkpoint); defaults to a timestamped name
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Resume from the output file if it exists, without asking
    #[arg(long, conflicts_with = "no_resume")]
    resume: bool,

    /// Start over even if the output file exists, without asking
    #[arg(long)]
    no_resume: bool,

    /// Keys per batch
    #[arg(long, short = 'b')]
    batch_size: Option<usize>,

    /// Column holding the email address
    #[arg(long, default_value = "email")]
    key_column: String,
}

/// Prints a progress line per batch.
struct ConsoleProgress;

impl ProgressReporter for ConsoleProgress {
    fn run_started(&self, pending: usize, already_processed: usize) {
        if already_processed > 0 {
            println!(
                "{} {} already processed",
                "Resuming:".cyan().bold(),
                already_processed
            );
        }
        println!("{} {} emails to process", "Found:".green().bold(), pending);
    }

    fn batch_completed(&self, batch: usize, completed: usize, pending: usize) {
        println!(
            "[{}/{}] {} batch {}",
            completed,
            pending,
            "Processed".blue(),
            batch
        );
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    println!("{}", "Subscriber Data Extractor".blue().bold());
    println!("{}", "=".repeat(50));

    match run(args).await {
        Ok(output) => {
            println!(
                "\n{} {}",
                "Output saved to:".green().bold(),
                output.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("\n{} {:#}", "ERROR:".red().bold(), e);
            tracing::error!(error = %format!("{:#}", e), "Program terminated with error");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> Result<PathBuf> {
    let mut config = EnricherConfig::from_env()?;
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    config.key_column = args.key_column;

    let log_path = logging::init(&config.log_dir).context("Failed to initialise logging")?;
    tracing::info!(path = %log_path.display(), "Logging to file");

    let token = config.api_token()?;
    let lookup = HttpSubscriberLookup::new(&config, token)?;

    let input = match args.input {
        Some(path) => path,
        None => PathBuf::from(prompt("Enter the path to your input CSV file: ")?),
    };
    if !input.exists() {
        return Err(EnrichError::InputNotFound(input).into());
    }

    let output = match args.output {
        Some(path) => path,
        None => {
            let answer =
                prompt("Enter the path to your output CSV file (or press Enter for auto-generated): ")?;
            if answer.is_empty() {
                let generated = default_output_path();
                println!("Using auto-generated output file: {}", generated.display());
                generated
            } else {
                PathBuf::from(answer)
            }
        }
    };

    let resume = if output.exists() {
        if args.resume {
            true
        } else if args.no_resume {
            false
        } else {
            prompt("Output file exists. Resume from previous run? (y/n): ")?
                .to_lowercase()
                .starts_with('y')
        }
    } else {
        false
    };

    let runner = BatchRunner::from_config(&config, Arc::new(lookup), Arc::new(ConsoleProgress));
    let result = runner
        .run_file(&input, &config.key_column, &output, resume)
        .await;

    let stats = runner.stats().await;
    if result.is_ok() {
        println!("\n{}", "Extraction Complete!".green().bold());
    }
    print_summary(&stats);

    Ok(result?)
}

fn default_output_path() -> PathBuf {
    PathBuf::from(format!(
        "manychat_data_{}.csv",
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}

fn prompt(message: &str) -> Result<String> {
    print!("{}", message);
    io::stdout().flush().context("Failed to flush stdout")?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}

fn print_summary(stats: &RunStats) {
    let rendered = stats.render();
    for line in rendered.lines() {
        match line {
            "Extraction Summary" | "Errors" => println!("{}", line.bold()),
            _ => println!("{}", line),
        }
    }
    if stats.failed > 0 {
        println!(
            "{} {} lookups failed; see the log for details",
            "WARNING:".yellow(),
            stats.failed
        );
    }
}
