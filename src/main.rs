use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

use meetup_scraper::browser::ChromeLauncher;
use meetup_scraper::config::ScraperConfig;
use meetup_scraper::constants::DEFAULT_MAX_EVENTS;
use meetup_scraper::error::ScraperError;
use meetup_scraper::logging;
use meetup_scraper::pipeline::{Pipeline, PipelineResult, RunOptions};
use meetup_scraper::session::{FileSessionStore, LoginOutcome, StdinConfirmation};
use meetup_scraper::types::Limit;

#[derive(Parser)]
#[command(name = "meetup_scraper")]
#[command(about = "Scrape a Meetup group's past events into JSON and CSV")]
#[command(version)]
struct Cli {
    /// Group URL name, e.g. python-seattle
    group: String,

    /// Number of events to collect, or "all"
    #[arg(long, default_value_t = Limit::Count(DEFAULT_MAX_EVENTS))]
    max_events: Limit,

    /// Do not write events.csv
    #[arg(long)]
    no_csv: bool,

    /// Do not write per-event data.json files
    #[arg(long)]
    no_json: bool,

    /// Leave cancelled events out of the output
    #[arg(long)]
    skip_cancelled: bool,

    /// Keep the browser window visible for the whole run
    #[arg(long)]
    show_browser: bool,

    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory for event files
    #[arg(long)]
    events_dir: Option<PathBuf>,

    /// Where the login session is stored
    #[arg(long)]
    session_file: Option<PathBuf>,

    /// Console log level (overridden by RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            group: self.group.clone(),
            limit: self.max_events,
            csv: !self.no_csv,
            json: !self.no_json,
            skip_cancelled: self.skip_cancelled,
            show_browser: self.show_browser,
        }
    }

    fn load_config(&self) -> anyhow::Result<ScraperConfig> {
        let mut config = ScraperConfig::load(self.config.as_deref()).context("Failed to load configuration")?;
        if let Some(dir) = &self.events_dir {
            config.paths.events_dir = dir.clone();
        }
        if let Some(file) = &self.session_file {
            config.paths.session_file = Some(file.clone());
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        Ok(config)
    }
}

fn print_summary(result: &PipelineResult) {
    println!("\n📊 Results for {}:", result.group);
    let login = match result.login {
        LoginOutcome::RestoredSession => "reused stored session",
        LoginOutcome::LoggedIn => "logged in interactively",
        LoginOutcome::NoLoginRequired => "no login required",
    };
    println!("   Session: {}", login);
    println!("   Event URLs found: {} ({:?})", result.harvested, result.stop);
    println!("   Events saved: {}", result.events.len());
    if result.skipped_cancelled > 0 {
        println!("   Cancelled (skipped): {}", result.skipped_cancelled);
    }
    println!("   Failed: {}", result.failures.len());
    if !result.json_files.is_empty() {
        println!("   JSON files: {} under {}", result.json_files.len(), result.events_dir.display());
    }
    if let Some(csv) = &result.csv_file {
        println!("   CSV file: {}", csv.display());
    }

    if !result.failures.is_empty() {
        println!("\n⚠️  Events that could not be scraped:");
        for failure in &result.failures {
            println!("   - {}: {}", failure.url, failure.reason);
        }
    }
}

/// One-line hint for errors an operator can act on.
fn hint(err: &anyhow::Error) -> Option<&'static str> {
    match err.downcast_ref::<ScraperError>()? {
        ScraperError::NoOutputFormatSelected => Some("Drop --no-csv or --no-json."),
        ScraperError::GroupUnreachable { .. } => Some("Check the group name in the Meetup URL."),
        ScraperError::LoginVerificationFailed | ScraperError::LoginRequired { .. } => {
            Some("Run again and finish logging in before pressing ENTER.")
        }
        ScraperError::Browser(_) => Some("Is Chrome or Chromium installed? Set browser.chrome_executable if needed."),
        _ => None,
    }
}

async fn run(cli: &Cli, config: &ScraperConfig) -> anyhow::Result<PipelineResult> {
    let options = cli.run_options();
    // Fail on a bad invocation before a browser ever starts.
    options.validate()?;

    let store = FileSessionStore::new(config.session_file(), config.session_ttl());
    let launcher = ChromeLauncher::new(config.browser.clone());
    let signal = StdinConfirmation;
    let pipeline = Pipeline::new(config, &store, &launcher, &signal);

    let result = pipeline.run(&options).await?;
    Ok(result)
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("❌ Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let code = runtime.block_on(run_cli(cli));
    // Do not wait on a login prompt still reading stdin after Ctrl-C.
    runtime.shutdown_background();
    code
}

async fn run_cli(cli: Cli) -> ExitCode {
    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging; the guard flushes the file writer on drop
    let _guard = logging::init_logging(&config.logging);

    println!("🚀 Scraping past events for {}...", cli.group);

    let outcome = tokio::select! {
        outcome = run(&cli, &config) => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, shutting down");
            println!("\n⏹️  Interrupted");
            return ExitCode::from(130);
        }
    };

    match outcome {
        Ok(result) => {
            info!("Run finished");
            print_summary(&result);
            println!("\n✅ Done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            println!("❌ Run failed: {:#}", e);
            if let Some(hint) = hint(&e) {
                println!("   {}", hint);
            }
            ExitCode::FAILURE
        }
    }
}
