mod cmd_collect;
mod cmd_discover;
mod cmd_status;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use trawl_core::{load_config, TrawlConfig};

#[derive(Parser)]
#[command(name = "trawl", version, about = "Archive Codex tasks from a logged-in Chrome")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,

    /// YAML config file (every field is optional)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    overrides: Overrides,
}

/// Flags that take precedence over the config file.
#[derive(Args, Default)]
struct Overrides {
    /// Chrome remote-debugging endpoint, e.g. http://localhost:9222
    #[arg(long, global = true)]
    cdp_url: Option<String>,
    /// Site origin, e.g. https://chatgpt.com
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Output directory for records, lists and summaries
    #[arg(long, global = true)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Scroll the task listing and write task_urls.txt / task_urls.json
    Discover,
    /// Visit each task and save one JSON record per task
    Collect {
        /// Identifier list to collect (URLs or bare ids, .txt or .json).
        /// Defaults to the discovery output in the output directory.
        #[arg(long)]
        ids_file: Option<PathBuf>,
        /// Skip the first N identifiers of the list
        #[arg(long, default_value = "0")]
        start: usize,
        /// Collect at most N identifiers
        #[arg(long)]
        limit: Option<usize>,
        /// Re-collect tasks that already have a complete record
        #[arg(long)]
        force: bool,
        /// Number of browser tabs to collect with
        #[arg(long)]
        tabs: Option<usize>,
        /// Attempts per task before giving up
        #[arg(long)]
        max_attempts: Option<u32>,
        /// Do not write diagnostic screenshots
        #[arg(long)]
        no_screenshots: bool,
    },
    /// Show counts and failures from the latest summary.json
    Status,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = load_config(cli.config.as_deref())?;
    cli.overrides.apply(&mut config);

    match cli.cmd {
        Command::Discover => {
            config.validate()?;
            cmd_discover::execute(&config)
        }
        Command::Collect {
            ids_file,
            start,
            limit,
            force,
            tabs,
            max_attempts,
            no_screenshots,
        } => {
            if let Some(tabs) = tabs {
                config.browser.tabs = tabs;
            }
            if let Some(n) = max_attempts {
                config.navigation.max_attempts = n;
            }
            if no_screenshots {
                config.navigation.screenshots = false;
            }
            config.validate()?;
            cmd_collect::execute(
                &config,
                &cmd_collect::CollectParams {
                    ids_file: ids_file.as_deref(),
                    start,
                    limit,
                    force,
                },
            )
        }
        Command::Status => cmd_status::execute(&config.output.dir),
    }
}

impl Overrides {
    fn apply(&self, config: &mut TrawlConfig) {
        if let Some(url) = &self.cdp_url {
            config.browser.cdp_url = url.clone();
        }
        if let Some(url) = &self.base_url {
            config.site.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(dir) = &self.output {
            config.output.dir = dir.clone();
        }
    }
}

/// Diagnostics go to stderr; stdout carries the command's report.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Cancel `cancel` on Ctrl+C; the run winds down at its next suspension point.
fn ctrlc_cancel(cancel: CancellationToken) {
    let _ = ctrlc::set_handler(move || {
        eprintln!("\ninterrupted, finishing current task and writing summary...");
        cancel.cancel();
    });
}
