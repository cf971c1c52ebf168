use anyhow::{Context, Result};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use trawl_browser::CdpSession;
use trawl_core::{StopReason, TrawlConfig};
use trawl_engine::{discover, Event, EventLogger};
use trawl_store::{save_discovery, OutputLock, OutputPaths};

/// Execute `trawl discover`
pub fn execute(config: &TrawlConfig) -> Result<ExitCode> {
    let paths = OutputPaths::new(&config.output.dir);
    let _lock = OutputLock::acquire(&paths)?;
    let mut log = EventLogger::new(&paths);

    let cancel = CancellationToken::new();
    super::ctrlc_cancel(cancel.clone());

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(async {
        let session = CdpSession::connect(&config.browser.cdp_url).await?;
        let tab = session.primary_tab().await?;
        anyhow::Ok(discover(&tab, config, &cancel).await?)
    })?;

    let written =
        save_discovery(&paths, &report, &config.site.base_url).context("writing task lists")?;
    log.record(Event::DiscoveryFinished {
        listing_url: report.listing_url.clone(),
        found: report.ids.len(),
        passes: report.passes,
        stop_reason: report.stop_reason,
    });

    println!(
        "Found {} task(s) in {} scroll pass(es)",
        report.ids.len(),
        report.passes
    );
    if written != report.ids.len() {
        println!("Task list now holds {written} task(s)");
    }
    println!("  {}", paths.urls_txt.display());
    println!("  {}", paths.urls_json.display());

    match report.stop_reason {
        StopReason::Settled => Ok(ExitCode::SUCCESS),
        StopReason::PassLimit => {
            println!("Stopped at the pass limit; the listing may have more tasks.");
            Ok(ExitCode::SUCCESS)
        }
        StopReason::Cancelled => {
            println!("Interrupted; the list is partial.");
            Ok(ExitCode::from(2))
        }
    }
}
