use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use trawl_browser::{BrowserTab, CdpSession};
use trawl_core::{Identifier, TrawlConfig};
use trawl_engine::{run_pipeline, run_pipeline_sharded, Collector, EventLogger, Navigator};
use trawl_store::{load_id_list, FsStore, OutputLock, OutputPaths};

const PROGRESS_EVERY: Duration = Duration::from_secs(30);

pub struct CollectParams<'a> {
    pub ids_file: Option<&'a Path>,
    pub start: usize,
    pub limit: Option<usize>,
    pub force: bool,
}

/// Execute `trawl collect`
pub fn execute(config: &TrawlConfig, params: &CollectParams<'_>) -> Result<ExitCode> {
    let paths = OutputPaths::new(&config.output.dir);
    let source = id_source(&paths, params.ids_file)?;
    let all = load_id_list(&source)?;
    let ids = window(&all, params.start, params.limit);
    if ids.is_empty() {
        println!(
            "Nothing to collect ({} identifier(s) in {}, start {}).",
            all.len(),
            source.display(),
            params.start
        );
        return Ok(ExitCode::SUCCESS);
    }
    println!(
        "Collecting {} of {} task(s) from {}",
        ids.len(),
        all.len(),
        source.display()
    );

    let _lock = OutputLock::acquire(&paths)?;
    let store = Arc::new(FsStore::new(paths.clone()));
    let navigator = Navigator::new(config).with_screenshots(paths.clone());
    let collector =
        Collector::new(navigator, config.markers.clone(), store).with_force(params.force);
    let mut log = EventLogger::new(&paths);

    let cancel = CancellationToken::new();
    super::ctrlc_cancel(cancel.clone());

    let rt = tokio::runtime::Runtime::new()?;
    let summary = rt.block_on(async {
        let session = CdpSession::connect(&config.browser.cdp_url).await?;
        if config.browser.tabs <= 1 {
            let tab = session.primary_tab().await?;
            run_pipeline(&collector, &tab, &ids, &mut log, &cancel).await
        } else {
            let tabs: Vec<Arc<dyn BrowserTab>> = session
                .tabs(config.browser.tabs)
                .await?
                .into_iter()
                .map(|t| Arc::new(t) as Arc<dyn BrowserTab>)
                .collect();
            run_pipeline_sharded(
                Arc::new(collector),
                tabs,
                &ids,
                &mut log,
                &cancel,
                PROGRESS_EVERY,
            )
            .await
        }
    })?;

    println!();
    super::cmd_status::print_summary(&summary);
    Ok(if summary.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

/// The explicit list, else the discovery output in the output directory.
fn id_source(paths: &OutputPaths, ids_file: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = ids_file {
        if !path.exists() {
            bail!("identifier list not found: {}", path.display());
        }
        return Ok(path.to_path_buf());
    }
    [&paths.urls_json, &paths.urls_txt]
        .into_iter()
        .find(|p| p.exists())
        .cloned()
        .with_context(|| {
            format!(
                "no task list in {}; run `trawl discover` first or pass --ids-file",
                paths.root.display()
            )
        })
}

fn window(ids: &[Identifier], start: usize, limit: Option<usize>) -> Vec<Identifier> {
    ids.iter()
        .skip(start)
        .take(limit.unwrap_or(usize::MAX))
        .cloned()
        .collect()
}
