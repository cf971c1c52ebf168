//! Collection pipeline: identifiers in, persisted records and a run summary out.
//!
//! Resumable: identifiers that already have a complete record are skipped
//! without touching the browser unless `force` is set. The summary is
//! rewritten after every identifier, so an interrupted run still leaves an
//! accurate account of what was done.

use crate::capture::capture_detail;
use crate::error::NavigateError;
use crate::event_log::{Event, EventLogger};
use crate::extract::extract;
use crate::navigate::{NavOutcome, Navigator};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use trawl_browser::BrowserTab;
use trawl_core::config::Markers;
use trawl_core::{now_rfc3339, Identifier, Outcome, RunSummary, SummaryLedger};
use trawl_store::RecordSink;

/// Navigator, extractor and sink for one run. Shared read-only by workers.
pub struct Collector {
    navigator: Navigator,
    markers: Markers,
    sink: Arc<dyn RecordSink>,
    force: bool,
}

impl Collector {
    pub fn new(navigator: Navigator, markers: Markers, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            navigator,
            markers,
            sink,
            force: false,
        }
    }

    /// Re-collect identifiers that already have a complete record.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Identifiers to skip: complete records from earlier runs. An unreadable
    /// output directory means nothing is skipped.
    fn already_collected(&self) -> HashSet<Identifier> {
        if self.force {
            return HashSet::new();
        }
        match self.sink.completed_ids() {
            Ok(done) => done,
            Err(e) => {
                warn!("cannot scan existing records, collecting everything: {e:#}");
                HashSet::new()
            }
        }
    }

    /// Navigate, extract and persist one identifier.
    ///
    /// Only cancellation is an error; every other failure becomes an
    /// [`Outcome`] so the run can continue.
    pub async fn collect_one(
        &self,
        tab: &dyn BrowserTab,
        id: &Identifier,
        cancel: &CancellationToken,
    ) -> Result<Outcome, NavigateError> {
        let state = match self.navigator.reach(tab, id, cancel).await {
            Ok(state) => state,
            Err(NavigateError::Cancelled) => return Err(NavigateError::Cancelled),
            Err(e) => {
                return Ok(Outcome::NavigationFailed {
                    attempts: 0,
                    detail: e.to_string(),
                })
            }
        };
        if state.outcome() != NavOutcome::Ready {
            return Ok(Outcome::NavigationFailed {
                attempts: state.attempts,
                detail: state.failure_detail(),
            });
        }

        let snapshot = match capture_detail(tab, id, &self.markers, cancel).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                return Ok(Outcome::NavigationFailed {
                    attempts: state.attempts,
                    detail: format!("capture failed: {e}"),
                })
            }
        };
        if cancel.is_cancelled() {
            return Err(NavigateError::Cancelled);
        }

        let scraped_at = now_rfc3339();
        let (record, outcome) = match extract(&snapshot, &self.markers, &scraped_at) {
            Ok(record) => (
                record,
                Outcome::Collected {
                    attempts: state.attempts,
                },
            ),
            Err(incomplete) => {
                let missing = incomplete.missing.to_string();
                (*incomplete.partial, Outcome::ExtractionIncomplete { missing })
            }
        };

        if let Err(e) = self.sink.save_record(&record) {
            return Ok(Outcome::PersistenceFailed {
                detail: format!("{e:#}"),
            });
        }
        Ok(outcome)
    }
}

fn report_outcome(
    log: &mut EventLogger,
    id: &Identifier,
    outcome: &Outcome,
    done: usize,
    total: usize,
) {
    match outcome {
        Outcome::Collected { attempts } => {
            info!(task_id = %id, attempts, "[{done}/{total}] collected");
            log.record(Event::TaskCollected {
                task_id: id.clone(),
                attempts: *attempts,
            });
        }
        Outcome::Resumed => {
            info!(task_id = %id, "[{done}/{total}] already collected, skipping");
            log.record(Event::TaskResumed {
                task_id: id.clone(),
            });
        }
        failed => {
            let reason = failed.failure_reason();
            let detail = match failed {
                Outcome::NavigationFailed { detail, .. } | Outcome::PersistenceFailed { detail } => {
                    Some(detail.clone())
                }
                Outcome::ExtractionIncomplete { missing } => Some(format!("missing {missing}")),
                _ => None,
            };
            warn!(
                task_id = %id,
                reason = reason.map(|r| r.as_str()).unwrap_or("unknown"),
                "[{done}/{total}] {}",
                detail.as_deref().unwrap_or("failed")
            );
            if let Some(reason) = reason {
                log.record(Event::TaskFailed {
                    task_id: id.clone(),
                    reason,
                    detail,
                });
            }
        }
    }
}

/// Rewrite the in-progress summary. A failed write is not fatal here; the
/// final write at the end of the run is.
fn checkpoint(
    sink: &dyn RecordSink,
    log: &EventLogger,
    ledger: &SummaryLedger,
    current: Option<&Identifier>,
) {
    let snapshot = ledger.snapshot(false);
    if let Err(e) = sink.save_summary(&snapshot) {
        warn!("summary checkpoint failed: {e:#}");
    }
    log.write_status(&snapshot, current);
}

fn finish(
    sink: &dyn RecordSink,
    log: &mut EventLogger,
    mut ledger: SummaryLedger,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    if cancel.is_cancelled() {
        ledger.mark_cancelled();
    }
    let summary = ledger.snapshot(true);
    sink.save_summary(&summary).context("writing run summary")?;
    log.write_status(&summary, None);

    if summary.cancelled {
        log.record(Event::RunCancelled {
            processed: summary.attempted,
            pending: summary.pending.len(),
        });
    } else {
        log.record(Event::RunFinished {
            succeeded: summary.succeeded,
            failed: summary.failed,
            incomplete: summary.incomplete,
        });
    }
    info!(
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        incomplete = summary.incomplete,
        pending = summary.pending.len(),
        "run finished"
    );
    Ok(summary)
}

/// Process `ids` one at a time in a single tab, in the given order.
pub async fn run_pipeline(
    collector: &Collector,
    tab: &dyn BrowserTab,
    ids: &[Identifier],
    log: &mut EventLogger,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    let done = collector.already_collected();
    let mut ledger = SummaryLedger::new(ids.to_vec());
    let total = ids.len();
    log.record(Event::RunStart {
        run_id: ledger.snapshot(false).run_id,
        total,
        already_collected: ids.iter().filter(|id| done.contains(*id)).count(),
        tabs: 1,
    });

    for (idx, id) in ids.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        let outcome = if done.contains(id) {
            Outcome::Resumed
        } else {
            log.record(Event::TaskStart {
                task_id: id.clone(),
            });
            log.write_status(&ledger.snapshot(false), Some(id));
            match collector.collect_one(tab, id, cancel).await {
                Ok(outcome) => outcome,
                Err(_) => break,
            }
        };
        report_outcome(log, id, &outcome, idx + 1, total);
        ledger.record(id, outcome);
        checkpoint(collector.sink.as_ref(), log, &ledger, None);
    }

    finish(collector.sink.as_ref(), log, ledger, cancel)
}

enum WorkerMsg {
    Started(Identifier),
    Finished(Identifier, Outcome),
}

/// Deal `ids` round-robin into `n` disjoint slices, keeping relative order.
pub fn deal(ids: &[Identifier], n: usize) -> Vec<Vec<Identifier>> {
    let n = n.max(1);
    let mut slices = vec![Vec::new(); n];
    for (i, id) in ids.iter().enumerate() {
        slices[i % n].push(id.clone());
    }
    slices
}

/// Process `ids` with one worker per tab.
///
/// Each worker owns its tab and a disjoint slice of the identifiers.
/// Outcomes reach a single writer over a channel; the summary is keyed by
/// identifier, so arrival order does not matter. A progress line is logged
/// every `progress_every` while workers wait on the browser.
pub async fn run_pipeline_sharded(
    collector: Arc<Collector>,
    tabs: Vec<Arc<dyn BrowserTab>>,
    ids: &[Identifier],
    log: &mut EventLogger,
    cancel: &CancellationToken,
    progress_every: Duration,
) -> Result<RunSummary> {
    let done = collector.already_collected();
    let mut ledger = SummaryLedger::new(ids.to_vec());
    let total = ids.len();
    log.record(Event::RunStart {
        run_id: ledger.snapshot(false).run_id,
        total,
        already_collected: ids.iter().filter(|id| done.contains(*id)).count(),
        tabs: tabs.len(),
    });

    let mut processed = 0usize;
    let mut todo = Vec::new();
    for id in ids {
        if done.contains(id) {
            processed += 1;
            report_outcome(log, id, &Outcome::Resumed, processed, total);
            ledger.record(id, Outcome::Resumed);
        } else {
            todo.push(id.clone());
        }
    }
    checkpoint(collector.sink.as_ref(), log, &ledger, None);

    let (tx, mut rx) = mpsc::channel::<WorkerMsg>(64);
    let mut workers = Vec::new();
    let slices = deal(&todo, tabs.len());
    for (tab, slice) in tabs.into_iter().zip(slices) {
        if slice.is_empty() {
            continue;
        }
        let tx = tx.clone();
        let collector = Arc::clone(&collector);
        let cancel = cancel.clone();
        workers.push(tokio::spawn(async move {
            for id in slice {
                if cancel.is_cancelled() {
                    break;
                }
                if tx.send(WorkerMsg::Started(id.clone())).await.is_err() {
                    break;
                }
                match collector.collect_one(tab.as_ref(), &id, &cancel).await {
                    Ok(outcome) => {
                        if tx.send(WorkerMsg::Finished(id, outcome)).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        }));
    }
    drop(tx);

    let mut ticker = tokio::time::interval(progress_every);
    ticker.tick().await;
    let mut in_flight: HashSet<Identifier> = HashSet::new();
    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(WorkerMsg::Started(id)) => {
                    log.record(Event::TaskStart { task_id: id.clone() });
                    in_flight.insert(id);
                }
                Some(WorkerMsg::Finished(id, outcome)) => {
                    in_flight.remove(&id);
                    processed += 1;
                    report_outcome(log, &id, &outcome, processed, total);
                    ledger.record(&id, outcome);
                    checkpoint(collector.sink.as_ref(), log, &ledger, in_flight.iter().next());
                }
                None => break,
            },
            _ = ticker.tick() => {
                info!(processed, total, in_flight = in_flight.len(), "progress");
            }
        }
    }

    for worker in workers {
        if let Err(e) = worker.await {
            warn!("collection worker ended abnormally: {e}");
        }
    }
    finish(collector.sink.as_ref(), log, ledger, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{self, detail_page, listing_page, BASE};
    use trawl_browser::{Landing, ScriptedTab};
    use trawl_core::{FailureReason, TaskRecord};
    use trawl_store::{FsStore, OutputPaths};

    fn ids(raw: &[&str]) -> Vec<Identifier> {
        raw.iter().map(|s| Identifier::parse(s).unwrap()).collect()
    }

    struct Harness {
        _dir: tempfile::TempDir,
        paths: OutputPaths,
        store: Arc<FsStore>,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let paths = OutputPaths::new(dir.path().join("out"));
            let store = Arc::new(FsStore::new(paths.clone()));
            Self {
                _dir: dir,
                paths,
                store,
            }
        }

        fn collector(&self, force: bool) -> Collector {
            let cfg = testkit::config();
            Collector::new(Navigator::new(&cfg), cfg.markers.clone(), self.store.clone())
                .with_force(force)
        }

        fn log(&self) -> EventLogger {
            EventLogger::new(&self.paths)
        }

        fn record(&self, raw: &str) -> Option<TaskRecord> {
            self.store
                .load_record(&Identifier::parse(raw).unwrap())
                .unwrap()
        }
    }

    /// AAA renders on the first attempt; BBB always lands on the listing.
    fn example_tab() -> ScriptedTab {
        let listing_url = testkit::config().site.listing_url();
        let a = Identifier::parse("task_e_AAA").unwrap().detail_url(BASE);
        let b = Identifier::parse("task_e_BBB").unwrap().detail_url(BASE);
        ScriptedTab::new().page(&a, detail_page("Fix bug")).page_loads(
            &b,
            vec![Landing::redirected(
                &listing_url,
                listing_page(&["task_e_AAA", "task_e_BBB"]),
            )],
        )
    }

    #[tokio::test(start_paused = true)]
    async fn example_scenario() {
        let h = Harness::new();
        let tab = example_tab();
        let input = ids(&["task_e_AAA", "task_e_BBB"]);

        let summary = run_pipeline(
            &h.collector(false),
            &tab,
            &input,
            &mut h.log(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failed_ids(), vec![&input[1]]);
        assert_eq!(summary.failures[0].reason, FailureReason::NavigationFailed);
        assert!(!summary.is_clean());

        let aaa = h.record("task_e_AAA").unwrap();
        assert_eq!(aaa.prompt.as_deref(), Some("Fix bug"));
        assert!(aaa.logs.is_none());
        assert!(h.record("task_e_BBB").is_none());
        assert_eq!(tab.loads_of(&input[1].detail_url(BASE)), 3);

        let on_disk = h.store.load_summary().unwrap().unwrap();
        assert_eq!(on_disk.failed, 1);
        assert!(on_disk.finished_at.is_some());
        let events = std::fs::read_to_string(&h.paths.events_jsonl).unwrap();
        assert!(events.contains("\"type\":\"run_finished\""));
    }

    #[tokio::test(start_paused = true)]
    async fn resumption_skips_collected_ids_without_navigation() {
        let h = Harness::new();
        let input = ids(&["task_e_AAA", "task_e_CCC"]);
        let page_for = |raw: &str| Identifier::parse(raw).unwrap().detail_url(BASE);
        let build = || {
            ScriptedTab::new()
                .page(&page_for("task_e_AAA"), detail_page("Fix bug"))
                .page(&page_for("task_e_CCC"), detail_page("Add docs"))
        };

        let first_tab = build();
        let first = run_pipeline(
            &h.collector(false),
            &first_tab,
            &input,
            &mut h.log(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(first.succeeded, 2);
        let before = std::fs::read(h.paths.record_json(&input[0])).unwrap();

        let second_tab = build();
        let second = run_pipeline(
            &h.collector(false),
            &second_tab,
            &input,
            &mut h.log(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(second.succeeded, 2);
        assert_eq!(second.resumed, 2);
        assert!(second_tab.visits().is_empty());
        assert_eq!(std::fs::read(h.paths.record_json(&input[0])).unwrap(), before);

        let forced_tab = build();
        run_pipeline(
            &h.collector(true),
            &forced_tab,
            &input,
            &mut h.log(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(forced_tab.loads_of(&page_for("task_e_AAA")), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_prompt_is_incomplete_and_partial_is_kept() {
        let h = Harness::new();
        let input = ids(&["task_e_AAA"]);
        let url = input[0].detail_url(BASE);
        // ready marker present but empty: no prompt text to extract
        let page = detail_page("").replace("</body>", "<span>acme/widgets</span></body>");
        let tab = ScriptedTab::new().page(&url, page);

        let summary = run_pipeline(
            &h.collector(false),
            &tab,
            &input,
            &mut h.log(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(summary.incomplete, 1);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.failures[0].reason, FailureReason::ExtractionIncomplete);

        let partial = h.record("task_e_AAA").unwrap();
        assert!(partial.prompt.is_none());
        assert_eq!(partial.metadata.repository.as_deref(), Some("acme/widgets"));
    }

    struct ReadOnlySink;

    impl RecordSink for ReadOnlySink {
        fn completed_ids(&self) -> Result<HashSet<Identifier>> {
            Ok(HashSet::new())
        }
        fn save_record(&self, _record: &TaskRecord) -> Result<()> {
            anyhow::bail!("read-only file system")
        }
        fn save_summary(&self, _summary: &RunSummary) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_failure_is_isolated() {
        let h = Harness::new();
        let input = ids(&["task_e_AAA", "task_e_BBB"]);
        let tab = example_tab();
        let cfg = testkit::config();
        let collector = Collector::new(
            Navigator::new(&cfg),
            cfg.markers.clone(),
            Arc::new(ReadOnlySink),
        );

        let summary = run_pipeline(
            &collector,
            &tab,
            &input,
            &mut h.log(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.failures[0].reason, FailureReason::PersistenceFailed);
        assert!(summary.failures[0]
            .detail
            .as_deref()
            .unwrap()
            .contains("read-only"));
        assert_eq!(summary.failures[1].reason, FailureReason::NavigationFailed);
    }

    struct UnlistableSink(Arc<FsStore>);

    impl RecordSink for UnlistableSink {
        fn completed_ids(&self) -> Result<HashSet<Identifier>> {
            anyhow::bail!("permission denied")
        }
        fn save_record(&self, record: &TaskRecord) -> Result<()> {
            self.0.save_record(record)
        }
        fn save_summary(&self, summary: &RunSummary) -> Result<()> {
            self.0.save_summary(summary)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_records_mean_nothing_is_skipped() {
        let h = Harness::new();
        let input = ids(&["task_e_AAA"]);
        let mut earlier = TaskRecord::new(input[0].clone(), input[0].detail_url(BASE), "t");
        earlier.prompt = Some("Fix bug".into());
        h.store.save_record(&earlier).unwrap();

        let tab = example_tab();
        let cfg = testkit::config();
        let collector = Collector::new(
            Navigator::new(&cfg),
            cfg.markers.clone(),
            Arc::new(UnlistableSink(h.store.clone())),
        );

        let summary = run_pipeline(
            &collector,
            &tab,
            &input,
            &mut h.log(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.resumed, 0);
        assert!(h.store.load_summary().unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_run_still_accounts_for_every_id() {
        let h = Harness::new();
        let tab = example_tab();
        let input = ids(&["task_e_AAA", "task_e_BBB", "task_e_CCC"]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = run_pipeline(&h.collector(false), &tab, &input, &mut h.log(), &cancel)
            .await
            .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.pending, input);
        assert_eq!(
            summary.succeeded + summary.failed + summary.incomplete + summary.pending.len(),
            input.len()
        );
        assert!(h.store.load_summary().unwrap().unwrap().cancelled);
    }

    #[test]
    fn deal_is_round_robin_and_disjoint() {
        let input = ids(&["task_e_1", "task_e_2", "task_e_3", "task_e_4", "task_e_5"]);
        let slices = deal(&input, 2);
        assert_eq!(slices[0], ids(&["task_e_1", "task_e_3", "task_e_5"]));
        assert_eq!(slices[1], ids(&["task_e_2", "task_e_4"]));
        assert_eq!(deal(&input, 0).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sharded_run_matches_sequential_accounting() {
        let h = Harness::new();
        let raw = ["task_e_AAA", "task_e_BBB", "task_e_CCC", "task_e_DDD"];
        let input = ids(&raw);
        let tab = || -> Arc<dyn BrowserTab> {
            let mut t = example_tab();
            for id in ["task_e_CCC", "task_e_DDD"] {
                let url = Identifier::parse(id).unwrap().detail_url(BASE);
                t = t.page(&url, detail_page(id));
            }
            Arc::new(t)
        };

        let summary = run_pipeline_sharded(
            Arc::new(h.collector(false)),
            vec![tab(), tab()],
            &input,
            &mut h.log(),
            &CancellationToken::new(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(summary.total, 4);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed_ids(), vec![&input[1]]);
        assert!(summary.pending.is_empty());
        for id in ["task_e_AAA", "task_e_CCC", "task_e_DDD"] {
            assert!(h.record(id).unwrap().is_complete());
        }
    }
}
