use anyhow::Result;
use std::path::Path;
use std::process::ExitCode;
use trawl_core::RunSummary;
use trawl_store::{FsStore, OutputPaths};

/// Execute `trawl status`
pub fn execute(output_dir: &Path) -> Result<ExitCode> {
    let store = FsStore::new(OutputPaths::new(output_dir));
    match store.load_summary()? {
        Some(summary) => {
            print_summary(&summary);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            println!("No summary found in {}.", output_dir.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

pub fn print_summary(summary: &RunSummary) {
    let state = match (&summary.finished_at, summary.cancelled) {
        (_, true) => "cancelled",
        (Some(_), false) => "finished",
        (None, false) => "in progress",
    };
    println!("Run {} ({state})", summary.run_id);
    println!("  started:    {}", summary.started_at);
    if let Some(at) = &summary.finished_at {
        println!("  finished:   {at}");
    }
    println!("  total:      {}", summary.total);
    println!(
        "  succeeded:  {} ({} already collected)",
        summary.succeeded, summary.resumed
    );
    println!("  failed:     {}", summary.failed);
    println!("  incomplete: {}", summary.incomplete);
    if !summary.pending.is_empty() {
        println!("  pending:    {}", summary.pending.len());
    }

    if !summary.failures.is_empty() {
        println!();
        for f in &summary.failures {
            let detail = f.detail.as_deref().unwrap_or("");
            println!("  ✗ {:<28} {:<22} {detail}", f.task_id.as_str(), f.reason.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_summary_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(execute(tmp.path()).is_ok());
    }
}
