//! Discovered identifier lists: `task_urls.txt` and `task_urls.json`.

use crate::paths::OutputPaths;
use crate::write_atomic;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use trawl_core::{DiscoveryReport, DiscoverySet, Identifier, StopReason};

/// On-disk shape of `task_urls.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlList {
    pub total_count: usize,
    pub extracted_at: String,
    pub listing_url: String,
    pub passes: u32,
    pub stop_reason: StopReason,
    pub urls: Vec<String>,
}

/// Write both list files, one canonical detail URL per identifier. Returns
/// the number of identifiers written.
///
/// A cancelled discovery only adds to the lists already on disk: earlier
/// entries keep their place and newly found identifiers follow them.
pub fn save_discovery(
    paths: &OutputPaths,
    report: &DiscoveryReport,
    base_url: &str,
) -> Result<usize> {
    let mut set = DiscoverySet::new();
    if report.stop_reason == StopReason::Cancelled {
        if let Some(existing) = [&paths.urls_json, &paths.urls_txt]
            .into_iter()
            .find(|p| p.exists())
        {
            set.extend(load_id_list(existing)?);
        }
    }
    let kept = set.len();
    set.extend(report.ids.iter().cloned());
    if kept > 0 {
        tracing::info!(
            kept,
            added = set.len() - kept,
            "discovery interrupted; merged into the existing task list"
        );
    }
    let urls: Vec<String> = set.as_slice().iter().map(|id| id.detail_url(base_url)).collect();

    let mut txt = urls.join("\n");
    if !txt.is_empty() {
        txt.push('\n');
    }
    write_atomic(&paths.urls_txt, txt.as_bytes())
        .with_context(|| format!("writing {}", paths.urls_txt.display()))?;

    let list = UrlList {
        total_count: urls.len(),
        extracted_at: report.extracted_at.clone(),
        listing_url: report.listing_url.clone(),
        passes: report.passes,
        stop_reason: report.stop_reason,
        urls,
    };
    let json = serde_json::to_string_pretty(&list)?;
    write_atomic(&paths.urls_json, json.as_bytes())
        .with_context(|| format!("writing {}", paths.urls_json.display()))?;
    Ok(list.total_count)
}

/// Read an identifier list written by `save_discovery` or by hand.
///
/// Accepts the JSON form or plain text with one URL or bare identifier per
/// line. Blank lines and `#` comments are skipped; duplicates collapse to
/// their first occurrence. Lines that name no identifier are reported and
/// skipped.
pub fn load_id_list(path: &Path) -> Result<Vec<Identifier>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading id list: {}", path.display()))?;

    let entries: Vec<String> = if content.trim_start().starts_with('{') {
        let list: UrlList = serde_json::from_str(&content)
            .with_context(|| format!("parsing id list: {}", path.display()))?;
        list.urls
    } else {
        content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(String::from)
            .collect()
    };

    let mut set = DiscoverySet::new();
    for entry in &entries {
        match Identifier::parse(entry) {
            Some(id) => {
                set.extend([id]);
            }
            None => tracing::warn!(entry = %entry, "skipping line without a task identifier"),
        }
    }
    Ok(set.into_ordered())
}
