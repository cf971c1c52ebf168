//! DOM extractor: pure functions from captured markup to a [`TaskRecord`].
//!
//! Every field is located independently by selector plus a content check,
//! never by position, and a field that is not found stays absent. Only a
//! missing prompt makes the extraction incomplete.

use crate::capture::DetailSnapshot;
use crate::error::ExtractionIncomplete;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use trawl_core::config::Markers;
use trawl_core::{ChangeStats, FileChange, LogCapture, Metadata, SummarySections, TaskRecord};

const STATUSES: &[&str] = &["Merged", "Closed", "Open", "Failed"];

/// Shorter text in a log container is a placeholder, not output.
const MIN_LOG_CHARS: usize = 50;

/// Dates are short labels; anything longer is prose that mentions a month.
const MAX_DATE_CHARS: usize = 50;

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2}\b|\b\d+\s+(second|minute|hour|day|week|month|year)s?\s+ago\b|\b\d{4}-\d{2}-\d{2}\b",
        )
        .expect("date pattern is valid")
    })
}

fn repo_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*/[A-Za-z0-9][A-Za-z0-9_.-]*$")
            .expect("repository pattern is valid")
    })
}

fn path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:[\w.-]+/)*[\w-]+\.[A-Za-z0-9]{1,10}").expect("path pattern is valid")
    })
}

fn count_re(sign: &str) -> Regex {
    Regex::new(&format!(r"^{sign}(\d+)$")).expect("count pattern is valid")
}

fn additions_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| count_re(r"\+"))
}

fn deletions_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| count_re("[-\u{2212}]"))
}

/// Build a record from a captured detail page.
pub fn extract(
    snapshot: &DetailSnapshot,
    markers: &Markers,
    scraped_at: &str,
) -> Result<TaskRecord, ExtractionIncomplete> {
    let doc = Html::parse_document(&snapshot.main_html);

    let mut record = TaskRecord::new(snapshot.task_id.clone(), &snapshot.url, scraped_at);
    record.title = extract_title(&doc);
    record.prompt = extract_prompt(&doc, &markers.prompt);
    record.logs = snapshot
        .logs_html
        .as_deref()
        .and_then(|html| extract_logs(&Html::parse_document(html), &markers.logs_container));
    record.metadata = extract_metadata(&doc, markers);
    record.files_changed = extract_files(&doc, markers);
    record.summary = Some(extract_sections(&doc, &markers.section_heading)).filter(|s| !s.is_empty());
    record.pr_links = extract_pr_links(&doc);

    if record.is_complete() {
        Ok(record)
    } else {
        Err(ExtractionIncomplete {
            missing: "prompt",
            partial: Box::new(record),
        })
    }
}

// ── helpers ──

fn parse_selectors(selectors: &[String]) -> Vec<Selector> {
    selectors.iter().filter_map(|s| Selector::parse(s).ok()).collect()
}

/// Matches of each selector in turn, so earlier selectors win.
fn select_in_order<'a>(doc: &'a Html, selectors: &[String]) -> Vec<ElementRef<'a>> {
    parse_selectors(selectors)
        .iter()
        .flat_map(|sel| doc.select(sel).collect::<Vec<_>>())
        .collect()
}

/// Text with runs of whitespace collapsed.
fn compact(el: &ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn inside_button(el: &ElementRef<'_>) -> bool {
    el.ancestors()
        .any(|n| n.value().as_element().is_some_and(|e| e.name() == "button"))
}

// ── fields ──

fn extract_title(doc: &Html) -> Option<String> {
    let sel = Selector::parse("title").ok()?;
    let el = doc.select(&sel).next()?;
    Some(compact(&el)).filter(|t| !t.is_empty())
}

fn extract_prompt(doc: &Html, selectors: &[String]) -> Option<String> {
    select_in_order(doc, selectors)
        .iter()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|t| !t.is_empty())
}

fn extract_logs(doc: &Html, selectors: &[String]) -> Option<LogCapture> {
    for raw in selectors {
        let Ok(sel) = Selector::parse(raw) else {
            continue;
        };
        for el in doc.select(&sel) {
            let text = el.text().collect::<String>().trim().to_string();
            if text.chars().count() > MIN_LOG_CHARS {
                return Some(LogCapture {
                    text,
                    source: raw.clone(),
                    html: Some(el.html()),
                });
            }
        }
    }
    None
}

fn extract_metadata(doc: &Html, markers: &Markers) -> Metadata {
    let date = select_in_order(doc, &markers.date).iter().find_map(|el| {
        let mut text = compact(el);
        if text.is_empty() {
            text = el.value().attr("datetime").unwrap_or_default().to_string();
        }
        (text.chars().count() < MAX_DATE_CHARS && date_re().is_match(&text)).then_some(text)
    });

    let repository = select_in_order(doc, &markers.repository)
        .iter()
        .filter(|el| !inside_button(el))
        .map(compact)
        .find(|t| repo_re().is_match(t) && t.chars().any(char::is_alphabetic));

    let additions = first_count(doc, &markers.additions, additions_re());
    let deletions = first_count(doc, &markers.deletions, deletions_re());
    let changes = (additions.is_some() || deletions.is_some()).then(|| ChangeStats {
        additions: additions.unwrap_or(0),
        deletions: deletions.unwrap_or(0),
    });

    let status = select_in_order(doc, &markers.status)
        .iter()
        .filter(|el| !inside_button(el))
        .map(compact)
        .find(|t| STATUSES.contains(&t.as_str()));

    Metadata {
        date,
        repository,
        changes,
        status,
    }
}

/// First `+N`/`-N` count outside any file entry button.
fn first_count(doc: &Html, selectors: &[String], re: &Regex) -> Option<u32> {
    select_in_order(doc, selectors)
        .iter()
        .filter(|el| !inside_button(el))
        .find_map(|el| parse_count(&compact(el), re))
}

fn parse_count(text: &str, re: &Regex) -> Option<u32> {
    re.captures(text.trim())?.get(1)?.as_str().parse().ok()
}

fn extract_files(doc: &Html, markers: &Markers) -> Vec<FileChange> {
    let add_sel = parse_selectors(&markers.additions);
    let del_sel = parse_selectors(&markers.deletions);
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for el in select_in_order(doc, &markers.file_entry) {
        let text = compact(&el);
        let Some(found) = path_re().find(&text) else {
            continue;
        };
        let path = found.as_str().to_string();
        if !path.chars().any(char::is_alphabetic) || !seen.insert(path.clone()) {
            continue;
        }

        let scoped = |sels: &[Selector], re: &Regex| {
            sels.iter()
                .flat_map(|s| el.select(s).collect::<Vec<_>>())
                .find_map(|e| parse_count(&compact(&e), re))
        };
        let rest = &text[found.end()..];
        let additions = scoped(&add_sel, additions_re()).or_else(|| trailing_count(rest, '+'));
        let deletions = scoped(&del_sel, deletions_re()).or_else(|| trailing_count(rest, '-'));

        files.push(FileChange {
            path,
            additions,
            deletions,
        });
    }
    files
}

/// `+12` / `-3` following the path in a file entry's flattened text.
fn trailing_count(rest: &str, sign: char) -> Option<u32> {
    let start = rest.find(sign)? + sign.len_utf8();
    let digits: String = rest[start..].chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

#[derive(Clone, Copy)]
enum Section {
    Summary,
    Notes,
    Testing,
}

fn section_label(el: &ElementRef<'_>) -> Option<Section> {
    let label = compact(el);
    match label.trim_end_matches(':').trim().to_ascii_lowercase().as_str() {
        "summary" => Some(Section::Summary),
        "notes" => Some(Section::Notes),
        "testing" => Some(Section::Testing),
        _ => None,
    }
}

/// A heading, or a block whose first child is a labeled heading
/// (`<p><strong>Testing</strong> ...</p>`).
fn opens_section(el: &ElementRef<'_>, headings: &[Selector]) -> bool {
    let is_heading = |e: &ElementRef<'_>| headings.iter().any(|s| s.matches(e));
    if is_heading(el) {
        return true;
    }
    el.children()
        .find(|n| n.value().as_text().map_or(true, |t| !t.trim().is_empty()))
        .and_then(ElementRef::wrap)
        .is_some_and(|first| is_heading(&first) && section_label(&first).is_some())
}

/// Text with block boundaries kept as line breaks.
fn push_block_text(el: &ElementRef<'_>, out: &mut String) {
    let block = BLOCK_ELEMENTS.contains(&el.value().name());
    if block {
        out.push('\n');
    }
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child) = ElementRef::wrap(child) {
            push_block_text(&child, out);
        }
    }
    if block {
        out.push('\n');
    }
}

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "ul", "ol", "li", "pre", "blockquote", "table", "tr", "br", "h1", "h2", "h3",
    "h4", "h5", "h6",
];

/// Section bodies run from the heading to the next heading among its
/// siblings. A heading that is the only content of its wrapper
/// (`<p><strong>Summary</strong></p>`) reads the wrapper's siblings instead.
fn extract_sections(doc: &Html, heading_selectors: &[String]) -> SummarySections {
    let headings = parse_selectors(heading_selectors);
    let mut sections = SummarySections::default();
    for heading in select_in_order(doc, heading_selectors) {
        let Some(label) = section_label(&heading) else {
            continue;
        };
        let slot = match label {
            Section::Summary => &mut sections.summary,
            Section::Notes => &mut sections.notes,
            Section::Testing => &mut sections.testing,
        };
        if slot.is_some() {
            continue;
        }

        let anchor = heading
            .parent()
            .and_then(ElementRef::wrap)
            .filter(|wrapper| compact(wrapper) == compact(&heading))
            .unwrap_or(heading);

        let mut raw = String::new();
        for node in anchor.next_siblings() {
            if let Some(text) = node.value().as_text() {
                raw.push_str(text);
            } else if let Some(el) = ElementRef::wrap(node) {
                if opens_section(&el, &headings) {
                    break;
                }
                push_block_text(&el, &mut raw);
            }
        }

        let body = raw
            .lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        let body = body.trim_start_matches(':').trim();
        if !body.is_empty() {
            *slot = Some(body.to_string());
        }
    }
    sections
}

fn extract_pr_links(doc: &Html) -> Vec<String> {
    let Ok(sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    doc.select(&sel)
        .filter_map(|a| a.value().attr("href"))
        .filter(|h| h.contains("github.com") && h.contains("/pull/"))
        .filter(|h| seen.insert(h.to_string()))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{detail_page, BASE};
    use trawl_core::Identifier;

    fn snapshot(main: String, logs: Option<&str>) -> DetailSnapshot {
        let task_id = Identifier::parse("task_e_AAA").unwrap();
        DetailSnapshot {
            url: task_id.detail_url(BASE),
            task_id,
            main_html: main,
            logs_html: logs.map(String::from),
        }
    }

    const RICH: &str = r#"<html><head><title>Fix flaky test</title></head><body>
      <div class="flex"><span class="text-token-text-secondary">May 21</span>
        <span>acme/widgets</span>
        <span class="badge">Merged</span>
        <span class="text-green-500">+12</span><span class="text-red-500">-3</span></div>
      <div class="px-4 text-sm break-words whitespace-pre-wrap">Fix bug in parser
where empty input panics</div>
      <div><button><span>src/parser.rs</span><span class="text-green-500">+10</span><span class="text-red-500">-2</span></button>
        <button>tests/parser.rs +2 -1</button>
        <button>src/parser.rs</button>
        <button>Logs</button></div>
      <div><h3>Summary</h3><p>Guard against empty input.</p></div>
      <div><strong>Testing:</strong> cargo test -p parser</div>
      <a href="https://github.com/acme/widgets/pull/42">View Pull Request</a>
      <a href="https://github.com/acme/widgets/pull/42">again</a>
    </body></html>"#;

    const LOGS: &str = r#"<html><body><div class="react-scroll-to-bottom--css-x">
      <pre>$ cargo test -p parser
running 14 tests
test result: ok. 14 passed; 0 failed</pre></div></body></html>"#;

    #[test]
    fn rich_page_yields_every_field() {
        let rec = extract(&snapshot(RICH.into(), Some(LOGS)), &Markers::default(), "t").unwrap();
        assert_eq!(rec.title.as_deref(), Some("Fix flaky test"));
        assert_eq!(
            rec.prompt.as_deref(),
            Some("Fix bug in parser\nwhere empty input panics")
        );
        let logs = rec.logs.unwrap();
        assert!(logs.text.contains("14 passed"));
        assert!(logs.source.contains("react-scroll-to-bottom"));
        assert!(logs.html.unwrap().starts_with("<div"));

        assert_eq!(rec.metadata.date.as_deref(), Some("May 21"));
        assert_eq!(rec.metadata.repository.as_deref(), Some("acme/widgets"));
        assert_eq!(rec.metadata.status.as_deref(), Some("Merged"));
        assert_eq!(
            rec.metadata.changes,
            Some(ChangeStats {
                additions: 12,
                deletions: 3
            })
        );

        assert_eq!(rec.files_changed.len(), 2);
        assert_eq!(rec.files_changed[0].path, "src/parser.rs");
        assert_eq!(rec.files_changed[0].additions, Some(10));
        assert_eq!(rec.files_changed[0].deletions, Some(2));
        assert_eq!(rec.files_changed[1].path, "tests/parser.rs");
        assert_eq!(rec.files_changed[1].additions, Some(2));
        assert_eq!(rec.files_changed[1].deletions, Some(1));

        let summary = rec.summary.unwrap();
        assert_eq!(summary.summary.as_deref(), Some("Guard against empty input."));
        assert_eq!(summary.testing.as_deref(), Some("cargo test -p parser"));
        assert!(summary.notes.is_none());
        assert_eq!(rec.pr_links, vec!["https://github.com/acme/widgets/pull/42"]);
    }

    #[test]
    fn prompt_without_logs_is_a_complete_record() {
        let rec = extract(&snapshot(detail_page("Fix bug"), None), &Markers::default(), "t").unwrap();
        assert_eq!(rec.prompt.as_deref(), Some("Fix bug"));
        assert!(rec.logs.is_none());
        assert!(rec.metadata.changes.is_none());
        assert!(rec.files_changed.is_empty());
        assert!(rec.summary.is_none());
    }

    #[test]
    fn short_log_text_is_not_logs() {
        let rec = extract(
            &snapshot(detail_page("Fix bug"), Some("<pre>Loading…</pre>")),
            &Markers::default(),
            "t",
        )
        .unwrap();
        assert!(rec.logs.is_none());
    }

    #[test]
    fn missing_prompt_keeps_partial_fields() {
        let page = r#"<html><body><span>acme/widgets</span><span class="badge">Open</span></body></html>"#;
        let err = extract(&snapshot(page.into(), None), &Markers::default(), "t").unwrap_err();
        assert_eq!(err.missing, "prompt");
        assert!(err.partial.prompt.is_none());
        assert_eq!(err.partial.metadata.repository.as_deref(), Some("acme/widgets"));
        assert_eq!(err.partial.metadata.status.as_deref(), Some("Open"));
    }

    #[test]
    fn file_paths_in_buttons_are_not_repositories() {
        let page = r#"<html><body>
          <div class="px-4 text-sm break-words whitespace-pre-wrap">p</div>
          <button><span>src/lib.rs</span></button><span>12/25</span></body></html>"#;
        let rec = extract(&snapshot(page.into(), None), &Markers::default(), "t").unwrap();
        assert!(rec.metadata.repository.is_none());
        assert_eq!(rec.files_changed[0].path, "src/lib.rs");
        assert_eq!(rec.files_changed[0].additions, None);
    }

    fn sections_of(body: &str) -> SummarySections {
        let page = format!(
            r#"<html><body><div class="px-4 text-sm break-words whitespace-pre-wrap">p</div>{body}</body></html>"#
        );
        extract(&snapshot(page, None), &Markers::default(), "t")
            .unwrap()
            .summary
            .unwrap_or_default()
    }

    #[test]
    fn headings_sharing_a_container_split_at_each_heading() {
        let s = sections_of(
            "<div><h3>Summary</h3><p>Guard input.</p><h3>Testing</h3><p>cargo test</p></div>",
        );
        assert_eq!(s.summary.as_deref(), Some("Guard input."));
        assert_eq!(s.testing.as_deref(), Some("cargo test"));
        assert!(s.notes.is_none());
    }

    #[test]
    fn bold_paragraph_headings_read_the_following_blocks() {
        let s = sections_of(
            "<div><p><strong>Summary</strong></p><ul><li>Guard input</li><li>Add a test</li></ul>\
             <p><strong>Testing</strong></p><ul><li>✅ <code>cargo test</code></li></ul>\
             <p><strong>Notes:</strong> flaky on CI</p></div>",
        );
        assert_eq!(s.summary.as_deref(), Some("Guard input\nAdd a test"));
        assert_eq!(s.testing.as_deref(), Some("✅ cargo test"));
        assert_eq!(s.notes.as_deref(), Some("flaky on CI"));
    }

    #[test]
    fn inline_bold_inside_a_list_does_not_end_a_section() {
        let s = sections_of(
            "<h2>Summary</h2><ul><li><strong>parser</strong> rejects empty input</li></ul><h2>Files</h2><p>src/lib.rs</p>",
        );
        assert_eq!(s.summary.as_deref(), Some("parser rejects empty input"));
        assert!(s.testing.is_none());
    }

    #[test]
    fn long_text_mentioning_a_month_is_not_a_date() {
        let page = format!(
            r#"<html><body><span class="text-token-text-secondary">{}</span>
               <span class="text-token-text-secondary">3 days ago</span>
               <div class="px-4 text-sm break-words whitespace-pre-wrap">p</div></body></html>"#,
            "We discussed this in the planning meeting on May 3 and agreed to ship"
        );
        let rec = extract(&snapshot(page, None), &Markers::default(), "t").unwrap();
        assert_eq!(rec.metadata.date.as_deref(), Some("3 days ago"));
    }
}
