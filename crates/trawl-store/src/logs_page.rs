//! Standalone HTML page for a task's captured logs.

use trawl_core::TaskRecord;

const STYLE: &str = r#"<style>
  body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
         line-height: 1.6; color: #333; max-width: 1200px; margin: 0 auto; padding: 20px;
         background: #f5f5f5; }
  .container { background: white; border-radius: 8px; padding: 20px;
               box-shadow: 0 2px 4px rgba(0,0,0,0.1); }
  .prompt { background: #f0f0f0; padding: 15px; border-radius: 5px; margin-bottom: 20px;
            white-space: pre-wrap; }
  .logs { background: #1e1e1e; color: #d4d4d4; padding: 20px; border-radius: 5px;
          overflow-x: auto; font-family: 'SF Mono', Consolas, Monaco, monospace;
          font-size: 14px; line-height: 1.4; }
  .whitespace-pre-wrap { white-space: pre-wrap; word-break: break-word; }
  .whitespace-pre { white-space: pre; }
  .ansi-red-fg { color: #cd3131; } .ansi-green-fg { color: #0dbc79; }
  .ansi-yellow-fg { color: #e5e510; } .ansi-blue-fg { color: #2472c8; }
  .ansi-magenta-fg { color: #bc3fbc; } .ansi-cyan-fg { color: #11a8cd; }
  .ansi-bold { font-weight: bold; } .ansi-dim { opacity: 0.7; }
  .metadata { color: #7f8c8d; font-size: 14px; margin-bottom: 20px; }
  h1 { color: #2c3e50; border-bottom: 2px solid #3498db; padding-bottom: 10px; }
</style>"#;

/// Render the logs page. `logs_html` is embedded verbatim; everything else is escaped.
pub fn render(record: &TaskRecord, logs_html: &str) -> String {
    let title = escape(record.title.as_deref().unwrap_or("Codex Task"));
    let id = escape(record.task_id.as_str());
    let url = escape(&record.url);
    let prompt = record
        .prompt
        .as_deref()
        .map(escape)
        .unwrap_or_else(|| "No prompt found".to_string());
    let scraped_at = escape(&record.scraped_at);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title} - Logs</title>
{STYLE}
</head>
<body>
<div class="container">
  <h1>{title}</h1>
  <div class="metadata">
    Task ID: {id}<br>
    URL: <a href="{url}">{url}</a><br>
    Scraped: {scraped_at}
  </div>
  <h2>Prompt</h2>
  <div class="prompt">{prompt}</div>
  <h2>Logs</h2>
  <div class="logs">
{logs_html}
  </div>
</div>
</body>
</html>
"#
    )
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use trawl_core::Identifier;

    #[test]
    fn prompt_is_escaped_logs_are_not() {
        let id = Identifier::parse("task_e_AAA").unwrap();
        let mut rec = TaskRecord::new(id, "https://chatgpt.com/codex/tasks/task_e_AAA", "now");
        rec.prompt = Some("use <Vec<u8>> & friends".into());
        let page = render(&rec, "<span class=\"ansi-red-fg\">error</span>");
        assert!(page.contains("use &lt;Vec&lt;u8&gt;&gt; &amp; friends"));
        assert!(page.contains("<span class=\"ansi-red-fg\">error</span>"));
        assert!(page.contains("Task ID: task_e_AAA"));
    }

    #[test]
    fn missing_prompt_has_placeholder() {
        let id = Identifier::parse("task_e_AAA").unwrap();
        let rec = TaskRecord::new(id, "u", "now");
        assert!(render(&rec, "").contains("No prompt found"));
    }
}
