//! HTML served to browsers: the build error overlay and client injection.

use crate::build::Diagnostics;
use bytes::Bytes;

/// Render the error page shown when the latest build failed.
///
/// Every diagnostic is HTML-escaped. The page subscribes to `events_path`
/// and reloads once a later build succeeds.
pub fn error_overlay(diagnostics: &Diagnostics, events_path: &str) -> String {
    let escaped_error = html_escape(&diagnostics.summary());
    let escaped_events = html_escape(events_path);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Build Error - Fob Hot</title>
    <style>
        body {{ margin: 0; padding: 20px; background: #1a1a1a; color: #e8e8e8; font-family: Menlo, Monaco, monospace; }}
        .header {{ background: #ff4444; color: #fff; padding: 16px 24px; border-radius: 8px 8px 0 0; font-weight: bold; }}
        pre {{ margin: 0; padding: 24px; background: #2a2a2a; color: #ff6b6b; white-space: pre-wrap; border: 2px solid #ff4444; border-top: none; }}
        .info {{ margin-top: 16px; color: #a8c8e8; }}
    </style>
</head>
<body>
    <div class="header">Build {generation} failed</div>
    <pre>{error}</pre>
    <p class="info">This page reloads automatically once the build succeeds.</p>

    <script>
        const source = new EventSource('{events}');
        source.addEventListener('message', (event) => {{
            try {{
                if (JSON.parse(event.data).type === 'ok') {{
                    location.reload();
                }}
            }} catch (e) {{
                console.error('[fob-hot] Bad event:', e);
            }}
        }});
    </script>
</body>
</html>"#,
        generation = diagnostics.generation,
        error = escaped_error,
        events = escaped_events,
    )
}

/// Add the live-reload client script to an HTML document.
///
/// The tag goes before the closing `</body>`, or at the end when there is
/// none.
pub fn inject_client_script(content: &[u8], script_path: &str) -> Bytes {
    let html = String::from_utf8_lossy(content);
    let script_tag = format!(r#"<script src="{}"></script>"#, html_escape(script_path));

    let mut result = String::with_capacity(html.len() + script_tag.len() + 4);
    match html.rfind("</body>") {
        Some(pos) => {
            result.push_str(&html[..pos]);
            result.push_str(&script_tag);
            result.push('\n');
            result.push_str(&html[pos..]);
        }
        None => {
            result.push_str(&html);
            result.push('\n');
            result.push_str(&script_tag);
        }
    }

    Bytes::from(result)
}

/// Escape HTML special characters.
pub fn html_escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
