//! HTML page templates shared by the public routes and the panel.

use serde_json::Value;

/// Escape HTML special characters
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

const BASE_CSS: &str = r#"
        * { box-sizing: border-box; margin: 0; padding: 0; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: #1a1a2e;
            min-height: 100vh;
            color: #fff;
        }
        .navbar {
            background: rgba(255,255,255,0.05);
            padding: 1rem 2rem;
            display: flex;
            justify-content: space-between;
            align-items: center;
            border-bottom: 1px solid rgba(255,255,255,0.1);
        }
        .navbar h1 { font-size: 1.25rem; }
        .navbar nav a { color: #ffff64; text-decoration: none; margin-left: 1rem; }
        .navbar nav a:hover { text-decoration: underline; }
        .container { max-width: 1100px; margin: 0 auto; padding: 2rem; }
        h2 { margin-bottom: 1rem; }
        .cards {
            display: grid;
            grid-template-columns: repeat(auto-fit, minmax(220px, 1fr));
            gap: 1.5rem;
            margin-bottom: 2rem;
        }
        .card {
            background: rgba(255,255,255,0.05);
            border-radius: 12px;
            padding: 1.5rem;
            border: 1px solid rgba(255,255,255,0.1);
        }
        .card h3 { font-size: 0.9rem; color: #a0a0a0; margin-bottom: 0.5rem; }
        .card .value { font-size: 1.75rem; font-weight: bold; }
        table { width: 100%; border-collapse: collapse; }
        th, td { text-align: left; padding: 0.6rem; border-bottom: 1px solid rgba(255,255,255,0.1); }
        th { color: #a0a0a0; font-weight: normal; }
        code { font-family: 'SF Mono', 'Fira Code', 'Consolas', monospace; }
        .ok { color: #2ecc71; }
        .bad { color: #e74c3c; }
        .message { padding: 1rem; border-radius: 8px; margin-bottom: 1rem; }
        .message.success { background: rgba(46, 204, 113, 0.2); border: 1px solid #2ecc71; }
        .message.error { background: rgba(231, 76, 60, 0.2); border: 1px solid #e74c3c; }
        .form-group { margin-bottom: 1.25rem; }
        .form-group label { display: block; margin-bottom: 0.5rem; color: #a0a0a0; }
        .form-group input[type=text], .form-group input[type=password],
        .form-group input[type=url], .form-group input[type=number], .form-group textarea {
            width: 100%;
            padding: 0.75rem 1rem;
            border-radius: 8px;
            border: 1px solid rgba(255,255,255,0.2);
            background: rgba(255,255,255,0.05);
            color: #fff;
            font-size: 1rem;
        }
        .form-group textarea { min-height: 110px; resize: vertical; font-family: inherit; }
        .form-group input:focus, .form-group textarea:focus { outline: none; border-color: #ffff64; }
        .form-group .error-text { color: #e74c3c; font-size: 0.85rem; margin-top: 0.4rem; }
        .hint { font-size: 0.85rem; color: #888; margin-top: 0.4rem; }
        .btn {
            display: inline-block;
            padding: 0.75rem 1.5rem;
            border-radius: 8px;
            border: none;
            cursor: pointer;
            font-size: 1rem;
            background: #ffff64;
            color: #1a1a2e;
        }
        .logs {
            background: #0d0d1a;
            border-radius: 8px;
            padding: 1rem;
            height: 65vh;
            overflow-y: auto;
            font-family: 'SF Mono', 'Fira Code', 'Consolas', monospace;
            font-size: 13px;
        }
        .log-entry { white-space: pre-wrap; padding: 2px 0; }
        .log-error { color: #e74c3c; }
        .log-warn { color: #f39c12; }
        .log-info { color: #ecf0f1; }
        .log-debug { color: #7f8c8d; }
"#;

/// Full document with the shared stylesheet.
pub fn document(title: &str, extra_css: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title} - GeeBot</title>
    <style>{BASE_CSS}{extra_css}</style>
</head>
<body>
{body}
</body>
</html>"#,
        title = html_escape(title),
    )
}

/// Small centred card used for the OAuth outcome pages.
fn card_page(title: &str, icon: &str, accent: &str, message: &str, script: &str) -> String {
    let css = format!(
        r#"
        body {{ display: flex; align-items: center; justify-content: center; }}
        .outcome {{
            background: rgba(255,255,255,0.05);
            border: 1px solid {accent};
            border-radius: 16px;
            padding: 3rem;
            max-width: 480px;
            text-align: center;
        }}
        .outcome .icon {{ font-size: 4rem; margin-bottom: 1rem; }}
        .outcome h1 {{ color: {accent}; margin-bottom: 1rem; }}
        .outcome p {{ color: #ccc; line-height: 1.6; }}
"#
    );
    let body = format!(
        r#"<div class="outcome">
    <div class="icon">{icon}</div>
    <h1>{title}</h1>
    <p>{message}</p>
</div>{script}"#,
        title = html_escape(title),
        message = html_escape(message),
    );
    document(title, &css, &body)
}

pub fn error_page(message: &str) -> String {
    card_page("Verification failed", "❌", "#e74c3c", message, "")
}

/// Static success page; closes its own window after three seconds.
pub fn success_page(message: &str) -> String {
    card_page(
        "Verification complete",
        "✅",
        "#2ecc71",
        message,
        "\n<script>setTimeout(function () { window.close(); }, 3000);</script>",
    )
}

pub fn unauthorized_page() -> String {
    card_page(
        "Authentication required",
        "🔒",
        "#f39c12",
        "Valid panel credentials are required to view this page.",
        "",
    )
}

/// Render a JSON report as nested definition tables.
pub fn report_page(title: &str, report: &Value) -> String {
    let body = format!(
        r#"<div class="navbar"><h1>GeeBot</h1><nav><a href="/ping">Ping</a><a href="/health">Health</a><a href="/status">Status</a></nav></div>
<div class="container">
    <h2>{}</h2>
    <div class="card">{}</div>
    <p class="hint">Append <code>?format=json</code> for machine-readable output.</p>
</div>"#,
        html_escape(title),
        value_table(report)
    );
    document(title, "", &body)
}

fn value_table(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let rows: Vec<String> = map
                .iter()
                .map(|(key, v)| {
                    format!(
                        "<tr><th>{}</th><td>{}</td></tr>",
                        html_escape(key),
                        value_table(v)
                    )
                })
                .collect();
            format!("<table>{}</table>", rows.join(""))
        }
        Value::String(s) => html_escape(s),
        Value::Null => "N/A".to_string(),
        other => html_escape(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_escape() {
        assert_eq!(
            html_escape(r#"<a href="x">&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_success_page_closes_itself() {
        let html = success_page("Done <now>");
        assert!(html.contains("window.close()"));
        assert!(html.contains("3000"));
        assert!(html.contains("Done &lt;now&gt;"));
    }

    #[test]
    fn test_report_page_nests_objects() {
        let report = serde_json::json!({"bot": {"status": "ready", "latency": null}});
        let html = report_page("Health", &report);
        assert!(html.contains("<th>status</th><td>ready</td>"));
        assert!(html.contains("<td>N/A</td>"));
    }
}
