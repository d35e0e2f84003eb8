//! Control panel routes and handlers
//!
//! Provides a password-protected web interface for:
//! - Viewing the configuration summary
//! - Editing configuration sections
//! - Viewing live logs and runtime status

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Response,
    },
    routing::{get, post},
    Form, Json, Router,
};
use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{error, info};

use super::auth::require_basic_auth;
use super::pages::{document, html_escape, report_page};
use super::status::status_report;
use super::WebState;
use crate::config::{keys, masked, parse_bool, Field, FieldKind, Section};

/// Create panel router, every route behind Basic auth
pub fn panel_router(state: WebState) -> Router<WebState> {
    Router::new()
        .route("/", get(dashboard))
        .route("/config", get(general_form))
        .route("/config/update", post(update_general))
        .route("/config/:section", get(section_form))
        .route("/config/:section/update", post(update_section))
        .route("/logs", get(logs_page))
        .route("/logs/stream", get(logs_stream))
        .route("/status", get(status_page))
        .route("/api/bot-status", get(bot_status_api))
        .route_layer(middleware::from_fn_with_state(state, require_basic_auth))
}

type FormValues = HashMap<String, String>;

/// Validation result for one submitted section.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SectionUpdate {
    /// Keys whose value differs from the stored one
    pub changes: BTreeMap<String, String>,
    pub errors: BTreeMap<&'static str, String>,
}

/// Normalize and validate a submitted form against the section's fields.
///
/// `current` returns the value in effect for a key.
pub fn validate_section<F>(fields: &[Field], form: &FormValues, current: F) -> SectionUpdate
where
    F: Fn(&str) -> String,
{
    let mut update = SectionUpdate::default();

    for field in fields {
        let stored = current(field.key);
        let value = match field.kind {
            FieldKind::Checkbox => {
                if form.contains_key(field.key) { "true" } else { "false" }.to_string()
            }
            _ => form
                .get(field.key)
                .map(|v| v.trim().to_string())
                .unwrap_or_default(),
        };

        if field.kind == FieldKind::Password && value.is_empty() {
            if field.required && stored.is_empty() {
                update.errors.insert(field.key, "This field is required".to_string());
            }
            continue;
        }
        if field.required && value.is_empty() {
            update.errors.insert(field.key, "This field is required".to_string());
            continue;
        }
        if field.kind == FieldKind::Number && !value.is_empty() {
            let Ok(number) = value.parse::<i64>() else {
                update.errors.insert(field.key, "Must be a whole number".to_string());
                continue;
            };
            if field.key == keys::KEEP_ALIVE_INTERVAL && number < keys::MIN_KEEP_ALIVE_SECS as i64 {
                update
                    .errors
                    .insert(field.key, format!("Must be at least {}", keys::MIN_KEEP_ALIVE_SECS));
                continue;
            }
        }

        let unchanged = match field.kind {
            FieldKind::Checkbox => parse_bool(&stored) == parse_bool(&value),
            _ => stored == value,
        };
        if !unchanged {
            update.changes.insert(field.key.to_string(), value);
        }
    }

    update
}

fn navbar() -> &'static str {
    r#"<div class="navbar">
    <h1>GeeBot Panel</h1>
    <nav>
        <a href="/panel">Dashboard</a>
        <a href="/panel/config">General</a>
        <a href="/panel/config/commands">Commands</a>
        <a href="/panel/config/messages">Messages</a>
        <a href="/panel/config/verification">Verification</a>
        <a href="/panel/logs">Logs</a>
        <a href="/panel/status">Status</a>
    </nav>
</div>"#
}

/// GET /panel - configuration summary
async fn dashboard(State(state): State<WebState>) -> Response {
    let entries = match state.config.get_all() {
        Ok(entries) => entries,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load configuration").into_response();
        }
    };
    let configured = entries.iter().filter(|e| !e.value.is_empty()).count();
    let missing = state.config.missing_configs();

    let rows: Vec<String> = entries
        .iter()
        .map(|entry| {
            format!(
                "<tr><td><code>{}</code></td><td>{}</td><td>{}</td><td>{}</td></tr>",
                html_escape(&entry.key),
                html_escape(&masked(&entry.key, &entry.value)),
                html_escape(&entry.description),
                if entry.required { "yes" } else { "" }
            )
        })
        .collect();

    let missing_html = if missing.is_empty() {
        r#"<div class="message success">All required settings are configured.</div>"#.to_string()
    } else {
        format!(
            r#"<div class="message error">Missing required settings: {}</div>"#,
            missing
                .iter()
                .map(|k| format!("<code>{}</code>", k))
                .collect::<Vec<_>>()
                .join(", ")
        )
    };

    let body = format!(
        r#"{nav}
<div class="container">
    <div class="cards">
        <div class="card"><h3>Total settings</h3><div class="value">{total}</div></div>
        <div class="card"><h3>Configured</h3><div class="value ok">{configured}</div></div>
        <div class="card"><h3>Missing required</h3><div class="value bad">{missing_count}</div></div>
    </div>
    {missing_html}
    <div class="card">
        <table>
            <tr><th>Key</th><th>Value</th><th>Description</th><th>Required</th></tr>
            {rows}
        </table>
    </div>
</div>"#,
        nav = navbar(),
        total = entries.len(),
        missing_count = missing.len(),
        rows = rows.join("\n"),
    );

    Html(document("Dashboard", "", &body)).into_response()
}

struct FormView<'a> {
    submitted: Option<&'a FormValues>,
    errors: &'a BTreeMap<&'static str, String>,
    notice: Option<(&'static str, String)>,
}

fn render_field(state: &WebState, field: &Field, view: &FormView<'_>) -> String {
    let stored = state.config.get(field.key, "");
    let shown = match (field.kind, view.submitted) {
        (FieldKind::Password, _) => String::new(),
        (_, Some(form)) => form.get(field.key).cloned().unwrap_or_default(),
        (_, None) => stored.clone(),
    };
    let error = view
        .errors
        .get(field.key)
        .map(|e| format!(r#"<div class="error-text">{}</div>"#, html_escape(e)))
        .unwrap_or_default();
    let required = if field.required { " required" } else { "" };
    let label = format!(
        r#"<label for="{key}">{label}{star}</label>"#,
        key = field.key,
        label = html_escape(field.label),
        star = if field.required { " *" } else { "" },
    );

    let input = match field.kind {
        FieldKind::Checkbox => {
            let checked = match view.submitted {
                Some(form) => form.contains_key(field.key),
                None => parse_bool(&stored).unwrap_or(true),
            };
            format!(
                r#"<input type="checkbox" id="{key}" name="{key}" value="true"{checked}>"#,
                key = field.key,
                checked = if checked { " checked" } else { "" },
            )
        }
        FieldKind::Textarea => format!(
            r#"<textarea id="{key}" name="{key}"{required}>{value}</textarea>"#,
            key = field.key,
            value = html_escape(&shown),
        ),
        FieldKind::Password => format!(
            r#"<input type="password" id="{key}" name="{key}" placeholder="{placeholder}" autocomplete="new-password">"#,
            key = field.key,
            placeholder = if stored.is_empty() { "Not set" } else { "Leave blank to keep the current value" },
        ),
        kind => format!(
            r#"<input type="{input_type}" id="{key}" name="{key}" value="{value}"{required}>"#,
            input_type = kind.input_type(),
            key = field.key,
            value = html_escape(&shown),
        ),
    };

    format!(
        r#"<div class="form-group">{label}{input}<div class="hint"><code>{key}</code></div>{error}</div>"#,
        key = field.key,
    )
}

fn section_page(state: &WebState, section: Section, view: FormView<'_>) -> String {
    let fields: Vec<String> = section
        .fields()
        .iter()
        .map(|field| render_field(state, field, &view))
        .collect();
    let notice = view
        .notice
        .map(|(class, text)| format!(r#"<div class="message {}">{}</div>"#, class, html_escape(&text)))
        .unwrap_or_default();

    let body = format!(
        r#"{nav}
<div class="container">
    <h2>{title}</h2>
    {notice}
    <form method="post" action="/panel{path}/update" class="card">
        {fields}
        <button type="submit" class="btn">Save</button>
    </form>
</div>"#,
        nav = navbar(),
        title = section.title(),
        path = section.path(),
        fields = fields.join("\n"),
    );
    document(section.title(), "", &body)
}

fn show_section(state: &WebState, section: Section) -> Html<String> {
    let errors = BTreeMap::new();
    Html(section_page(
        state,
        section,
        FormView {
            submitted: None,
            errors: &errors,
            notice: None,
        },
    ))
}

fn apply_section(state: &WebState, section: Section, form: FormValues) -> Response {
    let fields = section.fields();
    let update = validate_section(&fields, &form, |key| state.config.get(key, ""));

    if !update.errors.is_empty() {
        let html = section_page(
            state,
            section,
            FormView {
                submitted: Some(&form),
                errors: &update.errors,
                notice: Some(("error", "Please fix the highlighted fields.".to_string())),
            },
        );
        return (StatusCode::UNPROCESSABLE_ENTITY, Html(html)).into_response();
    }

    let notice = if update.changes.is_empty() {
        ("success", "No changes.".to_string())
    } else {
        match state.config.update_multiple(&update.changes) {
            Ok(_) => {
                let changed: Vec<&str> = update.changes.keys().map(String::as_str).collect();
                info!("Panel updated {}: {}", section.slug(), changed.join(", "));
                ("success", format!("Updated: {}", changed.join(", ")))
            }
            Err(e) => {
                error!("Failed to save {} settings: {}", section.slug(), e);
                ("error", format!("Failed to save: {}", e))
            }
        }
    };

    let errors = BTreeMap::new();
    Html(section_page(
        state,
        section,
        FormView {
            submitted: None,
            errors: &errors,
            notice: Some(notice),
        },
    ))
    .into_response()
}

/// GET /panel/config
async fn general_form(State(state): State<WebState>) -> Html<String> {
    show_section(&state, Section::General)
}

/// POST /panel/config/update
async fn update_general(State(state): State<WebState>, Form(form): Form<FormValues>) -> Response {
    apply_section(&state, Section::General, form)
}

/// GET /panel/config/:section
async fn section_form(State(state): State<WebState>, Path(slug): Path<String>) -> Response {
    match Section::from_slug(&slug) {
        Some(section) => show_section(&state, section).into_response(),
        None => (StatusCode::NOT_FOUND, "Unknown section").into_response(),
    }
}

/// POST /panel/config/:section/update
async fn update_section(
    State(state): State<WebState>,
    Path(slug): Path<String>,
    Form(form): Form<FormValues>,
) -> Response {
    match Section::from_slug(&slug) {
        Some(section) => apply_section(&state, section, form),
        None => (StatusCode::NOT_FOUND, "Unknown section").into_response(),
    }
}

/// GET /panel/logs - recent log lines, then live updates
async fn logs_page(State(state): State<WebState>) -> Html<String> {
    let logs_html: Vec<String> = state
        .log_buffer
        .recent(200)
        .iter()
        .map(|entry| {
            format!(
                r#"<div class="log-entry {}">{}</div>"#,
                entry.css_class(),
                html_escape(&entry.format())
            )
        })
        .collect();

    let body = format!(
        r#"{nav}
<div class="container">
    <h2>Logs <span id="status" class="hint">Connecting...</span></h2>
    <div id="logs" class="logs">{logs}</div>
</div>
<script>
    const logs = document.getElementById('logs');
    const status = document.getElementById('status');
    const classes = {{ ERROR: 'log-error', WARN: 'log-warn', INFO: 'log-info' }};

    function addLogEntry(entry) {{
        const div = document.createElement('div');
        div.className = 'log-entry ' + (classes[entry.level] || 'log-debug');
        div.textContent = entry.timestamp + ' ' + entry.level + ' [' + entry.target + '] ' + entry.message;
        logs.appendChild(div);
        while (logs.children.length > 1000) {{ logs.removeChild(logs.firstChild); }}
        logs.scrollTop = logs.scrollHeight;
    }}

    const eventSource = new EventSource('/panel/logs/stream');
    eventSource.onopen = function() {{ status.textContent = 'Live'; }};
    eventSource.onmessage = function(event) {{
        try {{
            addLogEntry(JSON.parse(event.data));
        }} catch (e) {{
            console.error('Failed to parse log entry:', e);
        }}
    }};
    eventSource.onerror = function() {{ status.textContent = 'Disconnected - Reconnecting...'; }};
    logs.scrollTop = logs.scrollHeight;
</script>"#,
        nav = navbar(),
        logs = logs_html.join("\n"),
    );

    Html(document("Logs", "", &body))
}

/// GET /panel/logs/stream - SSE endpoint for live logs
async fn logs_stream(State(state): State<WebState>) -> impl IntoResponse {
    let rx = state.log_buffer.subscribe();
    // Lagged receivers skip the missed entries
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let data = serde_json::to_string(&entry).ok()?;
        Some(Ok::<_, Infallible>(Event::default().data(data)))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

/// GET /panel/status
async fn status_page(State(state): State<WebState>) -> Response {
    match serde_json::to_value(status_report(&state).await) {
        Ok(report) => Html(report_page("Runtime status", &report)).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// GET /panel/api/bot-status
async fn bot_status_api(State(state): State<WebState>) -> Json<serde_json::Value> {
    let status = state.bot_status.read().await.clone();
    let uptime_seconds = status.uptime_seconds();
    Json(serde_json::json!({
        "status": status.status_label(),
        "uptime_seconds": uptime_seconds,
        "bot": status,
        "configured": state.config.is_configured(),
        "missing": state.config.missing_configs(),
        "pending_signals": state.config.signals().pending_count().unwrap_or(0),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::auth::hash_password;
    use crate::web::test_support::{serve, test_state};

    fn form(pairs: &[(&str, &str)]) -> FormValues {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn stored(key: &str) -> String {
        match key {
            "DISCORD_TOKEN" => "secret".to_string(),
            "BASE_URL" => "https://old.example".to_string(),
            "KEEP_ALIVE_ENABLED" => "true".to_string(),
            "KEEP_ALIVE_INTERVAL" => "300".to_string(),
            _ => String::new(),
        }
    }

    #[test]
    fn test_blank_password_keeps_secret_and_only_changes_are_sent() {
        let fields = Section::General.fields();
        let update = validate_section(
            &fields,
            &form(&[
                ("DISCORD_TOKEN", ""),
                ("GENIUS_CLIENT_ID", " client "),
                ("GENIUS_CLIENT_SECRET", "s3cret"),
                ("BASE_URL", "https://old.example"),
                ("KEEP_ALIVE_ENABLED", "true"),
                ("KEEP_ALIVE_INTERVAL", "300"),
            ]),
            stored,
        );

        assert!(update.errors.is_empty(), "{:?}", update.errors);
        assert!(!update.changes.contains_key("DISCORD_TOKEN"));
        assert!(!update.changes.contains_key("BASE_URL"));
        assert_eq!(update.changes["GENIUS_CLIENT_ID"], "client");
        assert_eq!(update.changes["GENIUS_CLIENT_SECRET"], "s3cret");
        // Unchecked box
        assert_eq!(update.changes[keys::WELCOME_REACTION_ENABLED], "false");
    }

    #[test]
    fn test_required_and_number_errors() {
        let fields = Section::General.fields();
        let update = validate_section(
            &fields,
            &form(&[("BASE_URL", "  "), ("KEEP_ALIVE_INTERVAL", "five")]),
            stored,
        );

        assert_eq!(update.errors["BASE_URL"], "This field is required");
        assert_eq!(update.errors["KEEP_ALIVE_INTERVAL"], "Must be a whole number");
        assert_eq!(update.errors["GENIUS_CLIENT_SECRET"], "This field is required");
        assert!(!update.errors.contains_key("DISCORD_TOKEN"));
    }

    #[test]
    fn test_keep_alive_interval_minimum() {
        let fields = Section::General.fields();
        let update = validate_section(&fields, &form(&[("KEEP_ALIVE_INTERVAL", "0")]), stored);
        assert_eq!(update.errors["KEEP_ALIVE_INTERVAL"], "Must be at least 60");
        assert!(!update.changes.contains_key("KEEP_ALIVE_INTERVAL"));

        let update = validate_section(&fields, &form(&[("KEEP_ALIVE_INTERVAL", "60")]), stored);
        assert!(!update.errors.contains_key("KEEP_ALIVE_INTERVAL"));
    }

    #[test]
    fn test_checkbox_presence() {
        let fields = Section::Commands.fields();
        let update = validate_section(&fields, &form(&[("ENABLE_COMMAND_PING", "true")]), |_| {
            "true".to_string()
        });
        assert!(!update.changes.contains_key("ENABLE_COMMAND_PING"));
        assert_eq!(update.changes["ENABLE_COMMAND_HELP"], "false");
        assert_eq!(update.changes.len(), keys::COMMAND_FLAGS.len() - 1);
    }

    #[tokio::test]
    async fn test_panel_requires_basic_auth() {
        let (state, _) = test_state();
        let base = serve(state).await;

        let response = reqwest::get(format!("{}/panel/config", base)).await.unwrap();
        assert_eq!(response.status(), 401);
        assert_eq!(
            response.headers()["www-authenticate"],
            "Basic realm=\"GeeBot Panel\""
        );
    }

    #[tokio::test]
    async fn test_panel_update_round_trip() {
        let (mut state, _) = test_state();
        state.credentials = std::sync::Arc::new(crate::web::auth::PanelCredentials::new(
            "admin",
            Some(hash_password("pw").unwrap()),
        ));
        let config = state.config.clone();
        let base = serve(state).await;
        let client = reqwest::Client::new();

        let page = client
            .get(format!("{}/panel/config/messages", base))
            .basic_auth("admin", Some("pw"))
            .send()
            .await
            .unwrap();
        assert_eq!(page.status(), 200);

        let response = client
            .post(format!("{}/panel/config/messages/update", base))
            .basic_auth("admin", Some("pw"))
            .form(&[(keys::WELCOME_MESSAGE_TEXT, "Hello there")])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.text().await.unwrap().contains("Updated: "));
        assert_eq!(config.get(keys::WELCOME_MESSAGE_TEXT, ""), "Hello there");
    }
}
