//! REST API and single-page UI

use crate::controller::{Action, ActionOutcome, Assistant, ControllerError, ScriptView};
use crate::session::{SessionError, SessionStore};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Largest accepted upload
const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// API state
pub struct ApiState {
    pub assistant: Arc<Assistant>,
    pub sessions: Arc<SessionStore>,
    pub credential_present: bool,
}

/// Query string of an upload
#[derive(Debug, Deserialize)]
pub struct UploadParams {
    /// Original file name; must end in `.sql`
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct SessionCreated {
    pub session_id: Uuid,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model: String,
    pub credential_present: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Controller errors mapped onto HTTP statuses
pub struct ApiError(ControllerError);

impl From<ControllerError> for ApiError {
    fn from(err: ControllerError) -> Self {
        Self(err)
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ControllerError::InvalidFile(_)
            | ControllerError::InvalidEncoding
            | ControllerError::MissingScript(_)
            | ControllerError::MissingConversion => StatusCode::BAD_REQUEST,
            ControllerError::Superseded(_) => StatusCode::CONFLICT,
            ControllerError::SampleUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ControllerError::Session(_) => StatusCode::NOT_FOUND,
        };
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Create the API router
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/health", get(health_check))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id/script", post(upload_script))
        .route("/api/sessions/:id/sample", post(load_sample))
        .route("/api/sessions/:id/overview", post(overview))
        .route("/api/sessions/:id/diagram", post(diagram))
        .route("/api/sessions/:id/convert", post(convert))
        .route("/api/sessions/:id/verify", post(verify))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.assistant.model().to_string(),
        credential_present: state.credential_present,
    })
}

async fn create_session(State(state): State<Arc<ApiState>>) -> Json<SessionCreated> {
    Json(SessionCreated {
        session_id: state.sessions.create(),
    })
}

/// Store an uploaded file; the body is the raw file content
async fn upload_script(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<Json<ScriptView>, ApiError> {
    let session = state.sessions.get(id)?;
    Ok(Json(state.assistant.load_script(&session, &params.name, &body)?))
}

async fn load_sample(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScriptView>, ApiError> {
    let session = state.sessions.get(id)?;
    Ok(Json(state.assistant.load_sample(&session).await?))
}

async fn run_action(
    state: &ApiState,
    id: Uuid,
    action: Action,
) -> Result<Json<ActionOutcome>, ApiError> {
    let session = state.sessions.get(id)?;
    Ok(Json(state.assistant.run(&session, action).await?))
}

async fn overview(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionOutcome>, ApiError> {
    run_action(&state, id, Action::Overview).await
}

async fn diagram(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionOutcome>, ApiError> {
    run_action(&state, id, Action::Diagram).await
}

async fn convert(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionOutcome>, ApiError> {
    run_action(&state, id, Action::Convert).await
}

async fn verify(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionOutcome>, ApiError> {
    run_action(&state, id, Action::Verify).await
}

/// Assistant page
async fn index_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>SQL Server to PostgreSQL Assistant</title>
    <style>
        :root {
            --bg: #1a1a2e;
            --card: #16213e;
            --accent: #0f3460;
            --highlight: #e94560;
            --text: #eee;
            --muted: #888;
            --error: #f87171;
            --warn: #f59e0b;
        }
        * { box-sizing: border-box; }
        body {
            font-family: system-ui, sans-serif;
            background: var(--bg);
            color: var(--text);
            margin: 0;
            padding: 20px;
        }
        .container { max-width: 1200px; margin: 0 auto; }
        h1 { color: var(--highlight); font-size: 1.5rem; }
        h2 { font-size: 1.1rem; color: var(--muted); margin: 0 0 10px; }
        .card {
            background: var(--card);
            padding: 20px;
            border-radius: 12px;
            margin-bottom: 20px;
        }
        .toolbar { display: flex; gap: 10px; flex-wrap: wrap; align-items: center; }
        button {
            background: var(--highlight);
            color: white;
            border: none;
            padding: 10px 20px;
            border-radius: 8px;
            cursor: pointer;
        }
        button.secondary { background: var(--accent); }
        pre, code { font-family: 'SF Mono', 'Consolas', monospace; }
        pre {
            white-space: pre-wrap;
            background: var(--bg);
            padding: 12px;
            border-radius: 8px;
            overflow-x: auto;
        }
        details summary { cursor: pointer; color: var(--muted); }
        .placeholder { color: var(--muted); font-style: italic; }
        .failed { color: var(--error); }
        .warning { color: var(--warn); font-size: 0.85rem; margin-bottom: 8px; }
        .mermaid { background: #fff; border-radius: 8px; padding: 10px; }
    </style>
</head>
<body>
<div class="container">
    <h1>SQL Server to PostgreSQL Assistant</h1>

    <div class="card toolbar">
        <input type="file" id="fileInput" accept=".sql">
        <button class="secondary" id="loadSampleBtn">Load sample data</button>
    </div>

    <div class="card">
        <details id="sqlAccordion" open>
            <summary>Uploaded SQL Server Code</summary>
            <pre id="sqlContent" class="placeholder">No script loaded.</pre>
        </details>
    </div>

    <div class="card">
        <h2>Overview</h2>
        <div id="overview" class="placeholder">Upload a script to get an overview.</div>
    </div>

    <div class="card">
        <div class="toolbar"><h2>ER Diagram</h2><button id="generateDiagramBtn">Generate ERD</button></div>
        <div id="diagram"></div>
    </div>

    <div class="card">
        <div class="toolbar"><h2>PostgreSQL</h2><button id="convertBtn">Convert</button></div>
        <div id="convertedCode"></div>
    </div>

    <div class="card">
        <div class="toolbar"><h2>Verification</h2><button id="verifyBtn">Verify</button></div>
        <div id="verificationResult"></div>
    </div>
</div>

<script type="module">
    import mermaid from 'https://cdn.jsdelivr.net/npm/mermaid@10/dist/mermaid.esm.min.mjs';
    mermaid.initialize({ startOnLoad: false });

    const regions = {
        overview: document.getElementById('overview'),
        diagram: document.getElementById('diagram'),
        convert: document.getElementById('convertedCode'),
        verify: document.getElementById('verificationResult'),
    };
    const placeholders = {
        overview: 'Generating overview...',
        diagram: 'Generating ERD diagram...',
        convert: 'Converting to PostgreSQL...',
        verify: 'Verifying the converted code...',
    };

    const { session_id: sessionId } = await fetch('/api/sessions', { method: 'POST' }).then(r => r.json());

    async function call(path, options = {}) {
        const response = await fetch(`/api/sessions/${sessionId}/${path}`, { method: 'POST', ...options });
        const text = await response.text();
        let body;
        try {
            body = JSON.parse(text);
        } catch {
            body = { error: text || response.statusText };
        }
        return { status: response.status, body };
    }

    function showScript(view) {
        const pre = document.getElementById('sqlContent');
        pre.classList.remove('placeholder');
        pre.innerHTML = view.script_html;
        document.getElementById('sqlAccordion').open = true;
        regions.diagram.innerHTML = '';
        regions.convert.innerHTML = '';
        regions.verify.innerHTML = '';
    }

    async function runAction(action) {
        const region = regions[action];
        const previous = region.innerHTML;
        region.innerHTML = `<p class="placeholder">${placeholders[action]}</p>`;
        const { status, body } = await call(action);
        if (status === 409) {
            return;
        }
        if (status !== 200) {
            region.innerHTML = previous;
            alert(body.error);
            return;
        }
        const warning = body.warning ? `<div class="warning">${body.warning}</div>` : '';
        region.innerHTML = warning + `<div class="${body.status}">${body.html}</div>`;
        if (action === 'diagram' && body.status === 'rendered') {
            await mermaid.run({ nodes: region.querySelectorAll('.mermaid') });
        }
    }

    async function loaded(result) {
        if (result.status !== 200) {
            alert(result.body.error);
            return;
        }
        showScript(result.body);
        await runAction('overview');
    }

    document.getElementById('fileInput').addEventListener('change', async (e) => {
        const file = e.target.files[0];
        if (!file) {
            return;
        }
        const data = await file.arrayBuffer();
        await loaded(await call(`script?name=${encodeURIComponent(file.name)}`, { body: data }));
    });

    document.getElementById('loadSampleBtn').addEventListener('click', async () => {
        await loaded(await call('sample'));
    });

    document.getElementById('generateDiagramBtn').addEventListener('click', () => runAction('diagram'));
    document.getElementById('convertBtn').addEventListener('click', () => runAction('convert'));
    document.getElementById('verifyBtn').addEventListener('click', () => runAction('verify'));
</script>
</body>
</html>
"##;
