#![cfg(not(tarpaulin_include))]

use crate::auth::CredentialVerifier;
use crate::config::AppConfig;
use crate::error::{AuthError, WorkflowError};
use crate::graph::ChartSpec;
use crate::history::{ActionRecord, HistoryRecord, HistoryStore};
use crate::mailer::{Mailer, ReportDispatcher};
use crate::report::ReportComposer;
use crate::table::Preview;
use crate::workflow::{NO_NUMERIC_NOTICE, ReportWorkflow};
use axum::{
    Form, Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

const SESSION_COOKIE: &str = "session";
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// How long a login stays valid
pub const SESSION_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// One logged-in user's workflow, shared between their requests
pub type Session = Arc<Mutex<ReportWorkflow>>;

struct SessionEntry {
    workflow: Session,
    expires_at: SystemTime,
}

/// Logged-in sessions keyed by the session cookie value
///
/// Entries expire `ttl` after login. Expired entries are never handed out
/// and are dropped whenever a new session is inserted.
pub struct SessionRegistry {
    ttl: Duration,
    entries: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Store a workflow under a fresh session id
    ///
    /// # Returns
    /// * `Option<String>` - The new session id, `None` if the registry is unusable
    pub fn insert(&self, workflow: Session) -> Option<String> {
        self.insert_at(workflow, SystemTime::now())
    }

    pub fn insert_at(&self, workflow: Session, now: SystemTime) -> Option<String> {
        let id = Uuid::new_v4().to_string();
        let mut entries = self.entries.write().ok()?;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            id.clone(),
            SessionEntry {
                workflow,
                expires_at: now + self.ttl,
            },
        );
        Some(id)
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.get_at(id, SystemTime::now())
    }

    /// The workflow for `id`, unless it has expired by `now`
    pub fn get_at(&self, id: &str, now: SystemTime) -> Option<Session> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(id)?;
        (entry.expires_at > now).then(|| entry.workflow.clone())
    }

    pub fn remove(&self, id: &str) -> Option<Session> {
        self.entries
            .write()
            .ok()?
            .remove(id)
            .map(|entry| entry.workflow)
    }

    /// Drop every session expired by `now`, returning how many went
    pub fn prune(&self, now: SystemTime) -> usize {
        match self.entries.write() {
            Ok(mut entries) => {
                let before = entries.len();
                entries.retain(|_, entry| entry.expires_at > now);
                before - entries.len()
            }
            Err(_) => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared server state: collaborators plus one workflow per logged-in session
pub struct AppState {
    config: AppConfig,
    store: HistoryStore,
    verifier: Arc<dyn CredentialVerifier>,
    dispatcher: Option<Arc<dyn ReportDispatcher>>,
    sessions: SessionRegistry,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: HistoryStore,
        verifier: Arc<dyn CredentialVerifier>,
        dispatcher: Option<Arc<dyn ReportDispatcher>>,
    ) -> Self {
        Self {
            config,
            store,
            verifier,
            dispatcher,
            sessions: SessionRegistry::new(SESSION_DURATION),
        }
    }

    fn new_workflow(&self) -> ReportWorkflow {
        let workflow = ReportWorkflow::new(self.verifier.clone(), self.store.clone())
            .with_composer(ReportComposer::new(self.config.report_title.clone()))
            .with_chart_options(self.config.chart_options());
        match &self.dispatcher {
            Some(dispatcher) => workflow.with_dispatcher(dispatcher.clone()),
            None => workflow,
        }
    }

    fn session(&self, jar: &CookieJar) -> Option<Session> {
        self.sessions.get(jar.get(SESSION_COOKIE)?.value())
    }
}

#[derive(Deserialize)]
pub struct LoginForm {
    username: String,
    password: String,
}

#[derive(Deserialize)]
pub struct SendRequest {
    recipient: String,
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    message: Option<String>,
}

#[derive(Serialize)]
struct UploadResponse {
    status: String,
    source: Option<String>,
    has_logo: bool,
    preview: Option<Preview>,
    notices: Vec<String>,
}

#[derive(Serialize)]
struct AdminLogsResponse {
    reports: Vec<HistoryRecord>,
    actions: Vec<ActionRecord>,
}

/// Workflow failure mapped onto an HTTP status
pub struct ApiError(StatusCode, String);

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        let status = match &e {
            WorkflowError::Parse(_) => StatusCode::BAD_REQUEST,
            WorkflowError::Compose(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WorkflowError::Auth(AuthError::Forbidden) => StatusCode::FORBIDDEN,
            WorkflowError::Auth(_) => StatusCode::UNAUTHORIZED,
            WorkflowError::Dispatch(_) => StatusCode::BAD_GATEWAY,
            WorkflowError::Busy => StatusCode::CONFLICT,
            WorkflowError::Chart(_) | WorkflowError::History(_) | WorkflowError::Export(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            error!("Request failed: {}", e);
        }
        ApiError(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.0,
            Json(StatusResponse {
                status: "error".to_string(),
                message: Some(self.1),
            }),
        )
            .into_response()
    }
}

fn unauthorized() -> ApiError {
    ApiError(StatusCode::UNAUTHORIZED, "Not logged in".to_string())
}

fn no_data() -> Response {
    (
        StatusCode::CONFLICT,
        Json(StatusResponse {
            status: "error".to_string(),
            message: Some("Upload a CSV file first".to_string()),
        }),
    )
        .into_response()
}

/// Run a workflow action on the blocking pool
///
/// Chart drawing, PDF layout, SQLite and SMTP are all synchronous.
async fn with_session<T, F>(session: Session, action: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&mut ReportWorkflow) -> Result<T, WorkflowError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut workflow = session.lock().map_err(|_| {
            ApiError(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Session state is unavailable".to_string(),
            )
        })?;
        action(&mut *workflow).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
}

/// Build the router over a prepared state
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(serve_dashboard))
        .route("/login", get(serve_login_page).post(handle_login))
        .route("/logout", post(handle_logout))
        .route("/api/upload", post(handle_upload))
        .route("/api/chart", get(handle_chart))
        .route("/api/generate", post(handle_generate))
        .route("/api/send", post(handle_send))
        .route("/api/export", get(handle_export))
        .route("/api/history", get(handle_history))
        .route("/api/admin/logs", get(handle_admin_logs))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server
///
/// Opens the history database, builds the collaborators from `config` and
/// serves until the process is stopped.
pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = HistoryStore::open(&config.database_path)?;

    let credentials = config.credentials();
    if credentials.is_empty() {
        warn!("No users configured; nobody will be able to log in");
    }

    let dispatcher: Option<Arc<dyn ReportDispatcher>> = match &config.smtp {
        Some(settings) => Some(Arc::new(Mailer::new(settings)?)),
        None => {
            warn!("No SMTP settings; emailing reports is disabled");
            None
        }
    };

    let bind_address = config.bind_address.clone();
    let state = Arc::new(AppState::new(config, store, Arc::new(credentials), dispatcher));

    let listener = TcpListener::bind(&bind_address).await?;
    info!("Listening on http://{}", bind_address);
    axum::serve(listener, router(state)).await?;

    Ok(())
}

async fn serve_login_page() -> Html<&'static str> {
    Html(include_str!("./static/login.html"))
}

async fn serve_dashboard(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    match state.session(&jar) {
        Some(_) => Html(include_str!("./static/dashboard.html")).into_response(),
        None => Redirect::to("/login").into_response(),
    }
}

async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(credentials): Form<LoginForm>,
) -> Response {
    let session = Arc::new(Mutex::new(state.new_workflow()));
    let username = credentials.username.clone();

    let result = with_session(session.clone(), move |workflow| {
        workflow
            .authenticate(&credentials.username, &credentials.password)
            .map(|_| ())
    })
    .await;

    match result {
        Ok(()) => {
            // Logging in again replaces whatever the old cookie pointed at
            if let Some(old) = jar.get(SESSION_COOKIE) {
                state.sessions.remove(old.value());
            }
            let Some(session_id) = state.sessions.insert(session) else {
                return (StatusCode::INTERNAL_SERVER_ERROR, "Session store unavailable")
                    .into_response();
            };
            let cookie = Cookie::build((SESSION_COOKIE, session_id))
                .path("/")
                .http_only(true);
            (jar.add(cookie), Redirect::to("/")).into_response()
        }
        Err(ApiError(status, message)) => {
            if status != StatusCode::UNAUTHORIZED {
                error!("Login for '{}' failed: {}", username, message);
            }
            Redirect::to(&format!(
                "/login?error={}",
                urlencoding::encode(&message)
            ))
            .into_response()
        }
    }
}

async fn handle_logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let removed = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| state.sessions.remove(cookie.value()));
    if let Some(session) = removed {
        let result = with_session(session, |workflow| {
            workflow.logout();
            Ok(())
        })
        .await;
        if let Err(ApiError(_, message)) = result {
            warn!("Logout cleanup failed: {}", message);
        }
    }

    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Redirect::to("/login"),
    )
        .into_response()
}

async fn handle_upload(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let session = state.session(&jar).ok_or_else(unauthorized)?;

    let mut csv: Option<(String, Vec<u8>)> = None;
    let mut logo: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError(StatusCode::BAD_REQUEST, e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().unwrap_or("upload.csv").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError(StatusCode::BAD_REQUEST, e.to_string()))?;
        if data.is_empty() {
            continue;
        }

        match name.as_str() {
            "csv" => csv = Some((file_name, data.to_vec())),
            "logo" => logo = Some(data.to_vec()),
            _ => {}
        }
    }

    let preview_rows = state.config.preview_rows;
    let response = with_session(session, move |workflow| {
        if let Some(logo) = logo {
            workflow.set_logo(&logo)?;
        }
        if let Some((file_name, bytes)) = csv {
            workflow.ingest_file(&file_name, &bytes)?;
        }

        let mut notices = Vec::new();
        if let Some(model) = workflow.current_model() {
            if ChartSpec::select(model).is_none() {
                notices.push(NO_NUMERIC_NOTICE.to_string());
            }
        }

        Ok(UploadResponse {
            status: "ok".to_string(),
            source: workflow.source_name().map(str::to_string),
            has_logo: workflow.has_logo(),
            preview: workflow.preview(preview_rows)?,
            notices,
        })
    })
    .await?;

    Ok(Json(response))
}

async fn handle_chart(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let session = state.session(&jar).ok_or_else(unauthorized)?;
    let view = with_session(session, |workflow| workflow.chart()).await?;

    Ok(match view {
        None => no_data(),
        Some(view) => match view.png {
            Some(png) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
            None => Json(StatusResponse {
                status: "skipped".to_string(),
                message: view.notice,
            })
            .into_response(),
        },
    })
}

async fn handle_generate(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let session = state.session(&jar).ok_or_else(unauthorized)?;
    let report = with_session(session, |workflow| workflow.generate()).await?;

    let Some(report) = report else {
        return Ok(no_data());
    };

    let mut headers = vec![
        (header::CONTENT_TYPE, "application/pdf".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", report.file_name),
        ),
    ];
    if !report.notices.is_empty() {
        headers.push((
            header::HeaderName::from_static("x-report-notice"),
            report.notices.join(" "),
        ));
    }

    let mut response = report.document.into_response();
    for (name, value) in headers {
        if let Ok(value) = header::HeaderValue::from_str(&value) {
            response.headers_mut().insert(name, value);
        }
    }
    Ok(response)
}

async fn handle_send(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<SendRequest>,
) -> Result<Response, ApiError> {
    let session = state.session(&jar).ok_or_else(unauthorized)?;
    let receipt =
        with_session(session, move |workflow| workflow.send(request.recipient.trim())).await?;

    Ok(match receipt {
        None => no_data(),
        Some(receipt) => Json(StatusResponse {
            status: "ok".to_string(),
            message: Some(format!(
                "Sent {} to {}",
                receipt.file_name, receipt.recipient
            )),
        })
        .into_response(),
    })
}

async fn handle_export(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let session = state.session(&jar).ok_or_else(unauthorized)?;
    let csv = with_session(session, |workflow| workflow.export_csv()).await?;

    Ok(match csv {
        None => no_data(),
        Some(csv) => (
            [
                (header::CONTENT_TYPE, "text/csv"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"report.csv\""),
            ],
            csv,
        )
            .into_response(),
    })
}

async fn handle_history(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Json<Vec<HistoryRecord>>, ApiError> {
    let session = state.session(&jar).ok_or_else(unauthorized)?;
    let records = with_session(session, |workflow| workflow.my_history()).await?;
    Ok(Json(records))
}

async fn handle_admin_logs(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Json<AdminLogsResponse>, ApiError> {
    let session = state.session(&jar).ok_or_else(unauthorized)?;
    let logs = with_session(session, |workflow| {
        Ok(AdminLogsResponse {
            reports: workflow.admin_history()?,
            actions: workflow.admin_logs()?,
        })
    })
    .await?;
    Ok(Json(logs))
}
