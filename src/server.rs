//! HTTP surface: session-cookie endpoints, dropdown options, form intake,
//! and the auth-gated static site.
use async_trait::async_trait;
use axum::extract::{DefaultBodyLimit, FromRequestParts, Multipart, Query, Request, State};
use axum::http::request::Parts;
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::auth::{AuthService, AuthUser};
use crate::config::Config;
use crate::error::Error;
use crate::monday::payload::{self, ExpenseEntry, TimeEntry};
use crate::monday::schema::{self, SchemaCache};
use crate::monday::upload::{self, ReceiptFile};
use crate::monday::{items, MondayApi};

pub const SESSION_COOKIE: &str = "sb-access-token";
const SESSION_MAX_AGE_SECS: i64 = 3600;
const LOGIN_PAGE: &str = "/login.html";
const CONFIRMATION_PAGE: &str = "/thanks.html";
/// Receipts can be phone photos; the axum default of 2 MiB is far too small.
const MAX_EXPENSE_BODY_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub monday: Arc<dyn MondayApi>,
    pub auth: Arc<dyn AuthService>,
    pub schema: Arc<SchemaCache>,
}

impl AppState {
    pub fn new(cfg: Config, monday: Arc<dyn MondayApi>, auth: Arc<dyn AuthService>) -> Self {
        Self {
            cfg: Arc::new(cfg),
            monday,
            auth,
            schema: Arc::new(SchemaCache::new()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let static_site = ServeDir::new(&state.cfg.app.public_dir);
    Router::new()
        .route("/auth/set", post(auth_set))
        .route("/auth/logout", post(auth_logout))
        .route("/options/mitarbeiter", get(options_employees))
        .route("/options/project", get(options_projects))
        .route("/create-item", post(create_item))
        .route("/create-expense", post(create_expense))
        .fallback_service(static_site)
        .layer(middleware::from_fn_with_state(state.clone(), page_gate))
        .layer(DefaultBodyLimit::max(MAX_EXPENSE_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = state.cfg.app.bind_addr.clone();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Whitelist gate for page loads. Non-GET requests pass through (the
/// protected POST routes enforce auth themselves, with a 401 instead of a
/// redirect); unauthenticated GETs outside the public prefixes are sent to
/// the login page.
async fn page_gate(State(state): State<AppState>, jar: CookieJar, req: Request, next: Next) -> Response {
    if req.method() != Method::GET {
        return next.run(req).await;
    }
    if is_public_path(req.uri().path()) {
        return next.run(req).await;
    }

    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return Redirect::to(LOGIN_PAGE).into_response();
    };
    let token = cookie.value().to_string();
    match state.auth.validate_token(&token).await {
        Ok(_) => next.run(req).await,
        Err(err) => {
            debug!(?err, "page gate rejected session");
            Redirect::to(LOGIN_PAGE).into_response()
        }
    }
}

fn is_public_path(path: &str) -> bool {
    const PUBLIC_PREFIXES: &[&str] = &[
        "/login.html",
        "/register.html",
        "/favicon.ico",
        "/auth/",
        "/js/",
        "/css/",
        "/img/",
        "/assets/",
    ];
    PUBLIC_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

/// Extractor for the protected API routes: resolves the session cookie via
/// the identity provider, rejecting with 401 when it is missing or invalid.
#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(SESSION_COOKIE)
            .ok_or(Error::Auth("Not authenticated"))?
            .value()
            .to_string();
        match state.auth.validate_token(&token).await {
            Ok(user) => Ok(user),
            Err(Error::Auth(msg)) => Err(Error::Auth(msg)),
            Err(err) => {
                warn!(?err, "token validation failed");
                Err(Error::Auth("Invalid token"))
            }
        }
    }
}

fn session_cookie(token: String, production: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(SESSION_MAX_AGE_SECS))
        .secure(production)
        .build()
}

#[derive(Debug, Deserialize)]
struct AuthSetBody {
    access_token: Option<String>,
}

async fn auth_set(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<AuthSetBody>,
) -> Response {
    let Some(token) = body.access_token.filter(|t| !t.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing token").into_response();
    };
    let jar = jar.add(session_cookie(token, state.cfg.app.production));
    (jar, StatusCode::OK).into_response()
}

async fn auth_logout(jar: CookieJar) -> Response {
    let removal = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .same_site(SameSite::Lax)
        .build();
    (jar.remove(removal), StatusCode::OK).into_response()
}

/// The employee board is not configured directly; it is whatever board the
/// hours board's employee relation column points at.
async fn employee_board_id(state: &AppState) -> Result<String, Error> {
    let boards = &state.cfg.monday.boards;
    let columns = state
        .schema
        .columns(state.monday.as_ref(), &boards.hours.id)
        .await?;
    let title = &boards.hours.columns.employee;
    let employee_col = schema::require_column(&columns, title, &boards.hours.id)?;
    schema::linked_board_id(title, employee_col)
}

#[instrument(skip_all)]
async fn options_employees(State(state): State<AppState>) -> Result<Json<Value>, Error> {
    let employee_board = employee_board_id(&state).await?;
    let items = items::fetch_all_items(state.monday.as_ref(), &employee_board).await?;
    Ok(Json(json!({ "items": items })))
}

#[derive(Debug, Deserialize)]
struct ProjectQuery {
    #[serde(rename = "mitarbeiterId")]
    mitarbeiter_id: Option<String>,
}

#[instrument(skip_all)]
async fn options_projects(
    State(state): State<AppState>,
    Query(query): Query<ProjectQuery>,
) -> Result<Json<Value>, Error> {
    let employee_id = query
        .mitarbeiter_id
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::validation("mitarbeiterId fehlt"))?;

    let employee_board = employee_board_id(&state).await?;
    let columns = state
        .schema
        .columns(state.monday.as_ref(), &employee_board)
        .await?;
    let title = &state.cfg.monday.boards.employees.participation_column;
    let participation = schema::require_column(&columns, title, &employee_board)?;
    let project_board = schema::linked_board_id(title, participation)?;

    let items = items::fetch_linked_items(
        state.monday.as_ref(),
        &employee_id,
        &participation.id,
        &project_board,
    )
    .await?;
    Ok(Json(json!({ "items": items })))
}

#[instrument(skip_all)]
async fn create_item(
    _user: AuthUser,
    State(state): State<AppState>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Redirect, Error> {
    let fields = payload::first_values(pairs);
    let entry = TimeEntry::from_fields(&fields)?;
    payload::create_time_entry(
        state.monday.as_ref(),
        &state.schema,
        &state.cfg.monday.boards.hours,
        &entry,
    )
    .await?;
    Ok(Redirect::to(CONFIRMATION_PAGE))
}

struct ExpenseSubmission {
    fields: HashMap<String, String>,
    files: Vec<ReceiptFile>,
}

#[instrument(skip_all)]
async fn create_expense(
    _user: AuthUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Redirect, Error> {
    let submission = read_expense_form(multipart, Path::new(&state.cfg.app.upload_dir)).await?;
    let outcome = handle_expense(&state, &submission).await;
    cleanup_spool(&submission.files).await;
    outcome?;
    Ok(Redirect::to(CONFIRMATION_PAGE))
}

async fn handle_expense(state: &AppState, submission: &ExpenseSubmission) -> Result<(), Error> {
    let entry = ExpenseEntry::from_fields(&submission.fields)?;
    let boards = &state.cfg.monday.boards;
    let item_id =
        payload::create_expense(state.monday.as_ref(), &state.schema, &boards.expenses, &entry)
            .await?;

    let columns = state
        .schema
        .columns(state.monday.as_ref(), &boards.expenses.id)
        .await?;
    let receipt =
        schema::require_column(&columns, &boards.expenses.columns.receipt, &boards.expenses.id)?;
    upload::upload_attachments(state.monday.as_ref(), &item_id, &receipt.id, &submission.files)
        .await?;
    Ok(())
}

/// Walk the multipart stream: text fields collapse first-wins, `beleg` file
/// parts are spooled to the upload dir so the uploader can stream them after
/// the item exists. Parts without a filename and stray file fields are
/// ignored, matching how the browser form has always been parsed.
async fn read_expense_form(mut multipart: Multipart, upload_dir: &Path) -> Result<ExpenseSubmission, Error> {
    let mut pairs = Vec::new();
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::validation(format!("Ungültige Formulardaten: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if let Some(file_name) = field.file_name().map(str::to_string) {
            if name != "beleg" || file_name.is_empty() {
                continue;
            }
            let data = field
                .bytes()
                .await
                .map_err(|e| Error::validation(format!("Ungültige Formulardaten: {e}")))?;
            let spooled = upload_dir.join(format!("{}.upload", Uuid::new_v4()));
            fs::write(&spooled, &data)
                .await
                .map_err(|e| Error::Transport(format!("failed to spool upload: {e}")))?;
            files.push(ReceiptFile {
                path: spooled,
                original_name: file_name,
                size: data.len() as u64,
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| Error::validation(format!("Ungültige Formulardaten: {e}")))?;
            pairs.push((name, value));
        }
    }

    Ok(ExpenseSubmission {
        fields: payload::first_values(pairs),
        files,
    })
}

async fn cleanup_spool(files: &[ReceiptFile]) {
    for file in files {
        if let Err(err) = fs::remove_file(&file.path).await {
            debug!(path = %file.path.display(), %err, "failed to remove spooled file");
        }
    }
}
