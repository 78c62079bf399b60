use crate::admin;
use crate::config::AppConfig;
use crate::footer::{RequestContext, splice_footer};
use crate::hooks::HookRegistry;
use crate::roles::RoleTable;
use crate::session::{SessionManager, session_token};
use crate::store::SettingsStore;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Everything the request handlers need, constructed once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn SettingsStore>,
    pub roles: Arc<dyn RoleTable>,
    pub sessions: Arc<dyn SessionManager>,
    pub hooks: Arc<HookRegistry>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn SettingsStore>,
        roles: Arc<dyn RoleTable>,
        sessions: Arc<dyn SessionManager>,
        hooks: Arc<HookRegistry>,
    ) -> Self {
        Self {
            config,
            store,
            roles,
            sessions,
            hooks,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(healthz))
        .route("/admin", get(admin::admin_index))
        .route(
            "/admin/settings/{slug}",
            get(admin::settings_page).post(admin::settings_submit),
        )
        .route("/admin/session", post(admin::issue_session))
        .fallback(get(serve_site));

    if state.config.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }

    router
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(?err, "failed to listen for shutdown signal");
    }
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Derives the footer decision context from the request headers. A broken
/// session backend degrades to an anonymous viewer rather than failing the
/// request.
pub async fn request_context(
    state: &AppState,
    headers: &HeaderMap,
    admin_area: bool,
) -> RequestContext {
    let viewer = match state.sessions.validate(session_token(headers)).await {
        Ok(viewer) => viewer,
        Err(err) => {
            warn!(?err, "session validation failed; treating viewer as anonymous");
            None
        }
    };
    RequestContext {
        authenticated: viewer.is_some(),
        role: viewer
            .as_ref()
            .and_then(|v| v.primary_role().map(str::to_string)),
        admin_area,
    }
}

/// Serves a page from the site root with the footer hooks spliced in before
/// `</body>`.
async fn serve_site(State(state): State<AppState>, uri: Uri, headers: HeaderMap) -> Response {
    let ctx = request_context(&state, &headers, false).await;

    for candidate in site_candidates(&state.config.site_root, uri.path()) {
        let html = match tokio::fs::read_to_string(&candidate).await {
            Ok(html) => html,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => {
                return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
            }
        };
        let footer = state.hooks.render_footers(&ctx).await;
        return match splice_footer(&html, &footer) {
            Ok(spliced) => Html(spliced).into_response(),
            Err(err) => {
                warn!(?err, path = %candidate.display(), "footer splice failed; appending to page end");
                Html(format!("{html}{footer}")).into_response()
            }
        };
    }

    (StatusCode::NOT_FOUND, "not found").into_response()
}

/// Candidate files for a request path: the path itself, then `<path>.html`
/// and `<path>/index.html` for extensionless paths. Traversal segments yield
/// no candidates.
fn site_candidates(root: &Path, request_path: &str) -> Vec<PathBuf> {
    let trimmed = request_path.trim_start_matches('/').trim_end_matches('/');
    if trimmed.split('/').any(|segment| segment == "..") {
        return Vec::new();
    }
    if trimmed.is_empty() {
        return vec![root.join("index.html")];
    }

    let mut candidates = vec![root.join(trimmed)];
    let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
    if !last.contains('.') {
        candidates.push(root.join(format!("{trimmed}.html")));
        candidates.push(root.join(trimmed).join("index.html"));
    }
    candidates
}
