// ABOUTME: Axum router assembly: JSON API under /api, the socket endpoint and a health probe
// ABOUTME: Also owns the background task that prunes expired sessions

use axum::extract::DefaultBodyLimit;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, patch, post};
use axum::{middleware, Router};
use std::time::Duration;
use tokio::time;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::session::SessionStore;
use crate::{auth, invites, socket, sources, uploads, vaults, AppState};

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(300);
// Multipart framing overhead on top of the file itself
const UPLOAD_BODY_SLACK: usize = 64 * 1024;

pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let origin: HeaderValue = state.config.allowed_origin.parse()?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_credentials(true)
        .allow_headers([ACCEPT, CONTENT_TYPE]);

    let upload_limit = DefaultBodyLimit::max(state.config.max_upload_bytes + UPLOAD_BODY_SLACK);

    let api = Router::new()
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/session", get(auth::current_session))
        .route("/vaults", get(vaults::list_vaults).post(vaults::create_vault))
        .route(
            "/vaults/:id",
            get(vaults::get_vault)
                .patch(vaults::rename_vault)
                .delete(vaults::delete_vault),
        )
        .route(
            "/vaults/:id/sources",
            get(sources::list_sources).post(sources::create_source),
        )
        .route(
            "/vaults/:id/sources/:source_id",
            axum::routing::delete(sources::delete_source),
        )
        .route(
            "/vaults/:id/upload",
            post(uploads::upload_file).layer(upload_limit),
        )
        .route("/vaults/:id/files/:file_key", get(uploads::download_file))
        .route("/vaults/:id/invite", post(invites::create_invite))
        .route("/vaults/:id/members/:user_id", patch(vaults::update_member_role))
        .route("/vaults/:id/audit", get(vaults::list_audit_log))
        .route("/invites/:token", get(invites::validate_invite))
        .route("/invites/:token/accept", post(invites::accept_invite));

    Ok(Router::new()
        .nest("/api", api)
        .route("/ws", get(socket::ws_handler))
        .route("/health", get(health))
        .layer(middleware::from_fn(crate::middleware::security_headers))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

async fn health() -> &'static str {
    "ok"
}

pub fn spawn_session_cleanup(sessions: SessionStore) {
    tokio::spawn(async move {
        let mut interval = time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = sessions.cleanup_expired_sessions();
            if removed > 0 {
                tracing::debug!("Pruned {} expired session(s)", removed);
            }
        }
    });
}
