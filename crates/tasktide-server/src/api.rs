use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{header, Method},
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use tasktide_shared::gamification::{local_day, local_day_start};
use tasktide_store::Database;

use crate::attachments::{content_type_for, AttachmentStore};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::{analytics, auth, notifications, tasks, users};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub attachments: Arc<AttachmentStore>,
    pub rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(
        db: Database,
        attachments: AttachmentStore,
        rate_limiter: RateLimiter,
        config: ServerConfig,
    ) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            attachments: Arc::new(attachments),
            rate_limiter,
            config: Arc::new(config),
        }
    }

    /// Lock the store. The guard is not `Send`, so it cannot be held across
    /// an `.await` inside a handler.
    pub fn db(&self) -> Result<MutexGuard<'_, Database>, ServerError> {
        self.db
            .lock()
            .map_err(|_| ServerError::Internal("database lock poisoned".to_string()))
    }

    pub fn day_offset(&self) -> FixedOffset {
        self.config.day_offset()
    }

    pub fn today(&self, now: DateTime<Utc>) -> Today {
        Today::at(now, &self.day_offset())
    }
}

/// The configured calendar day containing an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Today {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
}

impl Today {
    pub fn at(now: DateTime<Utc>, offset: &FixedOffset) -> Self {
        let date = local_day(now, offset);
        Self {
            date,
            start: local_day_start(date, offset),
        }
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.start + Duration::days(1)
    }

    pub fn yesterday_start(&self) -> DateTime<Utc> {
        self.start - Duration::days(1)
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    let public = Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/uploads/:name", get(serve_upload))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login));

    let protected = Router::new()
        // auth
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/profile", put(auth::update_profile))
        .route("/api/auth/password", put(auth::change_password))
        // users
        .route("/api/users/search", get(users::search))
        // tasks
        .route("/api/tasks", post(tasks::create_task).get(tasks::list_tasks))
        .route("/api/tasks/search", get(tasks::search_tasks))
        .route("/api/tasks/filter", get(tasks::filter_tasks))
        .route("/api/tasks/suggestions", get(tasks::suggestions))
        .route("/api/tasks/bulk-complete", post(tasks::bulk_complete))
        .route("/api/tasks/bulk-delete", delete(tasks::bulk_delete))
        .route(
            "/api/tasks/:id",
            get(tasks::get_task)
                .put(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/api/tasks/:id/complete", patch(tasks::toggle_complete))
        .route("/api/tasks/:id/recurring", post(tasks::setup_recurring))
        .route("/api/tasks/:id/share", post(tasks::share_task))
        .route("/api/tasks/:id/attachments", post(tasks::upload_attachments))
        .route("/api/tasks/:id/history", get(tasks::task_history))
        .route("/api/tasks/:id/undo", post(tasks::undo_last_action))
        // analytics
        .route("/api/analytics/overview", get(analytics::overview))
        .route("/api/analytics/productivity", get(analytics::productivity))
        .route("/api/analytics/streaks", get(analytics::streaks))
        .route("/api/analytics/bottlenecks", get(analytics::bottlenecks))
        .route("/api/analytics/gamification", get(analytics::gamification))
        // notifications
        .route("/api/notifications", get(notifications::list))
        .route("/api/notifications/send", post(notifications::send))
        .route("/api/notifications/:id/read", patch(notifications::mark_read))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(DefaultBodyLimit::max(state.config.body_limit()))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
    registration_open: bool,
    max_upload_size: usize,
    max_files_per_upload: usize,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        registration_open: state.config.registration_open,
        max_upload_size: state.attachments.max_size(),
        max_files_per_upload: state.config.max_files_per_upload,
    })
}

async fn serve_upload(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let data = state.attachments.read(&name).await?;
    Ok(([(header::CONTENT_TYPE, content_type_for(&name))], data))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn today_window_respects_offset() {
        // 01:00 UTC on the 10th is still the 9th at UTC-5
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 1, 0, 0).unwrap();
        let minus_five = FixedOffset::west_opt(5 * 3600).unwrap();
        let today = Today::at(now, &minus_five);

        assert_eq!(today.date, NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        assert_eq!(today.start, Utc.with_ymd_and_hms(2024, 3, 9, 5, 0, 0).unwrap());
        assert_eq!(today.end(), Utc.with_ymd_and_hms(2024, 3, 10, 5, 0, 0).unwrap());
        assert_eq!(
            today.yesterday_start(),
            Utc.with_ymd_and_hms(2024, 3, 8, 5, 0, 0).unwrap()
        );
    }
}
