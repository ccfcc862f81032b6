use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use herald_content::{AttachmentStore, ContentStore};
use herald_core::HeraldConfig;
use herald_providers::ProviderRegistry;
use herald_scheduler::{PublishExecutor, PublishLog, RetryPolicy, ScheduleStore};
use rusqlite::Connection;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::ai::{ContentImprover, HeuristicImprover};
use crate::http;

/// Multipart framing on top of the file payload.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared state handed to every handler as `Arc<AppState>`.
pub struct AppState {
    pub config: HeraldConfig,
    pub content: Arc<ContentStore>,
    pub attachments: Arc<AttachmentStore>,
    pub schedules: Arc<ScheduleStore>,
    pub publish_log: Arc<PublishLog>,
    pub providers: Arc<ProviderRegistry>,
    pub executor: Arc<PublishExecutor>,
    pub improver: Box<dyn ContentImprover>,
}

impl AppState {
    /// Wire the stores around already-initialised connections: one for
    /// content and attachments, one for schedules and the publish log.
    pub fn new(
        config: HeraldConfig,
        content_db: Connection,
        scheduler_db: Connection,
        providers: ProviderRegistry,
    ) -> Self {
        let content_db = Arc::new(Mutex::new(content_db));
        let scheduler_db = Arc::new(Mutex::new(scheduler_db));

        let content = Arc::new(ContentStore::new(
            Arc::clone(&content_db),
            config.content.default_space.clone(),
        ));
        let attachments = Arc::new(AttachmentStore::new(
            content_db,
            &config.storage.attachment_dir,
            config.storage.max_attachment_bytes,
        ));
        let schedules = Arc::new(ScheduleStore::new(Arc::clone(&scheduler_db)));
        let publish_log = Arc::new(PublishLog::new(scheduler_db));
        let providers = Arc::new(providers);

        let executor = Arc::new(
            PublishExecutor::new(
                Arc::clone(&schedules),
                Arc::clone(&publish_log),
                Arc::clone(&content),
                Arc::clone(&attachments),
                Arc::clone(&providers),
            )
            .with_policy(RetryPolicy::from_config(&config.scheduler))
            .with_attempt_timeout(Duration::from_secs(config.scheduler.attempt_timeout_secs)),
        );

        Self {
            config,
            content,
            attachments,
            schedules,
            publish_log,
            providers,
            executor,
            improver: Box::new(HeuristicImprover),
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let upload_limit = usize::try_from(state.config.storage.max_attachment_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);
    let cors = build_cors_layer(&state.config.gateway.cors_origins);

    Router::new()
        .route("/health", get(http::health::health_handler))
        .route("/content", post(http::content::create_content))
        .route("/content/{id}", get(http::content::get_content))
        .route(
            "/content/{id}/attachments",
            post(http::content::attach_to_content),
        )
        .route(
            "/content/{id}/publications",
            get(http::content::list_publications),
        )
        .route(
            "/attachments",
            post(http::attachments::upload_attachment).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/ai/improve", post(http::ai::improve))
        .route("/ai/describe", post(http::ai::describe))
        .route("/publish", post(http::publish::publish_now))
        .route(
            "/schedules",
            get(http::schedules::list_schedules).post(http::schedules::create_schedule),
        )
        .route("/schedules/{id}", get(http::schedules::get_schedule))
        .route("/providers", get(http::providers::list_providers))
        .with_state(state)
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// CORS for the compose UI. A lone `"*"` allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.len() == 1 && origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\"; all origins allowed");
        AllowOrigin::any()
    } else {
        let exact: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(hv) => Some(hv),
                Err(_) => {
                    tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
                    None
                }
            })
            .collect();
        AllowOrigin::list(exact)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// In-memory state with attachments under a temp dir.
    pub fn state() -> (Arc<AppState>, tempfile::TempDir) {
        let providers = ProviderRegistry::with_stubs(&HeraldConfig::default().providers.default_target);
        state_with(providers)
    }

    pub fn state_with(providers: ProviderRegistry) -> (Arc<AppState>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = HeraldConfig::default();
        config.storage.attachment_dir = dir.path().to_string_lossy().into_owned();
        config.storage.max_attachment_bytes = 1024;

        let content_db = Connection::open_in_memory().unwrap();
        herald_content::db::init_db(&content_db).unwrap();
        let scheduler_db = Connection::open_in_memory().unwrap();
        herald_scheduler::db::init_db(&scheduler_db).unwrap();

        let state = AppState::new(config, content_db, scheduler_db, providers);
        (Arc::new(state), dir)
    }
}
