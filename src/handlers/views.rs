use axum::Json;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use std::time::Instant;

use crate::error::ViewError;
use crate::metrics::{
    RATE_LIMIT_ENTRIES, RATE_LIMITED_TOTAL, REQUEST_TOTAL, STORE_ERRORS_TOTAL, STORE_LATENCY,
};
use crate::models::{Access, ViewsBody};
use crate::rate_limit::{Decision, client_id};
use crate::state::AppState;
use crate::store::namespaced_key;

pub const MAX_SLUG_LEN: usize = 256;

const PREFLIGHT_MAX_AGE: &str = "86400";

// 200 response - view count plus no-cache and CORS headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewsResponse {
    pub views: u64,
}

impl IntoResponse for ViewsResponse {
    fn into_response(self) -> Response {
        let mut headers = cors_headers();
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store, must-revalidate"),
        );
        (StatusCode::OK, headers, Json(ViewsBody { views: self.views })).into_response()
    }
}

fn cors_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    headers
}

// GET /views/{slug}
pub async fn read_views(
    State(state): State<Arc<AppState>>,
    path: Result<Path<String>, PathRejection>,
    headers: HeaderMap,
) -> Result<ViewsResponse, ViewError> {
    let Path(slug) = path.map_err(path_rejected)?;
    let kind = state.default_kind.clone();
    count_view(&state, &headers, &kind, &slug, Access::Read).await
}

// POST /views/{slug}
pub async fn record_view(
    State(state): State<Arc<AppState>>,
    path: Result<Path<String>, PathRejection>,
    headers: HeaderMap,
) -> Result<ViewsResponse, ViewError> {
    let Path(slug) = path.map_err(path_rejected)?;
    let kind = state.default_kind.clone();
    count_view(&state, &headers, &kind, &slug, Access::Write).await
}

// GET /views/{kind}/{slug}
pub async fn read_kind_views(
    State(state): State<Arc<AppState>>,
    path: Result<Path<(String, String)>, PathRejection>,
    headers: HeaderMap,
) -> Result<ViewsResponse, ViewError> {
    let Path((kind, slug)) = path.map_err(path_rejected)?;
    count_view(&state, &headers, &kind, &slug, Access::Read).await
}

// POST /views/{kind}/{slug}
pub async fn record_kind_view(
    State(state): State<Arc<AppState>>,
    path: Result<Path<(String, String)>, PathRejection>,
    headers: HeaderMap,
) -> Result<ViewsResponse, ViewError> {
    let Path((kind, slug)) = path.map_err(path_rejected)?;
    count_view(&state, &headers, &kind, &slug, Access::Write).await
}

// GET/POST /views - no slug in the path
pub async fn missing_slug() -> ViewError {
    ViewError::MissingSlug
}

// GET/POST /views/{kind}/ - kind given, slug empty
pub async fn missing_kind_slug(
    State(state): State<Arc<AppState>>,
    path: Result<Path<String>, PathRejection>,
) -> ViewError {
    let kind = match path {
        Ok(Path(kind)) => kind,
        Err(rejection) => return path_rejected(rejection),
    };
    if !state.knows_kind(&kind) {
        return ViewError::UnknownKind(kind);
    }
    ViewError::MissingSlug
}

// OPTIONS - stateless CORS preflight
pub async fn preflight() -> impl IntoResponse {
    let mut headers = cors_headers();
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(PREFLIGHT_MAX_AGE),
    );
    (StatusCode::NO_CONTENT, headers)
}

// undecodable path segments (e.g. %FF) get our JSON 400, not axum's plain text
fn path_rejected(rejection: PathRejection) -> ViewError {
    tracing::debug!(error = %rejection, "rejected view path");
    ViewError::InvalidSlug
}

fn validate_slug(slug: &str) -> Result<(), ViewError> {
    if slug.is_empty() {
        return Err(ViewError::MissingSlug);
    }
    if slug.len() > MAX_SLUG_LEN || slug.chars().any(char::is_control) {
        return Err(ViewError::InvalidSlug);
    }
    Ok(())
}

async fn count_view(
    state: &AppState,
    headers: &HeaderMap,
    kind: &str,
    slug: &str,
    access: Access,
) -> Result<ViewsResponse, ViewError> {
    REQUEST_TOTAL.inc();

    // validation never reaches the limiter or the store
    validate_slug(slug)?;
    if !state.knows_kind(kind) {
        return Err(ViewError::UnknownKind(kind.to_string()));
    }

    let key = namespaced_key(kind, slug);
    let client = client_id(headers);
    let bucket = state.quota.bucket(&key, access);

    let decision = state.limiter.admit(&client, &bucket, Instant::now());
    RATE_LIMIT_ENTRIES.set(state.limiter.len() as f64);

    if let Decision::Deny { retry_after_secs } = decision {
        RATE_LIMITED_TOTAL.inc();
        tracing::warn!(%client, %key, %access, retry_after_secs, "rate limit exceeded");
        return Err(ViewError::RateLimited { retry_after_secs });
    }

    let start = Instant::now();
    let result = match access {
        Access::Read => state.store.read(&key).await,
        Access::Write => state.store.increment_and_read(&key).await,
    };
    STORE_LATENCY.observe(start.elapsed().as_secs_f64());

    match result {
        Ok(views) => {
            tracing::debug!(%key, %access, views, "view count served");
            Ok(ViewsResponse { views })
        }
        Err(err) => {
            STORE_ERRORS_TOTAL.inc();
            tracing::error!(
                error = %err,
                details = ?err,
                %kind,
                %slug,
                %access,
                store = state.store.kind(),
                has_database_url = state.database_configured.url,
                has_database_token = state.database_configured.token,
                "error handling view count"
            );
            Err(err.into())
        }
    }
}
