mod health;
mod metrics;
mod views;

use axum::Router;
use axum::routing::get;
use std::sync::Arc;

use crate::state::AppState;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use views::{MAX_SLUG_LEN, ViewsResponse};

// /views/{slug} counts in the default kind, /views/{kind}/{slug} in an explicit one.
// Paths without a slug answer 400, OPTIONS is always 204.
pub fn router(state: Arc<AppState>) -> Router {
    let no_slug = get(views::missing_slug)
        .post(views::missing_slug)
        .options(views::preflight);

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/views", no_slug.clone())
        .route("/views/", no_slug)
        .route(
            "/views/{slug}",
            get(views::read_views)
                .post(views::record_view)
                .options(views::preflight),
        )
        .route(
            "/views/{kind}/",
            get(views::missing_kind_slug)
                .post(views::missing_kind_slug)
                .options(views::preflight),
        )
        .route(
            "/views/{kind}/{slug}",
            get(views::read_kind_views)
                .post(views::record_kind_view)
                .options(views::preflight),
        )
        .with_state(state)
}
