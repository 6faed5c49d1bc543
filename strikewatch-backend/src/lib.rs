pub mod address;
pub mod app;
pub mod broadcast;
pub mod cache;
pub mod config;
pub mod error;
pub mod format;
pub mod helpers;
pub mod query;
pub mod render;
mod routes;
pub mod schedule;

use axum::{Router, http::StatusCode, routing::get};
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

pub use app::{StatusApp, StatusReport};
pub use broadcast::{Broadcaster, DiscordBroadcaster, Payload};
pub use error::StatusError;
pub use query::{A2sQuery, QueryService, ServerQuery};
pub use render::{RasterFactory, Renderer, SurfaceFactory};

/// The status surface only serves GETs.
const REQUEST_BODY_LIMIT: usize = 1024;

/// Create the HTTP router for health and status checks
pub fn create_app<Q, F, B>(app: Arc<StatusApp<Q, F, B>>, request_timeout: Duration) -> Router
where
    Q: ServerQuery,
    F: SurfaceFactory,
    B: Broadcaster,
{
    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .route("/status", get(routes::status::<Q, F, B>))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(RequestBodyLimitLayer::new(REQUEST_BODY_LIMIT))
        .with_state(app)
}
