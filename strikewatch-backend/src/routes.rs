use crate::app::{StatusApp, StatusReport};
use crate::broadcast::Broadcaster;
use crate::error::AppError;
use crate::query::ServerQuery;
use crate::render::SurfaceFactory;

use axum::{Json, extract::State};
use std::sync::Arc;

pub(crate) async fn status<Q, F, B>(
    State(app): State<Arc<StatusApp<Q, F, B>>>,
) -> Result<Json<StatusReport>, AppError>
where
    Q: ServerQuery,
    F: SurfaceFactory,
    B: Broadcaster,
{
    let report = app.status_report().await?;
    Ok(Json(report))
}
