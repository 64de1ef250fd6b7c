use crate::{
    config::AppState,
    model::{Actor, ChainLog},
    utils::{to_http_err, HttpError},
};
use crate::handlers::extract::ApiPath;

use axum::{
    extract::{Json, State},
    http::StatusCode,
};
use uuid::Uuid;

pub async fn retry_anchor_handler(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath((treasury_id, tx_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<(StatusCode, Json<ChainLog>), HttpError> {
    let log = state.retry
        .retry(&treasury_id, &tx_id, &actor)
        .map_err(to_http_err)?;
    Ok((StatusCode::ACCEPTED, Json(log)))
}
