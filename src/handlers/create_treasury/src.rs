use crate::{
    config::AppState,
    model::{Actor, Treasury},
    utils::{to_http_err, HttpError},
};
use super::models::CreateTreasuryReq;
use crate::handlers::extract::ApiJson;

use axum::{
    extract::{Json, State},
    http::StatusCode,
};

pub async fn create_treasury_handler(
    State(state): State<AppState>,
    actor: Actor,
    ApiJson(req): ApiJson<CreateTreasuryReq>,
) -> Result<(StatusCode, Json<Treasury>), HttpError> {
    let treasury = state.treasuries
        .create(&actor, &req.name, req.description)
        .map_err(to_http_err)?;
    Ok((StatusCode::CREATED, Json(treasury)))
}
