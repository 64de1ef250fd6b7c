use crate::{
    config::AppState,
    ledger::NewTransaction,
    model::{Actor, Transaction},
    utils::{to_http_err, HttpError},
};
use super::models::CreateTxReq;
use crate::handlers::extract::{ApiJson, ApiPath};

use axum::{
    extract::{Json, State},
    http::StatusCode,
};
use uuid::Uuid;

pub async fn create_tx_handler(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(treasury_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<CreateTxReq>,
) -> Result<(StatusCode, Json<Transaction>), HttpError> {
    let tx = state.ledger
        .create(&treasury_id, &actor, NewTransaction { kind: req.kind, amount: req.amount, note: req.note })
        .map_err(to_http_err)?;
    Ok((StatusCode::CREATED, Json(tx)))
}
