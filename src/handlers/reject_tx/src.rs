use crate::{
    config::AppState,
    model::{Actor, Transaction},
    utils::{to_http_err, HttpError},
};
use super::models::RejectTxReq;
use crate::handlers::extract::{ApiJson, ApiPath};

use axum::extract::{Json, State};
use uuid::Uuid;

pub async fn reject_tx_handler(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath((treasury_id, tx_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(req): ApiJson<RejectTxReq>,
) -> Result<Json<Transaction>, HttpError> {
    state.ledger
        .reject(&treasury_id, &tx_id, &actor, &req.reason)
        .map(Json)
        .map_err(to_http_err)
}
