use crate::{
    config::AppState,
    model::{Actor, Transaction},
    utils::{to_http_err, HttpError},
};
use super::models::AmendTxReq;
use crate::handlers::extract::{ApiJson, ApiPath};

use axum::extract::{Json, State};
use uuid::Uuid;

pub async fn amend_tx_handler(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath((treasury_id, tx_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(req): ApiJson<AmendTxReq>,
) -> Result<Json<Transaction>, HttpError> {
    state.ledger
        .amend(&treasury_id, &tx_id, &actor, req.amount, req.note)
        .map(Json)
        .map_err(to_http_err)
}
