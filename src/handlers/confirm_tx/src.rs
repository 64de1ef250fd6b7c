use crate::{
    config::AppState,
    model::{Actor, Transaction},
    utils::{to_http_err, HttpError},
};
use super::models::ConfirmTxReq;
use crate::handlers::extract::{ApiJson, ApiPath};

use axum::extract::{Json, State};
use uuid::Uuid;

// returns as soon as the ledger commit is done; anchoring shows up later in
// the transaction's chain_log
pub async fn confirm_tx_handler(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath((treasury_id, tx_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(req): ApiJson<ConfirmTxReq>,
) -> Result<Json<Transaction>, HttpError> {
    state.ledger
        .confirm(&treasury_id, &tx_id, &actor, req.confirmed_amount, req.note, req.request_id)
        .map(Json)
        .map_err(to_http_err)
}
