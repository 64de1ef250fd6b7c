use crate::{
    config::AppState,
    model::{Actor, Transaction},
    utils::{to_http_err, HttpError},
};
use crate::handlers::extract::ApiPath;

use axum::extract::{Json, State};
use uuid::Uuid;

/// Soft delete; the chain entry (if any) is left alone.
pub async fn delete_tx_handler(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath((treasury_id, tx_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<Transaction>, HttpError> {
    state.ledger
        .soft_delete(&treasury_id, &tx_id, &actor)
        .map(Json)
        .map_err(to_http_err)
}
