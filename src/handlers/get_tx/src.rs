use crate::{
    config::AppState,
    ledger::TransactionView,
    model::Actor,
    utils::{to_http_err, HttpError},
};
use crate::handlers::extract::ApiPath;

use axum::extract::{Json, State};
use uuid::Uuid;

pub async fn get_tx_handler(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath((treasury_id, tx_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<TransactionView>, HttpError> {
    state.ledger
        .get(&treasury_id, &tx_id, &actor)
        .map(Json)
        .map_err(to_http_err)
}
