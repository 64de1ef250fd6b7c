use crate::{
    config::AppState,
    ledger::{StatusFilter, TransactionView},
    model::Actor,
    utils::{to_http_err, HttpError},
};
use super::models::ListParams;
use crate::handlers::extract::{ApiPath, ApiQuery};

use axum::extract::{Json, State};
use uuid::Uuid;

pub async fn list_tx_handler(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(treasury_id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<Vec<TransactionView>>, HttpError> {
    let filter = StatusFilter::parse(params.status.as_deref()).map_err(to_http_err)?;
    state.ledger
        .list(&treasury_id, &actor, &filter)
        .map(Json)
        .map_err(to_http_err)
}
