use crate::{
    config::AppState,
    model::{Actor, BalanceSummary},
    utils::{to_http_err, HttpError},
};
use crate::handlers::extract::ApiPath;

use axum::extract::{Json, State};
use uuid::Uuid;

pub async fn get_balance_handler(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(treasury_id): ApiPath<Uuid>,
) -> Result<Json<BalanceSummary>, HttpError> {
    state.balances
        .summary(&treasury_id, &actor)
        .map(Json)
        .map_err(to_http_err)
}
