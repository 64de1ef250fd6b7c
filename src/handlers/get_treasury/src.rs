use crate::{
    config::AppState,
    model::Actor,
    utils::{to_http_err, HttpError},
};
use super::models::TreasuryView;
use crate::handlers::extract::ApiPath;

use axum::{
    extract::{Json, State},
};
use uuid::Uuid;

pub async fn get_treasury_handler(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(treasury_id): ApiPath<Uuid>,
) -> Result<Json<TreasuryView>, HttpError> {
    let (treasury, members) = state.treasuries
        .get(&treasury_id, &actor)
        .map_err(to_http_err)?;
    Ok(Json(TreasuryView { treasury, members }))
}
