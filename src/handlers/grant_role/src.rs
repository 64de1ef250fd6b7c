use crate::{
    config::AppState,
    model::{Actor, Member},
    utils::{to_http_err, HttpError},
};
use super::models::GrantRoleReq;
use crate::handlers::extract::{ApiJson, ApiPath};

use axum::extract::{Json, State};
use uuid::Uuid;

pub async fn grant_role_handler(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(treasury_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<GrantRoleReq>,
) -> Result<Json<Member>, HttpError> {
    let member = state.treasuries
        .grant_role(&treasury_id, &actor, req.user_id, req.role)
        .map_err(to_http_err)?;
    Ok(Json(member))
}
