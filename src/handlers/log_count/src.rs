use crate::{
    chain::Address,
    config::AppState,
    error::{ChainError, LedgerError},
    model::{Actor, Capability},
    treasury::authorize,
    utils::{http_err, to_http_err, HttpError},
};
use super::models::LogCountResp;
use crate::handlers::extract::ApiPath;

use axum::{
    extract::{Json, State},
    http::StatusCode,
};
use tokio::time::timeout;
use uuid::Uuid;

// read-only audit call; bounded like any other chain call
pub async fn log_count_handler(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(treasury_id): ApiPath<Uuid>,
) -> Result<Json<LogCountResp>, HttpError> {
    authorize(&state.store, &treasury_id, &actor, Capability::View).map_err(to_http_err)?;
    let treasury = state.store
        .treasury(&treasury_id)
        .map_err(to_http_err)?
        .ok_or_else(|| to_http_err(LedgerError::NotFound(format!("treasury {treasury_id}"))))?;
    let address: Address = treasury.chain_address
        .parse()
        .map_err(|e: ChainError| http_err(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    let limit = state.cfg.anchor.submit_timeout();
    let count = timeout(limit, state.chain.treasury_log_count(&address))
        .await
        .unwrap_or(Err(ChainError::Timeout(limit)))
        .map_err(|e| {
            tracing::warn!(treasury = %treasury_id, error = %e, "log count query failed");
            http_err(StatusCode::BAD_GATEWAY, e)
        })?;

    Ok(Json(LogCountResp { treasury_id, chain_address: treasury.chain_address, count }))
}
