use crate::config::AppState;

use axum::{
    routing::{get, post},
    Router,
};

pub mod extract;

pub mod health          { pub mod src; }
pub mod create_treasury { pub mod models; pub mod src; }
pub mod get_treasury    { pub mod models; pub mod src; }
pub mod grant_role      { pub mod models; pub mod src; }
pub mod get_balance     { pub mod src; }
pub mod log_count       { pub mod models; pub mod src; }
pub mod create_tx       { pub mod models; pub mod src; }
pub mod list_tx         { pub mod models; pub mod src; }
pub mod get_tx          { pub mod src; }
pub mod amend_tx        { pub mod models; pub mod src; }
pub mod delete_tx       { pub mod src; }
pub mod confirm_tx      { pub mod models; pub mod src; }
pub mod reject_tx       { pub mod models; pub mod src; }
pub mod retry_anchor    { pub mod src; }

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::src::health_handler))
        .route("/treasuries", post(create_treasury::src::create_treasury_handler))
        .route("/treasuries/{treasury_id}", get(get_treasury::src::get_treasury_handler))
        .route("/treasuries/{treasury_id}/members", post(grant_role::src::grant_role_handler))
        .route("/treasuries/{treasury_id}/balance", get(get_balance::src::get_balance_handler))
        .route("/treasuries/{treasury_id}/chain/log-count", get(log_count::src::log_count_handler))
        .route(
            "/treasuries/{treasury_id}/transactions",
            get(list_tx::src::list_tx_handler).post(create_tx::src::create_tx_handler),
        )
        .route(
            "/treasuries/{treasury_id}/transactions/{tx_id}",
            get(get_tx::src::get_tx_handler)
                .put(amend_tx::src::amend_tx_handler)
                .delete(delete_tx::src::delete_tx_handler),
        )
        .route(
            "/treasuries/{treasury_id}/transactions/{tx_id}/confirm",
            post(confirm_tx::src::confirm_tx_handler),
        )
        .route(
            "/treasuries/{treasury_id}/transactions/{tx_id}/reject",
            post(reject_tx::src::reject_tx_handler),
        )
        .route(
            "/treasuries/{treasury_id}/transactions/{tx_id}/retry-blockchain",
            post(retry_anchor::src::retry_anchor_handler),
        )
        .with_state(state)
}
