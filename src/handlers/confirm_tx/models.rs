use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct ConfirmTxReq {
    pub confirmed_amount: i64,
    pub note:             Option<String>,
    pub request_id:       Option<Uuid>,     // repeat-safe confirm
}
