use crate::model::TxKind;
use serde::Deserialize;

#[derive(Deserialize)]
pub struct CreateTxReq {
    #[serde(rename = "type")]
    pub kind:   TxKind,             // "INCOME" | "EXPENSE"
    pub amount: i64,
    pub note:   Option<String>,
}
