use serde::Deserialize;

#[derive(Deserialize)]
pub struct AmendTxReq {
    pub amount: i64,
    pub note:   Option<String>,
}
