use serde::Deserialize;

#[derive(Deserialize)]
pub struct RejectTxReq {
    #[serde(default)]
    pub reason: String,
}
