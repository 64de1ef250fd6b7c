use serde::Serialize;
use uuid::Uuid;

#[derive(Serialize)]
pub struct LogCountResp {
    pub treasury_id:   Uuid,
    pub chain_address: String,
    pub count:         u64,         // entries the contract holds for this treasury
}
