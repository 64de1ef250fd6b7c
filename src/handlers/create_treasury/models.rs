use serde::Deserialize;

#[derive(Deserialize)]
pub struct CreateTreasuryReq {
    pub name:        String,
    pub description: Option<String>,
}
