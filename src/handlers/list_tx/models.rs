use serde::Deserialize;

#[derive(Deserialize)]
pub struct ListParams {
    pub status: Option<String>,     // "all" or comma separated statuses
}
