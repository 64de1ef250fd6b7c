use crate::model::{Member, Treasury};
use serde::Serialize;

#[derive(Serialize)]
pub struct TreasuryView {
    #[serde(flatten)]
    pub treasury: Treasury,
    pub members:  Vec<Member>,
}
