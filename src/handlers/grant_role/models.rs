use crate::model::Role;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct GrantRoleReq {
    pub user_id: Uuid,
    pub role:    Role,          // "admin" | "treasurer" | "member"
}
