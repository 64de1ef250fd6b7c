use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Records below are persisted with bincode, so no `skip_serializing_if` /
// `flatten` / untagged enums on them.

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Treasury {
    pub id:             Uuid,
    pub name:           String,
    pub description:    Option<String>,
    pub created_by:     Uuid,               // implicit admin
    pub chain_address:  String,             // 0x-prefixed, 20 bytes
    pub created_at_ms:  i64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Treasurer,
    Member,
}

/// What a role may do inside its treasury. Call sites ask `Role::allows`
/// instead of comparing role names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    Propose,
    View,
    Decide,
    RetryAnchor,
    Delete,
    ManageMembers,
}

const ADMIN_CAPS: &[Capability] = &[
    Capability::Propose,
    Capability::View,
    Capability::Decide,
    Capability::RetryAnchor,
    Capability::Delete,
    Capability::ManageMembers,
];
const TREASURER_CAPS: &[Capability] = &[
    Capability::Propose,
    Capability::View,
    Capability::Decide,
    Capability::RetryAnchor,
];
const MEMBER_CAPS: &[Capability] = &[Capability::Propose, Capability::View];

impl Role {
    pub fn capabilities(self) -> &'static [Capability] {
        match self {
            Role::Admin     => ADMIN_CAPS,
            Role::Treasurer => TREASURER_CAPS,
            Role::Member    => MEMBER_CAPS,
        }
    }

    pub fn allows(self, cap: Capability) -> bool {
        self.capabilities().contains(&cap)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Member {
    pub treasury_id:    Uuid,
    pub user_id:        Uuid,
    pub role:           Role,
    pub joined_at_ms:   i64,
}

/// The authenticated caller. Threaded explicitly through every operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
}

impl Actor {
    pub fn new(user_id: Uuid) -> Self {
        Actor { user_id }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TxKind {
    Income,
    Expense,
}

impl TxKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TxKind::Income  => "INCOME",
            TxKind::Expense => "EXPENSE",
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Rejected,
    Deleted,
}

impl TxStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending"   => Some(TxStatus::Pending),
            "confirmed" => Some(TxStatus::Confirmed),
            "rejected"  => Some(TxStatus::Rejected),
            "deleted"   => Some(TxStatus::Deleted),
            _           => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub id:                  Uuid,
    pub treasury_id:         Uuid,
    pub kind:                TxKind,
    pub amount:              u64,            // proposed, always > 0
    pub note:                Option<String>,
    pub status:              TxStatus,
    pub confirmed_amount:    Option<u64>,    // Some iff status == Confirmed
    pub created_by:          Uuid,
    pub created_at_ms:       i64,
    pub decided_by:          Option<Uuid>,
    pub decided_at_ms:       Option<i64>,
    pub decision_note:       Option<String>,
    pub decision_request_id: Option<Uuid>,   // replay key of the confirm call
    pub reject_reason:       Option<String>, // Some iff status == Rejected
    pub deleted_by:          Option<Uuid>,
    pub deleted_at_ms:       Option<i64>,
}

impl Transaction {
    /// Signed contribution to the balance; zero unless confirmed.
    pub fn signed_confirmed_amount(&self) -> i128 {
        match (self.status, self.confirmed_amount) {
            (TxStatus::Confirmed, Some(a)) => match self.kind {
                TxKind::Income  => a as i128,
                TxKind::Expense => -(a as i128),
            },
            _ => 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChainStatus {
    None,
    Pending,
    Success,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainLog {
    pub transaction_id:     Uuid,
    pub treasury_id:        Uuid,
    pub status:             ChainStatus,
    pub tx_hash:            Option<String>,
    pub detail_hash:        Option<String>,
    pub block_number:       Option<u64>,
    pub anchored_amount:    Option<u64>,
    pub error_detail:       Option<String>, // Some iff status == Failed
    pub retryable:          bool,           // false after a permanent chain error
    pub attempt_count:      u32,
    pub last_attempt_at_ms: Option<i64>,
    pub updated_at_ms:      i64,
}

impl ChainLog {
    pub fn new(treasury_id: Uuid, transaction_id: Uuid, now_ms: i64) -> Self {
        ChainLog {
            transaction_id,
            treasury_id,
            status:             ChainStatus::None,
            tx_hash:            None,
            detail_hash:        None,
            block_number:       None,
            anchored_amount:    None,
            error_detail:       None,
            retryable:          true,
            attempt_count:      0,
            last_attempt_at_ms: None,
            updated_at_ms:      now_ms,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceSummary {
    pub treasury_id:     Uuid,
    pub total_income:    u128,
    pub total_expense:   u128,
    pub balance:         i128,
    pub confirmed_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_table() {
        for cap in [Capability::Decide, Capability::RetryAnchor] {
            assert!(Role::Admin.allows(cap));
            assert!(Role::Treasurer.allows(cap));
            assert!(!Role::Member.allows(cap));
        }
        assert!(Role::Admin.allows(Capability::Delete));
        assert!(!Role::Treasurer.allows(Capability::Delete));
        assert!(!Role::Treasurer.allows(Capability::ManageMembers));
        assert!(Role::Member.allows(Capability::Propose));
        assert!(Role::Member.allows(Capability::View));
    }

    #[test]
    fn status_parse() {
        assert_eq!(TxStatus::parse("confirmed"), Some(TxStatus::Confirmed));
        assert_eq!(TxStatus::parse("CONFIRMED"), None);
    }
}
