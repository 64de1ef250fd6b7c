use crate::{
    chain::treasury_address,
    error::{LedgerError, LedgerResult},
    model::{Actor, Capability, Member, Role, Treasury},
    storage::LedgerStore,
    utils::now_ms,
};

use tracing::info;
use uuid::Uuid;

/// Looks up the actor's role and checks it against the operation's capability.
pub fn authorize(
    store: &LedgerStore,
    treasury_id: &Uuid,
    actor: &Actor,
    cap: Capability,
) -> LedgerResult<Role> {
    if store.treasury(treasury_id)?.is_none() {
        return Err(LedgerError::NotFound(format!("treasury {treasury_id}")));
    }
    let member = store
        .member(treasury_id, &actor.user_id)?
        .ok_or_else(|| LedgerError::Authorization("not a member of this treasury".into()))?;

    if !member.role.allows(cap) {
        return Err(LedgerError::Authorization(format!(
            "role {:?} may not {:?}",
            member.role, cap
        )));
    }
    Ok(member.role)
}

/// Treasury and membership provisioning. Kept to what the workflow needs.
#[derive(Clone)]
pub struct TreasuryRegistry {
    store: LedgerStore,
}

impl TreasuryRegistry {
    pub fn new(store: LedgerStore) -> Self {
        TreasuryRegistry { store }
    }

    /// Creates a treasury; the creator becomes its admin.
    pub fn create(&self, actor: &Actor, name: &str, description: Option<String>) -> LedgerResult<Treasury> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::validation("treasury name is required"));
        }

        let now = now_ms();
        let id = Uuid::new_v4();
        let treasury = Treasury {
            id,
            name:          name.to_string(),
            description,
            created_by:    actor.user_id,
            chain_address: treasury_address(&id).to_string(),
            created_at_ms: now,
        };
        let creator = Member {
            treasury_id:  id,
            user_id:      actor.user_id,
            role:         Role::Admin,
            joined_at_ms: now,
        };
        self.store.insert_treasury(&treasury, &creator)?;

        info!(treasury = %id, address = %treasury.chain_address, "treasury created");
        Ok(treasury)
    }

    /// Adds a member or changes an existing member's role. Admin only.
    pub fn grant_role(&self, treasury_id: &Uuid, actor: &Actor, user_id: Uuid, role: Role) -> LedgerResult<Member> {
        authorize(&self.store, treasury_id, actor, Capability::ManageMembers)?;

        let treasury = self.store
            .treasury(treasury_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("treasury {treasury_id}")))?;
        if treasury.created_by == user_id && role != Role::Admin {
            return Err(LedgerError::state("the creator's admin role cannot be revoked"));
        }

        let joined_at_ms = self.store
            .member(treasury_id, &user_id)?
            .map(|m| m.joined_at_ms)
            .unwrap_or_else(now_ms);
        let member = Member { treasury_id: *treasury_id, user_id, role, joined_at_ms };
        self.store.put_member(&member)?;

        info!(treasury = %treasury_id, user = %user_id, ?role, "member role granted");
        Ok(member)
    }

    pub fn get(&self, treasury_id: &Uuid, actor: &Actor) -> LedgerResult<(Treasury, Vec<Member>)> {
        authorize(&self.store, treasury_id, actor, Capability::View)?;
        let treasury = self.store
            .treasury(treasury_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("treasury {treasury_id}")))?;
        Ok((treasury, self.store.members(treasury_id)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (TreasuryRegistry, Treasury, Actor) {
        let reg = TreasuryRegistry::new(LedgerStore::temporary().unwrap());
        let admin = Actor::new(Uuid::new_v4());
        let t = reg.create(&admin, "Team fund", None).unwrap();
        (reg, t, admin)
    }

    #[test]
    fn creator_is_admin() {
        let (reg, t, admin) = setup();
        let (_, members) = reg.get(&t.id, &admin).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].role, Role::Admin);
        assert!(t.chain_address.starts_with("0x") && t.chain_address.len() == 42);
    }

    #[test]
    fn only_admin_grants() {
        let (reg, t, admin) = setup();
        let treasurer = Actor::new(Uuid::new_v4());
        reg.grant_role(&t.id, &admin, treasurer.user_id, Role::Treasurer).unwrap();

        let err = reg.grant_role(&t.id, &treasurer, Uuid::new_v4(), Role::Member).unwrap_err();
        assert!(matches!(err, LedgerError::Authorization(_)));

        let stranger = Actor::new(Uuid::new_v4());
        assert!(matches!(reg.get(&t.id, &stranger), Err(LedgerError::Authorization(_))));
    }

    #[test]
    fn creator_keeps_admin() {
        let (reg, t, admin) = setup();
        let err = reg.grant_role(&t.id, &admin, admin.user_id, Role::Member).unwrap_err();
        assert!(matches!(err, LedgerError::State(_)));
    }

    #[test]
    fn empty_name_rejected() {
        let reg = TreasuryRegistry::new(LedgerStore::temporary().unwrap());
        let err = reg.create(&Actor::new(Uuid::new_v4()), "  ", None).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn unknown_treasury_not_found() {
        let reg = TreasuryRegistry::new(LedgerStore::temporary().unwrap());
        let err = reg.get(&Uuid::new_v4(), &Actor::new(Uuid::new_v4())).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }
}
