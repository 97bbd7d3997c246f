//! Read-only checks for the rest of the application.
//!
//! These only read the derived tables. Nothing here re-derives privileges; call through a
//! [`RosterContext`](crate::RosterContext) inside a transaction with pending edits.

use crate::entity::{list_person, person_privlevel, person_role, role};
use crate::error::RbacError;
use crate::ids::{ListId, OrgId, PersonId};
use crate::privilege::{PrivLevel, PrivilegeValue};
use crate::recalc::ListRights;
use itertools::Itertools;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use std::collections::HashMap;

/// A role held by a person.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldRole {
    pub role: role::Model,
    /// false when held only by implication
    pub explicit: bool,
}

pub async fn privilege_level<C: ConnectionTrait>(
    db: &C,
    person: PersonId,
    org: OrgId,
) -> Result<PrivLevel, RbacError> {
    Ok(person_privlevel::Entity::find_by_id((person.0, org.0))
        .one(db)
        .await?
        .map(|row| row.priv_level)
        .unwrap_or_default())
}

/// Does `person` hold at least `level` on `org`? [`PrivLevel::None`] is held by everyone.
pub async fn has_privilege<C: ConnectionTrait>(
    db: &C,
    person: PersonId,
    org: OrgId,
    level: PrivLevel,
) -> Result<bool, RbacError> {
    if level == PrivLevel::None {
        return Ok(true);
    }
    Ok(privilege_level(db, person, org).await?.covers(level))
}

/// Every role `person` holds, most senior first.
pub async fn held_roles<C: ConnectionTrait>(
    db: &C,
    person: PersonId,
) -> Result<Vec<HeldRole>, RbacError> {
    let assignments: HashMap<i32, bool> = person_role::Entity::find()
        .filter(person_role::Column::Person.eq(person.0))
        .all(db)
        .await?
        .into_iter()
        .map(|row| (row.role, row.explicit))
        .collect();
    if assignments.is_empty() {
        return Ok(Vec::new());
    }

    let roles = role::Entity::find()
        .filter(role::Column::Id.is_in(assignments.keys().copied()))
        .all(db)
        .await?;
    Ok(roles
        .into_iter()
        .sorted_by_key(|role| (role.priority, role.id))
        .map(|role| HeldRole {
            explicit: assignments.get(&role.id).copied().unwrap_or_default(),
            role,
        })
        .collect())
}

/// The stored rights of `person` on `list`; `None` when there is no row.
pub async fn list_rights<C: ConnectionTrait>(
    db: &C,
    list: ListId,
    person: PersonId,
) -> Result<Option<ListRights>, RbacError> {
    Ok(list_person::Entity::find_by_id((list.0, person.0))
        .one(db)
        .await?
        .as_ref()
        .map(ListRights::from))
}
