//! Mailing / text list rights derived from held roles.

use crate::entity::{list_person, list_role, list_role::SubModel};
use crate::ids::{ListId, PersonId, RoleId};
use std::collections::{BTreeMap, BTreeSet};

/// The three facets of a (list, person) row.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ListRights {
    pub sender: bool,
    pub sub: bool,
    pub unsub: bool,
}

impl ListRights {
    /// A row with no facet set carries no information and is pruned.
    pub fn is_empty(&self) -> bool {
        !self.sender && !self.sub && !self.unsub
    }
}

impl From<&list_person::Model> for ListRights {
    fn from(row: &list_person::Model) -> Self {
        Self {
            sender: row.sender,
            sub: row.sub,
            unsub: row.unsub,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ListProjection {
    /// Desired state of every row that exists or should exist, including rows to prune.
    pub rows: BTreeMap<(ListId, PersonId), ListRights>,
    /// Per list, the roles whose holders are subscribed with a warning on removal.
    pub warn_on_unsub: BTreeMap<ListId, BTreeSet<RoleId>>,
}

#[derive(Default)]
struct Grant {
    sender: bool,
    auto_sub: bool,
}

/// Project `held` roles through the list-role mappings onto list rows.
///
/// `sender` is granted by any held role mapped as sender, `sub` by any held role with an
/// automatic mapping. Both depend on current roles only. `unsub` is copied from `existing`
/// unchanged.
pub fn project(
    mappings: &[list_role::Model],
    held: &BTreeMap<PersonId, BTreeSet<RoleId>>,
    existing: &[list_person::Model],
) -> ListProjection {
    let mut by_role: BTreeMap<RoleId, Vec<&list_role::Model>> = BTreeMap::new();
    let mut warn_on_unsub: BTreeMap<ListId, BTreeSet<RoleId>> = BTreeMap::new();
    for mapping in mappings {
        by_role.entry(RoleId(mapping.role)).or_default().push(mapping);
        if mapping.sub_model == SubModel::WarnSub {
            warn_on_unsub
                .entry(ListId(mapping.list))
                .or_default()
                .insert(RoleId(mapping.role));
        }
    }

    let mut grants: BTreeMap<(ListId, PersonId), Grant> = BTreeMap::new();
    for (person, roles) in held {
        for role in roles {
            for mapping in by_role.get(role).into_iter().flatten() {
                let grant = grants.entry((ListId(mapping.list), *person)).or_default();
                grant.sender |= mapping.sender;
                grant.auto_sub |= mapping.sub_model.is_automatic();
            }
        }
    }

    let existing: BTreeMap<(ListId, PersonId), ListRights> = existing
        .iter()
        .map(|row| ((ListId(row.list), PersonId(row.person)), row.into()))
        .collect();

    let keys: BTreeSet<(ListId, PersonId)> =
        grants.keys().chain(existing.keys()).copied().collect();

    let rows = keys
        .into_iter()
        .map(|key| {
            let before = existing.get(&key).copied().unwrap_or_default();
            let rights = match grants.get(&key) {
                Some(grant) => ListRights {
                    sender: grant.sender,
                    sub: grant.auto_sub,
                    unsub: before.unsub,
                },
                None => ListRights {
                    sender: false,
                    sub: false,
                    unsub: before.unsub,
                },
            };
            (key, rights)
        })
        .filter(|(key, rights)| !rights.is_empty() || existing.contains_key(key))
        .collect();

    ListProjection {
        rows,
        warn_on_unsub,
    }
}

impl ListProjection {
    /// Lists on which `role` is a warn-on-unsubscribe role.
    pub fn lists_warning_for(&self, role: RoleId) -> Vec<ListId> {
        self.warn_on_unsub
            .iter()
            .filter(|(_, roles)| roles.contains(&role))
            .map(|(list, _)| *list)
            .collect()
    }
}
