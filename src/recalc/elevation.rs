//! Fixed business rules layered on top of the computed privilege levels.
//!
//! The rules are plain data so the full set in force can be listed and tested. They run after
//! the generic computation, and the outcome does not depend on their order: a person holding a
//! disabling role loses everything, everyone else gets the least fixpoint of the grant rules.

use crate::config::ElevationConfig;
use crate::error::RbacError;
use crate::graph::RoleGraph;
use crate::ids::{OrgId, PersonId, RoleId};
use crate::privilege::{PrivLevel, PrivilegeMap};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub type Levels = PrivilegeMap<OrgId, PrivLevel>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElevationRule {
    /// Holders of `role` hold no privilege level anywhere, whatever else they hold.
    Disabled { role: RoleId },
    /// Holders of `role` hold at least `level` on `org`.
    GrantLevel {
        role: RoleId,
        org: OrgId,
        level: PrivLevel,
    },
    /// A level of at least `min_level` on `org` is held on every org.
    SpreadFromOrg { org: OrgId, min_level: PrivLevel },
}

impl fmt::Display for ElevationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElevationRule::Disabled { role } => write!(f, "{role} strips all levels"),
            ElevationRule::GrantLevel { role, org, level } => {
                write!(f, "{role} grants {level} on {org}")
            }
            ElevationRule::SpreadFromOrg { org, min_level } => {
                write!(f, "{min_level} or above on {org} applies to every org")
            }
        }
    }
}

impl ElevationRule {
    /// The rules configured for this graph. Tags that do not resolve switch their rule off.
    pub fn from_config(config: &ElevationConfig, graph: &RoleGraph) -> Vec<ElevationRule> {
        let role = |tag: &Option<String>, rule: &str| -> Option<RoleId> {
            let tag = tag.as_deref()?;
            let found = graph.role_by_tag(tag).map(|r| RoleId(r.id));
            if found.is_none() {
                tracing::warn!(tag, rule, "elevation rule skipped: no role with this tag");
            }
            found
        };
        let admin_org = config.admin_org.as_deref().and_then(|tag| {
            let found = graph.org_by_tag(tag).map(|o| OrgId(o.id));
            if found.is_none() {
                tracing::warn!(tag, "elevation rules skipped: no org with this tag");
            }
            found
        });

        let mut rules = Vec::new();
        if let Some(role) = role(&config.disabled_role, "disabled") {
            rules.push(ElevationRule::Disabled { role });
        }
        if let Some(org) = admin_org {
            if let Some(role) = role(&config.webmaster_role, "webmaster") {
                rules.push(ElevationRule::GrantLevel {
                    role,
                    org,
                    level: config.webmaster_level,
                });
            }
            rules.push(ElevationRule::SpreadFromOrg {
                org,
                min_level: config.spread_level,
            });
        }
        rules
    }

    fn disables(&self, held: &BTreeSet<RoleId>) -> bool {
        matches!(self, ElevationRule::Disabled { role } if held.contains(role))
    }

    /// Apply a grant rule. Returns whether anything changed.
    fn grant(&self, held: &BTreeSet<RoleId>, orgs: &[OrgId], levels: &mut Levels) -> bool {
        match self {
            ElevationRule::Disabled { .. } => false,
            ElevationRule::GrantLevel { role, org, level } => {
                held.contains(role) && levels.grant(*org, *level)
            }
            ElevationRule::SpreadFromOrg { org, min_level } => {
                let level = levels.get(*org);
                if level < *min_level || level == PrivLevel::None {
                    return false;
                }
                let mut changed = false;
                for other in orgs {
                    changed |= levels.grant(*other, level);
                }
                changed
            }
        }
    }
}

/// Apply `rules` to every person in `held`. `levels` holds the generic result on entry and the
/// elevated result on exit; people left without any level are removed.
pub fn apply_rules(
    rules: &[ElevationRule],
    orgs: &[OrgId],
    held: &BTreeMap<PersonId, BTreeSet<RoleId>>,
    levels: &mut BTreeMap<PersonId, Levels>,
) -> Result<(), RbacError> {
    let limit = rules.len() + 1;

    for (person, roles) in held {
        if rules.iter().any(|rule| rule.disables(roles)) {
            levels.remove(person);
            continue;
        }

        let person_levels = levels.entry(*person).or_default();
        let mut passes = 0;
        loop {
            passes += 1;
            if passes > limit {
                return Err(RbacError::NoConvergence(limit));
            }
            let mut changed = false;
            for rule in rules {
                changed |= rule.grant(roles, orgs, person_levels);
            }
            if !changed {
                break;
            }
        }
    }

    levels.retain(|_, person_levels| !person_levels.is_empty());

    // a disabled person keeping a level means the rules above are broken
    for (person, roles) in held {
        if rules.iter().any(|rule| rule.disables(roles)) && levels.contains_key(person) {
            return Err(RbacError::Invariant(format!(
                "{person} is disabled but kept a privilege level"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use maplit::{btreemap, btreeset};
    use pretty_assertions::assert_eq;

    const DISABLED: RoleId = RoleId(1);
    const WEBMASTER: RoleId = RoleId(2);
    const OTHER: RoleId = RoleId(3);
    const ADMIN: OrgId = OrgId(100);
    const ORGS: [OrgId; 3] = [OrgId(100), OrgId(200), OrgId(300)];

    fn rules() -> Vec<ElevationRule> {
        vec![
            ElevationRule::Disabled { role: DISABLED },
            ElevationRule::GrantLevel {
                role: WEBMASTER,
                org: ADMIN,
                level: PrivLevel::Master,
            },
            ElevationRule::SpreadFromOrg {
                org: ADMIN,
                min_level: PrivLevel::Leader,
            },
        ]
    }

    fn levels(entries: &[(OrgId, PrivLevel)]) -> Levels {
        entries.iter().copied().collect()
    }

    fn run(
        rules: &[ElevationRule],
        held: &BTreeMap<PersonId, BTreeSet<RoleId>>,
        start: BTreeMap<PersonId, Levels>,
    ) -> BTreeMap<PersonId, Levels> {
        let mut out = start;
        apply_rules(rules, &ORGS, held, &mut out).unwrap();
        out
    }

    #[test]
    fn test_disabled_strips_everything() {
        let held = btreemap! { PersonId(1) => btreeset! {DISABLED, WEBMASTER, OTHER} };
        let start = btreemap! {
            PersonId(1) => levels(&[(ADMIN, PrivLevel::Master), (OrgId(200), PrivLevel::Leader)]),
        };
        assert!(run(&rules(), &held, start).is_empty());
    }

    #[test]
    fn test_webmaster_gets_master_everywhere() {
        let held = btreemap! { PersonId(1) => btreeset! {WEBMASTER} };
        let out = run(&rules(), &held, BTreeMap::new());
        assert_eq!(
            out[&PersonId(1)],
            levels(&[
                (OrgId(100), PrivLevel::Master),
                (OrgId(200), PrivLevel::Master),
                (OrgId(300), PrivLevel::Master),
            ])
        );
    }

    #[test]
    fn test_admin_leader_spreads_but_member_does_not() {
        let held = btreemap! {
            PersonId(1) => btreeset! {OTHER},
            PersonId(2) => btreeset! {OTHER},
        };
        let start = btreemap! {
            PersonId(1) => levels(&[(ADMIN, PrivLevel::Leader), (OrgId(200), PrivLevel::Master)]),
            PersonId(2) => levels(&[(ADMIN, PrivLevel::Member)]),
        };
        let out = run(&rules(), &held, start);
        // spreading never lowers an existing level
        assert_eq!(
            out[&PersonId(1)],
            levels(&[
                (OrgId(100), PrivLevel::Leader),
                (OrgId(200), PrivLevel::Master),
                (OrgId(300), PrivLevel::Leader),
            ])
        );
        assert_eq!(out[&PersonId(2)], levels(&[(ADMIN, PrivLevel::Member)]));
    }

    #[test]
    fn test_order_independent_and_idempotent() {
        let held = btreemap! {
            PersonId(1) => btreeset! {WEBMASTER},
            PersonId(2) => btreeset! {DISABLED, WEBMASTER},
            PersonId(3) => btreeset! {OTHER},
        };
        let start = btreemap! {
            PersonId(2) => levels(&[(OrgId(200), PrivLevel::Leader)]),
            PersonId(3) => levels(&[(ADMIN, PrivLevel::Leader)]),
        };

        let expected = run(&rules(), &held, start.clone());
        let mut reversed = rules();
        reversed.reverse();
        assert_eq!(run(&reversed, &held, start.clone()), expected);
        let mut rotated = rules();
        rotated.rotate_left(1);
        assert_eq!(run(&rotated, &held, start), expected);

        assert_eq!(run(&rules(), &held, expected.clone()), expected);
    }

    #[test]
    fn test_no_rules_keeps_generic_result() {
        let held = btreemap! { PersonId(1) => btreeset! {DISABLED} };
        let start = btreemap! { PersonId(1) => levels(&[(ADMIN, PrivLevel::Member)]) };
        assert_eq!(run(&[], &held, start.clone()), start);
    }
}
