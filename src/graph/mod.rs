//! In-memory view of roles, orgs and teams for one transaction.
//!
//! A [`RoleGraph`] is loaded at the start of a transaction and thrown away with it. It is never
//! shared between transactions, since another transaction may commit a role edit at any time.

use crate::closure::{self, ClosureError, Edges};
use crate::entity::{org, role, role_implies, team, team_privilege};
use crate::error::RbacError;
use crate::ids::{OrgId, RoleId, TeamId};
use crate::privilege::{PrivLevel, PrivilegeMap, TeamPrivileges};
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet, HashMap};

mod loader;

pub type Org = org::Model;
pub type Role = role::Model;

/// Rows the graph is built from.
#[derive(Debug, Default, Clone)]
pub struct GraphSnapshot {
    pub orgs: Vec<org::Model>,
    pub roles: Vec<role::Model>,
    pub role_implies: Vec<role_implies::Model>,
    pub teams: Vec<team::Model>,
    pub team_privileges: Vec<team_privilege::Model>,
}

/// A team with its hierarchy wired up.
#[derive(Debug, Clone)]
pub struct TeamNode {
    pub team: team::Model,
    parent: Option<TeamId>,
    children: Vec<TeamId>,
}

impl TeamNode {
    pub fn id(&self) -> TeamId {
        TeamId(self.team.id)
    }

    /// `None` at the root.
    pub fn parent(&self) -> Option<TeamId> {
        self.parent
    }

    pub fn children(&self) -> &[TeamId] {
        &self.children
    }
}

#[derive(Debug, Default)]
pub struct RoleGraph {
    orgs: BTreeMap<OrgId, Org>,
    orgs_by_tag: HashMap<String, OrgId>,
    roles: BTreeMap<RoleId, Role>,
    roles_by_tag: HashMap<String, RoleId>,
    implies: Edges<RoleId>,
    teams: BTreeMap<TeamId, TeamNode>,
    team_grants: BTreeMap<TeamId, PrivilegeMap<TeamId, TeamPrivileges>>,
}

impl RoleGraph {
    pub fn from_snapshot(
        GraphSnapshot {
            orgs: org_rows,
            roles: role_rows,
            role_implies: implies_rows,
            teams: team_rows,
            team_privileges: grant_rows,
        }: GraphSnapshot,
    ) -> Result<Self, RbacError> {
        let mut graph = RoleGraph::default();

        for org in org_rows {
            if let Some(tag) = &org.tag {
                graph.orgs_by_tag.insert(tag.clone(), OrgId(org.id));
            }
            graph.orgs.insert(OrgId(org.id), org);
        }

        // teams first, roles may belong to them
        for team in team_rows {
            graph.teams.insert(
                TeamId(team.id),
                TeamNode {
                    parent: team.parent.map(TeamId).filter(|p| p.0 != team.id),
                    children: Vec::new(),
                    team,
                },
            );
        }
        // second pass: a parent may have been scanned after its child
        let links: Vec<(TeamId, TeamId)> = graph
            .teams
            .values()
            .filter_map(|node| node.parent.map(|parent| (node.id(), parent)))
            .collect();
        for (child, parent) in links {
            let node = graph
                .teams
                .get_mut(&parent)
                .ok_or_else(|| dangling("team", child, parent))?;
            node.children.push(child);
        }

        for role in role_rows {
            let id = RoleId(role.id);
            if let Some(org) = role.org {
                if !graph.orgs.contains_key(&OrgId(org)) {
                    return Err(dangling("org", id, OrgId(org)));
                }
            }
            if let Some(team) = role.team {
                if !graph.teams.contains_key(&TeamId(team)) {
                    return Err(dangling("team", id, TeamId(team)));
                }
            }
            if let Some(tag) = &role.tag {
                graph.roles_by_tag.insert(tag.clone(), id);
            }
            graph.roles.insert(id, role);
        }

        for edge in implies_rows {
            let (from, to) = (RoleId(edge.implier), RoleId(edge.implied));
            for end in [from, to] {
                if !graph.roles.contains_key(&end) {
                    return Err(dangling("role", from, to));
                }
            }
            graph.implies.entry(from).or_default().insert(to);
        }

        for grant in grant_rows {
            let (actor, target) = (TeamId(grant.actor), TeamId(grant.target));
            for end in [actor, target] {
                if !graph.teams.contains_key(&end) {
                    return Err(dangling("team", actor, target));
                }
            }
            graph
                .team_grants
                .entry(actor)
                .or_default()
                .set(target, TeamPrivileges::from_column(grant.privileges));
        }

        Ok(graph)
    }

    pub fn org(&self, id: OrgId) -> Option<&Org> {
        self.orgs.get(&id)
    }

    pub fn org_by_tag(&self, tag: &str) -> Option<&Org> {
        self.orgs_by_tag.get(tag).and_then(|id| self.orgs.get(id))
    }

    pub fn orgs(&self) -> impl Iterator<Item = &Org> {
        self.orgs.values()
    }

    pub fn org_ids(&self) -> impl Iterator<Item = OrgId> + '_ {
        self.orgs.keys().copied()
    }

    pub fn role(&self, id: RoleId) -> Option<&Role> {
        self.roles.get(&id)
    }

    pub fn role_by_tag(&self, tag: &str) -> Option<&Role> {
        self.roles_by_tag.get(tag).and_then(|id| self.roles.get(id))
    }

    pub fn require_role(&self, id: RoleId) -> Result<&Role, RbacError> {
        self.role(id).ok_or_else(|| RbacError::role_not_found(id))
    }

    /// All roles, most senior first (ascending priority, then id).
    pub fn roles(&self) -> Vec<&Role> {
        self.roles
            .values()
            .sorted_by_key(|r| (r.priority, r.id))
            .collect()
    }

    pub fn role_ids(&self) -> impl Iterator<Item = RoleId> + '_ {
        self.roles.keys().copied()
    }

    /// Roles directly implied by `role`.
    pub fn implies(&self, role: RoleId) -> impl Iterator<Item = RoleId> + '_ {
        self.implies.get(&role).into_iter().flatten().copied()
    }

    /// Roles directly implying `role`.
    pub fn implied_by(&self, role: RoleId) -> Vec<RoleId> {
        self.implies
            .iter()
            .filter(|(from, to)| **from != role && to.contains(&role))
            .map(|(from, _)| *from)
            .collect()
    }

    pub fn implication_edges(&self) -> &Edges<RoleId> {
        &self.implies
    }

    /// Everything each role implies, transitively, itself excluded.
    pub fn implied_roles(&self) -> Result<BTreeMap<RoleId, BTreeSet<RoleId>>, RbacError> {
        closure::implied_sets(self.role_ids(), &self.implies).map_err(role_closure_error)
    }

    /// Each role's own level on its org, merged with the levels of every role it implies.
    pub fn role_privileges(
        &self,
    ) -> Result<BTreeMap<RoleId, PrivilegeMap<OrgId, PrivLevel>>, RbacError> {
        let own = self
            .roles
            .iter()
            .map(|(id, role)| {
                let mut map = PrivilegeMap::new();
                if let Some(org) = role.org {
                    map.set(OrgId(org), role.priv_level);
                }
                (*id, map)
            })
            .collect();
        closure::merged_privileges(own, &self.implies).map_err(role_closure_error)
    }

    pub fn team(&self, id: TeamId) -> Option<&TeamNode> {
        self.teams.get(&id)
    }

    pub fn team_by_tag(&self, tag: &str) -> Option<&TeamNode> {
        self.teams
            .values()
            .find(|node| node.team.tag.as_deref() == Some(tag))
    }

    pub fn require_team(&self, id: TeamId) -> Result<&TeamNode, RbacError> {
        self.team(id).ok_or_else(|| RbacError::team_not_found(id))
    }

    pub fn teams(&self) -> impl Iterator<Item = &TeamNode> {
        self.teams.values()
    }

    /// Parent, grandparent, ... up to the root.
    pub fn team_ancestors(&self, id: TeamId) -> Vec<TeamId> {
        let mut ancestors = Vec::new();
        let mut cursor = self.team(id).and_then(TeamNode::parent);
        while let Some(parent) = cursor {
            if parent == id || ancestors.contains(&parent) {
                break;
            }
            ancestors.push(parent);
            cursor = self.team(parent).and_then(TeamNode::parent);
        }
        ancestors
    }

    /// All descendants of a team, deepest first, so they can be deleted in order.
    pub fn team_descendants(&self, id: TeamId) -> Vec<TeamId> {
        let mut out = Vec::new();
        let mut seen = BTreeSet::from([id]);
        self.collect_descendants(id, &mut seen, &mut out);
        out
    }

    fn collect_descendants(&self, id: TeamId, seen: &mut BTreeSet<TeamId>, out: &mut Vec<TeamId>) {
        for &child in self.team(id).map(TeamNode::children).unwrap_or_default() {
            if seen.insert(child) {
                self.collect_descendants(child, seen, out);
                out.push(child);
            }
        }
    }

    /// Roles owned by a team.
    pub fn team_roles(&self, id: TeamId) -> Vec<RoleId> {
        self.roles
            .values()
            .filter(|r| r.team == Some(id.0))
            .map(|r| RoleId(r.id))
            .collect()
    }

    /// Child -> parent: members of a child team carry the grants of its ancestors.
    pub fn team_edges(&self) -> Edges<TeamId> {
        let mut edges = Edges::new();
        for node in self.teams.values() {
            if let Some(parent) = node.parent {
                edges.entry(node.id()).or_default().insert(parent);
            }
        }
        edges
    }

    /// Grants made directly by `actor`.
    pub fn team_grants(&self, actor: TeamId) -> PrivilegeMap<TeamId, TeamPrivileges> {
        self.team_grants.get(&actor).cloned().unwrap_or_default()
    }

    /// Every team's grants merged with those of its ancestors.
    pub fn team_privileges(
        &self,
    ) -> Result<BTreeMap<TeamId, PrivilegeMap<TeamId, TeamPrivileges>>, RbacError> {
        let own = self
            .teams
            .keys()
            .map(|id| (*id, self.team_grants(*id)))
            .collect();
        closure::merged_privileges(own, &self.team_edges()).map_err(|err| match err {
            ClosureError::Cycle(path) => RbacError::TeamCycle(path),
            ClosureError::NoConvergence(passes) => RbacError::NoConvergence(passes),
        })
    }

    /// Does membership of `actor` give `required` over `target`?
    pub fn team_can(
        &self,
        actor: TeamId,
        target: TeamId,
        required: TeamPrivileges,
    ) -> Result<bool, RbacError> {
        self.require_team(actor)?;
        self.require_team(target)?;
        let closed = self.team_privileges()?;
        Ok(closed
            .get(&actor)
            .is_some_and(|map| map.covers(target, required)))
    }
}

fn dangling(kind: &'static str, from: impl ToString, to: impl ToString) -> RbacError {
    RbacError::DanglingEdge {
        kind,
        from: from.to_string(),
        to: to.to_string(),
    }
}

pub(crate) fn role_closure_error(err: ClosureError<RoleId>) -> RbacError {
    match err {
        ClosureError::Cycle(path) => RbacError::RoleCycle(path),
        ClosureError::NoConvergence(passes) => RbacError::NoConvergence(passes),
    }
}
