use crate::access::{self, HeldRole};
use crate::closure;
use crate::config::EngineConfig;
use crate::entity::{
    list::{self, ListKind},
    list_person, list_role,
    list_role::SubModel,
    org, person_role, role, role_implies, team, team_privilege,
};
use crate::error::RbacError;
use crate::graph::RoleGraph;
use crate::ids::{ListId, OrgId, PersonId, RoleId, TeamId};
use crate::privilege::{PrivLevel, TeamPrivileges};
use crate::recalc::{self, ListRights, RecalcReport};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, PaginatorTrait,
    QueryFilter, Set, TransactionTrait, Unchanged,
};
use std::collections::{BTreeMap, BTreeSet};

/// One administrative transaction over the role tables.
///
/// Owns the transaction and the role graph loaded inside it. Every edit goes through the store
/// and reloads the graph; edits touching derived state mark the context dirty, and the next
/// privilege read or the commit recalculates first.
#[derive(Debug)]
pub struct RosterContext {
    txn: DatabaseTransaction,
    graph: RoleGraph,
    config: EngineConfig,
    dirty: bool,
}

/// Editable fields of a role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleDef {
    pub tag: Option<String>,
    pub name: String,
    pub title: String,
    pub org: Option<OrgId>,
    pub team: Option<TeamId>,
    pub priv_level: PrivLevel,
    pub priority: i32,
    pub implicit_only: bool,
    pub filter: bool,
}

impl RoleDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_owned());
        self
    }

    /// Grant `level` on `org` to holders.
    pub fn level(mut self, org: OrgId, level: PrivLevel) -> Self {
        self.org = Some(org);
        self.priv_level = level;
        self
    }

    pub fn team(mut self, team: TeamId) -> Self {
        self.team = Some(team);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn implicit_only(mut self) -> Self {
        self.implicit_only = true;
        self
    }
}

/// Editable fields of a team.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamDef {
    pub tag: Option<String>,
    pub name: String,
    /// `None` for a root team
    pub parent: Option<TeamId>,
}

impl TeamDef {
    pub fn new(name: &str, parent: Option<TeamId>) -> Self {
        Self {
            tag: None,
            name: name.to_owned(),
            parent,
        }
    }
}

impl RosterContext {
    /// Start a transaction with the configured isolation level and load the role graph in it.
    pub async fn begin<C: TransactionTrait>(
        db: &C,
        config: EngineConfig,
    ) -> Result<Self, RbacError> {
        let txn = db
            .begin_with_config(config.transaction.isolation.level(), None)
            .await?;
        let graph = RoleGraph::load(&txn).await?;
        Ok(Self {
            txn,
            graph,
            config,
            dirty: false,
        })
    }

    /// The graph as of the last edit.
    pub fn graph(&self) -> &RoleGraph {
        &self.graph
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The underlying transaction, for reads outside the role tables.
    pub fn connection(&self) -> &DatabaseTransaction {
        &self.txn
    }

    /// Whether derived tables lag behind an edit.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Recalculate now, dirty or not.
    pub async fn recalculate(&mut self) -> Result<RecalcReport, RbacError> {
        let report = recalc::recalculate_with(&self.txn, &self.graph, &self.config).await?;
        self.dirty = false;
        Ok(report)
    }

    /// Recalculate if an edit is pending. Returns the report when one ran.
    pub async fn refresh(&mut self) -> Result<Option<RecalcReport>, RbacError> {
        if !self.dirty {
            return Ok(None);
        }
        self.recalculate().await.map(Some)
    }

    /// Recalculate if needed, then commit. A failed recalculation rolls everything back.
    pub async fn commit(mut self) -> Result<Option<RecalcReport>, RbacError> {
        let report = self.refresh().await?;
        self.txn.commit().await?;
        Ok(report)
    }

    pub async fn rollback(self) -> Result<(), RbacError> {
        self.txn.rollback().await?;
        Ok(())
    }

    /// Reload the graph after an edit; derived tables are stale until the next refresh.
    async fn reload(&mut self) -> Result<(), RbacError> {
        self.graph = RoleGraph::load(&self.txn).await?;
        self.dirty = true;
        Ok(())
    }

    pub async fn save_org(
        &mut self,
        id: Option<OrgId>,
        tag: Option<&str>,
        name: &str,
    ) -> Result<OrgId, RbacError> {
        if let Some(tag) = tag {
            if let Some(other) = self.graph.org_by_tag(tag) {
                if Some(OrgId(other.id)) != id {
                    return Err(RbacError::DuplicateTag(tag.to_owned()));
                }
            }
        }
        let mut model = org::ActiveModel {
            tag: Set(tag.map(str::to_owned)),
            name: Set(name.to_owned()),
            ..Default::default()
        };
        let saved = match id {
            Some(id) => {
                self.graph
                    .org(id)
                    .ok_or_else(|| RbacError::org_not_found(id))?;
                model.id = Unchanged(id.0);
                model.update(&self.txn).await?
            }
            None => model.insert(&self.txn).await?,
        };
        // org tags drive the elevation rules
        self.reload().await?;
        Ok(OrgId(saved.id))
    }

    /// Create (`id == None`) or update a role.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn save_role(
        &mut self,
        id: Option<RoleId>,
        def: RoleDef,
    ) -> Result<RoleId, RbacError> {
        if let Some(org) = def.org {
            self.graph
                .org(org)
                .ok_or_else(|| RbacError::org_not_found(org))?;
        }
        if let Some(team) = def.team {
            self.graph.require_team(team)?;
        }
        if let Some(tag) = &def.tag {
            if let Some(other) = self.graph.role_by_tag(tag) {
                if Some(RoleId(other.id)) != id {
                    return Err(RbacError::DuplicateTag(tag.clone()));
                }
            }
        }

        let mut model = role::ActiveModel {
            tag: Set(def.tag),
            name: Set(def.name),
            title: Set(def.title),
            org: Set(def.org.map(|org| org.0)),
            team: Set(def.team.map(|team| team.0)),
            priv_level: Set(def.priv_level),
            priority: Set(def.priority),
            implicit_only: Set(def.implicit_only),
            filter: Set(def.filter),
            ..Default::default()
        };
        let saved = match id {
            Some(id) => {
                self.graph.require_role(id)?;
                if def.implicit_only && self.explicit_holders(id).await? > 0 {
                    return Err(RbacError::ImplicitOnlyRole(id));
                }
                model.id = Unchanged(id.0);
                model.update(&self.txn).await?
            }
            None => model.insert(&self.txn).await?,
        };

        self.reload().await?;
        Ok(RoleId(saved.id))
    }

    /// Delete a role with its implications, assignments and list mappings.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn delete_role(&mut self, id: RoleId) -> Result<(), RbacError> {
        self.graph.require_role(id)?;
        role::Entity::delete_by_id(id.0).exec(&self.txn).await?;
        self.reload().await
    }

    /// Create (`id == None`) or update a team. Moving a team under one of its own descendants is
    /// rejected.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn save_team(
        &mut self,
        id: Option<TeamId>,
        def: TeamDef,
    ) -> Result<TeamId, RbacError> {
        if let Some(parent) = def.parent {
            if Some(parent) != id {
                self.graph.require_team(parent)?;
            }
        }
        if let Some(tag) = &def.tag {
            if let Some(other) = self.graph.team_by_tag(tag) {
                if Some(other.id()) != id {
                    return Err(RbacError::DuplicateTag(tag.clone()));
                }
            }
        }

        let mut model = team::ActiveModel {
            parent: Set(def.parent.map(|parent| parent.0)),
            tag: Set(def.tag),
            name: Set(def.name),
            ..Default::default()
        };
        let saved = match id {
            Some(id) => {
                self.graph.require_team(id)?;
                if let Some(parent) = def.parent.filter(|parent| *parent != id) {
                    let edges = self.graph.team_edges();
                    if let Some(path) = closure::cycle_through(&edges, id, parent) {
                        return Err(RbacError::TeamCycle(path));
                    }
                }
                model.id = Unchanged(id.0);
                model.update(&self.txn).await?
            }
            None => model.insert(&self.txn).await?,
        };

        self.reload().await?;
        Ok(TeamId(saved.id))
    }

    /// Delete a team, its descendants, and every role they own. Returns the deleted teams,
    /// deepest first.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn delete_team(&mut self, id: TeamId) -> Result<Vec<TeamId>, RbacError> {
        self.graph.require_team(id)?;
        let mut doomed = self.graph.team_descendants(id);
        doomed.push(id);
        let roles: Vec<i32> = doomed
            .iter()
            .flat_map(|team| self.graph.team_roles(*team))
            .map(|role| role.0)
            .collect();

        if !roles.is_empty() {
            role::Entity::delete_many()
                .filter(role::Column::Id.is_in(roles.clone()))
                .exec(&self.txn)
                .await?;
        }
        team::Entity::delete_many()
            .filter(team::Column::Id.is_in(doomed.iter().map(|team| team.0)))
            .exec(&self.txn)
            .await?;
        tracing::debug!(teams = doomed.len(), roles = roles.len(), "teams deleted");

        self.reload().await?;
        Ok(doomed)
    }

    /// Holders of `implier` also hold `implied`. Rejected if it would close a cycle.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn add_implication(
        &mut self,
        implier: RoleId,
        implied: RoleId,
    ) -> Result<(), RbacError> {
        self.graph.require_role(implier)?;
        self.graph.require_role(implied)?;
        if implier != implied {
            if let Some(path) =
                closure::cycle_through(self.graph.implication_edges(), implier, implied)
            {
                tracing::warn!(%implier, %implied, "implication rejected: cycle");
                return Err(RbacError::RoleCycle(path));
            }
        }

        role_implies::Entity::insert(role_implies::ActiveModel {
            implier: Set(implier.0),
            implied: Set(implied.0),
        })
        .on_conflict(
            OnConflict::columns([role_implies::Column::Implier, role_implies::Column::Implied])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&self.txn)
        .await?;
        self.reload().await
    }

    pub async fn remove_implication(
        &mut self,
        implier: RoleId,
        implied: RoleId,
    ) -> Result<(), RbacError> {
        role_implies::Entity::delete_many()
            .filter(role_implies::Column::Implier.eq(implier.0))
            .filter(role_implies::Column::Implied.eq(implied.0))
            .exec(&self.txn)
            .await?;
        self.reload().await
    }

    /// Assign `role` to `person` explicitly. Turns an implicit assignment explicit.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn assign_role(&mut self, person: PersonId, role: RoleId) -> Result<(), RbacError> {
        if self.graph.require_role(role)?.implicit_only {
            return Err(RbacError::ImplicitOnlyRole(role));
        }
        person_role::Entity::insert(person_role::ActiveModel {
            person: Set(person.0),
            role: Set(role.0),
            explicit: Set(true),
        })
        .on_conflict(
            OnConflict::columns([person_role::Column::Person, person_role::Column::Role])
                .update_column(person_role::Column::Explicit)
                .to_owned(),
        )
        .exec_without_returning(&self.txn)
        .await?;
        self.dirty = true;
        Ok(())
    }

    /// Remove an explicit assignment. Returns whether there was one. Implicit assignments can
    /// only go away with the role implying them.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn unassign_role(
        &mut self,
        person: PersonId,
        role: RoleId,
    ) -> Result<bool, RbacError> {
        self.graph.require_role(role)?;
        self.refresh().await?;
        let Some(row) = person_role::Entity::find_by_id((person.0, role.0))
            .one(&self.txn)
            .await?
        else {
            return Ok(false);
        };
        if !row.explicit {
            return Err(RbacError::ImplicitAssignment { person, role });
        }
        person_role::Entity::delete_by_id((person.0, role.0))
            .exec(&self.txn)
            .await?;
        self.dirty = true;
        Ok(true)
    }

    /// Replace what members of `actor` may do to `target`. Empty privileges remove the grant.
    pub async fn set_team_privileges(
        &mut self,
        actor: TeamId,
        target: TeamId,
        privileges: TeamPrivileges,
    ) -> Result<(), RbacError> {
        self.graph.require_team(actor)?;
        self.graph.require_team(target)?;
        if privileges.is_empty() {
            team_privilege::Entity::delete_by_id((actor.0, target.0))
                .exec(&self.txn)
                .await?;
        } else {
            team_privilege::Entity::insert(team_privilege::ActiveModel {
                actor: Set(actor.0),
                target: Set(target.0),
                privileges: Set(privileges.to_column()),
            })
            .on_conflict(
                OnConflict::columns([team_privilege::Column::Actor, team_privilege::Column::Target])
                    .update_column(team_privilege::Column::Privileges)
                    .to_owned(),
            )
            .exec_without_returning(&self.txn)
            .await?;
        }
        self.reload().await
    }

    pub async fn save_list(
        &mut self,
        id: Option<ListId>,
        name: &str,
        kind: ListKind,
    ) -> Result<ListId, RbacError> {
        let same_name = list::Entity::find()
            .filter(list::Column::Name.eq(name))
            .one(&self.txn)
            .await?;
        if same_name.is_some_and(|other| Some(ListId(other.id)) != id) {
            return Err(RbacError::DuplicateName(name.to_owned()));
        }
        let mut model = list::ActiveModel {
            name: Set(name.to_owned()),
            kind: Set(kind),
            ..Default::default()
        };
        let saved = match id {
            Some(id) => {
                self.require_list(id).await?;
                model.id = Unchanged(id.0);
                model.update(&self.txn).await?
            }
            None => model.insert(&self.txn).await?,
        };
        Ok(ListId(saved.id))
    }

    /// Map `role` onto `list`: holders may send when `sender`, and subscribe per `sub_model`.
    pub async fn set_list_role(
        &mut self,
        list: ListId,
        role: RoleId,
        sender: bool,
        sub_model: SubModel,
    ) -> Result<(), RbacError> {
        self.require_list(list).await?;
        self.graph.require_role(role)?;
        list_role::Entity::insert(list_role::ActiveModel {
            list: Set(list.0),
            role: Set(role.0),
            sender: Set(sender),
            sub_model: Set(sub_model),
        })
        .on_conflict(
            OnConflict::columns([list_role::Column::List, list_role::Column::Role])
                .update_columns([list_role::Column::Sender, list_role::Column::SubModel])
                .to_owned(),
        )
        .exec_without_returning(&self.txn)
        .await?;
        self.dirty = true;
        Ok(())
    }

    pub async fn remove_list_role(&mut self, list: ListId, role: RoleId) -> Result<(), RbacError> {
        list_role::Entity::delete_by_id((list.0, role.0))
            .exec(&self.txn)
            .await?;
        self.dirty = true;
        Ok(())
    }

    /// Set or clear the manual unsubscribe flag. Recalculation never touches it.
    pub async fn set_unsubscribed(
        &mut self,
        list: ListId,
        person: PersonId,
        unsub: bool,
    ) -> Result<(), RbacError> {
        self.require_list(list).await?;
        list_person::Entity::insert(list_person::ActiveModel {
            list: Set(list.0),
            person: Set(person.0),
            sender: Set(false),
            sub: Set(false),
            unsub: Set(unsub),
        })
        .on_conflict(
            OnConflict::columns([list_person::Column::List, list_person::Column::Person])
                .update_column(list_person::Column::Unsub)
                .to_owned(),
        )
        .exec_without_returning(&self.txn)
        .await?;
        if !unsub {
            list_person::Entity::delete_many()
                .filter(list_person::Column::List.eq(list.0))
                .filter(list_person::Column::Person.eq(person.0))
                .filter(list_person::Column::Sender.eq(false))
                .filter(list_person::Column::Sub.eq(false))
                .exec(&self.txn)
                .await?;
        }
        Ok(())
    }

    /// Lists whose automatic subscription `person` would lose along with `role`, where the
    /// mapping asks for a warning first.
    pub async fn unsubscribe_warnings(
        &self,
        person: PersonId,
        role: RoleId,
    ) -> Result<Vec<ListId>, RbacError> {
        self.graph.require_role(role)?;
        let explicit: BTreeSet<RoleId> = person_role::Entity::find()
            .filter(person_role::Column::Person.eq(person.0))
            .filter(person_role::Column::Explicit.eq(true))
            .all(&self.txn)
            .await?
            .into_iter()
            .map(|row| RoleId(row.role))
            .collect();
        if !explicit.contains(&role) {
            return Ok(Vec::new());
        }

        let closure = self.graph.implied_roles()?;
        let held = |roots: &BTreeSet<RoleId>| -> BTreeMap<PersonId, BTreeSet<RoleId>> {
            let mut all = roots.clone();
            for root in roots {
                all.extend(closure.get(root).into_iter().flatten().copied());
            }
            BTreeMap::from([(person, all)])
        };
        let before = held(&explicit);
        let mut remaining = explicit.clone();
        remaining.remove(&role);
        let after = held(&remaining);
        let lost: BTreeSet<RoleId> = before[&person].difference(&after[&person]).copied().collect();

        let mappings = list_role::Entity::find().all(&self.txn).await?;
        let was = recalc::project(&mappings, &before, &[]);
        let will = recalc::project(&mappings, &after, &[]);

        Ok(was
            .rows
            .iter()
            .filter(|((list, _), rights)| {
                let dropped = rights.sub
                    && !will
                        .rows
                        .get(&(*list, person))
                        .is_some_and(|rights| rights.sub);
                dropped
                    && was
                        .warn_on_unsub
                        .get(list)
                        .is_some_and(|roles| !roles.is_disjoint(&lost))
            })
            .map(|((list, _), _)| *list)
            .collect())
    }

    pub async fn privilege_level(
        &mut self,
        person: PersonId,
        org: OrgId,
    ) -> Result<PrivLevel, RbacError> {
        self.refresh().await?;
        access::privilege_level(&self.txn, person, org).await
    }

    pub async fn has_privilege(
        &mut self,
        person: PersonId,
        org: OrgId,
        level: PrivLevel,
    ) -> Result<bool, RbacError> {
        self.refresh().await?;
        access::has_privilege(&self.txn, person, org, level).await
    }

    pub async fn held_roles(&mut self, person: PersonId) -> Result<Vec<HeldRole>, RbacError> {
        self.refresh().await?;
        access::held_roles(&self.txn, person).await
    }

    pub async fn list_rights(
        &mut self,
        list: ListId,
        person: PersonId,
    ) -> Result<Option<ListRights>, RbacError> {
        self.refresh().await?;
        access::list_rights(&self.txn, list, person).await
    }

    async fn require_list(&self, id: ListId) -> Result<list::Model, RbacError> {
        list::Entity::find_by_id(id.0)
            .one(&self.txn)
            .await?
            .ok_or_else(|| RbacError::list_not_found(id))
    }

    async fn explicit_holders(&self, role: RoleId) -> Result<u64, RbacError> {
        Ok(person_role::Entity::find()
            .filter(person_role::Column::Role.eq(role.0))
            .filter(person_role::Column::Explicit.eq(true))
            .count(&self.txn)
            .await?)
    }
}
