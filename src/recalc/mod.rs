//! Re-derives implicit role assignments, person privilege levels and list rights.
//!
//! Everything is computed in memory first; a cycle or dangling edge is reported before the
//! first write. The writes then run in a nested transaction, in this order:
//!
//! 1. delete implicit assignments and privilege levels, clear every `sender` flag
//! 2. insert implicit assignments (closure of explicit ones, minus the explicit ones)
//! 3. insert privilege levels (maximum over held roles per org)
//! 4. ... after the elevation rules have been applied to them
//! 5. write list rights and prune empty rows
//!
//! Any error drops the transaction, leaving the store as it was.

use crate::config::EngineConfig;
use crate::entity::{list_person, list_role, person_privlevel, person_role};
use crate::error::RbacError;
use crate::graph::RoleGraph;
use crate::ids::{ListId, OrgId, PersonId, RoleId};
use crate::privilege::PrivLevel;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

mod elevation;
mod lists;

pub use elevation::*;
pub use lists::*;

/// Rows per INSERT statement; keeps well below SQLite's bound parameter limit.
const BATCH: usize = 200;

/// What a recalculation wrote.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecalcReport {
    pub implicit_assignments: usize,
    pub privilege_rows: usize,
    pub list_rows_written: usize,
    pub list_rows_pruned: u64,
    /// Per list, roles whose holders are auto-subscribed and must be warned before removal
    pub warn_on_unsub: BTreeMap<ListId, BTreeSet<RoleId>>,
}

impl fmt::Display for RecalcReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} implicit assignments, {} privilege levels, {} list rows written, {} pruned",
            self.implicit_assignments,
            self.privilege_rows,
            self.list_rows_written,
            self.list_rows_pruned
        )
    }
}

/// Derived state computed from one snapshot of the role data.
#[derive(Debug, Default)]
pub struct Derivation {
    /// Every role each person holds, explicitly or by implication
    pub held: BTreeMap<PersonId, BTreeSet<RoleId>>,
    pub implicit: Vec<(PersonId, RoleId)>,
    pub levels: BTreeMap<PersonId, Levels>,
    pub lists: ListProjection,
}

/// Load the graph inside a new transaction on `db` and recalculate against it.
pub async fn recalculate<C>(db: &C, config: &EngineConfig) -> Result<RecalcReport, RbacError>
where
    C: TransactionTrait,
{
    let txn = db.begin().await?;
    let graph = RoleGraph::load(&txn).await?;
    let report = rewrite(&txn, &graph, config).await?;
    txn.commit().await?;
    Ok(report)
}

/// Recalculate against a graph already loaded in the caller's transaction `db`.
pub async fn recalculate_with<C>(
    db: &C,
    graph: &RoleGraph,
    config: &EngineConfig,
) -> Result<RecalcReport, RbacError>
where
    C: TransactionTrait,
{
    let txn = db.begin().await?;
    let report = rewrite(&txn, graph, config).await?;
    txn.commit().await?;
    Ok(report)
}

#[tracing::instrument(level = "debug", skip_all)]
async fn rewrite<C>(
    db: &C,
    graph: &RoleGraph,
    config: &EngineConfig,
) -> Result<RecalcReport, RbacError>
where
    C: ConnectionTrait,
{
    let derivation = derive(db, graph, config)
        .await
        .inspect_err(|err| tracing::error!(%err, "recalculation aborted"))?;

    clear_derived(db).await?;
    let implicit_assignments = write_implicit(db, &derivation.implicit).await?;
    let privilege_rows = write_levels(db, &derivation.levels).await?;
    let (list_rows_written, list_rows_pruned) = write_lists(db, &derivation.lists).await?;

    let report = RecalcReport {
        implicit_assignments,
        privilege_rows,
        list_rows_written,
        list_rows_pruned,
        warn_on_unsub: derivation.lists.warn_on_unsub,
    };
    tracing::info!(%report, "recalculated");
    Ok(report)
}

/// Compute everything a recalculation would write, without writing.
pub async fn derive<C>(
    db: &C,
    graph: &RoleGraph,
    config: &EngineConfig,
) -> Result<Derivation, RbacError>
where
    C: ConnectionTrait,
{
    let explicit_rows = person_role::Entity::find()
        .filter(person_role::Column::Explicit.eq(true))
        .all(db)
        .await?;
    let mappings = list_role::Entity::find().all(db).await?;
    let existing_lists = list_person::Entity::find().all(db).await?;

    let mut explicit: BTreeMap<PersonId, BTreeSet<RoleId>> = BTreeMap::new();
    for row in explicit_rows {
        explicit
            .entry(PersonId(row.person))
            .or_default()
            .insert(RoleId(row.role));
    }

    derive_from(graph, config, &explicit, &mappings, &existing_lists)
}

/// The in-memory part of a recalculation.
pub fn derive_from(
    graph: &RoleGraph,
    config: &EngineConfig,
    explicit: &BTreeMap<PersonId, BTreeSet<RoleId>>,
    mappings: &[list_role::Model],
    existing_lists: &[list_person::Model],
) -> Result<Derivation, RbacError> {
    let closure = graph.implied_roles()?;

    let mut held: BTreeMap<PersonId, BTreeSet<RoleId>> = BTreeMap::new();
    let mut implicit = Vec::new();
    for (person, roles) in explicit {
        let mut all = roles.clone();
        for role in roles {
            let reached = closure
                .get(role)
                .ok_or_else(|| RbacError::role_not_found(role))?;
            all.extend(reached.iter().copied());
        }
        implicit.extend(
            all.iter()
                .filter(|role| !roles.contains(role))
                .map(|role| (*person, *role)),
        );
        held.insert(*person, all);
    }
    tracing::debug!(
        people = held.len(),
        implicit = implicit.len(),
        "implicit roles"
    );

    let mut levels: BTreeMap<PersonId, Levels> = BTreeMap::new();
    for (person, roles) in &held {
        for role in roles {
            let role = graph.require_role(*role)?;
            if let Some(org) = role.org {
                if role.priv_level > PrivLevel::None {
                    levels
                        .entry(*person)
                        .or_default()
                        .grant(OrgId(org), role.priv_level);
                }
            }
        }
    }

    let rules = config.elevation_rules(graph);
    let orgs: Vec<OrgId> = graph.org_ids().collect();
    apply_rules(&rules, &orgs, &held, &mut levels)?;

    let lists = project(mappings, &held, existing_lists);

    Ok(Derivation {
        held,
        implicit,
        levels,
        lists,
    })
}

async fn clear_derived<C: ConnectionTrait>(db: &C) -> Result<(), RbacError> {
    let implicit = person_role::Entity::delete_many()
        .filter(person_role::Column::Explicit.eq(false))
        .exec(db)
        .await?;
    let levels = person_privlevel::Entity::delete_many().exec(db).await?;
    list_person::Entity::update_many()
        .col_expr(list_person::Column::Sender, Expr::value(false))
        .exec(db)
        .await?;
    tracing::debug!(
        implicit = implicit.rows_affected,
        levels = levels.rows_affected,
        "derived rows cleared"
    );
    Ok(())
}

async fn write_implicit<C: ConnectionTrait>(
    db: &C,
    implicit: &[(PersonId, RoleId)],
) -> Result<usize, RbacError> {
    for chunk in implicit.chunks(BATCH) {
        person_role::Entity::insert_many(chunk.iter().map(|(person, role)| {
            person_role::ActiveModel {
                person: Set(person.0),
                role: Set(role.0),
                explicit: Set(false),
            }
        }))
        .exec_without_returning(db)
        .await?;
    }
    Ok(implicit.len())
}

async fn write_levels<C: ConnectionTrait>(
    db: &C,
    levels: &BTreeMap<PersonId, Levels>,
) -> Result<usize, RbacError> {
    let rows: Vec<person_privlevel::ActiveModel> = levels
        .iter()
        .flat_map(|(person, levels)| {
            levels.iter().map(|(org, level)| person_privlevel::ActiveModel {
                person: Set(person.0),
                org: Set(org.0),
                priv_level: Set(level),
            })
        })
        .collect();
    let count = rows.len();
    for chunk in rows.chunks(BATCH) {
        person_privlevel::Entity::insert_many(chunk.to_vec())
            .exec_without_returning(db)
            .await?;
    }
    Ok(count)
}

/// Returns (rows written, rows pruned). Only `sender` and `sub` are ever written.
async fn write_lists<C: ConnectionTrait>(
    db: &C,
    projection: &ListProjection,
) -> Result<(usize, u64), RbacError> {
    let existing: BTreeMap<(ListId, PersonId), ListRights> = list_person::Entity::find()
        .all(db)
        .await?
        .iter()
        .map(|row| ((ListId(row.list), PersonId(row.person)), row.into()))
        .collect();

    let changed: Vec<list_person::ActiveModel> = projection
        .rows
        .iter()
        .filter(|(key, rights)| match existing.get(*key) {
            Some(before) => before.sender != rights.sender || before.sub != rights.sub,
            None => !rights.is_empty(),
        })
        .map(|((list, person), rights)| list_person::ActiveModel {
            list: Set(list.0),
            person: Set(person.0),
            sender: Set(rights.sender),
            sub: Set(rights.sub),
            unsub: Set(false),
        })
        .collect();

    for chunk in changed.chunks(BATCH) {
        list_person::Entity::insert_many(chunk.to_vec())
            .on_conflict(
                OnConflict::columns([list_person::Column::List, list_person::Column::Person])
                    .update_columns([list_person::Column::Sender, list_person::Column::Sub])
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await?;
    }

    let pruned = list_person::Entity::delete_many()
        .filter(list_person::Column::Sender.eq(false))
        .filter(list_person::Column::Sub.eq(false))
        .filter(list_person::Column::Unsub.eq(false))
        .exec(db)
        .await?
        .rows_affected;

    tracing::debug!(written = changed.len(), pruned, "list rights written");
    Ok((changed.len(), pruned))
}
