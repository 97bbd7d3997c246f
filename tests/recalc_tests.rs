pub mod common;

use common::{Fixture, TestContext, derived};
use maplit::{btreemap, btreeset};
use pretty_assertions::assert_eq;
use roster_rbac::entity::{list::ListKind, list_role::SubModel, person_role, role_implies};
use roster_rbac::recalc::ListRights;
use roster_rbac::{ErrorKind, PersonId, PrivLevel, RbacError, RoleDef, RoleId, access, recalculate};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

const P: PersonId = PersonId(1);
const Q: PersonId = PersonId(2);
const R: PersonId = PersonId(3);

fn names(held: &[access::HeldRole]) -> Vec<(&str, bool)> {
    held.iter()
        .map(|h| (h.role.name.as_str(), h.explicit))
        .collect()
}

#[tokio::test]
async fn test_implied_role_grants_level_until_deleted() {
    let test = TestContext::new().await;
    let mut ctx = test.begin().await;
    let fix = Fixture::seed(&mut ctx).await;

    let a = ctx
        .save_role(None, RoleDef::new("A").priority(10))
        .await
        .unwrap();
    let b = ctx.save_role(None, fix.leader_on_x()).await.unwrap();
    ctx.add_implication(a, b).await.unwrap();
    ctx.assign_role(P, a).await.unwrap();

    assert_eq!(names(&ctx.held_roles(P).await.unwrap()), [("A", true), ("B", false)]);
    assert_eq!(ctx.privilege_level(P, fix.x).await.unwrap(), PrivLevel::Leader);
    // leader on X is not leader on the admin org, nothing spreads
    assert_eq!(ctx.privilege_level(P, fix.y).await.unwrap(), PrivLevel::None);

    ctx.delete_role(b).await.unwrap();
    assert!(ctx.is_dirty());
    assert_eq!(names(&ctx.held_roles(P).await.unwrap()), [("A", true)]);
    assert_eq!(ctx.privilege_level(P, fix.x).await.unwrap(), PrivLevel::None);
    assert!(!ctx.is_dirty());

    ctx.commit().await.unwrap();
    assert_eq!(
        access::privilege_level(&test.db, P, fix.x).await.unwrap(),
        PrivLevel::None
    );
}

#[tokio::test]
async fn test_recalculate_is_idempotent() {
    let test = TestContext::new().await;
    let mut ctx = test.begin().await;
    let fix = Fixture::seed(&mut ctx).await;

    let a = ctx
        .save_role(None, RoleDef::new("A").priority(10))
        .await
        .unwrap();
    let b = ctx.save_role(None, fix.leader_on_x()).await.unwrap();
    let list = ctx.save_list(None, "crew", ListKind::Email).await.unwrap();
    ctx.add_implication(a, b).await.unwrap();
    ctx.set_list_role(list, b, true, SubModel::AutoSub)
        .await
        .unwrap();
    ctx.assign_role(P, a).await.unwrap();
    ctx.assign_role(Q, fix.webmaster).await.unwrap();
    ctx.set_unsubscribed(list, R, true).await.unwrap();
    ctx.commit().await.unwrap();

    let first = recalculate(&test.db, &test.config).await.unwrap();
    let before = derived(&test.db).await;
    let second = recalculate(&test.db, &test.config).await.unwrap();
    let after = derived(&test.db).await;

    assert_eq!(before, after);
    assert_eq!(first, second);
    assert_eq!(second.implicit_assignments, 1);
    // webmaster: master on all three orgs; P: leader on X
    assert_eq!(second.privilege_rows, 4);
    assert_eq!(second.list_rows_pruned, 0);
}

#[tokio::test]
async fn test_cycle_fails_and_leaves_tables_unchanged() {
    let test = TestContext::new().await;
    let mut ctx = test.begin().await;
    let fix = Fixture::seed(&mut ctx).await;

    let c = ctx
        .save_role(None, RoleDef::new("C").level(fix.x, PrivLevel::Member))
        .await
        .unwrap();
    let d = ctx
        .save_role(None, RoleDef::new("D").level(fix.y, PrivLevel::Contributor))
        .await
        .unwrap();
    ctx.add_implication(c, d).await.unwrap();
    ctx.assign_role(P, c).await.unwrap();
    ctx.commit().await.unwrap();

    let before = derived(&test.db).await;
    assert_eq!(before.person_role.len(), 2);
    assert_eq!(before.person_privlevel.len(), 2);

    // bypass the write-time check, as a raw edit of the table would
    role_implies::Entity::insert(role_implies::ActiveModel {
        implier: Set(d.0),
        implied: Set(c.0),
    })
    .exec_without_returning(&test.db)
    .await
    .unwrap();

    let err = recalculate(&test.db, &test.config).await.unwrap_err();
    match &err {
        RbacError::RoleCycle(path) => {
            assert_eq!(path.first(), path.last());
            assert!(path.contains(&c) && path.contains(&d));
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
    assert!(err.is_rejected_edit());
    assert_eq!(derived(&test.db).await, before);

    // the context refuses to commit the broken graph as well
    let mut ctx = test.begin().await;
    ctx.assign_role(Q, d).await.unwrap();
    assert!(matches!(ctx.commit().await, Err(RbacError::RoleCycle(_))));
    assert_eq!(derived(&test.db).await, before);
}

#[tokio::test]
async fn test_storage_failure_mid_write_leaves_tables_unchanged() {
    let test = TestContext::new().await;
    let mut ctx = test.begin().await;
    let fix = Fixture::seed(&mut ctx).await;

    let a = ctx
        .save_role(None, RoleDef::new("A").priority(10))
        .await
        .unwrap();
    let b = ctx.save_role(None, fix.leader_on_x()).await.unwrap();
    ctx.add_implication(a, b).await.unwrap();
    ctx.assign_role(P, a).await.unwrap();
    ctx.commit().await.unwrap();

    let before = derived(&test.db).await;
    assert_eq!(before.person_role.len(), 2);
    assert_eq!(before.person_privlevel.len(), 1);

    // implicit rows are cleared and rewritten before the level insert fails
    test.db
        .execute_unprepared(
            "CREATE TRIGGER reject_levels BEFORE INSERT ON roster_person_privlevel \
             BEGIN SELECT RAISE(ABORT, 'levels are read-only'); END",
        )
        .await
        .unwrap();

    let err = recalculate(&test.db, &test.config).await.unwrap_err();
    assert!(matches!(err, RbacError::Db(_)), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert!(!err.is_rejected_edit());
    assert_eq!(derived(&test.db).await, before);

    // inside a context only the recalculation is undone
    let mut ctx = test.begin().await;
    let err = ctx.recalculate().await.unwrap_err();
    assert!(matches!(err, RbacError::Db(_)), "{err:?}");
    assert_eq!(derived(ctx.connection()).await, before);
    ctx.rollback().await.unwrap();
    assert_eq!(derived(&test.db).await, before);
}

#[tokio::test]
async fn test_implicit_roles_are_the_closure_of_explicit_ones() {
    let test = TestContext::new().await;
    let mut ctx = test.begin().await;

    let mut roles = Vec::new();
    for i in 0..8 {
        let id = ctx
            .save_role(None, RoleDef::new(&format!("r{i}")).priority(i))
            .await
            .unwrap();
        roles.push(id);
    }
    // a diamond, a chain, two disconnected parts and a self-loop
    let edges = [(0, 1), (1, 2), (0, 3), (3, 2), (2, 4), (4, 6), (5, 6), (7, 7)];
    for (from, to) in edges {
        ctx.add_implication(roles[from], roles[to]).await.unwrap();
    }
    let assignments = btreemap! {
        PersonId(1) => vec![0],
        PersonId(2) => vec![3, 5],
        PersonId(3) => vec![2, 7],
        PersonId(4) => vec![6],
    };
    for (person, held) in &assignments {
        for i in held {
            ctx.assign_role(*person, roles[*i]).await.unwrap();
        }
    }
    ctx.commit().await.unwrap();

    let mut adjacency: BTreeMap<RoleId, Vec<RoleId>> = BTreeMap::new();
    for (from, to) in edges {
        adjacency.entry(roles[from]).or_default().push(roles[to]);
    }
    let mut expected = BTreeSet::new();
    for (person, held) in &assignments {
        let explicit: BTreeSet<RoleId> = held.iter().map(|i| roles[*i]).collect();
        let mut seen = explicit.clone();
        let mut queue: VecDeque<RoleId> = explicit.iter().copied().collect();
        while let Some(role) = queue.pop_front() {
            for next in adjacency.get(&role).into_iter().flatten() {
                if seen.insert(*next) {
                    queue.push_back(*next);
                }
            }
        }
        for role in seen.difference(&explicit) {
            expected.insert((person.0, role.0));
        }
    }

    let implicit: BTreeSet<(i32, i32)> = person_role::Entity::find()
        .filter(person_role::Column::Explicit.eq(false))
        .all(&test.db)
        .await
        .unwrap()
        .into_iter()
        .map(|row| (row.person, row.role))
        .collect();
    assert_eq!(implicit, expected);
}

#[tokio::test]
async fn test_disabled_role_strips_every_level() {
    let test = TestContext::new().await;
    let mut ctx = test.begin().await;
    let fix = Fixture::seed(&mut ctx).await;

    let boss = ctx
        .save_role(None, RoleDef::new("Boss").level(fix.admin, PrivLevel::Master))
        .await
        .unwrap();
    ctx.assign_role(P, boss).await.unwrap();
    ctx.assign_role(P, fix.webmaster).await.unwrap();
    ctx.assign_role(P, fix.disabled).await.unwrap();
    ctx.assign_role(Q, boss).await.unwrap();
    ctx.commit().await.unwrap();

    let rows = derived(&test.db).await.person_privlevel;
    assert!(rows.iter().all(|row| row.person != P.0));
    for org in [fix.admin, fix.x, fix.y] {
        assert_eq!(
            access::privilege_level(&test.db, P, org).await.unwrap(),
            PrivLevel::None
        );
        assert_eq!(
            access::privilege_level(&test.db, Q, org).await.unwrap(),
            PrivLevel::Master
        );
    }
}

#[tokio::test]
async fn test_webmaster_and_admin_levels_spread() {
    let test = TestContext::new().await;
    let mut ctx = test.begin().await;
    let fix = Fixture::seed(&mut ctx).await;

    let admin_leader = ctx
        .save_role(
            None,
            RoleDef::new("Admin leader").level(fix.admin, PrivLevel::Leader),
        )
        .await
        .unwrap();
    let admin_member = ctx
        .save_role(
            None,
            RoleDef::new("Admin member").level(fix.admin, PrivLevel::Member),
        )
        .await
        .unwrap();
    ctx.assign_role(P, fix.webmaster).await.unwrap();
    ctx.assign_role(Q, admin_leader).await.unwrap();
    ctx.assign_role(R, admin_member).await.unwrap();

    for org in [fix.admin, fix.x, fix.y] {
        assert_eq!(ctx.privilege_level(P, org).await.unwrap(), PrivLevel::Master);
        assert_eq!(ctx.privilege_level(Q, org).await.unwrap(), PrivLevel::Leader);
    }
    assert_eq!(ctx.privilege_level(R, fix.admin).await.unwrap(), PrivLevel::Member);
    assert_eq!(ctx.privilege_level(R, fix.x).await.unwrap(), PrivLevel::None);
    ctx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_list_rights_follow_roles_and_keep_unsub() {
    let test = TestContext::new().await;
    let mut ctx = test.begin().await;

    let sender = ctx.save_role(None, RoleDef::new("Sender")).await.unwrap();
    let auto = ctx.save_role(None, RoleDef::new("Auto")).await.unwrap();
    let warn = ctx.save_role(None, RoleDef::new("Warn")).await.unwrap();
    let list = ctx.save_list(None, "all-hands", ListKind::Email).await.unwrap();
    ctx.set_list_role(list, sender, true, SubModel::NoSub)
        .await
        .unwrap();
    ctx.set_list_role(list, auto, false, SubModel::AutoSub)
        .await
        .unwrap();
    ctx.set_list_role(list, warn, false, SubModel::WarnSub)
        .await
        .unwrap();

    ctx.assign_role(P, sender).await.unwrap();
    ctx.assign_role(P, auto).await.unwrap();
    ctx.assign_role(Q, warn).await.unwrap();
    ctx.set_unsubscribed(list, R, true).await.unwrap();

    let report = ctx.recalculate().await.unwrap();
    assert_eq!(report.warn_on_unsub, btreemap! { list => btreeset! {warn} });

    let rights = |sender, sub, unsub| Some(ListRights { sender, sub, unsub });
    assert_eq!(ctx.list_rights(list, P).await.unwrap(), rights(true, true, false));
    assert_eq!(ctx.list_rights(list, Q).await.unwrap(), rights(false, true, false));
    assert_eq!(ctx.list_rights(list, R).await.unwrap(), rights(false, false, true));

    // recalculation never writes unsub
    ctx.set_unsubscribed(list, Q, true).await.unwrap();
    ctx.recalculate().await.unwrap();
    assert_eq!(ctx.list_rights(list, Q).await.unwrap(), rights(false, true, true));

    ctx.unassign_role(P, auto).await.unwrap();
    assert_eq!(ctx.list_rights(list, P).await.unwrap(), rights(true, false, false));
    ctx.unassign_role(P, sender).await.unwrap();
    assert_eq!(ctx.list_rights(list, P).await.unwrap(), None);

    // clearing the last flag removes the row
    ctx.set_unsubscribed(list, R, false).await.unwrap();
    assert_eq!(ctx.list_rights(list, R).await.unwrap(), None);
    ctx.commit().await.unwrap();
}

#[tokio::test]
async fn test_sub_depends_on_current_roles_only() {
    let test = TestContext::new().await;
    let mut ctx = test.begin().await;

    let auto = ctx.save_role(None, RoleDef::new("Auto")).await.unwrap();
    let optional = ctx.save_role(None, RoleDef::new("Optional")).await.unwrap();
    let list = ctx.save_list(None, "news", ListKind::Sms).await.unwrap();
    ctx.set_list_role(list, auto, false, SubModel::AutoSub)
        .await
        .unwrap();
    ctx.set_list_role(list, optional, false, SubModel::AllowSub)
        .await
        .unwrap();
    ctx.assign_role(P, auto).await.unwrap();
    ctx.assign_role(P, optional).await.unwrap();
    ctx.commit().await.unwrap();
    assert_eq!(
        access::list_rights(&test.db, list, P).await.unwrap(),
        Some(ListRights {
            sender: false,
            sub: true,
            unsub: false
        })
    );

    let mut ctx = test.begin().await;
    ctx.unassign_role(P, auto).await.unwrap();
    ctx.assign_role(Q, optional).await.unwrap();
    let report = ctx.commit().await.unwrap().unwrap();
    assert_eq!(report.list_rows_pruned, 1);

    // same roles, same rows
    assert_eq!(access::list_rights(&test.db, list, P).await.unwrap(), None);
    assert_eq!(access::list_rights(&test.db, list, Q).await.unwrap(), None);

    // a stray sub with no automatic role behind it is dropped
    roster_rbac::entity::list_person::Entity::insert(
        roster_rbac::entity::list_person::ActiveModel {
            list: Set(list.0),
            person: Set(Q.0),
            sender: Set(false),
            sub: Set(true),
            unsub: Set(false),
        },
    )
    .exec_without_returning(&test.db)
    .await
    .unwrap();
    recalculate(&test.db, &test.config).await.unwrap();
    assert_eq!(access::list_rights(&test.db, list, Q).await.unwrap(), None);
}
