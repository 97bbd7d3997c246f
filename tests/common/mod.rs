#![allow(dead_code)]

use roster_rbac::config::Isolation;
use roster_rbac::entity::{list_person, person_privlevel, person_role};
use roster_rbac::{EngineConfig, OrgId, PrivLevel, RoleDef, RoleId, RosterContext, schema};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait, QueryOrder,
};

pub struct TestContext {
    pub db: DatabaseConnection,
    pub config: EngineConfig,
}

impl TestContext {
    /// A fresh in-memory database with every table created.
    pub async fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        // one connection: every connection to `sqlite::memory:` is a database of its own
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(opt).await.unwrap();
        schema::create_tables(&db).await.unwrap();

        let mut config = EngineConfig::default();
        config.isolation(Isolation::None);

        Self { db, config }
    }

    pub async fn begin(&self) -> RosterContext {
        RosterContext::begin(&self.db, self.config.clone())
            .await
            .unwrap()
    }
}

/// Orgs and the special roles the elevation rules look for.
pub struct Fixture {
    pub admin: OrgId,
    pub x: OrgId,
    pub y: OrgId,
    pub disabled: RoleId,
    pub webmaster: RoleId,
}

impl Fixture {
    pub async fn seed(ctx: &mut RosterContext) -> Self {
        let admin = ctx.save_org(None, Some("admin"), "Administration").await.unwrap();
        let x = ctx.save_org(None, Some("x"), "Unit X").await.unwrap();
        let y = ctx.save_org(None, None, "Unit Y").await.unwrap();
        let disabled = ctx
            .save_role(None, RoleDef::new("Disabled").tag("disabled").priority(1))
            .await
            .unwrap();
        let webmaster = ctx
            .save_role(None, RoleDef::new("Webmaster").tag("webmaster").priority(2))
            .await
            .unwrap();
        Self {
            admin,
            x,
            y,
            disabled,
            webmaster,
        }
    }

    /// Leader on X, the B of the A implies B scenario.
    pub fn leader_on_x(&self) -> RoleDef {
        RoleDef::new("B").priority(20).level(self.x, PrivLevel::Leader)
    }
}

/// Every derived row, in a stable order.
#[derive(Debug, PartialEq, Eq)]
pub struct Derived {
    pub person_role: Vec<person_role::Model>,
    pub person_privlevel: Vec<person_privlevel::Model>,
    pub list_person: Vec<list_person::Model>,
}

pub async fn derived<C: ConnectionTrait>(db: &C) -> Derived {
    Derived {
        person_role: person_role::Entity::find()
            .order_by_asc(person_role::Column::Person)
            .order_by_asc(person_role::Column::Role)
            .all(db)
            .await
            .unwrap(),
        person_privlevel: person_privlevel::Entity::find()
            .order_by_asc(person_privlevel::Column::Person)
            .order_by_asc(person_privlevel::Column::Org)
            .all(db)
            .await
            .unwrap(),
        list_person: list_person::Entity::find()
            .order_by_asc(list_person::Column::List)
            .order_by_asc(list_person::Column::Person)
            .all(db)
            .await
            .unwrap(),
    }
}
