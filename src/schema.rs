use crate::entity;
use sea_orm::{ConnectionTrait, DbErr, EntityName, EntityTrait, ExecResult, Schema};

/// Create the role engine tables in foreign-key order. Fails if any of them already exists.
pub async fn create_tables<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    create_table(db, entity::org::Entity).await?;
    create_table(db, entity::team::Entity).await?;
    create_table(db, entity::role::Entity).await?;
    create_table(db, entity::role_implies::Entity).await?;
    create_table(db, entity::person_role::Entity).await?;
    create_table(db, entity::person_privlevel::Entity).await?;
    create_table(db, entity::team_privilege::Entity).await?;
    create_table(db, entity::list::Entity).await?;
    create_table(db, entity::list_role::Entity).await?;
    create_table(db, entity::list_person::Entity).await?;

    tracing::info!(tables = all_tables().len(), "role engine tables created");
    Ok(())
}

/// All tables owned by the role engine, in creation order.
pub fn all_tables() -> Vec<String> {
    [
        entity::org::Entity.table_name(),
        entity::team::Entity.table_name(),
        entity::role::Entity.table_name(),
        entity::role_implies::Entity.table_name(),
        entity::person_role::Entity.table_name(),
        entity::person_privlevel::Entity.table_name(),
        entity::team_privilege::Entity.table_name(),
        entity::list::Entity.table_name(),
        entity::list_role::Entity.table_name(),
        entity::list_person::Entity.table_name(),
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

async fn create_table<C, E>(db: &C, entity: E) -> Result<ExecResult, DbErr>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let res = db
        .execute(backend.build(&schema.create_table_from_entity(entity)))
        .await?;

    for stmt in schema.create_index_from_entity(entity) {
        db.execute(backend.build(&stmt)).await?;
    }

    Ok(res)
}
