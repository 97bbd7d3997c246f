use sea_orm::entity::prelude::*;

/// Privileges granted to members of `actor` over `target`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "roster_team_privilege")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub actor: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub target: i32,
    /// [`TeamPrivileges`](crate::privilege::TeamPrivileges) bits
    pub privileges: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::team::Entity",
        from = "Column::Actor",
        to = "super::team::Column::Id",
        on_delete = "Cascade"
    )]
    Actor,
    #[sea_orm(
        belongs_to = "super::team::Entity",
        from = "Column::Target",
        to = "super::team::Column::Id",
        on_delete = "Cascade"
    )]
    Target,
}

impl ActiveModelBehavior for ActiveModel {}
