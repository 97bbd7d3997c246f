use sea_orm::entity::prelude::*;

/// Holding `implier` also grants everything `implied` grants.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "roster_role_implies")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub implier: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub implied: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::role::Entity",
        from = "Column::Implier",
        to = "super::role::Column::Id",
        on_delete = "Cascade"
    )]
    Implier,
    #[sea_orm(
        belongs_to = "super::role::Entity",
        from = "Column::Implied",
        to = "super::role::Column::Id",
        on_delete = "Cascade"
    )]
    Implied,
}

impl ActiveModelBehavior for ActiveModel {}
