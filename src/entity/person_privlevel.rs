use crate::privilege::PrivLevel;
use sea_orm::entity::prelude::*;

/// Derived. Written only by the recalculation engine.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "roster_person_privlevel")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub person: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub org: i32,
    pub priv_level: PrivLevel,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::org::Entity",
        from = "Column::Org",
        to = "super::org::Column::Id",
        on_delete = "Cascade"
    )]
    Org,
}

impl ActiveModelBehavior for ActiveModel {}
