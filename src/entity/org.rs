use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "roster_org")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Stable symbolic name, e.g. `admin`
    #[sea_orm(unique)]
    pub tag: Option<String>,
    pub name: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
