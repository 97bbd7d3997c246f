use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "roster_team")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// `None`, or the team itself, at the root
    pub parent: Option<i32>,
    #[sea_orm(unique)]
    pub tag: Option<String>,
    pub name: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
