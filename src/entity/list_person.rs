use sea_orm::entity::prelude::*;

/// Rights of a person on a list. `sender` and `sub` are derived from held roles; `unsub` is
/// recorded by the person and never touched by recalculation.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "roster_list_person")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub list: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub person: i32,
    pub sender: bool,
    pub sub: bool,
    pub unsub: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::list::Entity",
        from = "Column::List",
        to = "super::list::Column::Id",
        on_delete = "Cascade"
    )]
    List,
}

impl ActiveModelBehavior for ActiveModel {}
