use sea_orm::entity::prelude::*;

/// How holding a role relates to membership of a list.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "roster_list_role")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub list: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub role: i32,
    /// Holders may post to the list
    pub sender: bool,
    pub sub_model: SubModel,
}

/// Subscription policy for holders of a role, weakest first.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
pub enum SubModel {
    /// Holding the role gives no subscription rights
    #[sea_orm(num_value = 0)]
    NoSub,
    /// Holders may subscribe themselves
    #[sea_orm(num_value = 1)]
    AllowSub,
    /// Holders are subscribed, and are warned before losing the role unsubscribes them
    #[sea_orm(num_value = 2)]
    WarnSub,
    /// Holders are subscribed
    #[sea_orm(num_value = 3)]
    AutoSub,
}

impl SubModel {
    /// Whether holders are subscribed without asking.
    pub fn is_automatic(self) -> bool {
        matches!(self, SubModel::WarnSub | SubModel::AutoSub)
    }
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
    #[sea_orm(
        belongs_to = "super::role::Entity",
        from = "Column::Role",
        to = "super::role::Column::Id",
        on_delete = "Cascade"
    )]
    Role,
}

impl ActiveModelBehavior for ActiveModel {}
