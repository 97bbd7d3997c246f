use crate::privilege::PrivLevel;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "roster_role")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Stable symbolic name, e.g. `webmaster` or `disabled`
    #[sea_orm(unique)]
    pub tag: Option<String>,
    pub name: String,
    pub title: String,
    /// Organizational unit on which `priv_level` is granted
    pub org: Option<i32>,
    /// Owning team, for roles belonging to the team hierarchy
    pub team: Option<i32>,
    pub priv_level: PrivLevel,
    /// Lower is more senior
    pub priority: i32,
    /// Can only be held through an implication, never assigned directly
    pub implicit_only: bool,
    /// Offered as a focus / grouping role
    pub filter: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::org::Entity",
        from = "Column::Org",
        to = "super::org::Column::Id"
    )]
    Org,
    #[sea_orm(
        belongs_to = "super::team::Entity",
        from = "Column::Team",
        to = "super::team::Column::Id"
    )]
    Team,
}

impl Related<super::org::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Org.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
