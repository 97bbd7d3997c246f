use super::{GraphSnapshot, RoleGraph};
use crate::entity::{org, role, role_implies, team, team_privilege};
use crate::error::RbacError;
use sea_orm::{ConnectionTrait, EntityTrait, QueryOrder};

impl GraphSnapshot {
    /// Read every table the graph is built from. Call inside the transaction the graph will
    /// serve, so all reads come from one snapshot.
    pub async fn load<C: ConnectionTrait>(db: &C) -> Result<Self, RbacError> {
        let orgs = org::Entity::find()
            .order_by_asc(org::Column::Id)
            .all(db)
            .await?;
        let roles = role::Entity::find()
            .order_by_asc(role::Column::Id)
            .all(db)
            .await?;
        let role_implies = role_implies::Entity::find().all(db).await?;
        let teams = team::Entity::find()
            .order_by_asc(team::Column::Id)
            .all(db)
            .await?;
        let team_privileges = team_privilege::Entity::find().all(db).await?;

        Ok(Self {
            orgs,
            roles,
            role_implies,
            teams,
            team_privileges,
        })
    }
}

impl RoleGraph {
    pub async fn load<C: ConnectionTrait>(db: &C) -> Result<Self, RbacError> {
        let snapshot = GraphSnapshot::load(db).await?;
        let graph = Self::from_snapshot(snapshot)?;
        tracing::debug!(
            roles = graph.roles.len(),
            orgs = graph.orgs.len(),
            teams = graph.teams.len(),
            "role graph loaded"
        );
        Ok(graph)
    }
}
