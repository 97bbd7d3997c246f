use crate::ids::{ListId, OrgId, PersonId, RoleId, TeamId};
use sea_orm::DbErr;
use std::fmt::Display;
use thiserror::Error;

/// An error from the role engine. Every variant aborts the enclosing transaction.
#[derive(Error, Debug)]
pub enum RbacError {
    #[error("Database Error: {0}")]
    Db(#[from] DbErr),
    #[error("Role Not Found: {0}")]
    RoleNotFound(String),
    #[error("Org Not Found: {0}")]
    OrgNotFound(String),
    #[error("Team Not Found: {0}")]
    TeamNotFound(String),
    #[error("List Not Found: {0}")]
    ListNotFound(String),
    #[error("Role implication would create a cycle: {}", path(.0))]
    RoleCycle(Vec<RoleId>),
    #[error("Team hierarchy would create a cycle: {}", path(.0))]
    TeamCycle(Vec<TeamId>),
    #[error("Closure did not converge after {0} passes")]
    NoConvergence(usize),
    #[error("Edge {from} -> {to} references an unknown {kind}")]
    DanglingEdge {
        kind: &'static str,
        from: String,
        to: String,
    },
    #[error("Role {0} can only be held by implication")]
    ImplicitOnlyRole(RoleId),
    #[error("{person} holds {role} only by implication; remove the implying role instead")]
    ImplicitAssignment { person: PersonId, role: RoleId },
    #[error("Tag `{0}` is already in use")]
    DuplicateTag(String),
    #[error("Name `{0}` is already in use")]
    DuplicateName(String),
    #[error("Invariant violated: {0}")]
    Invariant(String),
    #[error("Configuration Error: {0}")]
    Config(String),
}

/// The three classes of failure a recalculation can end with.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The stored role data is unusable, e.g. a cycle or a dangling reference. Reported back to
    /// the administrator as a rejected edit.
    Configuration,
    /// Reading or writing the store failed.
    Storage,
    /// The engine produced an inconsistent result. Never corrected silently.
    Invariant,
}

impl RbacError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RbacError::Db(_) => ErrorKind::Storage,
            RbacError::Invariant(_) | RbacError::NoConvergence(_) => ErrorKind::Invariant,
            _ => ErrorKind::Configuration,
        }
    }

    /// Whether the error is a rejected edit the administrator can correct.
    pub fn is_rejected_edit(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    pub(crate) fn role_not_found(id: impl Display) -> Self {
        RbacError::RoleNotFound(id.to_string())
    }

    pub(crate) fn org_not_found(id: OrgId) -> Self {
        RbacError::OrgNotFound(id.to_string())
    }

    pub(crate) fn team_not_found(id: TeamId) -> Self {
        RbacError::TeamNotFound(id.to_string())
    }

    pub(crate) fn list_not_found(id: ListId) -> Self {
        RbacError::ListNotFound(id.to_string())
    }
}

fn path<T: Display>(nodes: &[T]) -> String {
    nodes
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cycle_message_names_path() {
        let err = RbacError::RoleCycle(vec![RoleId(3), RoleId(4), RoleId(3)]);
        assert_eq!(
            err.to_string(),
            "Role implication would create a cycle: role#3 -> role#4 -> role#3"
        );
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.is_rejected_edit());
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            RbacError::Db(DbErr::Custom("boom".into())).kind(),
            ErrorKind::Storage
        );
        assert_eq!(
            RbacError::Invariant("disabled person kept a level".into()).kind(),
            ErrorKind::Invariant
        );
    }
}
