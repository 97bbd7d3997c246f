#![deny(
    missing_debug_implementations,
    clippy::print_stderr,
    clippy::print_stdout
)]

//! # roster-rbac
//!
//! The role and privilege engine of a membership portal, on top of SeaORM.
//!
//! Administrators assign roles to people explicitly. Roles imply other roles, and grant an
//! ordered [`PrivLevel`] on an organizational unit. From these the engine derives, in one
//! transaction:
//!
//! + the implicit role assignments (transitive closure of the explicit ones)
//! + each person's privilege level per org, after the fixed [`ElevationRule`]s
//! + sender and subscriber rights on mailing / text lists
//!
//! A cycle among implications is a rejected edit, never a silently truncated closure.
//!
//! ```ignore
//! let mut ctx = RosterContext::begin(&db, EngineConfig::load()?).await?;
//! let leader = ctx
//!     .save_role(None, RoleDef::new("Team leader").level(org, PrivLevel::Leader))
//!     .await?;
//! let captain = ctx.save_role(None, RoleDef::new("Captain")).await?;
//! ctx.add_implication(captain, leader).await?;
//! ctx.assign_role(person, captain).await?;
//! assert!(ctx.has_privilege(person, org, PrivLevel::Leader).await?);
//! ctx.commit().await?;
//! ```

pub mod access;
pub mod closure;
pub mod config;
mod context;
pub mod entity;
mod error;
pub mod graph;
mod ids;
pub mod privilege;
pub mod recalc;
pub mod schema;

pub use config::EngineConfig;
pub use context::*;
pub use error::*;
pub use graph::RoleGraph;
pub use ids::*;
pub use privilege::{PrivLevel, PrivilegeMap, PrivilegeValue, TeamPrivileges};
pub use recalc::{ElevationRule, RecalcReport, recalculate};
