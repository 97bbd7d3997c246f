//! Tables owned by the role engine.
//!
//! `role`, `role_implies`, `team`, `team_privilege`, `list_role` and the explicit rows of
//! `person_role` are edited by administrators. The implicit rows of `person_role`,
//! `person_privlevel`, and the `sender` / `sub` flags of `list_person` are derived and
//! rewritten by every recalculation.

pub mod list;
pub mod list_person;
pub mod list_role;
pub mod org;
pub mod person_privlevel;
pub mod person_role;
pub mod role;
pub mod role_implies;
pub mod team;
pub mod team_privilege;
