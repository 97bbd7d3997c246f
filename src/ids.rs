//! Typed identifiers used by the graph, closure and recalculation code.
//!
//! Entity rows carry plain `i32` keys; these wrappers keep a person id from being
//! passed where a role id is expected once the rows are loaded into memory.

use derive_more::From;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, From, Serialize, Deserialize,
        )]
        pub struct $name(pub i32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", $prefix, self.0)
            }
        }

        impl From<$name> for i32 {
            fn from(id: $name) -> i32 {
                id.0
            }
        }
    };
}

id_type!(
    /// A person; people live outside this crate, only their id is stored.
    PersonId,
    "person"
);
id_type!(RoleId, "role");
id_type!(
    /// An organizational unit, the scope of a privilege level.
    OrgId,
    "org"
);
id_type!(TeamId, "team");
id_type!(ListId, "list");
