//! Privilege values and the sparse maps that hold them.
//!
//! Two representations are in use: ordered [`PrivLevel`]s, granted by roles within an
//! organizational unit, and [`TeamPrivileges`] bitmasks, granted by one team over another.
//! Both merge through [`PrivilegeValue::join`], so every closure in this crate is written once
//! over [`PrivilegeMap`].

use bitflags::bitflags;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A value that can be granted by several sources at once and merged.
///
/// `join` must be associative, commutative and idempotent with `MIN` as identity; the closure
/// fixpoint relies on it to be independent of the order edges are visited in.
pub trait PrivilegeValue: Copy + Eq + fmt::Debug {
    /// The value of a key absent from a map.
    const MIN: Self;

    /// The most permissive combination of two grants.
    fn join(self, other: Self) -> Self;

    /// Whether holding `self` satisfies a requirement of `required`.
    fn covers(self, required: Self) -> bool {
        self.join(required) == self
    }
}

/// Ordered privilege level on an organizational unit. Greater levels contain all lower ones.
#[derive(
    Debug,
    Default,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
#[serde(rename_all = "lowercase")]
pub enum PrivLevel {
    #[default]
    #[sea_orm(num_value = 0)]
    None,
    #[sea_orm(num_value = 1)]
    Student,
    #[sea_orm(num_value = 2)]
    Member,
    #[sea_orm(num_value = 3)]
    Contributor,
    #[sea_orm(num_value = 4)]
    Leader,
    #[sea_orm(num_value = 5)]
    Master,
}

impl PrivLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivLevel::None => "none",
            PrivLevel::Student => "student",
            PrivLevel::Member => "member",
            PrivLevel::Contributor => "contributor",
            PrivLevel::Leader => "leader",
            PrivLevel::Master => "master",
        }
    }
}

impl fmt::Display for PrivLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PrivLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "none" => PrivLevel::None,
            "student" => PrivLevel::Student,
            "member" => PrivLevel::Member,
            "contributor" => PrivLevel::Contributor,
            "leader" => PrivLevel::Leader,
            "master" => PrivLevel::Master,
            other => return Err(format!("unknown privilege level `{other}`")),
        })
    }
}

impl PrivilegeValue for PrivLevel {
    const MIN: Self = PrivLevel::None;

    fn join(self, other: Self) -> Self {
        self.max(other)
    }

    fn covers(self, required: Self) -> bool {
        self >= required
    }
}

bitflags! {
    /// Privileges one team holds over another.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TeamPrivileges: u32 {
        /// See the target team and its roster.
        const VIEW = 1 << 0;
        /// Add and remove members of the target team.
        const EDIT_ROSTER = 1 << 1;
        /// Schedule events for the target team.
        const MANAGE_EVENTS = 1 << 2;
        /// Send messages to the target team.
        const SEND_MESSAGES = 1 << 3;
        /// Everything, including editing the target team itself.
        const ADMIN = 1 << 4;
    }
}

impl TeamPrivileges {
    /// Stored form. Unknown bits written by a newer schema are dropped on read.
    pub fn from_column(bits: i32) -> Self {
        Self::from_bits_truncate(bits as u32)
    }

    pub fn to_column(self) -> i32 {
        self.bits() as i32
    }
}

impl PrivilegeValue for TeamPrivileges {
    const MIN: Self = TeamPrivileges::empty();

    fn join(self, other: Self) -> Self {
        self | other
    }

    fn covers(self, required: Self) -> bool {
        self.contains(required)
    }
}

/// Sparse map from a target (org, team, ...) to the privilege held on it.
///
/// Keys whose value is `V::MIN` are never stored, so two maps granting the same privileges are
/// equal.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivilegeMap<K, V> {
    entries: BTreeMap<K, V>,
}

impl<K, V> Default for PrivilegeMap<K, V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for PrivilegeMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl<K, V> PrivilegeMap<K, V>
where
    K: Ord + Copy,
    V: PrivilegeValue,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, target: K) -> V {
        self.entries.get(&target).copied().unwrap_or(V::MIN)
    }

    /// Overwrite the value held on `target`.
    pub fn set(&mut self, target: K, value: V) {
        if value == V::MIN {
            self.entries.remove(&target);
        } else {
            self.entries.insert(target, value);
        }
    }

    /// Raise the value held on `target` to at least `value`. Returns whether it changed.
    pub fn grant(&mut self, target: K, value: V) -> bool {
        let current = self.get(target);
        let joined = current.join(value);
        if joined == current {
            return false;
        }
        self.set(target, joined);
        true
    }

    /// A new map holding, for every key of either input, the join of both values.
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        merged.merge_from(other);
        merged
    }

    /// In-place [`merge`](Self::merge). Returns whether anything changed.
    pub fn merge_from(&mut self, other: &Self) -> bool {
        let mut changed = false;
        for (target, value) in other.iter() {
            changed |= self.grant(target, value);
        }
        changed
    }

    pub fn covers(&self, target: K, required: V) -> bool {
        self.get(target).covers(required)
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, V)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for PrivilegeMap<K, V>
where
    K: Ord + Copy,
    V: PrivilegeValue,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (target, value) in iter {
            map.grant(target, value);
        }
        map
    }
}
