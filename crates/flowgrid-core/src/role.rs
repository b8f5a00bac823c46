//! Part roles and the [`RoleSet`] bit set.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a part does during a network tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Pushes held resource toward storage.
    Producer,
    /// Receives resource and uses it up through a [`ConsumerHook`](crate::network::ConsumerHook).
    Consumer,
    /// Buffers resource between producers and consumers.
    Storage,
    /// Pulls resource from storage until a target fill is reached.
    Requester,
    /// A pipe or wire segment. Carries nothing itself.
    Transmitter,
    /// Enables networks of families that require one.
    Controller,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Producer,
        Role::Consumer,
        Role::Storage,
        Role::Requester,
        Role::Transmitter,
        Role::Controller,
    ];

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Bit set of [`Role`]s carried by one part.
///
/// ```
/// use flowgrid_core::role::{Role, RoleSet};
///
/// let roles = RoleSet::STORAGE.union(RoleSet::REQUESTER);
/// assert!(roles.contains(Role::Storage));
/// assert!(!roles.contains(Role::Producer));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RoleSet(u8);

impl RoleSet {
    pub const EMPTY: Self = Self(0);
    pub const PRODUCER: Self = Self(Role::Producer.bit());
    pub const CONSUMER: Self = Self(Role::Consumer.bit());
    pub const STORAGE: Self = Self(Role::Storage.bit());
    pub const REQUESTER: Self = Self(Role::Requester.bit());
    pub const TRANSMITTER: Self = Self(Role::Transmitter.bit());
    pub const CONTROLLER: Self = Self(Role::Controller.bit());

    #[must_use]
    pub fn of(roles: &[Role]) -> Self {
        roles.iter().fold(Self::EMPTY, |set, r| set.with(*r))
    }

    #[must_use]
    pub const fn with(self, role: Role) -> Self {
        Self(self.0 | role.bit())
    }

    #[must_use]
    pub const fn union(self, other: RoleSet) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn contains(self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    #[must_use]
    pub const fn intersects(self, other: RoleSet) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Exactly `{Transmitter}`: a plain pipe segment.
    #[must_use]
    pub const fn is_transmitter_only(self) -> bool {
        self.0 == Role::Transmitter.bit()
    }

    /// Roles in declaration order.
    pub fn iter(self) -> impl Iterator<Item = Role> {
        Role::ALL.into_iter().filter(move |r| self.contains(*r))
    }
}

impl fmt::Debug for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<T: IntoIterator<Item = Role>>(iter: T) -> Self {
        iter.into_iter().fold(Self::EMPTY, |set, r| set.with(r))
    }
}
