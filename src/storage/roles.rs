//! The fixed sharing-role hierarchy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Access level carried by a permission grant, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Reader,
    Commenter,
    Writer,
    FileOwner,
    Organizer,
    Owner,
}

impl Role {
    /// Every role, ordered by rank.
    pub const ALL: [Role; 6] = [
        Role::Reader,
        Role::Commenter,
        Role::Writer,
        Role::FileOwner,
        Role::Organizer,
        Role::Owner,
    ];

    pub fn rank(self) -> u8 {
        match self {
            Role::Reader => 0,
            Role::Commenter => 1,
            Role::Writer => 2,
            Role::FileOwner => 3,
            Role::Organizer => 4,
            Role::Owner => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Reader => "READER",
            Role::Commenter => "COMMENTER",
            Role::Writer => "WRITER",
            Role::FileOwner => "FILE_OWNER",
            Role::Organizer => "ORGANIZER",
            Role::Owner => "OWNER",
        }
    }

    /// True when a grant of `self` is enough for a check requiring `required`.
    pub fn satisfies(self, required: Role) -> bool {
        self.rank() >= required.rank()
    }

    /// The closed upward set of roles that satisfy `self`.
    pub fn satisfied_by(self) -> &'static [Role] {
        let all: &'static [Role] = &Role::ALL;
        &all[self.rank() as usize..]
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role: {}", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// A role check parsed from caller input.
///
/// Known roles resolve "at least" the named role. Anything else falls back to
/// an exact string match, which never errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleRequirement {
    AtLeast(Role),
    Exact(String),
}

impl RoleRequirement {
    pub fn parse(required: &str) -> Self {
        match required.parse::<Role>() {
            Ok(role) => RoleRequirement::AtLeast(role),
            Err(UnknownRole(raw)) => RoleRequirement::Exact(raw),
        }
    }

    pub fn is_satisfied_by(&self, granted: Role) -> bool {
        match self {
            RoleRequirement::AtLeast(required) => granted.satisfies(*required),
            RoleRequirement::Exact(raw) => granted.as_str() == raw,
        }
    }

    /// Roles accepted by this requirement, weakest first.
    pub fn accepted_roles(&self) -> Vec<Role> {
        match self {
            RoleRequirement::AtLeast(required) => required.satisfied_by().to_vec(),
            RoleRequirement::Exact(raw) => raw.parse::<Role>().into_iter().collect(),
        }
    }
}
