//! # Role Registry
//!
//! Role-based permissions for a Bondline deployment. Admins grant and
//! revoke roles; any holder may renounce its own. The registry is the
//! engine's [`AccessGate`]: bonding requires [`Role::Bonder`], governance
//! requires [`Role::Governor`], and the token ledger checks
//! [`Role::Minter`] before every mint and [`Role::Burner`] before every
//! burn.
//!
//! Revoking or renouncing the last admin is allowed and permanent: role
//! management is frozen from then on.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

use bondline_protocol::engine::{AccessGate, Address};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleError {
    /// Only admins may grant or revoke roles.
    #[error("{0} is not an admin")]
    NotAdmin(Address),

    #[error("invalid address: {0}")]
    InvalidAddress(Address),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Bonder,
    Burner,
    Governor,
    Minter,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Admin => "admin",
            Role::Bonder => "bonder",
            Role::Burner => "burner",
            Role::Governor => "governor",
            Role::Minter => "minter",
        };
        f.write_str(name)
    }
}

/// Serializable membership table.
pub type RoleTable = BTreeMap<Role, BTreeSet<Address>>;

/// Thread-safe role membership.
#[derive(Debug, Default)]
pub struct RoleRegistry {
    members: RwLock<RoleTable>,
}

impl RoleRegistry {
    /// Creates a registry with `admin` as its only member.
    pub fn new(admin: Address) -> Self {
        let mut table = RoleTable::new();
        table.entry(Role::Admin).or_default().insert(admin);
        Self {
            members: RwLock::new(table),
        }
    }

    pub fn has_role(&self, role: Role, who: &Address) -> bool {
        self.members
            .read()
            .get(&role)
            .is_some_and(|set| set.contains(who))
    }

    /// Grants `role` to `who`. Returns whether membership changed.
    pub fn grant_role(&self, caller: &Address, role: Role, who: &Address) -> Result<bool, RoleError> {
        if !who.is_valid() {
            return Err(RoleError::InvalidAddress(who.clone()));
        }
        let mut members = self.members.write();
        ensure_admin(&members, caller)?;
        let added = members.entry(role).or_default().insert(who.clone());
        drop(members);
        if added {
            info!(%caller, %role, %who, "role granted");
        }
        Ok(added)
    }

    /// Revokes `role` from `who`. Returns whether membership changed.
    pub fn revoke_role(&self, caller: &Address, role: Role, who: &Address) -> Result<bool, RoleError> {
        let mut members = self.members.write();
        ensure_admin(&members, caller)?;
        let removed = members.get_mut(&role).is_some_and(|set| set.remove(who));
        let admins_left = members.get(&Role::Admin).map_or(0, BTreeSet::len);
        drop(members);
        if removed {
            info!(%caller, %role, %who, "role revoked");
            if role == Role::Admin && admins_left == 0 {
                warn!("last admin revoked, role management is frozen");
            }
        }
        Ok(removed)
    }

    /// Drops `role` from the caller itself.
    pub fn renounce_role(&self, caller: &Address, role: Role) -> bool {
        let removed = self
            .members
            .write()
            .get_mut(&role)
            .is_some_and(|set| set.remove(caller));
        if removed {
            info!(%caller, %role, "role renounced");
        }
        removed
    }

    pub fn members(&self, role: Role) -> Vec<Address> {
        self.members
            .read()
            .get(&role)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> RoleTable {
        self.members.read().clone()
    }

    pub fn restore(&self, table: RoleTable) {
        *self.members.write() = table;
    }
}

fn ensure_admin(members: &RoleTable, caller: &Address) -> Result<(), RoleError> {
    match members.get(&Role::Admin) {
        Some(admins) if admins.contains(caller) => Ok(()),
        _ => {
            warn!(%caller, "role change by non-admin");
            Err(RoleError::NotAdmin(caller.clone()))
        }
    }
}

impl AccessGate for RoleRegistry {
    fn is_approved_to_bond(&self, who: &Address) -> bool {
        self.has_role(Role::Bonder, who)
    }

    fn is_governor(&self, who: &Address) -> bool {
        self.has_role(Role::Governor, who)
    }
}
