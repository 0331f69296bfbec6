//! User directory boundary.
//!
//! Identity management lives outside this system; the vault only needs
//! to confirm that share targets exist and to resolve a user's family
//! group for share-with-group.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

use stratavault_common::{Result, UserId};

/// Lookup interface onto the external identity system.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Whether a user id refers to a real platform identity.
    async fn user_exists(&self, uid: &UserId) -> Result<bool>;

    /// Members of the family group the user belongs to, including the
    /// user; `None` when the user belongs to no group.
    async fn group_members(&self, uid: &UserId) -> Result<Option<Vec<UserId>>>;
}

/// Fixed directory for tests and development.
#[derive(Default)]
pub struct StaticDirectory {
    users: HashSet<UserId>,
    groups: HashMap<UserId, Vec<UserId>>,
}

impl StaticDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user.
    pub fn with_user(mut self, uid: UserId) -> Self {
        self.users.insert(uid);
        self
    }

    /// Register a group; every member is also registered as a user.
    pub fn with_group(mut self, members: Vec<UserId>) -> Self {
        for member in &members {
            self.users.insert(member.clone());
            self.groups.insert(member.clone(), members.clone());
        }
        self
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn user_exists(&self, uid: &UserId) -> Result<bool> {
        Ok(self.users.contains(uid))
    }

    async fn group_members(&self, uid: &UserId) -> Result<Option<Vec<UserId>>> {
        Ok(self.groups.get(uid).cloned())
    }
}
