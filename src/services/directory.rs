//! External collaborators: the child-access service (who holds which care
//! role on a child record) and the user directory (display names for
//! send-time denormalization). Both are out-of-process systems in a full
//! deployment; the trait seams keep this crate testable and let the
//! embedding application plug in its own clients. Static in-memory
//! implementations are provided for tests and local use.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Care roles a user can hold on one child's access record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChildRoles {
    pub is_owner: bool,
    pub is_partner: bool,
    pub is_caregiver: bool,
    pub is_therapist: bool,
}

impl ChildRoles {
    pub fn any(self) -> bool {
        self.is_owner || self.is_partner || self.is_caregiver || self.is_therapist
    }

    pub fn owner() -> Self {
        Self {
            is_owner: true,
            ..Self::default()
        }
    }

    pub fn caregiver() -> Self {
        Self {
            is_caregiver: true,
            ..Self::default()
        }
    }

    pub fn therapist() -> Self {
        Self {
            is_therapist: true,
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait ChildAccess: Send + Sync {
    /// Roles `user_id` holds on `child_id`; all-false when none.
    async fn child_roles(&self, user_id: Uuid, child_id: Uuid) -> AppResult<ChildRoles>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn display_name(&self, user_id: Uuid) -> AppResult<String>;
}

/// In-memory child-access table.
#[derive(Debug, Default)]
pub struct StaticChildAccess {
    grants: RwLock<HashMap<(Uuid, Uuid), ChildRoles>>,
}

impl StaticChildAccess {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn grant(&self, user_id: Uuid, child_id: Uuid, roles: ChildRoles) {
        self.grants.write().await.insert((user_id, child_id), roles);
    }

    pub async fn revoke(&self, user_id: Uuid, child_id: Uuid) {
        self.grants.write().await.remove(&(user_id, child_id));
    }
}

#[async_trait]
impl ChildAccess for StaticChildAccess {
    async fn child_roles(&self, user_id: Uuid, child_id: Uuid) -> AppResult<ChildRoles> {
        let guard = self.grants.read().await;
        Ok(guard.get(&(user_id, child_id)).copied().unwrap_or_default())
    }
}

/// In-memory user directory.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    names: RwLock<HashMap<Uuid, String>>,
}

impl StaticDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn register(&self, user_id: Uuid, name: &str) {
        self.names.write().await.insert(user_id, name.to_string());
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn display_name(&self, user_id: Uuid) -> AppResult<String> {
        let guard = self.names.read().await;
        guard
            .get(&user_id)
            .cloned()
            .ok_or(AppError::NotFound("user"))
    }
}
