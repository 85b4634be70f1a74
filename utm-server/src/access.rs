//! Bearer-token authentication and drone visibility.
//!
//! The server never manages accounts; it only resolves an opaque API token
//! to a principal and a drone scope. Admins see every drone, owners see
//! their own.

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::Db;
use crate::hub::DroneScope;

/// An authenticated caller.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub name: String,
    pub is_admin: bool,
}

#[async_trait]
pub trait AccessPolicy: Send + Sync {
    /// Resolve a bearer token. `None` means unauthenticated.
    async fn authenticate(&self, token: &str) -> Option<Principal>;

    /// Which drones the principal may observe or submit for. Admin scope
    /// is `All` so drones registered later are covered without
    /// re-subscribing.
    async fn drone_scope(&self, principal: &Principal) -> DroneScope;
}

#[async_trait]
impl AccessPolicy for Db {
    async fn authenticate(&self, token: &str) -> Option<Principal> {
        let db = self.clone();
        let token = token.to_string();
        let row = tokio::task::spawn_blocking(move || db.find_user_by_token(&token))
            .await
            .ok()??;
        Some(Principal {
            user_id: row.id,
            name: row.name,
            is_admin: row.is_admin,
        })
    }

    async fn drone_scope(&self, principal: &Principal) -> DroneScope {
        if principal.is_admin {
            return DroneScope::All;
        }
        let db = self.clone();
        let owner = principal.user_id;
        let ids = tokio::task::spawn_blocking(move || db.owned_drone_ids(owner))
            .await
            .ok()
            .and_then(|r| r.ok())
            .unwrap_or_default();
        DroneScope::Only(ids.into_iter().collect())
    }
}

/// May the principal act on this drone?
pub fn scope_allows(scope: &DroneScope, drone_id: &Uuid) -> bool {
    match scope {
        DroneScope::All => true,
        DroneScope::Only(ids) => ids.contains(drone_id),
    }
}

/// Pull the token out of an `Authorization: Bearer ...` header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header?.strip_prefix("Bearer ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
