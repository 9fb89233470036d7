use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{ServiceError, ServiceResult};
use crate::identity::{IdentityProvider, NewIdentityAccount};
use crate::metrics;
use crate::models::{DeletionReport, UserAccount, UserType};
use crate::store::{DocumentStore, MAX_BATCH_SIZE};

/// Every (collection, owner field) relation swept by a full account
/// deletion. Processed in order; each entry independently.
pub const OWNERSHIP_TABLE: &[(&str, &str)] = &[
    ("users", "uid"),
    ("transactions", "userId"),
    ("transactions", "clientId"),
    ("transactions", "driverId"),
    ("transactions", "assignedDriverId"),
    ("appointments", "userId"),
    ("workShifts", "userId"),
    ("vehicles", "userId"),
    ("notifications", "userId"),
    ("notificationSettings", "userId"),
    ("subscriptions", "userId"),
    ("deliveries", "userId"),
    ("deliveries", "clientId"),
    ("deliveries", "driverId"),
];

/// Admin status is read from the profile document on every call; it can be
/// revoked between calls, so results are never cached.
pub struct AdminGuard {
    store: Arc<dyn DocumentStore>,
}

impl AdminGuard {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn is_admin(&self, uid: &str) -> Result<bool> {
        let user = self.store.get_user(uid).await?;
        Ok(matches!(
            user,
            Some(UserAccount {
                user_type: UserType::Admin,
                ..
            })
        ))
    }

    pub async fn require_admin(&self, caller_uid: &str) -> ServiceResult<()> {
        if self.is_admin(caller_uid).await? {
            Ok(())
        } else {
            Err(ServiceError::PermissionDenied(format!(
                "caller {} is not an administrator",
                caller_uid
            )))
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUserInput {
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub user_type: UserType,
    pub is_active: Option<bool>,
    pub is_online: Option<bool>,
}

/// Creates an identity-provider account plus its profile document. The new
/// account is never signed in as the caller's session; that is the point of
/// doing this server-side.
pub struct ProvisioningService {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    guard: AdminGuard,
}

impl ProvisioningService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        guard: AdminGuard,
    ) -> Self {
        Self {
            store,
            identity,
            guard,
        }
    }

    pub async fn create_user(&self, caller_uid: &str, input: NewUserInput) -> ServiceResult<String> {
        self.guard.require_admin(caller_uid).await?;

        let is_active = input.is_active.unwrap_or(true);
        let uid = self
            .identity
            .create_account(&NewIdentityAccount {
                email: input.email.clone(),
                password: input.password,
                display_name: input.display_name.clone(),
                disabled: !is_active,
            })
            .await?;

        let user = UserAccount {
            uid: uid.clone(),
            display_name: input.display_name,
            email: input.email,
            user_type: input.user_type,
            phone: input.phone.unwrap_or_default(),
            company_name: input.company_name.unwrap_or_default(),
            is_active,
            is_online: input.is_online.unwrap_or(false),
            created_at: Utc::now(),
        };

        // Best-effort: if this write fails the identity account stays behind,
        // mirroring the no-rollback stance of the deletion sweep
        self.store.insert_user(&user).await?;

        info!(uid = %uid, user_type = ?user.user_type, "Provisioned new user");
        Ok(uid)
    }
}

/// Sweeps every ownership relation for a user and then deletes the identity
/// account, accumulating per-step errors instead of aborting. Re-running
/// after a partial failure is the retry mechanism: emptied collections
/// simply match nothing.
pub struct DeletionOrchestrator {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    guard: AdminGuard,
}

impl DeletionOrchestrator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        guard: AdminGuard,
    ) -> Self {
        Self {
            store,
            identity,
            guard,
        }
    }

    pub async fn delete_user_completely(
        &self,
        caller_uid: &str,
        user_id: &str,
        user_type: &str,
    ) -> ServiceResult<DeletionReport> {
        if user_id.is_empty() || user_type.is_empty() {
            return Err(ServiceError::InvalidArgument(
                "userId and userType are required".to_string(),
            ));
        }
        self.guard.require_admin(caller_uid).await?;

        info!(user_id = %user_id, user_type = %user_type, "Starting full account deletion");

        let mut deleted_count: u64 = 0;
        let mut errors = Vec::new();

        for (collection, field) in OWNERSHIP_TABLE {
            match self.sweep(collection, field, user_id).await {
                Ok(0) => {}
                Ok(n) => {
                    info!(collection = %collection, field = %field, deleted = n, "Swept collection");
                    deleted_count += n;
                }
                Err(e) => {
                    error!(collection = %collection, field = %field, error = %e, "Sweep failed, continuing");
                    errors.push(format!("{}: {}", collection, e));
                }
            }
        }

        let auth_deleted = match self.identity.delete_account(user_id).await {
            Ok(()) => true,
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Identity account deletion failed");
                errors.push(format!("auth: {}", e));
                false
            }
        };

        metrics::DOCUMENTS_DELETED.inc_by(deleted_count as f64);
        if !errors.is_empty() {
            warn!(
                user_id = %user_id,
                deleted = deleted_count,
                error_count = errors.len(),
                "Account deletion finished with errors"
            );
        }

        let success = errors.is_empty();
        Ok(DeletionReport {
            deleted_count,
            errors,
            auth_deleted,
            success,
        })
    }

    async fn sweep(&self, collection: &str, field: &str, value: &str) -> Result<u64> {
        let ids = self.store.find_ids_by_field(collection, field, value).await?;
        let mut deleted = 0;
        for chunk in ids.chunks(MAX_BATCH_SIZE) {
            deleted += self.store.delete_batch(collection, chunk).await?;
        }
        Ok(deleted)
    }
}
