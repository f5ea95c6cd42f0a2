//! Service wiring: store selection, hashing/signing primitives, and the
//! access-control services the handlers call.

use std::sync::Arc;

use anyhow::Context;

use gatekeep_auth::{Argon2PasswordHasher, Hs256TokenSigner, PasswordHasher};
use gatekeep_core::{GroupRoleEdge, RolePermissionEdge, UserGroupEdge, UserRoleEdge};
use gatekeep_infra::store::{InMemoryStore, PgStore, RbacStore};
use gatekeep_infra::{
    seed_if_empty, AuthGateway, CascadeCoordinator, Directory, EdgeReconciler, PermissionResolver,
};

use crate::config::AppConfig;

pub type SharedStore = Arc<dyn RbacStore>;

/// Everything a handler may call, shared across requests.
pub struct AppServices {
    pub gateway: AuthGateway<SharedStore>,
    pub directory: Directory<SharedStore>,
    pub resolver: PermissionResolver<SharedStore>,
    pub cascade: CascadeCoordinator<SharedStore>,
    pub user_roles: EdgeReconciler<UserRoleEdge, SharedStore>,
    pub user_groups: EdgeReconciler<UserGroupEdge, SharedStore>,
    pub group_roles: EdgeReconciler<GroupRoleEdge, SharedStore>,
    pub role_permissions: EdgeReconciler<RolePermissionEdge, SharedStore>,
}

/// Wire services over an already opened store.
pub fn build_services(store: SharedStore, hasher: Arc<dyn PasswordHasher>, config: &AppConfig) -> AppServices {
    let signer = Arc::new(Hs256TokenSigner::new(config.jwt_secret.as_bytes()));

    AppServices {
        gateway: AuthGateway::new(store.clone(), hasher.clone(), signer, config.token_ttl),
        directory: Directory::new(store.clone(), hasher),
        resolver: PermissionResolver::new(store.clone()),
        cascade: CascadeCoordinator::new(store.clone()),
        user_roles: EdgeReconciler::new(store.clone()),
        user_groups: EdgeReconciler::new(store.clone()),
        group_roles: EdgeReconciler::new(store.clone()),
        role_permissions: EdgeReconciler::new(store),
    }
}

/// Postgres when `DATABASE_URL` is set (schema ensured), in-memory otherwise.
pub async fn open_store(config: &AppConfig) -> anyhow::Result<SharedStore> {
    match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.database_max_connections)
                .await
                .context("failed to connect to Postgres")?;
            store.migrate().await.context("failed to ensure schema")?;
            tracing::info!("using Postgres store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store (data is lost on exit)");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

/// Full startup path used by the binary: open the store, seed it if asked,
/// and wire the services.
pub async fn build_from_config(config: &AppConfig) -> anyhow::Result<Arc<AppServices>> {
    let store = open_store(config).await?;
    let hasher: Arc<dyn PasswordHasher> = Arc::new(Argon2PasswordHasher::default());

    if config.seed_on_startup {
        let seeded = seed_if_empty(&store, hasher.as_ref(), &config.seed_password)
            .await
            .context("seeding failed")?;
        if seeded {
            tracing::info!("bootstrap data seeded");
        }
    }

    Ok(Arc::new(build_services(store, hasher, config)))
}
