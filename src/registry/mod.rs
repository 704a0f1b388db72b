//! Connection registry.
//!
//! Holds the committed profile set as an immutable snapshot that readers
//! clone cheaply. Mutations are serialized by a single writer lock: copy the
//! snapshot, change it, persist it, then publish it.

pub mod store;

use crate::db::pool::PoolManager;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionDraft, ConnectionProfile, ProbeOutcome};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

pub use store::ProfileStore;

pub struct ConnectionRegistry {
    store: ProfileStore,
    snapshot: RwLock<Arc<Vec<ConnectionProfile>>>,
    writer: Mutex<()>,
    pools: Arc<PoolManager>,
    probe_timeout: Duration,
}

impl ConnectionRegistry {
    /// Load the stored profiles.
    pub async fn open(
        store: ProfileStore,
        pools: Arc<PoolManager>,
        probe_timeout: Duration,
    ) -> DbResult<Self> {
        let profiles = store.load().await?;
        info!(
            path = %store.path().display(),
            count = profiles.len(),
            "Loaded connection profiles"
        );
        Ok(Self {
            store,
            snapshot: RwLock::new(Arc::new(profiles)),
            writer: Mutex::new(()),
            pools,
            probe_timeout,
        })
    }

    /// Validate, probe and persist a new profile.
    ///
    /// Nothing is stored unless the live probe succeeds. A new default clears
    /// the flag on every other profile in the same write.
    pub async fn create(&self, draft: ConnectionDraft) -> DbResult<ConnectionProfile> {
        draft.validate()?;
        let profile = draft.into_profile();

        let outcome = self
            .pools
            .probe_profile(&profile, self.probe_timeout)
            .await?;
        if let Some(err) = outcome.into_error() {
            return Err(err);
        }

        let created = profile.clone();
        self.mutate(move |profiles| {
            if profile.is_default {
                clear_default(profiles);
            }
            profiles.push(profile);
            Ok(())
        })
        .await?;

        info!(
            connection_id = %created.id,
            engine = %created.engine,
            is_default = created.is_default,
            "Created connection"
        );
        Ok(created)
    }

    /// Probe a draft without storing it.
    pub async fn test(&self, draft: ConnectionDraft) -> DbResult<ProbeOutcome> {
        draft.validate()?;
        let profile = draft.into_profile();
        self.pools.probe_profile(&profile, self.probe_timeout).await
    }

    /// Every stored profile, secrets included.
    pub async fn list(&self) -> Arc<Vec<ConnectionProfile>> {
        Arc::clone(&*self.snapshot.read().await)
    }

    pub async fn get(&self, id: &str) -> DbResult<ConnectionProfile> {
        self.snapshot
            .read()
            .await
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| DbError::not_found(id))
    }

    pub async fn get_default(&self) -> Option<ConnectionProfile> {
        self.snapshot
            .read()
            .await
            .iter()
            .find(|p| p.is_default)
            .cloned()
    }

    /// Make `id` the only default profile.
    pub async fn set_default(&self, id: &str) -> DbResult<ConnectionProfile> {
        let updated = self
            .mutate(|profiles| {
                let idx = profiles
                    .iter()
                    .position(|p| p.id == id)
                    .ok_or_else(|| DbError::not_found(id))?;
                clear_default(profiles);
                let profile = &mut profiles[idx];
                profile.is_default = true;
                profile.updated_at = Utc::now();
                Ok(profile.clone())
            })
            .await?;

        info!(connection_id = %id, "Set default connection");
        Ok(updated)
    }

    /// Remove `id` and tear down its cached pool. No other profile becomes
    /// default.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        self.mutate(|profiles| {
            let idx = profiles
                .iter()
                .position(|p| p.id == id)
                .ok_or_else(|| DbError::not_found(id))?;
            profiles.remove(idx);
            Ok(())
        })
        .await?;

        self.pools.release(id).await;
        info!(connection_id = %id, "Deleted connection");
        Ok(())
    }

    /// Apply `change` to a copy of the snapshot, persist it, then publish it.
    /// The snapshot is untouched if `change` or the write fails.
    async fn mutate<T, F>(&self, change: F) -> DbResult<T>
    where
        F: FnOnce(&mut Vec<ConnectionProfile>) -> DbResult<T>,
    {
        let _writer = self.writer.lock().await;

        let mut next = self.snapshot.read().await.as_ref().clone();
        let value = change(&mut next)?;
        self.store.save(&next).await?;
        *self.snapshot.write().await = Arc::new(next);
        Ok(value)
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("store", &self.store)
            .field("probe_timeout", &self.probe_timeout)
            .finish_non_exhaustive()
    }
}

fn clear_default(profiles: &mut [ConnectionProfile]) {
    let now = Utc::now();
    for profile in profiles.iter_mut().filter(|p| p.is_default) {
        profile.is_default = false;
        profile.updated_at = now;
    }
}
