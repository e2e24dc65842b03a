use crate::session::Session;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Live sessions of this process, each behind its own lock.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<Session>>>>,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    pub async fn create(&self) -> (Uuid, Arc<Mutex<Session>>) {
        self.prune_expired().await;

        let session = Session::new();
        let id = session.id();
        let handle = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id, Arc::clone(&handle));

        info!(session = %id, "Session started");
        (id, handle)
    }

    pub async fn get(&self, id: &Uuid) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Locks a live session for one request and marks it active.
    ///
    /// Membership is checked again once the lock is held: a sweep may have
    /// dropped the session while this request waited for it.
    pub async fn lock(&self, id: &Uuid) -> Option<OwnedMutexGuard<Session>> {
        let handle = self.get(id).await?;
        let mut session = handle.clone().lock_owned().await;

        let live = self
            .sessions
            .read()
            .await
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(current, &handle));
        if !live {
            debug!(session = %id, "Session expired while waiting for its lock");
            return None;
        }

        session.touch();
        Some(session)
    }

    pub async fn remove(&self, id: &Uuid) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!(session = %id, "Session ended");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn prune_expired(&self) -> usize {
        self.prune_idle_before(Utc::now() - self.idle_timeout).await
    }

    /// Drops sessions untouched since `cutoff`. Sessions busy with a request are kept.
    pub async fn prune_idle_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| match session.try_lock() {
            Ok(session) => session.last_active() >= cutoff,
            Err(_) => true,
        });

        let pruned = before - sessions.len();
        if pruned > 0 {
            debug!("Expired {} idle sessions", pruned);
        }
        pruned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sessions_are_isolated() {
        let registry = SessionRegistry::new(Duration::hours(1));
        let (first, first_handle) = registry.create().await;
        let (second, _) = registry.create().await;
        assert_ne!(first, second);

        first_handle.lock().await.credentials_mut().set_api_key("first-key");

        let second_handle = registry.get(&second).await.unwrap();
        assert!(second_handle.lock().await.credentials().api_key().is_none());
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn removed_sessions_are_gone() {
        let registry = SessionRegistry::new(Duration::hours(1));
        let (id, _) = registry.create().await;

        assert!(registry.remove(&id).await);
        assert!(!registry.remove(&id).await);
        assert!(registry.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn idle_sessions_expire() {
        let registry = SessionRegistry::new(Duration::hours(1));
        let (id, _) = registry.create().await;

        assert_eq!(registry.prune_idle_before(Utc::now() - Duration::minutes(5)).await, 0);
        assert!(registry.get(&id).await.is_some());

        assert_eq!(registry.prune_idle_before(Utc::now() + Duration::seconds(1)).await, 1);
        assert!(registry.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn busy_sessions_survive_pruning() {
        let registry = SessionRegistry::new(Duration::hours(1));
        let (_, handle) = registry.create().await;
        let _guard = handle.lock().await;

        assert_eq!(registry.prune_idle_before(Utc::now() + Duration::seconds(1)).await, 0);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn lock_marks_the_session_active() {
        let registry = SessionRegistry::new(Duration::hours(1));
        let (id, _) = registry.create().await;
        let before = Utc::now();

        let session = registry.lock(&id).await.unwrap();

        assert!(session.last_active() >= before);
    }

    #[tokio::test]
    async fn session_dropped_while_waiting_for_its_lock_is_gone() {
        let registry = Arc::new(SessionRegistry::new(Duration::hours(1)));
        let (id, handle) = registry.create().await;
        let guard = handle.lock().await;

        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.lock(&id).await.is_some() })
        };
        // map, this test and the waiter's two clones
        while Arc::strong_count(&handle) < 4 {
            tokio::task::yield_now().await;
        }

        assert!(registry.remove(&id).await);
        drop(guard);

        assert!(!waiter.await.unwrap());
    }

    #[tokio::test]
    async fn unknown_session_cannot_be_locked() {
        let registry = SessionRegistry::new(Duration::hours(1));
        assert!(registry.lock(&Uuid::new_v4()).await.is_none());
    }
}
