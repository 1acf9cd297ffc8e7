//! Per-subject moderation locks
//!
//! At most one command may act on a given member of a guild at a time.
//! Acquisition never waits: a busy subject means the caller aborts.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

type LockKey = (u64, u64);

/// Map of held (guild, subject) locks to their acquisition tokens
#[derive(Clone, Default)]
pub struct LockManager {
    held: Arc<DashMap<LockKey, Uuid>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for a subject. Returns `false` if it is already held.
    pub fn acquire(&self, guild_id: u64, subject_id: u64) -> bool {
        self.take(guild_id, subject_id).is_some()
    }

    /// Release the lock for a subject, whoever holds it
    pub fn release(&self, guild_id: u64, subject_id: u64) {
        if self.held.remove(&(guild_id, subject_id)).is_some() {
            debug!(guild_id = %guild_id, subject_id = %subject_id, "Subject lock released");
        }
    }

    /// Whether the subject is currently locked
    #[must_use]
    pub fn is_locked(&self, guild_id: u64, subject_id: u64) -> bool {
        self.held.contains_key(&(guild_id, subject_id))
    }

    /// Take the lock and get a guard that releases it when dropped
    #[must_use]
    pub fn try_lock(&self, guild_id: u64, subject_id: u64) -> Option<LockGuard> {
        self.take(guild_id, subject_id).map(|token| LockGuard {
            manager: self.clone(),
            key: (guild_id, subject_id),
            token,
        })
    }

    fn take(&self, guild_id: u64, subject_id: u64) -> Option<Uuid> {
        match self.held.entry((guild_id, subject_id)) {
            Entry::Occupied(_) => {
                info!(guild_id = %guild_id, subject_id = %subject_id, "Subject is already locked");
                None
            }
            Entry::Vacant(slot) => {
                let token = Uuid::new_v4();
                slot.insert(token);
                debug!(guild_id = %guild_id, subject_id = %subject_id, "Subject lock acquired");
                Some(token)
            }
        }
    }
}

/// Holds a subject lock until dropped
pub struct LockGuard {
    manager: LockManager,
    key: LockKey,
    token: Uuid,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Only release the acquisition this guard made
        let removed = self
            .manager
            .held
            .remove_if(&self.key, |_, token| *token == self.token);
        if removed.is_some() {
            debug!(guild_id = %self.key.0, subject_id = %self.key.1, "Subject lock released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_is_exclusive() {
        let locks = LockManager::new();
        assert!(locks.acquire(1, 100));
        assert!(!locks.acquire(1, 100));
        assert!(locks.is_locked(1, 100));

        // Other pairs are independent
        assert!(locks.acquire(1, 101));
        assert!(locks.acquire(2, 100));

        locks.release(1, 100);
        assert!(!locks.is_locked(1, 100));
        assert!(locks.acquire(1, 100));
    }

    #[test]
    fn test_release_other_pair_keeps_lock() {
        let locks = LockManager::new();
        assert!(locks.acquire(1, 100));
        locks.release(1, 101);
        locks.release(2, 100);
        assert!(!locks.acquire(1, 100));
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let locks = LockManager::new();
        {
            let _guard = locks.try_lock(1, 100).unwrap();
            assert!(locks.try_lock(1, 100).is_none());
        }
        assert!(!locks.is_locked(1, 100));
        assert!(locks.try_lock(1, 100).is_some());
    }

    #[test]
    fn test_stale_guard_does_not_release_new_holder() {
        let locks = LockManager::new();
        let guard = locks.try_lock(1, 100).unwrap();
        locks.release(1, 100);
        assert!(locks.acquire(1, 100));
        drop(guard);
        assert!(locks.is_locked(1, 100));
    }

    #[test]
    fn test_guard_released_on_early_return() {
        fn moderate(locks: &LockManager, fail: bool) -> Result<(), String> {
            let _guard = locks.try_lock(1, 100).ok_or("busy")?;
            if fail {
                return Err("executor failed".to_string());
            }
            Ok(())
        }

        let locks = LockManager::new();
        assert!(moderate(&locks, true).is_err());
        assert!(!locks.is_locked(1, 100));
        assert!(moderate(&locks, false).is_ok());
        assert!(!locks.is_locked(1, 100));
    }
}
