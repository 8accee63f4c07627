use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Keyed async mutex: lifecycle mutations for the same user run one at a time,
/// different users never wait on each other.
#[derive(Default)]
pub struct UserLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

/// Holds one user's lock. Dropping the last handle removes the user's entry.
pub struct UserLockGuard<'a> {
    locks: &'a DashMap<Uuid, Arc<Mutex<()>>>,
    user_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, user_id: Uuid) -> UserLockGuard<'_> {
        // Clone the Arc out first so the shard lock is released before awaiting.
        let lock = Arc::clone(self.locks.entry(user_id).or_default().value());
        let guard = lock.lock_owned().await;
        UserLockGuard {
            locks: &self.locks,
            user_id,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn tracked_users(&self) -> usize {
        self.locks.len()
    }
}

impl Drop for UserLockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold their own clone, so only an idle entry has a count of one.
        self.locks
            .remove_if(&self.user_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_user_waits_other_user_does_not() {
        let locks = Arc::new(UserLocks::new());
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();

        let guard = locks.lock(user_a).await;

        let other_user = tokio::time::timeout(Duration::from_millis(50), locks.lock(user_b)).await;
        assert!(other_user.is_ok());

        let same_user = tokio::time::timeout(Duration::from_millis(50), locks.lock(user_a)).await;
        assert!(same_user.is_err());

        drop(guard);
        let same_user = tokio::time::timeout(Duration::from_millis(50), locks.lock(user_a)).await;
        assert!(same_user.is_ok());
    }

    #[tokio::test]
    async fn released_locks_are_forgotten() {
        let locks = UserLocks::new();

        for _ in 0..3 {
            let guard = locks.lock(Uuid::new_v4()).await;
            assert_eq!(locks.tracked_users(), 1);
            drop(guard);
        }

        assert_eq!(locks.tracked_users(), 0);
    }

    #[tokio::test]
    async fn entry_survives_while_another_task_waits() {
        let locks = Arc::new(UserLocks::new());
        let user_id = Uuid::new_v4();

        let guard = locks.lock(user_id).await;
        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock(user_id).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(guard);
        waiter.await.unwrap();

        assert_eq!(locks.tracked_users(), 0);
    }
}
