//! Lock acquisition that survives poisoning.
//!
//! Every shared structure in the crate is guarded by short synchronous critical
//! sections. A panic inside one of them must not take the whole cache down, so a
//! poisoned guard is recovered and the event is logged.

use std::sync::{LockResult, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

fn recover<G>(
    result: LockResult<G>,
    target: &'static str,
    op: &'static str,
    lock_kind: &'static str,
) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(
            op,
            target_module = target,
            lock_kind,
            result = "poisoned_recovered",
            "Recovered from poisoned lock; state may predate a panic elsewhere"
        );
        poisoned.into_inner()
    })
}

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    recover(lock.read(), target, op, "rwlock.read")
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    recover(lock.write(), target, op, "rwlock.write")
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    recover(lock.lock(), target, op, "mutex.lock")
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn mutex_lock_recovers_poisoned_guard() {
        let lock = Mutex::new(1_u32);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.lock().expect("lock should be acquired");
            panic!("poison the mutex");
        }));

        assert!(lock.is_poisoned());
        *mutex_lock(&lock, "util::lock", "test") += 1;
        assert_eq!(*mutex_lock(&lock, "util::lock", "test"), 2);
    }

    #[test]
    fn rwlock_helpers_recover_poisoned_guard() {
        let lock = RwLock::new(vec![1_u8]);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.write().expect("lock should be acquired");
            panic!("poison the rwlock");
        }));

        rw_write(&lock, "util::lock", "test").push(2);
        assert_eq!(rw_read(&lock, "util::lock", "test").as_slice(), &[1, 2]);
    }
}
