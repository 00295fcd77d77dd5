//! Poison-tolerant lock access.
//!
//! Content, template and clock state stay readable after a panicking writer;
//! every recovery is logged and counted.

use std::sync::{
    LockResult, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use metrics::counter;
use tracing::warn;

const METRIC_LOCK_POISONED: &str = "tessera_lock_poisoned_total";

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    owner: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    recover(lock.read(), owner, op, "rwlock.read")
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    owner: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    recover(lock.write(), owner, op, "rwlock.write")
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    owner: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    recover(lock.lock(), owner, op, "mutex.lock")
}

fn recover<G>(
    result: LockResult<G>,
    owner: &'static str,
    op: &'static str,
    kind: &'static str,
) -> G {
    result.unwrap_or_else(|poisoned: PoisonError<G>| {
        counter!(METRIC_LOCK_POISONED, "owner" => owner).increment(1);
        warn!(owner, op, lock_kind = kind, "lock poisoned; continuing with inner state");
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn mutex_survives_a_panicking_holder() {
        let lock = Mutex::new(1_u32);
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.lock().expect("lock should be acquired");
            panic!("poison the mutex");
        }));

        *mutex_lock(&lock, "cache::lock::tests", "bump") += 1;
        assert_eq!(*mutex_lock(&lock, "cache::lock::tests", "read"), 2);
    }

    #[test]
    fn rwlock_survives_a_panicking_writer() {
        let lock = RwLock::new(vec!["a"]);
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.write().expect("lock should be acquired");
            panic!("poison the rwlock");
        }));

        rw_write(&lock, "cache::lock::tests", "push").push("b");
        assert_eq!(*rw_read(&lock, "cache::lock::tests", "read"), vec!["a", "b"]);
    }
}
