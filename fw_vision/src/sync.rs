//! ABOUTME: Reader-writer lock wrapper, one per shared pipeline resource
//! ABOUTME: Poisoned locks are logged and recovered instead of failing the caller

use metrics::counter;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

/// A named value behind its own reader-writer lock
///
/// Readers never block each other; a writer excludes readers and other
/// writers of this resource only. Access is always scoped: guards release on
/// every exit path, including unwinding.
///
/// The only way a std lock acquisition fails is poisoning by a panicked
/// holder. That is logged and the operation continues on the recovered data.
#[derive(Debug)]
pub struct SharedResource<T> {
    name: &'static str,
    lock: RwLock<T>,
}

impl<T> SharedResource<T> {
    pub fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            lock: RwLock::new(value),
        }
    }

    /// Resource name used in log lines
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Acquire shared access
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.lock.read().unwrap_or_else(|poisoned| {
            self.recovered("read");
            poisoned.into_inner()
        })
    }

    /// Acquire exclusive access
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.lock.write().unwrap_or_else(|poisoned| {
            self.recovered("write");
            poisoned.into_inner()
        })
    }

    /// Run `f` with shared access
    pub fn read_with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.read();
        f(&guard)
    }

    /// Run `f` with exclusive access
    pub fn write_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.write();
        f(&mut guard)
    }

    /// Swap in a new value, returning the superseded one
    pub fn replace(&self, value: T) -> T {
        self.write_with(|current| std::mem::replace(current, value))
    }

    fn recovered(&self, access: &'static str) {
        counter!("framewatch_lock_recoveries_total", "resource" => self.name).increment(1);
        warn!(
            resource = self.name,
            access, "Lock was poisoned by a panicked holder, proceeding with recovered data"
        );
    }
}

impl<T: Clone> SharedResource<T> {
    /// Deep copy of the current value taken under shared access
    pub fn snapshot(&self) -> T {
        self.read_with(T::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{mpsc, Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_snapshot_and_replace() {
        let resource = SharedResource::new("counter", vec![1, 2, 3]);
        assert_eq!(resource.snapshot(), vec![1, 2, 3]);

        let old = resource.replace(vec![4]);
        assert_eq!(old, vec![1, 2, 3]);
        assert_eq!(resource.snapshot(), vec![4]);
        assert_eq!(resource.name(), "counter");
    }

    #[test]
    fn test_write_with_mutates_in_place() {
        let resource = SharedResource::new("value", 10u32);
        let doubled = resource.write_with(|v| {
            *v *= 2;
            *v
        });
        assert_eq!(doubled, 20);
        assert_eq!(resource.read_with(|v| *v), 20);
    }

    #[test]
    fn test_concurrent_readers_do_not_block_each_other() {
        let resource = Arc::new(SharedResource::new("shared", 42u32));
        // Each reader waits at the barrier while still holding its guard, so
        // the barrier only opens if both read guards are held at once.
        let barrier = Arc::new(Barrier::new(2));
        let (done_tx, done_rx) = mpsc::channel();

        for _ in 0..2 {
            let resource = Arc::clone(&resource);
            let barrier = Arc::clone(&barrier);
            let done_tx = done_tx.clone();
            thread::spawn(move || {
                let guard = resource.read();
                barrier.wait();
                done_tx.send(*guard).unwrap();
            });
        }

        for _ in 0..2 {
            let value = done_rx
                .recv_timeout(Duration::from_secs(10))
                .expect("readers blocked each other");
            assert_eq!(value, 42);
        }
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let resource = Arc::new(SharedResource::new("fragile", 7u32));

        let writer = Arc::clone(&resource);
        let result = thread::spawn(move || {
            let mut guard = writer.write();
            *guard = 8;
            panic!("worker crashed while holding the lock");
        })
        .join();
        assert!(result.is_err());

        // Both access modes still work and see the last written value
        assert_eq!(resource.snapshot(), 8);
        resource.replace(9);
        assert_eq!(resource.snapshot(), 9);
    }
}
