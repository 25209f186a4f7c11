use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_BROADCAST_ID: AtomicU64 = AtomicU64::new(0);

/// A read-only value published once and shared by every worker.
///
/// Clones are cheap handles onto the same value. The value is never mutated;
/// replacing it means publishing a new broadcast.
///
///     # use photon_game::data::Broadcast;
///     let b = Broadcast::new(vec![1, 2, 3]);
///     let worker_copy = b.clone();
///     assert_eq!(b.id(), worker_copy.id());
///     assert_eq!(&vec![1, 2, 3], worker_copy.value());
///     b.release();
///
#[derive(Debug)]
pub struct Broadcast<T> {
    id: u64,
    value: Arc<T>,
}

impl<T> Broadcast<T> {
    pub fn new(value: T) -> Self {
        let id = NEXT_BROADCAST_ID.fetch_add(1, Ordering::Relaxed);
        debug!("Published broadcast #{}", id);
        Self {
            id,
            value: Arc::new(value),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Drop this handle's copy of the value.
    ///
    /// Handles cloned into in-flight work keep the value alive until they finish;
    /// callers must not release while such work may still start new lookups.
    pub fn release(self) {
        debug!(
            "Released broadcast #{} ({} other handles outstanding)",
            self.id,
            Arc::strong_count(&self.value) - 1
        );
    }
}

impl<T> Clone for Broadcast<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: Arc::clone(&self.value),
        }
    }
}

impl<T> Deref for Broadcast<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::Broadcast;
    use std::sync::Arc;

    #[test]
    fn test_ids_are_unique() {
        let a = Broadcast::new(1);
        let b = Broadcast::new(1);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_release_keeps_outstanding_handles_valid() {
        let b = Broadcast::new(String::from("map"));
        let worker_copy = b.clone();
        assert_eq!(2, Arc::strong_count(&b.value));
        b.release();
        assert_eq!("map", worker_copy.as_str());
        assert_eq!(1, Arc::strong_count(&worker_copy.value));
    }
}
