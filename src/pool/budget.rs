//! Open-file budget shared by every task.

use std::sync::{Arc, Condvar, Mutex, PoisonError};

#[derive(Debug, Default)]
struct Usage {
    held: usize,
    peak: usize,
}

#[derive(Debug)]
struct Inner {
    usage: Mutex<Usage>,
    released: Condvar,
    capacity: usize,
}

impl Usage {
    fn take(&mut self) {
        self.held += 1;
        self.peak = self.peak.max(self.held);
    }
}

/// Counting semaphore capping simultaneously open files.
///
/// Independent of the worker count: hashing tasks from different pools can
/// share one budget. Clones share the same count.
#[derive(Debug, Clone)]
pub struct FdBudget {
    inner: Arc<Inner>,
}

impl FdBudget {
    /// Budget allowing `capacity` concurrent permits (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                usage: Mutex::new(Usage::default()),
                released: Condvar::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Maximum concurrent permits.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Permits currently held.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.usage().held
    }

    /// Most permits ever held at once.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.usage().peak
    }

    fn usage(&self) -> std::sync::MutexGuard<'_, Usage> {
        self.inner
            .usage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until a permit is free and take it.
    #[must_use = "the permit is released as soon as it is dropped"]
    pub fn acquire(&self) -> FdPermit {
        let mut usage = self.usage();
        while usage.held >= self.inner.capacity {
            usage = self
                .inner
                .released
                .wait(usage)
                .unwrap_or_else(PoisonError::into_inner);
        }
        usage.take();
        FdPermit {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Take a permit only if one is free right now.
    #[must_use]
    pub fn try_acquire(&self) -> Option<FdPermit> {
        let mut usage = self.usage();
        if usage.held >= self.inner.capacity {
            return None;
        }
        usage.take();
        Some(FdPermit {
            inner: Arc::clone(&self.inner),
        })
    }
}

/// A held slot in an [`FdBudget`]; released on drop.
#[derive(Debug)]
pub struct FdPermit {
    inner: Arc<Inner>,
}

impl Drop for FdPermit {
    fn drop(&mut self) {
        let mut usage = self
            .inner
            .usage
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        usage.held = usage.held.saturating_sub(1);
        self.inner.released.notify_one();
    }
}
