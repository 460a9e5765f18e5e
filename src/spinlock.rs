// SPDX-License-Identifier: MIT OR Apache-2.0
/*!
A reader/writer spinlock for short critical sections.

The provider registry, the extractor cache and per-scope mapped values are read
on every intercepted call and written rarely.  Each critical section is a clone
or a push, so spinning is cheaper than parking, and the lock works on targets
where blocking primitives are unavailable.
*/

use std::cell::UnsafeCell;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

const UNLOCKED: u32 = 0;
const WRITER: u32 = u32::MAX;

pub(crate) struct Spinlock<T> {
    /// `UNLOCKED`, a reader count, or `WRITER`
    state: AtomicU32,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is serialized by `state`
unsafe impl<T: Send> Send for Spinlock<T> {}
unsafe impl<T: Send + Sync> Sync for Spinlock<T> {}

impl<T> Spinlock<T> {
    pub(crate) const fn new(data: T) -> Self {
        Spinlock {
            state: AtomicU32::new(UNLOCKED),
            data: UnsafeCell::new(data),
        }
    }

    /// Runs `f` with shared access.  Any number of readers may hold the lock.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        while self
            .state
            .fetch_update(Acquire, Relaxed, |s| (s < WRITER - 1).then(|| s + 1))
            .is_err()
        {
            std::hint::spin_loop();
        }
        let _release = OnRelease(|| {
            self.state.fetch_sub(1, Release);
        });
        // SAFETY: the reader count excludes writers
        f(unsafe { &*self.data.get() })
    }

    /// Runs `f` with exclusive access.
    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        while self
            .state
            .compare_exchange_weak(UNLOCKED, WRITER, Acquire, Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
        let _release = OnRelease(|| self.state.store(UNLOCKED, Release));
        // SAFETY: WRITER excludes every other reader and writer
        f(unsafe { &mut *self.data.get() })
    }
}

impl<T: Default> Default for Spinlock<T> {
    fn default() -> Self {
        Spinlock::new(T::default())
    }
}

impl<T: Debug> Debug for Spinlock<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.read(|data| f.debug_tuple("Spinlock").field(data).finish())
    }
}

/// Releases the lock when `f` unwinds as well as when it returns.
struct OnRelease<F: FnMut()>(F);

impl<F: FnMut()> Drop for OnRelease<F> {
    fn drop(&mut self) {
        (self.0)()
    }
}
