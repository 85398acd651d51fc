//! Schedulable work items: identity, intrusive reference counting, and the
//! packed queue-link word.
//!
//! Every work item embeds a [`Header`] carrying its graph-unique id, an
//! atomic reference count, and a single atomic word that packs the intrusive
//! queue link together with an exclusive lock flag. The low bit of the word
//! is the lock; the remaining bits address the header of the next item on
//! the owning graph's work queue (zero when the item is not queued, the
//! graph's sentinel when it is the queue tail). The lock flag always refers
//! to the work containing the word, not the one the pointer addresses.

use std::cell::UnsafeCell;
use std::ptr::NonNull;
use std::sync::atomic::{fence, AtomicU32, AtomicUsize, Ordering};

use crate::graph::WorkState;

/// A work item's graph-unique identifier. Assigned at construction from the
/// graph's monotonic counter; the sentinel owns id 0 and real work starts
/// at 1.
pub type WorkId = u32;

/// Low bit of [`Header::next`]: the exclusive lock flag.
pub(crate) const LOCK: usize = 1;

// The pointer bits of the packed word start above the lock flag, so header
// allocations must be at least 2-aligned.
const _: () = assert!(std::mem::align_of::<Header>() >= 2);

/// A queueable, lockable, reference-counted unit of computation.
pub(crate) trait Work: Send + Sync + 'static {
    /// The embedded scheduling header.
    fn header(&self) -> &Header;

    /// Perform the computation, scheduling any follow-up work through `ws`.
    fn eval(&self, ws: &mut WorkState);
}

/// Scheduling state embedded in every work item.
pub(crate) struct Header {
    id: WorkId,
    refs: AtomicU32,
    /// Packed `(next header address, lock flag)` word.
    pub(crate) next: AtomicUsize,
    /// Trait-object pointer back to the owning work. Written exactly once by
    /// [`publish`] before the work is shared, read-only afterwards.
    this: UnsafeCell<Option<NonNull<dyn Work>>>,
}

// `this` is written once before the header escapes the constructing thread;
// every other field is atomic.
unsafe impl Send for Header {}
unsafe impl Sync for Header {}

impl Header {
    pub(crate) fn new(id: WorkId) -> Self {
        Self {
            id,
            refs: AtomicU32::new(0),
            next: AtomicUsize::new(0),
            this: UnsafeCell::new(None),
        }
    }

    pub(crate) fn id(&self) -> WorkId {
        self.id
    }

    /// This header's address, as stored in packed queue words.
    pub(crate) fn addr(&self) -> usize {
        self as *const Header as usize
    }

    /// Pointer bits of the queue link; zero when the work is not queued.
    pub(crate) fn next_ptr(&self) -> usize {
        self.next.load(Ordering::Acquire) & !LOCK
    }

    /// Try to take the exclusive lock. Not re-entrant.
    pub(crate) fn try_lock(&self) -> bool {
        (self.next.fetch_or(LOCK, Ordering::Acquire) & LOCK) == 0
    }

    /// Release the exclusive lock. The caller must hold it.
    pub(crate) fn unlock(&self) {
        self.next.fetch_and(!LOCK, Ordering::Release);
    }

    /// Try to take the exclusive lock while simultaneously zeroing the queue
    /// link, removing the work from its graph's queue if it was on it.
    pub(crate) fn try_lock_dequeue(&self) -> bool {
        (self.next.swap(LOCK, Ordering::Acquire) & LOCK) == 0
    }

    pub(crate) fn retain(&self) {
        self.refs.fetch_add(1, Ordering::Relaxed);
    }

    /// The trait-object pointer installed by [`publish`].
    ///
    /// # Safety
    ///
    /// The work must have been published.
    pub(crate) unsafe fn this_ptr(&self) -> NonNull<dyn Work> {
        (*self.this.get()).expect("work evaluated before publication")
    }
}

/// Install the trait-object back-pointer and hand out the first strong
/// reference to a freshly allocated work item.
///
/// # Safety
///
/// `raw` must come from `Box::into_raw` and must not have been shared yet;
/// `publish` must be called exactly once per work.
pub(crate) unsafe fn publish<W: Work>(raw: *mut W) -> WorkRef {
    let fat = NonNull::new_unchecked(raw as *mut dyn Work);
    *(*raw).header().this.get() = Some(fat);
    WorkRef::retain(fat)
}

/// An intrusive strong reference to a work item. The item is destroyed when
/// the last reference drops.
pub(crate) struct WorkRef {
    ptr: NonNull<dyn Work>,
}

unsafe impl Send for WorkRef {}
unsafe impl Sync for WorkRef {}

impl WorkRef {
    /// A new strong reference, incrementing the count.
    ///
    /// # Safety
    ///
    /// `ptr` must address a published work that is still alive.
    pub(crate) unsafe fn retain(ptr: NonNull<dyn Work>) -> Self {
        ptr.as_ref().header().retain();
        Self { ptr }
    }

    /// Wrap an already-counted pointer, taking over its reference.
    ///
    /// # Safety
    ///
    /// The caller must own one strong reference to the pointee and transfers
    /// it to the returned handle.
    pub(crate) unsafe fn adopt(ptr: NonNull<dyn Work>) -> Self {
        Self { ptr }
    }

    pub(crate) fn work(&self) -> &dyn Work {
        unsafe { self.ptr.as_ref() }
    }

    pub(crate) fn header(&self) -> &Header {
        self.work().header()
    }
}

impl Clone for WorkRef {
    fn clone(&self) -> Self {
        unsafe { Self::retain(self.ptr) }
    }
}

impl Drop for WorkRef {
    fn drop(&mut self) {
        // Release-decrement, acquire-fence before the free so every access
        // from other droppers happens-before the destructor runs.
        if self.header().refs.fetch_sub(1, Ordering::Release) == 1 {
            fence(Ordering::Acquire);
            drop(unsafe { Box::from_raw(self.ptr.as_ptr()) });
        }
    }
}

/// Releases the lock flag on drop, so unwinding out of a user function
/// cannot leave a work permanently locked.
pub(crate) struct LockGuard<'a> {
    header: &'a Header,
}

impl<'a> LockGuard<'a> {
    pub(crate) fn new(header: &'a Header) -> Self {
        Self { header }
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.header.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    struct DropProbe {
        header: Header,
        dropped: Arc<AtomicBool>,
    }

    impl Work for DropProbe {
        fn header(&self) -> &Header {
            &self.header
        }

        fn eval(&self, _ws: &mut WorkState) {}
    }

    impl Drop for DropProbe {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    fn probe(dropped: &Arc<AtomicBool>) -> WorkRef {
        let raw = Box::into_raw(Box::new(DropProbe {
            header: Header::new(7),
            dropped: dropped.clone(),
        }));
        unsafe { publish(raw) }
    }

    #[test]
    fn lock_is_exclusive() {
        let header = Header::new(1);
        assert!(header.try_lock());
        assert!(!header.try_lock());
        header.unlock();
        assert!(header.try_lock());
        header.unlock();
    }

    #[test]
    fn lock_dequeue_clears_the_link() {
        let header = Header::new(1);
        header.next.store(0x40, Ordering::Relaxed);
        assert!(header.try_lock_dequeue());
        assert_eq!(header.next_ptr(), 0);
        assert!(!header.try_lock());
        header.unlock();
    }

    #[test]
    fn failed_lock_dequeue_still_unlinks() {
        let header = Header::new(1);
        assert!(header.try_lock());
        // queue link updates preserve the flag
        header.next.store(0x40 | LOCK, Ordering::Relaxed);
        // the lock holder wins, but the link is cleared either way
        assert!(!header.try_lock_dequeue());
        assert_eq!(header.next_ptr(), 0);
        header.unlock();
        assert!(header.try_lock());
    }

    #[test]
    fn last_reference_destroys_the_work() {
        let dropped = Arc::new(AtomicBool::new(false));
        let first = probe(&dropped);
        let second = first.clone();
        drop(first);
        assert!(!dropped.load(Ordering::SeqCst));
        drop(second);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn guard_unlocks_on_drop() {
        let header = Header::new(1);
        assert!(header.try_lock());
        drop(LockGuard::new(&header));
        assert!(header.try_lock());
        header.unlock();
    }
}
