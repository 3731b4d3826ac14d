use std::{
    cell::UnsafeCell,
    marker::PhantomData,
    sync::atomic::{AtomicI64, AtomicU32, Ordering},
};

use parking_lot::{
    lock_api::{RawRwLock as _, RawRwLockRecursive as _},
    Mutex, RawRwLock,
};

use crate::{Error, Identity, PageRef, Result};

/// The kind of claim a pin takes on a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockKind {
    /// A read claim. Any number of shared holders may coexist.
    Shared,
    /// A write claim. Excludes every other holder.
    Exclusive,
}

/// Hold-state value marking a single exclusive holder. Positive values count
/// shared holders, zero means no holder.
const EXCLUSIVE_HOLD: i64 = -1;

/// A reusable page frame.
///
/// The same physical buffer is bound to many different logical pages over
/// the slot's lifetime, so a caller that looked a slot up under one identity
/// may be racing an eviction that rebinds it to another. [`pin`] defeats
/// that race with a two-phase check: the requested identity is compared
/// before queueing on the lock (a cheap rejection of slots that are
/// certainly wrong) and compared again once the lock is granted. Only the
/// second check is load-bearing. A successful pin therefore guarantees the
/// buffer's contents belong to the requested page until the matching
/// [`unpin`], because any rebind needs the very lock the pin now holds.
///
/// Identity changes go through [`rebind`] and [`unbind`], which the owning
/// pool only calls once it has ensured no pin is outstanding, typically by
/// holding the slot's exclusive lock itself across the transition. The pool
/// must also serialize rebinds per slot; two in-flight rebinds of one slot
/// are a contract violation.
///
/// [`pin`]: PageSlot::pin
/// [`unpin`]: PageSlot::unpin
/// [`rebind`]: PageSlot::rebind
/// [`unbind`]: PageSlot::unbind
pub struct PageSlot {
    /// Identity of the page this frame currently holds. Guarded by its own
    /// mutex, never held across a blocking operation, so the unlocked fast
    /// path of `pin` and a concurrent `rebind` cannot race.
    identity: Mutex<Identity>,
    /// Guards `frame` contents for the currently bound identity.
    lock: RawRwLock,
    /// Mirror of the lock's hold state, used to validate `unpin` kinds:
    /// n > 0 shared holders, `EXCLUSIVE_HOLD` one exclusive holder, 0 none.
    hold: AtomicI64,
    /// The fixed frame. Length never changes after construction; contents
    /// are only touched under `lock`.
    frame: UnsafeCell<Box<[u8]>>,
    page_size: usize,
    /// Index of this slot within the owning pool.
    id: u32,
    /// Intrusive free-list link. Owned by the pool's free list and only
    /// accessed under that list's lock; meaningless while the slot is bound.
    next_free: AtomicU32,
}

// Safety: `frame` is only accessed through `lock` (see `data`/`data_mut`)
// and `next_free` only under the owning free list's lock; everything else is
// already synchronized.
unsafe impl Send for PageSlot {}
unsafe impl Sync for PageSlot {}

impl PageSlot {
    pub(crate) fn new(page_size: usize, id: u32) -> Self {
        PageSlot {
            identity: Mutex::new(Identity::Unbound),
            lock: RawRwLock::INIT,
            hold: AtomicI64::new(0),
            frame: UnsafeCell::new(vec![0; page_size].into_boxed_slice()),
            page_size,
            id,
            next_free: AtomicU32::new(0),
        }
    }

    /// The identity this slot is currently bound to.
    ///
    /// Unless the caller holds a pin, the answer may be stale by the time it
    /// is inspected; it is a hint for lookups, not a guarantee.
    pub fn identity(&self) -> Identity {
        *self.identity.lock()
    }

    /// Size in bytes of the backing frame.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn is_bound_to(&self, page: PageRef) -> bool {
        *self.identity.lock() == Identity::Bound(page)
    }

    /// Pins the slot under the identity the caller expects it to hold.
    ///
    /// On success the caller owns a claim of the given kind on the frame and
    /// the identity cannot change until the matching [`unpin`]. Returns
    /// false if the slot is not (or no longer) bound to `page`; losing the
    /// race against an eviction this way is a normal outcome, handled by
    /// retrying the lookup that produced the slot.
    ///
    /// This call blocks while a conflicting holder exists and carries no
    /// timeout; callers that need bounded waiting must wrap it. A thread
    /// already holding a shared pin may take another shared pin without
    /// deadlocking behind a queued writer.
    ///
    /// [`unpin`]: PageSlot::unpin
    pub fn pin(&self, page: PageRef, kind: LockKind) -> bool {
        // Don't queue on a lock that is certainly the wrong page.
        if !self.is_bound_to(page) {
            return false;
        }
        match kind {
            LockKind::Shared => self.lock.lock_shared_recursive(),
            LockKind::Exclusive => self.lock.lock_exclusive(),
        }
        // The slot may have been rebound while we were queued. Without this
        // re-check a caller could read or write another page's bytes.
        if self.is_bound_to(page) {
            match kind {
                LockKind::Shared => {
                    let prev = self.hold.fetch_add(1, Ordering::AcqRel);
                    debug_assert!(prev >= 0);
                }
                LockKind::Exclusive => {
                    let prev = self.hold.swap(EXCLUSIVE_HOLD, Ordering::AcqRel);
                    debug_assert_eq!(prev, 0);
                }
            }
            true
        } else {
            // Safety: paired with the acquisition above.
            unsafe {
                match kind {
                    LockKind::Shared => self.lock.unlock_shared(),
                    LockKind::Exclusive => self.lock.unlock_exclusive(),
                }
            }
            false
        }
    }

    /// Releases a previously pinned claim of the given kind.
    ///
    /// `kind` must match the kind the hold was acquired with, and the call
    /// must happen on the pinning thread. A mismatched kind fails with
    /// [`Error::InvalidArgument`] and releases nothing.
    pub fn unpin(&self, kind: LockKind) -> Result<()> {
        match kind {
            LockKind::Shared => {
                let mut n = self.hold.load(Ordering::Acquire);
                loop {
                    if n <= 0 {
                        return Err(Error::InvalidArgument);
                    }
                    match self.hold.compare_exchange_weak(
                        n,
                        n - 1,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => break,
                        Err(actual) => n = actual,
                    }
                }
                // Safety: the hold state witnessed a shared holder, so the
                // lock is held shared and this release pairs with it.
                unsafe { self.lock.unlock_shared() };
            }
            LockKind::Exclusive => {
                if self
                    .hold
                    .compare_exchange(EXCLUSIVE_HOLD, 0, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    return Err(Error::InvalidArgument);
                }
                // Safety: as above, for the exclusive hold.
                unsafe { self.lock.unlock_exclusive() };
            }
        }
        Ok(())
    }

    /// Pins the slot shared and returns a guard exposing the frame bytes.
    ///
    /// `None` means the slot is not bound to `page`; retry the lookup.
    pub fn pin_shared(&self, page: PageRef) -> Option<SharedPin<'_>> {
        self.pin(page, LockKind::Shared).then(|| SharedPin {
            slot: self,
            page,
            marker: PhantomData,
        })
    }

    /// Pins the slot exclusively and returns a guard exposing the frame
    /// bytes for writing.
    ///
    /// `None` means the slot is not bound to `page`; retry the lookup.
    pub fn pin_exclusive(&self, page: PageRef) -> Option<ExclusivePin<'_>> {
        self.pin(page, LockKind::Exclusive).then(|| ExclusivePin {
            slot: self,
            page,
            marker: PhantomData,
        })
    }

    /// Reads the raw frame.
    ///
    /// # Safety
    ///
    /// The caller must hold a pin on this slot for as long as the returned
    /// slice is in use. There is no per-access checking; the pin is the sole
    /// safety boundary.
    pub unsafe fn data(&self) -> &[u8] {
        &(&(*self.frame.get()))[..]
    }

    /// Writes the raw frame.
    ///
    /// # Safety
    ///
    /// The caller must hold an exclusive pin on this slot for as long as the
    /// returned slice is in use, and must not hold any other reference into
    /// the frame.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn data_mut(&self) -> &mut [u8] {
        &mut (&mut (*self.frame.get()))[..]
    }

    /// Binds the slot to a new page.
    ///
    /// The caller must have ensured that no pin is outstanding, typically by
    /// holding the slot's exclusive lock across the transition, and must
    /// serialize rebinds per slot. The frame bytes are left as they are; the
    /// caller fills them for the new page under its own exclusive claim.
    pub fn rebind(&self, page: PageRef) {
        debug_assert!(!self.lock.is_locked() || self.lock.is_locked_exclusive());
        *self.identity.lock() = Identity::Bound(page);
    }

    /// Resets the slot to the unbound state, making it unpinnable.
    ///
    /// Same precondition as [`rebind`](PageSlot::rebind).
    pub fn unbind(&self) {
        debug_assert!(!self.lock.is_locked() || self.lock.is_locked_exclusive());
        *self.identity.lock() = Identity::Unbound;
    }

    pub(crate) fn id(&self) -> u32 {
        self.id
    }

    // Orderings are relaxed: the free list's lock already orders link
    // accesses, which are the only accesses.
    pub(crate) fn free_link(&self) -> u32 {
        self.next_free.load(Ordering::Relaxed)
    }

    pub(crate) fn set_free_link(&self, next: u32) {
        self.next_free.store(next, Ordering::Relaxed);
    }
}

/// A held shared pin. Reading the frame goes through this guard; dropping it
/// releases the claim.
#[must_use]
pub struct SharedPin<'a> {
    slot: &'a PageSlot,
    page: PageRef,
    // The hold must be released on the thread that took it.
    marker: PhantomData<*mut ()>,
}

impl SharedPin<'_> {
    /// The page this pin was taken under.
    pub fn page(&self) -> PageRef {
        self.page
    }

    /// The frame bytes of the pinned page.
    pub fn data(&self) -> &[u8] {
        // Safety: this guard witnesses a live shared hold.
        unsafe { self.slot.data() }
    }
}

impl Drop for SharedPin<'_> {
    fn drop(&mut self) {
        self.slot
            .unpin(LockKind::Shared)
            .expect("shared hold already released");
    }
}

/// A held exclusive pin. Grants write access to the frame; dropping it
/// releases the claim.
#[must_use]
pub struct ExclusivePin<'a> {
    slot: &'a PageSlot,
    page: PageRef,
    marker: PhantomData<*mut ()>,
}

impl ExclusivePin<'_> {
    /// The page this pin was taken under.
    pub fn page(&self) -> PageRef {
        self.page
    }

    /// The frame bytes of the pinned page.
    pub fn data(&self) -> &[u8] {
        // Safety: this guard witnesses a live exclusive hold.
        unsafe { self.slot.data() }
    }

    /// The frame bytes of the pinned page, for writing.
    pub fn data_mut(&mut self) -> &mut [u8] {
        // Safety: this guard witnesses a live exclusive hold, and `&mut
        // self` keeps the returned slice unique.
        unsafe { self.slot.data_mut() }
    }
}

impl Drop for ExclusivePin<'_> {
    fn drop(&mut self) {
        self.slot
            .unpin(LockKind::Exclusive)
            .expect("exclusive hold already released");
    }
}
