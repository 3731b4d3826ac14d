use std::sync::Arc;

use log::{debug, info};
use parking_lot::Mutex;

use crate::{Error, Identity, LockKind, PageSlot, Result};

/// Options to configure a [`SlotPool`].
#[non_exhaustive]
#[derive(Clone, Debug)]
pub struct Options {
    /// The size in bytes of the frame each slot carries. Fixed for the
    /// lifetime of the pool.
    ///
    /// Default: 8KB
    pub page_size: usize,

    /// The number of slots in the pool. This bounds how many pages can be
    /// cached at once.
    ///
    /// Default: 1024
    pub slot_count: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            page_size: 8 << 10,
            slot_count: 1024,
        }
    }
}

/// Link value marking the end of the free chain.
const NIL: u32 = u32::MAX;

/// A fixed set of page slots and the free list that recycles them.
///
/// The pool owns the backing memory: slots are built once and live until
/// the pool is dropped, cycling between the free list and whatever bindings
/// the caller (a page table) gives them. The pool deliberately knows
/// nothing about which identity lives where or which slot to evict next;
/// that is its caller's policy.
pub struct SlotPool {
    slots: Box<[Arc<PageSlot>]>,
    free: FreeList,
    page_size: usize,
}

impl SlotPool {
    /// Builds a pool of `slot_count` unbound slots of `page_size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if either option is zero, or if `slot_count` exceeds the
    /// free-list's index range.
    pub fn new(options: Options) -> Self {
        assert!(options.page_size > 0, "page_size must be non-zero");
        assert!(
            options.slot_count > 0 && options.slot_count < NIL as usize,
            "slot_count out of range"
        );

        let slots: Box<[Arc<PageSlot>]> = (0..options.slot_count)
            .map(|id| Arc::new(PageSlot::new(options.page_size, id as u32)))
            .collect();

        // Chain in reverse so lower slot ids are handed out first.
        let free = FreeList::new();
        for id in (0..slots.len() as u32).rev() {
            free.push(&slots, id);
        }

        info!(
            "slot pool ready, {} frames of {} bytes",
            options.slot_count, options.page_size
        );
        SlotPool {
            slots,
            free,
            page_size: options.page_size,
        }
    }

    /// The number of slots in the pool.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// The frame size every slot was built with.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Pops a free slot, still unbound; the caller binds it with
    /// [`PageSlot::rebind`] once the frame is filled for its new page.
    ///
    /// Returns `None` when every slot is in use. That is an expected
    /// outcome, resolved by evicting a bound slot and releasing it, not an
    /// error.
    pub fn acquire(&self) -> Option<Arc<PageSlot>> {
        let id = self.free.pop(&self.slots)?;
        let slot = self.slots[id as usize].clone();
        debug_assert_eq!(slot.identity(), Identity::Unbound);
        debug!("acquire slot {id}");
        Some(slot)
    }

    /// Returns a slot to the free list.
    ///
    /// If the slot is still bound, the pool takes its exclusive lock under
    /// the current identity, waiting out any straggling pins, and unbinds
    /// it; queued pinners then fail their re-check and retry elsewhere.
    ///
    /// The caller must hold no pin on the slot, must not release a slot
    /// twice, and must serialize this call against rebinds of the slot, as
    /// everywhere else. Fails with [`Error::InvalidArgument`] if the slot
    /// does not belong to this pool or a concurrent rebind defeats the
    /// exclusive claim.
    pub fn release(&self, slot: &Arc<PageSlot>) -> Result<()> {
        let id = slot.id();
        let owned = self
            .slots
            .get(id as usize)
            .map_or(false, |ours| Arc::ptr_eq(ours, slot));
        if !owned {
            return Err(Error::InvalidArgument);
        }

        if let Identity::Bound(page) = slot.identity() {
            if !slot.pin(page, LockKind::Exclusive) {
                return Err(Error::InvalidArgument);
            }
            slot.unbind();
            slot.unpin(LockKind::Exclusive)?;
        }

        debug!("release slot {id}");
        self.free.push(&self.slots, id);
        Ok(())
    }
}

/// Head of the intrusive chain through the slots' link fields.
///
/// The head mutex is the only synchronization the links have, and these two
/// methods are the only code that touches them; pin and unpin never do.
struct FreeList {
    head: Mutex<u32>,
}

impl FreeList {
    fn new() -> Self {
        FreeList {
            head: Mutex::new(NIL),
        }
    }

    fn push(&self, slots: &[Arc<PageSlot>], id: u32) {
        let mut head = self.head.lock();
        slots[id as usize].set_free_link(*head);
        *head = id;
    }

    fn pop(&self, slots: &[Arc<PageSlot>]) -> Option<u32> {
        let mut head = self.head.lock();
        if *head == NIL {
            return None;
        }
        let id = *head;
        let slot = &slots[id as usize];
        *head = slot.free_link();
        // The link is meaningless off the list; don't leave a dangling id.
        slot.set_free_link(NIL);
        Some(id)
    }
}
