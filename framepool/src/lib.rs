//! Reusable page-cache slots: fixed frames of memory that are repeatedly
//! bound to on-disk page identities and safely shared between concurrent
//! readers and writers.
//!
//! This is the building block of a database buffer pool. A [`SlotPool`]
//! owns a bounded set of [`PageSlot`] frames; a page table (not part of
//! this crate) maps page identities to slots, binds frames with
//! [`PageSlot::rebind`], and recycles them through the pool's free list.
//! Callers claim a frame with [`PageSlot::pin`], which validates the slot's
//! identity both before and after taking the slot's reader/writer lock, so
//! a caller that believes it holds one page can never silently observe
//! another page's bytes after a concurrent eviction rebinds the frame. A
//! failed pin is the normal way of losing that race: retry the lookup.
//!
//! ```
//! use framepool::{FileId, Options, PageRef, SlotPool};
//!
//! let pool = SlotPool::new(Options::default());
//! let slot = pool.acquire().expect("pool exhausted");
//!
//! // The page table binds the frame, then fills it under an exclusive pin.
//! let page = PageRef::new(FileId::new(1), 7);
//! slot.rebind(page);
//! {
//!     let mut pin = slot.pin_exclusive(page).expect("no rebind raced");
//!     pin.data_mut()[0] = 42;
//! }
//!
//! // Readers pin shared; a failed pin means the lookup must be retried.
//! let pin = slot.pin_shared(page).expect("identity still matches");
//! assert_eq!(pin.data()[0], 42);
//! drop(pin);
//!
//! pool.release(&slot).unwrap();
//! ```

#![warn(missing_docs, unreachable_pub)]

mod error;
pub use error::{Error, Result};

mod identity;
pub use identity::{FileId, Identity, PageRef};

mod slot;
pub use slot::{ExclusivePin, LockKind, PageSlot, SharedPin};

mod pool;
pub use pool::{Options, SlotPool};
