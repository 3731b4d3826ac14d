use thiserror::Error;

/// Errors reported by this crate.
///
/// An identity mismatch during a pin is deliberately not represented here:
/// losing a race against an eviction is a common, expected outcome that
/// callers handle by retrying their lookup, so [`PageSlot::pin`] reports it
/// through its return value instead.
///
/// [`PageSlot::pin`]: crate::PageSlot::pin
#[derive(Error, Debug)]
pub enum Error {
    /// A caller broke the pin protocol, e.g. released a hold with a lock
    /// kind it was not acquired with, or handed a pool a slot it does not
    /// own. This indicates a bug in the calling layer, not a runtime race,
    /// and should not be retried.
    #[error("Invalid argument")]
    InvalidArgument,
}

/// Result type used throughout this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
