//! Return codes of the `mctoirc_*` functions.

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiResult {
    Ok = 0,
    /// No bridge with that handle (never created, or already destroyed).
    InvalidHandle = 1,
    /// A required pointer was null, not UTF-8, or not the expected JSON.
    InvalidArgument = 2,
    /// The outbound queue is full; the line was dropped.
    QueueFull = 3,
    /// Something failed inside the bridge. Details go to the log.
    Internal = 4,
}

impl From<mctoirc_core::Emit> for FfiResult {
    fn from(emit: mctoirc_core::Emit) -> Self {
        if emit.is_dropped() {
            FfiResult::QueueFull
        } else {
            FfiResult::Ok
        }
    }
}
