//! Stream reset reasons and application error codes.

/// Application-level stream error codes (RFC 9114 Section 8.1, plus the
/// QPACK code from RFC 9204 Section 8.3).
///
/// Both wire encodings share this code space; the header-list encoding uses
/// [`NO_ERROR`](code::NO_ERROR) for its stop-reading-only reset.
pub mod code {
    pub const NO_ERROR: u64 = 0x100;
    pub const INTERNAL_ERROR: u64 = 0x102;
    pub const FRAME_UNEXPECTED: u64 = 0x105;
    pub const FRAME_ERROR: u64 = 0x106;
    pub const EXCESSIVE_LOAD: u64 = 0x107;
    pub const REQUEST_CANCELLED: u64 = 0x10c;
    pub const MESSAGE_ERROR: u64 = 0x10e;
    pub const QPACK_DECOMPRESSION_FAILED: u64 = 0x200;
}

/// Why a stream was torn down, as reported to the application handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    /// Reset initiated on this side, either by the application or by the
    /// stream core on a protocol violation.
    LocalReset,
    /// The peer reset the stream.
    RemoteReset,
    /// The underlying connection went away.
    ConnectionFailure,
}

/// Terminal reset state of a stream. At most one record exists per stream;
/// it guards the exactly-once `on_reset` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetRecord {
    pub reason: ResetReason,
    pub error_code: u64,
}
