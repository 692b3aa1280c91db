use crate::reset::code;

/// Protocol violations detected by the stream core.
///
/// These never escape to the driver: the stream resolves each one by issuing
/// a local reset, and the only externally visible signal is the handler's
/// `on_reset` callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("header list exceeds the configured size limit")]
    HeadersTooLarge,

    #[error("trailer list exceeds the configured size limit")]
    TrailersTooLarge,

    #[error("second trailer set arrived before the first was delivered")]
    DuplicateTrailers,

    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),

    #[error("unexpected frame type {0:#x}")]
    FrameUnexpected(u64),

    #[error("header block decoding failed")]
    HeaderDecode,

    #[error("stream data inconsistent with its final size")]
    FinalSize,
}

impl StreamError {
    /// The application error code a local reset carries for this violation.
    pub fn error_code(&self) -> u64 {
        match self {
            StreamError::HeadersTooLarge | StreamError::TrailersTooLarge => code::EXCESSIVE_LOAD,
            StreamError::DuplicateTrailers => code::MESSAGE_ERROR,
            StreamError::MalformedFrame(_) | StreamError::FinalSize => code::FRAME_ERROR,
            StreamError::FrameUnexpected(_) => code::FRAME_UNEXPECTED,
            StreamError::HeaderDecode => code::QPACK_DECOMPRESSION_FAILED,
        }
    }
}
