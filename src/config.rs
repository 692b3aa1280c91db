//! Per-stream configuration.

/// Which wire encoding the peer speaks.
///
/// Both encodings carry the same logical protocol; they differ in how header
/// sets reach the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireMode {
    /// Headers and trailers arrive as pre-parsed header-list events from the
    /// transport, out of band from the body byte stream. Trailers carry the
    /// reserved `:final-offset` key naming the total body length.
    HeaderList,
    /// Headers, body, and trailers are length-prefixed frames multiplexed
    /// inside the ordered byte stream.
    Framed,
}

/// Configuration for a [`RequestStream`](crate::RequestStream).
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Wire encoding of the peer.
    pub wire_mode: WireMode,
    /// Maximum uncompressed size of one header or trailer set, including the
    /// per-field accounting overhead. Exceeding it resets the stream.
    /// Default: 16 KiB.
    pub max_header_list_size: usize,
    /// Send-buffer occupancy at which the high-watermark callback fires.
    /// Default: 16 KiB.
    pub high_watermark: usize,
    /// Send-buffer occupancy at which the low-watermark callback fires once
    /// the high watermark was crossed. Must be below `high_watermark`.
    /// Default: 8 KiB + 1.
    pub low_watermark: usize,
    /// Initial flow-control send window (absolute byte limit until the first
    /// window update). Default: 16 KiB.
    pub initial_send_window: u64,
}

impl StreamConfig {
    /// Defaults for a stream speaking the given wire encoding.
    pub fn new(wire_mode: WireMode) -> Self {
        Self {
            wire_mode,
            max_header_list_size: 16 * 1024,
            high_watermark: 16 * 1024,
            low_watermark: 8 * 1024 + 1,
            initial_send_window: 16 * 1024,
        }
    }

    /// Defaults for the header-list encoding.
    pub fn header_list() -> Self {
        Self::new(WireMode::HeaderList)
    }

    /// Defaults for the framed encoding.
    pub fn framed() -> Self {
        Self::new(WireMode::Framed)
    }
}
