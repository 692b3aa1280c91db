//! The capability seams between the stream core and its collaborators.
//!
//! The QUIC transport and the application decoder are both external: the
//! stream core talks downward through [`StreamSink`] (the connection's
//! non-owning write-submission capability) and upward through
//! [`StreamHandler`]. Handler callbacks receive the stream again so they
//! may re-enter its operations — disable reads, encode response bytes, or
//! reset — from inside a delivery.

use bytes::Bytes;

use crate::header::{HeaderBlock, HeaderField};
use crate::reset::ResetReason;
use crate::stream::RequestStream;

/// Result of one transport write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The transport accepted this many bytes (possibly zero, possibly
    /// fewer than offered). Unaccepted bytes stay queued.
    Accepted(usize),
    /// The connection went away inside the write call. The stream must not
    /// re-enter teardown logic from this frame.
    ConnectionGone,
}

/// Write-submission capability of the connection that owns the stream.
pub trait StreamSink {
    /// Submit ordered stream bytes. `fin` marks the end of output and is
    /// only considered delivered when the accept covers all of `data`.
    fn write(&mut self, data: &[u8], fin: bool) -> WriteOutcome;

    /// Header-list encoding only: submit a header or trailer set out of
    /// band from the byte stream.
    fn send_header_list(&mut self, fields: &[HeaderField], fin: bool);

    /// Abort the stream toward the peer.
    fn send_reset(&mut self, error_code: u64);

    /// Ask the peer to stop sending (framed encoding's half-close-read
    /// primitive; the header-list encoding has none).
    fn send_stop_input(&mut self, error_code: u64);
}

/// Application-side decoder callbacks plus write back-pressure signals.
pub trait StreamHandler<S: StreamSink>: Sized {
    /// A complete request header set, cookie fragments already coalesced.
    fn on_headers(&mut self, stream: &mut RequestStream<S>, headers: HeaderBlock, end_stream: bool);

    /// Contiguous body bytes, merged across however many transport ranges
    /// carried them.
    fn on_body(&mut self, stream: &mut RequestStream<S>, body: Bytes, end_stream: bool);

    /// The trailer set, delivered only after all body bytes.
    fn on_trailers(&mut self, stream: &mut RequestStream<S>, trailers: HeaderBlock);

    /// The stream is gone. Fires at most once; deliberately receives no
    /// stream reference — there is nothing left to operate on.
    fn on_reset(&mut self, reason: ResetReason, error_code: u64);

    /// Send-buffer occupancy crossed above the high watermark.
    fn on_above_high_watermark(&mut self, stream: &mut RequestStream<S>) {
        let _ = stream;
    }

    /// Send-buffer occupancy fell back to the low watermark.
    fn on_below_low_watermark(&mut self, stream: &mut RequestStream<S>) {
        let _ = stream;
    }
}
