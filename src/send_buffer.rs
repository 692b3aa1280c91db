//! Outbound byte queue with stream flow control and watermark tracking.
//!
//! Bytes are queued in encode order and drained by write attempts, bounded
//! by the peer's flow-control limit — an absolute byte offset raised by
//! window updates, QUIC `MAX_STREAM_DATA` style. A partial accept by the
//! transport is a flow-control condition, not an error: the remainder stays
//! queued for a later attempt.

use bytes::{Buf, BytesMut};

/// Outbound queue for one stream.
#[derive(Debug)]
pub struct SendBuffer {
    /// Bytes queued but not yet accepted by the transport.
    buf: BytesMut,
    /// Absolute offset of the next byte the transport will accept
    /// (bytes accepted so far).
    sent: u64,
    /// Flow-control limit: bytes at or beyond this offset may not be sent.
    max_offset: u64,
    /// End of output has been queued behind the buffered bytes.
    fin_queued: bool,
    /// End of output has been accepted by the transport.
    fin_sent: bool,
}

impl SendBuffer {
    pub fn new(initial_window: u64) -> Self {
        Self {
            buf: BytesMut::new(),
            sent: 0,
            max_offset: initial_window,
            fin_queued: false,
            fin_sent: false,
        }
    }

    /// Append bytes behind everything already queued.
    pub fn queue(&mut self, data: &[u8]) {
        debug_assert!(!self.fin_queued, "queue after fin");
        self.buf.extend_from_slice(data);
    }

    /// Mark end of output after everything already queued.
    pub fn queue_fin(&mut self) {
        self.fin_queued = true;
    }

    /// Unflushed byte count — the watermark occupancy.
    pub fn queued_len(&self) -> usize {
        self.buf.len()
    }

    /// Raise the flow-control limit. Limits never regress.
    pub fn update_window(&mut self, new_limit: u64) {
        self.max_offset = self.max_offset.max(new_limit);
    }

    /// Queued bytes have reached the outstanding window.
    pub fn is_blocked(&self) -> bool {
        !self.buf.is_empty() && self.sent >= self.max_offset
    }

    /// The window-permitted prefix of the queued bytes, with whether the
    /// queued fin would accompany it. Empty-with-fin is a valid attempt:
    /// fin consumes no window.
    pub fn sendable(&self) -> (&[u8], bool) {
        let window = (self.max_offset - self.sent.min(self.max_offset)) as usize;
        let n = self.buf.len().min(window);
        let fin = self.fin_queued && !self.fin_sent && n == self.buf.len();
        (&self.buf[..n], fin)
    }

    /// Record a transport accept of `n` bytes (and the fin, when the
    /// accept covered the whole attempt).
    pub fn mark_sent(&mut self, n: usize, fin_accepted: bool) {
        debug_assert!(n <= self.buf.len());
        self.buf.advance(n);
        self.sent += n as u64;
        if fin_accepted {
            debug_assert!(self.buf.is_empty());
            self.fin_sent = true;
        }
    }

    pub fn fin_queued(&self) -> bool {
        self.fin_queued
    }

    /// End of output fully handed to the transport.
    pub fn fin_sent(&self) -> bool {
        self.fin_sent
    }

    /// Drop all queued bytes (reset, or deferred post-teardown cleanup).
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Edge-triggered occupancy thresholds over the send buffer.
///
/// Crossing at or above `high` while unlatched reports the high watermark
/// exactly once and latches; crossing at or below `low` while latched
/// reports the low watermark exactly once and unlatches. Repeated checks on
/// the same side of a threshold report nothing.
#[derive(Debug)]
pub struct Watermark {
    high: usize,
    low: usize,
    above: bool,
}

impl Watermark {
    pub fn new(high: usize, low: usize) -> Self {
        debug_assert!(low < high, "low watermark must be below high");
        Self {
            high,
            low,
            above: false,
        }
    }

    /// Check for an upward crossing at the given occupancy.
    pub fn check_high(&mut self, occupancy: usize) -> bool {
        if !self.above && occupancy >= self.high {
            self.above = true;
            return true;
        }
        false
    }

    /// Check for a downward crossing at the given occupancy.
    pub fn check_low(&mut self, occupancy: usize) -> bool {
        if self.above && occupancy <= self.low {
            self.above = false;
            return true;
        }
        false
    }

    pub fn is_above(&self) -> bool {
        self.above
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_bounded_by_window() {
        let mut sb = SendBuffer::new(10);
        sb.queue(&[b'a'; 25]);
        let (chunk, fin) = sb.sendable();
        assert_eq!(chunk.len(), 10);
        assert!(!fin);
        sb.mark_sent(10, false);
        assert!(sb.is_blocked());
        assert_eq!(sb.queued_len(), 15);

        sb.update_window(30);
        assert!(!sb.is_blocked());
        let (chunk, _) = sb.sendable();
        assert_eq!(chunk.len(), 15);
    }

    #[test]
    fn window_never_regresses() {
        let mut sb = SendBuffer::new(100);
        sb.update_window(50);
        sb.queue(&[0; 80]);
        assert_eq!(sb.sendable().0.len(), 80);
    }

    #[test]
    fn fin_rides_the_last_byte() {
        let mut sb = SendBuffer::new(4);
        sb.queue(b"abcdef");
        sb.queue_fin();
        let (chunk, fin) = sb.sendable();
        assert_eq!(chunk, b"abcd");
        assert!(!fin); // window cuts the attempt short of the end
        sb.mark_sent(4, false);
        sb.update_window(100);
        let (chunk, fin) = sb.sendable();
        assert_eq!(chunk, b"ef");
        assert!(fin);
        sb.mark_sent(2, true);
        assert!(sb.fin_sent());
    }

    #[test]
    fn empty_fin_attempt() {
        let mut sb = SendBuffer::new(0);
        sb.queue_fin();
        let (chunk, fin) = sb.sendable();
        assert!(chunk.is_empty());
        assert!(fin); // fin consumes no window
    }

    #[test]
    fn partial_accept_keeps_remainder() {
        let mut sb = SendBuffer::new(100);
        sb.queue(b"abcdef");
        sb.mark_sent(2, false);
        assert_eq!(sb.sendable().0, b"cdef");
    }

    #[test]
    fn watermark_latch_fires_once_per_crossing() {
        let mut wm = Watermark::new(16, 8);
        assert!(!wm.check_high(15));
        assert!(wm.check_high(16));
        assert!(!wm.check_high(40)); // still above, latched
        assert!(!wm.check_low(9)); // not yet at low
        assert!(wm.check_low(8));
        assert!(!wm.check_low(3)); // still below, unlatched
        assert!(wm.check_high(20)); // new crossing
    }

    #[test]
    fn low_requires_prior_high() {
        let mut wm = Watermark::new(16, 8);
        assert!(!wm.check_low(0));
    }
}
