//! Inbound stream reassembly: out-of-order byte ranges in, contiguous
//! bytes out.
//!
//! The transport may deliver ranges in any order, with gaps, duplicates,
//! and overlaps. The buffer keeps the not-yet-contiguous ranges keyed by
//! offset and hands back the contiguous prefix as it fills in. Overlapping
//! ranges are assumed to carry identical bytes (the transport retransmits
//! verbatim); the first copy wins.

use std::collections::BTreeMap;

use crate::error::StreamError;

#[derive(Debug, Default)]
pub struct RecvBuffer {
    /// Next byte offset to hand to the consumer.
    read_offset: u64,
    /// Buffered ranges, non-overlapping, keyed by start offset.
    segments: BTreeMap<u64, Vec<u8>>,
    /// Total stream length, once a fin has been seen.
    final_size: Option<u64>,
}

impl RecvBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer one received range.
    pub fn insert(&mut self, offset: u64, data: &[u8], fin: bool) -> Result<(), StreamError> {
        let end = offset + data.len() as u64;
        if let Some(fs) = self.final_size {
            if end > fs || (fin && end != fs) {
                return Err(StreamError::FinalSize);
            }
        }
        if fin {
            if end < self.read_offset {
                return Err(StreamError::FinalSize);
            }
            if let Some((&s, seg)) = self.segments.last_key_value() {
                if s + seg.len() as u64 > end {
                    return Err(StreamError::FinalSize);
                }
            }
            self.final_size = Some(end);
        }

        // Keep only the parts not already consumed or buffered.
        let mut start = offset.max(self.read_offset);
        while start < end {
            // Skip past any buffered range covering `start`.
            if let Some((&s, seg)) = self.segments.range(..=start).next_back() {
                let s_end = s + seg.len() as u64;
                if s_end > start {
                    start = s_end;
                    continue;
                }
            }
            // Gap at `start`, bounded by the next buffered range or `end`.
            let gap_end = self
                .segments
                .range(start..)
                .next()
                .map(|(&s, _)| s.min(end))
                .unwrap_or(end);
            let lo = (start - offset) as usize;
            let hi = (gap_end - offset) as usize;
            self.segments.insert(start, data[lo..hi].to_vec());
            start = gap_end;
        }
        Ok(())
    }

    /// Take all bytes contiguously available at the read offset.
    pub fn take_contiguous(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some((&s, _)) = self.segments.first_key_value() {
            if s > self.read_offset {
                break;
            }
            let (s, seg) = self.segments.pop_first().unwrap();
            let s_end = s + seg.len() as u64;
            if s_end <= self.read_offset {
                continue;
            }
            let skip = (self.read_offset - s) as usize;
            out.extend_from_slice(&seg[skip..]);
            self.read_offset = s_end;
        }
        out
    }

    /// Next byte offset the consumer will see.
    pub fn read_offset(&self) -> u64 {
        self.read_offset
    }

    pub fn final_size(&self) -> Option<u64> {
        self.final_size
    }

    /// All bytes up to the fin have been taken.
    pub fn at_end(&self) -> bool {
        self.final_size == Some(self.read_offset)
    }

    /// Ranges are buffered beyond the contiguous prefix.
    pub fn has_pending(&self) -> bool {
        !self.segments.is_empty()
    }

    /// Discard everything buffered (stream reset).
    pub fn clear(&mut self) {
        self.segments.clear();
    }
}
