//! The per-stream state machine.
//!
//! `RequestStream` normalizes both wire encodings into ordered
//! header → body → trailer delivery toward the application handler, and
//! drives outbound encoding through the flow-controlled send buffer. All
//! entry points run on the single control thread that owns the stream;
//! "deferring" work means queueing it for the driver's next
//! [`run_deferred`](RequestStream::run_deferred) call.
//!
//! Delivery ordering is stricter than arrival ordering: the header-list
//! encoding can hand us trailers before the body bytes they trail, and the
//! application may gate body delivery with [`disable_read`]. Buffered
//! trailers are held until the body is drained and finished, and body
//! always carries its own fin flag reflecting whether trailers follow.
//!
//! [`disable_read`]: RequestStream::disable_read

use std::collections::VecDeque;

use bytes::BytesMut;

use crate::codec::{HeaderCodec, LiteralCodec};
use crate::config::{StreamConfig, WireMode};
use crate::error::StreamError;
use crate::frame::{self, FrameDemux, Segment, FRAME_DATA};
use crate::header::{HeaderBlock, HeaderEvent, HeaderField};
use crate::metrics;
use crate::read_control::ReadGate;
use crate::recv_buffer::RecvBuffer;
use crate::reset::{code, ResetReason, ResetRecord};
use crate::send_buffer::{SendBuffer, Watermark};
use crate::transport::{StreamHandler, StreamSink, WriteOutcome};

/// Read-side progression of a request stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Waiting for the initial header set.
    AwaitingHeaders,
    /// Headers delivered; body bytes may arrive.
    ReadingBody,
    /// All body bytes delivered; trailers or end of stream outstanding.
    AwaitingTrailersOrFin,
    /// Read side done — fin delivered, trailers delivered, or reset.
    Closed,
}

/// Watermark notifications raised while a handler callback may already be
/// on the stack; drained by the outermost frame.
enum Notice {
    AboveHigh,
    BelowLow,
}

/// Work that must not run in the call frame that produced it.
enum Deferred {
    /// Flush gated body after the read-disable depth returned to zero.
    ResumeReading,
    /// Zero the queued-byte accounting of a stream whose connection died
    /// inside a write attempt.
    ClearSendAccounting,
}

/// Server-side adapter for one bidirectional transport stream.
pub struct RequestStream<S: StreamSink> {
    id: u64,
    mode: WireMode,
    max_header_list_size: usize,
    sink: S,
    codec: Box<dyn HeaderCodec>,

    // Read side.
    state: StreamState,
    recv: RecvBuffer,
    demux: FrameDemux,
    /// Demuxed body bytes awaiting gate clearance.
    pending_body: BytesMut,
    /// Body bytes extracted from the wire so far (frame payloads in framed
    /// mode, raw stream bytes in header-list mode).
    body_offset: u64,
    /// Total body length promised by `:final-offset`, when known.
    final_body_size: Option<u64>,
    /// All body bytes are in: explicit fin, or the `:final-offset` total
    /// was reached.
    body_fin_seen: bool,
    /// An `on_body(_, end_stream=true)` (or fin-bearing header set) has
    /// been delivered.
    body_end_delivered: bool,
    headers_delivered: bool,
    trailers: Option<HeaderBlock>,
    trailers_delivered: bool,
    gate: ReadGate,

    // Write side.
    send: SendBuffer,
    watermark: Watermark,
    /// End of output has been encoded (fin data, fin headers, or trailers).
    local_end_stream: bool,
    /// Trailers encoded: the stream is closing, watermark callbacks stop.
    trailers_encoded: bool,
    body_bytes_sent: u64,

    // Teardown.
    reset: Option<ResetRecord>,
    reset_notified: bool,
    connection_gone: bool,

    notices: VecDeque<Notice>,
    notifying: bool,
    deferred: VecDeque<Deferred>,
}

impl<S: StreamSink> RequestStream<S> {
    /// A stream using the bundled literal-only header codec.
    pub fn new(id: u64, config: StreamConfig, sink: S) -> Self {
        Self::with_codec(id, config, sink, Box::new(LiteralCodec))
    }

    /// A stream using a caller-supplied header codec (framed mode; the
    /// header-list encoding never touches the codec).
    pub fn with_codec(
        id: u64,
        config: StreamConfig,
        sink: S,
        codec: Box<dyn HeaderCodec>,
    ) -> Self {
        Self {
            id,
            mode: config.wire_mode,
            max_header_list_size: config.max_header_list_size,
            sink,
            codec,
            state: StreamState::AwaitingHeaders,
            recv: RecvBuffer::new(),
            demux: FrameDemux::new(config.max_header_list_size),
            pending_body: BytesMut::new(),
            body_offset: 0,
            final_body_size: None,
            body_fin_seen: false,
            body_end_delivered: false,
            headers_delivered: false,
            trailers: None,
            trailers_delivered: false,
            gate: ReadGate::default(),
            send: SendBuffer::new(config.initial_send_window),
            watermark: Watermark::new(config.high_watermark, config.low_watermark),
            local_end_stream: false,
            trailers_encoded: false,
            body_bytes_sent: 0,
            reset: None,
            reset_notified: false,
            connection_gone: false,
            notices: VecDeque::new(),
            notifying: false,
            deferred: VecDeque::new(),
        }
    }

    // ── Inbound entry points (driver-facing) ────────────────────────

    /// An ordered-byte-stream range from the transport. Ranges may arrive
    /// out of order or with gaps; body is reassembled before delivery.
    pub fn on_stream_frame<H: StreamHandler<S>>(
        &mut self,
        offset: u64,
        data: &[u8],
        fin: bool,
        h: &mut H,
    ) {
        if self.reset.is_some() || self.state == StreamState::Closed {
            return;
        }
        if let Err(e) = self.ingest_frame(offset, data, fin, h) {
            self.reset_on_error(e, h);
            return;
        }
        self.try_deliver(h);
    }

    /// A pre-parsed header or trailer set from the transport (header-list
    /// encoding only; ignored in framed mode).
    pub fn on_header_list<H: StreamHandler<S>>(
        &mut self,
        fin: bool,
        uncompressed_len: usize,
        fields: Vec<HeaderField>,
        h: &mut H,
    ) {
        if self.reset.is_some() || self.state == StreamState::Closed {
            return;
        }
        if self.mode != WireMode::HeaderList {
            return;
        }
        if let Err(e) = self.ingest_header_list(fin, uncompressed_len, fields, h) {
            self.reset_on_error(e, h);
            return;
        }
        self.try_deliver(h);
    }

    /// The peer raised this stream's flow-control limit (absolute byte
    /// offset). Raising the window never drains by itself; the next encode
    /// or [`on_can_write`](Self::on_can_write) does.
    pub fn on_window_update(&mut self, new_limit: u64) {
        if self.reset.is_some() {
            return;
        }
        self.send.update_window(new_limit);
    }

    /// The transport is ready to accept more outbound bytes.
    pub fn on_can_write<H: StreamHandler<S>>(&mut self, h: &mut H) {
        if self.reset.is_some() || self.connection_gone {
            return;
        }
        self.flush_once(h);
        self.check_watermarks(h);
    }

    /// The peer reset the stream.
    pub fn on_stream_reset<H: StreamHandler<S>>(&mut self, error_code: u64, h: &mut H) {
        if self.reset.is_some() {
            return;
        }
        self.reset = Some(ResetRecord {
            reason: ResetReason::RemoteReset,
            error_code,
        });
        metrics::RESETS_REMOTE.increment();
        self.state = StreamState::Closed;
        self.send.clear();
        self.discard_read_state();
        self.notify_reset(h);
    }

    /// The owning connection closed outside any write attempt.
    ///
    /// The application is notified unless its response was already fully
    /// encoded — a stream that ended cleanly on both sides has nothing to
    /// report.
    pub fn on_connection_closed<H: StreamHandler<S>>(&mut self, error_code: u64, h: &mut H) {
        self.connection_gone = true;
        if self.reset.is_some() {
            return;
        }
        self.reset = Some(ResetRecord {
            reason: ResetReason::ConnectionFailure,
            error_code,
        });
        metrics::RESETS_LOCAL.increment();
        self.state = StreamState::Closed;
        self.send.clear();
        self.discard_read_state();
        if self.local_end_stream {
            self.reset_notified = true;
        } else {
            self.notify_reset(h);
        }
    }

    /// Run work deferred to this control-loop iteration. The driver calls
    /// this once per loop; it is a no-op when nothing is queued.
    pub fn run_deferred<H: StreamHandler<S>>(&mut self, h: &mut H) {
        while let Some(task) = self.deferred.pop_front() {
            match task {
                Deferred::ResumeReading => {
                    self.gate.set_resume_queued(false);
                    self.try_deliver(h);
                }
                Deferred::ClearSendAccounting => {
                    self.send.clear();
                }
            }
        }
    }

    pub fn has_deferred_work(&self) -> bool {
        !self.deferred.is_empty()
    }

    // ── Application operations ──────────────────────────────────────

    /// Encode response headers. May fire the high-watermark callback.
    pub fn encode_headers<H: StreamHandler<S>>(
        &mut self,
        headers: &HeaderBlock,
        end_stream: bool,
        h: &mut H,
    ) {
        if self.reset.is_some() || self.local_end_stream {
            return;
        }
        if end_stream {
            self.local_end_stream = true;
        }
        match self.mode {
            WireMode::HeaderList => {
                self.sink.send_header_list(headers.fields(), end_stream);
            }
            WireMode::Framed => {
                let block = self.codec.encode(headers.fields());
                let mut buf = Vec::with_capacity(block.len() + 16);
                frame::encode_frame_header(&mut buf, frame::FRAME_HEADERS, block.len() as u64);
                buf.extend_from_slice(&block);
                self.queue_output(&buf, end_stream, h);
            }
        }
    }

    /// Encode response body bytes. May fire the high-watermark callback.
    pub fn encode_data<H: StreamHandler<S>>(&mut self, data: &[u8], end_stream: bool, h: &mut H) {
        if self.reset.is_some() || self.local_end_stream {
            return;
        }
        if end_stream {
            self.local_end_stream = true;
        }
        self.body_bytes_sent += data.len() as u64;
        match self.mode {
            WireMode::HeaderList => self.queue_output(data, end_stream, h),
            WireMode::Framed => {
                let mut buf = Vec::with_capacity(data.len() + 16);
                if !data.is_empty() {
                    frame::encode_frame_header(&mut buf, FRAME_DATA, data.len() as u64);
                    buf.extend_from_slice(data);
                }
                self.queue_output(&buf, end_stream, h);
            }
        }
    }

    /// Encode response trailers. Trailers always end the output, so no
    /// watermark callback fires from here on — the stream is closing.
    pub fn encode_trailers<H: StreamHandler<S>>(&mut self, trailers: &HeaderBlock, h: &mut H) {
        if self.reset.is_some() || self.local_end_stream {
            return;
        }
        self.local_end_stream = true;
        self.trailers_encoded = true;
        match self.mode {
            WireMode::HeaderList => {
                let mut t = trailers.clone();
                t.push_final_offset(self.body_bytes_sent);
                self.sink.send_header_list(t.fields(), true);
            }
            WireMode::Framed => {
                let block = self.codec.encode(trailers.fields());
                let mut buf = Vec::with_capacity(block.len() + 16);
                frame::encode_frame_header(&mut buf, frame::FRAME_HEADERS, block.len() as u64);
                buf.extend_from_slice(&block);
                self.queue_output(&buf, true, h);
            }
        }
    }

    /// Gate body delivery. Disables nest.
    pub fn disable_read(&mut self) {
        self.gate.disable();
    }

    /// Undo one [`disable_read`](Self::disable_read); enabling past zero is
    /// a no-op. Reaching depth zero resumes delivery on the next control-
    /// loop iteration, never inline.
    pub fn enable_read(&mut self) {
        if self.reset.is_some() {
            return;
        }
        if self.gate.enable() {
            self.gate.set_resume_queued(true);
            self.deferred.push_back(Deferred::ResumeReading);
        }
    }

    /// Reset the stream from the application.
    pub fn reset<H: StreamHandler<S>>(&mut self, reason: ResetReason, h: &mut H) {
        if self.reset.is_some() {
            return;
        }
        // A fully-encoded response means the reset only needs to stop the
        // read side; signal it with the no-error code.
        let error_code = if self.local_end_stream {
            code::NO_ERROR
        } else {
            code::REQUEST_CANCELLED
        };
        self.local_reset(reason, error_code, h);
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn wire_mode(&self) -> WireMode {
        self.mode
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Queued bytes have reached the peer's flow-control limit.
    pub fn is_flow_control_blocked(&self) -> bool {
        self.send.is_blocked()
    }

    /// Unflushed outbound bytes (the watermark occupancy).
    pub fn bytes_to_send(&self) -> usize {
        self.send.queued_len()
    }

    pub fn is_read_disabled(&self) -> bool {
        self.gate.is_disabled()
    }

    pub fn is_reset(&self) -> bool {
        self.reset.is_some()
    }

    pub fn reset_record(&self) -> Option<ResetRecord> {
        self.reset
    }

    pub fn local_end_stream(&self) -> bool {
        self.local_end_stream
    }

    // ── Ingestion ───────────────────────────────────────────────────

    fn ingest_frame<H: StreamHandler<S>>(
        &mut self,
        offset: u64,
        data: &[u8],
        fin: bool,
        h: &mut H,
    ) -> Result<(), StreamError> {
        self.recv.insert(offset, data, fin)?;
        let bytes = self.recv.take_contiguous();
        match self.mode {
            WireMode::HeaderList => {
                if !bytes.is_empty() {
                    self.body_offset += bytes.len() as u64;
                    self.pending_body.extend_from_slice(&bytes);
                }
                if let Some(total) = self.final_body_size {
                    if self.body_offset > total {
                        return Err(StreamError::FinalSize);
                    }
                    if self.body_offset == total {
                        self.body_fin_seen = true;
                    }
                }
                if self.recv.at_end() {
                    self.body_fin_seen = true;
                }
            }
            WireMode::Framed => {
                let mut segments = Vec::new();
                self.demux.push(&bytes, &mut segments)?;
                for segment in segments {
                    match segment {
                        Segment::HeaderBlock(block) => self.ingest_header_block(block, h)?,
                        Segment::Body(body) => {
                            if !self.headers_delivered || self.trailers.is_some() {
                                return Err(StreamError::FrameUnexpected(FRAME_DATA));
                            }
                            self.body_offset += body.len() as u64;
                            self.pending_body.extend_from_slice(&body);
                        }
                    }
                }
                if self.recv.at_end() {
                    if !self.demux.at_boundary() {
                        return Err(StreamError::MalformedFrame("end of stream inside a frame"));
                    }
                    self.body_fin_seen = true;
                }
            }
        }
        Ok(())
    }

    /// One complete header block out of the framed demux, normalized into a
    /// [`HeaderEvent`]. This encoding never overloads headers with
    /// end-of-stream: a request without a body gets an explicit empty fin
    /// body once the stream fin is consumed.
    fn ingest_header_block<H: StreamHandler<S>>(
        &mut self,
        block: Vec<u8>,
        h: &mut H,
    ) -> Result<(), StreamError> {
        let fields = self.codec.decode(&block)?;
        let block = HeaderBlock::from_fields(fields);
        let uncompressed_len = block.uncompressed_size();
        self.accept_header_event(
            HeaderEvent {
                block,
                fin: false,
                uncompressed_len,
            },
            h,
        )
    }

    fn ingest_header_list<H: StreamHandler<S>>(
        &mut self,
        fin: bool,
        uncompressed_len: usize,
        fields: Vec<HeaderField>,
        h: &mut H,
    ) -> Result<(), StreamError> {
        let block = HeaderBlock::from_fields(fields);
        let uncompressed_len = uncompressed_len.max(block.uncompressed_size());
        self.accept_header_event(
            HeaderEvent {
                block,
                fin,
                uncompressed_len,
            },
            h,
        )
    }

    /// The normalized header path shared by both encodings: the first event
    /// is the request headers, the second is the trailer set.
    fn accept_header_event<H: StreamHandler<S>>(
        &mut self,
        event: HeaderEvent,
        h: &mut H,
    ) -> Result<(), StreamError> {
        let HeaderEvent {
            mut block,
            fin,
            uncompressed_len,
        } = event;
        if !self.headers_delivered {
            if uncompressed_len > self.max_header_list_size {
                return Err(StreamError::HeadersTooLarge);
            }
            block.coalesce_cookies();
            self.headers_delivered = true;
            metrics::REQUESTS_RECEIVED.increment();
            if fin {
                // No body follows; the header set carries end of stream.
                self.body_fin_seen = true;
                self.body_end_delivered = true;
                self.state = StreamState::Closed;
            } else {
                self.state = StreamState::ReadingBody;
            }
            h.on_headers(self, block, fin);
        } else {
            if self.trailers.is_some() || self.trailers_delivered {
                return Err(StreamError::DuplicateTrailers);
            }
            if uncompressed_len > self.max_header_list_size {
                return Err(StreamError::TrailersTooLarge);
            }
            if self.mode == WireMode::HeaderList {
                // The reserved marker names the total body length; strip it
                // and use it to detect body completion when no fin
                // accompanied the last chunk.
                if let Some(total) = block.take_final_offset()? {
                    if self.body_offset > total {
                        return Err(StreamError::FinalSize);
                    }
                    self.final_body_size = Some(total);
                    if self.body_offset == total {
                        self.body_fin_seen = true;
                    }
                }
            }
            self.trailers = Some(block);
        }
        Ok(())
    }

    // ── Delivery ────────────────────────────────────────────────────

    fn try_deliver<H: StreamHandler<S>>(&mut self, h: &mut H) {
        if self.reset.is_some() || !self.headers_delivered || self.state == StreamState::Closed {
            return;
        }
        if !self.gate.can_deliver() {
            return;
        }

        let body_complete = self.body_fin_seen;
        let has_trailers = self.trailers.is_some();

        // Body first. The fin flag reflects whether trailers follow; an
        // empty fin delivery closes out a request whose header set could
        // not carry end-of-stream itself.
        let deliver_end = body_complete && !has_trailers && !self.body_end_delivered;
        if !self.pending_body.is_empty() || deliver_end {
            let data = self.pending_body.split().freeze();
            let end = body_complete && !has_trailers;
            metrics::BODY_BYTES_DELIVERED.add(data.len() as u64);
            if end {
                self.body_end_delivered = true;
                self.state = StreamState::Closed;
            } else if body_complete {
                self.state = StreamState::AwaitingTrailersOrFin;
            }
            self.gate.begin_delivery();
            h.on_body(self, data, end);
            self.gate.end_delivery();
            if self.reset.is_some() {
                return;
            }
        }

        // Trailers second, once the body is drained and finished. A
        // disable issued inside the body callback holds them back too.
        if body_complete && self.pending_body.is_empty() && self.gate.can_deliver() {
            if let Some(trailers) = self.trailers.take() {
                self.trailers_delivered = true;
                self.state = StreamState::Closed;
                metrics::TRAILERS_RECEIVED.increment();
                h.on_trailers(self, trailers);
            }
        }
    }

    // ── Outbound plumbing ───────────────────────────────────────────

    fn queue_output<H: StreamHandler<S>>(&mut self, bytes: &[u8], fin: bool, h: &mut H) {
        self.send.queue(bytes);
        if fin {
            self.send.queue_fin();
        }
        self.flush_once(h);
        self.check_watermarks(h);
    }

    /// One write attempt against the sink, bounded by the flow-control
    /// window. Partial accepts leave the remainder queued.
    fn flush_once<H: StreamHandler<S>>(&mut self, h: &mut H) {
        if self.connection_gone || self.reset.is_some() || self.send.fin_sent() {
            return;
        }
        let (chunk, fin) = self.send.sendable();
        if chunk.is_empty() && !fin {
            return;
        }
        let offered = chunk.len();
        match self.sink.write(chunk, fin) {
            WriteOutcome::Accepted(accepted) => {
                let accepted = accepted.min(offered);
                self.send.mark_sent(accepted, fin && accepted == offered);
            }
            WriteOutcome::ConnectionGone => self.connection_gone_during_write(h),
        }
    }

    /// The connection died inside our own write call. Tear down without
    /// re-entering the transport, fire no watermark callbacks, and leave
    /// the queued-byte accounting to the next control-loop iteration.
    fn connection_gone_during_write<H: StreamHandler<S>>(&mut self, h: &mut H) {
        self.connection_gone = true;
        self.deferred.push_back(Deferred::ClearSendAccounting);
        if self.reset.is_some() {
            return;
        }
        self.reset = Some(ResetRecord {
            reason: ResetReason::ConnectionFailure,
            error_code: code::INTERNAL_ERROR,
        });
        metrics::RESETS_LOCAL.increment();
        self.state = StreamState::Closed;
        self.discard_read_state();
        if self.local_end_stream {
            self.reset_notified = true;
        } else {
            self.notify_reset(h);
        }
    }

    fn check_watermarks<H: StreamHandler<S>>(&mut self, h: &mut H) {
        if self.watermarks_suppressed() {
            return;
        }
        let occupancy = self.send.queued_len();
        if self.watermark.check_high(occupancy) {
            self.raise(Notice::AboveHigh, h);
        }
        if self.watermark.check_low(occupancy) {
            self.raise(Notice::BelowLow, h);
        }
    }

    fn watermarks_suppressed(&self) -> bool {
        self.connection_gone || self.reset.is_some() || self.trailers_encoded
    }

    /// Deliver a watermark notice, or queue it when a handler callback is
    /// already on the stack — the active drain loop picks it up, keeping
    /// nested encode calls from growing the stack.
    fn raise<H: StreamHandler<S>>(&mut self, notice: Notice, h: &mut H) {
        self.notices.push_back(notice);
        if self.notifying {
            return;
        }
        self.notifying = true;
        while let Some(notice) = self.notices.pop_front() {
            if self.watermarks_suppressed() {
                continue;
            }
            match notice {
                Notice::AboveHigh => h.on_above_high_watermark(self),
                Notice::BelowLow => h.on_below_low_watermark(self),
            }
        }
        self.notifying = false;
    }

    // ── Teardown ────────────────────────────────────────────────────

    fn reset_on_error<H: StreamHandler<S>>(&mut self, e: StreamError, h: &mut H) {
        if matches!(
            e,
            StreamError::HeadersTooLarge | StreamError::TrailersTooLarge
        ) {
            metrics::HEADERS_OVERSIZED.increment();
        }
        self.local_reset(ResetReason::LocalReset, e.error_code(), h);
    }

    fn local_reset<H: StreamHandler<S>>(
        &mut self,
        reason: ResetReason,
        error_code: u64,
        h: &mut H,
    ) {
        if self.reset.is_some() {
            return;
        }
        self.reset = Some(ResetRecord { reason, error_code });
        metrics::RESETS_LOCAL.increment();
        if !self.connection_gone {
            match self.mode {
                WireMode::Framed => {
                    self.sink.send_stop_input(error_code);
                    if !self.send.fin_sent() {
                        self.sink.send_reset(error_code);
                    }
                }
                WireMode::HeaderList => {
                    // No separate half-close-read primitive here: the abort
                    // doubles as the stop-reading signal.
                    self.sink.send_reset(error_code);
                }
            }
        }
        self.state = StreamState::Closed;
        self.send.clear();
        self.discard_read_state();
        self.notify_reset(h);
    }

    fn discard_read_state(&mut self) {
        self.recv.clear();
        self.pending_body.clear();
        self.trailers = None;
        self.gate.set_resume_queued(false);
        self.deferred
            .retain(|t| matches!(t, Deferred::ClearSendAccounting));
    }

    fn notify_reset<H: StreamHandler<S>>(&mut self, h: &mut H) {
        if self.reset_notified {
            return;
        }
        self.reset_notified = true;
        let record = self.reset.expect("reset record set before notification");
        h.on_reset(record.reason, record.error_code);
    }
}
