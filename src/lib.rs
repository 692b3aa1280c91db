//! Server-side adapter between a bidirectional QUIC transport stream and a
//! proxy's request/response decoder.
//!
//! One [`RequestStream`] per transport stream. The driver feeds transport
//! events in; the stream normalizes them into ordered
//! header → body → trailer callbacks toward a [`StreamHandler`], and turns
//! the handler's encode calls into flow-controlled writes through a
//! [`StreamSink`]:
//!
//! ```text
//!   transport events                      encode operations
//!   (byte ranges, header lists,          (headers, data, trailers,
//!    window updates, resets)              read gating, reset)
//!        │                                      ▲
//!   ┌────▼──────────────────────────────────────┴───┐
//!   │                RequestStream                  │
//!   │  demux / reassembly → state machine → gate    │
//!   │  send buffer ← watermarks ← flow control      │
//!   └────┬──────────────────────────────────────▲───┘
//!        │ on_headers / on_body / on_trailers   │ write / send_reset
//!        ▼ on_reset / watermark callbacks       │ (StreamSink)
//!     StreamHandler                          transport
//! ```
//!
//! Two wire encodings of the same logical protocol are supported
//! ([`WireMode`]): one where the transport delivers pre-parsed header lists
//! out of band from the body bytes (trailers carrying a `:final-offset`
//! marker), and one where headers, body, and trailers travel as
//! length-prefixed frames inside the ordered byte stream.
//!
//! Everything runs on the single control thread that owns the stream.
//! Work that must not run in the call frame that produced it — resuming
//! gated body delivery, clearing accounting after the connection dies
//! inside a write — is queued and drained by the driver's once-per-loop
//! [`run_deferred`](RequestStream::run_deferred) call.

pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod header;
pub mod metrics;
mod read_control;
pub mod recv_buffer;
pub mod reset;
pub mod send_buffer;
pub mod stream;
pub mod transport;

pub use codec::{HeaderCodec, LiteralCodec};
pub use config::{StreamConfig, WireMode};
pub use error::StreamError;
pub use header::{HeaderBlock, HeaderField, FINAL_OFFSET_KEY};
pub use reset::{code, ResetReason, ResetRecord};
pub use stream::{RequestStream, StreamState};
pub use transport::{StreamHandler, StreamSink, WriteOutcome};
