//! hq-stream metrics.
//!
//! Per-process counters, exposed through the metriken registry.

use metriken::{Counter, metric};

#[metric(
    name = "hq_stream/requests/received",
    description = "Request header sets delivered to the application"
)]
pub static REQUESTS_RECEIVED: Counter = Counter::new();

#[metric(
    name = "hq_stream/trailers/received",
    description = "Trailer sets delivered to the application"
)]
pub static TRAILERS_RECEIVED: Counter = Counter::new();

#[metric(
    name = "hq_stream/headers/oversized",
    description = "Header or trailer sets dropped for exceeding the size limit"
)]
pub static HEADERS_OVERSIZED: Counter = Counter::new();

#[metric(
    name = "hq_stream/resets/local",
    description = "Streams reset by this side"
)]
pub static RESETS_LOCAL: Counter = Counter::new();

#[metric(
    name = "hq_stream/resets/remote",
    description = "Streams reset by the peer"
)]
pub static RESETS_REMOTE: Counter = Counter::new();

#[metric(
    name = "hq_stream/body/bytes_delivered",
    description = "Body bytes handed to the application"
)]
pub static BODY_BYTES_DELIVERED: Counter = Counter::new();
