//! Metric names for stream statistics.
//!
//! The names below are an operational contract: dashboards and alerts are
//! built against them, so they are emitted verbatim as
//! `<prefix>_<suffix>` through the `metrics` facade.
//!
//! # Example
//!
//! ```rust
//! use xds_server::metrics::{metric_name, sanitize_metric_name, REQUESTS_RECEIVED};
//!
//! assert_eq!(metric_name("xds", REQUESTS_RECEIVED), "xds_requests_received");
//! assert_eq!(sanitize_metric_name("zone/east:1"), "zone_east_1");
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// Prefix for State-of-the-World streams.
pub const SOTW_PREFIX: &str = "xds";

/// Prefix for incremental (delta) streams.
pub const DELTA_PREFIX: &str = "delta_xds";

/// Gauge of currently open streams.
pub const STREAMS_ACTIVE: &str = "streams_active";

/// Counter of confirmations, labeled by `type_url` and `confirmation`.
pub const REQUESTS_RECEIVED: &str = "requests_received";

/// Counter of responses sent, labeled by `type_url`.
pub const RESPONSES_SENT: &str = "responses_sent";

/// Summary of ready-to-ACK latency in milliseconds.
pub const DELIVERY: &str = "delivery";

/// Full metric name for `suffix` under `prefix`.
pub fn metric_name(prefix: &str, suffix: &str) -> String {
    format!("{prefix}_{suffix}")
}

/// Replace every character outside `[a-zA-Z_-0-9]` with `_`.
pub fn sanitize_metric_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Register descriptions for every stream metric under `prefix`.
pub fn describe_stream_metrics(prefix: &str) {
    describe_gauge!(
        metric_name(prefix, STREAMS_ACTIVE),
        "Number of active connections between a data plane and the control plane"
    );
    describe_counter!(
        metric_name(prefix, REQUESTS_RECEIVED),
        "Number of confirmations requests from a client"
    );
    describe_counter!(
        metric_name(prefix, RESPONSES_SENT),
        "Number of resources sent by the control plane"
    );
    describe_histogram!(
        metric_name(prefix, DELIVERY),
        Unit::Milliseconds,
        "Time from config ready for delivery to its ACK"
    );
}
