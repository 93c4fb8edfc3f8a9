//! Metrics definitions for the relay.

use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUESTS: MetricDef = MetricDef {
    name: "relay.requests",
    metric_type: MetricType::Counter,
    description: "Relay requests handled. Tagged with outcome (ok or the error code).",
};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "relay.duration",
    metric_type: MetricType::Histogram,
    description: "End-to-end relay duration in seconds. Tagged with outcome.",
};

pub const REQUESTS_INFLIGHT: MetricDef = MetricDef {
    name: "relay.requests.inflight",
    metric_type: MetricType::Gauge,
    description: "Number of relay requests currently being processed",
};

pub const PAYLOAD_BYTES: MetricDef = MetricDef {
    name: "relay.payload.bytes",
    metric_type: MetricType::Histogram,
    description: "Size of documents retrieved from the storage service",
};

pub const TOKEN_REFRESHED: MetricDef = MetricDef {
    name: "relay.token.refreshed",
    metric_type: MetricType::Counter,
    description: "Access tokens minted from the standing refresh token",
};

pub const METADATA_MISSING: MetricDef = MetricDef {
    name: "relay.metadata.missing",
    metric_type: MetricType::Counter,
    description: "Metadata lookups that failed and fell back to empty metadata",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REQUESTS,
    REQUEST_DURATION,
    REQUESTS_INFLIGHT,
    PAYLOAD_BYTES,
    TOKEN_REFRESHED,
    METADATA_MISSING,
];
