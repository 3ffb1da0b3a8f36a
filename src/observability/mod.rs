// observability/mod.rs - Tracing and Metrics

//! Structured logging and Prometheus metrics.
//!
//! The library only emits; installing a subscriber or recorder is left to
//! the host application. Until then every `record_*` call is a no-op.
//!
//! # Example
//!
//! ```ignore
//! use fipa_acl::observability::{init_metrics, init_tracing, MetricsConfig, TracingConfig};
//!
//! init_tracing(TracingConfig::production())?;
//! let metrics = init_metrics(MetricsConfig::default())?;
//! println!("{}", metrics.render());
//! ```

mod metrics;
mod tracing_setup;

pub use self::metrics::{
    CodecMetrics, ConversationMetrics, MetricsConfig, MetricsError, MetricsHandle, RejectionReason,
    init_metrics,
    record_conversation_started, record_conversations_removed, record_decode_failure,
    record_message_appended, record_message_decoded, record_message_encoded,
    record_transition_rejected,
};

pub use self::tracing_setup::{TracingConfig, TracingFormat, init_tracing};
