// observability/metrics.rs - Prometheus Metrics

use crate::codec::{DecodeErrorKind, Representation};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

/// Metrics setup errors
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to install Prometheus recorder: {0}")]
    Build(#[from] BuildError),
}

/// Configuration for metrics
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Histogram buckets for encoded message sizes (in bytes)
    pub size_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            size_buckets: vec![
                64.0, 128.0, 256.0, 512.0, 1024.0, 4096.0, 16384.0, 65536.0, 262144.0, 1048576.0,
            ],
        }
    }
}

/// Handle to the Prometheus recorder
#[derive(Clone)]
pub struct MetricsHandle {
    handle: PrometheusHandle,
}

impl MetricsHandle {
    /// Render metrics in Prometheus text format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Codec metrics
pub struct CodecMetrics;

impl CodecMetrics {
    pub const ENCODED_TOTAL: &'static str = "fipa_acl_messages_encoded_total";
    pub const DECODED_TOTAL: &'static str = "fipa_acl_messages_decoded_total";
    pub const DECODE_FAILURES_TOTAL: &'static str = "fipa_acl_decode_failures_total";
    pub const ENCODED_BYTES: &'static str = "fipa_acl_encoded_message_bytes";
}

/// Conversation tracking metrics
pub struct ConversationMetrics;

impl ConversationMetrics {
    pub const STARTED_TOTAL: &'static str = "fipa_acl_conversations_started_total";
    pub const REMOVED_TOTAL: &'static str = "fipa_acl_conversations_removed_total";
    pub const ACTIVE: &'static str = "fipa_acl_conversations_active";
    pub const MESSAGES_TOTAL: &'static str = "fipa_acl_conversation_messages_total";
    pub const TRANSITIONS_REJECTED_TOTAL: &'static str = "fipa_acl_transitions_rejected_total";
}

/// Install the Prometheus recorder globally.
///
/// Nothing is served; call [`MetricsHandle::render`] and expose the text
/// wherever the host application wants it.
pub fn init_metrics(config: MetricsConfig) -> Result<MetricsHandle, MetricsError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(CodecMetrics::ENCODED_BYTES.into()),
            &config.size_buckets,
        )?
        .install_recorder()?;

    describe_counter!(CodecMetrics::ENCODED_TOTAL, "Total number of ACL messages encoded");
    describe_counter!(CodecMetrics::DECODED_TOTAL, "Total number of ACL messages decoded");
    describe_counter!(
        CodecMetrics::DECODE_FAILURES_TOTAL,
        "Total number of ACL decode failures"
    );
    describe_histogram!(CodecMetrics::ENCODED_BYTES, "Encoded ACL message size in bytes");

    describe_counter!(
        ConversationMetrics::STARTED_TOTAL,
        "Total number of conversations registered"
    );
    describe_counter!(
        ConversationMetrics::REMOVED_TOTAL,
        "Total number of conversations removed"
    );
    describe_gauge!(
        ConversationMetrics::ACTIVE,
        "Current number of registered conversations"
    );
    describe_counter!(
        ConversationMetrics::MESSAGES_TOTAL,
        "Total number of messages appended to conversations"
    );
    describe_counter!(
        ConversationMetrics::TRANSITIONS_REJECTED_TOTAL,
        "Total number of messages rejected by a protocol grammar"
    );

    tracing::info!("Metrics initialized");

    Ok(MetricsHandle { handle })
}

fn representation_label(representation: Representation) -> &'static str {
    match representation {
        Representation::Bitefficient => "bitefficient",
        Representation::String => "string",
    }
}

// Recording functions

/// Record an encoded message
pub fn record_message_encoded(representation: Representation, size: usize) {
    let label = representation_label(representation);
    counter!(CodecMetrics::ENCODED_TOTAL, "representation" => label).increment(1);
    histogram!(CodecMetrics::ENCODED_BYTES, "representation" => label).record(size as f64);
}

/// Record a decoded message
pub fn record_message_decoded(representation: Representation) {
    counter!(
        CodecMetrics::DECODED_TOTAL,
        "representation" => representation_label(representation)
    )
    .increment(1);
}

/// Record a failed decode; `None` when the representation was not recognized
pub fn record_decode_failure(representation: Option<Representation>, kind: DecodeErrorKind) {
    counter!(
        CodecMetrics::DECODE_FAILURES_TOTAL,
        "representation" => representation.map(representation_label).unwrap_or("unknown"),
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a conversation registration
pub fn record_conversation_started() {
    counter!(ConversationMetrics::STARTED_TOTAL).increment(1);
    gauge!(ConversationMetrics::ACTIVE).increment(1.0);
}

/// Record conversations leaving the registry
pub fn record_conversations_removed(count: usize) {
    if count == 0 {
        return;
    }
    counter!(ConversationMetrics::REMOVED_TOTAL).increment(count as u64);
    gauge!(ConversationMetrics::ACTIVE).decrement(count as f64);
}

/// Record a message appended to a conversation
pub fn record_message_appended(validated: bool) {
    counter!(
        ConversationMetrics::MESSAGES_TOTAL,
        "validated" => validated.to_string()
    )
    .increment(1);
}

/// Why a protocol grammar rejected a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    Performative,
    Role,
    InReplyTo,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::Performative => "performative",
            RejectionReason::Role => "role",
            RejectionReason::InReplyTo => "in_reply_to",
        }
    }
}

/// Record a message rejected by a protocol grammar.
///
/// Labelled with the name the grammar itself declares, never the protocol
/// string a message carried.
pub fn record_transition_rejected(grammar: &str, reason: RejectionReason) {
    counter!(
        ConversationMetrics::TRANSITIONS_REJECTED_TOTAL,
        "grammar" => grammar.to_string(),
        "reason" => reason.as_str()
    )
    .increment(1);
}
