// Metrics for the ingest pipeline, dispatch path, and sweepers
// Counter helpers wrap the metrics facade so call sites stay terse

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Dispositions of an inbound broker message
#[derive(Clone, Copy, Debug)]
pub enum Disposition {
    Handled,
    Duplicate,
    MalformedTopic,
    ParseError,
    EmptyPayload,
    Ignored,
}

impl Disposition {
    fn as_str(self) -> &'static str {
        match self {
            Disposition::Handled => "handled",
            Disposition::Duplicate => "duplicate",
            Disposition::MalformedTopic => "malformed_topic",
            Disposition::ParseError => "parse_error",
            Disposition::EmptyPayload => "empty_payload",
            Disposition::Ignored => "ignored",
        }
    }
}

/// Initialize all metric descriptions
/// Should be called once at application startup
pub fn init_metrics() {
    describe_counter!(
        "tether_messages_received_total",
        "Inbound broker messages by disposition"
    );
    describe_counter!(
        "tether_identity_resolution_failures_total",
        "Identity resolution failures in the online handshake path"
    );
    describe_counter!(
        "tether_reconnects_sent_total",
        "Reconnect control messages sent to agents after admission failure"
    );
    describe_counter!(
        "tether_broker_publish_total",
        "Messages published to the broker"
    );
    describe_counter!(
        "tether_broker_publish_errors_total",
        "Broker publish failures and timeouts"
    );
    describe_counter!(
        "tether_bridge_publish_total",
        "Control messages re-published onto the event bus"
    );
    describe_counter!(
        "tether_bridge_publish_errors_total",
        "Event-bus publish failures"
    );
    describe_counter!(
        "tether_inventory_reports_total",
        "Host-seen events emitted to inventory"
    );
    describe_counter!(
        "tether_sources_registrations_total",
        "Catalog registrations against the sources service"
    );
    describe_counter!(
        "tether_sweep_rows_total",
        "Rows processed by the reconciliation sweepers, by outcome"
    );
    describe_histogram!(
        "tether_store_op_duration_seconds",
        "Connection store operation duration in seconds"
    );

    tracing::info!("Metrics initialized");
}

/// Record an inbound broker message
pub fn record_message(kind: &'static str, disposition: Disposition) {
    counter!("tether_messages_received_total", "kind" => kind, "disposition" => disposition.as_str())
        .increment(1);
}

/// Record an identity resolution failure
pub fn record_identity_failure() {
    counter!("tether_identity_resolution_failures_total").increment(1);
}

/// Record a reconnect signal sent to an agent
pub fn record_reconnect_sent() {
    counter!("tether_reconnects_sent_total").increment(1);
}

/// Record a broker publish
pub fn record_broker_publish(kind: &'static str, success: bool) {
    counter!("tether_broker_publish_total", "kind" => kind).increment(1);
    if !success {
        counter!("tether_broker_publish_errors_total", "kind" => kind).increment(1);
    }
}

/// Record an event-bus publish
pub fn record_bridge_publish(success: bool) {
    counter!("tether_bridge_publish_total").increment(1);
    if !success {
        counter!("tether_bridge_publish_errors_total").increment(1);
    }
}

/// Record an inventory host-seen event
pub fn record_inventory_report() {
    counter!("tether_inventory_reports_total").increment(1);
}

/// Record a sources registration attempt
pub fn record_sources_registration(outcome: &'static str) {
    counter!("tether_sources_registrations_total", "outcome" => outcome).increment(1);
}

/// Record a sweeper row outcome
pub fn record_sweep_row(sweeper: &'static str, outcome: &'static str) {
    counter!("tether_sweep_rows_total", "sweeper" => sweeper, "outcome" => outcome).increment(1);
}

/// Record a connection store operation duration
pub fn record_store_op(op: &'static str, duration_secs: f64) {
    histogram!("tether_store_op_duration_seconds", "op" => op).record(duration_secs);
}
