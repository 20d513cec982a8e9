// Server-level metrics: HTTP surface counters on top of the core series

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Initialize all metric descriptions
/// Should be called once at application startup
pub fn init_metrics() {
    tether_core::metrics::init_metrics();

    describe_counter!(
        "tether_http_requests_total",
        "Total number of HTTP requests received"
    );
    describe_histogram!(
        "tether_http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_counter!(
        "tether_http_requests_errors_total",
        "Total number of HTTP request errors"
    );
}

/// Record an HTTP request
pub fn record_http_request(method: &str, route: &str, status: u16, duration_secs: f64) {
    counter!("tether_http_requests_total", "method" => method.to_string(), "route" => route.to_string(), "status" => status.to_string()).increment(1);
    histogram!("tether_http_request_duration_seconds", "method" => method.to_string(), "route" => route.to_string()).record(duration_secs);

    if status >= 400 {
        counter!("tether_http_requests_errors_total", "method" => method.to_string(), "route" => route.to_string(), "status" => status.to_string()).increment(1);
    }
}
