use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("page_views_requests_total", "Total number of view requests")
            .expect("metric registers once");
    pub static ref RATE_LIMITED_TOTAL: Counter =
        register_counter!("page_views_rate_limited_total", "Requests denied by the rate limiter")
            .expect("metric registers once");
    pub static ref STORE_ERRORS_TOTAL: Counter =
        register_counter!("page_views_store_errors_total", "Failed counter store operations")
            .expect("metric registers once");
    pub static ref STORE_LATENCY: Histogram = register_histogram!(
        "page_views_store_latency_seconds",
        "Counter store round-trip latency in seconds"
    )
    .expect("metric registers once");
    pub static ref RATE_LIMIT_ENTRIES: Gauge =
        register_gauge!("page_views_rate_limit_entries", "Tracked client/slug rate limit keys")
            .expect("metric registers once");
}
