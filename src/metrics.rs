use lazy_static::lazy_static;
use prometheus::{register_counter, register_histogram, Counter, Histogram, HistogramOpts, Opts};

lazy_static! {
    pub static ref EVENTS_PROCESSED: Counter = register_counter!(Opts::new(
        "events_processed_total",
        "Total number of document events processed"
    ))
    .unwrap();

    pub static ref NOTIFICATIONS_SENT: Counter = register_counter!(Opts::new(
        "notifications_sent_total",
        "Total number of notifications dispatched and recorded"
    ))
    .unwrap();

    pub static ref NOTIFICATIONS_FAILED: Counter = register_counter!(Opts::new(
        "notifications_failed_total",
        "Total number of failed dispatch attempts"
    ))
    .unwrap();

    pub static ref NOTIFICATIONS_SKIPPED: Counter = register_counter!(Opts::new(
        "notifications_skipped_total",
        "Total number of sends skipped for lack of a push token"
    ))
    .unwrap();

    pub static ref DOCUMENTS_DELETED: Counter = register_counter!(Opts::new(
        "documents_deleted_total",
        "Total number of documents removed by retention and deletion sweeps"
    ))
    .unwrap();

    pub static ref DISPATCH_TIME: Histogram = register_histogram!(
        HistogramOpts::new(
            "dispatch_time_seconds",
            "Time taken for one push gateway dispatch"
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
    )
    .unwrap();
}

pub fn metrics_handler() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return format!("Error encoding metrics: {}", e);
    }

    match String::from_utf8(buffer) {
        Ok(metrics) => metrics,
        Err(e) => format!("Error converting metrics to string: {}", e),
    }
}
