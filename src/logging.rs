use std::env;
use tracing_subscriber::{fmt, EnvFilter};

pub fn setup_logging() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("entrega_backend={}", log_level))
            // The webhook route logs every event; keep it at info unless asked for more
            .add_directive("entrega_backend::api=info".parse().unwrap())
            .add_directive("entrega_backend::fcm=info".parse().unwrap())
            // Reduce noise from third-party libraries
            .add_directive("tower_http=warn".parse().unwrap())
            .add_directive("sqlx=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap())
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    tracing::info!("Logging initialized");
}
