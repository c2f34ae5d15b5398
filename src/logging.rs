use env_logger::Builder;

pub const LOG_ENV: &str = "SIGNCTL_LOG";

/// `SIGNCTL_LOG` takes precedence over `RUST_LOG`; default is `info`.
pub fn init() {
    let filter = std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    Builder::new()
        .parse_filters(&filter)
        .format_timestamp_millis()
        .init();
}
