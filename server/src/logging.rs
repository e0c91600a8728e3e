use tracing_subscriber::EnvFilter;

/// Builds the global subscriber once at startup from `RUST_LOG`, falling
/// back to `default_level` when unset. Mirrors `tracer::init_tracing`'s
/// shape minus the OTLP exporter (see DESIGN.md for why that dependency
/// was dropped rather than carried).
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();
}
