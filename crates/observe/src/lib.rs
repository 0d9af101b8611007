//! Tracing initialization shared by the binaries.

use {
    std::sync::Once,
    tracing_subscriber::EnvFilter,
};

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Plain,
    Json,
}

/// Initialize the global tracing subscriber. Later calls are no-ops so
/// tests and embedders cannot double-install.
pub fn initialize(filter: &str, format: Format) {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_new(filter)
            .unwrap_or_else(|_| EnvFilter::new("warn"));
        match format {
            Format::Plain => {
                tracing_subscriber::fmt()
                    .with_env_filter(env_filter)
                    .with_writer(std::io::stderr)
                    .init();
            }
            Format::Json => {
                tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(env_filter)
                    .with_writer(std::io::stderr)
                    .init();
            }
        }
    });
}
