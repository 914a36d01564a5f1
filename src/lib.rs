pub mod config;
pub mod db;
pub mod gateway;
pub mod models;
pub mod pipeline;
pub mod sync; // Offline intake queue

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. `RUST_LOG` wins over the default filter.
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} intake core v{}", config::APP_NAME, config::APP_VERSION);
    }
}
