use axum::http::Method;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::FmtSubscriber;

#[derive(clap::Parser, Debug)]
#[command(version, about, long_about = None)]
pub(super) struct Args {
    #[arg(short, long, default_value_t = 8081)]
    pub(super) port: u16,
    /// Connections beyond this many are closed right after the upgrade
    #[arg(long, default_value_t = crate::peers::DEFAULT_MAX_PEERS)]
    pub(super) max_peers: usize,
    #[arg(long, default_value_t = tracing::Level::INFO)]
    pub(super) log_level: tracing::Level,
}

pub(super) fn setup_logging(level: tracing::Level) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
}

pub(super) fn setup_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Method::GET)
        .allow_headers(Any)
}
