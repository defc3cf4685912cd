#[derive(clap::Parser, Debug)]
#[command(version, about, long_about = None)]
pub(super) struct Args {
    /// WebSocket relay both call parties are connected to
    #[arg(long, default_value = "ws://localhost:8081")]
    pub(super) relay_url: String,
    /// STUN/TURN server url, may be repeated
    #[arg(long = "stun", default_value = "stun:stun.l.google.com:19302")]
    pub(super) stun: Vec<String>,
    /// Yield to the remote offer when both sides call at the same time
    #[arg(long)]
    pub(super) polite: bool,
    #[arg(long, default_value_t = 720)]
    pub(super) video_width: u32,
    #[arg(long, default_value_t = 540)]
    pub(super) video_height: u32,
    #[arg(long)]
    pub(super) no_audio: bool,
    #[arg(long)]
    pub(super) no_video: bool,
    #[arg(long, default_value_t = 100)]
    pub(super) reconnect_initial_ms: u64,
    #[arg(long, default_value_t = 2000)]
    pub(super) reconnect_max_ms: u64,
    /// Retry forever when omitted
    #[arg(long)]
    pub(super) reconnect_max_attempts: Option<u32>,
    #[arg(long, default_value_t = tracing::Level::INFO)]
    pub(super) log_level: tracing::Level,
}
