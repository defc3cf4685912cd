use std::time::Duration;

use crate::cli::Args;
use crate::media::{MediaConstraints, VideoConstraints};
use crate::negotiation::EngineConfig;
use crate::signalling::ReconnectPolicy;

/// Everything the client needs, resolved once from the command line.
#[derive(Debug, Clone)]
pub(super) struct ClientConfig {
    pub(super) relay_url: String,
    pub(super) reconnect: ReconnectPolicy,
    pub(super) engine: EngineConfig,
    pub(super) media: MediaConstraints,
    pub(super) log_level: tracing::Level,
}

impl From<Args> for ClientConfig {
    fn from(args: Args) -> Self {
        let video = (!args.no_video).then_some(VideoConstraints {
            width: args.video_width,
            height: args.video_height,
        });

        Self {
            relay_url: args.relay_url,
            reconnect: ReconnectPolicy {
                initial_delay: Duration::from_millis(args.reconnect_initial_ms),
                max_delay: Duration::from_millis(args.reconnect_max_ms),
                max_attempts: args.reconnect_max_attempts,
                ..Default::default()
            },
            engine: EngineConfig {
                ice_servers: args.stun,
                polite: args.polite,
            },
            media: MediaConstraints {
                audio: !args.no_audio,
                video,
            },
            log_level: args.log_level,
        }
    }
}
