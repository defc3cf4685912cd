use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::FmtSubscriber;

mod cli;
mod config;
mod console;
mod media;
mod negotiation;
mod peer;
mod signalling;
#[cfg(test)]
mod testing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::ClientConfig::from(cli::Args::parse());

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_line_number(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let channel =
        signalling::SignallingChannel::new_shared(config.relay_url.clone(), config.reconnect.clone());
    let signals_rx = channel.subscribe();
    channel.connect();

    let factory = Arc::new(peer::RtcPeerFactory::new()?);
    let media = media::MediaController::new(Arc::new(media::SampleDevices), config.media.clone());
    let mut engine = negotiation::NegotiationEngine::new(
        config.engine.clone(),
        factory,
        media,
        Arc::clone(&channel) as Arc<dyn signalling::SignalSink>,
    );

    let events_rx = engine.subscribe();
    let console = console::Console::new(
        engine.handle(),
        engine.local_display(),
        channel.watch_state(),
    );
    let engine_task = tokio::spawn(engine.run(signals_rx));

    tracing::info!("Commands: start, pause, call, hangup, quit");
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    console.run(stdin, events_rx).await;

    if let Err(err) = engine_task.await {
        tracing::error!("Negotiation engine task failed: {err}");
    }
    channel.close().await;
    Ok(())
}
