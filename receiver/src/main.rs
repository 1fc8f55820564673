use frame_relay_common::config::Config;
use frame_relay_receiver::buffer::LatestFrameBuffer;
use frame_relay_receiver::hook::hook_by_name;
use frame_relay_receiver::preview::run_preview_loop;
use frame_relay_receiver::server::Receiver;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load_or_default(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        bind = config.server.bind_addr(),
        max_frame_len = config.framing.max_frame_len,
        chunk_size = config.framing.chunk_size,
        read_timeout_secs = config.framing.read_timeout_secs,
        hook = config.processing.hook,
        "starting frame-relay receiver"
    );

    let hook = match hook_by_name(&config.processing.hook) {
        Some(h) => h,
        None => {
            error!(
                hook = config.processing.hook,
                "unknown processing hook, expected 'colormap' or 'identity'"
            );
            std::process::exit(1);
        }
    };

    let buffer = Arc::new(LatestFrameBuffer::new());
    let receiver = Receiver::new(config.framing.clone(), hook, Arc::clone(&buffer));
    let stats = receiver.stats();

    let mut handle = match receiver.start(&config.server.bind_addr()).await {
        Ok(h) => h,
        Err(e) => {
            error!(error = %e, "failed to start receiver");
            std::process::exit(1);
        }
    };

    let (preview_stop, preview_rx) = watch::channel(false);
    let preview = tokio::spawn(run_preview_loop(
        Arc::clone(&buffer),
        config.preview.clone(),
        preview_rx,
    ));

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c, shutting down");
    }
    info!("shutting down");

    handle.stop().await;
    preview_stop.send_replace(true);
    if let Err(e) = preview.await {
        error!(error = %e, "preview loop terminated abnormally");
    }

    info!(stats = ?stats.snapshot(), "frame-relay receiver stopped");
}
