use std::sync::Arc;
use std::time::Duration;

use frame_relay_common::config::PreviewConfig;
use image::imageops::{self, FilterType};
use image::RgbImage;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::buffer::{FramePair, LatestFrameBuffer};

/// Raw frame on the left, processed image (scaled to the raw frame's size)
/// on the right. `None` if the pair has no processed image.
pub fn compose_side_by_side(pair: &FramePair) -> Option<RgbImage> {
    let processed = pair.processed()?;
    let raw = pair.raw();
    let (width, height) = raw.dimensions();

    let mut canvas = RgbImage::new(width * 2, height);
    imageops::replace(&mut canvas, raw, 0, 0);
    if processed.dimensions() == (width, height) {
        imageops::replace(&mut canvas, processed, width as i64, 0);
    } else {
        let scaled = imageops::resize(processed, width, height, FilterType::Triangle);
        imageops::replace(&mut canvas, &scaled, width as i64, 0);
    }
    Some(canvas)
}

/// Pull loop standing in for the on-screen view: polls the buffer at
/// `config.fps`, never waits for data, and writes a composite snapshot every
/// `snapshot_every` new pairs when a path is configured. Returns the number
/// of distinct pairs it observed.
pub async fn run_preview_loop(
    buffer: Arc<LatestFrameBuffer>,
    config: PreviewConfig,
    mut shutdown: watch::Receiver<bool>,
) -> u64 {
    let mut ticker = tokio::time::interval(config.period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let snapshot_every = config.snapshot_every.max(1);
    let mut last_seq = 0;
    let mut seen: u64 = 0;

    info!(
        fps = config.fps,
        snapshot_path = ?config.snapshot_path,
        "preview loop started"
    );

    loop {
        tokio::select! {
            biased;
            _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => break,
            _ = ticker.tick() => {}
        }

        if buffer.sequence() == last_seq {
            continue;
        }
        let Some(pair) = buffer.latest() else {
            continue;
        };
        let skipped = pair.sequence() - last_seq - 1;
        last_seq = pair.sequence();
        seen += 1;
        debug!(seq = last_seq, skipped, frame_len = pair.frame_len(), "new frame pair");

        let Some(path) = config.snapshot_path.clone() else {
            continue;
        };
        if seen % snapshot_every != 0 {
            continue;
        }

        let written = tokio::task::spawn_blocking(move || match compose_side_by_side(&pair) {
            Some(canvas) => canvas.save(&path).map(|_| true),
            None => Ok(false),
        })
        .await;
        match written {
            Ok(Ok(true)) => debug!(seq = last_seq, "snapshot written"),
            Ok(Ok(false)) => debug!(seq = last_seq, "no processed image, snapshot skipped"),
            Ok(Err(e)) => warn!(error = %e, "failed to write snapshot"),
            Err(e) => warn!(error = %e, "snapshot worker did not complete"),
        }
    }

    info!(pairs = seen, "preview loop stopped");
    seen
}
