use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::StreamConfig;
use crate::media::encoder::{DashEncoder, EncoderConfig};
use crate::media::frame::FrameStore;
use crate::media::pipe::{self, Pipe};

mod config;
mod media;

/// How long the encoder gets to flush its last segments after end-of-stream.
const ENCODER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
}

#[tokio::main]
async fn main() -> ! {
    init_logging();
    let config = StreamConfig::from_env();

    let cancel = CancellationToken::new();
    spawn_signal_watcher(cancel.clone());

    // Don't start until the producer has written the source image at least once.
    if !pipe::wait_for_source(config.image_file(), &cancel).await {
        log::info!("stop requested before the source image appeared");
        std::process::exit(0);
    }

    let store = match FrameStore::init(config.image_file()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            log::error!(
                "initial decode of {} failed: {:#}",
                config.image_file().display(),
                e
            );
            std::process::exit(1);
        }
    };
    let dims = store.dimensions();
    log::info!(
        "source is {}, streaming at {} fps (source refresh {} fps)",
        dims,
        config.stream_fps(),
        config.file_fps()
    );

    let encoder_config = EncoderConfig {
        dims,
        stream_fps: config.stream_fps(),
        file_fps: config.file_fps(),
        manifest_path: config.dash_file().to_path_buf(),
    };
    let (encoder, encoder_input) = match DashEncoder::spawn(&encoder_config) {
        Ok(spawned) => spawned,
        Err(e) => {
            log::error!("failed to start encoder: {:#}", e);
            std::process::exit(1);
        }
    };

    let delivery = Pipe::new(Arc::clone(&store), config.file_fps(), cancel.clone())
        .run(encoder_input)
        .await;
    let delivery_failed = match delivery {
        Ok(()) => false,
        Err(e) => {
            log::error!("delivery stopped: {:#}", e);
            true
        }
    };

    // The pipe already closed the encoder's input channel; give the child a
    // chance to finalize the manifest before we leave.
    if let Err(e) = encoder.finish(ENCODER_SHUTDOWN_TIMEOUT).await {
        log::warn!("encoder shutdown: {:#}", e);
    }

    std::process::exit(if delivery_failed { 1 } else { 0 });
}

fn spawn_signal_watcher(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => Some(term),
        Err(e) => {
            log::warn!("failed to install SIGTERM handler: {}", e);
            None
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => log::info!("caught interrupt signal"),
        _ = async {
            match term.as_mut() {
                Some(term) => {
                    term.recv().await;
                }
                None => std::future::pending().await,
            }
        } => log::info!("caught terminate signal"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    log::info!("caught interrupt signal");
}
