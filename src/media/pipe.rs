use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::media::frame::FrameStore;

/// Interval at which we poll for the source file before startup.
const SOURCE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Blocks until the source image exists, polling at a coarse interval.
/// Returns false if the stop token fires first.
pub async fn wait_for_source(path: &Path, cancel: &CancellationToken) -> bool {
    loop {
        if path.exists() {
            return true;
        }
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(SOURCE_POLL_INTERVAL) => {}
        }
    }
}

/// Pipeline: drains the store's ready frame into the encoder input at a
/// fixed cadence while a background task keeps the store fresh.
///
/// The delivery loop never waits on a refresh; it always has some complete
/// frame to send, either the initial one or the most recently promoted one.
pub struct Pipe {
    store: Arc<FrameStore>,
    period: Duration,
    cancel: CancellationToken,
    started: AtomicBool,
}

impl Pipe {
    pub fn new(store: Arc<FrameStore>, file_fps: u32, cancel: CancellationToken) -> Self {
        Self {
            store,
            period: Duration::from_secs(1) / file_fps,
            cancel,
            started: AtomicBool::new(false),
        }
    }

    /// Runs until the token fires or the sink breaks. The refresh task is
    /// spawned here and joined before returning, and the sink is dropped on
    /// exit, which closes the encoder's input channel.
    pub async fn run<W>(&self, sink: W) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        if self.started.swap(true, Ordering::Relaxed) {
            anyhow::bail!("pipe already started");
        }

        let refresh = tokio::spawn(run_refresh_task(
            Arc::clone(&self.store),
            self.period,
            self.cancel.clone(),
        ));

        let result = run_delivery_loop(&self.store, sink, self.period, &self.cancel).await;

        // A dead delivery loop ends the stream either way; take the refresh
        // task down with it instead of leaking it.
        self.cancel.cancel();
        let _ = refresh.await;
        result
    }
}

/// Re-decodes the source on a fixed period and promotes the result. Decode
/// failures are logged and retried on the next tick, with no backoff and no
/// limit; the previous frame keeps being served meanwhile.
async fn run_refresh_task(store: Arc<FrameStore>, period: Duration, cancel: CancellationToken) {
    let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
    // A late decode shifts the next tick instead of bursting to catch up;
    // the result only has to be fresh, not phase-locked.
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticks.tick() => {
                let store = Arc::clone(&store);
                match tokio::task::spawn_blocking(move || store.refresh()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        log::warn!("refresh failed, keeping previous frame: {:#}", e);
                    }
                    Err(e) => {
                        log::error!("refresh task panicked: {}", e);
                    }
                }
            }
        }
    }
}

/// Writes the current ready frame to the sink once per `ttw`, sleeping on
/// an absolute schedule: `next_tick` advances by exactly `ttw` per frame,
/// so a late write never pushes later ticks back and the long-run rate
/// stays at the configured cadence. A write error is fatal.
async fn run_delivery_loop<W>(
    store: &FrameStore,
    mut sink: W,
    ttw: Duration,
    cancel: &CancellationToken,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut next_tick = Instant::now() + ttw;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let frame = store.read_ready();
        // The write itself is not a cancellation point: a frame is either
        // written in full or not at all.
        sink.write_all(&frame)
            .await
            .context("write frame to encoder input")?;

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep_until(next_tick) => {}
        }
        next_tick += ttw;
    }

    Ok(())
}

#[cfg(test)]
#[path = "pipe_test.rs"]
mod pipe_test;
