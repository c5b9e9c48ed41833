use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use tokio::process::{Child, ChildStdin, Command};

use crate::media::frame::Dimensions;

/// Settings for the ffmpeg child process that turns the raw RGB stream
/// into a segmented DASH manifest + media set.
pub struct EncoderConfig {
    pub dims: Dimensions,
    /// Nominal frame rate of the encoded output stream.
    pub stream_fps: u32,
    /// Rate at which raw frames arrive on the input channel.
    pub file_fps: u32,
    pub manifest_path: PathBuf,
}

/// Handle to a running ffmpeg child. Frames go into the stdin pipe returned
/// by [`DashEncoder::spawn`]; the encoder's own logs go to the inherited
/// stderr.
pub struct DashEncoder {
    child: Child,
}

impl DashEncoder {
    /// Spawns the system ffmpeg. Returns the encoder handle together with
    /// its input channel; dropping the channel signals end-of-stream.
    pub fn spawn(config: &EncoderConfig) -> anyhow::Result<(Self, ChildStdin)> {
        log::info!(
            "starting ffmpeg: {} rawvideo rgb24 -> dash at {}",
            config.dims,
            config.manifest_path.display()
        );

        let mut child = Command::new("ffmpeg")
            .args(dash_args(config))
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .context("spawn ffmpeg (is it installed and on PATH?)")?;

        let stdin = child
            .stdin
            .take()
            .context("open ffmpeg stdin")?;

        Ok((Self { child }, stdin))
    }

    /// Waits for the encoder to flush its last segments and exit. The input
    /// channel must already be closed. Kills the child if it outlives
    /// `timeout`.
    pub async fn finish(mut self, timeout: Duration) -> anyhow::Result<()> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(status) => {
                let status = status.context("wait for ffmpeg")?;
                if !status.success() {
                    log::warn!("ffmpeg exited with status {}", status);
                }
                Ok(())
            }
            Err(_) => {
                log::warn!("ffmpeg did not exit within {:?}, killing it", timeout);
                self.child.kill().await.context("kill ffmpeg")?;
                Ok(())
            }
        }
    }
}

/// Argument set for the DASH ladder: rawvideo RGB24 of fixed dimensions on
/// pipe:0 at the source rate, two H.264 renditions + AAC, segmented DASH
/// output at the manifest path.
fn dash_args(config: &EncoderConfig) -> Vec<String> {
    let file_fps = config.file_fps.to_string();
    let stream_fps = config.stream_fps.to_string();
    let size = config.dims.to_string();
    let manifest = config.manifest_path.display().to_string();

    [
        "-r",
        &file_fps,
        "-stream_loop",
        "-1",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgb24",
        "-s",
        &size,
        "-i",
        "pipe:0",
        "-pix_fmt",
        "yuv420p",
        "-map",
        "0",
        "-c:a",
        "aac",
        "-c:v",
        "libx264",
        "-b:v:0",
        "800k",
        "-b:v:1",
        "300k",
        "-s:v:1",
        "1280x720",
        "-profile:v:1",
        "baseline",
        "-profile:v:0",
        "main",
        "-bf",
        "1",
        "-keyint_min",
        "120",
        "-g",
        "120",
        "-sc_threshold",
        "0",
        "-b_strategy",
        "0",
        "-ar:a:1",
        "22050",
        "-use_timeline",
        "1",
        "-use_template",
        "1",
        "-r",
        &stream_fps,
        "-window_size",
        "5",
        "-adaptation_sets",
        "id=0,streams=v id=1,streams=a",
        "-f",
        "dash",
        &manifest,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
