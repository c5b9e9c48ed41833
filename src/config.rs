use std::path::{Path, PathBuf};

const DEFAULT_IMAGE_FILE: &str = "/shared-dir/result.jpg";
const DEFAULT_DASH_FILE: &str = "../dash-front/public/videos/1.mpd";
const DEFAULT_STREAM_FPS: u32 = 25;
const DEFAULT_FILE_FPS: u32 = 10;

/// Runtime configuration, read once at startup from the environment.
pub struct StreamConfig {
    image_file: PathBuf,
    dash_file: PathBuf,
    stream_fps: u32,
    file_fps: u32,
}

impl StreamConfig {
    pub fn from_env() -> Self {
        Self {
            image_file: path_var("IMAGE_FILE", DEFAULT_IMAGE_FILE),
            dash_file: path_var("DASH_FILE", DEFAULT_DASH_FILE),
            stream_fps: fps_var("STREAM_FPS", DEFAULT_STREAM_FPS),
            file_fps: fps_var("FILE_FPS", DEFAULT_FILE_FPS),
        }
    }

    /// Source still image, overwritten by an external producer.
    pub fn image_file(&self) -> &Path {
        &self.image_file
    }

    /// Where ffmpeg writes the DASH manifest.
    pub fn dash_file(&self) -> &Path {
        &self.dash_file
    }

    /// Nominal frame rate of the encoded output stream.
    pub fn stream_fps(&self) -> u32 {
        self.stream_fps
    }

    /// Rate at which the source file is re-read and frames are delivered.
    pub fn file_fps(&self) -> u32 {
        self.file_fps
    }
}

fn path_var(key: &str, default: &str) -> PathBuf {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => PathBuf::from(v),
        _ => {
            log::warn!("env var {} isn't set, defaulting to {}", key, default);
            PathBuf::from(default)
        }
    }
}

fn fps_var(key: &str, default: u32) -> u32 {
    parse_fps(std::env::var(key).ok().as_deref(), key, default)
}

fn parse_fps(raw: Option<&str>, key: &str, default: u32) -> u32 {
    match raw.map(str::parse::<u32>) {
        Some(Ok(v)) if v > 0 => v,
        Some(_) => {
            log::warn!(
                "env var {} isn't a positive integer, defaulting to {}",
                key,
                default
            );
            default
        }
        None => {
            log::warn!("env var {} isn't set, defaulting to {}", key, default);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fps_accepts_positive_integers() {
        assert_eq!(parse_fps(Some("30"), "STREAM_FPS", 25), 30);
        assert_eq!(parse_fps(Some("1"), "FILE_FPS", 10), 1);
    }

    #[test]
    fn parse_fps_falls_back_on_missing_value() {
        assert_eq!(parse_fps(None, "STREAM_FPS", 25), 25);
    }

    #[test]
    fn parse_fps_falls_back_on_invalid_value() {
        assert_eq!(parse_fps(Some("abc"), "STREAM_FPS", 25), 25);
        assert_eq!(parse_fps(Some(""), "STREAM_FPS", 25), 25);
        assert_eq!(parse_fps(Some("-5"), "FILE_FPS", 10), 10);
        assert_eq!(parse_fps(Some("0"), "FILE_FPS", 10), 10);
        assert_eq!(parse_fps(Some("12.5"), "FILE_FPS", 10), 10);
    }
}
