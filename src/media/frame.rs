use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};

/// Interleaved RGB, no padding.
pub const BYTES_PER_PIXEL: usize = 3;

type Rgb16Image = image::ImageBuffer<image::Rgb<u16>, Vec<u16>>;

/// Frame dimensions, fixed once by the first successful decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }
}

impl Display for Dimensions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Double-buffered store for the two most relevant decoded frames.
///
/// `ready` is the frame currently exposed to the delivery path; `loading` is
/// the one being assembled by the refresh path. Promotion freezes `loading`
/// and publishes it as `ready` under the ready lock, then gives `loading` a
/// fresh allocation, so a handle returned by [`FrameStore::read_ready`] can
/// never be mutated afterwards.
pub struct FrameStore {
    path: PathBuf,
    dims: Dimensions,
    // Held only for the O(1) handle swap or clone, never across decode work.
    ready: Mutex<Bytes>,
    // Taken only by the refresh path, so readers never wait on a decode.
    loading: Mutex<BytesMut>,
}

impl FrameStore {
    /// Decodes the image at `path` once, fixing the stream dimensions for
    /// the lifetime of the store. Failure here means there is nothing to
    /// serve and is fatal to the caller.
    pub fn init(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let img = load_rgb16(&path)?;
        let dims = Dimensions {
            width: img.width(),
            height: img.height(),
        };

        let mut first = BytesMut::with_capacity(dims.frame_len());
        quantize_into(&img, &mut first);

        Ok(Self {
            ready: Mutex::new(first.freeze()),
            loading: Mutex::new(BytesMut::zeroed(dims.frame_len())),
            path,
            dims,
        })
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dims
    }

    /// Re-decodes the source image into the loading slot and promotes it.
    ///
    /// On any error, including the source changing dimensions, the promotion
    /// is skipped and the previous ready frame stays visible unchanged.
    pub fn refresh(&self) -> anyhow::Result<()> {
        let img = load_rgb16(&self.path)?;
        let dims = Dimensions {
            width: img.width(),
            height: img.height(),
        };
        if dims != self.dims {
            anyhow::bail!("source dimensions changed from {} to {}", self.dims, dims);
        }

        let mut loading = self.loading.lock().unwrap();
        quantize_into(&img, &mut loading);
        // Promote: the filled buffer becomes immutable and visible, and the
        // loading slot gets a fresh allocation for the next cycle.
        let promoted = std::mem::replace(&mut *loading, BytesMut::zeroed(self.dims.frame_len()));
        drop(loading);
        *self.ready.lock().unwrap() = promoted.freeze();
        Ok(())
    }

    /// Snapshot of the current ready frame. The handle stays valid and
    /// byte-identical for as long as the caller holds it, even if a
    /// promotion happens concurrently afterwards.
    pub fn read_ready(&self) -> Bytes {
        self.ready.lock().unwrap().clone()
    }
}

fn load_rgb16(path: &Path) -> anyhow::Result<Rgb16Image> {
    let img = image::ImageReader::open(path)
        .with_context(|| format!("open source image {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("probe source image {}", path.display()))?
        .decode()
        .with_context(|| format!("decode source image {}", path.display()))?;
    Ok(img.to_rgb16())
}

/// 16-bit linear channel intensity to the 8-bit value the encoder expects.
/// This is the agreed wire contract and must not change.
fn quantize_channel(c: u16) -> u8 {
    (u32::from(c) / 257).min(255) as u8
}

fn quantize_into(img: &Rgb16Image, buf: &mut BytesMut) {
    buf.clear();
    buf.reserve(img.as_raw().len());
    for &c in img.as_raw() {
        buf.put_u8(quantize_channel(c));
    }
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod frame_test;
