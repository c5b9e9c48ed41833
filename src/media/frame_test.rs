use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{quantize_channel, Dimensions, FrameStore};

fn temp_image_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "stillcast_frame_{}_{}_{}.png",
        tag,
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

fn write_solid_png(path: &Path, width: u32, height: u32, rgb: [u8; 3]) {
    image::ImageBuffer::from_pixel(width, height, image::Rgb(rgb))
        .save(path)
        .unwrap();
}

fn solid_frame(dims: Dimensions, rgb: [u8; 3]) -> Vec<u8> {
    rgb.repeat(dims.width as usize * dims.height as usize)
}

#[test]
fn quantization_scales_16_bit_channels_with_saturation() {
    assert_eq!(quantize_channel(0), 0);
    assert_eq!(quantize_channel(257), 1);
    assert_eq!(quantize_channel(514), 2);
    assert_eq!(quantize_channel(65535), 255);
}

#[test]
fn init_fixes_dimensions_and_frame_length() {
    let path = temp_image_path("init");
    write_solid_png(&path, 4, 3, [10, 20, 30]);

    let store = FrameStore::init(&path).unwrap();
    let dims = store.dimensions();
    assert_eq!(
        dims,
        Dimensions {
            width: 4,
            height: 3
        }
    );
    assert_eq!(dims.frame_len(), 4 * 3 * 3);

    let frame = store.read_ready();
    assert_eq!(frame.len(), dims.frame_len());
    // PNG channels are 8-bit; widening to 16 bit and quantizing back must
    // round-trip exactly.
    assert_eq!(&frame[..], &solid_frame(dims, [10, 20, 30])[..]);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn init_fails_on_missing_source() {
    let path = temp_image_path("missing");
    assert!(FrameStore::init(&path).is_err());
}

#[test]
fn refresh_promotes_new_frame_and_keeps_old_snapshots_intact() {
    let path = temp_image_path("promote");
    write_solid_png(&path, 4, 4, [200, 0, 0]);

    let store = FrameStore::init(&path).unwrap();
    let dims = store.dimensions();
    let before = store.read_ready();

    write_solid_png(&path, 4, 4, [0, 0, 200]);
    store.refresh().unwrap();

    let after = store.read_ready();
    assert_eq!(&after[..], &solid_frame(dims, [0, 0, 200])[..]);
    // The snapshot taken before the promotion is untouched.
    assert_eq!(&before[..], &solid_frame(dims, [200, 0, 0])[..]);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn failed_refreshes_keep_serving_the_last_good_frame() {
    let path = temp_image_path("stale");
    write_solid_png(&path, 3, 3, [1, 2, 3]);

    let store = FrameStore::init(&path).unwrap();
    let good = store.read_ready();

    std::fs::remove_file(&path).unwrap();
    for _ in 0..3 {
        assert!(store.refresh().is_err());
        assert_eq!(store.read_ready(), good);
    }
}

#[test]
fn dimension_change_is_a_refresh_error() {
    let path = temp_image_path("dims");
    write_solid_png(&path, 4, 4, [5, 5, 5]);

    let store = FrameStore::init(&path).unwrap();
    let good = store.read_ready();

    write_solid_png(&path, 2, 2, [9, 9, 9]);
    let err = store.refresh().unwrap_err();
    assert!(err.to_string().contains("dimensions changed"));
    assert_eq!(store.read_ready(), good);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn concurrent_reads_never_observe_torn_frames() {
    let path = temp_image_path("tearing");
    let red_src = temp_image_path("tearing_red");
    let blue_src = temp_image_path("tearing_blue");
    write_solid_png(&red_src, 16, 16, [255, 0, 0]);
    write_solid_png(&blue_src, 16, 16, [0, 0, 255]);
    std::fs::copy(&red_src, &path).unwrap();

    let store = Arc::new(FrameStore::init(&path).unwrap());
    let dims = store.dimensions();
    let red = solid_frame(dims, [255, 0, 0]);
    let blue = solid_frame(dims, [0, 0, 255]);

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            let done = Arc::clone(&done);
            let red = red.clone();
            let blue = blue.clone();
            std::thread::spawn(move || {
                while !done.load(Ordering::Relaxed) {
                    let frame = store.read_ready();
                    assert_eq!(frame.len(), red.len());
                    assert!(
                        frame[..] == red[..] || frame[..] == blue[..],
                        "observed a frame that is neither source image"
                    );
                }
            })
        })
        .collect();

    for i in 0..50 {
        let src = if i % 2 == 0 { &blue_src } else { &red_src };
        std::fs::copy(src, &path).unwrap();
        store.refresh().unwrap();
    }
    done.store(true, Ordering::Relaxed);

    for reader in readers {
        reader.join().unwrap();
    }

    for p in [&path, &red_src, &blue_src] {
        let _ = std::fs::remove_file(p);
    }
}
