//! Frame store integration tests.

use std::{sync::Arc, thread};

use framescrub::{FrameStore, FrameStoreBuilder, PixelFormat, ScrubError};

fn store_of(count: u8) -> FrameStore {
    // 2x2 yuv422p: 8 bytes per frame.
    let mut builder = FrameStoreBuilder::new(2, 2, PixelFormat::Yuv422p).unwrap();
    for value in 0..count {
        builder.push(&[value; 8]).unwrap();
    }
    builder.freeze()
}

// ── Building ───────────────────────────────────────────────────────

#[test]
fn push_assigns_sequential_indices() {
    let mut builder = FrameStoreBuilder::new(2, 2, PixelFormat::Gray8).unwrap();
    assert!(builder.is_empty());
    assert_eq!(builder.push(&[1; 4]).unwrap(), 0);
    assert_eq!(builder.push(&[2; 4]).unwrap(), 1);
    assert_eq!(builder.push(&[3; 4]).unwrap(), 2);
    assert_eq!(builder.len(), 3);

    let store = builder.freeze();
    let indices: Vec<u64> = store.iter().map(|frame| frame.index()).collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[test]
fn push_rejects_wrong_length() {
    let mut builder = FrameStoreBuilder::new(2, 2, PixelFormat::Gray8).unwrap();
    let error = builder.push(&[0; 3]).unwrap_err();
    assert!(matches!(
        error,
        ScrubError::TruncatedFrame {
            frame_number: 0,
            expected: 4,
            received: 3
        }
    ));
    assert!(builder.is_empty());
}

#[test]
fn zero_sized_layout_is_rejected() {
    let error = FrameStoreBuilder::new(16, 0, PixelFormat::Yuv422p).unwrap_err();
    assert!(matches!(error, ScrubError::ZeroFrameSize { .. }));
}

#[test]
fn frame_size_follows_pixel_format() {
    let builder = FrameStoreBuilder::new(1920, 1080, PixelFormat::Yuv422p).unwrap();
    assert_eq!(builder.frame_size(), 1920 * 1080 * 2);

    let builder = FrameStoreBuilder::new(1920, 1080, PixelFormat::Rgb24).unwrap();
    assert_eq!(builder.frame_size(), 1920 * 1080 * 3);
}

// ── Lookup ─────────────────────────────────────────────────────────

#[test]
fn get_returns_frame_at_index() {
    let store = store_of(3);
    assert_eq!(store.count(), 3);

    let frame = store.get(1).expect("Frame 1 should exist");
    assert_eq!(frame.index(), 1);
    assert_eq!(frame.width(), 2);
    assert_eq!(frame.height(), 2);
    assert_eq!(frame.pixel_data(), &[1; 8]);
}

#[test]
fn get_past_end_is_out_of_range() {
    let store = store_of(3);
    let error = store.get(3).unwrap_err();
    assert!(matches!(
        error,
        ScrubError::FrameOutOfRange {
            frame_number: 3,
            total_frames: 3
        }
    ));
    assert_eq!(
        error.to_string(),
        "Frame 3 is out of range (video has 3 frames)"
    );
}

#[test]
fn get_negative_is_out_of_range() {
    let store = store_of(3);
    assert!(matches!(
        store.get(-1),
        Err(ScrubError::FrameOutOfRange {
            frame_number: -1,
            ..
        })
    ));
}

#[test]
fn empty_store_has_no_frames() {
    let store = store_of(0);
    assert!(store.is_empty());
    assert!(store.get(0).is_err());
    assert_eq!(store.iter().count(), 0);
}

#[test]
fn store_iterates_by_reference() {
    let store = store_of(4);
    let mut total = 0u64;
    for frame in &store {
        total += u64::from(frame.pixel_data()[0]);
    }
    assert_eq!(total, 1 + 2 + 3);
}

// ── Sharing ────────────────────────────────────────────────────────

#[test]
fn concurrent_readers_see_identical_frames() {
    let store = Arc::new(store_of(16));

    thread::scope(|scope| {
        for reader in 0..4 {
            let store = Arc::clone(&store);
            scope.spawn(move || {
                for index in 0..16i64 {
                    let position = (index + reader) % 16;
                    let frame = store.get(position).unwrap();
                    assert_eq!(frame.pixel_data(), &[position as u8; 8]);
                }
            });
        }
    });
}
