use std::cell::{Cell, RefCell};
use std::io::Cursor;
use std::rc::Rc;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cropdeck::config::{CropConfig, MinCropSize};
use cropdeck::extract::{DecodeError, DecodeResult};
use cropdeck::session::{Delivery, ManualClock};
use cropdeck::{
    CropSession, CroppedImage, FailureKind, GestureOutcome, ImageDecoder, ImageSource, Point,
    ResizeHandle, SessionState, Size, StdDecoder,
};
use image::{ImageFormat, Rgba, RgbaImage};

fn gradient(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, ((x * 7 + y * 3) % 256) as u8, 255])
    })
}

fn png(image: &RgbaImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("png encode should succeed");
    bytes
}

fn unit_scale_config() -> CropConfig {
    CropConfig {
        viewport_budget: 1.0,
        ..CropConfig::default()
    }
}

fn capture_output(session: &mut CropSession) -> Rc<RefCell<Vec<CroppedImage>>> {
    let outputs = Rc::new(RefCell::new(Vec::new()));
    let sink = outputs.clone();
    session.on_crop_complete(move |cropped| sink.borrow_mut().push(cropped));
    outputs
}

#[test]
fn commit_extracts_exact_native_pixels() {
    let source = gradient(200, 200);
    let config = CropConfig {
        min_crop_size: MinCropSize {
            width: 10.0,
            height: 10.0,
        },
        ..CropConfig::default()
    };
    let mut session = CropSession::new(
        ImageSource::from_bytes(png(&source)),
        Size::new(1000.0, 1000.0),
        config,
    );
    let outputs = capture_output(&mut session);
    assert_eq!(session.load_blocking(&StdDecoder), Delivery::Applied);
    assert_eq!(session.transform().scale(), 1.0);

    assert!(session.move_to(410.0, 410.0).is_applied());
    assert!(session
        .resize(ResizeHandle::BottomRight, Point::new(460.0, 460.0))
        .is_applied());
    session.commit_blocking(&StdDecoder).expect("commit should succeed");

    assert_eq!(session.state(), SessionState::Closed);
    let outputs = outputs.borrow();
    assert_eq!(outputs.len(), 1);
    let cropped = &outputs[0].image;
    assert_eq!(cropped.dimensions(), (50, 50));
    assert_eq!(cropped.get_pixel(0, 0), source.get_pixel(10, 10));
    assert_eq!(cropped.get_pixel(49, 49), source.get_pixel(59, 59));
}

#[test]
fn commit_from_downscaled_display_is_not_resampled() {
    let source = gradient(2000, 1000);
    let mut session = CropSession::new(
        ImageSource::from_bytes(png(&source)),
        Size::new(500.0, 500.0),
        unit_scale_config(),
    );
    let outputs = capture_output(&mut session);
    session.load_blocking(&StdDecoder);
    assert_eq!(session.transform().scale(), 0.25);

    let region = session.pixel_region().expect("region should exist");
    assert_eq!((region.width, region.height), (1600, 800));
    session.commit_blocking(&StdDecoder).expect("commit should succeed");

    let cropped = &outputs.borrow()[0].image;
    assert_eq!(cropped.dimensions(), (1600, 800));
    assert_eq!(cropped.get_pixel(0, 0), source.get_pixel(region.x, region.y));
}

#[test]
fn locked_square_resized_into_corner_stops_at_minimum() {
    let mut session = CropSession::new(
        ImageSource::from_bytes(png(&gradient(1000, 1000))),
        Size::new(1000.0, 1000.0),
        unit_scale_config(),
    );
    session.load_blocking(&StdDecoder);
    session.set_aspect_ratio(Some(1.0));
    session.move_to(0.0, 0.0);
    session.resize(ResizeHandle::BottomRight, Point::new(20.0, 20.0));

    let crop_box = session.crop_box().expect("box should exist");
    assert_eq!(crop_box.rect(), cropdeck::Rect::new(0.0, 0.0, 100.0, 100.0));
}

#[test]
fn aspect_switch_preserves_small_selection_area() {
    let mut session = CropSession::new(
        ImageSource::from_bytes(png(&gradient(2000, 2000))),
        Size::new(2000.0, 2000.0),
        unit_scale_config(),
    );
    session.load_blocking(&StdDecoder);
    session.resize(ResizeHandle::BottomRight, Point::new(400.0, 400.0));
    let square = session.crop_box().expect("box should exist");
    assert_eq!((square.width, square.height), (200.0, 200.0));

    session.set_aspect_ratio(Some(16.0 / 9.0));
    let wide = session.crop_box().expect("box should exist");
    assert!((wide.width - 266.67).abs() < 0.01);
    assert!((wide.height - 150.0).abs() < 0.01);
    assert!((wide.center().x - 300.0).abs() < 1e-9);
    assert!((wide.center().y - 300.0).abs() < 1e-9);
}

#[test]
fn cancel_during_decode_drops_the_late_result() {
    let mut session = CropSession::new(
        ImageSource::parse("https://example.com/slow.png"),
        Size::new(800.0, 600.0),
        CropConfig::default(),
    );
    let completions = Rc::new(Cell::new(0));
    let counter = completions.clone();
    session.on_crop_complete(move |_| counter.set(counter.get() + 1));

    let ticket = session.begin_load().expect("fresh session should load");
    assert!(session.cancel());
    assert_eq!(session.state(), SessionState::Closed);

    let late = session.complete_load(ticket, Ok(gradient(10, 10)));
    assert_eq!(late, Delivery::Stale);
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.crop_box().is_none());
    assert!(session.image().is_none());
    assert_eq!(completions.get(), 0);
}

#[test]
fn cancel_detaches_a_running_worker_decode() {
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Mutex::new(release_rx);
    let decoder: Arc<dyn ImageDecoder> =
        Arc::new(move |_: &ImageSource| -> DecodeResult<RgbaImage> {
            let _ = release_rx.lock().map(|rx| rx.recv());
            Ok(gradient(10, 10))
        });
    let mut session = CropSession::new(
        ImageSource::parse("memory.png"),
        Size::new(800.0, 600.0),
        CropConfig::default(),
    );
    let cancelled = Rc::new(Cell::new(false));
    let flag = cancelled.clone();
    session.on_cancel(move || flag.set(true));

    assert!(session.start_decode(decoder));
    assert!(!session.poll());
    assert!(session.cancel());
    assert!(cancelled.get());
    let _ = release_tx.send(());

    assert!(!session.wait(Duration::from_millis(50)));
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.crop_box().is_none());
    assert!(!session.has_pending_job());
}

#[test]
fn history_keeps_only_the_most_recent_snapshots() {
    let clock = Arc::new(ManualClock::new());
    let config = CropConfig {
        history_capacity: 5,
        ..unit_scale_config()
    };
    let mut session = CropSession::with_clock(
        ImageSource::from_bytes(png(&gradient(1000, 1000))),
        Size::new(1000.0, 1000.0),
        config,
        clock.clone(),
    );
    session.load_blocking(&StdDecoder);

    for _ in 0..7 {
        assert!(session.move_by(10.0, 0.0).is_applied());
        clock.advance(Duration::from_millis(400));
        assert!(session.tick());
    }
    assert_eq!(session.history().len(), 5);

    let mut lefts = Vec::new();
    while session.undo() == GestureOutcome::Applied {
        lefts.push(session.crop_box().expect("box should exist").left);
    }
    assert_eq!(lefts, vec![160.0, 150.0, 140.0, 130.0]);
    assert_eq!(session.undo(), GestureOutcome::Unchanged);
}

#[test]
fn rejected_commit_keeps_the_box_for_a_retry() {
    let source = gradient(300, 300);
    let bytes = png(&source);
    let mut session = CropSession::new(
        ImageSource::from_bytes(bytes),
        Size::new(300.0, 300.0),
        unit_scale_config(),
    );
    let outputs = capture_output(&mut session);
    session.load_blocking(&StdDecoder);
    session.move_by(-20.0, 0.0);
    let edited = session.crop_box().expect("box should exist");

    let shrunken = |_: &ImageSource| -> DecodeResult<RgbaImage> { Ok(gradient(16, 16)) };
    let failure = session
        .commit_blocking(&shrunken)
        .expect_err("region outside the decoded image should be rejected");
    assert_eq!(failure.kind, FailureKind::Extract);
    assert!(failure.kind.is_retryable());
    assert!(!failure.reason.is_empty());
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.crop_box(), Some(edited));
    assert!(outputs.borrow().is_empty());

    session.commit_blocking(&StdDecoder).expect("retry should succeed");
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(outputs.borrow().len(), 1);
}

#[test]
fn native_decode_failure_at_commit_is_terminal() {
    let mut session = CropSession::new(
        ImageSource::from_bytes(png(&gradient(64, 64))),
        Size::new(300.0, 300.0),
        CropConfig::default(),
    );
    session.load_blocking(&StdDecoder);
    let broken = |_: &ImageSource| -> DecodeResult<RgbaImage> { Err(DecodeError::EmptyImage) };

    let failure = session
        .commit_blocking(&broken)
        .expect_err("decode failure should surface");
    assert_eq!(failure.kind, FailureKind::CommitDecode);
    assert_eq!(session.state(), SessionState::Error);
    assert_eq!(session.move_by(1.0, 1.0), GestureOutcome::Ignored);
    assert!(!session.cancel());
}

#[test]
fn file_source_loads_and_commits_on_worker_threads() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join("photo.png");
    let source = gradient(120, 80);
    std::fs::write(&path, png(&source)).expect("image should be written");

    let mut session = CropSession::new(
        ImageSource::parse(&path.to_string_lossy()),
        Size::new(640.0, 480.0),
        CropConfig::default(),
    );
    let outputs = capture_output(&mut session);
    let decoder: Arc<dyn ImageDecoder> = Arc::new(StdDecoder);

    assert!(session.start_decode(decoder.clone()));
    assert!(session.wait(Duration::from_secs(10)));
    assert_eq!(session.state(), SessionState::Ready);

    session.start_commit(decoder).expect("commit should start");
    assert_eq!(session.state(), SessionState::Committing);
    assert!(session.wait(Duration::from_secs(10)));
    assert_eq!(session.state(), SessionState::Closed);

    let outputs = outputs.borrow();
    let cropped = &outputs[0];
    assert_eq!((cropped.width(), cropped.height()), (100, 80));
    assert_eq!(cropped.image.get_pixel(0, 0), source.get_pixel(10, 0));
    assert!(cropped.to_data_uri().starts_with("data:image/png;base64,"));
}
