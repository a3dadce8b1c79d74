pub mod config;
pub mod crop;
pub mod error;
pub mod extract;
pub mod geometry;
pub mod history;
pub mod logging;
pub mod mapping;
pub mod mask;
pub mod session;
pub mod state;

pub use config::CropConfig;
pub use crop::{CropBox, CropPreset, ResizeHandle};
pub use error::{CropError, CropResult};
pub use extract::{CroppedImage, ImageDecoder, ImageSource, StdDecoder};
pub use geometry::{Point, Rect, Size};
pub use session::{CropSession, FailureKind, GestureOutcome, SessionFailure};
pub use state::SessionState;

/// Entrypoint used by host editors: reads `crop.json` and opens a session on `image_ref`.
pub fn open_session(image_ref: &str, viewport: Size) -> CropSession {
    logging::init();
    let config = config::load_crop_config();
    CropSession::new(ImageSource::parse(image_ref), viewport, config)
}
