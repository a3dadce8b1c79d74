//! Native-resolution decode and pixel-exact region extraction.

use std::io::{self, Cursor};
use std::path::PathBuf;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::{imageops, ImageFormat, RgbaImage};
use thiserror::Error;

use crate::geometry::PixelRect;

pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
pub type ExtractResult<T> = std::result::Result<T, ExtractError>;

const DATA_URI_PREFIX: &str = "data:";
const FILE_URI_PREFIX: &str = "file://";
const BASE64_MARKER: &str = ";base64";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no decoder available for image source {reference}")]
    UnsupportedSource { reference: String },
    #[error("malformed data uri: {0}")]
    InvalidDataUri(&'static str),
    #[error("invalid base64 payload in data uri")]
    Base64(#[from] base64::DecodeError),
    #[error("failed to read image file: {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode image")]
    Image(#[from] image::ImageError),
    #[error("decoded image has no pixels")]
    EmptyImage,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("crop region is empty ({width}x{height})")]
    EmptyRegion { width: u32, height: u32 },
    #[error("crop region {region:?} exceeds image {image_width}x{image_height}")]
    OutOfBounds {
        region: PixelRect,
        image_width: u32,
        image_height: u32,
    },
    #[error("failed to decode source at native resolution")]
    Decode(#[from] DecodeError),
    #[error("failed to encode cropped image")]
    Encode(#[source] image::ImageError),
}

impl ExtractError {
    /// Decode failures end the session; anything else leaves the box editable for another try.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

/// Where the bitmap comes from. The same source feeds the display decode and
/// the native-resolution decode at commit time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Path(PathBuf),
    Bytes(Arc<[u8]>),
    DataUri(String),
    /// Remote URL; only hosts with their own [`ImageDecoder`] can resolve it.
    Url(String),
}

impl ImageSource {
    pub fn parse(reference: &str) -> Self {
        let trimmed = reference.trim();
        if trimmed.starts_with(DATA_URI_PREFIX) {
            return Self::DataUri(trimmed.to_string());
        }
        if let Some(path) = trimmed.strip_prefix(FILE_URI_PREFIX) {
            return Self::Path(PathBuf::from(path));
        }
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Self::Url(trimmed.to_string());
        }
        Self::Path(PathBuf::from(trimmed))
    }

    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::Bytes(bytes.into())
    }

    /// Short human-readable form for logs; data URIs are truncated.
    pub fn describe(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
            Self::DataUri(uri) => {
                let head: String = uri.chars().take(32).collect();
                format!("{head}... ({} chars)", uri.len())
            }
            Self::Url(url) => url.clone(),
        }
    }
}

/// Turns an [`ImageSource`] into RGBA pixels.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, source: &ImageSource) -> DecodeResult<RgbaImage>;
}

impl<F> ImageDecoder for F
where
    F: Fn(&ImageSource) -> DecodeResult<RgbaImage> + Send + Sync,
{
    fn decode(&self, source: &ImageSource) -> DecodeResult<RgbaImage> {
        self(source)
    }
}

/// Decodes local files, in-memory bytes and base64 data URIs with the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDecoder;

impl ImageDecoder for StdDecoder {
    fn decode(&self, source: &ImageSource) -> DecodeResult<RgbaImage> {
        let image = match source {
            ImageSource::Path(path) => {
                let bytes = std::fs::read(path).map_err(|source| DecodeError::Io {
                    path: path.clone(),
                    source,
                })?;
                image::load_from_memory(&bytes)?
            }
            ImageSource::Bytes(bytes) => image::load_from_memory(bytes)?,
            ImageSource::DataUri(uri) => image::load_from_memory(&data_uri_payload(uri)?)?,
            ImageSource::Url(url) => {
                return Err(DecodeError::UnsupportedSource {
                    reference: url.clone(),
                })
            }
        };
        let rgba = image.to_rgba8();
        if rgba.width() == 0 || rgba.height() == 0 {
            return Err(DecodeError::EmptyImage);
        }
        Ok(rgba)
    }
}

fn data_uri_payload(uri: &str) -> DecodeResult<Vec<u8>> {
    let body = uri
        .strip_prefix(DATA_URI_PREFIX)
        .ok_or(DecodeError::InvalidDataUri("missing data: prefix"))?;
    let (header, payload) = body
        .split_once(',')
        .ok_or(DecodeError::InvalidDataUri("missing ',' separator"))?;
    if !header.ends_with(BASE64_MARKER) {
        return Err(DecodeError::InvalidDataUri("only base64 payloads are supported"));
    }
    Ok(BASE64.decode(payload.trim())?)
}

/// The committed crop: raw pixels plus their PNG encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct CroppedImage {
    pub image: RgbaImage,
    pub png: Vec<u8>,
}

impl CroppedImage {
    pub fn encode(image: RgbaImage) -> ExtractResult<Self> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(ExtractError::Encode)?;
        Ok(Self { image, png })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:image/png;base64,{}", BASE64.encode(&self.png))
    }
}

/// Copies `region` out of `image` at 1:1, no resampling.
pub fn crop_pixels(image: &RgbaImage, region: PixelRect) -> ExtractResult<RgbaImage> {
    if region.is_empty() {
        return Err(ExtractError::EmptyRegion {
            width: region.width,
            height: region.height,
        });
    }
    if !region.fits_within(image.width(), image.height()) {
        return Err(ExtractError::OutOfBounds {
            region,
            image_width: image.width(),
            image_height: image.height(),
        });
    }
    Ok(imageops::crop_imm(image, region.x, region.y, region.width, region.height).to_image())
}

/// Decodes `source` at native resolution and extracts `region` from it.
///
/// The region is re-validated before decoding so a degenerate box never costs a decode.
pub fn extract(
    region: PixelRect,
    source: &ImageSource,
    decoder: &dyn ImageDecoder,
) -> ExtractResult<CroppedImage> {
    if region.is_empty() {
        return Err(ExtractError::EmptyRegion {
            width: region.width,
            height: region.height,
        });
    }
    let native = decoder.decode(source)?;
    let cropped = crop_pixels(&native, region)?;
    tracing::debug!(
        x = region.x,
        y = region.y,
        width = region.width,
        height = region.height,
        "extracted crop region"
    );
    CroppedImage::encode(cropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
        })
    }

    fn png_bytes(image: &RgbaImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("png encode should succeed");
        bytes
    }

    #[test]
    fn parse_recognises_source_kinds() {
        assert!(matches!(
            ImageSource::parse("data:image/png;base64,AAAA"),
            ImageSource::DataUri(_)
        ));
        assert_eq!(
            ImageSource::parse("file:///tmp/a.png"),
            ImageSource::Path(PathBuf::from("/tmp/a.png"))
        );
        assert!(matches!(
            ImageSource::parse("https://example.com/a.png"),
            ImageSource::Url(_)
        ));
        assert_eq!(
            ImageSource::parse(" ./local.jpg "),
            ImageSource::Path(PathBuf::from("./local.jpg"))
        );
    }

    #[test]
    fn crop_pixels_is_pixel_exact() {
        let source = gradient(200, 200);
        let cropped =
            crop_pixels(&source, PixelRect::new(10, 10, 50, 50)).expect("crop should succeed");
        assert_eq!(cropped.dimensions(), (50, 50));
        assert_eq!(cropped.get_pixel(0, 0), source.get_pixel(10, 10));
        assert_eq!(cropped.get_pixel(49, 49), source.get_pixel(59, 59));
    }

    #[test]
    fn crop_pixels_rejects_empty_and_out_of_bounds_regions() {
        let source = gradient(20, 20);
        assert!(matches!(
            crop_pixels(&source, PixelRect::new(0, 0, 0, 5)),
            Err(ExtractError::EmptyRegion { width: 0, height: 5 })
        ));
        assert!(matches!(
            crop_pixels(&source, PixelRect::new(15, 0, 10, 5)),
            Err(ExtractError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn extract_decodes_data_uri_and_round_trips_png() {
        let source_image = gradient(64, 48);
        let uri = format!("data:image/png;base64,{}", BASE64.encode(png_bytes(&source_image)));

        let cropped = extract(
            PixelRect::new(4, 8, 16, 12),
            &ImageSource::parse(&uri),
            &StdDecoder,
        )
        .expect("extract should succeed");

        assert_eq!((cropped.width(), cropped.height()), (16, 12));
        assert_eq!(cropped.image.get_pixel(0, 0), source_image.get_pixel(4, 8));
        let decoded = image::load_from_memory(&cropped.png)
            .expect("png output should decode")
            .to_rgba8();
        assert_eq!(decoded, cropped.image);
        assert!(cropped.to_data_uri().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn extract_skips_decode_for_empty_region() {
        let decoder = |_: &ImageSource| -> DecodeResult<RgbaImage> {
            panic!("decoder must not run for an empty region")
        };
        let source = ImageSource::from_bytes(vec![1, 2, 3]);
        let err = extract(PixelRect::new(0, 0, 10, 0), &source, &decoder)
            .expect_err("empty region should fail");
        assert!(matches!(err, ExtractError::EmptyRegion { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn std_decoder_reports_unsupported_and_malformed_sources() {
        let remote = StdDecoder.decode(&ImageSource::parse("https://example.com/a.png"));
        assert!(matches!(remote, Err(DecodeError::UnsupportedSource { .. })));

        let plain = StdDecoder.decode(&ImageSource::DataUri("data:text/plain,hello".to_string()));
        assert!(matches!(plain, Err(DecodeError::InvalidDataUri(_))));

        let garbage = StdDecoder.decode(&ImageSource::from_bytes(vec![0_u8; 16]));
        assert!(matches!(garbage, Err(DecodeError::Image(_))));
    }

    #[test]
    fn decode_failure_during_extract_is_fatal() {
        let err = extract(
            PixelRect::new(0, 0, 4, 4),
            &ImageSource::from_bytes(vec![9_u8; 8]),
            &StdDecoder,
        )
        .expect_err("garbage bytes should not decode");
        assert!(err.is_fatal());
    }
}
