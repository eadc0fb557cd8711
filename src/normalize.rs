//! Image normalization: decode, flatten to opaque RGB, resize, encode JPEG.
//!
//! Every stored image goes through the same canonical form so downstream
//! consumers never have to deal with transparency, palettes, greyscale or
//! 16-bit channels.
//!
//! # Rules
//!
//! 1. Images with an alpha channel (RGBA, grey+alpha, and paletted images with
//!    transparency, which the decoders expand to RGBA) are composited over an
//!    opaque white background.
//! 2. Everything else is converted to 8-bit RGB.
//! 3. The result is encoded as baseline JPEG.
//!
//! Thumbnails are derived from an already normalized [`CanonicalImage`], so a
//! caller wanting several sizes decodes once and resizes many times.
//!
//! # Example
//!
//! ```no_run
//! use imgdl_core::normalize::normalize;
//!
//! # fn example(bytes: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! let canonical = normalize(bytes)?;
//! let full = canonical.to_jpeg()?;
//! let small = canonical.thumbnail(50, 50).to_jpeg()?;
//! println!("{} / {} bytes", full.len(), small.len());
//! # Ok(())
//! # }
//! ```

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, Rgb, RgbImage};
use thiserror::Error;

/// JPEG quality used for every stored image.
pub const JPEG_QUALITY: u8 = 75;

/// MIME type of encoded images.
pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// Errors from decoding or re-encoding an image.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not an image in a supported format, or is corrupt.
    #[error("cannot decode image: {source}")]
    Decode {
        /// The underlying decoder error.
        #[source]
        source: image::ImageError,
    },

    /// The canonical image could not be encoded.
    #[error("cannot encode image as JPEG: {source}")]
    Encode {
        /// The underlying encoder error.
        #[source]
        source: image::ImageError,
    },

    /// The blocking task doing the conversion panicked or was cancelled.
    #[error("image conversion task did not complete: {source}")]
    Interrupted {
        /// The join error from the blocking pool.
        #[source]
        source: tokio::task::JoinError,
    },
}

/// A decoded image in canonical form: opaque 8-bit RGB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalImage {
    pixels: RgbImage,
}

/// An encoded image ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

/// Decodes `bytes` and converts the result to canonical form.
///
/// The format is sniffed from the content, not from a URL or header.
///
/// # Errors
///
/// Returns [`DecodeError::Decode`] if the payload is not a decodable image.
pub fn normalize(bytes: &[u8]) -> Result<CanonicalImage, DecodeError> {
    let decoded = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| DecodeError::Decode {
            source: image::ImageError::IoError(e),
        })?
        .decode()
        .map_err(|source| DecodeError::Decode { source })?;
    Ok(CanonicalImage::from_dynamic(decoded))
}

impl CanonicalImage {
    /// Converts any decoded image to canonical form.
    #[must_use]
    pub fn from_dynamic(image: DynamicImage) -> Self {
        let pixels = if image.color().has_alpha() {
            flatten_onto_white(&image)
        } else {
            image.into_rgb8()
        };
        Self { pixels }
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Borrows the pixel buffer.
    #[must_use]
    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Returns a copy scaled to fit inside `max_width` x `max_height`.
    ///
    /// Aspect ratio is preserved and images already inside the box are
    /// returned unchanged (never upscaled). Uses a Lanczos filter.
    #[must_use]
    pub fn thumbnail(&self, max_width: u32, max_height: u32) -> Self {
        let (width, height) = fit_within(self.width(), self.height(), max_width, max_height);
        if (width, height) == (self.width(), self.height()) {
            return self.clone();
        }
        let pixels = image::imageops::resize(&self.pixels, width, height, FilterType::Lanczos3);
        Self { pixels }
    }

    /// Encodes the image as JPEG at [`JPEG_QUALITY`].
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Encode`] if the encoder rejects the image
    /// (for example dimensions beyond the JPEG limit of 65535).
    pub fn to_jpeg(&self) -> Result<EncodedImage, DecodeError> {
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
            .encode_image(&self.pixels)
            .map_err(|source| DecodeError::Encode { source })?;
        Ok(EncodedImage {
            bytes,
            width: self.width(),
            height: self.height(),
        })
    }
}

impl EncodedImage {
    /// Wraps already encoded JPEG bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            bytes,
            width,
            height,
        }
    }

    /// The encoded bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if there are no encoded bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Image width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// MIME type of the encoded bytes.
    #[must_use]
    pub fn content_type(&self) -> &'static str {
        JPEG_CONTENT_TYPE
    }
}

/// Alpha-composites every pixel over white: `c' = (c*a + 255*(255-a)) / 255`.
fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut out = RgbImage::new(width, height);
    for (src, dst) in rgba.pixels().zip(out.pixels_mut()) {
        let [r, g, b, a] = src.0;
        *dst = Rgb([blend(r, a), blend(g, a), blend(b, a)]);
    }
    out
}

fn blend(channel: u8, alpha: u8) -> u8 {
    let c = u32::from(channel);
    let a = u32::from(alpha);
    let mixed = (c * a + 255 * (255 - a) + 127) / 255;
    // mixed <= 255 since it is a convex combination of two values <= 255
    u8::try_from(mixed).unwrap_or(u8::MAX)
}

/// Largest size with the same aspect ratio that fits the box, never larger
/// than the source and never below 1x1.
fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }
    let scale = f64::min(
        f64::from(max_width) / f64::from(width),
        f64::from(max_height) / f64::from(height),
    );
    let scaled = |side: u32| {
        // scale < 1 here, so the result fits in u32
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let value = (f64::from(side) * scale).round() as u32;
        value.max(1)
    };
    (scaled(width), scaled(height))
}
