//! Decoded raster frames
//!
//! A [`Frame`] is transient: it is moved into the uploader and dropped as
//! soon as its pixels have been copied into the GPU texture.

use image::RgbaImage;
use std::fmt;

/// One decoded RGBA8 image destined for a single draw
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Frame {
    /// Wrap tightly packed RGBA8 pixels.
    ///
    /// Returns `None` when the buffer length does not match the dimensions.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        if pixels.len() != (width as usize) * (height as usize) * 4 {
            return None;
        }
        Some(Self { width, height, pixels })
    }

    /// Expand tightly packed RGB24 pixels into an opaque RGBA8 frame
    pub fn from_rgb(width: u32, height: u32, rgb: &[u8]) -> Option<Self> {
        if rgb.len() != (width as usize) * (height as usize) * 3 {
            return None;
        }

        let mut pixels = Vec::with_capacity(rgb.len() / 3 * 4);
        for chunk in rgb.chunks_exact(3) {
            pixels.extend_from_slice(chunk);
            pixels.push(255);
        }

        Self::from_rgba(width, height, pixels)
    }

    /// Take ownership of a decoded image buffer
    pub fn from_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            pixels: image.into_raw(),
        }
    }

    /// A frame filled with a single color
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let count = (width.max(1) as usize) * (height.max(1) as usize);
        Self {
            width: width.max(1),
            height: height.max(1),
            pixels: rgba.repeat(count),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Raw RGBA8 pixels, row-major, no padding
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Bytes per row as expected by texture uploads
    pub fn bytes_per_row(&self) -> u32 {
        self.width * 4
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}
