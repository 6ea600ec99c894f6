//! Text rasterization with fontdue
//!
//! Glyphs are rasterized on the CPU into coverage bitmaps and cached per
//! (char, size). The overlay layer blends them into its RGBA buffer.

use crate::Color;
use fontdue::{Font, FontSettings, Metrics};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Font loading errors
#[derive(Debug, Error)]
pub enum FontError {
    #[error("Failed to read font {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse font: {0}")]
    Parse(String),
}

/// Text style configuration
#[derive(Debug, Clone)]
pub struct TextStyle {
    /// Font size in pixels
    pub size: f32,
    /// Text color
    pub color: Color,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            size: 16.0,
            color: Color::WHITE,
        }
    }
}

impl TextStyle {
    pub fn new(size: f32) -> Self {
        Self {
            size,
            ..Default::default()
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }
}

/// A rasterized glyph placed relative to the pen position on the baseline
#[derive(Debug)]
pub struct PlacedGlyph<'a> {
    /// Left edge relative to the line origin
    pub x: i32,
    /// Top edge relative to the baseline
    pub y: i32,
    pub width: usize,
    pub height: usize,
    /// Coverage, one byte per pixel, row-major
    pub coverage: &'a [u8],
}

/// Glyph rasterizer over a single font
pub struct GlyphRasterizer {
    font: Font,
    cache: HashMap<(char, u32), (Metrics, Vec<u8>)>,
}

impl GlyphRasterizer {
    /// Parse a font from memory
    pub fn from_bytes(data: &[u8]) -> Result<Self, FontError> {
        let font = Font::from_bytes(data, FontSettings::default())
            .map_err(|e| FontError::Parse(e.to_string()))?;
        Ok(Self {
            font,
            cache: HashMap::new(),
        })
    }

    /// Load a TTF/OTF font from disk
    pub fn load(path: &Path) -> Result<Self, FontError> {
        let data = std::fs::read(path).map_err(|source| FontError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let rasterizer = Self::from_bytes(&data)?;
        info!("Loaded overlay font {}", path.display());
        Ok(rasterizer)
    }

    fn glyph(&mut self, c: char, size: f32) -> &(Metrics, Vec<u8>) {
        let key = (c, size.to_bits());
        let font = &self.font;
        self.cache.entry(key).or_insert_with(|| font.rasterize(c, size))
    }

    /// Lay out a single line and visit each visible glyph in order
    pub fn layout_line(&mut self, text: &str, size: f32, mut visit: impl FnMut(PlacedGlyph<'_>)) {
        let mut pen_x = 0.0f32;

        for c in text.chars() {
            let (metrics, coverage) = self.glyph(c, size);

            if metrics.width > 0 && metrics.height > 0 {
                visit(PlacedGlyph {
                    x: (pen_x + metrics.xmin as f32).round() as i32,
                    y: -(metrics.ymin + metrics.height as i32),
                    width: metrics.width,
                    height: metrics.height,
                    coverage,
                });
            }

            pen_x += metrics.advance_width;
        }
    }
}
