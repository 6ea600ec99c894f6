//! Overlay compositing
//!
//! The overlay is a transparent 2D layer stacked above the video layer.
//! It owns only its own draw context and is redrawn on its own schedule,
//! so status text stays visible while the video layer is stalled.

use crate::text::{GlyphRasterizer, TextStyle};
use tracing::warn;

/// Minimal 2D drawing context the compositor draws through
pub trait OverlaySurface {
    /// Surface size in pixels
    fn size(&self) -> (u32, u32);

    /// Clear every pixel to fully transparent
    fn clear(&mut self);

    /// Draw a single line of text with its baseline at `y`
    fn fill_text(&mut self, text: &str, x: f32, y: f32, style: &TextStyle);
}

/// CPU-backed transparent RGBA layer
pub struct OverlayLayer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    glyphs: Option<GlyphRasterizer>,
    revision: u64,
    warned_no_font: bool,
}

impl OverlayLayer {
    pub fn new(width: u32, height: u32, glyphs: Option<GlyphRasterizer>) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            pixels: vec![0; (width as usize) * (height as usize) * 4],
            glyphs,
            revision: 0,
            warned_no_font: false,
        }
    }

    /// Straight-alpha RGBA8 pixels
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Bumped on every mutation; hosts re-upload when it changes
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn blend(&mut self, x: i32, y: i32, rgba: [u8; 4], coverage: u8) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }

        let alpha = (rgba[3] as u32 * coverage as u32) / 255;
        if alpha == 0 {
            return;
        }

        let idx = ((y as usize) * (self.width as usize) + x as usize) * 4;
        let dst = &mut self.pixels[idx..idx + 4];
        let dst_a = dst[3] as u32;
        let out_a = alpha + dst_a * (255 - alpha) / 255;

        for i in 0..3 {
            let src = rgba[i] as u32 * alpha;
            let under = dst[i] as u32 * dst_a * (255 - alpha) / 255;
            dst[i] = ((src + under) / out_a.max(1)) as u8;
        }
        dst[3] = out_a as u8;
    }
}

impl OverlaySurface for OverlayLayer {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self) {
        self.pixels.fill(0);
        self.revision += 1;
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, style: &TextStyle) {
        let Some(mut glyphs) = self.glyphs.take() else {
            if !self.warned_no_font {
                warn!("Overlay has no font loaded, text will not be drawn");
                self.warned_no_font = true;
            }
            return;
        };

        let rgba = style.color.to_rgba8();
        let origin_x = x.round() as i32;
        let baseline = y.round() as i32;

        glyphs.layout_line(text, style.size, |glyph| {
            for row in 0..glyph.height {
                for col in 0..glyph.width {
                    let coverage = glyph.coverage[row * glyph.width + col];
                    if coverage > 0 {
                        self.blend(
                            origin_x + glyph.x + col as i32,
                            baseline + glyph.y + row as i32,
                            rgba,
                            coverage,
                        );
                    }
                }
            }
        });

        self.glyphs = Some(glyphs);
        self.revision += 1;
    }
}

/// Redraws the current overlay text at a fixed anchor
pub struct OverlayCompositor<S: OverlaySurface = OverlayLayer> {
    surface: S,
    text: Option<String>,
    status: Option<(String, TextStyle)>,
    style: TextStyle,
    anchor: (f32, f32),
}

impl<S: OverlaySurface> OverlayCompositor<S> {
    pub fn new(surface: S, style: TextStyle, anchor: (f32, f32)) -> Self {
        Self {
            surface,
            text: None,
            status: None,
            style,
            anchor,
        }
    }

    /// Replace the overlay text; `None` leaves only a clear on redraw
    pub fn set_text(&mut self, text: Option<String>) {
        self.text = text.filter(|t| !t.is_empty());
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Secondary line drawn under the overlay text
    pub fn set_status(&mut self, status: Option<(String, TextStyle)>) {
        self.status = status;
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_ref().map(|(s, _)| s.as_str())
    }

    /// One overlay tick: clear, then draw whatever text is current
    pub fn redraw(&mut self) {
        self.surface.clear();

        let (x, y) = self.anchor;
        if let Some(text) = &self.text {
            self.surface.fill_text(text, x, y, &self.style);
        }

        if let Some((status, style)) = &self.status {
            let line_y = if self.text.is_some() {
                y + self.style.size * 1.5
            } else {
                y
            };
            self.surface.fill_text(status, x, line_y, style);
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Color;

    #[derive(Default)]
    struct RecordingSurface {
        calls: Vec<String>,
    }

    impl OverlaySurface for RecordingSurface {
        fn size(&self) -> (u32, u32) {
            (640, 360)
        }

        fn clear(&mut self) {
            self.calls.push("clear".to_string());
        }

        fn fill_text(&mut self, text: &str, x: f32, y: f32, _style: &TextStyle) {
            self.calls.push(format!("text {} @ {},{}", text, x, y));
        }
    }

    #[test]
    fn test_redraw_without_text_only_clears() {
        let mut overlay = OverlayCompositor::new(RecordingSurface::default(), TextStyle::default(), (10.0, 24.0));
        overlay.redraw();
        assert_eq!(overlay.surface().calls, vec!["clear"]);
    }

    #[test]
    fn test_redraw_draws_at_anchor_every_tick() {
        let mut overlay = OverlayCompositor::new(RecordingSurface::default(), TextStyle::default(), (10.0, 24.0));
        overlay.set_text(Some("Video Stream".to_string()));
        overlay.redraw();
        overlay.redraw();

        assert_eq!(
            overlay.surface().calls,
            vec![
                "clear",
                "text Video Stream @ 10,24",
                "clear",
                "text Video Stream @ 10,24",
            ]
        );
    }

    #[test]
    fn test_empty_text_is_none() {
        let mut overlay = OverlayCompositor::new(RecordingSurface::default(), TextStyle::default(), (0.0, 0.0));
        overlay.set_text(Some(String::new()));
        assert!(overlay.text().is_none());
    }

    #[test]
    fn test_status_line_below_text() {
        let mut overlay = OverlayCompositor::new(RecordingSurface::default(), TextStyle::new(16.0), (10.0, 24.0));
        overlay.set_text(Some("Live".to_string()));
        overlay.set_status(Some(("Connecting...".to_string(), TextStyle::default())));
        overlay.redraw();

        assert_eq!(overlay.surface().calls[2], "text Connecting... @ 10,48");
    }

    #[test]
    fn test_layer_clear_is_transparent() {
        let mut layer = OverlayLayer::new(4, 4, None);
        let before = layer.revision();
        layer.fill_text("ignored", 0.0, 0.0, &TextStyle::default());
        layer.clear();

        assert!(layer.pixels().iter().all(|&p| p == 0));
        assert!(layer.revision() > before);
        assert_eq!(layer.size(), (4, 4));
    }

    #[test]
    fn test_blend_full_coverage() {
        let mut layer = OverlayLayer::new(2, 2, None);
        layer.blend(1, 1, Color::WHITE.to_rgba8(), 255);
        layer.blend(5, 5, Color::WHITE.to_rgba8(), 255);

        let idx = (1 * 2 + 1) * 4;
        assert_eq!(&layer.pixels()[idx..idx + 4], &[255, 255, 255, 255]);
        assert_eq!(&layer.pixels()[..4], &[0, 0, 0, 0]);
    }
}
