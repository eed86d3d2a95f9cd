//! Bitmap font descriptions handed to the render worker at startup.
//!
//! The worker never touches font files. The host loads the atlases, measures
//! the glyphs, and ships the result here as plain data; everything the worker
//! needs to lay out and mesh a label is in [`BitmapFontSpec`].

use std::collections::HashMap;

/// Opaque handle to a glyph atlas texture owned by the host renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtlasId(pub u32);

/// The four style variants cells can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FontStyle {
    #[default]
    Regular,
    Bold,
    Italic,
    BoldItalic,
}

impl FontStyle {
    pub const COUNT: usize = 4;

    pub const fn index(self) -> usize {
        match self {
            FontStyle::Regular => 0,
            FontStyle::Bold => 1,
            FontStyle::Italic => 2,
            FontStyle::BoldItalic => 3,
        }
    }
}

/// Placement data for one glyph.
///
/// `advance`, `size` and `offset` are in world units at the font's nominal
/// size; `offset` goes from the pen position on the baseline to the quad's
/// top-left corner, so its y component is usually negative. `uv` is the atlas
/// sub-rectangle as `[u0, v0, u1, v1]` in normalized texture coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphMetrics {
    pub advance: f64,
    pub size: [f64; 2],
    pub offset: [f64; 2],
    pub uv: [f32; 4],
}

/// One measured bitmap font variant.
#[derive(Debug, Clone)]
pub struct BitmapFontSpec {
    pub style: FontStyle,
    pub atlas: AtlasId,
    pub line_height: f64,
    pub ascent: f64,
    /// Advance applied for characters missing from `glyphs`.
    pub default_advance: f64,
    pub glyphs: HashMap<char, GlyphMetrics>,
}

impl BitmapFontSpec {
    pub fn glyph(&self, ch: char) -> Option<&GlyphMetrics> {
        self.glyphs.get(&ch)
    }

    /// Advance for a character, falling back to `default_advance` when the
    /// atlas has no glyph for it.
    pub fn advance_of(&self, ch: char) -> f64 {
        self.glyph(ch).map_or(self.default_advance, |g| g.advance)
    }

    /// Unclipped width of a single-line string.
    pub fn measure(&self, text: &str) -> f64 {
        text.chars().map(|ch| self.advance_of(ch)).sum()
    }

    /// Spec with identical metrics for every printable ASCII character.
    ///
    /// Real hosts measure their atlases; this covers harnesses and the demo,
    /// where only the coordination behavior matters.
    pub fn uniform_ascii(style: FontStyle, atlas: AtlasId, advance: f64, line_height: f64) -> Self {
        // With the ascent at 0.8 of the line, quads start 0.1 below the
        // row top.
        let metrics = GlyphMetrics {
            advance,
            size: [advance, line_height * 0.8],
            offset: [0.0, -line_height * 0.7],
            uv: [0.0, 0.0, 1.0, 1.0],
        };
        let glyphs = (0x20u8..0x7f)
            .map(|byte| (byte as char, metrics))
            .collect();
        Self {
            style,
            atlas,
            line_height,
            ascent: line_height * 0.8,
            default_advance: advance,
            glyphs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measure_uses_default_advance_for_missing_glyphs() {
        let font = BitmapFontSpec::uniform_ascii(FontStyle::Regular, AtlasId(0), 6.0, 16.0);
        assert_eq!(font.measure("abc"), 18.0);
        // U+00E9 is outside the ASCII table, so the default advance applies.
        assert_eq!(font.measure("\u{e9}"), 6.0);
        assert_eq!(font.measure(""), 0.0);
    }

    #[test]
    fn style_indices_are_dense() {
        let styles = [
            FontStyle::Regular,
            FontStyle::Bold,
            FontStyle::Italic,
            FontStyle::BoldItalic,
        ];
        for (expected, style) in styles.into_iter().enumerate() {
            assert_eq!(style.index(), expected);
        }
        assert_eq!(styles.len(), FontStyle::COUNT);
    }
}
