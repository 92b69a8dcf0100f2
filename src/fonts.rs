//! Text Rasterization - Font Book
//!
//! Renders a line of text to an anti-aliased coverage buffer. TrueType faces
//! can be registered per family and weight (ab_glyph); anything without a
//! registered face falls back to the built-in Spleen bitmap font, scaled to
//! the requested pixel size. Output is a pure function of the inputs.

use ab_glyph::{point, Font, FontArc, GlyphId, ScaleFont};
use spleen_font::{PSF2Font, FONT_12X24, FONT_8X16};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::templates::FontWeight;

const MIN_PIXEL_SIZE: f32 = 1.0;
const MAX_PIXEL_SIZE: f32 = 1000.0;

#[derive(Debug, Error)]
pub enum FontError {
    #[error("Failed to read font {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid font data for '{0}'")]
    InvalidFont(String),
}

/// A rasterized line of text.
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphRun {
    pub width: usize,
    pub height: usize,
    /// Coverage per pixel, 0.0 (empty) to 1.0 (fully inked), row-major.
    pub coverage: Vec<f32>,
}

impl GlyphRun {
    fn blank(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            coverage: vec![0.0; width * height],
        }
    }

    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.coverage.get(y * self.width + x).copied().unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FaceKey {
    family: String,
    weight: FontWeight,
}

impl FaceKey {
    fn new(family: &str, weight: FontWeight) -> Self {
        Self {
            family: normalize_family(family),
            weight,
        }
    }
}

fn normalize_family(family: &str) -> String {
    family.trim().trim_matches(|c| c == '"' || c == '\'').to_ascii_lowercase()
}

/// Registered font faces plus the built-in bitmap fallback.
#[derive(Clone, Default)]
pub struct FontBook {
    faces: HashMap<FaceKey, FontArc>,
}

impl FontBook {
    /// A font book with only the built-in bitmap face.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_bytes(&mut self, family: &str, weight: FontWeight, bytes: Vec<u8>) -> Result<(), FontError> {
        let font = FontArc::try_from_vec(bytes).map_err(|_| FontError::InvalidFont(family.to_string()))?;
        self.faces.insert(FaceKey::new(family, weight), font);
        Ok(())
    }

    pub fn register_file(&mut self, family: &str, weight: FontWeight, path: &Path) -> Result<(), FontError> {
        let bytes = std::fs::read(path).map_err(|source| FontError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.register_bytes(family, weight, bytes)
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Resolve a CSS family list (`"Times New Roman", serif`) to a face.
    ///
    /// Exact weight wins; otherwise any registered weight of the family.
    fn resolve(&self, family_list: &str, weight: FontWeight) -> Option<&FontArc> {
        let families: Vec<&str> = family_list.split(',').collect();
        families
            .iter()
            .find_map(|f| self.faces.get(&FaceKey::new(f, weight)))
            .or_else(|| {
                families.iter().find_map(|f| {
                    let other = match weight {
                        FontWeight::Normal => FontWeight::Bold,
                        FontWeight::Bold => FontWeight::Normal,
                    };
                    self.faces.get(&FaceKey::new(f, other))
                })
            })
    }

    /// Rasterize `text` so that row 0 is the top of the em box.
    pub fn rasterize(&self, text: &str, family: &str, weight: FontWeight, pixel_size: f32) -> GlyphRun {
        let px = if pixel_size.is_finite() {
            pixel_size.clamp(MIN_PIXEL_SIZE, MAX_PIXEL_SIZE)
        } else {
            MIN_PIXEL_SIZE
        };
        match self.resolve(family, weight) {
            Some(font) => rasterize_outline(font, text, px),
            None => rasterize_bitmap(text, weight == FontWeight::Bold, px),
        }
    }
}

fn rasterize_outline(font: &FontArc, text: &str, px: f32) -> GlyphRun {
    let scaled = font.as_scaled(px);

    let mut glyphs: Vec<(GlyphId, f32)> = Vec::new();
    let mut caret_x = 0.0f32;
    let mut previous: Option<GlyphId> = None;
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = previous {
            caret_x += scaled.kern(prev, id);
        }
        glyphs.push((id, caret_x));
        caret_x += scaled.h_advance(id);
        previous = Some(id);
    }

    let ascent = scaled.ascent();
    let width = caret_x.ceil().max(0.0) as usize;
    let height = (ascent - scaled.descent()).ceil().max(1.0) as usize;
    let mut run = GlyphRun::blank(width, height);

    for (id, glyph_x) in glyphs {
        let glyph = id.with_scale_and_position(px, point(glyph_x, ascent));
        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, c| {
                let x = gx as i64 + bounds.min.x as i64;
                let y = gy as i64 + bounds.min.y as i64;
                if x >= 0 && y >= 0 && (x as usize) < width && (y as usize) < height {
                    let idx = y as usize * width + x as usize;
                    run.coverage[idx] = (run.coverage[idx] + c).min(1.0);
                }
            });
        }
    }
    run
}

/// Bitmap glyph cell for one character, `true` where inked.
fn bitmap_glyph(font: Option<&mut PSF2Font>, ch: char, cell_w: usize, cell_h: usize) -> Vec<bool> {
    let mut cell = vec![false; cell_w * cell_h];
    let mut buf = [0u8; 4];
    let utf8 = ch.encode_utf8(&mut buf);

    let found = match font {
        Some(font) => match font.glyph_for_utf8(utf8.as_bytes()) {
            Some(glyph) => {
                for (row_y, row) in glyph.enumerate() {
                    for (col_x, on) in row.enumerate() {
                        if row_y < cell_h && col_x < cell_w {
                            cell[row_y * cell_w + col_x] = on;
                        }
                    }
                }
                true
            }
            None => false,
        },
        None => false,
    };

    if !found && !ch.is_whitespace() {
        // Unknown glyph: hollow box.
        for x in 0..cell_w {
            cell[x] = true;
            cell[(cell_h - 1) * cell_w + x] = true;
        }
        for y in 0..cell_h {
            cell[y * cell_w] = true;
            cell[y * cell_w + cell_w - 1] = true;
        }
    }
    cell
}

fn rasterize_bitmap(text: &str, bold: bool, px: f32) -> GlyphRun {
    // Pick the native cell closest to the target size.
    let (cell_w, cell_h, data) = if px < 20.0 { (8, 16, FONT_8X16) } else { (12, 24, FONT_12X24) };
    let scale = px / cell_h as f32;
    let dst_w = ((cell_w as f32 * scale).round() as usize).max(1);
    let dst_h = (px.round() as usize).max(1);
    let embolden = if bold { (scale.round() as usize).max(1) } else { 0 };

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return GlyphRun::blank(0, dst_h);
    }

    let width = dst_w * chars.len() + embolden;
    let mut run = GlyphRun::blank(width, dst_h);
    let mut font = PSF2Font::new(data).ok();

    for (i, &ch) in chars.iter().enumerate() {
        let cell = bitmap_glyph(font.as_mut(), ch, cell_w, cell_h);
        let origin = i * dst_w;
        for dy in 0..dst_h {
            let sy = dy * cell_h / dst_h;
            for dx in 0..dst_w {
                let sx = dx * cell_w / dst_w;
                if cell[sy * cell_w + sx] {
                    for k in 0..=embolden {
                        let x = origin + dx + k;
                        if x < width {
                            run.coverage[dy * width + x] = 1.0;
                        }
                    }
                }
            }
        }
    }
    run
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inked(run: &GlyphRun) -> usize {
        run.coverage.iter().filter(|&&c| c > 0.0).count()
    }

    #[test]
    fn test_bitmap_text_has_ink() {
        let book = FontBook::new();
        let run = book.rasterize("Hello", "serif", FontWeight::Normal, 24.0);
        assert_eq!(run.height, 24);
        assert_eq!(run.width, 5 * 12);
        assert!(inked(&run) > 0);
    }

    #[test]
    fn test_scaling_follows_pixel_size() {
        let book = FontBook::new();
        let run = book.rasterize("A", "serif", FontWeight::Normal, 36.0);
        assert_eq!((run.width, run.height), (18, 36));
        let small = book.rasterize("A", "serif", FontWeight::Normal, 16.0);
        assert_eq!((small.width, small.height), (8, 16));
    }

    #[test]
    fn test_bold_adds_ink() {
        let book = FontBook::new();
        let normal = book.rasterize("Bold", "serif", FontWeight::Normal, 24.0);
        let bold = book.rasterize("Bold", "serif", FontWeight::Bold, 24.0);
        assert!(inked(&bold) > inked(&normal));
    }

    #[test]
    fn test_empty_text() {
        let run = FontBook::new().rasterize("", "serif", FontWeight::Normal, 24.0);
        assert!(run.is_empty());
    }

    #[test]
    fn test_rasterize_is_deterministic() {
        let book = FontBook::new();
        let a = book.rasterize("Ada Lovelace", "serif", FontWeight::Bold, 36.0);
        let b = book.rasterize("Ada Lovelace", "serif", FontWeight::Bold, 36.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_font_bytes_rejected() {
        let mut book = FontBook::new();
        let err = book.register_bytes("serif", FontWeight::Normal, vec![0u8; 16]).unwrap_err();
        assert!(matches!(err, FontError::InvalidFont(_)));
        assert_eq!(book.face_count(), 0);
    }

    #[test]
    fn test_family_normalization() {
        assert_eq!(normalize_family(" \"Times New Roman\" "), "times new roman");
    }
}
