//! Rendering Pipeline - Template to Pixels
//!
//! One pure function draws a template onto a surface. The editor canvas,
//! the read-only preview and the final export all go through `render`, so
//! the three stay pixel-identical. The only difference between them is the
//! `LayerPolicy` applied to image layers that fail to decode.
//!
//! Layer order: background (or white), logo, text elements in array order,
//! name placeholder last.

use image::imageops::{self, FilterType};
use image::{ImageEncoder, Rgba, RgbaImage};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::fonts::{FontBook, GlyphRun};
use crate::geometry::{Rect, MAX_SURFACE_EXTENT};
use crate::images::{DecodeError, ImageSource};
use crate::templates::{Align, Rgb, Template, TextBlock};

/// Drawn into the name placeholder when no recipient name is known.
pub const STUDENT_NAME_PLACEHOLDER: &str = "<Student Name>";

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const SELECTION_COLOR: Rgb = Rgb::new(0x3b, 0x82, 0xf6);
const SELECTION_LINE_WIDTH: f64 = 2.0;
const SELECTION_DASH: f64 = 5.0;
const HANDLE_SIZE: f64 = 8.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Background,
    Logo,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Background => write!(f, "background"),
            Layer::Logo => write!(f, "logo"),
        }
    }
}

/// What to do when an image layer fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerPolicy {
    /// Skip the layer and keep drawing (editor, preview).
    Tolerant,
    /// Abort the render (export). An incomplete certificate must never ship.
    Strict,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to load {layer} image: {source}")]
    Decode {
        layer: Layer,
        #[source]
        source: DecodeError,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedLayer {
    pub layer: Layer,
    pub reason: String,
}

/// Layers a tolerant render had to leave out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderReport {
    pub skipped: Vec<SkippedLayer>,
}

impl RenderReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// An RGBA raster the pipeline draws onto.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    pixels: RgbaImage,
}

impl Surface {
    /// Each edge is clamped to `1..=MAX_SURFACE_EXTENT`.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::from_pixel(
                width.clamp(1, MAX_SURFACE_EXTENT),
                height.clamp(1, MAX_SURFACE_EXTENT),
                WHITE,
            ),
        }
    }

    /// Full-resolution surface sized to the template's canvas.
    pub fn for_template(template: &Template) -> Self {
        let (w, h) = template.surface_size();
        Self::new(w, h)
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        self.pixels.get_pixel_checked(x, y).copied()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }

    /// Encode as PNG.
    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut png_bytes = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
        encoder.write_image(
            self.pixels.as_raw(),
            self.pixels.width(),
            self.pixels.height(),
            image::ExtendedColorType::Rgba8,
        )?;
        Ok(png_bytes)
    }
}

/// Shared resources a render pass reads from.
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    pub fonts: &'a FontBook,
    pub images: &'a dyn ImageSource,
}

impl<'a> RenderContext<'a> {
    pub fn new(fonts: &'a FontBook, images: &'a dyn ImageSource) -> Self {
        Self { fonts, images }
    }
}

/// Canvas units to surface pixels. Uniform, driven by width.
pub fn surface_scale(surface: &Surface, template: &Template) -> f64 {
    if template.canvas_width.is_finite() && template.canvas_width > 0.0 {
        surface.width() as f64 / template.canvas_width
    } else {
        1.0
    }
}

/// X coordinate handed to the text primitive for a block's alignment.
pub fn anchor_x(block: &TextBlock) -> f64 {
    match block.align {
        Align::Left => block.x,
        Align::Center => block.x + block.width / 2.0,
        Align::Right => block.x + block.width,
    }
}

/// Draw `template` onto `surface`, filling the name placeholder with
/// `substitution`.
pub fn render(
    surface: &mut Surface,
    template: &Template,
    substitution: &str,
    ctx: &RenderContext<'_>,
    policy: LayerPolicy,
) -> Result<RenderReport, RenderError> {
    let scale = surface_scale(surface, template);
    let mut report = RenderReport::default();
    debug!(
        "Rendering template {} onto {}x{} (scale {:.3})",
        template.id,
        surface.width(),
        surface.height(),
        scale
    );

    let (w, h) = (surface.width(), surface.height());
    surface.pixels = RgbaImage::from_pixel(w, h, WHITE);

    if let Some(reference) = &template.background_image {
        if let Some(bg) = load_layer(ctx, reference, Layer::Background, policy, &mut report)? {
            let stretched = bg.resize_exact(w, h, FilterType::Triangle).to_rgba8();
            imageops::overlay(&mut surface.pixels, &stretched, 0, 0);
        }
    }

    if let Some(logo) = &template.logo {
        if let Some(img) = load_layer(ctx, &logo.url, Layer::Logo, policy, &mut report)? {
            let target = Rect::new(
                (logo.x * scale).round(),
                (logo.y * scale).round(),
                (logo.width * scale).round(),
                (logo.height * scale).round(),
            );
            draw_stretched(&mut surface.pixels, &img, target);
        }
    }

    for block in &template.text_elements {
        draw_text(surface, block, block.text.as_deref().unwrap_or(""), scale, ctx.fonts);
    }

    draw_text(surface, &template.name_placeholder, substitution, scale, ctx.fonts);

    Ok(report)
}

/// Stretch `img` onto `target` (surface pixels), drawing only the part of
/// the box that overlaps the surface.
fn draw_stretched(pixels: &mut RgbaImage, img: &image::DynamicImage, target: Rect) {
    let Rect { x, y, width, height } = target;
    if !(x.is_finite() && y.is_finite() && width >= 1.0 && height >= 1.0 && width.is_finite() && height.is_finite()) {
        return;
    }
    if img.width() == 0 || img.height() == 0 {
        return;
    }
    let vx0 = x.max(0.0);
    let vy0 = y.max(0.0);
    let vx1 = (x + width).min(pixels.width() as f64);
    let vy1 = (y + height).min(pixels.height() as f64);
    if vx1 - vx0 < 1.0 || vy1 - vy0 < 1.0 {
        return;
    }

    // Source region that maps onto the visible part of the box.
    let fx = img.width() as f64 / width;
    let fy = img.height() as f64 / height;
    let sx0 = (((vx0 - x) * fx).floor() as u32).min(img.width() - 1);
    let sy0 = (((vy0 - y) * fy).floor() as u32).min(img.height() - 1);
    let sx1 = (((vx1 - x) * fx).ceil() as u32).clamp(sx0 + 1, img.width());
    let sy1 = (((vy1 - y) * fy).ceil() as u32).clamp(sy0 + 1, img.height());

    let visible = img
        .crop_imm(sx0, sy0, sx1 - sx0, sy1 - sy0)
        .resize_exact((vx1 - vx0) as u32, (vy1 - vy0) as u32, FilterType::Triangle)
        .to_rgba8();
    imageops::overlay(pixels, &visible, vx0 as i64, vy0 as i64);
}

fn load_layer(
    ctx: &RenderContext<'_>,
    reference: &str,
    layer: Layer,
    policy: LayerPolicy,
    report: &mut RenderReport,
) -> Result<Option<image::DynamicImage>, RenderError> {
    match ctx.images.load(reference) {
        Ok(img) => Ok(Some(img)),
        Err(source) => match policy {
            LayerPolicy::Strict => Err(RenderError::Decode { layer, source }),
            LayerPolicy::Tolerant => {
                warn!("Skipping {} layer: {}", layer, source);
                report.skipped.push(SkippedLayer {
                    layer,
                    reason: source.to_string(),
                });
                Ok(None)
            }
        },
    }
}

/// Draw one text block: baseline at the top of the box, horizontal anchor
/// from `anchor_x`.
fn draw_text(surface: &mut Surface, block: &TextBlock, text: &str, scale: f64, fonts: &FontBook) {
    if text.is_empty() {
        return;
    }
    let run = fonts.rasterize(text, &block.font_family, block.font_weight, (block.font_size * scale) as f32);
    if run.is_empty() {
        return;
    }
    let anchor = anchor_x(block) * scale;
    let left = match block.align {
        Align::Left => anchor,
        Align::Center => anchor - run.width as f64 / 2.0,
        Align::Right => anchor - run.width as f64,
    };
    blend_run(&mut surface.pixels, &run, left.round() as i64, (block.y * scale).round() as i64, block.color);
}

fn blend_run(pixels: &mut RgbaImage, run: &GlyphRun, ox: i64, oy: i64, color: Rgb) {
    let (w, h) = (pixels.width() as i64, pixels.height() as i64);
    for ry in 0..run.height {
        let y = oy.saturating_add(ry as i64);
        if y < 0 || y >= h {
            continue;
        }
        for rx in 0..run.width {
            let x = ox.saturating_add(rx as i64);
            let c = run.at(rx, ry);
            if x < 0 || x >= w || c <= 0.0 {
                continue;
            }
            let dst = pixels.get_pixel_mut(x as u32, y as u32);
            *dst = blend(*dst, color, c);
        }
    }
}

fn blend(dst: Rgba<u8>, color: Rgb, coverage: f32) -> Rgba<u8> {
    let a = coverage.clamp(0.0, 1.0);
    let mix = |src: u8, d: u8| (src as f32 * a + d as f32 * (1.0 - a)).round() as u8;
    Rgba([
        mix(color.r, dst[0]),
        mix(color.g, dst[1]),
        mix(color.b, dst[2]),
        mix(255, dst[3]),
    ])
}

fn fill_rect(pixels: &mut RgbaImage, x: f64, y: f64, w: f64, h: f64, color: Rgb) {
    let x0 = x.round().max(0.0) as i64;
    let y0 = y.round().max(0.0) as i64;
    let x1 = ((x + w).round() as i64).min(pixels.width() as i64);
    let y1 = ((y + h).round() as i64).min(pixels.height() as i64);
    for py in y0..y1 {
        for px in x0..x1 {
            pixels.put_pixel(px as u32, py as u32, Rgba([color.r, color.g, color.b, 255]));
        }
    }
}

/// Editor-only decoration: dashed outline plus corner handles around the
/// selected element. Drawn after `render`, never part of an export.
pub fn draw_selection_overlay(surface: &mut Surface, rect: Rect, scale: f64) {
    let x = rect.x * scale;
    let y = rect.y * scale;
    let w = rect.width * scale;
    let h = rect.height * scale;
    let half = SELECTION_LINE_WIDTH / 2.0;
    let pixels = &mut surface.pixels;

    // Horizontal edges.
    let mut t = 0.0;
    while t < w {
        let len = SELECTION_DASH.min(w - t);
        fill_rect(pixels, x + t, y - half, len, SELECTION_LINE_WIDTH, SELECTION_COLOR);
        fill_rect(pixels, x + t, y + h - half, len, SELECTION_LINE_WIDTH, SELECTION_COLOR);
        t += SELECTION_DASH * 2.0;
    }
    // Vertical edges.
    let mut t = 0.0;
    while t < h {
        let len = SELECTION_DASH.min(h - t);
        fill_rect(pixels, x - half, y + t, SELECTION_LINE_WIDTH, len, SELECTION_COLOR);
        fill_rect(pixels, x + w - half, y + t, SELECTION_LINE_WIDTH, len, SELECTION_COLOR);
        t += SELECTION_DASH * 2.0;
    }

    let hs = HANDLE_SIZE / 2.0;
    for (cx, cy) in [(x, y), (x + w, y), (x, y + h), (x + w, y + h)] {
        fill_rect(pixels, cx - hs, cy - hs, HANDLE_SIZE, HANDLE_SIZE, SELECTION_COLOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::tests::solid_png_data_url;
    use crate::images::ImageLoader;
    use crate::templates::{LogoPlacement, TextBlock};

    fn ink_columns(surface: &Surface, y0: u32, y1: u32) -> Option<(u32, u32)> {
        let mut min = None;
        let mut max = None;
        for y in y0..y1 {
            for x in 0..surface.width() {
                let p = surface.pixel(x, y).unwrap();
                if p[0] < 128 {
                    min = Some(min.map_or(x, |m: u32| m.min(x)));
                    max = Some(max.map_or(x, |m: u32| m.max(x)));
                }
            }
        }
        min.zip(max)
    }

    fn render_tolerant(template: &Template, name: &str) -> (Surface, RenderReport) {
        let fonts = FontBook::new();
        let loader = ImageLoader::new();
        let ctx = RenderContext::new(&fonts, &loader);
        let mut surface = Surface::for_template(template);
        let report = render(&mut surface, template, name, &ctx, LayerPolicy::Tolerant).unwrap();
        (surface, report)
    }

    #[test]
    fn test_anchor_rule() {
        let mut block = TextBlock::new_text(1);
        block.x = 100.0;
        block.width = 200.0;
        block.align = Align::Left;
        assert_eq!(anchor_x(&block), 100.0);
        block.align = Align::Center;
        assert_eq!(anchor_x(&block), 200.0);
        block.align = Align::Right;
        assert_eq!(anchor_x(&block), 300.0);
    }

    #[test]
    fn test_empty_template_is_white() {
        let template = Template::empty("t", "T");
        let (surface, report) = render_tolerant(&template, "");
        assert!(report.is_complete());
        assert!(surface.pixels().pixels().all(|p| *p == WHITE));
    }

    #[test]
    fn test_left_aligned_text_starts_at_box() {
        let mut template = Template::empty("t", "T");
        let mut block = TextBlock::new_text(1);
        block.text = Some("IIII".to_string());
        block.x = 100.0;
        block.y = 100.0;
        template.text_elements.push(block);

        let (surface, _) = render_tolerant(&template, "");
        let (min, _) = ink_columns(&surface, 100, 124).unwrap();
        assert!((100..112).contains(&min), "ink starts at {}", min);
        assert!(ink_columns(&surface, 0, 99).is_none());
    }

    #[test]
    fn test_right_aligned_text_ends_at_box_edge() {
        let mut template = Template::empty("t", "T");
        let mut block = TextBlock::new_text(1);
        block.text = Some("MMMM".to_string());
        block.x = 100.0;
        block.y = 200.0;
        block.width = 400.0;
        block.align = Align::Right;
        template.text_elements.push(block);

        let (surface, _) = render_tolerant(&template, "");
        let (_, max) = ink_columns(&surface, 200, 224).unwrap();
        assert!(max <= 500 && max >= 488, "ink ends at {}", max);
    }

    #[test]
    fn test_later_layers_occlude_earlier() {
        let mut template = Template::empty("t", "T");
        template.background_image = Some(solid_png_data_url(2, 2, [255, 0, 0, 255]));
        template.logo = Some(LogoPlacement {
            url: solid_png_data_url(2, 2, [0, 255, 0, 255]),
            ..LogoPlacement::uploaded("")
        });
        let (surface, report) = render_tolerant(&template, "");
        assert!(report.is_complete());
        assert_eq!(surface.pixel(5, 5).unwrap(), Rgba([255, 0, 0, 255]));
        assert_eq!(surface.pixel(100, 100).unwrap(), Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn test_tolerant_skips_broken_layers() {
        let mut template = Template::empty("t", "T");
        template.background_image = Some("data:image/png;base64,AAAA".to_string());
        template.logo = Some(LogoPlacement::uploaded("data:image/png;base64,AAAA"));
        let (surface, report) = render_tolerant(&template, "Ada");
        let layers: Vec<_> = report.skipped.iter().map(|s| s.layer).collect();
        assert_eq!(layers, vec![Layer::Background, Layer::Logo]);
        assert_eq!(surface.pixel(0, 0).unwrap(), WHITE);
    }

    #[test]
    fn test_strict_aborts_on_broken_logo() {
        let mut template = Template::empty("t", "T");
        template.logo = Some(LogoPlacement::uploaded("data:image/png;base64,AAAA"));
        let fonts = FontBook::new();
        let loader = ImageLoader::new();
        let ctx = RenderContext::new(&fonts, &loader);
        let mut surface = Surface::for_template(&template);
        let err = render(&mut surface, &template, "Ada", &ctx, LayerPolicy::Strict).unwrap_err();
        assert!(matches!(err, RenderError::Decode { layer: Layer::Logo, .. }));
    }

    #[test]
    fn test_render_is_deterministic() {
        let template = Template::showcase("t", "T");
        let (a, _) = render_tolerant(&template, "Grace Hopper");
        let (b, _) = render_tolerant(&template, "Grace Hopper");
        assert_eq!(a.to_png().unwrap(), b.to_png().unwrap());
    }

    #[test]
    fn test_half_scale_surface() {
        let mut template = Template::empty("t", "T");
        template.logo = Some(LogoPlacement {
            x: 200.0,
            y: 200.0,
            ..LogoPlacement::uploaded(solid_png_data_url(1, 1, [0, 0, 255, 255]))
        });
        let fonts = FontBook::new();
        let loader = ImageLoader::new();
        let ctx = RenderContext::new(&fonts, &loader);
        let mut surface = Surface::new(500, 354);
        render(&mut surface, &template, "", &ctx, LayerPolicy::Tolerant).unwrap();
        assert_eq!(surface.pixel(120, 120).unwrap(), Rgba([0, 0, 255, 255]));
        assert_eq!(surface.pixel(160, 160).unwrap(), WHITE);
    }

    #[test]
    fn test_oversized_logo_is_clipped() {
        let mut template = Template::empty("t", "T");
        template.logo = Some(LogoPlacement {
            x: -1e12,
            y: 20.0,
            width: 1e13,
            height: 1e12,
            ..LogoPlacement::uploaded(solid_png_data_url(2, 2, [0, 255, 0, 255]))
        });
        let (surface, report) = render_tolerant(&template, "");
        assert!(report.is_complete());
        assert_eq!(surface.pixel(500, 500).unwrap(), Rgba([0, 255, 0, 255]));
        assert_eq!(surface.pixel(500, 10).unwrap(), WHITE);
    }

    #[test]
    fn test_partially_visible_logo() {
        let mut template = Template::empty("t", "T");
        template.logo = Some(LogoPlacement {
            x: 950.0,
            y: -50.0,
            ..LogoPlacement::uploaded(solid_png_data_url(4, 4, [0, 0, 255, 255]))
        });
        let (surface, _) = render_tolerant(&template, "");
        assert_eq!(surface.pixel(999, 0).unwrap(), Rgba([0, 0, 255, 255]));
        assert_eq!(surface.pixel(960, 49).unwrap(), Rgba([0, 0, 255, 255]));
        assert_eq!(surface.pixel(960, 51).unwrap(), WHITE);
        assert_eq!(surface.pixel(940, 10).unwrap(), WHITE);
    }

    #[test]
    fn test_far_away_text_is_ignored() {
        let mut template = Template::empty("t", "T");
        let mut block = TextBlock::new_text(1);
        block.x = 1e300;
        block.y = -1e300;
        block.width = -1e300;
        template.text_elements.push(block);
        let (surface, _) = render_tolerant(&template, "");
        assert!(surface.pixels().pixels().all(|p| *p == WHITE));
    }

    #[test]
    fn test_surface_is_bounded() {
        let surface = Surface::new(u32::MAX, 0);
        assert_eq!((surface.width(), surface.height()), (MAX_SURFACE_EXTENT, 1));
    }

    #[test]
    fn test_selection_overlay_marks_corners() {
        let mut surface = Surface::new(200, 200);
        draw_selection_overlay(&mut surface, Rect::new(50.0, 50.0, 100.0, 40.0), 1.0);
        let blue = Rgba([0x3b, 0x82, 0xf6, 255]);
        assert_eq!(surface.pixel(50, 50).unwrap(), blue);
        assert_eq!(surface.pixel(150, 90).unwrap(), blue);
        assert_eq!(surface.pixel(100, 70).unwrap(), WHITE);
    }
}
