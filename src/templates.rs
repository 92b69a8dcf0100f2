//! Template Data Model - Certificate Layouts
//!
//! A template is a background, an optional logo, static text blocks and
//! exactly one name placeholder, all positioned in canvas space.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::geometry::{Rect, CANVAS_HEIGHT, CANVAS_WIDTH, MAX_SURFACE_EXTENT};

pub type TemplateId = String;
pub type TextId = u64;

/// Largest text element id accepted from storage.
pub const MAX_TEXT_ID: TextId = u32::MAX as TextId;

pub const SHOWCASE_BACKGROUND: &str = "/certificate_bg/image1.png";
pub const UNNAMED_TEMPLATE: &str = "Unnamed Template";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TemplateMode {
    /// Starts empty.
    #[default]
    Custom,
    /// Starts pre-populated with example content.
    #[serde(rename = "default")]
    Showcase,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

impl FromStr for Align {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" | "start" => Ok(Self::Left),
            "center" => Ok(Self::Center),
            "right" | "end" => Ok(Self::Right),
            other => Err(format!("unknown alignment '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    #[default]
    Normal,
    Bold,
}

impl FromStr for FontWeight {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "normal" | "lighter" => Ok(Self::Normal),
            "bold" | "bolder" => Ok(Self::Bold),
            numeric => numeric
                .parse::<u32>()
                .map(|w| if w >= 600 { Self::Bold } else { Self::Normal })
                .map_err(|_| format!("unknown font weight '{}'", numeric)),
        }
    }
}

/// An sRGB color, persisted as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl FromStr for Rgb {
    type Err = String;

    /// Accepts `#rrggbb` and the `#rgb` shorthand.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .trim()
            .strip_prefix('#')
            .ok_or_else(|| format!("color '{}' must start with '#'", s))?;
        if !hex.is_ascii() {
            return Err(format!("invalid color '{}'", s));
        }
        let channel = |h: &str| u8::from_str_radix(h, 16).map_err(|_| format!("invalid color '{}'", s));
        match hex.len() {
            6 => Ok(Self::new(channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?)),
            3 => {
                let short = |i: usize| channel(&hex[i..i + 1]).map(|v| v * 17);
                Ok(Self::new(short(0)?, short(1)?, short(2)?))
            }
            _ => Err(format!("invalid color '{}'", s)),
        }
    }
}

impl TryFrom<String> for Rgb {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgb> for String {
    fn from(c: Rgb) -> Self {
        c.to_string()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// A positioned, styled block of text.
///
/// Static text blocks carry their `text`; the name placeholder never does,
/// its text is supplied when rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextBlock {
    #[serde(default)]
    pub id: TextId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub font_size: f64,
    pub font_family: String,
    pub font_weight: FontWeight,
    pub color: Rgb,
    pub align: Align,
}

impl TextBlock {
    /// A freshly added static text block.
    pub fn new_text(id: TextId) -> Self {
        Self {
            id,
            text: Some("New Text".to_string()),
            x: 100.0,
            y: 100.0,
            width: 200.0,
            height: 40.0,
            font_size: 24.0,
            font_family: "sans-serif".to_string(),
            font_weight: FontWeight::Normal,
            color: Rgb::BLACK,
            align: Align::Left,
        }
    }

    /// The default name placeholder, centered horizontally.
    pub fn name_placeholder() -> Self {
        Self {
            id: 0,
            text: None,
            x: CANVAS_WIDTH / 2.0 - 150.0,
            y: 320.0,
            width: 300.0,
            height: 60.0,
            font_size: 36.0,
            font_family: "serif".to_string(),
            font_weight: FontWeight::Bold,
            color: Rgb::BLACK,
            align: Align::Center,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    /// CSS-style font shorthand: `weight size family`.
    pub fn font_spec(&self) -> String {
        let weight = match self.font_weight {
            FontWeight::Normal => "normal",
            FontWeight::Bold => "bold",
        };
        format!("{} {}px {}", weight, self.font_size, self.font_family)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogoPlacement {
    pub url: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl LogoPlacement {
    /// Placement given to a freshly uploaded logo.
    pub fn uploaded(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            x: 50.0,
            y: 50.0,
            width: 100.0,
            height: 100.0,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    #[serde(default)]
    pub mode: TemplateMode,
    #[serde(default)]
    pub background_image: Option<String>,
    #[serde(default)]
    pub logo: Option<LogoPlacement>,
    #[serde(default)]
    pub text_elements: Vec<TextBlock>,
    pub name_placeholder: TextBlock,
    pub canvas_width: f64,
    pub canvas_height: f64,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

/// Templates are the same template when their ids match.
impl PartialEq for Template {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Template {}

impl Template {
    /// An empty template: white background, no text, default name placeholder.
    pub fn empty(id: impl Into<TemplateId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mode: TemplateMode::Custom,
            background_image: None,
            logo: None,
            text_elements: vec![],
            name_placeholder: TextBlock::name_placeholder(),
            canvas_width: CANVAS_WIDTH,
            canvas_height: CANVAS_HEIGHT,
            saved_at: None,
        }
    }

    /// A template pre-populated with example certificate content.
    pub fn showcase(id: impl Into<TemplateId>, name: impl Into<String>) -> Self {
        let center = CANVAS_WIDTH / 2.0;
        let block = |id, text: &str, x, y, width, height, font_size, family: &str, weight, color| TextBlock {
            id,
            text: Some(text.to_string()),
            x,
            y,
            width,
            height,
            font_size,
            font_family: family.to_string(),
            font_weight: weight,
            color,
            align: Align::Center,
        };

        Self {
            mode: TemplateMode::Showcase,
            background_image: Some(SHOWCASE_BACKGROUND.to_string()),
            text_elements: vec![
                block(1, "CERTIFICATE OF ACHIEVEMENT", center - 200.0, 100.0, 400.0, 60.0, 32.0,
                    "serif", FontWeight::Bold, Rgb::BLACK),
                block(2, "This certificate is awarded to", center - 150.0, 250.0, 300.0, 40.0, 20.0,
                    "sans-serif", FontWeight::Normal, Rgb::new(0x33, 0x33, 0x33)),
                block(3, "for successfully completing the program", center - 200.0, 450.0, 400.0, 40.0, 18.0,
                    "sans-serif", FontWeight::Normal, Rgb::new(0x66, 0x66, 0x66)),
            ],
            ..Self::empty(id, name)
        }
    }

    /// Create a template with a fresh id.
    pub fn create(mode: TemplateMode, name: impl Into<String>) -> Self {
        let id = Uuid::new_v4().to_string();
        match mode {
            TemplateMode::Custom => Self::empty(id, name),
            TemplateMode::Showcase => Self::showcase(id, name),
        }
    }

    /// Id for the next static text block: `max(existing, 0) + 1`.
    pub fn next_text_id(&self) -> TextId {
        self.text_elements.iter().map(|t| t.id).max().unwrap_or(0).saturating_add(1)
    }

    pub fn text_element(&self, id: TextId) -> Option<&TextBlock> {
        self.text_elements.iter().find(|t| t.id == id)
    }

    pub fn text_element_mut(&mut self, id: TextId) -> Option<&mut TextBlock> {
        self.text_elements.iter_mut().find(|t| t.id == id)
    }

    /// Pixel size of a full-resolution surface for this template, at most
    /// `MAX_SURFACE_EXTENT` per edge.
    pub fn surface_size(&self) -> (u32, u32) {
        (to_pixels(self.canvas_width), to_pixels(self.canvas_height))
    }
}

fn to_pixels(v: f64) -> u32 {
    if v.is_finite() && v >= 1.0 {
        v.round().min(MAX_SURFACE_EXTENT as f64) as u32
    } else {
        1
    }
}

/// `"Template N"` where N is one past the highest existing `"Template <n>"`.
pub fn default_template_name<'a>(existing: impl IntoIterator<Item = &'a str>) -> String {
    let max = existing
        .into_iter()
        .filter_map(|name| name.strip_prefix("Template "))
        .filter(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|suffix| suffix.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    format!("Template {}", max + 1)
}
