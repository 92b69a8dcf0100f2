//! Sanitization - Repair on Load
//!
//! Stored templates are weakly typed. Every field is coerced individually;
//! anything that cannot be coerced takes a fixed per-field default and is
//! recorded as a structured repair. Sanitization never fails.

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use uuid::Uuid;

use crate::geometry::{CANVAS_HEIGHT, CANVAS_WIDTH, MAX_SURFACE_EXTENT};
use crate::templates::{
    Align, FontWeight, LogoPlacement, Rgb, Template, TemplateMode, TextBlock, TextId, MAX_TEXT_ID, UNNAMED_TEMPLATE,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RepairReason {
    /// Field absent or null.
    Missing,
    /// Present but not coercible (or coerced to zero/NaN).
    Invalid,
    /// Present with a usable value of the wrong JSON type.
    Coerced,
    /// Id collided with an earlier element.
    Duplicate,
    /// Whole entry discarded.
    Dropped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repair {
    pub path: String,
    pub reason: RepairReason,
    pub original: Option<String>,
    pub replacement: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SanitizeReport {
    pub repairs: Vec<Repair>,
}

impl SanitizeReport {
    pub fn is_clean(&self) -> bool {
        self.repairs.is_empty()
    }

    pub fn touches(&self, path: &str) -> bool {
        self.repairs.iter().any(|r| r.path == path)
    }
}

/// Per-kind defaults for text blocks.
struct BlockDefaults {
    font_size: f64,
    width: f64,
    height: f64,
    font_family: &'static str,
    font_weight: FontWeight,
    align: Align,
}

const TEXT_DEFAULTS: BlockDefaults = BlockDefaults {
    font_size: 24.0,
    width: 200.0,
    height: 40.0,
    font_family: "sans-serif",
    font_weight: FontWeight::Normal,
    align: Align::Left,
};

const NAME_DEFAULTS: BlockDefaults = BlockDefaults {
    font_size: 36.0,
    width: 300.0,
    height: 60.0,
    font_family: "serif",
    font_weight: FontWeight::Bold,
    align: Align::Center,
};

const LOGO_SIZE_DEFAULT: f64 = 100.0;

/// Sanitize a stored template into a structurally valid `Template`.
pub fn sanitize(raw: &Value) -> Template {
    sanitize_with_report(raw).0
}

/// Sanitize and return the list of repairs that were applied.
pub fn sanitize_with_report(raw: &Value) -> (Template, SanitizeReport) {
    let mut s = Sanitizer::default();
    let empty = Map::new();
    let obj = match raw.as_object() {
        Some(obj) => obj,
        None => {
            s.repair("$", RepairReason::Invalid, Some(raw), "empty template");
            &empty
        }
    };

    let template = Template {
        id: s.template_id(obj.get("id")),
        name: s.name(obj.get("name")),
        mode: match obj.get("mode").and_then(Value::as_str) {
            Some("default") => TemplateMode::Showcase,
            _ => TemplateMode::Custom,
        },
        background_image: s.background(obj.get("backgroundImage")),
        logo: s.logo(obj.get("logo")),
        text_elements: s.text_elements(obj.get("textElements")),
        name_placeholder: s.name_placeholder(obj.get("namePlaceholder")),
        canvas_width: s.canvas_extent(obj.get("canvasWidth"), "canvasWidth", CANVAS_WIDTH),
        canvas_height: s.canvas_extent(obj.get("canvasHeight"), "canvasHeight", CANVAS_HEIGHT),
        saved_at: s.timestamp(obj.get("savedAt")),
    };

    for r in &s.repairs {
        warn!(
            "Template {}: repaired {} ({:?}) -> {}",
            template.id, r.path, r.reason, r.replacement
        );
    }

    (template, SanitizeReport { repairs: s.repairs })
}

/// JavaScript-style numeric coercion. `None` means NaN.
fn to_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                Some(0.0)
            } else {
                t.parse::<f64>().ok()
            }
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn describe(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Default)]
struct Sanitizer {
    repairs: Vec<Repair>,
}

impl Sanitizer {
    fn repair(&mut self, path: &str, reason: RepairReason, original: Option<&Value>, replacement: impl ToString) {
        self.repairs.push(Repair {
            path: path.to_string(),
            reason,
            original: original.map(describe),
            replacement: replacement.to_string(),
        });
    }

    /// Coerce to a finite, non-zero number or fall back to `default`.
    fn number(&mut self, v: Option<&Value>, path: &str, default: f64) -> f64 {
        let Some(v) = v else {
            self.repair(path, RepairReason::Missing, None, default);
            return default;
        };
        match to_number(v) {
            Some(n) if n.is_finite() && n != 0.0 => {
                if !v.is_number() {
                    self.repair(path, RepairReason::Coerced, Some(v), n);
                }
                n
            }
            // Zero is falsy: it takes the default, which is a no-op for positions.
            Some(n) if n == 0.0 && default == 0.0 && v.is_number() => 0.0,
            _ => {
                let reason = if v.is_null() { RepairReason::Missing } else { RepairReason::Invalid };
                self.repair(path, reason, Some(v), default);
                default
            }
        }
    }

    /// Canvas dimension in `[1, MAX_SURFACE_EXTENT]`, else `default`.
    fn canvas_extent(&mut self, v: Option<&Value>, path: &str, default: f64) -> f64 {
        let n = self.number(v, path, default);
        if (1.0..=MAX_SURFACE_EXTENT as f64).contains(&n) {
            n
        } else {
            self.repair(path, RepairReason::Invalid, v, default);
            default
        }
    }

    fn template_id(&mut self, v: Option<&Value>) -> String {
        match v {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(Value::Number(n)) => match (n.as_u64(), n.as_i64()) {
                (Some(u), _) => u.to_string(),
                (None, Some(i)) => i.to_string(),
                _ => n.to_string(),
            },
            other => {
                let id = Uuid::new_v4().to_string();
                let reason = if other.map_or(true, Value::is_null) {
                    RepairReason::Missing
                } else {
                    RepairReason::Invalid
                };
                self.repair("id", reason, other, &id);
                id
            }
        }
    }

    fn name(&mut self, v: Option<&Value>) -> String {
        match v {
            Some(Value::String(s)) => s.clone(),
            other => {
                self.repair("name", RepairReason::Missing, other, UNNAMED_TEMPLATE);
                UNNAMED_TEMPLATE.to_string()
            }
        }
    }

    fn background(&mut self, v: Option<&Value>) -> Option<String> {
        match v {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                self.repair("backgroundImage", RepairReason::Invalid, Some(other), "none");
                None
            }
        }
    }

    fn timestamp(&mut self, v: Option<&Value>) -> Option<DateTime<Utc>> {
        match v {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => match DateTime::parse_from_rfc3339(s) {
                Ok(ts) => Some(ts.with_timezone(&Utc)),
                Err(_) => {
                    self.repair("savedAt", RepairReason::Invalid, v, "none");
                    None
                }
            },
            Some(other) => {
                self.repair("savedAt", RepairReason::Invalid, Some(other), "none");
                None
            }
        }
    }

    fn logo(&mut self, v: Option<&Value>) -> Option<LogoPlacement> {
        let obj = match v {
            None | Some(Value::Null) => return None,
            Some(Value::Object(obj)) => obj,
            Some(other) => {
                self.repair("logo", RepairReason::Dropped, Some(other), "none");
                return None;
            }
        };
        let url = match obj.get("url") {
            Some(Value::String(url)) if !url.is_empty() => url.clone(),
            other => {
                self.repair("logo.url", RepairReason::Dropped, other, "logo removed");
                return None;
            }
        };
        Some(LogoPlacement {
            url,
            x: self.number(obj.get("x"), "logo.x", 0.0),
            y: self.number(obj.get("y"), "logo.y", 0.0),
            width: self.number(obj.get("width"), "logo.width", LOGO_SIZE_DEFAULT),
            height: self.number(obj.get("height"), "logo.height", LOGO_SIZE_DEFAULT),
        })
    }

    fn text_elements(&mut self, v: Option<&Value>) -> Vec<TextBlock> {
        let items = match v {
            None | Some(Value::Null) => return vec![],
            Some(Value::Array(items)) => items,
            Some(other) => {
                self.repair("textElements", RepairReason::Invalid, Some(other), "[]");
                return vec![];
            }
        };

        let mut blocks = Vec::with_capacity(items.len());
        // Elements whose id must be reassigned once all valid ids are known.
        let mut pending: Vec<(usize, Option<Value>, RepairReason)> = vec![];
        let mut seen = HashSet::new();

        for (i, item) in items.iter().enumerate() {
            let path = format!("textElements[{}]", i);
            let Some(obj) = item.as_object() else {
                self.repair(&path, RepairReason::Dropped, Some(item), "removed");
                continue;
            };
            let mut block = self.block(obj, &path, &TEXT_DEFAULTS);
            block.text = Some(self.text(obj.get("text"), &format!("{}.text", path)));

            match obj.get("id").and_then(to_number) {
                Some(n) if (1.0..=MAX_TEXT_ID as f64).contains(&n) && n.fract() == 0.0 => {
                    let id = n as TextId;
                    if seen.insert(id) {
                        block.id = id;
                    } else {
                        pending.push((blocks.len(), obj.get("id").cloned(), RepairReason::Duplicate));
                    }
                }
                _ => {
                    let reason = if obj.get("id").map_or(true, Value::is_null) {
                        RepairReason::Missing
                    } else {
                        RepairReason::Invalid
                    };
                    pending.push((blocks.len(), obj.get("id").cloned(), reason));
                }
            }
            blocks.push((path, block));
        }

        let mut next = seen.iter().copied().max().unwrap_or(0).saturating_add(1);
        for (index, original, reason) in pending {
            let (path, block) = &mut blocks[index];
            block.id = next;
            let path = format!("{}.id", path);
            self.repair(&path, reason, original.as_ref(), next);
            next = next.saturating_add(1);
        }

        blocks.into_iter().map(|(_, b)| b).collect()
    }

    fn name_placeholder(&mut self, v: Option<&Value>) -> TextBlock {
        let empty = Map::new();
        let obj = match v {
            Some(Value::Object(obj)) => obj,
            other => {
                self.repair("namePlaceholder", RepairReason::Missing, other, "defaults");
                &empty
            }
        };
        let mut block = self.block(obj, "namePlaceholder", &NAME_DEFAULTS);
        block.id = 0;
        block.text = None;
        block
    }

    fn text(&mut self, v: Option<&Value>, path: &str) -> String {
        match v {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => {
                let text = n.to_string();
                self.repair(path, RepairReason::Coerced, v, &text);
                text
            }
            other => {
                self.repair(path, RepairReason::Missing, other, "\"\"");
                String::new()
            }
        }
    }

    fn block(&mut self, obj: &Map<String, Value>, path: &str, d: &BlockDefaults) -> TextBlock {
        let field = |name: &str| format!("{}.{}", path, name);
        TextBlock {
            id: 0,
            text: None,
            x: self.number(obj.get("x"), &field("x"), 0.0),
            y: self.number(obj.get("y"), &field("y"), 0.0),
            width: self.number(obj.get("width"), &field("width"), d.width),
            height: self.number(obj.get("height"), &field("height"), d.height),
            font_size: self.number(obj.get("fontSize"), &field("fontSize"), d.font_size),
            font_family: self.font_family(obj.get("fontFamily"), &field("fontFamily"), d.font_family),
            font_weight: self.parsed(obj.get("fontWeight"), &field("fontWeight"), d.font_weight),
            color: self.parsed(obj.get("color"), &field("color"), Rgb::BLACK),
            align: self.parsed(obj.get("align"), &field("align"), d.align),
        }
    }

    fn font_family(&mut self, v: Option<&Value>, path: &str, default: &str) -> String {
        match v {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            other => {
                self.repair(path, RepairReason::Missing, other, default);
                default.to_string()
            }
        }
    }

    /// Parse a string-valued field (weight, color, align) via `FromStr`.
    fn parsed<T>(&mut self, v: Option<&Value>, path: &str, default: T) -> T
    where
        T: std::str::FromStr + Copy + std::fmt::Debug,
    {
        let text = match v {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        match text.map(|t| t.parse::<T>()) {
            Some(Ok(value)) => value,
            Some(Err(_)) => {
                self.repair(path, RepairReason::Invalid, v, format!("{:?}", default));
                default
            }
            None => {
                self.repair(path, RepairReason::Missing, v, format!("{:?}", default));
                default
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_template() -> Value {
        json!({
            "id": 1712345678901u64,
            "name": "Template 3",
            "mode": "custom",
            "backgroundImage": null,
            "logo": null,
            "textElements": [{
                "id": 1, "text": "Hello", "x": 10, "y": 20, "width": 200, "height": 40,
                "fontSize": 24, "fontFamily": "serif", "fontWeight": "normal",
                "color": "#000000", "align": "left"
            }],
            "namePlaceholder": {
                "x": 350, "y": 320, "width": 300, "height": 60, "fontSize": 36,
                "fontFamily": "serif", "fontWeight": "bold", "color": "#000000", "align": "center"
            },
            "canvasWidth": 1000,
            "canvasHeight": 707.0707070707071,
            "savedAt": "2024-05-01T12:00:00.000Z"
        })
    }

    #[test]
    fn test_clean_template_has_no_repairs() {
        let (t, report) = sanitize_with_report(&raw_template());
        assert!(report.is_clean(), "{:?}", report.repairs);
        assert_eq!(t.id, "1712345678901");
        assert_eq!(t.text_elements[0].text.as_deref(), Some("Hello"));
        assert!(t.saved_at.is_some());
    }

    #[test]
    fn test_missing_font_size_defaults_per_kind() {
        let mut raw = raw_template();
        raw["textElements"][0].as_object_mut().unwrap().remove("fontSize");
        raw["namePlaceholder"].as_object_mut().unwrap().remove("fontSize");
        let (t, report) = sanitize_with_report(&raw);
        assert_eq!(t.text_elements[0].font_size, 24.0);
        assert_eq!(t.name_placeholder.font_size, 36.0);
        assert!(report.touches("textElements[0].fontSize"));
        assert!(report.touches("namePlaceholder.fontSize"));
    }

    #[test]
    fn test_numeric_strings_coerce() {
        let mut raw = raw_template();
        raw["textElements"][0]["x"] = json!("42.5");
        let (t, report) = sanitize_with_report(&raw);
        assert_eq!(t.text_elements[0].x, 42.5);
        assert_eq!(report.repairs[0].reason, RepairReason::Coerced);
    }

    #[test]
    fn test_garbage_numbers_take_defaults() {
        let mut raw = raw_template();
        raw["textElements"][0]["width"] = json!("wide");
        raw["textElements"][0]["height"] = json!(0);
        raw["namePlaceholder"]["width"] = json!({"nested": true});
        raw["namePlaceholder"]["y"] = json!(null);
        let t = sanitize(&raw);
        assert_eq!(t.text_elements[0].width, 200.0);
        assert_eq!(t.text_elements[0].height, 40.0);
        assert_eq!(t.name_placeholder.width, 300.0);
        assert_eq!(t.name_placeholder.y, 0.0);
    }

    #[test]
    fn test_missing_name_placeholder_is_recreated() {
        let mut raw = raw_template();
        raw.as_object_mut().unwrap().remove("namePlaceholder");
        let t = sanitize(&raw);
        assert_eq!(t.name_placeholder.font_size, 36.0);
        assert_eq!(t.name_placeholder.width, 300.0);
        assert_eq!(t.name_placeholder.height, 60.0);
        assert_eq!(t.name_placeholder.align, Align::Center);
    }

    #[test]
    fn test_logo_defaults_and_drop() {
        let mut raw = raw_template();
        raw["logo"] = json!({"url": "data:image/png;base64,AAAA", "x": "nope"});
        let t = sanitize(&raw);
        let logo = t.logo.unwrap();
        assert_eq!((logo.x, logo.y, logo.width, logo.height), (0.0, 0.0, 100.0, 100.0));

        raw["logo"] = json!({"x": 5});
        let (t, report) = sanitize_with_report(&raw);
        assert!(t.logo.is_none());
        assert!(report.touches("logo.url"));
    }

    #[test]
    fn test_duplicate_and_missing_text_ids_reassigned() {
        let mut raw = raw_template();
        let first = raw["textElements"][0].clone();
        let mut dup = first.clone();
        dup["text"] = json!("dup");
        let mut anonymous = first.clone();
        anonymous.as_object_mut().unwrap().remove("id");
        raw["textElements"] = json!([first, dup, anonymous, "junk"]);

        let (t, report) = sanitize_with_report(&raw);
        let ids: Vec<_> = t.text_elements.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(report.touches("textElements[3]"));
    }

    #[test]
    fn test_bad_styles_fall_back() {
        let mut raw = raw_template();
        raw["textElements"][0]["color"] = json!("tomato");
        raw["textElements"][0]["align"] = json!("justify");
        raw["textElements"][0]["fontWeight"] = json!(700);
        let t = sanitize(&raw);
        assert_eq!(t.text_elements[0].color, Rgb::BLACK);
        assert_eq!(t.text_elements[0].align, Align::Left);
        assert_eq!(t.text_elements[0].font_weight, FontWeight::Bold);
    }

    #[test]
    fn test_non_ascii_color_falls_back() {
        let mut raw = raw_template();
        raw["textElements"][0]["color"] = json!("#a\u{20ac}bc");
        raw["namePlaceholder"]["color"] = json!("#\u{e9}e");
        let (t, report) = sanitize_with_report(&raw);
        assert_eq!(t.text_elements[0].color, Rgb::BLACK);
        assert_eq!(t.name_placeholder.color, Rgb::BLACK);
        assert!(report.touches("textElements[0].color"));
    }

    #[test]
    fn test_out_of_range_text_ids_reassigned() {
        let mut raw = raw_template();
        let first = raw["textElements"][0].clone();
        let mut huge = first.clone();
        huge["id"] = json!(1e30);
        let mut negative = first.clone();
        negative["id"] = json!(-4);
        raw["textElements"] = json!([huge, first, negative]);

        let (t, report) = sanitize_with_report(&raw);
        let ids: Vec<_> = t.text_elements.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert!(report.touches("textElements[0].id"));
    }

    #[test]
    fn test_canvas_size_is_bounded() {
        let mut raw = raw_template();
        raw["canvasWidth"] = json!(1e12);
        raw["canvasHeight"] = json!(-300);
        let (t, report) = sanitize_with_report(&raw);
        assert_eq!(t.canvas_width, CANVAS_WIDTH);
        assert_eq!(t.canvas_height, CANVAS_HEIGHT);
        assert!(report.touches("canvasWidth"));
        assert!(report.touches("canvasHeight"));
    }

    #[test]
    fn test_negative_sizes_are_kept() {
        let mut raw = raw_template();
        raw["textElements"][0]["width"] = json!(-50);
        raw["namePlaceholder"]["fontSize"] = json!(-12);
        let t = sanitize(&raw);
        assert_eq!(t.text_elements[0].width, -50.0);
        assert_eq!(t.name_placeholder.font_size, -12.0);
    }

    #[test]
    fn test_non_object_never_panics() {
        let (t, report) = sanitize_with_report(&json!("not a template"));
        assert!(!report.is_clean());
        assert!(!t.id.is_empty());
        assert_eq!(t.name, UNNAMED_TEMPLATE);
        assert!(t.text_elements.is_empty());
        assert_eq!(t.canvas_width, CANVAS_WIDTH);
    }
}
