//! Interactive Editing Engine
//!
//! Owns one template being edited plus the selection/drag state machine.
//! Pointer handlers take screen coordinates and the displayed canvas rect;
//! everything after `to_canvas_space` works in canvas units.
//!
//! ```text
//! Idle --hit--> Dragging --up/leave--> Selected --miss--> Idle
//!                  ^                      |
//!                  +--------hit-----------+
//! ```

use log::debug;
use serde::{Deserialize, Serialize};

use crate::geometry::{clamp_to_canvas, to_canvas_space_sized, DisplayRect, Point, Rect};
use crate::redraw::LiveSurface;
use crate::render::{
    draw_selection_overlay, render, surface_scale, LayerPolicy, RenderContext, RenderError, RenderReport, Surface,
    STUDENT_NAME_PLACEHOLDER,
};
use crate::templates::{Align, FontWeight, LogoPlacement, Rgb, Template, TemplateMode, TextBlock, TextId};

/// A selectable element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Target {
    Text(TextId),
    Logo,
    Name,
}

/// Selection and gesture state. A drag always has a target.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Interaction {
    #[default]
    Idle,
    Selected(Target),
    Dragging {
        target: Target,
        /// Pointer minus element origin, captured at drag start.
        offset: Point,
    },
}

impl Interaction {
    pub fn selection(&self) -> Option<Target> {
        match *self {
            Interaction::Idle => None,
            Interaction::Selected(target) | Interaction::Dragging { target, .. } => Some(target),
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self, Interaction::Dragging { .. })
    }
}

/// A single-field edit on the selected element.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyChange {
    Text(String),
    FontFamily(String),
    FontSize(f64),
    FontWeight(FontWeight),
    Color(Rgb),
    Align(Align),
    Width(f64),
    Height(f64),
}

/// Notifications for the host after an input.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    SelectionChanged(Option<Target>),
    Moved { target: Target, x: f64, y: f64 },
    TextAdded(TextId),
    Deleted(Target),
    PropertyChanged(Target),
    RenderNeeded,
}

/// Topmost element under `p`: name placeholder, then logo, then text
/// elements from the last drawn to the first.
pub fn hit_test(template: &Template, p: Point) -> Option<Target> {
    if template.name_placeholder.rect().contains(p) {
        return Some(Target::Name);
    }
    if let Some(logo) = &template.logo {
        if logo.rect().contains(p) {
            return Some(Target::Logo);
        }
    }
    template
        .text_elements
        .iter()
        .rev()
        .find(|t| t.rect().contains(p))
        .map(|t| Target::Text(t.id))
}

/// Bounding box of `target` in `template`, if the element exists.
pub fn target_rect(template: &Template, target: Target) -> Option<Rect> {
    match target {
        Target::Text(id) => template.text_element(id).map(TextBlock::rect),
        Target::Logo => template.logo.as_ref().map(LogoPlacement::rect),
        Target::Name => Some(template.name_placeholder.rect()),
    }
}

pub struct EditorSession {
    template: Template,
    interaction: Interaction,
    live: LiveSurface,
}

impl EditorSession {
    /// Start editing a new template.
    pub fn new(mode: TemplateMode, name: impl Into<String>) -> Self {
        Self::from_template(Template::create(mode, name))
    }

    /// Edit an existing (already sanitized) template.
    pub fn from_template(template: Template) -> Self {
        Self {
            template,
            interaction: Interaction::Idle,
            live: LiveSurface::new(),
        }
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn into_template(self) -> Template {
        self.template
    }

    pub fn interaction(&self) -> Interaction {
        self.interaction
    }

    pub fn selection(&self) -> Option<Target> {
        self.interaction.selection()
    }

    pub fn live_surface(&self) -> &LiveSurface {
        &self.live
    }

    // --- Pointer input ---

    pub fn pointer_down(&mut self, pointer_x: f64, pointer_y: f64, display: &DisplayRect) -> Vec<EditorEvent> {
        let p = self.canvas_point(pointer_x, pointer_y, display);
        let previous = self.selection();

        self.interaction = match hit_test(&self.template, p).and_then(|t| Some((t, target_rect(&self.template, t)?))) {
            Some((target, rect)) => Interaction::Dragging {
                target,
                offset: Point::new(p.x - rect.x, p.y - rect.y),
            },
            None => Interaction::Idle,
        };

        let mut events = Vec::new();
        if self.selection() != previous {
            events.push(EditorEvent::SelectionChanged(self.selection()));
        }
        events.push(EditorEvent::RenderNeeded);
        events
    }

    pub fn pointer_move(&mut self, pointer_x: f64, pointer_y: f64, display: &DisplayRect) -> Vec<EditorEvent> {
        let Interaction::Dragging { target, offset } = self.interaction else {
            return Vec::new();
        };
        let Some(rect) = target_rect(&self.template, target) else {
            return Vec::new();
        };

        let p = self.canvas_point(pointer_x, pointer_y, display);
        let wanted = Point::new(p.x - offset.x, p.y - offset.y);
        let origin = clamp_to_canvas(
            wanted,
            rect.width,
            rect.height,
            self.template.canvas_width,
            self.template.canvas_height,
        );
        self.set_origin(target, origin);

        vec![
            EditorEvent::Moved {
                target,
                x: origin.x,
                y: origin.y,
            },
            EditorEvent::RenderNeeded,
        ]
    }

    fn canvas_point(&self, pointer_x: f64, pointer_y: f64, display: &DisplayRect) -> Point {
        to_canvas_space_sized(
            pointer_x,
            pointer_y,
            display,
            self.template.canvas_width,
            self.template.canvas_height,
        )
    }

    pub fn pointer_up(&mut self) -> Vec<EditorEvent> {
        self.end_drag()
    }

    pub fn pointer_leave(&mut self) -> Vec<EditorEvent> {
        self.end_drag()
    }

    fn end_drag(&mut self) -> Vec<EditorEvent> {
        if let Interaction::Dragging { target, .. } = self.interaction {
            self.interaction = Interaction::Selected(target);
        }
        Vec::new()
    }

    fn set_origin(&mut self, target: Target, origin: Point) {
        let (x, y) = match target {
            Target::Text(id) => match self.template.text_element_mut(id) {
                Some(block) => (&mut block.x, &mut block.y),
                None => return,
            },
            Target::Logo => match self.template.logo.as_mut() {
                Some(logo) => (&mut logo.x, &mut logo.y),
                None => return,
            },
            Target::Name => (&mut self.template.name_placeholder.x, &mut self.template.name_placeholder.y),
        };
        *x = origin.x;
        *y = origin.y;
    }

    // --- Element operations ---

    /// Append a default text block and select it.
    pub fn add_text_element(&mut self) -> TextId {
        let id = self.template.next_text_id();
        self.template.text_elements.push(TextBlock::new_text(id));
        self.interaction = Interaction::Selected(Target::Text(id));
        debug!("Added text element {} to template {}", id, self.template.id);
        id
    }

    /// Remove the selected text element or logo. The name placeholder stays.
    pub fn delete_selected(&mut self) -> Vec<EditorEvent> {
        let Some(target) = self.selection() else {
            return Vec::new();
        };
        match target {
            Target::Name => return Vec::new(),
            Target::Text(id) => self.template.text_elements.retain(|t| t.id != id),
            Target::Logo => self.template.logo = None,
        }
        self.interaction = Interaction::Idle;
        vec![
            EditorEvent::Deleted(target),
            EditorEvent::SelectionChanged(None),
            EditorEvent::RenderNeeded,
        ]
    }

    /// Apply one property edit to the selection.
    ///
    /// No validation happens here; the next load sanitizes.
    pub fn apply(&mut self, change: PropertyChange) -> Vec<EditorEvent> {
        let Some(target) = self.selection() else {
            return Vec::new();
        };
        let dragging = self.interaction.is_dragging();

        let applied = match target {
            Target::Logo => match (self.template.logo.as_mut(), change) {
                (Some(logo), PropertyChange::Width(w)) if !dragging => {
                    logo.width = w;
                    true
                }
                (Some(logo), PropertyChange::Height(h)) if !dragging => {
                    logo.height = h;
                    true
                }
                _ => false,
            },
            Target::Name => apply_to_block(&mut self.template.name_placeholder, change, false, dragging),
            Target::Text(id) => match self.template.text_element_mut(id) {
                Some(block) => apply_to_block(block, change, true, dragging),
                None => false,
            },
        };

        if applied {
            vec![EditorEvent::PropertyChanged(target), EditorEvent::RenderNeeded]
        } else {
            Vec::new()
        }
    }

    /// Replace the background; `None` means plain white.
    pub fn set_background(&mut self, reference: Option<String>) -> Vec<EditorEvent> {
        self.template.background_image = reference;
        vec![EditorEvent::RenderNeeded]
    }

    /// Place a freshly uploaded logo at its default box and select it.
    pub fn set_logo(&mut self, url: impl Into<String>) -> Vec<EditorEvent> {
        self.template.logo = Some(LogoPlacement::uploaded(url));
        self.interaction = Interaction::Selected(Target::Logo);
        vec![EditorEvent::SelectionChanged(Some(Target::Logo)), EditorEvent::RenderNeeded]
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.template.name = name.into();
    }

    // --- Drawing ---

    /// Redraw the editor canvas: the shared pipeline with the placeholder
    /// name, then the selection overlay on top.
    pub fn render_frame(&mut self, ctx: &RenderContext<'_>) -> Result<RenderReport, RenderError> {
        let ticket = self.live.request();
        let mut surface = Surface::for_template(&self.template);
        let report = render(&mut surface, &self.template, STUDENT_NAME_PLACEHOLDER, ctx, LayerPolicy::Tolerant)?;

        if let Some(rect) = self.selection().and_then(|t| target_rect(&self.template, t)) {
            let scale = surface_scale(&surface, &self.template);
            draw_selection_overlay(&mut surface, rect, scale);
        }
        self.live.present(ticket, surface);
        Ok(report)
    }
}

fn apply_to_block(block: &mut TextBlock, change: PropertyChange, text_allowed: bool, dragging: bool) -> bool {
    match change {
        PropertyChange::Text(text) if text_allowed => block.text = Some(text),
        PropertyChange::Text(_) => return false,
        PropertyChange::FontFamily(family) => block.font_family = family,
        PropertyChange::FontSize(size) => block.font_size = size,
        PropertyChange::FontWeight(weight) => block.font_weight = weight,
        PropertyChange::Color(color) => block.color = color,
        PropertyChange::Align(align) => block.align = align,
        PropertyChange::Width(_) | PropertyChange::Height(_) if dragging => return false,
        PropertyChange::Width(w) => block.width = w,
        PropertyChange::Height(h) => block.height = h,
    }
    true
}
