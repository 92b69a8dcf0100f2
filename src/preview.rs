//! Read-only template preview for the certificate picker.
//!
//! Shows the selected template with the student name typed so far. Uses the
//! same pipeline as the editor and export, tolerant of broken image layers.

use crate::redraw::LiveSurface;
use crate::render::{render, LayerPolicy, RenderContext, RenderError, RenderReport, Surface, STUDENT_NAME_PLACEHOLDER};
use crate::templates::Template;

#[derive(Debug, Default)]
pub struct TemplatePreview {
    template: Option<Template>,
    student_name: String,
    /// Fixed output size for thumbnails; full canvas size when `None`.
    size: Option<(u32, u32)>,
    live: LiveSurface,
}

impl TemplatePreview {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preview at a fixed pixel size. Content scales uniformly with width.
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            size: Some((width, height)),
            ..Self::default()
        }
    }

    pub fn select_template(&mut self, template: Option<Template>) {
        self.template = template;
    }

    pub fn set_student_name(&mut self, name: impl Into<String>) {
        self.student_name = name.into();
    }

    pub fn template(&self) -> Option<&Template> {
        self.template.as_ref()
    }

    /// Text drawn into the name placeholder.
    pub fn substitution(&self) -> &str {
        if self.student_name.is_empty() {
            STUDENT_NAME_PLACEHOLDER
        } else {
            &self.student_name
        }
    }

    /// Render the current state. `None` when no template is selected.
    pub fn redraw(&mut self, ctx: &RenderContext<'_>) -> Result<Option<RenderReport>, RenderError> {
        let ticket = self.live.request();
        let Some(template) = &self.template else {
            return Ok(None);
        };
        let mut surface = match self.size {
            Some((w, h)) => Surface::new(w, h),
            None => Surface::for_template(template),
        };
        let report = render(&mut surface, template, self.substitution(), ctx, LayerPolicy::Tolerant)?;
        self.live.present(ticket, surface);
        Ok(Some(report))
    }

    pub fn surface(&self) -> Option<&Surface> {
        self.live.surface()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::FontBook;
    use crate::images::ImageLoader;

    #[test]
    fn test_placeholder_until_name_typed() {
        let mut preview = TemplatePreview::new();
        assert_eq!(preview.substitution(), "<Student Name>");
        preview.set_student_name("Ada");
        assert_eq!(preview.substitution(), "Ada");
    }

    #[test]
    fn test_no_template_draws_nothing() {
        let fonts = FontBook::new();
        let loader = ImageLoader::new();
        let ctx = RenderContext::new(&fonts, &loader);
        let mut preview = TemplatePreview::new();
        assert!(preview.redraw(&ctx).unwrap().is_none());
        assert!(preview.surface().is_none());
    }

    #[test]
    fn test_broken_background_is_tolerated() {
        let fonts = FontBook::new();
        let loader = ImageLoader::new();
        let ctx = RenderContext::new(&fonts, &loader);

        let mut template = Template::empty("t", "T");
        template.background_image = Some("data:image/png;base64,AAAA".into());
        let mut preview = TemplatePreview::with_size(250, 177);
        preview.select_template(Some(template));
        let report = preview.redraw(&ctx).unwrap().unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(preview.surface().map(|s| (s.width(), s.height())), Some((250, 177)));
    }

    #[test]
    fn test_name_change_changes_pixels() {
        let fonts = FontBook::new();
        let loader = ImageLoader::new();
        let ctx = RenderContext::new(&fonts, &loader);
        let mut preview = TemplatePreview::new();
        preview.select_template(Some(Template::empty("t", "T")));

        preview.redraw(&ctx).unwrap();
        let placeholder = preview.surface().cloned().unwrap();
        preview.set_student_name("Ada Lovelace");
        preview.redraw(&ctx).unwrap();
        assert_ne!(preview.surface().cloned().unwrap(), placeholder);
    }
}
