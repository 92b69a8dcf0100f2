//! CertForge Core - Certificate Template Engine
//!
//! # Ground Rules
//! 1. One Canvas Space (every coordinate is logical, never screen pixels)
//! 2. One Pipeline (editor, preview and export render through `render`)
//! 3. Tolerant Preview, Strict Export
//! 4. Sanitize At The Boundary (nothing unsanitized leaves the store)
//! 5. The Name Placeholder Is Permanent

pub mod geometry;
pub mod templates;
pub mod sanitize;
pub mod store;
pub mod images;
pub mod fonts;
pub mod render;
pub mod redraw;
pub mod editor;
pub mod preview;
pub mod hashing;
pub mod generation;
pub mod publish;

pub use geometry::{
    to_canvas_space, to_canvas_space_sized, clamp_to_canvas, DisplayRect, Point, Rect, CANVAS_HEIGHT, CANVAS_WIDTH,
    MAX_SURFACE_EXTENT,
};
pub use templates::{Align, FontWeight, LogoPlacement, Rgb, Template, TemplateId, TemplateMode, TextBlock, TextId};
pub use sanitize::{sanitize, sanitize_with_report, Repair, RepairReason, SanitizeReport};
pub use store::{JsonDirStore, KeyValueStore, MemoryStore, StoreError, TemplateStore, TEMPLATES_KEY};
pub use images::{CachedImageSource, DecodeError, ImageLoader, ImageSource};
pub use fonts::{FontBook, FontError};
pub use render::{render, Layer, LayerPolicy, RenderContext, RenderError, RenderReport, Surface, STUDENT_NAME_PLACEHOLDER};
pub use redraw::{FrameTicket, LiveSurface};
pub use editor::{hit_test, EditorEvent, EditorSession, Interaction, PropertyChange, Target};
pub use preview::TemplatePreview;
pub use hashing::{canonical_json, compute_job_hash, sha256_hex};
pub use generation::{CertificateGenerator, GeneratedCertificate, GenerationError};
pub use publish::{CertificateSink, LocalContentStore, PublishError};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
