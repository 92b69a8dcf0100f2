//! Certificate Generation - Single Export Entry Point
//!
//! CRITICAL: generate validates the student name before any surface is
//! allocated, and renders in strict mode. A certificate with a missing
//! background or logo is never returned.

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::fonts::FontBook;
use crate::hashing::{compute_job_hash, sha256_hex};
use crate::images::ImageSource;
use crate::render::{render, Layer, LayerPolicy, RenderContext, RenderError, Surface};
use crate::templates::{Template, TemplateId};
use crate::ENGINE_VERSION;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Generation failed: {layer} image could not be loaded: {reason}")]
    GenerationFailed { layer: Layer, reason: String },

    #[error("PNG encoding failed: {0}")]
    Encode(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GenerationError {
    /// The image layer that aborted generation, if any.
    pub fn layer(&self) -> Option<Layer> {
        match self {
            GenerationError::GenerationFailed { layer, .. } => Some(*layer),
            _ => None,
        }
    }
}

impl From<RenderError> for GenerationError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Decode { layer, source } => GenerationError::GenerationFailed {
                layer,
                reason: source.to_string(),
            },
        }
    }
}

/// A finished certificate and its fingerprints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedCertificate {
    pub id: String,
    pub template_id: TemplateId,
    pub student_name: String,
    pub engine_version: String,
    pub width: u32,
    pub height: u32,
    pub generated_at: DateTime<Utc>,
    /// SHA-256 of the PNG bytes; also the content address on publish.
    pub sha256: String,
    pub job_hash: String,
    #[serde(skip)]
    pub png: Vec<u8>,
}

/// Reject a missing or blank student name.
pub fn validate_student_name(name: &str) -> Result<(), GenerationError> {
    if name.trim().is_empty() {
        return Err(GenerationError::Validation("student name is required".into()));
    }
    Ok(())
}

pub struct CertificateGenerator<'a> {
    ctx: RenderContext<'a>,
}

impl<'a> CertificateGenerator<'a> {
    pub fn new(fonts: &'a FontBook, images: &'a dyn ImageSource) -> Self {
        Self {
            ctx: RenderContext::new(fonts, images),
        }
    }

    /// Render `template` with `student_name` and return PNG bytes.
    pub fn render_png(&self, template: &Template, student_name: &str) -> Result<Vec<u8>, GenerationError> {
        validate_student_name(student_name)?;

        let mut surface = Surface::for_template(template);
        render(&mut surface, template, student_name, &self.ctx, LayerPolicy::Strict)?;
        surface.to_png().map_err(|e| GenerationError::Encode(e.to_string()))
    }

    /// Render and fingerprint a certificate.
    pub fn generate(&self, template: &Template, student_name: &str) -> Result<GeneratedCertificate, GenerationError> {
        let png = self.render_png(template, student_name)?;
        let (width, height) = template.surface_size();
        let job_hash = compute_job_hash(template, student_name, ENGINE_VERSION)?;

        let certificate = GeneratedCertificate {
            id: Uuid::new_v4().to_string(),
            template_id: template.id.clone(),
            student_name: student_name.to_string(),
            engine_version: ENGINE_VERSION.to_string(),
            width,
            height,
            generated_at: Utc::now(),
            sha256: sha256_hex(&png),
            job_hash,
            png,
        };
        info!(
            "Generated certificate {} from template {} ({} bytes)",
            certificate.id,
            certificate.template_id,
            certificate.png.len()
        );
        Ok(certificate)
    }
}
