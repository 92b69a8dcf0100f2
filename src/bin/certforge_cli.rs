//! CertForge CLI - Bridge interface for the certificate pages
//!
//! Commands: templates, show, create, save, sanitize, preview, generate, delete
//! Outputs JSON to stdout
//! Returns 2 on validation/generation failure, 1 on any other failure

use clap::{Parser, Subcommand};
use serde_json::json;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use certforge_core::{
    sanitize_with_report, CachedImageSource, CertificateGenerator, CertificateSink, EditorSession, FontBook, FontWeight,
    GenerationError, ImageLoader, JsonDirStore, LocalContentStore, RenderContext, TemplateMode, TemplatePreview,
    TemplateStore,
};

#[derive(Parser)]
#[command(name = "certforge-cli")]
#[command(about = "CertForge CLI - Certificate Template Engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the template collection
    #[arg(short, long, env = "CERTFORGE_STORE_DIR", default_value = "templates")]
    store_dir: PathBuf,

    /// Root for site-relative image references
    #[arg(short, long, env = "CERTFORGE_ASSET_DIR", default_value = ".")]
    asset_dir: PathBuf,

    /// TrueType face for a family, e.g. `serif:bold=/fonts/Serif-Bold.ttf`
    #[arg(long = "font", value_name = "FAMILY[:bold]=PATH")]
    fonts: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored templates
    Templates,

    /// Print one template
    Show {
        #[arg(short, long)]
        id: String,
    },

    /// Create and store a new template
    Create {
        /// Start from the example certificate layout
        #[arg(long)]
        showcase: bool,

        /// Template name (defaults to "Template N")
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Sanitize a JSON template payload and store it
    Save {
        #[arg(short, long)]
        payload: String,
    },

    /// Sanitize a JSON template payload and report repairs without storing
    Sanitize {
        #[arg(short, long)]
        payload: String,
    },

    /// Render a preview PNG (broken images are skipped)
    Preview {
        #[arg(short, long)]
        id: String,

        /// Student name; "<Student Name>" when omitted
        #[arg(short, long, default_value = "")]
        name: String,

        /// Output width in pixels (height follows the canvas ratio)
        #[arg(short, long)]
        width: Option<u32>,

        #[arg(short, long)]
        out: PathBuf,
    },

    /// Generate a certificate PNG (broken images are fatal)
    Generate {
        #[arg(short, long)]
        id: String,

        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        out: PathBuf,

        /// Also publish into a content-addressed directory
        #[arg(long)]
        publish_dir: Option<PathBuf>,
    },

    /// Remove a template
    Delete {
        #[arg(short, long)]
        id: String,
    },
}

fn fail(code: u8, error: impl Display) -> ExitCode {
    println!("{}", json!({ "success": false, "error": error.to_string() }));
    ExitCode::from(code)
}

fn emit(value: serde_json::Value) -> ExitCode {
    println!("{:#}", value);
    ExitCode::SUCCESS
}

/// Parse `FAMILY[:bold]=PATH`.
fn parse_font_arg(arg: &str) -> Result<(String, FontWeight, PathBuf), String> {
    let (face, path) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected FAMILY[:bold]=PATH, got '{}'", arg))?;
    let (family, weight) = match face.rsplit_once(':') {
        Some((family, weight)) => (family, weight.parse::<FontWeight>()?),
        None => (face, FontWeight::Normal),
    };
    if family.trim().is_empty() || path.is_empty() {
        return Err(format!("expected FAMILY[:bold]=PATH, got '{}'", arg));
    }
    Ok((family.to_string(), weight, PathBuf::from(path)))
}

fn load_fonts(args: &[String]) -> Result<FontBook, String> {
    let mut book = FontBook::new();
    for arg in args {
        let (family, weight, path) = parse_font_arg(arg)?;
        book.register_file(&family, weight, &path).map_err(|e| e.to_string())?;
    }
    Ok(book)
}

fn write_png(path: &Path, png: &[u8]) -> Result<(), String> {
    std::fs::write(path, png).map_err(|e| format!("Failed to write {}: {}", path.display(), e))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let fonts = match load_fonts(&cli.fonts) {
        Ok(f) => f,
        Err(e) => return fail(1, format!("Failed to load fonts: {}", e)),
    };
    let images = CachedImageSource::new(ImageLoader::with_asset_dir(&cli.asset_dir));
    let mut store = TemplateStore::new(JsonDirStore::new(&cli.store_dir));

    match cli.command {
        Commands::Templates => {
            let templates = match store.load_all() {
                Ok(t) => t,
                Err(e) => return fail(1, format!("Failed to load templates: {}", e)),
            };
            let listing: Vec<_> = templates
                .iter()
                .map(|t| {
                    json!({
                        "id": t.id,
                        "name": t.name,
                        "mode": t.mode,
                        "textElements": t.text_elements.len(),
                        "hasLogo": t.logo.is_some(),
                        "savedAt": t.saved_at,
                    })
                })
                .collect();
            emit(json!(listing))
        }

        Commands::Show { id } => match store.get(&id) {
            Ok(Some(t)) => emit(json!(t)),
            Ok(None) => fail(1, format!("Template not found: {}", id)),
            Err(e) => fail(1, e),
        },

        Commands::Create { showcase, name } => {
            let mode = if showcase { TemplateMode::Showcase } else { TemplateMode::Custom };
            let name = name.unwrap_or_else(|| store.next_default_name());
            let session = EditorSession::new(mode, name);
            match store.save(session.into_template()) {
                Ok(saved) => emit(json!({ "success": true, "template": saved })),
                Err(e) => fail(1, e),
            }
        }

        Commands::Save { payload } => {
            let raw: serde_json::Value = match serde_json::from_str(&payload) {
                Ok(v) => v,
                Err(e) => return fail(1, format!("Invalid payload: {}", e)),
            };
            let (template, report) = sanitize_with_report(&raw);
            match store.save(template) {
                Ok(saved) => emit(json!({ "success": true, "template": saved, "repairs": report.repairs })),
                Err(e) => fail(1, e),
            }
        }

        Commands::Sanitize { payload } => {
            let raw: serde_json::Value = match serde_json::from_str(&payload) {
                Ok(v) => v,
                Err(e) => return fail(1, format!("Invalid payload: {}", e)),
            };
            let (template, report) = sanitize_with_report(&raw);
            emit(json!({ "clean": report.is_clean(), "template": template, "repairs": report.repairs }))
        }

        Commands::Preview { id, name, width, out } => {
            let template = match store.get(&id) {
                Ok(Some(t)) => t,
                Ok(None) => return fail(1, format!("Template not found: {}", id)),
                Err(e) => return fail(1, e),
            };
            let mut preview = match width {
                Some(w) => {
                    let h = (w as f64 * template.canvas_height / template.canvas_width).round().max(1.0);
                    TemplatePreview::with_size(w, h as u32)
                }
                None => TemplatePreview::new(),
            };
            preview.select_template(Some(template));
            preview.set_student_name(name);

            let ctx = RenderContext::new(&fonts, &images);
            let report = match preview.redraw(&ctx) {
                Ok(Some(r)) => r,
                Ok(None) => return fail(1, "Nothing to preview"),
                Err(e) => return fail(1, e),
            };
            let png = match preview.surface().map(|s| s.to_png()) {
                Some(Ok(png)) => png,
                Some(Err(e)) => return fail(1, e),
                None => return fail(1, "Nothing to preview"),
            };
            if let Err(e) = write_png(&out, &png) {
                return fail(1, e);
            }
            emit(json!({ "success": true, "out": out, "skipped": report.skipped }))
        }

        Commands::Generate { id, name, out, publish_dir } => {
            let template = match store.get(&id) {
                Ok(Some(t)) => t,
                Ok(None) => return fail(1, format!("Template not found: {}", id)),
                Err(e) => return fail(1, e),
            };
            let generator = CertificateGenerator::new(&fonts, &images);
            let certificate = match generator.generate(&template, &name) {
                Ok(c) => c,
                Err(e @ (GenerationError::Validation(_) | GenerationError::GenerationFailed { .. })) => {
                    let output = json!({
                        "success": false,
                        "error": e.to_string(),
                        "layer": e.layer(),
                    });
                    println!("{}", output);
                    return ExitCode::from(2);
                }
                Err(e) => return fail(1, e),
            };
            if let Err(e) = write_png(&out, &certificate.png) {
                return fail(1, e);
            }

            let address = match publish_dir {
                Some(dir) => match LocalContentStore::new(dir).publish(&certificate.png) {
                    Ok(address) => Some(address),
                    Err(e) => return fail(1, e),
                },
                None => None,
            };
            emit(json!({
                "success": true,
                "out": out,
                "certificate": certificate,
                "address": address,
            }))
        }

        Commands::Delete { id } => match store.remove(&id) {
            Ok(true) => emit(json!({ "success": true, "id": id })),
            Ok(false) => fail(1, format!("Template not found: {}", id)),
            Err(e) => fail(1, e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_font_arg() {
        let (family, weight, path) = parse_font_arg("serif:bold=/f/Serif-Bold.ttf").unwrap();
        assert_eq!(family, "serif");
        assert_eq!(weight, FontWeight::Bold);
        assert_eq!(path, PathBuf::from("/f/Serif-Bold.ttf"));

        let (family, weight, _) = parse_font_arg("Times New Roman=/f/times.ttf").unwrap();
        assert_eq!(family, "Times New Roman");
        assert_eq!(weight, FontWeight::Normal);

        assert!(parse_font_arg("serif").is_err());
        assert!(parse_font_arg("serif:heavy=/x.ttf").is_err());
    }
}
