//! Image Decoding - Background and Logo Sources
//!
//! `ImageSource` resolves a template's image reference (embedded data URL or
//! asset path) into a decoded raster so the renderer stays free of any I/O
//! knowledge.

use base64::Engine;
use image::DynamicImage;
use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed data URL: {0}")]
    InvalidDataUrl(String),

    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Unsupported image reference: {0}")]
    Unsupported(String),
}

/// Resolves an image reference into decoded pixels.
pub trait ImageSource {
    fn load(&self, reference: &str) -> Result<DynamicImage, DecodeError>;
}

/// Decodes `data:` URLs and local asset paths.
///
/// Site-relative references (`/certificate_bg/image1.png`) resolve against
/// the asset directory.
#[derive(Debug, Clone, Default)]
pub struct ImageLoader {
    asset_dir: Option<PathBuf>,
}

impl ImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset_dir(dir: impl Into<PathBuf>) -> Self {
        Self { asset_dir: Some(dir.into()) }
    }

    fn resolve_path(&self, reference: &str) -> PathBuf {
        let path = reference.strip_prefix("file://").unwrap_or(reference);
        match &self.asset_dir {
            Some(dir) => dir.join(path.trim_start_matches('/')),
            None => PathBuf::from(path),
        }
    }
}

impl ImageSource for ImageLoader {
    fn load(&self, reference: &str) -> Result<DynamicImage, DecodeError> {
        let bytes = if reference.starts_with("data:") {
            decode_data_url(reference)?
        } else if reference.starts_with("http://") || reference.starts_with("https://") {
            return Err(DecodeError::Unsupported(truncate(reference)));
        } else {
            let path = self.resolve_path(reference);
            read_file(&path)?
        };
        Ok(image::load_from_memory(&bytes)?)
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, DecodeError> {
    std::fs::read(path).map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Extract the payload bytes of a `data:[<mediatype>][;base64],<data>` URL.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>, DecodeError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| DecodeError::InvalidDataUrl(truncate(url)))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| DecodeError::InvalidDataUrl(truncate(url)))?;

    if meta.split(';').any(|p| p.eq_ignore_ascii_case("base64")) {
        let cleaned: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        Ok(base64::engine::general_purpose::STANDARD.decode(cleaned)?)
    } else {
        Ok(payload.as_bytes().to_vec())
    }
}

/// Embed encoded image bytes as a base64 data URL.
pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

fn truncate(reference: &str) -> String {
    const MAX: usize = 64;
    match reference.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &reference[..cut]),
        None => reference.to_string(),
    }
}

/// Caches successful decodes by reference.
///
/// Editor redraws hit the same background and logo on every pointer move;
/// failures are not cached so a fixed asset is picked up on the next frame.
pub struct CachedImageSource<S> {
    inner: S,
    cache: Mutex<HashMap<String, DynamicImage>>,
}

impl<S: ImageSource> CachedImageSource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: ImageSource> ImageSource for CachedImageSource<S> {
    fn load(&self, reference: &str) -> Result<DynamicImage, DecodeError> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(image) = cache.get(reference) {
                return Ok(image.clone());
            }
        }
        let image = self.inner.load(reference)?;
        debug!("Decoded image {} ({}x{})", truncate(reference), image.width(), image.height());
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(reference.to_string(), image.clone());
        }
        Ok(image)
    }
}

impl<T: ImageSource + ?Sized> ImageSource for &T {
    fn load(&self, reference: &str) -> Result<DynamicImage, DecodeError> {
        (**self).load(reference)
    }
}
