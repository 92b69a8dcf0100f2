//! Persistence Store - Template Collection
//!
//! The whole template list lives under one well-known key and is replaced
//! on every save (last writer wins). Everything read back goes through
//! `sanitize` before it is handed out.

use chrono::Utc;
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::sanitize::sanitize;
use crate::templates::{default_template_name, Template, UNNAMED_TEMPLATE};

/// Key holding the full template list.
pub const TEMPLATES_KEY: &str = "certificateTemplates";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stored value is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A keyed collection of JSON documents.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn put(&mut self, key: &str, value: Value) -> Result<(), StoreError>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl KeyValueStore for JsonDirStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path).map_err(io_error(&path))?;
        debug!("Read {} bytes from {}", text.len(), path.display());
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn put(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(&value)?;
        std::fs::write(&tmp, &text).map_err(io_error(&tmp))?;
        std::fs::rename(&tmp, &path).map_err(io_error(&path))?;
        debug!("Wrote {} bytes to {}", text.len(), path.display());
        Ok(())
    }
}

/// Template CRUD over a `KeyValueStore`.
pub struct TemplateStore<S> {
    backend: S,
}

impl<S: KeyValueStore> TemplateStore<S> {
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Every stored template, sanitized. A missing list is empty.
    pub fn load_all(&self) -> Result<Vec<Template>, StoreError> {
        match self.backend.get(TEMPLATES_KEY)? {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items.iter().map(sanitize).collect()),
            Some(other) => {
                warn!(
                    "Ignoring stored {}: expected a list, found {}",
                    TEMPLATES_KEY,
                    json_kind(&other)
                );
                Ok(Vec::new())
            }
        }
    }

    pub fn get(&self, id: &str) -> Result<Option<Template>, StoreError> {
        Ok(self.load_all()?.into_iter().find(|t| t.id == id))
    }

    /// Stamp and store `template`, replacing any entry with the same id.
    pub fn save(&mut self, mut template: Template) -> Result<Template, StoreError> {
        if template.name.trim().is_empty() {
            template.name = UNNAMED_TEMPLATE.to_string();
        }
        template.saved_at = Some(Utc::now());

        let mut all = self.load_all()?;
        match all.iter_mut().find(|t| t.id == template.id) {
            Some(existing) => *existing = template.clone(),
            None => all.push(template.clone()),
        }
        self.write_all(&all)?;
        info!("Saved template {} ({})", template.id, template.name);
        Ok(template)
    }

    /// Returns whether a template was removed.
    pub fn remove(&mut self, id: &str) -> Result<bool, StoreError> {
        let mut all = self.load_all()?;
        let before = all.len();
        all.retain(|t| t.id != id);
        if all.len() == before {
            return Ok(false);
        }
        self.write_all(&all)?;
        info!("Removed template {}", id);
        Ok(true)
    }

    /// `"Template N"` for a new template; `"Template 1"` if the list is unreadable.
    pub fn next_default_name(&self) -> String {
        match self.load_all() {
            Ok(all) => default_template_name(all.iter().map(|t| t.name.as_str())),
            Err(e) => {
                warn!("Could not read templates for default name: {}", e);
                default_template_name(std::iter::empty())
            }
        }
    }

    fn write_all(&mut self, all: &[Template]) -> Result<(), StoreError> {
        let value = serde_json::to_value(all)?;
        self.backend.put(TEMPLATES_KEY, value)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::TemplateMode;
    use serde_json::json;

    #[test]
    fn test_empty_store() {
        let store = TemplateStore::new(MemoryStore::new());
        assert!(store.load_all().unwrap().is_empty());
        assert_eq!(store.next_default_name(), "Template 1");
    }

    #[test]
    fn test_save_replaces_by_id() {
        let mut store = TemplateStore::new(MemoryStore::new());
        let mut t = Template::create(TemplateMode::Custom, "First");
        store.save(t.clone()).unwrap();
        t.name = "Renamed".into();
        store.save(t.clone()).unwrap();
        store.save(Template::create(TemplateMode::Showcase, "Second")).unwrap();

        let all = store.load_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "Renamed");
        assert!(all[0].saved_at.is_some());
    }

    #[test]
    fn test_blank_name_saved_as_unnamed() {
        let mut store = TemplateStore::new(MemoryStore::new());
        let saved = store.save(Template::empty("a", "  ")).unwrap();
        assert_eq!(saved.name, "Unnamed Template");
    }

    #[test]
    fn test_load_sanitizes_entries() {
        let mut backend = MemoryStore::new();
        backend
            .put(
                TEMPLATES_KEY,
                json!([{ "id": "x", "name": "Broken", "textElements": [{ "id": 1, "text": "Hi" }] }]),
            )
            .unwrap();
        let store = TemplateStore::new(backend);
        let t = store.get("x").unwrap().unwrap();
        assert_eq!(t.text_elements[0].font_size, 24.0);
        assert_eq!(t.name_placeholder.font_size, 36.0);
    }

    #[test]
    fn test_non_list_value_reads_as_empty() {
        let mut backend = MemoryStore::new();
        backend.put(TEMPLATES_KEY, json!({"oops": true})).unwrap();
        assert!(TemplateStore::new(backend).load_all().unwrap().is_empty());
    }

    #[test]
    fn test_remove() {
        let mut store = TemplateStore::new(MemoryStore::new());
        store.save(Template::empty("a", "A")).unwrap();
        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
    }

    #[test]
    fn test_default_names_count_up() {
        let mut store = TemplateStore::new(MemoryStore::new());
        store.save(Template::empty("a", "Template 1")).unwrap();
        store.save(Template::empty("b", "Template 4")).unwrap();
        assert_eq!(store.next_default_name(), "Template 5");
    }

    #[test]
    fn test_json_dir_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TemplateStore::new(JsonDirStore::new(dir.path().join("nested")));
        store.save(Template::showcase("s", "Show")).unwrap();

        let reopened = TemplateStore::new(JsonDirStore::new(dir.path().join("nested")));
        let t = reopened.get("s").unwrap().unwrap();
        assert_eq!(t.text_elements.len(), 3);
        assert!(dir.path().join("nested/certificateTemplates.json").exists());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("certificateTemplates.json"), "{not json").unwrap();
        let store = TemplateStore::new(JsonDirStore::new(dir.path()));
        assert!(matches!(store.load_all(), Err(StoreError::Json(_))));
        assert_eq!(store.next_default_name(), "Template 1");
    }
}
