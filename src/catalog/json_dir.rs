/*!
 * Directory of `<lang>.json` catalog files.
 */

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use serde_json::Value;

use super::{Catalog, CatalogReader, CatalogWriter};
use crate::file_utils::FileManager;

/// How a catalog file stores its keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileLayout {
    /// `{"home": {"title": ...}}`
    Nested,
    /// `{"home.title": ...}`
    Flat,
}

/// Catalog files in one directory, one per language
#[derive(Debug, Clone)]
pub struct JsonDirCatalog {
    dir: PathBuf,
    layout: Option<FileLayout>,
}

impl JsonDirCatalog {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            layout: None,
        }
    }

    /// Force a layout on write instead of following the existing file
    pub fn with_layout(mut self, layout: FileLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, language: &str) -> PathBuf {
        self.dir.join(format!("{language}.json"))
    }

    fn read_value(path: &Path) -> Result<Value> {
        let content = FileManager::read_to_string(path)?;
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))
    }

    fn detect_layout(value: &Value) -> FileLayout {
        match value {
            Value::Object(map) if map.values().any(|v| matches!(v, Value::Object(m) if !m.is_empty())) => {
                FileLayout::Nested
            }
            Value::Object(map) if map.keys().any(|k| k.contains('.')) => FileLayout::Flat,
            _ => FileLayout::Nested,
        }
    }
}

impl CatalogReader for JsonDirCatalog {
    fn read(&self, language: &str) -> Result<Option<Catalog>> {
        let path = self.path_for(language);
        if !FileManager::file_exists(&path) {
            return Ok(None);
        }
        let value = Self::read_value(&path)?;
        if !value.is_object() {
            anyhow::bail!("Catalog {:?} must contain a JSON object", path);
        }
        let catalog = Catalog::from_nested_json(&value);
        debug!("Read {} keys from {:?}", catalog.len(), path);
        Ok(Some(catalog))
    }

    fn languages(&self) -> Result<Vec<String>> {
        if !FileManager::dir_exists(&self.dir) {
            return Ok(Vec::new());
        }
        let languages = FileManager::find_files(&self.dir, "json")?
            .into_iter()
            .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().to_string()))
            .collect();
        Ok(languages)
    }
}

impl CatalogWriter for JsonDirCatalog {
    fn write(&self, language: &str, catalog: &Catalog) -> Result<()> {
        let path = self.path_for(language);
        let layout = match self.layout {
            Some(layout) => layout,
            None if FileManager::file_exists(&path) => Self::detect_layout(&Self::read_value(&path)?),
            None => FileLayout::Nested,
        };

        let value = match layout {
            FileLayout::Nested => catalog.to_nested_json(),
            FileLayout::Flat => catalog.to_flat_json(),
        };
        // Source catalogs escape forward slashes; keep written files in the same form
        let mut content = serde_json::to_string_pretty(&value)
            .with_context(|| format!("Failed to serialize catalog for {}", language))?
            .replace('/', "\\/");
        content.push('\n');

        FileManager::write_atomic(&path, &content)?;
        debug!("Wrote {} keys to {:?}", catalog.len(), path);
        Ok(())
    }
}
