/*!
 * Translation memory artifact.
 *
 * The artifact is rebuilt from the catalogs on every build and lists every
 * translatable key of the source catalog, in source order, with its
 * placeholder signature, a staleness fingerprint and a status per target
 * language. It is persisted as JSONL, one entry per line, and serializes
 * identically for identical inputs.
 */

use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::catalog::Catalog;
use crate::errors::ConfigError;
use crate::file_utils::FileManager;
use crate::translation::placeholders::{PlaceholderExtractor, PlaceholderSignature};

/// Version mixed into every fingerprint; bump when prompt context semantics change
pub const CONTEXT_VERSION: &str = "1.0";

/// Per-language state of one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Present,
    Missing,
    /// Reserved for review workflows; never assigned by the build
    NeedsReview,
}

/// Optional per-key context for prompts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl EntryMeta {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.tone.is_none()
            && self.screen.is_none()
            && self.domain.is_none()
            && self.notes.is_none()
    }
}

/// One translatable key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationEntry {
    pub key: String,
    pub namespace: String,
    pub source_lang: String,
    pub source_text: String,
    pub placeholder_signature: PlaceholderSignature,
    pub fingerprint: String,
    /// Sorted by language code
    pub status: BTreeMap<String, EntryStatus>,
    #[serde(default, skip_serializing_if = "EntryMeta::is_empty")]
    pub meta: EntryMeta,
}

impl TranslationEntry {
    pub fn status_for(&self, language: &str) -> EntryStatus {
        self.status
            .get(language)
            .copied()
            .unwrap_or(EntryStatus::Missing)
    }

    pub fn is_missing(&self, language: &str) -> bool {
        self.status_for(language) == EntryStatus::Missing
    }
}

/// Namespace of a key: the part before the first `.`
pub fn namespace_of(key: &str) -> String {
    match key.split_once('.') {
        Some((ns, _)) if !ns.is_empty() => ns.to_string(),
        _ => "default".to_string(),
    }
}

/// SHA-256 over key, source text, rendered signature and context version
pub fn fingerprint(key: &str, source_text: &str, signature: &PlaceholderSignature) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{}|{}", key, source_text, signature.render(), CONTEXT_VERSION));
    format!("{:x}", hasher.finalize())
}

/// Status counts for one language
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub present: usize,
    pub missing: usize,
    pub needs_review: usize,
}

/// Ordered entries of one generation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryArtifact {
    pub source_language: String,
    pub target_languages: Vec<String>,
    entries: Vec<TranslationEntry>,
    index: HashMap<String, usize>,
    /// Keys found only in a target catalog, per language
    pub orphans: BTreeMap<String, Vec<String>>,
}

impl MemoryArtifact {
    /// Build a fresh artifact from the source catalog and the target catalogs.
    ///
    /// `targets` must contain every configured target language; pass an empty
    /// catalog for a language that has no file yet.
    pub fn build(
        source_language: &str,
        source: &Catalog,
        targets: &BTreeMap<String, Catalog>,
        extractor: &PlaceholderExtractor,
    ) -> Self {
        let mut artifact = Self {
            source_language: source_language.to_string(),
            target_languages: targets
                .keys()
                .filter(|lang| lang.as_str() != source_language)
                .cloned()
                .collect(),
            ..Self::default()
        };

        for key in source.keys() {
            let Some(source_text) = source.source_text(key) else {
                debug!("Skipping key without source text: {}", key);
                continue;
            };

            let signature = extractor.extract(&source_text);
            let status = artifact
                .target_languages
                .iter()
                .map(|lang| {
                    let present = targets.get(lang).is_some_and(|c| !c.is_missing(key));
                    let status = if present { EntryStatus::Present } else { EntryStatus::Missing };
                    (lang.clone(), status)
                })
                .collect();

            artifact.push(TranslationEntry {
                key: key.clone(),
                namespace: namespace_of(key),
                source_lang: source_language.to_string(),
                fingerprint: fingerprint(key, &source_text, &signature),
                source_text,
                placeholder_signature: signature,
                status,
                meta: EntryMeta::default(),
            });
        }

        for lang in &artifact.target_languages {
            let Some(catalog) = targets.get(lang) else { continue };
            let orphans: Vec<String> = catalog
                .keys()
                .filter(|k| !source.contains_key(k))
                .cloned()
                .collect();
            if !orphans.is_empty() {
                debug!("{} orphaned key(s) in {}", orphans.len(), lang);
                artifact.orphans.insert(lang.clone(), orphans);
            }
        }

        info!(
            "Built translation memory: {} entries, {} target language(s)",
            artifact.len(),
            artifact.target_languages.len()
        );
        artifact
    }

    /// Build from catalogs read through a store
    pub fn build_from_reader(
        reader: &dyn crate::catalog::CatalogReader,
        source_language: &str,
        target_languages: &[String],
        extractor: &PlaceholderExtractor,
    ) -> Result<Self> {
        let source = reader
            .read(source_language)?
            .ok_or_else(|| ConfigError::MissingSourceCatalog(source_language.to_string()))?;

        let mut targets = BTreeMap::new();
        for lang in target_languages {
            let catalog = reader.read(lang)?.unwrap_or_default();
            targets.insert(lang.clone(), catalog);
        }

        Ok(Self::build(source_language, &source, &targets, extractor))
    }

    fn push(&mut self, entry: TranslationEntry) {
        self.index.insert(entry.key.clone(), self.entries.len());
        self.entries.push(entry);
    }

    /// Attach prompt context to the matching keys
    pub fn with_meta(mut self, meta: &HashMap<String, EntryMeta>) -> Self {
        for entry in &mut self.entries {
            if let Some(m) = meta.get(&entry.key) {
                entry.meta = m.clone();
            }
        }
        self
    }

    pub fn entries(&self) -> &[TranslationEntry] {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&TranslationEntry> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn missing_count(&self, language: &str) -> usize {
        self.status_counts(language).missing
    }

    pub fn status_counts(&self, language: &str) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for entry in &self.entries {
            match entry.status_for(language) {
                EntryStatus::Present => counts.present += 1,
                EntryStatus::Missing => counts.missing += 1,
                EntryStatus::NeedsReview => counts.needs_review += 1,
            }
        }
        counts
    }

    /// Record keys merged for a language; a rebuild reconciles these anyway
    pub fn mark_present<'a, I>(&mut self, language: &str, keys: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut changed = 0;
        for key in keys {
            if let Some(&i) = self.index.get(key) {
                let slot = self.entries[i]
                    .status
                    .entry(language.to_string())
                    .or_insert(EntryStatus::Missing);
                if *slot != EntryStatus::Present {
                    *slot = EntryStatus::Present;
                    changed += 1;
                }
            }
        }
        changed
    }

    /// One JSON object per line, in artifact order
    pub fn to_jsonl(&self) -> Result<String> {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&serde_json::to_string(entry).context("Failed to serialize memory entry")?);
            out.push('\n');
        }
        Ok(out)
    }

    pub fn write_jsonl<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        FileManager::write_atomic(path.as_ref(), &self.to_jsonl()?)?;
        info!("Wrote {} entries to {:?}", self.len(), path.as_ref());
        Ok(())
    }

    /// Read an artifact file; target languages are the union of status keys
    pub fn read_jsonl<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open memory file: {:?}", path))?;

        let mut artifact = Self::default();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read {:?}", path))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: TranslationEntry = serde_json::from_str(&line)
                .with_context(|| format!("Invalid memory entry at {:?}:{}", path, line_no + 1))?;
            if artifact.source_language.is_empty() {
                artifact.source_language = entry.source_lang.clone();
            }
            for lang in entry.status.keys() {
                if !artifact.target_languages.contains(lang) {
                    artifact.target_languages.push(lang.clone());
                }
            }
            artifact.push(entry);
        }
        artifact.target_languages.sort();

        Ok(artifact)
    }
}
