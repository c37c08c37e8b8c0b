//! Document store - presets, auxiliary datasets and templates on disk
//!
//! Each collection is a directory of pretty-printed JSON documents named
//! `<id>.json`. Collections are loaded eagerly; unreadable or corrupt files
//! are skipped.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};
use crate::models::{AuxiliaryDataset, Preset, TemplateSchema};

/// Default store root (relative to current dir)
pub const DEFAULT_STORE_DIR: &str = ".tabflow";

/// A document kept in a [`Collection`].
pub trait Document: Serialize + DeserializeOwned + Clone {
    /// Human-readable kind, used in errors.
    const KIND: &'static str;
    /// Sub-directory of the store root.
    const DIR: &'static str;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn name(&self) -> &str;

    /// Record the save time, for documents that carry one.
    fn touch(&mut self, _timestamp: String) {}
}

impl Document for Preset {
    const KIND: &'static str = "Preset";
    const DIR: &'static str = "presets";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn name(&self) -> &str {
        &self.name
    }
}

impl Document for AuxiliaryDataset {
    const KIND: &'static str = "Dataset";
    const DIR: &'static str = "datasets";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn touch(&mut self, timestamp: String) {
        self.last_modified = Some(timestamp);
    }
}

impl Document for TemplateSchema {
    const KIND: &'static str = "Template";
    const DIR: &'static str = "templates";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn touch(&mut self, timestamp: String) {
        self.last_modified = Some(timestamp);
    }
}

/// Ids double as file names.
static ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").expect("Invalid id regex"));

/// Runs of characters that cannot appear in a generated id.
static SLUG_SEPARATOR_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("Invalid slug regex"));

fn is_valid_id(id: &str) -> bool {
    ID_REGEX.is_match(id)
}

/// Generate a unique ID from a name
fn generate_id(name: &str) -> String {
    let lower = name.to_lowercase();
    let slug = SLUG_SEPARATOR_REGEX.replace_all(&lower, "-");
    let slug = match slug.trim_matches('-') {
        "" => "untitled",
        trimmed => trimmed,
    };

    let timestamp = chrono::Utc::now().timestamp_millis();
    format!("{}-{}", slug, timestamp)
}

/// One directory of documents of the same kind.
pub struct Collection<D: Document> {
    dir: PathBuf,
    docs: HashMap<String, D>,
}

impl<D: Document> Collection<D> {
    /// Open a collection, loading existing documents from disk
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        let mut collection = Self {
            dir: dir.as_ref().to_path_buf(),
            docs: HashMap::new(),
        };
        collection.load_all();
        collection
    }

    fn load_all(&mut self) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(content) = fs::read_to_string(&path) {
                if let Ok(doc) = serde_json::from_str::<D>(&content) {
                    // A document must live in the file named after its id.
                    if doc.id() == stem {
                        self.docs.insert(stem.to_string(), doc);
                    }
                }
            }
        }
    }

    /// All documents, sorted by name then id.
    pub fn list(&self) -> Vec<&D> {
        let mut docs: Vec<&D> = self.docs.values().collect();
        docs.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(b.id())));
        docs
    }

    pub fn get(&self, id: &str) -> StoreResult<&D> {
        self.docs.get(id).ok_or_else(|| StoreError::NotFound {
            kind: D::KIND,
            id: id.to_string(),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.docs.contains_key(id)
    }

    /// Insert or replace a document, returning the stored copy.
    ///
    /// A document whose id is empty or unusable as a file name gets a
    /// generated `<slug>-<millis>` id.
    pub fn save(&mut self, mut doc: D) -> StoreResult<D> {
        fs::create_dir_all(&self.dir)?;

        if !is_valid_id(doc.id()) {
            doc.set_id(generate_id(doc.name()));
        }
        doc.touch(chrono::Utc::now().to_rfc3339());

        let path = self.path_for(doc.id());
        fs::write(&path, serde_json::to_string_pretty(&doc)?)?;

        self.docs.insert(doc.id().to_string(), doc.clone());
        Ok(doc)
    }

    /// Read a single document from a JSON file and save it.
    pub fn import(&mut self, path: &Path) -> StoreResult<D> {
        let content = fs::read_to_string(path)?;
        let doc: D = serde_json::from_str(&content)?;
        self.save(doc)
    }

    pub fn delete(&mut self, id: &str) -> StoreResult<D> {
        let doc = self.docs.remove(id).ok_or_else(|| StoreError::NotFound {
            kind: D::KIND,
            id: id.to_string(),
        })?;
        let path = self.path_for(id);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(doc)
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }
}

/// The three collections under one root directory.
pub struct Store {
    root: PathBuf,
    pub presets: Collection<Preset>,
    pub datasets: Collection<AuxiliaryDataset>,
    pub templates: Collection<TemplateSchema>,
}

impl Store {
    pub fn open(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            presets: Collection::with_dir(root.join(Preset::DIR)),
            datasets: Collection::with_dir(root.join(AuxiliaryDataset::DIR)),
            templates: Collection::with_dir(root.join(TemplateSchema::DIR)),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every stored auxiliary dataset, as lookup targets.
    pub fn all_datasets(&self) -> Vec<AuxiliaryDataset> {
        self.datasets.list().into_iter().cloned().collect()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::open(DEFAULT_STORE_DIR)
    }
}
