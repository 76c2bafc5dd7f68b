//! Custom-element tag registry.
//!
//! Every component class gets a tag that is unique among live components.
//! Derived ("dynamic") tags are the kebab-cased class name, suffixed with
//! `-tc2`, `-tc3`, ... on collision or when the name has no hyphen. A tag
//! whose owning file no longer exists is reclaimed by the next class that
//! derives it. Explicit ("static") tags are reserved as declared and never
//! handed out by derivation.
//!
//! Per tag: `unassigned -> assigned(file) -> reclaimable -> assigned(file')`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::diagnostics::{Diagnostic, Severity, DIAG_TAG_AMBIGUOUS};
use crate::filesystem::FileSystem;

lazy_static::lazy_static! {
    static ref LOWER_UPPER: Regex = Regex::new(r"([a-z])([A-Z])").unwrap_or_else(|e| panic!("{e}"));
    static ref DIGIT_LETTER: Regex = Regex::new(r"([0-9])([A-Za-z])").unwrap_or_else(|e| panic!("{e}"));
    static ref VALID_TAG: Regex = Regex::new(r"^[a-z][a-z0-9._]*(-[a-z0-9._]*)+$").unwrap_or_else(|e| panic!("{e}"));
}

/// Upper bound on collision suffixes tried for one base name.
const MAX_SUFFIX: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    #[error("`{0}` is not a valid custom element name")]
    InvalidStatic(String),

    #[error("tag `{tag}` is already owned by {} ({})", .owner.class_name, .owner.file.display())]
    Conflict { tag: String, owner: TagOwner },

    #[error("no free tag derived from `{0}`")]
    Exhausted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagOwner {
    pub file: PathBuf,
    pub class_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    pub tag: String,
    pub owner: TagOwner,
    pub kind: TagKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagState {
    Unassigned,
    Assigned(TagOwner),
    /// The owning file is gone; the next derivation may take the tag.
    Reclaimable(TagOwner),
}

/// Kebab-case a class name: `MyButton` -> `my-button`, `Card2Item` -> `card2-item`.
pub fn derive_tag(class_name: &str) -> String {
    let s = LOWER_UPPER.replace_all(class_name, "$1-$2");
    DIGIT_LETTER.replace_all(&s, "$1-$2").to_lowercase()
}

pub fn is_valid_tag(tag: &str) -> bool {
    VALID_TAG.is_match(tag)
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

pub struct TagRegistry {
    records: BTreeMap<String, TagRecord>,
    by_file: HashMap<PathBuf, HashSet<String>>,
    fs: Arc<dyn FileSystem>,
    suffix: String,
}

impl TagRegistry {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            records: BTreeMap::new(),
            by_file: HashMap::new(),
            fs,
            suffix: "tc".to_string(),
        }
    }

    /// Marker between a colliding base name and its counter.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Tag for `class_name` declared in `file`, deriving and recording one
    /// if the class has none yet. Reports a diagnostic when the derived name
    /// could not be used as is.
    pub fn assign(&mut self, class_name: &str, file: &Path) -> Result<(String, Option<Diagnostic>), TagError> {
        let owner = TagOwner {
            file: file.to_path_buf(),
            class_name: class_name.to_string(),
        };
        if let Some(existing) = self.records.values().find(|r| r.owner == owner) {
            return Ok((existing.tag.clone(), None));
        }

        let base = derive_tag(class_name);
        let mut candidate = base.clone();
        let mut n = 1;
        loop {
            if is_valid_tag(&candidate) && self.is_free_for(&candidate, &owner) {
                break;
            }
            n += 1;
            if n > MAX_SUFFIX {
                return Err(TagError::Exhausted(base));
            }
            candidate = format!("{base}-{}{n}", self.suffix);
        }

        let diagnostic = (candidate != base).then(|| {
            let reason = if is_valid_tag(&base) {
                "is taken by a live component"
            } else {
                "is not a valid custom element name"
            };
            Diagnostic::new(
                DIAG_TAG_AMBIGUOUS,
                Severity::Warning,
                &format!("derived tag `{base}` for `{class_name}` {reason}; using `{candidate}`"),
                &file.to_string_lossy(),
            )
        });

        self.insert(TagRecord {
            tag: candidate.clone(),
            owner,
            kind: TagKind::Dynamic,
        });
        tracing::debug!(tag = %candidate, class = class_name, file = %file.display(), "assigned tag");
        Ok((candidate, diagnostic))
    }

    /// Reserve an explicitly declared tag for `class_name`.
    pub fn reserve_static(&mut self, tag: &str, class_name: &str, file: &Path) -> Result<(), TagError> {
        if !is_valid_tag(tag) {
            return Err(TagError::InvalidStatic(tag.to_string()));
        }
        let owner = TagOwner {
            file: file.to_path_buf(),
            class_name: class_name.to_string(),
        };
        match self.records.get(tag) {
            Some(record) if record.owner == owner => {
                if record.kind == TagKind::Static {
                    return Ok(());
                }
            }
            Some(record) if self.fs.exists(&record.owner.file) => {
                return Err(TagError::Conflict {
                    tag: tag.to_string(),
                    owner: record.owner.clone(),
                });
            }
            _ => {}
        }

        // A class owns one tag; a previously derived one is released.
        let previous: Vec<String> = self
            .records
            .values()
            .filter(|r| r.owner == owner)
            .map(|r| r.tag.clone())
            .collect();
        for t in previous {
            self.remove(&t);
        }
        self.remove(tag);
        self.insert(TagRecord {
            tag: tag.to_string(),
            owner,
            kind: TagKind::Static,
        });
        Ok(())
    }

    /// Drop the static tag of a class that no longer declares one.
    pub fn release_static(&mut self, class_name: &str, file: &Path) {
        let stale: Vec<String> = self
            .records
            .values()
            .filter(|r| r.kind == TagKind::Static && r.owner.file == file && r.owner.class_name == class_name)
            .map(|r| r.tag.clone())
            .collect();
        for tag in stale {
            tracing::debug!(tag = %tag, class = class_name, "released static tag");
            self.remove(&tag);
        }
    }

    /// Free every tag owned by `file`. Returns the released tags.
    pub fn release_file(&mut self, file: &Path) -> Vec<String> {
        let mut tags: Vec<String> = self
            .by_file
            .remove(file)
            .map(|t| t.into_iter().collect())
            .unwrap_or_default();
        tags.sort();
        for tag in &tags {
            self.records.remove(tag);
        }
        if !tags.is_empty() {
            tracing::debug!(file = %file.display(), released = ?tags, "released tags");
        }
        tags
    }

    /// Drop tags of classes `file` no longer declares.
    pub fn retain_classes(&mut self, file: &Path, classes: &HashSet<String>) {
        let stale: Vec<String> = self
            .by_file
            .get(file)
            .into_iter()
            .flatten()
            .filter(|tag| {
                self.records
                    .get(*tag)
                    .is_some_and(|r| !classes.contains(&r.owner.class_name))
            })
            .cloned()
            .collect();
        for tag in stale {
            self.remove(&tag);
        }
    }

    pub fn state(&self, tag: &str) -> TagState {
        match self.records.get(tag) {
            None => TagState::Unassigned,
            Some(record) if record.kind == TagKind::Dynamic && !self.fs.exists(&record.owner.file) => {
                TagState::Reclaimable(record.owner.clone())
            }
            Some(record) => TagState::Assigned(record.owner.clone()),
        }
    }

    pub fn owner(&self, tag: &str) -> Option<&TagOwner> {
        self.records.get(tag).map(|r| &r.owner)
    }

    pub fn record(&self, tag: &str) -> Option<&TagRecord> {
        self.records.get(tag)
    }

    /// Tags owned by `file`, sorted.
    pub fn tags_for(&self, file: &Path) -> Vec<String> {
        let mut tags: Vec<String> = self
            .by_file
            .get(file)
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default();
        tags.sort();
        tags
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn is_free_for(&self, tag: &str, owner: &TagOwner) -> bool {
        match self.records.get(tag) {
            None => true,
            Some(record) if &record.owner == owner => true,
            Some(record) => record.kind == TagKind::Dynamic && !self.fs.exists(&record.owner.file),
        }
    }

    fn insert(&mut self, record: TagRecord) {
        if let Some(previous) = self.records.get(&record.tag) {
            let (file, tag) = (previous.owner.file.clone(), record.tag.clone());
            if previous.kind == TagKind::Dynamic && previous.owner != record.owner {
                tracing::debug!(tag = %tag, from = %file.display(), "reclaimed tag");
            }
            self.unlink(&file, &tag);
        }
        self.by_file
            .entry(record.owner.file.clone())
            .or_default()
            .insert(record.tag.clone());
        self.records.insert(record.tag.clone(), record);
    }

    fn remove(&mut self, tag: &str) {
        if let Some(record) = self.records.remove(tag) {
            self.unlink(&record.owner.file, tag);
        }
    }

    fn unlink(&mut self, file: &Path, tag: &str) {
        if let Some(tags) = self.by_file.get_mut(file) {
            tags.remove(tag);
            if tags.is_empty() {
                self.by_file.remove(file);
            }
        }
    }
}
