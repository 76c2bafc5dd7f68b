use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::compiler::FileAnalysis;

pub struct CacheEntry {
    pub hash: String,
    pub analysis: FileAnalysis,
}

/// Analysis results per file, valid while the inputs hash the same.
#[derive(Default)]
pub struct AnalysisCache {
    entries: HashMap<PathBuf, CacheEntry>,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute_hash(source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Hash of several inputs; each is length-prefixed so boundaries count.
    pub fn compute_key<'p>(parts: impl IntoIterator<Item = &'p str>) -> String {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, file_path: &Path, hash: &str) -> Option<FileAnalysis> {
        let entry = self.entries.get(file_path)?;
        if entry.hash == hash {
            Some(entry.analysis.clone())
        } else {
            None
        }
    }

    pub fn set(&mut self, file_path: &Path, hash: String, analysis: FileAnalysis) {
        self.entries
            .insert(file_path.to_path_buf(), CacheEntry { hash, analysis });
    }

    pub fn invalidate(&mut self, file_path: &Path) -> bool {
        self.entries.remove(file_path).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(code: &str) -> FileAnalysis {
        FileAnalysis {
            code: code.to_string(),
            components: vec![],
            diagnostics: vec![],
        }
    }

    #[test]
    fn test_hit_requires_same_hash() {
        let mut cache = AnalysisCache::new();
        let path = Path::new("src/App.ts");
        let key = AnalysisCache::compute_key(["source", "App"]);
        cache.set(path, key.clone(), analysis("out"));
        assert_eq!(cache.get(path, &key).map(|a| a.code), Some("out".to_string()));
        assert!(cache.get(path, &AnalysisCache::compute_hash("other")).is_none());
    }

    #[test]
    fn test_key_respects_part_boundaries() {
        assert_ne!(
            AnalysisCache::compute_key(["ab", "c"]),
            AnalysisCache::compute_key(["a", "bc"])
        );
    }

    #[test]
    fn test_invalidate_removes_entry() {
        let mut cache = AnalysisCache::new();
        let path = Path::new("src/App.ts");
        cache.set(path, "h".into(), analysis("out"));
        assert!(cache.invalidate(path));
        assert!(!cache.invalidate(path));
        assert!(cache.get(path, "h").is_none());
    }
}
