//! Project discovery.
//!
//! Walks a source tree for script modules and indexes the component classes
//! they declare. A class may extend a component imported from another
//! module, so indexing repeats until no new components appear.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::component::{discover_components, ComponentDeclaration, ComponentIndex};
use crate::config::CompilerSettings;
use crate::parse::{is_script_path, with_program};

const SKIPPED_DIRS: &[&str] = &["node_modules", "dist", "build", "target"];

fn is_skipped(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())
}

/// Recursively find script modules under `root`, sorted.
pub fn find_script_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && is_script_path(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Index the components declared in `files` and return them.
pub fn index_components(
    files: &[(PathBuf, String)],
    settings: &CompilerSettings,
    index: &mut ComponentIndex,
) -> Vec<ComponentDeclaration> {
    let mut found: Vec<ComponentDeclaration> = vec![];
    for round in 0..=files.len() {
        let previous = found.len();
        found.clear();
        for (path, source) in files {
            let result = with_program(path, source, settings, |ctx| {
                Ok(discover_components(ctx.program, ctx.source, path, settings, index))
            });
            match result {
                Ok((components, _)) => {
                    index.update(path, components.iter().map(|c| c.name.clone()));
                    found.extend(components);
                }
                Err(e) if round == 0 => {
                    tracing::warn!(file = %path.display(), error = %e, "skipping unparsable module");
                }
                Err(_) => {}
            }
        }
        tracing::debug!(round, components = found.len(), "indexed components");
        if round > 0 && found.len() == previous {
            break;
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;

    #[test]
    fn test_find_script_files_skips_vendor_and_hidden_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for sub in ["src/widgets", "node_modules/lib", ".cache", "dist"] {
            std::fs::create_dir_all(root.join(sub)).unwrap();
        }
        std::fs::write(root.join("src/App.ts"), "").unwrap();
        std::fs::write(root.join("src/widgets/Card.tsx"), "").unwrap();
        std::fs::write(root.join("src/widgets/Card.template"), "").unwrap();
        std::fs::write(root.join("src/types.d.ts"), "").unwrap();
        std::fs::write(root.join("node_modules/lib/index.ts"), "").unwrap();
        std::fs::write(root.join(".cache/x.ts"), "").unwrap();
        std::fs::write(root.join("dist/App.js"), "").unwrap();

        let files = find_script_files(root);
        assert_eq!(
            files,
            vec![root.join("src/App.ts"), root.join("src/widgets/Card.tsx")]
        );
    }

    #[test]
    fn test_index_follows_imported_bases_in_any_order() {
        let settings = CompilerConfig::default().compile().unwrap();
        let files = vec![
            (
                PathBuf::from("src/Fancy.ts"),
                "import { Card } from \"./Card\";\nexport class Fancy extends Card {}".to_string(),
            ),
            (
                PathBuf::from("src/Card.ts"),
                "import { Component } from \"typecomposer\";\nexport class Card extends Component {}".to_string(),
            ),
        ];
        let mut index = ComponentIndex::new();
        let found = index_components(&files, &settings, &mut index);
        let mut names: Vec<_> = found.iter().map(|c| c.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["Card", "Fancy"]);
        assert!(index.is_component(Path::new("src/Fancy"), "Fancy"));
    }
}
