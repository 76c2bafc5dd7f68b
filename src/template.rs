//! Sibling template files.
//!
//! A component `Foo` declared in `src/Foo.ts` may keep its markup in
//! `src/Foo.template`. The markup is injected as a generated `template()`
//! method; leading `import` lines of the template file are hoisted into the
//! component's module, and the module imports the template file itself so
//! the host watches it.
//!
//! Generated methods carry a marker with the template's content hash. An
//! up-to-date generated method is left alone; a stale one, or a handwritten
//! `template()` method, is discarded and regenerated.

use oxc_allocator::Allocator;
use oxc_parser::Parser;
use oxc_span::SourceType;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use crate::cache::AnalysisCache;
use crate::component::{class_infos, ComponentDeclaration};
use crate::diagnostics::{CompileError, Severity, DIAG_DUPLICATE_ARTIFACT};
use crate::filesystem::FileSystem;
use crate::parse::PassContext;
use crate::rewrite::Edit;
use crate::scope::import_insertion_point;

lazy_static::lazy_static! {
    static ref GENERATED_MARKER: Regex =
        Regex::new(r"/\* generated from (\S+) sha256:([0-9a-f]+) \*/").unwrap_or_else(|e| panic!("{e}"));
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSource {
    pub path: PathBuf,
    pub class_name: String,
    pub imports: Vec<String>,
    pub markup: String,
    pub hash: String,
}

impl TemplateSource {
    pub fn parse(path: PathBuf, class_name: &str, content: &str) -> Self {
        let (imports, markup) = split_template(content);
        Self {
            path,
            class_name: class_name.to_string(),
            imports,
            markup,
            hash: AnalysisCache::compute_hash(content)[..16].to_string(),
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn marker(&self) -> String {
        format!("/* generated from {} sha256:{} */", self.file_name(), self.hash)
    }

    /// The generated class method, named `name`.
    pub fn method(&self, name: &str) -> String {
        format!(
            "{name}() {{\n    {}\n    return (\n{}\n    );\n  }}",
            self.marker(),
            self.markup
        )
    }

    /// Fail early on markup that does not parse, naming the template file.
    pub fn validate(&self) -> Result<(), CompileError> {
        let allocator = Allocator::default();
        let wrapped = format!("({})", self.markup);
        let source_type = SourceType::default()
            .with_typescript(true)
            .with_module(true)
            .with_jsx(true);
        match Parser::new(&allocator, &wrapped, source_type).parse_expression() {
            Ok(_) => Ok(()),
            Err(errors) => Err(CompileError::Markup {
                file: self.path.to_string_lossy().to_string(),
                message: errors
                    .first()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "invalid markup".to_string()),
                offset: 0,
            }),
        }
    }
}

/// Leading `import` lines and the markup that follows them.
pub fn split_template(content: &str) -> (Vec<String>, String) {
    let mut imports = vec![];
    let mut lines = content.lines().peekable();
    while let Some(line) = lines.peek() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            lines.next();
        } else if trimmed.starts_with("import ") {
            imports.push(trimmed.to_string());
            lines.next();
        } else {
            break;
        }
    }
    let markup = lines.collect::<Vec<_>>().join("\n").trim().to_string();
    (imports, markup)
}

pub fn template_path(component_file: &Path, class_name: &str, extension: &str) -> PathBuf {
    let dir = component_file.parent().unwrap_or_else(|| Path::new(""));
    dir.join(format!("{class_name}{extension}"))
}

/// Read the sibling template of each component that has one.
pub fn load_templates(
    fs: &dyn FileSystem,
    component_file: &Path,
    components: &[ComponentDeclaration],
    extension: &str,
) -> Vec<Result<TemplateSource, (PathBuf, io::Error)>> {
    components
        .iter()
        .filter_map(|component| {
            let path = template_path(component_file, &component.name, extension);
            if !fs.exists(&path) {
                return None;
            }
            Some(
                fs.read_to_string(&path)
                    .map(|content| TemplateSource::parse(path.clone(), &component.name, &content))
                    .map_err(|e| (path, e)),
            )
        })
        .collect()
}

/// Edits that install each template into its component class.
pub fn inject_templates(
    ctx: &PassContext<'_, '_>,
    templates: &[TemplateSource],
) -> Result<Vec<Edit>, CompileError> {
    let method_name = ctx.settings.options.template_method.as_str();
    let classes = class_infos(ctx.program, method_name);
    let mut edits = vec![];
    let mut hoisted: Vec<String> = vec![];
    let present: HashSet<&str> = ctx.source.lines().map(str::trim).collect();

    for template in templates {
        template.validate()?;
        let Some(class) = classes
            .iter()
            .find(|c| c.name.as_deref() == Some(template.class_name.as_str()))
        else {
            continue;
        };

        match class.template_method {
            Some(span) => {
                let existing = ctx.text(span);
                let up_to_date = GENERATED_MARKER
                    .captures(existing)
                    .is_some_and(|c| &c[1] == template.file_name() && &c[2] == template.hash);
                if up_to_date {
                    tracing::debug!(file = ctx.file, class = %template.class_name, "generated template is current");
                } else {
                    ctx.report(
                        DIAG_DUPLICATE_ARTIFACT,
                        Severity::Warning,
                        &format!(
                            "`{}` already has a {}() method; regenerating it from {}",
                            template.class_name,
                            method_name,
                            template.file_name()
                        ),
                        span.start,
                    );
                    edits.push(Edit::replace(span, template.method(method_name)));
                }
            }
            None => {
                let close = class.body_span.end.saturating_sub(1);
                edits.push(Edit::insert(close, format!("\n  {}\n", template.method(method_name))));
            }
        }

        let side_effect = format!("import \"./{}\";", template.file_name());
        for line in template.imports.iter().chain(std::iter::once(&side_effect)) {
            if !present.contains(line.as_str()) && !hoisted.contains(line) {
                hoisted.push(line.clone());
            }
        }
    }

    if !hoisted.is_empty() {
        let at = import_insertion_point(ctx.program);
        let text = if at == 0 {
            format!("{}\n", hoisted.join("\n"))
        } else {
            format!("\n{}", hoisted.join("\n"))
        };
        edits.push(Edit::insert(at, text));
    }
    Ok(edits)
}

/// A module for the template file itself, so the side-effect import resolves.
pub fn template_module_stub(path: &Path) -> String {
    let id = serde_json::to_string(&path.to_string_lossy()).unwrap_or_else(|_| "\"\"".to_string());
    format!("export default function () {{ return {id}; }}\n")
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPLATE ASSOCIATIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateLink {
    pub component_file: PathBuf,
    pub class_name: String,
}

/// Which component file each template file belongs to.
#[derive(Debug, Default)]
pub struct TemplateIndex {
    by_template: HashMap<PathBuf, TemplateLink>,
    by_component: HashMap<PathBuf, HashSet<PathBuf>>,
}

impl TemplateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the links owned by `component_file`.
    pub fn replace(&mut self, component_file: &Path, links: Vec<(PathBuf, String)>) {
        self.remove_component(component_file);
        let mut owned = HashSet::new();
        for (template, class_name) in links {
            owned.insert(template.clone());
            self.by_template.insert(
                template,
                TemplateLink {
                    component_file: component_file.to_path_buf(),
                    class_name,
                },
            );
        }
        if !owned.is_empty() {
            self.by_component.insert(component_file.to_path_buf(), owned);
        }
    }

    pub fn remove_component(&mut self, component_file: &Path) -> Vec<PathBuf> {
        let owned = self.by_component.remove(component_file).unwrap_or_default();
        for template in &owned {
            self.by_template.remove(template);
        }
        owned.into_iter().collect()
    }

    pub fn owner(&self, template: &Path) -> Option<&TemplateLink> {
        self.by_template.get(template)
    }

    pub fn remove_template(&mut self, template: &Path) -> Option<TemplateLink> {
        let link = self.by_template.remove(template)?;
        if let Some(owned) = self.by_component.get_mut(&link.component_file) {
            owned.remove(template);
            if owned.is_empty() {
                self.by_component.remove(&link.component_file);
            }
        }
        Some(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::MemoryFileSystem;

    #[test]
    fn test_split_template_hoists_leading_imports() {
        let content = "\nimport { Icon } from \"./Icon\";\nimport \"./x.css\";\n\n<div>\n  <Icon />\n</div>\n";
        let (imports, markup) = split_template(content);
        assert_eq!(imports, vec!["import { Icon } from \"./Icon\";", "import \"./x.css\";"]);
        assert_eq!(markup, "<div>\n  <Icon />\n</div>");
    }

    #[test]
    fn test_generated_method_carries_marker() {
        let t = TemplateSource::parse(PathBuf::from("src/Card.template"), "Card", "<p>hi</p>");
        let method = t.method("render");
        assert!(method.starts_with("render() {"));
        assert!(method.contains("/* generated from Card.template sha256:"));
        assert!(GENERATED_MARKER.is_match(&method));
        assert!(method.contains("<p>hi</p>"));
    }

    #[test]
    fn test_malformed_markup_fails_validation() {
        let t = TemplateSource::parse(PathBuf::from("src/Card.template"), "Card", "<div><p></div>");
        assert!(matches!(t.validate(), Err(CompileError::Markup { .. })));
    }

    #[test]
    fn test_load_templates_only_for_existing_siblings() {
        let fs = MemoryFileSystem::new();
        fs.write("src/Card.template", "<p/>");
        let component = |name: &str| ComponentDeclaration {
            name: name.to_string(),
            file: PathBuf::from("src/Card.ts"),
            base_class: "Component".into(),
            static_tag: None,
            template_file: None,
            has_inline_template: false,
            tag: None,
        };
        let loaded = load_templates(
            &fs,
            Path::new("src/Card.ts"),
            &[component("Card"), component("Other")],
            ".template",
        );
        assert_eq!(loaded.len(), 1);
        let template = loaded[0].as_ref().unwrap();
        assert_eq!(template.path, PathBuf::from("src/Card.template"));
        assert_eq!(template.markup, "<p/>");
    }

    #[test]
    fn test_template_index_tracks_ownership() {
        let mut index = TemplateIndex::new();
        let comp = Path::new("src/Card.ts");
        index.replace(comp, vec![(PathBuf::from("src/Card.template"), "Card".into())]);
        assert_eq!(
            index.owner(Path::new("src/Card.template")).map(|l| l.class_name.as_str()),
            Some("Card")
        );
        index.replace(comp, vec![]);
        assert!(index.owner(Path::new("src/Card.template")).is_none());
    }

    #[test]
    fn test_stub_module_returns_path() {
        let stub = template_module_stub(Path::new("src/Card.template"));
        assert_eq!(stub, "export default function () { return \"src/Card.template\"; }\n");
    }
}
