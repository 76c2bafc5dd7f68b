//! Component discovery.
//!
//! A component is a class whose base resolves to a recognized component
//! base: a PascalCase export of a framework module, a configured base name,
//! a component declared earlier in the same file, or a component found in
//! a previously analyzed module it imports from.

use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_span::Span;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Component as PathComponent, Path, PathBuf};

use crate::config::CompilerSettings;
use crate::types::strip;

// ═══════════════════════════════════════════════════════════════════════════════
// DECLARATIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDeclaration {
    pub name: String,
    pub file: PathBuf,
    /// Source text of the base class expression.
    pub base_class: String,
    /// Tag declared through the register decorator, if any.
    pub static_tag: Option<String>,
    /// Sibling template file the markup was loaded from.
    pub template_file: Option<PathBuf>,
    pub has_inline_template: bool,
    /// Filled in when the registry assigns a tag.
    pub tag: Option<String>,
}

/// What the lowering and template passes need to know about any class.
#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: Option<String>,
    pub span: Span,
    pub body_span: Span,
    /// Prototype methods, which lose `this` when passed around.
    pub methods: HashSet<String>,
    pub template_method: Option<Span>,
}

impl ClassInfo {
    pub fn contains(&self, span: Span) -> bool {
        self.span.start <= span.start && span.end <= self.span.end
    }
}

/// Innermost class containing `span`.
pub fn enclosing_class(classes: &[ClassInfo], span: Span) -> Option<&ClassInfo> {
    classes
        .iter()
        .filter(|c| c.contains(span))
        .min_by_key(|c| c.span.end - c.span.start)
}

pub fn class_infos(program: &Program<'_>, template_method: &str) -> Vec<ClassInfo> {
    let mut collector = ClassCollector {
        template_method,
        classes: vec![],
    };
    collector.visit_program(program);
    collector.classes
}

struct ClassCollector<'t> {
    template_method: &'t str,
    classes: Vec<ClassInfo>,
}

impl<'a> Visit<'a> for ClassCollector<'_> {
    fn visit_class(&mut self, class: &Class<'a>) {
        let mut methods = HashSet::new();
        let mut template_method = None;
        for element in &class.body.body {
            let ClassElement::MethodDefinition(method) = element else {
                continue;
            };
            if method.r#static || method.kind != MethodDefinitionKind::Method {
                continue;
            }
            if let Some(name) = method.key.static_name() {
                if name == self.template_method {
                    template_method = Some(method.span);
                }
                methods.insert(name.to_string());
            }
        }
        self.classes.push(ClassInfo {
            name: class.id.as_ref().map(|id| id.name.to_string()),
            span: class.span,
            body_span: class.body.span,
            methods,
            template_method,
        });
        walk::walk_class(self, class);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// IMPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    pub source: String,
    pub imported: String,
}

/// Local name -> where it was imported from.
pub fn import_table(program: &Program<'_>) -> HashMap<String, ImportBinding> {
    let mut table = HashMap::new();
    for stmt in &program.body {
        let Statement::ImportDeclaration(decl) = stmt else {
            continue;
        };
        for specifier in decl.specifiers.iter().flatten() {
            let (imported, local) = match specifier {
                ImportDeclarationSpecifier::ImportSpecifier(s) => (s.imported.name().to_string(), &s.local),
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => ("default".to_string(), &s.local),
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => ("*".to_string(), &s.local),
            };
            table.insert(
                local.name.to_string(),
                ImportBinding {
                    source: decl.source.value.to_string(),
                    imported,
                },
            );
        }
    }
    table
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROJECT COMPONENT INDEX
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct IndexedModule {
    file: PathBuf,
    classes: HashSet<String>,
}

/// Components found so far, by module path without extension.
#[derive(Debug, Default, Clone)]
pub struct ComponentIndex {
    modules: HashMap<PathBuf, IndexedModule>,
}

impl ComponentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, file: &Path, classes: impl IntoIterator<Item = String>) {
        let classes: HashSet<String> = classes.into_iter().collect();
        let key = module_key(file);
        if classes.is_empty() {
            self.modules.remove(&key);
            return;
        }
        self.modules.insert(
            key,
            IndexedModule {
                file: file.to_path_buf(),
                classes,
            },
        );
    }

    pub fn remove(&mut self, file: &Path) {
        self.modules.remove(&module_key(file));
    }

    pub fn is_component(&self, module: &Path, class: &str) -> bool {
        self.modules
            .get(&module_key(module))
            .is_some_and(|m| m.classes.contains(class))
    }

    /// The file in `dir` that declares component `class`.
    pub fn file_declaring(&self, dir: &Path, class: &str) -> Option<PathBuf> {
        let dir = normalize(dir);
        self.modules
            .values()
            .find(|m| m.classes.contains(class) && m.file.parent().map(normalize) == Some(dir.clone()))
            .map(|m| m.file.clone())
    }
}

/// Lexically normalized path (no `.` or `..` segments).
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for part in path.components() {
        match part {
            PathComponent::CurDir => {}
            PathComponent::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

pub fn module_key(path: &Path) -> PathBuf {
    normalize(&path.with_extension(""))
}

/// Resolve a relative import specifier against the importing file.
pub fn resolve_relative(from: &Path, specifier: &str) -> Option<PathBuf> {
    if !specifier.starts_with("./") && !specifier.starts_with("../") {
        return None;
    }
    let dir = from.parent().unwrap_or_else(|| Path::new(""));
    Some(normalize(&dir.join(specifier)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// DISCOVERY
// ═══════════════════════════════════════════════════════════════════════════════

pub fn discover_components(
    program: &Program<'_>,
    source: &str,
    file: &Path,
    settings: &CompilerSettings,
    index: &ComponentIndex,
) -> Vec<ComponentDeclaration> {
    let imports = import_table(program);
    let mut finder = ComponentFinder {
        source,
        file,
        settings,
        index,
        imports: &imports,
        found: vec![],
    };
    finder.visit_program(program);
    finder.found
}

struct ComponentFinder<'f> {
    source: &'f str,
    file: &'f Path,
    settings: &'f CompilerSettings,
    index: &'f ComponentIndex,
    imports: &'f HashMap<String, ImportBinding>,
    found: Vec<ComponentDeclaration>,
}

impl ComponentFinder<'_> {
    fn is_component_base(&self, name: &str) -> bool {
        if self.settings.options.component_bases.iter().any(|b| b == name) {
            return true;
        }
        if self.found.iter().any(|c| c.name == name) {
            return true;
        }
        let Some(binding) = self.imports.get(name) else {
            return false;
        };
        if self.settings.is_framework_module(&binding.source) {
            return binding.imported.starts_with(|c: char| c.is_ascii_uppercase());
        }
        resolve_relative(self.file, &binding.source)
            .is_some_and(|module| self.index.is_component(&module, &binding.imported))
    }

    /// The decorator must be the framework's own export, possibly renamed.
    fn is_register_decorator(&self, local: &str) -> bool {
        self.imports.get(local).is_some_and(|binding| {
            self.settings.is_framework_module(&binding.source)
                && binding.imported == self.settings.options.register_decorator
        })
    }

    fn static_tag(&self, class: &Class<'_>) -> Option<String> {
        class.decorators.iter().find_map(|decorator| {
            let Expression::CallExpression(call) = strip(&decorator.expression) else {
                return None;
            };
            let Expression::Identifier(callee) = strip(&call.callee) else {
                return None;
            };
            if !self.is_register_decorator(&callee.name) {
                return None;
            }
            let Some(Expression::ObjectExpression(options)) = call.arguments.first().and_then(|a| a.as_expression()) else {
                return None;
            };
            options.properties.iter().find_map(|prop| match prop {
                ObjectPropertyKind::ObjectProperty(p) if p.key.static_name().as_deref() == Some("tag") => {
                    match &p.value {
                        Expression::StringLiteral(s) => Some(s.value.to_string()),
                        _ => None,
                    }
                }
                _ => None,
            })
        })
    }
}

impl<'a> Visit<'a> for ComponentFinder<'_> {
    fn visit_class(&mut self, class: &Class<'a>) {
        let base = match (&class.id, class.super_class.as_ref().map(strip)) {
            (Some(id), Some(Expression::Identifier(base))) if self.is_component_base(&base.name) => {
                Some((id.name.to_string(), base))
            }
            _ => None,
        };
        if let Some((name, base)) = base {
            let method_name = self.settings.options.template_method.as_str();
            let has_inline_template = class.body.body.iter().any(|element| {
                matches!(element, ClassElement::MethodDefinition(m)
                    if !m.r#static && m.key.static_name().as_deref() == Some(method_name))
            });
            self.found.push(ComponentDeclaration {
                name,
                file: self.file.to_path_buf(),
                base_class: crate::rewrite::text_of(self.source, base.span).to_string(),
                static_tag: self.static_tag(class),
                template_file: None,
                has_inline_template,
                tag: None,
            });
        }
        walk::walk_class(self, class);
    }
}
