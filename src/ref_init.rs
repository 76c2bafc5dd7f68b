//! Reactive container initialization.
//!
//! - `ref<T>()` without an initial value gets one derived from `T`, so the
//!   container never starts out `undefined`.
//! - `refProperty(value)` used as a class property initializer learns the
//!   property's name, and inside a component the owning instance.

use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use std::collections::{HashMap, HashSet};

use crate::diagnostics::CompileError;
use crate::jsx_lowerer::property_key;
use crate::parse::PassContext;
use crate::rewrite::Edit;
use crate::types::strip;

const REF: &str = "ref";
const REF_PROPERTY: &str = "refProperty";

/// Expansion depth for nested object types.
const MAX_DEPTH: usize = 4;

pub fn compile_reactive_init(
    ctx: &PassContext<'_, '_>,
    components: &HashSet<String>,
) -> Result<Vec<Edit>, CompileError> {
    let locals = local_types(ctx.program);
    let mut init = ReactiveInit {
        ctx,
        components,
        defaults: TypeDefaults { locals: &locals },
        classes: vec![],
        edits: vec![],
    };
    init.visit_program(ctx.program);
    Ok(init.edits)
}

struct ReactiveInit<'c, 's, 'a> {
    ctx: &'c PassContext<'s, 'a>,
    components: &'c HashSet<String>,
    defaults: TypeDefaults<'c, 's, 'a>,
    classes: Vec<Option<String>>,
    edits: Vec<Edit>,
}

impl<'a> ReactiveInit<'_, '_, 'a> {
    fn is_helper(&self, callee: &Expression<'_>, name: &str) -> bool {
        self.ctx.classifier.is_reactive_callable(callee, name)
    }

    /// Insert `text` just before the call's closing parenthesis.
    fn append_arguments(&mut self, call: &CallExpression<'a>, text: String) {
        if self.ctx.text(call.span).ends_with(')') {
            self.edits.push(Edit::insert(call.span.end - 1, text));
        }
    }

    fn in_component(&self) -> bool {
        matches!(self.classes.last(), Some(Some(name)) if self.components.contains(name))
    }
}

impl<'a> Visit<'a> for ReactiveInit<'_, '_, 'a> {
    fn visit_class(&mut self, class: &Class<'a>) {
        self.classes.push(class.id.as_ref().map(|id| id.name.to_string()));
        walk::walk_class(self, class);
        self.classes.pop();
    }

    fn visit_property_definition(&mut self, prop: &PropertyDefinition<'a>) {
        if let (Some(Expression::CallExpression(call)), Some(name)) =
            (prop.value.as_ref().map(strip), prop.key.static_name())
        {
            if self.is_helper(&call.callee, REF_PROPERTY) && call.arguments.len() <= 1 {
                let name = serde_json::to_string(name.as_ref()).unwrap_or_default();
                let owner = if self.in_component() { ", this" } else { "" };
                let text = if call.arguments.is_empty() {
                    format!("'', {name}{owner}")
                } else {
                    format!(", {name}{owner}")
                };
                self.append_arguments(call, text);
            }
        }
        walk::walk_property_definition(self, prop);
    }

    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if call.arguments.is_empty() && self.is_helper(&call.callee, REF) {
            if let Some(ty) = call.type_arguments.as_ref().and_then(|t| t.params.first()) {
                let value = self.defaults.default_value(ty, 0);
                tracing::debug!(file = self.ctx.file, value = %value, "initialized ref");
                self.append_arguments(call, value);
            }
        }
        walk::walk_call_expression(self, call);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEFAULT VALUES
// ═══════════════════════════════════════════════════════════════════════════════

enum LocalType<'s, 'a> {
    Interface(&'s TSInterfaceDeclaration<'a>),
    Alias(&'s TSTypeAliasDeclaration<'a>),
}

/// Interfaces and type aliases declared at the top level of the file.
fn local_types<'s, 'a>(program: &'s Program<'a>) -> HashMap<&'s str, LocalType<'s, 'a>> {
    let mut types = HashMap::new();
    let mut add = |decl: &'s Declaration<'a>| match decl {
        Declaration::TSInterfaceDeclaration(i) => {
            types.insert(i.id.name.as_str(), LocalType::Interface(i));
        }
        Declaration::TSTypeAliasDeclaration(a) => {
            types.insert(a.id.name.as_str(), LocalType::Alias(a));
        }
        _ => {}
    };
    for stmt in &program.body {
        match stmt {
            Statement::ExportNamedDeclaration(export) => {
                if let Some(decl) = &export.declaration {
                    add(decl);
                }
            }
            other => {
                if let Some(decl) = other.as_declaration() {
                    add(decl);
                }
            }
        }
    }
    types
}

struct TypeDefaults<'c, 's, 'a> {
    locals: &'c HashMap<&'s str, LocalType<'s, 'a>>,
}

impl<'a> TypeDefaults<'_, '_, 'a> {
    fn default_value(&self, ty: &TSType<'a>, depth: usize) -> String {
        match ty {
            TSType::TSStringKeyword(_) => "\"\"".to_string(),
            TSType::TSNumberKeyword(_) => "0".to_string(),
            TSType::TSBooleanKeyword(_) => "false".to_string(),
            TSType::TSArrayType(_) | TSType::TSTupleType(_) => "[]".to_string(),
            TSType::TSTypeLiteral(literal) if depth < MAX_DEPTH => self.object(&literal.members, depth),
            TSType::TSTypeReference(reference) => self.reference(reference, depth),
            _ => "null".to_string(),
        }
    }

    fn reference(&self, reference: &TSTypeReference<'a>, depth: usize) -> String {
        let TSTypeName::IdentifierReference(id) = &reference.type_name else {
            return "null".to_string();
        };
        match id.name.as_str() {
            "Array" | "ReadonlyArray" => "[]".to_string(),
            "Set" => "new Set()".to_string(),
            "Map" => "new Map()".to_string(),
            "Record" | "Partial" | "Readonly" => "{}".to_string(),
            "Date" => "new Date()".to_string(),
            name => match self.locals.get(name) {
                // Interfaces expand only as the container's own type.
                Some(LocalType::Interface(decl)) if depth == 0 => self.object(&decl.body.body, depth),
                Some(LocalType::Alias(alias)) if depth < MAX_DEPTH => {
                    self.default_value(&alias.type_annotation, depth)
                }
                _ => "null".to_string(),
            },
        }
    }

    fn object(&self, members: &[TSSignature<'a>], depth: usize) -> String {
        let entries: Vec<String> = members
            .iter()
            .filter_map(|member| {
                let TSSignature::TSPropertySignature(prop) = member else {
                    return None;
                };
                let key = prop.key.static_name()?;
                let value = prop
                    .type_annotation
                    .as_ref()
                    .map(|t| self.default_value(&t.type_annotation, depth + 1))
                    .unwrap_or_else(|| "null".to_string());
                Some(format!("{}: {}", property_key(&key), value))
            })
            .collect();
        if entries.is_empty() {
            "{}".to_string()
        } else {
            format!("{{ {} }}", entries.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::diagnostics::Diagnostics;
    use crate::parse::run_pass;
    use std::path::Path;

    fn compile(source: &str, components: &[&str]) -> String {
        let settings = CompilerConfig::default().compile().unwrap();
        let components: HashSet<String> = components.iter().map(|c| c.to_string()).collect();
        let mut diags = Diagnostics::new();
        run_pass(Path::new("state.ts"), source, &settings, &mut diags, |ctx| {
            compile_reactive_init(ctx, &components)
        })
        .unwrap()
        .0
    }

    const IMPORT: &str = "import { ref, refProperty } from \"typecomposer\";\n";

    #[test]
    fn test_ref_defaults_by_type() {
        let out = compile(
            &format!(
                "{IMPORT}const a = ref<string>();\nconst b = ref<number[]>();\nconst c = ref<Map<string, number>>();\nconst d = ref<Date>();\nconst e = ref<HTMLElement>();"
            ),
            &[],
        );
        assert!(out.contains("ref<string>(\"\")"));
        assert!(out.contains("ref<number[]>([])"));
        assert!(out.contains("ref<Map<string, number>>(new Map())"));
        assert!(out.contains("ref<Date>(new Date())"));
        assert!(out.contains("ref<HTMLElement>(null)"));
    }

    #[test]
    fn test_ref_default_expands_local_interface() {
        let out = compile(
            &format!("{IMPORT}interface User {{ name: string; age: number; tags: Set<string> }}\nconst u = ref<User>();"),
            &[],
        );
        assert!(out.contains("ref<User>({ name: \"\", age: 0, tags: new Set() })"));
    }

    #[test]
    fn test_ref_with_value_and_local_ref_are_untouched() {
        let source = format!("{IMPORT}const a = ref<number>(5);\nfunction f(ref: <U>() => U) {{ return ref<number>(); }}");
        assert_eq!(compile(&source, &[]), source);
    }

    #[test]
    fn test_ref_property_gets_name_and_owner() {
        let source = format!(
            "{IMPORT}class Card extends Component {{\n  title = refProperty(\"x\");\n  empty = refProperty();\n}}\nclass Model {{\n  count = refProperty(0);\n}}"
        );
        let out = compile(&source, &["Card"]);
        assert!(out.contains("title = refProperty(\"x\", \"title\", this)"));
        assert!(out.contains("empty = refProperty('', \"empty\", this)"));
        assert!(out.contains("count = refProperty(0, \"count\")"));
        assert_eq!(compile(&out, &["Card"]), out);
    }
}
