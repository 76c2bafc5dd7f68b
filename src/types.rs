//! Reactive container classification.
//!
//! Whether an expression reads a reactive container is decided by the module
//! that declares its type, never by its name. A local variable called `ref`
//! is just a variable.
//!
//! Type information comes from a [`TypeProvider`]. The crate ships
//! [`SemanticTypeProvider`], which derives static types from declarations,
//! annotations and imports using oxc's semantic model. Classification runs in
//! two phases: a cheap name pre-filter (`may_be_reactive`) and then the
//! authoritative type lookup.

use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_semantic::Scoping;
use oxc_span::{GetSpan, Span};
use oxc_syntax::symbol::SymbolId;
use std::collections::{HashMap, HashSet};

use crate::config::{CompilerSettings, ModuleMatcher};
use crate::diagnostics::DIAG_TYPE_UNRESOLVED;

// ═══════════════════════════════════════════════════════════════════════════════
// STATIC TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeShape {
    /// A nominal instance (class instance, container object).
    Instance,
    /// A structural object-literal type. Never reactive.
    ObjectLiteral,
    Primitive,
    /// A function, constructor or imported binding used as a value.
    Callable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticType {
    pub text: String,
    /// Module the type's symbol is declared in, when traceable.
    pub declared_in: Option<String>,
    pub shape: TypeShape,
}

impl StaticType {
    fn primitive(text: &str) -> Self {
        StaticType {
            text: text.to_string(),
            declared_in: None,
            shape: TypeShape::Primitive,
        }
    }

    fn object_literal() -> Self {
        StaticType {
            text: "{}".to_string(),
            declared_in: None,
            shape: TypeShape::ObjectLiteral,
        }
    }

    fn local(text: &str, shape: TypeShape) -> Self {
        StaticType {
            text: text.to_string(),
            declared_in: None,
            shape,
        }
    }
}

/// Static type information for expressions of one parsed file.
pub trait TypeProvider {
    /// The static type of `expr`, or `None` when it cannot be determined.
    fn type_of(&self, expr: &Expression<'_>) -> Option<StaticType>;

    /// Cheap syntactic pre-filter. Returning `false` means no binding or
    /// property named `name` can hold a reactive container.
    fn may_be_reactive(&self, name: &str) -> bool {
        let _ = name;
        true
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLASSIFIER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct TypeClassifier<'p> {
    provider: &'p dyn TypeProvider,
    modules: &'p ModuleMatcher,
    file: &'p str,
}

impl<'p> TypeClassifier<'p> {
    pub fn new(provider: &'p dyn TypeProvider, modules: &'p ModuleMatcher, file: &'p str) -> Self {
        Self {
            provider,
            modules,
            file,
        }
    }

    /// Whether `expr` evaluates to a reactive container.
    pub fn is_reactive(&self, expr: &Expression<'_>) -> bool {
        let Some(name) = name_hint(expr) else {
            return false;
        };
        if !self.provider.may_be_reactive(name) {
            return false;
        }
        match self.provider.type_of(expr) {
            Some(ty) => self.is_reactive_type(&ty),
            None => {
                tracing::debug!(
                    code = DIAG_TYPE_UNRESOLVED,
                    file = self.file,
                    offset = expr.span().start,
                    "no static type for `{}`, treating as non-reactive",
                    name
                );
                false
            }
        }
    }

    pub fn is_reactive_type(&self, ty: &StaticType) -> bool {
        if ty.shape != TypeShape::Instance {
            return false;
        }
        ty.declared_in
            .as_deref()
            .is_some_and(|module| self.modules.is_recognized(module))
    }

    /// Whether `expr` is the reactive-module function `name` (e.g. `computed`).
    pub fn is_reactive_callable(&self, expr: &Expression<'_>, name: &str) -> bool {
        let Expression::Identifier(id) = strip(expr) else {
            return false;
        };
        if id.name != name {
            return false;
        }
        self.provider.type_of(expr).is_some_and(|ty| {
            ty.shape == TypeShape::Callable
                && ty
                    .declared_in
                    .as_deref()
                    .is_some_and(|m| self.modules.is_reactive_module(m))
        })
    }
}

/// The name the pre-filter keys on: an identifier, or a member's property.
fn name_hint<'e>(expr: &'e Expression<'_>) -> Option<&'e str> {
    match strip(expr) {
        Expression::Identifier(id) => Some(id.name.as_str()),
        Expression::StaticMemberExpression(m) => Some(m.property.name.as_str()),
        _ => None,
    }
}

/// Peel parentheses and non-null assertions.
pub fn strip<'e, 'a>(expr: &'e Expression<'a>) -> &'e Expression<'a> {
    match expr {
        Expression::ParenthesizedExpression(p) => strip(&p.expression),
        Expression::TSNonNullExpression(e) => strip(&e.expression),
        _ => expr,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SEMANTIC TYPE PROVIDER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct ClassFacts {
    name: Option<String>,
    span: Span,
    properties: HashMap<String, StaticType>,
}

/// Static types derived from one file's declarations.
///
/// - imports take their declaring module from the re-export table
/// - `const x = ref(0)` and `new X()` are instances of the callee's module
/// - annotations resolve through imported type names
/// - class properties answer `this.<name>` inside the class body, and
///   `x.<name>` when `x` is an instance of a class declared in the file
/// - properties of `const s = { n: ref(0) }` answer `s.n`
pub struct SemanticTypeProvider<'s> {
    scoping: &'s Scoping,
    symbols: HashMap<SymbolId, StaticType>,
    object_members: HashMap<SymbolId, HashMap<String, StaticType>>,
    classes: Vec<ClassFacts>,
    candidates: HashSet<String>,
}

impl<'s> SemanticTypeProvider<'s> {
    pub fn build(program: &Program<'_>, scoping: &'s Scoping, settings: &CompilerSettings) -> Self {
        let mut collector = FactCollector {
            scoping,
            settings,
            symbols: HashMap::new(),
            names: HashMap::new(),
            object_members: HashMap::new(),
            classes: vec![],
        };
        collector.visit_program(program);

        let modules = &settings.modules;
        let reactive = |ty: &StaticType| {
            ty.shape == TypeShape::Instance
                && ty.declared_in.as_deref().is_some_and(|m| modules.is_recognized(m))
        };

        let mut candidates = HashSet::new();
        for (symbol, ty) in &collector.symbols {
            if reactive(ty) {
                if let Some(name) = collector.names.get(symbol) {
                    candidates.insert(name.clone());
                }
            }
        }
        let members = collector
            .classes
            .iter()
            .map(|c| &c.properties)
            .chain(collector.object_members.values());
        for properties in members {
            for (name, ty) in properties {
                if reactive(ty) {
                    candidates.insert(name.clone());
                }
            }
        }

        Self {
            scoping,
            symbols: collector.symbols,
            object_members: collector.object_members,
            classes: collector.classes,
            candidates,
        }
    }

    fn member_type(&self, member: &StaticMemberExpression<'_>) -> Option<StaticType> {
        let name = member.property.name.as_str();
        match strip(&member.object) {
            Expression::ThisExpression(_) => self.this_property(member.span, name),
            Expression::Identifier(id) => {
                let symbol = resolve(self.scoping, id)?;
                if let Some(members) = self.object_members.get(&symbol) {
                    return members.get(name).cloned();
                }
                self.class_property(self.symbols.get(&symbol)?, name)
            }
            Expression::StaticMemberExpression(inner) => {
                let owner = self.member_type(inner)?;
                self.class_property(&owner, name)
            }
            _ => None,
        }
    }

    /// Property `name` of an instance of a class declared in this file.
    fn class_property(&self, owner: &StaticType, name: &str) -> Option<StaticType> {
        if owner.shape != TypeShape::Instance || owner.declared_in.is_some() {
            return None;
        }
        self.classes
            .iter()
            .find(|c| c.name.as_deref() == Some(owner.text.as_str()))
            .and_then(|c| c.properties.get(name).cloned())
    }

    fn this_property(&self, span: Span, name: &str) -> Option<StaticType> {
        self.classes
            .iter()
            .filter(|c| c.span.start <= span.start && span.end <= c.span.end)
            .min_by_key(|c| c.span.end - c.span.start)
            .and_then(|c| c.properties.get(name).cloned())
    }
}

impl TypeProvider for SemanticTypeProvider<'_> {
    fn type_of(&self, expr: &Expression<'_>) -> Option<StaticType> {
        match strip(expr) {
            Expression::Identifier(id) => {
                let symbol = resolve(self.scoping, id)?;
                self.symbols.get(&symbol).cloned()
            }
            Expression::StaticMemberExpression(m) => self.member_type(m),
            Expression::ObjectExpression(_) => Some(StaticType::object_literal()),
            other => literal_type(other),
        }
    }

    fn may_be_reactive(&self, name: &str) -> bool {
        self.candidates.contains(name)
    }
}

pub fn resolve(scoping: &Scoping, id: &IdentifierReference<'_>) -> Option<SymbolId> {
    let reference = id.reference_id.get()?;
    scoping.get_reference(reference).symbol_id()
}

/// `new Store()` where `Store` is not an imported binding.
fn local_instance(callee: &Expression<'_>) -> Option<StaticType> {
    match strip(callee) {
        Expression::Identifier(id) => Some(StaticType::local(&id.name, TypeShape::Instance)),
        _ => None,
    }
}

fn literal_type(expr: &Expression<'_>) -> Option<StaticType> {
    match expr {
        Expression::StringLiteral(_) | Expression::TemplateLiteral(_) => {
            Some(StaticType::primitive("string"))
        }
        Expression::NumericLiteral(_) => Some(StaticType::primitive("number")),
        Expression::BooleanLiteral(_) => Some(StaticType::primitive("boolean")),
        Expression::NullLiteral(_) => Some(StaticType::primitive("null")),
        Expression::ArrayExpression(_) => Some(StaticType::local("Array", TypeShape::Instance)),
        Expression::ArrowFunctionExpression(_) | Expression::FunctionExpression(_) => {
            Some(StaticType::local("Function", TypeShape::Callable))
        }
        _ => None,
    }
}

struct FactCollector<'s, 'c> {
    scoping: &'s Scoping,
    settings: &'c CompilerSettings,
    symbols: HashMap<SymbolId, StaticType>,
    names: HashMap<SymbolId, String>,
    object_members: HashMap<SymbolId, HashMap<String, StaticType>>,
    classes: Vec<ClassFacts>,
}

impl FactCollector<'_, '_> {
    fn record(&mut self, id: &BindingIdentifier<'_>, ty: Option<StaticType>) {
        if let (Some(symbol), Some(ty)) = (id.symbol_id.get(), ty) {
            self.names.insert(symbol, id.name.to_string());
            self.symbols.insert(symbol, ty);
        }
    }

    fn lookup(&self, id: &IdentifierReference<'_>) -> Option<StaticType> {
        let symbol = resolve(self.scoping, id)?;
        self.symbols.get(&symbol).cloned()
    }

    fn infer_expression(&self, expr: &Expression<'_>) -> Option<StaticType> {
        match strip(expr) {
            Expression::CallExpression(call) => self.instance_of(&call.callee),
            Expression::NewExpression(new) => self
                .instance_of(&new.callee)
                .or_else(|| local_instance(&new.callee)),
            Expression::ObjectExpression(_) => Some(StaticType::object_literal()),
            Expression::Identifier(id) => self.lookup(id),
            Expression::TSAsExpression(e) => self.infer_annotation(&e.type_annotation),
            Expression::TSSatisfiesExpression(e) => self.infer_expression(&e.expression),
            other => literal_type(other),
        }
    }

    /// The type produced by calling or constructing `callee`.
    fn instance_of(&self, callee: &Expression<'_>) -> Option<StaticType> {
        let Expression::Identifier(id) = strip(callee) else {
            return None;
        };
        let callee_type = self.lookup(id)?;
        // Only imported bindings carry a declaring module worth following.
        if callee_type.shape != TypeShape::Callable {
            return None;
        }
        Some(StaticType {
            text: format!("ReturnType<typeof {}>", id.name),
            declared_in: callee_type.declared_in,
            shape: TypeShape::Instance,
        })
    }

    fn record_members(&mut self, id: &BindingIdentifier<'_>, object: &ObjectExpression<'_>) {
        let Some(symbol) = id.symbol_id.get() else {
            return;
        };
        let mut members = HashMap::new();
        for prop in &object.properties {
            let ObjectPropertyKind::ObjectProperty(p) = prop else {
                continue;
            };
            if let (Some(name), Some(ty)) = (p.key.static_name(), self.infer_expression(&p.value)) {
                members.insert(name.to_string(), ty);
            }
        }
        self.object_members.insert(symbol, members);
    }

    fn infer_annotation(&self, ty: &TSType<'_>) -> Option<StaticType> {
        match ty {
            TSType::TSTypeReference(r) => match &r.type_name {
                TSTypeName::IdentifierReference(id) => {
                    let declared_in = self.lookup(id).and_then(|t| t.declared_in);
                    Some(StaticType {
                        text: id.name.to_string(),
                        declared_in,
                        shape: TypeShape::Instance,
                    })
                }
                _ => None,
            },
            TSType::TSTypeLiteral(_) => Some(StaticType::object_literal()),
            TSType::TSStringKeyword(_) => Some(StaticType::primitive("string")),
            TSType::TSNumberKeyword(_) => Some(StaticType::primitive("number")),
            TSType::TSBooleanKeyword(_) => Some(StaticType::primitive("boolean")),
            TSType::TSArrayType(_) => Some(StaticType::local("Array", TypeShape::Instance)),
            TSType::TSFunctionType(_) => Some(StaticType::local("Function", TypeShape::Callable)),
            _ => None,
        }
    }

    fn declared_type(
        &self,
        annotation: Option<&TSTypeAnnotation<'_>>,
        init: Option<&Expression<'_>>,
    ) -> Option<StaticType> {
        annotation
            .and_then(|a| self.infer_annotation(&a.type_annotation))
            .or_else(|| init.and_then(|e| self.infer_expression(e)))
    }
}

impl<'a> Visit<'a> for FactCollector<'_, '_> {
    fn visit_import_declaration(&mut self, decl: &ImportDeclaration<'a>) {
        let source = decl.source.value.as_str();
        let Some(specifiers) = &decl.specifiers else {
            return;
        };
        for specifier in specifiers {
            let (imported, local) = match specifier {
                ImportDeclarationSpecifier::ImportSpecifier(s) => (s.imported.name().to_string(), &s.local),
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => ("default".to_string(), &s.local),
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => ("*".to_string(), &s.local),
            };
            let ty = StaticType {
                text: format!("typeof import(\"{source}\").{imported}"),
                declared_in: Some(self.settings.declaring_module(source, &imported)),
                shape: TypeShape::Callable,
            };
            self.record(local, Some(ty));
        }
    }

    fn visit_variable_declarator(&mut self, decl: &VariableDeclarator<'a>) {
        if let BindingPattern::BindingIdentifier(id) = &decl.id {
            let ty = self.declared_type(decl.type_annotation.as_deref(), decl.init.as_ref());
            self.record(id, ty);
            if let Some(Expression::ObjectExpression(object)) = decl.init.as_ref().map(strip) {
                self.record_members(id, object);
            }
        }
        walk::walk_variable_declarator(self, decl);
    }

    fn visit_formal_parameter(&mut self, param: &FormalParameter<'a>) {
        if let BindingPattern::BindingIdentifier(id) = &param.pattern {
            let ty = self.declared_type(param.type_annotation.as_deref(), None);
            self.record(id, ty);
        }
        walk::walk_formal_parameter(self, param);
    }

    fn visit_class(&mut self, class: &Class<'a>) {
        let mut facts = ClassFacts {
            name: class.id.as_ref().map(|id| id.name.to_string()),
            span: class.span,
            properties: HashMap::new(),
        };
        for element in &class.body.body {
            let ClassElement::PropertyDefinition(prop) = element else {
                continue;
            };
            if prop.r#static {
                continue;
            }
            let Some(name) = prop.key.static_name() else {
                continue;
            };
            let ty = self.declared_type(prop.type_annotation.as_deref(), prop.value.as_ref());
            if let Some(ty) = ty {
                facts.properties.insert(name.to_string(), ty);
            }
        }
        self.classes.push(facts);
        walk::walk_class(self, class);
    }
}
