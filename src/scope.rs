//! Binding collection.
//!
//! A compiled closure must never capture its own locals: anything bound by a
//! parameter or declaration inside the closure is excluded from its
//! dependencies, including names that shadow an outer reactive container.

use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_span::Span;
use oxc_syntax::scope::ScopeFlags;
use std::collections::HashSet;

/// Collects every name bound anywhere inside the visited node.
pub struct BindingCollector<'a> {
    pub symbols: &'a mut HashSet<String>,
}

impl<'a, 'b> Visit<'b> for BindingCollector<'a> {
    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'b>) {
        self.symbols.insert(ident.name.to_string());
    }

    fn visit_function(&mut self, func: &Function<'b>, flags: ScopeFlags) {
        if let Some(id) = &func.id {
            self.symbols.insert(id.name.to_string());
        }
        walk::walk_function(self, func, flags);
    }

    fn visit_class(&mut self, class: &Class<'b>) {
        if let Some(id) = &class.id {
            self.symbols.insert(id.name.to_string());
        }
        walk::walk_class(self, class);
    }
}

/// Names bound inside `expr` (arrow parameters, nested declarations, ...).
pub fn bound_names_in_expression(expr: &Expression<'_>) -> HashSet<String> {
    let mut symbols = HashSet::new();
    BindingCollector {
        symbols: &mut symbols,
    }
    .visit_expression(expr);
    symbols
}

/// Parameters and local declarations of a function literal.
pub fn bound_names_in_function(func: &FunctionLiteral<'_, '_>) -> HashSet<String> {
    let mut symbols = HashSet::new();
    let mut collector = BindingCollector {
        symbols: &mut symbols,
    };
    match func {
        FunctionLiteral::Arrow(arrow) => {
            collector.visit_formal_parameters(&arrow.params);
            collector.visit_function_body(&arrow.body);
        }
        FunctionLiteral::Function(f) => {
            collector.visit_formal_parameters(&f.params);
            if let Some(body) = &f.body {
                collector.visit_function_body(body);
            }
        }
    }
    symbols
}

pub fn collect_binding_names(pattern: &BindingPattern<'_>, names: &mut HashSet<String>) {
    match pattern {
        BindingPattern::BindingIdentifier(id) => {
            names.insert(id.name.to_string());
        }
        BindingPattern::ObjectPattern(obj) => {
            for prop in &obj.properties {
                collect_binding_names(&prop.value, names);
            }
            if let Some(rest) = &obj.rest {
                collect_binding_names(&rest.argument, names);
            }
        }
        BindingPattern::ArrayPattern(arr) => {
            for elem in arr.elements.iter().flatten() {
                collect_binding_names(elem, names);
            }
            if let Some(rest) = &arr.rest {
                collect_binding_names(&rest.argument, names);
            }
        }
        BindingPattern::AssignmentPattern(assign) => {
            collect_binding_names(&assign.left, names);
        }
    }
}

/// Names declared at module level: imports, variables, functions, classes.
pub fn module_bindings(program: &Program<'_>) -> HashSet<String> {
    let mut names = HashSet::new();
    for stmt in &program.body {
        match stmt {
            Statement::ImportDeclaration(decl) => {
                for specifier in decl.specifiers.iter().flatten() {
                    let local = match specifier {
                        ImportDeclarationSpecifier::ImportSpecifier(s) => &s.local,
                        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => &s.local,
                        ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => &s.local,
                    };
                    names.insert(local.name.to_string());
                }
            }
            Statement::VariableDeclaration(decl) => {
                for d in &decl.declarations {
                    collect_binding_names(&d.id, &mut names);
                }
            }
            Statement::FunctionDeclaration(func) => {
                if let Some(id) = &func.id {
                    names.insert(id.name.to_string());
                }
            }
            Statement::ClassDeclaration(class) => {
                if let Some(id) = &class.id {
                    names.insert(id.name.to_string());
                }
            }
            Statement::ExportNamedDeclaration(export) => match &export.declaration {
                Some(Declaration::VariableDeclaration(decl)) => {
                    for d in &decl.declarations {
                        collect_binding_names(&d.id, &mut names);
                    }
                }
                Some(Declaration::FunctionDeclaration(func)) => {
                    if let Some(id) = &func.id {
                        names.insert(id.name.to_string());
                    }
                }
                Some(Declaration::ClassDeclaration(class)) => {
                    if let Some(id) = &class.id {
                        names.insert(id.name.to_string());
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }
    names
}

/// End offset of the last top-level import, where generated imports go.
pub fn import_insertion_point(program: &Program<'_>) -> u32 {
    program
        .body
        .iter()
        .filter_map(|stmt| match stmt {
            Statement::ImportDeclaration(decl) => Some(decl.span.end),
            _ => None,
        })
        .max()
        .unwrap_or(0)
}

// ═══════════════════════════════════════════════════════════════════════════════
// FUNCTION LITERALS
// ═══════════════════════════════════════════════════════════════════════════════

/// An arrow function or function expression, the closures capture works on.
pub enum FunctionLiteral<'e, 'a> {
    Arrow(&'e ArrowFunctionExpression<'a>),
    Function(&'e Function<'a>),
}

impl<'e, 'a> FunctionLiteral<'e, 'a> {
    pub fn from_expression(expr: &'e Expression<'a>) -> Option<Self> {
        match crate::types::strip(expr) {
            Expression::ArrowFunctionExpression(arrow) => Some(FunctionLiteral::Arrow(arrow)),
            Expression::FunctionExpression(func) => Some(FunctionLiteral::Function(func)),
            _ => None,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            FunctionLiteral::Arrow(a) => a.span,
            FunctionLiteral::Function(f) => f.span,
        }
    }

    pub fn params(&self) -> &'e FormalParameters<'a> {
        match self {
            FunctionLiteral::Arrow(a) => &a.params,
            FunctionLiteral::Function(f) => &f.params,
        }
    }

    /// Name of the first parameter, when it is a plain identifier.
    pub fn first_param(&self) -> Option<&'e str> {
        let param = self.params().items.first()?;
        match &param.pattern {
            BindingPattern::BindingIdentifier(id) => Some(id.name.as_str()),
            _ => None,
        }
    }

    pub fn visit_body<V: Visit<'a>>(&self, visitor: &mut V) {
        match self {
            FunctionLiteral::Arrow(a) => visitor.visit_function_body(&a.body),
            FunctionLiteral::Function(f) => {
                if let Some(body) = &f.body {
                    visitor.visit_function_body(body);
                }
            }
        }
    }
}
