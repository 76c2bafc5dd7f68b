//! Parsing and the per-pass context.
//!
//! Every rewrite pass starts from text: parse, build semantic information,
//! collect edits, render. Nothing from one pass's AST survives into the next.

use oxc_allocator::Allocator;
use oxc_ast::ast::{IdentifierReference, Program};
use oxc_parser::Parser;
use oxc_semantic::{Scoping, SemanticBuilder};
use oxc_span::{SourceType, Span};
use std::cell::RefCell;
use std::path::Path;

use crate::config::CompilerSettings;
use crate::diagnostics::{
    CompileError, Diagnostic, Diagnostics, Severity, DIAG_PASS_LIMIT,
};
use crate::rewrite::{self, Edit};
use crate::types::{self, SemanticTypeProvider, TypeClassifier};

pub fn source_type_for(path: &Path) -> SourceType {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let typescript = matches!(ext, "ts" | "tsx" | "mts" | "cts");
    SourceType::default()
        .with_typescript(typescript)
        .with_module(true)
        .with_jsx(ext != "mts" && ext != "cts")
}

pub fn is_script_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("ts" | "tsx" | "js" | "jsx" | "mts" | "mjs")
    ) && !path.to_string_lossy().ends_with(".d.ts")
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

pub struct PassContext<'s, 'a> {
    pub source: &'s str,
    pub file: &'s str,
    pub program: &'s Program<'a>,
    pub scoping: &'s Scoping,
    pub classifier: TypeClassifier<'s>,
    pub settings: &'s CompilerSettings,
    diagnostics: RefCell<Vec<Diagnostic>>,
}

impl<'s, 'a> PassContext<'s, 'a> {
    pub fn text(&self, span: Span) -> &'s str {
        rewrite::text_of(self.source, span)
    }

    pub fn report(&self, code: &str, severity: Severity, message: &str, offset: u32) {
        let diagnostic = Diagnostic::new(code, severity, message, self.file).at(self.source, offset);
        self.diagnostics.borrow_mut().push(diagnostic);
    }

    /// Whether the symbol `id` refers to is declared inside `region`.
    pub fn is_declared_within(&self, id: &IdentifierReference<'_>, region: Span) -> bool {
        types::resolve(self.scoping, id).is_some_and(|symbol| {
            let span = self.scoping.symbol_span(symbol);
            region.start <= span.start && span.end <= region.end
        })
    }

    pub fn is_capture_key(&self, name: &str) -> bool {
        self.settings.is_capture_key(name)
    }
}

/// Parse `source`, build its semantic model and hand a [`PassContext`] to `f`.
pub fn with_program<T>(
    path: &Path,
    source: &str,
    settings: &CompilerSettings,
    f: impl FnOnce(&PassContext<'_, '_>) -> Result<T, CompileError>,
) -> Result<(T, Vec<Diagnostic>), CompileError> {
    let file = path.to_string_lossy();
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, source_type_for(path)).parse();
    if let Some(error) = ret.errors.first() {
        return Err(CompileError::Parse {
            file: file.to_string(),
            message: error.to_string(),
            offset: 0,
        });
    }
    let program = ret.program;
    let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();
    let provider = SemanticTypeProvider::build(&program, &scoping, settings);

    let ctx = PassContext {
        source,
        file: &file,
        program: &program,
        scoping: &scoping,
        classifier: TypeClassifier::new(&provider, &settings.modules, &file),
        settings,
        diagnostics: RefCell::new(vec![]),
    };
    let value = f(&ctx)?;
    Ok((value, ctx.diagnostics.into_inner()))
}

/// Run one rewrite pass and render its edits. Returns the new text and
/// whether anything changed.
pub fn run_pass(
    path: &Path,
    source: &str,
    settings: &CompilerSettings,
    diagnostics: &mut Diagnostics,
    pass: impl FnOnce(&PassContext<'_, '_>) -> Result<Vec<Edit>, CompileError>,
) -> Result<(String, bool), CompileError> {
    let (edits, reported) = with_program(path, source, settings, pass)?;
    diagnostics.extend(reported);
    if edits.is_empty() {
        return Ok((source.to_string(), false));
    }
    let output = rewrite::apply(source, edits);
    let changed = output != source;
    Ok((output, changed))
}

/// Repeat `pass` until it stops producing edits. Nested regions only become
/// visible once their enclosing region has been rewritten.
pub fn run_until_stable(
    name: &str,
    path: &Path,
    source: String,
    settings: &CompilerSettings,
    diagnostics: &mut Diagnostics,
    pass: impl Fn(&PassContext<'_, '_>) -> Result<Vec<Edit>, CompileError>,
) -> Result<String, CompileError> {
    let mut current = source;
    for iteration in 0..settings.options.max_pass_iterations {
        let (next, changed) = run_pass(path, &current, settings, diagnostics, &pass)?;
        if !changed {
            tracing::debug!(pass = name, iterations = iteration, "pass settled");
            return Ok(next);
        }
        current = next;
    }
    diagnostics.report(Diagnostic::new(
        DIAG_PASS_LIMIT,
        Severity::Warning,
        &format!(
            "{name} pass did not settle after {} iterations",
            settings.options.max_pass_iterations
        ),
        &path.to_string_lossy(),
    ));
    Ok(current)
}
