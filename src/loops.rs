//! Loop compilation.
//!
//! `collection.map(callback)` inside template content, where `collection` is
//! a reactive container, becomes a computed closure that re-runs when the
//! collection changes:
//!
//! ```text
//! {items.map((i) => <li key={i.id}>{i.label}</li>)}
//! {computed((_c__tc_) => (_c__tc_.put(items).map((i) => <li key={_c__tc_.cache(i.id)}>{i.label}</li>)))}
//! ```
//!
//! Exactly one reference is tracked: the first external one discovered,
//! which is the iterated collection itself. Other reactive reads inside the
//! callback do not re-trigger the loop. The callback's parameters are never
//! touched.

use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_span::Span;
use std::collections::HashSet;

use crate::capture::{collect_region, identity_edits, CaptureContext, DependencyCollector, ReactiveExpression};
use crate::diagnostics::CompileError;
use crate::parse::PassContext;
use crate::rewrite::Edit;
use crate::scope::BindingCollector;
use crate::types::strip;

pub fn compile_loops(ctx: &PassContext<'_, '_>) -> Result<Vec<Edit>, CompileError> {
    let mut sites = LoopSites {
        ctx,
        depth: 0,
        chained: HashSet::new(),
        edits: vec![],
    };
    sites.visit_program(ctx.program);
    Ok(sites.edits)
}

/// Compile one `.map` call. Returns `None` when its collection is not reactive.
pub fn compile_loop<'s, 'a>(
    ctx: &PassContext<'s, 'a>,
    call: &CallExpression<'a>,
) -> Option<(Vec<Edit>, ReactiveExpression)> {
    let mut locals = HashSet::new();
    BindingCollector {
        symbols: &mut locals,
    }
    .visit_call_expression(call);

    let mut collector = DependencyCollector::new(ctx, call.span, &locals);
    if !collector.is_reactive_loop(call) {
        return None;
    }
    collector.visit_call_expression(call);
    let tracked = collector.found.first()?.chain.clone();
    let occurrences: Vec<_> = collector
        .found
        .into_iter()
        .filter(|dep| dep.chain == tracked)
        .collect();

    let runtime = ctx.settings.runtime();
    let capture = CaptureContext::fresh(ctx.source, runtime);
    let (prefix, suffix) = capture.computed_wrap(runtime);

    let mut edits = vec![Edit::wrap(call.span, prefix, suffix)];
    edits.extend(occurrences.iter().map(|dep| capture.dependency_edit(dep)));
    for arg in &call.arguments {
        if let Some(expr) = arg.as_expression() {
            let nested = collect_region(ctx, expr, true).nested_loops;
            edits.extend(identity_edits(ctx, expr, &capture, &nested));
        }
    }

    let compiled = ReactiveExpression::new(ctx.text(call.span), &capture.key, &occurrences);
    Some((edits, compiled))
}

fn is_map_call(call: &CallExpression<'_>) -> bool {
    matches!(strip(&call.callee), Expression::StaticMemberExpression(m) if m.property.name == "map")
}

struct LoopSites<'c, 's, 'a> {
    ctx: &'c PassContext<'s, 'a>,
    /// Nesting depth of template expression containers.
    depth: usize,
    /// Calls whose result is accessed further (`items.map(f).slice(1)`).
    chained: HashSet<Span>,
    edits: Vec<Edit>,
}

impl LoopSites<'_, '_, '_> {
    fn note_chained(&mut self, object: &Expression<'_>) {
        if let Expression::CallExpression(call) = strip(object) {
            self.chained.insert(call.span);
        }
    }
}

impl<'a> Visit<'a> for LoopSites<'_, '_, 'a> {
    fn visit_jsx_expression_container(&mut self, container: &JSXExpressionContainer<'a>) {
        self.depth += 1;
        walk::walk_jsx_expression_container(self, container);
        self.depth -= 1;
    }

    fn visit_static_member_expression(&mut self, member: &StaticMemberExpression<'a>) {
        self.note_chained(&member.object);
        walk::walk_static_member_expression(self, member);
    }

    fn visit_computed_member_expression(&mut self, member: &ComputedMemberExpression<'a>) {
        self.note_chained(&member.object);
        walk::walk_computed_member_expression(self, member);
    }

    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if self.depth > 0 && is_map_call(call) && !self.chained.contains(&call.span) {
            if let Some((edits, compiled)) = compile_loop(self.ctx, call) {
                tracing::debug!(
                    file = self.ctx.file,
                    key = %compiled.key,
                    tracked = ?compiled.captured,
                    "compiled loop"
                );
                self.edits.extend(edits);
                return;
            }
        }
        walk::walk_call_expression(self, call);
    }
}
