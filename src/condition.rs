//! Condition compilation.
//!
//! A ternary or `&&` / `||` expression placed as dynamic template content is
//! wrapped in a computed closure when it reads a reactive container:
//!
//! ```text
//! {open ? <Panel/> : <Placeholder/>}
//! {computed((_c__tc_) => (_c__tc_.put(open) ? <Panel/> : <Placeholder/>))}
//! ```
//!
//! The expression text is kept as written, so branch structure and operator
//! semantics are unchanged. Expressions with no reactive read are left alone.

use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_span::GetSpan;
use oxc_syntax::operator::LogicalOperator;

use crate::capture::{collect_region, identity_edits, CaptureContext, ReactiveExpression};
use crate::diagnostics::CompileError;
use crate::parse::PassContext;
use crate::rewrite::Edit;
use crate::types::strip;

pub fn compile_conditions(ctx: &PassContext<'_, '_>) -> Result<Vec<Edit>, CompileError> {
    let mut sites = ConditionSites { ctx, edits: vec![] };
    sites.visit_program(ctx.program);
    Ok(sites.edits)
}

pub fn is_condition(expr: &Expression<'_>) -> bool {
    match strip(expr) {
        Expression::ConditionalExpression(_) => true,
        Expression::LogicalExpression(logical) => {
            matches!(logical.operator, LogicalOperator::And | LogicalOperator::Or)
        }
        _ => false,
    }
}

/// `onClick`, `onInput`, ... carry handlers, not content.
pub fn is_event_handler(name: &str) -> bool {
    name.len() > 2 && name.starts_with("on") && name[2..].starts_with(|c: char| c.is_ascii_uppercase())
}

/// Compile one condition. Returns `None` when it reads nothing reactive.
pub fn compile_condition<'s, 'a>(
    ctx: &PassContext<'s, 'a>,
    expr: &Expression<'a>,
) -> Option<(Vec<Edit>, ReactiveExpression)> {
    let region = collect_region(ctx, expr, true);
    if region.deps.is_empty() {
        return None;
    }

    let runtime = ctx.settings.runtime();
    let capture = CaptureContext::fresh(ctx.source, runtime);
    let (prefix, suffix) = capture.computed_wrap(runtime);

    let mut edits = vec![Edit::wrap(expr.span(), prefix, suffix)];
    edits.extend(region.deps.iter().map(|dep| capture.dependency_edit(dep)));
    edits.extend(identity_edits(ctx, expr, &capture, &region.nested_loops));

    let compiled = ReactiveExpression::new(ctx.text(expr.span()), &capture.key, &region.deps);
    Some((edits, compiled))
}

struct ConditionSites<'c, 's, 'a> {
    ctx: &'c PassContext<'s, 'a>,
    edits: Vec<Edit>,
}

impl<'a> Visit<'a> for ConditionSites<'_, '_, 'a> {
    fn visit_jsx_expression_container(&mut self, container: &JSXExpressionContainer<'a>) {
        if let Some(expr) = container.expression.as_expression() {
            if is_condition(expr) {
                if let Some((edits, compiled)) = compile_condition(self.ctx, expr) {
                    tracing::debug!(
                        file = self.ctx.file,
                        key = %compiled.key,
                        captured = ?compiled.captured,
                        "compiled condition"
                    );
                    self.edits.extend(edits);
                    return;
                }
            }
        }
        walk::walk_jsx_expression_container(self, container);
    }

    fn visit_jsx_attribute(&mut self, attr: &JSXAttribute<'a>) {
        let handler = matches!(&attr.name, JSXAttributeName::Identifier(id) if is_event_handler(&id.name));
        if !handler {
            walk::walk_jsx_attribute(self, attr);
            return;
        }
        if let Some(JSXAttributeValue::ExpressionContainer(container)) = &attr.value {
            if let Some(expr) = container.expression.as_expression() {
                self.visit_expression(expr);
            }
        }
    }
}
