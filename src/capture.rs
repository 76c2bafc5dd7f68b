//! Expression capture.
//!
//! Rewrites reads of reactive containers inside a closure so that each read
//! registers itself against a capture context:
//!
//! ```text
//! computed(() => this.count.value * 2)
//! computed((_c__tc_) => _c__tc_.put(this.count).value * 2)
//! ```
//!
//! Only the outermost expression that is itself a reactive container is
//! routed; accesses through it (`.value`, `.map(...)`) stay outside the call.
//! Names bound inside the closure are never dependencies, even when they
//! shadow an outer container.

use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_span::{GetSpan, Span};
use std::collections::HashSet;

use crate::config::RuntimeNames;
use crate::diagnostics::CompileError;
use crate::parse::PassContext;
use crate::rewrite::Edit;
use crate::scope::{bound_names_in_expression, bound_names_in_function, BindingCollector, FunctionLiteral};
use crate::types::{resolve, strip};

// ═══════════════════════════════════════════════════════════════════════════════
// CAPTURE CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

/// The identifier one compiled closure registers its reads against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureContext {
    pub key: String,
    track: String,
    cache: String,
}

impl CaptureContext {
    /// A key that does not occur anywhere in `source`.
    pub fn fresh(source: &str, runtime: &RuntimeNames) -> Self {
        Self::named(fresh_key(source, &runtime.capture_prefix), runtime)
    }

    pub fn named(key: impl Into<String>, runtime: &RuntimeNames) -> Self {
        Self {
            key: key.into(),
            track: runtime.track.clone(),
            cache: runtime.cache.clone(),
        }
    }

    pub fn track(&self, chain: &str) -> String {
        format!("{}.{}({})", self.key, self.track, chain)
    }

    /// Wraps an identity value in the context's memoization call.
    pub fn cache_wrap(&self) -> (String, String) {
        (format!("{}.{}(", self.key, self.cache), ")".to_string())
    }

    /// Wraps a whole region in a computed closure bound to this key.
    pub fn computed_wrap(&self, runtime: &RuntimeNames) -> (String, String) {
        (format!("{}(({}) => (", runtime.computed, self.key), "))".to_string())
    }

    pub fn dependency_edit(&self, dep: &Dependency) -> Edit {
        let routed = self.track(&dep.chain);
        if dep.shorthand {
            Edit::replace(dep.span, format!("{}: {}", dep.chain, routed))
        } else {
            Edit::replace(dep.span, routed)
        }
    }
}

/// `prefix`, then `prefix1_`, `prefix2_`, ... until absent from `source`.
pub fn fresh_key(source: &str, prefix: &str) -> String {
    let mut key = prefix.to_string();
    let mut i = 1;
    while source.contains(&key) {
        key = format!("{prefix}{i}_");
        i += 1;
    }
    key
}

/// One compiled closure: what it was, its key, and what it captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactiveExpression {
    pub original: String,
    pub key: String,
    pub captured: Vec<String>,
}

impl ReactiveExpression {
    pub fn new(original: &str, key: &str, deps: &[Dependency]) -> Self {
        let mut captured: Vec<String> = vec![];
        for dep in deps {
            if !captured.contains(&dep.chain) {
                captured.push(dep.chain.clone());
            }
        }
        Self {
            original: original.to_string(),
            key: key.to_string(),
            captured,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEPENDENCY COLLECTION
// ═══════════════════════════════════════════════════════════════════════════════

/// One occurrence of a reactive read inside a region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub span: Span,
    pub chain: String,
    /// `{ a }` object shorthand, which must be expanded to `{ a: ... }`.
    pub shorthand: bool,
}

pub struct DependencyCollector<'c, 's, 'a> {
    ctx: &'c PassContext<'s, 'a>,
    region: Span,
    locals: &'c HashSet<String>,
    receivers: HashSet<String>,
    skip_reactive_loops: bool,
    pub found: Vec<Dependency>,
    pub skipped_loops: Vec<Span>,
}

impl<'c, 's, 'a> DependencyCollector<'c, 's, 'a> {
    pub fn new(ctx: &'c PassContext<'s, 'a>, region: Span, locals: &'c HashSet<String>) -> Self {
        Self {
            ctx,
            region,
            locals,
            receivers: HashSet::new(),
            skip_reactive_loops: false,
            found: vec![],
            skipped_loops: vec![],
        }
    }

    /// Nested `.map` calls over reactive collections are compiled as their
    /// own regions and contribute nothing here.
    pub fn skipping_reactive_loops(mut self) -> Self {
        self.skip_reactive_loops = true;
        self
    }

    /// Treat `name` as a capture receiver whose calls are already routed.
    pub fn with_receiver(mut self, name: &str) -> Self {
        self.receivers.insert(name.to_string());
        self
    }

    /// Names bound in the region are candidates; the symbol they resolve to
    /// decides, so a nested shadow does not hide an outer read.
    fn is_local(&self, id: &IdentifierReference<'_>) -> bool {
        if !self.locals.contains(id.name.as_str()) {
            return false;
        }
        match resolve(self.ctx.scoping, id) {
            Some(_) => self.ctx.is_declared_within(id, self.region),
            None => true,
        }
    }

    fn is_receiver(&self, name: &str) -> bool {
        self.receivers.contains(name) || self.ctx.is_capture_key(name)
    }

    /// `K.put(...)` / `K.cache(...)` on a capture receiver.
    pub fn is_capture_call(&self, call: &CallExpression<'_>) -> bool {
        let runtime = self.ctx.settings.runtime();
        let Expression::StaticMemberExpression(member) = strip(&call.callee) else {
            return false;
        };
        let method = member.property.name.as_str();
        if method != runtime.track && method != runtime.cache {
            return false;
        }
        matches!(strip(&member.object), Expression::Identifier(id) if self.is_receiver(&id.name))
    }

    fn root_is_local(&self, expr: &Expression<'_>) -> bool {
        match strip(expr) {
            Expression::Identifier(id) => self.is_local(id),
            Expression::StaticMemberExpression(m) => self.root_is_local(&m.object),
            _ => false,
        }
    }

    fn try_record(&mut self, expr: &Expression<'_>, shorthand: bool) -> bool {
        if self.root_is_local(expr) {
            return false;
        }
        if let Expression::Identifier(id) = strip(expr) {
            if self.is_receiver(&id.name) {
                return false;
            }
        }
        if !self.ctx.classifier.is_reactive(expr) {
            return false;
        }
        let span = expr.span();
        self.found.push(Dependency {
            span,
            chain: self.ctx.text(span).to_string(),
            shorthand,
        });
        true
    }

    pub fn is_reactive_loop(&self, call: &CallExpression<'_>) -> bool {
        match strip(&call.callee) {
            Expression::StaticMemberExpression(m) if m.property.name == "map" => {
                !self.root_is_local(&m.object) && self.ctx.classifier.is_reactive(&m.object)
            }
            _ => false,
        }
    }
}

impl<'a> Visit<'a> for DependencyCollector<'_, '_, '_> {
    fn visit_expression(&mut self, expr: &Expression<'a>) {
        match expr {
            Expression::Identifier(_) | Expression::StaticMemberExpression(_) => {
                if self.try_record(expr, false) {
                    return;
                }
            }
            Expression::CallExpression(call) => {
                if self.is_capture_call(call) {
                    return;
                }
                if self.skip_reactive_loops && self.is_reactive_loop(call) {
                    self.skipped_loops.push(call.span);
                    return;
                }
            }
            _ => {}
        }
        walk::walk_expression(self, expr);
    }

    fn visit_object_property(&mut self, prop: &ObjectProperty<'a>) {
        if prop.shorthand {
            if let Expression::Identifier(_) = &prop.value {
                self.try_record(&prop.value, true);
                return;
            }
        }
        walk::walk_object_property(self, prop);
    }
}

/// Reactive reads of a template region, plus the nested loops that were
/// left for the loop compiler.
#[derive(Debug, Default)]
pub struct Region {
    pub deps: Vec<Dependency>,
    pub nested_loops: Vec<Span>,
}

pub fn collect_region<'s, 'a>(
    ctx: &PassContext<'s, 'a>,
    expr: &Expression<'a>,
    skip_reactive_loops: bool,
) -> Region {
    let locals = bound_names_in_expression(expr);
    let mut collector = DependencyCollector::new(ctx, expr.span(), &locals);
    if skip_reactive_loops {
        collector = collector.skipping_reactive_loops();
    }
    collector.visit_expression(expr);
    Region {
        deps: collector.found,
        nested_loops: collector.skipped_loops,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// IDENTITY ATTRIBUTES
// ═══════════════════════════════════════════════════════════════════════════════

/// Routes `key={...}` attributes inside a region through the region's
/// `cache` call, so recomputation reuses nodes by identity.
struct IdentityRouter<'c, 's, 'a> {
    ctx: &'c PassContext<'s, 'a>,
    capture: &'c CaptureContext,
    exclude: &'c [Span],
    edits: Vec<Edit>,
}

impl IdentityRouter<'_, '_, '_> {
    fn excluded(&self, span: Span) -> bool {
        self.exclude
            .iter()
            .any(|s| s.start <= span.start && span.end <= s.end)
    }

    fn already_routed(&self, expr: &Expression<'_>) -> bool {
        let Expression::CallExpression(call) = strip(expr) else {
            return false;
        };
        let Expression::StaticMemberExpression(member) = strip(&call.callee) else {
            return false;
        };
        member.property.name == self.ctx.settings.runtime().cache
            && matches!(strip(&member.object), Expression::Identifier(_))
    }
}

impl<'a> Visit<'a> for IdentityRouter<'_, '_, '_> {
    fn visit_jsx_attribute(&mut self, attr: &JSXAttribute<'a>) {
        let is_identity = matches!(&attr.name, JSXAttributeName::Identifier(id)
            if id.name == self.ctx.settings.options.identity_attribute);
        if !is_identity || self.excluded(attr.span) {
            walk::walk_jsx_attribute(self, attr);
            return;
        }
        let (prefix, suffix) = self.capture.cache_wrap();
        match &attr.value {
            Some(JSXAttributeValue::StringLiteral(s)) => {
                let literal = serde_json::to_string(s.value.as_str()).unwrap_or_default();
                self.edits.push(Edit::replace(s.span, format!("{{{prefix}{literal}{suffix}}}")));
            }
            Some(JSXAttributeValue::ExpressionContainer(container)) => {
                if let Some(expr) = container.expression.as_expression() {
                    if !self.already_routed(expr) {
                        self.edits.push(Edit::wrap(expr.span(), prefix, suffix));
                    }
                    self.visit_expression(expr);
                }
            }
            _ => walk::walk_jsx_attribute(self, attr),
        }
    }
}

/// Identity-attribute edits for every element inside `expr`, except those
/// inside the `exclude` spans.
pub fn identity_edits<'s, 'a>(
    ctx: &PassContext<'s, 'a>,
    expr: &Expression<'a>,
    capture: &CaptureContext,
    exclude: &[Span],
) -> Vec<Edit> {
    let mut router = IdentityRouter {
        ctx,
        capture,
        exclude,
        edits: vec![],
    };
    router.visit_expression(expr);
    router.edits
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLOSURE CAPTURE
// ═══════════════════════════════════════════════════════════════════════════════

/// How a closure's first parameter is used.
#[derive(Debug, Default)]
struct ParamUsage {
    capture_uses: usize,
    other_uses: usize,
}

struct ParamUsageScan<'r> {
    name: &'r str,
    runtime: &'r RuntimeNames,
    usage: ParamUsage,
}

impl<'a> Visit<'a> for ParamUsageScan<'_> {
    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if let Expression::StaticMemberExpression(member) = strip(&call.callee) {
            let method = member.property.name.as_str();
            let receiver = matches!(strip(&member.object), Expression::Identifier(id) if id.name == self.name);
            if receiver && (method == self.runtime.track || method == self.runtime.cache) {
                self.usage.capture_uses += 1;
                for arg in &call.arguments {
                    self.visit_argument(arg);
                }
                return;
            }
        }
        walk::walk_call_expression(self, call);
    }

    fn visit_identifier_reference(&mut self, id: &IdentifierReference<'a>) {
        if id.name == self.name {
            self.usage.other_uses += 1;
        }
    }
}

fn scan_param_usage(func: &FunctionLiteral<'_, '_>, name: &str, runtime: &RuntimeNames) -> ParamUsage {
    let mut scan = ParamUsageScan {
        name,
        runtime,
        usage: ParamUsage::default(),
    };
    func.visit_body(&mut scan);
    scan.usage
}

/// Route the reactive reads of a zero- or one-parameter function literal
/// through a capture context. Returns `None` when there is nothing to do:
/// no reactive reads, or the closure was already compiled.
pub fn capture_function(ctx: &PassContext<'_, '_>, func: &FunctionLiteral<'_, '_>) -> Option<Vec<Edit>> {
    let runtime = ctx.settings.runtime();
    let first = func.first_param();
    let usage = first.map(|name| scan_param_usage(func, name, runtime));

    if let Some(u) = &usage {
        if u.capture_uses > 0 && u.other_uses == 0 {
            tracing::debug!(file = ctx.file, offset = func.span().start, "closure already compiled");
            return None;
        }
    }

    let locals = bound_names_in_function(func);
    let mut collector = DependencyCollector::new(ctx, func.span(), &locals);
    if let Some(name) = first {
        collector = collector.with_receiver(name);
    }
    func.visit_body(&mut collector);
    if collector.found.is_empty() {
        return None;
    }

    let params = func.params();
    let reusable = matches!(&usage, Some(u) if u.capture_uses == 0 && u.other_uses == 0)
        && params.items.len() == 1
        && params.rest.is_none();

    let mut edits = vec![];
    let capture = if reusable {
        CaptureContext::named(first.unwrap_or_default(), runtime)
    } else {
        let capture = CaptureContext::fresh(ctx.source, runtime);
        let params_text = ctx.text(params.span);
        if params.items.is_empty()
            && params.rest.is_none()
            && params_text.starts_with('(')
            && params_text.ends_with(')')
        {
            edits.push(Edit::replace(params.span, format!("({})", capture.key)));
        } else {
            // The parameter means something else; call the original inside
            // a fresh closure instead of repurposing it.
            edits.push(Edit::wrap(func.span(), format!("({}) => (", capture.key), ")()"));
        }
        capture
    };

    edits.extend(collector.found.iter().map(|dep| capture.dependency_edit(dep)));
    let expression = ReactiveExpression::new(ctx.text(func.span()), &capture.key, &collector.found);
    tracing::debug!(
        file = ctx.file,
        key = %expression.key,
        captured = ?expression.captured,
        "captured closure"
    );
    Some(edits)
}

/// Compile every `computed(fn)` call and ``computed`...` `` tagged template
/// whose callee is the reactive module's `computed`.
pub fn compile_computed_calls(ctx: &PassContext<'_, '_>) -> Result<Vec<Edit>, CompileError> {
    let mut finder = ComputedCalls { ctx, edits: vec![] };
    finder.visit_program(ctx.program);
    Ok(finder.edits)
}

struct ComputedCalls<'c, 's, 'a> {
    ctx: &'c PassContext<'s, 'a>,
    edits: Vec<Edit>,
}

impl ComputedCalls<'_, '_, '_> {
    fn is_computed(&self, callee: &Expression<'_>) -> bool {
        let name = &self.ctx.settings.runtime().computed;
        self.ctx.classifier.is_reactive_callable(callee, name)
    }
}

impl<'a> Visit<'a> for ComputedCalls<'_, '_, 'a> {
    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if self.is_computed(&call.callee) && call.arguments.len() == 1 {
            let func = call.arguments[0]
                .as_expression()
                .and_then(FunctionLiteral::from_expression);
            match func {
                Some(func) => {
                    if let Some(edits) = capture_function(self.ctx, &func) {
                        self.edits.extend(edits);
                        return;
                    }
                }
                None => {
                    tracing::debug!(
                        file = self.ctx.file,
                        offset = call.span.start,
                        "computed argument is not a function literal, left untouched"
                    );
                }
            }
        }
        walk::walk_call_expression(self, call);
    }

    fn visit_tagged_template_expression(&mut self, tagged: &TaggedTemplateExpression<'a>) {
        if !self.is_computed(&tagged.tag) {
            walk::walk_tagged_template_expression(self, tagged);
            return;
        }
        let mut locals = HashSet::new();
        BindingCollector {
            symbols: &mut locals,
        }
        .visit_template_literal(&tagged.quasi);
        let mut collector = DependencyCollector::new(self.ctx, tagged.quasi.span, &locals);
        collector.visit_template_literal(&tagged.quasi);
        if collector.found.is_empty() {
            return;
        }
        let runtime = self.ctx.settings.runtime();
        let capture = CaptureContext::fresh(self.ctx.source, runtime);
        self.edits.push(Edit::wrap(
            tagged.quasi.span,
            format!("(({}) => ", capture.key),
            ")",
        ));
        self.edits
            .extend(collector.found.iter().map(|dep| capture.dependency_edit(dep)));
    }
}
