//! Markup lowering.
//!
//! Turns every markup tree left in the file into explicit node-construction
//! calls:
//!
//! ```text
//! <div class="row" {...rest}>Hi {name}<Icon /></div>
//! TypeComposer.createElement("div", { className: "row", ...rest }, "Hi", name, TypeComposer.createElement(Icon, {}))
//! ```
//!
//! Lowering works on text. Each markup root is rendered to a string and
//! replaces its span; expressions embedded in the markup are rendered from
//! their source with any markup nested inside them lowered in turn.

use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_span::GetSpan;
use regex::Regex;

use crate::component::{class_infos, enclosing_class, ClassInfo};
use crate::diagnostics::{CompileError, Severity, DIAG_UNRESOLVED_COMPONENT};
use crate::parse::PassContext;
use crate::rewrite::{apply_within, Edit};
use crate::types::{resolve, strip};

lazy_static::lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap_or_else(|e| panic!("{e}"));
    static ref PLAIN_KEY: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap_or_else(|e| panic!("{e}"));
}

/// Lower every markup root in the file.
pub fn lower_templates(ctx: &PassContext<'_, '_>) -> Result<Vec<Edit>, CompileError> {
    let classes = class_infos(ctx.program, &ctx.settings.options.template_method);
    let lowerer = JsxLowerer {
        ctx,
        classes: &classes,
    };
    let mut sites = MarkupRoots {
        lowerer: &lowerer,
        edits: vec![],
        error: None,
    };
    sites.visit_program(ctx.program);
    match sites.error {
        Some(error) => Err(error),
        None => Ok(sites.edits),
    }
}

/// Finds outermost markup nodes and records their lowered text.
struct MarkupRoots<'l, 'c, 's, 'a> {
    lowerer: &'l JsxLowerer<'c, 's, 'a>,
    edits: Vec<Edit>,
    error: Option<CompileError>,
}

impl<'a> Visit<'a> for MarkupRoots<'_, '_, '_, 'a> {
    fn visit_expression(&mut self, expr: &Expression<'a>) {
        if self.error.is_some() {
            return;
        }
        let lowered = match expr {
            Expression::JSXElement(element) => self.lowerer.lower_jsx_element(element),
            Expression::JSXFragment(fragment) => self.lowerer.lower_jsx_fragment(fragment),
            _ => {
                walk::walk_expression(self, expr);
                return;
            }
        };
        match lowered {
            Ok(text) => self.edits.push(Edit::replace(expr.span(), text)),
            Err(error) => self.error = Some(error),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// JSX LOWERER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct JsxLowerer<'c, 's, 'a> {
    ctx: &'c PassContext<'s, 'a>,
    classes: &'c [ClassInfo],
}

impl<'a> JsxLowerer<'_, '_, 'a> {
    fn lower_jsx_element(&self, element: &JSXElement<'a>) -> Result<String, CompileError> {
        let runtime = self.ctx.settings.runtime();
        let opening = &element.opening_element;
        let tag = self.get_tag_name(&opening.name);
        let props = self.lower_attributes(opening)?;
        let mut children = vec![];
        self.lower_children(&element.children, &mut children)?;

        let mut args = vec![tag, props];
        args.extend(children);
        Ok(format!("{}({})", runtime.create_element, args.join(", ")))
    }

    /// A fragment that is not inside an element keeps a node of its own.
    fn lower_jsx_fragment(&self, fragment: &JSXFragment<'a>) -> Result<String, CompileError> {
        let mut children = vec![];
        self.lower_children(&fragment.children, &mut children)?;
        Ok(format!(
            "{}({})",
            self.ctx.settings.runtime().create_fragment,
            children.join(", ")
        ))
    }

    fn lower_children(&self, children: &[JSXChild<'a>], out: &mut Vec<String>) -> Result<(), CompileError> {
        for child in children {
            match child {
                JSXChild::Text(t) => {
                    let text = WHITESPACE.replace_all(&t.value, " ");
                    let text = text.trim();
                    if !text.is_empty() {
                        out.push(json_string(text));
                    }
                }
                JSXChild::Element(el) => out.push(self.lower_jsx_element(el)?),
                // Fragments inside an element contribute their children directly.
                JSXChild::Fragment(frag) => self.lower_children(&frag.children, out)?,
                JSXChild::ExpressionContainer(container) => {
                    if let Some(expr) = container.expression.as_expression() {
                        out.push(self.lower_jsx_expression(expr)?);
                    }
                }
                JSXChild::Spread(spread) => {
                    out.push(format!("...{}", self.lower_jsx_expression(&spread.expression)?));
                }
            }
        }
        Ok(())
    }

    /// Props object. Spreads and attributes keep their order, so later
    /// entries win exactly as in the markup.
    fn lower_attributes(&self, opening: &JSXOpeningElement<'a>) -> Result<String, CompileError> {
        let mut entries = vec![];
        for item in &opening.attributes {
            match item {
                JSXAttributeItem::Attribute(attr) => {
                    let name = attribute_name(&attr.name);
                    let value = self.lower_attribute_value(&name, attr)?;
                    entries.push(format!("{}: {}", property_key(&name), value));
                }
                JSXAttributeItem::SpreadAttribute(spread) => {
                    entries.push(format!("...{}", self.lower_jsx_expression(&spread.argument)?));
                }
            }
        }
        if entries.is_empty() {
            Ok("{}".to_string())
        } else {
            Ok(format!("{{ {} }}", entries.join(", ")))
        }
    }

    fn lower_attribute_value(&self, name: &str, attr: &JSXAttribute<'a>) -> Result<String, CompileError> {
        match &attr.value {
            None => Ok("true".to_string()),
            Some(JSXAttributeValue::StringLiteral(s)) => Ok(json_string(&s.value)),
            Some(JSXAttributeValue::Element(el)) => self.lower_jsx_element(el),
            Some(JSXAttributeValue::Fragment(frag)) => self.lower_jsx_fragment(frag),
            Some(JSXAttributeValue::ExpressionContainer(container)) => {
                let Some(expr) = container.expression.as_expression() else {
                    return Err(CompileError::Markup {
                        file: self.ctx.file.to_string(),
                        message: format!("attribute `{name}` has an empty expression"),
                        offset: container.span.start,
                    });
                };
                if name == "ref" && is_assignable(expr) {
                    return Ok(format!("(e) => ({} = e)", self.ctx.text(expr.span())));
                }
                if self.is_instance_method(expr) {
                    return Ok(format!("{}.bind(this)", self.ctx.text(expr.span())));
                }
                self.lower_jsx_expression(expr)
            }
        }
    }

    /// `this.m` where `m` is a prototype method of the enclosing class.
    fn is_instance_method(&self, expr: &Expression<'a>) -> bool {
        let Expression::StaticMemberExpression(member) = strip(expr) else {
            return false;
        };
        if !matches!(strip(&member.object), Expression::ThisExpression(_)) {
            return false;
        }
        enclosing_class(self.classes, member.span)
            .is_some_and(|class| class.methods.contains(member.property.name.as_str()))
    }

    fn get_tag_name(&self, name: &JSXElementName<'a>) -> String {
        match name {
            JSXElementName::Identifier(id) => json_string(&id.name),
            JSXElementName::IdentifierReference(id) => {
                if resolve(self.ctx.scoping, id).is_none() {
                    self.ctx.report(
                        DIAG_UNRESOLVED_COMPONENT,
                        Severity::Warning,
                        &format!("`<{}>` does not resolve to a declaration in scope", id.name),
                        id.span.start,
                    );
                }
                id.name.to_string()
            }
            JSXElementName::NamespacedName(ns) => json_string(&format!("{}:{}", ns.namespace.name, ns.name.name)),
            JSXElementName::MemberExpression(me) => self.get_member_name(me),
            JSXElementName::ThisExpression(_) => "this".to_string(),
        }
    }

    fn get_member_name(&self, me: &JSXMemberExpression<'a>) -> String {
        let object = match &me.object {
            JSXMemberExpressionObject::IdentifierReference(id) => id.name.to_string(),
            JSXMemberExpressionObject::MemberExpression(inner) => self.get_member_name(inner),
            JSXMemberExpressionObject::ThisExpression(_) => "this".to_string(),
        };
        format!("{}.{}", object, me.property.name)
    }

    /// Source text of `expr` with any markup nested inside it lowered.
    fn lower_jsx_expression(&self, expr: &Expression<'a>) -> Result<String, CompileError> {
        let mut nested = MarkupRoots {
            lowerer: self,
            edits: vec![],
            error: None,
        };
        nested.visit_expression(expr);
        if let Some(error) = nested.error {
            return Err(error);
        }
        Ok(apply_within(self.ctx.source, expr.span(), &nested.edits))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn attribute_name(name: &JSXAttributeName<'_>) -> String {
    match name {
        JSXAttributeName::Identifier(id) if id.name == "class" => "className".to_string(),
        JSXAttributeName::Identifier(id) => id.name.to_string(),
        JSXAttributeName::NamespacedName(ns) => format!("{}:{}", ns.namespace.name, ns.name.name),
    }
}

pub(crate) fn property_key(name: &str) -> String {
    if PLAIN_KEY.is_match(name) {
        name.to_string()
    } else {
        json_string(name)
    }
}

fn json_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

fn is_assignable(expr: &Expression<'_>) -> bool {
    matches!(
        strip(expr),
        Expression::Identifier(_) | Expression::StaticMemberExpression(_) | Expression::ComputedMemberExpression(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_key_quotes_non_identifiers() {
        assert_eq!(property_key("onClick"), "onClick");
        assert_eq!(property_key("data-id"), "\"data-id\"");
        assert_eq!(property_key("xlink:href"), "\"xlink:href\"");
    }
}
