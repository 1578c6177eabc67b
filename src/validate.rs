//! Invariant catalog and the passes that enforce it.
//!
//! Every violation is fatal for the file. Checks run in a fixed order and the
//! first violation found is reported.

#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::catalog::{Catalog, ComponentMetadata};
use crate::ir::{
    AttributeIR, AttributeValue, ExpressionIR, LoopContext, SourceLocation, TemplateNode, ZenIR,
};
use crate::scope::{
    contains_jsx, expression_references, find_state_mutation, scan_script, script_references,
};

// ═══════════════════════════════════════════════════════════════════════════════
// INVARIANT CODES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Invariant {
    LoopContextLost,
    AttributeNotForwarded,
    UnresolvedComponent,
    ReactiveBoundary,
    TemplateTag,
    SlotAttribute,
    OrphanCompound,
    NonEnumerableJsx,
    UnregisteredExpression,
    ComponentPrecompiled,
}

impl Invariant {
    pub const ALL: [Invariant; 10] = [
        Invariant::LoopContextLost,
        Invariant::AttributeNotForwarded,
        Invariant::UnresolvedComponent,
        Invariant::ReactiveBoundary,
        Invariant::TemplateTag,
        Invariant::SlotAttribute,
        Invariant::OrphanCompound,
        Invariant::NonEnumerableJsx,
        Invariant::UnregisteredExpression,
        Invariant::ComponentPrecompiled,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Invariant::LoopContextLost => "LOOP_CONTEXT_LOST",
            Invariant::AttributeNotForwarded => "ATTRIBUTE_NOT_FORWARDED",
            Invariant::UnresolvedComponent => "UNRESOLVED_COMPONENT",
            Invariant::ReactiveBoundary => "REACTIVE_BOUNDARY",
            Invariant::TemplateTag => "TEMPLATE_TAG",
            Invariant::SlotAttribute => "SLOT_ATTRIBUTE",
            Invariant::OrphanCompound => "ORPHAN_COMPOUND",
            Invariant::NonEnumerableJsx => "NON_ENUMERABLE_JSX",
            Invariant::UnregisteredExpression => "UNREGISTERED_EXPRESSION",
            Invariant::ComponentPrecompiled => "COMPONENT_PRECOMPILED",
        }
    }

    /// Stable short id (`INV001`..`INV010`) used in docs and host tooling.
    pub fn id(self) -> &'static str {
        match self {
            Invariant::LoopContextLost => "INV001",
            Invariant::AttributeNotForwarded => "INV002",
            Invariant::UnresolvedComponent => "INV003",
            Invariant::ReactiveBoundary => "INV004",
            Invariant::TemplateTag => "INV005",
            Invariant::SlotAttribute => "INV006",
            Invariant::OrphanCompound => "INV007",
            Invariant::NonEnumerableJsx => "INV008",
            Invariant::UnregisteredExpression => "INV009",
            Invariant::ComponentPrecompiled => "INV010",
        }
    }

    pub fn guarantee(self) -> &'static str {
        match self {
            Invariant::LoopContextLost => "Slot content retains its original reactive scope.",
            Invariant::AttributeNotForwarded => {
                "Attributes passed to components are forwarded to the semantic root element."
            }
            Invariant::UnresolvedComponent => "All components are resolved at compile time.",
            Invariant::ReactiveBoundary => {
                "Reactive state may only be read inside expressions. Reactive state may only be written inside event handlers."
            }
            Invariant::TemplateTag => {
                "Named slots use compound component pattern, not <template> tags."
            }
            Invariant::SlotAttribute => {
                "Named slots use compound component pattern, not slot=\"\" attributes."
            }
            Invariant::OrphanCompound => {
                "Compound slot markers must be direct children of their parent component."
            }
            Invariant::NonEnumerableJsx => "JSX expressions must have statically enumerable output.",
            Invariant::UnregisteredExpression => {
                "All bindings must reference an ID that exists in the registry."
            }
            Invariant::ComponentPrecompiled => {
                "Component AST must be precompiled before instantiation."
            }
        }
    }

    pub fn from_code(code: &str) -> Option<Invariant> {
        Invariant::ALL.into_iter().find(|inv| inv.code() == code || inv.id() == code)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct CompilerError {
    pub code: String,
    pub id: String,
    pub error_type: String,
    pub message: String,
    pub guarantee: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub context: Option<String>,
    pub hints: Vec<String>,
}

impl CompilerError {
    pub fn new(invariant: Invariant, message: &str, file: &str, line: u32, column: u32) -> Self {
        Self::with_details(invariant, message, file, line, column, None, vec![])
    }

    pub fn with_details(
        invariant: Invariant,
        message: &str,
        file: &str,
        line: u32,
        column: u32,
        context: Option<String>,
        hints: Vec<String>,
    ) -> Self {
        CompilerError {
            code: invariant.code().to_string(),
            id: invariant.id().to_string(),
            error_type: "COMPILER_INVARIANT_VIOLATION".to_string(),
            message: message.to_string(),
            guarantee: invariant.guarantee().to_string(),
            file: file.to_string(),
            line,
            column,
            context,
            hints,
        }
    }

    fn at(invariant: Invariant, message: &str, file: &str, loc: &SourceLocation) -> Self {
        Self::new(invariant, message, file, loc.line, loc.column)
    }

    pub fn invariant(&self) -> Option<Invariant> {
        Invariant::from_code(&self.code)
    }
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{} [{}] {}",
            self.file, self.line, self.column, self.code, self.message
        )?;
        if let Some(context) = &self.context {
            write!(f, "\n  {}", context)?;
        }
        for hint in &self.hints {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompilerError {}

fn first_violation<'n>(
    nodes: &'n [TemplateNode],
    check: &mut dyn FnMut(&'n TemplateNode) -> Option<CompilerError>,
) -> Option<CompilerError> {
    for node in nodes {
        if let Some(err) = check(node) {
            return Some(err);
        }
        for list in node.child_lists() {
            if let Some(err) = first_violation(list, check) {
                return Some(err);
            }
        }
    }
    None
}

fn into_result(violation: Option<CompilerError>) -> Result<(), CompilerError> {
    match violation {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASSES
// ═══════════════════════════════════════════════════════════════════════════════

/// Structural checks on a page before resolution.
pub fn validate_source(ir: &ZenIR, catalog: &Catalog) -> Result<(), CompilerError> {
    let file = &ir.file_path;
    let nodes = &ir.template.nodes;

    into_result(
        validate_no_template_tags(nodes, file)
            .or_else(|| validate_slot_declarations(nodes, file))
            .or_else(|| validate_compound_placement(nodes, None, catalog, file))
            .or_else(|| validate_components_known(nodes, catalog, file)),
    )
}

/// Checks on one component definition, run at first instantiation when
/// strict props are enabled.
pub fn validate_component(meta: &ComponentMetadata) -> Result<(), CompilerError> {
    let file = &meta.path;
    into_result(
        validate_slot_declarations(&meta.nodes, file)
            .or_else(|| validate_no_template_tags(&meta.nodes, file))
            .or_else(|| validate_props_consumed(meta)),
    )
}

/// Guarantees codegen relies on. Run after resolution.
pub fn validate_resolved(ir: &ZenIR) -> Result<(), CompilerError> {
    let file = &ir.file_path;
    let nodes = &ir.template.nodes;
    let registry: HashMap<&str, &ExpressionIR> = ir
        .template
        .expressions
        .iter()
        .map(|e| (e.id.as_str(), e))
        .collect();

    into_result(
        validate_no_components(nodes, file)
            .or_else(|| validate_no_template_tags(nodes, file))
            .or_else(|| validate_expressions_registered(nodes, &registry, file))
            .or_else(|| validate_loop_contexts(nodes, &[], &registry, file))
            .or_else(|| validate_enumerable(nodes, &registry, file))
            .or_else(|| validate_reactive_boundary(ir, &registry)),
    )
}

/// Codegen precondition: no `component` node is left in the tree.
pub fn validate_precompiled(ir: &ZenIR) -> Result<(), CompilerError> {
    into_result(validate_no_components(&ir.template.nodes, &ir.file_path))
}

// ═══════════════════════════════════════════════════════════════════════════════
// STRUCTURAL CHECKS
// ═══════════════════════════════════════════════════════════════════════════════

fn validate_no_template_tags(nodes: &[TemplateNode], file: &str) -> Option<CompilerError> {
    first_violation(nodes, &mut |node| match node {
        TemplateNode::Element(e) if e.tag == "template" => Some(CompilerError::with_details(
            Invariant::TemplateTag,
            "<template> tags are forbidden.",
            file,
            e.location.line,
            e.location.column,
            Some("<template>".to_string()),
            vec![
                "Use a Zenith component or a standard HTML element instead.".to_string(),
                "Named slots should use the compound component pattern.".to_string(),
            ],
        )),
        _ => None,
    })
}

fn slot_attribute_error(attr: &AttributeIR, owner: &str, file: &str) -> CompilerError {
    let value = match &attr.value {
        AttributeValue::Static(v) => v.clone(),
        AttributeValue::Dynamic(e) => e.code.clone(),
    };
    CompilerError::with_details(
        Invariant::SlotAttribute,
        &format!("slot=\"{}\" on <{}> is not supported.", value, owner),
        file,
        attr.location.line,
        attr.location.column,
        Some(format!("<{} slot=\"{}\">", owner, value)),
        vec![format!(
            "Wrap the content in a compound marker such as <Parent.{}> instead.",
            capitalize(&value)
        )],
    )
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// No `slot="..."` attributes, and each named `<slot>` declared once.
fn validate_slot_declarations(nodes: &[TemplateNode], file: &str) -> Option<CompilerError> {
    let mut declared: HashSet<String> = HashSet::new();
    first_violation(nodes, &mut |node| {
        let (owner, attributes, is_slot) = match node {
            TemplateNode::Element(e) => (e.tag.as_str(), &e.attributes, e.tag.eq_ignore_ascii_case("slot")),
            TemplateNode::Component(c) => (c.name.as_str(), &c.attributes, false),
            _ => return None,
        };

        if let Some(attr) = attributes.iter().find(|a| a.name == "slot") {
            return Some(slot_attribute_error(attr, owner, file));
        }

        if is_slot {
            let name = attributes.iter().find(|a| a.name == "name").and_then(|a| match &a.value {
                AttributeValue::Static(v) => Some(v.clone()),
                AttributeValue::Dynamic(_) => None,
            });
            if let Some(name) = name {
                if !declared.insert(name.clone()) {
                    let loc = node.location();
                    return Some(CompilerError::with_details(
                        Invariant::SlotAttribute,
                        &format!("Slot \"{}\" is declared more than once.", name),
                        file,
                        loc.line,
                        loc.column,
                        Some(format!("<slot name=\"{}\">", name)),
                        vec!["Each named slot may appear once per component template.".to_string()],
                    ));
                }
            }
        }
        None
    })
}

/// `Parent.Part` markers must sit directly inside `<Parent>`.
fn validate_compound_placement(
    nodes: &[TemplateNode],
    parent: Option<&str>,
    catalog: &Catalog,
    file: &str,
) -> Option<CompilerError> {
    for node in nodes {
        if let TemplateNode::Component(c) = node {
            if let Some((owner, _)) = c.name.split_once('.') {
                if parent != Some(owner) && !catalog.contains(&c.name) {
                    return Some(CompilerError::with_details(
                        Invariant::OrphanCompound,
                        &format!("<{}> is used outside of <{}>.", c.name, owner),
                        file,
                        c.location.line,
                        c.location.column,
                        Some(format!("<{}>", c.name)),
                        vec![format!("Move <{}> directly inside <{}>.", c.name, owner)],
                    ));
                }
            }
            if let Some(err) = validate_compound_placement(&c.children, Some(&c.name), catalog, file) {
                return Some(err);
            }
            continue;
        }
        for list in node.child_lists() {
            if let Some(err) = validate_compound_placement(list, None, catalog, file) {
                return Some(err);
            }
        }
    }
    None
}

fn validate_components_known(nodes: &[TemplateNode], catalog: &Catalog, file: &str) -> Option<CompilerError> {
    first_violation(nodes, &mut |node| match node {
        TemplateNode::Component(c) if !c.name.contains('.') && !catalog.contains(&c.name) => {
            Some(CompilerError::with_details(
                Invariant::UnresolvedComponent,
                &format!("Unresolved component: <{}>.", c.name),
                file,
                c.location.line,
                c.location.column,
                Some(format!("<{}>", c.name)),
                vec![format!(
                    "No component named \"{}\" is registered; names are matched exactly.",
                    c.name
                )],
            ))
        }
        _ => None,
    })
}

/// Every declared prop is read somewhere in the component.
fn validate_props_consumed(meta: &ComponentMetadata) -> Option<CompilerError> {
    let script = meta.script_text().unwrap_or("");
    let symbols = scan_script(script).ok()?;
    let mut declared: Vec<&str> = meta.props.iter().map(String::as_str).collect();
    for prop in &symbols.props {
        if !declared.contains(&prop.name.as_str()) {
            declared.push(&prop.name);
        }
    }
    if declared.is_empty() {
        return None;
    }

    // Unparseable code cannot be judged here; the resolver reports it.
    let mut consumed = script_references(script).ok()?;
    for expr in &meta.expressions {
        consumed.extend(expression_references(&expr.code).ok()?);
    }
    let mut attribute_code = Vec::new();
    first_violation(&meta.nodes, &mut |node| {
        let attributes = match node {
            TemplateNode::Element(e) => &e.attributes,
            TemplateNode::Component(c) => &c.attributes,
            _ => return None,
        };
        for attr in attributes {
            if let AttributeValue::Dynamic(expr) = &attr.value {
                attribute_code.push(expr.code.clone());
            }
        }
        None
    });
    for code in &attribute_code {
        consumed.extend(expression_references(code).ok()?);
    }

    let unused = declared.into_iter().find(|prop| !consumed.contains(*prop))?;
    Some(CompilerError::with_details(
        Invariant::AttributeNotForwarded,
        &format!("<{}> declares prop \"{}\" but never uses it.", meta.name, unused),
        &meta.path,
        1,
        1,
        None,
        vec![format!(
            "Reference `{}` in the template or script, or remove it from the props list.",
            unused
        )],
    ))
}

// ═══════════════════════════════════════════════════════════════════════════════
// POST-RESOLUTION CHECKS
// ═══════════════════════════════════════════════════════════════════════════════

fn validate_no_components(nodes: &[TemplateNode], file: &str) -> Option<CompilerError> {
    first_violation(nodes, &mut |node| match node {
        TemplateNode::Component(c) => Some(CompilerError::with_details(
            Invariant::ComponentPrecompiled,
            &format!("<{}> survived component resolution.", c.name),
            file,
            c.location.line,
            c.location.column,
            Some(format!("<{}>", c.name)),
            vec!["Run component resolution before code generation.".to_string()],
        )),
        _ => None,
    })
}

fn validate_expressions_registered(
    nodes: &[TemplateNode],
    registry: &HashMap<&str, &ExpressionIR>,
    file: &str,
) -> Option<CompilerError> {
    let missing = |what: &str, id: &str, loc: &SourceLocation| {
        if registry.contains_key(id) {
            None
        } else {
            Some(CompilerError::at(
                Invariant::UnregisteredExpression,
                &format!("{} \"{}\" missing from registry.", what, id),
                file,
                loc,
            ))
        }
    };

    first_violation(nodes, &mut |node| match node {
        TemplateNode::Expression(e) => missing("Expression ID", &e.expression, &e.location),
        TemplateNode::Element(el) => el.attributes.iter().find_map(|attr| match &attr.value {
            AttributeValue::Dynamic(expr) if !expr.id.is_empty() => missing(
                &format!("Attr \"{}\" references ID", attr.name),
                &expr.id,
                &attr.location,
            ),
            _ => None,
        }),
        TemplateNode::ConditionalFragment(cf) => missing("Condition ID", &cf.condition, &cf.location),
        TemplateNode::OptionalFragment(of) => missing("Optional condition ID", &of.condition, &of.location),
        TemplateNode::LoopFragment(lf) => missing("Loop source ID", &lf.source, &lf.location),
        _ => None,
    })
}

fn lost_variable(ctx: &Option<LoopContext>, scope: &[String]) -> Option<String> {
    LoopContext::variables_of(ctx)
        .iter()
        .find(|v| !scope.contains(v))
        .cloned()
}

fn loop_context_error(var: &str, file: &str, loc: &SourceLocation) -> CompilerError {
    CompilerError::with_details(
        Invariant::LoopContextLost,
        &format!("Loop variable `{}` is used outside of its loop.", var),
        file,
        loc.line,
        loc.column,
        None,
        vec!["Keep loop variables inside the body of the loop that declares them.".to_string()],
    )
}

/// Loop contexts on nodes, attributes and referenced expressions only name
/// variables bound by an enclosing loop fragment.
fn validate_loop_contexts(
    nodes: &[TemplateNode],
    scope: &[String],
    registry: &HashMap<&str, &ExpressionIR>,
    file: &str,
) -> Option<CompilerError> {
    let check_ref = |id: &str, scope: &[String], loc: &SourceLocation| {
        let expr = registry.get(id)?;
        lost_variable(&expr.loop_context, scope).map(|v| loop_context_error(&v, file, loc))
    };

    for node in nodes {
        let loc = node.location();
        let err = match node {
            TemplateNode::Element(el) => lost_variable(&el.loop_context, scope)
                .map(|v| loop_context_error(&v, file, loc))
                .or_else(|| {
                    el.attributes.iter().find_map(|attr| {
                        let from_expr = match &attr.value {
                            AttributeValue::Dynamic(expr) => lost_variable(&expr.loop_context, scope),
                            AttributeValue::Static(_) => None,
                        };
                        lost_variable(&attr.loop_context, scope)
                            .or(from_expr)
                            .map(|v| loop_context_error(&v, file, &attr.location))
                    })
                })
                .or_else(|| validate_loop_contexts(&el.children, scope, registry, file)),
            TemplateNode::Text(t) => {
                lost_variable(&t.loop_context, scope).map(|v| loop_context_error(&v, file, loc))
            }
            TemplateNode::Expression(e) => lost_variable(&e.loop_context, scope)
                .map(|v| loop_context_error(&v, file, loc))
                .or_else(|| check_ref(&e.expression, scope, loc)),
            TemplateNode::ConditionalFragment(cf) => lost_variable(&cf.loop_context, scope)
                .map(|v| loop_context_error(&v, file, loc))
                .or_else(|| check_ref(&cf.condition, scope, loc))
                .or_else(|| validate_loop_contexts(&cf.consequent, scope, registry, file))
                .or_else(|| validate_loop_contexts(&cf.alternate, scope, registry, file)),
            TemplateNode::OptionalFragment(of) => lost_variable(&of.loop_context, scope)
                .map(|v| loop_context_error(&v, file, loc))
                .or_else(|| check_ref(&of.condition, scope, loc))
                .or_else(|| validate_loop_contexts(&of.fragment, scope, registry, file)),
            TemplateNode::LoopFragment(lf) => {
                let mut inner = scope.to_vec();
                inner.extend(lf.bound_variables());
                lost_variable(&lf.loop_context, &inner)
                    .map(|v| loop_context_error(&v, file, loc))
                    .or_else(|| check_ref(&lf.source, &inner, loc))
                    .or_else(|| validate_loop_contexts(&lf.body, &inner, registry, file))
            }
            TemplateNode::Component(c) => validate_loop_contexts(&c.children, scope, registry, file),
            TemplateNode::Doctype(_) => None,
        };
        if err.is_some() {
            return err;
        }
    }
    None
}

/// Expression code must not build markup at runtime.
fn validate_enumerable(
    nodes: &[TemplateNode],
    registry: &HashMap<&str, &ExpressionIR>,
    file: &str,
) -> Option<CompilerError> {
    let check = |id: &str, loc: &SourceLocation| {
        let expr = registry.get(id)?;
        if !contains_jsx(&expr.code) {
            return None;
        }
        Some(CompilerError::with_details(
            Invariant::NonEnumerableJsx,
            &format!("Expression \"{}\" produces markup codegen cannot enumerate.", id),
            file,
            loc.line,
            loc.column,
            Some(expr.code.clone()),
            vec!["Express lists with a loop fragment and branches with a conditional fragment.".to_string()],
        ))
    };

    first_violation(nodes, &mut |node| match node {
        TemplateNode::Expression(e) => check(&e.expression, &e.location),
        TemplateNode::ConditionalFragment(cf) => check(&cf.condition, &cf.location),
        TemplateNode::OptionalFragment(of) => check(&of.condition, &of.location),
        TemplateNode::LoopFragment(lf) => check(&lf.source, &lf.location),
        _ => None,
    })
}

/// State is written only from event handlers, never from read positions.
fn validate_reactive_boundary(ir: &ZenIR, registry: &HashMap<&str, &ExpressionIR>) -> Option<CompilerError> {
    let states: HashSet<&str> = ir
        .all_states
        .keys()
        .map(String::as_str)
        .chain(ir.page_bindings.iter().map(String::as_str))
        .collect();
    if states.is_empty() {
        return None;
    }
    let file = &ir.file_path;

    let check = |code: &str, loc: &SourceLocation| {
        let name = find_state_mutation(code, |n| states.contains(n))?;
        Some(CompilerError::with_details(
            Invariant::ReactiveBoundary,
            &format!("State `{}` is written where only a read is permitted.", name),
            file,
            loc.line,
            loc.column,
            Some(code.to_string()),
            vec!["Move the assignment into an event handler or a function.".to_string()],
        ))
    };
    let check_ref = |id: &str, loc: &SourceLocation| registry.get(id).and_then(|e| check(&e.code, loc));

    first_violation(&ir.template.nodes, &mut |node| match node {
        TemplateNode::Expression(e) => check_ref(&e.expression, &e.location),
        TemplateNode::ConditionalFragment(cf) => check_ref(&cf.condition, &cf.location),
        TemplateNode::OptionalFragment(of) => check_ref(&of.condition, &of.location),
        TemplateNode::LoopFragment(lf) => check_ref(&lf.source, &lf.location),
        TemplateNode::Element(el) => el.attributes.iter().find_map(|attr| match &attr.value {
            AttributeValue::Dynamic(expr) if !attr.is_event_handler() => check(&expr.code, &attr.location),
            _ => None,
        }),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_ids_round_trip() {
        for inv in Invariant::ALL {
            assert_eq!(Invariant::from_code(inv.code()), Some(inv));
            assert_eq!(Invariant::from_code(inv.id()), Some(inv));
            assert!(!inv.guarantee().is_empty());
        }
        assert_eq!(Invariant::UnresolvedComponent.id(), "INV003");
        assert_eq!(
            serde_json::to_value(Invariant::NonEnumerableJsx).unwrap(),
            serde_json::json!("NON_ENUMERABLE_JSX")
        );
    }

    #[test]
    fn test_display_renders_head_context_and_hints() {
        let err = CompilerError::with_details(
            Invariant::TemplateTag,
            "<template> tags are forbidden.",
            "pages/index.zen",
            4,
            2,
            Some("<template>".to_string()),
            vec!["Use a component.".to_string()],
        );
        assert_eq!(
            err.to_string(),
            "pages/index.zen:4:2 [TEMPLATE_TAG] <template> tags are forbidden.\n  <template>\n  hint: Use a component."
        );
        assert_eq!(err.invariant(), Some(Invariant::TemplateTag));
        assert_eq!(err.guarantee, Invariant::TemplateTag.guarantee());
    }
}
