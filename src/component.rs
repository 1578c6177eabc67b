//! Component resolution: expands every `component` node of a page into the
//! component's own template, with hygienic per-instance renaming.
//!
//! One `ResolutionContext` owns all state of a single file's resolution:
//! the instance counter, the expansion chain (cycle guard), the expression
//! registry additions and the merged script. Nothing is shared between files
//! except the read-only [`Catalog`].

use indexmap::{IndexMap, IndexSet};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace, warn};

use crate::catalog::{Catalog, ComponentMetadata, Lookup};
use crate::compile::{CompileOptions, MissingPropPolicy};
use crate::error::ResolveError;
use crate::ir::{
    AttributeIR, AttributeValue, ComponentNode, ComponentScriptIR, ExpressionIR, LoopContext,
    LoopFragmentNode, ScriptIR, StyleIR, TemplateNode, ZenIR,
};
use crate::renamer::SymbolTable;
use crate::scope::{scan_script, ScriptSymbols};
use crate::validate::{self, CompilerError, Invariant};
use crate::visitor::{walk_loop_fragment, TemplateVisitor};

/// Resolve with default options.
pub fn resolve(page: ZenIR, catalog: &Catalog) -> Result<ZenIR, ResolveError> {
    resolve_with(page, catalog, &CompileOptions::default())
}

pub fn resolve_with(
    mut page: ZenIR,
    catalog: &Catalog,
    options: &CompileOptions,
) -> Result<ZenIR, ResolveError> {
    let file = page.file_path.clone();
    let mut ctx = ResolutionContext::new(&file, catalog, options);

    let page_script = page.script.as_ref().map(|s| s.raw.clone()).unwrap_or_default();
    let page_symbols = if page_script.trim().is_empty() {
        ScriptSymbols::default()
    } else {
        scan_script(&page_script).map_err(|m| ResolveError::syntax(&file, "page script", m))?
    };

    if page.page_bindings.is_empty() {
        page.page_bindings = page_symbols.states.iter().map(|s| s.name.clone()).collect();
    }
    for state in &page_symbols.states {
        ctx.states.insert(state.name.clone(), state.initial_value.clone());
    }
    ctx.merged_script = page_script;
    ctx.expression_ids = page.template.expressions.iter().map(|e| e.id.clone()).collect();

    let nodes = std::mem::take(&mut page.template.nodes);
    page.template.nodes = ctx.resolve_nodes(nodes)?;
    page.template.expressions.extend(std::mem::take(&mut ctx.expressions));

    for name in &ctx.used_components {
        let meta = match catalog.lookup(name) {
            Lookup::Found(meta) => meta,
            Lookup::Missing => continue,
        };
        page.styles
            .extend(meta.styles.iter().map(|css| StyleIR { raw: css.clone() }));
        if let Some(script) = meta.script_text() {
            page.component_scripts.push(ComponentScriptIR {
                name: meta.name.clone(),
                path: meta.path.clone(),
                raw: script.to_string(),
            });
        }
    }

    match &mut page.script {
        Some(script) => script.raw = ctx.merged_script,
        None if !ctx.merged_script.trim().is_empty() => {
            page.script = Some(ScriptIR {
                raw: ctx.merged_script,
                attributes: Default::default(),
            });
        }
        None => {}
    }
    page.all_states.extend(ctx.states);

    debug!(
        file = %file,
        instances = ctx.instance_counter,
        components = ctx.used_components.len(),
        expressions = page.template.expressions.len(),
        "resolved components"
    );
    Ok(page)
}

struct ResolutionContext<'c> {
    file: String,
    catalog: &'c Catalog,
    options: &'c CompileOptions,
    instance_counter: u32,
    /// Names of the components currently being expanded, outermost first.
    chain: Vec<String>,
    /// Variables bound by page-level loop fragments around the current node.
    loop_scope: Vec<String>,
    expressions: Vec<ExpressionIR>,
    expression_ids: HashSet<String>,
    merged_script: String,
    used_components: IndexSet<String>,
    states: IndexMap<String, String>,
    checked_components: HashSet<String>,
}

impl<'c> ResolutionContext<'c> {
    pub fn new(file: &str, catalog: &'c Catalog, options: &'c CompileOptions) -> Self {
        ResolutionContext {
            file: file.to_string(),
            catalog,
            options,
            instance_counter: 0,
            chain: Vec::new(),
            loop_scope: Vec::new(),
            expressions: Vec::new(),
            expression_ids: HashSet::new(),
            merged_script: String::new(),
            used_components: IndexSet::new(),
            states: IndexMap::new(),
            checked_components: HashSet::new(),
        }
    }

    fn resolve_nodes(&mut self, nodes: Vec<TemplateNode>) -> Result<Vec<TemplateNode>, ResolveError> {
        let mut resolved = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                TemplateNode::Component(comp) => {
                    resolved.extend(self.resolve_component_node(comp)?);
                }
                TemplateNode::Element(mut elem) => {
                    elem.children = self.resolve_nodes(elem.children)?;
                    resolved.push(TemplateNode::Element(elem));
                }
                TemplateNode::ConditionalFragment(mut cond) => {
                    cond.consequent = self.resolve_nodes(cond.consequent)?;
                    cond.alternate = self.resolve_nodes(cond.alternate)?;
                    resolved.push(TemplateNode::ConditionalFragment(cond));
                }
                TemplateNode::OptionalFragment(mut opt) => {
                    opt.fragment = self.resolve_nodes(opt.fragment)?;
                    resolved.push(TemplateNode::OptionalFragment(opt));
                }
                TemplateNode::LoopFragment(mut lp) => {
                    let mark = self.loop_scope.len();
                    self.loop_scope.extend(lp.bound_variables());
                    let body = self.resolve_nodes(std::mem::take(&mut lp.body));
                    self.loop_scope.truncate(mark);
                    lp.body = body?;
                    resolved.push(TemplateNode::LoopFragment(lp));
                }
                other => resolved.push(other),
            }
        }
        Ok(resolved)
    }

    fn resolve_component_node(&mut self, node: ComponentNode) -> Result<Vec<TemplateNode>, ResolveError> {
        let catalog = self.catalog;
        let meta = match catalog.lookup(&node.name) {
            Lookup::Found(meta) => meta,
            Lookup::Missing => return Err(self.missing_component(&node).into()),
        };

        if self.chain.iter().any(|active| active == &meta.name) {
            let mut chain = self.chain.clone();
            chain.push(meta.name.clone());
            return Err(ResolveError::ComponentCycle {
                file: self.file.clone(),
                chain,
                line: node.location.line,
                column: node.location.column,
            });
        }

        if self.options.strict_props && self.checked_components.insert(meta.name.clone()) {
            validate::validate_component(meta)?;
        }

        let instance = self.instance_counter;
        self.instance_counter += 1;
        let suffix = format!("_inst{}", instance);
        self.used_components.insert(meta.name.clone());
        debug!(component = %meta.name, instance, depth = self.chain.len(), "expanding component");

        let caller_scope = self.caller_scope(&node);
        let symbols = match meta.script_text() {
            Some(code) => scan_script(code).map_err(|m| {
                ResolveError::syntax(&self.file, format!("script of <{}>", meta.name), m)
            })?,
            None => ScriptSymbols::default(),
        };
        let declared_props = declared_props(meta, &symbols);
        let table = self.instance_table(meta, &node, &symbols, &declared_props, &suffix)?;
        trace!(renames = ?table.renames, inlines = ?table.inlines, "instance symbol table");

        if let Some(code) = meta.script_text() {
            let renamed = table
                .rewrite_script(code, &symbols.prop_spans())
                .map_err(|m| ResolveError::syntax(&self.file, format!("script of <{}>", meta.name), m))?;
            self.append_script(&renamed);

            for state in &symbols.states {
                let name = table
                    .renames
                    .get(&state.name)
                    .cloned()
                    .unwrap_or_else(|| state.name.clone());
                let initial = table
                    .rewrite_expression(&state.initial_value, &[])
                    .map_err(|m| ResolveError::syntax(&self.file, format!("state `{}`", state.name), m))?;
                self.states.insert(name, initial);
            }
        }

        let mut id_map = HashMap::new();
        for expr in &meta.expressions {
            let new_id = format!("{}{}", expr.id, suffix);
            let code = table
                .rewrite_expression(&expr.code, LoopContext::variables_of(&expr.loop_context))
                .map_err(|m| ResolveError::syntax(&self.file, format!("expression `{}`", expr.id), m))?;
            id_map.insert(expr.id.clone(), new_id.clone());
            self.register(ExpressionIR {
                id: new_id,
                code,
                location: expr.location.clone(),
                loop_context: LoopContext::merge(&expr.loop_context, &caller_scope),
            });
        }

        let forwarded: Vec<AttributeIR> = node
            .attributes
            .iter()
            .filter(|attr| attr.name != "slot" && !declared_props.contains(attr.name.as_str()))
            .cloned()
            .collect();

        // Slot content belongs to the caller: resolved now, in the caller's chain.
        let slots = self.collect_slots(&meta.name, node.children, &caller_scope)?;

        let mut template = meta.nodes.clone();
        let mut rewriter = InstanceRewriter {
            file: &self.file,
            table: &table,
            id_map: &id_map,
            suffix: &suffix,
            caller_scope: &caller_scope,
            loop_stack: Vec::new(),
            extra_expressions: Vec::new(),
            error: None,
        };
        rewriter.visit_children(&mut template);
        if let Some(err) = rewriter.error.take() {
            return Err(err);
        }
        for expr in std::mem::take(&mut rewriter.extra_expressions) {
            self.register(expr);
        }

        if self.options.forward_attributes && !forwarded.is_empty() {
            if !forward_attributes(&mut template, forwarded) {
                warn!(component = %meta.name, "no single root element, caller attributes dropped");
            }
        }

        let mut used_slots = HashSet::new();
        let template = resolve_slots(template, &slots, &mut used_slots);
        for (name, content) in slots.iter() {
            if !content.is_empty() && !used_slots.contains(name) {
                warn!(component = %meta.name, slot = name.as_deref().unwrap_or("default"), "slot content has no matching <slot>");
            }
        }

        self.chain.push(meta.name.clone());
        let resolved = self.resolve_nodes(template);
        self.chain.pop();
        resolved
    }

    fn caller_scope(&self, node: &ComponentNode) -> Option<LoopContext> {
        let enclosing = if self.loop_scope.is_empty() {
            None
        } else {
            Some(LoopContext::new(self.loop_scope.clone(), None))
        };
        LoopContext::merge(&node.loop_context, &enclosing)
    }

    fn instance_table(
        &self,
        meta: &ComponentMetadata,
        node: &ComponentNode,
        symbols: &ScriptSymbols,
        declared_props: &IndexSet<String>,
        suffix: &str,
    ) -> Result<SymbolTable, ResolveError> {
        let mut table = SymbolTable::new();
        table.member_props = true;

        for local in &symbols.locals {
            if !declared_props.contains(local) {
                table.rename(local.clone(), format!("{}{}", local, suffix));
            }
        }

        for prop in declared_props {
            let passed = node.attributes.iter().find(|attr| &attr.name == prop);
            let text = match passed {
                Some(attr) => Some(match &attr.value {
                    AttributeValue::Static(value) => serde_json::to_string(value)?,
                    AttributeValue::Dynamic(expr) => format!("({})", expr.code),
                }),
                None => match symbols.prop(prop).and_then(|p| p.default.as_ref()) {
                    Some(default) => Some(format!("({})", default)),
                    None => match self.options.missing_prop_policy {
                        MissingPropPolicy::PassThrough => None,
                        MissingPropPolicy::Undefined => Some("undefined".to_string()),
                        MissingPropPolicy::Error => {
                            return Err(ResolveError::MissingProp {
                                file: self.file.clone(),
                                component: meta.name.clone(),
                                prop: prop.clone(),
                                line: node.location.line,
                                column: node.location.column,
                            })
                        }
                    },
                },
            };
            if let Some(text) = text {
                table.inline(prop.clone(), text);
            }
        }

        Ok(table)
    }

    fn append_script(&mut self, code: &str) {
        if code.trim().is_empty() {
            return;
        }
        if !self.merged_script.trim().is_empty() {
            self.merged_script.push_str("\n\n");
        }
        self.merged_script.push_str(code.trim_matches('\n'));
    }

    fn register(&mut self, expr: ExpressionIR) {
        if self.expression_ids.insert(expr.id.clone()) {
            self.expressions.push(expr);
        } else {
            warn!(id = %expr.id, "duplicate expression id skipped");
        }
    }

    fn collect_slots(
        &mut self,
        parent: &str,
        children: Vec<TemplateNode>,
        caller_scope: &Option<LoopContext>,
    ) -> Result<SlotContent, ResolveError> {
        let mut slots = SlotContent::default();
        for child in children {
            let (name, content) = match child {
                TemplateNode::Component(marker) => match compound_slot_name(&marker.name, parent) {
                    Some(name) => (Some(name), marker.children),
                    None => (None, vec![TemplateNode::Component(marker)]),
                },
                other => (None, vec![other]),
            };
            let content: Vec<TemplateNode> = content
                .into_iter()
                .map(|c| rebind_node_to_scope(c, caller_scope))
                .collect();
            let content = self.resolve_nodes(content)?;
            slots.entry(name).or_default().extend(content);
        }
        Ok(slots)
    }

    fn missing_component(&self, node: &ComponentNode) -> CompilerError {
        if let Some((parent, _)) = node.name.split_once('.') {
            return CompilerError::with_details(
                Invariant::OrphanCompound,
                &format!("<{}> is used outside of <{}>.", node.name, parent),
                &self.file,
                node.location.line,
                node.location.column,
                Some(format!("<{}>", node.name)),
                vec![format!("Move <{}> directly inside <{}>.", node.name, parent)],
            );
        }

        let mut hints = vec![format!(
            "No component named \"{}\" is registered; names are matched exactly.",
            node.name
        )];
        let lower = node.name.to_lowercase();
        if let Some(close) = self.catalog.names().filter(|n| n.to_lowercase() == lower).min() {
            hints.push(format!("Did you mean <{}>?", close));
        }
        CompilerError::with_details(
            Invariant::UnresolvedComponent,
            &format!("Unresolved component: <{}>.", node.name),
            &self.file,
            node.location.line,
            node.location.column,
            Some(format!("<{}>", node.name)),
            hints,
        )
    }
}

fn declared_props(meta: &ComponentMetadata, symbols: &ScriptSymbols) -> IndexSet<String> {
    let mut props: IndexSet<String> = meta.props.iter().cloned().collect();
    props.extend(symbols.props.iter().map(|p| p.name.clone()));
    props
}

// ═══════════════════════════════════════════════════════════════════════════════
// INSTANCE REWRITE
// ═══════════════════════════════════════════════════════════════════════════════

/// Retargets expression ids, renames attribute code and literal handler
/// names, and rebinds every node to the caller's loop scope.
struct InstanceRewriter<'r> {
    file: &'r str,
    table: &'r SymbolTable,
    id_map: &'r HashMap<String, String>,
    suffix: &'r str,
    caller_scope: &'r Option<LoopContext>,
    /// Loop variables of the component's own loop fragments around the cursor.
    loop_stack: Vec<String>,
    extra_expressions: Vec<ExpressionIR>,
    error: Option<ResolveError>,
}

impl<'r> TemplateVisitor for InstanceRewriter<'r> {
    fn visit_expression_ref(&mut self, id: &mut String) {
        if let Some(new_id) = self.id_map.get(id.as_str()) {
            *id = new_id.clone();
        }
    }

    fn visit_loop_context(&mut self, ctx: &mut Option<LoopContext>) {
        *ctx = LoopContext::merge(ctx, self.caller_scope);
    }

    fn visit_loop_fragment(&mut self, fragment: &mut LoopFragmentNode) {
        let mark = self.loop_stack.len();
        self.loop_stack.extend(fragment.bound_variables());
        walk_loop_fragment(self, fragment);
        self.loop_stack.truncate(mark);
    }

    fn visit_attribute(&mut self, attr: &mut AttributeIR) {
        if self.error.is_some() {
            return;
        }

        match &mut attr.value {
            AttributeValue::Static(value) => {
                if let Some(renamed) = self.table.rewrite_literal(value) {
                    *value = renamed.to_string();
                }
            }
            AttributeValue::Dynamic(expr) => {
                let mut bound = self.loop_stack.clone();
                bound.extend_from_slice(LoopContext::variables_of(&attr.loop_context));
                bound.extend_from_slice(LoopContext::variables_of(&expr.loop_context));

                match self.table.rewrite_expression(&expr.code, &bound) {
                    Ok(code) => expr.code = code,
                    Err(message) => {
                        self.error = Some(ResolveError::syntax(
                            self.file,
                            format!("attribute `{}`", attr.name),
                            message,
                        ));
                        return;
                    }
                }
                expr.loop_context = LoopContext::merge(&expr.loop_context, self.caller_scope);

                match self.id_map.get(&expr.id) {
                    Some(new_id) => expr.id = new_id.clone(),
                    None if !expr.id.is_empty() => {
                        expr.id = format!("{}{}", expr.id, self.suffix);
                        self.extra_expressions.push(expr.clone());
                    }
                    None => {}
                }
            }
        }

        attr.loop_context = LoopContext::merge(&attr.loop_context, self.caller_scope);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SLOTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Slot name (`None` = default) → caller content, in document order.
type SlotContent = IndexMap<Option<String>, Vec<TemplateNode>>;

/// `Card.Header` inside `<Card>` fills the `header` slot.
fn compound_slot_name(component_name: &str, parent_name: &str) -> Option<String> {
    let rest = component_name.strip_prefix(parent_name)?.strip_prefix('.')?;
    if rest.is_empty() {
        return None;
    }
    Some(rest.to_lowercase())
}

fn rebind_node_to_scope(mut node: TemplateNode, scope: &Option<LoopContext>) -> TemplateNode {
    if scope.is_none() {
        return node;
    }

    struct Rebinder<'s>(&'s Option<LoopContext>);

    impl<'s> TemplateVisitor for Rebinder<'s> {
        fn visit_loop_context(&mut self, ctx: &mut Option<LoopContext>) {
            *ctx = LoopContext::merge(ctx, self.0);
        }

        fn visit_attribute(&mut self, attr: &mut AttributeIR) {
            attr.loop_context = LoopContext::merge(&attr.loop_context, self.0);
            if let AttributeValue::Dynamic(expr) = &mut attr.value {
                expr.loop_context = LoopContext::merge(&expr.loop_context, self.0);
            }
        }
    }

    Rebinder(scope).visit_node(&mut node);
    node
}

fn slot_name(attributes: &[AttributeIR]) -> Option<String> {
    attributes.iter().find(|a| a.name == "name").and_then(|a| match &a.value {
        AttributeValue::Static(s) => Some(s.clone()),
        AttributeValue::Dynamic(_) => None,
    })
}

fn resolve_slots(
    nodes: Vec<TemplateNode>,
    slots: &SlotContent,
    used: &mut HashSet<Option<String>>,
) -> Vec<TemplateNode> {
    let mut resolved = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            TemplateNode::Element(elem) if elem.tag.eq_ignore_ascii_case("slot") => {
                let name = slot_name(&elem.attributes);
                match slots.get(&name) {
                    Some(content) if !content.is_empty() => {
                        used.insert(name);
                        resolved.extend(content.iter().cloned());
                    }
                    _ => resolved.extend(resolve_slots(elem.children, slots, used)),
                }
            }
            TemplateNode::Element(mut elem) => {
                elem.children = resolve_slots(elem.children, slots, used);
                resolved.push(TemplateNode::Element(elem));
            }
            TemplateNode::Component(mut comp) => {
                comp.children = resolve_slots(comp.children, slots, used);
                resolved.push(TemplateNode::Component(comp));
            }
            TemplateNode::ConditionalFragment(mut cond) => {
                cond.consequent = resolve_slots(cond.consequent, slots, used);
                cond.alternate = resolve_slots(cond.alternate, slots, used);
                resolved.push(TemplateNode::ConditionalFragment(cond));
            }
            TemplateNode::OptionalFragment(mut opt) => {
                opt.fragment = resolve_slots(opt.fragment, slots, used);
                resolved.push(TemplateNode::OptionalFragment(opt));
            }
            TemplateNode::LoopFragment(mut lp) => {
                lp.body = resolve_slots(lp.body, slots, used);
                resolved.push(TemplateNode::LoopFragment(lp));
            }
            other => resolved.push(other),
        }
    }
    resolved
}

// ═══════════════════════════════════════════════════════════════════════════════
// ATTRIBUTE FORWARDING
// ═══════════════════════════════════════════════════════════════════════════════

/// Forward caller attributes onto the template's single root element.
/// Returns `false` when there is no such root.
fn forward_attributes(template: &mut [TemplateNode], forwarded: Vec<AttributeIR>) -> bool {
    let mut roots = template.iter_mut().filter(|n| !n.is_blank_text());
    let root = match (roots.next(), roots.next()) {
        (Some(TemplateNode::Element(root)), None) if !root.tag.eq_ignore_ascii_case("slot") => root,
        _ => return false,
    };

    for attr in forwarded {
        let existing = root.attributes.iter_mut().find(|a| a.name == attr.name);
        match existing {
            Some(current) if attr.name == "class" => match (&current.value, &attr.value) {
                (AttributeValue::Static(ours), AttributeValue::Static(theirs)) => {
                    current.value = AttributeValue::Static(format!("{} {}", ours, theirs).trim().to_string());
                }
                _ => *current = attr,
            },
            Some(current) => *current = attr,
            None => root.attributes.push(attr),
        }
    }
    true
}
