//! IR model for one `.zen` file.
//!
//! The shapes mirror what the JS host hands across the bridge: nodes are
//! tagged by `type` in kebab-case, fields are camelCase.

#[cfg(feature = "napi")]
use napi_derive::napi;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ═══════════════════════════════════════════════════════════════════════════════
// LOCATIONS & SCOPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

/// Variables introduced by enclosing loops. Codegen emits these unprefixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct LoopContext {
    pub variables: Vec<String>,
    #[serde(default)]
    pub map_source: Option<String>,
}

impl LoopContext {
    pub fn new(variables: Vec<String>, map_source: Option<String>) -> Self {
        Self {
            variables,
            map_source,
        }
    }

    /// Merge a parent scope into an existing one. Existing variables keep
    /// their order, parent variables are appended once.
    pub fn merge(existing: &Option<LoopContext>, parent: &Option<LoopContext>) -> Option<LoopContext> {
        match (existing, parent) {
            (None, None) => None,
            (None, Some(p)) => Some(p.clone()),
            (Some(ex), None) => Some(ex.clone()),
            (Some(ex), Some(p)) => {
                let mut variables = ex.variables.clone();
                for v in &p.variables {
                    if !variables.contains(v) {
                        variables.push(v.clone());
                    }
                }
                Some(LoopContext {
                    variables,
                    map_source: p.map_source.clone().or_else(|| ex.map_source.clone()),
                })
            }
        }
    }

    pub fn variables_of(ctx: &Option<LoopContext>) -> &[String] {
        ctx.as_ref().map(|c| c.variables.as_slice()).unwrap_or(&[])
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPRESSIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// A template expression. Identity is the `id`, never the code text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionIR {
    #[serde(default)]
    pub id: String,
    pub code: String,
    #[serde(default)]
    pub location: SourceLocation,
    #[serde(default)]
    pub loop_context: Option<LoopContext>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPLATE NODES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TemplateNode {
    Element(ElementNode),
    Text(TextNode),
    Expression(ExpressionNode),
    Component(ComponentNode),
    ConditionalFragment(ConditionalFragmentNode),
    OptionalFragment(OptionalFragmentNode),
    LoopFragment(LoopFragmentNode),
    Doctype(DoctypeNode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementNode {
    pub tag: String,
    #[serde(default)]
    pub attributes: Vec<AttributeIR>,
    #[serde(default)]
    pub children: Vec<TemplateNode>,
    #[serde(default)]
    pub location: SourceLocation,
    #[serde(default)]
    pub loop_context: Option<LoopContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextNode {
    pub value: String,
    #[serde(default)]
    pub location: SourceLocation,
    #[serde(default)]
    pub loop_context: Option<LoopContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionNode {
    /// Id of an entry in the expression registry.
    pub expression: String,
    #[serde(default)]
    pub location: SourceLocation,
    #[serde(default)]
    pub loop_context: Option<LoopContext>,
}

/// Pre-expansion component reference. Must not survive resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentNode {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<AttributeIR>,
    #[serde(default)]
    pub children: Vec<TemplateNode>,
    #[serde(default)]
    pub location: SourceLocation,
    #[serde(default)]
    pub loop_context: Option<LoopContext>,
}

/// Both branches are compiled; the runtime only toggles visibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalFragmentNode {
    pub condition: String,
    #[serde(default)]
    pub consequent: Vec<TemplateNode>,
    #[serde(default)]
    pub alternate: Vec<TemplateNode>,
    #[serde(default)]
    pub location: SourceLocation,
    #[serde(default)]
    pub loop_context: Option<LoopContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionalFragmentNode {
    pub condition: String,
    #[serde(default)]
    pub fragment: Vec<TemplateNode>,
    #[serde(default)]
    pub location: SourceLocation,
    #[serde(default)]
    pub loop_context: Option<LoopContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopFragmentNode {
    /// Id of the source collection expression.
    pub source: String,
    pub item_var: String,
    #[serde(default)]
    pub index_var: Option<String>,
    #[serde(default)]
    pub body: Vec<TemplateNode>,
    #[serde(default)]
    pub location: SourceLocation,
    #[serde(default)]
    pub loop_context: Option<LoopContext>,
}

impl LoopFragmentNode {
    /// Variables this loop binds for its body.
    pub fn bound_variables(&self) -> Vec<String> {
        let mut vars = vec![self.item_var.clone()];
        if let Some(index) = &self.index_var {
            vars.push(index.clone());
        }
        vars
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctypeNode {
    pub name: String,
    #[serde(default)]
    pub public_id: String,
    #[serde(default)]
    pub system_id: String,
    #[serde(default)]
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Static(String),
    Dynamic(ExpressionIR),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeIR {
    pub name: String,
    pub value: AttributeValue,
    #[serde(default)]
    pub location: SourceLocation,
    #[serde(default)]
    pub loop_context: Option<LoopContext>,
}

impl AttributeIR {
    /// `onclick`, `on:click` and the host's `data-zen-*` handler attributes.
    pub fn is_event_handler(&self) -> bool {
        self.name.starts_with("on") || self.name.starts_with("data-zen-")
    }
}

impl TemplateNode {
    pub fn location(&self) -> &SourceLocation {
        match self {
            TemplateNode::Element(n) => &n.location,
            TemplateNode::Text(n) => &n.location,
            TemplateNode::Expression(n) => &n.location,
            TemplateNode::Component(n) => &n.location,
            TemplateNode::ConditionalFragment(n) => &n.location,
            TemplateNode::OptionalFragment(n) => &n.location,
            TemplateNode::LoopFragment(n) => &n.location,
            TemplateNode::Doctype(n) => &n.location,
        }
    }

    /// Every child sequence owned by this node, in document order.
    pub fn child_lists(&self) -> Vec<&[TemplateNode]> {
        match self {
            TemplateNode::Element(n) => vec![&n.children],
            TemplateNode::Component(n) => vec![&n.children],
            TemplateNode::ConditionalFragment(n) => vec![&n.consequent, &n.alternate],
            TemplateNode::OptionalFragment(n) => vec![&n.fragment],
            TemplateNode::LoopFragment(n) => vec![&n.body],
            TemplateNode::Text(_) | TemplateNode::Expression(_) | TemplateNode::Doctype(_) => {
                vec![]
            }
        }
    }

    pub fn is_blank_text(&self) -> bool {
        matches!(self, TemplateNode::Text(t) if t.value.trim().is_empty())
    }
}

/// Number of `component` nodes anywhere under `nodes`.
pub fn count_components(nodes: &[TemplateNode]) -> usize {
    nodes
        .iter()
        .map(|node| {
            let own = usize::from(matches!(node, TemplateNode::Component(_)));
            own + node
                .child_lists()
                .into_iter()
                .map(count_components)
                .sum::<usize>()
        })
        .sum()
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILE-LEVEL IR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateIR {
    #[serde(default)]
    pub raw: String,
    #[serde(default)]
    pub nodes: Vec<TemplateNode>,
    #[serde(default)]
    pub expressions: Vec<ExpressionIR>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptIR {
    pub raw: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleIR {
    pub raw: String,
}

/// Original script of a used component, kept for the bundler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentScriptIR {
    pub name: String,
    pub path: String,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZenIR {
    pub file_path: String,
    pub template: TemplateIR,
    #[serde(default)]
    pub script: Option<ScriptIR>,
    #[serde(default)]
    pub styles: Vec<StyleIR>,
    #[serde(default)]
    pub component_scripts: Vec<ComponentScriptIR>,
    /// State names declared by the page itself, captured before inlining.
    #[serde(default)]
    pub page_bindings: Vec<String>,
    /// Every state binding after inlining, mapped to its initializer text.
    #[serde(default)]
    pub all_states: IndexMap<String, String>,
}

impl ZenIR {
    pub fn new(file_path: impl Into<String>, nodes: Vec<TemplateNode>, expressions: Vec<ExpressionIR>) -> Self {
        ZenIR {
            file_path: file_path.into(),
            template: TemplateIR {
                raw: String::new(),
                nodes,
                expressions,
            },
            script: None,
            styles: vec![],
            component_scripts: vec![],
            page_bindings: vec![],
            all_states: IndexMap::new(),
        }
    }

    pub fn with_script(mut self, raw: impl Into<String>) -> Self {
        self.script = Some(ScriptIR {
            raw: raw.into(),
            attributes: BTreeMap::new(),
        });
        self
    }

    pub fn expression(&self, id: &str) -> Option<&ExpressionIR> {
        self.template.expressions.iter().find(|e| e.id == id)
    }
}
