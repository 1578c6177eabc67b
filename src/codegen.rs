//! Renders a resolved `ZenIR` into the module text the runtime consumes.
//!
//! Section order is part of the contract: imports, declarations, state
//! object, expression functions, registry. Every state binding is declared
//! before `zenState(...)` reads it, and the state object exists before any
//! expression function can be called.

#[cfg(feature = "napi")]
use napi_derive::napi;
use indexmap::{IndexMap, IndexSet};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::trace;

use crate::error::ResolveError;
use crate::ir::{LoopContext, ZenIR};
use crate::renamer::SymbolTable;
use crate::scope::{expression_references, lower_keywords, scan_script, ScriptSymbols};
use crate::validate::validate_precompiled;

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

pub const RUNTIME_MODULE: &str = "@zenithbuild/runtime";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct ScriptImport {
    pub source: String,
    pub specifiers: String,
    pub type_only: bool,
    pub side_effect: bool,
}

impl ScriptImport {
    /// Resolved by the bundler's node resolution rather than a path.
    pub fn is_bare(&self) -> bool {
        !(self.source.starts_with('.')
            || self.source.starts_with('/')
            || self.source.contains("://")
            || self.source.starts_with("\0"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct EmittedModule {
    pub imports: Vec<ScriptImport>,
    pub import_code: String,
    pub declarations: String,
    pub state_init: String,
    pub expressions: String,
    pub registry: String,
    pub styles: String,
    /// All sections joined in contract order.
    pub code: String,
}

lazy_static! {
    static ref IMPORT_SPECIFIERS: Regex = Regex::new(r"(?s)^import\s+(?:type\s+)?(.*?)\s+from\b").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// EMITTER
// ═══════════════════════════════════════════════════════════════════════════════

pub fn emit_module(ir: &ZenIR) -> Result<EmittedModule, ResolveError> {
    validate_precompiled(ir)?;

    let file = ir.file_path.as_str();
    let script = ir.script.as_ref().map(|s| s.raw.as_str()).unwrap_or("");
    let symbols = scan_script(script).map_err(|e| ResolveError::syntax(file, "script", e))?;

    let (imports, import_code) = hoist_imports(&symbols);
    let states = state_table(ir, &symbols);

    let mut deferred = SymbolTable::new();
    deferred.deferred_inlines = true;
    for name in states.keys() {
        deferred.inline(name.clone(), format!("state.{}", name));
    }
    trace!(file, states = states.len(), "state access table");

    let declarations = deferred
        .rewrite_script(script, &symbols.import_spans())
        .and_then(|code| lower_keywords(&code))
        .map(|code| code.trim().to_string())
        .map_err(|e| ResolveError::syntax(file, "script", e))?;

    let state_init = render_state_init(&states, &symbols);

    let mut immediate = deferred.clone();
    immediate.deferred_inlines = false;

    let mut fn_names = HashSet::new();
    let mut functions = Vec::with_capacity(ir.template.expressions.len());
    let mut entries = Vec::with_capacity(ir.template.expressions.len());
    for expr in &ir.template.expressions {
        let loop_vars = LoopContext::variables_of(&expr.loop_context);
        let body = immediate
            .rewrite_expression(&expr.code, loop_vars)
            .map_err(|e| ResolveError::syntax(file, format!("expression `{}`", expr.id), e))?;

        let fn_name = unique_fn_name(&expr.id, &mut fn_names);
        let mut params = vec!["state".to_string()];
        params.extend(loop_vars.iter().cloned());
        functions.push(format!(
            "function {}({}) {{\n  return ({});\n}}",
            fn_name,
            params.join(", "),
            body.trim().trim_end_matches(';')
        ));

        let deps: Vec<String> = expression_references(&expr.code)
            .map(|refs| {
                refs.into_iter()
                    .filter(|r| states.contains_key(r) && !loop_vars.contains(r))
                    .map(|r| quote(&r))
                    .collect()
            })
            .unwrap_or_default();
        entries.push(format!(
            "  [{}, {{ fn: {}, deps: [{}] }}]",
            quote(&expr.id),
            fn_name,
            deps.join(", ")
        ));
    }

    let expressions = functions.join("\n\n");
    let registry = if entries.is_empty() {
        "export const expressions = new Map();".to_string()
    } else {
        format!("export const expressions = new Map([\n{}\n]);", entries.join(",\n"))
    };
    let styles = ir
        .styles
        .iter()
        .map(|s| s.raw.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let mut sections = vec![format!("import {{ state as zenState }} from {};", quote(RUNTIME_MODULE))];
    if !import_code.is_empty() {
        sections[0].push('\n');
        sections[0].push_str(&import_code);
    }
    for section in [&declarations, &state_init, &expressions, &registry] {
        if !section.is_empty() {
            sections.push(section.clone());
        }
    }
    sections.push("export { state };".to_string());
    let code = sections.join("\n\n") + "\n";

    Ok(EmittedModule {
        imports,
        import_code,
        declarations,
        state_init,
        expressions,
        registry,
        styles,
        code,
    })
}

/// `.zen` imports were consumed by resolution; the rest are emitted once each.
fn hoist_imports(symbols: &ScriptSymbols) -> (Vec<ScriptImport>, String) {
    let mut seen = IndexSet::new();
    let mut imports = Vec::new();
    let mut lines = Vec::new();

    for record in &symbols.imports {
        if record.source.ends_with(".zen") {
            continue;
        }
        let text = record.text.trim().to_string();
        if !seen.insert(text.clone()) {
            continue;
        }
        let specifiers = IMPORT_SPECIFIERS
            .captures(&text)
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        if !record.type_only {
            lines.push(if text.ends_with(';') { text.clone() } else { format!("{};", text) });
        }
        imports.push(ScriptImport {
            source: record.source.clone(),
            specifiers,
            type_only: record.type_only,
            side_effect: record.side_effect,
        });
    }

    (imports, lines.join("\n"))
}

/// Every state the module owns, in declaration order, with its initializer.
fn state_table(ir: &ZenIR, symbols: &ScriptSymbols) -> IndexMap<String, String> {
    let mut states: IndexMap<String, String> = ir.all_states.clone();
    for decl in &symbols.states {
        states
            .entry(decl.name.clone())
            .or_insert_with(|| decl.initial_value.clone());
    }
    for name in &ir.page_bindings {
        states
            .entry(name.clone())
            .or_insert_with(|| "undefined".to_string());
    }
    states
}

fn render_state_init(states: &IndexMap<String, String>, symbols: &ScriptSymbols) -> String {
    if states.is_empty() {
        return "const state = zenState({});".to_string();
    }
    let fields: Vec<String> = states
        .iter()
        .map(|(name, init)| {
            // Declared bindings carry their live value; host-only ones fall back to the initializer.
            if symbols.locals.contains(name) {
                format!("  {}: {}", name, name)
            } else {
                let init = init.trim();
                format!("  {}: {}", name, if init.is_empty() { "undefined" } else { init })
            }
        })
        .collect();
    format!("const state = zenState({{\n{}\n}});", fields.join(",\n"))
}

/// Expression ids are arbitrary strings; function names are not.
pub fn expression_fn_name(id: &str) -> String {
    let sanitized: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '$' { c } else { '_' })
        .collect();
    format!("_expr_{}", sanitized)
}

/// `expr-3` and `expr_3` sanitize alike; later ones get a numeric suffix.
fn unique_fn_name(id: &str, taken: &mut HashSet<String>) -> String {
    let base = expression_fn_name(id);
    let mut name = base.clone();
    let mut n = 1;
    while !taken.insert(name.clone()) {
        name = format!("{}_{}", base, n);
        n += 1;
    }
    name
}

fn quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", escape_js_string(value)))
}

fn escape_js_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "")
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ExpressionIR, ExpressionNode, ScriptIR, SourceLocation, TemplateNode};

    fn expr(id: &str, code: &str, loop_vars: &[&str]) -> ExpressionIR {
        ExpressionIR {
            id: id.to_string(),
            code: code.to_string(),
            location: SourceLocation::default(),
            loop_context: if loop_vars.is_empty() {
                None
            } else {
                Some(LoopContext::new(
                    loop_vars.iter().map(|v| v.to_string()).collect(),
                    None,
                ))
            },
        }
    }

    fn page(script: &str, exprs: Vec<ExpressionIR>) -> ZenIR {
        let nodes = exprs
            .iter()
            .map(|e| {
                TemplateNode::Expression(ExpressionNode {
                    expression: e.id.clone(),
                    location: SourceLocation::default(),
                    loop_context: e.loop_context.clone(),
                })
            })
            .collect();
        let mut ir = ZenIR::new("pages/index.zen", nodes, exprs);
        ir.script = Some(ScriptIR {
            raw: script.to_string(),
            attributes: Default::default(),
        });
        ir
    }

    #[test]
    fn test_escape_js_string() {
        assert_eq!(escape_js_string("hello\"world"), "hello\\\"world");
        assert_eq!(escape_js_string("line1\nline2"), "line1\\nline2");
    }

    #[test]
    fn test_sections_in_contract_order() {
        let ir = page(
            "import { format } from 'date-fns';\nstate count = 1\nfunction inc() { count += 1 }",
            vec![expr("expr_0", "format(count)", &[])],
        );
        let module = emit_module(&ir).unwrap();

        let decl = module.code.find("count = 1").unwrap();
        let init = module.code.find("zenState(").unwrap();
        let func = module.code.find("function _expr_").unwrap();
        let registry = module.code.find("new Map(").unwrap();
        assert!(module.code.find("from 'date-fns'").unwrap() < decl);
        assert!(decl < init && init < func && func < registry);

        assert!(module.declarations.contains("let count = 1"));
        assert!(module.declarations.contains("function inc() { state.count += 1 }"));
        assert!(module.state_init.contains("count: count"));
        assert!(module.expressions.contains("return (format(state.count));"));
        assert!(module.registry.contains("[\"expr_0\", { fn: _expr_expr_0, deps: [\"count\"] }]"));
    }

    #[test]
    fn test_loop_variables_stay_unprefixed() {
        let ir = page(
            "state item = 0",
            vec![expr("expr_1", "item + offset", &["item"])],
        );
        let module = emit_module(&ir).unwrap();
        assert!(module.expressions.contains("function _expr_expr_1(state, item)"));
        assert!(module.expressions.contains("return (item + offset);"));
        assert!(module.registry.contains("deps: []"));
    }

    #[test]
    fn test_imports_hoisted_and_deduplicated() {
        let ir = page(
            "import Button from './Button.zen';\nimport { a } from 'lib';\nimport { a } from 'lib';\nimport type { T } from 'types';",
            vec![],
        );
        let module = emit_module(&ir).unwrap();
        assert_eq!(module.imports.len(), 2);
        assert_eq!(module.imports[0].specifiers, "{ a }");
        assert!(module.imports[1].type_only);
        assert_eq!(module.import_code, "import { a } from 'lib';");
        assert!(!module.code.contains("Button.zen"));
        assert!(!module.declarations.contains("import"));
    }

    #[test]
    fn test_host_only_state_uses_initializer() {
        let mut ir = page("", vec![]);
        ir.all_states.insert("theme".to_string(), "'dark'".to_string());
        let module = emit_module(&ir).unwrap();
        assert!(module.state_init.contains("theme: 'dark'"));
    }

    #[test]
    fn test_rejects_unresolved_components() {
        let mut ir = page("", vec![]);
        ir.template.nodes.push(TemplateNode::Component(crate::ir::ComponentNode {
            name: "Card".to_string(),
            attributes: vec![],
            children: vec![],
            location: SourceLocation { line: 3, column: 1 },
            loop_context: None,
        }));
        let err = emit_module(&ir).unwrap_err();
        assert_eq!(err.code(), Some("COMPONENT_PRECOMPILED"));
    }

    #[test]
    fn test_expression_fn_name_sanitized() {
        assert_eq!(expression_fn_name("expr-3_inst0"), "_expr_expr_3_inst0");
        assert!(ScriptImport {
            source: "lodash/fp".into(),
            specifiers: String::new(),
            type_only: false,
            side_effect: true,
        }
        .is_bare());
    }

    #[test]
    fn test_colliding_function_names_disambiguated() {
        let ir = page("", vec![expr("expr-3", "1", &[]), expr("expr_3", "2", &[])]);
        let module = emit_module(&ir).unwrap();
        assert!(module.expressions.contains("function _expr_expr_3(state)"));
        assert!(module.expressions.contains("function _expr_expr_3_1(state)"));
        assert!(module.registry.contains("[\"expr-3\", { fn: _expr_expr_3, deps: [] }]"));
        assert!(module.registry.contains("[\"expr_3\", { fn: _expr_expr_3_1, deps: [] }]"));
    }

    #[test]
    fn test_keywords_inside_literals_preserved() {
        let ir = page(
            "state count = 0\nconst help = `Docs:\nstate of the art\nprop drilling`;\nconst tip = 'state x';",
            vec![],
        );
        let module = emit_module(&ir).unwrap();
        assert!(module.declarations.contains("let count = 0"), "{}", module.declarations);
        assert!(module.declarations.contains("`Docs:\nstate of the art\nprop drilling`"), "{}", module.declarations);
        assert!(module.declarations.contains("'state x'"));
    }
}
