//! Script and expression scanning on the oxc AST.
//!
//! Zenith scripts carry two keywords JavaScript does not know: `state x = ...`
//! and `prop x = ...`. Before parsing they are masked to `let` of the *same
//! byte length*, so every span the parser reports lines up with the original
//! text and edits can be applied to it directly.

use indexmap::IndexSet;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    AssignmentExpression, AssignmentTarget, ArrowFunctionExpression, BindingIdentifier,
    BindingPattern, Declaration, Expression, Function, IdentifierReference, ImportDeclaration,
    ImportDeclarationSpecifier, JSXElement, JSXFragment, SimpleAssignmentTarget, Statement,
    StaticMemberExpression, UpdateExpression, VariableDeclaration, VariableDeclarationKind,
};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};
use oxc_syntax::scope::ScopeFlags;
use regex::Regex;
use std::collections::HashSet;

lazy_static::lazy_static! {
    static ref KEYWORD_DECL: Regex =
        Regex::new(r"(^|[;{}\n])([ \t\r\n]*)(state|prop)([ \t]+)([A-Za-z_$])").unwrap();
}

pub(crate) fn source_type() -> SourceType {
    SourceType::default()
        .with_module(true)
        .with_typescript(true)
        .with_jsx(true)
}

// ═══════════════════════════════════════════════════════════════════════════════
// KEYWORD MASKING
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclKeyword {
    State,
    Prop,
}

/// Script text with `state`/`prop` masked, plus where each keyword sat.
#[derive(Debug, Clone)]
pub struct MaskedScript {
    pub text: String,
    pub keywords: Vec<(u32, DeclKeyword)>,
}

impl MaskedScript {
    fn keyword_at(&self, offset: u32) -> Option<&DeclKeyword> {
        self.keywords
            .iter()
            .find(|(at, _)| *at == offset)
            .map(|(_, kw)| kw)
    }
}

fn replace_keywords(code: &str, state_with: &str, prop_with: &str) -> (String, Vec<(u32, DeclKeyword)>) {
    let mut out = String::with_capacity(code.len());
    let mut keywords = Vec::new();
    let mut last = 0;

    for caps in KEYWORD_DECL.captures_iter(code) {
        let kw = match caps.get(3) {
            Some(m) => m,
            None => continue,
        };
        out.push_str(&code[last..kw.start()]);
        let kind = if kw.as_str() == "state" {
            out.push_str(state_with);
            DeclKeyword::State
        } else {
            out.push_str(prop_with);
            DeclKeyword::Prop
        };
        keywords.push((kw.start() as u32, kind));
        last = kw.end();
    }
    out.push_str(&code[last..]);
    (out, keywords)
}

/// Length-preserving mask: `state` → `let  `, `prop` → `let `.
pub fn mask_keywords(code: &str) -> MaskedScript {
    let (text, keywords) = replace_keywords(code, "let  ", "let ");
    MaskedScript { text, keywords }
}

/// Lower `state`/`prop` to plain `let` for emitted JavaScript. Only keywords
/// that open a parsed declaration are touched; string and template text is not.
pub fn lower_keywords(code: &str) -> Result<String, String> {
    let masked = mask_keywords(code);
    if masked.keywords.is_empty() {
        return Ok(code.to_string());
    }
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, &masked.text, source_type()).parse();
    if let Some(err) = ret.errors.first() {
        return Err(err.to_string());
    }

    let mut starts: Vec<u32> = Vec::new();
    for stmt in &ret.program.body {
        let decl = match stmt {
            Statement::VariableDeclaration(decl) => Some(decl),
            Statement::ExportNamedDeclaration(export) => match &export.declaration {
                Some(Declaration::VariableDeclaration(decl)) => Some(decl),
                _ => None,
            },
            _ => None,
        };
        if let Some(decl) = decl {
            if masked.keyword_at(decl.span.start).is_some() {
                starts.push(decl.span.start);
            }
        }
    }

    let mut out = String::with_capacity(code.len());
    let mut last = 0;
    for (at, kind) in &masked.keywords {
        if !starts.contains(at) {
            continue;
        }
        let at = *at as usize;
        let len = match kind {
            DeclKeyword::State => "state".len(),
            DeclKeyword::Prop => "prop".len(),
        };
        out.push_str(&code[last..at]);
        out.push_str("let");
        last = at + len;
    }
    out.push_str(&code[last..]);
    Ok(out)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOP-LEVEL INVENTORY
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct StateDeclaration {
    pub name: String,
    pub initial_value: String,
}

/// `prop name [= default]`; `start..end` covers the whole declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct PropDeclaration {
    pub name: String,
    pub default: Option<String>,
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportRecord {
    pub source: String,
    pub start: u32,
    pub end: u32,
    pub text: String,
    pub type_only: bool,
    pub side_effect: bool,
    pub bindings: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptSymbols {
    /// Top-level var/let/const/function/class/state names, imports excluded.
    pub locals: IndexSet<String>,
    pub states: Vec<StateDeclaration>,
    pub props: Vec<PropDeclaration>,
    pub imports: Vec<ImportRecord>,
}

impl ScriptSymbols {
    pub fn prop_spans(&self) -> Vec<(u32, u32)> {
        let mut spans: Vec<(u32, u32)> = self.props.iter().map(|p| (p.start, p.end)).collect();
        spans.dedup();
        spans
    }

    pub fn import_spans(&self) -> Vec<(u32, u32)> {
        self.imports.iter().map(|i| (i.start, i.end)).collect()
    }

    pub fn prop(&self, name: &str) -> Option<&PropDeclaration> {
        self.props.iter().find(|p| p.name == name)
    }

    fn record_variables(&mut self, decl: &VariableDeclaration, masked: &MaskedScript, code: &str) {
        let keyword = masked.keyword_at(decl.span.start);
        for declarator in &decl.declarations {
            let init = declarator
                .init
                .as_ref()
                .map(|init| init.span().source_text(code).to_string());

            for name in binding_names(&declarator.id) {
                match keyword {
                    Some(DeclKeyword::Prop) => self.props.push(PropDeclaration {
                        name,
                        default: init.clone(),
                        start: decl.span.start,
                        end: decl.span.end,
                    }),
                    Some(DeclKeyword::State) => {
                        self.states.push(StateDeclaration {
                            name: name.clone(),
                            initial_value: init.clone().unwrap_or_else(|| "undefined".to_string()),
                        });
                        self.locals.insert(name);
                    }
                    None => {
                        self.locals.insert(name);
                    }
                }
            }
        }
    }

    fn record_import(&mut self, import: &ImportDeclaration, code: &str) {
        let bindings = import
            .specifiers
            .as_ref()
            .map(|specs| {
                specs
                    .iter()
                    .map(|spec| match spec {
                        ImportDeclarationSpecifier::ImportSpecifier(s) => s.local.name.to_string(),
                        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => s.local.name.to_string(),
                        ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => s.local.name.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        self.imports.push(ImportRecord {
            source: import.source.value.to_string(),
            start: import.span.start,
            end: import.span.end,
            text: import.span.source_text(code).to_string(),
            type_only: import.import_kind.is_type(),
            side_effect: import.specifiers.is_none(),
            bindings,
        });
    }
}

/// Inventory a script's top level. Fails with the parser's first diagnostic.
pub fn scan_script(code: &str) -> Result<ScriptSymbols, String> {
    let masked = mask_keywords(code);
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, &masked.text, source_type()).parse();
    if let Some(err) = ret.errors.first() {
        return Err(err.to_string());
    }

    let mut symbols = ScriptSymbols::default();
    for stmt in &ret.program.body {
        match stmt {
            Statement::VariableDeclaration(decl) => symbols.record_variables(decl, &masked, code),
            Statement::FunctionDeclaration(func) => {
                if let Some(id) = &func.id {
                    symbols.locals.insert(id.name.to_string());
                }
            }
            Statement::ClassDeclaration(class) => {
                if let Some(id) = &class.id {
                    symbols.locals.insert(id.name.to_string());
                }
            }
            Statement::ImportDeclaration(import) => symbols.record_import(import, code),
            Statement::ExportNamedDeclaration(export) => match &export.declaration {
                Some(Declaration::VariableDeclaration(decl)) => {
                    symbols.record_variables(decl, &masked, code)
                }
                Some(Declaration::FunctionDeclaration(func)) => {
                    if let Some(id) = &func.id {
                        symbols.locals.insert(id.name.to_string());
                    }
                }
                Some(Declaration::ClassDeclaration(class)) => {
                    if let Some(id) = &class.id {
                        symbols.locals.insert(id.name.to_string());
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }

    Ok(symbols)
}

/// Names bound by a (possibly destructuring) pattern.
pub(crate) fn binding_names(pattern: &BindingPattern) -> Vec<String> {
    let mut names = Vec::new();
    collect_binding_pattern(pattern, &mut names);
    names
}

fn collect_binding_pattern(pattern: &BindingPattern, names: &mut Vec<String>) {
    match pattern {
        BindingPattern::BindingIdentifier(id) => names.push(id.name.to_string()),
        BindingPattern::ObjectPattern(obj) => {
            for prop in &obj.properties {
                collect_binding_pattern(&prop.value, names);
            }
            if let Some(rest) = &obj.rest {
                collect_binding_pattern(&rest.argument, names);
            }
        }
        BindingPattern::ArrayPattern(arr) => {
            for pattern in arr.elements.iter().flatten() {
                collect_binding_pattern(pattern, names);
            }
            if let Some(rest) = &arr.rest {
                collect_binding_pattern(&rest.argument, names);
            }
        }
        BindingPattern::AssignmentPattern(assign) => collect_binding_pattern(&assign.left, names),
    }
}

/// Declarations a statement list introduces into its own scope. `var` is
/// only counted where it hoists to, i.e. function bodies.
pub(crate) fn scope_declarations(statements: &[Statement], include_var: bool, scope: &mut HashSet<String>) {
    for stmt in statements {
        match stmt {
            Statement::VariableDeclaration(decl) => {
                if include_var || decl.kind != VariableDeclarationKind::Var {
                    for declarator in &decl.declarations {
                        scope.extend(binding_names(&declarator.id));
                    }
                }
            }
            Statement::FunctionDeclaration(func) => {
                if let Some(id) = &func.id {
                    scope.insert(id.name.to_string());
                }
            }
            Statement::ClassDeclaration(class) => {
                if let Some(id) = &class.id {
                    scope.insert(id.name.to_string());
                }
            }
            _ => {}
        }
    }
}

/// Every binding identifier under a node (parameter lists, catch params).
pub(crate) struct BindingCollector<'s> {
    pub symbols: &'s mut HashSet<String>,
}

impl<'a, 's> Visit<'a> for BindingCollector<'s> {
    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        self.symbols.insert(ident.name.to_string());
    }

    fn visit_function(&mut self, _func: &Function<'a>, _flags: ScopeFlags) {}

    fn visit_arrow_function_expression(&mut self, _func: &ArrowFunctionExpression<'a>) {}
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPRESSION QUERIES
// ═══════════════════════════════════════════════════════════════════════════════

/// Identifier references, plus the property of every `props.x` access.
struct ReferenceCollector {
    names: IndexSet<String>,
}

impl<'a> Visit<'a> for ReferenceCollector {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        self.names.insert(ident.name.to_string());
    }

    fn visit_static_member_expression(&mut self, expr: &StaticMemberExpression<'a>) {
        if let Expression::Identifier(object) = &expr.object {
            if object.name == "props" {
                self.names.insert(expr.property.name.to_string());
            }
        }
        walk::walk_static_member_expression(self, expr);
    }
}

pub fn expression_references(code: &str) -> Result<IndexSet<String>, String> {
    let allocator = Allocator::default();
    let expr = Parser::new(&allocator, code, source_type())
        .parse_expression()
        .map_err(|errors| first_error(&errors))?;
    let mut collector = ReferenceCollector {
        names: IndexSet::new(),
    };
    collector.visit_expression(&expr);
    Ok(collector.names)
}

pub fn script_references(code: &str) -> Result<IndexSet<String>, String> {
    let masked = mask_keywords(code);
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, &masked.text, source_type()).parse();
    if let Some(err) = ret.errors.first() {
        return Err(err.to_string());
    }
    let mut collector = ReferenceCollector {
        names: IndexSet::new(),
    };
    collector.visit_program(&ret.program);
    Ok(collector.names)
}

struct JsxDetector {
    found: bool,
}

impl<'a> Visit<'a> for JsxDetector {
    fn visit_jsx_element(&mut self, _elem: &JSXElement<'a>) {
        self.found = true;
    }

    fn visit_jsx_fragment(&mut self, _frag: &JSXFragment<'a>) {
        self.found = true;
    }
}

/// Whether expression code builds markup at runtime. Unparseable code is
/// reported as `false`; syntax is not this check's concern.
pub fn contains_jsx(code: &str) -> bool {
    let allocator = Allocator::default();
    match Parser::new(&allocator, code, source_type()).parse_expression() {
        Ok(expr) => {
            let mut detector = JsxDetector { found: false };
            detector.visit_expression(&expr);
            detector.found
        }
        Err(_) => false,
    }
}

struct MutationFinder<F: Fn(&str) -> bool> {
    is_state: F,
    function_depth: u32,
    found: Option<String>,
}

impl<F: Fn(&str) -> bool> MutationFinder<F> {
    fn check(&mut self, name: &str) {
        if self.function_depth == 0 && self.found.is_none() && (self.is_state)(name) {
            self.found = Some(name.to_string());
        }
    }
}

impl<'a, F: Fn(&str) -> bool> Visit<'a> for MutationFinder<F> {
    fn visit_function(&mut self, func: &Function<'a>, flags: ScopeFlags) {
        self.function_depth += 1;
        walk::walk_function(self, func, flags);
        self.function_depth -= 1;
    }

    fn visit_arrow_function_expression(&mut self, func: &ArrowFunctionExpression<'a>) {
        self.function_depth += 1;
        walk::walk_arrow_function_expression(self, func);
        self.function_depth -= 1;
    }

    fn visit_assignment_expression(&mut self, expr: &AssignmentExpression<'a>) {
        if let AssignmentTarget::AssignmentTargetIdentifier(id) = &expr.left {
            self.check(id.name.as_str());
        }
        walk::walk_assignment_expression(self, expr);
    }

    fn visit_update_expression(&mut self, expr: &UpdateExpression<'a>) {
        if let SimpleAssignmentTarget::AssignmentTargetIdentifier(id) = &expr.argument {
            self.check(id.name.as_str());
        }
        walk::walk_update_expression(self, expr);
    }
}

/// First state binding written outside any function in `code`.
pub fn find_state_mutation<F: Fn(&str) -> bool>(code: &str, is_state: F) -> Option<String> {
    let allocator = Allocator::default();
    let expr = Parser::new(&allocator, code, source_type())
        .parse_expression()
        .ok()?;
    let mut finder = MutationFinder {
        is_state,
        function_depth: 0,
        found: None,
    };
    finder.visit_expression(&expr);
    finder.found
}

pub(crate) fn first_error<E: std::fmt::Display>(errors: &[E]) -> String {
    errors
        .first()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown parse error".to_string())
}
