//! The one substitution function used for script text, expression text and
//! literal attribute values.
//!
//! Edits are collected as `(start, end, text)` spans against the parsed
//! source and applied back-to-front, so untouched code keeps its exact
//! formatting.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    ArrowFunctionExpression, BindingIdentifier, BindingPattern, BindingProperty, BlockStatement,
    CatchClause, Expression, ForInStatement, ForOfStatement, ForStatement, ForStatementInit,
    ForStatementLeft, Function, FunctionType, IdentifierReference, ImportSpecifier,
    ModuleExportName, ObjectProperty, StaticMemberExpression,
};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_syntax::scope::ScopeFlags;
use std::collections::{HashMap, HashSet};

use crate::scope::{
    binding_names, first_error, mask_keywords, scope_declarations, source_type, BindingCollector,
};

/// Renames and inline substitutions for one instantiation (or one emitted module).
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    /// Identifier → identifier, applied to bindings and references.
    pub renames: HashMap<String, String>,
    /// Identifier → replacement text, applied to references only.
    pub inlines: HashMap<String, String>,
    /// Also substitute `props.x` with the inline for `x`.
    pub member_props: bool,
    /// Only apply inlines inside function bodies.
    pub deferred_inlines: bool,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rename(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.renames.insert(from.into(), to.into());
    }

    pub fn inline(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.inlines.insert(name.into(), text.into());
    }

    pub fn is_empty(&self) -> bool {
        self.renames.is_empty() && self.inlines.is_empty()
    }

    /// A literal attribute value that *is* a renamed identifier.
    pub fn rewrite_literal(&self, value: &str) -> Option<&str> {
        self.renames.get(value).map(String::as_str)
    }

    /// Rewrite a whole script. Declarations covered by `strip` are removed.
    pub fn rewrite_script(&self, code: &str, strip: &[(u32, u32)]) -> Result<String, String> {
        if self.is_empty() && strip.is_empty() {
            return Ok(code.to_string());
        }

        let masked = mask_keywords(code);
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, &masked.text, source_type()).parse();
        if !ret.errors.is_empty() {
            return Err(first_error(&ret.errors));
        }

        let mut visitor = RenamerVisitor::new(self, HashSet::new());
        visitor.visit_program(&ret.program);
        Ok(apply_replacements(code, visitor.replacements, strip))
    }

    /// Rewrite expression text. `bound` names (loop variables) are never touched.
    pub fn rewrite_expression(&self, code: &str, bound: &[String]) -> Result<String, String> {
        if self.is_empty() {
            return Ok(code.to_string());
        }

        let allocator = Allocator::default();
        let expr = Parser::new(&allocator, code, source_type())
            .parse_expression()
            .map_err(|errors| first_error(&errors))?;

        let mut visitor = RenamerVisitor::new(self, bound.iter().cloned().collect());
        visitor.visit_expression(&expr);
        Ok(apply_replacements(code, visitor.replacements, &[]))
    }
}

fn apply_replacements(code: &str, mut replacements: Vec<(u32, u32, String)>, strip: &[(u32, u32)]) -> String {
    replacements.retain(|(start, end, _)| !strip.iter().any(|(s, e)| start >= s && end <= e));
    replacements.extend(strip.iter().map(|(s, e)| (*s, *e, String::new())));
    replacements.sort_by(|a, b| b.0.cmp(&a.0));
    replacements.dedup_by(|a, b| a.0 == b.0 && a.1 == b.1);

    let mut result = code.to_string();
    for (start, end, text) in replacements {
        result.replace_range((start as usize)..(end as usize), &text);
    }
    result
}

struct RenamerVisitor<'t> {
    table: &'t SymbolTable,
    scopes: Vec<HashSet<String>>,
    function_depth: u32,
    replacements: Vec<(u32, u32, String)>,
}

impl<'t> RenamerVisitor<'t> {
    fn new(table: &'t SymbolTable, bound: HashSet<String>) -> Self {
        let scopes = if bound.is_empty() { vec![] } else { vec![bound] };
        RenamerVisitor {
            table,
            scopes,
            function_depth: 0,
            replacements: Vec::new(),
        }
    }

    fn shadowed(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    fn reference(&self, name: &str) -> Option<String> {
        if self.shadowed(name) {
            return None;
        }
        if let Some(renamed) = self.table.renames.get(name) {
            return Some(renamed.clone());
        }
        if self.table.deferred_inlines && self.function_depth == 0 {
            return None;
        }
        self.table.inlines.get(name).cloned()
    }

    fn binding(&self, name: &str) -> Option<String> {
        if self.shadowed(name) {
            return None;
        }
        self.table.renames.get(name).cloned()
    }

    fn enter_function_scope(&mut self, mut scope: HashSet<String>, params: &oxc_ast::ast::FormalParameters) {
        let mut collector = BindingCollector { symbols: &mut scope };
        collector.visit_formal_parameters(params);
        self.scopes.push(scope);
        self.function_depth += 1;
    }

    fn leave_function_scope(&mut self) {
        self.function_depth -= 1;
        self.scopes.pop();
    }
}

impl<'a, 't> Visit<'a> for RenamerVisitor<'t> {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        if let Some(text) = self.reference(ident.name.as_str()) {
            self.replacements.push((ident.span.start, ident.span.end, text));
        }
    }

    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        if let Some(text) = self.binding(ident.name.as_str()) {
            self.replacements.push((ident.span.start, ident.span.end, text));
        }
    }

    fn visit_object_property(&mut self, prop: &ObjectProperty<'a>) {
        if prop.shorthand {
            if let Expression::Identifier(ident) = &prop.value {
                if let Some(text) = self.reference(ident.name.as_str()) {
                    self.replacements.push((
                        ident.span.start,
                        ident.span.end,
                        format!("{}: {}", ident.name, text),
                    ));
                    return;
                }
            }
        }
        walk::walk_object_property(self, prop);
    }

    fn visit_binding_property(&mut self, prop: &BindingProperty<'a>) {
        if prop.shorthand {
            let ident = match &prop.value {
                BindingPattern::BindingIdentifier(id) => Some(id),
                BindingPattern::AssignmentPattern(assign) => match &assign.left {
                    BindingPattern::BindingIdentifier(id) => Some(id),
                    _ => None,
                },
                _ => None,
            };
            if let Some(ident) = ident {
                if let Some(text) = self.binding(ident.name.as_str()) {
                    self.replacements.push((
                        ident.span.start,
                        ident.span.end,
                        format!("{}: {}", ident.name, text),
                    ));
                    if let BindingPattern::AssignmentPattern(assign) = &prop.value {
                        self.visit_expression(&assign.right);
                    }
                    return;
                }
            }
        }
        walk::walk_binding_property(self, prop);
    }

    fn visit_static_member_expression(&mut self, expr: &StaticMemberExpression<'a>) {
        if self.table.member_props {
            if let Expression::Identifier(object) = &expr.object {
                if object.name == "props" && !self.shadowed("props") {
                    if let Some(text) = self.table.inlines.get(expr.property.name.as_str()) {
                        self.replacements.push((expr.span.start, expr.span.end, text.clone()));
                        return;
                    }
                }
            }
        }
        walk::walk_static_member_expression(self, expr);
    }

    fn visit_import_specifier(&mut self, specifier: &ImportSpecifier<'a>) {
        let local_name = specifier.local.name.as_str();
        if let Some(new_name) = self.table.renames.get(local_name) {
            let imported_name = match &specifier.imported {
                ModuleExportName::IdentifierName(id) => id.name.as_str(),
                ModuleExportName::StringLiteral(s) => s.value.as_str(),
                ModuleExportName::IdentifierReference(id) => id.name.as_str(),
            };
            if imported_name == local_name {
                // { Foo } -> { Foo as Foo_inst0 }
                self.replacements.push((
                    specifier.span.start,
                    specifier.span.end,
                    format!("{} as {}", imported_name, new_name),
                ));
                return;
            }
        }
        walk::walk_import_specifier(self, specifier);
    }

    fn visit_function(&mut self, func: &Function<'a>, _flags: ScopeFlags) {
        let mut scope = HashSet::new();
        match (&func.id, &func.r#type) {
            (Some(id), FunctionType::FunctionDeclaration) => self.visit_binding_identifier(id),
            (Some(id), _) => {
                scope.insert(id.name.to_string());
            }
            (None, _) => {}
        }
        if let Some(body) = &func.body {
            scope_declarations(&body.statements, true, &mut scope);
        }

        self.enter_function_scope(scope, &func.params);
        self.visit_formal_parameters(&func.params);
        if let Some(body) = &func.body {
            self.visit_function_body(body);
        }
        self.leave_function_scope();
    }

    fn visit_arrow_function_expression(&mut self, func: &ArrowFunctionExpression<'a>) {
        let mut scope = HashSet::new();
        scope_declarations(&func.body.statements, true, &mut scope);

        self.enter_function_scope(scope, &func.params);
        self.visit_formal_parameters(&func.params);
        self.visit_function_body(&func.body);
        self.leave_function_scope();
    }

    fn visit_block_statement(&mut self, block: &BlockStatement<'a>) {
        let mut scope = HashSet::new();
        scope_declarations(&block.body, false, &mut scope);
        self.scopes.push(scope);
        walk::walk_block_statement(self, block);
        self.scopes.pop();
    }

    fn visit_catch_clause(&mut self, clause: &CatchClause<'a>) {
        let scope = clause
            .param
            .as_ref()
            .map(|p| binding_names(&p.pattern).into_iter().collect())
            .unwrap_or_default();
        self.scopes.push(scope);
        walk::walk_catch_clause(self, clause);
        self.scopes.pop();
    }

    fn visit_for_statement(&mut self, stmt: &ForStatement<'a>) {
        let mut scope = HashSet::new();
        if let Some(ForStatementInit::VariableDeclaration(decl)) = &stmt.init {
            for declarator in &decl.declarations {
                scope.extend(binding_names(&declarator.id));
            }
        }
        self.scopes.push(scope);
        walk::walk_for_statement(self, stmt);
        self.scopes.pop();
    }

    fn visit_for_in_statement(&mut self, stmt: &ForInStatement<'a>) {
        let scope = for_left_bindings(&stmt.left);
        self.scopes.push(scope);
        walk::walk_for_in_statement(self, stmt);
        self.scopes.pop();
    }

    fn visit_for_of_statement(&mut self, stmt: &ForOfStatement<'a>) {
        let scope = for_left_bindings(&stmt.left);
        self.scopes.push(scope);
        walk::walk_for_of_statement(self, stmt);
        self.scopes.pop();
    }
}

fn for_left_bindings(left: &ForStatementLeft) -> HashSet<String> {
    match left {
        ForStatementLeft::VariableDeclaration(decl) => decl
            .declarations
            .iter()
            .flat_map(|d| binding_names(&d.id))
            .collect(),
        _ => HashSet::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance_table(locals: &[&str], suffix: &str) -> SymbolTable {
        let mut table = SymbolTable::new();
        for local in locals {
            table.rename(*local, format!("{}{}", local, suffix));
        }
        table
    }

    #[test]
    fn test_rename_script_declarations_and_uses() {
        let table = instance_table(&["count", "inc"], "_inst0");
        let out = table
            .rewrite_script("state count = 0;\nfunction inc() { count++ }", &[])
            .unwrap();
        assert_eq!(out, "state count_inst0 = 0;\nfunction inc_inst0() { count_inst0++ }");
    }

    #[test]
    fn test_shadowed_names_are_untouched() {
        let table = instance_table(&["count"], "_inst1");
        let out = table
            .rewrite_script(
                "let count = 0;\nfunction f(count) { return count }\nconst g = () => { let count = 2; return count };\ntry {} catch (count) { count }\nfor (const count of xs) { count }",
                &[],
            )
            .unwrap();
        assert!(out.starts_with("let count_inst1 = 0;"));
        assert!(out.contains("function f(count) { return count }"));
        assert!(out.contains("let count = 2; return count"));
        assert!(out.contains("catch (count) { count }"));
        assert!(out.contains("for (const count of xs) { count }"));
    }

    #[test]
    fn test_member_properties_are_not_renamed() {
        let table = instance_table(&["count"], "_inst0");
        let out = table.rewrite_expression("obj.count + count", &[]).unwrap();
        assert_eq!(out, "obj.count + count_inst0");
    }

    #[test]
    fn test_object_shorthand_expands() {
        let table = instance_table(&["count"], "_inst0");
        let out = table.rewrite_expression("({ count })", &[]).unwrap();
        assert_eq!(out, "({ count: count_inst0 })");

        let out = table.rewrite_script("const { count } = store;", &[]).unwrap();
        assert_eq!(out, "const { count: count_inst0 } = store;");
    }

    #[test]
    fn test_inlines_and_props_members() {
        let mut table = SymbolTable::new();
        table.inline("title", "(pageTitle)");
        table.member_props = true;
        assert_eq!(table.rewrite_expression("title", &[]).unwrap(), "(pageTitle)");
        assert_eq!(
            table.rewrite_expression("props.title.length", &[]).unwrap(),
            "(pageTitle).length"
        );
    }

    #[test]
    fn test_bound_loop_variables_win() {
        let mut table = instance_table(&["item"], "_inst0");
        table.inline("label", "(item.name)");
        let out = table
            .rewrite_expression("item + label", &["item".to_string()])
            .unwrap();
        assert_eq!(out, "item + (item.name)");
    }

    #[test]
    fn test_deferred_inlines_only_inside_functions() {
        let mut table = SymbolTable::new();
        table.inline("count", "state.count");
        table.deferred_inlines = true;
        let out = table
            .rewrite_script("let count = 1;\nconst double = count * 2;\nfunction inc() { count += 1 }", &[])
            .unwrap();
        assert_eq!(
            out,
            "let count = 1;\nconst double = count * 2;\nfunction inc() { state.count += 1 }"
        );
    }

    #[test]
    fn test_strip_spans_remove_declarations() {
        let table = instance_table(&["x"], "_inst0");
        let code = "prop title = 'a';\nlet x = title;";
        let end = code.find('\n').unwrap() as u32;
        let out = table.rewrite_script(code, &[(0, end)]).unwrap();
        assert_eq!(out, "\nlet x_inst0 = title;");
    }

    #[test]
    fn test_import_shorthand_keeps_imported_name() {
        let table = instance_table(&["format"], "_inst2");
        let out = table
            .rewrite_script("import { format } from 'date-fns';\nformat(d);", &[])
            .unwrap();
        assert_eq!(out, "import { format as format_inst2 } from 'date-fns';\nformat_inst2(d);");
    }

    #[test]
    fn test_rewrite_literal() {
        let table = instance_table(&["handleClick"], "_inst0");
        assert_eq!(table.rewrite_literal("handleClick"), Some("handleClick_inst0"));
        assert_eq!(table.rewrite_literal("handleClick()"), None);
    }

    #[test]
    fn test_syntax_errors_surface() {
        let table = instance_table(&["a"], "_inst0");
        assert!(table.rewrite_expression("a +", &[]).is_err());
        assert!(table.rewrite_script("let = ;", &[]).is_err());
    }
}
