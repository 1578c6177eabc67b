//! End-to-end: resolution through emitted module, the multi-page driver and
//! the JSON bridge.

#[cfg(test)]
mod tests {
    use crate::cache::ResolutionCache;
    use crate::catalog::{Catalog, ComponentMetadata};
    use crate::compile::{
        compile_page, compile_page_json, compile_pages, resolve_components_json, validate_ir_json,
        CompileOptions,
    };
    use crate::error::ResolveError;
    use crate::ir::{
        AttributeIR, AttributeValue, ComponentNode, ElementNode, ExpressionIR, ExpressionNode,
        SourceLocation, TemplateNode, ZenIR,
    };
    use serde_json::json;

    fn mock_loc() -> SourceLocation {
        SourceLocation { line: 1, column: 1 }
    }

    fn expr(id: &str, code: &str) -> ExpressionIR {
        ExpressionIR {
            id: id.to_string(),
            code: code.to_string(),
            location: mock_loc(),
            loop_context: None,
        }
    }

    fn expr_node(id: &str) -> TemplateNode {
        TemplateNode::Expression(ExpressionNode {
            expression: id.to_string(),
            location: mock_loc(),
            loop_context: None,
        })
    }

    fn component(name: &str) -> TemplateNode {
        TemplateNode::Component(ComponentNode {
            name: name.to_string(),
            attributes: vec![],
            children: vec![],
            location: mock_loc(),
            loop_context: None,
        })
    }

    fn counter() -> ComponentMetadata {
        ComponentMetadata::new(
            "Counter",
            vec![TemplateNode::Element(ElementNode {
                tag: "button".to_string(),
                attributes: vec![AttributeIR {
                    name: "onclick".to_string(),
                    value: AttributeValue::Static("inc".to_string()),
                    location: mock_loc(),
                    loop_context: None,
                }],
                children: vec![expr_node("e_count")],
                location: mock_loc(),
                loop_context: None,
            })],
            vec![expr("e_count", "count")],
        )
        .with_script("state count = 0\nfunction inc() { count += 1 }")
    }

    #[test]
    fn test_emission_order_declaration_state_init_expression() {
        let page = ZenIR::new("pages/index.zen", vec![expr_node("expr_0")], vec![expr("expr_0", "count + 1")])
            .with_script("state count = 1");

        let output = compile_page(page, &Catalog::new(), &CompileOptions::default()).unwrap();
        let code = &output.module.code;
        let declaration = code.find("count = 1").unwrap();
        let state_init = code.find("zenState(").unwrap();
        let expression = code.find("function _expr_").unwrap();
        assert!(declaration < state_init, "{}", code);
        assert!(state_init < expression, "{}", code);
        assert!(output.module.expressions.contains("return (state.count + 1);"));
        assert!(output.bundle_plan.is_none());
    }

    #[test]
    fn test_component_state_reaches_codegen() {
        let catalog = Catalog::new().with(counter());
        let page = ZenIR::new("pages/index.zen", vec![component("Counter")], vec![]);

        let output = compile_page(page, &catalog, &CompileOptions::default()).unwrap();
        let module = &output.module;
        assert!(module.declarations.contains("let count_inst0 = 0"), "{}", module.declarations);
        assert!(module.declarations.contains("function inc_inst0() { state.count_inst0 += 1 }"));
        assert!(module.state_init.contains("count_inst0: count_inst0"));
        assert!(module.expressions.contains("function _expr_e_count_inst0(state)"));
        assert!(module.expressions.contains("return (state.count_inst0);"));
        assert_eq!(output.ir.all_states.get("count_inst0").map(String::as_str), Some("0"));
    }

    #[test]
    fn test_bare_imports_produce_bundle_plan() {
        let page = ZenIR::new("src/pages/blog.zen", vec![expr_node("e_date")], vec![expr("e_date", "format(now)")])
            .with_script("import { format } from 'date-fns';\nimport { helper } from './helper.js';\nconst now = Date.now();");

        let output = compile_page(page, &Catalog::new(), &CompileOptions::default()).unwrap();
        let plan = output.bundle_plan.expect("bundle plan");
        assert_eq!(plan.resolve_roots, vec!["src/pages".to_string()]);
        assert_eq!(plan.entry, output.module.code);
        assert_eq!(output.module.imports.len(), 2);
    }

    #[test]
    fn test_compile_pages_keeps_input_order() {
        let catalog = Catalog::new().with(counter());
        let pages: Vec<ZenIR> = (0..6)
            .map(|i| {
                if i == 3 {
                    ZenIR::new(format!("pages/p{}.zen", i), vec![component("Nope")], vec![])
                } else {
                    ZenIR::new(format!("pages/p{}.zen", i), vec![component("Counter")], vec![])
                }
            })
            .collect();

        let results = compile_pages(pages, &catalog, &CompileOptions::default(), None);
        assert_eq!(results.len(), 6);
        for (i, result) in results.iter().enumerate() {
            match result {
                Ok(output) => assert_eq!(output.ir.file_path, format!("pages/p{}.zen", i)),
                Err(err) => {
                    assert_eq!(i, 3);
                    assert_eq!(err.code(), Some("UNRESOLVED_COMPONENT"));
                }
            }
        }
    }

    #[test]
    fn test_compile_pages_through_cache() {
        let catalog = Catalog::new().with(counter());
        let page = ZenIR::new("pages/index.zen", vec![component("Counter")], vec![]);
        let cache = ResolutionCache::new();

        let results = compile_pages(vec![page.clone(), page.clone(), page], &catalog, &CompileOptions::default(), Some(&cache));
        assert_eq!(cache.len(), 1);
        let first = results[0].as_ref().unwrap();
        let second = results[1].as_ref().unwrap();
        assert!(std::sync::Arc::ptr_eq(first, second));
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // JSON BRIDGE
    // ═══════════════════════════════════════════════════════════════════════════════

    fn page_json() -> String {
        json!({
            "filePath": "pages/index.zen",
            "template": {
                "raw": "<Counter />",
                "nodes": [
                    { "type": "component", "name": "Counter", "attributes": [], "children": [],
                      "location": { "line": 3, "column": 1 } }
                ],
                "expressions": []
            },
            "script": null,
            "styles": []
        })
        .to_string()
    }

    fn catalog_json() -> String {
        json!({ "Counter": serde_json::to_value(counter()).unwrap() }).to_string()
    }

    #[test]
    fn test_bridge_resolves_json() {
        let out = resolve_components_json(&page_json(), &catalog_json(), None).unwrap();
        let resolved: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(resolved["template"]["nodes"][0]["type"], "element");
        assert_eq!(resolved["template"]["nodes"][0]["attributes"][0]["value"], "inc_inst0");
        assert_eq!(resolved["template"]["expressions"][0]["id"], "e_count_inst0");
        assert_eq!(resolved["allStates"]["count_inst0"], "0");
    }

    #[test]
    fn test_bridge_reports_malformed_input() {
        assert!(matches!(
            resolve_components_json("{ not json", &catalog_json(), None),
            Err(ResolveError::Malformed(_))
        ));
        assert!(matches!(
            resolve_components_json(&page_json(), "42", None),
            Err(ResolveError::Malformed(_))
        ));
        assert!(matches!(
            resolve_components_json(&page_json(), &catalog_json(), Some(r#"{"validate":"yes"}"#)),
            Err(ResolveError::Malformed(_))
        ));
    }

    #[test]
    fn test_bridge_surfaces_structured_errors() {
        let err = resolve_components_json(&page_json(), "{}", None).unwrap_err();
        assert_eq!(err.code(), Some("UNRESOLVED_COMPONENT"));
        assert!(err.to_string().starts_with("pages/index.zen:3:1 [UNRESOLVED_COMPONENT]"));

        let unresolved = validate_ir_json(&page_json()).unwrap_err();
        assert_eq!(unresolved.code(), Some("COMPONENT_PRECOMPILED"));
    }

    #[test]
    fn test_bridge_compiles_page() {
        let out = compile_page_json(&page_json(), &catalog_json(), Some(r#"{"strictProps":true}"#)).unwrap();
        let output: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert!(output["module"]["code"].as_str().unwrap().contains("zenState("));
        assert!(output["bundlePlan"].is_null());
    }
}
