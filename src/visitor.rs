use crate::ir::{
    AttributeIR, ComponentNode, ConditionalFragmentNode, ElementNode, ExpressionNode,
    LoopContext, LoopFragmentNode, OptionalFragmentNode, TemplateNode, TextNode, ZenIR,
};

/// The single mutable traversal over template trees.
///
/// Rules:
/// 1. Traversal order is document order and fixed.
/// 2. Implementers override `visit_*` methods to add behavior.
/// 3. Implementers call the matching `walk_*` function to continue, unless pruning is intended.
///
/// Expression references (`expression` nodes, fragment conditions, loop
/// sources) all pass through `visit_expression_ref`, so retargeting an id is
/// one override.
pub trait TemplateVisitor {
    fn visit_root(&mut self, root: &mut ZenIR) {
        walk_root(self, root);
    }

    fn visit_children(&mut self, children: &mut Vec<TemplateNode>) {
        walk_children(self, children);
    }

    fn visit_node(&mut self, node: &mut TemplateNode) {
        walk_node(self, node);
    }

    fn visit_element(&mut self, element: &mut ElementNode) {
        walk_element(self, element);
    }

    fn visit_component(&mut self, component: &mut ComponentNode) {
        walk_component(self, component);
    }

    fn visit_text(&mut self, text: &mut TextNode) {
        self.visit_loop_context(&mut text.loop_context);
    }

    fn visit_expression(&mut self, expression: &mut ExpressionNode) {
        self.visit_loop_context(&mut expression.loop_context);
        self.visit_expression_ref(&mut expression.expression);
    }

    fn visit_conditional_fragment(&mut self, fragment: &mut ConditionalFragmentNode) {
        walk_conditional_fragment(self, fragment);
    }

    fn visit_optional_fragment(&mut self, fragment: &mut OptionalFragmentNode) {
        walk_optional_fragment(self, fragment);
    }

    fn visit_loop_fragment(&mut self, fragment: &mut LoopFragmentNode) {
        walk_loop_fragment(self, fragment);
    }

    fn visit_attribute(&mut self, attribute: &mut AttributeIR) {
        self.visit_loop_context(&mut attribute.loop_context);
    }

    fn visit_expression_ref(&mut self, _id: &mut String) {}

    fn visit_loop_context(&mut self, _ctx: &mut Option<LoopContext>) {}
}

pub fn walk_root<V: TemplateVisitor + ?Sized>(visitor: &mut V, root: &mut ZenIR) {
    visitor.visit_children(&mut root.template.nodes);
}

pub fn walk_children<V: TemplateVisitor + ?Sized>(
    visitor: &mut V,
    children: &mut Vec<TemplateNode>,
) {
    for node in children {
        visitor.visit_node(node);
    }
}

pub fn walk_node<V: TemplateVisitor + ?Sized>(visitor: &mut V, node: &mut TemplateNode) {
    match node {
        TemplateNode::Element(el) => visitor.visit_element(el),
        TemplateNode::Component(c) => visitor.visit_component(c),
        TemplateNode::Text(t) => visitor.visit_text(t),
        TemplateNode::Expression(e) => visitor.visit_expression(e),
        TemplateNode::ConditionalFragment(f) => visitor.visit_conditional_fragment(f),
        TemplateNode::OptionalFragment(f) => visitor.visit_optional_fragment(f),
        TemplateNode::LoopFragment(f) => visitor.visit_loop_fragment(f),
        TemplateNode::Doctype(_) => {}
    }
}

pub fn walk_element<V: TemplateVisitor + ?Sized>(visitor: &mut V, element: &mut ElementNode) {
    visitor.visit_loop_context(&mut element.loop_context);
    for attr in &mut element.attributes {
        visitor.visit_attribute(attr);
    }
    visitor.visit_children(&mut element.children);
}

pub fn walk_component<V: TemplateVisitor + ?Sized>(visitor: &mut V, component: &mut ComponentNode) {
    visitor.visit_loop_context(&mut component.loop_context);
    for attr in &mut component.attributes {
        visitor.visit_attribute(attr);
    }
    visitor.visit_children(&mut component.children);
}

pub fn walk_conditional_fragment<V: TemplateVisitor + ?Sized>(
    visitor: &mut V,
    fragment: &mut ConditionalFragmentNode,
) {
    visitor.visit_loop_context(&mut fragment.loop_context);
    visitor.visit_expression_ref(&mut fragment.condition);
    visitor.visit_children(&mut fragment.consequent);
    visitor.visit_children(&mut fragment.alternate);
}

pub fn walk_optional_fragment<V: TemplateVisitor + ?Sized>(
    visitor: &mut V,
    fragment: &mut OptionalFragmentNode,
) {
    visitor.visit_loop_context(&mut fragment.loop_context);
    visitor.visit_expression_ref(&mut fragment.condition);
    visitor.visit_children(&mut fragment.fragment);
}

pub fn walk_loop_fragment<V: TemplateVisitor + ?Sized>(
    visitor: &mut V,
    fragment: &mut LoopFragmentNode,
) {
    visitor.visit_loop_context(&mut fragment.loop_context);
    visitor.visit_expression_ref(&mut fragment.source);
    visitor.visit_children(&mut fragment.body);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AttributeValue, SourceLocation};

    struct RefCollector(Vec<String>);

    impl TemplateVisitor for RefCollector {
        fn visit_expression_ref(&mut self, id: &mut String) {
            self.0.push(id.clone());
            id.push_str("_x");
        }
    }

    #[test]
    fn test_expression_refs_in_document_order() {
        let expr = |id: &str| {
            TemplateNode::Expression(ExpressionNode {
                expression: id.to_string(),
                location: SourceLocation::default(),
                loop_context: None,
            })
        };
        let mut nodes = vec![
            TemplateNode::Element(ElementNode {
                tag: "div".to_string(),
                attributes: vec![AttributeIR {
                    name: "class".to_string(),
                    value: AttributeValue::Static("box".to_string()),
                    location: SourceLocation::default(),
                    loop_context: None,
                }],
                children: vec![expr("a")],
                location: SourceLocation::default(),
                loop_context: None,
            }),
            TemplateNode::LoopFragment(LoopFragmentNode {
                source: "items".to_string(),
                item_var: "item".to_string(),
                index_var: None,
                body: vec![TemplateNode::OptionalFragment(OptionalFragmentNode {
                    condition: "cond".to_string(),
                    fragment: vec![expr("b")],
                    location: SourceLocation::default(),
                    loop_context: None,
                })],
                location: SourceLocation::default(),
                loop_context: None,
            }),
        ];

        let mut collector = RefCollector(vec![]);
        collector.visit_children(&mut nodes);
        assert_eq!(collector.0, vec!["a", "items", "cond", "b"]);

        match &nodes[1] {
            TemplateNode::LoopFragment(lf) => assert_eq!(lf.source, "items_x"),
            _ => unreachable!(),
        }
    }
}
