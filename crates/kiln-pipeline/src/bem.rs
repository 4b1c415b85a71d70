//! BEM class naming checks on compiled templates.
//!
//! `block__element` must sit inside an element carrying `block`;
//! `block--modifier` and `block__element--modifier` must share an element with
//! the class they modify. Violations are warnings.

use kiln_core::{Diagnostic, Severity};

use crate::template::{Element, Node};

pub const RULE_BEM: &str = "bem";

/// Check BEM naming across a compiled template.
#[must_use]
pub fn validate(nodes: &[Node]) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut ancestors = Vec::new();
    for node in nodes {
        visit(node, &mut ancestors, &mut diagnostics);
    }
    diagnostics
}

fn visit(node: &Node, ancestors: &mut Vec<Vec<String>>, out: &mut Vec<Diagnostic>) {
    let Node::Element(element) = node else {
        return;
    };

    let classes = element.all_classes();
    for class in &classes {
        check_class(element, class, &classes, ancestors, out);
    }

    ancestors.push(classes);
    for child in &element.children {
        visit(child, ancestors, out);
    }
    ancestors.pop();
}

fn check_class(
    element: &Element,
    class: &str,
    own: &[String],
    ancestors: &[Vec<String>],
    out: &mut Vec<Diagnostic>,
) {
    let mut warn = |message: String| {
        out.push(Diagnostic::new(
            element.file.to_path_buf(),
            element.line,
            0,
            RULE_BEM,
            message,
            Severity::Warn,
        ));
    };

    if let Some((base, _)) = class.split_once("--") {
        if !own.iter().any(|c| c == base) {
            warn(format!("modifier '{class}' used without '{base}'"));
        }
    }

    if let Some((block, _)) = class.split_once("__") {
        if !ancestors.iter().any(|set| set.iter().any(|c| c == block)) {
            warn(format!("element '{class}' is outside of block '{block}'"));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use tempfile::TempDir;

    use super::*;
    use crate::template::{TemplateContext, compile_file};

    fn check(source: &str) -> Vec<Diagnostic> {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("page.pug");
        fs::write(&path, source).unwrap();
        let nodes = compile_file(&path, &TemplateContext::new()).unwrap();
        validate(&nodes)
    }

    #[test]
    fn test_valid_bem() {
        let source = "\
nav.menu.menu--dark
  ul
    li.menu__item.menu__item--active
      a.menu__link(href=\"/\") Home
";
        assert!(check(source).is_empty());
    }

    #[test]
    fn test_element_outside_block() {
        let diags = check("div\n  span.card__title Hi\n");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].rule, RULE_BEM);
        assert_eq!(diags[0].line, 2);
        assert_eq!(diags[0].severity, Severity::Warn);
        assert!(diags[0].message.contains("card__title"));
    }

    #[test]
    fn test_modifier_without_base() {
        let diags = check("div.button--primary\n");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("'button'"));
    }

    #[test]
    fn test_element_modifier_without_element() {
        let diags = check("div.card\n  p.card__text--muted x\n");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("'card__text'"));
        assert!(Path::new(&diags[0].file).ends_with("page.pug"));
    }

    #[test]
    fn test_class_attribute_counts() {
        assert!(check("div(class=\"card\")\n  p.card__text x\n").is_empty());
    }
}
