//! Reglas de diseño: W9005 (delegación), W9007 (retorno crudo), W9009
//! (abstracción faltante), W9012 (None defensivo), W9016 (Any prohibido).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::{NodeData, NodeId, NodeKind};
use crate::layers::LAYER_USE_CASE;
use crate::rules::{Checkable, RuleContext, Violation};

/// W9005: cadenas if/elif cuyo único cuerpo es delegar (return llamada).
pub struct DelegationRule;

impl DelegationRule {
    fn is_delegation_call(&self, ctx: &RuleContext<'_>, stmt: NodeId) -> bool {
        match &ctx.module.node(stmt).data {
            NodeData::Return { value: Some(v) } => {
                ctx.module.kind(*v) == NodeKind::Call
            }
            _ => {
                ctx.module.kind(stmt) == NodeKind::Expr
                    && ctx
                        .module
                        .node(stmt)
                        .children
                        .first()
                        .map(|&c| ctx.module.kind(c) == NodeKind::Call)
                        .unwrap_or(false)
            }
        }
    }

    /// Recorre la cadena if/elif; delegación si cada rama tiene una sola
    /// sentencia que delega y hay al menos dos ramas.
    fn check_chain(&self, ctx: &RuleContext<'_>, node: NodeId, depth: usize) -> bool {
        let NodeData::If { body, orelse, .. } = &ctx.module.node(node).data else {
            return false;
        };
        if body.len() != 1 || !self.is_delegation_call(ctx, body[0]) {
            return false;
        }
        if orelse.is_empty() {
            return depth > 0;
        }
        if orelse.len() == 1 {
            let next = orelse[0];
            if self.is_delegation_call(ctx, next) {
                return depth > 0;
            }
            if ctx.module.kind(next) == NodeKind::If {
                return self.check_chain(ctx, next, depth + 1);
            }
        }
        false
    }
}

impl Checkable for DelegationRule {
    fn code(&self) -> &'static str {
        "W9005"
    }

    fn description(&self) -> &'static str {
        "Delegation anti-pattern: refactor to a dispatch table or Strategy."
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::If]
    }

    fn check(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        // Solo la cabeza de la cadena; los If anidados en orelse ya se
        // recorrieron desde la cabeza.
        if let Some(parent) = ctx.module.node(node).parent {
            if ctx.module.kind(parent) == NodeKind::If {
                if let NodeData::If { orelse, .. } = &ctx.module.node(parent).data {
                    if orelse.contains(&node) {
                        return vec![];
                    }
                }
            }
        }
        // if __name__ == "__main__" es un entry point legítimo
        if let NodeData::If { test, .. } = &ctx.module.node(node).data {
            if ctx.module.text(*test).contains("__name__") {
                return vec![];
            }
        }
        if !self.check_chain(ctx, node, 0) {
            return vec![];
        }
        vec![Violation::from_node(
            ctx.module,
            self.code(),
            "Refactor to **Strategy Pattern** using a dictionary mapping.".to_string(),
            node,
        )]
    }
}

/// W9007 + W9009: tipos crudos de infraestructura cruzando la frontera.
pub struct RawTypeRule;

impl RawTypeRule {
    fn inferred_type_name(&self, ctx: &RuleContext<'_>, value: NodeId) -> Option<String> {
        if let Some(qname) = ctx.oracle.resolve_expr(ctx.module, value) {
            return qname.rsplit('.').next().map(str::to_string);
        }
        // Fallback: nombre del constructor llamado
        if let NodeData::Call { callee: Some(c), .. } = &ctx.module.node(value).data {
            return c.rsplit('.').next().map(str::to_string);
        }
        None
    }

    fn check_return(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        let NodeData::Return { value: Some(v) } = &ctx.module.node(node).data else {
            return vec![];
        };
        let Some(type_name) = self.inferred_type_name(ctx, *v) else { return vec![] };
        if !ctx.config.raw_type_names().iter().any(|t| t == &type_name) {
            return vec![];
        }
        vec![Violation::from_node(
            ctx.module,
            "W9007",
            format!("Raw I/O return: {type_name}"),
            node,
        )]
    }

    fn check_assign(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        if ctx.module_layer != Some(LAYER_USE_CASE) {
            return vec![];
        }
        let children = &ctx.module.node(node).children;
        let Some(&value) = children.last() else { return vec![] };
        let Some(type_name) = self.inferred_type_name(ctx, value) else {
            return vec![];
        };
        let is_raw = ctx.config.raw_type_names().iter().any(|t| t == &type_name)
            || type_name.ends_with("Client");
        if !is_raw {
            return vec![];
        }
        let target = children
            .first()
            .map(|&t| ctx.module.text(t).to_string())
            .unwrap_or_default();
        vec![Violation::from_node(
            ctx.module,
            "W9009",
            format!("Raw infrastructure in UseCase: {target} -> {type_name}"),
            node,
        )]
    }
}

impl Checkable for RawTypeRule {
    fn code(&self) -> &'static str {
        "W9007"
    }

    fn description(&self) -> &'static str {
        "Raw I/O types must not cross boundaries."
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::Return, NodeKind::Assign]
    }

    fn check(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        if ctx.is_test_file() {
            return vec![];
        }
        match ctx.module.kind(node) {
            NodeKind::Return => {
                if ctx.module_layer.is_none() {
                    return vec![];
                }
                self.check_return(ctx, node)
            }
            NodeKind::Assign => self.check_assign(ctx, node),
            _ => vec![],
        }
    }
}

static NONE_CHECK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w+)\s+is\s+(not\s+)?None$").unwrap());

/// W9012: chequeos defensivos de None en capas silenciosas.
pub struct DefensiveNoneRule;

impl Checkable for DefensiveNoneRule {
    fn code(&self) -> &'static str {
        "W9012"
    }

    fn description(&self) -> &'static str {
        "Defensive None checks inside silent layers."
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::If]
    }

    fn check(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        if ctx.is_test_file() || !ctx.in_silent_layer() {
            return vec![];
        }
        let layer = ctx.module_layer.unwrap_or("?");
        let NodeData::If { test, body, .. } = &ctx.module.node(node).data else {
            return vec![];
        };
        let test_text = ctx.module.text(*test).trim().to_string();
        let var_name = NONE_CHECK_RE
            .captures(&test_text)
            .map(|c| c[1].to_string());
        let Some(var_name) = var_name else { return vec![] };
        // Solo el patrón guard-clause: la rama levanta una excepción
        let raises = body.iter().any(|&s| ctx.module.kind(s) == NodeKind::Raise);
        if !raises {
            return vec![];
        }
        vec![Violation::from_node(
            ctx.module,
            self.code(),
            format!("Defensive None check: {var_name} in {layer}"),
            node,
        )]
    }
}

/// W9016: cualquier anotación que resuelva a Any.
pub struct BannedAnyRule;

impl BannedAnyRule {
    fn annotation_has_any(&self, text: &str) -> bool {
        // Any como nombre completo dentro de la anotación, no substring
        Regex::new(r"\bAny\b").map(|re| re.is_match(text)).unwrap_or(false)
    }

    fn line_is_justified(&self, ctx: &RuleContext<'_>, line: u32) -> bool {
        let source_line = ctx
            .module
            .source
            .lines()
            .nth(line.saturating_sub(1) as usize)
            .unwrap_or("");
        source_line.contains("noqa: W9016")
            && source_line.to_uppercase().contains("JUSTIFICATION:")
    }
}

impl Checkable for BannedAnyRule {
    fn code(&self) -> &'static str {
        "W9016"
    }

    fn description(&self) -> &'static str {
        "Any is a banned type hint."
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::FunctionDef, NodeKind::AsyncFunctionDef]
    }

    fn check(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        let Some(data) = ctx.module.function_data(node) else { return vec![] };
        let line = ctx.module.node(node).line;
        if self.line_is_justified(ctx, line) {
            return vec![];
        }
        let mut violations = Vec::new();
        if let Some(ret) = &data.returns {
            if self.annotation_has_any(ret) {
                violations.push(
                    Violation::from_node(
                        ctx.module,
                        self.code(),
                        format!("Banned Any type: return type of '{}'", data.name),
                        node,
                    )
                    .with_symbol(format!("{}.return", data.name)),
                );
            }
        }
        for p in &data.params {
            if let Some(ann) = &p.annotation {
                if self.annotation_has_any(ann) {
                    violations.push(
                        Violation::from_node(
                            ctx.module,
                            self.code(),
                            format!("Banned Any type: parameter '{}'", p.name),
                            node,
                        )
                        .with_symbol(format!("{}.{}", data.name, p.name)),
                    );
                }
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use crate::rules::engine::test_support::check_single_rule;

    #[test]
    fn test_delegation_chain_with_two_branches_fires() {
        let src = "\
def route(kind):
    if kind == 'a':
        return handle_a()
    elif kind == 'b':
        return handle_b()
";
        let violations = check_single_rule("src/use_cases/router.py", src, &["W9005"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("Strategy"));
    }

    #[test]
    fn test_single_if_not_delegation() {
        let src = "def f(x):\n    if x:\n        return g()\n    return None\n";
        let violations = check_single_rule("src/use_cases/x.py", src, &["W9005"]);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_main_block_not_delegation() {
        let src = "if __name__ == '__main__':\n    run()\nelse:\n    setup()\n";
        let violations = check_single_rule("src/app/cli.py", src, &["W9005"]);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_defensive_none_with_raise_fires() {
        let src = "\
def process(order):
    if order is None:
        raise ValueError('missing')
    return order
";
        let violations = check_single_rule("src/use_cases/x.py", src, &["W9012"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("order"));
    }

    #[test]
    fn test_none_check_without_raise_clean() {
        let src = "def f(x):\n    if x is None:\n        return 0\n    return 1\n";
        let violations = check_single_rule("src/use_cases/x.py", src, &["W9012"]);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_raw_cursor_return_fires_w9007() {
        let src = "def fetch(conn):\n    return Cursor()\n";
        let violations = check_single_rule("src/infrastructure/db.py", src, &["W9007"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("Cursor"));
    }

    #[test]
    fn test_dto_return_clean_w9007() {
        let src = "def fetch(conn):\n    return OrderDTO()\n";
        let violations = check_single_rule("src/infrastructure/db.py", src, &["W9007"]);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_raw_session_attribute_in_use_case_fires_w9009() {
        let src = "def build():\n    session = Session()\n    return session\n";
        let violations = check_single_rule("src/use_cases/x.py", src, &["W9009"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("Session"));
    }

    #[test]
    fn test_banned_any_in_return_and_param() {
        let src = "def f(data: Any) -> Any:\n    return data\n";
        let violations = check_single_rule("src/use_cases/x.py", src, &["W9016"]);
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn test_any_inside_generic_flagged() {
        let src = "def f(data: dict[str, Any]) -> int:\n    return 0\n";
        let violations = check_single_rule("src/use_cases/x.py", src, &["W9016"]);
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn test_anyio_like_names_not_flagged() {
        let src = "def f(data: AnyIO) -> int:\n    return 0\n";
        let violations = check_single_rule("src/use_cases/x.py", src, &["W9016"]);
        assert!(violations.is_empty(), "AnyIO no es Any");
    }
}
