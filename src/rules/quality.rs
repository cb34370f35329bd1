//! Calidad de diseño: W9032 (complejidad), W9033 (segregación de
//! interfaces), W9034 (inyección por constructor), W9035 (higiene de
//! excepciones).

use crate::ast::{NodeData, NodeId, NodeKind};
use crate::rules::{Checkable, RuleContext, Violation};

/// W9032: complejidad ciclomática por método.
pub struct MethodComplexityRule;

impl MethodComplexityRule {
    /// Puntos de decisión: if/for/while/except/with/assert/comprehension,
    /// más (BoolOp − 1 por operador) y ternarios.
    pub fn cyclomatic_complexity(ctx: &RuleContext<'_>, func: NodeId) -> usize {
        let m = ctx.module;
        let end = m.node(func).subtree_end;
        let mut count = 1usize;
        for i in (func + 1)..end {
            // Los nodos de funciones anidadas cuentan para la función externa
            // igual que en el conteo clásico.
            match m.kind(i) {
                NodeKind::If
                | NodeKind::For
                | NodeKind::While
                | NodeKind::ExceptHandler
                | NodeKind::With
                | NodeKind::Assert
                | NodeKind::Comprehension
                | NodeKind::BoolOp
                | NodeKind::IfExp => count += 1,
                _ => {}
            }
        }
        count
    }
}

impl Checkable for MethodComplexityRule {
    fn code(&self) -> &'static str {
        "W9032"
    }

    fn description(&self) -> &'static str {
        "Per-method cyclomatic complexity threshold."
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::FunctionDef, NodeKind::AsyncFunctionDef]
    }

    fn check(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        let Some(data) = ctx.module.function_data(node) else { return vec![] };
        let threshold = ctx.config.complexity_threshold;
        let complexity = Self::cyclomatic_complexity(ctx, node);
        if complexity <= threshold {
            return vec![];
        }
        vec![Violation::from_node(
            ctx.module,
            self.code(),
            format!(
                "Method '{}' has cyclomatic complexity {complexity} (threshold {threshold}). Extract logic into smaller functions.",
                data.name
            ),
            node,
        )]
    }
}

/// W9033: Protocol con demasiados métodos.
pub struct InterfaceSegregationRule;

impl InterfaceSegregationRule {
    fn is_protocol(&self, ctx: &RuleContext<'_>, node: NodeId) -> bool {
        ctx.module
            .class_data(node)
            .map(|c| {
                c.bases.iter().any(|b| {
                    b == "Protocol" || b.ends_with(".Protocol") || b.starts_with("Protocol[")
                })
            })
            .unwrap_or(false)
    }

    fn method_count(&self, ctx: &RuleContext<'_>, node: NodeId) -> usize {
        ctx.module
            .node(node)
            .children
            .iter()
            .filter(|&&c| {
                matches!(
                    ctx.module.kind(c),
                    NodeKind::FunctionDef | NodeKind::AsyncFunctionDef
                )
            })
            .filter(|&&c| {
                ctx.module
                    .function_data(c)
                    .map(|f| !(f.name.starts_with("__") && f.name.ends_with("__")))
                    .unwrap_or(false)
            })
            .count()
    }
}

impl Checkable for InterfaceSegregationRule {
    fn code(&self) -> &'static str {
        "W9033"
    }

    fn description(&self) -> &'static str {
        "Protocols over the method limit should be split."
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::ClassDef]
    }

    fn check(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        if !self.is_protocol(ctx, node) {
            return vec![];
        }
        let limit = ctx.config.interface_segregation_limit;
        let count = self.method_count(ctx, node);
        if count <= limit {
            return vec![];
        }
        let name = ctx
            .module
            .class_data(node)
            .map(|c| c.name.clone())
            .unwrap_or_default();
        vec![Violation::from_node(
            ctx.module,
            self.code(),
            format!(
                "Protocol '{name}' has {count} methods (limit {limit}). Consider splitting into focused sub-protocols."
            ),
            node,
        )]
    }
}

const CONCRETE_SUFFIXES: &[&str] = &[
    "Gateway", "Repository", "Client", "Adapter", "Service", "Reporter", "Storage",
    "Checker", "Scaffolder", "Renderer",
];

/// W9034: parámetros de `__init__` tipados a clases concretas de
/// infraestructura en lugar de Protocols.
pub struct ConstructorInjectionRule;

impl Checkable for ConstructorInjectionRule {
    fn code(&self) -> &'static str {
        "W9034"
    }

    fn description(&self) -> &'static str {
        "Constructor dependencies must be typed to Protocols."
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::FunctionDef]
    }

    fn check(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        let Some(data) = ctx.module.function_data(node) else { return vec![] };
        if data.name != "__init__" || !ctx.module.is_method(node) {
            return vec![];
        }
        let class_name = ctx
            .module
            .enclosing_class(node)
            .and_then(|c| ctx.module.class_data(c))
            .map(|c| c.name.clone())
            .unwrap_or_default();
        let mut violations = Vec::new();
        for p in &data.params {
            if p.name == "self" || p.name == "cls" {
                continue;
            }
            let Some(ann) = &p.annotation else { continue };
            let base = ann.split('[').next().unwrap_or(ann).trim();
            let bare = base.rsplit('.').next().unwrap_or(base);
            if !CONCRETE_SUFFIXES.iter().any(|s| bare.ends_with(s)) {
                continue;
            }
            if bare.contains("Protocol") {
                continue;
            }
            violations.push(
                Violation::from_node(
                    ctx.module,
                    self.code(),
                    format!(
                        "Parameter '{}' in {class_name}.__init__ is typed to concrete '{bare}'. Prefer a Protocol and inject the implementation.",
                        p.name
                    ),
                    node,
                )
                .with_symbol(format!("{class_name}.__init__.{}", p.name)),
            );
        }
        violations
    }
}

/// W9035: manejadores de excepción descuidados.
pub struct ExceptionHygieneRule;

impl ExceptionHygieneRule {
    fn body_is_empty(&self, ctx: &RuleContext<'_>, body: &[NodeId]) -> bool {
        body.is_empty() || body.iter().all(|&s| ctx.module.kind(s) == NodeKind::Pass)
    }

    fn body_reraises(&self, ctx: &RuleContext<'_>, handler: NodeId) -> bool {
        !ctx.module.nodes_of_kind(handler, NodeKind::Raise).is_empty()
    }
}

impl Checkable for ExceptionHygieneRule {
    fn code(&self) -> &'static str {
        "W9035"
    }

    fn description(&self) -> &'static str {
        "Bare except, swallowed Exception, or empty handler body."
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::ExceptHandler]
    }

    fn check(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        let NodeData::ExceptHandler { type_text, body } = &ctx.module.node(node).data
        else {
            return vec![];
        };
        let mut violations = Vec::new();
        match type_text {
            None => {
                violations.push(Violation::from_node(
                    ctx.module,
                    self.code(),
                    "Bare 'except:' catches all; use 'except Exception:' and re-raise or handle explicitly.".to_string(),
                    node,
                ));
                return violations;
            }
            Some(ty) => {
                let is_broad = ty == "Exception" || ty == "BaseException";
                if is_broad
                    && !self.body_reraises(ctx, node)
                    && !self.body_is_empty(ctx, body)
                {
                    violations.push(Violation::from_node(
                        ctx.module,
                        self.code(),
                        "'except Exception:' without re-raise may swallow errors; re-raise or log and re-raise.".to_string(),
                        node,
                    ));
                }
            }
        }
        if self.body_is_empty(ctx, body) {
            violations.push(Violation::from_node(
                ctx.module,
                self.code(),
                "Empty except body swallows errors; add pass with comment, log, or re-raise.".to_string(),
                node,
            ));
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use crate::rules::engine::test_support::check_single_rule;

    #[test]
    fn test_complexity_over_threshold_fires() {
        let mut src = String::from("def dense(x):\n");
        for i in 0..11 {
            src.push_str(&format!("    if x > {i}:\n        x += {i}\n"));
        }
        src.push_str("    return x\n");
        let violations = check_single_rule("src/use_cases/x.py", &src, &["W9032"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("dense"));
    }

    #[test]
    fn test_simple_function_under_threshold_clean() {
        let src = "def f(x):\n    if x:\n        return 1\n    return 0\n";
        let violations = check_single_rule("src/use_cases/x.py", src, &["W9032"]);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_fat_protocol_fires_w9033() {
        let mut src = String::from("from typing import Protocol\n\nclass Everything(Protocol):\n");
        for i in 0..8 {
            src.push_str(&format!("    def op{i}(self) -> None: ...\n"));
        }
        let violations = check_single_rule("src/domain/ports.py", &src, &["W9033"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("Everything"));
    }

    #[test]
    fn test_small_protocol_clean() {
        let src = "from typing import Protocol\n\nclass Repo(Protocol):\n    def get(self) -> None: ...\n";
        let violations = check_single_rule("src/domain/ports.py", src, &["W9033"]);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_concrete_constructor_type_fires_w9034() {
        let src = "\
class CheckoutUseCase:
    def __init__(self, repo: PostgresRepository):
        self.repo = repo
";
        let violations = check_single_rule("src/use_cases/checkout.py", src, &["W9034"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("PostgresRepository"));
    }

    #[test]
    fn test_protocol_constructor_type_clean() {
        let src = "\
class CheckoutUseCase:
    def __init__(self, repo: RepositoryProtocol):
        self.repo = repo
";
        let violations = check_single_rule("src/use_cases/checkout.py", src, &["W9034"]);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_bare_except_fires_w9035() {
        let src = "try:\n    work()\nexcept:\n    handle()\n";
        let violations = check_single_rule("src/infrastructure/x.py", src, &["W9035"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("Bare"));
    }

    #[test]
    fn test_swallowed_exception_fires_w9035() {
        let src = "try:\n    work()\nexcept Exception:\n    log()\n";
        let violations = check_single_rule("src/infrastructure/x.py", src, &["W9035"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("swallow"));
    }

    #[test]
    fn test_reraise_is_clean() {
        let src = "try:\n    work()\nexcept Exception:\n    raise\n";
        let violations = check_single_rule("src/infrastructure/x.py", src, &["W9035"]);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_empty_handler_fires_w9035() {
        let src = "try:\n    work()\nexcept ValueError:\n    pass\n";
        let violations = check_single_rule("src/infrastructure/x.py", src, &["W9035"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("Empty"));
    }
}
