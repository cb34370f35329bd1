//! W9301: instanciación directa de infraestructura en capas silenciosas.

use crate::ast::{NodeData, NodeId, NodeKind};
use crate::rules::{Checkable, RuleContext, Violation};

const INFRA_SUFFIXES: &[&str] = &[
    "Gateway", "Repository", "Client", "Adapter", "Service", "Reporter", "Storage",
    "Checker", "Scaffolder",
];

pub struct DiViolationRule;

impl Checkable for DiViolationRule {
    fn code(&self) -> &'static str {
        "W9301"
    }

    fn description(&self) -> &'static str {
        "Do not instantiate infrastructure inside Domain/UseCase."
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::Call]
    }

    fn check(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        if ctx.is_test_file() || !ctx.in_silent_layer() {
            return vec![];
        }
        let NodeData::Call { callee: Some(call_name), .. } = &ctx.module.node(node).data
        else {
            return vec![];
        };
        let bare = call_name.rsplit('.').next().unwrap_or(call_name);
        if !INFRA_SUFFIXES.iter().any(|s| bare.ends_with(s)) {
            return vec![];
        }
        // Protocols tipados no son instanciación concreta
        if bare.contains("Protocol") {
            return vec![];
        }
        vec![Violation::from_node(
            ctx.module,
            self.code(),
            format!("Direct instantiation of infrastructure: {call_name}. Inject via constructor."),
            node,
        )]
    }
}

#[cfg(test)]
mod tests {
    use crate::rules::engine::test_support::check_single_rule;

    #[test]
    fn test_instantiating_repository_in_use_case_fires() {
        let src = "\
class Checkout:
    def __init__(self):
        self.repo = PostgresRepository()
";
        let violations = check_single_rule("src/use_cases/checkout.py", src, &["W9301"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("PostgresRepository"));
    }

    #[test]
    fn test_instantiation_in_infrastructure_allowed() {
        let src = "\
class Wiring:
    def build(self):
        return PostgresRepository()
";
        let violations = check_single_rule("src/infrastructure/di.py", src, &["W9301"]);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_plain_call_in_use_case_allowed() {
        let src = "def f(repo):\n    return repo.save()\n";
        let violations = check_single_rule("src/use_cases/x.py", src, &["W9301"]);
        assert!(violations.is_empty());
    }
}
