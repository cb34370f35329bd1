//! W9601: inmutabilidad de Domain. Detección + auto-fix (congelar
//! dataclasses).

use crate::ast::{NodeData, NodeId, NodeKind};
use crate::layers::LAYER_DOMAIN;
use crate::rules::{
    Checkable, Fixable, RuleContext, TransformationPlan, Violation,
};

pub struct DomainImmutabilityRule;

impl DomainImmutabilityRule {
    fn check_assign_attr(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        if ctx.module_layer != Some(LAYER_DOMAIN) {
            return vec![];
        }
        let NodeData::AssignAttr { receiver, .. } = &ctx.module.node(node).data else {
            return vec![];
        };
        if receiver != "self" {
            return vec![];
        }
        // Las asignaciones del constructor son legítimas
        let frame = ctx.module.frame(node);
        if let Some(f) = ctx.module.function_data(frame) {
            if f.name == "__init__" || f.name == "__new__" || f.name == "__post_init__" {
                return vec![];
            }
        }
        // Clases ya congeladas no pueden reasignar: deja que el runtime lo
        // diga; el lint apunta a las mutables.
        vec![Violation::from_node(
            ctx.module,
            self.code(),
            "Domain immutability: attribute assignment outside __init__ in Domain."
                .to_string(),
            node,
        )
        .fixable(ctx.registry.is_fixable("W9601") && self.fix_target_class(ctx, node).is_some())]
    }

    fn check_classdef(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        if ctx.layers.resolve_class(ctx.module, node).as_deref() != Some(LAYER_DOMAIN) {
            return vec![];
        }
        let Some(data) = ctx.module.class_data(node) else { return vec![] };
        let mut is_dataclass = false;
        let mut is_frozen = false;
        for dec in &data.decorators {
            let head = dec.split('(').next().unwrap_or(dec);
            if head.ends_with("dataclass") {
                is_dataclass = true;
                if dec.contains("frozen=True") {
                    is_frozen = true;
                }
            }
        }
        if !is_dataclass || is_frozen {
            return vec![];
        }
        vec![Violation::from_node(
            ctx.module,
            self.code(),
            "Domain immutability: dataclass in Domain must be frozen.".to_string(),
            node,
        )
        .fixable(!self.has_custom_setattr(ctx, node))]
    }

    fn has_custom_setattr(&self, ctx: &RuleContext<'_>, class: NodeId) -> bool {
        ctx.module.node(class).children.iter().any(|&c| {
            ctx.module
                .function_data(c)
                .map(|f| f.name == "__setattr__")
                .unwrap_or(false)
        })
    }

    /// Clase objetivo del fix para una violación de asignación.
    fn fix_target_class(&self, ctx: &RuleContext<'_>, node: NodeId) -> Option<NodeId> {
        let class = ctx.module.enclosing_class(node)?;
        if self.has_custom_setattr(ctx, class) {
            return None;
        }
        Some(class)
    }
}

impl Checkable for DomainImmutabilityRule {
    fn code(&self) -> &'static str {
        "W9601"
    }

    fn description(&self) -> &'static str {
        "Domain entities must be immutable (frozen dataclasses)."
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::AssignAttr, NodeKind::ClassDef]
    }

    fn check(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        if ctx.is_test_file() {
            return vec![];
        }
        match ctx.module.kind(node) {
            NodeKind::AssignAttr => self.check_assign_attr(ctx, node),
            NodeKind::ClassDef => self.check_classdef(ctx, node),
            _ => vec![],
        }
    }
}

impl Fixable for DomainImmutabilityRule {
    /// Plan: congelar la dataclass (y asegurar el import). Aborta con None
    /// si la clase define __setattr__ propio.
    fn fix(
        &self,
        ctx: &RuleContext<'_>,
        violation: &Violation,
    ) -> Option<Vec<TransformationPlan>> {
        let node = violation.node?;
        let class = match ctx.module.kind(node) {
            NodeKind::ClassDef => {
                if self.has_custom_setattr(ctx, node) {
                    return None;
                }
                node
            }
            _ => self.fix_target_class(ctx, node)?,
        };
        let data = ctx.module.class_data(class)?;
        let line = ctx.module.node(class).line;
        let mut plans = Vec::new();
        let has_import = ctx.module.imports().iter().any(|&i| {
            matches!(
                &ctx.module.node(i).data,
                NodeData::ImportFrom { module, names, .. }
                    if module == "dataclasses"
                        && names.iter().any(|n| n.name == "dataclass")
            )
        });
        if !has_import {
            plans.push(TransformationPlan::add_import(
                &ctx.module.path,
                "dataclasses",
                &["dataclass".to_string()],
            ));
        }
        plans.push(TransformationPlan::add_frozen_decorator(
            &ctx.module.path,
            &data.name,
            line,
        ));
        Some(plans)
    }
}

#[cfg(test)]
mod tests {
    use crate::rules::engine::test_support::{check_single_rule, fix_single_rule};

    #[test]
    fn test_mutation_outside_init_fires() {
        let src = "\
class Order:
    def __init__(self, total):
        self.total = total

    def update(self, total):
        self.total = total
";
        let violations = check_single_rule("src/domain/order.py", src, &["W9601"]);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].line, 6);
    }

    #[test]
    fn test_init_assignment_allowed() {
        let src = "\
class Order:
    def __init__(self, total):
        self.total = total
";
        let violations = check_single_rule("src/domain/order.py", src, &["W9601"]);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_unfrozen_dataclass_fires_and_is_fixable() {
        let src = "\
from dataclasses import dataclass

@dataclass
class Money:
    amount: int
";
        let violations = check_single_rule("src/domain/money.py", src, &["W9601"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].fixable);
    }

    #[test]
    fn test_frozen_dataclass_clean() {
        let src = "\
from dataclasses import dataclass

@dataclass(frozen=True)
class Money:
    amount: int
";
        let violations = check_single_rule("src/domain/money.py", src, &["W9601"]);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_fix_plans_freeze_without_duplicate_import() {
        let src = "\
from dataclasses import dataclass

@dataclass
class Money:
    amount: int
";
        let plans = fix_single_rule("src/domain/money.py", src, "W9601");
        assert_eq!(plans.len(), 1, "import ya presente: solo el decorador");
        assert_eq!(plans[0].anchor.identifier, "Money");
    }

    #[test]
    fn test_custom_setattr_aborts_fix() {
        let src = "\
from dataclasses import dataclass

@dataclass
class Weird:
    amount: int

    def __setattr__(self, k, v):
        object.__setattr__(self, k, v)
";
        let violations = check_single_rule("src/domain/weird.py", src, &["W9601"]);
        assert_eq!(violations.len(), 1);
        assert!(!violations[0].fixable);
    }

    #[test]
    fn test_outside_domain_not_checked() {
        let src = "\
class Session:
    def refresh(self):
        self.token = rotate()
";
        let violations = check_single_rule("src/infrastructure/session.py", src, &["W9601"]);
        assert!(violations.is_empty());
    }
}
