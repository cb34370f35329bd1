//! Sugerencias de patrones de diseño (W9041–W9045). Hallazgos informativos:
//! por defecto no cuentan para el bloqueo del pipeline.

use std::collections::{BTreeMap, BTreeSet};

use crate::ast::{NodeData, NodeId, NodeKind};
use crate::rules::{Checkable, RuleContext, Violation};

pub const PATTERN_CODES: &[&str] = &["W9041", "W9042", "W9043", "W9044", "W9045"];

const BUILDER_PARAM_THRESHOLD: usize = 6;
const FACADE_DEPENDENCY_THRESHOLD: usize = 5;

/// W9041: constructor con demasiados parámetros → Builder.
pub struct BuilderSuggestionRule;

impl Checkable for BuilderSuggestionRule {
    fn code(&self) -> &'static str {
        "W9041"
    }

    fn description(&self) -> &'static str {
        "Consider Builder: __init__ has many parameters."
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::FunctionDef]
    }

    fn check(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        let Some(data) = ctx.module.function_data(node) else { return vec![] };
        if data.name != "__init__" {
            return vec![];
        }
        let mut n = data.params.len();
        if ctx.module.is_method(node) {
            n = n.saturating_sub(1); // excluye self
        }
        if n < BUILDER_PARAM_THRESHOLD {
            return vec![];
        }
        let class_name = ctx
            .module
            .enclosing_class(node)
            .and_then(|c| ctx.module.class_data(c))
            .map(|c| c.name.clone())
            .unwrap_or_else(|| "?".to_string());
        vec![Violation::from_node(
            ctx.module,
            self.code(),
            format!("__init__ of '{class_name}' has {n} parameters; consider Builder pattern."),
            node,
        )]
    }
}

fn is_chain_head(ctx: &RuleContext<'_>, node: NodeId) -> bool {
    match ctx.module.node(node).parent {
        Some(parent) if ctx.module.kind(parent) == NodeKind::If => {
            match &ctx.module.node(parent).data {
                NodeData::If { orelse, .. } => !orelse.contains(&node),
                _ => true,
            }
        }
        _ => true,
    }
}

fn elif_branches(ctx: &RuleContext<'_>, node: NodeId) -> usize {
    let mut count = 1;
    let mut current = node;
    loop {
        let NodeData::If { orelse, .. } = &ctx.module.node(current).data else { break };
        if orelse.len() == 1 && ctx.module.kind(orelse[0]) == NodeKind::If {
            count += 1;
            current = orelse[0];
        } else {
            break;
        }
    }
    count
}

/// W9042: if/elif que instancian clases distintas → Factory.
pub struct FactorySuggestionRule;

impl FactorySuggestionRule {
    fn instantiations_in_chain(&self, ctx: &RuleContext<'_>, node: NodeId) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        for call in ctx.module.nodes_of_kind(node, NodeKind::Call) {
            if let NodeData::Call { callee: Some(name), .. } = &ctx.module.node(call).data {
                let bare = name.rsplit('.').next().unwrap_or(name);
                // Heurística de constructor: CamelCase
                if bare.chars().next().map(char::is_uppercase).unwrap_or(false) {
                    seen.insert(bare.to_string());
                }
            }
        }
        seen
    }
}

impl Checkable for FactorySuggestionRule {
    fn code(&self) -> &'static str {
        "W9042"
    }

    fn description(&self) -> &'static str {
        "Consider Factory: if/elif instantiating different classes."
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::If]
    }

    fn check(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        if !is_chain_head(ctx, node) {
            return vec![];
        }
        let classes = self.instantiations_in_chain(ctx, node);
        if classes.len() < 2 {
            return vec![];
        }
        let classes_str = classes.into_iter().collect::<Vec<_>>().join(", ");
        vec![Violation::from_node(
            ctx.module,
            self.code(),
            format!("if/elif instantiating different classes ({classes_str}); consider Factory."),
            node,
        )]
    }
}

/// W9043: if/elif seleccionando comportamiento → Strategy.
pub struct StrategySuggestionRule;

impl Checkable for StrategySuggestionRule {
    fn code(&self) -> &'static str {
        "W9043"
    }

    fn description(&self) -> &'static str {
        "Consider Strategy: if/elif selecting different algorithms."
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::If]
    }

    fn check(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        if !is_chain_head(ctx, node) {
            return vec![];
        }
        let branches = elif_branches(ctx, node);
        if branches < 3 {
            return vec![];
        }
        vec![Violation::from_node(
            ctx.module,
            self.code(),
            format!(
                "if/elif chain with {branches} branches selecting behavior; consider Strategy pattern."
            ),
            node,
        )]
    }
}

/// W9044: condicionales repetidos sobre el mismo atributo → State.
pub struct StateSuggestionRule;

impl StateSuggestionRule {
    /// attr → cuántos métodos ramifican sobre self.attr.
    fn state_attrs(&self, ctx: &RuleContext<'_>, class: NodeId) -> BTreeMap<String, usize> {
        let mut methods_per_attr: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for &child in &ctx.module.node(class).children {
            if !matches!(
                ctx.module.kind(child),
                NodeKind::FunctionDef | NodeKind::AsyncFunctionDef
            ) {
                continue;
            }
            let method = ctx
                .module
                .function_data(child)
                .map(|f| f.name.clone())
                .unwrap_or_default();
            for if_node in ctx.module.nodes_of_kind(child, NodeKind::If) {
                let NodeData::If { test, .. } = &ctx.module.node(if_node).data else {
                    continue;
                };
                let text = ctx.module.text(*test);
                if let Some(attr) = self_attr_in_condition(text) {
                    methods_per_attr.entry(attr).or_default().insert(method.clone());
                }
            }
        }
        methods_per_attr.into_iter().map(|(k, v)| (k, v.len())).collect()
    }
}

fn self_attr_in_condition(text: &str) -> Option<String> {
    let idx = text.find("self.")?;
    let rest = &text[idx + 5..];
    let attr: String = rest
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if attr.is_empty() {
        None
    } else {
        Some(attr)
    }
}

impl Checkable for StateSuggestionRule {
    fn code(&self) -> &'static str {
        "W9044"
    }

    fn description(&self) -> &'static str {
        "Consider State: repeated conditionals on the same attribute."
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::ClassDef]
    }

    fn check(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        for (attr, count) in self.state_attrs(ctx, node) {
            if count >= 3 {
                return vec![Violation::from_node(
                    ctx.module,
                    self.code(),
                    format!(
                        "Repeated conditionals on '{attr}' in {count} methods; consider State pattern."
                    ),
                    node,
                )];
            }
        }
        vec![]
    }
}

/// W9045: método orquestando demasiadas dependencias → Facade.
pub struct FacadeSuggestionRule;

impl FacadeSuggestionRule {
    /// Atributos distintos de self usados como receptor de llamada.
    fn distinct_dependency_calls(&self, ctx: &RuleContext<'_>, func: NodeId) -> usize {
        let mut attrs = BTreeSet::new();
        for call in ctx.module.nodes_of_kind(func, NodeKind::Call) {
            if let NodeData::Call { callee: Some(name), .. } = &ctx.module.node(call).data {
                let parts: Vec<&str> = name.split('.').collect();
                if parts.len() >= 3 && parts[0] == "self" {
                    attrs.insert(parts[1].to_string());
                }
            }
        }
        attrs.len()
    }
}

impl Checkable for FacadeSuggestionRule {
    fn code(&self) -> &'static str {
        "W9045"
    }

    fn description(&self) -> &'static str {
        "Consider Facade: method orchestrates many dependencies."
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::FunctionDef, NodeKind::AsyncFunctionDef]
    }

    fn check(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        let distinct = self.distinct_dependency_calls(ctx, node);
        if distinct < FACADE_DEPENDENCY_THRESHOLD {
            return vec![];
        }
        let name = ctx
            .module
            .function_data(node)
            .map(|f| f.name.clone())
            .unwrap_or_default();
        vec![Violation::from_node(
            ctx.module,
            self.code(),
            format!(
                "Method '{name}' calls {distinct} distinct dependency objects; consider Facade."
            ),
            node,
        )]
    }
}

#[cfg(test)]
mod tests {
    use crate::rules::engine::test_support::check_single_rule;

    #[test]
    fn test_builder_suggested_for_six_params() {
        let src = "\
class Report:
    def __init__(self, a, b, c, d, e, f):
        self.a = a
";
        let violations = check_single_rule("src/interface/report.py", src, &["W9041"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("Report"));
        assert!(violations[0].message.contains("6"));
    }

    #[test]
    fn test_builder_not_suggested_for_five_params() {
        let src = "\
class Report:
    def __init__(self, a, b, c, d, e):
        self.a = a
";
        let violations = check_single_rule("src/interface/report.py", src, &["W9041"]);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_factory_suggested_for_branching_construction() {
        let src = "\
def build(kind):
    if kind == 'csv':
        return CsvWriter()
    elif kind == 'json':
        return JsonWriter()
";
        let violations = check_single_rule("src/interface/writers.py", src, &["W9042"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("CsvWriter"));
        assert!(violations[0].message.contains("JsonWriter"));
    }

    #[test]
    fn test_strategy_suggested_for_long_chain() {
        let src = "\
def pick(mode, x):
    if mode == 'a':
        x = x + 1
    elif mode == 'b':
        x = x + 2
    elif mode == 'c':
        x = x + 3
    return x
";
        let violations = check_single_rule("src/use_cases/x.py", src, &["W9043"]);
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn test_state_suggested_for_repeated_attribute_conditionals() {
        let src = "\
class Door:
    def open(self):
        if self.status == 'closed':
            return 1
    def close(self):
        if self.status == 'open':
            return 2
    def lock(self):
        if self.status == 'closed':
            return 3
";
        let violations = check_single_rule("src/domain/door.py", src, &["W9044"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("status"));
    }

    #[test]
    fn test_facade_suggested_for_many_dependencies() {
        let src = "\
class Checkout:
    def run(self):
        self.stock.reserve()
        self.payments.charge()
        self.shipping.schedule()
        self.notifier.send()
        self.audit.log()
";
        let violations = check_single_rule("src/use_cases/checkout.py", src, &["W9045"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("run"));
    }
}
