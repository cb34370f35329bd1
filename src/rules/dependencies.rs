//! W9001: dirección de dependencias entre capas.

use crate::ast::{NodeData, NodeId, NodeKind};
use crate::layers::LayerResolver;
use crate::rules::{Checkable, RuleContext, Violation};

/// Las capas internas no importan capas externas. La matriz permitida vive
/// en `LayerResolver::allowed_dependencies`.
pub struct LayerDependencyRule;

impl LayerDependencyRule {
    fn check_import(
        &self,
        ctx: &RuleContext<'_>,
        node: NodeId,
        import_name: &str,
        current_layer: &str,
    ) -> Option<Violation> {
        for kernel in &ctx.config.shared_kernel_modules {
            if import_name == kernel || import_name.starts_with(&format!("{kernel}.")) {
                return None;
            }
        }
        let simulated = std::path::PathBuf::from(import_name.replace('.', "/"))
            .with_extension("py");
        let imported_layer = ctx.layers.resolve(import_name, &simulated)?;
        if imported_layer == current_layer {
            return None;
        }
        if LayerResolver::allowed_dependencies(current_layer)
            .contains(&imported_layer.as_str())
        {
            return None;
        }
        Some(Violation::from_node(
            ctx.module,
            self.code(),
            format!("Layer dependency: {imported_layer} not allowed in {current_layer}."),
            node,
        ))
    }
}

impl Checkable for LayerDependencyRule {
    fn code(&self) -> &'static str {
        "W9001"
    }

    fn description(&self) -> &'static str {
        "Layer dependency: imports must respect the layer matrix."
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::Import, NodeKind::ImportFrom]
    }

    fn check(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        if ctx.is_test_file() {
            return vec![];
        }
        let Some(current_layer) = ctx.module_layer else { return vec![] };
        let mut violations = Vec::new();
        match &ctx.module.node(node).data {
            NodeData::Import { names } => {
                for n in names {
                    if let Some(v) = self.check_import(ctx, node, &n.name, current_layer) {
                        violations.push(v);
                    }
                }
            }
            NodeData::ImportFrom { module, level, .. } => {
                // Los imports relativos quedan dentro del mismo paquete.
                if *level == 0 && !module.is_empty() {
                    if let Some(v) = self.check_import(ctx, node, module, current_layer) {
                        violations.push(v);
                    }
                }
            }
            _ => {}
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use crate::rules::engine::test_support::check_single_rule;

    #[test]
    fn test_use_case_importing_infrastructure_fires() {
        // from infrastructure.db import Database dentro de use_cases/
        let violations = check_single_rule(
            "src/use_cases/order.py",
            "from infrastructure.db import Database\n",
            &["W9001"],
        );
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].code, "W9001");
        assert_eq!(violations[0].line, 1);
        assert!(violations[0].message.contains("Infrastructure"));
        assert!(violations[0].message.contains("UseCase"));
    }

    #[test]
    fn test_infrastructure_importing_domain_allowed() {
        let violations = check_single_rule(
            "src/infrastructure/db.py",
            "from domain.entities import Order\n",
            &["W9001"],
        );
        assert!(violations.is_empty());
    }

    #[test]
    fn test_same_layer_import_allowed() {
        let violations = check_single_rule(
            "src/use_cases/order.py",
            "from use_cases.inventory import adjust\n",
            &["W9001"],
        );
        assert!(violations.is_empty());
    }

    #[test]
    fn test_domain_importing_use_case_fires() {
        let violations = check_single_rule(
            "src/domain/order.py",
            "import use_cases.checkout\n",
            &["W9001"],
        );
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn test_test_files_exempt() {
        let violations = check_single_rule(
            "tests/test_order.py",
            "from infrastructure.db import Database\n",
            &["W9001"],
        );
        assert!(violations.is_empty());
    }
}
