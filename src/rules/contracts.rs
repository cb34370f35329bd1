//! Integridad de contratos: W9201 (clases de infraestructura sin Protocol
//! de dominio) y W9202 (stubs de métodos concretos).
//!
//! W9201 decide con un algoritmo de 8 reglas, en orden; el mensaje incluye
//! siempre la regla numérica que disparó y cómo anular la decisión.

use crate::ast::{NodeData, NodeId, NodeKind};
use crate::layers::{LAYER_DOMAIN, LAYER_INFRASTRUCTURE};
use crate::rules::{Checkable, RuleContext, Violation};

/// Resultado del algoritmo de decisión.
enum Verdict {
    RequiresProtocol { rule: u8, reason: String },
    Internal,
}

pub struct ContractIntegrityRule;

impl ContractIntegrityRule {
    fn decide(&self, ctx: &RuleContext<'_>, node: NodeId, name: &str) -> Verdict {
        let cfg = &ctx.config.contract_integrity;
        let data = ctx.module.class_data(node).expect("ClassDef");

        // Regla 1: listas explícitas de configuración
        if cfg.require_protocol.iter().any(|c| c == name) {
            return Verdict::RequiresProtocol {
                rule: 1,
                reason: "listed in require_protocol".to_string(),
            };
        }
        if cfg.internal_implementation.iter().any(|c| c == name) {
            return Verdict::Internal;
        }

        // Regla 2: ancestro de framework o dataclass
        let framework_bases = cfg.framework_bases();
        let is_framework = data.bases.iter().any(|b| {
            let bare = b.rsplit('.').next().unwrap_or(b);
            framework_bases
                .iter()
                .any(|f| f == b || f.rsplit('.').next() == Some(bare))
        });
        let is_dataclass = data
            .decorators
            .iter()
            .any(|d| d.split('(').next().unwrap_or(d).ends_with("dataclass"));
        if is_framework || is_dataclass {
            return Verdict::Internal;
        }

        // Regla 3: TypedDict / NamedTuple
        if data.bases.iter().any(|b| {
            let bare = b.rsplit('.').next().unwrap_or(b);
            bare == "TypedDict" || bare == "NamedTuple"
        }) {
            return Verdict::Internal;
        }

        // Regla 4: prefijo privado o decorador @internal
        if cfg.allow_private_prefix && name.starts_with('_') {
            return Verdict::Internal;
        }
        if cfg.allow_internal_decorator
            && data.decorators.iter().any(|d| d.split('(').next() == Some("internal"))
        {
            return Verdict::Internal;
        }

        // Regla 5: retornada por un método de contenedor DI
        if cfg.enable_di_container_detection && self.returned_by_container(ctx, name) {
            return Verdict::RequiresProtocol {
                rule: 5,
                reason: "returned by a DI container method".to_string(),
            };
        }

        // Regla 6: importada por un módulo Domain/UseCase
        if cfg.enable_cross_layer_detection {
            if let Some(project) = ctx.project {
                if let Some(importer) =
                    project.silent_importer_of(&ctx.module.name, name)
                {
                    return Verdict::RequiresProtocol {
                        rule: 6,
                        reason: format!("imported by {importer}"),
                    };
                }
            }
        }

        // Regla 7: existe un FooProtocol en Domain
        if cfg.enable_protocol_exists_detection {
            if let Some(project) = ctx.project {
                if project.domain_protocol_exists(&format!("{name}Protocol")) {
                    return Verdict::RequiresProtocol {
                        rule: 7,
                        reason: format!("{name}Protocol exists in Domain"),
                    };
                }
            }
        }

        // Regla 8: defaults por directorio
        let path = ctx.module.path.to_string_lossy().replace('\\', "/");
        let (required, segment) = if path.contains("/services/") {
            (cfg.services_require_protocol, "services/")
        } else if path.contains("/adapters/") {
            (cfg.adapters_require_protocol, "adapters/")
        } else if path.contains("/gateways/") {
            (cfg.gateways_require_protocol, "gateways/")
        } else {
            (cfg.other_require_protocol, "other")
        };
        if required {
            Verdict::RequiresProtocol {
                rule: 8,
                reason: format!("directory default for {segment}"),
            }
        } else {
            Verdict::Internal
        }
    }

    /// Regla 5: algún método de una clase *Container del módulo retorna
    /// exactamente este tipo.
    fn returned_by_container(&self, ctx: &RuleContext<'_>, name: &str) -> bool {
        for class in ctx.module.nodes_of_kind(ctx.module.root, NodeKind::ClassDef) {
            let Some(data) = ctx.module.class_data(class) else { continue };
            if !data.name.contains("Container") {
                continue;
            }
            for method in ctx.module.nodes_of_kind(class, NodeKind::FunctionDef) {
                if let Some(f) = ctx.module.function_data(method) {
                    let ret = f.returns.as_deref().unwrap_or("");
                    if ret == name || ret.ends_with(&format!(".{name}")) {
                        return true;
                    }
                }
            }
        }
        false
    }

    fn has_protocol_ancestor(&self, ctx: &RuleContext<'_>, node: NodeId) -> bool {
        let Some(data) = ctx.module.class_data(node) else { return false };
        data.bases.iter().any(|b| {
            let bare = b.rsplit('.').next().unwrap_or(b).split('[').next().unwrap_or(b);
            if bare.ends_with("Protocol") && bare != "Protocol" {
                return true;
            }
            ctx.project
                .map(|p| p.domain_protocol_exists(bare))
                .unwrap_or(false)
        })
    }

    fn is_exception_class(&self, ctx: &RuleContext<'_>, node: NodeId) -> bool {
        ctx.module
            .class_data(node)
            .map(|c| {
                c.name.ends_with("Error")
                    || c.name.ends_with("Exception")
                    || c.bases.iter().any(|b| {
                        let bare = b.rsplit('.').next().unwrap_or(b);
                        bare.ends_with("Error") || bare.ends_with("Exception")
                    })
            })
            .unwrap_or(false)
    }

    /// Métodos públicos fuera del contrato heredado.
    fn extra_public_methods(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        let Some(data) = ctx.module.class_data(node) else { return vec![] };
        let Some(project) = ctx.project else { return vec![] };
        let mut contract_methods = std::collections::BTreeSet::new();
        let mut any_known_protocol = false;
        for base in &data.bases {
            let bare = base.rsplit('.').next().unwrap_or(base);
            if let Some(methods) = project.protocol_methods(bare) {
                any_known_protocol = true;
                contract_methods.extend(methods.iter().cloned());
            }
        }
        if !any_known_protocol {
            return vec![];
        }
        let mut violations = Vec::new();
        for &child in &ctx.module.node(node).children {
            if !matches!(
                ctx.module.kind(child),
                NodeKind::FunctionDef | NodeKind::AsyncFunctionDef
            ) {
                continue;
            }
            let Some(f) = ctx.module.function_data(child) else { continue };
            if f.name.starts_with('_') {
                continue;
            }
            if !contract_methods.contains(&f.name) {
                violations.push(Violation::from_node(
                    ctx.module,
                    self.code(),
                    format!("Public method {} not in protocol.", f.name),
                    child,
                ));
            }
        }
        violations
    }
}

impl Checkable for ContractIntegrityRule {
    fn code(&self) -> &'static str {
        "W9201"
    }

    fn description(&self) -> &'static str {
        "Infrastructure classes must implement a Domain protocol."
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::ClassDef]
    }

    fn check(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        if ctx.is_test_file() {
            return vec![];
        }
        let layer = ctx.layers.resolve_class(ctx.module, node);
        if layer.as_deref() != Some(LAYER_INFRASTRUCTURE) {
            return vec![];
        }
        if self.is_exception_class(ctx, node) {
            return vec![];
        }
        let Some(name) = ctx.module.class_data(node).map(|c| c.name.clone()) else {
            return vec![];
        };
        match self.decide(ctx, node, &name) {
            Verdict::Internal => vec![],
            Verdict::RequiresProtocol { rule, reason } => {
                if self.has_protocol_ancestor(ctx, node) {
                    return self.extra_public_methods(ctx, node);
                }
                vec![Violation::from_node(
                    ctx.module,
                    self.code(),
                    format!(
                        "Contract Integrity: Infrastructure class {name} must implement a Domain Protocol (rule {rule}: {reason}). Override: add '{name}' to internal_implementation in [tool.clean-arch.contract_integrity]."
                    ),
                    node,
                )]
            }
        }
    }
}

/// W9202: métodos concretos cuyo cuerpo es solo `pass` / `...` /
/// `return None`.
pub struct ConcreteMethodStubRule;

impl ConcreteMethodStubRule {
    fn is_stub_body(&self, ctx: &RuleContext<'_>, func: NodeId) -> bool {
        let body: Vec<NodeId> = ctx
            .module
            .node(func)
            .children
            .iter()
            .copied()
            .filter(|&c| {
                !matches!(
                    ctx.module.kind(c),
                    NodeKind::Arguments | NodeKind::Decorators
                )
            })
            .collect();
        if body.is_empty() {
            return true;
        }
        body.iter().all(|&stmt| match ctx.module.kind(stmt) {
            NodeKind::Pass => true,
            NodeKind::Expr => {
                let text = ctx.module.text(stmt).trim().to_string();
                text == "..." || text.starts_with('"') || text.starts_with("'''")
            }
            NodeKind::Return => match &ctx.module.node(stmt).data {
                NodeData::Return { value: None } => true,
                NodeData::Return { value: Some(v) } => {
                    ctx.module.text(*v).trim() == "None"
                }
                _ => false,
            },
            _ => false,
        })
    }
}

impl Checkable for ConcreteMethodStubRule {
    fn code(&self) -> &'static str {
        "W9202"
    }

    fn description(&self) -> &'static str {
        "Concrete method with a stub body."
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::FunctionDef, NodeKind::AsyncFunctionDef]
    }

    fn check(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        let path = ctx.module.path.to_string_lossy().replace('\\', "/");
        if path.contains("/stubs/") || path.ends_with(".pyi") {
            return vec![];
        }
        let Some(data) = ctx.module.function_data(node) else { return vec![] };
        if data.name.starts_with('_') {
            return vec![];
        }
        if data
            .decorators
            .iter()
            .any(|d| d.contains("abstract") || d.contains("overload"))
        {
            return vec![];
        }
        // Los generadores vacíos son un patrón legítimo
        let is_generator = !ctx.module.nodes_of_kind(node, NodeKind::Yield).is_empty()
            || !ctx.module.nodes_of_kind(node, NodeKind::YieldFrom).is_empty();
        if is_generator {
            return vec![];
        }
        if let Some(class) = ctx.module.enclosing_class(node) {
            let Some(cdata) = ctx.module.class_data(class) else { return vec![] };
            if cdata.bases.iter().any(|b| {
                let bare = b.rsplit('.').next().unwrap_or(b);
                bare == "Protocol" || bare.starts_with("Protocol[")
            }) {
                return vec![];
            }
            let layer = ctx.layers.resolve_class(ctx.module, class);
            if layer.as_deref() == Some(LAYER_DOMAIN) {
                return vec![];
            }
        }
        if !self.is_stub_body(ctx, node) {
            return vec![];
        }
        vec![Violation::from_node(
            ctx.module,
            self.code(),
            format!("Concrete method stub: {}.", data.name),
            node,
        )]
    }
}

#[cfg(test)]
mod tests {
    use crate::rules::engine::test_support::{check_project, check_single_rule};

    #[test]
    fn test_infrastructure_adapter_without_protocol_fires_rule_8() {
        let src = "\
class PaymentsAdapter:
    def charge(self):
        return api.charge()
";
        let violations =
            check_single_rule("src/infrastructure/adapters/payments.py", src, &["W9201"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("rule 8"));
        assert!(violations[0].message.contains("internal_implementation"));
    }

    #[test]
    fn test_protocol_base_satisfies_contract() {
        let src = "\
class PaymentsAdapter(PaymentsProtocol):
    def charge(self):
        return api.charge()
";
        let violations =
            check_single_rule("src/infrastructure/adapters/payments.py", src, &["W9201"]);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_dataclass_is_internal_rule_2() {
        let src = "\
from dataclasses import dataclass

@dataclass
class ConnectionSettings:
    host: str
";
        let violations =
            check_single_rule("src/infrastructure/adapters/settings.py", src, &["W9201"]);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_private_class_is_internal_rule_4() {
        let src = "\
class _RetryPolicy:
    def apply(self):
        return 1
";
        let violations =
            check_single_rule("src/infrastructure/services/retry.py", src, &["W9201"]);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_exception_classes_exempt() {
        let src = "class StorageError(Exception):\n    pass\n";
        let violations =
            check_single_rule("src/infrastructure/gateways/storage.py", src, &["W9201"]);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_di_container_return_requires_protocol_rule_5() {
        let src = "\
class WiringContainer:
    def cache(self) -> RedisCache:
        return RedisCache()

class RedisCache:
    def get(self):
        return None
";
        let violations =
            check_single_rule("src/infrastructure/other_area/cache.py", src, &["W9201"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("rule 5"));
    }

    #[test]
    fn test_domain_protocol_existence_triggers_rule_7() {
        let files = vec![
            (
                "src/domain/ports.py".to_string(),
                "from typing import Protocol\n\nclass MailerProtocol(Protocol):\n    def send(self) -> None: ...\n".to_string(),
            ),
            (
                "src/infrastructure/other_area/mailer.py".to_string(),
                "class Mailer:\n    def send(self):\n        return smtp.send()\n".to_string(),
            ),
        ];
        let violations = check_project(&files, &["W9201"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("rule 7"));
    }

    #[test]
    fn test_extra_public_method_flagged() {
        let files = vec![
            (
                "src/domain/ports.py".to_string(),
                "from typing import Protocol\n\nclass MailerProtocol(Protocol):\n    def send(self) -> None: ...\n".to_string(),
            ),
            (
                "src/infrastructure/adapters/mailer.py".to_string(),
                "class Mailer(MailerProtocol):\n    def send(self):\n        return 1\n    def flush(self):\n        return 2\n".to_string(),
            ),
        ];
        let violations = check_project(&files, &["W9201"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("flush"));
    }

    #[test]
    fn test_concrete_pass_body_fires_w9202() {
        let src = "\
class Store:
    def persist(self):
        pass
";
        let violations =
            check_single_rule("src/infrastructure/gateways/store.py", src, &["W9202"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("persist"));
    }

    #[test]
    fn test_protocol_method_stub_allowed() {
        let src = "\
from typing import Protocol

class StoreProtocol(Protocol):
    def persist(self) -> None: ...
";
        let violations = check_single_rule("src/domain/ports.py", src, &["W9202"]);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_abstract_method_stub_allowed() {
        let src = "\
from abc import abstractmethod

class Base:
    @abstractmethod
    def persist(self):
        pass
";
        let violations =
            check_single_rule("src/infrastructure/gateways/base.py", src, &["W9202"]);
        assert!(violations.is_empty());
    }
}
