//! W9006 (Law of Demeter) y W9019 (dependencia no inferible).
//!
//! Regla stateful por función: el driver es dueño del mapa de locals
//! "extraños" (asignados desde llamadas no confiables); la regla recibe ese
//! contexto en cada callback.

use std::collections::HashMap;

use crate::ast::{NodeData, NodeId, NodeKind};
use crate::rules::{RuleContext, Violation};

const MIN_CHAIN_LENGTH: usize = 2;
const MAX_SELF_CHAIN_LENGTH: usize = 2;

pub struct LawOfDemeterRule;

impl LawOfDemeterRule {
    /// Registra una asignación: marca el target como "extraño" si viene de
    /// una llamada no confiable con tipo no primitivo.
    pub fn record_assign(
        &self,
        ctx: &RuleContext<'_>,
        node: NodeId,
        locals_map: &mut HashMap<String, bool>,
    ) {
        let children = &ctx.module.node(node).children;
        let Some(&value) = children.last() else { return };
        if ctx.module.kind(value) != NodeKind::Call {
            return;
        }
        if ctx.oracle.is_trusted_authority_call(
            ctx.module,
            value,
            &ctx.config.trusted_authority_roots(),
        ) {
            return;
        }
        if let Some(q) = ctx.oracle.resolve_expr(ctx.module, value) {
            if ctx.oracle.is_primitive(&q) {
                return;
            }
        }
        // Receptor primitivo: "x".split() no produce un extraño
        if let NodeData::Call { func, .. } = &ctx.module.node(value).data {
            if let NodeData::Attribute { object, .. } = &ctx.module.node(*func).data {
                if let Some(q) = ctx.oracle.resolve_expr(ctx.module, *object) {
                    if ctx.oracle.is_primitive(&q) {
                        return;
                    }
                }
            }
        }
        for &target in children {
            if let NodeData::AssignName { id } = &ctx.module.node(target).data {
                locals_map.insert(id.clone(), true);
            }
        }
    }

    /// Chequea una llamada: cadena de accesos o método sobre un extraño.
    pub fn check_call(
        &self,
        ctx: &RuleContext<'_>,
        node: NodeId,
        locals_map: &HashMap<String, bool>,
    ) -> Vec<Violation> {
        if ctx.is_test_file() {
            return vec![];
        }
        let chain = self.check_method_chain(ctx, node);
        if !chain.is_empty() {
            return chain;
        }
        self.check_stranger_variable(ctx, node, locals_map)
    }

    fn check_method_chain(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        let m = ctx.module;
        let NodeData::Call { func, .. } = &m.node(node).data else { return vec![] };
        if m.kind(*func) != NodeKind::Attribute {
            return vec![];
        }
        // Recorre la cadena: a.b.c() → chain [c, b], receptor a
        let mut chain: Vec<String> = Vec::new();
        let mut curr = *func;
        loop {
            match &m.node(curr).data {
                NodeData::Attribute { attr, object } => {
                    chain.push(attr.clone());
                    curr = *object;
                }
                NodeData::Call { func: inner, .. } => {
                    chain.push("()".to_string());
                    curr = *inner;
                }
                _ => break,
            }
        }
        if chain.len() < MIN_CHAIN_LENGTH {
            return vec![];
        }
        // Receptor raíz no inferible de módulo externo sin stub → W9019
        if ctx.oracle.resolve_expr(m, curr).is_none() {
            if let Some(ext_mod) = self.external_module_for(ctx, curr) {
                if ctx.oracle.get_stub_path(&ext_mod).is_none() {
                    let stub_path = ext_mod.replace('.', "/");
                    return vec![Violation::from_node(
                        m,
                        "W9019",
                        format!(
                            "Uninferable dependency: {ext_mod}. Create stubs/{stub_path}.pyi"
                        ),
                        node,
                    )];
                }
            }
        }
        if self.is_chain_excluded(ctx, node, &chain, curr) {
            return vec![];
        }
        let mut full: Vec<String> = chain.clone();
        if let Some(root) = m.dotted_name(curr) {
            full.push(root);
        }
        full.reverse();
        let rendered = full.join(".").replace(".()", "()");
        vec![Violation::from_node(
            m,
            "W9006",
            format!("Law of Demeter: {rendered}"),
            node,
        )
        .comment_only()]
    }

    fn check_stranger_variable(
        &self,
        ctx: &RuleContext<'_>,
        node: NodeId,
        locals_map: &HashMap<String, bool>,
    ) -> Vec<Violation> {
        let m = ctx.module;
        let NodeData::Call { func, .. } = &m.node(node).data else { return vec![] };
        let NodeData::Attribute { attr, object } = &m.node(*func).data else {
            return vec![];
        };
        let NodeData::Name { id: receiver } = &m.node(*object).data else {
            return vec![];
        };
        if !locals_map.get(receiver).copied().unwrap_or(false) {
            return vec![];
        }
        if let Some(q) = ctx.oracle.resolve_expr(m, *object) {
            if ctx.oracle.is_primitive(&q) {
                return vec![];
            }
        }
        if self.is_chain_excluded(ctx, node, &[attr.clone()], *object) {
            return vec![];
        }
        vec![Violation::from_node(
            m,
            "W9006",
            format!("Law of Demeter: {receiver}.{attr} (Stranger)"),
            node,
        )
        .comment_only()]
    }

    /// Escalera de exclusiones del original: mocks, autoridades confiables,
    /// llamadas fluidas, receptores primitivos, stdlib, self/cls cortos,
    /// instanciación local, protocolos y capas Domain/DTO.
    fn is_chain_excluded(
        &self,
        ctx: &RuleContext<'_>,
        node: NodeId,
        chain: &[String],
        receiver: NodeId,
    ) -> bool {
        let m = ctx.module;
        let trusted = ctx.config.trusted_authority_roots();
        if ctx.oracle.is_trusted_authority_call(m, node, &trusted) {
            return true;
        }
        if ctx.oracle.is_fluent_call(m, node) {
            return true;
        }
        if let Some(q) = ctx.oracle.resolve_expr(m, receiver) {
            if ctx.oracle.is_primitive(&q) {
                return true;
            }
            if ctx.oracle.is_stdlib_qname(&q) {
                return true;
            }
            if q.contains("Mock") || q.contains("unittest.mock") {
                return true;
            }
            if q.ends_with("Protocol") {
                return true;
            }
            // Tipos de Domain/DTO son recorribles
            let module_part = q.rsplit_once('.').map(|(m, _)| m).unwrap_or("");
            if !module_part.is_empty() {
                let simulated = std::path::PathBuf::from(module_part.replace('.', "/"))
                    .with_extension("py");
                if let Some(layer) = ctx.layers.resolve(module_part, &simulated) {
                    if layer == "Domain" {
                        return true;
                    }
                }
            }
            for root in ctx.config.lod_safe_roots() {
                if q == root || q.starts_with(&format!("{root}.")) {
                    return true;
                }
            }
        }
        // Receptor por nombre: self/cls con cadena corta, módulo stdlib,
        // instanciación local
        if let NodeData::Name { id } = &m.node(receiver).data {
            if (id == "self" || id == "cls") && chain.len() <= MAX_SELF_CHAIN_LENGTH {
                return true;
            }
            if ctx.oracle.is_stdlib_module(id) {
                return true;
            }
            if self.is_locally_instantiated(ctx, receiver, id) {
                return true;
            }
            if self.is_assigned_from_container_get(ctx, receiver, id) {
                return true;
            }
        }
        // os.path.join(...) etc: raíz punteada stdlib
        if let Some(dotted) = m.dotted_name(receiver) {
            let root = dotted.split('.').next().unwrap_or(&dotted);
            if ctx.oracle.is_stdlib_module(root) {
                return true;
            }
        }
        false
    }

    /// ¿La variable se asignó en este frame desde `Clase(...)` local?
    fn is_locally_instantiated(
        &self,
        ctx: &RuleContext<'_>,
        receiver: NodeId,
        name: &str,
    ) -> bool {
        let m = ctx.module;
        let frame = m.frame(receiver);
        for assign in m.nodes_of_kind(frame, NodeKind::Assign) {
            let children = &m.node(assign).children;
            let target_matches = children.iter().any(|&t| {
                matches!(&m.node(t).data, NodeData::AssignName { id } if id == name)
            });
            if !target_matches {
                continue;
            }
            let Some(&value) = children.last() else { continue };
            if let NodeData::Call { callee: Some(c), .. } = &m.node(value).data {
                let bare = c.rsplit('.').next().unwrap_or(c);
                if bare.chars().next().map(char::is_uppercase).unwrap_or(false) {
                    return true;
                }
            }
        }
        false
    }

    /// ¿La variable viene de `self.algo.get(...)` / contenedor local?
    fn is_assigned_from_container_get(
        &self,
        ctx: &RuleContext<'_>,
        receiver: NodeId,
        name: &str,
    ) -> bool {
        let m = ctx.module;
        let frame = m.frame(receiver);
        for assign in m.nodes_of_kind(frame, NodeKind::Assign) {
            let children = &m.node(assign).children;
            let target_matches = children.iter().any(|&t| {
                matches!(&m.node(t).data, NodeData::AssignName { id } if id == name)
            });
            if !target_matches {
                continue;
            }
            let Some(&value) = children.last() else { continue };
            if let NodeData::Call { callee: Some(c), .. } = &m.node(value).data {
                if c.ends_with(".get") && (c.starts_with("self.") || !c.contains('.')) {
                    return true;
                }
            }
        }
        false
    }

    /// Módulo externo del receptor no inferible (para W9019).
    fn external_module_for(&self, ctx: &RuleContext<'_>, receiver: NodeId) -> Option<String> {
        let m = ctx.module;
        let name = match &m.node(receiver).data {
            NodeData::Name { id } => id.clone(),
            _ => m.dotted_name(receiver)?.split('.').next()?.to_string(),
        };
        for imp in m.imports() {
            match &m.node(imp).data {
                NodeData::Import { names } => {
                    for n in names {
                        if n.bound_name() == name {
                            let top = n.name.split('.').next().unwrap_or(&n.name);
                            if ctx.oracle.is_stdlib_module(top) {
                                return None;
                            }
                            if self.is_project_module(ctx, &n.name) {
                                return None;
                            }
                            return Some(n.name.clone());
                        }
                    }
                }
                NodeData::ImportFrom { module, names, level } => {
                    if *level > 0 {
                        continue;
                    }
                    for n in names {
                        if n.bound_name() == name {
                            let top = module.split('.').next().unwrap_or(module);
                            if ctx.oracle.is_stdlib_module(top) {
                                return None;
                            }
                            if self.is_project_module(ctx, module) {
                                return None;
                            }
                            return Some(module.clone());
                        }
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn is_project_module(&self, ctx: &RuleContext<'_>, module: &str) -> bool {
        let tops: Vec<&str> = ctx
            .config
            .layer_map
            .keys()
            .filter_map(|k| k.split('.').next())
            .collect();
        tops.iter().any(|t| module == *t || module.starts_with(&format!("{t}.")))
    }
}

#[cfg(test)]
mod tests {
    use crate::rules::engine::test_support::check_single_rule;

    #[test]
    fn test_chain_of_three_attributes_fires() {
        // Cadena de tres atributos: user.address.coordinates.lat
        let src = "\
def locate(user):
    return user.address.coordinates.lat()
";
        let violations = check_single_rule("src/use_cases/geo.py", src, &["W9006"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("user.address.coordinates"));
        assert!(violations[0].is_comment_only);
    }

    #[test]
    fn test_single_hop_allowed() {
        let src = "def f(repo):\n    return repo.save()\n";
        let violations = check_single_rule("src/use_cases/x.py", src, &["W9006"]);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_fluent_path_chain_excluded() {
        let src = "\
def f(p: pathlib.Path):
    return p.resolve().exists()
";
        let violations = check_single_rule("src/use_cases/x.py", src, &["W9006"]);
        assert!(violations.is_empty(), "cadenas fluidas no violan LoD: {violations:?}");
    }

    #[test]
    fn test_stdlib_receiver_excluded() {
        let src = "def f(path):\n    return os.path.join(path, 'x')\n";
        let violations = check_single_rule("src/use_cases/x.py", src, &["W9006"]);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_primitive_receiver_excluded() {
        let src = "def f(name: str):\n    return name.strip().lower()\n";
        let violations = check_single_rule("src/use_cases/x.py", src, &["W9006"]);
        assert!(violations.is_empty(), "str es primitivo: {violations:?}");
    }

    #[test]
    fn test_self_short_chain_allowed() {
        let src = "\
class UseCase:
    def run(self):
        return self.repo.save()
";
        let violations = check_single_rule("src/use_cases/x.py", src, &["W9006"]);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_stranger_variable_fires() {
        let src = "\
def f(repo):
    session = repo.open_session()
    return session.execute(query)
";
        let violations = check_single_rule("src/use_cases/x.py", src, &["W9006"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("Stranger"));
    }

    #[test]
    fn test_unstubbed_external_module_fires_w9019() {
        let src = "\
import vendorlib

def f():
    return vendorlib.client.connect()
";
        let violations = check_single_rule("src/use_cases/x.py", src, &["W9019"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("stubs/vendorlib.pyi"));
    }

    #[test]
    fn test_test_files_excluded() {
        let src = "def test_flow(user):\n    assert user.a.b.c() == 1\n";
        let violations = check_single_rule("tests/test_x.py", src, &["W9006"]);
        assert!(violations.is_empty());
    }
}
