//! Estructura de módulos: W9010 (god file), W9011 (lógica en raíz),
//! W9017 (integridad de capas), W9018 (funciones top-level), W9020 (global).
//!
//! Regla stateful a nivel módulo: el driver es dueño de los contadores
//! (`ModuleScopeState`); la regla expone funciones puras que los reciben.

use std::collections::BTreeSet;

use crate::ast::{NodeData, NodeId, NodeKind};
use crate::layers::{LAYER_INFRASTRUCTURE, LAYER_USE_CASE};
use crate::rules::{Checkable, RuleContext, Violation};

const ROOT_ENTRY_ALLOWLIST: &[&str] = &[
    "setup.py",
    "conftest.py",
    "manage.py",
    "wsgi.py",
    "asgi.py",
    "main.py",
    "__main__.py",
    "cli.py",
];

/// Estado por módulo, propiedad del driver.
#[derive(Default)]
pub struct ModuleScopeState {
    pub heavy_class_names: Vec<String>,
    pub layer_types: BTreeSet<String>,
    pub top_level_function_count: usize,
}

pub struct ModuleStructureRule;

impl ModuleStructureRule {
    /// W9011 + W9017, al entrar al módulo.
    pub fn check_visit_module(&self, ctx: &RuleContext<'_>) -> Vec<Violation> {
        let mut violations = Vec::new();
        if self.is_root_logic(ctx) {
            violations.push(Violation::from_node(
                ctx.module,
                "W9011",
                format!("Deep structure: root logic in {}", ctx.module.name),
                ctx.module.root,
            ));
        }
        if self.is_unmapped_src_file(ctx) {
            violations.push(Violation::from_node(
                ctx.module,
                "W9017",
                format!(
                    "Layer integrity: unmapped file in src/ {}",
                    ctx.module.path.display()
                ),
                ctx.module.root,
            ));
        }
        violations
    }

    /// Registra una clase; el driver actualiza el estado con el resultado.
    pub fn record_classdef(
        &self,
        ctx: &RuleContext<'_>,
        node: NodeId,
    ) -> (Option<String>, bool, String) {
        let name = ctx
            .module
            .class_data(node)
            .map(|c| c.name.clone())
            .unwrap_or_default();
        let layer = ctx.layers.resolve_class(ctx.module, node);
        let heavy = layer
            .as_deref()
            .map(|l| self.is_heavy_component(ctx, l, node))
            .unwrap_or(false);
        (layer, heavy, name)
    }

    /// ¿La función es top-level? (el driver incrementa el contador)
    pub fn record_functiondef(&self, ctx: &RuleContext<'_>, node: NodeId) -> bool {
        ctx.module
            .node(node)
            .parent
            .map(|p| ctx.module.kind(p) == NodeKind::Module)
            .unwrap_or(false)
    }

    /// W9010 + W9018, al salir del módulo.
    pub fn check_leave_module(
        &self,
        ctx: &RuleContext<'_>,
        state: &ModuleScopeState,
    ) -> Vec<Violation> {
        let mut violations = Vec::new();
        if state.layer_types.len() > 1 {
            let layers: Vec<&str> = state.layer_types.iter().map(String::as_str).collect();
            violations.push(Violation::from_node(
                ctx.module,
                "W9010",
                format!("God file: Mixed layers: {}", layers.join(", ")),
                ctx.module.root,
            ));
        } else if state.heavy_class_names.len() > 1 {
            violations.push(Violation::from_node(
                ctx.module,
                "W9010",
                format!(
                    "God file: {} heavy classes in one module: {}",
                    state.heavy_class_names.len(),
                    state.heavy_class_names.join(", ")
                ),
                ctx.module.root,
            ));
        }
        if state.top_level_function_count > 0
            && ctx.module_layer.is_some()
            && !self.is_entry_module(ctx)
        {
            violations.push(Violation::from_node(
                ctx.module,
                "W9018",
                format!("No top-level functions: {}", ctx.module.path.display()),
                ctx.module.root,
            ));
        }
        violations
    }

    fn is_entry_module(&self, ctx: &RuleContext<'_>) -> bool {
        let file_name = ctx
            .module
            .path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_default();
        ctx.config.entry_module_files().iter().any(|e| e == &file_name)
    }

    fn is_root_logic(&self, ctx: &RuleContext<'_>) -> bool {
        // Módulo en la raíz: nombre punteado de un solo segmento y fuera de
        // src/ (los archivos directamente bajo src/ son problema de W9017).
        if ctx.module.name.contains('.') || ctx.module.name.is_empty() {
            return false;
        }
        if crate::files::under_src(&ctx.module.path) {
            return false;
        }
        let file_name = ctx
            .module
            .path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_default();
        if ROOT_ENTRY_ALLOWLIST.contains(&file_name.as_str()) {
            return false;
        }
        !file_name.starts_with("test_")
    }

    fn is_unmapped_src_file(&self, ctx: &RuleContext<'_>) -> bool {
        if ctx.module_layer.is_some() {
            return false;
        }
        if !crate::files::under_src(&ctx.module.path) {
            return false;
        }
        let file_name = ctx
            .module
            .path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_default();
        file_name != "__init__.py" && !crate::files::is_test_file(&ctx.module.path, &ctx.module.name)
    }

    fn is_heavy_component(&self, ctx: &RuleContext<'_>, layer: &str, node: NodeId) -> bool {
        let Some(data) = ctx.module.class_data(node) else { return false };
        // Protocols y DTOs no cuentan como pesados
        if data.name.contains("Protocol") || data.name.contains("DTO") {
            return false;
        }
        if data.bases.iter().any(|b| {
            let bare = b.rsplit('.').next().unwrap_or(b);
            bare == "Protocol" || bare == "TypedDict" || bare == "NamedTuple" || bare == "Enum"
        }) {
            return false;
        }
        if data
            .decorators
            .iter()
            .any(|d| d.split('(').next().unwrap_or(d).ends_with("dataclass"))
        {
            return false;
        }
        layer == LAYER_USE_CASE || layer == LAYER_INFRASTRUCTURE
    }
}

/// W9020: uso de la declaración `global`.
pub struct GlobalStateRule;

impl Checkable for GlobalStateRule {
    fn code(&self) -> &'static str {
        "W9020"
    }

    fn description(&self) -> &'static str {
        "Global state declarations are not allowed."
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::Global]
    }

    fn check(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        let NodeData::Global { names } = &ctx.module.node(node).data else {
            return vec![];
        };
        names
            .iter()
            .map(|name| {
                Violation::from_node(
                    ctx.module,
                    self.code(),
                    format!("Global state: use of 'global {name}' not allowed"),
                    node,
                )
                .with_symbol(name.clone())
            })
            .collect()
    }
}
