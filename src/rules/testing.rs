//! Acoplamiento de tests: W9101 (exceso de mocks) y W9102 (tests de métodos
//! privados).
//!
//! Regla stateful clásica: el driver mantiene la función actual y el
//! contador de mocks; la regla implementa callbacks puros.

use crate::ast::{NodeData, NodeId};
use crate::rules::{RuleContext, Violation};

pub struct TestingCouplingRule;

impl TestingCouplingRule {
    /// ¿Esta función abre un scope trackeado? (test_*)
    pub fn record_functiondef(&self, ctx: &RuleContext<'_>, node: NodeId) -> Option<NodeId> {
        let data = ctx.module.function_data(node)?;
        if data.name.starts_with("test_") {
            Some(node)
        } else {
            None
        }
    }

    /// Por cada Call dentro del scope: violaciones W9102 (método privado).
    pub fn record_call(
        &self,
        ctx: &RuleContext<'_>,
        node: NodeId,
        current_function: Option<NodeId>,
    ) -> Vec<Violation> {
        if current_function.is_none() {
            return vec![];
        }
        let NodeData::Call { callee: Some(name), .. } = &ctx.module.node(node).data else {
            return vec![];
        };
        let bare = name.rsplit('.').next().unwrap_or(name);
        if !bare.starts_with('_') || bare.starts_with("__") {
            return vec![];
        }
        // Llamadas sobre self/cls dentro del propio test no cuentan
        if name.starts_with("self.") || name.starts_with("cls.") {
            return vec![];
        }
        vec![Violation::from_node(
            ctx.module,
            "W9102",
            format!("Private method testing: {bare}."),
            node,
        )]
    }

    /// ¿La llamada cuenta como mock? (el driver incrementa el contador)
    pub fn record_mock_only(
        &self,
        ctx: &RuleContext<'_>,
        node: NodeId,
        current_function: Option<NodeId>,
    ) -> bool {
        if current_function.is_none() {
            return false;
        }
        let NodeData::Call { callee: Some(name), .. } = &ctx.module.node(node).data else {
            return false;
        };
        let bare = name.rsplit('.').next().unwrap_or(name);
        matches!(bare, "Mock" | "MagicMock" | "patch" | "AsyncMock" | "PropertyMock")
    }

    /// Al salir del scope: W9101 si el contador superó el límite.
    pub fn leave_functiondef(
        &self,
        ctx: &RuleContext<'_>,
        current_function: Option<NodeId>,
        mock_count: usize,
    ) -> Vec<Violation> {
        let Some(func) = current_function else { return vec![] };
        let limit = ctx.config.mock_limit;
        if mock_count <= limit {
            return vec![];
        }
        vec![Violation::from_node(
            ctx.module,
            "W9101",
            format!("Fragile test: {mock_count} mocks (limit {limit})."),
            func,
        )]
    }
}
