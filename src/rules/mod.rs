//! Modelo de dominio de reglas: violaciones, planes de transformación y los
//! contratos Checkable / Fixable.

pub mod boundaries;
pub mod bypass;
pub mod contracts;
pub mod demeter;
pub mod dependencies;
pub mod design;
pub mod di;
pub mod engine;
pub mod entropy;
pub mod governance;
pub mod immutability;
pub mod patterns;
pub mod quality;
pub mod registry;
pub mod structure;
pub mod testing;
pub mod type_hints;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::ast::{ModuleAst, NodeId, NodeKind};
use crate::config::CleanArchConfig;
use crate::layers::LayerResolver;
use crate::oracle::TypeOracle;
use crate::rules::registry::RuleRegistry;

/// Una violación emitida por una regla. Inmutable una vez emitida.
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub code: String,
    pub message: String,
    /// `path:line:col`
    pub location: String,
    pub path: String,
    pub line: u32,
    pub column: u32,
    /// Nombre del símbolo afectado (función/clase), para deduplicación.
    pub symbol: Option<String>,
    /// Referencia débil al nodo (solo para formateo/debug, no se serializa).
    #[serde(skip)]
    pub node: Option<NodeId>,
    pub fixable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_failure_reason: Option<String>,
    pub is_comment_only: bool,
}

impl Violation {
    pub fn from_node(module: &ModuleAst, code: &str, message: String, node: NodeId) -> Self {
        let n = module.node(node);
        Self {
            code: code.to_string(),
            message,
            location: module.location(node),
            path: module.path.display().to_string(),
            line: n.line,
            column: n.col,
            symbol: symbol_for(module, node),
            node: Some(node),
            fixable: false,
            fix_failure_reason: None,
            is_comment_only: false,
        }
    }

    pub fn fixable(mut self, fixable: bool) -> Self {
        self.fixable = fixable;
        self
    }

    pub fn failure(mut self, reason: impl Into<String>) -> Self {
        self.fixable = false;
        self.fix_failure_reason = Some(reason.into());
        self
    }

    pub fn comment_only(mut self) -> Self {
        self.is_comment_only = true;
        self
    }

    /// Símbolo explícito para la clave de dedup (violaciones múltiples
    /// ancladas a la misma línea, ej. un hallazgo por parámetro).
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Clave de deduplicación: (code, path, line, symbol).
    pub fn dedup_key(&self) -> (String, String, u32, String) {
        (
            self.code.clone(),
            self.path.clone(),
            self.line,
            self.symbol.clone().unwrap_or_default(),
        )
    }
}

/// Símbolo envolvente más cercano (función o clase) para la clave de dedup.
fn symbol_for(module: &ModuleAst, node: NodeId) -> Option<String> {
    if let Some(f) = module.function_data(node) {
        return Some(f.name.clone());
    }
    if let Some(c) = module.class_data(node) {
        return Some(c.name.clone());
    }
    for anc in module.ancestors(node) {
        if let Some(f) = module.function_data(anc) {
            return Some(f.name.clone());
        }
        if let Some(c) = module.class_data(anc) {
            return Some(c.name.clone());
        }
    }
    None
}

/// Orden total dentro de un pase: (path, line, column, code).
pub fn sort_violations(violations: &mut [Violation]) {
    violations.sort_by(|a, b| {
        (a.path.as_str(), a.line, a.column, a.code.as_str()).cmp(&(
            b.path.as_str(),
            b.line,
            b.column,
            b.code.as_str(),
        ))
    });
}

/// Deduplica por (code, path, line, symbol), conservando la primera.
pub fn dedup_violations(violations: Vec<Violation>) -> Vec<Violation> {
    let mut seen = std::collections::HashSet::new();
    violations
        .into_iter()
        .filter(|v| seen.insert(v.dedup_key()))
        .collect()
}

/// Clases de edición que entiende el gateway CST. Cualquier otra cosa en el
/// boundary es un error, no un fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    AddReturnType,
    AddParameterType,
    AddFrozenDecorator,
    AddImport,
    AddGovernanceComment,
    AddPyTypedMarker,
    AddInitFile,
    AddNoneReturnAnnotation,
    StripDuplicateAnnotation,
    ApplyNamedTransformer,
}

/// Ancla declarativa: clase de nodo + identificador + línea.
#[derive(Debug, Clone, Serialize)]
pub struct PlanAnchor {
    pub node_kind: String,
    pub identifier: String,
    pub line: u32,
}

/// Descripción declarativa y sin efectos de una edición de código. Única
/// moneda aceptada por el gateway CST.
#[derive(Debug, Clone, Serialize)]
pub struct TransformationPlan {
    pub kind: PlanKind,
    pub target_path: PathBuf,
    pub anchor: PlanAnchor,
    pub params: BTreeMap<String, String>,
}

impl TransformationPlan {
    fn new(kind: PlanKind, target: &Path, anchor: PlanAnchor) -> Self {
        Self {
            kind,
            target_path: target.to_path_buf(),
            anchor,
            params: BTreeMap::new(),
        }
    }

    fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn add_return_type(target: &Path, function: &str, line: u32, ty: &str) -> Self {
        Self::new(
            PlanKind::AddReturnType,
            target,
            PlanAnchor {
                node_kind: "FunctionDef".to_string(),
                identifier: function.to_string(),
                line,
            },
        )
        .with("return_type", ty)
    }

    pub fn add_parameter_type(
        target: &Path,
        function: &str,
        line: u32,
        param: &str,
        ty: &str,
    ) -> Self {
        Self::new(
            PlanKind::AddParameterType,
            target,
            PlanAnchor {
                node_kind: "FunctionDef".to_string(),
                identifier: function.to_string(),
                line,
            },
        )
        .with("param_name", param)
        .with("param_type", ty)
    }

    pub fn add_frozen_decorator(target: &Path, class: &str, line: u32) -> Self {
        Self::new(
            PlanKind::AddFrozenDecorator,
            target,
            PlanAnchor {
                node_kind: "ClassDef".to_string(),
                identifier: class.to_string(),
                line,
            },
        )
    }

    pub fn add_import(target: &Path, module: &str, names: &[String]) -> Self {
        Self::new(
            PlanKind::AddImport,
            target,
            PlanAnchor {
                node_kind: "Module".to_string(),
                identifier: module.to_string(),
                line: 1,
            },
        )
        .with("module", module)
        .with("imports", names.join(","))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_governance_comment(
        target: &Path,
        rule_code: &str,
        rule_name: &str,
        problem: &str,
        recommendation: &str,
        context_info: &str,
        target_line: u32,
    ) -> Self {
        Self::new(
            PlanKind::AddGovernanceComment,
            target,
            PlanAnchor {
                node_kind: "Stmt".to_string(),
                identifier: rule_code.to_string(),
                line: target_line,
            },
        )
        .with("rule_code", rule_code)
        .with("rule_name", rule_name)
        .with("problem", problem)
        .with("recommendation", recommendation)
        .with("context_info", context_info)
    }

    pub fn add_py_typed_marker(package_dir: &Path) -> Self {
        Self::new(
            PlanKind::AddPyTypedMarker,
            package_dir,
            PlanAnchor {
                node_kind: "Package".to_string(),
                identifier: "py.typed".to_string(),
                line: 0,
            },
        )
    }

    pub fn add_init_file(directory: &Path) -> Self {
        Self::new(
            PlanKind::AddInitFile,
            directory,
            PlanAnchor {
                node_kind: "Package".to_string(),
                identifier: "__init__.py".to_string(),
                line: 0,
            },
        )
    }

    pub fn add_none_return_annotation(target: &Path, function: &str, line: u32) -> Self {
        Self::new(
            PlanKind::AddNoneReturnAnnotation,
            target,
            PlanAnchor {
                node_kind: "FunctionDef".to_string(),
                identifier: function.to_string(),
                line,
            },
        )
    }

    pub fn strip_duplicate_annotation(
        target: &Path,
        function: &str,
        line: u32,
        param: &str,
    ) -> Self {
        Self::new(
            PlanKind::StripDuplicateAnnotation,
            target,
            PlanAnchor {
                node_kind: "FunctionDef".to_string(),
                identifier: function.to_string(),
                line,
            },
        )
        .with("param_name", param)
    }

    pub fn apply_named_transformer(target: &Path, name: &str) -> Self {
        Self::new(
            PlanKind::ApplyNamedTransformer,
            target,
            PlanAnchor {
                node_kind: "Module".to_string(),
                identifier: name.to_string(),
                line: 1,
            },
        )
        .with("name", name)
    }
}

/// Contexto compartido que recibe cada regla. Las reglas solo tienen
/// referencias prestadas durante el pase.
pub struct RuleContext<'a> {
    pub module: &'a ModuleAst,
    pub config: &'a CleanArchConfig,
    pub layers: &'a LayerResolver,
    pub oracle: &'a TypeOracle,
    pub registry: &'a RuleRegistry,
    /// Capa resuelta del módulo actual (None = sin mapear).
    pub module_layer: Option<&'a str>,
    /// Índice de proyecto para reglas con contexto cruzado (W9201).
    pub project: Option<&'a crate::rules::engine::ProjectIndex>,
}

impl<'a> RuleContext<'a> {
    /// ¿El módulo actual pertenece a una capa silenciosa?
    pub fn in_silent_layer(&self) -> bool {
        match self.module_layer {
            Some(layer) => self.config.silent_layers.iter().any(|l| l == layer),
            None => false,
        }
    }

    /// ¿El archivo actual es de tests?
    pub fn is_test_file(&self) -> bool {
        crate::files::is_test_file(&self.module.path, &self.module.name)
    }
}

/// Check de un solo paso: dado un nodo, devuelve violaciones.
pub trait Checkable {
    fn code(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// Clases de nodo a las que la regla se suscribe. El driver la invoca
    /// solo para esos kinds.
    fn subscriptions(&self) -> &'static [NodeKind];
    fn check(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation>;
}

/// Capacidad opcional: la regla puede producir planes de transformación.
/// `None` con `fix_failure_reason` en la violación cuando no hay fix
/// determinista.
pub trait Fixable {
    fn fix(&self, ctx: &RuleContext<'_>, violation: &Violation)
        -> Option<Vec<TransformationPlan>>;
}
