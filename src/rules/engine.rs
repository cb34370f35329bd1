//! Driver del motor de reglas: un solo recorrido del AST por archivo.
//!
//! Las reglas se indexan por las clases de nodo a las que se suscriben
//! (tabla de dispatch); las reglas stateful no guardan estado propio: el
//! driver es dueño de los contadores y del scope actual.

use std::collections::{BTreeSet, HashMap};

use crate::ast::{ModuleAst, NodeData, NodeId, NodeKind};
use crate::layers::{LayerResolver, LAYER_DOMAIN, LAYER_USE_CASE};
use crate::rules::boundaries::{IllegalIoCallRule, ResourceRule, UiConcernRule, VisibilityRule};
use crate::rules::bypass::AntiBypassRule;
use crate::rules::contracts::{ConcreteMethodStubRule, ContractIntegrityRule};
use crate::rules::demeter::LawOfDemeterRule;
use crate::rules::dependencies::LayerDependencyRule;
use crate::rules::design::{BannedAnyRule, DefensiveNoneRule, DelegationRule, RawTypeRule};
use crate::rules::di::DiViolationRule;
use crate::rules::immutability::DomainImmutabilityRule;
use crate::rules::patterns::{
    BuilderSuggestionRule, FacadeSuggestionRule, FactorySuggestionRule,
    StateSuggestionRule, StrategySuggestionRule,
};
use crate::rules::quality::{
    ConstructorInjectionRule, ExceptionHygieneRule, InterfaceSegregationRule,
    MethodComplexityRule,
};
use crate::rules::structure::{GlobalStateRule, ModuleScopeState, ModuleStructureRule};
use crate::rules::testing::TestingCouplingRule;
use crate::rules::type_hints::MissingTypeHintRule;
use crate::rules::{
    dedup_violations, sort_violations, Checkable, Fixable, RuleContext,
    TransformationPlan, Violation,
};

/// Todos los códigos que este motor puede emitir. Cada uno debe tener
/// exactamente una entrada en el catálogo (invariante verificada en tests).
pub const ALL_RULE_CODES: &[&str] = &[
    "W9001", "W9003", "W9004", "W9005", "W9006", "W9007", "W9009", "W9010", "W9011",
    "W9012", "W9013", "W9014", "W9015", "W9016", "W9017", "W9018", "W9019", "W9020",
    "W9030", "W9032", "W9033", "W9034", "W9035", "W9041", "W9042", "W9043", "W9044",
    "W9045", "W9101", "W9102", "W9201", "W9202", "W9301", "W9501", "W9601",
];

/// Índice liviano de todo el proyecto para las reglas que necesitan
/// contexto cruzado (W9201 reglas 6 y 7). Se construye en un pre-pase sobre
/// los módulos ya parseados.
#[derive(Default)]
pub struct ProjectIndex {
    /// módulo importador → (módulo importado, nombres, capa del importador)
    imports: Vec<(String, String, Vec<String>, Option<String>)>,
    /// Protocol de Domain → métodos públicos
    domain_protocols: HashMap<String, BTreeSet<String>>,
}

impl ProjectIndex {
    pub fn build(modules: &[&ModuleAst], layers: &LayerResolver) -> Self {
        let mut index = ProjectIndex::default();
        for module in modules {
            let layer = layers.resolve(&module.name, &module.path);
            for imp in module.imports() {
                match &module.node(imp).data {
                    NodeData::Import { names } => {
                        for n in names {
                            index.imports.push((
                                module.name.clone(),
                                n.name.clone(),
                                vec![],
                                layer.clone(),
                            ));
                        }
                    }
                    NodeData::ImportFrom { module: target, names, level } => {
                        if *level == 0 {
                            index.imports.push((
                                module.name.clone(),
                                target.clone(),
                                names.iter().map(|n| n.name.clone()).collect(),
                                layer.clone(),
                            ));
                        }
                    }
                    _ => {}
                }
            }
            // Protocols declarados en Domain
            if layer.as_deref() == Some(LAYER_DOMAIN) {
                for class in module.nodes_of_kind(module.root, NodeKind::ClassDef) {
                    let Some(data) = module.class_data(class) else { continue };
                    let is_protocol = data.bases.iter().any(|b| {
                        let bare = b.rsplit('.').next().unwrap_or(b);
                        bare == "Protocol" || bare.starts_with("Protocol[")
                    });
                    if !is_protocol && !data.name.ends_with("Protocol") {
                        continue;
                    }
                    let methods: BTreeSet<String> = module
                        .node(class)
                        .children
                        .iter()
                        .filter_map(|&c| module.function_data(c))
                        .map(|f| f.name.clone())
                        .filter(|n| !n.starts_with('_'))
                        .collect();
                    index.domain_protocols.insert(data.name.clone(), methods);
                }
            }
        }
        index
    }

    /// ¿Algún módulo Domain/UseCase importa esta clase (o su módulo)?
    pub fn silent_importer_of(
        &self,
        defining_module: &str,
        class_name: &str,
    ) -> Option<String> {
        for (importer, imported, names, layer) in &self.imports {
            let silent = matches!(layer.as_deref(), Some(LAYER_DOMAIN) | Some(LAYER_USE_CASE));
            if !silent {
                continue;
            }
            let targets_module = imported == defining_module;
            let targets_class =
                targets_module && (names.is_empty() || names.iter().any(|n| n == class_name));
            if targets_class {
                return Some(importer.clone());
            }
        }
        None
    }

    pub fn domain_protocol_exists(&self, name: &str) -> bool {
        self.domain_protocols.contains_key(name)
    }

    pub fn protocol_methods(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.domain_protocols.get(name)
    }
}

/// Scope de función trackeado por la regla de tests.
struct TestScope {
    func: NodeId,
    end: usize,
    mock_count: usize,
}

pub struct RuleEngine {
    checkables: Vec<Box<dyn Checkable>>,
    dispatch: HashMap<NodeKind, Vec<usize>>,
    demeter: LawOfDemeterRule,
    testing: TestingCouplingRule,
    structure: ModuleStructureRule,
    bypass: AntiBypassRule,
    type_hints: MissingTypeHintRule,
    immutability: DomainImmutabilityRule,
}

impl RuleEngine {
    pub fn new() -> Self {
        let checkables: Vec<Box<dyn Checkable>> = vec![
            Box::new(LayerDependencyRule),
            Box::new(VisibilityRule),
            Box::new(ResourceRule),
            Box::new(IllegalIoCallRule),
            Box::new(UiConcernRule),
            Box::new(DelegationRule),
            Box::new(RawTypeRule),
            Box::new(DefensiveNoneRule),
            Box::new(BannedAnyRule),
            Box::new(MissingTypeHintRule),
            Box::new(GlobalStateRule),
            Box::new(MethodComplexityRule),
            Box::new(InterfaceSegregationRule),
            Box::new(ConstructorInjectionRule),
            Box::new(ExceptionHygieneRule),
            Box::new(BuilderSuggestionRule),
            Box::new(FactorySuggestionRule),
            Box::new(StrategySuggestionRule),
            Box::new(StateSuggestionRule),
            Box::new(FacadeSuggestionRule),
            Box::new(ContractIntegrityRule),
            Box::new(ConcreteMethodStubRule),
            Box::new(DiViolationRule),
            Box::new(DomainImmutabilityRule),
        ];
        let mut dispatch: HashMap<NodeKind, Vec<usize>> = HashMap::new();
        for (idx, rule) in checkables.iter().enumerate() {
            for &kind in rule.subscriptions() {
                dispatch.entry(kind).or_default().push(idx);
                // Las funciones async reciben los mismos checks que las sync
                if kind == NodeKind::FunctionDef {
                    dispatch.entry(NodeKind::AsyncFunctionDef).or_default().push(idx);
                }
            }
        }
        for subscribers in dispatch.values_mut() {
            subscribers.sort_unstable();
            subscribers.dedup();
        }
        Self {
            checkables,
            dispatch,
            demeter: LawOfDemeterRule,
            testing: TestingCouplingRule,
            structure: ModuleStructureRule,
            bypass: AntiBypassRule,
            type_hints: MissingTypeHintRule,
            immutability: DomainImmutabilityRule,
        }
    }

    /// Evalúa todas las reglas sobre un módulo: un solo recorrido lineal
    /// (la arena está en pre-orden). Devuelve violaciones deduplicadas y
    /// ordenadas.
    pub fn check_module(&self, ctx: &RuleContext<'_>) -> Vec<Violation> {
        let module = ctx.module;
        let mut violations: Vec<Violation> = Vec::new();

        // W9501 va por tokens, fuera del dispatch de AST
        violations.extend(self.bypass.scan(module));

        violations.extend(self.structure.check_visit_module(ctx));

        let mut module_state = ModuleScopeState::default();
        let mut test_scope: Option<TestScope> = None;
        // locals "extraños" por frame, para la regla de Demeter
        let mut demeter_locals: HashMap<NodeId, HashMap<String, bool>> = HashMap::new();

        for id in 0..module.nodes.len() {
            // Evento leave del scope de test
            let left_scope = test_scope.as_ref().map(|s| id >= s.end).unwrap_or(false);
            if left_scope {
                if let Some(scope) = test_scope.take() {
                    violations.extend(self.testing.leave_functiondef(
                        ctx,
                        Some(scope.func),
                        scope.mock_count,
                    ));
                }
            }

            let kind = module.kind(id);

            // Dispatch de reglas Checkable suscritas a este kind
            if let Some(subscribers) = self.dispatch.get(&kind) {
                for &idx in subscribers {
                    violations.extend(self.checkables[idx].check(ctx, id));
                }
            }

            // Callbacks de reglas stateful
            match kind {
                NodeKind::ClassDef => {
                    let (layer, heavy, name) = self.structure.record_classdef(ctx, id);
                    if let Some(layer) = layer {
                        module_state.layer_types.insert(layer);
                    }
                    if heavy {
                        module_state.heavy_class_names.push(name);
                    }
                }
                NodeKind::FunctionDef | NodeKind::AsyncFunctionDef => {
                    if self.structure.record_functiondef(ctx, id) {
                        module_state.top_level_function_count += 1;
                    }
                    if test_scope.is_none() {
                        if let Some(func) = self.testing.record_functiondef(ctx, id) {
                            test_scope = Some(TestScope {
                                func,
                                end: module.node(id).subtree_end,
                                mock_count: 0,
                            });
                        }
                    }
                }
                NodeKind::Assign => {
                    let frame = module.frame(id);
                    let locals = demeter_locals.entry(frame).or_default();
                    self.demeter.record_assign(ctx, id, locals);
                }
                NodeKind::Call => {
                    let frame = module.frame(id);
                    let locals = demeter_locals.entry(frame).or_default();
                    violations.extend(self.demeter.check_call(ctx, id, locals));
                    if let Some(scope) = &mut test_scope {
                        violations.extend(self.testing.record_call(
                            ctx,
                            id,
                            Some(scope.func),
                        ));
                        if self.testing.record_mock_only(ctx, id, Some(scope.func)) {
                            scope.mock_count += 1;
                        }
                    }
                }
                _ => {}
            }
        }

        if let Some(scope) = test_scope {
            violations.extend(self.testing.leave_functiondef(
                ctx,
                Some(scope.func),
                scope.mock_count,
            ));
        }
        violations.extend(self.structure.check_leave_module(ctx, &module_state));

        // El catálogo es la única fuente de verdad para fixable/comment_only
        for v in &mut violations {
            if v.fixable && !ctx.registry.is_fixable(&v.code) {
                v.fixable = false;
            }
            if ctx.registry.is_comment_only(&v.code) {
                v.is_comment_only = true;
            }
        }

        let mut violations = dedup_violations(violations);
        sort_violations(&mut violations);
        violations
    }

    /// Planes de fix para una violación fixable. None con el motivo ya
    /// registrado en la violación cuando no hay fix determinista.
    pub fn fix_violation(
        &self,
        ctx: &RuleContext<'_>,
        violation: &Violation,
    ) -> Option<Vec<TransformationPlan>> {
        if !ctx.registry.is_fixable(&violation.code) {
            return None;
        }
        match violation.code.as_str() {
            "W9015" => self.type_hints.fix(ctx, violation),
            "W9601" => self.immutability.fix(ctx, violation),
            _ => None,
        }
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Helpers compartidos por los tests de los módulos de reglas.
#[cfg(test)]
pub mod test_support {
    use super::*;
    use crate::ast::lower::parse_module;
    use crate::config::CleanArchConfig;
    use crate::oracle::TypeOracle;
    use crate::rules::registry::RuleRegistry;
    use std::path::Path;

    fn build_modules(files: &[(String, String)]) -> Vec<ModuleAst> {
        files
            .iter()
            .map(|(path, src)| {
                let name = crate::files::module_name_for(Path::new(path), Path::new(""));
                parse_module(src, Path::new(path), &name).expect("parse")
            })
            .collect()
    }

    /// Corre el motor completo sobre un proyecto y filtra por códigos.
    pub fn check_project(files: &[(String, String)], codes: &[&str]) -> Vec<Violation> {
        let config = CleanArchConfig::default();
        let layers = LayerResolver::new(&config);
        let oracle = TypeOracle::new(None);
        let registry = RuleRegistry::load().unwrap();
        let engine = RuleEngine::new();
        let modules = build_modules(files);
        let refs: Vec<&ModuleAst> = modules.iter().collect();
        let project = ProjectIndex::build(&refs, &layers);
        let mut all = Vec::new();
        for module in &modules {
            let layer = layers.resolve(&module.name, &module.path);
            let ctx = RuleContext {
                module,
                config: &config,
                layers: &layers,
                oracle: &oracle,
                registry: &registry,
                module_layer: layer.as_deref(),
                project: Some(&project),
            };
            all.extend(engine.check_module(&ctx));
        }
        all.retain(|v| codes.contains(&v.code.as_str()));
        all
    }

    /// Un solo archivo, filtrado por códigos.
    pub fn check_single_rule(path: &str, src: &str, codes: &[&str]) -> Vec<Violation> {
        check_project(&[(path.to_string(), src.to_string())], codes)
    }

    /// Planes de fix producidos por las violaciones fixables de un código.
    pub fn fix_single_rule(path: &str, src: &str, code: &str) -> Vec<TransformationPlan> {
        let config = CleanArchConfig::default();
        let layers = LayerResolver::new(&config);
        let oracle = TypeOracle::new(None);
        let registry = RuleRegistry::load().unwrap();
        let engine = RuleEngine::new();
        let modules = build_modules(&[(path.to_string(), src.to_string())]);
        let module = &modules[0];
        let layer = layers.resolve(&module.name, &module.path);
        let ctx = RuleContext {
            module,
            config: &config,
            layers: &layers,
            oracle: &oracle,
            registry: &registry,
            module_layer: layer.as_deref(),
            project: None,
        };
        let violations = engine.check_module(&ctx);
        let mut plans = Vec::new();
        for v in violations.iter().filter(|v| v.code == code && v.fixable) {
            if let Some(mut p) = engine.fix_violation(&ctx, v) {
                plans.append(&mut p);
            }
        }
        plans
    }
}
