//! Pipeline de auditoría con compuertas secuenciales.
//!
//! Cinco pases en orden fijo: contratos de imports → imports & typing →
//! tipos estáticos → arquitectura (este motor) → calidad de código. El
//! primer pase con hallazgos se vuelve `blocked_by` y los pases posteriores
//! NO se ejecutan. Un pase deshabilitado se salta como si viniera limpio.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::adapters::import_linter::ImportLinterAdapter;
use crate::adapters::mypy::MypyAdapter;
use crate::adapters::ruff::RuffAdapter;
use crate::adapters::{LinterAdapter, RawLogSink};
use crate::ast::ModuleCache;
use crate::config::CleanArchConfig;
use crate::errors::ExcelsiorError;
use crate::layers::LayerResolver;
use crate::oracle::TypeOracle;
use crate::rules::engine::{ProjectIndex, RuleEngine};
use crate::rules::entropy::ScatterAccumulator;
use crate::rules::patterns::PATTERN_CODES;
use crate::rules::registry::RuleRegistry;
use crate::rules::{sort_violations, RuleContext, Violation};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStage {
    ImportLinter,
    RuffImportTyping,
    Mypy,
    Excelsior,
    RuffCodeQuality,
}

impl AuditStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStage::ImportLinter => "import_linter",
            AuditStage::RuffImportTyping => "ruff_import_typing",
            AuditStage::Mypy => "mypy",
            AuditStage::Excelsior => "excelsior",
            AuditStage::RuffCodeQuality => "ruff_code_quality",
        }
    }
}

/// Reporte de un pase individual.
#[derive(Serialize)]
pub struct PassReport {
    pub stage: AuditStage,
    pub violations: Vec<Violation>,
    /// Error de herramienta (no es un reporte de hallazgos). Bloquea el pase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Saltado por configuración (cuenta como limpio).
    pub skipped_disabled: bool,
    /// No ejecutado porque un pase anterior bloqueó.
    pub skipped_blocked: bool,
}

impl PassReport {
    fn clean(stage: AuditStage) -> Self {
        Self {
            stage,
            violations: vec![],
            error: None,
            skipped_disabled: false,
            skipped_blocked: false,
        }
    }

    fn disabled(stage: AuditStage) -> Self {
        Self { skipped_disabled: true, ..Self::clean(stage) }
    }

    fn blocked(stage: AuditStage) -> Self {
        Self { skipped_blocked: true, ..Self::clean(stage) }
    }
}

/// Resultado completo de la auditoría.
#[derive(Serialize)]
pub struct AuditOutcome {
    pub passes: Vec<PassReport>,
    pub blocked_by: Option<AuditStage>,
    pub timestamp: String,
}

impl AuditOutcome {
    pub fn is_blocked(&self) -> bool {
        self.blocked_by.is_some()
    }

    pub fn blocked_by_str(&self) -> &'static str {
        self.blocked_by.map(|s| s.as_str()).unwrap_or("none")
    }

    pub fn total_violations(&self) -> usize {
        self.passes.iter().map(|p| p.violations.len()).sum()
    }

    pub fn pass(&self, stage: AuditStage) -> Option<&PassReport> {
        self.passes.iter().find(|p| p.stage == stage)
    }
}

/// Pipeline con los cuatro colaboradores externos inyectados (puerto
/// LinterAdapter) y el motor propio para el pase arquitectónico.
pub struct AuditPipeline<'a> {
    config: &'a CleanArchConfig,
    registry: &'a RuleRegistry,
    project_root: PathBuf,
    layers: LayerResolver,
    oracle: TypeOracle,
    engine: RuleEngine,
    import_linter: Box<dyn LinterAdapter>,
    ruff_import_typing: Box<dyn LinterAdapter>,
    mypy: Box<dyn LinterAdapter>,
    ruff_quality: Box<dyn LinterAdapter>,
}

impl<'a> AuditPipeline<'a> {
    pub fn new(
        config: &'a CleanArchConfig,
        registry: &'a RuleRegistry,
        project_root: &Path,
    ) -> Self {
        let raw_log = RawLogSink::new(Some(&project_root.join(".excelsior")));
        let t = config.tool_timeout_secs;
        Self {
            config,
            registry,
            project_root: project_root.to_path_buf(),
            layers: LayerResolver::new(config),
            oracle: TypeOracle::new(Some(project_root)),
            engine: RuleEngine::new(),
            import_linter: Box::new(ImportLinterAdapter::new(t, raw_log.clone())),
            ruff_import_typing: Box::new(RuffAdapter::import_typing(t, raw_log.clone())),
            mypy: Box::new(MypyAdapter::new(t, raw_log.clone())),
            ruff_quality: Box::new(RuffAdapter::code_quality(t, raw_log)),
        }
    }

    /// Constructor con adapters inyectados (tests / herramientas custom).
    pub fn with_adapters(
        config: &'a CleanArchConfig,
        registry: &'a RuleRegistry,
        project_root: &Path,
        import_linter: Box<dyn LinterAdapter>,
        ruff_import_typing: Box<dyn LinterAdapter>,
        mypy: Box<dyn LinterAdapter>,
        ruff_quality: Box<dyn LinterAdapter>,
    ) -> Self {
        Self {
            config,
            registry,
            project_root: project_root.to_path_buf(),
            layers: LayerResolver::new(config),
            oracle: TypeOracle::new(Some(project_root)),
            engine: RuleEngine::new(),
            import_linter,
            ruff_import_typing,
            mypy,
            ruff_quality,
        }
    }

    pub fn registry(&self) -> &RuleRegistry {
        self.registry
    }

    /// Ejecuta la auditoría completa con compuertas.
    pub fn run(&self, target: &Path, cache: &mut ModuleCache) -> AuditOutcome {
        let mut passes: Vec<PassReport> = Vec::new();
        let mut blocked_by: Option<AuditStage> = None;

        let order = [
            AuditStage::ImportLinter,
            AuditStage::RuffImportTyping,
            AuditStage::Mypy,
            AuditStage::Excelsior,
            AuditStage::RuffCodeQuality,
        ];
        for stage in order {
            if blocked_by.is_some() {
                passes.push(PassReport::blocked(stage));
                continue;
            }
            let report = self.run_pass(stage, target, cache);
            let blocks = report.error.is_some() || self.has_blocking_findings(&report);
            if blocks {
                blocked_by = Some(stage);
            }
            passes.push(report);
        }

        AuditOutcome {
            passes,
            blocked_by,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Las sugerencias de patrones (W904x) no bloquean salvo configuración.
    fn has_blocking_findings(&self, report: &PassReport) -> bool {
        if self.config.patterns_block {
            return !report.violations.is_empty();
        }
        report
            .violations
            .iter()
            .any(|v| !PATTERN_CODES.contains(&v.code.as_str()))
    }

    fn run_pass(&self, stage: AuditStage, target: &Path, cache: &mut ModuleCache) -> PassReport {
        match stage {
            AuditStage::ImportLinter => {
                if !self.config.import_linter_enabled {
                    return PassReport::disabled(stage);
                }
                self.run_adapter(stage, self.import_linter.as_ref(), target)
            }
            AuditStage::RuffImportTyping => {
                if !self.config.ruff_enabled {
                    return PassReport::disabled(stage);
                }
                self.run_adapter(stage, self.ruff_import_typing.as_ref(), target)
            }
            AuditStage::Mypy => {
                if !self.config.mypy_enabled {
                    return PassReport::disabled(stage);
                }
                self.run_adapter(stage, self.mypy.as_ref(), target)
            }
            AuditStage::Excelsior => self.run_architectural(target, cache),
            AuditStage::RuffCodeQuality => {
                if !self.config.ruff_enabled {
                    return PassReport::disabled(stage);
                }
                self.run_adapter(stage, self.ruff_quality.as_ref(), target)
            }
        }
    }

    fn run_adapter(
        &self,
        stage: AuditStage,
        adapter: &dyn LinterAdapter,
        target: &Path,
    ) -> PassReport {
        match adapter.gather_results(target) {
            Ok(mut violations) => {
                sort_violations(&mut violations);
                PassReport { violations, ..PassReport::clean(stage) }
            }
            Err(e) => PassReport {
                error: Some(format!("[{}] {e}", e.code())),
                ..PassReport::clean(stage)
            },
        }
    }

    /// Pase 4: el motor arquitectónico propio. Archivo por archivo, con el
    /// índice de proyecto y la reducción final de scatter (W9030).
    pub fn run_architectural(&self, target: &Path, cache: &mut ModuleCache) -> PassReport {
        let stage = AuditStage::Excelsior;
        let files = crate::files::collect_python_files(target, self.config);
        let mut violations: Vec<Violation> = Vec::new();
        let mut parsed: Vec<PathBuf> = Vec::new();

        for file in &files {
            let module_name = crate::files::module_name_for(file, &self.project_root);
            match cache.parse(file, &module_name) {
                Ok(module) => {
                    if module.has_syntax_errors {
                        violations.push(parse_error_violation(file, "syntax error"));
                    } else {
                        parsed.push(file.clone());
                    }
                }
                Err(ExcelsiorError::Parse { reason, .. }) => {
                    violations.push(parse_error_violation(file, &reason));
                }
                Err(e) => {
                    violations.push(parse_error_violation(file, &e.to_string()));
                }
            }
        }

        // Índice de proyecto sobre los módulos ya parseados
        let modules: Vec<&crate::ast::ModuleAst> =
            parsed.iter().filter_map(|p| cache.get(p)).collect();
        let project = ProjectIndex::build(&modules, &self.layers);

        let mut scatter = ScatterAccumulator::new();
        for module in &modules {
            let layer = self.layers.resolve(&module.name, &module.path);
            let ctx = RuleContext {
                module,
                config: self.config,
                layers: &self.layers,
                oracle: &self.oracle,
                registry: self.registry,
                module_layer: layer.as_deref(),
                project: Some(&project),
            };
            violations.extend(self.engine.check_module(&ctx));
            if !ctx.is_test_file() {
                scatter.record_module(module);
            }
        }
        // Reducción final single-threaded del scatter (W9030)
        violations.extend(scatter.into_violations());

        sort_violations(&mut violations);
        PassReport { violations, ..PassReport::clean(stage) }
    }
}

fn parse_error_violation(path: &Path, reason: &str) -> Violation {
    Violation {
        code: "PARSE-ERROR".to_string(),
        message: format!("File could not be parsed: {reason}"),
        location: format!("{}:1:0", path.display()),
        path: path.display().to_string(),
        line: 1,
        column: 0,
        symbol: None,
        node: None,
        fixable: false,
        fix_failure_reason: None,
        is_comment_only: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::external_violation;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Adapter de prueba: hallazgos fijos + registro de invocación.
    struct StubAdapter {
        name: &'static str,
        findings: Vec<Violation>,
        fail: bool,
        invoked: Arc<AtomicBool>,
    }

    impl StubAdapter {
        fn boxed(
            name: &'static str,
            findings: Vec<Violation>,
            fail: bool,
        ) -> (Box<dyn LinterAdapter>, Arc<AtomicBool>) {
            let invoked = Arc::new(AtomicBool::new(false));
            (
                Box::new(StubAdapter { name, findings, fail, invoked: invoked.clone() }),
                invoked,
            )
        }
    }

    impl LinterAdapter for StubAdapter {
        fn name(&self) -> &'static str {
            self.name
        }
        fn gather_results(&self, _t: &Path) -> Result<Vec<Violation>, ExcelsiorError> {
            self.invoked.store(true, Ordering::SeqCst);
            if self.fail {
                return Err(ExcelsiorError::ExternalTool {
                    tool: self.name.to_string(),
                    reason: "boom".to_string(),
                });
            }
            Ok(self.findings.clone())
        }
        fn apply_fixes(&self, _t: &Path) -> Result<bool, ExcelsiorError> {
            Ok(false)
        }
        fn supports_autofix(&self) -> bool {
            false
        }
        fn get_fixable_rules(&self) -> Vec<String> {
            vec![]
        }
        fn get_manual_fix_instructions(&self, _c: &str) -> String {
            String::new()
        }
    }

    fn write_project(files: &[(&str, &str)]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("pyproject.toml"), "[project]\nname='x'\n").unwrap();
        for (rel, content) in files {
            let path = tmp.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        tmp
    }

    fn pipeline_with_stubs<'a>(
        config: &'a CleanArchConfig,
        registry: &'a RuleRegistry,
        root: &Path,
        first_findings: Vec<Violation>,
    ) -> (AuditPipeline<'a>, Vec<Arc<AtomicBool>>) {
        let (il, il_flag) = StubAdapter::boxed("import_linter", first_findings, false);
        let (ruff_it, ruff_it_flag) = StubAdapter::boxed("ruff_import_typing", vec![], false);
        let (mypy, mypy_flag) = StubAdapter::boxed("mypy", vec![], false);
        let (ruff_q, ruff_q_flag) = StubAdapter::boxed("ruff_code_quality", vec![], false);
        let pipeline =
            AuditPipeline::with_adapters(config, registry, root, il, ruff_it, mypy, ruff_q);
        (pipeline, vec![il_flag, ruff_it_flag, mypy_flag, ruff_q_flag])
    }

    #[test]
    fn test_first_pass_with_findings_blocks_later_passes() {
        let tmp = write_project(&[("src/domain/a.py", "X = 1\n")]);
        let config = CleanArchConfig::default();
        let registry = RuleRegistry::load().unwrap();
        let finding = external_violation("contract-broken", "broken", "x", 1, 0);
        let (pipeline, flags) =
            pipeline_with_stubs(&config, &registry, tmp.path(), vec![finding]);
        let mut cache = ModuleCache::new();
        let outcome = pipeline.run(&tmp.path().join("src"), &mut cache);

        assert_eq!(outcome.blocked_by, Some(AuditStage::ImportLinter));
        assert_eq!(outcome.blocked_by_str(), "import_linter");
        // El primero corrió; los demás no
        assert!(flags[0].load(Ordering::SeqCst));
        assert!(!flags[1].load(Ordering::SeqCst));
        assert!(!flags[2].load(Ordering::SeqCst));
        assert!(!flags[3].load(Ordering::SeqCst));
        assert!(outcome.pass(AuditStage::Mypy).unwrap().skipped_blocked);
    }

    #[test]
    fn test_clean_project_is_unblocked() {
        let tmp = write_project(&[(
            "src/domain/order.py",
            "from dataclasses import dataclass\n\n\n@dataclass(frozen=True)\nclass Order:\n    total: int\n",
        )]);
        let config = CleanArchConfig::default();
        let registry = RuleRegistry::load().unwrap();
        let (pipeline, _) = pipeline_with_stubs(&config, &registry, tmp.path(), vec![]);
        let mut cache = ModuleCache::new();
        let outcome = pipeline.run(&tmp.path().join("src"), &mut cache);
        assert_eq!(outcome.blocked_by_str(), "none", "{:#?}", outcome
            .passes
            .iter()
            .map(|p| (p.stage.as_str(), p.violations.iter().map(|v| v.message.clone()).collect::<Vec<_>>()))
            .collect::<Vec<_>>());
    }

    #[test]
    fn test_architectural_violation_blocks_at_excelsior() {
        // Import ilegal UseCase → Infrastructure bloquea en el pase 4
        let tmp = write_project(&[(
            "src/use_cases/order.py",
            "from infrastructure.db import Database\n",
        )]);
        let config = CleanArchConfig::default();
        let registry = RuleRegistry::load().unwrap();
        let (pipeline, _) = pipeline_with_stubs(&config, &registry, tmp.path(), vec![]);
        let mut cache = ModuleCache::new();
        let outcome = pipeline.run(&tmp.path().join("src"), &mut cache);

        assert_eq!(outcome.blocked_by, Some(AuditStage::Excelsior));
        let pass = outcome.pass(AuditStage::Excelsior).unwrap();
        assert!(pass.violations.iter().any(|v| v.code == "W9001"));
        // El pase 5 no corrió
        assert!(outcome.pass(AuditStage::RuffCodeQuality).unwrap().skipped_blocked);
    }

    #[test]
    fn test_disabled_pass_skips_as_clean() {
        let tmp = write_project(&[(
            "src/domain/order.py",
            "from dataclasses import dataclass\n\n\n@dataclass(frozen=True)\nclass Order:\n    total: int\n",
        )]);
        let config = CleanArchConfig {
            import_linter_enabled: false,
            ruff_enabled: false,
            mypy_enabled: false,
            ..CleanArchConfig::default()
        };
        let registry = RuleRegistry::load().unwrap();
        let pipeline = AuditPipeline::new(&config, &registry, tmp.path());
        let mut cache = ModuleCache::new();
        let outcome = pipeline.run(&tmp.path().join("src"), &mut cache);
        assert!(outcome.pass(AuditStage::ImportLinter).unwrap().skipped_disabled);
        assert_eq!(outcome.blocked_by_str(), "none");
    }

    #[test]
    fn test_tool_error_becomes_blocker() {
        let tmp = write_project(&[("src/domain/a.py", "X = 1\n")]);
        let config = CleanArchConfig::default();
        let registry = RuleRegistry::load().unwrap();
        let (il, _) = StubAdapter::boxed("import_linter", vec![], true);
        let (r1, _) = StubAdapter::boxed("ruff_import_typing", vec![], false);
        let (my, my_flag) = StubAdapter::boxed("mypy", vec![], false);
        let (r2, _) = StubAdapter::boxed("ruff_code_quality", vec![], false);
        let pipeline =
            AuditPipeline::with_adapters(&config, &registry, tmp.path(), il, r1, my, r2);
        let mut cache = ModuleCache::new();
        let outcome = pipeline.run(&tmp.path().join("src"), &mut cache);
        assert_eq!(outcome.blocked_by, Some(AuditStage::ImportLinter));
        assert!(outcome.pass(AuditStage::ImportLinter).unwrap().error.is_some());
        assert!(!my_flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_parse_error_reported_and_blocks() {
        let tmp = write_project(&[("src/domain/broken.py", "def broken(:\n")]);
        let config = CleanArchConfig::default();
        let registry = RuleRegistry::load().unwrap();
        let (pipeline, _) = pipeline_with_stubs(&config, &registry, tmp.path(), vec![]);
        let mut cache = ModuleCache::new();
        let outcome = pipeline.run(&tmp.path().join("src"), &mut cache);
        let pass = outcome.pass(AuditStage::Excelsior).unwrap();
        assert!(pass.violations.iter().any(|v| v.code == "PARSE-ERROR"));
        assert_eq!(outcome.blocked_by, Some(AuditStage::Excelsior));
    }
}
