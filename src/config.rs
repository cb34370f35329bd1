//! Configuración del motor (namespace `clean-arch`).
//!
//! La configuración vive en el `pyproject.toml` del proyecto auditado, bajo
//! `[tool.clean-arch]`, con fallback a `.excelsior.toml` (tabla
//! `[clean-arch]`) en la raíz. Es inmutable durante toda la corrida: se
//! valida una sola vez, antes de ejecutar cualquier pase.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::ExcelsiorError;

/// Versión actual (leída desde Cargo.toml en tiempo de compilación)
pub const EXCELSIOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Sub-tabla `contract_integrity` (W9201).
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ContractIntegrityConfig {
    pub require_protocol: Vec<String>,
    pub internal_implementation: Vec<String>,
    pub framework_base_classes: Vec<String>,
    pub allow_private_prefix: bool,
    pub allow_internal_decorator: bool,
    pub services_require_protocol: bool,
    pub adapters_require_protocol: bool,
    pub gateways_require_protocol: bool,
    pub other_require_protocol: bool,
    pub enable_di_container_detection: bool,
    pub enable_cross_layer_detection: bool,
    pub enable_protocol_exists_detection: bool,
}

impl Default for ContractIntegrityConfig {
    fn default() -> Self {
        Self {
            require_protocol: vec![],
            internal_implementation: vec![],
            framework_base_classes: vec![],
            allow_private_prefix: true,
            allow_internal_decorator: true,
            services_require_protocol: true,
            adapters_require_protocol: true,
            gateways_require_protocol: true,
            other_require_protocol: false,
            enable_di_container_detection: true,
            enable_cross_layer_detection: true,
            enable_protocol_exists_detection: true,
        }
    }
}

impl ContractIntegrityConfig {
    /// Clases base de framework: defaults + extensiones del proyecto.
    pub fn framework_bases(&self) -> Vec<String> {
        let mut bases = vec![
            "cst.CSTTransformer".to_string(),
            "ast.NodeVisitor".to_string(),
            "TypedDict".to_string(),
            "NamedTuple".to_string(),
        ];
        bases.extend(self.framework_base_classes.iter().cloned());
        bases
    }
}

/// Excepciones de resolución de capas (regla 1 del resolver).
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct LayerExceptionsConfig {
    /// Decoradores que excluyen la clase/módulo de la resolución.
    pub decorators: Vec<String>,
    /// Clases base de framework que excluyen a sus subclases.
    pub framework_base_classes: Vec<String>,
    /// Módulos marcados explícitamente como internos (opt-out).
    pub internal_markers: Vec<String>,
}

/// Configuración completa bajo el namespace `clean-arch`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CleanArchConfig {
    /// `generic`, `cli_app`, `web_like` o `data_pipeline`.
    pub project_type: String,
    pub visibility_enforcement: bool,
    pub silent_layers: Vec<String>,
    pub allowed_io_interfaces: Vec<String>,
    pub shared_kernel_modules: Vec<String>,
    /// Prefijo punteado o regex de path → nombre de capa.
    pub layer_map: BTreeMap<String, String>,
    pub contract_integrity: ContractIntegrityConfig,
    pub exceptions: LayerExceptionsConfig,
    pub complexity_threshold: usize,
    pub interface_segregation_limit: usize,
    pub mock_limit: usize,
    pub ruff_enabled: bool,
    pub import_linter_enabled: bool,
    pub mypy_enabled: bool,
    /// Prefijos de import permitidos en capas silenciosas (W9004).
    pub allowed_prefixes: Vec<String>,
    /// Raíces confiables para Law of Demeter (W9006).
    pub allowed_lod_roots: Vec<String>,
    pub trusted_authorities: Vec<String>,
    /// Tipos crudos prohibidos como retorno/atributo (W9007/W9009).
    pub raw_types: Vec<String>,
    pub infrastructure_modules: Vec<String>,
    pub internal_modules: Vec<String>,
    /// Módulos con funciones top-level permitidas (W9018).
    pub entry_modules: Vec<String>,
    pub audit_exclude_paths: Vec<String>,
    /// Si las sugerencias de patrones (W904x) cuentan para el bloqueo.
    pub patterns_block: bool,
    /// Comando de tests para validar fixes (argv).
    pub test_command: Vec<String>,
    /// Timeout por herramienta externa, en segundos.
    pub tool_timeout_secs: u64,
}

impl Default for CleanArchConfig {
    fn default() -> Self {
        Self {
            project_type: "generic".to_string(),
            visibility_enforcement: true,
            silent_layers: vec!["Domain".to_string(), "UseCase".to_string()],
            allowed_io_interfaces: vec![
                "TelemetryPort".to_string(),
                "LoggerPort".to_string(),
            ],
            shared_kernel_modules: vec![],
            layer_map: BTreeMap::new(),
            contract_integrity: ContractIntegrityConfig::default(),
            exceptions: LayerExceptionsConfig::default(),
            complexity_threshold: 10,
            interface_segregation_limit: 7,
            mock_limit: 4,
            ruff_enabled: true,
            import_linter_enabled: true,
            mypy_enabled: true,
            allowed_prefixes: vec![],
            allowed_lod_roots: vec![],
            trusted_authorities: vec![],
            raw_types: vec![],
            infrastructure_modules: vec![],
            internal_modules: vec![],
            entry_modules: vec![],
            audit_exclude_paths: vec![],
            patterns_block: false,
            test_command: vec![
                "pytest".to_string(),
                "--tb=no".to_string(),
                "-q".to_string(),
            ],
            tool_timeout_secs: 120,
        }
    }
}

pub const KNOWN_LAYERS: [&str; 4] = ["Domain", "UseCase", "Interface", "Infrastructure"];

impl CleanArchConfig {
    /// Prefijos stdlib siempre permitidos en capas silenciosas, unidos con
    /// los del proyecto.
    pub fn allowed_io_prefixes(&self) -> Vec<String> {
        let mut defaults: Vec<String> = [
            "__future__", "typing", "dataclasses", "abc", "enum", "pathlib", "logging",
            "datetime", "uuid", "re", "math", "random", "decimal", "functools",
            "itertools", "collections", "contextlib", "json",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        defaults.extend(self.allowed_prefixes.iter().cloned());
        defaults
    }

    /// Raíces seguras para W9006 (defaults + proyecto).
    pub fn lod_safe_roots(&self) -> Vec<String> {
        let mut defaults: Vec<String> = [
            "builtins", "typing", "importlib", "pathlib", "ast", "os", "json", "yaml",
            "logging",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        defaults.extend(self.allowed_lod_roots.iter().cloned());
        defaults
    }

    /// Autoridades confiables para W9006 (defaults + proyecto).
    pub fn trusted_authority_roots(&self) -> Vec<String> {
        let mut defaults: Vec<String> = ["pathlib", "os.path", "re", "subprocess", "json"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        defaults.extend(self.trusted_authorities.iter().cloned());
        defaults
    }

    /// Tipos crudos por defecto + proyecto (W9007/W9009).
    pub fn raw_type_names(&self) -> Vec<String> {
        let mut defaults: Vec<String> =
            ["Cursor", "Session", "Response", "Engine", "Connection", "Result"]
                .iter()
                .map(|s| s.to_string())
                .collect();
        defaults.extend(self.raw_types.iter().cloned());
        defaults
    }

    /// Módulos de infraestructura conocidos + proyecto (W9009).
    pub fn infrastructure_module_names(&self) -> Vec<String> {
        let mut defaults: Vec<String> = [
            "sqlalchemy", "requests", "psycopg2", "boto3", "redis", "pymongo", "httpx",
            "aiohttp", "urllib3",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        defaults.extend(self.infrastructure_modules.iter().cloned());
        defaults
    }

    /// Archivos con funciones top-level permitidas (W9018).
    pub fn entry_module_files(&self) -> Vec<String> {
        let mut defaults: Vec<String> =
            ["__main__.py", "checker.py"].iter().map(|s| s.to_string()).collect();
        defaults.extend(self.entry_modules.iter().cloned());
        defaults
    }

    /// Valida la configuración. Errores aquí son fatales (ConfigError).
    pub fn validate(&self) -> Result<(), ExcelsiorError> {
        if self.complexity_threshold == 0 {
            return Err(ExcelsiorError::Config(
                "complexity_threshold debe ser mayor que cero".to_string(),
            ));
        }
        if self.interface_segregation_limit == 0 {
            return Err(ExcelsiorError::Config(
                "interface_segregation_limit debe ser mayor que cero".to_string(),
            ));
        }
        if !matches!(
            self.project_type.as_str(),
            "generic" | "cli_app" | "web_like" | "data_pipeline"
        ) {
            return Err(ExcelsiorError::Config(format!(
                "project_type desconocido: '{}'",
                self.project_type
            )));
        }
        for layer in self.layer_map.values() {
            if layer.trim().is_empty() {
                return Err(ExcelsiorError::Config(
                    "layer_map contiene un nombre de capa vacío".to_string(),
                ));
            }
        }
        if self.test_command.is_empty() {
            return Err(ExcelsiorError::Config(
                "test_command no puede estar vacío".to_string(),
            ));
        }
        Ok(())
    }

    /// Busca la raíz del proyecto subiendo desde `start` hasta encontrar
    /// `pyproject.toml` o `.excelsior.toml`.
    pub fn find_project_root(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();
        loop {
            if current.join("pyproject.toml").exists()
                || current.join(".excelsior.toml").exists()
            {
                return Some(current);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Carga la configuración desde la raíz del proyecto.
    ///
    /// Orden: `pyproject.toml [tool.clean-arch]`, después `.excelsior.toml
    /// [clean-arch]`. Sin archivo de configuración se usan los defaults.
    pub fn load(project_root: &Path) -> Result<Self, ExcelsiorError> {
        let pyproject = project_root.join("pyproject.toml");
        if pyproject.exists() {
            let content = fs::read_to_string(&pyproject)
                .map_err(|e| ExcelsiorError::Config(format!("pyproject.toml: {e}")))?;
            let value: toml::Value = toml::from_str(&content)
                .map_err(|e| ExcelsiorError::Config(format!("pyproject.toml: {e}")))?;
            if let Some(section) = value.get("tool").and_then(|t| t.get("clean-arch")) {
                let config: CleanArchConfig =
                    section.clone().try_into().map_err(|e| {
                        ExcelsiorError::Config(format!("[tool.clean-arch]: {e}"))
                    })?;
                config.validate()?;
                return Ok(config);
            }
        }
        let local = project_root.join(".excelsior.toml");
        if local.exists() {
            let content = fs::read_to_string(&local)
                .map_err(|e| ExcelsiorError::Config(format!(".excelsior.toml: {e}")))?;
            let value: toml::Value = toml::from_str(&content)
                .map_err(|e| ExcelsiorError::Config(format!(".excelsior.toml: {e}")))?;
            if let Some(section) = value.get("clean-arch") {
                let config: CleanArchConfig =
                    section.clone().try_into().map_err(|e| {
                        ExcelsiorError::Config(format!("[clean-arch]: {e}"))
                    })?;
                config.validate()?;
                return Ok(config);
            }
        }
        let config = CleanArchConfig::default();
        config.validate()?;
        Ok(config)
    }

    /// ¿El path debe excluirse por configuración? (fixtures deliberados)
    pub fn debe_excluir(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        self.audit_exclude_paths.iter().any(|frag| path_str.contains(frag.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_without_config_file() {
        let tmp = TempDir::new().unwrap();
        let config = CleanArchConfig::load(tmp.path()).unwrap();
        assert_eq!(config.project_type, "generic");
        assert_eq!(config.complexity_threshold, 10);
        assert!(config.ruff_enabled);
        assert_eq!(config.silent_layers, vec!["Domain", "UseCase"]);
    }

    #[test]
    fn test_load_from_pyproject_tool_section() {
        let tmp = TempDir::new().unwrap();
        let content = r#"
[project]
name = "demo"

[tool.clean-arch]
project_type = "cli_app"
complexity_threshold = 14
mock_limit = 2
silent_layers = ["Domain"]

[tool.clean-arch.layer_map]
"demo.use_cases" = "UseCase"
"demo.infrastructure" = "Infrastructure"

[tool.clean-arch.contract_integrity]
other_require_protocol = true
"#;
        std::fs::write(tmp.path().join("pyproject.toml"), content).unwrap();
        let config = CleanArchConfig::load(tmp.path()).unwrap();
        assert_eq!(config.project_type, "cli_app");
        assert_eq!(config.complexity_threshold, 14);
        assert_eq!(config.mock_limit, 2);
        assert_eq!(
            config.layer_map.get("demo.use_cases").map(String::as_str),
            Some("UseCase")
        );
        assert!(config.contract_integrity.other_require_protocol);
    }

    #[test]
    fn test_malformed_config_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let content = "[tool.clean-arch]\ncomplexity_threshold = \"mucho\"\n";
        std::fs::write(tmp.path().join("pyproject.toml"), content).unwrap();
        let err = CleanArchConfig::load(tmp.path());
        assert!(err.is_err(), "configuración malformada debe ser fatal");
    }

    #[test]
    fn test_invalid_project_type_rejected() {
        let config = CleanArchConfig {
            project_type: "microservicio".to_string(),
            ..CleanArchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_find_project_root_walks_up() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("pyproject.toml"), "[project]\n").unwrap();
        let nested = tmp.path().join("src/app/domain");
        std::fs::create_dir_all(&nested).unwrap();
        let root = CleanArchConfig::find_project_root(&nested).unwrap();
        assert_eq!(root, tmp.path());
    }

    #[test]
    fn test_allowed_prefixes_merge_defaults_with_project() {
        let config = CleanArchConfig {
            allowed_prefixes: vec!["attrs".to_string()],
            ..CleanArchConfig::default()
        };
        let merged = config.allowed_io_prefixes();
        assert!(merged.iter().any(|p| p == "typing"));
        assert!(merged.iter().any(|p| p == "attrs"));
    }
}
