//! Resolutor de capas: mapea módulos a Domain / UseCase / Interface /
//! Infrastructure.
//!
//! Determinista e idempotente: depende solo de la configuración y del path.
//! El único acceso al AST es leer decoradores de clase para las excepciones
//! configuradas.

use std::path::Path;

use regex::Regex;

use crate::ast::{ModuleAst, NodeId};
use crate::config::CleanArchConfig;

pub const LAYER_DOMAIN: &str = "Domain";
pub const LAYER_USE_CASE: &str = "UseCase";
pub const LAYER_INTERFACE: &str = "Interface";
pub const LAYER_INFRASTRUCTURE: &str = "Infrastructure";

/// Sufijos de nombre de clase → capa, por convención.
const SUFFIX_MAP: &[(&str, &str)] = &[
    ("UseCase", LAYER_USE_CASE),
    ("Interactor", LAYER_USE_CASE),
    ("Orchestrator", LAYER_USE_CASE),
    ("Entity", LAYER_DOMAIN),
    ("ValueObject", LAYER_DOMAIN),
    ("VO", LAYER_DOMAIN),
    ("Repository", LAYER_INFRASTRUCTURE),
    ("Adapter", LAYER_INFRASTRUCTURE),
    ("Client", LAYER_INFRASTRUCTURE),
    ("Gateway", LAYER_INFRASTRUCTURE),
    ("Controller", LAYER_INTERFACE),
    ("Router", LAYER_INTERFACE),
];

/// Segmentos de directorio → capa, por convención (case-insensitive).
const DIRECTORY_MAP: &[(&str, &str)] = &[
    ("use_cases", LAYER_USE_CASE),
    ("use_case", LAYER_USE_CASE),
    ("orchestrators", LAYER_USE_CASE),
    ("domain", LAYER_DOMAIN),
    ("entities", LAYER_DOMAIN),
    ("infrastructure", LAYER_INFRASTRUCTURE),
    ("adapters", LAYER_INFRASTRUCTURE),
    ("gateways", LAYER_INFRASTRUCTURE),
    ("interface", LAYER_INTERFACE),
    ("ui", LAYER_INTERFACE),
    ("api", LAYER_INTERFACE),
    ("cli", LAYER_INTERFACE),
    ("commands", LAYER_INTERFACE),
];

pub struct LayerResolver {
    config: CleanArchConfig,
    /// Entradas de layer_map cuyo key es regex (contiene metacaracteres),
    /// compiladas una vez.
    pattern_entries: Vec<(Regex, String)>,
    /// Entradas de layer_map por prefijo punteado, ordenadas por longitud
    /// descendente (longest prefix wins).
    prefix_entries: Vec<(String, String)>,
}

impl LayerResolver {
    pub fn new(config: &CleanArchConfig) -> Self {
        let mut pattern_entries = Vec::new();
        let mut prefix_entries = Vec::new();
        for (key, layer) in &config.layer_map {
            if key.chars().all(|c| c.is_alphanumeric() || c == '.' || c == '_') {
                prefix_entries.push((key.clone(), layer.clone()));
            } else if let Ok(re) = Regex::new(key) {
                pattern_entries.push((re, layer.clone()));
            }
        }
        prefix_entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { config: config.clone(), pattern_entries, prefix_entries }
    }

    /// Resuelve la capa de un módulo. `None` = fuera del dominio (opt-out o
    /// sin mapear); W9017 reporta los None bajo src/.
    pub fn resolve(&self, module_name: &str, file_path: &Path) -> Option<String> {
        // 1. Excepciones explícitas (opt-out del proyecto)
        if self.is_exception_module(module_name) {
            return None;
        }
        // 2. layer_map por prefijo punteado, longest prefix wins
        for (prefix, layer) in &self.prefix_entries {
            if module_name == prefix || module_name.starts_with(&format!("{prefix}.")) {
                return Some(layer.clone());
            }
        }
        // 3. layer_map por regex sobre el path
        let path_str = normalize_path(file_path);
        for (re, layer) in &self.pattern_entries {
            if re.is_match(&path_str) {
                return Some(layer.clone());
            }
        }
        // 5 (estricta, no-sobreescribible): site-packages / venv
        if path_str.contains("/site-packages/") || path_str.contains("/.venv/") {
            return Some(LAYER_INFRASTRUCTURE.to_string());
        }
        // 4. Convención por segmentos de directorio
        if let Some(layer) = self.resolve_by_convention(&path_str) {
            return Some(layer);
        }
        None
    }

    /// Resuelve la capa de una clase: decoradores de excepción → None;
    /// sufijos de nombre por convención; si no, la capa del módulo.
    pub fn resolve_class(
        &self,
        module: &ModuleAst,
        class: NodeId,
    ) -> Option<String> {
        let data = module.class_data(class)?;
        for dec in &data.decorators {
            let dec_name = dec.split('(').next().unwrap_or(dec);
            if self
                .config
                .exceptions
                .decorators
                .iter()
                .any(|d| d == dec_name)
            {
                return None;
            }
        }
        for base in &data.bases {
            let bare = base.rsplit('.').next().unwrap_or(base);
            if self
                .config
                .exceptions
                .framework_base_classes
                .iter()
                .any(|f| f == base || f.rsplit('.').next() == Some(bare))
            {
                return None;
            }
        }
        for (suffix, layer) in self.suffix_map() {
            if data.name.ends_with(suffix.as_str()) && data.name.len() > suffix.len() {
                return Some(layer);
            }
        }
        self.resolve(&module.name, &module.path)
    }

    fn suffix_map(&self) -> Vec<(String, String)> {
        let mut map: Vec<(String, String)> = SUFFIX_MAP
            .iter()
            .map(|(s, l)| (s.to_string(), l.to_string()))
            .collect();
        match self.config.project_type.as_str() {
            "web_like" => {
                map.push(("Model".to_string(), LAYER_INFRASTRUCTURE.to_string()));
                map.push(("Schema".to_string(), LAYER_INTERFACE.to_string()));
            }
            "cli_app" => {
                map.push(("Command".to_string(), LAYER_INTERFACE.to_string()));
            }
            _ => {}
        }
        map
    }

    fn is_exception_module(&self, module_name: &str) -> bool {
        self.config.exceptions.internal_markers.iter().any(|marker| {
            module_name == marker || module_name.starts_with(&format!("{marker}."))
        })
    }

    fn resolve_by_convention(&self, path_str: &str) -> Option<String> {
        let segments: Vec<&str> = path_str.split('/').collect();
        for seg in &segments {
            let lowered = seg.to_lowercase();
            for (dir, layer) in DIRECTORY_MAP {
                if lowered == *dir {
                    return Some(layer.to_string());
                }
            }
        }
        // Archivos de entrada por convención
        if let Some(last) = segments.last() {
            if matches!(*last, "cli.py" | "main.py" | "bootstrap.py" | "__main__.py") {
                return Some(LAYER_INTERFACE.to_string());
            }
        }
        None
    }

    /// Matriz de dependencias permitidas entre capas (W9001).
    pub fn allowed_dependencies(layer: &str) -> &'static [&'static str] {
        match layer {
            LAYER_DOMAIN => &[],
            LAYER_USE_CASE => &[LAYER_DOMAIN],
            LAYER_INTERFACE => &[LAYER_DOMAIN, LAYER_USE_CASE],
            LAYER_INFRASTRUCTURE => &[LAYER_DOMAIN, LAYER_USE_CASE, LAYER_INTERFACE],
            _ => &[],
        }
    }
}

fn normalize_path(path: &Path) -> String {
    let mut s = path.to_string_lossy().replace('\\', "/");
    if !s.starts_with('/') {
        s = format!("/{s}");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn resolver_with(layer_map: &[(&str, &str)]) -> LayerResolver {
        let mut config = CleanArchConfig::default();
        for (k, v) in layer_map {
            config.layer_map.insert(k.to_string(), v.to_string());
        }
        LayerResolver::new(&config)
    }

    #[test]
    fn test_layer_map_longest_prefix_wins() {
        let r = resolver_with(&[
            ("app", "Interface"),
            ("app.use_cases", "UseCase"),
        ]);
        assert_eq!(
            r.resolve("app.use_cases.order", &PathBuf::from("x/order.py")),
            Some("UseCase".to_string())
        );
        assert_eq!(
            r.resolve("app.other", &PathBuf::from("x/other.py")),
            Some("Interface".to_string())
        );
    }

    #[test]
    fn test_convention_directories_case_insensitive() {
        let r = resolver_with(&[]);
        assert_eq!(
            r.resolve("m", &PathBuf::from("src/app/Domain/order.py")),
            Some("Domain".to_string())
        );
        assert_eq!(
            r.resolve("m", &PathBuf::from("src/app/infrastructure/db.py")),
            Some("Infrastructure".to_string())
        );
    }

    #[test]
    fn test_site_packages_is_infrastructure_and_strict() {
        // Aunque el path contenga 'domain', site-packages manda.
        let r = resolver_with(&[]);
        assert_eq!(
            r.resolve(
                "lib",
                &PathBuf::from(".venv/lib/site-packages/domain/thing.py")
            ),
            Some("Infrastructure".to_string())
        );
    }

    #[test]
    fn test_unresolved_returns_none() {
        let r = resolver_with(&[]);
        assert_eq!(r.resolve("helpers", &PathBuf::from("src/helpers.py")), None);
    }

    #[test]
    fn test_regex_pattern_in_layer_map() {
        let r = resolver_with(&[(r".*/repositories/.*", "Infrastructure")]);
        assert_eq!(
            r.resolve("m", &PathBuf::from("src/app/repositories/users.py")),
            Some("Infrastructure".to_string())
        );
    }

    #[test]
    fn test_exception_markers_opt_out() {
        let mut config = CleanArchConfig::default();
        config.exceptions.internal_markers.push("app.vendored".to_string());
        let r = LayerResolver::new(&config);
        assert_eq!(
            r.resolve("app.vendored.x", &PathBuf::from("src/app/domain/x.py")),
            None
        );
    }

    #[test]
    fn test_resolution_is_deterministic_and_idempotent() {
        let r = resolver_with(&[("app.domain", "Domain")]);
        let p = PathBuf::from("src/app/domain/order.py");
        let first = r.resolve("app.domain.order", &p);
        for _ in 0..3 {
            assert_eq!(r.resolve("app.domain.order", &p), first);
        }
    }
}
