//! Registro de reglas: carga el catálogo declarativo embebido.
//!
//! El catálogo YAML es la única fuente de verdad de metadatos (códigos,
//! símbolos, fixability, guía). Ningún consumidor mantiene listas paralelas:
//! fixable/comment_only se consultan siempre aquí.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::errors::ExcelsiorError;

const CATALOG: &str = include_str!("../../resources/rule_registry.yaml");
const TOOL_PREFIX: &str = "excelsior.";

#[derive(Debug, Clone, Deserialize)]
pub struct RuleDefinition {
    pub symbol: String,
    pub display_name: String,
    pub message_template: String,
    pub fixable: bool,
    pub comment_only: bool,
    pub manual_instructions: String,
    pub proactive_guidance: String,
    #[serde(default)]
    pub severity: Option<String>,
}

pub struct RuleRegistry {
    /// code (ej. `W9010`) → definición
    by_code: BTreeMap<String, RuleDefinition>,
}

impl RuleRegistry {
    /// Carga el catálogo embebido. Falla si hay códigos o símbolos duplicados
    /// (invariantes del registro).
    pub fn load() -> Result<Self, ExcelsiorError> {
        Self::from_yaml(CATALOG)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ExcelsiorError> {
        let raw: BTreeMap<String, RuleDefinition> = serde_yaml::from_str(content)
            .map_err(|e| ExcelsiorError::Config(format!("rule_registry.yaml: {e}")))?;
        let mut by_code = BTreeMap::new();
        let mut symbols = std::collections::HashSet::new();
        for (key, def) in raw {
            let code = key.strip_prefix(TOOL_PREFIX).ok_or_else(|| {
                ExcelsiorError::Config(format!(
                    "clave de catálogo sin prefijo de herramienta: {key}"
                ))
            })?;
            if !symbols.insert(def.symbol.clone()) {
                return Err(ExcelsiorError::Config(format!(
                    "símbolo duplicado en catálogo: {}",
                    def.symbol
                )));
            }
            if by_code.insert(code.to_string(), def).is_some() {
                return Err(ExcelsiorError::Config(format!(
                    "código duplicado en catálogo: {code}"
                )));
            }
        }
        Ok(Self { by_code })
    }

    /// Busca por código (`W9010`) o por símbolo (`god-file`).
    pub fn get(&self, code_or_symbol: &str) -> Option<&RuleDefinition> {
        if let Some(def) = self.by_code.get(code_or_symbol) {
            return Some(def);
        }
        self.by_code.values().find(|d| d.symbol == code_or_symbol)
    }

    pub fn is_fixable(&self, code: &str) -> bool {
        self.get(code).map(|d| d.fixable).unwrap_or(false)
    }

    pub fn is_comment_only(&self, code: &str) -> bool {
        self.get(code).map(|d| d.comment_only).unwrap_or(false)
    }

    pub fn display_name(&self, code: &str) -> String {
        self.get(code)
            .map(|d| d.display_name.clone())
            .unwrap_or_else(|| code.replace('-', " "))
    }

    pub fn manual_instructions(&self, code: &str) -> Option<String> {
        self.get(code).map(|d| d.manual_instructions.trim().to_string())
    }

    pub fn proactive_guidance(&self, code: &str) -> Option<String> {
        self.get(code).map(|d| d.proactive_guidance.trim().to_string())
    }

    pub fn codes(&self) -> impl Iterator<Item = &String> {
        self.by_code.keys()
    }

    pub fn definitions(&self) -> impl Iterator<Item = (&String, &RuleDefinition)> {
        self.by_code.iter()
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}
