//! W9030: entropía arquitectónica (scatter). El mismo literal definido en
//! varios archivos.
//!
//! Regla de reducción final: los pases por archivo solo acumulan; las
//! violaciones se emiten en un paso único y secuencial al terminar la
//! recolección (contrato de concurrencia del pipeline).

use std::collections::{BTreeMap, BTreeSet};

use crate::ast::{ConstValue, ModuleAst, NodeData, NodeKind};
use crate::rules::Violation;

/// Acumulador de scatter entre archivos.
#[derive(Default)]
pub struct ScatterAccumulator {
    /// literal → (archivo, línea) de cada contexto de definición.
    occurrences: BTreeMap<String, Vec<(String, u32)>>,
    /// literal → primera ocurrencia (para anclar la violación).
    first_seen: BTreeMap<String, (String, u32, u32)>,
}

impl ScatterAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra los literales en contexto de definición de un módulo.
    /// Contextos: elemento de literal list/set/tuple o clave de dict.
    pub fn record_module(&mut self, module: &ModuleAst) {
        let path = module.path.display().to_string();
        for const_id in module.nodes_of_kind(module.root, NodeKind::Const) {
            let NodeData::Const(ConstValue::Str(value)) = &module.node(const_id).data
            else {
                continue;
            };
            if value.len() < 3 {
                continue;
            }
            let Some(parent) = module.node(const_id).parent else { continue };
            let in_definition_context = matches!(
                module.kind(parent),
                NodeKind::List | NodeKind::Set | NodeKind::Tuple | NodeKind::Dict
            );
            if !in_definition_context {
                continue;
            }
            // En Dict solo cuentan las claves (los pares se aplanan
            // clave-primero: índices pares).
            if module.kind(parent) == NodeKind::Dict {
                let idx = module
                    .node(parent)
                    .children
                    .iter()
                    .position(|&c| c == const_id);
                if idx.map(|i| i % 2 != 0).unwrap_or(true) {
                    continue;
                }
            }
            let node = module.node(const_id);
            self.occurrences
                .entry(value.clone())
                .or_default()
                .push((path.clone(), node.line));
            self.first_seen
                .entry(value.clone())
                .or_insert((path.clone(), node.line, node.col));
        }
    }

    /// Paso de reducción: una violación por literal presente en ≥2 archivos.
    pub fn into_violations(self) -> Vec<Violation> {
        let mut violations = Vec::new();
        for (value, occurrences) in self.occurrences {
            let files: BTreeSet<&String> = occurrences.iter().map(|(f, _)| f).collect();
            if files.len() < 2 {
                continue;
            }
            let (path, line, column) = self.first_seen[&value].clone();
            violations.push(Violation {
                code: "W9030".to_string(),
                message: format!("Scatter: {value} appears in {} files.", files.len()),
                location: format!("{path}:{line}:{column}"),
                path,
                line,
                column,
                symbol: Some(value),
                node: None,
                fixable: false,
                fix_failure_reason: None,
                is_comment_only: false,
            });
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::lower::parse_module;
    use std::path::Path;

    fn module(path: &str, src: &str) -> ModuleAst {
        let name = path.trim_end_matches(".py").replace('/', ".");
        parse_module(src, Path::new(path), &name).unwrap()
    }

    #[test]
    fn test_literal_in_two_files_fires() {
        let mut acc = ScatterAccumulator::new();
        acc.record_module(&module("a.py", "KINDS = [\"premium\", \"basic\"]\n"));
        acc.record_module(&module("b.py", "TIERS = {\"premium\": 1}\n"));
        let violations = acc.into_violations();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("premium"));
        assert!(violations[0].message.contains("2 files"));
    }

    #[test]
    fn test_literal_in_one_file_clean() {
        let mut acc = ScatterAccumulator::new();
        acc.record_module(&module("a.py", "KINDS = [\"premium\"]\nMORE = [\"premium\"]\n"));
        let violations = acc.into_violations();
        assert!(violations.is_empty(), "mismo archivo no es scatter");
    }

    #[test]
    fn test_non_definition_context_ignored() {
        let mut acc = ScatterAccumulator::new();
        acc.record_module(&module("a.py", "print(\"premium\")\n"));
        acc.record_module(&module("b.py", "log(\"premium\")\n"));
        assert!(acc.into_violations().is_empty());
    }

    #[test]
    fn test_dict_values_not_definition_context() {
        let mut acc = ScatterAccumulator::new();
        acc.record_module(&module("a.py", "M = {\"k\": \"premium\"}\n"));
        acc.record_module(&module("b.py", "N = {\"j\": \"premium\"}\n"));
        assert!(acc.into_violations().is_empty());
    }

    #[test]
    fn test_deterministic_order() {
        let mut acc = ScatterAccumulator::new();
        acc.record_module(&module("a.py", "X = [\"zzz\", \"aaa\"]\n"));
        acc.record_module(&module("b.py", "Y = [\"zzz\", \"aaa\"]\n"));
        let violations = acc.into_violations();
        assert_eq!(violations.len(), 2);
        // BTreeMap: orden por literal
        assert!(violations[0].message.contains("aaa"));
        assert!(violations[1].message.contains("zzz"));
    }
}
