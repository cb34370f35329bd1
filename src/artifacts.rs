//! Persistencia de artefactos bajo `.excelsior/`: audit trail, handover
//! para tooling downstream y planes de fix legibles.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use crate::audit::AuditOutcome;
use crate::rules::registry::RuleRegistry;
use crate::rules::Violation;

pub const ARTIFACT_VERSION: &str = "3.0";

/// Almacén de artefactos con claves lógicas (`check/last_audit.json`).
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(project_root: &Path) -> Self {
        Self { root: project_root.join(".excelsior") }
    }

    pub fn write(&self, key: &str, content: &str) -> std::io::Result<PathBuf> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Guarda el audit trail completo de una corrida (`<source>/last_audit.json`).
    pub fn save_audit_trail(
        &self,
        outcome: &AuditOutcome,
        registry: &RuleRegistry,
        source: &str,
    ) -> std::io::Result<PathBuf> {
        let trail = build_audit_trail(outcome, registry);
        self.write(
            &format!("{source}/last_audit.json"),
            &serde_json::to_string_pretty(&trail).unwrap_or_default(),
        )
    }

    /// Guarda el handover por regla (`<source>/ai_handover.json`).
    /// Determinista: sin timestamp, reglas ordenadas por código.
    pub fn save_handover(
        &self,
        outcome: &AuditOutcome,
        registry: &RuleRegistry,
        fix_failures: &[Violation],
        source: &str,
    ) -> std::io::Result<PathBuf> {
        let handover = build_handover(outcome, registry, fix_failures);
        self.write(
            &format!("{source}/ai_handover.json"),
            &serde_json::to_string_pretty(&handover).unwrap_or_default(),
        )
    }

    /// Plan de fix legible para una regla (`fix_plans/<rule>_<ts>.md`).
    pub fn save_fix_plan(
        &self,
        code: &str,
        registry: &RuleRegistry,
        occurrences: &[Violation],
    ) -> std::io::Result<PathBuf> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let display = registry.display_name(code);
        let manual = registry
            .manual_instructions(code)
            .unwrap_or_else(|| "Review and fix manually.".to_string());
        let guidance = registry.proactive_guidance(code).unwrap_or_default();
        let mut body = format!("# Fix plan: {code} — {display}\n\n## Manual instructions\n\n{manual}\n");
        if !guidance.is_empty() {
            body.push_str(&format!("\n## Why this matters\n\n{guidance}\n"));
        }
        body.push_str("\n## Occurrences\n\n");
        if occurrences.is_empty() {
            body.push_str("No current occurrences.\n");
        }
        for v in occurrences {
            body.push_str(&format!("- `{}` — {}\n", v.location, v.message));
        }
        self.write(&format!("fix_plans/{code}_{stamp}.md"), &body)
    }
}

/// Audit trail serializable: versión, timestamp, resumen por pase y
/// violaciones agrupadas por pase.
pub fn build_audit_trail(outcome: &AuditOutcome, registry: &RuleRegistry) -> Value {
    let mut summary = serde_json::Map::new();
    let mut passes = Vec::new();
    for pass in &outcome.passes {
        summary.insert(pass.stage.as_str().to_string(), json!(pass.violations.len()));
        let violations: Vec<Value> = pass
            .violations
            .iter()
            .map(|v| {
                json!({
                    "code": v.code,
                    "message": v.message,
                    "location": v.location,
                    "fixable": v.fixable,
                    "comment_only": v.is_comment_only,
                    "fix_failure_reason": v.fix_failure_reason,
                    "manual_instructions": registry.manual_instructions(&v.code),
                })
            })
            .collect();
        passes.push(json!({
            "stage": pass.stage.as_str(),
            "skipped_disabled": pass.skipped_disabled,
            "skipped_blocked": pass.skipped_blocked,
            "error": pass.error,
            "violations": violations,
        }));
    }
    json!({
        "version": ARTIFACT_VERSION,
        "timestamp": outcome.timestamp,
        "blocked_by": outcome.blocked_by_str(),
        "summary": Value::Object(summary),
        "passes": passes,
    })
}

/// Handover por regla: agrupa todas las violaciones de la corrida por
/// código, con fixable/instrucciones/guía desde el catálogo.
pub fn build_handover(
    outcome: &AuditOutcome,
    registry: &RuleRegistry,
    fix_failures: &[Violation],
) -> Value {
    // BTreeMap: orden estable por código → artefactos byte-idénticos
    let mut groups: BTreeMap<String, Vec<&Violation>> = BTreeMap::new();
    for pass in &outcome.passes {
        for v in &pass.violations {
            groups.entry(v.code.clone()).or_default().push(v);
        }
    }
    let mut failure_reasons: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for v in fix_failures {
        if let Some(reason) = &v.fix_failure_reason {
            let entry = failure_reasons.entry(v.code.clone()).or_default();
            if !entry.contains(reason) {
                entry.push(reason.clone());
            }
        }
    }

    let rules: Vec<Value> = groups
        .iter()
        .map(|(code, violations)| {
            let mut occurrences: Vec<String> =
                violations.iter().map(|v| v.location.clone()).collect();
            occurrences.sort();
            let reasons = failure_reasons.get(code).cloned().or_else(|| {
                let inline: Vec<String> = violations
                    .iter()
                    .filter_map(|v| v.fix_failure_reason.clone())
                    .collect();
                if inline.is_empty() {
                    None
                } else {
                    let mut unique = Vec::new();
                    for r in inline {
                        if !unique.contains(&r) {
                            unique.push(r);
                        }
                    }
                    Some(unique)
                }
            });
            json!({
                "code": code,
                "fixable": registry.is_fixable(code),
                "comment_only": registry.is_comment_only(code),
                "message": violations.first().map(|v| v.message.clone()).unwrap_or_default(),
                "occurrences": occurrences,
                "manual_instructions": registry.manual_instructions(code),
                "proactive_guidance": registry.proactive_guidance(code),
                "fix_failure_reasons": reasons,
            })
        })
        .collect();

    json!({
        "version": ARTIFACT_VERSION,
        "blocked_by": outcome.blocked_by_str(),
        "rules": rules,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditOutcome, AuditStage, PassReport};
    use tempfile::TempDir;

    fn violation(code: &str, path: &str, line: u32) -> Violation {
        Violation {
            code: code.to_string(),
            message: format!("mensaje {code}"),
            location: format!("{path}:{line}:0"),
            path: path.to_string(),
            line,
            column: 0,
            symbol: None,
            node: None,
            fixable: false,
            fix_failure_reason: None,
            is_comment_only: false,
        }
    }

    fn outcome(violations: Vec<Violation>) -> AuditOutcome {
        AuditOutcome {
            passes: vec![PassReport {
                stage: AuditStage::Excelsior,
                violations,
                error: None,
                skipped_disabled: false,
                skipped_blocked: false,
            }],
            blocked_by: Some(AuditStage::Excelsior),
            timestamp: "2026-08-02T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_handover_groups_by_rule_and_is_deterministic() {
        let registry = RuleRegistry::load().unwrap();
        let vs = vec![
            violation("W9015", "b.py", 3),
            violation("W9001", "a.py", 1),
            violation("W9015", "a.py", 9),
        ];
        let h1 = build_handover(&outcome(vs.clone()), &registry, &[]);
        let h2 = build_handover(&outcome(vs), &registry, &[]);
        assert_eq!(
            serde_json::to_string(&h1).unwrap(),
            serde_json::to_string(&h2).unwrap(),
            "handover byte-idéntico entre corridas"
        );
        let rules = h1["rules"].as_array().unwrap();
        assert_eq!(rules[0]["code"], "W9001");
        assert_eq!(rules[1]["code"], "W9015");
        assert_eq!(rules[1]["occurrences"].as_array().unwrap().len(), 2);
        assert_eq!(rules[1]["fixable"], true);
        assert!(rules[1]["manual_instructions"].as_str().unwrap().contains("type hints"));
    }

    #[test]
    fn test_handover_carries_fix_failure_reasons() {
        let registry = RuleRegistry::load().unwrap();
        let mut failed = violation("W9015", "a.py", 2);
        failed.fix_failure_reason =
            Some("Inference failed: Type could not be determined from context or stubs.".to_string());
        let h = build_handover(&outcome(vec![failed.clone()]), &registry, &[failed]);
        let rules = h["rules"].as_array().unwrap();
        let reasons = rules[0]["fix_failure_reasons"].as_array().unwrap();
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].as_str().unwrap().starts_with("Inference failed"));
    }

    #[test]
    fn test_audit_trail_summary_counts() {
        let registry = RuleRegistry::load().unwrap();
        let trail = build_audit_trail(
            &outcome(vec![violation("W9001", "a.py", 1), violation("W9006", "a.py", 4)]),
            &registry,
        );
        assert_eq!(trail["summary"]["excelsior"], 2);
        assert_eq!(trail["blocked_by"], "excelsior");
        assert_eq!(trail["version"], ARTIFACT_VERSION);
    }

    #[test]
    fn test_store_writes_under_excelsior_dir() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let registry = RuleRegistry::load().unwrap();
        let out = outcome(vec![violation("W9001", "a.py", 1)]);
        let audit_path = store.save_audit_trail(&out, &registry, "check").unwrap();
        let handover_path = store.save_handover(&out, &registry, &[], "check").unwrap();
        assert!(audit_path.ends_with(".excelsior/check/last_audit.json") || audit_path.exists());
        assert!(handover_path.exists());
        let content = std::fs::read_to_string(handover_path).unwrap();
        assert!(content.contains("W9001"));
    }

    #[test]
    fn test_fix_plan_document_renders_occurrences() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let registry = RuleRegistry::load().unwrap();
        let path = store
            .save_fix_plan("W9006", &registry, &[violation("W9006", "src/geo.py", 3)])
            .unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("# Fix plan: W9006"));
        assert!(content.contains("src/geo.py:3:0"));
        assert!(content.contains("Law of Demeter"));
    }
}
