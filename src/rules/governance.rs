//! Comentarios de gobernanza: el "fix" de las reglas comment-only.
//!
//! Inyecta un bloque de comentario estandarizado y parseable por máquina
//! encima de la línea de la violación; nunca toca el código.

use crate::rules::registry::RuleRegistry;
use crate::rules::{TransformationPlan, Violation};

pub struct GovernanceCommentBuilder<'a> {
    registry: &'a RuleRegistry,
}

impl<'a> GovernanceCommentBuilder<'a> {
    pub fn new(registry: &'a RuleRegistry) -> Self {
        Self { registry }
    }

    /// Plan de comentario para una violación comment-only. None si la regla
    /// no es comment-only según el catálogo.
    pub fn build(&self, violation: &Violation) -> Option<TransformationPlan> {
        if !self.registry.is_comment_only(&violation.code) {
            return None;
        }
        let rule_name = self.registry.display_name(&violation.code);
        let recommendation = self
            .registry
            .manual_instructions(&violation.code)
            .unwrap_or_else(|| "Review and fix the violation manually.".to_string());
        let problem = self.problem_for(violation);
        let context_info = format!("Violation detected at line {}.", violation.line);
        Some(TransformationPlan::add_governance_comment(
            std::path::Path::new(&violation.path),
            &violation.code,
            &rule_name,
            &problem,
            &recommendation,
            &context_info,
            violation.line,
        ))
    }

    /// Descripción específica del problema. Para Law of Demeter, nombra el
    /// objeto inmediato y el extraño alcanzado a través de él.
    fn problem_for(&self, violation: &Violation) -> String {
        if violation.code == "W9006" {
            if let Some(chain) = violation.message.strip_prefix("Law of Demeter: ") {
                let clean = chain.trim_end_matches(" (Stranger)").replace("()", "");
                let parts: Vec<&str> = clean.split('.').collect();
                if parts.len() >= 2 {
                    let immediate = parts[0];
                    let stranger = parts[1..].join(".");
                    return format!(
                        "Logic reaches through '{immediate}' to '{stranger}'. Chain access exceeds one level of indirection."
                    );
                }
            }
        }
        let mut problem = violation.message.clone();
        if problem.chars().count() > 120 {
            problem = match problem.split_once('.') {
                Some((head, _)) => format!("{head}."),
                None => {
                    let head: String = problem.chars().take(117).collect();
                    format!("{head}...")
                }
            };
        }
        problem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::registry::RuleRegistry;
    use crate::rules::{PlanKind, Violation};

    fn demeter_violation(message: &str) -> Violation {
        Violation {
            code: "W9006".to_string(),
            message: message.to_string(),
            location: "src/use_cases/geo.py:3:4".to_string(),
            path: "src/use_cases/geo.py".to_string(),
            line: 3,
            column: 4,
            symbol: None,
            node: None,
            fixable: false,
            fix_failure_reason: None,
            is_comment_only: true,
        }
    }

    #[test]
    fn test_demeter_comment_names_immediate_and_stranger() {
        let registry = RuleRegistry::load().unwrap();
        let builder = GovernanceCommentBuilder::new(&registry);
        let plan = builder
            .build(&demeter_violation("Law of Demeter: user.address.coordinates.lat"))
            .unwrap();
        assert_eq!(plan.kind, PlanKind::AddGovernanceComment);
        let problem = plan.params.get("problem").unwrap();
        assert!(problem.contains("'user'"));
        assert!(problem.contains("address.coordinates"));
        assert_eq!(plan.anchor.line, 3);
    }

    #[test]
    fn test_non_comment_only_rule_rejected() {
        let registry = RuleRegistry::load().unwrap();
        let builder = GovernanceCommentBuilder::new(&registry);
        let mut v = demeter_violation("x");
        v.code = "W9015".to_string();
        assert!(builder.build(&v).is_none());
    }
}
