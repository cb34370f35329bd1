//! W9015: type hints faltantes, con auto-fix de alta integridad.
//!
//! Solo se marca fixable cuando la inferencia es determinista y no-Any; si
//! no, la violación lleva el motivo exacto del fallo.

use crate::ast::{NodeId, NodeKind, ParamKind};
use crate::rules::{
    Checkable, Fixable, RuleContext, TransformationPlan, Violation,
};

const INFERENCE_FAILED: &str =
    "Inference failed: Type could not be determined from context or stubs.";
const ANY_BANNED: &str = "Injection Aborted: 'Any' is a banned type (W9016).";

pub struct MissingTypeHintRule;

impl MissingTypeHintRule {
    fn can_fix(&self, qname: Option<&str>) -> (bool, Option<&'static str>) {
        match qname {
            None => (false, Some(INFERENCE_FAILED)),
            Some(q) if q.contains("Any") => (false, Some(ANY_BANNED)),
            Some(_) => (true, None),
        }
    }

    /// `builtins.str` → `str`; `pathlib.Path` → `Path`.
    fn qname_to_type_name(&self, qname: &str) -> String {
        qname.rsplit('.').next().unwrap_or(qname).to_string()
    }

    /// Import necesario para anotar con este qname, si lo hay.
    fn import_for_qname(
        &self,
        ctx: &RuleContext<'_>,
        qname: &str,
    ) -> Option<(String, String)> {
        if qname.starts_with("builtins.") || !qname.contains('.') {
            return None;
        }
        let (module, name) = qname.rsplit_once('.')?;
        if module == ctx.module.name {
            return None;
        }
        Some((module.to_string(), name.to_string()))
    }

    fn is_dunder_init(&self, ctx: &RuleContext<'_>, func: NodeId) -> bool {
        ctx.module
            .function_data(func)
            .map(|f| f.name == "__init__")
            .unwrap_or(false)
    }
}

impl Checkable for MissingTypeHintRule {
    fn code(&self) -> &'static str {
        "W9015"
    }

    fn description(&self) -> &'static str {
        "All function signatures must be fully type-hinted."
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::FunctionDef, NodeKind::AsyncFunctionDef]
    }

    fn check(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        if ctx.is_test_file() {
            return vec![];
        }
        let Some(data) = ctx.module.function_data(node) else { return vec![] };
        let mut violations = Vec::new();

        if data.returns.is_none() {
            let (fixable, reason) = if self.is_dunder_init(ctx, node) {
                // __init__ siempre es -> None, fix trivial
                (true, None)
            } else {
                let inferred = ctx.oracle.infer_return_type(ctx.module, node);
                self.can_fix(inferred.as_deref())
            };
            let mut v = Violation::from_node(
                ctx.module,
                self.code(),
                format!("Missing Type Hint: return type in {} signature.", data.name),
                node,
            )
            .with_symbol(format!("{}.return", data.name))
            .fixable(fixable);
            if let Some(r) = reason {
                v = v.failure(r);
            }
            violations.push(v);
        }

        let is_method = ctx.module.is_method(node);
        for (i, p) in data.params.iter().enumerate() {
            if i == 0 && is_method && (p.name == "self" || p.name == "cls") {
                continue;
            }
            if p.annotation.is_some() {
                continue;
            }
            // *args/**kwargs sin anotar también cuentan
            let display_name = match p.kind {
                ParamKind::Vararg => format!("*{}", p.name),
                ParamKind::Kwarg => format!("**{}", p.name),
                _ => p.name.clone(),
            };
            let inferred = ctx.oracle.infer_param_type(ctx.module, node, i);
            let (fixable, reason) = self.can_fix(inferred.as_deref());
            let mut v = Violation::from_node(
                ctx.module,
                self.code(),
                format!(
                    "Missing Type Hint: parameter '{display_name}' in {} signature.",
                    data.name
                ),
                node,
            )
            .with_symbol(format!("{}.{}", data.name, p.name))
            .fixable(fixable);
            if let Some(r) = reason {
                v = v.failure(r);
            }
            violations.push(v);
        }
        violations
    }
}

impl Fixable for MissingTypeHintRule {
    fn fix(
        &self,
        ctx: &RuleContext<'_>,
        violation: &Violation,
    ) -> Option<Vec<TransformationPlan>> {
        if !violation.fixable {
            return None;
        }
        let node = violation.node?;
        let data = ctx.module.function_data(node)?;
        let line = ctx.module.node(node).line;

        // Violación de parámetro: el mensaje lleva el nombre entre comillas
        if let Some(param_name) = violation
            .message
            .split('\'')
            .nth(1)
            .filter(|_| violation.message.contains("parameter"))
        {
            let index = data.params.iter().position(|p| p.name == param_name)?;
            let qname = ctx.oracle.infer_param_type(ctx.module, node, index)?;
            let type_name = self.qname_to_type_name(&qname);
            let mut plans = Vec::new();
            if let Some((module, name)) = self.import_for_qname(ctx, &qname) {
                plans.push(TransformationPlan::add_import(
                    &ctx.module.path,
                    &module,
                    &[name],
                ));
            }
            plans.push(TransformationPlan::add_parameter_type(
                &ctx.module.path,
                &data.name,
                line,
                param_name,
                &type_name,
            ));
            return Some(plans);
        }

        // Violación de tipo de retorno
        if self.is_dunder_init(ctx, node) {
            return Some(vec![TransformationPlan::add_none_return_annotation(
                &ctx.module.path,
                &data.name,
                line,
            )]);
        }
        let qname = ctx.oracle.infer_return_type(ctx.module, node)?;
        if qname == "builtins.None" {
            return Some(vec![TransformationPlan::add_none_return_annotation(
                &ctx.module.path,
                &data.name,
                line,
            )]);
        }
        let type_name = self.qname_to_type_name(&qname);
        let mut plans = Vec::new();
        if let Some((module, name)) = self.import_for_qname(ctx, &qname) {
            plans.push(TransformationPlan::add_import(&ctx.module.path, &module, &[name]));
        }
        plans.push(TransformationPlan::add_return_type(
            &ctx.module.path,
            &data.name,
            line,
            &type_name,
        ));
        Some(plans)
    }
}

#[cfg(test)]
mod tests {
    use crate::rules::engine::test_support::{check_single_rule, fix_single_rule};
    use crate::rules::PlanKind;

    #[test]
    fn test_inferable_return_is_fixable() {
        // Retorno inferible: fixable sin motivo de fallo
        let src = "def greet(name: str):\n    return \"hi \" + name\n";
        let violations = check_single_rule("src/use_cases/greet.py", src, &["W9015"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].fixable);
        assert!(violations[0].fix_failure_reason.is_none());
    }

    #[test]
    fn test_uninferable_return_carries_reason() {
        // Sin inferencia determinista no se escribe nada
        let src = "def dyn():\n    return process(get_data())\n";
        let violations = check_single_rule("src/use_cases/dyn.py", src, &["W9015"]);
        assert_eq!(violations.len(), 1);
        assert!(!violations[0].fixable);
        assert_eq!(
            violations[0].fix_failure_reason.as_deref(),
            Some("Inference failed: Type could not be determined from context or stubs.")
        );
    }

    #[test]
    fn test_fully_annotated_function_clean() {
        let src = "def greet(name: str) -> str:\n    return name\n";
        let violations = check_single_rule("src/use_cases/greet.py", src, &["W9015"]);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_missing_param_annotation_flagged() {
        let src = "def greet(name) -> str:\n    return name\n";
        let violations = check_single_rule("src/use_cases/greet.py", src, &["W9015"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("'name'"));
    }

    #[test]
    fn test_fix_plan_for_inferable_return() {
        let src = "def greet(name: str):\n    return \"hi \" + name\n";
        let plans = fix_single_rule("src/use_cases/greet.py", src, "W9015");
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].kind, PlanKind::AddReturnType);
        assert_eq!(plans[0].params.get("return_type").map(String::as_str), Some("str"));
    }

    #[test]
    fn test_fix_plan_for_init_is_none_annotation() {
        let src = "\
class Order:
    def __init__(self, total: int):
        self.total = total
";
        let plans = fix_single_rule("src/domain/order.py", src, "W9015");
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].kind, PlanKind::AddNoneReturnAnnotation);
    }

    #[test]
    fn test_fix_plan_for_default_param() {
        let src = "def retry(count=3) -> int:\n    return count\n";
        let plans = fix_single_rule("src/use_cases/retry.py", src, "W9015");
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].kind, PlanKind::AddParameterType);
        assert_eq!(plans[0].params.get("param_type").map(String::as_str), Some("int"));
    }

    #[test]
    fn test_stub_backed_type_adds_import() {
        let src = "\
from pathlib import Path

def workdir():
    return Path(\"/tmp\")
";
        let plans = fix_single_rule("src/infrastructure/fs.py", src, "W9015");
        // Path ya está importado en el módulo... el plan de import es
        // idempotente en el gateway, así que puede venir o no; el último plan
        // siempre es la anotación.
        let last = plans.last().unwrap();
        assert_eq!(last.kind, PlanKind::AddReturnType);
        assert_eq!(last.params.get("return_type").map(String::as_str), Some("Path"));
    }
}
