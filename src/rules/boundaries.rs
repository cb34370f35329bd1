//! Reglas de frontera: W9003 (visibilidad), W9004 (imports de I/O),
//! W9013 (llamadas de I/O), W9014 (UI en Domain).

use crate::ast::{ConstValue, NodeData, NodeId, NodeKind};
use crate::layers::LAYER_DOMAIN;
use crate::rules::{Checkable, RuleContext, Violation};

/// W9003: acceso a miembros protegidos (`_name`) desde fuera del scope.
pub struct VisibilityRule;

impl Checkable for VisibilityRule {
    fn code(&self) -> &'static str {
        "W9003"
    }

    fn description(&self) -> &'static str {
        "Visibility: protected member access across layers."
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::Attribute]
    }

    fn check(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        if !ctx.config.visibility_enforcement || ctx.is_test_file() {
            return vec![];
        }
        let NodeData::Attribute { attr, object } = &ctx.module.node(node).data else {
            return vec![];
        };
        // Solo _protegido, no __dunder ni __privado
        if !attr.starts_with('_') || attr.starts_with("__") {
            return vec![];
        }
        if receiver_is_self_or_cls(ctx, *object) {
            return vec![];
        }
        vec![Violation::from_node(
            ctx.module,
            self.code(),
            format!("Protected member access: {attr}."),
            node,
        )]
    }
}

fn receiver_is_self_or_cls(ctx: &RuleContext<'_>, mut object: NodeId) -> bool {
    loop {
        match &ctx.module.node(object).data {
            NodeData::Attribute { object: inner, .. } => object = *inner,
            NodeData::Name { id } => return id == "self" || id == "cls",
            _ => return false,
        }
    }
}

/// W9004: imports de I/O prohibidos en capas silenciosas.
pub struct ResourceRule;

impl ResourceRule {
    fn is_forbidden(&self, ctx: &RuleContext<'_>, name: &str) -> bool {
        let parts: Vec<&str> = name.split('.').collect();
        if ctx
            .config
            .internal_modules
            .iter()
            .any(|m| parts.contains(&m.as_str()))
        {
            return false;
        }
        !ctx.config
            .allowed_io_prefixes()
            .iter()
            .any(|allowed| name == allowed || name.starts_with(&format!("{allowed}.")))
    }

    fn is_inside_type_checking(&self, ctx: &RuleContext<'_>, node: NodeId) -> bool {
        for anc in ctx.module.ancestors(node) {
            if ctx.module.kind(anc) == NodeKind::If {
                if let NodeData::If { test, .. } = &ctx.module.node(anc).data {
                    if ctx.module.text(*test).contains("TYPE_CHECKING") {
                        return true;
                    }
                }
            }
        }
        false
    }
}

impl Checkable for ResourceRule {
    fn code(&self) -> &'static str {
        "W9004"
    }

    fn description(&self) -> &'static str {
        "Resource: forbidden I/O imports in silent layers."
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::Import, NodeKind::ImportFrom]
    }

    fn check(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        if ctx.is_test_file() || !ctx.in_silent_layer() {
            return vec![];
        }
        if self.is_inside_type_checking(ctx, node) {
            return vec![];
        }
        let layer = ctx.module_layer.unwrap_or("?");
        let names: Vec<String> = match &ctx.module.node(node).data {
            NodeData::Import { names } => names.iter().map(|n| n.name.clone()).collect(),
            NodeData::ImportFrom { module, level, .. } if *level == 0 => {
                vec![module.clone()]
            }
            _ => return vec![],
        };
        for name in names {
            if !name.is_empty() && self.is_forbidden(ctx, &name) {
                return vec![Violation::from_node(
                    ctx.module,
                    self.code(),
                    format!("Forbidden I/O import: {name} in {layer} layer."),
                    node,
                )];
            }
        }
        vec![]
    }
}

/// Llamadas builtin prohibidas en el núcleo silencioso.
const FORBIDDEN_CALL_NAMES: &[&str] = &["print", "input", "open"];
const FORBIDDEN_QUALIFIED: &[&str] = &[
    "pathlib.Path",
    "os.makedirs",
    "os.path.join",
    "subprocess.run",
    "subprocess.call",
    "subprocess.check_call",
    "subprocess.Popen",
];

/// W9013: llamadas de I/O (print, open, subprocess…) en Domain/UseCase.
pub struct IllegalIoCallRule;

impl Checkable for IllegalIoCallRule {
    fn code(&self) -> &'static str {
        "W9013"
    }

    fn description(&self) -> &'static str {
        "Illegal I/O call in silent layers."
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::Call]
    }

    fn check(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        if ctx.is_test_file() || !ctx.in_silent_layer() {
            return vec![];
        }
        let layer = ctx.module_layer.unwrap_or("?");
        let NodeData::Call { callee: Some(called), .. } = &ctx.module.node(node).data
        else {
            return vec![];
        };
        // Logging vía interfaces permitidas queda exento
        let receiver_root = called.split('.').next().unwrap_or(called);
        if ctx
            .config
            .allowed_io_interfaces
            .iter()
            .any(|i| i == receiver_root || called.starts_with(&format!("self.{}", lower_snake(i))))
        {
            return vec![];
        }
        let forbidden = FORBIDDEN_CALL_NAMES.contains(&called.as_str())
            || FORBIDDEN_QUALIFIED.contains(&called.as_str());
        if !forbidden {
            return vec![];
        }
        let hint = "UIOutputPort or FileSystemProtocol";
        vec![Violation::from_node(
            ctx.module,
            self.code(),
            format!("Illegal I/O call: {called}() in {layer} layer. Use {hint}."),
            node,
        )]
    }
}

fn lower_snake(name: &str) -> String {
    let mut out = String::new();
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

const ANSI_PATTERNS: &[&str] = &["\\033[", "\\x1b[", "\u{1b}["];

/// W9014: códigos ANSI, emoji o isatty en la capa Domain.
pub struct UiConcernRule;

impl Checkable for UiConcernRule {
    fn code(&self) -> &'static str {
        "W9014"
    }

    fn description(&self) -> &'static str {
        "UI concern in Domain layer."
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::Const, NodeKind::Call]
    }

    fn check(&self, ctx: &RuleContext<'_>, node: NodeId) -> Vec<Violation> {
        if ctx.is_test_file() {
            return vec![];
        }
        match &ctx.module.node(node).data {
            NodeData::Call { callee: Some(called), .. } => {
                if !ctx.in_silent_layer() {
                    return vec![];
                }
                if called == "sys.stdin.isatty" || called.ends_with(".isatty") {
                    return vec![Violation::from_node(
                        ctx.module,
                        self.code(),
                        format!("UI concern: {called}() in silent layer."),
                        node,
                    )];
                }
                vec![]
            }
            NodeData::Const(ConstValue::Str(value)) => {
                if ctx.module_layer != Some(LAYER_DOMAIN) {
                    return vec![];
                }
                for pattern in ANSI_PATTERNS {
                    if value.contains(pattern) {
                        return vec![Violation::from_node(
                            ctx.module,
                            self.code(),
                            "UI concern: ANSI escape codes in Domain layer.".to_string(),
                            node,
                        )];
                    }
                }
                if value.chars().any(|c| ('\u{1F300}'..='\u{1F9FF}').contains(&c)) {
                    return vec![Violation::from_node(
                        ctx.module,
                        self.code(),
                        "UI concern: emoji in Domain layer.".to_string(),
                        node,
                    )];
                }
                vec![]
            }
            _ => vec![],
        }
    }
}
