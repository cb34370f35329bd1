//! Oráculo de tipos: resolución best-effort de tipos de retorno y atributos.
//!
//! Tres fuentes, en orden: anotaciones explícitas, inferencia de literales y
//! stubs empaquetados (más `stubs/` del proyecto). Devuelve `None` cuando el
//! valor es no-inferible o ambiguo: los llamadores deben tratar `None` como
//! "desconocido, no adivinar".

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::{ConstValue, ModuleAst, NodeData, NodeId, NodeKind, ParamKind};

/// Alias primitivos → qname canónico.
static BUILTIN_TYPE_MAP: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("str", "builtins.str"),
        ("int", "builtins.int"),
        ("float", "builtins.float"),
        ("bool", "builtins.bool"),
        ("bytes", "builtins.bytes"),
        ("list", "builtins.list"),
        ("dict", "builtins.dict"),
        ("tuple", "builtins.tuple"),
        ("set", "builtins.set"),
        ("object", "builtins.object"),
        ("None", "builtins.None"),
        ("List", "builtins.list"),
        ("Dict", "builtins.dict"),
        ("Set", "builtins.set"),
        ("Tuple", "builtins.tuple"),
    ])
});

const STDLIB_MODULES: &[&str] = &[
    "abc", "argparse", "ast", "asyncio", "base64", "collections", "contextlib", "copy",
    "csv", "dataclasses", "datetime", "decimal", "enum", "functools", "glob", "hashlib",
    "heapq", "importlib", "inspect", "io", "itertools", "json", "logging", "math", "os",
    "pathlib", "pickle", "random", "re", "shutil", "socket", "sqlite3", "string",
    "subprocess", "sys", "tempfile", "textwrap", "threading", "time", "tokenize",
    "typing", "unittest", "urllib", "uuid", "warnings", "weakref", "xml", "zipfile",
];

/// Stubs empaquetados con el binario. Cargados perezosamente.
static BUNDLED_STUBS: &[(&str, &str)] = &[
    ("builtins", include_str!("../resources/stubs/builtins.pyi")),
    ("os.path", include_str!("../resources/stubs/os.path.pyi")),
    ("pathlib", include_str!("../resources/stubs/pathlib.pyi")),
    ("re", include_str!("../resources/stubs/re.pyi")),
    ("subprocess", include_str!("../resources/stubs/subprocess.pyi")),
    ("json", include_str!("../resources/stubs/json.pyi")),
    ("uuid", include_str!("../resources/stubs/uuid.pyi")),
];

static STUB_DEF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)def\s+(\w+)\s*\([^)]*\)\s*->\s*([^:]+):").unwrap());
static STUB_CLASS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^class\s+(\w+)").unwrap());
static STUB_ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)(\w+)\s*:\s*([\w\.\[\], ]+)$").unwrap());

/// Catálogo de firmas derivado de los .pyi: `qname callable/attr` → qname de
/// retorno.
#[derive(Default)]
struct StubCatalog {
    entries: HashMap<String, String>,
    modules: Vec<String>,
}

impl StubCatalog {
    fn load_bundled() -> Self {
        let mut catalog = StubCatalog::default();
        for (module, content) in BUNDLED_STUBS {
            catalog.load_module(module, content);
        }
        catalog
    }

    fn load_module(&mut self, module: &str, content: &str) {
        self.modules.push(module.to_string());
        let mut current_class: Option<String> = None;
        for line in content.lines() {
            if let Some(caps) = STUB_CLASS_RE.captures(line) {
                current_class = Some(caps[1].to_string());
                continue;
            }
            if let Some(caps) = STUB_DEF_RE.captures(line) {
                let indented = !caps[1].is_empty();
                let name = caps[2].to_string();
                let ret = caps[3].trim().to_string();
                let key = match (&current_class, indented) {
                    (Some(class), true) => self.class_key(module, class, &name),
                    _ => format!("{module}.{name}"),
                };
                let owner = if indented { current_class.clone() } else { None };
                let value = self.qualify(module, &ret, owner.as_deref());
                self.entries.insert(key, value);
                continue;
            }
            if let Some(caps) = STUB_ATTR_RE.captures(line) {
                let indented = !caps[1].is_empty();
                let name = caps[2].to_string();
                let ty = caps[3].trim().to_string();
                let key = match (&current_class, indented) {
                    (Some(class), true) => self.class_key(module, class, &name),
                    _ => format!("{module}.{name}"),
                };
                let owner = if indented { current_class.clone() } else { None };
                let value = self.qualify(module, &ty, owner.as_deref());
                self.entries.insert(key, value);
            }
            if !line.starts_with(' ') && !line.trim().is_empty() {
                if STUB_CLASS_RE.captures(line).is_none() {
                    current_class = None;
                }
            }
        }
    }

    fn class_key(&self, module: &str, class: &str, member: &str) -> String {
        if module == "builtins" {
            format!("builtins.{class}.{member}")
        } else {
            format!("{module}.{class}.{member}")
        }
    }

    fn qualify(&self, module: &str, name: &str, owner_class: Option<&str>) -> String {
        let bare = name.trim();
        if bare == "Self" {
            if let Some(class) = owner_class {
                return if module == "builtins" {
                    format!("builtins.{class}")
                } else {
                    format!("{module}.{class}")
                };
            }
        }
        if let Some(q) = BUILTIN_TYPE_MAP.get(bare) {
            return q.to_string();
        }
        if bare.contains('.') {
            return bare.to_string();
        }
        format!("{module}.{bare}")
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    fn has_module(&self, module: &str) -> bool {
        self.modules.iter().any(|m| m == module)
    }
}

pub struct TypeOracle {
    stubs: StubCatalog,
    project_root: Option<PathBuf>,
}

impl TypeOracle {
    pub fn new(project_root: Option<&Path>) -> Self {
        let mut stubs = StubCatalog::load_bundled();
        // Stubs del proyecto: stubs/<modulo>.pyi (punteado o en subcarpetas)
        if let Some(root) = project_root {
            let dir = root.join("stubs");
            if dir.is_dir() {
                if let Ok(entries) = std::fs::read_dir(&dir) {
                    for entry in entries.flatten() {
                        let p = entry.path();
                        if p.extension().and_then(|e| e.to_str()) == Some("pyi") {
                            if let (Some(stem), Ok(content)) = (
                                p.file_stem().and_then(|s| s.to_str()),
                                std::fs::read_to_string(&p),
                            ) {
                                stubs.load_module(stem, &content);
                            }
                        }
                    }
                }
            }
        }
        Self { stubs, project_root: project_root.map(Path::to_path_buf) }
    }

    /// Normaliza un alias de tipo a qname canónico (`str` → `builtins.str`).
    pub fn normalize(&self, name: &str) -> String {
        let bare = name.trim();
        // Genéricos: normaliza la base (list[str] → builtins.list)
        let base = bare.split('[').next().unwrap_or(bare).trim();
        if let Some(q) = BUILTIN_TYPE_MAP.get(base) {
            return q.to_string();
        }
        base.to_string()
    }

    pub fn is_primitive(&self, qname: &str) -> bool {
        matches!(
            qname,
            "builtins.str"
                | "builtins.int"
                | "builtins.float"
                | "builtins.bool"
                | "builtins.bytes"
                | "builtins.list"
                | "builtins.dict"
                | "builtins.set"
                | "builtins.tuple"
        )
    }

    pub fn is_stdlib_module(&self, module: &str) -> bool {
        let top = module.split('.').next().unwrap_or(module);
        top == "builtins" || STDLIB_MODULES.contains(&top)
    }

    pub fn is_stdlib_qname(&self, qname: &str) -> bool {
        self.is_stdlib_module(qname)
    }

    /// ¿Existe stub para el módulo? (empaquetado o `stubs/` del proyecto)
    pub fn get_stub_path(&self, module: &str) -> Option<PathBuf> {
        if self.stubs.has_module(module) {
            return Some(PathBuf::from(format!("<bundled>/{module}.pyi")));
        }
        if let Some(root) = &self.project_root {
            let candidate = root.join("stubs").join(format!("{module}.pyi"));
            if candidate.exists() {
                return Some(candidate);
            }
            let nested = root
                .join("stubs")
                .join(module.replace('.', "/"))
                .with_extension("pyi");
            if nested.exists() {
                return Some(nested);
            }
        }
        None
    }

    /// Tipo de retorno inferido de una función: primer `return` con valor
    /// resoluble. `None` si no hay nada inferible.
    pub fn infer_return_type(&self, m: &ModuleAst, func: NodeId) -> Option<String> {
        for ret in m.nodes_of_kind(func, NodeKind::Return) {
            // Los return de funciones anidadas no cuentan
            if m.frame(ret) != func {
                continue;
            }
            if let NodeData::Return { value: Some(v) } = &m.node(ret).data {
                if let Some(q) = self.resolve_expr(m, *v) {
                    return Some(q);
                }
                return None;
            }
        }
        None
    }

    /// Tipo de un parámetro inferido desde su valor por defecto.
    pub fn infer_param_type(
        &self,
        m: &ModuleAst,
        func: NodeId,
        index: usize,
    ) -> Option<String> {
        let data = m.function_data(func)?;
        let param = data.params.get(index)?;
        if param.kind != ParamKind::Positional && param.kind != ParamKind::KwOnly {
            return None;
        }
        let default = param.default.as_deref()?;
        self.literal_type_of_text(default)
    }

    /// Tipo literal de un texto de expresión por defecto (`3` → int).
    pub fn literal_type_of_text(&self, text: &str) -> Option<String> {
        let t = text.trim();
        if t == "None" {
            return None;
        }
        if t == "True" || t == "False" {
            return Some("builtins.bool".to_string());
        }
        if (t.starts_with('"') && t.ends_with('"'))
            || (t.starts_with('\'') && t.ends_with('\''))
            || t.starts_with("f\"")
            || t.starts_with("f'")
        {
            return Some("builtins.str".to_string());
        }
        if t.starts_with('[') {
            return Some("builtins.list".to_string());
        }
        if t.starts_with('{') {
            return Some("builtins.dict".to_string());
        }
        if t.starts_with('(') {
            return Some("builtins.tuple".to_string());
        }
        if t.chars().all(|c| c.is_ascii_digit() || c == '_') && !t.is_empty() {
            return Some("builtins.int".to_string());
        }
        if t.parse::<f64>().is_ok() && t.contains('.') {
            return Some("builtins.float".to_string());
        }
        None
    }

    /// Resuelve el qname del tipo de una expresión. `None` = desconocido.
    pub fn resolve_expr(&self, m: &ModuleAst, node: NodeId) -> Option<String> {
        self.resolve_expr_depth(m, node, 0)
    }

    fn resolve_expr_depth(&self, m: &ModuleAst, node: NodeId, depth: u32) -> Option<String> {
        if depth > 8 {
            return None;
        }
        match &m.node(node).data {
            NodeData::Const(value) => Some(
                match value {
                    ConstValue::Str(_) => "builtins.str",
                    ConstValue::Int(_) => "builtins.int",
                    ConstValue::Float(_) => "builtins.float",
                    ConstValue::Bool(_) => "builtins.bool",
                    ConstValue::NoneLit => "builtins.None",
                    ConstValue::Ellipsis => return None,
                }
                .to_string(),
            ),
            NodeData::Name { id } => self.resolve_name(m, node, id, depth),
            NodeData::Call { .. } => self.resolve_call(m, node, depth),
            NodeData::Attribute { attr, object } => {
                // Atributo sobre receptor tipado, vía stubs
                if let Some(receiver) = self.resolve_expr_depth(m, *object, depth + 1) {
                    if let Some(t) = self.stubs.lookup(&format!("{receiver}.{attr}")) {
                        return Some(t.to_string());
                    }
                }
                // Atributo de módulo: os.path.sep
                if let Some(dotted) = m.dotted_name(node) {
                    if let Some(t) = self.stubs.lookup(&dotted) {
                        return Some(t.to_string());
                    }
                }
                None
            }
            _ => match m.kind(node) {
                NodeKind::List | NodeKind::ListComp => Some("builtins.list".to_string()),
                NodeKind::Dict | NodeKind::DictComp => Some("builtins.dict".to_string()),
                NodeKind::Set | NodeKind::SetComp => Some("builtins.set".to_string()),
                NodeKind::Tuple => Some("builtins.tuple".to_string()),
                NodeKind::JoinedStr => Some("builtins.str".to_string()),
                NodeKind::Compare => Some("builtins.bool".to_string()),
                NodeKind::UnaryOp => {
                    let child = m.node(node).children.first().copied()?;
                    if m.text(node).trim_start().starts_with("not") {
                        Some("builtins.bool".to_string())
                    } else {
                        self.resolve_expr_depth(m, child, depth + 1)
                    }
                }
                NodeKind::BinOp => self.resolve_binop(m, node, depth),
                _ => None,
            },
        }
    }

    fn resolve_binop(&self, m: &ModuleAst, node: NodeId, depth: u32) -> Option<String> {
        let children = &m.node(node).children;
        if children.len() < 2 {
            return None;
        }
        let left = self.resolve_expr_depth(m, children[0], depth + 1);
        let right = self.resolve_expr_depth(m, children[1], depth + 1);
        match (left.as_deref(), right.as_deref()) {
            (Some(l), Some(r)) if l == r => Some(l.to_string()),
            // str * int, list * int: repetición conserva el tipo
            (Some("builtins.str"), Some("builtins.int")) => Some("builtins.str".to_string()),
            (Some("builtins.list"), Some("builtins.int")) => {
                Some("builtins.list".to_string())
            }
            (Some("builtins.int"), Some("builtins.float"))
            | (Some("builtins.float"), Some("builtins.int")) => {
                Some("builtins.float".to_string())
            }
            _ => None,
        }
    }

    fn resolve_name(
        &self,
        m: &ModuleAst,
        node: NodeId,
        name: &str,
        depth: u32,
    ) -> Option<String> {
        // 1. Parámetro anotado de una función envolvente
        let mut frame = m.frame(node);
        loop {
            if let Some(data) = m.function_data(frame) {
                for p in &data.params {
                    if p.name == name {
                        return p.annotation.as_ref().map(|ann| self.normalize(ann));
                    }
                }
            }
            if frame == m.root {
                break;
            }
            let next = m.frame(m.node(frame).parent?);
            if next == frame {
                break;
            }
            frame = next;
        }
        // 2. AnnAssign / Assign previos en el mismo frame
        let frame = m.frame(node);
        let mut best: Option<(u32, Option<String>)> = None;
        for candidate in m.nodes_of_kind(frame, NodeKind::AssignName) {
            let matches_name = matches!(
                &m.node(candidate).data,
                NodeData::AssignName { id } if id == name
            );
            if !matches_name {
                continue;
            }
            let stmt = m.node(candidate).parent?;
            if m.node(candidate).line > m.node(node).line {
                continue;
            }
            let resolved = match m.kind(stmt) {
                NodeKind::AnnAssign => {
                    // El hijo Unknown envuelve la anotación
                    m.node(stmt)
                        .children
                        .iter()
                        .find(|&&c| m.kind(c) == NodeKind::Unknown)
                        .map(|&c| self.normalize(m.text(c)))
                }
                NodeKind::Assign => m
                    .node(stmt)
                    .children
                    .last()
                    .and_then(|&value| self.resolve_expr_depth(m, value, depth + 1)),
                _ => None,
            };
            let line = m.node(candidate).line;
            if best.as_ref().map(|(l, _)| line >= *l).unwrap_or(true) {
                best = Some((line, resolved));
            }
        }
        best.and_then(|(_, t)| t)
    }

    fn resolve_call(&self, m: &ModuleAst, call: NodeId, depth: u32) -> Option<String> {
        let NodeData::Call { callee, func, .. } = &m.node(call).data else {
            return None;
        };
        if let Some(dotted) = callee {
            // Constructores builtin: str(...), int(...)
            if let Some(q) = BUILTIN_TYPE_MAP.get(dotted.as_str()) {
                return Some(q.to_string());
            }
            // Firma directa en stubs: os.path.join(...)
            if let Some(t) = self.stubs.lookup(dotted) {
                return Some(t.to_string());
            }
            // Función o clase local del módulo
            if !dotted.contains('.') {
                for f in m.nodes_of_kind(m.root, NodeKind::FunctionDef) {
                    if let Some(data) = m.function_data(f) {
                        if data.name == *dotted {
                            return data.returns.as_ref().map(|r| self.normalize(r));
                        }
                    }
                }
                for c in m.nodes_of_kind(m.root, NodeKind::ClassDef) {
                    if let Some(data) = m.class_data(c) {
                        if data.name == *dotted {
                            return Some(format!("{}.{}", m.name, data.name));
                        }
                    }
                }
                // Nombre importado: from pathlib import Path → pathlib.Path
                if let Some(target) = self.imported_target(m, dotted) {
                    if let Some(t) = self.stubs.lookup(&target) {
                        return Some(t.to_string());
                    }
                }
            }
        }
        // Método sobre receptor tipado: name.upper() → builtins.str.upper
        if m.kind(*func) == NodeKind::Attribute {
            if let NodeData::Attribute { attr, object } = &m.node(*func).data {
                if let Some(receiver) = self.resolve_expr_depth(m, *object, depth + 1) {
                    if let Some(t) = self.stubs.lookup(&format!("{receiver}.{attr}")) {
                        return Some(t.to_string());
                    }
                }
            }
        }
        None
    }

    /// Resuelve un nombre importado a su qname (`Path` → `pathlib.Path`).
    fn imported_target(&self, m: &ModuleAst, name: &str) -> Option<String> {
        for imp in m.imports() {
            match &m.node(imp).data {
                NodeData::ImportFrom { module, names, .. } => {
                    for n in names {
                        if n.bound_name() == name {
                            return Some(format!("{module}.{}", n.name));
                        }
                    }
                }
                NodeData::Import { names } => {
                    for n in names {
                        if n.bound_name() == name {
                            return Some(n.name.clone());
                        }
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Llamada fluida: el tipo de retorno coincide con el tipo del receptor.
    pub fn is_fluent_call(&self, m: &ModuleAst, call: NodeId) -> bool {
        let NodeData::Call { func, .. } = &m.node(call).data else { return false };
        let NodeData::Attribute { object, .. } = &m.node(*func).data else {
            return false;
        };
        let Some(receiver) = self.resolve_expr(m, *object) else { return false };
        let Some(ret) = self.resolve_expr(m, call) else { return false };
        receiver == ret
    }

    /// Llamada a autoridad confiable: receptor stdlib/registro de confianza.
    pub fn is_trusted_authority_call(
        &self,
        m: &ModuleAst,
        call: NodeId,
        trusted_roots: &[String],
    ) -> bool {
        let NodeData::Call { callee, func, .. } = &m.node(call).data else {
            return false;
        };
        if let Some(dotted) = callee {
            for root in trusted_roots {
                if dotted == root || dotted.starts_with(&format!("{root}.")) {
                    return true;
                }
            }
        }
        if let NodeData::Attribute { object, .. } = &m.node(*func).data {
            if let Some(receiver) = self.resolve_expr(m, *object) {
                if self.is_primitive(&receiver) {
                    return true;
                }
                for root in trusted_roots {
                    if receiver == *root || receiver.starts_with(&format!("{root}.")) {
                        return true;
                    }
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::lower::parse_module;
    use std::path::Path as StdPath;

    fn parse(src: &str) -> ModuleAst {
        parse_module(src, StdPath::new("mod.py"), "mod").unwrap()
    }

    fn oracle() -> TypeOracle {
        TypeOracle::new(None)
    }

    #[test]
    fn test_infer_return_from_annotated_param_concat() {
        // Concatenación con parámetro anotado: str
        let m = parse("def greet(name: str):\n    return \"hi \" + name\n");
        let f = m.nodes_of_kind(m.root, NodeKind::FunctionDef)[0];
        assert_eq!(
            oracle().infer_return_type(&m, f).as_deref(),
            Some("builtins.str")
        );
    }

    #[test]
    fn test_uninferable_call_chain_returns_none() {
        // Llamadas sin tipos ni stubs: desconocido
        let m = parse("def dyn():\n    return process(get_data())\n");
        let f = m.nodes_of_kind(m.root, NodeKind::FunctionDef)[0];
        assert_eq!(oracle().infer_return_type(&m, f), None);
    }

    #[test]
    fn test_stub_resolves_os_path_join() {
        let m = parse("def f():\n    return os.path.join(a, b)\n");
        let f = m.nodes_of_kind(m.root, NodeKind::FunctionDef)[0];
        assert_eq!(
            oracle().infer_return_type(&m, f).as_deref(),
            Some("builtins.str")
        );
    }

    #[test]
    fn test_local_function_annotation_used_for_call() {
        let src = "def base() -> int:\n    return 1\n\ndef wrapper():\n    return base()\n";
        let m = parse(src);
        let funcs = m.nodes_of_kind(m.root, NodeKind::FunctionDef);
        let wrapper = funcs
            .iter()
            .copied()
            .find(|&f| m.function_data(f).unwrap().name == "wrapper")
            .unwrap();
        assert_eq!(
            oracle().infer_return_type(&m, wrapper).as_deref(),
            Some("builtins.int")
        );
    }

    #[test]
    fn test_param_default_literal_inference() {
        let m = parse("def f(count=3, label=\"x\"):\n    return count\n");
        let f = m.nodes_of_kind(m.root, NodeKind::FunctionDef)[0];
        let o = oracle();
        assert_eq!(o.infer_param_type(&m, f, 0).as_deref(), Some("builtins.int"));
        assert_eq!(o.infer_param_type(&m, f, 1).as_deref(), Some("builtins.str"));
    }

    #[test]
    fn test_primitive_queries() {
        let o = oracle();
        assert!(o.is_primitive("builtins.str"));
        assert!(!o.is_primitive("sqlalchemy.Session"));
        assert!(o.is_stdlib_qname("os.path.join"));
        assert!(!o.is_stdlib_module("sqlalchemy"));
    }

    #[test]
    fn test_fluent_call_on_path() {
        let src = "def f(p: pathlib.Path):\n    return p.resolve()\n";
        let m = parse(src);
        let call = m.nodes_of_kind(m.root, NodeKind::Call)[0];
        assert!(oracle().is_fluent_call(&m, call));
    }

    #[test]
    fn test_trusted_authority_call() {
        let m = parse("def f():\n    return subprocess.run(cmd)\n");
        let call = m.nodes_of_kind(m.root, NodeKind::Call)[0];
        let trusted = vec!["subprocess".to_string()];
        assert!(oracle().is_trusted_authority_call(&m, call, &trusted));
    }

    #[test]
    fn test_stub_path_lookup() {
        let o = oracle();
        assert!(o.get_stub_path("pathlib").is_some());
        assert!(o.get_stub_path("langchain").is_none());
    }

    #[test]
    fn test_imported_class_constructor_resolves() {
        let src = "from pathlib import Path\n\ndef f():\n    return Path(\"x\")\n";
        let m = parse(src);
        let f = m
            .nodes_of_kind(m.root, NodeKind::FunctionDef)
            .into_iter()
            .next()
            .unwrap();
        assert_eq!(
            oracle().infer_return_type(&m, f).as_deref(),
            Some("pathlib.Path")
        );
    }
}
