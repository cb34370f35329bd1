//! Modelo AST: árbol de variantes etiquetadas sobre una arena.
//!
//! Cada archivo fuente se parsea (tree-sitter) y se baja a esta arena. Los
//! hijos poseen su subárbol; el padre es un índice no-propietario, así que
//! no hay ciclos de ownership. El orden de la arena es pre-orden, lo que
//! permite al driver recorrer el módulo con un solo barrido lineal.

pub mod lower;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::errors::ExcelsiorError;

pub type NodeId = usize;

/// Catálogo canónico de clases de nodo. El dispatch de reglas se indexa por
/// esta etiqueta, nunca por downcasting.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum NodeKind {
    Module,
    ClassDef,
    FunctionDef,
    AsyncFunctionDef,
    Arguments,
    Decorators,
    Call,
    Keyword,
    Assign,
    AugAssign,
    AnnAssign,
    AssignName,
    AssignAttr,
    Attribute,
    Name,
    Const,
    Subscript,
    If,
    For,
    While,
    Try,
    With,
    ExceptHandler,
    Expr,
    Compare,
    BoolOp,
    UnaryOp,
    BinOp,
    Dict,
    List,
    Set,
    Tuple,
    Lambda,
    IfExp,
    Comprehension,
    ListComp,
    SetComp,
    DictComp,
    GeneratorExp,
    Yield,
    YieldFrom,
    Await,
    Starred,
    FormattedValue,
    JoinedStr,
    Pass,
    Break,
    Continue,
    Raise,
    Assert,
    Delete,
    Slice,
    Match,
    MatchCase,
    NamedExpr,
    Global,
    Import,
    ImportFrom,
    Return,
    Unknown,
}

/// Valor de un literal Const.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    NoneLit,
    Ellipsis,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Positional,
    Vararg,
    Kwarg,
    KwOnly,
}

#[derive(Clone, Debug)]
pub struct Param {
    pub name: String,
    pub annotation: Option<String>,
    pub default: Option<String>,
    pub kind: ParamKind,
}

#[derive(Clone, Debug)]
pub struct ImportedName {
    pub name: String,
    pub alias: Option<String>,
}

impl ImportedName {
    /// Nombre con el que el import queda ligado en el módulo.
    pub fn bound_name(&self) -> &str {
        match &self.alias {
            Some(a) => a,
            None => self.name.split('.').next().unwrap_or(&self.name),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FunctionData {
    pub name: String,
    pub is_async: bool,
    pub params: Vec<Param>,
    pub returns: Option<String>,
    pub decorators: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ClassData {
    pub name: String,
    pub bases: Vec<String>,
    pub keywords: Vec<(String, String)>,
    pub decorators: Vec<String>,
}

/// Payload por clase de nodo. Los nodos puramente estructurales usan `None`.
#[derive(Clone, Debug)]
pub enum NodeData {
    Module { name: String },
    ClassDef(ClassData),
    FunctionDef(FunctionData),
    Call { callee: Option<String>, func: NodeId, arg_count: usize },
    Attribute { attr: String, object: NodeId },
    Name { id: String },
    AssignName { id: String },
    AssignAttr { receiver: String, attr: String },
    Const(ConstValue),
    If { test: NodeId, body: Vec<NodeId>, orelse: Vec<NodeId> },
    ExceptHandler { type_text: Option<String>, body: Vec<NodeId> },
    Return { value: Option<NodeId> },
    Import { names: Vec<ImportedName> },
    ImportFrom { module: String, names: Vec<ImportedName>, level: u32 },
    Global { names: Vec<String> },
    Keyword { arg: Option<String> },
    None,
}

#[derive(Clone, Debug)]
pub struct AstNode {
    pub kind: NodeKind,
    pub line: u32,
    pub col: u32,
    pub start_byte: usize,
    pub end_byte: usize,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Índice (exclusivo) del final del subárbol en la arena. El subárbol
    /// de un nodo ocupa el rango contiguo [id, subtree_end).
    pub subtree_end: usize,
    pub data: NodeData,
}

/// Un archivo fuente parseado. Dueño de su arena y de su texto fuente.
#[derive(Clone, Debug)]
pub struct ModuleAst {
    pub path: PathBuf,
    /// Nombre punteado del módulo (ej. `app.use_cases.order`).
    pub name: String,
    pub source: String,
    pub nodes: Vec<AstNode>,
    pub root: NodeId,
    pub absolute_import_activated: bool,
    /// Capa resuelta; la fija el pipeline tras el parseo.
    pub layer: Option<String>,
    /// El parser encontró nodos de error: el archivo se reporta como
    /// PARSE-ERROR y queda fuera de la evaluación de reglas.
    pub has_syntax_errors: bool,
}

impl ModuleAst {
    pub fn node(&self, id: NodeId) -> &AstNode {
        &self.nodes[id]
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.nodes[id].kind
    }

    /// Texto fuente exacto del nodo.
    pub fn text(&self, id: NodeId) -> &str {
        let n = &self.nodes[id];
        self.source.get(n.start_byte..n.end_byte).unwrap_or("")
    }

    /// Ubicación `path:line:col` del nodo.
    pub fn location(&self, id: NodeId) -> String {
        let n = &self.nodes[id];
        format!("{}:{}:{}", self.path.display(), n.line, n.col)
    }

    /// Ancestros del nodo, de padre a raíz.
    pub fn ancestors(&self, id: NodeId) -> AncestorIter<'_> {
        AncestorIter { module: self, current: self.nodes[id].parent }
    }

    /// Frame astroid-style: función (o lambda) envolvente más cercana, o el
    /// módulo raíz.
    pub fn frame(&self, id: NodeId) -> NodeId {
        for anc in self.ancestors(id) {
            match self.kind(anc) {
                NodeKind::FunctionDef
                | NodeKind::AsyncFunctionDef
                | NodeKind::Lambda
                | NodeKind::Module => return anc,
                _ => {}
            }
        }
        self.root
    }

    /// Scope: como frame pero las clases también abren ámbito.
    pub fn scope(&self, id: NodeId) -> NodeId {
        for anc in self.ancestors(id) {
            match self.kind(anc) {
                NodeKind::FunctionDef
                | NodeKind::AsyncFunctionDef
                | NodeKind::Lambda
                | NodeKind::ClassDef
                | NodeKind::Module => return anc,
                _ => {}
            }
        }
        self.root
    }

    /// Clase envolvente más cercana, si existe.
    pub fn enclosing_class(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id).find(|&a| self.kind(a) == NodeKind::ClassDef)
    }

    /// Todos los nodos de una clase dentro del subárbol de `root`.
    pub fn nodes_of_kind(&self, root: NodeId, kind: NodeKind) -> Vec<NodeId> {
        let end = self.nodes[root].subtree_end;
        (root..end).filter(|&i| self.nodes[i].kind == kind).collect()
    }

    /// ¿`inner` está dentro del subárbol de `outer`?
    pub fn is_within(&self, inner: NodeId, outer: NodeId) -> bool {
        inner >= outer && inner < self.nodes[outer].subtree_end
    }

    pub fn function_data(&self, id: NodeId) -> Option<&FunctionData> {
        match &self.nodes[id].data {
            NodeData::FunctionDef(f) => Some(f),
            _ => None,
        }
    }

    pub fn class_data(&self, id: NodeId) -> Option<&ClassData> {
        match &self.nodes[id].data {
            NodeData::ClassDef(c) => Some(c),
            _ => None,
        }
    }

    /// ¿La función es un método (su padre directo es una clase)?
    pub fn is_method(&self, func: NodeId) -> bool {
        self.nodes[func]
            .parent
            .map(|p| self.kind(p) == NodeKind::ClassDef)
            .unwrap_or(false)
    }

    /// Cadena punteada de un receptor (ej. `self.repo` o `os.path`), si el
    /// nodo es una cadena pura de Name/Attribute.
    pub fn dotted_name(&self, id: NodeId) -> Option<String> {
        match &self.nodes[id].data {
            NodeData::Name { id: n } => Some(n.clone()),
            NodeData::Attribute { attr, object } => {
                let base = self.dotted_name(*object)?;
                Some(format!("{base}.{attr}"))
            }
            _ => Option::None,
        }
    }

    /// Imports del módulo (pares nodo, data).
    pub fn imports(&self) -> Vec<NodeId> {
        (0..self.nodes.len())
            .filter(|&i| {
                matches!(self.nodes[i].kind, NodeKind::Import | NodeKind::ImportFrom)
            })
            .collect()
    }
}

pub struct AncestorIter<'a> {
    module: &'a ModuleAst,
    current: Option<NodeId>,
}

impl<'a> Iterator for AncestorIter<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let cur = self.current?;
        self.current = self.module.nodes[cur].parent;
        Some(cur)
    }
}

/// Caché de módulos parseados, propiedad del proceso durante una corrida.
/// El pipeline de fixes la invalida explícitamente entre pases para que los
/// pases posteriores vean el código fresco.
#[derive(Default)]
pub struct ModuleCache {
    modules: HashMap<PathBuf, ModuleAst>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self { modules: HashMap::new() }
    }

    /// Parsea bajo demanda; los hits devuelven el módulo cacheado.
    pub fn parse(
        &mut self,
        path: &Path,
        module_name: &str,
    ) -> Result<&ModuleAst, ExcelsiorError> {
        if !self.modules.contains_key(path) {
            let source = std::fs::read_to_string(path).map_err(|e| {
                ExcelsiorError::Parse { path: path.to_path_buf(), reason: e.to_string() }
            })?;
            let module = lower::parse_module(&source, path, module_name)?;
            self.modules.insert(path.to_path_buf(), module);
        }
        Ok(&self.modules[path])
    }

    pub fn get(&self, path: &Path) -> Option<&ModuleAst> {
        self.modules.get(path)
    }

    /// Invalidación total (final de los pases 1–2 del fixer).
    pub fn clear(&mut self) {
        self.modules.clear();
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_links_form_tree_rooted_at_module() {
        let src = "def f():\n    return 1\n";
        let m = lower::parse_module(src, Path::new("a.py"), "a").unwrap();
        assert_eq!(m.kind(m.root), NodeKind::Module);
        for (i, n) in m.nodes.iter().enumerate() {
            if i == m.root {
                assert!(n.parent.is_none());
            } else {
                // Cada nodo alcanza la raíz por la cadena de padres
                assert!(m.ancestors(i).any(|a| a == m.root));
            }
        }
    }

    #[test]
    fn test_frame_resolves_enclosing_function() {
        let src = "def outer():\n    x = 1\n    return x\n";
        let m = lower::parse_module(src, Path::new("a.py"), "a").unwrap();
        let funcs = m.nodes_of_kind(m.root, NodeKind::FunctionDef);
        assert_eq!(funcs.len(), 1);
        let returns = m.nodes_of_kind(m.root, NodeKind::Return);
        assert_eq!(returns.len(), 1);
        assert_eq!(m.frame(returns[0]), funcs[0]);
    }

    #[test]
    fn test_dotted_name_follows_attribute_chain() {
        let src = "y = os.path.join\n";
        let m = lower::parse_module(src, Path::new("a.py"), "a").unwrap();
        let attrs = m.nodes_of_kind(m.root, NodeKind::Attribute);
        let longest = attrs
            .iter()
            .filter_map(|&a| m.dotted_name(a))
            .max_by_key(|s| s.len())
            .unwrap();
        assert_eq!(longest, "os.path.join");
    }

    #[test]
    fn test_cache_parse_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("m.py");
        std::fs::write(&file, "x = 1\n").unwrap();
        let mut cache = ModuleCache::new();
        cache.parse(&file, "m").unwrap();
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
