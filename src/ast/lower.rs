//! Bajada del CST de tree-sitter a la arena tipada.
//!
//! Las cadenas `elif` se bajan como `If` anidados en `orelse` y los bloques
//! se aplanan como hijos directos de su sentencia, de modo que las reglas
//! ven la misma forma que verían sobre un AST clásico de Python.

use std::path::Path;

use tree_sitter::{Node as TsNode, Parser};

use crate::ast::{
    AstNode, ClassData, ConstValue, FunctionData, ImportedName, ModuleAst, NodeData,
    NodeId, NodeKind, Param, ParamKind,
};
use crate::errors::ExcelsiorError;

/// Parsea un archivo fuente Python y lo baja a la arena.
pub fn parse_module(
    source: &str,
    path: &Path,
    module_name: &str,
) -> Result<ModuleAst, ExcelsiorError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| ExcelsiorError::Parse {
            path: path.to_path_buf(),
            reason: format!("grammar load: {e}"),
        })?;
    let tree = parser.parse(source, None).ok_or_else(|| ExcelsiorError::Parse {
        path: path.to_path_buf(),
        reason: "parser returned no tree".to_string(),
    })?;
    let root = tree.root_node();

    let mut lo = Lowerer { source, nodes: Vec::with_capacity(256) };
    let root_id = lo.push(NodeKind::Module, root, None, NodeData::Module {
        name: module_name.to_string(),
    });
    for i in 0..root.named_child_count() {
        if let Some(child) = root.named_child(i) {
            lo.lower(child, root_id);
        }
    }
    lo.finish(root_id);

    Ok(ModuleAst {
        path: path.to_path_buf(),
        name: module_name.to_string(),
        source: source.to_string(),
        nodes: lo.nodes,
        root: root_id,
        // Python 3: los imports absolutos están siempre activos.
        absolute_import_activated: true,
        layer: None,
        has_syntax_errors: root.has_error(),
    })
}

struct Lowerer<'a> {
    source: &'a str,
    nodes: Vec<AstNode>,
}

impl<'a> Lowerer<'a> {
    fn text(&self, ts: TsNode<'_>) -> String {
        self.source
            .get(ts.start_byte()..ts.end_byte())
            .unwrap_or("")
            .to_string()
    }

    fn push(
        &mut self,
        kind: NodeKind,
        ts: TsNode<'_>,
        parent: Option<NodeId>,
        data: NodeData,
    ) -> NodeId {
        let id = self.nodes.len();
        let pos = ts.start_position();
        self.nodes.push(AstNode {
            kind,
            line: pos.row as u32 + 1,
            col: pos.column as u32,
            start_byte: ts.start_byte(),
            end_byte: ts.end_byte(),
            parent,
            children: Vec::new(),
            subtree_end: id + 1,
            data,
        });
        if let Some(p) = parent {
            self.nodes[p].children.push(id);
        }
        id
    }

    fn finish(&mut self, id: NodeId) {
        self.nodes[id].subtree_end = self.nodes.len();
    }

    fn lower_block(&mut self, block: TsNode<'_>, parent: NodeId) -> Vec<NodeId> {
        let mut ids = Vec::new();
        for i in 0..block.named_child_count() {
            if let Some(child) = block.named_child(i) {
                if let Some(id) = self.lower(child, parent) {
                    ids.push(id);
                }
            }
        }
        ids
    }

    fn lower_children(&mut self, ts: TsNode<'_>, parent: NodeId) {
        for i in 0..ts.named_child_count() {
            if let Some(child) = ts.named_child(i) {
                self.lower(child, parent);
            }
        }
    }

    /// Baja un nodo del CST. Devuelve None para nodos sin representación
    /// (comentarios, separadores).
    fn lower(&mut self, ts: TsNode<'_>, parent: NodeId) -> Option<NodeId> {
        let id = match ts.kind() {
            "comment" | "line_continuation" => return None,
            "class_definition" => self.lower_class(ts, parent, Vec::new()),
            "function_definition" => self.lower_function(ts, parent, Vec::new()),
            "decorated_definition" => self.lower_decorated(ts, parent)?,
            "expression_statement" => self.lower_expression_statement(ts, parent)?,
            "assignment" => self.lower_assignment(ts, parent),
            "augmented_assignment" => {
                let id = self.push(NodeKind::AugAssign, ts, Some(parent), NodeData::None);
                if let Some(left) = ts.child_by_field_name("left") {
                    self.lower_target(left, id);
                }
                if let Some(right) = ts.child_by_field_name("right") {
                    self.lower(right, id);
                }
                id
            }
            "call" => self.lower_call(ts, parent),
            "attribute" => {
                let attr = ts
                    .child_by_field_name("attribute")
                    .map(|a| self.text(a))
                    .unwrap_or_default();
                let id = self.push(
                    NodeKind::Attribute,
                    ts,
                    Some(parent),
                    NodeData::Attribute { attr: attr.clone(), object: 0 },
                );
                let obj = ts
                    .child_by_field_name("object")
                    .and_then(|o| self.lower(o, id))
                    .unwrap_or(id);
                if let NodeData::Attribute { object, .. } = &mut self.nodes[id].data {
                    *object = obj;
                }
                id
            }
            "identifier" => {
                let name = self.text(ts);
                self.push(NodeKind::Name, ts, Some(parent), NodeData::Name { id: name })
            }
            "string" => self.lower_string(ts, parent),
            "concatenated_string" => {
                let mut content = String::new();
                for i in 0..ts.named_child_count() {
                    if let Some(part) = ts.named_child(i) {
                        content.push_str(&string_content(self.source, part));
                    }
                }
                self.push(
                    NodeKind::Const,
                    ts,
                    Some(parent),
                    NodeData::Const(ConstValue::Str(content)),
                )
            }
            "integer" => {
                let raw = self.text(ts).replace('_', "");
                let value = raw.parse::<i64>().unwrap_or(0);
                self.push(
                    NodeKind::Const,
                    ts,
                    Some(parent),
                    NodeData::Const(ConstValue::Int(value)),
                )
            }
            "float" => {
                let value = self.text(ts).replace('_', "").parse::<f64>().unwrap_or(0.0);
                self.push(
                    NodeKind::Const,
                    ts,
                    Some(parent),
                    NodeData::Const(ConstValue::Float(value)),
                )
            }
            "true" => self.push(
                NodeKind::Const,
                ts,
                Some(parent),
                NodeData::Const(ConstValue::Bool(true)),
            ),
            "false" => self.push(
                NodeKind::Const,
                ts,
                Some(parent),
                NodeData::Const(ConstValue::Bool(false)),
            ),
            "none" => self.push(
                NodeKind::Const,
                ts,
                Some(parent),
                NodeData::Const(ConstValue::NoneLit),
            ),
            "ellipsis" => self.push(
                NodeKind::Const,
                ts,
                Some(parent),
                NodeData::Const(ConstValue::Ellipsis),
            ),
            "if_statement" => self.lower_if(ts, parent),
            "for_statement" => {
                let id = self.push(NodeKind::For, ts, Some(parent), NodeData::None);
                if let Some(left) = ts.child_by_field_name("left") {
                    self.lower_target(left, id);
                }
                if let Some(right) = ts.child_by_field_name("right") {
                    self.lower(right, id);
                }
                if let Some(body) = ts.child_by_field_name("body") {
                    self.lower_block(body, id);
                }
                if let Some(alt) = ts.child_by_field_name("alternative") {
                    self.lower_children(alt, id);
                }
                id
            }
            "while_statement" => {
                let id = self.push(NodeKind::While, ts, Some(parent), NodeData::None);
                if let Some(cond) = ts.child_by_field_name("condition") {
                    self.lower(cond, id);
                }
                if let Some(body) = ts.child_by_field_name("body") {
                    self.lower_block(body, id);
                }
                id
            }
            "try_statement" => {
                let id = self.push(NodeKind::Try, ts, Some(parent), NodeData::None);
                if let Some(body) = ts.child_by_field_name("body") {
                    self.lower_block(body, id);
                }
                for i in 0..ts.named_child_count() {
                    if let Some(child) = ts.named_child(i) {
                        match child.kind() {
                            "except_clause" | "except_group_clause" => {
                                self.lower_except(child, id);
                            }
                            "else_clause" | "finally_clause" => {
                                for j in 0..child.named_child_count() {
                                    if let Some(inner) = child.named_child(j) {
                                        if inner.kind() == "block" {
                                            self.lower_block(inner, id);
                                        }
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                }
                id
            }
            "with_statement" => {
                let id = self.push(NodeKind::With, ts, Some(parent), NodeData::None);
                self.lower_children(ts, id);
                id
            }
            "comparison_operator" => {
                let id = self.push(NodeKind::Compare, ts, Some(parent), NodeData::None);
                self.lower_children(ts, id);
                id
            }
            "boolean_operator" => {
                let id = self.push(NodeKind::BoolOp, ts, Some(parent), NodeData::None);
                self.lower_children(ts, id);
                id
            }
            "not_operator" | "unary_operator" => {
                let op = ts
                    .child_by_field_name("operator")
                    .map(|o| self.text(o))
                    .unwrap_or_else(|| "not".to_string());
                let id = self.push(
                    NodeKind::UnaryOp,
                    ts,
                    Some(parent),
                    NodeData::Keyword { arg: Some(op) },
                );
                self.lower_children(ts, id);
                id
            }
            "binary_operator" => {
                let id = self.push(NodeKind::BinOp, ts, Some(parent), NodeData::None);
                self.lower_children(ts, id);
                id
            }
            "dictionary" => {
                let id = self.push(NodeKind::Dict, ts, Some(parent), NodeData::None);
                self.lower_children(ts, id);
                id
            }
            "pair" => {
                // Los pares de diccionario se aplanan: clave y valor como hijos
                // directos del Dict, con la clave primero.
                if let Some(key) = ts.child_by_field_name("key") {
                    self.lower(key, parent);
                }
                if let Some(value) = ts.child_by_field_name("value") {
                    self.lower(value, parent);
                }
                return None;
            }
            "list" => {
                let id = self.push(NodeKind::List, ts, Some(parent), NodeData::None);
                self.lower_children(ts, id);
                id
            }
            "set" => {
                let id = self.push(NodeKind::Set, ts, Some(parent), NodeData::None);
                self.lower_children(ts, id);
                id
            }
            "tuple" | "expression_list" => {
                let id = self.push(NodeKind::Tuple, ts, Some(parent), NodeData::None);
                self.lower_children(ts, id);
                id
            }
            "lambda" => {
                let id = self.push(NodeKind::Lambda, ts, Some(parent), NodeData::None);
                if let Some(body) = ts.child_by_field_name("body") {
                    self.lower(body, id);
                }
                id
            }
            "conditional_expression" => {
                let id = self.push(NodeKind::IfExp, ts, Some(parent), NodeData::None);
                self.lower_children(ts, id);
                id
            }
            "list_comprehension" => self.lower_comp(ts, parent, NodeKind::ListComp),
            "set_comprehension" => self.lower_comp(ts, parent, NodeKind::SetComp),
            "dictionary_comprehension" => self.lower_comp(ts, parent, NodeKind::DictComp),
            "generator_expression" => self.lower_comp(ts, parent, NodeKind::GeneratorExp),
            "for_in_clause" => {
                let id =
                    self.push(NodeKind::Comprehension, ts, Some(parent), NodeData::None);
                if let Some(right) = ts.child_by_field_name("right") {
                    self.lower(right, id);
                }
                id
            }
            "yield" => {
                let mut is_from = false;
                for i in 0..ts.child_count() {
                    if let Some(c) = ts.child(i) {
                        if c.kind() == "from" {
                            is_from = true;
                        }
                    }
                }
                let kind = if is_from { NodeKind::YieldFrom } else { NodeKind::Yield };
                let id = self.push(kind, ts, Some(parent), NodeData::None);
                self.lower_children(ts, id);
                id
            }
            "await" => {
                let id = self.push(NodeKind::Await, ts, Some(parent), NodeData::None);
                self.lower_children(ts, id);
                id
            }
            "pass_statement" => self.push(NodeKind::Pass, ts, Some(parent), NodeData::None),
            "break_statement" => {
                self.push(NodeKind::Break, ts, Some(parent), NodeData::None)
            }
            "continue_statement" => {
                self.push(NodeKind::Continue, ts, Some(parent), NodeData::None)
            }
            "raise_statement" => {
                let id = self.push(NodeKind::Raise, ts, Some(parent), NodeData::None);
                self.lower_children(ts, id);
                id
            }
            "assert_statement" => {
                let id = self.push(NodeKind::Assert, ts, Some(parent), NodeData::None);
                self.lower_children(ts, id);
                id
            }
            "delete_statement" => {
                let id = self.push(NodeKind::Delete, ts, Some(parent), NodeData::None);
                self.lower_children(ts, id);
                id
            }
            "global_statement" => {
                let mut names = Vec::new();
                for i in 0..ts.named_child_count() {
                    if let Some(c) = ts.named_child(i) {
                        if c.kind() == "identifier" {
                            names.push(self.text(c));
                        }
                    }
                }
                self.push(NodeKind::Global, ts, Some(parent), NodeData::Global { names })
            }
            "import_statement" => {
                let names = self.collect_imported_names(ts);
                self.push(NodeKind::Import, ts, Some(parent), NodeData::Import { names })
            }
            "import_from_statement" | "future_import_statement" => {
                self.lower_import_from(ts, parent)
            }
            "return_statement" => {
                let id = self.push(
                    NodeKind::Return,
                    ts,
                    Some(parent),
                    NodeData::Return { value: None },
                );
                let mut value = None;
                for i in 0..ts.named_child_count() {
                    if let Some(c) = ts.named_child(i) {
                        value = self.lower(c, id);
                    }
                }
                if let NodeData::Return { value: v } = &mut self.nodes[id].data {
                    *v = value;
                }
                id
            }
            "subscript" => {
                let id = self.push(NodeKind::Subscript, ts, Some(parent), NodeData::None);
                self.lower_children(ts, id);
                id
            }
            "slice" => {
                let id = self.push(NodeKind::Slice, ts, Some(parent), NodeData::None);
                self.lower_children(ts, id);
                id
            }
            "match_statement" => {
                let id = self.push(NodeKind::Match, ts, Some(parent), NodeData::None);
                for i in 0..ts.named_child_count() {
                    if let Some(c) = ts.named_child(i) {
                        if c.kind() == "case_clause" {
                            let case = self.push(
                                NodeKind::MatchCase,
                                c,
                                Some(id),
                                NodeData::None,
                            );
                            if let Some(body) = c.child_by_field_name("consequence") {
                                self.lower_block(body, case);
                            }
                            self.finish(case);
                        } else {
                            self.lower(c, id);
                        }
                    }
                }
                id
            }
            "named_expression" => {
                let id = self.push(NodeKind::NamedExpr, ts, Some(parent), NodeData::None);
                self.lower_children(ts, id);
                id
            }
            "keyword_argument" => {
                let arg = ts.child_by_field_name("name").map(|n| self.text(n));
                let id =
                    self.push(NodeKind::Keyword, ts, Some(parent), NodeData::Keyword { arg });
                if let Some(value) = ts.child_by_field_name("value") {
                    self.lower(value, id);
                }
                id
            }
            "list_splat" | "dictionary_splat" => {
                let id = self.push(NodeKind::Starred, ts, Some(parent), NodeData::None);
                self.lower_children(ts, id);
                id
            }
            "interpolation" => {
                let id =
                    self.push(NodeKind::FormattedValue, ts, Some(parent), NodeData::None);
                self.lower_children(ts, id);
                id
            }
            "parenthesized_expression" => {
                let mut inner = None;
                for i in 0..ts.named_child_count() {
                    if let Some(c) = ts.named_child(i) {
                        inner = self.lower(c, parent);
                    }
                }
                return inner;
            }
            "block" => {
                self.lower_block(ts, parent);
                return None;
            }
            _ => {
                let id = self.push(NodeKind::Unknown, ts, Some(parent), NodeData::None);
                self.lower_children(ts, id);
                id
            }
        };
        self.finish(id);
        Some(id)
    }

    fn lower_expression_statement(
        &mut self,
        ts: TsNode<'_>,
        parent: NodeId,
    ) -> Option<NodeId> {
        // assignment/augmented_assignment viven dentro de expression_statement
        // en la gramática; se bajan como sentencia directa (forma astroid).
        if ts.named_child_count() == 1 {
            let child = ts.named_child(0)?;
            if matches!(child.kind(), "assignment" | "augmented_assignment") {
                return self.lower(child, parent);
            }
        }
        let id = self.push(NodeKind::Expr, ts, Some(parent), NodeData::None);
        self.lower_children(ts, id);
        self.finish(id);
        Some(id)
    }

    fn lower_assignment(&mut self, ts: TsNode<'_>, parent: NodeId) -> NodeId {
        let annotated = ts.child_by_field_name("type").is_some();
        let kind = if annotated { NodeKind::AnnAssign } else { NodeKind::Assign };
        let id = self.push(kind, ts, Some(parent), NodeData::None);
        if let Some(left) = ts.child_by_field_name("left") {
            self.lower_target(left, id);
        }
        if let Some(ty) = ts.child_by_field_name("type") {
            let t = self.push(NodeKind::Unknown, ty, Some(id), NodeData::None);
            self.lower_children(ty, t);
            self.finish(t);
        }
        if let Some(right) = ts.child_by_field_name("right") {
            self.lower(right, id);
        }
        id
    }

    fn lower_target(&mut self, ts: TsNode<'_>, parent: NodeId) -> Option<NodeId> {
        let id = match ts.kind() {
            "identifier" => {
                let name = self.text(ts);
                self.push(
                    NodeKind::AssignName,
                    ts,
                    Some(parent),
                    NodeData::AssignName { id: name },
                )
            }
            "attribute" => {
                let attr = ts
                    .child_by_field_name("attribute")
                    .map(|a| self.text(a))
                    .unwrap_or_default();
                let receiver = ts
                    .child_by_field_name("object")
                    .map(|o| self.text(o))
                    .unwrap_or_default();
                let id = self.push(
                    NodeKind::AssignAttr,
                    ts,
                    Some(parent),
                    NodeData::AssignAttr { receiver, attr },
                );
                if let Some(obj) = ts.child_by_field_name("object") {
                    self.lower(obj, id);
                }
                id
            }
            "pattern_list" | "tuple_pattern" | "list_pattern" | "tuple" => {
                let id = self.push(NodeKind::Tuple, ts, Some(parent), NodeData::None);
                for i in 0..ts.named_child_count() {
                    if let Some(c) = ts.named_child(i) {
                        self.lower_target(c, id);
                    }
                }
                id
            }
            _ => return self.lower(ts, parent),
        };
        self.finish(id);
        Some(id)
    }

    fn lower_call(&mut self, ts: TsNode<'_>, parent: NodeId) -> NodeId {
        let callee = ts.child_by_field_name("function").and_then(|f| dotted_from_ts(self.source, f));
        let id = self.push(
            NodeKind::Call,
            ts,
            Some(parent),
            NodeData::Call { callee, func: 0, arg_count: 0 },
        );
        let func_id = ts
            .child_by_field_name("function")
            .and_then(|f| self.lower(f, id))
            .unwrap_or(id);
        let mut arg_count = 0usize;
        if let Some(args) = ts.child_by_field_name("arguments") {
            for i in 0..args.named_child_count() {
                if let Some(a) = args.named_child(i) {
                    if a.kind() != "keyword_argument" {
                        arg_count += 1;
                    }
                    self.lower(a, id);
                }
            }
        }
        if let NodeData::Call { func, arg_count: ac, .. } = &mut self.nodes[id].data {
            *func = func_id;
            *ac = arg_count;
        }
        id
    }

    fn lower_string(&mut self, ts: TsNode<'_>, parent: NodeId) -> NodeId {
        let mut has_interpolation = false;
        for i in 0..ts.named_child_count() {
            if let Some(c) = ts.named_child(i) {
                if c.kind() == "interpolation" {
                    has_interpolation = true;
                }
            }
        }
        if has_interpolation {
            let id = self.push(NodeKind::JoinedStr, ts, Some(parent), NodeData::None);
            for i in 0..ts.named_child_count() {
                if let Some(c) = ts.named_child(i) {
                    if c.kind() == "interpolation" {
                        self.lower(c, id);
                    }
                }
            }
            id
        } else {
            let content = string_content(self.source, ts);
            self.push(
                NodeKind::Const,
                ts,
                Some(parent),
                NodeData::Const(ConstValue::Str(content)),
            )
        }
    }

    fn lower_decorated(&mut self, ts: TsNode<'_>, parent: NodeId) -> Option<NodeId> {
        let mut decorators: Vec<(String, TsNode<'_>)> = Vec::new();
        let mut definition = None;
        for i in 0..ts.named_child_count() {
            if let Some(c) = ts.named_child(i) {
                match c.kind() {
                    "decorator" => {
                        // El texto del decorador sin el '@' inicial.
                        let text = self.text(c).trim_start_matches('@').trim().to_string();
                        decorators.push((text, c));
                    }
                    "function_definition" | "class_definition" => definition = Some(c),
                    _ => {}
                }
            }
        }
        let def = definition?;
        let decorator_texts: Vec<String> =
            decorators.iter().map(|(t, _)| t.clone()).collect();
        let id = match def.kind() {
            "class_definition" => self.lower_class(def, parent, decorator_texts),
            _ => self.lower_function(def, parent, decorator_texts),
        };
        // Nodo Decorators con las expresiones decoradoras bajadas, para que
        // el recorrido vea los Call/Name dentro de los decoradores.
        let dec_node = self.push(NodeKind::Decorators, ts, Some(id), NodeData::None);
        for (_, c) in &decorators {
            for j in 0..c.named_child_count() {
                if let Some(inner) = c.named_child(j) {
                    self.lower(inner, dec_node);
                }
            }
        }
        self.finish(dec_node);
        self.finish(id);
        Some(id)
    }

    fn lower_function(
        &mut self,
        ts: TsNode<'_>,
        parent: NodeId,
        decorators: Vec<String>,
    ) -> NodeId {
        let name = ts
            .child_by_field_name("name")
            .map(|n| self.text(n))
            .unwrap_or_default();
        let mut is_async = false;
        for i in 0..ts.child_count() {
            if let Some(c) = ts.child(i) {
                if c.kind() == "async" {
                    is_async = true;
                }
            }
        }
        let returns = ts.child_by_field_name("return_type").map(|r| self.text(r));
        let params = ts
            .child_by_field_name("parameters")
            .map(|p| self.collect_params(p))
            .unwrap_or_default();

        let kind = if is_async { NodeKind::AsyncFunctionDef } else { NodeKind::FunctionDef };
        let id = self.push(
            kind,
            ts,
            Some(parent),
            NodeData::FunctionDef(FunctionData {
                name,
                is_async,
                params,
                returns,
                decorators,
            }),
        );

        if let Some(parameters) = ts.child_by_field_name("parameters") {
            let args_node =
                self.push(NodeKind::Arguments, parameters, Some(id), NodeData::None);
            for i in 0..parameters.named_child_count() {
                if let Some(p) = parameters.named_child(i) {
                    match p.kind() {
                        "default_parameter" | "typed_default_parameter" => {
                            if let Some(v) = p.child_by_field_name("value") {
                                self.lower(v, args_node);
                            }
                        }
                        _ => {}
                    }
                }
            }
            self.finish(args_node);
        }
        if let Some(body) = ts.child_by_field_name("body") {
            self.lower_block(body, id);
        }
        id
    }

    fn collect_params(&self, parameters: TsNode<'_>) -> Vec<Param> {
        let mut params = Vec::new();
        let mut kw_only = false;
        for i in 0..parameters.named_child_count() {
            let Some(p) = parameters.named_child(i) else { continue };
            match p.kind() {
                "identifier" => params.push(Param {
                    name: self.text(p),
                    annotation: None,
                    default: None,
                    kind: if kw_only { ParamKind::KwOnly } else { ParamKind::Positional },
                }),
                "typed_parameter" => {
                    let name = p
                        .named_child(0)
                        .map(|c| {
                            // *args / **kwargs tipados envuelven el identifier
                            if c.kind() == "identifier" {
                                self.text(c)
                            } else {
                                c.named_child(0).map(|n| self.text(n)).unwrap_or_default()
                            }
                        })
                        .unwrap_or_default();
                    let splat_kind = p
                        .named_child(0)
                        .map(|c| match c.kind() {
                            "list_splat_pattern" => ParamKind::Vararg,
                            "dictionary_splat_pattern" => ParamKind::Kwarg,
                            _ => {
                                if kw_only {
                                    ParamKind::KwOnly
                                } else {
                                    ParamKind::Positional
                                }
                            }
                        })
                        .unwrap_or(ParamKind::Positional);
                    if splat_kind == ParamKind::Vararg {
                        kw_only = true;
                    }
                    params.push(Param {
                        name,
                        annotation: p.child_by_field_name("type").map(|t| self.text(t)),
                        default: None,
                        kind: splat_kind,
                    });
                }
                "default_parameter" => params.push(Param {
                    name: p
                        .child_by_field_name("name")
                        .map(|n| self.text(n))
                        .unwrap_or_default(),
                    annotation: None,
                    default: p.child_by_field_name("value").map(|v| self.text(v)),
                    kind: if kw_only { ParamKind::KwOnly } else { ParamKind::Positional },
                }),
                "typed_default_parameter" => params.push(Param {
                    name: p
                        .child_by_field_name("name")
                        .map(|n| self.text(n))
                        .unwrap_or_default(),
                    annotation: p.child_by_field_name("type").map(|t| self.text(t)),
                    default: p.child_by_field_name("value").map(|v| self.text(v)),
                    kind: if kw_only { ParamKind::KwOnly } else { ParamKind::Positional },
                }),
                "list_splat_pattern" => {
                    kw_only = true;
                    let name =
                        p.named_child(0).map(|c| self.text(c)).unwrap_or_default();
                    params.push(Param {
                        name,
                        annotation: None,
                        default: None,
                        kind: ParamKind::Vararg,
                    });
                }
                "dictionary_splat_pattern" => {
                    let name =
                        p.named_child(0).map(|c| self.text(c)).unwrap_or_default();
                    params.push(Param {
                        name,
                        annotation: None,
                        default: None,
                        kind: ParamKind::Kwarg,
                    });
                }
                "keyword_separator" => kw_only = true,
                "positional_separator" => {}
                _ => {}
            }
        }
        params
    }

    fn lower_class(
        &mut self,
        ts: TsNode<'_>,
        parent: NodeId,
        decorators: Vec<String>,
    ) -> NodeId {
        let name = ts
            .child_by_field_name("name")
            .map(|n| self.text(n))
            .unwrap_or_default();
        let mut bases = Vec::new();
        let mut keywords = Vec::new();
        if let Some(superclasses) = ts.child_by_field_name("superclasses") {
            for i in 0..superclasses.named_child_count() {
                if let Some(arg) = superclasses.named_child(i) {
                    if arg.kind() == "keyword_argument" {
                        let key = arg
                            .child_by_field_name("name")
                            .map(|n| self.text(n))
                            .unwrap_or_default();
                        let value = arg
                            .child_by_field_name("value")
                            .map(|v| self.text(v))
                            .unwrap_or_default();
                        keywords.push((key, value));
                    } else {
                        bases.push(self.text(arg));
                    }
                }
            }
        }
        let id = self.push(
            NodeKind::ClassDef,
            ts,
            Some(parent),
            NodeData::ClassDef(ClassData { name, bases, keywords, decorators }),
        );
        if let Some(body) = ts.child_by_field_name("body") {
            self.lower_block(body, id);
        }
        id
    }

    fn lower_if(&mut self, ts: TsNode<'_>, parent: NodeId) -> NodeId {
        let mut elifs: Vec<TsNode<'_>> = Vec::new();
        let mut else_block: Option<TsNode<'_>> = None;
        for i in 0..ts.named_child_count() {
            if let Some(c) = ts.named_child(i) {
                match c.kind() {
                    "elif_clause" => elifs.push(c),
                    "else_clause" => {
                        for j in 0..c.named_child_count() {
                            if let Some(b) = c.named_child(j) {
                                if b.kind() == "block" {
                                    else_block = Some(b);
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        self.build_if(ts, parent, &elifs, else_block)
    }

    /// Construye el If con la cadena elif anidada en orelse (forma astroid).
    fn build_if(
        &mut self,
        clause: TsNode<'_>,
        parent: NodeId,
        rest: &[TsNode<'_>],
        else_block: Option<TsNode<'_>>,
    ) -> NodeId {
        let id = self.push(
            NodeKind::If,
            clause,
            Some(parent),
            NodeData::If { test: 0, body: Vec::new(), orelse: Vec::new() },
        );
        let test = clause
            .child_by_field_name("condition")
            .and_then(|c| self.lower(c, id))
            .unwrap_or(id);
        let body = clause
            .child_by_field_name("consequence")
            .map(|b| self.lower_block(b, id))
            .unwrap_or_default();
        let orelse = if let Some((first, remaining)) = rest.split_first() {
            let nested = self.build_if(*first, id, remaining, else_block);
            self.finish(nested);
            vec![nested]
        } else if let Some(eb) = else_block {
            self.lower_block(eb, id)
        } else {
            Vec::new()
        };
        if let NodeData::If { test: t, body: b, orelse: o } = &mut self.nodes[id].data {
            *t = test;
            *b = body;
            *o = orelse;
        }
        id
    }

    fn lower_except(&mut self, ts: TsNode<'_>, parent: NodeId) -> NodeId {
        let mut type_text = None;
        let mut block = None;
        for i in 0..ts.named_child_count() {
            if let Some(c) = ts.named_child(i) {
                if c.kind() == "block" {
                    block = Some(c);
                } else if type_text.is_none() {
                    type_text = Some(self.text(c));
                }
            }
        }
        let id = self.push(
            NodeKind::ExceptHandler,
            ts,
            Some(parent),
            NodeData::ExceptHandler { type_text, body: Vec::new() },
        );
        let body = block.map(|b| self.lower_block(b, id)).unwrap_or_default();
        if let NodeData::ExceptHandler { body: b, .. } = &mut self.nodes[id].data {
            *b = body;
        }
        self.finish(id);
        id
    }

    fn lower_comp(&mut self, ts: TsNode<'_>, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.push(kind, ts, Some(parent), NodeData::None);
        self.lower_children(ts, id);
        id
    }

    fn collect_imported_names(&self, ts: TsNode<'_>) -> Vec<ImportedName> {
        let mut names = Vec::new();
        for i in 0..ts.named_child_count() {
            let Some(c) = ts.named_child(i) else { continue };
            match c.kind() {
                "dotted_name" | "identifier" => names.push(ImportedName {
                    name: self.text(c),
                    alias: None,
                }),
                "aliased_import" => {
                    let name = c
                        .child_by_field_name("name")
                        .map(|n| self.text(n))
                        .unwrap_or_default();
                    let alias = c.child_by_field_name("alias").map(|a| self.text(a));
                    names.push(ImportedName { name, alias });
                }
                "wildcard_import" => names.push(ImportedName {
                    name: "*".to_string(),
                    alias: None,
                }),
                _ => {}
            }
        }
        names
    }

    fn lower_import_from(&mut self, ts: TsNode<'_>, parent: NodeId) -> NodeId {
        let raw_module = ts
            .child_by_field_name("module_name")
            .map(|m| self.text(m))
            .unwrap_or_default();
        let level = raw_module.chars().take_while(|&c| c == '.').count() as u32;
        let module = raw_module.trim_start_matches('.').to_string();
        let mut names = Vec::new();
        for i in 0..ts.named_child_count() {
            let Some(c) = ts.named_child(i) else { continue };
            // El primer dotted_name es el módulo; los siguientes son nombres.
            if ts.child_by_field_name("module_name").map(|m| m.id()) == Some(c.id()) {
                continue;
            }
            match c.kind() {
                "dotted_name" | "identifier" => names.push(ImportedName {
                    name: self.text(c),
                    alias: None,
                }),
                "aliased_import" => {
                    let name = c
                        .child_by_field_name("name")
                        .map(|n| self.text(n))
                        .unwrap_or_default();
                    let alias = c.child_by_field_name("alias").map(|a| self.text(a));
                    names.push(ImportedName { name, alias });
                }
                "wildcard_import" => names.push(ImportedName {
                    name: "*".to_string(),
                    alias: None,
                }),
                _ => {}
            }
        }
        self.push(
            NodeKind::ImportFrom,
            ts,
            Some(parent),
            NodeData::ImportFrom { module, names, level },
        )
    }
}

/// Contenido de un literal string sin comillas (concatena string_content).
fn string_content(source: &str, ts: TsNode<'_>) -> String {
    let mut out = String::new();
    for i in 0..ts.named_child_count() {
        if let Some(c) = ts.named_child(i) {
            if c.kind() == "string_content" {
                out.push_str(source.get(c.start_byte()..c.end_byte()).unwrap_or(""));
            }
        }
    }
    out
}

/// Cadena punteada leída directo del CST (identifier / attribute chains).
fn dotted_from_ts(source: &str, ts: TsNode<'_>) -> Option<String> {
    match ts.kind() {
        "identifier" => Some(source.get(ts.start_byte()..ts.end_byte())?.to_string()),
        "attribute" => {
            let object = ts.child_by_field_name("object")?;
            let attr = ts.child_by_field_name("attribute")?;
            let base = dotted_from_ts(source, object)?;
            Some(format!(
                "{}.{}",
                base,
                source.get(attr.start_byte()..attr.end_byte())?
            ))
        }
        _ => None,
    }
}
