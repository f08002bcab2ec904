//! SchemaGraph: operations and their reachable schema slices, built once per
//! run from an introspection response.
//!
//! # Type-reference graph
//!
//! Object and input-object types form a directed graph: an edge `A -> B`
//! exists when some field of `A` has flattened type `B`. The graph is held in a
//! petgraph `DiGraph` and walked with an explicit-stack DFS, so schemas with
//! cycles (`Film.characters -> Person.films -> Film`) and very deep nesting
//! are both safe.
//!
//! # Tolerance
//!
//! Nothing in this module fails. Missing roots, malformed type references, and
//! dangling type names all degrade to empty strings or empty maps.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use serde_json::Value;

use crate::introspection::{FullType, SchemaDoc, TypeRef};
use crate::types::{FieldDef, OperationDef, OperationSource, TypeDef, TypeKind};

const WRAPPER_KINDS: [&str; 2] = ["NON_NULL", "LIST"];

/// Returns the innermost named type of a (possibly wrapped) type reference.
pub fn flatten_type(type_ref: Option<&TypeRef>) -> String {
    let mut current = type_ref;
    while let Some(t) = current {
        match t.kind.as_deref() {
            Some(kind) if WRAPPER_KINDS.contains(&kind) => current = t.of_type.as_deref(),
            _ => return t.name.clone().unwrap_or_default(),
        }
    }
    String::new()
}

/// Renders a type reference in SDL notation, e.g. `[Film!]!`.
pub fn render_type(type_ref: Option<&TypeRef>) -> String {
    let mut wrappers = Vec::new();
    let mut current = type_ref;
    let name = loop {
        let Some(t) = current else {
            return String::new();
        };
        match t.kind.as_deref() {
            Some("NON_NULL") => wrappers.push('!'),
            Some("LIST") => wrappers.push('['),
            _ => break t.name.clone().unwrap_or_default(),
        }
        current = t.of_type.as_deref();
    };
    if name.is_empty() {
        return String::new();
    }

    wrappers
        .into_iter()
        .rev()
        .fold(name, |inner, wrapper| match wrapper {
            '!' => format!("{inner}!"),
            _ => format!("[{inner}]"),
        })
}

/// Reads each field of a root operation type as an operation definition.
///
/// The returned definitions carry no relevant schema yet; the terminal node
/// type defaults to the output type.
pub fn parse_operations(root: &FullType, source: OperationSource) -> IndexMap<String, OperationDef> {
    let mut operations = IndexMap::new();
    for field in root.fields.iter().flatten() {
        if field.name.is_empty() {
            continue;
        }

        let mut inputs = IndexMap::new();
        let mut input_signatures = IndexMap::new();
        for arg in &field.args {
            inputs.insert(arg.name.clone(), flatten_type(arg.type_ref.as_ref()));
            input_signatures.insert(arg.name.clone(), render_type(arg.type_ref.as_ref()));
        }

        let output_type = flatten_type(field.type_ref.as_ref());
        operations.insert(
            field.name.clone(),
            OperationDef {
                name: field.name.clone(),
                source,
                inputs,
                input_signatures,
                output_signature: render_type(field.type_ref.as_ref()),
                terminal_node_type: output_type.clone(),
                output_type,
                relevant_schema: IndexMap::new(),
            },
        );
    }
    operations
}

/// Collects every `OBJECT` and `INPUT_OBJECT` type, skipping introspection
/// types (`__`-prefixed).
pub fn parse_object_types(all_types: &[FullType]) -> IndexMap<String, TypeDef> {
    let mut objects = IndexMap::new();
    for full in all_types {
        let Some(name) = full.name.as_deref().filter(|n| !n.starts_with("__")) else {
            continue;
        };
        let Some(kind) = full.kind.as_deref().and_then(TypeKind::from_introspection) else {
            continue;
        };

        let fields = match kind {
            TypeKind::Object => full
                .fields
                .iter()
                .flatten()
                .map(|f| {
                    FieldDef::new(
                        f.name.clone(),
                        flatten_type(f.type_ref.as_ref()),
                        render_type(f.type_ref.as_ref()),
                    )
                })
                .collect(),
            TypeKind::InputObject => full
                .input_fields
                .iter()
                .flatten()
                .map(|f| {
                    FieldDef::new(
                        f.name.clone(),
                        flatten_type(f.type_ref.as_ref()),
                        render_type(f.type_ref.as_ref()),
                    )
                })
                .collect(),
        };

        objects.insert(
            name.to_string(),
            TypeDef {
                name: name.to_string(),
                kind,
                fields,
            },
        );
    }
    objects
}

/// Directed graph of type references between known object types.
#[derive(Debug, Clone, Default)]
pub struct TypeGraph {
    graph: DiGraph<String, String>,
    index: HashMap<String, NodeIndex>,
}

impl TypeGraph {
    pub fn build(objects: &IndexMap<String, TypeDef>) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for name in objects.keys() {
            index.insert(name.clone(), graph.add_node(name.clone()));
        }
        for (name, type_def) in objects {
            let from = index[name];
            for field in &type_def.fields {
                if let Some(&to) = index.get(&field.type_name) {
                    graph.add_edge(from, to, field.name.clone());
                }
            }
        }
        TypeGraph { graph, index }
    }

    /// Type names reachable from `root`, `root` first. Unknown roots reach
    /// nothing.
    pub fn reachable(&self, root: &str) -> Vec<&str> {
        let Some(&start) = self.index.get(root) else {
            return Vec::new();
        };
        let mut dfs = Dfs::new(&self.graph, start);
        let mut names = Vec::new();
        while let Some(node) = dfs.next(&self.graph) {
            names.push(self.graph[node].as_str());
        }
        names
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

/// The transitive closure of object types reachable from `root_type_name`.
pub fn collect_relevant_objects(
    root_type_name: &str,
    all_objects: &IndexMap<String, TypeDef>,
) -> IndexMap<String, TypeDef> {
    relevant_from(&TypeGraph::build(all_objects), root_type_name, all_objects)
}

fn relevant_from(
    graph: &TypeGraph,
    root_type_name: &str,
    all_objects: &IndexMap<String, TypeDef>,
) -> IndexMap<String, TypeDef> {
    graph
        .reachable(root_type_name)
        .into_iter()
        .filter_map(|name| all_objects.get(name).map(|t| (name.to_string(), t.clone())))
        .collect()
}

/// Follows `edges`/`node` wrapper fields from `output_type` down to the type
/// that actually carries data (Relay connections, for instance).
///
/// At each step the first field named `edges` or `node` is taken. The walk
/// stops when there is no such field, the next type is outside the relevant
/// schema, or a type repeats; the last type reached is returned.
pub fn resolve_terminal_node_type(
    output_type: &str,
    relevant_schema: &IndexMap<String, TypeDef>,
) -> String {
    let mut current = output_type;
    let mut visited = HashSet::new();
    while visited.insert(current) {
        let Some(type_def) = relevant_schema.get(current) else {
            break;
        };
        let next = type_def
            .fields
            .iter()
            .find(|f| f.name == "edges" || f.name == "node")
            .map(|f| f.type_name.as_str());
        match next {
            Some(next) if relevant_schema.contains_key(next) && !visited.contains(next) => {
                current = next;
            }
            _ => break,
        }
    }
    current.to_string()
}

/// Every operation of a schema with its bounded context.
#[derive(Debug, Clone, Default)]
pub struct SchemaGraph {
    pub query_type: Option<String>,
    pub mutation_type: Option<String>,
    /// All object and input-object types, in introspection order.
    pub objects: IndexMap<String, TypeDef>,
    /// Query operations first, then mutations.
    pub operations: IndexMap<String, OperationDef>,
    type_graph: TypeGraph,
}

impl SchemaGraph {
    /// Builds the graph from a raw introspection response.
    pub fn from_introspection(response: &Value) -> Self {
        Self::from_doc(&SchemaDoc::from_response(response))
    }

    /// Builds the graph from a decoded schema document.
    ///
    /// Root types default to `Query` and `Mutation` when the document does
    /// not name them. A name defined on both roots keeps the query.
    pub fn from_doc(doc: &SchemaDoc) -> Self {
        let objects = parse_object_types(&doc.types);
        let type_graph = TypeGraph::build(&objects);

        let query_type = doc.query_type.clone().unwrap_or_else(|| "Query".to_string());
        let mutation_type = doc
            .mutation_type
            .clone()
            .unwrap_or_else(|| "Mutation".to_string());

        let mut operations = doc
            .find_type(&query_type)
            .map(|root| parse_operations(root, OperationSource::Query))
            .unwrap_or_default();
        if let Some(root) = doc.find_type(&mutation_type) {
            for (name, op) in parse_operations(root, OperationSource::Mutation) {
                operations.entry(name).or_insert(op);
            }
        }

        for op in operations.values_mut() {
            op.relevant_schema = relevant_from(&type_graph, &op.output_type, &objects);
            op.terminal_node_type = resolve_terminal_node_type(&op.output_type, &op.relevant_schema);
        }

        SchemaGraph {
            query_type: doc.find_type(&query_type).map(|_| query_type),
            mutation_type: doc.find_type(&mutation_type).map(|_| mutation_type),
            objects,
            operations,
            type_graph,
        }
    }

    pub fn operation(&self, name: &str) -> Option<&OperationDef> {
        self.operations.get(name)
    }

    pub fn operation_names(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn type_graph(&self) -> &TypeGraph {
        &self.type_graph
    }
}
