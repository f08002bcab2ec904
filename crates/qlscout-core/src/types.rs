//! Schema model derived from introspection.
//!
//! These are the immutable, per-run views of the target schema that the
//! exploration engine reasons about. Type references are kept twice: the
//! flattened innermost name (for graph traversal) and the SDL rendering
//! such as `[Film!]!` (for prompts and required-ness checks).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Which kind of named type a [`TypeDef`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeKind {
    Object,
    InputObject,
}

impl TypeKind {
    /// Maps an introspection `kind` string; other kinds are not modeled.
    pub fn from_introspection(kind: &str) -> Option<Self> {
        match kind {
            "OBJECT" => Some(TypeKind::Object),
            "INPUT_OBJECT" => Some(TypeKind::InputObject),
            _ => None,
        }
    }
}

/// One field of an object or input object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    pub name: String,
    /// Innermost named type, wrappers stripped.
    pub type_name: String,
    /// SDL rendering including list and non-null wrappers.
    pub signature: String,
}

impl FieldDef {
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        FieldDef {
            name: name.into(),
            type_name: type_name.into(),
            signature: signature.into(),
        }
    }
}

/// A named object or input-object type, fields in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    pub kind: TypeKind,
    pub fields: Vec<FieldDef>,
}

impl TypeDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Root type an operation hangs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationSource {
    Query,
    Mutation,
}

impl OperationSource {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationSource::Query => "query",
            OperationSource::Mutation => "mutation",
        }
    }
}

impl std::fmt::Display for OperationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A top-level query or mutation field together with the schema slice
/// reachable from its output type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDef {
    pub name: String,
    pub source: OperationSource,
    /// Argument name to flattened type name.
    pub inputs: IndexMap<String, String>,
    /// Argument name to SDL type, e.g. `ID!`.
    pub input_signatures: IndexMap<String, String>,
    pub output_type: String,
    pub output_signature: String,
    /// Object and input-object types transitively reachable from
    /// `output_type`.
    pub relevant_schema: IndexMap<String, TypeDef>,
    /// The type found by following `edges`/`node` wrappers from the output.
    pub terminal_node_type: String,
}

impl OperationDef {
    /// Whether `param` is declared non-null.
    pub fn is_required(&self, param: &str) -> bool {
        self.input_signatures
            .get(param)
            .is_some_and(|sig| sig.ends_with('!'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_round_trip_introspection_names() {
        assert_eq!(TypeKind::from_introspection("OBJECT"), Some(TypeKind::Object));
        assert_eq!(
            TypeKind::from_introspection("INPUT_OBJECT"),
            Some(TypeKind::InputObject)
        );
        assert_eq!(TypeKind::from_introspection("SCALAR"), None);
        assert_eq!(
            serde_json::to_string(&TypeKind::InputObject).unwrap(),
            "\"INPUT_OBJECT\""
        );
    }

    #[test]
    fn required_inputs_follow_signature() {
        let mut op = OperationDef {
            name: "film".into(),
            source: OperationSource::Query,
            inputs: IndexMap::new(),
            input_signatures: IndexMap::new(),
            output_type: "Film".into(),
            output_signature: "Film".into(),
            relevant_schema: IndexMap::new(),
            terminal_node_type: "Film".into(),
        };
        op.input_signatures.insert("id".into(), "ID!".into());
        op.input_signatures.insert("filmID".into(), "ID".into());

        assert!(op.is_required("id"));
        assert!(!op.is_required("filmID"));
        assert!(!op.is_required("missing"));
    }
}
