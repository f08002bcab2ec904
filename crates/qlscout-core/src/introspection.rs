//! Wire types for GraphQL introspection results.
//!
//! Every field is optional or defaulted: introspection documents from real
//! endpoints are frequently partial, and a missing section must degrade to an
//! empty schema rather than a deserialization failure. Individual type entries
//! are decoded one by one so a single malformed entry only drops itself.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical field-level introspection query sent to the target endpoint.
///
/// `ofType` is unrolled seven levels deep, enough for wrappers such as
/// `[[Film!]!]!`.
pub const INTROSPECTION_QUERY: &str = r#"query ScoutIntrospection {
  __schema {
    queryType { name }
    mutationType { name }
    types {
      kind
      name
      fields(includeDeprecated: true) {
        name
        args { name type { ...TypeRef } }
        type { ...TypeRef }
      }
      inputFields { name type { ...TypeRef } }
    }
  }
}

fragment TypeRef on __Type {
  kind
  name
  ofType {
    kind
    name
    ofType {
      kind
      name
      ofType {
        kind
        name
        ofType {
          kind
          name
          ofType {
            kind
            name
            ofType {
              kind
              name
              ofType { kind name }
            }
          }
        }
      }
    }
  }
}"#;

/// A (possibly wrapped) type reference such as `NON_NULL(LIST(Film))`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeRef {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub of_type: Option<Box<TypeRef>>,
}

/// An argument or input-object field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputValueDoc {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub type_ref: Option<TypeRef>,
}

/// An output field of an object type (or of a root operation type).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldDoc {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub args: Vec<InputValueDoc>,
    #[serde(default, rename = "type")]
    pub type_ref: Option<TypeRef>,
}

/// One entry of `__schema.types`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullType {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: Option<Vec<FieldDoc>>,
    #[serde(default)]
    pub input_fields: Option<Vec<InputValueDoc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct NamedRef {
    #[serde(default)]
    name: Option<String>,
}

/// The decoded `__schema` section.
#[derive(Debug, Clone, Default)]
pub struct SchemaDoc {
    pub query_type: Option<String>,
    pub mutation_type: Option<String>,
    pub types: Vec<FullType>,
}

impl SchemaDoc {
    /// Decodes the `__schema` section of an introspection response.
    ///
    /// Accepts both the full response (`{"data": {"__schema": ...}}`) and a
    /// bare `{"__schema": ...}` object. Anything unrecognizable yields an
    /// empty document.
    pub fn from_response(response: &Value) -> Self {
        let schema = response
            .get("data")
            .and_then(|d| d.get("__schema"))
            .or_else(|| response.get("__schema"));
        let Some(schema) = schema else {
            return SchemaDoc::default();
        };

        let root_name = |key: &str| {
            schema
                .get(key)
                .cloned()
                .and_then(|v| serde_json::from_value::<NamedRef>(v).ok())
                .and_then(|r| r.name)
        };

        let types = schema
            .get("types")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| serde_json::from_value::<FullType>(entry.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        SchemaDoc {
            query_type: root_name("queryType"),
            mutation_type: root_name("mutationType"),
            types,
        }
    }

    /// Finds a type entry by name.
    pub fn find_type(&self, name: &str) -> Option<&FullType> {
        self.types.iter().find(|t| t.name.as_deref() == Some(name))
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
