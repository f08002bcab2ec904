//! Schema model and text analysis for GraphQL API exploration.
//!
//! Everything here is synchronous and deterministic: building the per-run
//! [`SchemaGraph`] from introspection, extracting and tracking field-path
//! coverage, repairing generated query text, and judging responses.

pub mod coverage;
pub mod error;
pub mod graph;
pub mod introspection;
pub mod judge;
pub mod query_text;
pub mod types;

// Re-export commonly used types
pub use coverage::{extract_field_paths, schema_field_paths, CoverageTracker};
pub use error::CoreError;
pub use graph::{flatten_type, render_type, SchemaGraph};
pub use introspection::{SchemaDoc, TypeRef, INTROSPECTION_QUERY};
pub use judge::is_successful_response;
pub use query_text::{fix_operation_case, FieldInventory};
pub use types::{FieldDef, OperationDef, OperationSource, TypeDef, TypeKind};
