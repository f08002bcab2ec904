//! Prompt assembly.
//!
//! # Layout
//!
//! Every prompt has the same four parts, in order:
//! 1. a fixed header with the hard requirements on generated queries,
//! 2. either the authoritative schema block or the no-schema fallback block,
//! 3. the operation context (inputs, node type, known values, history),
//!    followed by the arm's argument and depth directives,
//! 4. the output-format block asking for fenced ```` ```graphql ```` blocks.
//!
//! The token estimate is the character count divided by four.

use std::fmt::Write as _;

use qlscout_core::{OperationDef, TypeDef, TypeKind};

use crate::arms::{ArgMode, Arm};
use crate::history::ExecutionResult;

/// A previous request/response pair quoted back to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPair {
    pub query: String,
    pub status: Option<u16>,
    /// Compact JSON, truncated.
    pub body: String,
}

impl HistoryPair {
    pub fn from_result(result: &ExecutionResult, body_limit: usize) -> Self {
        HistoryPair {
            query: result.query.clone(),
            status: result.http_status,
            body: truncate(&result.response_body.to_string(), body_limit),
        }
    }
}

/// Everything a prompt may draw on for one operation and one arm.
#[derive(Debug, Clone)]
pub struct OperationContext<'a> {
    pub operation: &'a OperationDef,
    /// Known-value snippets, already cut to the arm's `top_k`.
    pub known_values: Vec<String>,
    /// Relevant schema, present only for schema-including arms.
    pub schema: Option<&'a indexmap::IndexMap<String, TypeDef>>,
    pub history: Vec<HistoryPair>,
}

impl<'a> OperationContext<'a> {
    /// Assembles the context for `arm`.
    ///
    /// `prefetched` holds the operation's known-value snippets, best first;
    /// `top_k` of them are used. `history` is oldest first.
    pub fn assemble(
        operation: &'a OperationDef,
        arm: &Arm,
        prefetched: &[String],
        top_k: usize,
        history: &[ExecutionResult],
        body_limit: usize,
    ) -> Self {
        OperationContext {
            operation,
            known_values: prefetched.iter().take(top_k).cloned().collect(),
            schema: arm.include_schema.then_some(&operation.relevant_schema),
            history: history
                .iter()
                .map(|r| HistoryPair::from_result(r, body_limit))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub text: String,
    pub token_estimate: f64,
}

/// Builds the full prompt for `arm` over `context`.
pub fn build_prompt(arm: &Arm, context: &OperationContext<'_>) -> Prompt {
    let op = context.operation;
    let mut text = String::new();

    text.push_str(&header(&op.name));
    match context.schema {
        Some(schema) => text.push_str(&schema_block(op, schema)),
        None => text.push_str(FALLBACK_BLOCK),
    }
    text.push_str(&context_block(context));
    text.push_str(&arg_directive(arm.arg_mode, op));
    text.push('\n');
    let _ = writeln!(
        text,
        "Selection depth target: {depth}. Keep nested selections no deeper than {depth} levels.",
        depth = arm.depth
    );
    text.push_str(FORMAT_BLOCK);

    let token_estimate = text.chars().count() as f64 / 4.0;
    Prompt {
        text,
        token_estimate,
    }
}

fn header(operation: &str) -> String {
    format!(
        "You are an expert in GraphQL API security testing.\n\
         \n\
         Goal: generate valid GraphQL queries for the operation shown, to get successful \
         responses (HTTP 200 with data) quickly while exploring robustness (injection strings, \
         field misuse, deep traversal, type coercion).\n\
         \n\
         Strict requirements:\n\
         1) Queries must be syntactically valid GraphQL.\n\
         2) No placeholders like <id>, \"ID!\" or \"value\". Use realistic literals or known real values.\n\
         3) You may attempt injected strings, nulls, overlong strings and type mismatches where appropriate.\n\
         4) You may output 1 query.\n\
         5) Do not use the words \"edges\" or \"node\".\n\
         6) GraphQL is case-sensitive. Match the exact operation name: {operation}.\n\n"
    )
}

const FALLBACK_BLOCK: &str = "Schema not provided: explore plausibly.\n\
- Prefer fields/args seen in prior successful responses or known real values.\n\
- Introduce at most 1-2 new fields per query.\n\
- Keep selection depth minimal to maximize validity.\n\n";

const FORMAT_BLOCK: &str = "\nOutput format:\n\
Each query must be in its own fenced block:\n\
```graphql\n\
<your query>\n\
```\n";

fn schema_block(op: &OperationDef, schema: &indexmap::IndexMap<String, TypeDef>) -> String {
    let mut block = String::from("SCHEMA (authoritative):\n- schema types:\n");
    if schema.is_empty() {
        block.push_str("  (none: the output is a scalar)\n");
    }
    for type_def in schema.values() {
        let keyword = match type_def.kind {
            TypeKind::Object => "type",
            TypeKind::InputObject => "input",
        };
        let fields = type_def
            .fields
            .iter()
            .map(|f| format!("{}: {}", f.name, f.signature))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(block, "  {keyword} {} {{ {fields} }}", type_def.name);
    }

    let output_fields = schema
        .get(&op.output_type)
        .map(|t| {
            t.fields
                .iter()
                .map(|f| f.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| op.output_signature.clone());
    let _ = writeln!(block, "- output fields (if known): {output_fields}");
    block.push_str("Use only fields/args compatible with this schema.\n\n");
    block
}

fn context_block(context: &OperationContext<'_>) -> String {
    let op = context.operation;
    let mut block = String::from("Context:\n");
    let _ = writeln!(block, "- operation: {} ({})", op.name, op.source);
    let _ = writeln!(block, "- input (declared): {}", declared_inputs(op));
    let _ = writeln!(block, "- output type: {}", op.output_signature);
    let _ = writeln!(block, "- node type: {}", op.terminal_node_type);

    if context.known_values.is_empty() {
        block.push_str("- known real values: (none yet)\n");
    } else {
        block.push_str("- known real values:\n");
        for snippet in &context.known_values {
            for line in snippet.lines() {
                let _ = writeln!(block, "    {line}");
            }
        }
    }

    if context.history.is_empty() {
        block.push_str("- previous response pairs: (none yet)\n");
    } else {
        block.push_str("- previous response pairs:\n");
        for pair in &context.history {
            let status = pair
                .status
                .map_or_else(|| "no response".to_string(), |s| s.to_string());
            let _ = writeln!(
                block,
                "    Query: {} | Status: {status} | Response: {}",
                single_line(&pair.query),
                pair.body
            );
        }
    }
    block.push('\n');
    block
}

fn arg_directive(mode: ArgMode, op: &OperationDef) -> String {
    match mode {
        ArgMode::Known => {
            "Argument strategy: reuse known-good values from context and previous 200 responses."
                .to_string()
        }
        ArgMode::Real => "Argument strategy: synthesize realistic literals by type \
             (e.g., ISO dates, small integers, emails, UUIDv4), avoid placeholders."
            .to_string(),
        ArgMode::Nulls => {
            let optional: Vec<&str> = op
                .inputs
                .keys()
                .filter(|name| !op.is_required(name))
                .map(String::as_str)
                .collect();
            let optional = if optional.is_empty() {
                "none".to_string()
            } else {
                optional.join(", ")
            };
            format!(
                "Argument strategy: use null/empty for OPTIONAL inputs only; \
                 never for non-null (!) fields. Optional inputs: {optional}."
            )
        }
    }
}

fn declared_inputs(op: &OperationDef) -> String {
    if op.input_signatures.is_empty() {
        return "(none)".to_string();
    }
    op.input_signatures
        .iter()
        .map(|(name, sig)| format!("{name}: {sig}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arms::{find, ARMS};
    use crate::target::Execution;
    use qlscout_core::SchemaGraph;
    use serde_json::json;

    fn graph() -> SchemaGraph {
        SchemaGraph::from_introspection(&json!({ "data": { "__schema": {
            "queryType": { "name": "Query" },
            "types": [
                { "kind": "OBJECT", "name": "Query", "fields": [
                    { "name": "film", "args": [
                        { "name": "id", "type": { "kind": "NON_NULL", "ofType": { "kind": "SCALAR", "name": "ID" } } },
                        { "name": "filmID", "type": { "kind": "SCALAR", "name": "ID" } }
                    ], "type": { "kind": "OBJECT", "name": "Film" } }
                ]},
                { "kind": "OBJECT", "name": "Film", "fields": [
                    { "name": "title", "args": [], "type": { "kind": "SCALAR", "name": "String" } }
                ]}
            ]
        }}}))
    }

    #[test]
    fn schema_arm_includes_schema_block() {
        let graph = graph();
        let op = graph.operation("film").unwrap();
        let arm = find("schema_mod_known").unwrap();
        let ctx = OperationContext::assemble(op, arm, &[], arm.top_k, &[], 200);
        let prompt = build_prompt(arm, &ctx);

        assert!(prompt.text.starts_with("You are an expert in GraphQL API security testing."));
        assert!(prompt.text.contains("SCHEMA (authoritative):"));
        assert!(prompt.text.contains("type Film { title: String }"));
        assert!(prompt.text.contains("Match the exact operation name: film."));
        assert!(prompt.text.contains("- input (declared): id: ID!, filmID: ID"));
        assert!(prompt.text.contains("Selection depth target: 2."));
        assert!(prompt.text.contains("reuse known-good values"));
        assert!(!prompt.text.contains("Schema not provided"));
        assert!(prompt.text.trim_end().ends_with("```"));
        assert_eq!(prompt.token_estimate, prompt.text.chars().count() as f64 / 4.0);
    }

    #[test]
    fn noschema_arm_uses_fallback_and_slices_known_values() {
        let graph = graph();
        let op = graph.operation("film").unwrap();
        let arm = find("noschema_min_known").unwrap();
        let prefetched: Vec<String> = (0..5).map(|i| format!("Fields:\n- id: {i}")).collect();
        let ctx = OperationContext::assemble(op, arm, &prefetched, arm.top_k, &[], 200);
        assert_eq!(ctx.known_values.len(), 3);

        let prompt = build_prompt(arm, &ctx);
        assert!(prompt.text.contains("Schema not provided: explore plausibly."));
        assert!(!prompt.text.contains("SCHEMA (authoritative)"));
        assert!(prompt.text.contains("- id: 2"));
        assert!(!prompt.text.contains("- id: 3"));
    }

    #[test]
    fn nulls_arm_names_only_optional_inputs() {
        let graph = graph();
        let op = graph.operation("film").unwrap();
        let arm = find("schema_min_nulls").unwrap();
        let ctx = OperationContext::assemble(op, arm, &[], arm.top_k, &[], 200);
        let prompt = build_prompt(arm, &ctx);
        assert!(prompt.text.contains("Optional inputs: filmID."));
        assert!(prompt.text.contains("never for non-null (!) fields"));
    }

    #[test]
    fn history_is_quoted_and_truncated() {
        let graph = graph();
        let op = graph.operation("film").unwrap();
        let long = "x".repeat(500);
        let result = ExecutionResult::new(
            "{\n  film(id: 1) {\n    title\n  }\n}",
            "schema_min_real",
            1,
            Execution {
                status: Some(200),
                body: json!({ "data": { "film": { "title": long } } }),
                elapsed_ms: 1,
                fallback: None,
            },
        );
        let arm = &ARMS[1];
        let ctx = OperationContext::assemble(op, arm, &[], arm.top_k, &[result], 64);
        assert!(ctx.history[0].body.ends_with("..."));
        assert_eq!(ctx.history[0].body.chars().count(), 67);

        let prompt = build_prompt(arm, &ctx);
        assert!(prompt.text.contains("Query: { film(id: 1) { title } } | Status: 200"));
        assert!(prompt.text.contains("synthesize realistic literals"));
    }
}
