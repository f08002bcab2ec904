//! Field-path coverage tracking.
//!
//! # Paths
//!
//! A field path is the dotted chain of field names from the top-level
//! selection down to a field, e.g. `film.director.name`. Paths are extracted
//! from query text with a tolerant tokenizer (see [`extract_field_paths`]).
//!
//! # Persistence
//!
//! [`CoverageTracker`] owns the per-operation path sets for one run. Sets only
//! grow. When opened on a file, every growth is written back as a JSON object
//! of `operation -> [paths]`, and reopening the same file resumes from it.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CoreError;
use crate::query_text::{ident_span, line_end, string_end};
use crate::types::OperationDef;

const KEYWORDS: [&str; 8] = [
    "query",
    "mutation",
    "subscription",
    "fragment",
    "on",
    "true",
    "false",
    "null",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Ident(&'a str),
    Open,
    Close,
    Colon,
}

fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// Splits a document into identifiers and `{ } :`.
///
/// Comments, string literals, parenthesized argument lists, `$variables` and
/// `@directives` are dropped entirely; everything else that is not one of the
/// four token kinds is skipped.
fn tokenize(text: &str) -> Vec<Token<'_>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'#' => i = line_end(bytes, i),
            b'"' => i = string_end(bytes, i).unwrap_or(i + 1),
            b'(' => i = arguments_end(bytes, i),
            b'$' | b'@' => {
                i = ident_span(bytes, i + 1).map_or(i + 1, |span| span.end);
            }
            b'{' => {
                tokens.push(Token::Open);
                i += 1;
            }
            b'}' => {
                tokens.push(Token::Close);
                i += 1;
            }
            b':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            _ => match ident_span(bytes, i) {
                Some(span) => {
                    i = span.end;
                    tokens.push(Token::Ident(&text[span]));
                }
                None => i += 1,
            },
        }
    }
    tokens
}

/// Index just past the `)` matching the `(` at `start`; end of input when
/// unbalanced.
fn arguments_end(bytes: &[u8], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i = string_end(bytes, i).unwrap_or(i + 1);
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

/// Extracts every selected field path from `text`.
///
/// `alias: field` records `field`. A field only becomes a path prefix when it
/// opens a selection set; anonymous braces (the operation body, inline
/// fragments, fragment definitions) nest without adding a segment. Operation
/// names, fragment names, and type conditions are not fields. Malformed text
/// yields whatever paths could be recovered.
pub fn extract_field_paths(text: &str) -> BTreeSet<String> {
    let tokens = tokenize(text);
    let mut paths = BTreeSet::new();
    let mut frames: Vec<Option<&str>> = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        match tokens[i] {
            Token::Open => {
                frames.push(None);
                i += 1;
            }
            Token::Close => {
                frames.pop();
                i += 1;
            }
            Token::Colon => i += 1,
            Token::Ident(word) if is_keyword(word) => {
                i += 1;
                let named = matches!(
                    word,
                    "query" | "mutation" | "subscription" | "fragment" | "on"
                );
                if let (true, Some(Token::Ident(name))) = (named, tokens.get(i)) {
                    if !is_keyword(name) {
                        i += 1;
                    }
                }
            }
            Token::Ident(word) => {
                let (field, next) = match (tokens.get(i + 1), tokens.get(i + 2)) {
                    (Some(Token::Colon), Some(Token::Ident(real))) if !is_keyword(real) => {
                        (*real, i + 3)
                    }
                    _ => (word, i + 1),
                };

                let path = frames
                    .iter()
                    .flatten()
                    .copied()
                    .chain(std::iter::once(field))
                    .collect::<Vec<_>>()
                    .join(".");
                paths.insert(path);

                if tokens.get(next) == Some(&Token::Open) {
                    frames.push(Some(field));
                    i = next + 1;
                } else {
                    i = next;
                }
            }
        }
    }
    paths
}

/// Enumerates every `op.field...` path reachable through the operation's
/// relevant schema. Each object type is expanded at most once, so cyclic
/// schemas terminate.
pub fn schema_field_paths(op: &OperationDef) -> BTreeSet<String> {
    let mut paths = BTreeSet::new();
    let mut expanded: HashSet<&str> = HashSet::new();
    let mut pending: Vec<(&str, String)> = vec![(op.output_type.as_str(), op.name.clone())];

    while let Some((type_name, prefix)) = pending.pop() {
        let Some(type_def) = op.relevant_schema.get(type_name) else {
            continue;
        };
        if !expanded.insert(type_name) {
            continue;
        }
        for field in &type_def.fields {
            let path = format!("{prefix}.{}", field.name);
            paths.insert(path.clone());
            if op.relevant_schema.contains_key(field.type_name.as_str()) {
                pending.push((field.type_name.as_str(), path));
            }
        }
    }
    paths
}

/// Per-operation coverage sets for one run.
#[derive(Debug, Default)]
pub struct CoverageTracker {
    state: BTreeMap<String, BTreeSet<String>>,
    store: Option<PathBuf>,
}

impl CoverageTracker {
    /// A tracker that never touches disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens (or starts) the coverage file at `path`.
    ///
    /// A missing or empty file starts from nothing; an unreadable or
    /// malformed file is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let store = path.into();
        let state = match fs::read_to_string(&store) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(CoreError::ArtifactIo {
                    path: store.display().to_string(),
                    source,
                })
            }
        };
        Ok(CoverageTracker {
            state,
            store: Some(store),
        })
    }

    /// Merges the paths selected by `text` into `op`'s set.
    ///
    /// Returns `Ok(true)` when at least one path was new. The merge happens in
    /// memory before the file is written, so an `Err` means new paths were
    /// found and recorded but could not be persisted.
    pub fn compute_delta(&mut self, op: &str, text: &str) -> Result<bool, CoreError> {
        let candidate = extract_field_paths(text);
        let known = self.state.entry(op.to_string()).or_default();
        let before = known.len();
        known.extend(candidate);
        if known.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Paths recorded so far for `op`.
    pub fn paths(&self, op: &str) -> Option<&BTreeSet<String>> {
        self.state.get(op)
    }

    /// The backing file, if any.
    pub fn store_path(&self) -> Option<&Path> {
        self.store.as_deref()
    }

    fn persist(&self) -> Result<(), CoreError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.state)?;
        fs::write(store, json).map_err(|source| CoreError::ArtifactIo {
            path: store.display().to_string(),
            source,
        })
    }
}
