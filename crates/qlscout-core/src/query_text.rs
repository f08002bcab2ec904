//! Best-effort text utilities over generated GraphQL documents.
//!
//! Nothing here is a GraphQL parser. Documents come straight out of an LLM and
//! are frequently invalid, so every function is total: unexpected input
//! degrades to "unchanged" or "nothing found", never to a panic.

use std::collections::BTreeSet;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::coverage::extract_field_paths;

const OPERATION_KEYWORDS: [&str; 3] = ["query", "mutation", "subscription"];

/// Rewrites the first top-level field name to `exact_name`.
///
/// LLMs routinely emit `FilmById` for an operation named `filmById`; the
/// target rejects the former outright. The first identifier of at least two
/// characters directly after a `{` (optionally after `alias:`) is replaced.
/// `{` characters inside string literals are ignored and literal contents are
/// never touched. Text without a usable `{`, and an empty `exact_name`, leave
/// the document unchanged.
pub fn fix_operation_case(text: &str, exact_name: &str) -> String {
    if exact_name.is_empty() {
        return text.to_string();
    }

    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => i = string_end(bytes, i).unwrap_or(i + 1),
            b'{' => {
                if let Some(span) = leading_field_span(bytes, i + 1, 2) {
                    let mut fixed = String::with_capacity(text.len() + exact_name.len());
                    fixed.push_str(&text[..span.start]);
                    fixed.push_str(exact_name);
                    fixed.push_str(&text[span.end..]);
                    return fixed;
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    text.to_string()
}

/// Returns the field selected first in the outermost selection set, looking
/// through an alias.
pub fn extract_top_level_field(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => i = string_end(bytes, i).unwrap_or(i + 1),
            b'#' => i = line_end(bytes, i),
            b'{' => {
                return leading_field_span(bytes, i + 1, 1).map(|span| text[span].to_string());
            }
            _ => i += 1,
        }
    }
    None
}

/// Returns the operation name of `query Name { ... }` style documents.
pub fn extract_operation_name(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut i = skip_trivia(bytes, 0);
    let keyword = ident_span(bytes, i)?;
    if !OPERATION_KEYWORDS.contains(&&text[keyword.clone()]) {
        return None;
    }
    i = skip_trivia(bytes, keyword.end);
    ident_span(bytes, i).map(|name| text[name].to_string())
}

/// Field names and dotted edge paths selected by a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInventory {
    /// Every selected field name, regardless of depth.
    pub fields: BTreeSet<String>,
    /// Every selection path with a parent, e.g. `film.title`.
    pub edges: BTreeSet<String>,
}

/// Summarizes which fields a document selects.
pub fn field_inventory(text: &str) -> FieldInventory {
    let mut inventory = FieldInventory::default();
    for path in extract_field_paths(text) {
        if let Some(last) = path.rsplit('.').next() {
            inventory.fields.insert(last.to_string());
        }
        if path.contains('.') {
            inventory.edges.insert(path);
        }
    }
    inventory
}

/// Byte index just past the string literal opening at `start`, or `None`
/// when the quote is unterminated and should be read as a lone character.
pub(crate) fn string_end(bytes: &[u8], start: usize) -> Option<usize> {
    if bytes[start..].starts_with(b"\"\"\"") {
        let body = start + 3;
        return bytes[body..]
            .windows(3)
            .position(|w| w == b"\"\"\"")
            .map(|offset| body + offset + 3);
    }

    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

pub(crate) fn line_end(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |offset| start + offset)
}

pub(crate) fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

pub(crate) fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

pub(crate) fn ident_span(bytes: &[u8], start: usize) -> Option<Range<usize>> {
    if !bytes.get(start).copied().is_some_and(is_ident_start) {
        return None;
    }
    let len = bytes[start..]
        .iter()
        .take_while(|&&b| is_ident_continue(b))
        .count();
    Some(start..start + len)
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
        i += 1;
    }
    i
}

fn skip_trivia(bytes: &[u8], mut i: usize) -> usize {
    loop {
        i = skip_whitespace(bytes, i);
        if bytes.get(i) == Some(&b'#') {
            i = line_end(bytes, i);
        } else {
            return i;
        }
    }
}

/// Span of the field name right after a `{`, honoring `alias:`.
fn leading_field_span(bytes: &[u8], from: usize, min_len: usize) -> Option<Range<usize>> {
    let first = ident_span(bytes, skip_whitespace(bytes, from))?;

    let after = skip_whitespace(bytes, first.end);
    if bytes.get(after) == Some(&b':') {
        let aliased = ident_span(bytes, skip_whitespace(bytes, after + 1));
        if let Some(field) = aliased.filter(|span| span.len() >= min_len) {
            return Some(field);
        }
    }

    (first.len() >= min_len).then_some(first)
}
