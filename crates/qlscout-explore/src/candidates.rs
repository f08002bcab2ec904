//! Candidate extraction from raw model output.

use qlscout_core::fix_operation_case;
use serde::Serialize;

const FENCE_OPEN: &str = "```graphql";
const FENCE_CLOSE: &str = "```";

/// One query pulled out of a model response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateQuery {
    pub text: String,
    pub arm_name: &'static str,
    /// 1-based index of the fenced block this candidate came from.
    pub parse_attempt: usize,
}

/// Pulls fenced ```` ```graphql ```` blocks out of `response`.
///
/// At most `max_blocks` blocks are examined. Each block is case-fixed against
/// `operation`, blank blocks are dropped, and duplicates within the response
/// are kept once. An unterminated final block runs to the end of the text.
pub fn extract_candidates(
    response: &str,
    operation: &str,
    arm_name: &'static str,
    max_blocks: usize,
) -> Vec<CandidateQuery> {
    let mut candidates: Vec<CandidateQuery> = Vec::new();
    let mut rest = response;
    let mut attempts = 0;

    while attempts < max_blocks {
        let Some(open) = rest.find(FENCE_OPEN) else {
            break;
        };
        attempts += 1;

        let body = &rest[open + FENCE_OPEN.len()..];
        let (block, remainder) = match body.find(FENCE_CLOSE) {
            Some(close) => (&body[..close], &body[close + FENCE_CLOSE.len()..]),
            None => (body, ""),
        };
        rest = remainder;

        let trimmed = block.trim();
        if trimmed.is_empty() {
            continue;
        }
        let text = fix_operation_case(trimmed, operation);
        if candidates.iter().any(|c| c.text == text) {
            continue;
        }
        candidates.push(CandidateQuery {
            text,
            arm_name,
            parse_attempt: attempts,
        });
    }
    candidates
}
