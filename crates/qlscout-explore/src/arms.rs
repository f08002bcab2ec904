//! The fixed catalogue of generation strategies.
//!
//! Each arm fixes how a prompt is built: whether the relevant schema is shown,
//! how arguments should be chosen, how deep selections may go, and how many
//! known-value snippets are included.

use serde::Serialize;

/// How the model is told to fill in arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgMode {
    /// Reuse values seen in context and earlier successful responses.
    Known,
    /// Synthesize realistic literals by type.
    Real,
    /// Probe optional inputs with null/empty values.
    Nulls,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Arm {
    pub name: &'static str,
    pub include_schema: bool,
    pub arg_mode: ArgMode,
    pub depth: u8,
    pub top_k: usize,
}

const fn arm(
    name: &'static str,
    include_schema: bool,
    arg_mode: ArgMode,
    depth: u8,
    top_k: usize,
) -> Arm {
    Arm {
        name,
        include_schema,
        arg_mode,
        depth,
        top_k,
    }
}

pub const ARMS: [Arm; 8] = [
    arm("schema_min_known", true, ArgMode::Known, 1, 3),
    arm("schema_min_real", true, ArgMode::Real, 1, 3),
    arm("schema_mod_known", true, ArgMode::Known, 2, 5),
    arm("noschema_min_known", false, ArgMode::Known, 1, 3),
    arm("noschema_min_real", false, ArgMode::Real, 1, 0),
    arm("schema_min_nulls", true, ArgMode::Nulls, 1, 3),
    arm("schema_deep_known", true, ArgMode::Known, 3, 5),
    arm("schema_deep_real", true, ArgMode::Real, 3, 5),
];

/// Largest `top_k` any arm asks for.
pub fn max_top_k() -> usize {
    ARMS.iter().map(|a| a.top_k).max().unwrap_or(0)
}

pub fn find(name: &str) -> Option<&'static Arm> {
    ARMS.iter().find(|a| a.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalogue_is_unique_and_ordered() {
        let names: HashSet<_> = ARMS.iter().map(|a| a.name).collect();
        assert_eq!(names.len(), ARMS.len());
        assert_eq!(ARMS[0].name, "schema_min_known");
        assert_eq!(ARMS[7].name, "schema_deep_real");
    }

    #[test]
    fn only_noschema_arms_hide_schema() {
        for arm in &ARMS {
            assert_eq!(arm.include_schema, !arm.name.starts_with("noschema"));
        }
        assert_eq!(find("noschema_min_real").unwrap().top_k, 0);
        assert_eq!(max_top_k(), 5);
        assert!(find("nope").is_none());
    }
}
