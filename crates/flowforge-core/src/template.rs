//! Template resolver (spec §4.4).
//!
//! Substitutes `{{key}}` and `{{key.data}}` in strings given an artifact
//! map. Substitution is single-pass — it never recurses into substituted
//! text, which rules out template-injection loops by construction.

use std::collections::HashMap;

use crate::artifact::Artifact;

/// The context a template resolves against: node id (or user-input alias)
/// -> that node's artifacts.
pub type ArtifactMap = HashMap<String, Vec<Artifact>>;

/// Prefix used to disambiguate a caller-supplied input from a node output
/// sharing the same name (spec §4.4).
pub const USER_INPUT_PREFIX: &str = "__user_input__";

pub fn user_input_alias(input_name: &str) -> String {
    format!("{USER_INPUT_PREFIX}{input_name}")
}

/// Resolve every `{{...}}` reference in `template` against `artifacts`.
/// Unknown keys are left verbatim — template resolution never errors.
pub fn resolve(template: &str, artifacts: &ArtifactMap) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(end_rel) = rest[start..].find("}}") else {
            // Unterminated reference: copy the remainder verbatim.
            out.push_str(rest);
            return out;
        };
        let end = start + end_rel;

        out.push_str(&rest[..start]);

        let key_expr = rest[start + 2..end].trim();
        out.push_str(&resolve_one(key_expr, artifacts));

        rest = &rest[end + 2..];
    }
    out.push_str(rest);
    out
}

fn resolve_one(key_expr: &str, artifacts: &ArtifactMap) -> String {
    let (key, wants_data) = match key_expr.strip_suffix(".data") {
        Some(k) => (k.trim(), true),
        None => (key_expr, false),
    };

    let Some(list) = artifacts.get(key) else {
        // Unknown key: leave verbatim.
        return format!("{{{{{key_expr}}}}}");
    };

    if wants_data {
        return crate::artifact::first_data_of(list)
            .map(|v| v.to_string())
            .unwrap_or_default();
    }

    if let Some(text) = crate::artifact::first_text_of(list) {
        return text.to_string();
    }
    crate::artifact::first_data_of(list)
        .map(|v| v.to_string())
        .unwrap_or_default()
}

/// Boolean-coerce a resolved template string: `"true"`/non-empty, non-"false"
/// JSON-ish values count as truthy. Used by edge `condition` and loop
/// `exit_when` evaluation after template substitution (spec §4.5, §9).
pub fn is_truthy(resolved: &str) -> bool {
    let trimmed = resolved.trim();
    !(trimmed.is_empty() || trimmed == "false" || trimmed == "0" || trimmed == "null")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Artifact;

    fn artifacts() -> ArtifactMap {
        let mut m = HashMap::new();
        m.insert("x".to_string(), vec![Artifact::from_text("hello")]);
        m.insert(
            "y".to_string(),
            vec![Artifact::from_data(serde_json::json!({"n": 42}))],
        );
        m
    }

    #[test]
    fn substitutes_text_and_data_refs() {
        let out = resolve("A {{x}} B {{y.data}}", &artifacts());
        assert_eq!(out, "A hello B {\"n\":42}");
    }

    #[test]
    fn unknown_keys_are_left_verbatim() {
        let out = resolve("value: {{missing}}", &artifacts());
        assert_eq!(out, "value: {{missing}}");
    }

    #[test]
    fn data_only_artifact_falls_back_for_bare_key() {
        let out = resolve("{{y}}", &artifacts());
        assert_eq!(out, "{\"n\":42}");
    }

    #[test]
    fn resolution_is_idempotent() {
        let map = artifacts();
        let once = resolve("A {{x}} B {{y.data}}", &map);
        let twice = resolve(&once, &map);
        assert_eq!(once, twice);
    }

    #[test]
    fn does_not_recurse_into_substituted_text() {
        let mut m = HashMap::new();
        m.insert(
            "injected".to_string(),
            vec![Artifact::from_text("{{x}}")],
        );
        m.insert("x".to_string(), vec![Artifact::from_text("hello")]);
        // The substituted text "{{x}}" is not re-scanned.
        let out = resolve("{{injected}}", &m);
        assert_eq!(out, "{{x}}");
    }

    #[test]
    fn user_input_is_addressable_under_both_names() {
        let mut m = HashMap::new();
        m.insert("X".to_string(), vec![Artifact::from_text("caller value")]);
        m.insert(
            user_input_alias("X"),
            vec![Artifact::from_text("caller value")],
        );
        assert_eq!(resolve("{{X}}", &m), "caller value");
        assert_eq!(resolve("{{__user_input__X}}", &m), "caller value");
    }

    #[test]
    fn truthiness_rules() {
        assert!(is_truthy("true"));
        assert!(is_truthy("stop"));
        assert!(!is_truthy("false"));
        assert!(!is_truthy(""));
        assert!(!is_truthy("0"));
    }
}
