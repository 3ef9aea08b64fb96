// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! `${{ ... }}` interpolation for commands, action parameters and job outputs

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use super::trigger::TriggerContext;
use crate::errors::JobflowError;

/// Outputs keyed by step id or job name
pub type OutputMap = HashMap<String, HashMap<String, String>>;

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{\{\s*([^}]*?)\s*\}\}").expect("expression pattern is valid")
    })
}

/// Values visible to an expression
pub struct ExprContext<'a> {
    pub trigger: &'a TriggerContext,
    pub env: &'a HashMap<String, String>,
    pub steps: &'a OutputMap,
    pub needs: &'a OutputMap,
}

impl ExprContext<'_> {
    /// Replace every `${{ path }}` in `input`
    pub fn interpolate(&self, input: &str) -> Result<String, JobflowError> {
        let mut out = String::with_capacity(input.len());
        let mut last = 0;

        for caps in pattern().captures_iter(input) {
            let whole = caps.get(0).expect("capture 0 always present");
            out.push_str(&input[last..whole.start()]);
            out.push_str(&self.resolve(&caps[1])?);
            last = whole.end();
        }

        out.push_str(&input[last..]);
        Ok(out)
    }

    /// Resolve a single dotted path
    pub fn resolve(&self, path: &str) -> Result<String, JobflowError> {
        let invalid = |reason: &str| JobflowError::InvalidExpression {
            expression: path.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = path.split('.').collect();
        match parts.as_slice() {
            ["trigger", field] => self
                .trigger
                .field(field)
                .ok_or_else(|| invalid("unknown trigger field")),
            ["env", name] => Ok(self.env.get(*name).cloned().unwrap_or_default()),
            ["steps", id, "outputs", key] => Ok(lookup(self.steps, id, key)),
            ["needs", job, "outputs", key] => Ok(lookup(self.needs, job, key)),
            [] | [""] => Err(invalid("empty expression")),
            _ => Err(invalid("unsupported path")),
        }
    }
}

fn lookup(map: &OutputMap, owner: &str, key: &str) -> String {
    map.get(owner)
        .and_then(|outputs| outputs.get(key))
        .cloned()
        .unwrap_or_default()
}

/// Step ids referenced as `steps.<id>.outputs.*` in `input`
pub fn referenced_steps(input: &str) -> Vec<String> {
    pattern()
        .captures_iter(input)
        .filter_map(|caps| {
            let parts: Vec<&str> = caps[1].split('.').collect();
            match parts.as_slice() {
                ["steps", id, "outputs", _] => Some(id.to_string()),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs(owner: &str, key: &str, value: &str) -> OutputMap {
        let mut inner = HashMap::new();
        inner.insert(key.to_string(), value.to_string());
        let mut map = HashMap::new();
        map.insert(owner.to_string(), inner);
        map
    }

    #[test]
    fn test_interpolate_mixed() {
        let trigger = TriggerContext::push("main").with_sha("deadbeef");
        let mut env = HashMap::new();
        env.insert("CRATE".to_string(), "demo".to_string());
        let steps = outputs("deployment", "page_url", "file:///site/");
        let needs = OutputMap::new();

        let ctx = ExprContext {
            trigger: &trigger,
            env: &env,
            steps: &steps,
            needs: &needs,
        };

        let rendered = ctx
            .interpolate("${{ env.CRATE }}@${{trigger.sha}} -> ${{ steps.deployment.outputs.page_url }}")
            .unwrap();
        assert_eq!(rendered, "demo@deadbeef -> file:///site/");
    }

    #[test]
    fn test_missing_output_is_empty() {
        let trigger = TriggerContext::push("main");
        let env = HashMap::new();
        let empty = OutputMap::new();
        let ctx = ExprContext {
            trigger: &trigger,
            env: &env,
            steps: &empty,
            needs: &empty,
        };

        assert_eq!(ctx.interpolate("[${{ needs.build.outputs.x }}]").unwrap(), "[]");
    }

    #[test]
    fn test_unknown_root_is_error() {
        let trigger = TriggerContext::push("main");
        let env = HashMap::new();
        let empty = OutputMap::new();
        let ctx = ExprContext {
            trigger: &trigger,
            env: &env,
            steps: &empty,
            needs: &empty,
        };

        assert!(matches!(
            ctx.interpolate("${{ secrets.TOKEN }}"),
            Err(JobflowError::InvalidExpression { .. })
        ));
        assert!(ctx.interpolate("${{ trigger.actor }}").is_err());
    }

    #[test]
    fn test_plain_text_untouched() {
        let trigger = TriggerContext::push("main");
        let env = HashMap::new();
        let empty = OutputMap::new();
        let ctx = ExprContext {
            trigger: &trigger,
            env: &env,
            steps: &empty,
            needs: &empty,
        };

        assert_eq!(ctx.interpolate("echo $HOME").unwrap(), "echo $HOME");
    }

    #[test]
    fn test_referenced_steps() {
        let refs = referenced_steps("${{ steps.a.outputs.x }} ${{ needs.b.outputs.y }}");
        assert_eq!(refs, vec!["a"]);
    }
}
