// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Expression evaluation contract.
//!
//! Key, condition, and TTL expressions are opaque strings to the engine; an
//! injected [`Evaluator`] interprets them against an [`EvalContext`] that
//! exposes each call argument by its parameter name. The engine never
//! assumes a dialect: the bundled [`SimpleEvaluator`] covers variable
//! references, property access, concatenation, comparisons, and ternaries,
//! and any other implementation can be swapped in.
//!
//! Batch projection rebinds the pivot variable per element via
//! [`EvalContext::rebound`], leaving every other binding stable.

pub mod simple;

pub use simple::SimpleEvaluator;

use serde_json::Value;

/// Expression evaluation error.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("parse error in '{expr}': {message}")]
    Parse { expr: String, message: String },

    #[error("unknown variable #{0}")]
    UnknownVariable(String),

    #[error("evaluation failed: {0}")]
    Eval(String),
}

/// The shape of a cached call as handed over by the interception layer:
/// the argument vector and the matching parameter names.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    pub param_names: &'a [String],
    pub args: &'a [Value],
}

impl<'a> CallContext<'a> {
    #[must_use]
    pub fn new(param_names: &'a [String], args: &'a [Value]) -> Self {
        Self { param_names, args }
    }

    /// The evaluation context for this call.
    #[must_use]
    pub fn eval_context(&self) -> EvalContext<'a> {
        EvalContext {
            names: self.param_names,
            args: self.args,
            rebound: None,
        }
    }
}

/// Variable bindings visible to an expression: each argument under its
/// parameter name, plus at most one rebound variable shadowing its
/// positional value (how the batch engine projects the pivot collection
/// onto its elements).
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    names: &'a [String],
    args: &'a [Value],
    rebound: Option<(&'a str, &'a Value)>,
}

impl<'a> EvalContext<'a> {
    #[must_use]
    pub fn new(names: &'a [String], args: &'a [Value]) -> Self {
        Self { names, args, rebound: None }
    }

    /// A copy of this context with `name` rebound to `value`.
    #[must_use]
    pub fn rebound(&self, name: &'a str, value: &'a Value) -> Self {
        Self {
            names: self.names,
            args: self.args,
            rebound: Some((name, value)),
        }
    }

    /// Look up a variable by parameter name.
    #[must_use]
    pub fn var(&self, name: &str) -> Option<&'a Value> {
        if let Some((rebound_name, value)) = self.rebound {
            if rebound_name == name {
                return Some(value);
            }
        }
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.args.get(i))
    }

    /// Iterate bindings in declaration order (rebinding applied).
    pub fn bindings(&self) -> impl Iterator<Item = (&'a str, &'a Value)> + '_ {
        self.names.iter().zip(self.args.iter()).map(|(n, v)| {
            match self.rebound {
                Some((rn, rv)) if rn == n.as_str() => (n.as_str(), rv),
                _ => (n.as_str(), v),
            }
        })
    }
}

/// Injected expression evaluator.
///
/// Implementations must be cheap to call on the hot path; parsed-expression
/// memoization belongs inside the implementation (descriptor expressions
/// repeat for the life of the process).
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, expr: &str, ctx: &EvalContext<'_>) -> Result<Value, EvalError>;
}

/// Coerce an evaluated value into the string form used as a key suffix.
///
/// Strings are taken verbatim; everything else renders as its JSON text.
#[must_use]
pub fn key_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Condition-gate truthiness: only boolean `true` passes.
#[must_use]
pub fn as_condition(value: &Value) -> bool {
    value.as_bool().unwrap_or(false)
}

/// Coerce an evaluated TTL value into seconds, if it is numeric (or a
/// numeric string, which some dialects produce from concatenation).
#[must_use]
pub fn as_ttl_secs(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn var_lookup_by_position() {
        let names = names(&["id", "region"]);
        let args = vec![json!(42), json!("eu")];
        let ctx = EvalContext::new(&names, &args);

        assert_eq!(ctx.var("id"), Some(&json!(42)));
        assert_eq!(ctx.var("region"), Some(&json!("eu")));
        assert_eq!(ctx.var("missing"), None);
    }

    #[test]
    fn rebound_shadows_only_the_named_variable() {
        let names = names(&["ids", "region"]);
        let args = vec![json!([1, 2, 3]), json!("eu")];
        let ctx = EvalContext::new(&names, &args);

        let element = json!(2);
        let rebound = ctx.rebound("ids", &element);
        assert_eq!(rebound.var("ids"), Some(&json!(2)));
        assert_eq!(rebound.var("region"), Some(&json!("eu")));

        // The original context is untouched
        assert_eq!(ctx.var("ids"), Some(&json!([1, 2, 3])));
    }

    #[test]
    fn key_string_coercion() {
        assert_eq!(key_string(&json!("abc")), "abc");
        assert_eq!(key_string(&json!(42)), "42");
        assert_eq!(key_string(&json!(true)), "true");
        assert_eq!(key_string(&json!(null)), "null");
    }

    #[test]
    fn condition_requires_boolean_true() {
        assert!(as_condition(&json!(true)));
        assert!(!as_condition(&json!(false)));
        assert!(!as_condition(&json!(1)));
        assert!(!as_condition(&json!("true")));
        assert!(!as_condition(&json!(null)));
    }

    #[test]
    fn ttl_coercion() {
        assert_eq!(as_ttl_secs(&json!(30)), Some(30));
        assert_eq!(as_ttl_secs(&json!(-5)), Some(-5));
        assert_eq!(as_ttl_secs(&json!("45")), Some(45));
        assert_eq!(as_ttl_secs(&json!(null)), None);
        assert_eq!(as_ttl_secs(&json!([1])), None);
    }
}
