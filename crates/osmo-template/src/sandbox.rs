//! The pure (non-isolated) render step run inside each worker (spec §4.2).
//!
//! `minijinja` is itself the sandbox: unlike a general-purpose scripting
//! language it has no reflective access to the host's object graph, so
//! "forbidden constructs" reduces to configuring the environment so that
//! undefined variables raise strictly and no filter/function we register
//! leaks runtime internals back into the template.

use std::collections::BTreeMap;

use minijinja::value::Value as JinjaValue;
use minijinja::{Environment, UndefinedBehavior};
use serde_json::{Map, Value};

use crate::TemplateError;

const DEFAULT_VALUES_KEY: &str = "default-values";

/// Merges the spec's top-level `default-values:` block with explicit `--set`
/// variables; explicit wins (spec §4.2 "merged under explicit `--set`
/// variables (explicit wins)").
pub fn merge_variables(spec: &Value, explicit: &BTreeMap<String, Value>) -> Map<String, Value> {
    let mut merged = match spec.get(DEFAULT_VALUES_KEY) {
        Some(Value::Object(defaults)) => defaults.clone(),
        _ => Map::new(),
    };
    for (key, value) in explicit {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Builds the sandboxed environment for a single render. A fresh environment
/// per call keeps workers stateless between requests (spec §4.2 step 3: the
/// worker "receives `(args, kwargs)` tuples" rather than holding a session).
fn build_environment<'a>() -> Environment<'a> {
    let mut env = Environment::new();
    // Undefined variables raise strictly (spec §4.2: "no implicit empty values").
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    // No custom filters/functions are registered, so templates can only reach
    // the expression/loop/conditional/formatting primitives minijinja exposes
    // natively -- never a reference into this process's object graph.
    env
}

/// Renders `template_text` against `variables`, returning the expanded text
/// or a [`TemplateError`] classifying why it failed (spec §4.2 contract).
///
/// This function does the CPU/memory work; the caller (the worker loop in
/// [`crate::worker`]) is responsible for enforcing wall-clock and memory caps
/// around it, since `minijinja` itself has no such primitives.
pub fn render_once(template_text: &str, variables: &Map<String, Value>) -> Result<String, TemplateError> {
    let env = build_environment();
    let template = env
        .template_from_str(template_text)
        .map_err(|e| TemplateError::Syntax(e.to_string()))?;
    let ctx = JinjaValue::from_serialize(variables);
    template.render(ctx).map_err(|e| classify_render_error(e))
}

fn classify_render_error(err: minijinja::Error) -> TemplateError {
    use minijinja::ErrorKind as MjErrorKind;
    match err.kind() {
        MjErrorKind::UndefinedError => TemplateError::UndefinedVariable(undefined_name(&err)),
        MjErrorKind::SyntaxError | MjErrorKind::TemplateNotFound => TemplateError::Syntax(err.to_string()),
        MjErrorKind::InvalidOperation | MjErrorKind::UnknownFilter | MjErrorKind::UnknownFunction => {
            TemplateError::Forbidden(err.to_string())
        }
        _ => TemplateError::Internal(err.to_string()),
    }
}

fn undefined_name(err: &minijinja::Error) -> String {
    // minijinja folds the offending expression into the message; surface it
    // verbatim rather than re-parsing.
    err.to_string()
}
