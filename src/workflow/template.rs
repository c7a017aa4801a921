// SPDX-License-Identifier: MIT

//! Prompt templates filled from workflow state
//!
//! `{field}` and `{a.b}` are replaced by the textual form of the value at that
//! path; `{{` and `}}` produce literal braces. Missing values render empty.

use serde_json::Value;

use crate::workflow::state::WorkflowState;

/// Render `template` against `state`
pub fn render_template(template: &str, state: &WorkflowState) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut path = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == '}' {
                        closed = true;
                        break;
                    }
                    path.push(next);
                }
                if closed {
                    if let Some(value) = state.get_path(path.trim()) {
                        out.push_str(&value_to_text(value));
                    }
                } else {
                    out.push('{');
                    out.push_str(&path);
                }
            }
            other => out.push(other),
        }
    }

    out
}

/// Convert a JSON value to readable text
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .iter()
            .map(|(k, v)| format!("{}: {}", k, value_to_text(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Array(arr) => arr.iter().map(value_to_text).collect::<Vec<_>>().join("\n"),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
    }
}
