// SPDX-License-Identifier: MIT

//! Built-in handlers for `kind: handler` nodes
//!
//! - `decide_tool` writes `route`: `search`, `calculate` or `answer`
//! - `search` appends a lookup result to `messages`
//! - `calculator` evaluates the arithmetic found in `question`
//!
//! `search` and `calculator` also append their name to `tool_calls`.

pub mod calculator;
pub mod search;

use crate::adk::error::BoxError;
use crate::workflow::graph::node_fn;
use crate::workflow::registry::HandlerRegistry;
use crate::workflow::state::{StateUpdate, WorkflowState};

const SEARCH_WORDS: &[&str] = &["search", "find", "what is", "who is"];
const CALCULATE_WORDS: &[&str] = &["calculate", "compute", "+", "-", "*", "/"];

/// Register every built-in handler
pub async fn register_builtin_tools(registry: &HandlerRegistry) {
    registry.register("decide_tool", node_fn(decide_tool)).await;
    registry.register("search", node_fn(search_handler)).await;
    registry.register("calculator", node_fn(calculator_handler)).await;
}

fn question(state: &WorkflowState) -> Result<&str, BoxError> {
    state
        .get_str("question")
        .ok_or_else(|| "state field 'question' must be a string".into())
}

/// Pick the tool for the question; search wins over calculate
pub fn choose_tool(question: &str) -> &'static str {
    let question = question.to_lowercase();
    if SEARCH_WORDS.iter().any(|w| question.contains(w)) {
        "search"
    } else if CALCULATE_WORDS.iter().any(|w| question.contains(w)) {
        "calculate"
    } else {
        "answer"
    }
}

fn decide_tool(state: &WorkflowState) -> Result<StateUpdate, BoxError> {
    let route = choose_tool(question(state)?);
    log::debug!("Routing question to '{}'", route);
    Ok(StateUpdate::new().set("route", route))
}

fn search_handler(state: &WorkflowState) -> Result<StateUpdate, BoxError> {
    let result = search::search_web(question(state)?);
    Ok(StateUpdate::new()
        .set("messages", vec![format!("Search: {}", result)])
        .set("tool_calls", vec!["search_web"]))
}

fn calculator_handler(state: &WorkflowState) -> Result<StateUpdate, BoxError> {
    let result = match calculator::extract_expression(question(state)?) {
        Some(expr) => match calculator::evaluate(expr) {
            Ok(value) => format!("Result: {}", calculator::format_number(value)),
            Err(err) => format!("Error: {}", err),
        },
        None => "No valid expression found".to_string(),
    };
    Ok(StateUpdate::new()
        .set("messages", vec![format!("Calculate: {}", result)])
        .set("tool_calls", vec!["calculator"]))
}
