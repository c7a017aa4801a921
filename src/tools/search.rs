// SPDX-License-Identifier: MIT

//! Offline stand-in for a web search

use once_cell::sync::Lazy;
use std::collections::HashMap;

static ANSWERS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (
            "langgraph",
            "LangGraph is a library for building stateful, multi-agent applications.",
        ),
        (
            "langgraph benefits",
            "Key benefits: state management, cycles, human-in-the-loop, persistence.",
        ),
    ])
});

/// Canned answer for a known query, a generic result line otherwise
pub fn search_web(query: &str) -> String {
    let key = query.trim().to_lowercase();
    match ANSWERS.get(key.as_str()) {
        Some(answer) => answer.to_string(),
        None => format!("Search results for: {}", query),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_unknown_queries() {
        assert!(search_web("LangGraph").starts_with("LangGraph is a library"));
        assert!(search_web(" langgraph benefits ").starts_with("Key benefits"));
        assert_eq!(
            search_web("Who is Ada?"),
            "Search results for: Who is Ada?"
        );
    }
}
