// SPDX-License-Identifier: MIT

//! Graph executor
//!
//! An [`Execution`] owns its state and walks the compiled plan one node at a
//! time: invoke, merge, route. Executions of the same [`CompiledGraph`] share
//! only the immutable plan and may run concurrently.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use super::compiler::{CompiledGraph, Plan};
use super::edge::Destination;
use super::trace::{ExecutionTrace, TraceEntry};
use crate::adk::error::BoxError;
use crate::workflow::error::{ExecutionError, GraphError, NodeTimeout};
use crate::workflow::state::{StateUpdate, WorkflowState};

/// Per-run settings
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Overrides the plan's step ceiling
    pub max_steps: Option<usize>,
    /// Record an [`ExecutionTrace`]
    pub trace: bool,
    /// Deadline for a single node invocation
    pub node_timeout: Option<Duration>,
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_trace(mut self) -> Self {
        self.trace = true;
        self
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Terminated,
    Failed,
}

impl ExecutionStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, ExecutionStatus::Terminated | ExecutionStatus::Failed)
    }
}

/// One completed transition
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub step: usize,
    pub node: String,
    pub update: StateUpdate,
    /// Merged state after this step
    pub state: WorkflowState,
    pub next: Destination,
}

/// Result of a run that reached END
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub execution_id: Uuid,
    pub state: WorkflowState,
    pub steps: usize,
    pub trace: Option<ExecutionTrace>,
}

/// Events emitted by [`CompiledGraph::stream`]
#[derive(Debug)]
pub enum ExecutionEvent {
    Step(StepRecord),
    Completed(ExecutionOutcome),
    Failed(ExecutionError),
}

/// A single run of a compiled graph
pub struct Execution {
    plan: Arc<Plan>,
    id: Uuid,
    state: WorkflowState,
    status: ExecutionStatus,
    current: Option<String>,
    steps: usize,
    max_steps: usize,
    node_timeout: Option<Duration>,
    trace: Option<ExecutionTrace>,
}

impl Execution {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    /// Last committed state
    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Node the next `step()` will invoke, if any
    pub fn current_node(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn trace(&self) -> Option<&ExecutionTrace> {
        self.trace.as_ref()
    }

    /// Perform one transition
    ///
    /// Returns `Ok(None)` once the execution has finished.
    pub async fn step(&mut self) -> Result<Option<StepRecord>, ExecutionError> {
        if self.status.is_finished() {
            return Ok(None);
        }
        let Some(node_name) = self.current.clone() else {
            return Ok(None);
        };

        if self.status == ExecutionStatus::Pending {
            log::info!(
                "Starting execution {} of graph '{}'",
                self.id,
                self.plan.name
            );
            self.status = ExecutionStatus::Running;
        }

        if self.steps >= self.max_steps {
            let limit = self.max_steps;
            return Err(self.fail(node_name, GraphError::StepLimitExceeded { limit }));
        }

        let Some(node) = self.plan.nodes.get(&node_name).cloned() else {
            let err = GraphError::UnknownDestination {
                from: self.plan.name.clone(),
                to: node_name.clone(),
            };
            return Err(self.fail(node_name, err));
        };

        self.steps += 1;
        log::debug!("Execution {}: step {} -> '{}'", self.id, self.steps, node_name);

        let started_at = Utc::now();
        let timer = Instant::now();
        let result = match self.node_timeout {
            Some(after) => match tokio::time::timeout(after, node.run(&self.state)).await {
                Ok(result) => result,
                Err(_) => Err(Box::new(NodeTimeout { after }) as BoxError),
            },
            None => node.run(&self.state).await,
        };
        let duration_ms = timer.elapsed().as_millis() as u64;

        let update = match result {
            Ok(update) => update,
            Err(source) => {
                let err = GraphError::NodeExecution {
                    node: node_name.clone(),
                    source,
                };
                return Err(self.fail(node_name, err));
            }
        };

        self.state = match self.state.merge(&update) {
            Ok(merged) => merged,
            Err(err) => return Err(self.fail(node_name, err)),
        };

        if let Some(trace) = self.trace.as_mut() {
            trace.entries.push(TraceEntry {
                step: self.steps,
                node: node_name.clone(),
                update: update.clone(),
                state: self.state.to_json(),
                started_at,
                duration_ms,
            });
        }

        let next = match self.plan.resolve(&node_name, &self.state) {
            Ok(next) => next,
            Err(err) => return Err(self.fail(node_name, err)),
        };

        match &next {
            Destination::End => {
                log::info!(
                    "Execution {} of graph '{}' terminated after {} steps",
                    self.id,
                    self.plan.name,
                    self.steps
                );
                self.status = ExecutionStatus::Terminated;
                self.current = None;
            }
            Destination::Node(name) => self.current = Some(name.clone()),
        }

        Ok(Some(StepRecord {
            step: self.steps,
            node: node_name,
            update,
            state: self.state.clone(),
            next,
        }))
    }

    /// Step until END or the first error
    pub async fn run(mut self) -> Result<ExecutionOutcome, ExecutionError> {
        while self.step().await?.is_some() {}
        Ok(self.into_outcome())
    }

    fn into_outcome(self) -> ExecutionOutcome {
        ExecutionOutcome {
            execution_id: self.id,
            state: self.state,
            steps: self.steps,
            trace: self.trace,
        }
    }

    fn fail(&mut self, node: String, error: GraphError) -> ExecutionError {
        log::error!(
            "Execution {} of graph '{}' failed at '{}': {}",
            self.id,
            self.plan.name,
            node,
            error
        );
        self.status = ExecutionStatus::Failed;
        self.current = None;
        ExecutionError {
            execution_id: self.id,
            node,
            step: self.steps,
            state: self.state.clone(),
            error,
        }
    }
}

impl CompiledGraph {
    /// Create a pending execution from caller-supplied initial values
    pub fn start(&self, initial: Value, config: RunConfig) -> Result<Execution, ExecutionError> {
        let id = Uuid::new_v4();
        let state = WorkflowState::from_json(Arc::clone(&self.plan.schema), initial).map_err(
            |error| ExecutionError {
                execution_id: id,
                node: self.plan.entry.clone(),
                step: 0,
                state: WorkflowState::new(Arc::clone(&self.plan.schema)),
                error,
            },
        )?;

        Ok(Execution {
            plan: Arc::clone(&self.plan),
            id,
            state,
            status: ExecutionStatus::Pending,
            current: Some(self.plan.entry.clone()),
            steps: 0,
            max_steps: config.max_steps.unwrap_or(self.plan.max_steps),
            node_timeout: config.node_timeout,
            trace: config.trace.then(|| ExecutionTrace::new(id)),
        })
    }

    /// Run to completion and return the final state
    pub async fn invoke(&self, initial: Value) -> Result<WorkflowState, ExecutionError> {
        Ok(self.invoke_with(initial, RunConfig::default()).await?.state)
    }

    pub async fn invoke_with(
        &self,
        initial: Value,
        config: RunConfig,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        self.start(initial, config)?.run().await
    }

    /// Run on a spawned task, yielding one event per step
    ///
    /// Dropping the stream abandons the execution at the next step boundary.
    pub fn stream(&self, initial: Value, config: RunConfig) -> ReceiverStream<ExecutionEvent> {
        let (tx, rx) = tokio::sync::mpsc::channel(32);

        let execution = self.start(initial, config);
        tokio::spawn(async move {
            let mut execution = match execution {
                Ok(execution) => execution,
                Err(err) => {
                    let _ = tx.send(ExecutionEvent::Failed(err)).await;
                    return;
                }
            };

            loop {
                match execution.step().await {
                    Ok(Some(record)) => {
                        if tx.send(ExecutionEvent::Step(record)).await.is_err() {
                            log::warn!(
                                "Stream receiver dropped; abandoning execution {}",
                                execution.id()
                            );
                            return;
                        }
                    }
                    Ok(None) => {
                        let _ = tx
                            .send(ExecutionEvent::Completed(execution.into_outcome()))
                            .await;
                        return;
                    }
                    Err(err) => {
                        let _ = tx.send(ExecutionEvent::Failed(err)).await;
                        return;
                    }
                }
            }
        });

        ReceiverStream::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::graph::{node_async, node_fn, router_fn, StateGraph, END, START};
    use crate::workflow::state::{FieldType, ReducerType, StateFieldDef, StateSchema};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_stream::StreamExt;

    fn counter_graph(calls: Arc<AtomicUsize>) -> CompiledGraph {
        let schema = StateSchema::new()
            .field(
                "count",
                StateFieldDef::new(FieldType::Integer).default_value(0),
            )
            .field(
                "history",
                StateFieldDef::new(FieldType::Array).reducer(ReducerType::Append),
            );
        let mut g = StateGraph::new("counter", schema);
        g.add_node(
            "process",
            node_fn(move |s: &WorkflowState| {
                calls.fetch_add(1, Ordering::SeqCst);
                let count = s.get_i64("count").unwrap_or(0) + 1;
                Ok(StateUpdate::new()
                    .set("count", count)
                    .set("history", format!("step {}", count)))
            }),
        )
        .unwrap();
        g.add_edge(START, "process").unwrap();
        g.add_conditional_edges(
            "process",
            router_fn(|s: &WorkflowState| {
                if s.get_i64("count").unwrap_or(0) < 5 {
                    "continue".to_string()
                } else {
                    "end".to_string()
                }
            }),
            [("continue", "process"), ("end", END)],
        )
        .unwrap();
        g.compile().unwrap()
    }

    #[tokio::test]
    async fn test_self_loop_runs_five_times() {
        let calls = Arc::new(AtomicUsize::new(0));
        let graph = counter_graph(calls.clone());

        let state = graph.invoke(json!({})).await.unwrap();
        assert_eq!(state.get_i64("count"), Some(5));
        assert_eq!(state.get_array("history").map(Vec::len), Some(5));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_step_by_step() {
        let graph = counter_graph(Arc::new(AtomicUsize::new(0)));
        let mut execution = graph.start(json!({"count": 3}), RunConfig::new()).unwrap();
        assert_eq!(execution.status(), ExecutionStatus::Pending);
        assert_eq!(execution.current_node(), Some("process"));

        let first = execution.step().await.unwrap().unwrap();
        assert_eq!(first.step, 1);
        assert_eq!(first.next, Destination::Node("process".to_string()));
        assert_eq!(execution.status(), ExecutionStatus::Running);

        let second = execution.step().await.unwrap().unwrap();
        assert_eq!(second.next, Destination::End);
        assert_eq!(execution.status(), ExecutionStatus::Terminated);
        assert_eq!(execution.state().get_i64("count"), Some(5));

        assert!(execution.step().await.unwrap().is_none());
        assert_eq!(execution.steps(), 2);
    }

    #[tokio::test]
    async fn test_step_limit() {
        let graph = counter_graph(Arc::new(AtomicUsize::new(0)));
        let err = graph
            .invoke_with(json!({}), RunConfig::new().with_max_steps(3))
            .await
            .unwrap_err();

        assert!(matches!(err.error, GraphError::StepLimitExceeded { limit: 3 }));
        assert_eq!(err.step, 3);
        assert_eq!(err.state.get_i64("count"), Some(3));
    }

    #[tokio::test]
    async fn test_invalid_initial_state() {
        let graph = counter_graph(Arc::new(AtomicUsize::new(0)));
        let err = graph.invoke(json!({"count": "three"})).await.unwrap_err();
        assert!(matches!(err.error, GraphError::SchemaViolation { .. }));
        assert_eq!(err.step, 0);

        let err = graph.invoke(json!({"unknown": 1})).await.unwrap_err();
        assert!(matches!(err.error, GraphError::SchemaViolation { ref field, .. } if field == "unknown"));
    }

    #[tokio::test]
    async fn test_unroutable_label_fails_execution() {
        let schema =
            StateSchema::new().field("x", StateFieldDef::new(FieldType::Integer).default_value(0));
        let mut g = StateGraph::new("bad-route", schema);
        g.add_node("a", node_fn(|_: &WorkflowState| Ok(StateUpdate::new().set("x", 1))))
            .unwrap();
        g.add_edge(START, "a").unwrap();
        g.add_conditional_edges(
            "a",
            router_fn(|_: &WorkflowState| "elsewhere".to_string()),
            [("done", END)],
        )
        .unwrap();
        let graph = g.compile().unwrap();

        let mut execution = graph.start(json!({}), RunConfig::new()).unwrap();
        let err = execution.step().await.unwrap_err();
        assert!(matches!(
            err.error,
            GraphError::UnroutableLabel { ref label, .. } if label == "elsewhere"
        ));
        assert_eq!(err.node, "a");
        assert_eq!(err.state.get_i64("x"), Some(1));
        assert_eq!(execution.status(), ExecutionStatus::Failed);
        assert!(execution.step().await.unwrap().is_none());

        // graph stays usable
        assert!(graph.invoke(json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_node_failure_and_bad_update() {
        let schema =
            StateSchema::new().field("x", StateFieldDef::new(FieldType::Integer).default_value(0));

        let mut g = StateGraph::new("fails", schema.clone());
        g.add_node("a", node_fn(|_: &WorkflowState| Err("model offline".into())))
            .unwrap();
        g.add_edge(START, "a").unwrap();
        g.add_edge("a", END).unwrap();
        let err = g.compile().unwrap().invoke(json!({})).await.unwrap_err();
        match err.error {
            GraphError::NodeExecution { node, source } => {
                assert_eq!(node, "a");
                assert_eq!(source.to_string(), "model offline");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let mut g = StateGraph::new("bad-update", schema);
        g.add_node(
            "a",
            node_fn(|_: &WorkflowState| Ok(StateUpdate::new().set("y", 1))),
        )
        .unwrap();
        g.add_edge(START, "a").unwrap();
        g.add_edge("a", END).unwrap();
        let err = g.compile().unwrap().invoke(json!({"x": 4})).await.unwrap_err();
        assert!(matches!(err.error, GraphError::SchemaViolation { .. }));
        assert_eq!(err.state.get_i64("x"), Some(4));
    }

    #[tokio::test]
    async fn test_node_timeout() {
        let mut g = StateGraph::new("slow", StateSchema::new());
        g.add_node(
            "slow",
            node_async(|_: WorkflowState| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(StateUpdate::new())
            }),
        )
        .unwrap();
        g.add_edge(START, "slow").unwrap();
        g.add_edge("slow", END).unwrap();

        let err = g
            .compile()
            .unwrap()
            .invoke_with(
                json!({}),
                RunConfig::new().with_node_timeout(Duration::from_millis(20)),
            )
            .await
            .unwrap_err();
        match err.error {
            GraphError::NodeExecution { source, .. } => {
                assert!(source.downcast_ref::<NodeTimeout>().is_some())
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_trace_records_each_step() {
        let graph = counter_graph(Arc::new(AtomicUsize::new(0)));
        let outcome = graph
            .invoke_with(json!({"count": 2}), RunConfig::new().with_trace())
            .await
            .unwrap();

        let trace = outcome.trace.unwrap();
        assert_eq!(trace.execution_id, outcome.execution_id);
        assert_eq!(trace.path(), vec!["process", "process", "process"]);
        assert_eq!(trace.entries[0].state["count"], json!(3));
        assert_eq!(trace.entries[2].update.get("count"), Some(&json!(5)));
        assert_eq!(outcome.steps, 3);
    }

    #[tokio::test]
    async fn test_concurrent_executions_are_isolated() {
        let graph = counter_graph(Arc::new(AtomicUsize::new(0)));

        let handles: Vec<_> = (0..4)
            .map(|start| {
                let graph = graph.clone();
                tokio::spawn(async move { graph.invoke(json!({"count": start})).await })
            })
            .collect();

        for handle in handles {
            let state = handle.await.unwrap().unwrap();
            assert_eq!(state.get_i64("count"), Some(5));
        }
    }

    #[tokio::test]
    async fn test_stream_events() {
        let graph = counter_graph(Arc::new(AtomicUsize::new(0)));
        let events: Vec<ExecutionEvent> =
            graph.stream(json!({"count": 3}), RunConfig::new()).collect().await;

        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], ExecutionEvent::Step(ref r) if r.step == 1));
        match &events[2] {
            ExecutionEvent::Completed(outcome) => {
                assert_eq!(outcome.state.get_i64("count"), Some(5))
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_reports_failure() {
        let graph = counter_graph(Arc::new(AtomicUsize::new(0)));
        let mut stream = graph.stream(json!({"count": "x"}), RunConfig::new());
        assert!(matches!(stream.next().await, Some(ExecutionEvent::Failed(_))));
        assert!(stream.next().await.is_none());
    }
}
