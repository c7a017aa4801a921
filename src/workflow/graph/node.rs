// SPDX-License-Identifier: MIT

//! Node trait and closure adapters

use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;

use crate::adk::error::BoxError;
use crate::workflow::state::{StateUpdate, WorkflowState};

/// A unit of computation in a graph
///
/// A node reads the current state and returns the fields it wants to change.
/// The executor merges the update through the schema reducers; the node never
/// mutates the state it was given.
#[async_trait]
pub trait Node: Send + Sync {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, BoxError>;
}

/// Node backed by a synchronous closure
pub struct FnNode<F> {
    func: F,
}

/// Wrap a synchronous closure as a node
pub fn node_fn<F>(func: F) -> FnNode<F>
where
    F: Fn(&WorkflowState) -> Result<StateUpdate, BoxError> + Send + Sync,
{
    FnNode { func }
}

#[async_trait]
impl<F> Node for FnNode<F>
where
    F: Fn(&WorkflowState) -> Result<StateUpdate, BoxError> + Send + Sync,
{
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, BoxError> {
        (self.func)(state)
    }
}

/// Node backed by a closure returning a future
///
/// The closure receives an owned snapshot of the state so the future can
/// outlive the borrow.
pub struct AsyncFnNode<F, Fut> {
    func: F,
    _future: PhantomData<fn() -> Fut>,
}

/// Wrap an async closure as a node
pub fn node_async<F, Fut>(func: F) -> AsyncFnNode<F, Fut>
where
    F: Fn(WorkflowState) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StateUpdate, BoxError>> + Send + 'static,
{
    AsyncFnNode {
        func,
        _future: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> Node for AsyncFnNode<F, Fut>
where
    F: Fn(WorkflowState) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StateUpdate, BoxError>> + Send + 'static,
{
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, BoxError> {
        (self.func)(state.clone()).await
    }
}

/// Node that always returns the same update
#[derive(Debug, Clone, Default)]
pub struct StaticNode {
    update: StateUpdate,
}

impl StaticNode {
    pub fn new(update: StateUpdate) -> Self {
        Self { update }
    }
}

#[async_trait]
impl Node for StaticNode {
    async fn run(&self, _state: &WorkflowState) -> Result<StateUpdate, BoxError> {
        Ok(self.update.clone())
    }
}
