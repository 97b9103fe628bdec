//! Deferred task batches.
//!
//! Tasks are queued with [`DeferredBatch::submit`], which returns a handle
//! immediately. [`DeferredBatch::execute`] runs everything and returns once
//! all tasks are done; results are then claimed through the handles.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// In submission order on the calling thread.
    Sequential,
    /// On the rayon pool.
    #[default]
    Parallel,
}

impl ExecutionMode {
    pub fn from_parallel(parallel: bool) -> Self {
        if parallel {
            ExecutionMode::Parallel
        } else {
            ExecutionMode::Sequential
        }
    }
}

/// Ticket for one submitted task.
#[derive(Debug, PartialEq, Eq)]
#[must_use]
pub struct TaskHandle(usize);

type Task<'a, T> = Box<dyn FnOnce() -> T + Send + 'a>;

pub struct DeferredBatch<'a, T> {
    tasks: Vec<Task<'a, T>>,
}

impl<T> Default for DeferredBatch<'_, T> {
    fn default() -> Self {
        Self { tasks: Vec::new() }
    }
}

impl<'a, T: Send> DeferredBatch<'a, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit<F>(&mut self, task: F) -> TaskHandle
    where
        F: FnOnce() -> T + Send + 'a,
    {
        self.tasks.push(Box::new(task));
        TaskHandle(self.tasks.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run every task and wait for all of them.
    pub fn execute(self, mode: ExecutionMode) -> BatchResults<T> {
        let slots = match mode {
            ExecutionMode::Sequential => self.tasks.into_iter().map(|task| Some(task())).collect(),
            ExecutionMode::Parallel => self.tasks.into_par_iter().map(|task| Some(task())).collect(),
        };
        BatchResults { slots }
    }
}

/// Outputs of an executed batch.
#[derive(Debug)]
pub struct BatchResults<T> {
    slots: Vec<Option<T>>,
}

impl<T> BatchResults<T> {
    /// Claim the output of `handle`.
    pub fn take(&mut self, handle: TaskHandle) -> Option<T> {
        self.slots.get_mut(handle.0).and_then(Option::take)
    }
}
