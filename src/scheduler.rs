//! # Recursion harness
//!
//! Fork-join scheduling primitive shared by compression, mat-vec and the
//! ULV solve. Every binary recursion spawns its first subtree through
//! [`TaskContext::spawn`], processes the second synchronously, then
//! [`TaskHandle::fetch`]es the first and combines.
//!
//! A spawn produces a real worker thread only while
//! `depth < max_split_depth` with `max_split_depth = ceil(log2(P)) + 1`
//! for `P` workers, so the number of live threads stays O(P). Past the
//! cutoff the handle just stores the closure and `fetch` runs it on the
//! calling thread.

/**
 * File: /src/scheduler.rs
 * Created Date: Thursday, March 13th 2025
 * Author: Zihan
 * -----
 * Last Modified: Saturday, 14th June 2025 9:40:03 am
 * Modified By: the developer formerly known as Zihan at <wzh4464@gmail.com>
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
 * 14-06-2025		Zihan	panics now resume on fetch instead of poisoning the scope
 */

use std::panic;
use std::thread;

/// Handle to a unit of recursive work, either already running on a worker
/// thread or deferred to the fetching thread.
pub enum TaskHandle<'scope, T> {
    Spawned(thread::ScopedJoinHandle<'scope, T>),
    Deferred(Box<dyn FnOnce() -> T + Send + 'scope>),
}

impl<'scope, T> TaskHandle<'scope, T> {
    /// Obtain the task's result, blocking on a spawned task or evaluating
    /// a deferred one in place. Errors returned by the task come back as
    /// ordinary values; panics resume on the fetching thread.
    pub fn fetch(self) -> T {
        match self {
            TaskHandle::Spawned(handle) => match handle.join() {
                Ok(value) => value,
                Err(payload) => panic::resume_unwind(payload),
            },
            TaskHandle::Deferred(f) => f(),
        }
    }

    /// Wait for completion, discarding the result.
    pub fn wait(self) {
        let _ = self.fetch();
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, TaskHandle::Deferred(_))
    }
}

/// Scheduling state threaded through every recursive traversal.
#[derive(Clone, Copy)]
pub struct TaskContext<'scope, 'env> {
    scope: &'scope thread::Scope<'scope, 'env>,
    depth: usize,
    max_split_depth: usize,
}

/// Worker count used to size the split depth.
pub fn worker_count() -> usize {
    thread::available_parallelism().map(|p| p.get()).unwrap_or(1)
}

fn split_depth_for(workers: usize) -> usize {
    let p = workers.max(1);
    p.next_power_of_two().trailing_zeros() as usize + 1
}

impl<'scope, 'env> TaskContext<'scope, 'env> {
    /// Root context for a traversal, sized to the machine's worker count.
    pub fn new(scope: &'scope thread::Scope<'scope, 'env>) -> Self {
        Self::with_split_depth(scope, split_depth_for(worker_count()))
    }

    pub fn with_split_depth(scope: &'scope thread::Scope<'scope, 'env>, max_split_depth: usize) -> Self {
        Self {
            scope,
            depth: 0,
            max_split_depth,
        }
    }

    /// Context for the next recursion level.
    pub fn descend(self) -> Self {
        Self {
            depth: self.depth + 1,
            ..self
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Schedule `f` for the next recursion level. Returns a spawned handle
    /// while the split depth allows, a deferred one otherwise.
    pub fn spawn<T, F>(self, f: F) -> TaskHandle<'scope, T>
    where
        T: Send + 'scope,
        F: FnOnce(TaskContext<'scope, 'env>) -> T + Send + 'scope,
    {
        let child = self.descend();
        if self.depth < self.max_split_depth {
            TaskHandle::Spawned(self.scope.spawn(move || f(child)))
        } else {
            TaskHandle::Deferred(Box::new(move || f(child)))
        }
    }
}
