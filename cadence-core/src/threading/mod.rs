//! Threading runtime for scheduling loops
//!
//! Uses native OS threads (std::thread). Each loop gets its own named thread;
//! all threads are released together by a start barrier.

use crate::stats::LoopStats;
use crate::Result;
use std::sync::{Arc, Barrier};
use std::thread;

pub mod shutdown;

pub use shutdown::Shutdown;

/// A unit of work run on its own thread
pub type LoopTask = Box<dyn FnOnce() -> Result<LoopStats> + Send + 'static>;

/// Runtime that runs independent loops in parallel and collects their results
#[derive(Default)]
pub struct LoopRuntime {
    tasks: Vec<(String, LoopTask)>,
}

impl LoopRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a loop to be started by [`LoopRuntime::run`]
    pub fn spawn<F>(&mut self, name: impl Into<String>, task: F)
    where
        F: FnOnce() -> Result<LoopStats> + Send + 'static,
    {
        self.tasks.push((name.into(), Box::new(task)));
    }

    /// Number of queued loops
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Start all queued loops simultaneously and wait for them to finish
    ///
    /// A panicking loop is reported as an error; the other loops still run to
    /// completion and are joined before returning.
    pub fn run(self) -> Result<Vec<LoopStats>> {
        let barrier = Arc::new(Barrier::new(self.tasks.len().max(1)));
        let mut handles = Vec::with_capacity(self.tasks.len());

        for (name, task) in self.tasks {
            let barrier = barrier.clone();
            let handle = thread::Builder::new().name(name.clone()).spawn(move || {
                barrier.wait();
                task()
            })?;
            handles.push((name, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        let mut first_error = None;
        for (name, handle) in handles {
            match handle.join() {
                Ok(Ok(stats)) => results.push(stats),
                Ok(Err(e)) => {
                    tracing::error!("Loop '{}' failed: {}", name, e);
                    first_error.get_or_insert(e);
                }
                Err(_) => {
                    tracing::error!("Loop '{}' panicked", name);
                    first_error
                        .get_or_insert(crate::Error::Other(format!("Thread '{name}' panicked")));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }
}

impl std::fmt::Debug for LoopRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.tasks.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("LoopRuntime").field("tasks", &names).finish()
    }
}
