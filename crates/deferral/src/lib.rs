//! One-shot deferred task scheduling with observable state transitions.
//!
//! A [`DeferredTask`] wraps a single asynchronous callable and a delay: the
//! callable starts after the delay elapses, runs at most once, and every
//! stage of its lifecycle is visible through a small monotonic state machine
//! ([`TaskState`]). Callers can cancel the task while it is still pending,
//! and deterministically wait out an execution that has already begun.
//!
//! Errors produced by the callable never escape to the runtime: they are
//! captured verbatim as a [`Failure`] and kept for later inspection.
//!
//! Handles are cheap to clone; every clone observes the same underlying
//! task. Independent tasks share nothing with one another — coordinating
//! several of them (ordering, non-overlap, queues) is the caller's job.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use deferral::DeferredTask;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let task = DeferredTask::schedule(Duration::from_millis(50), || async {
//!         println!("fired");
//!         Ok::<(), String>(())
//!     });
//!
//!     // Shutdown pattern: prevent the run if possible, otherwise wait it out.
//!     if !task.try_cancel() {
//!         task.wait_completion().await;
//!     }
//! }
//! ```

#![warn(missing_docs)]

mod state;
mod task;

pub use state::{Failure, TaskId, TaskState};
pub use task::DeferredTask;
