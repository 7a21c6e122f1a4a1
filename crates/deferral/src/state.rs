//! Task identity and lifecycle state types

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a scheduled task
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TaskId {
    /// Mint a new process-unique id
    pub(crate) fn next() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric id value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Lifecycle state of a deferred task
///
/// Exactly one state holds at any instant. Transitions are monotonic: once a
/// state is left it is never revisited, and no transition leaves a terminal
/// state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Scheduled; the delay has not elapsed and the callable has not run
    Pending,
    /// The delay elapsed and the callable is currently running
    Executing,
    /// The callable settled successfully
    Completed,
    /// Cancelled before the delay elapsed; the callable never ran
    Aborted,
    /// The callable settled with an uncaught error
    Failed,
}

impl TaskState {
    /// Whether no further transition can occur from this state
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Aborted | TaskState::Failed
        )
    }
}

/// Failure captured when the callable settles with an uncaught error
///
/// The error value is retained verbatim so callers can inspect it through
/// [`failure`](crate::DeferredTask::failure) after the fact. A panic inside
/// the callable is contained the same way, with its payload rendered as
/// text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure<E> {
    /// The callable returned `Err`
    Error(E),
    /// The callable panicked instead of settling
    Panic(String),
}

impl<E> Failure<E> {
    /// The callable's error value, if it settled with `Err`
    pub fn error(&self) -> Option<&E> {
        match self {
            Failure::Error(error) => Some(error),
            Failure::Panic(_) => None,
        }
    }

    /// Whether the failure was a panic rather than an `Err` settlement
    pub fn is_panic(&self) -> bool {
        matches!(self, Failure::Panic(_))
    }
}

impl<E> fmt::Display for Failure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Error(_) => write!(f, "callable settled with an error"),
            Failure::Panic(msg) => write!(f, "callable panicked: {}", msg),
        }
    }
}

impl<E: fmt::Debug> std::error::Error for Failure<E> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = TaskId::next();
        let b = TaskId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn terminal_states() {
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Executing.is_terminal());
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Aborted.is_terminal());
        assert!(TaskState::Failed.is_terminal());
    }

    #[test]
    fn failure_accessors() {
        let failure: Failure<&str> = Failure::Error("boom");
        assert_eq!(failure.error(), Some(&"boom"));
        assert!(!failure.is_panic());

        let panic: Failure<&str> = Failure::Panic("kaboom".to_string());
        assert_eq!(panic.error(), None);
        assert!(panic.is_panic());
    }

    #[test]
    fn failure_display() {
        let failure: Failure<u32> = Failure::Error(7);
        assert_eq!(failure.to_string(), "callable settled with an error");

        let panic: Failure<u32> = Failure::Panic("kaboom".to_string());
        assert_eq!(panic.to_string(), "callable panicked: kaboom");
    }
}
