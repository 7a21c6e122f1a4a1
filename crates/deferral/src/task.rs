//! The deferred task handle and its timer driver

use crate::state::{Failure, TaskId, TaskState};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinError};

/// Internal lifecycle state
///
/// Data-carrying so each ownership slot exists exactly in the state that
/// owns it: the timer abort handle only while pending, the completion
/// signal only while executing, the captured failure only once failed.
enum State<E> {
    /// Armed; the sleeping driver can still be cancelled before it fires
    Pending {
        /// Abort handle for the driver task. `None` only inside
        /// `schedule`, before the driver has been spawned.
        timer: Option<AbortHandle>,
    },
    /// The callable is running; `settled` flips to true when it finishes
    Executing { settled: watch::Receiver<bool> },
    /// The callable settled successfully
    Completed,
    /// Cancelled while still pending; the callable never ran
    Aborted,
    /// The callable settled with an uncaught error
    Failed(Failure<E>),
}

struct Inner<E> {
    id: TaskId,
    state: Mutex<State<E>>,
}

/// A single asynchronous callable scheduled to run once after a delay.
///
/// Constructed with [`schedule`](Self::schedule), which arms the timer
/// immediately. The handle tracks the task through a monotonic state
/// machine:
///
/// ```text
/// Pending ──delay elapses──▶ Executing ──Ok──▶  Completed
///    │                           │
///    │ try_cancel                └────Err/panic▶ Failed
///    ▼
/// Aborted
/// ```
///
/// The fire/cancel race is adjudicated by the internal state lock:
/// whichever side observes `Pending` first wins, and the other side sees a
/// later state and backs off. A successful cancel therefore guarantees the
/// callable never runs, and a failed cancel guarantees it already started.
///
/// Cloning is cheap and every clone observes the same task.
pub struct DeferredTask<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for DeferredTask<E> {
    fn clone(&self) -> Self {
        DeferredTask {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> DeferredTask<E> {
    /// Schedule `callable` to run once after `delay`.
    ///
    /// The timer is armed immediately and the handle starts out
    /// [`Pending`](TaskState::Pending). The callable is never invoked
    /// before the delay elapses and never invoked more than once.
    ///
    /// `delay` is a [`Duration`], so negative delays are unrepresentable;
    /// `Duration::ZERO` requests the earliest firing the scheduler can
    /// provide, and even then the handle is observably pending until the
    /// runtime has had a chance to run the timer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule<F, Fut>(delay: Duration, callable: F) -> Self
    where
        E: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        let inner = Arc::new(Inner {
            id: TaskId::next(),
            state: Mutex::new(State::Pending { timer: None }),
        });

        let driver = tokio::spawn(drive(Arc::clone(&inner), delay, callable));

        // With a zero delay the driver may already have fired on another
        // worker; only arm the abort handle if the task is still pending.
        if let State::Pending { timer } = &mut *inner.state.lock() {
            *timer = Some(driver.abort_handle());
        }

        DeferredTask { inner }
    }

    /// This task's unique id
    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    /// The current lifecycle state
    pub fn state(&self) -> TaskState {
        match &*self.inner.state.lock() {
            State::Pending { .. } => TaskState::Pending,
            State::Executing { .. } => TaskState::Executing,
            State::Completed => TaskState::Completed,
            State::Aborted => TaskState::Aborted,
            State::Failed(_) => TaskState::Failed,
        }
    }

    /// Whether the delay has not yet elapsed and the task can still be cancelled
    pub fn is_pending(&self) -> bool {
        self.state() == TaskState::Pending
    }

    /// Whether the callable is currently running
    pub fn is_executing(&self) -> bool {
        self.state() == TaskState::Executing
    }

    /// Whether the callable settled successfully
    pub fn is_completed(&self) -> bool {
        self.state() == TaskState::Completed
    }

    /// Whether the task was cancelled before the callable ever ran
    pub fn is_aborted(&self) -> bool {
        self.state() == TaskState::Aborted
    }

    /// Whether the callable settled with an uncaught error
    pub fn is_failed(&self) -> bool {
        self.state() == TaskState::Failed
    }

    /// The captured failure, if the callable settled with an uncaught error.
    ///
    /// Returns `None` in every other state. The value is exactly what the
    /// callable produced.
    pub fn failure(&self) -> Option<Failure<E>>
    where
        E: Clone,
    {
        match &*self.inner.state.lock() {
            State::Failed(failure) => Some(failure.clone()),
            _ => None,
        }
    }

    /// Attempt to cancel the task before it starts.
    ///
    /// Succeeds if and only if the task is still pending: the timer is
    /// released and the callable is guaranteed never to run. In any other
    /// state this is a no-op returning `false` — a normal outcome meaning
    /// execution already started or finished, not an error.
    pub fn try_cancel(&self) -> bool {
        let mut state = self.inner.state.lock();
        match &mut *state {
            State::Pending { timer } => {
                if let Some(timer) = timer.take() {
                    timer.abort();
                }
                *state = State::Aborted;
                true
            }
            _ => false,
        }
    }

    /// Wait for an in-flight execution to settle.
    ///
    /// Resolves immediately unless the task is currently executing, in
    /// which case it resolves once the callable settles — for every
    /// concurrent caller at that same settlement. Never blocks forever and
    /// never propagates the callable's failure; inspect
    /// [`failure`](Self::failure) afterwards instead.
    ///
    /// Together with [`try_cancel`](Self::try_cancel) this gives a
    /// deterministic shutdown: cancel if possible, otherwise wait here
    /// before proceeding.
    pub async fn wait_completion(&self) {
        let mut settled = match &*self.inner.state.lock() {
            State::Executing { settled } => settled.clone(),
            // Pending and every terminal state: nothing in flight.
            _ => return,
        };

        while !*settled.borrow_and_update() {
            // A closed channel means the driver is gone and nothing will
            // settle; do not wait forever.
            if settled.changed().await.is_err() {
                return;
            }
        }
    }

    /// Like [`wait_completion`](Self::wait_completion), but give up after
    /// `timeout` and report the state observed at that moment.
    ///
    /// This bounds only the wait. The execution itself is not cancelled
    /// and keeps running if the timeout fires first.
    pub async fn wait_completion_timeout(&self, timeout: Duration) -> TaskState {
        let _ = tokio::time::timeout(timeout, self.wait_completion()).await;
        self.state()
    }
}

impl<E> fmt::Debug for DeferredTask<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredTask")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Driver task: owns the delay, adjudicates the fire/cancel race, and
/// records the callable's settlement.
async fn drive<E, F, Fut>(inner: Arc<Inner<E>>, delay: Duration, callable: F)
where
    E: Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
{
    tokio::time::sleep(delay).await;

    let (done_tx, done_rx) = watch::channel(false);
    {
        let mut state = inner.state.lock();
        if !matches!(*state, State::Pending { .. }) {
            // A cancel won between timer expiry and this lock acquisition.
            return;
        }
        // The completion signal is published in the same critical section
        // that makes the task observably executing, before any suspension
        // point: no observer can see an execution with no signal to await.
        *state = State::Executing { settled: done_rx };
    }

    // The callable runs as its own task so a panic anywhere inside it is
    // contained by the runtime and surfaces here as a JoinError.
    let execution = tokio::spawn(async move { callable().await });

    let next = match execution.await {
        Ok(Ok(())) => State::Completed,
        Ok(Err(error)) => State::Failed(Failure::Error(error)),
        Err(join) => State::Failed(Failure::Panic(panic_message(join))),
    };

    *inner.state.lock() = next;
    let _ = done_tx.send(true);
}

/// Render the execution task's `JoinError` as captured failure text.
fn panic_message(err: JoinError) -> String {
    if err.is_panic() {
        let payload = err.into_panic();
        if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        }
    } else {
        "callable task was cancelled before settling".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn new_task_starts_pending() {
        let task =
            DeferredTask::schedule(Duration::from_millis(100), || async { Ok::<(), String>(()) });

        assert_eq!(task.state(), TaskState::Pending);
        assert!(task.is_pending());
        assert!(!task.is_executing());
        assert!(!task.state().is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_only_succeeds_once() {
        let task =
            DeferredTask::schedule(Duration::from_millis(100), || async { Ok::<(), String>(()) });

        assert!(task.try_cancel());
        assert_eq!(task.state(), TaskState::Aborted);
        assert!(!task.try_cancel());
        assert_eq!(task.state(), TaskState::Aborted);
    }

    #[tokio::test(start_paused = true)]
    async fn handles_get_distinct_ids() {
        let a = DeferredTask::schedule(Duration::from_secs(1), || async { Ok::<(), String>(()) });
        let b = DeferredTask::schedule(Duration::from_secs(1), || async { Ok::<(), String>(()) });

        assert_ne!(a.id(), b.id());
    }

    #[tokio::test(start_paused = true)]
    async fn debug_output_names_the_state() {
        let task =
            DeferredTask::schedule(Duration::from_millis(100), || async { Ok::<(), String>(()) });

        let rendered = format!("{:?}", task);
        assert!(rendered.contains("Pending"), "got {rendered}");
    }
}
