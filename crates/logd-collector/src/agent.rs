//! Single-writer agent
//!
//! An [`Agent`] owns a piece of state and applies closures to it one at a
//! time, in submission order, on a single task. Callers get synchronous
//! semantics: [`Agent::send`] resolves with the closure's return value once
//! it has run.
//!
//! The inbox is bounded. A full inbox fails fast with
//! [`AgentError::InboxFull`] instead of queueing the caller; once the agent
//! has shut down every queued and future action resolves with
//! [`AgentError::Cancelled`] without running.

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::AgentError;

/// A fatal error recorded through [`Agent::fail`]
pub type AgentFailure = Box<dyn std::error::Error + Send + Sync>;

type Action<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Cloneable handle for submitting work to an agent
pub struct Agent<S> {
    inbox: mpsc::Sender<Action<S>>,
    fail: mpsc::Sender<AgentFailure>,
}

impl<S> Clone for Agent<S> {
    fn clone(&self) -> Self {
        Self {
            inbox: self.inbox.clone(),
            fail: self.fail.clone(),
        }
    }
}

/// The drain loop of an agent; owns the state until [`AgentRunner::run`] exits
pub struct AgentRunner<S> {
    state: S,
    inbox: mpsc::Receiver<Action<S>>,
    fail: mpsc::Receiver<AgentFailure>,
}

/// What [`AgentRunner::run`] hands back on exit
pub struct AgentOutcome<S> {
    /// The state, after the last action that ran
    pub state: S,
    /// The first failure recorded, if that is why the agent stopped
    pub failure: Option<AgentFailure>,
}

impl<S: Send + 'static> Agent<S> {
    /// Create an agent owning `state` with room for `capacity` queued actions
    pub fn new(state: S, capacity: usize) -> (Self, AgentRunner<S>) {
        let (inbox_tx, inbox_rx) = mpsc::channel(capacity.max(1));
        // Room for one: later failures are discarded
        let (fail_tx, fail_rx) = mpsc::channel(1);
        (
            Self {
                inbox: inbox_tx,
                fail: fail_tx,
            },
            AgentRunner {
                state,
                inbox: inbox_rx,
                fail: fail_rx,
            },
        )
    }

    /// Run `f` against the state on the agent task and return its result
    pub async fn send<T, F>(&self, f: F) -> Result<T, AgentError>
    where
        F: FnOnce(&mut S) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let action: Action<S> = Box::new(move |state| {
            let _ = reply_tx.send(f(state));
        });

        match self.inbox.try_send(action) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(
                    capacity = self.inbox.max_capacity(),
                    "Agent inbox full, rejecting action"
                );
                return Err(AgentError::InboxFull);
            }
            Err(TrySendError::Closed(_)) => return Err(AgentError::Cancelled),
        }

        let remaining = self.inbox.capacity();
        if remaining * 10 < self.inbox.max_capacity() {
            debug!(remaining, "Agent inbox nearly full");
        }

        reply_rx.await.map_err(|_| AgentError::Cancelled)
    }

    /// Record a fatal failure, making the run loop exit
    ///
    /// Only the first failure is kept.
    pub fn fail(&self, err: impl Into<AgentFailure>) {
        let _ = self.fail.try_send(err.into());
    }

    /// Check whether the agent still accepts actions
    pub fn is_closed(&self) -> bool {
        self.inbox.is_closed()
    }
}

impl<S: Send + 'static> AgentRunner<S> {
    /// Apply queued actions until cancelled, failed, or every handle is dropped
    ///
    /// Actions still queued on exit are dropped, so their senders observe
    /// [`AgentError::Cancelled`].
    pub async fn run(mut self, cancel: CancellationToken) -> AgentOutcome<S> {
        let failure = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break None,
                Some(err) = self.fail.recv() => break Some(err),
                action = self.inbox.recv() => match action {
                    Some(action) => action(&mut self.state),
                    None => break None,
                },
            }
        };

        self.inbox.close();
        let mut dropped = 0usize;
        while let Ok(action) = self.inbox.try_recv() {
            drop(action);
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, "Cancelled queued agent actions");
        }

        AgentOutcome {
            state: self.state,
            failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::task::Poll;

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct TestFailure(&'static str);

    #[tokio::test]
    async fn test_send_returns_closure_result() {
        let (agent, runner) = Agent::new(Vec::<u32>::new(), 8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(runner.run(cancel.clone()));

        for i in 0..5 {
            agent.send(move |v| v.push(i)).await.unwrap();
        }
        let len = agent.send(|v| v.len()).await.unwrap();
        assert_eq!(len, 5);

        cancel.cancel();
        let outcome = task.await.unwrap();
        assert_eq!(outcome.state, vec![0, 1, 2, 3, 4]);
        assert!(outcome.failure.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_senders_are_serialized() {
        let (agent, runner) = Agent::new(0u64, 300);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(runner.run(cancel.clone()));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let agent = agent.clone();
            handles.push(tokio::spawn(async move {
                agent
                    .send(|n| {
                        let before = *n;
                        *n = before + 1;
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        cancel.cancel();
        assert_eq!(task.await.unwrap().state, 50);
    }

    #[tokio::test]
    async fn test_full_inbox_fails_fast() {
        let (agent, _runner) = Agent::new((), 1);

        // Queued but never drained: the runner is not running
        let mut queued = tokio_test::task::spawn(agent.send(|_| ()));
        assert!(queued.poll().is_pending());

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let result = agent.send(move |_| flag.store(true, Ordering::SeqCst)).await;
        assert_eq!(result, Err(AgentError::InboxFull));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_queued_actions_are_cancelled_on_exit() {
        let (agent, runner) = Agent::new(0u32, 4);

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let mut queued = tokio_test::task::spawn(agent.send(move |_| {
            flag.store(true, Ordering::SeqCst);
        }));
        assert!(queued.poll().is_pending());

        let cancel = CancellationToken::new();
        cancel.cancel();
        runner.run(cancel).await;

        assert_eq!(queued.poll(), Poll::Ready(Err(AgentError::Cancelled)));
        assert!(!ran.load(Ordering::SeqCst));
        assert!(agent.is_closed());
        assert_eq!(agent.send(|n| *n).await, Err(AgentError::Cancelled));
    }

    #[tokio::test]
    async fn test_first_failure_wins() {
        let (agent, runner) = Agent::new((), 4);
        agent.fail(TestFailure("first"));
        agent.fail(TestFailure("second"));

        let outcome = runner.run(CancellationToken::new()).await;
        assert_eq!(outcome.failure.unwrap().to_string(), "first");
        assert_eq!(agent.send(|_| ()).await, Err(AgentError::Cancelled));
    }

    #[tokio::test]
    async fn test_exits_when_handles_dropped() {
        let (agent, runner) = Agent::new(7u8, 4);
        drop(agent);
        let outcome = runner.run(CancellationToken::new()).await;
        assert_eq!(outcome.state, 7);
        assert!(outcome.failure.is_none());
    }
}
