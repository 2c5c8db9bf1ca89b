//! A future that can be cancelled before it settles.
//!
//! # Design
//! `Cancelable` owns a worker future and the receiving half of a one-shot
//! channel. The worker settles the operation through an [`OnCancel`] handle,
//! and a caller can cancel it through [`Cancelable::cancel`] or a detached
//! [`CancelHandle`]. Settlement and cancellation both go through one
//! mutex-guarded state check, so whichever arrives first wins and every
//! later attempt is a no-op.
//!
//! The worker is polled together with the receiver; once the operation is
//! terminal the worker is dropped, which also drops whatever transport call
//! it was awaiting.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::oneshot;

use crate::error::{BoxError, CancelError, Error};

/// Callback run when an operation is cancelled.
pub type CancelHandler = Box<dyn FnOnce() -> Result<(), BoxError> + Send>;

/// Lifecycle of a cancelable operation. Every state but `Pending` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Pending,
    Resolved,
    Rejected,
    Cancelled,
}

impl State {
    pub fn is_terminal(self) -> bool {
        self != State::Pending
    }
}

struct Inner<T, E> {
    state: State,
    handlers: Vec<CancelHandler>,
    sender: Option<oneshot::Sender<Result<T, E>>>,
}

struct Shared<T, E> {
    inner: Mutex<Inner<T, E>>,
}

impl<T, E> Shared<T, E> {
    fn lock(&self) -> MutexGuard<'_, Inner<T, E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> State {
        self.lock().state
    }

    fn settle(&self, state: State, outcome: Result<T, E>) {
        let sender = {
            let mut inner = self.lock();
            if inner.state.is_terminal() {
                return;
            }
            inner.state = state;
            inner.handlers.clear();
            inner.sender.take()
        };
        if let Some(sender) = sender {
            let _ = sender.send(outcome);
        }
    }

    fn register(&self, handler: CancelHandler) {
        let mut inner = self.lock();
        if !inner.state.is_terminal() {
            inner.handlers.push(handler);
        }
    }

    fn cancel(&self)
    where
        E: From<CancelError>,
    {
        let handlers = {
            let mut inner = self.lock();
            if inner.state.is_terminal() {
                return;
            }
            inner.state = State::Cancelled;
            std::mem::take(&mut inner.handlers)
        };

        for handler in handlers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(handler))
                .unwrap_or_else(|_| Err("cancel handler panicked".into()));
            if let Err(err) = outcome {
                // The operation stays cancelled but is never rejected.
                tracing::warn!(error = %err, "cancel handler failed");
                return;
            }
        }

        let sender = self.lock().sender.take();
        if let Some(sender) = sender {
            let _ = sender.send(Err(E::from(CancelError::default())));
        }
    }
}

/// Handle given to the worker of a [`Cancelable`].
///
/// Bundles the settle functions, cancel-handler registration and the state
/// queries.
pub struct OnCancel<T, E = Error> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> OnCancel<T, E> {
    /// Settle successfully. Ignored once the operation is terminal.
    pub fn resolve(&self, value: T) {
        self.shared.settle(State::Resolved, Ok(value));
    }

    /// Settle with a failure. Ignored once the operation is terminal.
    pub fn reject(&self, reason: E) {
        self.shared.settle(State::Rejected, Err(reason));
    }

    /// Run `handler` if the operation is cancelled. Ignored once the
    /// operation is terminal.
    pub fn register<F>(&self, handler: F)
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        self.shared.register(Box::new(handler));
    }

    pub fn is_resolved(&self) -> bool {
        self.shared.state() == State::Resolved
    }

    pub fn is_rejected(&self) -> bool {
        self.shared.state() == State::Rejected
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.state() == State::Cancelled
    }
}

impl<T, E> Clone for OnCancel<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Detached handle that cancels a [`Cancelable`] from elsewhere.
pub struct CancelHandle<T, E = Error> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E: From<CancelError>> CancelHandle<T, E> {
    pub fn cancel(&self) {
        self.shared.cancel();
    }
}

impl<T, E> CancelHandle<T, E> {
    pub fn state(&self) -> State {
        self.shared.state()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == State::Cancelled
    }
}

impl<T, E> Clone for CancelHandle<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// An asynchronous value that can be cancelled before it settles.
///
/// Await it for the outcome. If a cancel handler fails or panics, the operation is
/// left cancelled without ever settling, so awaiting it does not complete.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Cancelable<T, E = Error> {
    shared: Arc<Shared<T, E>>,
    worker: Option<BoxFuture<'static, ()>>,
    receiver: oneshot::Receiver<Result<T, E>>,
}

impl<T: Send + 'static, E: Send + 'static> Cancelable<T, E> {
    /// Create an operation driven by `executor`.
    ///
    /// The executor's future starts running on the first poll.
    pub fn new<F, Fut>(executor: F) -> Self
    where
        F: FnOnce(OnCancel<T, E>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                state: State::Pending,
                handlers: Vec::new(),
                sender: Some(sender),
            }),
        });
        let worker = executor(OnCancel {
            shared: Arc::clone(&shared),
        })
        .boxed();
        Self {
            shared,
            worker: Some(worker),
            receiver,
        }
    }
}

impl<T, E> Cancelable<T, E> {
    pub fn state(&self) -> State {
        self.shared.state()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == State::Cancelled
    }

    pub fn handle(&self) -> CancelHandle<T, E> {
        CancelHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Cancel the operation. No-op once it is terminal.
    pub fn cancel(&self)
    where
        E: From<CancelError>,
    {
        self.shared.cancel();
    }

    /// Await the outcome, then run `cleanup` whichever way it settled.
    pub async fn finally<F: FnOnce()>(self, cleanup: F) -> Result<T, E> {
        let outcome = self.await;
        cleanup();
        outcome
    }
}

impl<T, E> Future for Cancelable<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let worker_done = match this.worker.as_mut() {
            Some(_) if this.shared.state().is_terminal() => true,
            Some(worker) => worker.as_mut().poll(cx).is_ready(),
            None => false,
        };
        if worker_done {
            this.worker = None;
        }

        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => {
                this.worker = None;
                Poll::Ready(outcome)
            }
            // The sender lives in `shared`, so it is only gone after a failed
            // cancel handler took the settle path away.
            Poll::Ready(Err(_)) | Poll::Pending => Poll::Pending,
        }
    }
}
