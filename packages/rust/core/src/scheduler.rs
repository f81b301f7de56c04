//! Deferred execution and promise chaining on the tokio runtime.
//!
//! A [`Promise`] settles exactly once, with the task's value or its error.
//! [`Promise::then`] chains a continuation that only runs on success; an
//! error skips every success continuation until a failure handler
//! ([`Promise::then_or_else`]) receives it. Continuations run eagerly as
//! spawned tasks, whether or not anyone awaits the final promise.
//!
//! Run the binary on a current-thread runtime and every task is an
//! interleaved continuation on one thread; stages never run in parallel.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use venuebot_shared::{Result, VenueBotError};

/// Handle used to defer work onto the runtime.
#[derive(Debug, Clone)]
pub struct Scheduler {
    handle: Handle,
}

impl Scheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// A scheduler for the runtime the caller is running on.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| VenueBotError::config(format!("no tokio runtime available: {e}")))
    }

    /// Run `task` asynchronously and return a promise of its outcome.
    pub fn defer<T, F>(&self, task: F) -> Promise<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.handle.spawn(async move {
            // The receiver may be gone; nobody is waiting on the outcome then.
            let _ = tx.send(task.await);
        });
        Promise {
            rx,
            scheduler: self.clone(),
        }
    }

    /// Invoke `task` once, no earlier than `delay` from now.
    pub fn schedule_task<T, F, Fut>(&self, delay: Duration, task: F) -> Promise<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.defer(async move {
            tokio::time::sleep(delay).await;
            task().await
        })
    }

    /// A promise settled later through the returned [`Resolver`].
    pub fn promise<T>(&self) -> (Resolver<T>, Promise<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Resolver { tx },
            Promise {
                rx,
                scheduler: self.clone(),
            },
        )
    }

    /// A promise already settled with `value`.
    pub fn resolved<T>(&self, value: T) -> Promise<T> {
        self.settled(Ok(value))
    }

    /// A promise already settled with `error`.
    pub fn rejected<T>(&self, error: VenueBotError) -> Promise<T> {
        self.settled(Err(error))
    }

    fn settled<T>(&self, outcome: Result<T>) -> Promise<T> {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Promise {
            rx,
            scheduler: self.clone(),
        }
    }
}

/// Settles its paired [`Promise`]. Consumed on use, so a promise settles once.
#[derive(Debug)]
pub struct Resolver<T> {
    tx: oneshot::Sender<Result<T>>,
}

impl<T> Resolver<T> {
    pub fn resolve(self, value: T) {
        let _ = self.tx.send(Ok(value));
    }

    pub fn reject(self, error: VenueBotError) {
        let _ = self.tx.send(Err(error));
    }
}

/// The eventual outcome of a deferred task. Await it for `Result<T>`.
#[derive(Debug)]
#[must_use = "a promise does nothing observable unless chained or awaited"]
pub struct Promise<T> {
    rx: oneshot::Receiver<Result<T>>,
    scheduler: Scheduler,
}

impl<T: Send + 'static> Promise<T> {
    /// Chain a success continuation. Errors from this promise, and errors
    /// returned by `on_ok`, settle the returned promise.
    pub fn then<U, F, Fut>(self, on_ok: F) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<U>> + Send + 'static,
    {
        let scheduler = self.scheduler.clone();
        scheduler.defer(async move {
            let value = self.await?;
            on_ok(value).await
        })
    }

    /// Chain a success continuation and a failure handler for this
    /// promise's error. Exactly one of them runs.
    pub fn then_or_else<U, F, Fut, E, EFut>(self, on_ok: F, on_err: E) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<U>> + Send + 'static,
        E: FnOnce(VenueBotError) -> EFut + Send + 'static,
        EFut: Future<Output = Result<U>> + Send + 'static,
    {
        let scheduler = self.scheduler.clone();
        scheduler.defer(async move {
            match self.await {
                Ok(value) => on_ok(value).await,
                Err(error) => on_err(error).await,
            }
        })
    }
}

impl<T> Future for Promise<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // Sender dropped without settling (task panicked or resolver dropped).
            Poll::Ready(Err(_)) => Poll::Ready(Err(VenueBotError::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}
