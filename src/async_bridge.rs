//! Delivery of asynchronous invocation outcomes.
//!
//! An asynchronous call ends in exactly one terminal event: the callback's
//! `completed` or `failed`, or the resolution or rejection of its
//! [`ResponseFuture`]. A [`CompletionSlot`] holds the single delivery target
//! and hands it out once.

use crate::error::Error;
use crate::invoker::InvocationResult;
use crate::model::operation::ReturnType;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::debug;

/// The result shape a callback accepts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CallbackTarget {
    #[default]
    Any,
    Type(ReturnType),
}

impl CallbackTarget {
    /// Whether a result of `return_type` can be handed to this callback.
    /// Async wrappers compare by their inner type.
    #[must_use]
    pub fn accepts(&self, return_type: &ReturnType) -> bool {
        let Self::Type(expected) = self else {
            return true;
        };
        match (expected.unwrapped(), return_type.unwrapped()) {
            (ReturnType::Primitive(to), ReturnType::Primitive(from)) => {
                to == from || to.widens_from(*from)
            }
            (expected, actual) => expected == actual,
        }
    }
}

/// Receives the outcome of an asynchronous invocation.
pub trait InvocationCallback: Send + 'static {
    fn target(&self) -> CallbackTarget {
        CallbackTarget::Any
    }

    fn completed(self: Box<Self>, result: InvocationResult);

    fn failed(self: Box<Self>, error: Error);
}

/// Resolves once the asynchronous invocation finishes.
#[derive(Debug)]
pub struct ResponseFuture {
    receiver: oneshot::Receiver<Result<InvocationResult, Error>>,
}

impl Future for ResponseFuture {
    type Output = Result<InvocationResult, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(Error::Cancelled)))
    }
}

enum Delivery {
    Callback(Box<dyn InvocationCallback>),
    Future(oneshot::Sender<Result<InvocationResult, Error>>),
}

/// Single-use delivery target of one asynchronous call.
///
/// Dropping an undelivered slot fails a callback with [`Error::Cancelled`];
/// a future observes the same through its closed channel.
pub struct CompletionSlot {
    delivery: Mutex<Option<Delivery>>,
}

impl std::fmt::Debug for CompletionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionSlot")
            .field("delivered", &self.delivery.lock().is_none())
            .finish()
    }
}

impl CompletionSlot {
    #[must_use]
    pub fn for_callback(callback: Box<dyn InvocationCallback>) -> Self {
        Self {
            delivery: Mutex::new(Some(Delivery::Callback(callback))),
        }
    }

    /// A slot paired with the future its outcome resolves.
    #[must_use]
    pub fn for_future() -> (Self, ResponseFuture) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                delivery: Mutex::new(Some(Delivery::Future(sender))),
            },
            ResponseFuture { receiver },
        )
    }

    /// Delivers `outcome`. Returns `false` if something was already delivered.
    pub fn deliver(&self, outcome: Result<InvocationResult, Error>) -> bool {
        let Some(delivery) = self.delivery.lock().take() else {
            return false;
        };
        match (delivery, outcome) {
            (Delivery::Callback(callback), Ok(result)) => callback.completed(result),
            (Delivery::Callback(callback), Err(error)) => callback.failed(error),
            (Delivery::Future(sender), outcome) => {
                if sender.send(outcome).is_err() {
                    debug!(
                        target: crate::constants::LOG_TARGET,
                        "Response future dropped before completion"
                    );
                }
            }
        }
        true
    }
}

impl Drop for CompletionSlot {
    fn drop(&mut self) {
        if let Some(Delivery::Callback(callback)) = self.delivery.get_mut().take() {
            callback.failed(Error::Cancelled);
        }
    }
}

/// Runs `call` on the current tokio runtime and delivers its outcome to `slot`.
pub fn spawn_delivery<F>(call: F, slot: CompletionSlot)
where
    F: Future<Output = Result<InvocationResult, Error>> + Send + 'static,
{
    tokio::spawn(async move {
        let outcome = call.await;
        slot.deliver(outcome);
    });
}
