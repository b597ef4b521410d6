//! # Dispatcher
//!
//! Invokes the single winning handler and reports the result.
//!
//! The winner's cooldown is stamped before its handler runs, so a handler
//! that re-triggers the same input cannot fire itself again. Handler
//! failures never propagate to the caller; they are logged with the
//! definition id and delivered to listeners as
//! [`Notification::HandlerFailed`].
//!
//! Asynchronous handlers are fire-and-forget: the returned future is queued
//! on a single-threaded pool that the host drives with
//! [`Dispatcher::run_pending`].

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use futures::executor::{LocalPool, LocalSpawner};
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::{BoxError, HandlerError};
use crate::gesture::GestureEvent;
use crate::registry::Definition;
use crate::voice::VoiceCommandEvent;

/// What a handler returns.
pub type HandlerResult = Result<(), BoxError>;

/// A gesture or voice command handler.
pub enum Handler<E> {
    /// Runs to completion inside dispatch.
    Sync(Box<dyn FnMut(&E) -> HandlerResult>),
    /// Returns a future that is queued and not awaited by the engine.
    Async(Box<dyn FnMut(E) -> LocalBoxFuture<'static, HandlerResult>>),
}

impl<E: 'static> Handler<E> {
    /// Wrap a synchronous closure.
    pub fn sync<F>(handler: F) -> Self
    where
        F: FnMut(&E) -> HandlerResult + 'static,
    {
        Self::Sync(Box::new(handler))
    }

    /// Wrap a closure returning a future.
    pub fn from_async<F, Fut>(mut handler: F) -> Self
    where
        F: FnMut(E) -> Fut + 'static,
        Fut: Future<Output = HandlerResult> + 'static,
    {
        Self::Async(Box::new(move |event| handler(event).boxed_local()))
    }

    /// Check if this handler is asynchronous.
    #[must_use]
    pub const fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }
}

impl<E> fmt::Debug for Handler<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Handler::Sync"),
            Self::Async(_) => f.write_str("Handler::Async"),
        }
    }
}

/// Output events raised to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A gesture definition fired.
    GestureFired(GestureEvent),
    /// A voice command definition fired.
    VoiceCommandFired(VoiceCommandEvent),
    /// A dispatched handler failed.
    HandlerFailed(HandlerError),
}

impl From<GestureEvent> for Notification {
    fn from(event: GestureEvent) -> Self {
        Self::GestureFired(event)
    }
}

impl From<VoiceCommandEvent> for Notification {
    fn from(event: VoiceCommandEvent) -> Self {
        Self::VoiceCommandFired(event)
    }
}

/// Handle returned by [`Dispatcher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&Notification)>;

/// Result of a single dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchStatus {
    /// A synchronous handler returned `Ok`.
    Completed,
    /// An asynchronous handler was queued.
    Spawned,
    /// The handler failed; the error has already been reported.
    Failed(HandlerError),
}

/// Invokes handlers and fans notifications out to listeners.
pub struct Dispatcher {
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
    pool: LocalPool,
    spawner: LocalSpawner,
    /// Failures of queued handlers, reported on the next `run_pending`.
    async_failures: Rc<RefCell<Vec<HandlerError>>>,
}

impl Dispatcher {
    /// Create a dispatcher with no listeners.
    #[must_use]
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            listeners: Vec::new(),
            next_listener: 0,
            pool,
            spawner,
            async_failures: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Register a notification listener.
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&Notification) + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Invoke the definition's handler with `event`.
    ///
    /// `last_fired_at` is set to `now_ms` before the handler runs.
    pub fn dispatch<D: Definition>(
        &mut self,
        definition: &mut D,
        event: D::Event,
        now_ms: u64,
    ) -> DispatchStatus
    where
        D::Event: Into<Notification>,
    {
        definition.mark_fired(now_ms);
        let definition_id = definition.id().to_string();
        info!(definition_id = %definition_id, "Dispatching handler");

        match definition.handler_mut() {
            Handler::Sync(handler) => {
                let result = panic::catch_unwind(AssertUnwindSafe(|| handler(&event)))
                    .unwrap_or_else(|payload| Err(panic_message(payload.as_ref()).into()));
                match result {
                    Ok(()) => {
                        self.notify(&event.into());
                        DispatchStatus::Completed
                    }
                    Err(err) => {
                        let failure = HandlerError::new(&definition_id, &err, format!("{event:?}"));
                        self.report_failure(&failure);
                        DispatchStatus::Failed(failure)
                    }
                }
            }
            Handler::Async(handler) => {
                let input = format!("{event:?}");
                let future = match panic::catch_unwind(AssertUnwindSafe(|| handler(event.clone()))) {
                    Ok(future) => future,
                    Err(payload) => {
                        let err: BoxError = panic_message(payload.as_ref()).into();
                        let failure = HandlerError::new(&definition_id, &err, input);
                        self.report_failure(&failure);
                        return DispatchStatus::Failed(failure);
                    }
                };
                let failures = Rc::clone(&self.async_failures);
                let task_id = definition_id.clone();
                let task_input = input.clone();
                let spawned = self.spawner.spawn_local(async move {
                    let result = AssertUnwindSafe(future)
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|payload| Err(panic_message(payload.as_ref()).into()));
                    if let Err(err) = result {
                        failures
                            .borrow_mut()
                            .push(HandlerError::new(&task_id, &err, task_input));
                    }
                });
                match spawned {
                    Ok(()) => {
                        self.notify(&event.into());
                        DispatchStatus::Spawned
                    }
                    Err(err) => {
                        let err: BoxError = Box::new(err);
                        let failure = HandlerError::new(&definition_id, &err, input);
                        self.report_failure(&failure);
                        DispatchStatus::Failed(failure)
                    }
                }
            }
        }
    }

    /// Drive queued asynchronous handlers until none can make progress.
    ///
    /// Returns the number of handler failures reported by this call.
    pub fn run_pending(&mut self) -> usize {
        self.pool.run_until_stalled();
        let failures: Vec<HandlerError> = self.async_failures.borrow_mut().drain(..).collect();
        for failure in &failures {
            self.report_failure(failure);
        }
        failures.len()
    }

    fn report_failure(&mut self, failure: &HandlerError) {
        error!(
            definition_id = %failure.definition_id,
            input = %failure.input,
            "Handler failed: {}",
            failure.message
        );
        self.notify(&Notification::HandlerFailed(failure.clone()));
    }

    fn notify(&mut self, notification: &Notification) {
        for (_, listener) in &mut self.listeners {
            listener(notification);
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("handler panicked: {message}")
    } else {
        "handler panicked".to_string()
    }
}
