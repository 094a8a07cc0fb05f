//! Correlation table mapping request ids to single-resolution waiters
//!
//! Entries are added only by the dispatcher and removed by whichever of the
//! response reader, the cancelling caller, or the termination handler gets
//! there first. Removal and resolution happen under one lock acquisition, so
//! a waiter is resolved at most once.

use crate::error::{WorkerError, WorkerResult};
use crate::protocol::{RemoteErrorPayload, RequestId, ResponseBody};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// The single outcome delivered to a waiter
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// The worker returned a result payload
    Result(Value),
    /// The worker returned an error object
    Remote(RemoteErrorPayload),
    /// The issuing caller cancelled
    Cancelled,
    /// The worker went away before answering
    Terminated(String),
}

impl From<ResponseBody> for Completion {
    fn from(body: ResponseBody) -> Self {
        match body {
            ResponseBody::Result(value) => Self::Result(value),
            ResponseBody::Error(payload) => Self::Remote(payload),
        }
    }
}

impl Completion {
    /// Convert into the caller-facing result for `method`
    pub fn into_result(self, method: &str) -> WorkerResult<Value> {
        match self {
            Self::Result(value) => Ok(value),
            Self::Remote(payload) => Err(payload.into_error(method)),
            Self::Cancelled => Err(WorkerError::cancelled(method)),
            Self::Terminated(reason) => Err(WorkerError::terminated(reason)),
        }
    }
}

/// Receiving half of a registered entry, awaited by the issuing call
#[derive(Debug)]
pub struct Waiter {
    id: RequestId,
    rx: oneshot::Receiver<Completion>,
}

impl Waiter {
    pub fn id(&self) -> &RequestId {
        &self.id
    }
}

impl Future for Waiter {
    type Output = Completion;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Completion::Terminated("waiter dropped without resolution".to_string())
            })
        })
    }
}

#[derive(Default)]
struct TableState {
    waiters: HashMap<RequestId, oneshot::Sender<Completion>>,
    /// Set once the table has been drained for termination
    closed: Option<String>,
}

/// Shared mapping from request id to pending waiter
#[derive(Default)]
pub struct PendingTable {
    state: Mutex<TableState>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `id`.
    ///
    /// Fails with `Terminated` once the table is closed, and with
    /// `DuplicateRequestId` if `id` is already pending.
    pub fn register(&self, id: RequestId) -> WorkerResult<Waiter> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.closed {
            return Err(WorkerError::terminated(reason.clone()));
        }
        if state.waiters.contains_key(&id) {
            return Err(WorkerError::DuplicateRequestId { id: id.to_string() });
        }

        let (tx, rx) = oneshot::channel();
        state.waiters.insert(id.clone(), tx);
        Ok(Waiter { id, rx })
    }

    /// Remove and resolve the waiter for `id`.
    ///
    /// Returns `false` when no entry exists (already resolved, cancelled, or
    /// never registered).
    pub fn resolve(&self, id: &str, completion: Completion) -> bool {
        let sender = self.state.lock().waiters.remove(id);
        match sender {
            Some(tx) => {
                // The receiver may have been dropped by an aborted caller.
                let _ = tx.send(completion);
                true
            }
            None => false,
        }
    }

    /// Remove the entry for `id` without resolving it.
    ///
    /// Used when the request never reached the worker, or its caller went
    /// away; the waiter then reads as `Terminated` if still polled.
    pub fn forget(&self, id: &str) -> bool {
        self.state.lock().waiters.remove(id).is_some()
    }

    /// Resolve every pending waiter with `Terminated` and refuse new entries.
    ///
    /// Returns how many waiters were drained. Later calls drain nothing and
    /// keep the first reason.
    pub fn close(&self, reason: impl Into<String>) -> usize {
        let reason = reason.into();
        let drained: Vec<_> = {
            let mut state = self.state.lock();
            if state.closed.is_none() {
                state.closed = Some(reason.clone());
            }
            state.waiters.drain().collect()
        };

        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Completion::Terminated(reason.clone()));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.state.lock().waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().waiters.contains_key(id)
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed.is_some()
    }
}
