//! Request/response double queue shared by the host thread and the worker.
//!
//! Both queues and the stop flag live under one mutex; a single condition
//! variable wakes the worker when a request arrives or a stop is requested.
//! Every critical section is a push, a pop, or a swap, so the host never
//! waits on inference.

use std::collections::VecDeque;
use std::mem;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::models::{Request, Response};

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Request>,
    completed: VecDeque<Response>,
    stopping: bool,
}

/// Thread-safe bridge between the host thread and the worker thread.
#[derive(Default)]
pub struct RequestQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl RequestQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a request and wake the worker.
    pub fn push_request(&self, request: Request) {
        self.lock().pending.push_back(request);
        self.ready.notify_one();
    }

    /// Block until a request is available or a stop is requested.
    ///
    /// Returns `None` once stopping; requests still pending at that point are
    /// abandoned.
    #[must_use]
    pub fn next_request(&self) -> Option<Request> {
        let mut state = self
            .ready
            .wait_while(self.lock(), |state| {
                !state.stopping && state.pending.is_empty()
            })
            .unwrap_or_else(PoisonError::into_inner);
        if state.stopping {
            return None;
        }
        state.pending.pop_front()
    }

    /// Post a finished response for the host.
    pub fn push_response(&self, response: Response) {
        self.lock().completed.push_back(response);
    }

    /// Take every finished response, oldest first.
    #[must_use]
    pub fn drain_responses(&self) -> VecDeque<Response> {
        mem::take(&mut self.lock().completed)
    }

    /// Take every request the worker has not started yet.
    #[must_use]
    pub fn take_pending(&self) -> VecDeque<Request> {
        mem::take(&mut self.lock().pending)
    }

    /// Ask the worker to exit after its current exchange.
    pub fn request_stop(&self) {
        self.lock().stopping = true;
        self.ready.notify_all();
    }

    /// Number of requests waiting for the worker.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }
}
