use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// A once-closeable gate that any number of waiters can join, modeling the
/// reference implementation's `close(chan struct{})` broadcast-on-close
/// signal with a condition variable instead: closing notifies every
/// current and future `wait` call, and `wait` never blocks past `close`.
#[derive(Default)]
pub struct Waiter {
    closed: Mutex<bool>,
    condvar: Condvar,
}

impl Waiter {
    pub fn new() -> Waiter {
        Waiter {
            closed: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Signals every current and future waiter. Idempotent.
    pub fn close(&self) {
        let mut closed = self.closed.lock().unwrap();
        *closed = true;
        self.condvar.notify_all();
    }

    /// Blocks until closed or `timeout` elapses. Returns `true` if closed.
    pub fn wait(&self, timeout: Duration) -> bool {
        let closed = self.closed.lock().unwrap();
        if *closed {
            return true;
        }
        let (closed, _) = self
            .condvar
            .wait_timeout_while(closed, timeout, |closed| !*closed)
            .unwrap();
        *closed
    }
}
