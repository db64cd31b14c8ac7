#![forbid(unsafe_code)]

//! Deferred notification queue.
//!
//! Deferred subscribers do not run inside the write that triggered them.
//! Instead they are queued here (once per batch, however many ops arrive) and
//! run when the host calls [`flush`], typically once per event-loop turn.
//! The queue is thread-local, matching the single-threaded ownership of
//! [`Observable`](crate::Observable).

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Weak;

use crate::observable::Listener;

thread_local! {
    static PENDING: RefCell<VecDeque<Weak<Listener>>> = const { RefCell::new(VecDeque::new()) };
}

pub(crate) fn enqueue(listener: Weak<Listener>) {
    PENDING.with(|queue| queue.borrow_mut().push_back(listener));
}

/// Deliver every pending batch.
///
/// Subscribers enqueued by callbacks during the flush are delivered in the
/// same call. Returns the number of batches delivered; subscribers dropped
/// while queued are skipped and not counted.
pub fn flush() -> usize {
    let mut delivered = 0;
    loop {
        let next = PENDING.with(|queue| queue.borrow_mut().pop_front());
        let Some(weak) = next else {
            break;
        };
        if let Some(listener) = weak.upgrade() {
            listener.drain();
            delivered += 1;
        }
    }
    if delivered > 0 {
        tracing::trace!(message = "scheduler.flush", delivered);
    }
    delivered
}

/// Number of subscribers currently waiting for delivery.
#[must_use]
pub fn pending() -> usize {
    PENDING.with(|queue| queue.borrow().len())
}
