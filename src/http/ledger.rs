//! The three request queues
//!
//! Every request lives in exactly one queue: `pending` until bound to a
//! connection, `sent` while its response is reassembled, `completed` until
//! the caller takes it. Each queue has its own mutex and locks are held only
//! for the queue operation itself. Where two are held together (moving a
//! request from pending to sent) `sent` is taken before `pending`.

use super::request::Request;
use crate::net::{IpVersion, SystemAddress};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

pub(crate) type Queue<C> = VecDeque<Request<C>>;

/// Lock a queue, recovering it if a panicking thread poisoned the mutex
///
/// Queue operations never leave a queue half-updated, so the data behind a
/// poisoned lock is still consistent.
fn lock<'a, C>(name: &'static str, queue: &'a Mutex<Queue<C>>) -> MutexGuard<'a, Queue<C>> {
    queue.lock().unwrap_or_else(|poisoned| {
        tracing::warn!(queue = name, "recovering poisoned queue lock");
        poisoned.into_inner()
    })
}

pub(crate) struct Ledger<C> {
    pending: Mutex<Queue<C>>,
    sent: Mutex<Queue<C>>,
    completed: Mutex<Queue<C>>,
}

impl<C> Ledger<C> {
    pub(crate) fn new() -> Self {
        Ledger {
            pending: Mutex::new(VecDeque::new()),
            sent: Mutex::new(VecDeque::new()),
            completed: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn pending(&self) -> MutexGuard<'_, Queue<C>> {
        lock("pending", &self.pending)
    }

    pub(crate) fn sent(&self) -> MutexGuard<'_, Queue<C>> {
        lock("sent", &self.sent)
    }

    pub(crate) fn completed(&self) -> MutexGuard<'_, Queue<C>> {
        lock("completed", &self.completed)
    }

    /// Take the pending request to bind to `address`
    ///
    /// Prefers the first request resolved to `address`; otherwise takes the
    /// first pending request whatever its destination. The flag reports
    /// whether the destination matched.
    pub(crate) fn take_pending_for(&self, address: SystemAddress) -> Option<(Request<C>, bool)> {
        let mut pending = self.pending();
        match pending.iter().position(|r| r.estimated_address == address) {
            Some(index) => pending.remove(index).map(|r| (r, true)),
            None => pending.pop_front().map(|r| (r, false)),
        }
    }

    /// Remove every pending request resolved to `address`
    pub(crate) fn remove_pending_for(&self, address: SystemAddress) -> Vec<Request<C>> {
        let mut pending = self.pending();
        let (removed, kept): (Vec<Request<C>>, Vec<Request<C>>) = pending
            .drain(..)
            .partition(|r| r.estimated_address == address);
        *pending = kept.into();
        removed
    }

    /// Connection parameters of the oldest pending request
    pub(crate) fn first_pending_target(&self) -> Option<(String, u16, IpVersion)> {
        self.pending()
            .front()
            .map(|r| (r.host.clone(), r.port, r.ip_version))
    }

    /// Remove the first sent request bound to `address`
    pub(crate) fn take_sent_from(&self, address: SystemAddress) -> Option<Request<C>> {
        let mut sent = self.sent();
        let index = sent.iter().position(|r| r.is_bound_to(address))?;
        sent.remove(index)
    }

    /// Remove every sent request bound to `address`, in queue order
    pub(crate) fn drain_sent_from(&self, address: SystemAddress) -> Vec<Request<C>> {
        let mut sent = self.sent();
        let (removed, kept): (Vec<Request<C>>, Vec<Request<C>>) =
            sent.drain(..).partition(|r| r.is_bound_to(address));
        *sent = kept.into();
        removed
    }

    pub(crate) fn push_sent(&self, request: Request<C>) {
        self.sent().push_back(request);
    }

    pub(crate) fn push_completed(&self, request: Request<C>) {
        self.completed().push_back(request);
    }

    pub(crate) fn pop_completed(&self) -> Option<Request<C>> {
        self.completed().pop_front()
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending().len()
    }

    pub(crate) fn sent_len(&self) -> usize {
        self.sent().len()
    }

    pub(crate) fn completed_len(&self) -> usize {
        self.completed().len()
    }
}
