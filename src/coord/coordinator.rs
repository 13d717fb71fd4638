//! RequestCoordinator - admission control in front of the connector
//!
//! The coordinator starts blocked. Requests that arrive before the connector is
//! ready are queued in arrival order and released when the coordinator is
//! resumed. Once open, the concurrency policy decides how many requests may be
//! inside the connector at once. Each admitted request holds an
//! [`AdmissionPermit`] that hands its slot back when dropped, so a request that
//! fails (or whose future is dropped) can never starve the ones behind it.
//!
//! All state transitions happen under one lock; permits are delivered to
//! waiters only after that lock is released.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::coord::types::{ConcurrencyPolicy, CoordinatorState};
use crate::core::errors::{ChainsimError, Result};

type Admission = Result<AdmissionPermit>;

/// Permits granted under the lock, delivered once it has been released
type Grants = Vec<(oneshot::Sender<Admission>, AdmissionPermit)>;

struct Waiter {
    ticket: u64,
    tx: oneshot::Sender<Admission>,
}

struct Inner {
    state: CoordinatorState,
    in_flight: usize,
    queue: VecDeque<Waiter>,
    startup_error: Option<String>,
    next_ticket: u64,
}

struct Shared {
    policy: ConcurrencyPolicy,
    inner: Mutex<Inner>,
}

impl Shared {
    fn has_capacity(&self, inner: &Inner) -> bool {
        match self.policy.limit() {
            Some(limit) => inner.in_flight < limit,
            None => true,
        }
    }

    fn grant(self: &Arc<Self>, inner: &mut Inner, ticket: u64) -> AdmissionPermit {
        inner.in_flight += 1;
        AdmissionPermit {
            shared: Arc::clone(self),
            ticket,
            released: false,
        }
    }

    /// Hand slots to queued waiters, oldest first, while capacity remains.
    fn drain_ready(self: &Arc<Self>, inner: &mut Inner) -> Grants {
        let mut grants = Vec::new();
        if inner.state != CoordinatorState::Open {
            return grants;
        }
        while self.has_capacity(inner) {
            let Some(waiter) = inner.queue.pop_front() else {
                break;
            };
            if waiter.tx.is_closed() {
                debug!(ticket = waiter.ticket, "Skipping abandoned admission");
                continue;
            }
            let permit = self.grant(inner, waiter.ticket);
            grants.push((waiter.tx, permit));
        }
        grants
    }

    fn resume(self: &Arc<Self>) -> Result<()> {
        let grants = {
            let mut inner = self.inner.lock();
            let state = inner.state;
            match state {
                CoordinatorState::Stopped => return Err(ChainsimError::stopped("resume")),
                CoordinatorState::Open => {
                    debug!("Request coordinator already open");
                    return Ok(());
                }
                CoordinatorState::Blocked => {}
            }
            if let Some(message) = &inner.startup_error {
                return Err(ChainsimError::startup_failed(message.clone()));
            }
            inner.state = CoordinatorState::Open;
            info!(
                policy = %self.policy,
                pending = inner.queue.len(),
                "Request coordinator resumed"
            );
            self.drain_ready(&mut inner)
        };
        deliver(grants);
        Ok(())
    }

    fn release(self: &Arc<Self>, ticket: u64) {
        let grants = {
            let mut inner = self.inner.lock();
            inner.in_flight = inner.in_flight.saturating_sub(1);
            debug!(ticket, in_flight = inner.in_flight, "Admission slot released");
            self.drain_ready(&mut inner)
        };
        deliver(grants);
    }

    fn is_stopped(&self) -> bool {
        self.inner.lock().state == CoordinatorState::Stopped
    }
}

fn deliver(grants: Grants) {
    for (tx, permit) in grants {
        // A receiver that went away between the check and the send gets its
        // permit dropped here, which releases the slot again.
        if let Err(unsent) = tx.send(Ok(permit)) {
            drop(unsent);
        }
    }
}

/// Admission-control gate shared by every caller of the executor
#[derive(Clone)]
pub struct RequestCoordinator {
    shared: Arc<Shared>,
}

impl RequestCoordinator {
    /// Create a coordinator in the `Blocked` state
    pub fn new(policy: ConcurrencyPolicy) -> Self {
        Self {
            shared: Arc::new(Shared {
                policy,
                inner: Mutex::new(Inner {
                    state: CoordinatorState::Blocked,
                    in_flight: 0,
                    queue: VecDeque::new(),
                    startup_error: None,
                    next_ticket: 0,
                }),
            }),
        }
    }

    pub fn policy(&self) -> ConcurrencyPolicy {
        self.shared.policy
    }

    pub fn state(&self) -> CoordinatorState {
        self.shared.inner.lock().state
    }

    /// Number of callers waiting for admission
    pub fn pending(&self) -> usize {
        self.shared.inner.lock().queue.len()
    }

    /// Number of admitted requests that have not released their slot
    pub fn in_flight(&self) -> usize {
        self.shared.inner.lock().in_flight
    }

    /// Message recorded by [`reject_pending`](Self::reject_pending), if any
    pub fn startup_error(&self) -> Option<String> {
        self.shared.inner.lock().startup_error.clone()
    }

    /// Wait for an admission slot.
    ///
    /// Suspends while the coordinator is blocked or, under a bounded policy,
    /// while every slot is taken. Fails with `CoordinatorStopped` once the
    /// coordinator is stopped and with `StartupFailed` once startup has been
    /// rejected.
    pub async fn admit(&self) -> Result<AdmissionPermit> {
        let rx = {
            let mut inner = self.shared.inner.lock();
            let ticket = inner.next_ticket;
            inner.next_ticket += 1;

            let state = inner.state;
            match state {
                CoordinatorState::Stopped => return Err(ChainsimError::stopped("admit")),
                CoordinatorState::Blocked => {
                    if let Some(message) = &inner.startup_error {
                        return Err(ChainsimError::startup_failed(message.clone()));
                    }
                }
                CoordinatorState::Open => {
                    if inner.queue.is_empty() && self.shared.has_capacity(&inner) {
                        debug!(ticket, "Request admitted");
                        return Ok(self.shared.grant(&mut inner, ticket));
                    }
                }
            }

            let (tx, rx) = oneshot::channel();
            inner.queue.push_back(Waiter { ticket, tx });
            debug!(
                ticket,
                state = %state,
                queued = inner.queue.len(),
                "Request queued for admission"
            );
            rx
        };

        match rx.await {
            Ok(admission) => admission,
            // The coordinator dropped the waiter without answering
            Err(_) => Err(ChainsimError::stopped("admit")),
        }
    }

    /// Open the coordinator and release queued requests.
    ///
    /// Queued requests are released oldest first. Resuming an open
    /// coordinator is a no-op.
    pub fn resume(&self) -> Result<()> {
        self.shared.resume()
    }

    /// Handle that can resume the coordinator later
    pub fn gate(&self) -> ResumeHandle {
        ResumeHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Stop the coordinator. Irreversible.
    ///
    /// Every queued request fails with `CoordinatorStopped`; requests already
    /// inside the connector run to completion.
    pub fn stop(&self) {
        let waiters: Vec<Waiter> = {
            let mut inner = self.shared.inner.lock();
            if inner.state == CoordinatorState::Stopped {
                return;
            }
            inner.state = CoordinatorState::Stopped;
            info!(
                pending = inner.queue.len(),
                in_flight = inner.in_flight,
                "Request coordinator stopped"
            );
            inner.queue.drain(..).collect()
        };
        for waiter in waiters {
            let _ = waiter.tx.send(Err(ChainsimError::stopped("admit")));
        }
    }

    /// Record a startup failure.
    ///
    /// The coordinator stays blocked and never opens; every queued request and
    /// every later admission fails with `StartupFailed` carrying `message`.
    pub fn reject_pending(&self, message: impl Into<String>) {
        let message = message.into();
        let waiters: Vec<Waiter> = {
            let mut inner = self.shared.inner.lock();
            if inner.state != CoordinatorState::Blocked {
                warn!(state = %inner.state, "Ignoring startup failure for a coordinator that is not blocked");
                return;
            }
            inner.startup_error = Some(message.clone());
            warn!(
                pending = inner.queue.len(),
                error = %message,
                "Rejecting queued requests after startup failure"
            );
            inner.queue.drain(..).collect()
        };
        for waiter in waiters {
            let _ = waiter
                .tx
                .send(Err(ChainsimError::startup_failed(message.clone())));
        }
    }
}

impl fmt::Debug for RequestCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("RequestCoordinator")
            .field("policy", &self.shared.policy)
            .field("state", &inner.state)
            .field("in_flight", &inner.in_flight)
            .field("pending", &inner.queue.len())
            .finish()
    }
}

/// Capability to resume a coordinator.
///
/// Checks the coordinator state on every call: after `stop()` it reports
/// `CoordinatorStopped` instead of reopening anything.
#[derive(Clone)]
pub struct ResumeHandle {
    shared: Arc<Shared>,
}

impl ResumeHandle {
    pub fn resume(&self) -> Result<()> {
        self.shared.resume()
    }
}

impl fmt::Debug for ResumeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumeHandle").finish_non_exhaustive()
    }
}

/// One admission slot. Dropping it releases the slot.
pub struct AdmissionPermit {
    shared: Arc<Shared>,
    ticket: u64,
    released: bool,
}

impl AdmissionPermit {
    /// Position of the request in admission order
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Signal completion explicitly.
    ///
    /// The slot is released either way; the result reports whether the
    /// coordinator was stopped while the request was in flight.
    pub fn complete(mut self) -> Result<()> {
        let stopped = self.shared.is_stopped();
        self.released = true;
        self.shared.release(self.ticket);
        if stopped {
            Err(ChainsimError::stopped("complete"))
        } else {
            Ok(())
        }
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            self.shared.release(self.ticket);
        }
    }
}

impl fmt::Debug for AdmissionPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionPermit")
            .field("ticket", &self.ticket)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn wait_for_pending(coordinator: &RequestCoordinator, expected: usize) {
        for _ in 0..200 {
            if coordinator.pending() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!(
            "expected {} pending admissions, found {}",
            expected,
            coordinator.pending()
        );
    }

    #[tokio::test]
    async fn test_starts_blocked_and_queues() {
        let coordinator = RequestCoordinator::new(ConcurrencyPolicy::Serialized);
        assert_eq!(coordinator.state(), CoordinatorState::Blocked);

        let waiting = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.admit().await })
        };
        wait_for_pending(&coordinator, 1).await;
        assert_eq!(coordinator.in_flight(), 0);

        coordinator.resume().unwrap();
        let permit = waiting.await.unwrap().unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Open);
        assert_eq!(coordinator.in_flight(), 1);
        drop(permit);
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_serialized_holds_second_request() {
        let coordinator = RequestCoordinator::new(ConcurrencyPolicy::Serialized);
        coordinator.resume().unwrap();

        let first = coordinator.admit().await.unwrap();
        let second = timeout(Duration::from_millis(50), coordinator.admit()).await;
        assert!(second.is_err(), "second admission must wait for the slot");

        drop(first);
        let third = timeout(Duration::from_millis(50), coordinator.admit()).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn test_unbounded_releases_everything_on_resume() {
        let coordinator = RequestCoordinator::new(ConcurrencyPolicy::Unbounded);
        let handles: Vec<_> = (0..5)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.admit().await })
            })
            .collect();
        wait_for_pending(&coordinator, 5).await;

        coordinator.resume().unwrap();
        let mut permits = Vec::new();
        for handle in handles {
            permits.push(handle.await.unwrap().unwrap());
        }
        assert_eq!(coordinator.in_flight(), 5);
        assert_eq!(coordinator.pending(), 0);
    }

    #[tokio::test]
    async fn test_limited_policy() {
        let coordinator = RequestCoordinator::new(ConcurrencyPolicy::Limited(2));
        coordinator.resume().unwrap();
        let _a = coordinator.admit().await.unwrap();
        let _b = coordinator.admit().await.unwrap();
        assert!(timeout(Duration::from_millis(30), coordinator.admit())
            .await
            .is_err());
        assert_eq!(coordinator.in_flight(), 2);
    }

    #[tokio::test]
    async fn test_blocked_release_is_fifo() {
        let coordinator = RequestCoordinator::new(ConcurrencyPolicy::Serialized);
        let mut handles = Vec::new();
        for expected in 0..3 {
            let coordinator_clone = coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator_clone.admit().await.map(|p| p.ticket())
            }));
            wait_for_pending(&coordinator, expected + 1).await;
        }
        coordinator.resume().unwrap();
        let mut tickets = Vec::new();
        for handle in handles {
            tickets.push(handle.await.unwrap().unwrap());
        }
        assert_eq!(tickets, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_abandoned_waiter_does_not_hold_slot() {
        let coordinator = RequestCoordinator::new(ConcurrencyPolicy::Serialized);
        coordinator.resume().unwrap();
        let first = coordinator.admit().await.unwrap();

        let abandoned = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.admit().await })
        };
        wait_for_pending(&coordinator, 1).await;
        abandoned.abort();
        assert!(abandoned.await.is_err());

        drop(first);
        assert_eq!(coordinator.in_flight(), 0);
        let next = timeout(Duration::from_millis(50), coordinator.admit()).await;
        assert!(next.is_ok());
    }

    #[tokio::test]
    async fn test_stop_fails_queued_and_future_admissions() {
        let coordinator = RequestCoordinator::new(ConcurrencyPolicy::Serialized);
        let queued = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.admit().await })
        };
        wait_for_pending(&coordinator, 1).await;

        coordinator.stop();
        assert_eq!(coordinator.state(), CoordinatorState::Stopped);
        let err = queued.await.unwrap().unwrap_err();
        assert!(matches!(err, ChainsimError::CoordinatorStopped { .. }));
        assert!(matches!(
            coordinator.admit().await,
            Err(ChainsimError::CoordinatorStopped { .. })
        ));
    }

    #[tokio::test]
    async fn test_stale_gate_reports_stop() {
        let coordinator = RequestCoordinator::new(ConcurrencyPolicy::Unbounded);
        let gate = coordinator.gate();
        coordinator.stop();
        let err = gate.resume().unwrap_err();
        assert!(matches!(err, ChainsimError::CoordinatorStopped { ref operation } if operation == "resume"));
        assert_eq!(coordinator.state(), CoordinatorState::Stopped);
    }

    #[tokio::test]
    async fn test_complete_after_stop() {
        let coordinator = RequestCoordinator::new(ConcurrencyPolicy::Serialized);
        coordinator.resume().unwrap();
        let permit = coordinator.admit().await.unwrap();
        coordinator.stop();
        assert!(permit.complete().is_err());
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_reject_pending_keeps_coordinator_blocked() {
        let coordinator = RequestCoordinator::new(ConcurrencyPolicy::Serialized);
        let queued = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.admit().await })
        };
        wait_for_pending(&coordinator, 1).await;

        coordinator.reject_pending("genesis missing");
        let err = queued.await.unwrap().unwrap_err();
        assert!(matches!(err, ChainsimError::StartupFailed { ref message } if message == "genesis missing"));

        assert_eq!(coordinator.state(), CoordinatorState::Blocked);
        assert!(matches!(
            coordinator.admit().await,
            Err(ChainsimError::StartupFailed { .. })
        ));
        assert!(coordinator.resume().is_err());
        assert_eq!(coordinator.startup_error().as_deref(), Some("genesis missing"));
    }
}
