/// Bounded-concurrency admission gate
///
/// A counting semaphore with identity-keyed, cancellable waiters. It caps how many
/// trigger registrations run at once so that a burst of activations cannot exhaust
/// the external systems being polled or subscribed to.
///
/// Caller obligations (not detected at runtime):
/// - `release()` is called exactly once for every admission that was granted.
/// - `remove(id)` is only used for waiters that are still queued. Removing an id that
///   already holds its unit is a no-op only if no other queued waiter shares that id.

use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::sync::oneshot;

/// Returned by [`Acquire`] when its queued waiter was withdrawn through
/// [`AdmissionGate::remove`] before being granted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("admission for '{id}' was withdrawn before it was granted")]
pub struct AdmissionWithdrawn {
    pub id: String,
}

/// Queued request for a unit of capacity
struct Waiter {
    id: String,
    ticket: u64,
    resume: oneshot::Sender<()>,
}

struct GateState {
    /// Units left in the pool. Goes negative by the number of queued waiters.
    available: i64,
    waiting: VecDeque<Waiter>,
    next_ticket: u64,
}

impl GateState {
    /// Hand the unit to the first live waiter. Waiters whose `Acquire` future is gone
    /// have already withdrawn themselves, so every queued sender is normally live.
    fn grant_head(&mut self) {
        while let Some(waiter) = self.waiting.pop_front() {
            if waiter.resume.send(()).is_ok() {
                return;
            }
            tracing::debug!("Skipping abandoned admission waiter: {}", waiter.id);
        }
    }

    fn release(&mut self) {
        self.available += 1;
        self.grant_head();
    }
}

/// Counting semaphore with FIFO, identity-keyed waiters
#[derive(Clone)]
pub struct AdmissionGate {
    capacity: usize,
    state: Arc<Mutex<GateState>>,
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AdmissionGate")
            .field("capacity", &self.capacity)
            .field("available", &state.available)
            .field("queued", &state.waiting.len())
            .finish()
    }
}

impl AdmissionGate {
    /// Create a gate admitting at most `capacity` concurrent holders
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Arc::new(Mutex::new(GateState {
                available: capacity as i64,
                waiting: VecDeque::new(),
                next_ticket: 0,
            })),
        }
    }

    /// Reserve one unit of capacity for `id`.
    ///
    /// The reservation is taken when this method is called, not when the returned
    /// future is first polled: queue position is fixed by call order. The future
    /// resolves immediately if a unit was free, otherwise once a `release()` (or a
    /// `remove()` of a waiter ahead of it) hands it the unit.
    ///
    /// Dropping the future while still queued withdraws the waiter and returns its
    /// reservation to the pool. Dropping it after a grant it never reported releases
    /// the unit.
    pub fn acquire(&self, id: impl Into<String>) -> Acquire {
        let id = id.into();
        let mut state = self.state.lock();
        state.available -= 1;
        if state.available >= 0 {
            return Acquire { gate: Arc::clone(&self.state), id, ticket: 0, stage: Stage::Granted };
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        let (tx, rx) = oneshot::channel();
        state.waiting.push_back(Waiter { id: id.clone(), ticket, resume: tx });
        tracing::debug!("⏳ Admission queued for {} ({} waiting)", id, state.waiting.len());

        Acquire { gate: Arc::clone(&self.state), id, ticket, stage: Stage::Queued(rx) }
    }

    /// Acquire a unit for `id` and hold it in a permit that releases on drop.
    ///
    /// The unit is returned even when the holder panics or is cancelled while
    /// holding it.
    pub async fn admit(&self, id: impl Into<String>) -> Result<AdmissionPermit, AdmissionWithdrawn> {
        self.acquire(id).await?;
        Ok(AdmissionPermit { gate: self.clone() })
    }

    /// Return one unit to the pool and grant it to the head waiter, if any
    pub fn release(&self) {
        self.state.lock().release();
    }

    /// Withdraw the first queued waiter registered under `id`.
    ///
    /// The withdrawn waiter's reservation is not returned to the pool: it passes
    /// straight to the next queued waiter, which is granted immediately. No-op when
    /// no queued waiter matches.
    pub fn remove(&self, id: &str) {
        let mut state = self.state.lock();
        let Some(index) = state.waiting.iter().position(|waiter| waiter.id == id) else {
            return;
        };
        state.waiting.remove(index);
        tracing::debug!("🚫 Admission withdrawn for {}", id);
        state.grant_head();
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the internal counter (negative while waiters are queued)
    pub fn available(&self) -> i64 {
        self.state.lock().available
    }

    /// Number of queued waiters
    pub fn queued(&self) -> usize {
        self.state.lock().waiting.len()
    }
}

/// Future returned by [`AdmissionGate::acquire`]
#[must_use = "the reservation is withdrawn when the future is dropped"]
pub struct Acquire {
    gate: Arc<Mutex<GateState>>,
    id: String,
    ticket: u64,
    stage: Stage,
}

enum Stage {
    /// Unit was free at call time and has not been reported yet
    Granted,
    /// Waiting in the queue for a grant or a withdrawal
    Queued(oneshot::Receiver<()>),
    /// Outcome reported to the caller
    Settled,
}

impl Future for Acquire {
    type Output = Result<(), AdmissionWithdrawn>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let outcome = match &mut this.stage {
            Stage::Granted => Ok(()),
            Stage::Queued(resume) => match Pin::new(resume).poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(granted) => granted.map_err(|_| AdmissionWithdrawn { id: this.id.clone() }),
            },
            Stage::Settled => return Poll::Ready(Ok(())),
        };
        this.stage = Stage::Settled;
        Poll::Ready(outcome)
    }
}

impl Drop for Acquire {
    fn drop(&mut self) {
        match std::mem::replace(&mut self.stage, Stage::Settled) {
            Stage::Settled => {}
            Stage::Granted => self.gate.lock().release(),
            Stage::Queued(mut resume) => {
                // Grants are sent under the lock, so the receiver state is stable here.
                let mut state = self.gate.lock();
                if let Some(index) = state.waiting.iter().position(|waiter| waiter.ticket == self.ticket) {
                    state.waiting.remove(index);
                    state.available += 1;
                } else if resume.try_recv().is_ok() {
                    // Granted but never observed by the caller
                    state.release();
                }
            }
        }
    }
}

/// A held unit of gate capacity, released when dropped
#[must_use = "the unit is released as soon as the permit is dropped"]
#[derive(Debug)]
pub struct AdmissionPermit {
    gate: AdmissionGate,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn granted(acquire: &mut Acquire) -> bool {
        matches!(acquire.now_or_never(), Some(Ok(())))
    }

    #[test]
    fn test_grants_immediately_up_to_capacity() {
        let gate = AdmissionGate::new(2);

        let mut a = gate.acquire("a");
        let mut b = gate.acquire("b");
        let mut c = gate.acquire("c");

        assert!(granted(&mut a));
        assert!(granted(&mut b));
        assert!(!granted(&mut c));
        assert_eq!(gate.available(), -1);
        assert_eq!(gate.queued(), 1);

        gate.release();
        assert!(granted(&mut c));
        assert_eq!(gate.available(), 0);
        assert_eq!(gate.queued(), 0);
    }

    #[test]
    fn test_reservation_taken_at_call_time() {
        let gate = AdmissionGate::new(1);

        // Neither future has been polled yet
        let mut first = gate.acquire("first");
        let mut second = gate.acquire("second");
        assert_eq!(gate.available(), -1);

        assert!(!granted(&mut second));
        assert!(granted(&mut first));
    }

    #[test]
    fn test_waiters_granted_in_fifo_order() {
        let gate = AdmissionGate::new(1);
        let mut holder = gate.acquire("holder");
        assert!(granted(&mut holder));

        let mut a = gate.acquire("a");
        let mut b = gate.acquire("b");
        let mut c = gate.acquire("c");

        gate.release();
        assert!(granted(&mut a));
        assert!(!granted(&mut b));
        assert!(!granted(&mut c));

        gate.release();
        assert!(granted(&mut b));
        assert!(!granted(&mut c));

        gate.release();
        assert!(granted(&mut c));
    }

    #[test]
    fn test_remove_forfeits_reservation_to_next_waiter() {
        let gate = AdmissionGate::new(1);
        let mut holder = gate.acquire("holder");
        assert!(granted(&mut holder));

        let mut b = gate.acquire("b");
        let mut c = gate.acquire("c");
        assert_eq!(gate.available(), -2);

        gate.remove("b");

        assert_eq!(gate.available(), -2);
        assert!(granted(&mut c));
        assert_eq!(b.now_or_never(), Some(Err(AdmissionWithdrawn { id: "b".to_string() })));
    }

    #[test]
    fn test_release_returns_capacity_unlike_remove() {
        let gate = AdmissionGate::new(1);
        let mut holder = gate.acquire("holder");
        assert!(granted(&mut holder));
        let mut b = gate.acquire("b");

        gate.release();

        assert_eq!(gate.available(), 0);
        assert!(granted(&mut b));
    }

    #[test]
    fn test_remove_unknown_or_granted_id_is_noop() {
        let gate = AdmissionGate::new(1);
        let mut holder = gate.acquire("holder");
        assert!(granted(&mut holder));
        let mut queued = gate.acquire("queued");

        gate.remove("missing");
        gate.remove("holder");

        assert_eq!(gate.available(), -1);
        assert_eq!(gate.queued(), 1);
        assert!(!granted(&mut queued));
    }

    #[test]
    fn test_remove_cancels_first_matching_id_only() {
        let gate = AdmissionGate::new(1);
        let mut holder = gate.acquire("holder");
        assert!(granted(&mut holder));

        let first = gate.acquire("dup");
        let mut second = gate.acquire("dup");

        gate.remove("dup");

        assert!(first.now_or_never().is_some_and(|outcome| outcome.is_err()));
        assert!(granted(&mut second));
        assert_eq!(gate.queued(), 0);
    }

    #[test]
    fn test_dropping_queued_acquire_returns_reservation() {
        let gate = AdmissionGate::new(1);
        let mut holder = gate.acquire("holder");
        assert!(granted(&mut holder));

        let abandoned = gate.acquire("abandoned");
        let mut next = gate.acquire("next");
        assert_eq!(gate.available(), -2);

        drop(abandoned);
        assert_eq!(gate.available(), -1);
        assert_eq!(gate.queued(), 1);

        gate.release();
        assert!(granted(&mut next));
        gate.release();
        assert_eq!(gate.available(), 1);
    }

    #[test]
    fn test_dropping_granted_but_unobserved_acquire_releases() {
        let gate = AdmissionGate::new(1);
        let mut holder = gate.acquire("holder");
        assert!(granted(&mut holder));

        let unobserved = gate.acquire("unobserved");
        gate.release();
        assert_eq!(gate.available(), 0);

        drop(unobserved);
        assert_eq!(gate.available(), 1);
    }

    #[test]
    fn test_dropping_unpolled_immediate_grant_releases() {
        let gate = AdmissionGate::new(1);

        drop(gate.acquire("a"));
        assert_eq!(gate.available(), 1);

        let mut b = gate.acquire("b");
        assert!(granted(&mut b));
        assert_eq!(gate.queued(), 0);
    }

    #[test]
    fn test_observed_grant_is_not_released_on_drop() {
        let gate = AdmissionGate::new(1);

        let mut a = gate.acquire("a");
        assert!(granted(&mut a));
        drop(a);

        assert_eq!(gate.available(), 0);
    }

    #[tokio::test]
    async fn test_permit_releases_on_drop() {
        let gate = AdmissionGate::new(1);

        let permit = gate.admit("a").await.expect("admitted");
        let mut queued = gate.acquire("b");
        assert!(!granted(&mut queued));

        drop(permit);
        assert!(granted(&mut queued));
    }

    #[tokio::test]
    async fn test_permit_released_when_holder_panics() {
        let gate = AdmissionGate::new(1);

        let holder = gate.clone();
        let crashed = tokio::spawn(async move {
            let _permit = holder.admit("crashing").await.expect("admitted");
            panic!("registry blew up");
        })
        .await;

        assert!(crashed.unwrap_err().is_panic());
        assert_eq!(gate.available(), 1);
    }

    #[test]
    fn test_zero_capacity_queues_everything() {
        let gate = AdmissionGate::new(0);
        let mut a = gate.acquire("a");
        assert!(!granted(&mut a));

        gate.release();
        assert!(granted(&mut a));
    }

    /// Five callers behind a gate of one; the fourth is withdrawn while queued.
    #[test]
    fn test_withdrawn_waiter_lets_the_next_one_start() {
        let gate = AdmissionGate::new(1);
        let mut waiters: Vec<Acquire> = ["1", "2", "3", "4", "5"]
            .into_iter()
            .map(|id| gate.acquire(id))
            .collect();

        assert!(granted(&mut waiters[0]));
        assert!(!granted(&mut waiters[1]));

        // "1" finishes, "2" starts rather than "3"
        gate.release();
        assert!(granted(&mut waiters[1]));
        assert!(!granted(&mut waiters[2]));

        // "2" finishes, "3" starts
        gate.release();
        assert!(granted(&mut waiters[2]));
        assert!(!granted(&mut waiters[4]));

        // "4" withdrawn while "3" is running: "5" starts without another release
        gate.remove("4");
        assert!(granted(&mut waiters[4]));
        assert!(matches!((&mut waiters[3]).now_or_never(), Some(Err(_))));

        gate.release();
        gate.release();
        assert_eq!(gate.queued(), 0);
    }

    #[tokio::test]
    async fn test_queued_acquire_wakes_spawned_task() {
        let gate = AdmissionGate::new(1);
        let mut holder = gate.acquire("holder");
        assert!(granted(&mut holder));

        let waiting = gate.acquire("waiting");
        let task = tokio::spawn(waiting);
        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        gate.release();
        assert_eq!(task.await.expect("task panicked"), Ok(()));
    }
}
