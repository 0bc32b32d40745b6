//! Load scheduler: turns the traversal's requested set into a bounded set of
//! in-flight loads.
//!
//! The scheduler is synchronous and never spawns anything itself. Each call
//! returns the [`Admission`]s the caller must start; results are fed back
//! through [`LoadScheduler::complete`].
//!
//! # Reconcile order
//!
//! 1. Requests no longer wanted are dropped (pending) or cancelled (in-flight).
//! 2. Newly wanted nodes get a pending request, unless they already failed
//!    during this session.
//! 3. Priorities of surviving requests are refreshed.
//! 4. Pending requests are admitted in priority order up to
//!    `max_concurrent_loads`, skipping those still in retry backoff.
//!
//! A node that is still wanted keeps its existing request, so reconciling the
//! same set twice issues and cancels nothing the second time.
//!
//! # Example
//!
//! ```ignore
//! let mut scheduler = LoadScheduler::new(SchedulerConfig::default());
//! let outcome = scheduler.reconcile(&traversal.requested);
//! for admission in outcome.admitted {
//!     spawn_load(admission);
//! }
//! // later, on the control flow:
//! match scheduler.complete(&node_id, ticket, result) {
//!     Completion::Loaded { content, .. } => cache.insert(node_id, Arc::new(content)),
//!     _ => {}
//! }
//! ```

mod policy;
mod queue;
mod request;

pub use policy::{
    LoadPriority, RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY, DEFAULT_RETRY_DELAY_CAP,
};
pub use queue::{AdmissionQueue, QueuedLoad};
pub use request::{LoadRequest, LoadState, Ticket};

use crate::loader::{DecodedContent, LoadError, LoadErrorKind};
use crate::tileset::{NodeId, TilesetId};
use crate::traversal::TileRequest;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Default cap on concurrently running loads.
pub const DEFAULT_MAX_CONCURRENT_LOADS: usize = 16;

/// Default time a load may stay in flight before it is failed.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Scheduler tuning.
#[derive(Clone, Debug, PartialEq)]
pub struct SchedulerConfig {
    pub max_concurrent_loads: usize,
    pub retry_policy: RetryPolicy,
    /// `None` disables timeouts.
    pub request_timeout: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_loads: DEFAULT_MAX_CONCURRENT_LOADS,
            retry_policy: RetryPolicy::default(),
            request_timeout: Some(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// A load the caller must start now.
#[derive(Clone, Debug)]
pub struct Admission {
    pub node_id: NodeId,
    pub url: String,
    pub ticket: Ticket,
    pub cancel: CancellationToken,
    /// 1 for the first attempt.
    pub attempt: u32,
}

/// A request removed by reconcile because its node is no longer wanted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cancellation {
    pub node_id: NodeId,
    /// Whether a running load was signalled (as opposed to a pending drop).
    pub was_in_flight: bool,
}

/// Effects of one reconcile call.
#[derive(Clone, Debug, Default)]
pub struct ReconcileOutcome {
    pub created: Vec<NodeId>,
    pub cancelled: Vec<Cancellation>,
    pub admitted: Vec<Admission>,
    /// Requested nodes skipped because they failed earlier this session.
    pub filtered_failed: Vec<NodeId>,
}

impl ReconcileOutcome {
    /// True when the call neither created, cancelled nor admitted anything.
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.cancelled.is_empty() && self.admitted.is_empty()
    }
}

/// What a finished load meant for its request.
#[derive(Debug)]
pub enum Completion {
    /// Content is ready to enter the cache.
    Loaded {
        node_id: NodeId,
        content: DecodedContent,
        attempts: u32,
    },
    /// Transient failure; the request is pending again after `delay`.
    Retrying {
        node_id: NodeId,
        attempt: u32,
        delay: Duration,
        error: LoadError,
    },
    /// Permanent failure; the node is excluded for the rest of the session.
    Failed {
        node_id: NodeId,
        kind: LoadErrorKind,
        error: LoadError,
    },
    /// The load observed its own cancellation.
    Cancelled { node_id: NodeId },
    /// Stale result for a request that was cancelled or re-admitted.
    Discarded { node_id: NodeId, ticket: Ticket },
}

// =============================================================================
// Scheduler
// =============================================================================

/// Owns every live [`LoadRequest`], at most one per node.
#[derive(Debug)]
pub struct LoadScheduler {
    config: SchedulerConfig,
    requests: HashMap<NodeId, LoadRequest>,
    failed: HashMap<NodeId, LoadErrorKind>,
    next_ticket: u64,
}

impl LoadScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            requests: HashMap::new(),
            failed: HashMap::new(),
            next_ticket: 1,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Reconciles against the requested set at the current instant.
    pub fn reconcile(&mut self, requested: &BTreeMap<NodeId, TileRequest>) -> ReconcileOutcome {
        self.reconcile_at(requested, Instant::now())
    }

    /// Reconciles against the requested set at `now`.
    pub fn reconcile_at(
        &mut self,
        requested: &BTreeMap<NodeId, TileRequest>,
        now: Instant,
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();

        // Cancellations before anything else
        let mut stale: Vec<NodeId> = self
            .requests
            .keys()
            .filter(|id| !requested.contains_key(*id))
            .cloned()
            .collect();
        stale.sort();
        for node_id in stale {
            if let Some(mut request) = self.requests.remove(&node_id) {
                let was_in_flight = request.is_in_flight();
                request.cancel();
                debug!(node = %node_id, was_in_flight, "Load cancelled");
                outcome.cancelled.push(Cancellation {
                    node_id,
                    was_in_flight,
                });
            }
        }

        for (node_id, wanted) in requested {
            if self.failed.contains_key(node_id) {
                outcome.filtered_failed.push(node_id.clone());
                continue;
            }
            match self.requests.get_mut(node_id) {
                Some(existing) => existing.priority = wanted.priority,
                None => {
                    self.requests.insert(
                        node_id.clone(),
                        LoadRequest::pending(node_id.clone(), wanted.url.clone(), wanted.priority),
                    );
                    outcome.created.push(node_id.clone());
                }
            }
        }

        outcome.admitted = self.admit_at(now);
        outcome
    }

    /// Admits ready pending requests into free slots at the current instant.
    pub fn admit(&mut self) -> Vec<Admission> {
        self.admit_at(Instant::now())
    }

    /// Admits ready pending requests into free slots, most urgent first.
    pub fn admit_at(&mut self, now: Instant) -> Vec<Admission> {
        let free = self
            .config
            .max_concurrent_loads
            .saturating_sub(self.in_flight_count());
        if free == 0 {
            return Vec::new();
        }

        let mut queue: AdmissionQueue = self
            .requests
            .values()
            .filter(|r| r.is_ready(now))
            .map(|r| QueuedLoad::new(r.node_id.clone(), r.priority))
            .collect();

        let mut admitted = Vec::new();
        while admitted.len() < free {
            let Some(next) = queue.pop() else { break };
            let ticket = Ticket(self.next_ticket);
            self.next_ticket += 1;
            if let Some(request) = self.requests.get_mut(&next.node_id) {
                let cancel = request.admit(ticket, now);
                debug!(node = %request.node_id, %ticket, attempt = request.attempts, priority = %request.priority, "Load admitted");
                admitted.push(Admission {
                    node_id: request.node_id.clone(),
                    url: request.url.clone(),
                    ticket,
                    cancel,
                    attempt: request.attempts,
                });
            }
        }
        admitted
    }

    /// Applies the result of an admitted load at the current instant.
    pub fn complete(
        &mut self,
        node_id: &NodeId,
        ticket: Ticket,
        result: Result<DecodedContent, LoadError>,
    ) -> Completion {
        self.complete_at(node_id, ticket, result, Instant::now())
    }

    /// Applies the result of an admitted load.
    ///
    /// Results whose ticket does not match the live request are discarded
    /// without touching any state.
    pub fn complete_at(
        &mut self,
        node_id: &NodeId,
        ticket: Ticket,
        result: Result<DecodedContent, LoadError>,
        now: Instant,
    ) -> Completion {
        let current = self.requests.get(node_id).and_then(|r| r.ticket());
        if current != Some(ticket) {
            debug!(node = %node_id, %ticket, "Discarding stale load result");
            return Completion::Discarded {
                node_id: node_id.clone(),
                ticket,
            };
        }

        let Some(mut request) = self.requests.remove(node_id) else {
            return Completion::Discarded {
                node_id: node_id.clone(),
                ticket,
            };
        };

        match result {
            Ok(content) => {
                request.state = LoadState::Done;
                debug!(node = %node_id, attempts = request.attempts, bytes = content.byte_size(), "Load done");
                Completion::Loaded {
                    node_id: node_id.clone(),
                    content,
                    attempts: request.attempts,
                }
            }
            Err(LoadError::Cancelled) => Completion::Cancelled {
                node_id: node_id.clone(),
            },
            Err(error) => {
                match self.config.retry_policy.retry_after(&error, request.attempts) {
                    Some(delay) => {
                        let attempt = request.attempts;
                        debug!(node = %node_id, attempt, ?delay, %error, "Load failed, retrying");
                        request.requeue(now + delay);
                        self.requests.insert(node_id.clone(), request);
                        Completion::Retrying {
                            node_id: node_id.clone(),
                            attempt,
                            delay,
                            error,
                        }
                    }
                    None => self.fail(request, error),
                }
            }
        }
    }

    fn fail(&mut self, mut request: LoadRequest, error: LoadError) -> Completion {
        let kind = error.kind();
        request.state = LoadState::Failed;
        warn!(node = %request.node_id, attempts = request.attempts, %error, "Load failed permanently");
        self.failed.insert(request.node_id.clone(), kind);
        Completion::Failed {
            node_id: request.node_id,
            kind,
            error,
        }
    }

    /// Fails in-flight requests that exceeded the request timeout.
    ///
    /// Their loads are cancelled and the nodes are excluded like any other
    /// permanent failure. Returns the timed-out nodes in id order.
    pub fn expire(&mut self, now: Instant) -> Vec<NodeId> {
        let Some(timeout) = self.config.request_timeout else {
            return Vec::new();
        };
        let mut expired: Vec<NodeId> = self
            .requests
            .values()
            .filter(|r| r.is_in_flight() && r.admitted_at.is_some_and(|t| now >= t + timeout))
            .map(|r| r.node_id.clone())
            .collect();
        expired.sort();

        for node_id in &expired {
            if let Some(mut request) = self.requests.remove(node_id) {
                request.cancel();
                request.state = LoadState::Failed;
                warn!(node = %node_id, ?timeout, "Load timed out");
                self.failed.insert(node_id.clone(), LoadErrorKind::Timeout);
            }
        }
        expired
    }

    /// Drops every request and failure record of a removed tileset,
    /// cancelling loads still running. Returns how many loads were cancelled.
    pub fn forget_tileset(&mut self, tileset: &TilesetId) -> usize {
        let mut cancelled = 0;
        self.requests.retain(|id, request| {
            if id.tileset() != tileset {
                return true;
            }
            if request.is_in_flight() {
                cancelled += 1;
            }
            request.cancel();
            false
        });
        self.failed.retain(|id, _| id.tileset() != tileset);
        cancelled
    }

    /// Cancels and drops every live request. Failure records are kept.
    pub fn cancel_all(&mut self) -> usize {
        let in_flight = self.in_flight_count();
        for (_, mut request) in self.requests.drain() {
            request.cancel();
        }
        in_flight
    }

    /// Earliest instant at which calling [`admit_at`](Self::admit_at) or
    /// [`expire`](Self::expire) can change anything.
    ///
    /// Backoff deadlines only count while a slot is free; with every slot
    /// taken, a pending request can only move after a completion.
    pub fn next_deadline(&self) -> Option<Instant> {
        let timeout = self.config.request_timeout;
        let slot_free = self.in_flight_count() < self.config.max_concurrent_loads;
        self.requests
            .values()
            .filter_map(|r| match r.state {
                LoadState::Pending if slot_free => r.not_before,
                LoadState::InFlight => timeout.and_then(|t| r.admitted_at.map(|a| a + t)),
                _ => None,
            })
            .min()
    }

    pub fn state(&self, node_id: &NodeId) -> Option<LoadState> {
        if self.failed.contains_key(node_id) {
            return Some(LoadState::Failed);
        }
        self.requests.get(node_id).map(|r| r.state)
    }

    pub fn request(&self, node_id: &NodeId) -> Option<&LoadRequest> {
        self.requests.get(node_id)
    }

    pub fn is_failed(&self, node_id: &NodeId) -> bool {
        self.failed.contains_key(node_id)
    }

    pub fn failure(&self, node_id: &NodeId) -> Option<LoadErrorKind> {
        self.failed.get(node_id).copied()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.requests.values().filter(|r| r.is_in_flight()).count()
    }

    pub fn pending_count(&self) -> usize {
        self.requests
            .values()
            .filter(|r| r.state == LoadState::Pending)
            .count()
    }

    /// True when no request is pending or in flight.
    pub fn is_idle(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn requests(&self) -> impl Iterator<Item = &LoadRequest> {
        self.requests.values()
    }
}

impl Default for LoadScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{DecodeError, FetchError};

    fn id(path: &str) -> NodeId {
        NodeId::new(TilesetId::new("t"), path)
    }

    fn wanted(entries: &[(&str, f64)]) -> BTreeMap<NodeId, TileRequest> {
        entries
            .iter()
            .map(|(path, distance)| {
                (
                    id(path),
                    TileRequest {
                        url: format!("mem://{}", path),
                        priority: LoadPriority::new(*distance, 1.0),
                        depth: 0,
                    },
                )
            })
            .collect()
    }

    fn scheduler(max: usize) -> LoadScheduler {
        LoadScheduler::new(SchedulerConfig {
            max_concurrent_loads: max,
            retry_policy: RetryPolicy::constant(3, Duration::from_millis(100)),
            request_timeout: Some(Duration::from_secs(5)),
        })
    }

    fn transient() -> LoadError {
        FetchError::Status {
            url: "u".to_string(),
            status: 503,
        }
        .into()
    }

    fn admitted_paths(admissions: &[Admission]) -> Vec<&str> {
        admissions.iter().map(|a| a.node_id.path()).collect()
    }

    #[test]
    fn test_admission_respects_cap_and_priority() {
        let mut s = scheduler(2);
        let now = Instant::now();
        let outcome = s.reconcile_at(&wanted(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]), now);

        assert_eq!(outcome.created.len(), 3);
        assert_eq!(admitted_paths(&outcome.admitted), vec!["a", "b"]);
        assert_eq!(s.state(&id("c")), Some(LoadState::Pending));

        let a = &outcome.admitted[0];
        let done = s.complete_at(&a.node_id, a.ticket, Ok(DecodedContent::default()), now);
        assert!(matches!(done, Completion::Loaded { attempts: 1, .. }));
        assert_eq!(s.state(&id("a")), None);

        let next = s.admit_at(now);
        assert_eq!(admitted_paths(&next), vec!["c"]);
        assert_eq!(s.in_flight_count(), 2);
    }

    #[test]
    fn test_second_identical_reconcile_is_noop() {
        let mut s = scheduler(1);
        let now = Instant::now();
        let set = wanted(&[("a", 1.0), ("b", 2.0)]);
        assert!(!s.reconcile_at(&set, now).is_noop());

        let second = s.reconcile_at(&set, now);
        assert!(second.is_noop());
        assert_eq!(s.in_flight_count(), 1);
        assert_eq!(s.pending_count(), 1);
    }

    #[test]
    fn test_cancellation_of_unwanted_requests() {
        let mut s = scheduler(1);
        let now = Instant::now();
        let first = s.reconcile_at(&wanted(&[("a", 1.0), ("b", 2.0)]), now);
        let token = first.admitted[0].cancel.clone();

        let second = s.reconcile_at(&wanted(&[]), now);
        assert_eq!(
            second.cancelled,
            vec![
                Cancellation {
                    node_id: id("a"),
                    was_in_flight: true
                },
                Cancellation {
                    node_id: id("b"),
                    was_in_flight: false
                },
            ]
        );
        assert!(token.is_cancelled());
        assert!(s.is_idle());
    }

    #[test]
    fn test_rerequested_node_keeps_its_request() {
        let mut s = scheduler(4);
        let now = Instant::now();
        let first = s.reconcile_at(&wanted(&[("a", 1.0)]), now);
        let ticket = first.admitted[0].ticket;

        // Priority changes but the node stays wanted
        let second = s.reconcile_at(&wanted(&[("a", 50.0)]), now);
        assert!(second.is_noop());
        assert_eq!(s.request(&id("a")).unwrap().ticket(), Some(ticket));
        assert_eq!(s.request(&id("a")).unwrap().priority, LoadPriority::new(50.0, 1.0));
        assert!(!first.admitted[0].cancel.is_cancelled());
    }

    #[test]
    fn test_late_result_after_cancel_is_discarded() {
        let mut s = scheduler(4);
        let now = Instant::now();
        let first = s.reconcile_at(&wanted(&[("a", 1.0)]), now);
        let old = first.admitted[0].ticket;
        s.reconcile_at(&wanted(&[]), now);
        let again = s.reconcile_at(&wanted(&[("a", 1.0)]), now);
        assert_ne!(again.admitted[0].ticket, old);

        let late = s.complete_at(&id("a"), old, Ok(DecodedContent::default()), now);
        assert!(matches!(late, Completion::Discarded { .. }));
        assert_eq!(s.state(&id("a")), Some(LoadState::InFlight));
    }

    #[test]
    fn test_parse_failure_excludes_node() {
        let mut s = scheduler(4);
        let now = Instant::now();
        let first = s.reconcile_at(&wanted(&[("x", 1.0)]), now);
        let result = Err(LoadError::Parse(DecodeError::TrailingBytes(1)));
        let done = s.complete_at(&id("x"), first.admitted[0].ticket, result, now);
        assert!(matches!(
            done,
            Completion::Failed {
                kind: LoadErrorKind::Parse,
                ..
            }
        ));

        let again = s.reconcile_at(&wanted(&[("x", 1.0)]), now);
        assert!(again.created.is_empty());
        assert_eq!(again.filtered_failed, vec![id("x")]);
        assert_eq!(s.state(&id("x")), Some(LoadState::Failed));
    }

    #[test]
    fn test_transient_failure_backs_off_then_exhausts() {
        let mut s = scheduler(4);
        let t0 = Instant::now();
        let outcome = s.reconcile_at(&wanted(&[("n", 1.0)]), t0);
        let mut ticket = outcome.admitted[0].ticket;

        for attempt in 1..3 {
            let done = s.complete_at(&id("n"), ticket, Err(transient()), t0);
            assert!(matches!(done, Completion::Retrying { attempt: a, .. } if a == attempt));
            assert!(s.admit_at(t0).is_empty(), "backoff not elapsed");
            assert_eq!(s.next_deadline(), Some(t0 + Duration::from_millis(100)));

            let retry = s.admit_at(t0 + Duration::from_millis(100));
            assert_eq!(retry[0].attempt, attempt + 1);
            ticket = retry[0].ticket;
        }

        let done = s.complete_at(&id("n"), ticket, Err(transient()), t0);
        assert!(matches!(
            done,
            Completion::Failed {
                kind: LoadErrorKind::Network,
                ..
            }
        ));
        assert!(s.is_failed(&id("n")));
    }

    #[test]
    fn test_retry_waits_double_between_attempts() {
        let mut s = LoadScheduler::new(SchedulerConfig {
            retry_policy: RetryPolicy::new(3),
            ..SchedulerConfig::default()
        });
        let t0 = Instant::now();
        let outcome = s.reconcile_at(&wanted(&[("n", 1.0)]), t0);

        s.complete_at(&id("n"), outcome.admitted[0].ticket, Err(transient()), t0);
        assert_eq!(s.next_deadline(), Some(t0 + DEFAULT_RETRY_DELAY));

        let t1 = t0 + DEFAULT_RETRY_DELAY;
        let retry = s.admit_at(t1);
        let done = s.complete_at(&id("n"), retry[0].ticket, Err(transient()), t1);
        assert!(matches!(done, Completion::Retrying { delay, .. } if delay == DEFAULT_RETRY_DELAY * 2));
        assert_eq!(s.next_deadline(), Some(t1 + DEFAULT_RETRY_DELAY * 2));
    }

    #[test]
    fn test_permanent_network_error_is_not_retried() {
        let mut s = scheduler(4);
        let now = Instant::now();
        let outcome = s.reconcile_at(&wanted(&[("n", 1.0)]), now);
        let not_found = FetchError::Status {
            url: "u".to_string(),
            status: 404,
        };
        let done = s.complete_at(&id("n"), outcome.admitted[0].ticket, Err(not_found.into()), now);
        assert!(matches!(done, Completion::Failed { .. }));
    }

    #[test]
    fn test_expire_times_out_stuck_loads() {
        let mut s = scheduler(4);
        let t0 = Instant::now();
        let outcome = s.reconcile_at(&wanted(&[("slow", 1.0)]), t0);
        let token = outcome.admitted[0].cancel.clone();

        assert!(s.expire(t0 + Duration::from_secs(4)).is_empty());
        assert_eq!(s.expire(t0 + Duration::from_secs(5)), vec![id("slow")]);
        assert!(token.is_cancelled());
        assert_eq!(s.failure(&id("slow")), Some(LoadErrorKind::Timeout));

        let late = s.complete_at(&id("slow"), outcome.admitted[0].ticket, Ok(DecodedContent::default()), t0);
        assert!(matches!(late, Completion::Discarded { .. }));
    }

    #[test]
    fn test_forget_tileset_clears_requests_and_failures() {
        let mut s = scheduler(1);
        let now = Instant::now();
        let outcome = s.reconcile_at(&wanted(&[("a", 1.0), ("b", 2.0)]), now);
        s.complete_at(
            &id("a"),
            outcome.admitted[0].ticket,
            Err(LoadError::Parse(DecodeError::TrailingBytes(1))),
            now,
        );
        s.admit_at(now);

        assert_eq!(s.forget_tileset(&TilesetId::new("t")), 1);
        assert!(s.is_idle());
        assert_eq!(s.failed_count(), 0);
    }

    #[test]
    fn test_cancel_all_signals_running_loads() {
        let mut s = scheduler(1);
        let now = Instant::now();
        let outcome = s.reconcile_at(&wanted(&[("a", 1.0), ("b", 2.0)]), now);
        let token = outcome.admitted[0].cancel.clone();

        assert_eq!(s.cancel_all(), 1);
        assert!(token.is_cancelled());
        assert!(s.is_idle());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::HashSet;

        proptest! {
            #[test]
            fn test_one_request_per_node_and_cap_holds(
                passes in prop::collection::vec(prop::collection::vec((0u8..12, 0.0f64..1000.0), 0..12), 1..8),
                max in 1usize..5,
            ) {
                let mut s = scheduler(max);
                let now = Instant::now();
                for pass in passes {
                    let set: BTreeMap<NodeId, TileRequest> = pass
                        .iter()
                        .map(|(n, d)| (id(&format!("0/{}", n)), TileRequest {
                            url: format!("u{}", n),
                            priority: LoadPriority::new(*d, 1.0),
                            depth: 1,
                        }))
                        .collect();
                    let outcome = s.reconcile_at(&set, now);

                    let created: HashSet<_> = outcome.created.iter().collect();
                    prop_assert_eq!(created.len(), outcome.created.len());
                    prop_assert!(s.in_flight_count() <= max);
                    prop_assert!(s.requests().all(|r| set.contains_key(&r.node_id)));
                    prop_assert!(s.reconcile_at(&set, now).is_noop());
                }
            }
        }
    }
}
