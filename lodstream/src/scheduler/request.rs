//! Load request bookkeeping.

use super::policy::LoadPriority;
use crate::tileset::NodeId;
use std::fmt;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a load request.
///
/// ```text
/// Pending ──admit──► InFlight ──ok──► Done
///    ▲                  │
///    └──transient err───┤
///                       ├──parse err / retries exhausted / timeout──► Failed
///                       └──no longer requested──► Cancelled
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoadState {
    Pending,
    InFlight,
    Done,
    Cancelled,
    Failed,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadState::Pending => "pending",
            LoadState::InFlight => "in-flight",
            LoadState::Done => "done",
            LoadState::Cancelled => "cancelled",
            LoadState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Identifies one admission of a request. A result carrying a ticket that no
/// longer matches its request is stale and gets discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(pub u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The single live request for one node.
#[derive(Clone, Debug)]
pub struct LoadRequest {
    pub node_id: NodeId,
    pub url: String,
    pub priority: LoadPriority,
    pub state: LoadState,
    /// Number of times this request has been admitted.
    pub attempts: u32,
    pub(crate) ticket: Option<Ticket>,
    pub(crate) cancel: Option<CancellationToken>,
    pub(crate) admitted_at: Option<Instant>,
    /// Backoff: not admitted again before this instant.
    pub(crate) not_before: Option<Instant>,
}

impl LoadRequest {
    pub(crate) fn pending(node_id: NodeId, url: String, priority: LoadPriority) -> Self {
        Self {
            node_id,
            url,
            priority,
            state: LoadState::Pending,
            attempts: 0,
            ticket: None,
            cancel: None,
            admitted_at: None,
            not_before: None,
        }
    }

    pub fn ticket(&self) -> Option<Ticket> {
        self.ticket
    }

    pub fn is_in_flight(&self) -> bool {
        self.state == LoadState::InFlight
    }

    /// Whether a pending request may be admitted at `now`.
    pub fn is_ready(&self, now: Instant) -> bool {
        self.state == LoadState::Pending && self.not_before.map_or(true, |t| t <= now)
    }

    pub(crate) fn admit(&mut self, ticket: Ticket, now: Instant) -> CancellationToken {
        let cancel = CancellationToken::new();
        self.state = LoadState::InFlight;
        self.attempts += 1;
        self.ticket = Some(ticket);
        self.cancel = Some(cancel.clone());
        self.admitted_at = Some(now);
        self.not_before = None;
        cancel
    }

    /// Puts an in-flight request back in the pending set after a transient
    /// failure.
    pub(crate) fn requeue(&mut self, not_before: Instant) {
        self.state = LoadState::Pending;
        self.ticket = None;
        self.cancel = None;
        self.admitted_at = None;
        self.not_before = Some(not_before);
    }

    /// Signals cancellation to the running load, if any.
    pub(crate) fn cancel(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.state = LoadState::Cancelled;
    }
}
