use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use super::seq::RequestSeq;

pub const THROTTLE_WINDOW: Duration = Duration::from_millis(500);

/// Issued for each snapshot request that survives the throttle. The session
/// carries the ticket through the network call and hands it back to decide
/// whether the response may touch the view model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub seq: u64,
    pub force: bool,
    /// Present on forced fetches: appended as a query parameter so the
    /// request cannot be coalesced with an identical one already in flight.
    pub bust: Option<Uuid>,
}

/// Gatekeeper for snapshot fetches of one scope: throttles rapid duplicate
/// triggers (simultaneous on-open and on-mount paths) and tags every request
/// with a sequence id for stale-response detection.
#[derive(Debug)]
pub struct SnapshotFetcher {
    seq: RequestSeq,
    window: Duration,
    last_issued: Option<Instant>,
}

impl SnapshotFetcher {
    pub fn new() -> Self {
        Self::with_window(THROTTLE_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            seq: RequestSeq::new(),
            window,
            last_issued: None,
        }
    }

    /// Decide whether a fetch may go out now. Non-forced triggers inside the
    /// throttle window are a no-op; forced triggers always pass and carry a
    /// uniquifying nonce.
    pub fn begin(&mut self, force: bool) -> Option<FetchTicket> {
        let now = Instant::now();
        if !force {
            if let Some(last) = self.last_issued {
                if now.duration_since(last) < self.window {
                    return None;
                }
            }
        }
        self.last_issued = Some(now);
        Some(FetchTicket {
            seq: self.seq.next_id(),
            force,
            bust: force.then(Uuid::new_v4),
        })
    }

    /// Whether a completed fetch may apply: its id is still current, or the
    /// caller forced it and must observe that exact result.
    pub fn accept(&self, ticket: FetchTicket) -> bool {
        ticket.force || self.seq.is_current(ticket.seq)
    }
}

impl Default for SnapshotFetcher {
    fn default() -> Self {
        Self::new()
    }
}
