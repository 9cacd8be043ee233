//! Pending-request table correlating twin calls with their responses
//!
//! Twin reads and updates are fire-and-wait: the request id embedded in the
//! outbound topic comes back in the response topic. The table is keyed by
//! that id, so any number of calls of either kind may be in flight at once.
//!
//! Ids are seeded from the unix millisecond clock and then strictly
//! increment, which keeps them timestamp-like on the wire without the
//! collision risk of raw clock reads under rapid successive calls.

use crate::error::{DeviceError, DeviceResult};
use std::collections::HashMap;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;
use tracing::debug;

/// Which twin operation a pending entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    GetTwin,
    UpdateTwin,
}

/// What a resolved twin call receives: the response status from the topic
/// and the raw payload body (empty for update acknowledgements).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelatedResponse {
    pub status: u16,
    pub body: String,
}

struct PendingRequest {
    kind: RequestKind,
    created_at: Instant,
    tx: oneshot::Sender<DeviceResult<CorrelatedResponse>>,
}

/// Table of in-flight twin calls
pub struct Correlator {
    next_rid: u64,
    pending: HashMap<u64, PendingRequest>,
}

impl Correlator {
    pub fn new() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self::with_first_id(millis)
    }

    /// Construct with an explicit first id, for deterministic tests.
    pub fn with_first_id(first_id: u64) -> Self {
        Self {
            next_rid: first_id,
            pending: HashMap::new(),
        }
    }

    /// Allocate a fresh request id and register one pending entry for it.
    /// Must be called before the request is published.
    pub fn register(
        &mut self,
        kind: RequestKind,
    ) -> (u64, oneshot::Receiver<DeviceResult<CorrelatedResponse>>) {
        let rid = self.next_rid;
        self.next_rid += 1;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            rid,
            PendingRequest {
                kind,
                created_at: Instant::now(),
                tx,
            },
        );
        (rid, rx)
    }

    /// Complete at most one entry. Unknown ids leave the table untouched
    /// and return `None` so the dispatcher can log the miss.
    pub fn resolve(
        &mut self,
        request_id: u64,
        result: DeviceResult<CorrelatedResponse>,
    ) -> Option<RequestKind> {
        let entry = self.pending.remove(&request_id)?;
        debug!(
            request_id,
            kind = ?entry.kind,
            elapsed_ms = entry.created_at.elapsed().as_millis() as u64,
            "resolving pending twin request"
        );
        // The receiver may already be gone if the caller timed out.
        let _ = entry.tx.send(result);
        Some(entry.kind)
    }

    /// Drop an entry after a local timeout or publish failure.
    pub fn abort(&mut self, request_id: u64) -> bool {
        self.pending.remove(&request_id).is_some()
    }

    /// Fail every in-flight call; used when the session drops so nothing
    /// hangs forever.
    pub fn fail_all(&mut self, error: impl Fn() -> DeviceError) {
        for (rid, entry) in self.pending.drain() {
            debug!(request_id = rid, "failing pending request on disconnect");
            let _ = entry.tx.send(Err(error()));
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_response(status: u16, body: &str) -> DeviceResult<CorrelatedResponse> {
        Ok(CorrelatedResponse {
            status,
            body: body.to_string(),
        })
    }

    #[test]
    fn ids_increase_strictly() {
        let mut correlator = Correlator::with_first_id(1000);
        let (a, _rx_a) = correlator.register(RequestKind::GetTwin);
        let (b, _rx_b) = correlator.register(RequestKind::GetTwin);
        let (c, _rx_c) = correlator.register(RequestKind::UpdateTwin);
        assert_eq!((a, b, c), (1000, 1001, 1002));
    }

    #[test]
    fn matching_id_resolves_exactly_that_call() {
        let mut correlator = Correlator::with_first_id(1);
        let (rid, mut rx) = correlator.register(RequestKind::GetTwin);

        let kind = correlator.resolve(rid, ok_response(200, r#"{"desired":{},"reported":{}}"#));
        assert_eq!(kind, Some(RequestKind::GetTwin));

        let received = rx.try_recv().unwrap().unwrap();
        assert_eq!(received.status, 200);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn mismatched_id_leaves_call_pending() {
        let mut correlator = Correlator::with_first_id(1);
        let (rid, mut rx) = correlator.register(RequestKind::GetTwin);

        assert_eq!(correlator.resolve(rid + 99, ok_response(200, "{}")), None);
        assert!(rx.try_recv().is_err());
        assert_eq!(correlator.pending_count(), 1);
    }

    #[test]
    fn concurrent_calls_of_same_kind_resolve_independently() {
        let mut correlator = Correlator::with_first_id(10);
        let (first, mut rx_first) = correlator.register(RequestKind::UpdateTwin);
        let (second, mut rx_second) = correlator.register(RequestKind::UpdateTwin);

        correlator.resolve(second, ok_response(204, ""));
        assert!(rx_first.try_recv().is_err());
        assert_eq!(rx_second.try_recv().unwrap().unwrap().status, 204);

        correlator.resolve(first, ok_response(204, ""));
        assert_eq!(rx_first.try_recv().unwrap().unwrap().status, 204);
    }

    #[test]
    fn fail_all_rejects_every_pending_call() {
        let mut correlator = Correlator::with_first_id(1);
        let (_a, mut rx_a) = correlator.register(RequestKind::GetTwin);
        let (_b, mut rx_b) = correlator.register(RequestKind::UpdateTwin);

        correlator.fail_all(|| DeviceError::Disconnected("session dropped".to_string()));

        assert!(matches!(
            rx_a.try_recv().unwrap(),
            Err(DeviceError::Disconnected(_))
        ));
        assert!(matches!(
            rx_b.try_recv().unwrap(),
            Err(DeviceError::Disconnected(_))
        ));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn abort_discards_without_completing() {
        let mut correlator = Correlator::with_first_id(1);
        let (rid, mut rx) = correlator.register(RequestKind::GetTwin);

        assert!(correlator.abort(rid));
        assert!(!correlator.abort(rid));
        // Sender dropped, receiver observes closure rather than a value.
        assert!(matches!(
            rx.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }

    #[test]
    fn resolve_survives_dropped_receiver() {
        let mut correlator = Correlator::with_first_id(1);
        let (rid, rx) = correlator.register(RequestKind::GetTwin);
        drop(rx); // caller timed out locally

        // Must not panic and must still clear the entry.
        assert_eq!(
            correlator.resolve(rid, ok_response(200, "{}")),
            Some(RequestKind::GetTwin)
        );
        assert_eq!(correlator.pending_count(), 0);
    }
}
