//! A pair of cancellable one-shot timers producing a heartbeat-due event and
//! a heartbeat-timeout event, both tagged with the epoch they were armed in.

use std::time::Duration;

use tokio::task::JoinHandle;

/// Monotonically increasing epoch counter. Timer events carry the id of the
/// epoch in which they were armed; the manager compares against its current
/// id to reject stale events (P2 in the testable-properties list: timer
/// events older than the current id never cause a state change).
pub type HeartbeatId = u64;

/// What a fired timer reports back to the manager's event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    Due(HeartbeatId),
    Timeout(HeartbeatId),
}

/// Two independent one-shot timers bundled so cancelling the bundle cancels
/// both idempotently. Each timer is a detached `tokio::task` that sleeps and
/// then sends its event through `sink`; dropping (aborting) the task is the
/// cancellation.
pub struct HeartbeatTimer {
    due: JoinHandle<()>,
    timeout: JoinHandle<()>,
}

impl HeartbeatTimer {
    /// Arm both timers for epoch `id`: one firing `Due` after `interval`,
    /// one firing `Timeout` after `interval + timeout`.
    pub fn arm(
        id: HeartbeatId,
        interval: Duration,
        timeout: Duration,
        sink: tokio::sync::mpsc::UnboundedSender<HeartbeatEvent>,
    ) -> Self {
        let due_sink = sink.clone();
        let due = tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let _ = due_sink.send(HeartbeatEvent::Due(id));
        });

        let timeout_sink = sink;
        let timeout = tokio::spawn(async move {
            tokio::time::sleep(interval + timeout).await;
            let _ = timeout_sink.send(HeartbeatEvent::Timeout(id));
        });

        Self { due, timeout }
    }

    /// Cancel both timers. Safe to call on an already-fired bundle.
    pub fn cancel(self) {
        self.due.abort();
        self.timeout.abort();
    }
}

/// Whether an incoming heartbeat event is still meaningful, given the
/// manager's current epoch. Kept as a free function so it is unit-testable
/// without constructing a live timer.
pub fn is_current(event: HeartbeatEvent, current: HeartbeatId) -> bool {
    match event {
        HeartbeatEvent::Due(id) | HeartbeatEvent::Timeout(id) => id == current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stale_events_are_rejected() {
        assert!(!is_current(HeartbeatEvent::Timeout(3), 4));
        assert!(is_current(HeartbeatEvent::Timeout(4), 4));
    }

    #[tokio::test(start_paused = true)]
    async fn due_fires_before_timeout() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _timer = HeartbeatTimer::arm(1, Duration::from_millis(50), Duration::from_millis(50), tx);

        tokio::time::advance(Duration::from_millis(60)).await;
        assert_eq!(rx.recv().await, Some(HeartbeatEvent::Due(1)));

        tokio::time::advance(Duration::from_millis(60)).await;
        assert_eq!(rx.recv().await, Some(HeartbeatEvent::Timeout(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_suppresses_both_events() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let timer = HeartbeatTimer::arm(1, Duration::from_millis(10), Duration::from_millis(10), tx);
        timer.cancel();

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }
}
