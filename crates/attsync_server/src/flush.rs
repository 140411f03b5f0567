//! Moving queued push events into the sink.

use crate::queue::PendingQueue;
use attsync_core::AttendanceEvent;
use attsync_engine::{BatchSink, SinkError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Outcome of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Events taken from the queue.
    pub taken: usize,
    /// Rows the sink reported as new.
    pub written: usize,
    /// Events put back after a failed batch.
    pub requeued: usize,
}

/// Writes `events` in batches, stopping at the first failure. Returns how
/// many events were committed, how many rows were new, and the error.
fn write_batches(
    sink: &dyn BatchSink,
    events: &[AttendanceEvent],
    batch_size: usize,
) -> (usize, usize, Option<SinkError>) {
    let mut committed = 0;
    let mut written = 0;
    for batch in events.chunks(batch_size.max(1)) {
        match sink.write(batch) {
            Ok(n) => {
                committed += batch.len();
                written += n;
            }
            Err(e) => return (committed, written, Some(e)),
        }
    }
    (committed, written, None)
}

/// Swaps the queue out and writes it on a blocking thread.
///
/// Events from the first failed batch onward go back to the front of the
/// queue in their original order.
pub async fn flush_queue(
    queue: &PendingQueue,
    sink: &Arc<dyn BatchSink>,
    batch_size: usize,
) -> FlushReport {
    let events = queue.take_all();
    if events.is_empty() {
        return FlushReport::default();
    }

    let taken = events.len();
    let events = Arc::new(events);
    let task = {
        let sink = Arc::clone(sink);
        let events = Arc::clone(&events);
        tokio::task::spawn_blocking(move || write_batches(sink.as_ref(), &events, batch_size))
    };

    let (committed, written, error) = match task.await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, "flush task failed");
            (0, 0, None)
        }
    };

    let leftover: Vec<AttendanceEvent> = events[committed..].to_vec();
    let requeued = leftover.len();
    if !leftover.is_empty() {
        queue.requeue_front(leftover);
        match &error {
            Some(e) => tracing::warn!(requeued, error = %e, "flush failed, events requeued"),
            None => tracing::warn!(requeued, "flush interrupted, events requeued"),
        }
    }

    if committed > 0 {
        tracing::info!(committed, written, "flushed push events");
    }

    FlushReport {
        taken,
        written,
        requeued,
    }
}

/// Flushes every `period` until `stop` flips. The first flush happens one
/// period after start.
pub(crate) async fn run_flush_loop(
    queue: Arc<PendingQueue>,
    sink: Arc<dyn BatchSink>,
    batch_size: usize,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                flush_queue(&queue, &sink, batch_size).await;
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }
    tracing::debug!("flush loop stopped");
}
