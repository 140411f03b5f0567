//! The push receiver.

use crate::error::{ServerError, ServerResult};
use crate::flush::{flush_queue, run_flush_loop, FlushReport};
use crate::handler::{self, ReceiverState};
use crate::journal::Journal;
use crate::queue::PendingQueue;
use attsync_core::{PushSettings, RecordNormalizer};
use attsync_engine::BatchSink;
use axum::routing::{any, get};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

/// HTTP receiver for devices that push their attendance logs.
///
/// Accepted records are queued in memory and written to the sink by a
/// background flush every `flush_interval_secs`, plus once more at
/// shutdown. A failed flush puts the events back at the head of the queue.
///
/// # Example
///
/// ```no_run
/// use attsync_core::PushSettings;
/// use attsync_engine::MemorySink;
/// use attsync_server::PushReceiver;
/// use std::sync::Arc;
///
/// # async fn demo() -> attsync_server::ServerResult<()> {
/// let receiver = PushReceiver::new(PushSettings::default(), Arc::new(MemorySink::new()))?;
/// receiver.run(async { let _ = tokio::signal::ctrl_c().await; }).await
/// # }
/// ```
#[derive(Clone)]
pub struct PushReceiver {
    settings: PushSettings,
    state: ReceiverState,
    sink: Arc<dyn BatchSink>,
    batch_size: usize,
}

impl PushReceiver {
    /// Creates a receiver; opens the journal when one is configured.
    pub fn new(settings: PushSettings, sink: Arc<dyn BatchSink>) -> ServerResult<Self> {
        let journal = match &settings.journal {
            Some(path) => Some(Arc::new(Journal::open(path)?)),
            None => None,
        };
        let state = ReceiverState {
            queue: Arc::new(PendingQueue::new()),
            normalizer: Arc::new(RecordNormalizer::new(settings.default_serial.clone())),
            options: Arc::new(settings.options.clone()),
            journal,
        };
        Ok(Self {
            settings,
            state,
            sink,
            batch_size: 100,
        })
    }

    /// Sets the number of events per sink write.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// The pending queue.
    pub fn queue(&self) -> Arc<PendingQueue> {
        Arc::clone(&self.state.queue)
    }

    /// Receiver settings.
    pub fn settings(&self) -> &PushSettings {
        &self.settings
    }

    /// Builds the HTTP routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route(
                "/iclock/cdata",
                get(handler::cdata_get).post(handler::cdata_post),
            )
            .route(
                "/iclock/cdata/",
                get(handler::cdata_get).post(handler::cdata_post),
            )
            .route("/iclock/getrequest", any(handler::get_request))
            .route("/iclock/getrequest/", any(handler::get_request))
            .route("/iclock/devicecmd", any(handler::device_cmd))
            .route("/iclock/devicecmd/", any(handler::device_cmd))
            .fallback(handler::fallback)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Flushes the queue now.
    pub async fn flush(&self) -> FlushReport {
        flush_queue(&self.state.queue, &self.sink, self.batch_size).await
    }

    /// Binds the configured address.
    pub async fn bind(&self) -> ServerResult<TcpListener> {
        let addr = self.settings.bind;
        TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })
    }

    /// Serves on `listener` until `shutdown` resolves, then stops the
    /// background flush and flushes whatever is still queued.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        let period = Duration::from_secs(self.settings.flush_interval_secs.max(1));
        tracing::info!(%addr, flush_secs = period.as_secs(), "push receiver listening");

        let (stop_tx, stop_rx) = watch::channel(false);
        let flusher = tokio::spawn(run_flush_loop(
            self.queue(),
            Arc::clone(&self.sink),
            self.batch_size,
            period,
            stop_rx,
        ));

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await;

        let _ = stop_tx.send(true);
        if let Err(e) = flusher.await {
            tracing::warn!(error = %e, "flush loop ended abnormally");
        }

        let report = self.flush().await;
        tracing::info!(
            written = report.written,
            requeued = report.requeued,
            "push receiver stopped"
        );
        if report.requeued > 0 {
            tracing::error!(lost = report.requeued, "events still queued at exit");
        }

        served.map_err(ServerError::Io)
    }

    /// Binds and serves until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }
}

impl std::fmt::Debug for PushReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushReceiver")
            .field("bind", &self.settings.bind)
            .field("pending", &self.state.queue.len())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attsync_engine::MemorySink;
    use tempfile::tempdir;

    #[test]
    fn journal_opens_at_construction() {
        let temp = tempdir().unwrap();
        let settings = PushSettings {
            journal: Some(temp.path().join("logs/device.log")),
            ..PushSettings::default()
        };
        let receiver = PushReceiver::new(settings, Arc::new(MemorySink::new())).unwrap();
        assert!(temp.path().join("logs/device.log").exists());
        assert!(receiver.queue().is_empty());
    }

    #[test]
    fn journal_failure_is_startup_error() {
        let temp = tempdir().unwrap();
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let settings = PushSettings {
            journal: Some(blocker.join("nested/device.log")),
            ..PushSettings::default()
        };
        let err = PushReceiver::new(settings, Arc::new(MemorySink::new())).unwrap_err();
        assert!(err.is_startup_error());
    }

    #[tokio::test]
    async fn taken_port_is_bind_error() {
        let held = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let settings = PushSettings {
            bind: held.local_addr().unwrap(),
            ..PushSettings::default()
        };
        let receiver = PushReceiver::new(settings, Arc::new(MemorySink::new())).unwrap();
        let err = receiver.bind().await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
    }
}
