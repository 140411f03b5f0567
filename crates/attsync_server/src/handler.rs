//! HTTP handlers for the device push dialect.

use crate::attlog::parse_attlog;
use crate::directives::option_reply;
use crate::journal::Journal;
use crate::queue::PendingQueue;
use attsync_core::{PushOptions, RawEvent, RecordNormalizer};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use chrono::Local;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared state of every handler.
#[derive(Clone)]
pub struct ReceiverState {
    /// Events awaiting flush.
    pub queue: Arc<PendingQueue>,
    /// Normalizer; its serial stands in for a missing `SN`.
    pub normalizer: Arc<RecordNormalizer>,
    /// Option reply values.
    pub options: Arc<PushOptions>,
    /// Optional local journal.
    pub journal: Option<Arc<Journal>>,
}

impl ReceiverState {
    fn serial(&self, params: &HashMap<String, String>) -> String {
        params
            .get("SN")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or(self.normalizer.serial())
            .to_string()
    }

    /// Parses, journals and queues an `ATTLOG` body. Returns how many
    /// records were accepted.
    pub fn accept_attlog(&self, serial: &str, body: &str) -> usize {
        let (lines, skipped) = parse_attlog(body, serial);
        if lines.is_empty() {
            if skipped > 0 {
                tracing::warn!(serial, skipped, "no usable attendance lines");
            }
            return 0;
        }

        if let Some(journal) = &self.journal {
            if let Err(e) = journal.append(Local::now().naive_local(), &lines) {
                tracing::error!(serial, error = %e, "journal append failed");
            }
        }

        let events: Vec<_> = lines
            .into_iter()
            .map(RawEvent::Push)
            .filter_map(|raw| match self.normalizer.normalize(&raw) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!(serial, error = %e, "dropping push record");
                    None
                }
            })
            .collect();

        for event in &events {
            tracing::debug!(serial, user = %event.subject_id, time = %event.event_time, "attendance received");
        }

        let accepted = events.len();
        self.queue.push_many(events);
        tracing::info!(serial, accepted, skipped, pending = self.queue.len(), "attendance batch queued");
        accepted
    }
}

fn text(body: impl Into<String>) -> Response {
    ([(header::CONTENT_TYPE, "text/plain")], body.into()).into_response()
}

/// `GET /iclock/cdata`: option handshake.
pub async fn cdata_get(
    State(state): State<ReceiverState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let serial = state.serial(&params);
    tracing::info!(serial = %serial, "device handshake");
    text(option_reply(&serial, &state.options))
}

/// `POST /iclock/cdata`: data upload.
pub async fn cdata_post(
    State(state): State<ReceiverState>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let serial = state.serial(&params);
    let table = params
        .get("table")
        .map(|t| t.trim().to_ascii_uppercase())
        .unwrap_or_else(|| "ATTLOG".to_string());
    let body = String::from_utf8_lossy(&body);

    let count = match table.as_str() {
        "ATTLOG" => state.accept_attlog(&serial, &body),
        "OPERLOG" => {
            tracing::info!(serial = %serial, bytes = body.len(), "operation log received");
            0
        }
        other => {
            tracing::warn!(serial = %serial, table = other, "unknown table");
            0
        }
    };

    text(format!("OK:{count}"))
}

/// `/iclock/getrequest`: no pending commands.
pub async fn get_request(
    State(state): State<ReceiverState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    tracing::debug!(serial = %state.serial(&params), "command poll");
    text("OK")
}

/// `POST /iclock/devicecmd`: command results.
pub async fn device_cmd(
    State(state): State<ReceiverState>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let body = String::from_utf8_lossy(&body);
    let shown: String = body.chars().take(200).collect();
    tracing::info!(serial = %state.serial(&params), result = %shown, "command result");
    text("OK")
}

/// Any other path.
pub async fn fallback() -> Response {
    text("OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn state(journal: Option<Arc<Journal>>) -> ReceiverState {
        ReceiverState {
            queue: Arc::new(PendingQueue::new()),
            normalizer: Arc::new(RecordNormalizer::new("UNKNOWN")),
            options: Arc::new(PushOptions::default()),
            journal,
        }
    }

    #[test]
    fn missing_serial_uses_default() {
        let state = state(None);
        let mut params = HashMap::new();
        assert_eq!(state.serial(&params), "UNKNOWN");
        params.insert("SN".to_string(), " CQZ7 ".to_string());
        assert_eq!(state.serial(&params), "CQZ7");
    }

    #[test]
    fn attlog_is_queued_and_journaled() {
        let temp = tempdir().unwrap();
        let journal = Arc::new(Journal::open(temp.path().join("j.log")).unwrap());
        let state = state(Some(journal.clone()));

        let accepted = state.accept_attlog(
            "CQZ7",
            "100\t2026-01-10 08:00:00\t0\t1\nbroken\n101\t2026-01-10 08:00:05\t1\t15\n",
        );
        assert_eq!(accepted, 2);
        assert_eq!(state.queue.len(), 2);

        let events = state.queue.take_all();
        assert_eq!(events[0].device_serial, "CQZ7");
        assert_eq!(events[1].verify_method, "15");

        let journaled = std::fs::read_to_string(journal.path()).unwrap();
        assert_eq!(journaled.lines().count(), 2);
    }
}
