//! Batch entry point for the queue transport.
//!
//! A batch is fanned out onto tokio tasks, bounded by a semaphore, and the
//! per-message results come back in input order. Messages are independent:
//! one failure never stops the others, and the transport only has to
//! redeliver the ids listed in [`BatchReport::failed_message_ids`].
//!
//! [`parse_batch`] and [`failure_response`] are the wire side of the host:
//! newline-delimited queue records in, partial batch response out.

use std::sync::Arc;

use inbound_core::InboundEvent;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Semaphore;
use tracing::{error, info_span, warn, Instrument};

use crate::dispatcher::{Dispatcher, MessageOutcome, ProcessError};

/// One message as delivered by the queue transport.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueueMessage {
    pub message_id: String,
    pub body: String,
}

/// Parses newline-delimited queue records (`{"message_id": .., "body": ..}`).
///
/// Blank lines are skipped. A line that is not a valid record is logged and
/// dropped: it carries no usable message id, so it cannot be listed for
/// redelivery and is never retried.
#[must_use]
pub fn parse_batch(input: &str) -> Vec<QueueMessage> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(idx, line)| match serde_json::from_str::<QueueMessage>(line) {
            Ok(message) => Some(message),
            Err(err) => {
                warn!(line = idx + 1, error = %err, "skipping malformed queue record");
                None
            }
        })
        .collect()
}

/// Partial batch response for the transport:
/// `{"batchItemFailures": [{"itemIdentifier": "<message_id>"}, ..]}`.
#[must_use]
pub fn failure_response(report: &BatchReport) -> serde_json::Value {
    let failures: Vec<_> = report
        .failed_message_ids()
        .into_iter()
        .map(|id| json!({ "itemIdentifier": id }))
        .collect();
    json!({ "batchItemFailures": failures })
}

/// Per-message results of one batch, in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<(String, Result<MessageOutcome, ProcessError>)>,
}

impl BatchReport {
    /// Ids the transport must redeliver.
    #[must_use]
    pub fn failed_message_ids(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(id, _)| id.as_str())
            .collect()
    }

    #[must_use]
    pub fn persisted_count(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::Persisted { .. }))
    }

    #[must_use]
    pub fn dropped_count(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::Dropped(_)))
    }

    fn count(&self, pred: impl Fn(&MessageOutcome) -> bool) -> usize {
        self.results
            .iter()
            .filter(|(_, r)| r.as_ref().is_ok_and(&pred))
            .count()
    }
}

/// Runs batches of queue messages through a shared [`Dispatcher`].
pub struct BatchProcessor {
    dispatcher: Arc<Dispatcher>,
    limit: Arc<Semaphore>,
}

impl BatchProcessor {
    /// `max_concurrent` is clamped to at least one.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, max_concurrent: usize) -> Self {
        Self {
            dispatcher,
            limit: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Processes one message to completion.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError`] when the message must be redelivered.
    pub async fn process(&self, message: &QueueMessage) -> Result<MessageOutcome, ProcessError> {
        process_one(&self.dispatcher, message).await
    }

    /// Processes every message of a batch concurrently.
    pub async fn process_batch(&self, messages: Vec<QueueMessage>) -> BatchReport {
        let mut handles = Vec::with_capacity(messages.len());
        for message in messages {
            let dispatcher = Arc::clone(&self.dispatcher);
            let limit = Arc::clone(&self.limit);
            let id = message.message_id.clone();
            let handle = tokio::spawn(async move {
                // The semaphore is never closed, so acquire cannot fail.
                let _permit = limit.acquire_owned().await.ok();
                process_one(&dispatcher, &message).await
            });
            handles.push((id, handle));
        }

        let mut report = BatchReport::default();
        for (id, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_err) => Err(ProcessError::Aborted(join_err.to_string())),
            };
            report.results.push((id, result));
        }
        report
    }
}

async fn process_one(
    dispatcher: &Dispatcher,
    message: &QueueMessage,
) -> Result<MessageOutcome, ProcessError> {
    let span = info_span!("inbound_message", message_id = %message.message_id);
    async {
        let event = InboundEvent::parse(message.body.as_str());
        let result = dispatcher.handle(&event).await;
        if let Err(err) = &result {
            error!(error = %err, cause = ?std::error::Error::source(err), "message failed, requesting redelivery");
        }
        result
    }
    .instrument(span)
    .await
}
