//! Delivery of scan results to a notification service.
//!
//! Delivery failures are logged and counted, never escalated.

pub mod ntfy;

use crate::error::NotificationError;
use crate::report::{
    unit_notification_message, unit_notification_title, ScanResults, COMPLETION_MESSAGE,
    COMPLETION_TITLE,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use ntfy::NtfyClient;

/// Per-unit notifications in flight at once during [`NotificationService::notify_results`].
pub const DEFAULT_SEND_CONCURRENCY: usize = 2;

/// Acknowledgement returned by the notification server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub title: String,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, message: &str, title: &str) -> Result<PublishResponse, NotificationError>;
}

/// A notification being delivered in the background.
///
/// Await it with [`NotificationHandle::wait`] or drop the work with
/// [`NotificationHandle::abort`].
#[derive(Debug)]
pub struct NotificationHandle {
    title: String,
    inner: JoinHandle<Result<PublishResponse, NotificationError>>,
}

impl NotificationHandle {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn abort(&self) {
        self.inner.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    pub async fn wait(self) -> Result<PublishResponse, NotificationError> {
        match self.inner.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(NotificationError::Task("aborted".to_string())),
            Err(e) => Err(NotificationError::Task(e.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationSummary {
    pub sent: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct NotificationService {
    sink: Arc<dyn NotificationSink>,
    send_permits: Arc<Semaphore>,
}

impl NotificationService {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self::with_concurrency(sink, DEFAULT_SEND_CONCURRENCY)
    }

    /// `limit` bounds the sends `notify_results` keeps in flight; 0 is treated as 1.
    pub fn with_concurrency(sink: Arc<dyn NotificationSink>, limit: usize) -> Self {
        Self {
            sink,
            send_permits: Arc::new(Semaphore::new(limit.max(1))),
        }
    }

    /// Send one notification and log the result.
    pub async fn send(&self, message: &str, title: &str) -> Result<PublishResponse, NotificationError> {
        deliver(self.sink.as_ref(), message, title).await
    }

    /// Start sending in the background.
    pub fn spawn_send(&self, message: String, title: String) -> NotificationHandle {
        let sink = Arc::clone(&self.sink);
        let task_title = title.clone();
        let inner = tokio::spawn(async move { deliver(sink.as_ref(), &message, &task_title).await });
        NotificationHandle { title, inner }
    }

    /// Like [`spawn_send`](Self::spawn_send), but waits for a send permit first.
    fn spawn_bounded_send(&self, message: String, title: String) -> NotificationHandle {
        let sink = Arc::clone(&self.sink);
        let permits = Arc::clone(&self.send_permits);
        let task_title = title.clone();
        let inner = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| NotificationError::Task(e.to_string()))?;
            deliver(sink.as_ref(), &message, &task_title).await
        });
        NotificationHandle { title, inner }
    }

    /// One notification per scanned unit, then a final completion notice.
    ///
    /// Per-unit sends run in the background, at most the configured number at
    /// a time.
    pub async fn notify_results(&self, results: &ScanResults) -> NotificationSummary {
        let handles: Vec<_> = results
            .findings
            .iter()
            .map(|(unit_id, findings)| {
                self.spawn_bounded_send(
                    unit_notification_message(unit_id, findings),
                    unit_notification_title(unit_id),
                )
            })
            .collect();

        let mut summary = NotificationSummary::default();
        for handle in handles {
            match handle.wait().await {
                Ok(_) => summary.sent += 1,
                Err(_) => summary.failed += 1,
            }
        }

        match self.send(COMPLETION_MESSAGE, COMPLETION_TITLE).await {
            Ok(_) => summary.sent += 1,
            Err(_) => summary.failed += 1,
        }

        summary
    }
}

async fn deliver(
    sink: &dyn NotificationSink,
    message: &str,
    title: &str,
) -> Result<PublishResponse, NotificationError> {
    match sink.send(message, title).await {
        Ok(resp) => {
            info!("Notification '{}' sent (id {})", title, resp.id);
            Ok(resp)
        }
        Err(e) => {
            warn!("Failed to send notification '{}': {}", title, e);
            Err(e)
        }
    }
}
