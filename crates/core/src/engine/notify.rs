//! Best-effort notification fan-out.
//!
//! Dispatch happens after a transition has been committed. Every notifier is
//! bounded by a timeout and its failure is recorded in the receipt, never
//! returned as an error.

use crate::domain::SwapRequest;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SwapEventKind {
    Created,
    Executed,
    RolledBack,
    Rejected,
    MatchFound,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwapEvent {
    pub kind: SwapEventKind,
    pub request: SwapRequest,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NotifyError {
    #[error("channel is full")]
    Full,

    #[error("channel is closed")]
    Closed,

    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name reported in receipts
    fn channel(&self) -> &str;

    async fn notify(&self, event: &SwapEvent) -> Result<(), NotifyError>;
}

/// Per-dispatch delivery summary
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NotificationReceipt {
    pub success: bool,
    pub channels_sent: Vec<String>,
    pub failed_channels: Vec<String>,
}

/// Writes events to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn channel(&self) -> &str {
        "log"
    }

    async fn notify(&self, event: &SwapEvent) -> Result<(), NotifyError> {
        info!(
            "Swap {:?}: request {} ({} -> {:?})",
            event.kind, event.request.id, event.request.source_person, event.request.target_person
        );
        Ok(())
    }
}

/// Hands events to a bounded queue for out-of-band delivery.
///
/// Never waits for queue space: a full queue is reported as a failed channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    name: String,
    tx: mpsc::Sender<SwapEvent>,
}

impl ChannelNotifier {
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<SwapEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { name: name.into(), tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    fn channel(&self) -> &str {
        &self.name
    }

    async fn notify(&self, event: &SwapEvent) -> Result<(), NotifyError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NotifyError::Full,
            mpsc::error::TrySendError::Closed(_) => NotifyError::Closed,
        })
    }
}

/// Fans events out to every registered notifier
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifiers: Vec<Arc<dyn Notifier>>,
    timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>, timeout: Duration) -> Self {
        Self { notifiers, timeout }
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    pub async fn dispatch(&self, event: SwapEvent) -> NotificationReceipt {
        let mut receipt = NotificationReceipt::default();

        for notifier in &self.notifiers {
            let channel = notifier.channel().to_string();
            match tokio::time::timeout(self.timeout, notifier.notify(&event)).await {
                Ok(Ok(())) => receipt.channels_sent.push(channel),
                Ok(Err(e)) => {
                    warn!("Notification via {} failed for {}: {}", channel, event.request.id, e);
                    receipt.failed_channels.push(channel);
                }
                Err(_) => {
                    warn!(
                        "Notification via {} timed out after {:?} for {}",
                        channel, self.timeout, event.request.id
                    );
                    receipt.failed_channels.push(channel);
                }
            }
        }

        receipt.success = receipt.failed_channels.is_empty();
        receipt
    }

    async fn send(&self, kind: SwapEventKind, request: &SwapRequest, detail: Option<String>) -> NotificationReceipt {
        self.dispatch(SwapEvent {
            kind,
            request: request.clone(),
            detail,
            at: Utc::now(),
        })
        .await
    }

    pub async fn notify_created(&self, request: &SwapRequest) -> NotificationReceipt {
        self.send(SwapEventKind::Created, request, None).await
    }

    pub async fn notify_executed(&self, request: &SwapRequest) -> NotificationReceipt {
        self.send(SwapEventKind::Executed, request, None).await
    }

    pub async fn notify_rolled_back(&self, request: &SwapRequest) -> NotificationReceipt {
        self.send(SwapEventKind::RolledBack, request, request.resolution_note.clone())
            .await
    }

    pub async fn notify_rejected(&self, request: &SwapRequest) -> NotificationReceipt {
        self.send(SwapEventKind::Rejected, request, request.resolution_note.clone())
            .await
    }

    pub async fn notify_match_found(&self, request: &SwapRequest, detail: String) -> NotificationReceipt {
        self.send(SwapEventKind::MatchFound, request, Some(detail)).await
    }
}
