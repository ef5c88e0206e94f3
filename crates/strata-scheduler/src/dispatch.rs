//! Notification dispatch: sinks that actually deliver due-date notifications.
//! Supports: HTTP webhook, fan-out from a primary sink to secondary ones.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use strata_core::config::{StrataConfig, WebhookConfig};
use strata_core::traits::NotificationSink;
use strata_core::{DueNotification, Result, StrataError};
use tokio::sync::Mutex;

/// Generic HTTP webhook: POST with JSON body.
pub struct WebhookSink {
    url: String,
    headers: Vec<(String, String)>,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: &str, headers: Vec<(String, String)>) -> Self {
        Self {
            url: url.to_string(),
            headers,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &WebhookConfig) -> Self {
        Self::new(&config.url, config.headers.clone())
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, notification: &DueNotification) -> Result<()> {
        let mut req = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({
                "recipients": notification.recipients,
                "category": notification.category,
                "title": notification.title,
                "message": notification.message,
                "related_entity_id": notification.related_entity_id,
                "related_entity_type": notification.related_entity_type,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }))
            .timeout(std::time::Duration::from_secs(10));

        for (key, value) in &self.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| StrataError::Notify(format!("Webhook send failed: {e}")))?;

        if resp.status().is_success() {
            tracing::info!("✅ Webhook notification sent to {}: {}", self.url, notification.title);
            Ok(())
        } else {
            let status = resp.status();
            Err(StrataError::Notify(format!("Webhook error {status}")))
        }
    }
}

/// Max deferred hand-offs kept for retry; the oldest are dropped first.
const MAX_PENDING: usize = 100;

/// An accepted notification that one secondary sink has not taken yet.
struct PendingHandoff {
    sink: usize,
    notification: DueNotification,
}

/// Delivers to a primary sink, then copies to secondary sinks.
///
/// The primary is the commit point: if it fails the delivery fails and no
/// secondary is tried. A secondary failure does not fail the delivery; the
/// hand-off is queued and retried by [`NotificationSink::retry_pending`], so
/// the primary never receives the same notification twice.
pub struct FanoutSink {
    primary: Arc<dyn NotificationSink>,
    secondary: Vec<Arc<dyn NotificationSink>>,
    pending: Mutex<VecDeque<PendingHandoff>>,
}

impl FanoutSink {
    pub fn new(primary: Arc<dyn NotificationSink>, secondary: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self {
            primary,
            secondary,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Hand-offs waiting for a secondary sink.
    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    async fn defer(&self, handoff: PendingHandoff) {
        let mut pending = self.pending.lock().await;
        pending.push_back(handoff);
        if pending.len() > MAX_PENDING
            && let Some(dropped) = pending.pop_front()
        {
            tracing::warn!(
                "⚠️ Retry queue full, dropping hand-off for {}",
                dropped.notification.related_entity_id
            );
        }
    }
}

#[async_trait]
impl NotificationSink for FanoutSink {
    fn name(&self) -> &str {
        "fanout"
    }

    async fn deliver(&self, notification: &DueNotification) -> Result<()> {
        self.primary.deliver(notification).await?;

        for (idx, sink) in self.secondary.iter().enumerate() {
            if let Err(e) = sink.deliver(notification).await {
                tracing::warn!(
                    "⚠️ Sink '{}' failed for {}, queued for retry: {e}",
                    sink.name(),
                    notification.related_entity_id
                );
                self.defer(PendingHandoff {
                    sink: idx,
                    notification: notification.clone(),
                })
                .await;
            }
        }
        Ok(())
    }

    async fn retry_pending(&self) -> usize {
        let queued = std::mem::take(&mut *self.pending.lock().await);
        let mut still_pending = VecDeque::new();
        for handoff in queued {
            let Some(sink) = self.secondary.get(handoff.sink) else {
                continue;
            };
            match sink.deliver(&handoff.notification).await {
                Ok(()) => tracing::info!(
                    "📨 Deferred notification for {} delivered via '{}'",
                    handoff.notification.related_entity_id,
                    sink.name()
                ),
                Err(e) => {
                    tracing::debug!("Sink '{}' still failing: {e}", sink.name());
                    still_pending.push_back(handoff);
                }
            }
        }

        let primary_pending = self.primary.retry_pending().await;
        let mut pending = self.pending.lock().await;
        // Keep older hand-offs ahead of any deferred while retrying.
        while let Some(handoff) = still_pending.pop_back() {
            pending.push_front(handoff);
        }
        while pending.len() > MAX_PENDING {
            pending.pop_front();
        }
        pending.len() + primary_pending
    }
}

/// Build the delivery chain from config: the primary sink (usually the database),
/// plus a webhook when one is configured.
pub fn sink_from_config(config: &StrataConfig, primary: Arc<dyn NotificationSink>) -> Arc<dyn NotificationSink> {
    match &config.webhook {
        Some(wh) if !wh.url.is_empty() => {
            tracing::info!("🌐 Webhook notifications enabled: {}", wh.url);
            let webhook: Arc<dyn NotificationSink> = Arc::new(WebhookSink::from_config(wh));
            Arc::new(FanoutSink::new(primary, vec![webhook]))
        }
        _ => primary,
    }
}
