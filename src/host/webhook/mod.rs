use super::{NotificationBoard, ReplyPayload, ReplySender};
use crate::message::ReplyCapability;
use crate::utils::http::{MAX_ERROR_BODY_BYTES, http_client, limited_text};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One-shot send that POSTs the result bundle to the capability's target URL.
///
/// The capability must still be live on the board; a successful send consumes it.
pub struct WebhookReplySender {
    client: Client,
    board: Arc<NotificationBoard>,
}

impl WebhookReplySender {
    pub fn new(board: Arc<NotificationBoard>, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            board,
        }
    }
}

#[async_trait]
impl ReplySender for WebhookReplySender {
    async fn send(&self, capability: &ReplyCapability, payload: &ReplyPayload) -> Result<()> {
        if !self.board.is_live(capability) {
            bail!("reply capability '{}' is no longer live", capability.key);
        }

        let resp = self
            .client
            .post(&capability.target)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("reply send to {} failed", capability.target))?;

        let status = resp.status();
        if !status.is_success() {
            let body = limited_text(resp, MAX_ERROR_BODY_BYTES)
                .await
                .unwrap_or_default();
            bail!("reply target returned {}: {}", status, body);
        }

        self.board.consume(capability);
        debug!("reply delivered via capability {}", capability.key);
        Ok(())
    }
}
