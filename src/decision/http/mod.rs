use super::{
    DecisionService, ProcessRequest, ProcessResponse, ScheduledMessage, ScheduledPull,
    ServiceErrorBody,
};
use crate::config::ServiceConfig;
use crate::errors::BridgeError;
use crate::utils::http::{MAX_ERROR_BODY_BYTES, http_client, limited_text};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Envelope fields shared by both endpoints' error bodies.
#[derive(serde::Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<super::ServiceErrorBody>,
}

pub struct HttpDecisionService {
    client: Client,
    base_url: String,
    process_path: String,
    scheduled_path: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl HttpDecisionService {
    pub fn new(config: &ServiceConfig) -> Self {
        let timeout_secs = config.timeout_secs.max(1);
        Self {
            // Backstop only; the tokio deadline in `with_deadline` fires first.
            client: http_client(Duration::from_secs(timeout_secs + 5)),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            process_path: config.process_path.clone(),
            scheduled_path: config.scheduled_path.clone(),
            api_key: config.api_key.clone(),
            timeout_secs,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn with_deadline<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, BridgeError>>,
    ) -> Result<T, BridgeError> {
        tokio::time::timeout(Duration::from_secs(self.timeout_secs), fut)
            .await
            .map_err(|_| BridgeError::Timeout {
                operation,
                secs: self.timeout_secs,
            })?
    }

    async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, BridgeError> {
        let status = resp.status();
        let body = limited_text(resp, MAX_ERROR_BODY_BYTES)
            .await
            .context("failed to read decision service response")?;

        if !status.is_success() {
            if let Ok(ErrorEnvelope { error: Some(e) }) = serde_json::from_str::<ErrorEnvelope>(&body) {
                return Err(e.into());
            }
            return Err(BridgeError::Service {
                code: format!("HTTP_{}", status.as_u16()),
                message: body,
                retry_after: None,
            });
        }

        Ok(serde_json::from_str(&body)
            .with_context(|| format!("malformed decision service response: {}", body))?)
    }

    async fn send_process(&self, request: &ProcessRequest) -> Result<ProcessResponse, BridgeError> {
        let resp = self
            .authorize(self.client.post(self.url(&self.process_path)))
            .json(request)
            .send()
            .await
            .context("decision service request failed")?;
        let response: ProcessResponse = Self::read_json(resp).await?;
        if !response.success {
            return Err(failure(response.error, "decision request reported failure"));
        }
        Ok(response)
    }

    async fn send_pull(&self, time_hint: Option<&str>) -> Result<Vec<ScheduledMessage>, BridgeError> {
        let mut builder = self.client.get(self.url(&self.scheduled_path));
        if let Some(time) = time_hint {
            builder = builder.query(&[("time", time)]);
        }
        let resp = self
            .authorize(builder)
            .send()
            .await
            .context("scheduled pull request failed")?;
        let pull: ScheduledPull = Self::read_json(resp).await?;
        if !pull.success {
            return Err(failure(pull.error, "scheduled pull reported failure"));
        }
        Ok(pull.messages.unwrap_or_default())
    }
}

/// Error for a `success: false` envelope, whether or not it carried an error body.
fn failure(error: Option<ServiceErrorBody>, fallback: &str) -> BridgeError {
    error.map(Into::into).unwrap_or_else(|| BridgeError::Service {
        code: "UNKNOWN".into(),
        message: fallback.to_string(),
        retry_after: None,
    })
}

#[async_trait]
impl DecisionService for HttpDecisionService {
    async fn process(&self, request: &ProcessRequest) -> Result<ProcessResponse, BridgeError> {
        debug!("decision request {}", request.id);
        self.with_deadline("decision request", self.send_process(request))
            .await
    }

    async fn pull_scheduled(
        &self,
        time_hint: Option<&str>,
    ) -> Result<Vec<ScheduledMessage>, BridgeError> {
        self.with_deadline("scheduled pull", self.send_pull(time_hint))
            .await
    }
}
