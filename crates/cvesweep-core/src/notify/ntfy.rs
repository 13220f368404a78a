use super::{NotificationSink, PublishResponse};
use crate::config::NtfyConfig;
use crate::error::NotificationError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Url;
use serde::Serialize;
use std::time::Duration;

/// Publishes messages to an ntfy server.
pub struct NtfyClient {
    client: reqwest::Client,
    server: Url,
    topic: String,
    username: String,
    password: String,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    topic: &'a str,
    message: &'a str,
    title: &'a str,
}

impl NtfyClient {
    pub fn new(config: &NtfyConfig) -> Result<Self, NotificationError> {
        let server = Url::parse(&config.server_url).map_err(|e| NotificationError::InvalidUrl {
            url: config.server_url.clone(),
            message: e.to_string(),
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("cvesweep/", env!("CARGO_PKG_VERSION"))),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            server,
            topic: config.topic.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl NotificationSink for NtfyClient {
    async fn send(&self, message: &str, title: &str) -> Result<PublishResponse, NotificationError> {
        if self.topic.is_empty() {
            return Err(NotificationError::MissingTopic);
        }

        let mut request = self.client.post(self.server.clone()).json(&PublishRequest {
            topic: &self.topic,
            message,
            title,
        });
        if !self.username.is_empty() {
            request = request.basic_auth(&self.username, Some(&self.password));
        }

        let publish = async {
            request
                .send()
                .await?
                .error_for_status()?
                .json::<PublishResponse>()
                .await
        };

        match tokio::time::timeout(self.timeout, publish).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(NotificationError::Timeout(self.timeout)),
        }
    }
}
