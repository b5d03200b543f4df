//! HTTP conversation gateway.
//!
//! Talks JSON to the study backend:
//!
//! ```text
//! GET    {base}/principals/{pid}/conversations
//! GET    {base}/principals/{pid}/conversations/{cid}
//! PUT    {base}/principals/{pid}/conversations/{cid}
//! DELETE {base}/principals/{pid}/conversations/{cid}
//! ```
//!
//! Any transport failure or non-success status becomes `StudyError::Remote`.

use async_trait::async_trait;
use chatstudy_core::config::RemoteSettings;
use chatstudy_core::conversation::{Conversation, ConversationGateway};
use chatstudy_core::error::{Result, StudyError};
use reqwest::{Client, StatusCode};
use std::sync::RwLock;
use std::time::Duration;

pub struct HttpConversationGateway {
    client: Client,
    base_url: String,
    timeout: Duration,
    bearer_token: RwLock<Option<String>>,
}

impl HttpConversationGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url,
            timeout,
            bearer_token: RwLock::new(None),
        }
    }

    /// Builds a gateway from configuration, or `None` in offline mode.
    pub fn from_settings(settings: &RemoteSettings) -> Option<Self> {
        let base_url = settings.base_url.as_deref()?.trim();
        if base_url.is_empty() {
            return None;
        }
        Some(Self::new(
            base_url,
            Duration::from_secs(settings.timeout_secs.max(1)),
        ))
    }

    /// Sets (or clears) the bearer token sent with every request.
    pub fn set_bearer_token(&self, token: Option<String>) {
        let mut guard = self
            .bearer_token
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *guard = token;
    }

    pub fn collection_url(&self, principal_id: &str) -> String {
        format!(
            "{}/principals/{}/conversations",
            self.base_url,
            encode_segment(principal_id)
        )
    }

    pub fn item_url(&self, principal_id: &str, conversation_id: &str) -> String {
        format!(
            "{}/{}",
            self.collection_url(principal_id),
            encode_segment(conversation_id)
        )
    }

    /// Makes an authenticated request with the configured timeout.
    fn prepare(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.timeout(self.timeout);
        let token = self
            .bearer_token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(token) = token {
            request.header("Authorization", format!("Bearer {}", token))
        } else {
            request
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        self.prepare(request)
            .send()
            .await
            .map_err(|e| StudyError::remote(format!("Request failed: {}", e)))
    }

    async fn error_from(response: reqwest::Response, action: &str) -> StudyError {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        StudyError::remote(format!("Failed to {} ({}): {}", action, status, error_text))
    }
}

/// Percent-encodes everything outside the URL path unreserved set.
fn encode_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[async_trait]
impl ConversationGateway for HttpConversationGateway {
    async fn fetch_all(&self, principal_id: &str) -> Result<Vec<Conversation>> {
        let url = self.collection_url(principal_id);
        let response = self.send(self.client.get(&url)).await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response, "list conversations").await);
        }

        response
            .json()
            .await
            .map_err(|e| StudyError::remote(format!("Invalid conversation list: {}", e)))
    }

    async fn fetch_one(
        &self,
        principal_id: &str,
        conversation_id: &str,
    ) -> Result<Option<Conversation>> {
        let url = self.item_url(principal_id, conversation_id);
        let response = self.send(self.client.get(&url)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json()
                .await
                .map(Some)
                .map_err(|e| StudyError::remote(format!("Invalid conversation: {}", e))),
            _ => Err(Self::error_from(response, "fetch conversation").await),
        }
    }

    async fn save(&self, principal_id: &str, conversation: &Conversation) -> Result<()> {
        let url = self.item_url(principal_id, &conversation.id);
        let response = self.send(self.client.put(&url).json(conversation)).await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response, "save conversation").await);
        }
        tracing::debug!(
            "[HttpGateway] Saved conversation {} ({} messages)",
            conversation.id,
            conversation.messages.len()
        );
        Ok(())
    }

    async fn delete(&self, principal_id: &str, conversation_id: &str) -> Result<()> {
        let url = self.item_url(principal_id, conversation_id);
        let response = self.send(self.client.delete(&url)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            _ => Err(Self::error_from(response, "delete conversation").await),
        }
    }
}
