use anyhow::{Context, Result};
use uuid::Uuid;

use swaphub_types::api::{MessagePage, ReactionListResponse, UnreadCountResponse};
use swaphub_types::models::{Message, MessageType};

use crate::controller::ChatApi;

/// Talks to a running swaphub server with a platform-issued bearer token.
pub struct HttpChatApi {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpChatApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl ChatApi for HttpChatApi {
    async fn fetch_page(&self, group_id: Uuid, page: u32, page_size: u32) -> Result<MessagePage> {
        self.http
            .get(self.url(&format!("/groups/{}/messages", group_id)))
            .query(&[("page", page), ("page_size", page_size)])
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("decoding message page")
    }

    async fn send(
        &self,
        group_id: Uuid,
        content: &str,
        message_type: MessageType,
        reply_to: Option<Uuid>,
    ) -> Result<Message> {
        self.http
            .post(self.url(&format!("/groups/{}/messages", group_id)))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({
                "content": content,
                "message_type": message_type,
                "reply_to": reply_to,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("decoding sent message")
    }

    async fn edit(&self, message_id: Uuid, content: &str) -> Result<Message> {
        self.http
            .patch(self.url(&format!("/messages/{}", message_id)))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("decoding edited message")
    }

    async fn delete(&self, message_id: Uuid) -> Result<Message> {
        self.http
            .delete(self.url(&format!("/messages/{}", message_id)))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("decoding delete ack")
    }

    async fn add_reaction(&self, message_id: Uuid, emoji: &str) -> Result<ReactionListResponse> {
        self.http
            .post(self.url(&format!("/messages/{}/reactions", message_id)))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "emoji": emoji }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("decoding reactions")
    }

    async fn remove_reaction(
        &self,
        message_id: Uuid,
        emoji: &str,
    ) -> Result<ReactionListResponse> {
        self.http
            .delete(self.url(&format!("/messages/{}/reactions", message_id)))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "emoji": emoji }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("decoding reactions")
    }

    async fn unread_count(&self, group_id: Uuid) -> Result<u64> {
        let response: UnreadCountResponse = self
            .http
            .get(self.url(&format!("/groups/{}/messages/unread-count", group_id)))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("decoding unread count")?;
        Ok(response.unread_count)
    }
}
