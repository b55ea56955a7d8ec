//! Request/response fallback. Every call mirrors a push-path operation and
//! performs the same persistence server-side, so a message sent here is
//! shaped identically to one sent over the channel.

use std::time::Duration;

use reqwest::StatusCode;
use uuid::Uuid;

use wallflower_types::api::{
    ConversationResponse, MessageListResponse, OpenConversationRequest, SendMessageRequest,
    SetCrushRequest, SetCrushResponse, UpdateStatusRequest,
};
use wallflower_types::models::{ChatMessage, RelationshipStage, RelationshipStatus};

use crate::error::{ClientError, ClientResult};

pub struct FallbackApi {
    http: reqwest::Client,
    base_url: String,
}

impl FallbackApi {
    /// `timeout` bounds every call end-to-end, so a stalled network
    /// degrades to a visible error instead of hanging the caller.
    pub fn new(base_url: String, timeout: Duration) -> ClientResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    pub async fn set_crush(
        &self,
        token: &str,
        wall_id: Uuid,
        target_id: Uuid,
    ) -> ClientResult<SetCrushResponse> {
        let response = self
            .http
            .put(format!("{}/walls/{}/crush", self.base_url, wall_id))
            .bearer_auth(token)
            .json(&SetCrushRequest { target_id })
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn remove_crush(&self, token: &str, wall_id: Uuid) -> ClientResult<()> {
        let response = self
            .http
            .delete(format!("{}/walls/{}/crush", self.base_url, wall_id))
            .bearer_auth(token)
            .send()
            .await?;
        Self::expect_ok(response).await
    }

    pub async fn open_conversation(
        &self,
        token: &str,
        wall_id: Uuid,
        member_id: Uuid,
    ) -> ClientResult<ConversationResponse> {
        let response = self
            .http
            .post(format!("{}/walls/{}/conversations", self.base_url, wall_id))
            .bearer_auth(token)
            .json(&OpenConversationRequest { member_id })
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn send_message(
        &self,
        token: &str,
        conversation_id: Uuid,
        body: &str,
    ) -> ClientResult<ChatMessage> {
        let response = self
            .http
            .post(format!(
                "{}/conversations/{}/messages",
                self.base_url, conversation_id
            ))
            .bearer_auth(token)
            .json(&SendMessageRequest {
                body: body.to_string(),
            })
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn fetch_messages(
        &self,
        token: &str,
        conversation_id: Uuid,
        limit: u32,
        after: Option<i64>,
    ) -> ClientResult<Vec<ChatMessage>> {
        let mut request = self
            .http
            .get(format!(
                "{}/conversations/{}/messages",
                self.base_url, conversation_id
            ))
            .bearer_auth(token)
            .query(&[("limit", limit.to_string())]);
        if let Some(after) = after {
            request = request.query(&[("after", after.to_string())]);
        }

        let response: MessageListResponse = Self::parse(request.send().await?).await?;
        Ok(response.messages)
    }

    pub async fn update_status(
        &self,
        token: &str,
        conversation_id: Uuid,
        stage: RelationshipStage,
    ) -> ClientResult<RelationshipStatus> {
        let response = self
            .http
            .put(format!(
                "{}/conversations/{}/status",
                self.base_url, conversation_id
            ))
            .bearer_auth(token)
            .json(&UpdateStatusRequest { stage })
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(Self::rejected(status, response).await);
        }
        Ok(response.json().await?)
    }

    async fn expect_ok(response: reqwest::Response) -> ClientResult<()> {
        let status = response.status();
        if !status.is_success() {
            return Err(Self::rejected(status, response).await);
        }
        Ok(())
    }

    async fn rejected(status: StatusCode, response: reqwest::Response) -> ClientError {
        let body = response.text().await.unwrap_or_default();
        ClientError::Rejected {
            status: status.as_u16(),
            body,
        }
    }
}
