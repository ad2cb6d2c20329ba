use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Member,
    Admin,
    Owner,
    None,
}

impl MembershipStatus {
    pub fn is_member(&self) -> bool {
        !matches!(self, Self::None)
    }
}

#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("membership provider unavailable: {0}")]
    ProviderUnavailable(String),
}

/// Answers "is this user in that channel?" for the forced-membership gate.
#[automock]
#[async_trait]
pub trait MembershipProvider: Send + Sync {
    async fn membership_status(
        &self,
        channel: &str,
        user_id: i64,
    ) -> Result<MembershipStatus, MembershipError>;
}

/// Membership lookups through the Bot API `getChatMember` method.
pub struct TelegramMembership {
    client: reqwest::Client,
    /// `{api}/bot{token}`. Never logged.
    base_url: String,
}

impl TelegramMembership {
    pub fn new(api_base: &str, bot_token: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), bot_token),
        })
    }
}

#[async_trait]
impl MembershipProvider for TelegramMembership {
    async fn membership_status(
        &self,
        channel: &str,
        user_id: i64,
    ) -> Result<MembershipStatus, MembershipError> {
        let user = user_id.to_string();
        let resp = self
            .client
            .get(format!("{}/getChatMember", self.base_url))
            .query(&[("chat_id", channel), ("user_id", user.as_str())])
            .send()
            .await
            .map_err(|e| MembershipError::ProviderUnavailable(e.without_url().to_string()))?;

        // Bot API errors come back as JSON bodies with a 4xx status, so the
        // body is parsed regardless of the status code.
        let body = resp
            .text()
            .await
            .map_err(|e| MembershipError::ProviderUnavailable(e.without_url().to_string()))?;

        let status = parse_chat_member_response(&body)?;
        debug!(channel, user_id, ?status, "Membership checked");
        Ok(status)
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    result: Option<ChatMember>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMember {
    status: String,
    #[serde(default)]
    is_member: bool,
}

fn parse_chat_member_response(body: &str) -> Result<MembershipStatus, MembershipError> {
    let parsed: ApiResponse = serde_json::from_str(body)
        .map_err(|e| MembershipError::ProviderUnavailable(format!("malformed response: {}", e)))?;

    if !parsed.ok {
        return Err(MembershipError::ProviderUnavailable(
            parsed.description.unwrap_or_else(|| "request rejected".into()),
        ));
    }

    let member = parsed
        .result
        .ok_or_else(|| MembershipError::ProviderUnavailable("response without result".into()))?;

    Ok(match member.status.as_str() {
        "creator" => MembershipStatus::Owner,
        "administrator" => MembershipStatus::Admin,
        "member" => MembershipStatus::Member,
        "restricted" if member.is_member => MembershipStatus::Member,
        _ => MembershipStatus::None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(member_json: &str) -> MembershipStatus {
        let body = format!(r#"{{"ok":true,"result":{}}}"#, member_json);
        parse_chat_member_response(&body).unwrap()
    }

    #[test]
    fn maps_bot_api_statuses() {
        assert_eq!(status_of(r#"{"status":"creator"}"#), MembershipStatus::Owner);
        assert_eq!(status_of(r#"{"status":"administrator"}"#), MembershipStatus::Admin);
        assert_eq!(status_of(r#"{"status":"member","user":{"id":5}}"#), MembershipStatus::Member);
        assert_eq!(status_of(r#"{"status":"left"}"#), MembershipStatus::None);
        assert_eq!(status_of(r#"{"status":"kicked"}"#), MembershipStatus::None);
    }

    #[test]
    fn restricted_counts_only_while_member() {
        assert_eq!(
            status_of(r#"{"status":"restricted","is_member":true}"#),
            MembershipStatus::Member
        );
        assert_eq!(
            status_of(r#"{"status":"restricted","is_member":false}"#),
            MembershipStatus::None
        );
    }

    #[test]
    fn api_errors_are_provider_failures() {
        let err = parse_chat_member_response(
            r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("chat not found"));
        assert!(parse_chat_member_response("<html>").is_err());
    }

    #[test]
    fn only_none_is_non_membership() {
        assert!(MembershipStatus::Owner.is_member());
        assert!(MembershipStatus::Admin.is_member());
        assert!(MembershipStatus::Member.is_member());
        assert!(!MembershipStatus::None.is_member());
    }
}
