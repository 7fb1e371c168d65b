use serde::{Deserialize, Serialize};

use crate::error::{LinkError, Result};
use crate::providers::MailProvider;

/// A mail account the backend finished linking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedAccount {
    pub id: String,
    pub provider: MailProvider,
    pub email: String,
    #[serde(default = "default_connected")]
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<String>,
}

fn default_connected() -> bool {
    true
}

impl LinkedAccount {
    pub fn from_wire(provider: MailProvider, wire: WireAccount) -> Result<Self> {
        let id = normalize_optional_string(wire.id)
            .ok_or_else(|| LinkError::Validation("account.id is required".to_string()))?;
        let email = normalize_optional_string(wire.email)
            .ok_or_else(|| LinkError::Validation("account.email is required".to_string()))?;
        Ok(Self {
            id,
            provider,
            email,
            connected: wire.connected.unwrap_or(true),
            last_sync: normalize_optional_string(wire.last_sync),
        })
    }
}

/// Account payload as the backend and the callback message carry it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireAccount {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "email_address")]
    pub email: Option<String>,
    #[serde(default, alias = "lastSync")]
    pub last_sync: Option<String>,
    #[serde(default, alias = "is_connected", alias = "isConnected")]
    pub connected: Option<bool>,
}

/// Everything the opener needs to drive one link attempt after `init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTicket {
    pub provider: MailProvider,
    pub endpoint: String,
    pub auth_url: String,
    pub state: String,
    pub poll_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, alias = "auth_url")]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, alias = "poll_id")]
    pub poll_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A record without `pending` is still in progress.
#[derive(Debug, Clone, Deserialize)]
pub struct PollResponse {
    #[serde(default = "default_pending")]
    pub pending: bool,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub account: Option<WireAccount>,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_pending() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub account: Option<WireAccount>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExchangeRequest<'a> {
    pub code: &'a str,
    pub state: &'a str,
    pub redirect_uri: &'a str,
}

/// Final outcome reported by the backend for a finished attempt.
pub fn outcome_from_parts(
    provider: MailProvider,
    success: bool,
    account: Option<WireAccount>,
    error: Option<String>,
    fallback_error: &str,
) -> std::result::Result<LinkedAccount, String> {
    if !success {
        return Err(normalize_optional_string(error).unwrap_or_else(|| fallback_error.to_string()));
    }
    let account = account.ok_or_else(|| "response is missing the linked account".to_string())?;
    LinkedAccount::from_wire(provider, account).map_err(|err| err.to_string())
}

pub fn normalize_optional_string(input: Option<String>) -> Option<String> {
    input.and_then(|value| normalize_string(&value))
}

pub fn normalize_string(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
