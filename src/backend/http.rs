use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use url::Url;

use super::{BackendFuture, LinkBackend};
use crate::error::{LinkError, Result};
use crate::models::{ExchangeRequest, ExchangeResponse, InitResponse, PollResponse};
use crate::providers::{trim_prefix, MailProvider};
use crate::utils::{format_status_error, shorten_body};

/// `LinkBackend` over HTTPS with `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpBackend {
    client: Client,
}

impl HttpBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn health_status(&self, prefix: &str, access_token: Option<&str>) -> Result<u16> {
        let url = format!("{}/health", trim_prefix(prefix));
        let request = with_optional_bearer(
            self.client.get(&url).header("accept", "application/json"),
            access_token,
        );
        let response = request
            .send()
            .await
            .map_err(|err| LinkError::Http(format!("health probe failed: {err}")))?;
        let status = response.status();
        log::debug!("[backend] health url={url} status={status}");
        Ok(status.as_u16())
    }

    async fn init_flow(
        &self,
        prefix: &str,
        provider: MailProvider,
        access_token: &str,
    ) -> Result<InitResponse> {
        let url = provider.contract().init_url(prefix);
        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|err| LinkError::Http(format!("{provider} init request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::warn!("[backend] init rejected provider={provider} status={status}");
            return Err(LinkError::InitiationFailed(server_message(status, &body)));
        }
        decode(response, "init").await
    }

    async fn poll_outcome(
        &self,
        prefix: &str,
        poll_id: &str,
        access_token: Option<&str>,
    ) -> Result<PollResponse> {
        let mut url = Url::parse(&format!("{}/oauth-poll", trim_prefix(prefix)))?;
        url.path_segments_mut()
            .map_err(|_| LinkError::Validation(format!("endpoint prefix '{prefix}' is not a base URL")))?
            .push(poll_id);
        let request = with_optional_bearer(
            self.client.get(url).header("accept", "application/json"),
            access_token,
        );
        let response = request
            .send()
            .await
            .map_err(|err| LinkError::Http(format!("poll request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LinkError::Http(format!(
                "poll request failed: {}",
                format_status_error(status, &body)
            )));
        }
        decode(response, "poll").await
    }

    async fn exchange_code(
        &self,
        prefix: &str,
        provider: MailProvider,
        request: ExchangeRequest<'_>,
        access_token: Option<&str>,
    ) -> Result<ExchangeResponse> {
        let url = provider.contract().exchange_url(prefix);
        let builder = with_optional_bearer(
            self.client
                .post(&url)
                .header("accept", "application/json")
                .json(&request),
            access_token,
        );
        let response = builder.send().await.map_err(|err| {
            LinkError::Http(format!("{provider} token exchange request failed: {err}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::warn!("[backend] token exchange rejected provider={provider} status={status}");
            return Err(LinkError::ExchangeFailed(server_message(status, &body)));
        }
        decode(response, "token exchange").await
    }
}

impl LinkBackend for HttpBackend {
    fn health<'a>(
        &'a self,
        prefix: &'a str,
        access_token: Option<&'a str>,
    ) -> BackendFuture<'a, u16> {
        Box::pin(self.health_status(prefix, access_token))
    }

    fn init<'a>(
        &'a self,
        prefix: &'a str,
        provider: MailProvider,
        access_token: &'a str,
    ) -> BackendFuture<'a, InitResponse> {
        Box::pin(self.init_flow(prefix, provider, access_token))
    }

    fn poll<'a>(
        &'a self,
        prefix: &'a str,
        poll_id: &'a str,
        access_token: Option<&'a str>,
    ) -> BackendFuture<'a, PollResponse> {
        Box::pin(self.poll_outcome(prefix, poll_id, access_token))
    }

    fn exchange<'a>(
        &'a self,
        prefix: &'a str,
        provider: MailProvider,
        request: ExchangeRequest<'a>,
        access_token: Option<&'a str>,
    ) -> BackendFuture<'a, ExchangeResponse> {
        Box::pin(self.exchange_code(prefix, provider, request, access_token))
    }
}

fn with_optional_bearer(request: RequestBuilder, access_token: Option<&str>) -> RequestBuilder {
    match access_token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

async fn decode<T: DeserializeOwned>(response: Response, context: &str) -> Result<T> {
    let body = response
        .text()
        .await
        .map_err(|err| LinkError::Http(format!("{context} response read failed: {err}")))?;
    serde_json::from_str::<T>(&body).map_err(|err| {
        log::error!(
            "[backend] {context} decode failed: {err} body_preview={}",
            shorten_body(&body)
        );
        LinkError::Json(err)
    })
}

/// Prefers the `error`/`message` field of a JSON error body over the raw text.
fn server_message(status: reqwest::StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let message = parsed.as_ref().and_then(|value| {
        ["error", "message", "error_description"]
            .iter()
            .find_map(|key| value.get(*key).and_then(|field| field.as_str()))
            .map(str::trim)
            .filter(|text| !text.is_empty())
    });
    match message {
        Some(message) => shorten_body(message),
        None => format_status_error(status, body),
    }
}
