use std::sync::Arc;

use url::Url;

use crate::backend::LinkBackend;
use crate::endpoint::EndpointProber;
use crate::error::{LinkError, Result};
use crate::models::{normalize_optional_string, LinkTicket};
use crate::providers::MailProvider;

/// Starts the provider authorization flow at the discovered endpoint.
#[derive(Clone)]
pub struct LinkInitiator {
    backend: Arc<dyn LinkBackend>,
    prober: EndpointProber,
}

impl LinkInitiator {
    pub fn new(backend: Arc<dyn LinkBackend>, prober: EndpointProber) -> Self {
        Self { backend, prober }
    }

    pub async fn initiate(
        &self,
        provider: MailProvider,
        access_token: Option<&str>,
    ) -> Result<LinkTicket> {
        let access_token = access_token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(LinkError::Unauthenticated)?;

        let endpoint = self.prober.discover(Some(access_token)).await;
        let response = self
            .backend
            .init(&endpoint, provider, access_token)
            .await
            .map_err(|err| match err {
                LinkError::InitiationFailed(reason) => LinkError::InitiationFailed(reason),
                LinkError::Http(reason) => LinkError::InitiationFailed(reason),
                other => LinkError::InitiationFailed(format!("invalid init response: {other}")),
            })?;

        if !response.success {
            let reason = normalize_optional_string(response.error)
                .unwrap_or_else(|| format!("{} authorization could not be started", provider.name()));
            log::warn!("[initiator] init refused provider={provider} reason={reason}");
            return Err(LinkError::InitiationFailed(reason));
        }

        let auth_url = normalize_optional_string(response.auth_url).ok_or_else(|| {
            LinkError::InitiationFailed("init response is missing authUrl".to_string())
        })?;
        Url::parse(&auth_url).map_err(|err| {
            LinkError::InitiationFailed(format!("init response authUrl is invalid: {err}"))
        })?;
        let state = normalize_optional_string(response.state).ok_or_else(|| {
            LinkError::InitiationFailed("init response is missing state".to_string())
        })?;
        let poll_id = normalize_optional_string(response.poll_id);

        log::info!(
            "[initiator] started provider={provider} endpoint={endpoint} poll_fallback={}",
            poll_id.is_some()
        );

        Ok(LinkTicket {
            provider,
            endpoint,
            auth_url,
            state,
            poll_id,
        })
    }
}
