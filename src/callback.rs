use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use url::Url;

use crate::backend::LinkBackend;
use crate::config::LinkConfig;
use crate::endpoint::EndpointProber;
use crate::messages::{LinkMessage, MessageTarget};
use crate::models::{normalize_optional_string, outcome_from_parts, ExchangeRequest};
use crate::popup::PopupWindow;
use crate::providers::MailProvider;
use crate::session::SessionProvider;
use crate::utils::mask_secret;

/// Query parameters the provider appends when redirecting back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let value = Some(value.into_owned());
            match key.as_ref() {
                "code" => params.code = normalize_optional_string(value),
                "state" => params.state = normalize_optional_string(value),
                "error" => params.error = normalize_optional_string(value),
                "error_description" => params.error_description = normalize_optional_string(value),
                _ => {}
            }
        }
        params
    }

    fn provider_error(&self) -> Option<String> {
        let error = self.error.as_ref()?;
        Some(self.error_description.clone().unwrap_or_else(|| error.clone()))
    }
}

/// The callback URL with its query (and fragment) removed. Must equal the
/// redirect URI registered during initiation.
pub fn redirect_uri(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.to_string()
}

/// Endpoint embedded in `state`, as plain JSON or URL-safe base64 JSON.
pub fn endpoint_from_state(state: &str) -> Option<String> {
    let state = state.trim();
    if state.is_empty() {
        return None;
    }

    let decoded = serde_json::from_str::<serde_json::Value>(state)
        .ok()
        .or_else(|| {
            let bytes = URL_SAFE_NO_PAD
                .decode(state)
                .or_else(|_| URL_SAFE.decode(state))
                .ok()?;
            serde_json::from_slice::<serde_json::Value>(&bytes).ok()
        })?;

    let endpoint = decoded.get("endpoint")?.as_str()?.trim();
    let url = Url::parse(endpoint).ok()?;
    match url.scheme() {
        "http" | "https" => Some(endpoint.trim_end_matches('/').to_string()),
        _ => None,
    }
}

/// Runs inside the popup once the provider redirects back to the app.
pub struct CallbackPage {
    provider: MailProvider,
    backend: Arc<dyn LinkBackend>,
    session: Arc<dyn SessionProvider>,
    prober: EndpointProber,
    opener: Option<Arc<dyn MessageTarget>>,
    window: Arc<dyn PopupWindow>,
    close_delay: Duration,
}

impl CallbackPage {
    pub fn new(
        provider: MailProvider,
        backend: Arc<dyn LinkBackend>,
        session: Arc<dyn SessionProvider>,
        prober: EndpointProber,
        window: Arc<dyn PopupWindow>,
    ) -> Self {
        Self {
            provider,
            backend,
            session,
            prober,
            opener: None,
            window,
            close_delay: LinkConfig::default().callback_close_delay(),
        }
    }

    /// Prober and close delay taken from `config`.
    pub fn from_config(
        provider: MailProvider,
        backend: Arc<dyn LinkBackend>,
        session: Arc<dyn SessionProvider>,
        window: Arc<dyn PopupWindow>,
        config: &LinkConfig,
    ) -> Self {
        let prober = EndpointProber::from_config(backend.clone(), config);
        Self::new(provider, backend, session, prober, window)
            .with_close_delay(config.callback_close_delay())
    }

    /// The opener to report to. Without one the result only reaches the
    /// opener through the server-side poll record.
    pub fn with_opener(mut self, opener: Arc<dyn MessageTarget>) -> Self {
        self.opener = Some(opener);
        self
    }

    pub fn with_close_delay(mut self, close_delay: Duration) -> Self {
        self.close_delay = close_delay;
        self
    }

    /// Completes the flow for `current_url`, posts the result to the opener and
    /// closes the window after a successful exchange. Failures stay on screen.
    pub async fn run(&self, current_url: &str) {
        let message = self.complete(current_url).await;
        self.post(&message);
        if message.is_success() {
            tokio::time::sleep(self.close_delay).await;
            self.window.close();
        }
    }

    /// The result to report for `current_url`, without posting it.
    pub async fn complete(&self, current_url: &str) -> LinkMessage {
        let url = match Url::parse(current_url) {
            Ok(url) => url,
            Err(err) => {
                return LinkMessage::error(self.provider, format!("callback URL is invalid: {err}"))
            }
        };
        let params = CallbackParams::from_url(&url);

        if let Some(error) = params.provider_error() {
            log::warn!("[callback] provider={} returned error={error}", self.provider);
            return LinkMessage::error(self.provider, error);
        }
        let Some(code) = params.code.as_deref() else {
            return LinkMessage::error(self.provider, "missing authorization code");
        };
        let state = params.state.as_deref().unwrap_or_default();
        let redirect_uri = redirect_uri(&url);

        let access_token = self.session.access_token();
        if access_token.is_none() {
            log::info!(
                "[callback] no session token, exchanging with state only provider={}",
                self.provider
            );
        }
        let endpoint = match endpoint_from_state(state) {
            Some(endpoint) => endpoint,
            None => self.prober.discover(access_token.as_deref()).await,
        };

        log::info!(
            "[callback] exchanging provider={} endpoint={endpoint} code={} redirect_uri={redirect_uri}",
            self.provider,
            mask_secret(code)
        );
        let response = self
            .backend
            .exchange(
                &endpoint,
                self.provider,
                ExchangeRequest {
                    code,
                    state,
                    redirect_uri: &redirect_uri,
                },
                access_token.as_deref(),
            )
            .await;

        match response {
            Ok(response) => match outcome_from_parts(
                self.provider,
                response.success,
                response.account,
                response.error,
                "token exchange failed",
            ) {
                Ok(account) => LinkMessage::success(account),
                Err(error) => LinkMessage::error(self.provider, error),
            },
            Err(err) => {
                log::error!("[callback] token exchange failed provider={}: {err}", self.provider);
                LinkMessage::error(self.provider, err.user_message())
            }
        }
    }

    fn post(&self, message: &LinkMessage) {
        match &self.opener {
            Some(opener) => opener.post_message(message.to_payload(), "*"),
            None => log::warn!(
                "[callback] no opener to notify provider={}, relying on poll fallback",
                self.provider
            ),
        }
    }
}
