mod http;

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::models::{ExchangeRequest, ExchangeResponse, InitResponse, PollResponse};
use crate::providers::MailProvider;

pub use http::HttpBackend;

pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// The linking API served under an endpoint prefix.
///
/// Implementations map transport failures to `LinkError::Http`, a non-2xx
/// `init` to `InitiationFailed` and a non-2xx `exchange` to `ExchangeFailed`.
pub trait LinkBackend: Send + Sync {
    /// `GET {prefix}/health`. Resolves with the HTTP status of any response.
    fn health<'a>(&'a self, prefix: &'a str, access_token: Option<&'a str>)
        -> BackendFuture<'a, u16>;

    /// `POST {prefix}/{provider}-oauth-init`.
    fn init<'a>(
        &'a self,
        prefix: &'a str,
        provider: MailProvider,
        access_token: &'a str,
    ) -> BackendFuture<'a, InitResponse>;

    /// `GET {prefix}/oauth-poll/{poll_id}`.
    fn poll<'a>(
        &'a self,
        prefix: &'a str,
        poll_id: &'a str,
        access_token: Option<&'a str>,
    ) -> BackendFuture<'a, PollResponse>;

    /// `POST {prefix}/{provider}-token-exchange`.
    fn exchange<'a>(
        &'a self,
        prefix: &'a str,
        provider: MailProvider,
        request: ExchangeRequest<'a>,
        access_token: Option<&'a str>,
    ) -> BackendFuture<'a, ExchangeResponse>;
}
